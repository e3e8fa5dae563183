// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License in the LICENSE file at the
// root of this repository, or online at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The catalog's error taxonomy.

use thiserror::Error;
use wf_backend::BackendError;

/// Errors surfaced by the catalog, the parser, and the change stream.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The named service, instance, or rule does not exist.
    #[error("not found")]
    NotFound,
    /// A JSON payload failed to encode or decode.
    #[error("encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
    /// The snapshot parser saw an instance or rule key whose service name
    /// did not match the currently open service, or an unrecognized key.
    #[error("parse inconsistency: {0}")]
    ParseInconsistency(String),
    /// A failure reported by the backend, passed through unchanged.
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),
}
