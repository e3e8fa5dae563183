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

//! The service catalog: a generic key/value store turned into a
//! service/instance/container-rule registry, plus a live change stream
//! over it.

pub mod catalog;
pub mod change_stream;
pub mod error;
pub mod parser;

pub use catalog::Catalog;
pub use change_stream::ChangeStream;
pub use error::CatalogError;
