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

//! The catalog's data model and key schema. Shared by the backend,
//! catalog, and pool crates, with no dependency of its own on how the data
//! is stored or transported.

pub mod keys;
pub mod model;

pub use keys::{parse_key, ParsedKey};
pub use model::{
    labels, ContainerRule, Instance, IpPort, QueryOptions, Service, ServiceChange, ServiceInfo,
    WatchOptions,
};
