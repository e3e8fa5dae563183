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

//! Small, shared utilities used by every other crate in this workspace:
//! error formatting, retry with backoff, an injectable clock, CLI parsing,
//! logging bootstrap, and a Prometheus metrics registry.

pub mod cli;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod now;
pub mod retry;
pub mod task;
