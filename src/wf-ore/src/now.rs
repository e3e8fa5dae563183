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

//! An injectable "now" function, so that anything that needs wall-clock
//! time can be driven by a deterministic clock in tests.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use once_cell::sync::Lazy;

/// Milliseconds since the Unix epoch.
pub type EpochMillis = u64;

/// A cheaply-cloneable function returning the current time.
#[derive(Clone)]
pub struct NowFn(Arc<dyn Fn() -> EpochMillis + Send + Sync>);

impl NowFn {
    /// Wraps an arbitrary closure as a `NowFn`.
    pub fn new<F>(f: F) -> NowFn
    where
        F: Fn() -> EpochMillis + Send + Sync + 'static,
    {
        NowFn(Arc::new(f))
    }

    /// Returns the current time.
    pub fn now(&self) -> EpochMillis {
        (self.0)()
    }
}

impl std::fmt::Debug for NowFn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("NowFn(..)")
    }
}

impl Default for NowFn {
    fn default() -> Self {
        SYSTEM_TIME.clone()
    }
}

/// Returns the actual system time, in milliseconds since the Unix epoch.
pub fn system_time_now() -> EpochMillis {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time is after the Unix epoch")
        .as_millis()
        .try_into()
        .expect("millis since epoch fits in a u64 until the year 292 million")
}

/// A [`NowFn`] backed by [`system_time_now`].
pub static SYSTEM_TIME: Lazy<NowFn> = Lazy::new(|| NowFn::new(system_time_now));
