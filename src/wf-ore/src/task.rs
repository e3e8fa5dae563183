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

//! A [`tokio::task::JoinHandle`] that aborts its task when dropped.

use std::future::Future;

use tokio::task::JoinHandle;

/// Spawns `future` as a named task. The name currently only shows up in
/// logs emitted around the spawn point; it is not (yet) attached to the
/// task itself.
pub fn spawn<Fut, F, T>(name: F, future: Fut) -> JoinHandle<T>
where
    F: FnOnce() -> String,
    Fut: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let name = name();
    tracing::debug!(task = %name, "spawning task");
    tokio::spawn(future)
}

/// A `JoinHandle` wrapper that calls `abort()` when dropped, so that a
/// background task's lifetime can be tied to an owning struct.
#[derive(Debug)]
pub struct AbortOnDropHandle<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDropHandle<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Extension trait adding [`AbortOnDropHandle`] conversion to `JoinHandle`.
pub trait JoinHandleExt<T> {
    /// Wraps this handle so the task is aborted when the wrapper is dropped.
    fn abort_on_drop(self) -> AbortOnDropHandle<T>;
}

impl<T> JoinHandleExt<T> for JoinHandle<T> {
    fn abort_on_drop(self) -> AbortOnDropHandle<T> {
        AbortOnDropHandle(self)
    }
}
