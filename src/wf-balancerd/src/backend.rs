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

//! Backend bootstrap: picks between the embedded store and an external
//! etcd cluster, per the environment-driven discovery rules in §6.

use std::sync::Arc;
use std::time::Duration;

use wf_backend::{etcd::EtcdBackend, local::LocalBackend, BackendError, KvBackend};
use wf_ore::retry::Retry;

/// Connects to the catalog's backing store.
///
/// `--local` (or `local == true`) selects the embedded, single-process
/// store used for development and tests. Otherwise, connects to etcd at
/// the address discovered from `ETCD_PORT`/`ETCD_ADDRESS`, retrying with
/// backoff while the cluster is still coming up.
pub async fn bootstrap(local: bool) -> Result<Arc<dyn KvBackend>, BackendError> {
    if local {
        tracing::info!("using the embedded in-process backend");
        return Ok(LocalBackend::new());
    }

    let addr = wf_backend::etcd::discover_addr();
    tracing::info!(%addr, "connecting to etcd");
    let backend = Retry::default()
        .initial_backoff(Duration::from_millis(100))
        .clamp_backoff(Duration::from_secs(5))
        .max_tries(10)
        .retry_async(|state| {
            let addr = addr.clone();
            async move {
                EtcdBackend::connect(&addr).await.map_err(|err| {
                    tracing::warn!(attempt = state.i, %err, "etcd not ready yet");
                    err
                })
            }
        })
        .await?;
    Ok(Arc::new(backend))
}
