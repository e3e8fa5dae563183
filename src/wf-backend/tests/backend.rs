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

//! Exercises the [`KvBackend`] contract against every realization this
//! workspace ships, the way `mz-stash`'s tests run one shared test body
//! against `Memory`, `Sqlite`, and `Postgres`.

use std::future::Future;
use std::sync::Arc;

use wf_backend::{etcd::EtcdBackend, local::LocalBackend, BackendError, KvBackend};

async fn test_contract<B, F, Fut>(new_backend: F) -> Result<(), BackendError>
where
    B: KvBackend,
    F: Fn() -> Fut,
    Fut: Future<Output = B>,
{
    let backend = new_backend().await;
    backend.put("root/a", b"1".to_vec()).await?;
    backend.put("root/b", b"2".to_vec()).await?;
    backend.put("unrelated", b"x".to_vec()).await?;

    let scanned = backend.range("root/", Some("root0")).await?;
    assert_eq!(scanned.len(), 2);

    let single = backend.range("root/a", None).await?;
    assert_eq!(single.len(), 1);
    assert_eq!(single[0].value, b"1");

    let deleted = backend.delete_range("root/", Some("root0")).await?;
    assert_eq!(deleted, 2);
    assert!(backend.range("root/", Some("root0")).await?.is_empty());

    backend.ping().await?;
    Ok(())
}

#[tokio::test]
async fn local_backend_satisfies_contract() -> Result<(), BackendError> {
    test_contract(|| async { LocalBackend::new() }).await
}

#[tokio::test]
async fn etcd_backend_satisfies_contract() -> Result<(), BackendError> {
    let Ok(addr) = std::env::var("WF_TEST_ETCD_ADDRESS") else {
        eprintln!("skipping etcd_backend_satisfies_contract: WF_TEST_ETCD_ADDRESS is not set");
        return Ok(());
    };
    test_contract(|| {
        let addr = addr.clone();
        async move { Arc::new(EtcdBackend::connect(&addr).await.unwrap()) }
    })
    .await
}
