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

//! A [`KvBackend`] backed by an etcd v3 cluster.

use std::env;

use etcd_client::{
    Client, DeleteOptions, EventType, GetOptions, WatchOptions as EtcdWatchOptions,
};
use tokio::sync::mpsc;

use crate::{BackendError, EventKind, KeyValue, KvBackend, Watcher};

/// Discovers the etcd address from the environment, per the original's
/// bootstrap logic: `ETCD_PORT`, then `ETCD_ADDRESS`, `tcp:`-prefixed
/// values rewritten to `http:`, defaulting to `http://127.0.0.1:4001`.
pub fn discover_addr() -> String {
    let addr = env::var("ETCD_PORT")
        .ok()
        .filter(|s| !s.is_empty())
        .or_else(|| env::var("ETCD_ADDRESS").ok().filter(|s| !s.is_empty()));
    let addr = match addr {
        Some(addr) if addr.starts_with("tcp:") => format!("http:{}", &addr["tcp:".len()..]),
        Some(addr) => addr,
        None => "http://127.0.0.1:4001".to_string(),
    };
    addr
}

/// A [`KvBackend`] realized against an external etcd cluster.
pub struct EtcdBackend {
    client: Client,
}

impl EtcdBackend {
    /// Connects to etcd at `addr`. Invalid addresses fail fast, per §6.
    pub async fn connect(addr: &str) -> Result<EtcdBackend, BackendError> {
        let client = Client::connect([addr], None)
            .await
            .map_err(|e| BackendError::Connect(e.to_string()))?;
        Ok(EtcdBackend { client })
    }

    /// Connects using the address discovered from the environment (§6).
    pub async fn connect_from_env() -> Result<EtcdBackend, BackendError> {
        EtcdBackend::connect(&discover_addr()).await
    }
}

#[async_trait::async_trait]
impl KvBackend for EtcdBackend {
    async fn range(&self, key: &str, range_end: Option<&str>) -> Result<Vec<KeyValue>, BackendError> {
        let mut client = self.client.clone();
        let opts = range_end.map(|end| GetOptions::new().with_range(end));
        let resp = client
            .get(key, opts)
            .await
            .map_err(|e| BackendError::Request(e.to_string()))?;
        resp.kvs()
            .iter()
            .map(|kv| {
                Ok(KeyValue {
                    key: kv
                        .key_str()
                        .map_err(|e| BackendError::Request(e.to_string()))?
                        .to_string(),
                    value: kv.value().to_vec(),
                })
            })
            .collect()
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), BackendError> {
        let mut client = self.client.clone();
        client
            .put(key, value, None)
            .await
            .map_err(|e| BackendError::Request(e.to_string()))?;
        Ok(())
    }

    async fn delete_range(&self, key: &str, range_end: Option<&str>) -> Result<u64, BackendError> {
        let mut client = self.client.clone();
        let opts = range_end.map(|end| DeleteOptions::new().with_range(end));
        let resp = client
            .delete(key, opts)
            .await
            .map_err(|e| BackendError::Request(e.to_string()))?;
        Ok(resp.deleted().max(0) as u64)
    }

    async fn watch(&self, prefix: &str) -> Result<Watcher, BackendError> {
        let mut client = self.client.clone();
        let (mut watcher, mut stream) = client
            .watch(prefix, Some(EtcdWatchOptions::new().with_prefix()))
            .await
            .map_err(|e| BackendError::Request(e.to_string()))?;
        let (tx, rx) = mpsc::channel(128);
        tokio::spawn(async move {
            loop {
                match stream.message().await {
                    Ok(Some(resp)) => {
                        for event in resp.events() {
                            let Some(kv) = event.kv() else { continue };
                            let Ok(key) = kv.key_str() else { continue };
                            let kind = match event.event_type() {
                                EventType::Put => EventKind::Set,
                                EventType::Delete => EventKind::Delete,
                            };
                            let value = if kind == EventKind::Set {
                                kv.value().to_vec()
                            } else {
                                Vec::new()
                            };
                            if tx
                                .send(crate::WatchEvent {
                                    kind,
                                    key: key.to_string(),
                                    value,
                                })
                                .await
                                .is_err()
                            {
                                return;
                            }
                        }
                    }
                    Ok(None) => return,
                    Err(e) => {
                        tracing::warn!("etcd watch stream failed: {e}");
                        return;
                    }
                }
            }
        });
        Ok(Watcher::new(rx, move || {
            tokio::spawn(async move {
                let _ = watcher.cancel().await;
            });
        }))
    }

    async fn ping(&self) -> Result<(), BackendError> {
        let mut client = self.client.clone();
        client
            .status()
            .await
            .map_err(|e| BackendError::Request(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discover_addr_defaults_when_unset() {
        // This test runs in-process with the workspace's shared environment,
        // so it only asserts the rewrite rules, not the default, to avoid
        // interfering with other tests that may set these variables.
        assert_eq!(rewrite_tcp("tcp://10.0.0.1:4001"), "http://10.0.0.1:4001");
        assert_eq!(rewrite_tcp("http://10.0.0.1:4001"), "http://10.0.0.1:4001");
    }

    fn rewrite_tcp(addr: &str) -> String {
        if let Some(stripped) = addr.strip_prefix("tcp:") {
            format!("http:{stripped}")
        } else {
            addr.to_string()
        }
    }
}
