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

//! An embedded, in-process [`KvBackend`], standing in for the gossip-backed
//! replicated KV the original shares with its other cluster nodes (see
//! `SPEC_FULL.md` §10.1 — no gossip membership protocol is implemented
//! here, only the single-process storage and fan-out behavior a caller of
//! [`KvBackend`] can observe).

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, RwLock};

use crate::{BackendError, EventKind, KeyValue, KvBackend, WatchEvent, Watcher};

#[derive(Debug, Clone)]
struct RawEvent {
    kind: EventKind,
    key: String,
    value: Vec<u8>,
}

/// An embedded key/value store for single-node deployments and tests.
pub struct LocalBackend {
    data: RwLock<BTreeMap<String, Vec<u8>>>,
    changes: broadcast::Sender<RawEvent>,
}

impl LocalBackend {
    pub fn new() -> Arc<LocalBackend> {
        let (changes, _) = broadcast::channel(1024);
        Arc::new(LocalBackend {
            data: RwLock::new(BTreeMap::new()),
            changes,
        })
    }
}

fn in_range(key: &str, start: &str, end: Option<&str>) -> bool {
    key >= start && end.map_or(key == start, |end| key < end)
}

#[async_trait::async_trait]
impl KvBackend for LocalBackend {
    async fn range(&self, key: &str, range_end: Option<&str>) -> Result<Vec<KeyValue>, BackendError> {
        let data = self.data.read().await;
        Ok(data
            .iter()
            .filter(|(k, _)| in_range(k, key, range_end))
            .map(|(k, v)| KeyValue {
                key: k.clone(),
                value: v.clone(),
            })
            .collect())
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), BackendError> {
        self.data
            .write()
            .await
            .insert(key.to_string(), value.clone());
        // A send error just means there are no active watchers; not an
        // error condition for the writer.
        let _ = self.changes.send(RawEvent {
            kind: EventKind::Set,
            key: key.to_string(),
            value,
        });
        Ok(())
    }

    async fn delete_range(&self, key: &str, range_end: Option<&str>) -> Result<u64, BackendError> {
        let mut data = self.data.write().await;
        let victims: Vec<String> = data
            .keys()
            .filter(|k| in_range(k, key, range_end))
            .cloned()
            .collect();
        for victim in &victims {
            data.remove(victim);
        }
        drop(data);
        for victim in &victims {
            let _ = self.changes.send(RawEvent {
                kind: EventKind::Delete,
                key: victim.clone(),
                value: Vec::new(),
            });
        }
        Ok(victims.len() as u64)
    }

    async fn watch(&self, prefix: &str) -> Result<Watcher, BackendError> {
        let mut changes = self.changes.subscribe();
        let (tx, rx) = mpsc::channel(128);
        let prefix = prefix.to_string();
        let handle = tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(event) if event.key.starts_with(&prefix) => {
                        let event = WatchEvent {
                            kind: event.kind,
                            key: event.key,
                            value: event.value,
                        };
                        if tx.send(event).await.is_err() {
                            return;
                        }
                    }
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return,
                }
            }
        });
        Ok(Watcher::new(rx, move || handle.abort()))
    }

    async fn ping(&self) -> Result<(), BackendError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_range_roundtrips() {
        let backend = LocalBackend::new();
        backend.put("a", b"1".to_vec()).await.unwrap();
        backend.put("b", b"2".to_vec()).await.unwrap();
        backend.put("c", b"3".to_vec()).await.unwrap();

        let all = backend.range("a", Some("z")).await.unwrap();
        assert_eq!(all.len(), 3);

        let one = backend.range("b", None).await.unwrap();
        assert_eq!(one, vec![KeyValue { key: "b".into(), value: b"2".to_vec() }]);
    }

    #[tokio::test]
    async fn delete_range_reports_count_and_removes_keys() {
        let backend = LocalBackend::new();
        backend.put("x/1", b"1".to_vec()).await.unwrap();
        backend.put("x/2", b"2".to_vec()).await.unwrap();
        backend.put("y/1", b"3".to_vec()).await.unwrap();

        let deleted = backend.delete_range("x/", Some("x0")).await.unwrap();
        assert_eq!(deleted, 2);
        assert_eq!(backend.range("x/", Some("x0")).await.unwrap().len(), 0);
        assert_eq!(backend.range("y/", Some("y0")).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn watch_sees_prefixed_mutations_only() {
        let backend = LocalBackend::new();
        let mut watcher = backend.watch("svc/").await.unwrap();
        backend.put("svc/a", b"1".to_vec()).await.unwrap();
        backend.put("other/a", b"1".to_vec()).await.unwrap();
        backend.delete_range("svc/a", None).await.unwrap();

        let first = watcher.events.recv().await.unwrap();
        assert_eq!(first.kind, EventKind::Set);
        assert_eq!(first.key, "svc/a");

        let second = watcher.events.recv().await.unwrap();
        assert_eq!(second.kind, EventKind::Delete);
        assert_eq!(second.key, "svc/a");
    }
}
