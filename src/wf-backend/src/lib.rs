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

//! The Catalog Backend Abstraction: a thin contract over a replicated
//! key/value store, with two interchangeable realizations.

pub mod etcd;
pub mod local;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

/// One key/value pair returned from a range read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue {
    pub key: String,
    pub value: Vec<u8>,
}

/// The kind of a raw watch event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Set,
    Delete,
}

/// A raw mutation observed by a watch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub kind: EventKind,
    pub key: String,
    /// Empty for `Delete` events.
    pub value: Vec<u8>,
}

/// A live watch: events arrive on `events` until the backend side is torn
/// down (by calling [`Watcher::cancel`] or dropping the watcher).
pub struct Watcher {
    pub events: mpsc::Receiver<WatchEvent>,
    canceler: Box<dyn FnOnce() + Send>,
}

impl Watcher {
    pub fn new(events: mpsc::Receiver<WatchEvent>, canceler: impl FnOnce() + Send + 'static) -> Watcher {
        Watcher {
            events,
            canceler: Box::new(canceler),
        }
    }

    /// Tears down the watch and releases backend resources.
    pub fn cancel(self) {
        (self.canceler)();
    }
}

/// Errors surfaced by a [`KvBackend`].
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("connecting to backend: {0}")]
    Connect(String),
    #[error("backend request failed: {0}")]
    Request(String),
    #[error("operation cancelled")]
    Cancelled,
}

/// The operations the catalog depends on from a replicated key/value store.
///
/// `range_end = None` means a single-key lookup; a prefix scan passes
/// `range_end = Some(wf_types::keys::upper_bound(key))`.
#[async_trait]
pub trait KvBackend: Send + Sync {
    /// Reads all keys `k` with `key <= k < range_end` (or just `key`, if
    /// `range_end` is `None`), in lexicographic order.
    async fn range(&self, key: &str, range_end: Option<&str>) -> Result<Vec<KeyValue>, BackendError>;

    /// Writes `value` at `key`, unconditionally overwriting any prior
    /// value.
    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), BackendError>;

    /// Deletes all keys in `[key, range_end)` (or just `key`, if
    /// `range_end` is `None`), returning the number of keys deleted.
    async fn delete_range(&self, key: &str, range_end: Option<&str>) -> Result<u64, BackendError>;

    /// Begins watching every key under `prefix` for mutations.
    async fn watch(&self, prefix: &str) -> Result<Watcher, BackendError>;

    /// Checks connectivity to the backend.
    async fn ping(&self) -> Result<(), BackendError>;
}

/// Forwards to the wrapped backend, so callers can hold and share an
/// `Arc<dyn KvBackend>` (or an `Arc` of a concrete backend) without losing
/// access to the trait.
#[async_trait]
impl<T: KvBackend + ?Sized> KvBackend for Arc<T> {
    async fn range(&self, key: &str, range_end: Option<&str>) -> Result<Vec<KeyValue>, BackendError> {
        (**self).range(key, range_end).await
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), BackendError> {
        (**self).put(key, value).await
    }

    async fn delete_range(&self, key: &str, range_end: Option<&str>) -> Result<u64, BackendError> {
        (**self).delete_range(key, range_end).await
    }

    async fn watch(&self, prefix: &str) -> Result<Watcher, BackendError> {
        (**self).watch(prefix).await
    }

    async fn ping(&self) -> Result<(), BackendError> {
        (**self).ping().await
    }
}
