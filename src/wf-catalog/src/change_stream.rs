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

//! The change stream: turns the backend's raw watch events into
//! service-level [`ServiceChange`] notifications.
//!
//! Runs two cooperating tasks, per the concurrency model: a reader task
//! that owns the backend [`Watcher`] and only drains it, and a dispatcher
//! task that classifies events, tracks the believed-set of live services,
//! and forwards to the consumer. The stop signal unblocks the dispatcher,
//! which then signals the reader to tear down the backend watch.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use wf_backend::{BackendError, EventKind, KvBackend, WatchEvent, Watcher};
use wf_types::keys::{parse_key, ParsedKey};
use wf_types::model::{QueryOptions, ServiceChange, WatchOptions};

use crate::catalog::{all_services_prefix, Catalog};
use crate::error::CatalogError;

/// A live change subscription. Drop, or call [`ChangeStream::stop`], to
/// tear it down.
pub struct ChangeStream {
    pub changes: mpsc::Receiver<ServiceChange>,
    pub errors: mpsc::Receiver<CatalogError>,
    stop: oneshot::Sender<()>,
}

impl ChangeStream {
    /// Subscribes to catalog mutations. Seeds the believed-set with one
    /// `GetAllServices` call before the watch is established, then
    /// forwards live events as they arrive.
    pub async fn subscribe<B>(
        catalog: Arc<Catalog<B>>,
        opts: WatchOptions,
    ) -> Result<ChangeStream, CatalogError>
    where
        B: KvBackend + 'static,
    {
        let believed: HashSet<String> = catalog
            .get_all_services(QueryOptions::default())
            .await?
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        let watcher = catalog.backend().watch(&all_services_prefix()).await?;

        let (raw_tx, raw_rx) = mpsc::channel(256);
        let (changes_tx, changes_rx) = mpsc::channel(256);
        let (errors_tx, errors_rx) = mpsc::channel(16);
        let (stop_tx, stop_rx) = oneshot::channel();
        let (reader_cancel_tx, reader_cancel_rx) = oneshot::channel();

        wf_ore::task::spawn(|| "change-stream-reader".to_string(), run_reader(watcher, raw_tx, reader_cancel_rx));
        wf_ore::task::spawn(
            || "change-stream-dispatcher".to_string(),
            run_dispatcher(raw_rx, changes_tx, errors_tx, believed, opts, stop_rx, reader_cancel_tx),
        );

        Ok(ChangeStream {
            changes: changes_rx,
            errors: errors_rx,
            stop: stop_tx,
        })
    }

    /// Closes the stop signal, terminating the watcher and releasing
    /// backend resources.
    pub fn stop(self) {
        let _ = self.stop.send(());
    }
}

async fn run_reader(
    mut watcher: Watcher,
    raw_tx: mpsc::Sender<WatchEvent>,
    mut cancel_rx: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            biased;
            _ = &mut cancel_rx => break,
            event = watcher.events.recv() => {
                match event {
                    Some(event) => {
                        if raw_tx.send(event).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
    }
    watcher.cancel();
}

async fn run_dispatcher(
    mut raw_rx: mpsc::Receiver<WatchEvent>,
    changes_tx: mpsc::Sender<ServiceChange>,
    errors_tx: mpsc::Sender<CatalogError>,
    mut believed: HashSet<String>,
    opts: WatchOptions,
    mut stop_rx: oneshot::Receiver<()>,
    reader_cancel_tx: oneshot::Sender<()>,
) {
    loop {
        tokio::select! {
            biased;
            _ = &mut stop_rx => {
                let _ = reader_cancel_tx.send(());
                break;
            }
            event = raw_rx.recv() => {
                match event {
                    Some(event) => dispatch_one(event, &mut believed, opts, &changes_tx).await,
                    None => {
                        let _ = errors_tx
                            .send(CatalogError::Backend(BackendError::Request(
                                "watch stream ended unexpectedly".to_string(),
                            )))
                            .await;
                        break;
                    }
                }
            }
        }
    }
}

/// Classifies one raw event per the change stream's rules.
///
/// The original's directory-delete semantics (one event on the *directory*
/// node when a whole subtree is removed) have no equivalent in a flat
/// key/value backend, which reports one delete per leaf key actually
/// removed. A `DELETE` on a service's `details` key is therefore treated
/// the same as a `DELETE` on its (never-materialized) service root: it is
/// the leaf event that actually signals "this service is gone."
async fn dispatch_one(
    event: WatchEvent,
    believed: &mut HashSet<String>,
    opts: WatchOptions,
    changes_tx: &mpsc::Sender<ServiceChange>,
) {
    let send = |service_name: String, deleted: bool| {
        let changes_tx = changes_tx.clone();
        async move {
            let _ = changes_tx.send(ServiceChange { service_name, deleted }).await;
        }
    };

    match (event.kind, parse_key(&event.key)) {
        (EventKind::Delete, ParsedKey::Root) => {
            for service_name in believed.drain() {
                send(service_name, true).await;
            }
        }
        (EventKind::Delete, ParsedKey::ServiceRoot(service))
        | (EventKind::Delete, ParsedKey::ServiceDetails(service)) => {
            believed.remove(&service);
            send(service, true).await;
        }
        (EventKind::Set, ParsedKey::ServiceDetails(service)) => {
            believed.insert(service.clone());
            send(service, false).await;
        }
        (_, ParsedKey::Instance(service, _)) if opts.with_instance_changes => {
            send(service, false).await;
        }
        (_, ParsedKey::Rule(service, _)) if opts.with_rule_changes => {
            send(service, false).await;
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use wf_backend::local::LocalBackend;
    use wf_types::model::Service;

    use super::*;

    fn sample_service() -> Service {
        Service {
            address: None,
            instance_port: 80,
            protocol: "http".into(),
        }
    }

    #[tokio::test]
    async fn emits_set_on_new_service_and_delete_on_removal() {
        let catalog = Arc::new(Catalog::new(LocalBackend::new()));
        let mut stream = ChangeStream::subscribe(catalog.clone(), WatchOptions::default())
            .await
            .unwrap();

        catalog.add_service("s1", &sample_service()).await.unwrap();
        let change = stream.changes.recv().await.unwrap();
        assert_eq!(change, ServiceChange { service_name: "s1".into(), deleted: false });

        catalog.remove_service("s1").await.unwrap();
        let change = stream.changes.recv().await.unwrap();
        assert_eq!(change, ServiceChange { service_name: "s1".into(), deleted: true });
    }

    #[tokio::test]
    async fn ignores_instance_changes_unless_requested() {
        let catalog = Arc::new(Catalog::new(LocalBackend::new()));
        let mut stream = ChangeStream::subscribe(catalog.clone(), WatchOptions::default())
            .await
            .unwrap();

        catalog.add_service("s1", &sample_service()).await.unwrap();
        assert_eq!(stream.changes.recv().await.unwrap().service_name, "s1");

        catalog
            .add_instance(
                "s1",
                "i1",
                &wf_types::model::Instance {
                    host_ip: "10.0.0.1".parse().unwrap(),
                    address: wf_types::model::IpPort {
                        ip: "10.0.0.1".parse().unwrap(),
                        port: 80,
                    },
                    rule: None,
                    labels: Default::default(),
                },
            )
            .await
            .unwrap();

        let saw_nothing = tokio::time::timeout(Duration::from_millis(50), stream.changes.recv()).await;
        assert!(saw_nothing.is_err(), "expected no notification for an ignored instance change");
    }

    #[tokio::test]
    async fn seeds_believed_set_before_live_events() {
        let catalog = Arc::new(Catalog::new(LocalBackend::new()));
        catalog.add_service("pre-existing", &sample_service()).await.unwrap();

        let stream = ChangeStream::subscribe(catalog.clone(), WatchOptions::default())
            .await
            .unwrap();
        stream.stop();
    }
}
