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

//! The `serve` subcommand: reconciles one [`InstancePool`] per service
//! against live catalog changes, ticks retries, and serves the HTTP
//! surface.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use prometheus::{IntCounter, IntGaugeVec, Opts};
use wf_backend::KvBackend;
use wf_catalog::{Catalog, CatalogError, ChangeStream};
use wf_ore::metrics::MetricsRegistry;
use wf_ore::task::{AbortOnDropHandle, JoinHandleExt};
use wf_pool::{InstancePool, RetryPolicy, SystemClock};
use wf_types::model::{QueryOptions, WatchOptions};

use crate::cli::ServeArgs;
use crate::http::{self, AppState};

type Pools = Arc<Mutex<HashMap<String, Arc<InstancePool>>>>;

pub async fn run(args: ServeArgs, local: bool) -> Result<(), anyhow::Error> {
    let backend = crate::backend::bootstrap(local).await?;
    let catalog = Arc::new(Catalog::new(backend.clone()));
    let policy = RetryPolicy {
        base_millis: args.retry_base_millis,
        cap_exponent: args.retry_cap_exponent,
    };

    let metrics = MetricsRegistry::new();
    let reconciled_total = IntCounter::new(
        "wf_balancerd_reconciled_total",
        "Service changes processed by the reconciler",
    )?;
    metrics.register(Box::new(reconciled_total.clone()));
    let pool_instances = IntGaugeVec::new(
        Opts::new("wf_balancerd_pool_instances", "Instances per pool, by health state"),
        &["service", "state"],
    )?;
    metrics.register(Box::new(pool_instances.clone()));

    let pools: Pools = Arc::new(Mutex::new(HashMap::new()));
    seed_pools(&catalog, &pools, policy).await?;

    let mut change_stream = ChangeStream::subscribe(
        catalog.clone(),
        WatchOptions { with_instance_changes: true, with_rule_changes: false },
    )
    .await?;
    // Take the receivers out and keep `change_stream` itself alive for the
    // rest of this function: dropping it closes its stop channel and
    // tears the watch down immediately.
    let mut changes = std::mem::replace(&mut change_stream.changes, tokio::sync::mpsc::channel(1).1);
    let mut errors = std::mem::replace(&mut change_stream.errors, tokio::sync::mpsc::channel(1).1);

    // Kept alive for the rest of this function: if the HTTP server below
    // ever returns (on bind or serve error), dropping these aborts the
    // reconciler, error-drainer, and retry ticker instead of leaving them
    // running against a daemon that's shutting down.
    let mut background: Vec<AbortOnDropHandle<()>> = Vec::new();

    background.push(
        wf_ore::task::spawn(
            || "reconciler".to_string(),
            {
                let catalog = catalog.clone();
                let pools = pools.clone();
                async move {
                    while let Some(change) = changes.recv().await {
                        reconciled_total.inc();
                        reconcile_one(&catalog, &pools, policy, change).await;
                    }
                }
            },
        )
        .abort_on_drop(),
    );

    background.push(
        wf_ore::task::spawn(|| "change-stream-errors".to_string(), async move {
            while let Some(err) = errors.recv().await {
                tracing::warn!(error = %err, "change stream reported a backend error");
            }
        })
        .abort_on_drop(),
    );

    background.push(
        wf_ore::task::spawn(
            || "retry-ticker".to_string(),
            retry_ticker(pools, pool_instances, Duration::from_millis(args.retry_tick_millis)),
        )
        .abort_on_drop(),
    );

    let state = Arc::new(AppState { metrics, backend });
    tracing::info!(addr = %args.http_listen_addr, "listening");
    axum::Server::bind(&args.http_listen_addr)
        .serve(http::router(state).into_make_service())
        .await?;
    drop(background);
    Ok(())
}

async fn seed_pools(
    catalog: &Catalog<Arc<dyn KvBackend>>,
    pools: &Pools,
    policy: RetryPolicy,
) -> Result<(), CatalogError> {
    let opts = QueryOptions { with_instances: true, with_rules: false };
    let mut pools = pools.lock().expect("pools mutex poisoned");
    for (name, info) in catalog.get_all_services(opts).await? {
        let pool = Arc::new(InstancePool::with_policy(SystemClock, policy));
        pool.update_instances(info.instances.unwrap_or_default());
        pools.insert(name, pool);
    }
    Ok(())
}

async fn reconcile_one(
    catalog: &Catalog<Arc<dyn KvBackend>>,
    pools: &Pools,
    policy: RetryPolicy,
    change: wf_types::model::ServiceChange,
) {
    if change.deleted {
        pools.lock().expect("pools mutex poisoned").remove(&change.service_name);
        return;
    }
    let opts = QueryOptions { with_instances: true, with_rules: false };
    match catalog.get_service(&change.service_name, opts).await {
        Ok(info) => {
            let mut pools = pools.lock().expect("pools mutex poisoned");
            let pool = pools
                .entry(change.service_name.clone())
                .or_insert_with(|| Arc::new(InstancePool::with_policy(SystemClock, policy)));
            pool.update_instances(info.instances.unwrap_or_default());
        }
        Err(CatalogError::NotFound) => {
            pools.lock().expect("pools mutex poisoned").remove(&change.service_name);
        }
        Err(err) => {
            tracing::warn!(service = %change.service_name, error = %err, "reconcile failed");
        }
    }
}

async fn retry_ticker(pools: Pools, pool_instances: IntGaugeVec, period: Duration) {
    let mut interval = tokio::time::interval(period);
    loop {
        interval.tick().await;
        let pools = pools.lock().expect("pools mutex poisoned");
        for (service, pool) in pools.iter() {
            pool.process_retries();
            let (ready, failed, retrying) = pool.counts();
            pool_instances.with_label_values(&[service, "ready"]).set(ready as i64);
            pool_instances.with_label_values(&[service, "failed"]).set(failed as i64);
            pool_instances.with_label_values(&[service, "retrying"]).set(retrying as i64);
        }
    }
}
