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

//! Implementations of the `svc` subcommands: thin wrappers over
//! [`wf_catalog::Catalog`], in the spirit of the original `fluxctl query`
//! command (tabular output by default, `--quiet` for bare names, `--json`
//! for machine-readable rows, `--host`/`--state`/`--rule` to select a
//! subset of instances).

use std::sync::Arc;

use serde::Serialize;
use wf_backend::KvBackend;
use wf_catalog::{Catalog, CatalogError};
use wf_types::model::{labels, Instance, IpPort, QueryOptions, Service};

use crate::cli::SvcAction;

/// A label-based filter over instances, in the spirit of `fluxctl query`'s
/// selector: an instance is included only if it matches every criterion
/// that was actually set.
#[derive(Debug, Default, Clone)]
struct Selector {
    host: Option<String>,
    state: Option<String>,
    rule: Option<String>,
}

impl Selector {
    fn includes(&self, instance: &Instance) -> bool {
        self.host.as_deref().map_or(true, |v| instance.label(labels::HOST) == v)
            && self.state.as_deref().map_or(true, |v| instance.label(labels::STATE) == v)
            && self.rule.as_deref().map_or(true, |v| instance.label(labels::RULE) == v)
    }
}

#[derive(Serialize)]
struct InstanceForFormat<'a> {
    service: &'a str,
    name: &'a str,
    state: &'a str,
    address: String,
    #[serde(rename = "hostIP")]
    host_ip: std::net::IpAddr,
}

pub async fn run(catalog: &Catalog<Arc<dyn KvBackend>>, action: SvcAction) -> Result<(), CatalogError> {
    match action {
        SvcAction::Query { service, host, state, rule, quiet, json } => {
            let selector = Selector { host, state, rule };
            query(catalog, service, selector, quiet, json).await
        }
        SvcAction::AddService { service, instance_port, protocol } => {
            catalog
                .add_service(&service, &Service { address: None, instance_port, protocol })
                .await
        }
        SvcAction::RmService { service } => catalog.remove_service(&service).await,
        SvcAction::AddInstance { service, instance, host_ip, address } => {
            let value = Instance {
                host_ip,
                address: IpPort { ip: address.ip(), port: address.port() },
                rule: None,
                labels: Default::default(),
            };
            catalog.add_instance(&service, &instance, &value).await
        }
    }
}

async fn query(
    catalog: &Catalog<Arc<dyn KvBackend>>,
    service: Option<String>,
    selector: Selector,
    quiet: bool,
    json: bool,
) -> Result<(), CatalogError> {
    let opts = QueryOptions { with_instances: true, with_rules: false };
    let services = match service {
        Some(name) => vec![(name.clone(), catalog.get_service(&name, opts).await?)],
        None => catalog.get_all_services(opts).await?,
    };

    if !quiet && !json {
        println!("SERVICE\tINSTANCE\tADDRESS\tSTATE");
    }
    for (service_name, info) in services {
        let Some(instances) = info.instances else { continue };
        for (instance_name, instance) in instances {
            if !selector.includes(&instance) {
                continue;
            }
            if json {
                let row = InstanceForFormat {
                    service: &service_name,
                    name: &instance_name,
                    state: instance.label(labels::STATE),
                    address: instance.address.to_string(),
                    host_ip: instance.host_ip,
                };
                println!("{}", serde_json::to_string(&row)?);
            } else if quiet {
                println!("{instance_name}");
            } else {
                let state = instance.label(labels::STATE);
                println!("{service_name}\t{instance_name}\t{}\t{state}", instance.address);
            }
        }
    }
    Ok(())
}
