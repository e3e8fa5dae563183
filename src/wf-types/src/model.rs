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

//! The catalog's data model (service, instance, container rule) and the
//! aggregate and event types built from it.

use std::collections::BTreeMap;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};

/// Distinguished label keys, read by `svc query`'s `--host`/`--state`/
/// `--rule` selector.
pub mod labels {
    /// The instance's health/lifecycle state, e.g. `"live"`.
    pub const STATE: &str = "state";
    /// The identity of the host the instance runs on.
    pub const HOST: &str = "host";
    /// The name of the container rule that matched the instance.
    pub const RULE: &str = "rule";
}

/// An IP address plus a port, the unit of addressing used throughout the
/// catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IpPort {
    pub ip: IpAddr,
    pub port: u16,
}

impl std::fmt::Display for IpPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.ip {
            IpAddr::V4(ip) => write!(f, "{ip}:{}", self.port),
            IpAddr::V6(ip) => write!(f, "[{ip}]:{}", self.port),
        }
    }
}

/// A logical, routable destination: a virtual address, the port its
/// instances listen on, and a wire protocol tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    /// The address clients should use to reach this service, if it has a
    /// stable virtual address.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub address: Option<IpPort>,
    /// The port each instance of this service listens on.
    #[serde(rename = "instancePort")]
    pub instance_port: u16,
    /// A free-form wire protocol tag. `"tcp"` and `"http"` are expected but
    /// not enforced.
    pub protocol: String,
}

/// A named label selector. Matching instances against a rule's `selector`
/// is the responsibility of an external reconciler; the catalog treats
/// rules as opaque payloads.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ContainerRule {
    pub selector: BTreeMap<String, String>,
}

/// A concrete backend endpoint implementing a service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    /// The host the instance runs on.
    #[serde(rename = "hostIP")]
    pub host_ip: IpAddr,
    /// The address to dispatch requests to.
    pub address: IpPort,
    /// The name of the [`ContainerRule`] that matched this instance, if
    /// any.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub rule: Option<String>,
    /// Arbitrary labels, including the distinguished keys in [`labels`].
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl Instance {
    /// Looks up a label by key, returning `""` if absent (matching the
    /// original's `Label` accessor, which callers use to build display
    /// strings without handling `Option`).
    pub fn label(&self, key: &str) -> &str {
        self.labels.get(key).map(String::as_str).unwrap_or("")
    }
}

/// The full result of a service query: the service record plus, depending
/// on the caller's [`QueryOptions`], its instances and container rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInfo {
    #[serde(flatten)]
    pub service: Service,
    #[serde(skip_serializing_if = "is_none_or_empty", default)]
    pub instances: Option<BTreeMap<String, Instance>>,
    #[serde(
        skip_serializing_if = "is_none_or_empty",
        default,
        rename = "groups"
    )]
    pub rules: Option<BTreeMap<String, ContainerRule>>,
}

/// Per §6, `instances`/`groups` are omitted from the wire encoding both
/// when absent and when present but empty.
fn is_none_or_empty<K, V>(map: &Option<BTreeMap<K, V>>) -> bool {
    map.as_ref().map_or(true, BTreeMap::is_empty)
}

impl ServiceInfo {
    fn empty(service: Service, opts: QueryOptions) -> ServiceInfo {
        ServiceInfo {
            service,
            instances: opts.with_instances.then(BTreeMap::new),
            rules: opts.with_rules.then(BTreeMap::new),
        }
    }
}

/// Which parts of a [`ServiceInfo`] a caller wants populated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueryOptions {
    pub with_instances: bool,
    pub with_rules: bool,
}

impl QueryOptions {
    pub fn all() -> QueryOptions {
        QueryOptions {
            with_instances: true,
            with_rules: true,
        }
    }

    /// Builds the empty [`ServiceInfo`] a parser should open when it first
    /// sees a service's `details` key, with `instances`/`rules` present
    /// (as empty maps) only if requested.
    pub fn new_service_info(&self, service: Service) -> ServiceInfo {
        ServiceInfo::empty(service, *self)
    }
}

/// Options controlling which mutations the change stream reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WatchOptions {
    pub with_instance_changes: bool,
    pub with_rule_changes: bool,
}

/// A coarse delta: `deleted = true` asserts the named service no longer
/// exists; `deleted = false` asserts that *something* at or below the
/// service changed, and the consumer must re-read to reconcile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceChange {
    #[serde(rename = "serviceName")]
    pub service_name: String,
    pub deleted: bool,
}
