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

//! The snapshot parser: turns an ordered range scan over one or many
//! service subtrees into a sequence of [`ServiceInfo`] values, one per
//! distinct service name, in the order their `details` keys appear.
//!
//! This is a straight-line streaming cursor, not a real `Iterator` adapter,
//! mirroring the Go `serviceParser` it is ported from: open a new entry on
//! each `details` key, accumulate on instance/rule keys, close the entry
//! when the next `details` key (or the end of input) is seen.

use wf_backend::KeyValue;
use wf_types::keys::{parse_key, ParsedKey};
use wf_types::model::{QueryOptions, Service, ServiceInfo};

use crate::error::CatalogError;

/// Parses an ordered sequence of key/value pairs into `(serviceName,
/// ServiceInfo)` pairs. `kvs` must be lexicographically ordered by key, as
/// a [`wf_backend::KvBackend::range`] call returns them.
pub fn parse_snapshot(
    kvs: &[KeyValue],
    opts: QueryOptions,
) -> Result<Vec<(String, ServiceInfo)>, CatalogError> {
    let mut results = Vec::new();
    let mut current: Option<(String, ServiceInfo)> = None;

    for kv in kvs {
        match parse_key(&kv.key) {
            ParsedKey::ServiceDetails(service) => {
                if let Some(finished) = current.take() {
                    results.push(finished);
                }
                let value: Service = serde_json::from_slice(&kv.value)?;
                current = Some((service.clone(), opts.new_service_info(value)));
            }
            ParsedKey::Instance(service, instance) => {
                let info = require_open(&mut current, &service)?;
                if opts.with_instances {
                    let value = serde_json::from_slice(&kv.value)?;
                    info.instances
                        .get_or_insert_with(Default::default)
                        .insert(instance, value);
                }
            }
            ParsedKey::Rule(service, rule) => {
                let info = require_open(&mut current, &service)?;
                if opts.with_rules {
                    let value = serde_json::from_slice(&kv.value)?;
                    info.rules.get_or_insert_with(Default::default).insert(rule, value);
                }
            }
            _ => {
                return Err(CatalogError::ParseInconsistency(format!(
                    "unknown key {:?}",
                    kv.key
                )))
            }
        }
    }
    if let Some(finished) = current.take() {
        results.push(finished);
    }
    Ok(results)
}

fn require_open<'a>(
    current: &'a mut Option<(String, ServiceInfo)>,
    service: &str,
) -> Result<&'a mut ServiceInfo, CatalogError> {
    match current {
        Some((name, _)) if name != service => Err(CatalogError::ParseInconsistency(format!(
            "inconsistent service names: {name:?}, {service:?}"
        ))),
        Some((_, info)) => Ok(info),
        None => Err(CatalogError::ParseInconsistency(format!(
            "key for service {service:?} seen before its details key"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr};

    use wf_types::model::{ContainerRule, Instance, IpPort};
    use wf_types::keys::{instance_key, rule_key, service_details_key};

    use super::*;

    fn kv(key: &str, value: impl serde::Serialize) -> KeyValue {
        KeyValue {
            key: key.to_string(),
            value: serde_json::to_vec(&value).unwrap(),
        }
    }

    fn sample_instance() -> Instance {
        Instance {
            host_ip: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
            address: IpPort {
                ip: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
                port: 8080,
            },
            rule: None,
            labels: Default::default(),
        }
    }

    #[test]
    fn parses_one_service_with_instance_and_rule() {
        let svc = Service {
            address: None,
            instance_port: 80,
            protocol: "http".into(),
        };
        let kvs = vec![
            kv(&service_details_key("web"), &svc),
            kv(&instance_key("web", "i1"), sample_instance()),
            kv(&rule_key("web", "r1"), ContainerRule::default()),
        ];

        let parsed = parse_snapshot(&kvs, QueryOptions::all()).unwrap();
        assert_eq!(parsed.len(), 1);
        let (name, info) = &parsed[0];
        assert_eq!(name, "web");
        assert!(info.instances.as_ref().unwrap().contains_key("i1"));
        assert!(info.rules.as_ref().unwrap().contains_key("r1"));
    }

    #[test]
    fn splits_on_each_details_key() {
        let svc = Service {
            address: None,
            instance_port: 80,
            protocol: "tcp".into(),
        };
        let kvs = vec![
            kv(&service_details_key("a"), &svc),
            kv(&instance_key("a", "i1"), sample_instance()),
            kv(&service_details_key("b"), &svc),
        ];
        let parsed = parse_snapshot(&kvs, QueryOptions::all()).unwrap();
        assert_eq!(parsed.iter().map(|(n, _)| n.as_str()).collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(parsed[0].1.instances.as_ref().unwrap().len(), 1);
        assert_eq!(parsed[1].1.instances.as_ref().unwrap().len(), 0);
    }

    #[test]
    fn omits_instances_and_rules_when_not_requested() {
        let svc = Service {
            address: None,
            instance_port: 80,
            protocol: "http".into(),
        };
        let kvs = vec![
            kv(&service_details_key("web"), &svc),
            kv(&instance_key("web", "i1"), sample_instance()),
        ];
        let parsed = parse_snapshot(&kvs, QueryOptions::default()).unwrap();
        assert!(parsed[0].1.instances.is_none());
    }

    #[test]
    fn rejects_mismatched_service_name() {
        let svc = Service {
            address: None,
            instance_port: 80,
            protocol: "http".into(),
        };
        let kvs = vec![
            kv(&service_details_key("a"), &svc),
            kv(&instance_key("b", "i1"), sample_instance()),
        ];
        assert!(matches!(
            parse_snapshot(&kvs, QueryOptions::all()),
            Err(CatalogError::ParseInconsistency(_))
        ));
    }

    #[test]
    fn rejects_unknown_keys() {
        let kvs = vec![kv("/weave-flux/bogus", "x")];
        assert!(matches!(
            parse_snapshot(&kvs, QueryOptions::all()),
            Err(CatalogError::ParseInconsistency(_))
        ));
    }
}
