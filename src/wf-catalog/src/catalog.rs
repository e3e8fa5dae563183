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

//! The service catalog: the public read/write surface over a
//! [`KvBackend`], built entirely out of the key schema and the snapshot
//! parser.

use wf_backend::KvBackend;
use wf_types::keys::{self, instance_key, rule_key, service_details_key, service_root_key};
use wf_types::model::{ContainerRule, Instance, QueryOptions, Service, ServiceInfo};

use crate::error::CatalogError;
use crate::parser::parse_snapshot;

pub(crate) fn all_services_prefix() -> String {
    format!("{}service/", keys::ROOT)
}

fn service_subtree_prefix(service: &str) -> String {
    format!("{}/", service_root_key(service))
}

/// The catalog, parameterized over the backend it stores data in.
pub struct Catalog<B> {
    backend: B,
}

impl<B: KvBackend> Catalog<B> {
    pub fn new(backend: B) -> Catalog<B> {
        Catalog { backend }
    }

    /// Succeeds iff any key under `service/<svc>/` exists.
    pub async fn check_registered_service(&self, service: &str) -> Result<(), CatalogError> {
        let prefix = service_subtree_prefix(service);
        let end = keys::upper_bound(&prefix);
        let kvs = self.backend.range(&prefix, end.as_deref()).await?;
        if kvs.is_empty() {
            Err(CatalogError::NotFound)
        } else {
            Ok(())
        }
    }

    /// Writes `service/<svc>/details`. Idempotent overwrite.
    pub async fn add_service(&self, service: &str, definition: &Service) -> Result<(), CatalogError> {
        let value = serde_json::to_vec(definition)?;
        self.backend.put(&service_details_key(service), value).await?;
        Ok(())
    }

    /// Prefix-deletes `service/<svc>/`. Fails with `NotFound` iff nothing
    /// was deleted.
    pub async fn remove_service(&self, service: &str) -> Result<(), CatalogError> {
        let prefix = service_subtree_prefix(service);
        let end = keys::upper_bound(&prefix);
        let deleted = self.backend.delete_range(&prefix, end.as_deref()).await?;
        if deleted == 0 {
            Err(CatalogError::NotFound)
        } else {
            Ok(())
        }
    }

    /// Prefix-deletes `service/`.
    pub async fn remove_all_services(&self) -> Result<(), CatalogError> {
        let prefix = all_services_prefix();
        let end = keys::upper_bound(&prefix);
        self.backend.delete_range(&prefix, end.as_deref()).await?;
        Ok(())
    }

    /// Writes `service/<svc>/groupspec/<rule>`.
    pub async fn set_container_rule(
        &self,
        service: &str,
        rule: &str,
        spec: &ContainerRule,
    ) -> Result<(), CatalogError> {
        let value = serde_json::to_vec(spec)?;
        self.backend.put(&rule_key(service, rule), value).await?;
        Ok(())
    }

    /// Deletes `service/<svc>/groupspec/<rule>`; the deleted count is
    /// ignored.
    pub async fn remove_container_rule(&self, service: &str, rule: &str) -> Result<(), CatalogError> {
        self.backend.delete_range(&rule_key(service, rule), None).await?;
        Ok(())
    }

    /// Writes `service/<svc>/instance/<inst>`.
    pub async fn add_instance(
        &self,
        service: &str,
        instance: &str,
        value: &Instance,
    ) -> Result<(), CatalogError> {
        let payload = serde_json::to_vec(value)?;
        self.backend.put(&instance_key(service, instance), payload).await?;
        Ok(())
    }

    /// Deletes `service/<svc>/instance/<inst>`. Fails with `NotFound` iff
    /// nothing was deleted.
    pub async fn remove_instance(&self, service: &str, instance: &str) -> Result<(), CatalogError> {
        let deleted = self
            .backend
            .delete_range(&instance_key(service, instance), None)
            .await?;
        if deleted == 0 {
            Err(CatalogError::NotFound)
        } else {
            Ok(())
        }
    }

    /// Prefix-range over `service/<svc>/`, parsed to a single
    /// [`ServiceInfo`]. `NotFound` on an empty range.
    pub async fn get_service(&self, service: &str, opts: QueryOptions) -> Result<ServiceInfo, CatalogError> {
        let prefix = service_subtree_prefix(service);
        let end = keys::upper_bound(&prefix);
        let kvs = self.backend.range(&prefix, end.as_deref()).await?;
        let mut parsed = parse_snapshot(&kvs, opts)?;
        match parsed.pop() {
            Some((_, info)) => Ok(info),
            None => Err(CatalogError::NotFound),
        }
    }

    /// Prefix-range over `service/`, parsed to every service present.
    pub async fn get_all_services(
        &self,
        opts: QueryOptions,
    ) -> Result<Vec<(String, ServiceInfo)>, CatalogError> {
        let prefix = all_services_prefix();
        let end = keys::upper_bound(&prefix);
        let kvs = self.backend.range(&prefix, end.as_deref()).await?;
        Ok(parse_snapshot(&kvs, opts)?)
    }

    /// Exposes the underlying backend, for collaborators (e.g. the change
    /// stream) that need to watch it directly.
    pub fn backend(&self) -> &B {
        &self.backend
    }
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::Arc;

    use wf_backend::local::LocalBackend;
    use wf_types::model::IpPort;

    use super::*;

    fn sample_service() -> Service {
        Service {
            address: None,
            instance_port: 80,
            protocol: "http".into(),
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

    fn catalog() -> Catalog<Arc<LocalBackend>> {
        Catalog::new(LocalBackend::new())
    }

    #[tokio::test]
    async fn round_trips_service_instance_and_rule() {
        let cat = catalog();
        cat.add_service("s1", &sample_service()).await.unwrap();
        cat.add_instance("s1", "i1", &sample_instance()).await.unwrap();
        cat.set_container_rule("s1", "r1", &ContainerRule::default()).await.unwrap();

        let info = cat.get_service("s1", QueryOptions::all()).await.unwrap();
        assert!(info.instances.unwrap().contains_key("i1"));
        assert!(info.rules.unwrap().contains_key("r1"));

        cat.remove_service("s1").await.unwrap();
        assert!(matches!(
            cat.get_service("s1", QueryOptions::all()).await,
            Err(CatalogError::NotFound)
        ));
    }

    #[tokio::test]
    async fn check_registered_service_reports_not_found() {
        let cat = catalog();
        assert!(matches!(
            cat.check_registered_service("missing").await,
            Err(CatalogError::NotFound)
        ));
        cat.add_service("present", &sample_service()).await.unwrap();
        cat.check_registered_service("present").await.unwrap();
    }

    #[tokio::test]
    async fn remove_instance_reports_not_found_on_miss() {
        let cat = catalog();
        assert!(matches!(
            cat.remove_instance("s1", "ghost").await,
            Err(CatalogError::NotFound)
        ));
    }

    #[tokio::test]
    async fn get_all_services_collects_every_service() {
        let cat = catalog();
        cat.add_service("a", &sample_service()).await.unwrap();
        cat.add_service("b", &sample_service()).await.unwrap();
        let all = cat.get_all_services(QueryOptions::default()).await.unwrap();
        assert_eq!(all.iter().map(|(n, _)| n.as_str()).collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn remove_all_services_clears_the_catalog() {
        let cat = catalog();
        cat.add_service("a", &sample_service()).await.unwrap();
        cat.add_service("b", &sample_service()).await.unwrap();
        cat.remove_all_services().await.unwrap();
        assert!(cat.get_all_services(QueryOptions::default()).await.unwrap().is_empty());
    }
}
