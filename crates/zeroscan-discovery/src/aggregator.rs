//! Host Aggregator
//!
//! Folds resolved instances into hosts keyed by their address set. Two
//! instances that resolved to the same addresses end up as two services on
//! one host; different address sets are never merged.

use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::{debug, trace};

use crate::txt;
use crate::types::{DiscoveredInstance, Host, Service};

/// Host table, in creation order
#[derive(Debug, Default)]
struct HostTable {
    order: Vec<String>,
    hosts: HashMap<String, Host>,
}

/// Builds [`Host`] records from resolved instances
#[derive(Debug, Default)]
pub struct HostAggregator {
    table: Mutex<HostTable>,
}

impl HostAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one instance as a service on its host, creating the host on first
    /// sight of its address set.
    ///
    /// Returns true if a new host was created.
    pub fn add_instance(&self, instance: &DiscoveredInstance) -> bool {
        let key = instance.host_key();
        let service = Service {
            name: instance.service_name(),
            instance: instance.name.clone(),
            hostname: instance.hostname.clone(),
            port: instance.port,
            resolved_at: instance.resolved_at,
            properties: txt::parse_properties(instance.txt.as_deref()),
        };

        let mut table = self.table.lock();
        let created = !table.hosts.contains_key(&key);
        if created {
            debug!(host = %key, name = %instance.name, "New host");
            table.order.push(key.clone());
        }

        let host = table.hosts.entry(key).or_insert_with(|| Host {
            id: instance
                .addresses
                .first()
                .map(ToString::to_string)
                .unwrap_or_default(),
            display_name: instance.name.clone(),
            ip_addresses: instance.addresses.clone(),
            services: Vec::new(),
        });

        trace!(
            host = %host.id,
            service = %service.name,
            port = service.port,
            properties = service.properties.len(),
            "Adding service"
        );
        host.services.push(service);

        created
    }

    /// Snapshot of every host built so far, in creation order
    pub fn results(&self) -> Vec<Host> {
        let table = self.table.lock();
        table
            .order
            .iter()
            .filter_map(|key| table.hosts.get(key).cloned())
            .collect()
    }

    pub fn host_count(&self) -> usize {
        self.table.lock().hosts.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::txt::encode_pairs;
    use crate::types::{Advertisement, Resolution};
    use bytes::Bytes;
    use std::net::{IpAddr, Ipv4Addr};

    fn instance(name: &str, ty: &str, ips: &[[u8; 4]], port: u16, txt: Option<Bytes>) -> DiscoveredInstance {
        let addresses = ips
            .iter()
            .map(|ip| IpAddr::V4(Ipv4Addr::from(*ip)))
            .collect();
        DiscoveredInstance::new(
            &Advertisement::new(name, ty, "local."),
            Resolution {
                hostname: format!("{}.local.", name),
                addresses,
                port,
                txt,
            },
        )
    }

    #[test]
    fn test_same_address_set_shares_host() {
        let aggregator = HostAggregator::new();
        assert!(aggregator.add_instance(&instance("box", "_http._tcp.", &[[10, 0, 0, 5]], 80, None)));
        assert!(!aggregator.add_instance(&instance("box-ssh", "_ssh._tcp.", &[[10, 0, 0, 5]], 22, None)));

        let hosts = aggregator.results();
        assert_eq!(hosts.len(), 1);
        assert_eq!(hosts[0].id, "10.0.0.5");
        assert_eq!(hosts[0].display_name, "box");
        assert_eq!(hosts[0].services.len(), 2);
        assert_eq!(hosts[0].services[0].name, "_http._tcp.local.");
        assert_eq!(hosts[0].services[1].name, "_ssh._tcp.local.");
        assert_eq!(hosts[0].services[1].port, 22);
        assert_eq!(hosts[0].services[1].instance, "box-ssh");
        assert_eq!(hosts[0].services[1].hostname, "box-ssh.local.");
    }

    #[test]
    fn test_overlapping_address_sets_stay_separate() {
        let aggregator = HostAggregator::new();
        aggregator.add_instance(&instance("a", "_http._tcp.", &[[10, 0, 0, 5]], 80, None));
        aggregator.add_instance(&instance("b", "_http._tcp.", &[[10, 0, 0, 5], [10, 0, 0, 6]], 80, None));

        let hosts = aggregator.results();
        assert_eq!(hosts.len(), 2);
        assert_eq!(hosts[1].ip_addresses.len(), 2);
        assert_eq!(hosts[1].id, "10.0.0.5");
    }

    #[test]
    fn test_properties_parsed_from_txt() {
        let aggregator = HostAggregator::new();
        let txt = encode_pairs([("path", "/api"), ("secure", "true")]);
        aggregator.add_instance(&instance("api", "_http._tcp.", &[[10, 0, 0, 7]], 8080, Some(txt)));

        let hosts = aggregator.results();
        let service = hosts[0].service("_http._tcp.local.").unwrap();
        assert_eq!(service.property("path"), Some("/api"));
        assert_eq!(service.property("secure"), Some("true"));
        assert_eq!(service.properties.len(), 2);
    }

    #[test]
    fn test_malformed_txt_still_creates_service() {
        let aggregator = HostAggregator::new();
        let txt = Bytes::from_static(b"\x20truncated");
        aggregator.add_instance(&instance("odd", "_http._tcp.", &[[10, 0, 0, 8]], 80, Some(txt)));

        let hosts = aggregator.results();
        assert_eq!(hosts[0].services.len(), 1);
        assert!(hosts[0].services[0].properties.is_empty());
    }

    #[test]
    fn test_results_keep_creation_order() {
        let aggregator = HostAggregator::new();
        for last in [9u8, 3, 7] {
            aggregator.add_instance(&instance("h", "_http._tcp.", &[[10, 0, 0, last]], 80, None));
        }

        let ids: Vec<_> = aggregator.results().into_iter().map(|h| h.id).collect();
        assert_eq!(ids, vec!["10.0.0.9", "10.0.0.3", "10.0.0.7"]);
        assert_eq!(aggregator.host_count(), 3);
    }
}
