//! Types for advertisements, resolved instances and aggregated hosts

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::IpAddr;

/// One service announcement as delivered by a browse, before resolution
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Advertisement {
    /// Instance name (e.g. "Living Room Printer")
    pub name: String,

    /// Service type (e.g. "_ipp._tcp.")
    pub service_type: String,

    /// Domain (e.g. "local.")
    pub domain: String,

    /// Addresses, when the backend already knows them at announcement time
    #[serde(default)]
    pub addresses: Vec<IpAddr>,
}

impl Advertisement {
    pub fn new(
        name: impl Into<String>,
        service_type: impl Into<String>,
        domain: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            service_type: service_type.into(),
            domain: domain.into(),
            addresses: Vec::new(),
        }
    }

    pub fn with_addresses(mut self, addresses: impl IntoIterator<Item = IpAddr>) -> Self {
        self.addresses = addresses.into_iter().collect();
        self
    }

    /// Service type and domain joined, e.g. "_ipp._tcp.local."
    pub fn service_name(&self) -> String {
        format!("{}{}", self.service_type, self.domain)
    }

    /// DNS-SD service instance name, e.g. "printer._ipp._tcp.local."
    pub fn fullname(&self) -> String {
        format!("{}.{}{}", self.name, self.service_type, self.domain)
    }

    /// Identity that survives resolution: name, type and domain
    pub fn identity(&self) -> String {
        self.fullname()
    }
}

/// Outcome of resolving an advertisement
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    /// Target hostname from the SRV record
    pub hostname: String,

    /// Resolved addresses
    pub addresses: Vec<IpAddr>,

    /// Service port
    pub port: u16,

    /// Raw TXT payload, if any was published
    pub txt: Option<Bytes>,
}

/// A resolved advertisement held in a session's instance table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredInstance {
    pub name: String,
    pub service_type: String,
    pub domain: String,
    pub hostname: String,
    pub port: u16,

    /// Resolved addresses in canonical (sorted, unique) order
    pub addresses: Vec<IpAddr>,

    /// Raw TXT payload
    pub txt: Option<Bytes>,

    /// When the resolution completed
    pub resolved_at: DateTime<Utc>,
}

impl DiscoveredInstance {
    /// Combines an advertisement with its resolution. Addresses carried by the
    /// advertisement are used only when the resolution found none.
    pub fn new(advertisement: &Advertisement, resolution: Resolution) -> Self {
        let addresses = if resolution.addresses.is_empty() {
            canonical_addresses(&advertisement.addresses)
        } else {
            canonical_addresses(&resolution.addresses)
        };

        Self {
            name: advertisement.name.clone(),
            service_type: advertisement.service_type.clone(),
            domain: advertisement.domain.clone(),
            hostname: resolution.hostname,
            port: resolution.port,
            addresses,
            txt: resolution.txt,
            resolved_at: Utc::now(),
        }
    }

    pub fn service_name(&self) -> String {
        format!("{}{}", self.service_type, self.domain)
    }

    /// Canonical identity of the resolved address set
    pub fn host_key(&self) -> String {
        ip_set_key(&self.addresses)
    }

    /// Instance table key: address set plus service name
    pub fn key(&self) -> String {
        format!("{}:{}", self.host_key(), self.service_name())
    }

    /// Returns true if this instance came from the given advertisement
    pub fn is_from(&self, advertisement: &Advertisement) -> bool {
        self.name == advertisement.name
            && self.service_type == advertisement.service_type
            && self.domain == advertisement.domain
    }
}

/// Sorts and deduplicates an address list
pub fn canonical_addresses(addresses: &[IpAddr]) -> Vec<IpAddr> {
    let mut sorted = addresses.to_vec();
    sorted.sort();
    sorted.dedup();
    sorted
}

/// Canonical string identity of an address set, e.g. "10.0.0.5;fe80::1".
/// Independent of the input order.
pub fn ip_set_key(addresses: &[IpAddr]) -> String {
    canonical_addresses(addresses)
        .iter()
        .map(IpAddr::to_string)
        .collect::<Vec<_>>()
        .join(";")
}

/// A device on the network, identified by the set of addresses it answers on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Host {
    /// Primary address as a string
    pub id: String,

    /// Instance name of the first service seen on this host
    pub display_name: String,

    /// All resolved addresses, sorted
    pub ip_addresses: Vec<IpAddr>,

    /// Services advertised by this host, in aggregation order
    pub services: Vec<Service>,
}

impl Host {
    /// Finds a service by its type+domain name
    pub fn service(&self, name: &str) -> Option<&Service> {
        self.services.iter().find(|s| s.name == name)
    }
}

/// One advertised service on a host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    /// Service type and domain, e.g. "_http._tcp.local."
    pub name: String,

    /// Instance name the service was advertised under
    pub instance: String,

    /// Target hostname from the SRV record
    pub hostname: String,

    /// Service port
    pub port: u16,

    /// When the instance was resolved
    pub resolved_at: DateTime<Utc>,

    /// TXT record properties (key-value metadata)
    pub properties: HashMap<String, String>,
}

impl Service {
    /// Gets a property value if present
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(|s| s.as_str())
    }
}
