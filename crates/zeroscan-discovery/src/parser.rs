//! Protocol descriptor parsing
//!
//! A descriptor such as `_http._tcp.local.` names a service type and,
//! optionally, the domain to browse it in. Backends want the two halves
//! separately.

use serde::{Deserialize, Serialize};
use std::fmt;

const LOCAL_SUFFIX: &str = ".local.";
const LOCAL_DOMAIN: &str = "local.";
const TRANSPORT_DELIMITERS: [&str; 2] = ["._tcp.", "._udp."];

/// A service type and domain pair to browse
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceQuery {
    /// Service type including the transport label, e.g. `_http._tcp.`
    pub service_type: String,

    /// Browse domain; empty means "all domains"
    pub domain: String,
}

impl ServiceQuery {
    /// Splits a protocol descriptor into service type and domain.
    ///
    /// Never fails: a descriptor that matches no known shape becomes the
    /// service type with an empty domain.
    pub fn parse(descriptor: &str) -> Self {
        if let Some(split) = local_suffix_start(descriptor) {
            let (service_type, domain) = descriptor.split_at(split);
            return Self::new(service_type, domain);
        }

        for delimiter in TRANSPORT_DELIMITERS {
            if let Some(index) = descriptor.find(delimiter) {
                let (service_type, domain) = descriptor.split_at(index + delimiter.len());
                return Self::new(service_type, domain);
            }
        }

        Self::new(descriptor, "")
    }

    pub fn new(service_type: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            service_type: service_type.into(),
            domain: domain.into(),
        }
    }

    /// Service type and domain joined verbatim, as used for service names
    pub fn name(&self) -> String {
        format!("{}{}", self.service_type, self.domain)
    }

    /// Fully qualified browse name, defaulting the domain to `local.`
    pub fn fqdn(&self) -> String {
        let mut name = self.service_type.clone();
        if !name.ends_with('.') {
            name.push('.');
        }

        if self.domain.is_empty() {
            name.push_str(LOCAL_DOMAIN);
        } else {
            name.push_str(&self.domain);
            if !name.ends_with('.') {
                name.push('.');
            }
        }
        name
    }

    /// Returns true if an advertisement of this type and domain belongs to
    /// this query. An empty query domain matches every domain.
    pub fn covers(&self, service_type: &str, domain: &str) -> bool {
        self.service_type.eq_ignore_ascii_case(service_type)
            && (self.domain.is_empty() || self.domain.eq_ignore_ascii_case(domain))
    }
}

impl fmt::Display for ServiceQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.service_type, self.domain)
    }
}

/// Shorthand for [`ServiceQuery::parse`]
pub fn parse(descriptor: &str) -> ServiceQuery {
    ServiceQuery::parse(descriptor)
}

/// Byte offset where the trailing `local.` starts, if the descriptor ends
/// with `.local.` in any letter case.
fn local_suffix_start(descriptor: &str) -> Option<usize> {
    let start = descriptor.len().checked_sub(LOCAL_SUFFIX.len())?;
    let tail = descriptor.get(start..)?;
    tail.eq_ignore_ascii_case(LOCAL_SUFFIX).then_some(start + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_domain() {
        let query = parse("_http._tcp.local.");
        assert_eq!(query.service_type, "_http._tcp.");
        assert_eq!(query.domain, "local.");
    }

    #[test]
    fn test_local_domain_case_insensitive() {
        let query = parse("_airplay._tcp.LOCAL.");
        assert_eq!(query.service_type, "_airplay._tcp.");
        assert_eq!(query.domain, "LOCAL.");
    }

    #[test]
    fn test_subtype_with_custom_domain() {
        let query = parse("_foo._bar._tcp.example.com.");
        assert_eq!(query.service_type, "_foo._bar._tcp.");
        assert_eq!(query.domain, "example.com.");
    }

    #[test]
    fn test_no_domain() {
        let query = parse("_http._tcp.");
        assert_eq!(query.service_type, "_http._tcp.");
        assert_eq!(query.domain, "");
    }

    #[test]
    fn test_udp_delimiter() {
        let query = parse("_sleep-proxy._udp.example.org.");
        assert_eq!(query.service_type, "_sleep-proxy._udp.");
        assert_eq!(query.domain, "example.org.");
    }

    #[test]
    fn test_unrecognized_descriptor() {
        let query = parse("_printer");
        assert_eq!(query.service_type, "_printer");
        assert_eq!(query.domain, "");

        let query = parse("");
        assert_eq!(query.service_type, "");
        assert_eq!(query.domain, "");
    }

    #[test]
    fn test_multibyte_descriptor_does_not_panic() {
        let query = parse("é");
        assert_eq!(query.service_type, "é");

        let query = parse("_ü._tcp.lokal.");
        assert_eq!(query.service_type, "_ü._tcp.");
        assert_eq!(query.domain, "lokal.");
    }

    #[test]
    fn test_name_and_fqdn() {
        let query = parse("_http._tcp.");
        assert_eq!(query.name(), "_http._tcp.");
        assert_eq!(query.fqdn(), "_http._tcp.local.");

        let query = parse("_foo._bar._tcp.example.com.");
        assert_eq!(query.name(), "_foo._bar._tcp.example.com.");
        assert_eq!(query.fqdn(), "_foo._bar._tcp.example.com.");
        assert_eq!(query.to_string(), query.name());
    }

    #[test]
    fn test_covers() {
        let any_domain = parse("_http._tcp.");
        assert!(any_domain.covers("_http._tcp.", "local."));
        assert!(any_domain.covers("_http._tcp.", "example.com."));
        assert!(!any_domain.covers("_ipp._tcp.", "local."));

        let local = parse("_http._tcp.local.");
        assert!(local.covers("_http._tcp.", "local."));
        assert!(!local.covers("_http._tcp.", "example.com."));
    }
}
