//! Options for a single resolve operation

use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Scan window used when none (or zero) is configured
pub const DEFAULT_SCAN_TIME: Duration = Duration::from_secs(2);

/// Upper bound on how long one advertisement may take to resolve
pub const DEFAULT_RESOLVE_TIMEOUT: Duration = Duration::from_secs(5);

/// Options controlling one call to the resolver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolveOptions {
    /// Protocol descriptors to browse, e.g. `_http._tcp.local.`
    #[serde(default)]
    pub protocols: Vec<String>,

    /// How long to browse before flushing results (milliseconds, 0 = default)
    #[serde(default = "default_scan_time_ms")]
    pub scan_time_ms: u64,

    /// Total number of scans allowed when empty scans are retried
    #[serde(default = "default_retries")]
    pub retries: u32,

    /// Pause between retried scans (milliseconds)
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Per-advertisement resolve timeout (milliseconds)
    #[serde(default = "default_resolve_timeout_ms")]
    pub resolve_timeout_ms: u64,

    /// Repeat a scan that found nothing, up to `retries` scans in total
    #[serde(default)]
    pub retry_empty_scans: bool,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            protocols: Vec::new(),
            scan_time_ms: default_scan_time_ms(),
            retries: default_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            resolve_timeout_ms: default_resolve_timeout_ms(),
            retry_empty_scans: false,
        }
    }
}

impl ResolveOptions {
    /// Creates options for a set of protocol descriptors
    pub fn new<I, S>(protocols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            protocols: protocols.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Creates options for a single protocol descriptor
    pub fn single(protocol: impl Into<String>) -> Self {
        Self::new([protocol.into()])
    }

    pub fn with_scan_time(mut self, scan_time: Duration) -> Self {
        self.scan_time_ms = scan_time.as_millis() as u64;
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay_ms = delay.as_millis() as u64;
        self
    }

    pub fn with_resolve_timeout(mut self, timeout: Duration) -> Self {
        self.resolve_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_retry_empty_scans(mut self, enabled: bool) -> Self {
        self.retry_empty_scans = enabled;
        self
    }

    /// Returns the scan window, substituting the default for zero
    pub fn scan_time(&self) -> Duration {
        if self.scan_time_ms == 0 {
            DEFAULT_SCAN_TIME
        } else {
            Duration::from_millis(self.scan_time_ms)
        }
    }

    /// Returns the retry delay as a Duration
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Returns the resolve timeout as a Duration
    pub fn resolve_timeout(&self) -> Duration {
        Duration::from_millis(self.resolve_timeout_ms)
    }

    /// Validates the options
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.protocols.is_empty() {
            return Err(ValidationError::NoProtocols);
        }

        if let Some(index) = self.protocols.iter().position(|p| p.trim().is_empty()) {
            return Err(ValidationError::BlankProtocol { index });
        }

        if self.retries == 0 {
            return Err(ValidationError::InvalidRetries {
                retries: self.retries,
            });
        }

        if self.retry_delay_ms == 0 {
            return Err(ValidationError::InvalidRetryDelay);
        }

        if self.resolve_timeout_ms == 0 {
            return Err(ValidationError::InvalidResolveTimeout);
        }

        Ok(())
    }
}

fn default_scan_time_ms() -> u64 {
    DEFAULT_SCAN_TIME.as_millis() as u64
}

fn default_retries() -> u32 {
    2
}

fn default_retry_delay_ms() -> u64 {
    2000
}

fn default_resolve_timeout_ms() -> u64 {
    DEFAULT_RESOLVE_TIMEOUT.as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = ResolveOptions::single("_http._tcp.local.");
        assert_eq!(options.protocols, vec!["_http._tcp.local.".to_string()]);
        assert_eq!(options.scan_time(), Duration::from_secs(2));
        assert_eq!(options.retries, 2);
        assert_eq!(options.retry_delay(), Duration::from_millis(2000));
        assert_eq!(options.resolve_timeout(), Duration::from_secs(5));
        assert!(!options.retry_empty_scans);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_zero_scan_time_uses_default() {
        let options = ResolveOptions::single("_ipp._tcp.").with_scan_time(Duration::ZERO);
        assert_eq!(options.scan_time(), DEFAULT_SCAN_TIME);

        let options = options.with_scan_time(Duration::from_millis(750));
        assert_eq!(options.scan_time(), Duration::from_millis(750));
    }

    #[test]
    fn test_empty_protocols_rejected() {
        let options = ResolveOptions::new(Vec::<String>::new());
        assert_eq!(options.validate(), Err(ValidationError::NoProtocols));
    }

    #[test]
    fn test_blank_protocol_rejected() {
        let options = ResolveOptions::new(["_http._tcp.local.", "   "]);
        assert_eq!(
            options.validate(),
            Err(ValidationError::BlankProtocol { index: 1 })
        );
    }

    #[test]
    fn test_retry_bounds() {
        let options = ResolveOptions::single("_http._tcp.").with_retries(0);
        assert_eq!(
            options.validate(),
            Err(ValidationError::InvalidRetries { retries: 0 })
        );

        let options = ResolveOptions::single("_http._tcp.").with_retry_delay(Duration::ZERO);
        assert_eq!(options.validate(), Err(ValidationError::InvalidRetryDelay));
    }

    #[test]
    fn test_sub_second_resolve_timeout_kept() {
        let options = ResolveOptions::single("_http._tcp.local.")
            .with_resolve_timeout(Duration::from_millis(500));
        assert_eq!(options.resolve_timeout(), Duration::from_millis(500));
        assert!(options.validate().is_ok());

        let options = options.with_resolve_timeout(Duration::ZERO);
        assert_eq!(options.validate(), Err(ValidationError::InvalidResolveTimeout));
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let yaml = r#"
protocols:
  - _airplay._tcp.local.
retry_empty_scans: true
"#;
        let options: ResolveOptions = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(options.protocols.len(), 1);
        assert_eq!(options.scan_time_ms, 2000);
        assert_eq!(options.resolve_timeout_ms, 5000);
        assert!(options.retry_empty_scans);
    }
}
