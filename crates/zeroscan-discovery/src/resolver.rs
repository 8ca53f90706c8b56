//! Resolver: the top-level entry point
//!
//! Runs a discovery session for a bounded scan window and returns the hosts
//! it found. Cancellation only shortens the window; the session is always
//! stopped and flushed, so anything resolved before cancelling is returned.

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument};
use zeroscan_core::ResolveOptions;

use crate::backend::{DiscoveryBackend, MdnsBackend};
use crate::error::{DiscoveryError, ResolveError};
use crate::session::DiscoverySession;
use crate::types::Host;

/// Callback invoked once per host when a scan completes
pub type OnHost = dyn Fn(&Host) + Send + Sync;

/// Discovers hosts through an injected backend
#[derive(Clone)]
pub struct Resolver {
    backend: Arc<dyn DiscoveryBackend>,
}

impl Resolver {
    pub fn new(backend: Arc<dyn DiscoveryBackend>) -> Self {
        Self { backend }
    }

    /// Creates a resolver over the `mdns-sd` daemon
    pub fn mdns() -> Result<Self, DiscoveryError> {
        Ok(Self::new(Arc::new(MdnsBackend::new()?)))
    }

    pub fn backend(&self) -> &Arc<dyn DiscoveryBackend> {
        &self.backend
    }

    /// Browses `options.protocols` for the scan window and returns the hosts
    /// found.
    ///
    /// `on_host` is called for each host once the scan has been flushed.
    /// With `retry_empty_scans` set, a scan that found nothing and was not
    /// cancelled is repeated, up to `retries` scans in total.
    ///
    /// # Errors
    ///
    /// Fails with [`ResolveError::Validation`] before browsing anything if
    /// the options are invalid.
    #[instrument(skip_all, fields(protocols = ?options.protocols, backend = self.backend.name()))]
    pub async fn resolve(
        &self,
        options: &ResolveOptions,
        on_host: Option<&OnHost>,
        cancel: &CancellationToken,
    ) -> Result<Vec<Host>, ResolveError> {
        options.validate()?;

        let scan_time = options.scan_time();
        let mut scan = 1;

        loop {
            let session = DiscoverySession::new(self.backend.clone(), options.resolve_timeout());
            session.start(options.protocols.as_slice())?;

            let cancelled = wait_or_cancel(scan_time, cancel).await;
            let hosts = session.stop();

            info!(
                scan = scan,
                hosts = hosts.len(),
                cancelled = cancelled,
                "Scan complete"
            );

            let retry = hosts.is_empty()
                && options.retry_empty_scans
                && !cancelled
                && scan < options.retries;

            if retry {
                info!(delay_ms = options.retry_delay_ms, "Nothing found, retrying");
                if !wait_or_cancel(options.retry_delay(), cancel).await {
                    scan += 1;
                    continue;
                }
            }

            if let Some(on_host) = on_host {
                for host in &hosts {
                    on_host(host);
                }
            }

            return Ok(hosts);
        }
    }

    /// Single-descriptor form of [`resolve`](Self::resolve) with default
    /// options and no cancellation
    pub async fn resolve_protocol(
        &self,
        protocol: &str,
        scan_time: Duration,
    ) -> Result<Vec<Host>, ResolveError> {
        let options = ResolveOptions::single(protocol).with_scan_time(scan_time);
        self.resolve(&options, None, &CancellationToken::new()).await
    }

    /// Runs [`resolve`](Self::resolve) and swallows any failure, including a
    /// panic inside the scan, logging it and returning `None`.
    pub async fn try_resolve(
        &self,
        options: ResolveOptions,
        on_host: Option<Arc<OnHost>>,
        cancel: CancellationToken,
    ) -> Option<Vec<Host>> {
        let resolver = self.clone();
        let task = tokio::spawn(async move {
            resolver
                .resolve(&options, on_host.as_deref(), &cancel)
                .await
        });

        let outcome = task.await.map_err(ResolveError::from).and_then(|r| r);
        match outcome {
            Ok(hosts) => Some(hosts),
            Err(e) => {
                error!(error = %e, "Resolve failed");
                None
            }
        }
    }
}

/// Sleeps for `duration` unless cancelled first. Returns true if cancelled.
async fn wait_or_cancel(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => false,
        _ = cancel.cancelled() => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SimulatedBackend;
    use crate::txt::encode_pairs;
    use crate::types::{Advertisement, Resolution};
    use parking_lot::Mutex;
    use std::net::{IpAddr, Ipv4Addr};
    use zeroscan_core::ValidationError;

    fn web(name: &str, last: u8) -> (Advertisement, Resolution) {
        (
            Advertisement::new(name, "_http._tcp.", "local."),
            Resolution {
                hostname: format!("{}.local.", name),
                addresses: vec![IpAddr::V4(Ipv4Addr::new(10, 0, 0, last))],
                port: 80,
                txt: Some(encode_pairs([("v", "1")])),
            },
        )
    }

    fn resolver(backend: SimulatedBackend) -> (Arc<SimulatedBackend>, Resolver) {
        let backend = Arc::new(backend);
        (backend.clone(), Resolver::new(backend))
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_protocols_fail_before_browsing() {
        let (backend, resolver) = resolver(SimulatedBackend::new());
        let options = ResolveOptions::new(Vec::<String>::new());

        let result = resolver
            .resolve(&options, None, &CancellationToken::new())
            .await;

        assert!(matches!(
            result,
            Err(ResolveError::Validation(ValidationError::NoProtocols))
        ));
        assert!(backend.browse_requests().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_retries_fail_before_browsing() {
        let (backend, resolver) = resolver(SimulatedBackend::new());
        let options = ResolveOptions::single("_http._tcp.local.").with_retries(0);

        let result = resolver
            .resolve(&options, None, &CancellationToken::new())
            .await;

        assert!(matches!(result, Err(ResolveError::Validation(_))));
        assert!(backend.browse_requests().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_scan_waits_full_window() {
        let (ad, res) = web("late", 5);
        let (_backend, resolver) =
            resolver(SimulatedBackend::new().found_after(Duration::from_millis(1900), ad, res));

        let started = tokio::time::Instant::now();
        let hosts = resolver
            .resolve_protocol("_http._tcp.local.", Duration::ZERO)
            .await
            .unwrap();

        assert_eq!(started.elapsed(), Duration::from_secs(2));
        assert_eq!(hosts.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_keeps_resolved_instances() {
        let (early_ad, early_res) = web("early", 5);
        let (late_ad, late_res) = web("late", 6);
        let (_backend, resolver) = resolver(
            SimulatedBackend::new()
                .found_after(Duration::from_millis(100), early_ad, early_res)
                .found_after(Duration::from_millis(1500), late_ad, late_res),
        );

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            trigger.cancel();
        });

        let started = tokio::time::Instant::now();
        let options = ResolveOptions::single("_http._tcp.local.")
            .with_scan_time(Duration::from_secs(10));
        let hosts = resolver.resolve(&options, None, &cancel).await.unwrap();

        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(hosts.len(), 1);
        assert_eq!(hosts[0].display_name, "early");
    }

    #[tokio::test(start_paused = true)]
    async fn test_on_host_called_per_host() {
        let (a, ra) = web("a", 5);
        let (b, rb) = web("b", 6);
        let (_backend, resolver) = resolver(
            SimulatedBackend::new()
                .found_after(Duration::from_millis(100), a, ra)
                .found_after(Duration::from_millis(300), b, rb),
        );

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let on_host: &OnHost = &move |host: &Host| sink.lock().push(host.id.clone());

        let options = ResolveOptions::single("_http._tcp.local.");
        let hosts = resolver
            .resolve(&options, Some(on_host), &CancellationToken::new())
            .await
            .unwrap();

        let mut ids = seen.lock().clone();
        ids.sort();
        assert_eq!(ids, vec!["10.0.0.5", "10.0.0.6"]);
        assert_eq!(hosts.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_scan_not_retried_by_default() {
        let (backend, resolver) = resolver(SimulatedBackend::new());
        let options = ResolveOptions::single("_http._tcp.local.").with_retries(3);

        let hosts = resolver
            .resolve(&options, None, &CancellationToken::new())
            .await
            .unwrap();

        assert!(hosts.is_empty());
        assert_eq!(backend.browse_requests().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_scans_retried_when_enabled() {
        let (backend, resolver) = resolver(SimulatedBackend::new());
        let options = ResolveOptions::single("_http._tcp.local.")
            .with_retries(3)
            .with_retry_delay(Duration::from_millis(500))
            .with_retry_empty_scans(true);

        let started = tokio::time::Instant::now();
        let hosts = resolver
            .resolve(&options, None, &CancellationToken::new())
            .await
            .unwrap();

        assert!(hosts.is_empty());
        assert_eq!(backend.browse_requests().len(), 3);
        // three 2s scans with two 500ms pauses between them
        assert_eq!(started.elapsed(), Duration::from_secs(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_try_resolve_swallows_errors() {
        let (_backend, resolver) = resolver(SimulatedBackend::new());
        let options = ResolveOptions::new(Vec::<String>::new());

        let result = resolver
            .try_resolve(options, None, CancellationToken::new())
            .await;
        assert!(result.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_try_resolve_swallows_callback_panic() {
        let (ad, res) = web("boom", 5);
        let (_backend, resolver) =
            resolver(SimulatedBackend::new().found_after(Duration::from_millis(100), ad, res));

        let on_host: Arc<OnHost> = Arc::new(|_host: &Host| panic!("consumer bug"));
        let result = resolver
            .try_resolve(
                ResolveOptions::single("_http._tcp.local."),
                Some(on_host),
                CancellationToken::new(),
            )
            .await;
        assert!(result.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_try_resolve_returns_hosts() {
        let (ad, res) = web("ok", 5);
        let (_backend, resolver) =
            resolver(SimulatedBackend::new().found_after(Duration::from_millis(100), ad, res));

        let hosts = resolver
            .try_resolve(
                ResolveOptions::single("_http._tcp.local."),
                None,
                CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(hosts.len(), 1);
    }
}
