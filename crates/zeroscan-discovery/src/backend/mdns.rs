//! mDNS backend built on the `mdns-sd` daemon
//!
//! The daemon resolves instances on its own thread and reports them as
//! `ServiceResolved` events. Those are cached by full instance name so that
//! [`DiscoveryBackend::resolve`] can hand them out, waiting for a pending
//! resolution until the caller's timeout.

use async_channel::Sender;
use async_trait::async_trait;
use dashmap::DashMap;
use mdns_sd::{ServiceDaemon, ServiceEvent as MdnsEvent, ServiceInfo};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{BrowseEvent, BrowseHandle, DiscoveryBackend};
use crate::error::{DiscoveryError, Result};
use crate::parser::ServiceQuery;
use crate::txt::TxtRecordBuilder;
use crate::types::{Advertisement, Resolution};

/// Backend driving a local `mdns-sd` service daemon
pub struct MdnsBackend {
    /// mDNS service daemon
    mdns: ServiceDaemon,

    /// Resolved instances keyed by full instance name
    resolved: Arc<DashMap<String, ServiceInfo>>,

    /// Woken whenever `resolved` gains an entry
    resolved_notify: Arc<Notify>,

    /// Browse event pumps keyed by handle id
    browsers: DashMap<u64, JoinHandle<()>>,

    next_id: AtomicU64,
}

impl MdnsBackend {
    /// Creates the backend and starts the mDNS daemon thread
    pub fn new() -> Result<Self> {
        let mdns = ServiceDaemon::new().map_err(|e| {
            DiscoveryError::BackendInit(format!("Failed to create mDNS daemon: {}", e))
        })?;

        info!("mDNS backend created");

        Ok(Self {
            mdns,
            resolved: Arc::new(DashMap::new()),
            resolved_notify: Arc::new(Notify::new()),
            browsers: DashMap::new(),
            next_id: AtomicU64::new(1),
        })
    }

    /// Handles one daemon event. Returns false once the browse is over or
    /// nobody is listening any more.
    async fn handle_mdns_event(
        event: MdnsEvent,
        resolved: &DashMap<String, ServiceInfo>,
        resolved_notify: &Notify,
        events: &Sender<BrowseEvent>,
    ) -> bool {
        let notification = match event {
            MdnsEvent::ServiceFound(ty_domain, fullname) => {
                debug!(service = %fullname, "Service found");
                BrowseEvent::Found(advertisement_from(&ty_domain, &fullname))
            }

            MdnsEvent::ServiceResolved(info) => {
                debug!(
                    service = info.get_fullname(),
                    hostname = info.get_hostname(),
                    port = info.get_port(),
                    "Service resolved"
                );

                let advertisement = advertisement_from(info.get_type(), info.get_fullname());
                let refreshed = resolved
                    .insert(info.get_fullname().to_string(), info)
                    .is_some();
                resolved_notify.notify_waiters();

                // First resolution answers the pending resolve for the
                // earlier ServiceFound; later ones are updates.
                if !refreshed {
                    return true;
                }
                BrowseEvent::Found(advertisement)
            }

            MdnsEvent::ServiceRemoved(ty_domain, fullname) => {
                debug!(service = %fullname, "Service removed");
                resolved.remove(&fullname);
                BrowseEvent::Removed(advertisement_from(&ty_domain, &fullname))
            }

            MdnsEvent::SearchStarted(ty_domain) => {
                debug!(service_type = %ty_domain, "Search started");
                return true;
            }

            MdnsEvent::SearchStopped(ty_domain) => {
                debug!(service_type = %ty_domain, "Search stopped");
                return false;
            }

            #[allow(unreachable_patterns)]
            _ => return true,
        };

        events.send(notification).await.is_ok()
    }
}

#[async_trait]
impl DiscoveryBackend for MdnsBackend {
    fn name(&self) -> &'static str {
        "mdns-sd"
    }

    fn browse(&self, query: &ServiceQuery, events: Sender<BrowseEvent>) -> Result<BrowseHandle> {
        let service_string = query.fqdn();

        if !service_string.to_ascii_lowercase().ends_with(".local.") {
            return Err(DiscoveryError::browse_failed(
                service_string,
                "mdns-sd only browses the local. domain",
            ));
        }

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| DiscoveryError::browse_failed(service_string.clone(), e))?;

        let receiver = self
            .mdns
            .browse(&service_string)
            .map_err(|e| DiscoveryError::browse_failed(service_string.clone(), e))?;

        info!(service_type = %service_string, "Starting browser");

        let resolved = self.resolved.clone();
        let resolved_notify = self.resolved_notify.clone();
        let browse_name = service_string.clone();

        let task = runtime.spawn(async move {
            while let Ok(event) = receiver.recv_async().await {
                if !Self::handle_mdns_event(event, &resolved, &resolved_notify, &events).await {
                    break;
                }
            }
            debug!("Browser task for {} stopped", browse_name);
        });

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.browsers.insert(id, task);

        Ok(BrowseHandle {
            id,
            query: query.clone(),
        })
    }

    fn stop_browse(&self, handle: &BrowseHandle) -> Result<()> {
        if let Some((_, task)) = self.browsers.remove(&handle.id) {
            task.abort();
        }

        let service_string = handle.query.fqdn();
        self.mdns
            .stop_browse(&service_string)
            .map_err(|e| DiscoveryError::StopFailed {
                service_type: service_string,
                reason: e.to_string(),
            })
    }

    async fn resolve(&self, advertisement: &Advertisement, timeout: Duration) -> Result<Resolution> {
        let fullname = advertisement.fullname();
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            let notified = self.resolved_notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(info) = self.resolved.get(&fullname) {
                return Ok(resolution_from(info.value()));
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                warn!(service = %fullname, "mDNS resolution timed out");
                return Err(DiscoveryError::ResolutionTimeout {
                    service_name: fullname,
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
        }
    }
}

impl Drop for MdnsBackend {
    fn drop(&mut self) {
        for entry in self.browsers.iter() {
            entry.value().abort();
        }
        // Can't await in Drop; the daemon thread exits on its own once told
        if let Err(e) = self.mdns.shutdown() {
            warn!(error = %e, "Failed to shut down mDNS daemon");
        }
    }
}

/// Label separating a sub-type from its parent type, e.g.
/// `_printer._sub._http._tcp.local.`
const SUBTYPE_LABEL: &str = "._sub.";

/// Splits `<instance>.<type><domain>` back into an advertisement.
///
/// `ty_domain` is the name that was browsed. For a sub-type browse the
/// instance still lives under the parent type, so the sub-type prefix is
/// dropped first.
fn advertisement_from(ty_domain: &str, fullname: &str) -> Advertisement {
    let ty_domain = ty_domain
        .find(SUBTYPE_LABEL)
        .map(|i| &ty_domain[i + SUBTYPE_LABEL.len()..])
        .unwrap_or(ty_domain);
    let query = ServiceQuery::parse(ty_domain);
    let name = fullname
        .strip_suffix(ty_domain)
        .map(|instance| instance.trim_end_matches('.'))
        .unwrap_or(fullname);
    Advertisement::new(name, query.service_type, query.domain)
}

/// Converts ServiceInfo from mdns-sd into a Resolution, re-encoding the
/// parsed TXT properties into wire form
fn resolution_from(info: &ServiceInfo) -> Resolution {
    let properties = info.get_properties();
    let txt = if properties.is_empty() {
        None
    } else {
        let builder = properties
            .iter()
            .fold(TxtRecordBuilder::new(), |builder, property| {
                match property.val() {
                    Some(value) => builder.pair(property.key(), value),
                    None => builder.flag(property.key()),
                }
            });
        Some(builder.build())
    };

    Resolution {
        hostname: info.get_hostname().to_string(),
        addresses: info.get_addresses().iter().copied().collect(),
        port: info.get_port(),
        txt,
    }
}
