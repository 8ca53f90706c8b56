//! Discovery session
//!
//! One browse lifecycle: `Idle -> Browsing -> Stopped`. While browsing, found
//! advertisements are resolved and collected in an instance table; stopping
//! the session flushes that table through a [`HostAggregator`] exactly once.

use async_channel::Receiver;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::aggregator::HostAggregator;
use crate::backend::{BrowseEvent, BrowseHandle, DiscoveryBackend};
use crate::error::{DiscoveryError, SessionError};
use crate::parser::ServiceQuery;
use crate::types::{ip_set_key, Advertisement, DiscoveredInstance, Host};

/// Maximum number of backend notifications to buffer
const EVENT_CHANNEL_CAPACITY: usize = 1000;

/// Lifecycle state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Browsing,
    Stopped,
}

/// A browse failure reported for one query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowseFailure {
    pub query: ServiceQuery,
    pub reason: String,
}

/// Resolved instances in first-insertion order.
///
/// Each advertisement identity carries a generation that is bumped on every
/// found or removed notification; a resolution only lands if its generation
/// is still current, so a late resolve never resurrects a removed instance.
#[derive(Debug, Default)]
struct InstanceTable {
    entries: Vec<(String, DiscoveredInstance)>,
    generations: HashMap<String, u64>,
}

impl InstanceTable {
    fn clear(&mut self) {
        self.entries.clear();
        self.generations.clear();
    }

    fn bump(&mut self, advertisement: &Advertisement) -> u64 {
        let generation = self.generations.entry(advertisement.identity()).or_insert(0);
        *generation += 1;
        *generation
    }

    fn is_current(&self, advertisement: &Advertisement, generation: u64) -> bool {
        self.generations.get(&advertisement.identity()) == Some(&generation)
    }

    /// Inserts or replaces by composite key. Returns true on replace.
    fn upsert(&mut self, instance: DiscoveredInstance) -> bool {
        let key = instance.key();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => {
                *existing = instance;
                true
            }
            None => {
                self.entries.push((key, instance));
                false
            }
        }
    }

    /// Removes the entries for an advertisement: by composite key when it
    /// carries addresses, otherwise every entry it produced.
    fn remove(&mut self, advertisement: &Advertisement) -> usize {
        let before = self.entries.len();
        if advertisement.addresses.is_empty() {
            self.entries
                .retain(|(_, instance)| !instance.is_from(advertisement));
        } else {
            let key = format!(
                "{}:{}",
                ip_set_key(&advertisement.addresses),
                advertisement.service_name()
            );
            self.entries.retain(|(k, _)| *k != key);
        }
        before - self.entries.len()
    }

    fn snapshot(&self) -> Vec<DiscoveredInstance> {
        self.entries
            .iter()
            .map(|(_, instance)| instance.clone())
            .collect()
    }
}

/// State shared with the event pump and resolve tasks
struct SessionInner {
    backend: Arc<dyn DiscoveryBackend>,
    resolve_timeout: Duration,
    instances: Mutex<InstanceTable>,
    browse_errors: Mutex<Vec<BrowseFailure>>,
    accepting: AtomicBool,
    cancel: CancellationToken,
}

impl SessionInner {
    fn on_found(self: &Arc<Self>, advertisement: Advertisement) {
        let generation = {
            let mut table = self.instances.lock();
            if !self.accepting.load(Ordering::SeqCst) {
                return;
            }
            table.bump(&advertisement)
        };

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(service = %advertisement.fullname(), "No runtime to resolve on, dropping");
            return;
        };

        debug!(service = %advertisement.fullname(), "Found, resolving");

        let inner = Arc::clone(self);
        runtime.spawn(async move {
            let cancel = inner.cancel.clone();
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(service = %advertisement.fullname(), "Resolve abandoned, session stopped");
                }
                _ = inner.resolve_and_store(&advertisement, generation) => {}
            }
        });
    }

    async fn resolve_and_store(&self, advertisement: &Advertisement, generation: u64) {
        let service_name = advertisement.fullname();
        let outcome = tokio::time::timeout(
            self.resolve_timeout,
            self.backend.resolve(advertisement, self.resolve_timeout),
        )
        .await;

        let resolution = match outcome {
            Ok(Ok(resolution)) => resolution,
            Ok(Err(e)) => {
                warn!(service = %service_name, error = %e, "Resolution failed");
                return;
            }
            Err(_) => {
                let e = DiscoveryError::ResolutionTimeout {
                    service_name: service_name.clone(),
                    timeout_ms: self.resolve_timeout.as_millis() as u64,
                };
                warn!(service = %service_name, error = %e, "Resolution timed out");
                return;
            }
        };

        let instance = DiscoveredInstance::new(advertisement, resolution);
        if instance.addresses.is_empty() {
            warn!(service = %service_name, "Resolution returned no addresses, dropping");
            return;
        }

        let mut table = self.instances.lock();
        if !self.accepting.load(Ordering::SeqCst) {
            debug!(service = %service_name, "Resolution finished after stop, discarding");
            return;
        }
        if !table.is_current(advertisement, generation) {
            debug!(service = %service_name, "Resolution superseded, discarding");
            return;
        }

        let replaced = table.upsert(instance);
        debug!(service = %service_name, replaced = replaced, "Instance stored");
    }

    fn on_removed(&self, advertisement: &Advertisement) {
        let mut table = self.instances.lock();
        if !self.accepting.load(Ordering::SeqCst) {
            return;
        }
        table.bump(advertisement);
        let removed = table.remove(advertisement);
        debug!(service = %advertisement.fullname(), removed = removed, "Removed");
    }

    fn on_browse_error(&self, query: ServiceQuery, reason: String) {
        warn!(query = %query, reason = %reason, "Browse error");
        self.browse_errors.lock().push(BrowseFailure { query, reason });
    }

    fn handle_event(self: &Arc<Self>, event: BrowseEvent) {
        match event {
            BrowseEvent::Found(advertisement) => self.on_found(advertisement),
            BrowseEvent::Removed(advertisement) => self.on_removed(&advertisement),
            BrowseEvent::Error { query, reason } => self.on_browse_error(query, reason),
        }
    }

    /// Drains backend notifications one at a time until cancelled
    async fn pump(self: Arc<Self>, events: Receiver<BrowseEvent>) {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                event = events.recv() => match event {
                    Ok(event) => self.handle_event(event),
                    Err(_) => break,
                },
            }
        }
        debug!("Session event pump stopped");
    }
}

/// One browse lifecycle over a discovery backend
pub struct DiscoverySession {
    inner: Arc<SessionInner>,
    state: Mutex<SessionState>,
    handles: Mutex<Vec<BrowseHandle>>,
    pump: Mutex<Option<JoinHandle<()>>>,
    aggregator: HostAggregator,
}

impl DiscoverySession {
    pub fn new(backend: Arc<dyn DiscoveryBackend>, resolve_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                backend,
                resolve_timeout,
                instances: Mutex::new(InstanceTable::default()),
                browse_errors: Mutex::new(Vec::new()),
                accepting: AtomicBool::new(false),
                cancel: CancellationToken::new(),
            }),
            state: Mutex::new(SessionState::Idle),
            handles: Mutex::new(Vec::new()),
            pump: Mutex::new(None),
            aggregator: HostAggregator::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    /// Starts browsing every protocol descriptor.
    ///
    /// A protocol whose browse cannot be started is recorded as a browse
    /// failure; the others proceed.
    pub fn start<S: AsRef<str>>(&self, protocols: &[S]) -> Result<(), SessionError> {
        let mut state = self.state.lock();
        match *state {
            SessionState::Idle => {}
            SessionState::Browsing => return Err(SessionError::AlreadyStarted),
            SessionState::Stopped => return Err(SessionError::AlreadyStopped),
        }

        let runtime = tokio::runtime::Handle::try_current().map_err(|_| SessionError::NoRuntime)?;

        {
            let mut table = self.inner.instances.lock();
            table.clear();
            self.inner.accepting.store(true, Ordering::SeqCst);
        }

        let (tx, rx) = async_channel::bounded(EVENT_CHANNEL_CAPACITY);
        *self.pump.lock() = Some(runtime.spawn(Arc::clone(&self.inner).pump(rx)));

        let mut handles = self.handles.lock();
        for protocol in protocols {
            let query = ServiceQuery::parse(protocol.as_ref());
            debug!(
                service_type = %query.service_type,
                domain = %query.domain,
                backend = self.inner.backend.name(),
                "Browsing"
            );

            match self.inner.backend.browse(&query, tx.clone()) {
                Ok(handle) => handles.push(handle),
                Err(e) => self.inner.on_browse_error(query, e.to_string()),
            }
        }

        *state = SessionState::Browsing;
        info!(
            protocols = protocols.len(),
            browsing = handles.len(),
            "Discovery session started"
        );
        Ok(())
    }

    /// Feeds a found notification into the session, as the backend would
    pub fn on_found(&self, advertisement: Advertisement) {
        self.inner.on_found(advertisement);
    }

    /// Feeds a removed notification into the session, as the backend would
    pub fn on_removed(&self, advertisement: &Advertisement) {
        self.inner.on_removed(advertisement);
    }

    /// Records a browse error for one query
    pub fn on_browse_error(&self, query: ServiceQuery, reason: impl Into<String>) {
        self.inner.on_browse_error(query, reason.into());
    }

    /// Stops browsing and aggregates the instance table into hosts.
    ///
    /// Only the first call aggregates; later calls return the same snapshot.
    pub fn stop(&self) -> Vec<Host> {
        let mut state = self.state.lock();
        if *state == SessionState::Stopped {
            return self.aggregator.results();
        }
        *state = SessionState::Stopped;

        for handle in self.handles.lock().drain(..) {
            if let Err(e) = self.inner.backend.stop_browse(&handle) {
                warn!(query = %handle.query, error = %e, "Failed to stop browse");
            }
        }

        self.inner.cancel.cancel();
        if let Some(pump) = self.pump.lock().take() {
            pump.abort();
        }

        let instances = {
            let table = self.inner.instances.lock();
            self.inner.accepting.store(false, Ordering::SeqCst);
            table.snapshot()
        };

        for instance in &instances {
            self.aggregator.add_instance(instance);
        }

        let hosts = self.aggregator.results();
        info!(
            instances = instances.len(),
            hosts = hosts.len(),
            browse_errors = self.inner.browse_errors.lock().len(),
            "Discovery session stopped"
        );
        hosts
    }

    /// Number of resolved instances currently held
    pub fn instance_count(&self) -> usize {
        self.inner.instances.lock().entries.len()
    }

    /// Browse failures recorded so far
    pub fn browse_errors(&self) -> Vec<BrowseFailure> {
        self.inner.browse_errors.lock().clone()
    }
}

impl Drop for DiscoverySession {
    fn drop(&mut self) {
        if *self.state.get_mut() == SessionState::Browsing {
            warn!("Discovery session dropped while still browsing");
            for handle in self.handles.get_mut().drain(..) {
                if let Err(e) = self.inner.backend.stop_browse(&handle) {
                    warn!(query = %handle.query, error = %e, "Failed to stop browse");
                }
            }
            self.inner.cancel.cancel();
        }
    }
}
