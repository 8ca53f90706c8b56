//! Scripted in-process backend
//!
//! Replays a fixed timeline of browse events relative to the moment each
//! browse starts, and answers resolves from a table. Used to exercise the
//! session and resolver deterministically, typically under
//! `tokio::time::pause()`.

use async_channel::Sender;
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

use super::{BrowseEvent, BrowseHandle, DiscoveryBackend};
use crate::error::{DiscoveryError, Result};
use crate::parser::ServiceQuery;
use crate::types::{Advertisement, Resolution};

#[derive(Debug, Clone)]
struct ScriptedEvent {
    after: Duration,
    event: BrowseEvent,
}

#[derive(Debug, Clone)]
enum ResolveBehavior {
    Succeed { delay: Duration, resolution: Resolution },
    Fail { reason: String },
}

/// Backend that replays a scripted timeline
#[derive(Default)]
pub struct SimulatedBackend {
    script: Mutex<Vec<ScriptedEvent>>,
    resolutions: DashMap<String, ResolveBehavior>,
    failing_browses: DashMap<String, String>,
    browse_log: Mutex<Vec<ServiceQuery>>,
    stopped: Mutex<Vec<BrowseHandle>>,
    tasks: DashMap<u64, JoinHandle<()>>,
    next_id: AtomicU64,
}

impl SimulatedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Announces `advertisement` `after` the browse starts; resolving it
    /// yields `resolution`
    pub fn found_after(self, after: Duration, advertisement: Advertisement, resolution: Resolution) -> Self {
        self.resolutions.insert(
            advertisement.identity(),
            ResolveBehavior::Succeed {
                delay: Duration::ZERO,
                resolution,
            },
        );
        self.push(after, BrowseEvent::Found(advertisement))
    }

    /// Like [`found_after`](Self::found_after) but the resolve itself takes
    /// `resolve_delay`
    pub fn slow_found_after(
        self,
        after: Duration,
        resolve_delay: Duration,
        advertisement: Advertisement,
        resolution: Resolution,
    ) -> Self {
        self.resolutions.insert(
            advertisement.identity(),
            ResolveBehavior::Succeed {
                delay: resolve_delay,
                resolution,
            },
        );
        self.push(after, BrowseEvent::Found(advertisement))
    }

    /// Announces `advertisement` but fails every resolve of it
    pub fn unresolvable_after(self, after: Duration, advertisement: Advertisement, reason: &str) -> Self {
        self.resolutions.insert(
            advertisement.identity(),
            ResolveBehavior::Fail {
                reason: reason.to_string(),
            },
        );
        self.push(after, BrowseEvent::Found(advertisement))
    }

    /// Withdraws `advertisement` `after` the browse starts
    pub fn removed_after(self, after: Duration, advertisement: Advertisement) -> Self {
        self.push(after, BrowseEvent::Removed(advertisement))
    }

    /// Reports a browse error for `descriptor` `after` the browse starts
    pub fn browse_error_after(self, after: Duration, descriptor: &str, reason: &str) -> Self {
        self.push(
            after,
            BrowseEvent::Error {
                query: ServiceQuery::parse(descriptor),
                reason: reason.to_string(),
            },
        )
    }

    /// Makes `browse` itself fail for `descriptor`
    pub fn failing_browse(self, descriptor: &str, reason: &str) -> Self {
        self.failing_browses
            .insert(ServiceQuery::parse(descriptor).name(), reason.to_string());
        self
    }

    /// Every query `browse` has been called with, in call order
    pub fn browse_requests(&self) -> Vec<ServiceQuery> {
        self.browse_log.lock().clone()
    }

    /// Every handle `stop_browse` has been called with
    pub fn stopped_browses(&self) -> Vec<BrowseHandle> {
        self.stopped.lock().clone()
    }

    fn push(self, after: Duration, event: BrowseEvent) -> Self {
        {
            let mut script = self.script.lock();
            script.push(ScriptedEvent { after, event });
            script.sort_by_key(|scripted| scripted.after);
        }
        self
    }

    fn events_for(&self, query: &ServiceQuery) -> Vec<ScriptedEvent> {
        self.script
            .lock()
            .iter()
            .filter(|scripted| match &scripted.event {
                BrowseEvent::Found(ad) | BrowseEvent::Removed(ad) => {
                    query.covers(&ad.service_type, &ad.domain)
                }
                BrowseEvent::Error { query: target, .. } => target == query,
            })
            .cloned()
            .collect()
    }
}

#[async_trait]
impl DiscoveryBackend for SimulatedBackend {
    fn name(&self) -> &'static str {
        "simulated"
    }

    fn browse(&self, query: &ServiceQuery, events: Sender<BrowseEvent>) -> Result<BrowseHandle> {
        self.browse_log.lock().push(query.clone());

        if let Some(reason) = self.failing_browses.get(&query.name()) {
            return Err(DiscoveryError::browse_failed(query.name(), reason.value()));
        }

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| DiscoveryError::browse_failed(query.name(), e))?;

        let timeline = self.events_for(query);
        let start = tokio::time::Instant::now();
        let task = runtime.spawn(async move {
            for scripted in timeline {
                tokio::time::sleep_until(start + scripted.after).await;
                if events.send(scripted.event).await.is_err() {
                    break;
                }
            }
        });

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.tasks.insert(id, task);
        debug!(query = %query, id = id, "Simulated browse started");

        Ok(BrowseHandle {
            id,
            query: query.clone(),
        })
    }

    fn stop_browse(&self, handle: &BrowseHandle) -> Result<()> {
        if let Some((_, task)) = self.tasks.remove(&handle.id) {
            task.abort();
        }
        self.stopped.lock().push(handle.clone());
        Ok(())
    }

    async fn resolve(&self, advertisement: &Advertisement, _timeout: Duration) -> Result<Resolution> {
        let behavior = self
            .resolutions
            .get(&advertisement.identity())
            .map(|entry| entry.value().clone());

        match behavior {
            Some(ResolveBehavior::Succeed { delay, resolution }) => {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                Ok(resolution)
            }
            Some(ResolveBehavior::Fail { reason }) => Err(DiscoveryError::resolution_failed(
                advertisement.fullname(),
                reason,
            )),
            None => Err(DiscoveryError::resolution_failed(
                advertisement.fullname(),
                "unknown advertisement",
            )),
        }
    }
}

impl Drop for SimulatedBackend {
    fn drop(&mut self) {
        for entry in self.tasks.iter() {
            entry.value().abort();
        }
    }
}
