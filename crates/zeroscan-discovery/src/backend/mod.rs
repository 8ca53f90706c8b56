//! Discovery backends
//!
//! A backend is the browse/resolve primitive the session drives. It pushes
//! [`BrowseEvent`]s into a channel from whatever context it runs on and
//! resolves advertisements on request. The resolver is handed one explicitly
//! at construction time.

pub mod mdns;
pub mod simulated;

use async_channel::Sender;
use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;
use crate::parser::ServiceQuery;
use crate::types::{Advertisement, Resolution};

pub use mdns::MdnsBackend;
pub use simulated::SimulatedBackend;

/// Notification delivered by a running browse
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrowseEvent {
    /// A service instance was announced
    Found(Advertisement),

    /// A service instance was withdrawn
    Removed(Advertisement),

    /// The browse for one query hit an error; other queries keep running
    Error { query: ServiceQuery, reason: String },
}

/// Token for a running browse, used to stop it
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BrowseHandle {
    pub id: u64,
    pub query: ServiceQuery,
}

/// The multicast DNS browse/resolve primitive
#[async_trait]
pub trait DiscoveryBackend: Send + Sync {
    /// Short name for logging
    fn name(&self) -> &'static str;

    /// Starts browsing for `query`, delivering notifications on `events`
    /// until [`stop_browse`](Self::stop_browse) is called.
    fn browse(&self, query: &ServiceQuery, events: Sender<BrowseEvent>) -> Result<BrowseHandle>;

    /// Stops a browse started with [`browse`](Self::browse)
    fn stop_browse(&self, handle: &BrowseHandle) -> Result<()>;

    /// Resolves an advertisement to addresses, port and TXT payload,
    /// giving up after `timeout`.
    async fn resolve(&self, advertisement: &Advertisement, timeout: Duration) -> Result<Resolution>;
}
