//! mDNS/DNS-SD discovery and host aggregation
//!
//! This crate browses the local network for advertised service types and
//! folds every resolved instance into a list of physical hosts:
//! - Parse service descriptors such as `_http._tcp.local.`
//! - Browse several descriptors concurrently through one [`DiscoverySession`]
//! - Resolve each announced instance to addresses, port and TXT record
//! - Group instances by the exact set of addresses they resolved to
//!
//! # Architecture
//!
//! A [`Resolver`] owns a [`DiscoveryBackend`] and runs one session per scan:
//! 1. Start a browse per descriptor; backend events arrive on one channel
//! 2. Resolve each found instance, keeping only the newest per address set
//! 3. Forget instances the network withdraws
//! 4. After the scan window, stop every browse and aggregate into [`Host`]s
//!
//! The `mdns-sd` daemon is the production backend. [`SimulatedBackend`]
//! replays a scripted timeline for tests.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use zeroscan_discovery::Resolver;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let resolver = Resolver::mdns()?;
//!
//!     let hosts = resolver
//!         .resolve_protocol("_http._tcp.local.", Duration::from_secs(2))
//!         .await?;
//!
//!     for host in hosts {
//!         println!("{} ({} services)", host.display_name, host.services.len());
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod aggregator;
pub mod backend;
pub mod error;
pub mod parser;
pub mod resolver;
pub mod session;
pub mod txt;
pub mod types;

pub use aggregator::HostAggregator;
pub use backend::{BrowseEvent, BrowseHandle, DiscoveryBackend, MdnsBackend, SimulatedBackend};
pub use error::{DiscoveryError, ResolveError, Result, SessionError};
pub use parser::ServiceQuery;
pub use resolver::{OnHost, Resolver};
pub use session::{BrowseFailure, DiscoverySession, SessionState};
pub use txt::{encode_pairs, parse_properties, TxtRecordBuilder};
pub use types::{Advertisement, DiscoveredInstance, Host, Resolution, Service};

pub use zeroscan_core::ResolveOptions;
