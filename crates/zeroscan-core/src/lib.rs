//! # zeroscan core
//!
//! Error types and configuration shared by the zeroscan discovery engine and
//! its command-line front end.
//!
//! - **Errors**: validation and configuration failures built with `thiserror`.
//! - **Options**: [`ResolveOptions`], the per-call knobs of a resolve operation
//!   (protocols, scan window, retry policy, resolve timeout).
//! - **Configuration**: [`ScanConfig`], a YAML file format with environment
//!   variable overrides and validation.
//!
//! ## Example
//!
//! ```
//! use std::time::Duration;
//! use zeroscan_core::ResolveOptions;
//!
//! let options = ResolveOptions::single("_http._tcp.local.")
//!     .with_scan_time(Duration::from_secs(3));
//!
//! assert!(options.validate().is_ok());
//! ```

pub mod config;
pub mod error;
pub mod resolve_options;

pub use config::{LogFormat, LoggingConfig, ScanConfig};
pub use error::{ConfigError, Result, ValidationError, ZeroscanError};
pub use resolve_options::{ResolveOptions, DEFAULT_RESOLVE_TIMEOUT, DEFAULT_SCAN_TIME};
