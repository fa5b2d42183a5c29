//! # Proxbox Common
//!
//! Shared utilities for the Proxbox components.
//!
//! ## Logging
//!
//! ```rust,no_run
//! use proxbox_common::{init_logging, LogFormat};
//!
//! init_logging("info", LogFormat::Pretty).unwrap();
//! tracing::info!(vm = "web-01", "Reconciling VM");
//! ```

pub mod logging;

pub use logging::{init_logging, init_logging_json, init_logging_pretty, LogFormat};
