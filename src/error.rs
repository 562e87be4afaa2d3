//! Custom error types for the driver.
//!
//! This module defines the primary error type, `VnaError`, for the entire
//! crate. Using the `thiserror` crate, it provides a centralized and
//! consistent way to handle the different kinds of failures an instrument
//! session can produce, from bad caller input to wire-level corruption.
//!
//! ## Error Taxonomy
//!
//! - **`InvalidConfiguration`**: bad caller input (point count of zero, port
//!   index out of range, inverted frequency limits). Always raised before any
//!   bytes are written to the instrument.
//! - **`Connect`**: the transport could not be opened.
//! - **`Io`**: a write or read failed mid-session. Wraps `std::io::Error`.
//! - **`Timeout`**: the instrument did not respond, or did not report sweep
//!   completion, within the configured deadline.
//! - **`MalformedData`**: a trace reply violated its framing or failed
//!   numeric parsing. Never silently truncated or padded.
//! - **`IncompleteNetwork`**: assembly of a network result found a missing
//!   S-parameter or a sample count that disagrees with the frequency axis.
//! - **`Config`**: wraps errors from the `config` crate when loading settings
//!   files for the CLI tool.
//!
//! Configuration and assembly errors are fully recoverable and have no side
//! effects on the instrument. I/O and timeout errors are surfaced as-is; the
//! driver never retries a triggered measurement on its own, since re-arming
//! an instrument in an unknown trigger state risks corrupted data.

use std::time::Duration;

use thiserror::Error;

/// Convenience alias for results using the driver error type.
pub type VnaResult<T> = std::result::Result<T, VnaError>;

/// Errors produced by the VNA driver.
#[derive(Error, Debug)]
pub enum VnaError {
    /// Bad caller input, rejected before any command is sent.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The transport connection could not be opened.
    #[error("Connection failed: {0}")]
    Connect(String),

    /// A write or read failed on an open session.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No response, or no sweep completion, within the deadline.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// A trace reply violated its framing or failed numeric parsing.
    #[error("Malformed trace data: {0}")]
    MalformedData(String),

    /// A network result could not be assembled from the decoded traces.
    #[error("Incomplete network: {0}")]
    IncompleteNetwork(String),

    /// Settings file error.
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// GPIB addresses need the VISA transport.
    #[error("VISA support not enabled. Rebuild with --features instrument_visa")]
    VisaFeatureDisabled,
}
