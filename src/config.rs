//! Driver configuration types.
//!
//! Everything a caller can configure lives here: the instrument address, the
//! session timeouts, and the sweep/transfer state. The library API takes
//! these structs directly; the `vna_snap` CLI can also load them from a TOML
//! file with environment overrides.
//!
//! ## Configuration
//!
//! ```toml
//! [instrument]
//! kind = "socket"
//! host = "192.168.1.40"
//! port = 5025
//!
//! # kind = "gpib"
//! # board = 0
//! # primary = 20
//!
//! [timeouts]
//! connect = "2s"
//! io = "3s"
//! completion = "10s"
//!
//! [sweep]
//! num_points = 201
//! format = "ascii"        # or "binary"
//! byte_order = "little-endian"
//! ```
//!
//! Environment variables prefixed with `VNA_` override file values, e.g.
//! `VNA_INSTRUMENT__HOST=10.0.0.5`.

use std::path::Path;
use std::time::Duration;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::error::{VnaError, VnaResult};

/// How a trace reply is encoded on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TraceFormat {
    /// Comma-separated ASCII floats.
    Ascii,
    /// IEEE-488.2 definite-length block of 64-bit floats.
    Binary,
}

/// Byte order of binary trace payloads.
///
/// Configured explicitly and applied as configured; the decoder never
/// auto-detects, since a wrong guess garbles every sample silently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ByteOrder {
    /// Network order (`FORM:BORD NORM`).
    BigEndian,
    /// Swapped order (`FORM:BORD SWAP`), the instrument-side default of the
    /// original driver.
    LittleEndian,
}

/// Frequency spacing of the instrument sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepType {
    /// Linearly spaced points.
    Linear,
    /// Log-spaced points.
    Logarithmic,
}

/// Where the instrument lives: a GPIB bus address or a raw SCPI socket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum InstrumentAddress {
    /// IEEE-488 bus address.
    Gpib {
        /// Adapter card number, usually 0.
        #[serde(default)]
        board: u8,
        /// Primary address on the bus (0-30).
        primary: u8,
    },
    /// Raw TCP/IP SCPI socket.
    Socket {
        /// Hostname or dotted IP.
        host: String,
        /// TCP port, typically 5025.
        port: u16,
    },
}

impl InstrumentAddress {
    /// Check the address invariants before any connection attempt.
    pub fn validate(&self) -> VnaResult<()> {
        match self {
            InstrumentAddress::Gpib { primary, .. } => {
                if *primary > 30 {
                    return Err(VnaError::InvalidConfiguration(format!(
                        "GPIB primary address {} out of range (0-30)",
                        primary
                    )));
                }
            }
            InstrumentAddress::Socket { host, port } => {
                if host.trim().is_empty() {
                    return Err(VnaError::InvalidConfiguration(
                        "socket address requires a hostname".to_string(),
                    ));
                }
                if *port == 0 {
                    return Err(VnaError::InvalidConfiguration(
                        "socket address requires a non-zero port".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }

    /// VISA-style resource string for this address.
    pub fn resource_string(&self) -> String {
        match self {
            InstrumentAddress::Gpib { board, primary } => {
                format!("GPIB{}::{}::INSTR", board, primary)
            }
            InstrumentAddress::Socket { host, port } => {
                format!("TCPIP0::{}::{}::SOCKET", host, port)
            }
        }
    }
}

/// Session deadlines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutSettings {
    /// Transport open deadline.
    #[serde(with = "humantime_serde")]
    pub connect: Duration,
    /// Per read/write deadline on an open session.
    #[serde(with = "humantime_serde")]
    pub io: Duration,
    /// Total wait for sweep completion after a trigger.
    #[serde(with = "humantime_serde")]
    pub completion: Duration,
    /// First operation-complete poll interval.
    #[serde(with = "humantime_serde")]
    pub opc_poll_initial: Duration,
    /// Poll interval ceiling after backoff.
    #[serde(with = "humantime_serde")]
    pub opc_poll_max: Duration,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(2),
            io: Duration::from_secs(3),
            completion: Duration::from_secs(10),
            opc_poll_initial: Duration::from_millis(20),
            opc_poll_max: Duration::from_millis(500),
        }
    }
}

/// Sweep and transfer state, read before each trigger.
///
/// The transfer format is explicit state here rather than something implied
/// by the last `FORM` command sent, so a decode can never disagree with the
/// request that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    /// Number of frequency points per sweep.
    pub num_points: usize,
    /// Trace transfer encoding.
    pub format: TraceFormat,
    /// Byte order for binary transfers; ignored for ASCII.
    pub byte_order: ByteOrder,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            num_points: 201,
            format: TraceFormat::Ascii,
            byte_order: ByteOrder::LittleEndian,
        }
    }
}

impl SweepConfig {
    /// Check the sweep invariants before any command is built.
    pub fn validate(&self) -> VnaResult<()> {
        if self.num_points == 0 {
            return Err(VnaError::InvalidConfiguration(
                "sweep requires at least one point".to_string(),
            ));
        }
        Ok(())
    }
}

/// Top-level settings for the CLI tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Instrument to connect to.
    pub instrument: InstrumentAddress,
    /// Session deadlines.
    #[serde(default)]
    pub timeouts: TimeoutSettings,
    /// Default sweep state.
    #[serde(default)]
    pub sweep: SweepConfig,
}

impl Settings {
    /// Load settings from a TOML file (falling back to `config/default.toml`)
    /// with `VNA_`-prefixed environment overrides.
    pub fn load(path: Option<&Path>) -> VnaResult<Self> {
        let mut builder = Config::builder();
        builder = match path {
            Some(p) => builder.add_source(File::from(p)),
            None => builder.add_source(File::with_name("config/default").required(false)),
        };
        let cfg = builder
            .add_source(Environment::with_prefix("VNA").separator("__"))
            .build()?;
        Ok(cfg.try_deserialize()?)
    }
}
