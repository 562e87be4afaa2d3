//! Transport implementations.
//!
//! This module contains the byte-session abstraction used by the acquisition
//! session, providing low-level I/O over the two supported interfaces: raw
//! SCPI-over-TCP sockets and GPIB via a VISA installation.
//!
//! The wire protocol is strictly half-duplex: every operation is a write
//! followed by at most one read, and a transport is exclusively owned by its
//! session, so the trait takes `&mut self` throughout.

pub mod mock;
pub mod tcp;
#[cfg(feature = "instrument_visa")]
pub mod visa;

use async_trait::async_trait;

use crate::config::{InstrumentAddress, TimeoutSettings};
use crate::error::VnaResult;

pub use mock::{Exchange, MockTransport};
pub use tcp::TcpTransport;
#[cfg(feature = "instrument_visa")]
pub use visa::VisaTransport;

/// A synchronous-per-operation byte session to one instrument.
///
/// Commands are newline-terminated SCPI lines; replies are either
/// newline-terminated text or raw byte runs of a known length (binary block
/// payloads must never be read line-wise, since any payload byte can equal
/// the terminator). All reads are bounded by the transport's configured I/O
/// timeout.
#[async_trait]
pub trait Transport: Send {
    /// Write one command line; the terminator is appended here.
    async fn write_line(&mut self, command: &str) -> VnaResult<()>;

    /// Read up to and including the terminator, returning the trimmed line.
    async fn read_line(&mut self) -> VnaResult<String>;

    /// Read exactly `n` raw bytes regardless of their values.
    async fn read_exact(&mut self, n: usize) -> VnaResult<Vec<u8>>;

    /// Close the connection.
    async fn close(&mut self) -> VnaResult<()>;
}

/// Open the transport matching the address kind.
pub async fn open(
    address: &InstrumentAddress,
    timeouts: &TimeoutSettings,
) -> VnaResult<Box<dyn Transport>> {
    address.validate()?;
    match address {
        InstrumentAddress::Socket { host, port } => {
            let transport = TcpTransport::connect(host, *port, timeouts).await?;
            Ok(Box::new(transport))
        }
        #[cfg(feature = "instrument_visa")]
        InstrumentAddress::Gpib { .. } => {
            let transport = VisaTransport::open(address, timeouts).await?;
            Ok(Box::new(transport))
        }
        #[cfg(not(feature = "instrument_visa"))]
        InstrumentAddress::Gpib { .. } => Err(crate::error::VnaError::VisaFeatureDisabled),
    }
}
