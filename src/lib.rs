//! Instrument-control driver for vector network analyzers.
//!
//! This library speaks SCPI to a two-port VNA over GPIB or a raw TCP/IP
//! socket: it configures sweeps, triggers acquisitions, decodes ASCII and
//! IEEE-488.2 binary trace transfers, and assembles the results into
//! frequency-indexed S-parameter networks. It is used by the `vna_snap`
//! command-line tool and by lab automation code embedding the driver.

pub mod adapters;
pub mod block;
pub mod config;
pub mod error;
pub mod instrument;
pub mod network;
pub mod scpi;
pub mod session;
