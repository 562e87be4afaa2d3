//! Vector network analyzer driver.
//!
//! Drives a two-port VNA over GPIB or a raw SCPI socket: sweep setup,
//! software-triggered acquisition, and retrieval of one-port and two-port
//! S-parameter traces as [`NetworkResult`] values.
//!
//! ## Protocol
//!
//! - Commands are newline-terminated SCPI lines (R&S ZVA command set).
//! - Trace replies are ASCII CSV or IEEE-488.2 definite-length binary
//!   blocks (`FORM:DATA REAL,64`), byte order per `FORM:BORD`.
//! - Triggering is half-duplex: `INIT<ch>:IMM` + `*OPC`, then the event
//!   status register is polled until the sweep completes.
//!
//! A two-port acquisition runs four sequential single-parameter cycles
//! sharing one frequency axis; each decoded trace is checked against the
//! instrument's own point count, so the four labels can never end up
//! misaligned.
//!
//! # Example Usage
//!
//! ```no_run
//! use rust_vna::config::{InstrumentAddress, TimeoutSettings};
//! use rust_vna::instrument::Vna;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let address = InstrumentAddress::Socket {
//!         host: "192.168.1.40".to_string(),
//!         port: 5025,
//!     };
//!     let mut vna = Vna::connect(&address, TimeoutSettings::default()).await?;
//!
//!     println!("connected to {}", vna.identify().await?);
//!
//!     vna.set_frequency_sweep(1.0e9, 3.0e9, 201).await?;
//!     let network = vna.get_one_port(1).await?;
//!     let s11_db = network.magnitude_db("S11").unwrap_or_default();
//!     println!("S11 at start of sweep: {:.2} dB", s11_db[0]);
//!
//!     vna.close().await?;
//!     Ok(())
//! }
//! ```

use std::collections::BTreeMap;

use log::info;

use crate::adapters::{self, Transport};
use crate::config::{ByteOrder, InstrumentAddress, SweepConfig, TimeoutSettings, TraceFormat};
use crate::error::{VnaError, VnaResult};
use crate::network::{self, NetworkResult};
use crate::scpi;
use crate::session::{Session, SessionState};

/// Driver for a two-port vector network analyzer.
pub struct Vna {
    session: Session,
    sweep: SweepConfig,
    channel: u8,
}

impl Vna {
    /// Open the transport for `address` and initialize the instrument
    /// session (clear status, ASCII transfer format, free-running sweeps
    /// off).
    pub async fn connect(
        address: &InstrumentAddress,
        timeouts: TimeoutSettings,
    ) -> VnaResult<Self> {
        let transport = adapters::open(address, &timeouts).await?;
        let mut vna = Self::with_transport(transport, timeouts);
        vna.initialize().await?;
        info!("connected to VNA at {}", address.resource_string());
        Ok(vna)
    }

    /// Wrap an already-open transport without sending anything. Callers
    /// must run [`Vna::initialize`] before acquiring.
    pub fn with_transport(transport: Box<dyn Transport>, timeouts: TimeoutSettings) -> Self {
        Self {
            session: Session::new(transport, timeouts),
            sweep: SweepConfig::default(),
            channel: 1,
        }
    }

    /// Put the instrument into the state the driver assumes: cleared status
    /// registers, ASCII trace format, manual sweep triggering.
    pub async fn initialize(&mut self) -> VnaResult<()> {
        self.session.command(scpi::clear_status()).await?;
        self.session
            .command(scpi::set_data_format(self.sweep.format))
            .await?;
        self.session
            .command(&scpi::set_continuous_sweep(self.channel, false))
            .await?;
        Ok(())
    }

    /// Current sweep/transfer state.
    pub fn sweep_config(&self) -> &SweepConfig {
        &self.sweep
    }

    /// Current acquisition state.
    pub fn session_state(&self) -> SessionState {
        self.session.state()
    }

    /// Return an errored session to `Idle`. Instrument-side state is not
    /// touched; callers should consider a [`Vna::reset`] after failures
    /// mid-sweep.
    pub fn reset_session(&mut self) {
        self.session.reset();
    }

    /// `*IDN?` identification string.
    pub async fn identify(&mut self) -> VnaResult<String> {
        self.session.query(scpi::identify()).await
    }

    /// Instrument preset (`*RST`).
    pub async fn reset(&mut self) -> VnaResult<()> {
        self.session.command(scpi::reset()).await
    }

    /// Clear status and event registers (`*CLS`).
    pub async fn clear_status(&mut self) -> VnaResult<()> {
        self.session.command(scpi::clear_status()).await
    }

    /// Set the sweep point count.
    pub async fn set_sweep_points(&mut self, num_points: usize) -> VnaResult<()> {
        let cmd = scpi::set_sweep_points(self.channel, num_points)?;
        self.session.command(&cmd).await?;
        self.sweep.num_points = num_points;
        Ok(())
    }

    /// Query the instrument's sweep point count.
    pub async fn sweep_points(&mut self) -> VnaResult<usize> {
        let reply = self
            .session
            .query(&scpi::query_sweep_points(self.channel))
            .await?;
        scpi::parse_usize(&reply)
    }

    /// Configure a frequency sweep. All three parameters are validated
    /// before any command is sent, so an invalid call leaves the instrument
    /// untouched.
    pub async fn set_frequency_sweep(
        &mut self,
        start_hz: f64,
        stop_hz: f64,
        num_points: usize,
    ) -> VnaResult<()> {
        let start_cmd = scpi::set_frequency_start(self.channel, start_hz)?;
        let stop_cmd = scpi::set_frequency_stop(self.channel, stop_hz)?;
        let points_cmd = scpi::set_sweep_points(self.channel, num_points)?;
        if start_hz >= stop_hz {
            return Err(VnaError::InvalidConfiguration(format!(
                "sweep start {} Hz must be below stop {} Hz",
                start_hz, stop_hz
            )));
        }

        self.session.command(&start_cmd).await?;
        self.session.command(&stop_cmd).await?;
        self.session.command(&points_cmd).await?;
        self.sweep.num_points = num_points;
        info!(
            "sweep configured: {} - {} Hz, {} points",
            start_hz, stop_hz, num_points
        );
        Ok(())
    }

    /// Switch trace transfers to ASCII. Slower, but immune to byte-order
    /// mistakes; the default.
    pub async fn use_ascii(&mut self) -> VnaResult<()> {
        self.session
            .command(scpi::set_data_format(TraceFormat::Ascii))
            .await?;
        self.sweep.format = TraceFormat::Ascii;
        Ok(())
    }

    /// Switch trace transfers to 64-bit binary blocks with the given byte
    /// order. Much faster for large sweeps.
    pub async fn use_binary(&mut self, byte_order: ByteOrder) -> VnaResult<()> {
        self.session
            .command(scpi::set_data_format(TraceFormat::Binary))
            .await?;
        self.session
            .command(scpi::set_byte_order(byte_order))
            .await?;
        self.sweep.format = TraceFormat::Binary;
        self.sweep.byte_order = byte_order;
        Ok(())
    }

    /// The instrument's current frequency axis in Hz.
    pub async fn frequency_axis(&mut self) -> VnaResult<Vec<f64>> {
        Ok(self.sweep_axis().await?.0)
    }

    /// Acquire the reflection parameter of one port as a one-port network.
    pub async fn get_one_port(&mut self, port: u8) -> VnaResult<NetworkResult> {
        let label = scpi::sparam_label(port, port)?;

        let (frequencies, points) = self.sweep_axis().await?;
        let samples = self
            .session
            .acquire_parameter(
                self.channel,
                &label,
                self.sweep.format,
                self.sweep.byte_order,
                points,
            )
            .await?;

        let mut params = BTreeMap::new();
        params.insert(label.clone(), samples);
        let network = network::assemble(frequencies, params, 1)?;
        Ok(network.with_name(label))
    }

    /// Acquire all four S-parameters of a port pair as a two-port network.
    ///
    /// Either every label comes back aligned to the shared frequency axis,
    /// or the call fails; partial results are never returned.
    pub async fn get_two_port(&mut self, ports: (u8, u8)) -> VnaResult<NetworkResult> {
        let (p1, p2) = ports;
        scpi::validate_port(p1)?;
        scpi::validate_port(p2)?;
        if p1 == p2 {
            return Err(VnaError::InvalidConfiguration(format!(
                "two-port acquisition needs two distinct ports, got ({}, {})",
                p1, p2
            )));
        }

        let (frequencies, points) = self.sweep_axis().await?;
        let mut params = BTreeMap::new();
        for &receive in &[p1, p2] {
            for &source in &[p1, p2] {
                let label = scpi::sparam_label(receive, source)?;
                let samples = self
                    .session
                    .acquire_parameter(
                        self.channel,
                        &label,
                        self.sweep.format,
                        self.sweep.byte_order,
                        points,
                    )
                    .await?;
                params.insert(label, samples);
            }
        }

        let network = network::assemble(frequencies, params, 2)?;
        Ok(network.with_name(format!("2-port ({},{})", p1, p2)))
    }

    /// Close the instrument connection.
    pub async fn close(&mut self) -> VnaResult<()> {
        self.session.close().await
    }

    /// Query sweep point count, spacing and limits; build the axis.
    async fn sweep_axis(&mut self) -> VnaResult<(Vec<f64>, usize)> {
        let points = {
            let reply = self
                .session
                .query(&scpi::query_sweep_points(self.channel))
                .await?;
            scpi::parse_usize(&reply)?
        };
        let sweep_type = {
            let reply = self
                .session
                .query(&scpi::query_sweep_type(self.channel))
                .await?;
            scpi::parse_sweep_type(&reply)
        };
        let start_hz = {
            let reply = self
                .session
                .query(&scpi::query_frequency_start(self.channel))
                .await?;
            scpi::parse_f64(&reply)?
        };
        let stop_hz = {
            let reply = self
                .session
                .query(&scpi::query_frequency_stop(self.channel))
                .await?;
            scpi::parse_f64(&reply)?
        };

        let axis = network::frequency_axis(start_hz, stop_hz, points, sweep_type)?;
        Ok((axis, points))
    }
}
