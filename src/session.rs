//! Acquisition session.
//!
//! One `Session` owns one open transport for its entire lifetime and runs the
//! half-duplex command/response traffic through it. Acquisition follows a
//! fixed state machine:
//!
//! ```text
//! Idle -> Configuring -> Triggered -> AwaitingData -> Decoding -> Ready
//!            |               |             |              |
//!            `---------------+------ Error <--------------'
//! ```
//!
//! Any failure in a non-terminal state parks the session in `Error`. The
//! session never self-recovers: after a failure the instrument's trigger
//! state is unknown, so only an explicit [`Session::reset`] by the caller
//! returns it to `Idle`. On a completion deadline the session stops issuing
//! commands entirely; no abort command is sent (aborting mid-sweep is an
//! instrument-specific operation outside this driver).

use log::{debug, info, warn};
use num_complex::Complex64;
use tokio::time::{sleep, Instant};

use crate::adapters::Transport;
use crate::block::{self, RawTraceBlock};
use crate::config::{ByteOrder, TimeoutSettings, TraceFormat};
use crate::error::{VnaError, VnaResult};
use crate::scpi;

/// Where the session currently is in the acquisition cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Nothing in flight.
    Idle,
    /// Issuing trace/sweep setup commands.
    Configuring,
    /// Sweep trigger sent.
    Triggered,
    /// Polling for sweep completion.
    AwaitingData,
    /// Trace reply being read and decoded.
    Decoding,
    /// Last acquisition completed; a new one may start.
    Ready,
    /// A failure occurred; requires an explicit reset.
    Error,
}

/// Exclusive owner of one instrument connection.
pub struct Session {
    transport: Box<dyn Transport>,
    timeouts: TimeoutSettings,
    state: SessionState,
}

impl Session {
    /// Wrap an open transport.
    pub fn new(transport: Box<dyn Transport>, timeouts: TimeoutSettings) -> Self {
        Self {
            transport,
            timeouts,
            state: SessionState::Idle,
        }
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Configured deadlines.
    pub fn timeouts(&self) -> &TimeoutSettings {
        &self.timeouts
    }

    /// Return an errored (or finished) session to `Idle`.
    ///
    /// This clears driver-side state only; the caller is responsible for any
    /// instrument-side cleanup after a failure.
    pub fn reset(&mut self) {
        debug!("session reset to idle from {:?}", self.state);
        self.state = SessionState::Idle;
    }

    /// Write one command line.
    pub async fn command(&mut self, line: &str) -> VnaResult<()> {
        match self.transport.write_line(line).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.state = SessionState::Error;
                Err(e)
            }
        }
    }

    /// Write a query and read its text reply.
    pub async fn query(&mut self, line: &str) -> VnaResult<String> {
        self.command(line).await?;
        self.read_line().await
    }

    /// Close the underlying transport.
    pub async fn close(&mut self) -> VnaResult<()> {
        self.transport.close().await
    }

    async fn read_line(&mut self) -> VnaResult<String> {
        match self.transport.read_line().await {
            Ok(line) => Ok(line),
            Err(e) => {
                self.state = SessionState::Error;
                Err(e)
            }
        }
    }

    async fn read_exact(&mut self, n: usize) -> VnaResult<Vec<u8>> {
        match self.transport.read_exact(n).await {
            Ok(bytes) => Ok(bytes),
            Err(e) => {
                self.state = SessionState::Error;
                Err(e)
            }
        }
    }

    fn decode_failure<T>(&mut self, err: VnaError) -> VnaResult<T> {
        self.state = SessionState::Error;
        Err(err)
    }

    /// Run one select/trigger/wait/read/decode cycle for a single
    /// S-parameter and return its complex samples in sweep order.
    pub async fn acquire_parameter(
        &mut self,
        channel: u8,
        label: &str,
        format: TraceFormat,
        byte_order: ByteOrder,
        expected_points: usize,
    ) -> VnaResult<Vec<Complex64>> {
        match self.state {
            SessionState::Idle | SessionState::Ready => {}
            SessionState::Error => {
                return Err(VnaError::InvalidConfiguration(
                    "session is in the error state; reset it before reuse".to_string(),
                ))
            }
            other => {
                return Err(VnaError::InvalidConfiguration(format!(
                    "session is busy ({:?})",
                    other
                )))
            }
        }
        scpi::validate_points(expected_points)?;

        debug!("acquiring {} ({} points)", label, expected_points);
        let trace = scpi::trace_name(label);

        self.state = SessionState::Configuring;
        self.command(&scpi::define_parameter(channel, &trace, label))
            .await?;
        self.command(&scpi::select_parameter(channel, &trace))
            .await?;

        self.state = SessionState::Triggered;
        self.command(scpi::clear_status()).await?;
        self.command(&scpi::single_sweep(channel)).await?;
        self.command(scpi::operation_complete()).await?;

        self.state = SessionState::AwaitingData;
        self.wait_sweep_complete().await?;
        self.command(&scpi::trace_data_query(channel)).await?;

        self.state = SessionState::Decoding;
        let raw = self.read_trace_reply(format).await?;
        let samples = match block::decode(&raw, byte_order, expected_points) {
            Ok(samples) => samples,
            Err(e) => return self.decode_failure(e),
        };

        self.command(&scpi::delete_parameter(channel, &trace))
            .await?;
        self.state = SessionState::Ready;
        info!("acquired {} with {} points", label, samples.len());
        Ok(samples)
    }

    /// Poll the event status register until the OPC bit set by `*OPC`
    /// appears, backing off exponentially, bounded by the completion
    /// deadline.
    async fn wait_sweep_complete(&mut self) -> VnaResult<()> {
        let deadline = Instant::now() + self.timeouts.completion;
        let mut interval = self.timeouts.opc_poll_initial;
        loop {
            let reply = self.query(scpi::event_status_query()).await?;
            match scpi::parse_esr_opc(&reply) {
                Ok(true) => return Ok(()),
                Ok(false) => {}
                Err(e) => return self.decode_failure(e),
            }
            if Instant::now() + interval > deadline {
                warn!(
                    "sweep did not complete within {:?}",
                    self.timeouts.completion
                );
                self.state = SessionState::Error;
                return Err(VnaError::Timeout(self.timeouts.completion));
            }
            sleep(interval).await;
            interval = (interval * 2).min(self.timeouts.opc_poll_max);
        }
    }

    async fn read_trace_reply(&mut self, format: TraceFormat) -> VnaResult<RawTraceBlock> {
        match format {
            TraceFormat::Ascii => {
                let line = self.read_line().await?;
                Ok(RawTraceBlock::ascii(line.into_bytes()))
            }
            TraceFormat::Binary => self.read_binary_block().await,
        }
    }

    /// Read a definite-length block straight off the wire: `#`, one digit
    /// giving the length-field width, the length field, then exactly that
    /// many payload bytes. The payload is consumed by count only; embedded
    /// terminator-valued bytes must not end the read.
    async fn read_binary_block(&mut self) -> VnaResult<RawTraceBlock> {
        let header = self.read_exact(2).await?;
        if header[0] != b'#' {
            return self.decode_failure(VnaError::MalformedData(format!(
                "binary reply starts with 0x{:02x}, not '#'",
                header[0]
            )));
        }
        let ndigits = match (header[1] as char).to_digit(10) {
            Some(0) => {
                return self.decode_failure(VnaError::MalformedData(
                    "indefinite-length block (#0) is not supported".to_string(),
                ))
            }
            Some(n) => n as usize,
            None => {
                return self.decode_failure(VnaError::MalformedData(format!(
                    "binary block digit count is not numeric: 0x{:02x}",
                    header[1]
                )))
            }
        };

        let length_field = self.read_exact(ndigits).await?;
        let declared = match std::str::from_utf8(&length_field)
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
        {
            Some(len) => len,
            None => {
                return self.decode_failure(VnaError::MalformedData(
                    "binary block length field is not numeric".to_string(),
                ))
            }
        };

        let payload = self.read_exact(declared).await?;
        // Trailing terminator after the block; absent on some firmwares.
        let _ = self.transport.read_exact(1).await;
        Ok(RawTraceBlock::binary(declared, payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{Exchange, MockTransport};
    use crate::block::encode_definite_block;
    use std::time::Duration;

    fn fast_timeouts() -> TimeoutSettings {
        TimeoutSettings {
            completion: Duration::from_millis(50),
            opc_poll_initial: Duration::from_millis(1),
            opc_poll_max: Duration::from_millis(4),
            ..TimeoutSettings::default()
        }
    }

    fn acquisition_script(label: &str, data_reply: Exchange) -> Vec<Exchange> {
        let trace = format!("TRC_{}", label);
        vec![
            Exchange::command(&format!("CALC1:PAR:SDEF '{}','{}'", trace, label)),
            Exchange::command(&format!("CALC1:PAR:SEL '{}'", trace)),
            Exchange::command("*CLS"),
            Exchange::command("INIT1:IMM"),
            Exchange::command("*OPC"),
            Exchange::query("*ESR?", "1"),
            data_reply,
            Exchange::command(&format!("CALC1:PAR:DEL '{}'", trace)),
        ]
    }

    #[tokio::test]
    async fn test_ascii_acquisition_reaches_ready() {
        let script = acquisition_script(
            "S11",
            Exchange::query("CALC1:DATA? SDATA", "1,0,0.5,0.5,-1,0"),
        );
        let mock = MockTransport::new(script);
        let mut session = Session::new(Box::new(mock), fast_timeouts());

        let samples = session
            .acquire_parameter(
                1,
                "S11",
                TraceFormat::Ascii,
                ByteOrder::LittleEndian,
                3,
            )
            .await
            .unwrap();

        assert_eq!(samples.len(), 3);
        assert_eq!(samples[0], Complex64::new(1.0, 0.0));
        assert_eq!(session.state(), SessionState::Ready);
    }

    #[tokio::test]
    async fn test_binary_acquisition_reads_by_length() {
        // Payload bytes that contain 0x0a must not terminate the read.
        let values = [1.0, 0.0, f64::from_bits(0x0a0a_0a0a_0a0a_0a0a), -1.0];
        let mut reply = encode_definite_block(&values, ByteOrder::BigEndian);
        reply.push(b'\n');
        let script = acquisition_script("S21", Exchange::query_raw("CALC1:DATA? SDATA", reply));
        let mock = MockTransport::new(script);
        let mut session = Session::new(Box::new(mock), fast_timeouts());

        let samples = session
            .acquire_parameter(1, "S21", TraceFormat::Binary, ByteOrder::BigEndian, 2)
            .await
            .unwrap();

        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0], Complex64::new(1.0, 0.0));
        assert_eq!(samples[1].im, -1.0);
        assert_eq!(session.state(), SessionState::Ready);
    }

    #[tokio::test]
    async fn test_completion_deadline_parks_session_in_error() {
        let trace = "TRC_S11";
        let script = vec![
            Exchange::command(&format!("CALC1:PAR:SDEF '{}','S11'", trace)),
            Exchange::command(&format!("CALC1:PAR:SEL '{}'", trace)),
            Exchange::command("*CLS"),
            Exchange::command("INIT1:IMM"),
            Exchange::command("*OPC"),
            Exchange::query("*ESR?", "0"),
        ];
        let mock = MockTransport::new(script);
        let timeouts = TimeoutSettings {
            completion: Duration::ZERO,
            opc_poll_initial: Duration::from_millis(1),
            ..TimeoutSettings::default()
        };
        let mut session = Session::new(Box::new(mock), timeouts);

        let err = session
            .acquire_parameter(
                1,
                "S11",
                TraceFormat::Ascii,
                ByteOrder::LittleEndian,
                3,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, VnaError::Timeout(_)));
        assert_eq!(session.state(), SessionState::Error);

        // An errored session refuses work until explicitly reset.
        let err = session
            .acquire_parameter(
                1,
                "S11",
                TraceFormat::Ascii,
                ByteOrder::LittleEndian,
                3,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, VnaError::InvalidConfiguration(_)));

        session.reset();
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_decode_failure_parks_session_in_error() {
        let script = acquisition_script(
            "S11",
            Exchange::query("CALC1:DATA? SDATA", "1,0,0.5"),
        );
        let mock = MockTransport::new(script);
        let mut session = Session::new(Box::new(mock), fast_timeouts());

        let err = session
            .acquire_parameter(
                1,
                "S11",
                TraceFormat::Ascii,
                ByteOrder::LittleEndian,
                3,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, VnaError::MalformedData(_)));
        assert_eq!(session.state(), SessionState::Error);
    }

    #[tokio::test]
    async fn test_opc_poll_retries_until_complete() {
        let trace = "TRC_S11";
        let script = vec![
            Exchange::command(&format!("CALC1:PAR:SDEF '{}','S11'", trace)),
            Exchange::command(&format!("CALC1:PAR:SEL '{}'", trace)),
            Exchange::command("*CLS"),
            Exchange::command("INIT1:IMM"),
            Exchange::command("*OPC"),
            Exchange::query("*ESR?", "0"),
            Exchange::query("*ESR?", "0"),
            Exchange::query("*ESR?", "1"),
            Exchange::query("CALC1:DATA? SDATA", "1,0"),
            Exchange::command(&format!("CALC1:PAR:DEL '{}'", trace)),
        ];
        let mock = MockTransport::new(script);
        let mut session = Session::new(Box::new(mock), fast_timeouts());

        let samples = session
            .acquire_parameter(
                1,
                "S11",
                TraceFormat::Ascii,
                ByteOrder::LittleEndian,
                1,
            )
            .await
            .unwrap();
        assert_eq!(samples, vec![Complex64::new(1.0, 0.0)]);
    }
}
