//! SCPI command builders and reply parsers.
//!
//! Pure string construction and parsing, decoupled from the live transport:
//! all I/O happens in the session. Builders that take caller parameters
//! validate them here and fail with `InvalidConfiguration` before a single
//! byte is written, so a rejected intent never leaves a partial command on
//! the wire.
//!
//! The mnemonics follow the Rohde & Schwarz ZVA command set: trace handling
//! under `CALCulate:PARameter`, sweep state under `SENSe`, transfer format
//! under `FORMat`, and the IEEE-488.2 common commands (`*IDN?`, `*OPC`,
//! `*ESR?`, ...) for status and synchronization.

use crate::config::{ByteOrder, SweepType, TraceFormat};
use crate::error::{VnaError, VnaResult};

/// Ports addressable by this driver.
pub const NPORTS: u8 = 2;

/// Identification query.
pub fn identify() -> &'static str {
    "*IDN?"
}

/// Instrument preset.
pub fn reset() -> &'static str {
    "*RST"
}

/// Clear the status and event registers.
pub fn clear_status() -> &'static str {
    "*CLS"
}

/// Raise the OPC bit in the event status register once all pending
/// operations finish.
pub fn operation_complete() -> &'static str {
    "*OPC"
}

/// Read (and clear) the event status register.
pub fn event_status_query() -> &'static str {
    "*ESR?"
}

/// Reject port indices outside the instrument's port range.
pub fn validate_port(port: u8) -> VnaResult<()> {
    if port == 0 || port > NPORTS {
        return Err(VnaError::InvalidConfiguration(format!(
            "port {} out of range (1-{})",
            port, NPORTS
        )));
    }
    Ok(())
}

/// Reject empty sweeps.
pub fn validate_points(num_points: usize) -> VnaResult<()> {
    if num_points == 0 {
        return Err(VnaError::InvalidConfiguration(
            "sweep point count must be positive".to_string(),
        ));
    }
    Ok(())
}

/// S-parameter label for a receive/source port pair, e.g. `S21`.
pub fn sparam_label(receive_port: u8, source_port: u8) -> VnaResult<String> {
    validate_port(receive_port)?;
    validate_port(source_port)?;
    Ok(format!("S{}{}", receive_port, source_port))
}

/// Driver-owned trace name for an S-parameter label.
pub fn trace_name(label: &str) -> String {
    format!("TRC_{}", label)
}

/// Create a measurement trace for an S-parameter.
pub fn define_parameter(channel: u8, trace: &str, label: &str) -> String {
    format!("CALC{}:PAR:SDEF '{}','{}'", channel, trace, label)
}

/// Make a trace the active one for data readout.
pub fn select_parameter(channel: u8, trace: &str) -> String {
    format!("CALC{}:PAR:SEL '{}'", channel, trace)
}

/// Remove a trace.
pub fn delete_parameter(channel: u8, trace: &str) -> String {
    format!("CALC{}:PAR:DEL '{}'", channel, trace)
}

/// Set the sweep point count.
pub fn set_sweep_points(channel: u8, num_points: usize) -> VnaResult<String> {
    validate_points(num_points)?;
    Ok(format!("SENS{}:SWE:POIN {}", channel, num_points))
}

/// Query the sweep point count.
pub fn query_sweep_points(channel: u8) -> String {
    format!("SENS{}:SWE:POIN?", channel)
}

fn validate_frequency(hz: f64) -> VnaResult<()> {
    if !hz.is_finite() || hz <= 0.0 {
        return Err(VnaError::InvalidConfiguration(format!(
            "frequency {} Hz is not a positive finite value",
            hz
        )));
    }
    Ok(())
}

/// Set the sweep start frequency in Hz.
pub fn set_frequency_start(channel: u8, hz: f64) -> VnaResult<String> {
    validate_frequency(hz)?;
    Ok(format!("SENS{}:FREQ:STAR {}", channel, hz))
}

/// Set the sweep stop frequency in Hz.
pub fn set_frequency_stop(channel: u8, hz: f64) -> VnaResult<String> {
    validate_frequency(hz)?;
    Ok(format!("SENS{}:FREQ:STOP {}", channel, hz))
}

/// Query the sweep start frequency.
pub fn query_frequency_start(channel: u8) -> String {
    format!("SENS{}:FREQ:STAR?", channel)
}

/// Query the sweep stop frequency.
pub fn query_frequency_stop(channel: u8) -> String {
    format!("SENS{}:FREQ:STOP?", channel)
}

/// Query the sweep spacing (LIN/LOG).
pub fn query_sweep_type(channel: u8) -> String {
    format!("SENS{}:SWE:TYPE?", channel)
}

/// Select the trace transfer encoding.
pub fn set_data_format(format: TraceFormat) -> &'static str {
    match format {
        TraceFormat::Ascii => "FORM:DATA ASCII",
        TraceFormat::Binary => "FORM:DATA REAL,64",
    }
}

/// Select the byte order for binary transfers.
pub fn set_byte_order(order: ByteOrder) -> &'static str {
    match order {
        ByteOrder::BigEndian => "FORM:BORD NORM",
        ByteOrder::LittleEndian => "FORM:BORD SWAP",
    }
}

/// Enable or disable free-running sweeps.
pub fn set_continuous_sweep(channel: u8, on: bool) -> String {
    format!(
        "INIT{}:CONT {}",
        channel,
        if on { "ON" } else { "OFF" }
    )
}

/// Start one sweep.
pub fn single_sweep(channel: u8) -> String {
    format!("INIT{}:IMM", channel)
}

/// Request the active trace's complex data.
pub fn trace_data_query(channel: u8) -> String {
    format!("CALC{}:DATA? SDATA", channel)
}

/// Parse a scalar float reply such as `+2.0000000000E+009`.
pub fn parse_f64(reply: &str) -> VnaResult<f64> {
    reply.trim().parse::<f64>().map_err(|e| {
        VnaError::MalformedData(format!("expected a float reply, got '{}': {}", reply, e))
    })
}

/// Parse an integer count reply such as `201`.
pub fn parse_usize(reply: &str) -> VnaResult<usize> {
    let trimmed = reply.trim().trim_start_matches('+');
    trimmed.parse::<usize>().map_err(|e| {
        VnaError::MalformedData(format!("expected a count reply, got '{}': {}", reply, e))
    })
}

/// Interpret a `SENS:SWE:TYPE?` reply.
pub fn parse_sweep_type(reply: &str) -> SweepType {
    if reply.trim().to_uppercase().contains("LOG") {
        SweepType::Logarithmic
    } else {
        SweepType::Linear
    }
}

/// Whether the OPC bit is set in an `*ESR?` reply.
pub fn parse_esr_opc(reply: &str) -> VnaResult<bool> {
    let value = reply.trim().parse::<i64>().map_err(|e| {
        VnaError::MalformedData(format!(
            "expected an event status register value, got '{}': {}",
            reply, e
        ))
    })?;
    Ok(value & 0x01 != 0)
}
