//! Trace data decoding.
//!
//! A trace reply arrives either as comma-separated ASCII floats or as an
//! IEEE-488.2 definite-length binary block:
//!
//! ```text
//! #<n><length><payload>
//!  |   |        |
//!  |   |        `- exactly <length> bytes of raw float64 data
//!  |   `---------- <n> ASCII digits giving the payload byte count
//!  `-------------- single digit: how many length digits follow
//! ```
//!
//! Binary payloads are consumed by byte count only and never token-split,
//! since any payload byte can collide with a delimiter value. Byte order is
//! applied exactly as configured; a wrong byte order cannot be detected here
//! and would garble every sample, which is why it is never guessed.
//!
//! The flat float sequence is interleaved per frequency point:
//! `re0, im0, re1, im1, ...`.

use bytes::Buf;
use num_complex::Complex64;

use crate::config::{ByteOrder, TraceFormat};
use crate::error::{VnaError, VnaResult};

/// One undecoded trace reply. Transient; exists only during a decode.
#[derive(Debug, Clone)]
pub struct RawTraceBlock {
    /// How the payload is encoded.
    pub encoding: TraceFormat,
    /// Byte count from the block header (binary only).
    pub declared_len: Option<usize>,
    /// Raw payload bytes, excluding any framing header.
    pub payload: Vec<u8>,
}

impl RawTraceBlock {
    /// Wrap an ASCII reply line.
    pub fn ascii(payload: Vec<u8>) -> Self {
        Self {
            encoding: TraceFormat::Ascii,
            declared_len: None,
            payload,
        }
    }

    /// Wrap a binary payload with its declared header length.
    pub fn binary(declared_len: usize, payload: Vec<u8>) -> Self {
        Self {
            encoding: TraceFormat::Binary,
            declared_len: Some(declared_len),
            payload,
        }
    }
}

/// Parse a complete definite-length block buffer (header plus payload).
///
/// Bytes past the declared length (a trailing terminator) are ignored; a
/// payload shorter than declared is a truncated transfer and fails.
pub fn parse_definite_block(raw: &[u8]) -> VnaResult<RawTraceBlock> {
    if raw.first() != Some(&b'#') {
        return Err(VnaError::MalformedData(
            "binary block does not start with '#'".to_string(),
        ));
    }
    let ndigits = raw
        .get(1)
        .and_then(|b| (*b as char).to_digit(10))
        .ok_or_else(|| {
            VnaError::MalformedData("binary block header missing digit count".to_string())
        })? as usize;
    if ndigits == 0 {
        return Err(VnaError::MalformedData(
            "indefinite-length block (#0) is not supported".to_string(),
        ));
    }

    let header_len = 2 + ndigits;
    if raw.len() < header_len {
        return Err(VnaError::MalformedData(format!(
            "binary block header truncated: expected {} length digits",
            ndigits
        )));
    }
    let declared = std::str::from_utf8(&raw[2..header_len])
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .ok_or_else(|| {
            VnaError::MalformedData("binary block length field is not numeric".to_string())
        })?;

    let payload = &raw[header_len..];
    if payload.len() < declared {
        return Err(VnaError::MalformedData(format!(
            "binary block truncated: declared {} bytes, received {}",
            declared,
            payload.len()
        )));
    }
    Ok(RawTraceBlock::binary(declared, payload[..declared].to_vec()))
}

/// Encode floats as a definite-length block (the inverse of
/// [`parse_definite_block`] + binary decode). Used by tests and simulators.
pub fn encode_definite_block(values: &[f64], byte_order: ByteOrder) -> Vec<u8> {
    let byte_len = values.len() * 8;
    let len_field = byte_len.to_string();
    let mut out = Vec::with_capacity(2 + len_field.len() + byte_len);
    out.push(b'#');
    out.push(b'0' + len_field.len() as u8);
    out.extend_from_slice(len_field.as_bytes());
    for value in values {
        match byte_order {
            ByteOrder::BigEndian => out.extend_from_slice(&value.to_be_bytes()),
            ByteOrder::LittleEndian => out.extend_from_slice(&value.to_le_bytes()),
        }
    }
    out
}

/// Decode a raw trace into complex samples, one per frequency point.
pub fn decode(
    block: &RawTraceBlock,
    byte_order: ByteOrder,
    expected_points: usize,
) -> VnaResult<Vec<Complex64>> {
    let flat = match block.encoding {
        TraceFormat::Ascii => decode_ascii(&block.payload)?,
        TraceFormat::Binary => decode_binary(block, byte_order)?,
    };
    pair_samples(&flat, expected_points)
}

fn decode_ascii(payload: &[u8]) -> VnaResult<Vec<f64>> {
    let text = std::str::from_utf8(payload)
        .map_err(|e| VnaError::MalformedData(format!("ASCII trace is not valid UTF-8: {}", e)))?;
    text.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|token| !token.is_empty())
        .map(|token| {
            token.parse::<f64>().map_err(|e| {
                VnaError::MalformedData(format!("bad numeric token '{}': {}", token, e))
            })
        })
        .collect()
}

fn decode_binary(block: &RawTraceBlock, byte_order: ByteOrder) -> VnaResult<Vec<f64>> {
    let declared = block.declared_len.ok_or_else(|| {
        VnaError::MalformedData("binary trace without a declared length".to_string())
    })?;
    if declared == 0 || declared % 8 != 0 {
        return Err(VnaError::MalformedData(format!(
            "binary block length {} is not a positive multiple of 8",
            declared
        )));
    }
    if block.payload.len() < declared {
        return Err(VnaError::MalformedData(format!(
            "binary block truncated: declared {} bytes, received {}",
            declared,
            block.payload.len()
        )));
    }

    let mut cursor = &block.payload[..declared];
    let mut flat = Vec::with_capacity(declared / 8);
    while cursor.has_remaining() {
        let value = match byte_order {
            ByteOrder::BigEndian => cursor.get_f64(),
            ByteOrder::LittleEndian => cursor.get_f64_le(),
        };
        flat.push(value);
    }
    Ok(flat)
}

fn pair_samples(flat: &[f64], expected_points: usize) -> VnaResult<Vec<Complex64>> {
    if flat.len() % 2 != 0 {
        return Err(VnaError::MalformedData(format!(
            "trace holds {} values, not an even count of re/im pairs",
            flat.len()
        )));
    }
    let samples: Vec<Complex64> = flat
        .chunks_exact(2)
        .map(|pair| Complex64::new(pair[0], pair[1]))
        .collect();
    if samples.len() != expected_points {
        return Err(VnaError::MalformedData(format!(
            "trace holds {} complex samples, expected {}",
            samples.len(),
            expected_points
        )));
    }
    Ok(samples)
}
