//! Network result assembly.
//!
//! Pure packaging of decoded traces into a frequency-indexed result; no I/O
//! happens here. Assembly is all-or-nothing: a result either carries every
//! required S-parameter fully aligned to the frequency axis, or construction
//! fails and nothing is returned.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use num_complex::Complex64;
use serde::Serialize;

use crate::config::SweepType;
use crate::error::{VnaError, VnaResult};

/// Labels a two-port result must carry.
pub const TWO_PORT_LABELS: [&str; 4] = ["S11", "S12", "S21", "S22"];

/// A measured one-port or two-port network.
///
/// Invariant: every S-parameter vector has exactly one sample per entry in
/// `frequencies`. Enforced at construction; the sample maps are private so
/// the invariant cannot be broken afterwards.
#[derive(Debug, Clone, Serialize)]
pub struct NetworkResult {
    /// Optional caller-supplied name.
    pub name: Option<String>,
    /// When assembly completed.
    pub acquired_at: DateTime<Utc>,
    /// 1 or 2.
    pub port_count: u8,
    /// Frequency axis in Hz, in sweep order.
    pub frequencies: Vec<f64>,
    s: BTreeMap<String, Vec<Complex64>>,
}

impl NetworkResult {
    /// S-parameter labels present, in lexical order.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.s.keys().map(String::as_str)
    }

    /// Complex samples for one label, frequency-ordered.
    pub fn parameter(&self, label: &str) -> Option<&[Complex64]> {
        self.s.get(label).map(Vec::as_slice)
    }

    /// Number of frequency points.
    pub fn num_points(&self) -> usize {
        self.frequencies.len()
    }

    /// Magnitude in dB for one label.
    pub fn magnitude_db(&self, label: &str) -> Option<Vec<f64>> {
        self.s
            .get(label)
            .map(|samples| samples.iter().map(|s| 20.0 * s.norm().log10()).collect())
    }

    /// Phase in degrees for one label.
    pub fn phase_deg(&self, label: &str) -> Option<Vec<f64>> {
        self.s
            .get(label)
            .map(|samples| samples.iter().map(|s| s.arg().to_degrees()).collect())
    }

    /// Attach a name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Package a frequency axis and per-parameter samples into a network.
///
/// One-port results carry exactly one label; two-port results carry exactly
/// S11, S12, S21 and S22. Any missing or surplus label, or any sample count
/// disagreeing with the frequency axis, fails with `IncompleteNetwork`.
pub fn assemble(
    frequencies: Vec<f64>,
    params: BTreeMap<String, Vec<Complex64>>,
    port_count: u8,
) -> VnaResult<NetworkResult> {
    match port_count {
        1 => {
            if params.len() != 1 {
                return Err(VnaError::IncompleteNetwork(format!(
                    "one-port network needs exactly one parameter, got {}",
                    params.len()
                )));
            }
        }
        2 => {
            for label in TWO_PORT_LABELS {
                if !params.contains_key(label) {
                    return Err(VnaError::IncompleteNetwork(format!(
                        "two-port network is missing {}",
                        label
                    )));
                }
            }
            if params.len() != TWO_PORT_LABELS.len() {
                let surplus: Vec<&str> = params
                    .keys()
                    .map(String::as_str)
                    .filter(|l| !TWO_PORT_LABELS.contains(l))
                    .collect();
                return Err(VnaError::IncompleteNetwork(format!(
                    "two-port network has surplus parameters: {}",
                    surplus.join(", ")
                )));
            }
        }
        n => {
            return Err(VnaError::IncompleteNetwork(format!(
                "unsupported port count {}",
                n
            )))
        }
    }

    for (label, samples) in &params {
        if samples.len() != frequencies.len() {
            return Err(VnaError::IncompleteNetwork(format!(
                "{} holds {} samples but the frequency axis has {} points",
                label,
                samples.len(),
                frequencies.len()
            )));
        }
    }

    Ok(NetworkResult {
        name: None,
        acquired_at: Utc::now(),
        port_count,
        frequencies,
        s: params,
    })
}

/// Reconstruct the sweep's frequency axis from its limits.
pub fn frequency_axis(
    start_hz: f64,
    stop_hz: f64,
    num_points: usize,
    sweep_type: SweepType,
) -> VnaResult<Vec<f64>> {
    if num_points == 0 {
        return Err(VnaError::InvalidConfiguration(
            "frequency axis requires at least one point".to_string(),
        ));
    }
    if !start_hz.is_finite() || !stop_hz.is_finite() || start_hz <= 0.0 || stop_hz <= 0.0 {
        return Err(VnaError::InvalidConfiguration(format!(
            "frequency limits {} - {} Hz are not positive finite values",
            start_hz, stop_hz
        )));
    }
    if num_points == 1 {
        return Ok(vec![start_hz]);
    }

    let span = num_points as f64 - 1.0;
    let axis = match sweep_type {
        SweepType::Linear => (0..num_points)
            .map(|i| start_hz + (stop_hz - start_hz) * (i as f64 / span))
            .collect(),
        SweepType::Logarithmic => {
            let log_start = start_hz.log10();
            let log_stop = stop_hz.log10();
            (0..num_points)
                .map(|i| 10f64.powf(log_start + (log_stop - log_start) * (i as f64 / span)))
                .collect()
        }
    };
    Ok(axis)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constant_trace(value: Complex64, len: usize) -> Vec<Complex64> {
        vec![value; len]
    }

    fn two_port_params(len: usize) -> BTreeMap<String, Vec<Complex64>> {
        TWO_PORT_LABELS
            .iter()
            .map(|&l| (l.to_string(), constant_trace(Complex64::new(0.5, 0.0), len)))
            .collect()
    }

    #[test]
    fn test_assemble_one_port() {
        let mut params = BTreeMap::new();
        params.insert(
            "S11".to_string(),
            constant_trace(Complex64::new(1.0, 0.0), 3),
        );
        let network = assemble(vec![1.0e9, 1.5e9, 2.0e9], params, 1).unwrap();
        assert_eq!(network.port_count, 1);
        assert_eq!(network.num_points(), 3);
        assert_eq!(network.parameter("S11").unwrap().len(), 3);
        assert!(network.parameter("S21").is_none());
    }

    #[test]
    fn test_assemble_two_port_requires_all_labels() {
        let mut params = two_port_params(2);
        params.remove("S12");
        let err = assemble(vec![1.0e9, 2.0e9], params, 2).unwrap_err();
        assert!(matches!(err, VnaError::IncompleteNetwork(_)));
        assert!(err.to_string().contains("S12"));
    }

    #[test]
    fn test_assemble_two_port_rejects_surplus_label() {
        let mut params = two_port_params(2);
        params.insert(
            "S33".to_string(),
            constant_trace(Complex64::new(0.0, 0.0), 2),
        );
        assert!(matches!(
            assemble(vec![1.0e9, 2.0e9], params, 2),
            Err(VnaError::IncompleteNetwork(_))
        ));
    }

    #[test]
    fn test_assemble_rejects_misaligned_trace() {
        let mut params = two_port_params(2);
        if let Some(samples) = params.get_mut("S21") {
            samples.pop();
        }
        assert!(matches!(
            assemble(vec![1.0e9, 2.0e9], params, 2),
            Err(VnaError::IncompleteNetwork(_))
        ));
    }

    #[test]
    fn test_assemble_one_port_rejects_two_labels() {
        let mut params = BTreeMap::new();
        params.insert(
            "S11".to_string(),
            constant_trace(Complex64::new(1.0, 0.0), 2),
        );
        params.insert(
            "S22".to_string(),
            constant_trace(Complex64::new(1.0, 0.0), 2),
        );
        assert!(matches!(
            assemble(vec![1.0e9, 2.0e9], params, 1),
            Err(VnaError::IncompleteNetwork(_))
        ));
    }

    #[test]
    fn test_magnitude_and_phase_accessors() {
        let mut params = BTreeMap::new();
        params.insert(
            "S11".to_string(),
            vec![Complex64::new(1.0, 0.0), Complex64::new(0.0, 0.1)],
        );
        let network = assemble(vec![1.0e9, 2.0e9], params, 1).unwrap();

        let db = network.magnitude_db("S11").unwrap();
        assert!((db[0] - 0.0).abs() < 1e-12);
        assert!((db[1] - (-20.0)).abs() < 1e-9);

        let deg = network.phase_deg("S11").unwrap();
        assert!((deg[0] - 0.0).abs() < 1e-12);
        assert!((deg[1] - 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_linear_frequency_axis() {
        let axis = frequency_axis(1.0e9, 2.0e9, 3, SweepType::Linear).unwrap();
        assert_eq!(axis, vec![1.0e9, 1.5e9, 2.0e9]);
    }

    #[test]
    fn test_log_frequency_axis() {
        let axis = frequency_axis(1.0e6, 1.0e8, 3, SweepType::Logarithmic).unwrap();
        assert_eq!(axis.len(), 3);
        assert!((axis[0] - 1.0e6).abs() < 1.0);
        assert!((axis[1] - 1.0e7).abs() < 1.0);
        assert!((axis[2] - 1.0e8).abs() < 1.0);
    }

    #[test]
    fn test_single_point_axis() {
        let axis = frequency_axis(5.0e9, 5.0e9, 1, SweepType::Linear).unwrap();
        assert_eq!(axis, vec![5.0e9]);
    }

    #[test]
    fn test_axis_rejects_bad_limits() {
        assert!(frequency_axis(0.0, 1.0e9, 3, SweepType::Linear).is_err());
        assert!(frequency_axis(1.0e9, f64::NAN, 3, SweepType::Linear).is_err());
        assert!(frequency_axis(1.0e9, 2.0e9, 0, SweepType::Linear).is_err());
    }
}
