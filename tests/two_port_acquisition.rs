//! Two-port acquisition: four sequential parameter cycles on one axis.

use num_complex::Complex64;

use rust_vna::adapters::{Exchange, MockTransport};
use rust_vna::config::TimeoutSettings;
use rust_vna::error::VnaError;
use rust_vna::instrument::Vna;
use rust_vna::network::TWO_PORT_LABELS;
use rust_vna::session::SessionState;

fn init_script() -> Vec<Exchange> {
    vec![
        Exchange::command("*CLS"),
        Exchange::command("FORM:DATA ASCII"),
        Exchange::command("INIT1:CONT OFF"),
    ]
}

fn axis_script() -> Vec<Exchange> {
    vec![
        Exchange::query("SENS1:SWE:POIN?", "2"),
        Exchange::query("SENS1:SWE:TYPE?", "LIN"),
        Exchange::query("SENS1:FREQ:STAR?", "1000000000"),
        Exchange::query("SENS1:FREQ:STOP?", "2000000000"),
    ]
}

fn acquisition_script(label: &str, data: &str) -> Vec<Exchange> {
    let trace = format!("TRC_{}", label);
    vec![
        Exchange::command(&format!("CALC1:PAR:SDEF '{}','{}'", trace, label)),
        Exchange::command(&format!("CALC1:PAR:SEL '{}'", trace)),
        Exchange::command("*CLS"),
        Exchange::command("INIT1:IMM"),
        Exchange::command("*OPC"),
        Exchange::query("*ESR?", "1"),
        Exchange::query("CALC1:DATA? SDATA", data),
        Exchange::command(&format!("CALC1:PAR:DEL '{}'", trace)),
    ]
}

fn fast_timeouts() -> TimeoutSettings {
    TimeoutSettings {
        opc_poll_initial: std::time::Duration::from_millis(1),
        ..TimeoutSettings::default()
    }
}

#[tokio::test]
async fn two_port_carries_all_four_labels_on_one_axis() {
    let mut script = init_script();
    script.extend(axis_script());
    // The driver reads receive-port major: S11, S12, S21, S22.
    script.extend(acquisition_script("S11", "0.9,0,0.8,0"));
    script.extend(acquisition_script("S12", "0.01,0,0.02,0"));
    script.extend(acquisition_script("S21", "0.5,0.5,0.4,0.4"));
    script.extend(acquisition_script("S22", "-0.9,0,-0.8,0"));
    let mock = MockTransport::new(script);

    let mut vna = Vna::with_transport(Box::new(mock), fast_timeouts());
    vna.initialize().await.unwrap();
    let network = vna.get_two_port((1, 2)).await.unwrap();

    assert_eq!(network.port_count, 2);
    assert_eq!(network.frequencies, vec![1.0e9, 2.0e9]);
    for label in TWO_PORT_LABELS {
        let samples = network.parameter(label).unwrap();
        assert_eq!(samples.len(), network.num_points(), "{} misaligned", label);
    }
    assert_eq!(
        network.parameter("S21").unwrap()[0],
        Complex64::new(0.5, 0.5)
    );
    assert_eq!(
        network.parameter("S22").unwrap()[1],
        Complex64::new(-0.8, 0.0)
    );
}

#[tokio::test]
async fn two_port_never_returns_partial_results() {
    let mut script = init_script();
    script.extend(axis_script());
    script.extend(acquisition_script("S11", "0.9,0,0.8,0"));
    script.extend(acquisition_script("S12", "0.01,0,0.02,0"));
    // Third trace replies with an odd token count: decode must fail.
    script.extend(acquisition_script("S21", "0.5,0.5,0.4"));
    let mock = MockTransport::new(script);

    let mut vna = Vna::with_transport(Box::new(mock), fast_timeouts());
    vna.initialize().await.unwrap();
    let err = vna.get_two_port((1, 2)).await.unwrap_err();

    assert!(matches!(err, VnaError::MalformedData(_)));
    assert_eq!(vna.session_state(), SessionState::Error);
}

#[tokio::test]
async fn two_port_rejects_duplicate_ports() {
    let mock = MockTransport::new(init_script());
    let sent = mock.sent_log();

    let mut vna = Vna::with_transport(Box::new(mock), fast_timeouts());
    vna.initialize().await.unwrap();
    let sent_after_init = sent.lock().unwrap().len();

    let err = vna.get_two_port((1, 1)).await.unwrap_err();
    assert!(matches!(err, VnaError::InvalidConfiguration(_)));
    assert_eq!(sent.lock().unwrap().len(), sent_after_init);
}

#[tokio::test]
async fn two_port_rejects_out_of_range_port() {
    let mock = MockTransport::new(init_script());
    let mut vna = Vna::with_transport(Box::new(mock), fast_timeouts());
    vna.initialize().await.unwrap();

    let err = vna.get_two_port((1, 3)).await.unwrap_err();
    assert!(matches!(err, VnaError::InvalidConfiguration(_)));
}
