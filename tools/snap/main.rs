//! `vna_snap`: fetch S-parameter traces from a VNA and emit them as JSON.
//!
//! The instrument can be given on the command line (`--host`/`--gpib`) or
//! through a TOML settings file (`--config`, falling back to
//! `config/default.toml`). Flags override file values.
//!
//! ```text
//! vna_snap --host 192.168.1.40 --points 401 --binary --two-port > dut.json
//! RUST_LOG=debug vna_snap --gpib 20
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use rust_vna::config::{
    ByteOrder, InstrumentAddress, Settings, SweepConfig, TimeoutSettings, TraceFormat,
};
use rust_vna::instrument::Vna;

#[derive(Parser, Debug)]
#[command(
    name = "vna_snap",
    about = "Snapshot S-parameter traces from a vector network analyzer"
)]
struct Args {
    /// Settings file (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Instrument hostname or IP (raw SCPI socket)
    #[arg(long)]
    host: Option<String>,

    /// TCP port of the SCPI socket service
    #[arg(long, default_value_t = 5025)]
    tcp_port: u16,

    /// GPIB primary address (requires the instrument_visa feature)
    #[arg(long, conflicts_with = "host")]
    gpib: Option<u8>,

    /// GPIB board number
    #[arg(long, default_value_t = 0)]
    board: u8,

    /// Sweep point count to configure before acquiring
    #[arg(long)]
    points: Option<usize>,

    /// Use 64-bit binary trace transfers (little-endian)
    #[arg(long)]
    binary: bool,

    /// Acquire the full two-port network (ports 1 and 2)
    #[arg(long)]
    two_port: bool,

    /// Port for a one-port snapshot
    #[arg(long, default_value_t = 1)]
    port: u8,
}

/// Instrument address, timeouts and sweep defaults from flags or file.
fn resolve(args: &Args) -> Result<(InstrumentAddress, TimeoutSettings, SweepConfig)> {
    if let Some(host) = &args.host {
        let address = InstrumentAddress::Socket {
            host: host.clone(),
            port: args.tcp_port,
        };
        return Ok((address, TimeoutSettings::default(), SweepConfig::default()));
    }
    if let Some(primary) = args.gpib {
        let address = InstrumentAddress::Gpib {
            board: args.board,
            primary,
        };
        return Ok((address, TimeoutSettings::default(), SweepConfig::default()));
    }

    let settings = Settings::load(args.config.as_deref())
        .context("no --host or --gpib given, and no settings file could be loaded")?;
    Ok((settings.instrument, settings.timeouts, settings.sweep))
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let (address, timeouts, sweep) = resolve(&args)?;
    address.validate()?;

    let mut vna = Vna::connect(&address, timeouts)
        .await
        .with_context(|| format!("failed to connect to {}", address.resource_string()))?;

    let idn = vna.identify().await.context("identification query failed")?;
    info!("connected: {}", idn);

    let points = args.points.unwrap_or(sweep.num_points);
    vna.set_sweep_points(points).await?;
    if args.binary || sweep.format == TraceFormat::Binary {
        let order = if args.binary {
            ByteOrder::LittleEndian
        } else {
            sweep.byte_order
        };
        vna.use_binary(order).await?;
    }

    let network = if args.two_port {
        vna.get_two_port((1, 2)).await?
    } else {
        vna.get_one_port(args.port).await?
    };
    info!(
        "acquired {} with {} points",
        network.name.as_deref().unwrap_or("network"),
        network.num_points()
    );

    serde_json::to_writer_pretty(std::io::stdout().lock(), &network)
        .context("failed to write result")?;
    println!();

    vna.close().await?;
    Ok(())
}
