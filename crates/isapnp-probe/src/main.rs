//! isapnp - ISA Plug and Play bus scanner
//!
//! Isolates every PnP card, assigns CSNs and dumps resource data to
//! `<ID><suffix>.BIN` files.

#![deny(static_mut_refs)]
#![deny(unused_must_use)]
#![deny(clippy::unwrap_used)]

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use isapnp_probe::sim::SimulatedBus;
use isapnp_probe::{
    DevPort, DirectorySink, PortIo, PortScanner, ProbeConfig, ResourceReport, ResourceStatus,
    ScanContext, ScanReport,
};
use isapnp_protocol::{SliceSource, parse_resource_stream};
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "isapnp")]
#[command(about = "ISA Plug and Play scanner - isolate cards and dump their resource data")]
#[command(version)]
struct Cli {
    /// YAML configuration file
    #[arg(short, long, global = true, env = "ISAPNP_CONFIG")]
    config: Option<PathBuf>,

    /// Directory receiving the .BIN dumps
    #[arg(short, long, global = true, env = "ISAPNP_OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    /// Port I/O device
    #[arg(long, global = true, env = "ISAPNP_DEVICE")]
    device: Option<PathBuf>,

    /// Skip the UMC Super I/O probe
    #[arg(long, global = true)]
    no_superio: bool,

    /// Scan a built-in simulated bus instead of real hardware
    #[arg(long, global = true)]
    simulate: bool,

    #[arg(
        long,
        global = true,
        help = "Output in JSON format for machine parsing"
    )]
    json: bool,

    /// Verbose logging (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan the bus (default)
    Scan,

    /// Decode a resource dump written by an earlier scan
    Decode {
        /// Dump file, e.g. CTL0042A.BIN
        file: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "isapnp={log_level},isapnp_probe={log_level},isapnp_protocol={log_level}"
                )
                .into()
            }),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    match execute(&cli) {
        Ok(code) => code,
        Err(e) => {
            if cli.json {
                println!("{}", serde_json::json!({ "error": format!("{e:#}") }));
            } else {
                eprintln!("Error: {e:#}");
            }
            ExitCode::FAILURE
        }
    }
}

fn execute(cli: &Cli) -> Result<ExitCode> {
    match &cli.command {
        None | Some(Commands::Scan) => run_scan(cli),
        Some(Commands::Decode { file }) => run_decode(file, cli.json),
    }
}

fn load_config(cli: &Cli) -> Result<ProbeConfig> {
    let mut config = match &cli.config {
        Some(path) => ProbeConfig::load(path)
            .with_context(|| format!("loading configuration {}", path.display()))?,
        None => ProbeConfig::default(),
    };
    if let Some(dir) = &cli.output_dir {
        config.output_dir.clone_from(dir);
    }
    if let Some(device) = &cli.device {
        config.device.clone_from(device);
    }
    if cli.no_superio {
        config.superio = false;
    }
    config.validate()?;
    Ok(config)
}

fn run_scan(cli: &Cli) -> Result<ExitCode> {
    let config = load_config(cli)?;
    std::fs::create_dir_all(&config.output_dir)
        .with_context(|| format!("creating {}", config.output_dir.display()))?;
    let sink = DirectorySink::new(&config.output_dir);
    debug!("dump files go to {}", sink.dir().display());

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop_clone = Arc::clone(&stop);
        ctrlc::set_handler(move || {
            stop_clone.store(true, Ordering::Relaxed);
        })
        .context("failed to install Ctrl-C handler")?;
    }

    let report = if cli.simulate {
        info!("Scanning simulated bus");
        scan_with(SimulatedBus::demo(), sink, config, &stop)
    } else {
        let io = DevPort::open(&config.device)?;
        debug!("port I/O through {}", io.path().display());
        scan_with(io, sink, config, &stop)
    };

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{report}");
    }
    Ok(ExitCode::from(report.exit_code()))
}

/// Scan until done or until `stop` is raised by Ctrl-C.
fn scan_with<P: PortIo>(
    io: P,
    sink: DirectorySink,
    config: ProbeConfig,
    stop: &AtomicBool,
) -> ScanReport {
    let mut ctx = ScanContext::new(io, sink, config);
    PortScanner::new(&mut ctx)
        .with_stop(|| stop.load(Ordering::Relaxed))
        .run()
}

fn decode_file(file: &Path) -> Result<ResourceReport> {
    let bytes = std::fs::read(file).with_context(|| format!("reading {}", file.display()))?;
    let summary = parse_resource_stream(SliceSource::new(&bytes));
    let name = file
        .file_name()
        .map(|name| name.to_string_lossy().into_owned());
    Ok(ResourceReport::new(name, &summary))
}

fn run_decode(file: &Path, json: bool) -> Result<ExitCode> {
    let report = decode_file(file)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{report}");
    }

    Ok(if matches!(report.status, ResourceStatus::Complete { .. }) {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(2)
    })
}
