//! Patchbay CLI - interactive audio router.

mod commands;
mod session;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use patchbay_core::{Router, RouterConfig};
use patchbay_io::{AudioBackend, CpalBackend, MockBackend};
use session::Session;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "patchbay")]
#[command(author, version, about = "Route audio between input and output devices", long_about = None)]
struct Cli {
    /// Audio backend to route through
    #[arg(long, value_enum, default_value_t = BackendKind::Cpal)]
    backend: BackendKind,

    /// Default sample rate for new routes, in Hz
    #[arg(long)]
    sample_rate: Option<u32>,

    /// Frames per chunk
    #[arg(long)]
    chunk_size: Option<u32>,

    /// How long to wait for a route to stop, in milliseconds
    #[arg(long)]
    stop_timeout_ms: Option<u64>,

    /// Configuration file (defaults to the user config directory)
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, Default, ValueEnum)]
enum BackendKind {
    /// System audio via cpal
    #[default]
    Cpal,
    /// Simulated devices, no hardware needed
    Mock,
}

impl BackendKind {
    fn open(self) -> Arc<dyn AudioBackend> {
        match self {
            BackendKind::Cpal => Arc::new(CpalBackend::new()),
            BackendKind::Mock => Arc::new(MockBackend::demo()),
        }
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<RouterConfig> {
    let mut config = match &cli.config {
        Some(path) => RouterConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => RouterConfig::load_or_default().context("loading user config")?,
    };

    if let Some(rate) = cli.sample_rate {
        config.sample_rate = rate;
    }
    if let Some(size) = cli.chunk_size {
        config.chunk_size = size;
    }
    if let Some(ms) = cli.stop_timeout_ms {
        config.stop_timeout_ms = ms;
    }
    config.validate()?;
    Ok(config)
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    // Logs go to stderr so they never interleave with command output.
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .init();
    tracing_log::LogTracer::init().ok();
}

fn print_banner() {
    println!("Audio Routing System");
    println!("===================");
    println!("\nAvailable commands:");
    println!("  list - List all audio devices");
    println!("  create <input_device> <output_device> [sample_rate] - Create a new route");
    println!("  stop <route_id> - Stop a specific route");
    println!("  routes - List all active routes");
    println!("  exit - Exit the program");
}

fn shutdown(router: &Router) {
    router.close();
    println!("Audio router closed");
    println!("Program exited");
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    let backend = cli.backend.open();
    tracing::info!(backend = backend.name(), ?config, "starting patchbay");
    let router = Arc::new(Router::new(backend, config));

    let r = Arc::clone(&router);
    ctrlc::set_handler(move || {
        println!("\nStopping...");
        shutdown(&r);
        std::process::exit(0);
    })?;

    print_banner();
    let mut session = Session::new(Arc::clone(&router));
    println!();
    session.execute("list");

    let result = session.run(io::stdin().lock());
    shutdown(&router);
    result?;
    Ok(())
}
