use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use wasmbench::config::{Config, TargetConfig};
use wasmbench::utils::system::check_host_limits;
use wasmbench::{BenchError, BenchmarkRun, Result, RunSettings, Variant, Workload, WorkloadTable};

#[cfg(feature = "fast-allocator")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// Process exit code when any client saw an unrecoverable fault
const EXIT_ERROR_ABORT: u8 = 2;

#[derive(Parser, Debug)]
#[command(name = "wasmbench")]
#[command(about = "Load generator comparing native and Wasm deployments of a service", long_about = None)]
#[command(version)]
struct Args {
    /// Target to benchmark, e.g. '-H 127.0.0.1:5050' (overrides config)
    #[arg(short = 'H', long)]
    host: Option<String>,

    /// Total number of connections
    #[arg(short, long)]
    connections: Option<usize>,

    /// Measurement phase in seconds; a warmup phase precedes it
    #[arg(short = 'D', long, default_value = "10")]
    duration: u64,

    /// Workload identifier (ml, nosql, echo)
    #[arg(short, long)]
    workload: Option<String>,

    /// Tag results as measured against the Wasm deployment
    #[arg(short = 'W', long)]
    wasm: bool,

    /// Print per-client and per-batch events
    #[arg(short, long)]
    debug: bool,

    /// Configuration file path
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Result directory (overrides config)
    #[arg(long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Generate example configuration file
    #[arg(long, value_name = "FILE")]
    generate_config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error; overrides config)
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    // Handle config generation
    if let Some(config_path) = args.generate_config {
        println!("Generating example configuration file: {:?}", config_path);
        Config::create_example(&config_path)?;
        println!("Example configuration file created successfully!");
        return Ok(ExitCode::SUCCESS);
    }

    // Load configuration
    let mut config = match args.config {
        Some(ref path) => Config::from_file(path)?,
        None => Config::default(),
    };

    // Apply CLI overrides
    if let Some(ref host) = args.host {
        config.target = TargetConfig::parse(host)?;
    }
    if let Some(dir) = args.output_dir {
        config.output.dir = dir;
    }
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    if args.debug {
        config.logging.level = "debug".to_string();
    }
    config.validate()?;

    init_logging(&config.logging.level, &config.logging.format)?;

    info!("wasmbench v{} starting", env!("CARGO_PKG_VERSION"));

    let connections = args
        .connections
        .ok_or_else(|| BenchError::Config("--connections is required".to_string()))?;
    let workload_id = args
        .workload
        .ok_or_else(|| BenchError::Config("--workload is required".to_string()))?;

    let table = WorkloadTable::builtin();
    let workload = table.get(&workload_id)?;
    let variant = if args.wasm {
        Variant::Wasm
    } else {
        Variant::Native
    };

    check_host_limits(connections);

    let settings = RunSettings::from_config(
        &config,
        Duration::from_secs(args.duration),
        connections,
        variant,
    );
    let run = BenchmarkRun::new(settings, Arc::clone(&workload))?;

    let bundle = match run.execute().await {
        Ok(bundle) => bundle,
        Err(e) => {
            error!("Benchmark failed: {}", e);
            return Err(e);
        }
    };

    let path = bundle.persist(&config.output.dir, workload.folder(), config.output.pretty)?;
    let summary = bundle.summary();
    info!(
        path = %path.display(),
        requests = summary.requests,
        throughput = %format!("{:.2}", summary.throughput),
        error_abort = bundle.error_abort,
        error_reconnect = bundle.error_reconnect,
        "Results stored"
    );

    if bundle.error_abort {
        warn!("Clients reported unrecoverable faults during the run");
        return Ok(ExitCode::from(EXIT_ERROR_ABORT));
    }

    Ok(ExitCode::SUCCESS)
}

fn init_logging(level: &str, format: &str) -> Result<()> {
    let env_filter = EnvFilter::try_new(level)
        .map_err(|e| BenchError::Config(format!("Invalid log level: {}", e)))?;

    let registry = tracing_subscriber::registry().with(env_filter);
    if format == "json" {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }

    Ok(())
}
