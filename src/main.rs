use anyhow::Result;
use clap::Parser;
use parcelwatch::{EngineParts, ParcelwatchConfig, ParcelwatchOrchestrator};
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "parcelwatch")]
#[command(about = "Parcel condition monitor with threshold alerting and remote device-state sync")]
#[command(version)]
#[command(long_about = "Samples temperature, humidity and motion for a shipped parcel, \
classifies orientation and vibration, raises threshold alerts, and keeps the device record \
in a remote key-path store in sync without clobbering back-end assignments. Runs against \
simulated sensors on a development host.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "parcelwatch.toml", help = "Path to TOML configuration file")]
    config: String,

    /// Enable debug logging (most verbose)
    #[arg(short, long, help = "Enable debug level logging")]
    debug: bool,

    /// Enable verbose logging (info level)
    #[arg(short, long, help = "Enable verbose info level logging")]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration file and exit without starting the monitor")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Dry run mode - register and run one cycle
    #[arg(long, help = "Register with the store, run one sampling and evaluation cycle, then exit")]
    dry_run: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,

    /// Use the in-memory store instead of the configured transport
    #[arg(long, help = "Keep all remote state in memory instead of contacting the database")]
    offline: bool,

    /// Keyboard control of the simulated sensors
    #[arg(short, long, help = "Switch simulation scenarios and network state from the keyboard")]
    interactive: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Handle special modes that don't require full initialization
    if args.print_config {
        print_default_config()?;
        return Ok(());
    }

    // Initialize logging
    init_logging(&args)?;

    info!("Starting parcelwatch v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    // Load and validate configuration
    let mut config = match ParcelwatchConfig::load_from_file(&args.config) {
        Ok(config) => {
            info!("Configuration loaded successfully from: {}", args.config);
            config
        }
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if args.offline {
        config.force_offline();
    }

    match config.validate() {
        Ok(()) if args.validate_config => {
            info!("Configuration validation successful");
            println!("✓ Configuration is valid");
            return Ok(());
        }
        Ok(()) => {}
        Err(e) => {
            error!("Configuration validation failed: {}", e);
            eprintln!("✗ Configuration validation failed: {}", e);
            std::process::exit(1);
        }
    }

    let store = parcelwatch::store::open(&config.remote, args.offline).map_err(|e| {
        error!("Failed to open remote store: {}", e);
        e
    })?;
    if args.offline {
        warn!("Offline mode - remote state is kept in memory only");
    }

    let parts = EngineParts::simulated(&config, store)?;

    // Create and initialize the orchestrator
    let mut orchestrator = ParcelwatchOrchestrator::new(config, parts).map_err(|e| {
        error!("Failed to create orchestrator: {}", e);
        e
    })?;
    orchestrator.set_keyboard_enabled(args.interactive && !args.dry_run);

    orchestrator.initialize().await.map_err(|e| {
        error!("Failed to initialize system: {}", e);
        e
    })?;

    orchestrator.start().await.map_err(|e| {
        error!("Failed to start system: {}", e);
        e
    })?;

    // Handle dry run mode
    if args.dry_run {
        let report = orchestrator.run_single_cycle().await;
        println!(
            "{} Dry run for {}: registered={}, uploaded={}, alerts={}",
            if report.is_healthy() { "✓" } else { "✗" },
            orchestrator.identity().device_name,
            report.registered,
            report.uploaded,
            report.alerts.len()
        );
        for (alert, delivered) in &report.alerts {
            println!(
                "  {} [{:?}] {}{}",
                alert.kind,
                alert.severity,
                alert.message,
                if *delivered { "" } else { " (not delivered)" }
            );
        }
        let exit_code = if report.is_healthy() { 0 } else { 1 };
        orchestrator.shutdown().await?;
        std::process::exit(exit_code);
    }

    // Run the scheduler loop with signal handling
    let exit_code = orchestrator.run().await.map_err(|e| {
        error!("System error during execution: {}", e);
        e
    })?;

    info!("parcelwatch exited with code: {}", exit_code);

    std::process::exit(exit_code);
}

fn init_logging(args: &Args) -> Result<()> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    // Determine log level based on flags
    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("parcelwatch={}", log_level)));

    // Configure format based on options
    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Some("compact") => fmt::layer()
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .boxed(),
        Some("pretty") | None if !args.interactive => fmt::layer()
            .pretty()
            .with_target(true)
            .with_thread_ids(args.debug)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        // Multi-line records garble a raw-mode terminal
        Some("pretty") | None => fmt::layer().compact().with_target(false).boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer()
                .with_target(true)
                .with_thread_ids(args.debug)
                .with_file(args.debug)
                .with_line_number(args.debug)
                .boxed()
        }
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter)
        .init();

    Ok(())
}

/// Print default configuration in TOML format
fn print_default_config() -> Result<()> {
    println!("# parcelwatch configuration file");
    println!("# This is the default configuration with all available options");
    println!("# Any key can be overridden from the environment, e.g.");
    println!("# PARCELWATCH_REMOTE__DATABASE_URL=https://example.firebaseio.com");
    println!("#");
    println!("# sensors.scenario: calm, heatwave, freezer, humid, rough, upside_down,");
    println!("#   on_side, free_fall, flaky");
    println!("# remote.transport: http or memory");
    println!("# alerts.resend_policy: every_cycle, min_interval or edge_triggered");
    println!("# system.run_for_seconds: stop after this many seconds (unset runs until signalled)");
    println!();

    print!("{}", ParcelwatchConfig::default_toml()?);
    Ok(())
}
