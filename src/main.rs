use anyhow::Result;
use clap::Parser;
use evalcam::{EvalcamApp, EvalcamConfig, RunMode};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;

#[derive(Parser, Debug)]
#[command(name = "evalcam")]
#[command(about = "Timed camera evaluation sessions scored by a remote classifier")]
#[command(version)]
#[command(long_about = "Runs timed evaluation sessions: a camera snapshot is taken at a fixed \
cadence, sent to a remote classifier, and at the end of the session a score and the best \
accepted snapshot are reported. Samples and per-session error logs are kept on disk.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "evalcam.toml", help = "Path to TOML configuration file")]
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
    #[arg(long, help = "Validate configuration file and exit without starting")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Dry run mode - build everything but run no session
    #[arg(long, help = "Build all components and exit without running a session")]
    dry_run: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,

    /// Also write logs to a daily rotated file in this directory
    #[arg(long, value_name = "DIR")]
    log_dir: Option<PathBuf>,

    /// Run this many sessions back to back, then exit
    #[arg(long, value_name = "N", conflicts_with = "interactive")]
    sessions: Option<u32>,

    /// Control sessions from the keyboard
    #[arg(short, long)]
    interactive: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        print_default_config()?;
        return Ok(());
    }

    let _log_guard = init_logging(&args)?;

    info!("Starting evalcam v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let config = match EvalcamConfig::load_from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        eprintln!("✗ Configuration validation failed: {}", e);
        std::process::exit(1);
    }

    if args.validate_config {
        info!("Configuration validation successful");
        println!("✓ Configuration is valid");
        return Ok(());
    }

    let mut app = EvalcamApp::new(config).map_err(|e| {
        error!("Failed to create application: {}", e);
        e
    })?;

    app.prepare().await.map_err(|e| {
        error!("Failed to prepare application: {}", e);
        e
    })?;

    if args.dry_run {
        info!("Dry run mode - components built but no session started");
        app.shutdown().await?;
        println!("✓ Dry run completed successfully - all components initialized");
        return Ok(());
    }

    let mode = match (args.sessions, args.interactive) {
        (Some(count), _) => RunMode::Sessions(count),
        (None, true) => RunMode::Interactive,
        (None, false) => RunMode::Continuous,
    };

    let exit_code = app.run(mode).await.map_err(|e| {
        error!("System error during execution: {}", e);
        e
    })?;

    info!("Evalcam exited with code: {}", exit_code);
    std::process::exit(exit_code);
}

fn init_logging(args: &Args) -> Result<Option<WorkerGuard>> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

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
        .unwrap_or_else(|_| EnvFilter::new(format!("evalcam={}", log_level)));

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
        Some("pretty") | None => fmt::layer()
            .pretty()
            .with_target(true)
            .with_thread_ids(args.debug)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
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

    let (file_layer, guard) = match &args.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "evalcam.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(file_layer)
        .with(env_filter)
        .init();

    Ok(guard)
}

/// Print default configuration in TOML format
fn print_default_config() -> Result<()> {
    println!("# Evalcam Configuration File");
    println!("# Every option with its default value; any key can also be set through");
    println!("# the environment, e.g. EVALCAM_SESSION__DURATION_MS=20000");
    println!();
    println!("{}", EvalcamConfig::default().to_toml()?);
    Ok(())
}
