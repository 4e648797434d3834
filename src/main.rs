use anyhow::Result;
use clap::{Parser, Subcommand};
use stagehand::{CoordinatorLifecycle, LifecycleEvent, RouteGate, StagehandConfig};
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "stagehand")]
#[command(about = "Lifecycle client for an on-demand show coordinator")]
#[command(version)]
#[command(long_about = "Checks whether the show coordinator is running, asks the control plane \
to start it when it is stopped, and follows it until it is ready. Can also serve the lifecycle \
to a browser panel over a small local HTTP API.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "stagehand.toml", help = "Path to TOML configuration file")]
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
    #[arg(long, help = "Validate configuration file and exit")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check the coordinator once and print the lifecycle snapshot
    Status,

    /// Ask the control plane to start the coordinator
    Wake {
        /// Follow the coordinator until it is ready or the wait times out
        #[arg(long)]
        wait: bool,
    },

    /// Print what a navigation to PATH would render
    Route {
        path: String,

        /// Treat the page as not needing the coordinator
        #[arg(long)]
        optional: bool,
    },

    /// Serve the lifecycle over the local HTTP API
    #[cfg(feature = "http-api")]
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        print_default_config()?;
        return Ok(());
    }

    init_logging(&args)?;

    info!("Starting stagehand v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let config = match StagehandConfig::load_from_file(&args.config) {
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

    let command = args.command.unwrap_or(Command::Status);
    let exit_code = run(command, &config).await?;

    info!("stagehand exited with code: {}", exit_code);
    std::process::exit(exit_code);
}

async fn run(command: Command, config: &StagehandConfig) -> Result<i32> {
    let lifecycle = std::sync::Arc::new(CoordinatorLifecycle::from_config(&config.coordinator).await?);

    let code = match command {
        Command::Status => {
            println!("{}", serde_json::to_string_pretty(&lifecycle.snapshot())?);
            0
        }
        Command::Wake { wait } => wake(&lifecycle, wait).await?,
        Command::Route { path, optional } => {
            let gate = RouteGate::from_config(&config.routes);
            let snapshot = lifecycle.snapshot();

            println!(
                "{} ({:?}): {}",
                path,
                gate.classify(&path),
                gate.decide(&path, &snapshot, !optional)
            );
            if let Some(message) = &snapshot.error {
                println!("  coordinator error: {}", message);
            }
            0
        }
        #[cfg(feature = "http-api")]
        Command::Serve => serve(std::sync::Arc::clone(&lifecycle), config).await?,
    };

    // process::exit skips destructors
    lifecycle.dispose();
    Ok(code)
}

async fn wake(lifecycle: &CoordinatorLifecycle, wait: bool) -> Result<i32> {
    let mut events = lifecycle.subscribe();

    let result = match lifecycle.wake().await {
        Ok(result) => result,
        Err(e) => {
            eprintln!("✗ Wake failed: {}", e);
            if e.is_retryable() {
                eprintln!("  Run `stagehand wake` again to retry");
            }
            return Ok(1);
        }
    };

    if result.already_running {
        println!("✓ Coordinator is already running");
        return Ok(0);
    }

    println!(
        "Coordinator is starting (estimated ready in {}s)",
        result.estimated_ready_seconds
    );

    if !wait {
        return Ok(0);
    }

    loop {
        match events.recv().await {
            Ok(LifecycleEvent::CoordinatorReady { .. }) => {
                println!("✓ Coordinator is ready");
                return Ok(0);
            }
            Ok(event) if event.is_terminal() || !lifecycle.is_waking() => {
                let message = lifecycle.error().unwrap_or_else(|| event.description());
                eprintln!("✗ {}", message);
                return Ok(1);
            }
            Ok(event) => {
                if let Some(remaining) = lifecycle.estimated_time_remaining() {
                    info!("{} ({}s remaining)", event.description(), remaining);
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!("Missed {} lifecycle events", skipped);
            }
            Err(RecvError::Closed) => return Ok(1),
        }
    }
}

#[cfg(feature = "http-api")]
async fn serve(
    lifecycle: std::sync::Arc<CoordinatorLifecycle>,
    config: &StagehandConfig,
) -> Result<i32> {
    use stagehand::ApiServer;
    use tokio_util::sync::CancellationToken;

    let server = ApiServer::builder()
        .config(config.server.clone())
        .lifecycle(std::sync::Arc::clone(&lifecycle))
        .gate(RouteGate::from_config(&config.routes))
        .build()?;

    let shutdown = CancellationToken::new();
    spawn_signal_handlers(shutdown.clone());

    let result = server.start(shutdown).await;

    match result {
        Ok(()) => Ok(0),
        Err(e) => {
            error!("API server error: {}", e);
            Ok(1)
        }
    }
}

/// Cancel `shutdown` on SIGTERM or Ctrl+C
#[cfg(feature = "http-api")]
fn spawn_signal_handlers(shutdown: tokio_util::sync::CancellationToken) {
    #[cfg(unix)]
    {
        let shutdown_sigterm = shutdown.clone();
        tokio::spawn(async move {
            use tokio::signal::unix::{signal, SignalKind};

            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    if sigterm.recv().await.is_some() {
                        info!("Received SIGTERM signal");
                        shutdown_sigterm.cancel();
                    }
                }
                Err(e) => warn!("Failed to register SIGTERM handler: {}", e),
            }
        });
    }

    tokio::spawn(async move {
        if let Ok(()) = tokio::signal::ctrl_c().await {
            info!("Received SIGINT signal (Ctrl+C)");
            shutdown.cancel();
        }
    });
}

fn init_logging(args: &Args) -> Result<()> {
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
        .unwrap_or_else(|_| EnvFilter::new(format!("stagehand={},tower_http={}", log_level, log_level)));

    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .with_writer(std::io::stderr)
            .boxed(),
        Some("compact") => fmt::layer()
            .compact()
            .with_target(false)
            .with_writer(std::io::stderr)
            .boxed(),
        Some("pretty") | None => fmt::layer()
            .pretty()
            .with_target(true)
            .with_thread_ids(args.debug)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .with_writer(std::io::stderr)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr)
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
    println!("# Stagehand Configuration File");
    println!("# Every key can also be set through STAGEHAND_<SECTION>__<KEY> environment variables");
    println!();
    println!("{}", StagehandConfig::default().to_toml()?);
    Ok(())
}
