// src/main.rs - Tuning panel host binary
use clap::Parser;
use pidtune::config::{self, Config};
use pidtune::heaters::PrinterProfile;
use pidtune::session::{ChannelCommandSink, PanelSession};
use pidtune::web::{self, panel_channel};
use tokio::sync::mpsc;
use tokio::task::LocalSet;

#[derive(Parser, Debug)]
#[command(name = "pidtune-host", about = "PID heater tuning panel host")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "pidtune.toml")]
    config: String,

    /// Override the web port from the configuration file.
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let args = Args::parse();

    tracing::info!("Starting pidtune panel host");
    tracing::info!("Loading configuration from: {}", args.config);

    let config = match config::load_config(&args.config) {
        Ok(config) => config,
        Err(config::ConfigError::Io(e)) => {
            tracing::warn!("config file '{}' not readable ({}), using defaults", args.config, e);
            Config::default()
        }
        Err(e) => {
            tracing::error!("Failed to load config from '{}': {}", args.config, e);
            return Err(Box::new(e) as Box<dyn std::error::Error + Send + Sync + 'static>);
        }
    };

    let port = args.port.unwrap_or(config.web.port);
    let bind_address = format!("{}:{}", config.web.bind_address, port);
    tracing::info!(
        "Telemetry cutoff: {} min, autotune cycles: {}",
        config.tuning.temperature_cutoff,
        config.tuning.autotune_cycles
    );

    // Outbound command channel. Transport belongs to the host application;
    // this binary logs the composed commands as they are dispatched.
    let (command_tx, mut command_rx) = mpsc::unbounded_channel::<String>();
    tokio::spawn(async move {
        while let Some(command) = command_rx.recv().await {
            tracing::info!(command = %command, "printer command dispatched");
        }
    });

    let session = PanelSession::new(
        config,
        PrinterProfile::default(),
        Box::new(ChannelCommandSink(command_tx)),
    );

    // Set up a channel for communication between Axum handlers and the
    // panel task, then run the task on a LocalSet.
    let (panel_tx, panel_rx) = mpsc::channel::<panel_channel::PanelRequest>(16);
    let local = LocalSet::new();
    local.spawn_local(panel_channel::run_panel_task(session, panel_rx));

    // Create the Axum router, passing it the channel sender.
    let app = web::api::create_router(panel_tx);

    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    tracing::info!("Web API listening on http://{}", listener.local_addr()?);
    local.spawn_local(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("Web server error: {}", e);
        }
    });
    local.await;

    Ok(())
}
