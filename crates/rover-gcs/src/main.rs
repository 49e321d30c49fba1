//! `rover-gcs` – Rover Ground-Control Gateway
//!
//! Entry point for the gateway process.  It:
//!
//! 1. Initialises logging (see [`telemetry`]).
//! 2. Loads `~/.rover-gcs/config.toml` with environment overrides
//!    (see [`config`]).
//! 3. Opens the MAVLink connection and starts the telemetry service.
//! 4. Serves the HTTP/WebSocket cockpit until **Ctrl-C**, then stops the
//!    service within its shutdown timeout.

mod config;
mod telemetry;

use std::process::ExitCode;
use std::sync::Arc;

use colored::Colorize;
use rover_cockpit::CockpitServer;
use rover_core::{ServiceConfig, TelemetryService};
use rover_link::MavlinkLink;
use rover_types::GatewayError;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::config::Config;

fn main() -> ExitCode {
    let _guard = telemetry::init_tracing("rover-gcs");
    print_banner();

    let cfg = match config::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            return ExitCode::FAILURE;
        }
    };
    println!("  Vehicle link : {}", cfg.mavlink_connection.bold());
    println!("  Cockpit      : {}", format!("http://localhost:{}", cfg.http_port).bold());
    println!();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to build tokio runtime");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cfg)) {
        Ok(()) => {
            println!("{}", "  ✓ Gateway stopped.".green());
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "gateway failed");
            println!("{}: {}", "Gateway error".red(), e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cfg: Config) -> Result<(), GatewayError> {
    // ── Ctrl-C handler ────────────────────────────────────────────────────
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – shutting down …".yellow().bold());
        let _ = shutdown_tx.send(true);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; graceful shutdown on Ctrl-C will not be available");
    }

    // ── Vehicle link + core ───────────────────────────────────────────────
    let link = MavlinkLink::connect(&cfg.mavlink_connection)?;
    let service = Arc::new(TelemetryService::new(ServiceConfig::default()));
    service.start(Arc::new(link))?;

    // ── Cockpit facade ────────────────────────────────────────────────────
    let server = CockpitServer::new(Arc::clone(&service))
        .with_port(cfg.http_port)
        .with_push_interval(cfg.push_interval());
    let mut server_task = tokio::spawn(server.run());

    let outcome = tokio::select! {
        _ = shutdown_rx.changed() => {
            info!("shutdown requested");
            Ok(())
        }
        joined = &mut server_task => match joined {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(e),
            Err(e) => Err(GatewayError::Transport(format!("cockpit task failed: {e}"))),
        },
    };

    server_task.abort();
    service.stop().await;
    outcome
}

fn print_banner() {
    println!();
    println!("{}", "  ┌──────────────────────────────────────┐".cyan());
    println!("{}", "  │   rover-gcs · MAVLink telemetry gw   │".cyan().bold());
    println!("{}", "  └──────────────────────────────────────┘".cyan());
    println!();
}
