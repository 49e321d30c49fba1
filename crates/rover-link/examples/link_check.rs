//! Link smoke check against a real MAVLink endpoint.
//!
//! ```text
//! cargo run -p rover-link --example link_check -- udpin:0.0.0.0:14550
//! ```
//!
//! The endpoint falls back to `$MAVLINK_CONNECTION`, then to
//! `udpin:0.0.0.0:14550`.

use std::process::ExitCode;
use std::sync::Arc;

use rover_link::check::{DEFAULT_CHECK_TIMEOUT, run_check};
use rover_link::{LinkPump, MavlinkLink, pump};
use tracing::error;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .compact()
        .init();

    let endpoint = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("MAVLINK_CONNECTION").ok())
        .unwrap_or_else(|| "udpin:0.0.0.0:14550".to_string());

    let link = match MavlinkLink::connect(&endpoint) {
        Ok(link) => Arc::new(link),
        Err(e) => {
            error!(%endpoint, error = %e, "cannot open link");
            return ExitCode::FAILURE;
        }
    };
    let mut frames = match LinkPump::spawn(link, pump::DEFAULT_CAPACITY) {
        Ok(frames) => frames,
        Err(e) => {
            error!(error = %e, "cannot start link reader");
            return ExitCode::FAILURE;
        }
    };

    match run_check(&mut frames, DEFAULT_CHECK_TIMEOUT).await {
        Ok(report) => {
            println!(
                "Heartbeat OK: {} {}",
                report.target_system, report.target_component
            );
            match report.position {
                Some(position) => println!("GLOBAL_POSITION_INT: {position:?}"),
                None => println!("GLOBAL_POSITION_INT: timeout"),
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(%endpoint, error = %e, "link check failed");
            ExitCode::FAILURE
        }
    }
}
