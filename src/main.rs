//! tidepool server binary.
//!
//! Features:
//! - Single-threaded busy-poll loop with a configurable poll interval
//! - Connection cap enforced at accept time
//! - Echo, ping and broadcast handler sets
//! - Configuration via CLI arguments or TOML file

use tidepool::config::Config;
use tidepool::runtime;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let level = if config.debug {
        "debug"
    } else {
        config.log_level.as_str()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        host = %config.host,
        port = config.port,
        max_connections = config.max_connections,
        protocol = ?config.protocol,
        debug = config.debug,
        "Starting tidepool server"
    );

    runtime::run(config)?;
    Ok(())
}
