//! Streaming server entry point.
//!
//! Wires the simulated acquisition source to the server core and runs until
//! Ctrl-C:
//!
//! ```text
//! main()
//!  └─ load_config()           -- TOML config with defaults
//!  └─ RtServer::start()       -- bind + accept loop
//!  └─ spawn_producer()        -- one measurement block per tick
//!  └─ ctrl_c → stop()         -- graceful drain of every session
//! ```

use std::sync::Arc;
use std::time::Duration;

use tracing::info;
use tracing_subscriber::EnvFilter;

use rt_server::infrastructure::acquisition::{simulated_montage, spawn_producer, SimulatedAcquisition};
use rt_server::infrastructure::storage::config::load_config;
use rt_server::RtServer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config()?;

    // Structured logging; `RUST_LOG` overrides the configured level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone())),
        )
        .init();

    info!("rt-server starting");

    // 306-channel MEG plus 60 EEG channels, the usual whole-head montage.
    let source = Arc::new(SimulatedAcquisition::with_header(simulated_montage(
        306,
        60,
        600.614_8,
        config.stream.default_buffer_size,
    )));

    let acquisition: Arc<dyn rt_server::AcquisitionSource> = source.clone();
    let server = RtServer::start(&config, acquisition).await?;
    info!(addr = %server.local_addr(), "accepting clients");

    // Block cadence follows the configured block size and sampling rate.
    let tick = Duration::from_secs_f64(
        f64::from(config.stream.default_buffer_size) / 600.614_8,
    );
    let producer = spawn_producer(source, server.broadcaster(), tick, server.shutdown_signal());

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");

    server.stop().await;
    let _ = producer.await;

    info!("rt-server stopped");
    Ok(())
}
