//! Command-line client for the streaming server.
//!
//! Usage:
//!
//! ```text
//! rt-client <addr> info
//! rt-client <addr> stream <blocks>
//! rt-client <addr> set-buffer-size <samples>
//! ```

use std::net::SocketAddr;

use anyhow::{bail, Context};
use tracing::info;
use tracing_subscriber::EnvFilter;

use rt_client::RtClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 3 {
        bail!("usage: rt-client <addr> <info | stream <blocks> | set-buffer-size <samples>>");
    }

    let addr: SocketAddr = args[1]
        .parse()
        .with_context(|| format!("invalid server address {:?}", args[1]))?;
    let mut client = RtClient::connect(addr).await?;

    match args[2].as_str() {
        "info" => {
            let header = client.request_info().await?;
            info!(
                channels = header.channel_count,
                sampling_rate = header.sampling_rate,
                buffer_size = header.buffer_size,
                measurement_id = %header.measurement_id,
                "measurement info"
            );
            for channel in &header.channels {
                println!("{}\t{:?}", channel.name, channel.kind);
            }
        }
        "stream" => {
            let count: u64 = args
                .get(3)
                .context("stream requires a block count")?
                .parse()
                .context("block count must be a number")?;

            let header = client.start_measurement().await?;
            info!(
                channels = header.channel_count,
                buffer_size = header.buffer_size,
                "streaming started"
            );
            for _ in 0..count {
                let block = client.next_block().await?;
                println!(
                    "block {}: {} samples, {} bytes",
                    block.sequence,
                    block.sample_count,
                    block.len()
                );
            }
            client.stop_measurement().await?;
            info!("streaming stopped");
        }
        "set-buffer-size" => {
            let samples: u32 = args
                .get(3)
                .context("set-buffer-size requires a sample count")?
                .parse()
                .context("sample count must be a number")?;
            client.set_buffer_size(samples).await?;
            info!(samples, "buffer size updated");
        }
        other => bail!("unknown subcommand {other:?}"),
    }

    client.disconnect().await?;
    Ok(())
}
