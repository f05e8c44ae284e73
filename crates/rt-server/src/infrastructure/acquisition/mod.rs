//! Simulated acquisition source.
//!
//! Stands in for a real device driver: holds a measurement info header
//! behind a lock (absent until a measurement is configured) and generates
//! sine-wave measurement blocks at a fixed cadence.  Used by the binary and
//! by the integration tests.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use fiff_stream::{ChannelInfo, ChannelKind, InfoHeader, MeasurementBlock};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::application::acquisition::AcquisitionSource;
use crate::application::broadcast::StreamBroadcaster;

/// In-process acquisition simulator.
pub struct SimulatedAcquisition {
    header: RwLock<Option<InfoHeader>>,
    sequence: AtomicU64,
}

impl SimulatedAcquisition {
    /// A source with no measurement configured yet; REQUEST_INFO and
    /// START_MEASUREMENT report not-ready until [`configure`] is called.
    ///
    /// [`configure`]: SimulatedAcquisition::configure
    pub fn not_ready() -> Self {
        Self {
            header: RwLock::new(None),
            sequence: AtomicU64::new(0),
        }
    }

    /// A source that is ready from the start.
    pub fn with_header(header: InfoHeader) -> Self {
        Self {
            header: RwLock::new(Some(header)),
            sequence: AtomicU64::new(0),
        }
    }

    /// Installs or replaces the measurement info header.
    pub fn configure(&self, header: InfoHeader) {
        info!(
            channels = header.channel_count,
            sampling_rate = header.sampling_rate,
            buffer_size = header.buffer_size,
            "measurement configured"
        );
        *self.header.write().unwrap_or_else(|e| e.into_inner()) = Some(header);
    }

    /// Produces the next measurement block, or `None` while not ready.
    pub fn next_block(&self) -> Option<MeasurementBlock> {
        let header = self
            .header
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()?;
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        Some(generate_block(&header, sequence))
    }
}

impl AcquisitionSource for SimulatedAcquisition {
    fn info_header(&self) -> Option<InfoHeader> {
        self.header.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn set_buffer_size(&self, samples: u32) -> Result<(), String> {
        let mut guard = self.header.write().unwrap_or_else(|e| e.into_inner());
        match guard.as_mut() {
            Some(header) => {
                header.buffer_size = samples;
                Ok(())
            }
            None => Err("no measurement configured".to_string()),
        }
    }
}

/// Builds a plausible MEG/EEG montage: `meg_count` MEG channels followed by
/// `eeg_count` EEG channels and one stimulus channel.
pub fn simulated_montage(
    meg_count: u32,
    eeg_count: u32,
    sampling_rate: f32,
    buffer_size: u32,
) -> InfoHeader {
    let mut channels = Vec::with_capacity((meg_count + eeg_count + 1) as usize);
    for i in 0..meg_count {
        channels.push(ChannelInfo {
            name: format!("MEG {i:04}"),
            kind: ChannelKind::Meg,
        });
    }
    for i in 0..eeg_count {
        channels.push(ChannelInfo {
            name: format!("EEG {i:03}"),
            kind: ChannelKind::Eeg,
        });
    }
    channels.push(ChannelInfo {
        name: "STI 014".to_string(),
        kind: ChannelKind::Stim,
    });

    InfoHeader {
        channel_count: channels.len() as u32,
        sampling_rate,
        buffer_size,
        measurement_id: "simulated".to_string(),
        channels,
    }
}

/// Generates one block of `header.buffer_size` samples per channel.
///
/// Samples are big-endian f32 sine waves, one frequency per channel, laid
/// out channel-major so a block is `channel_count * buffer_size * 4` bytes.
pub fn generate_block(header: &InfoHeader, sequence: u64) -> MeasurementBlock {
    let samples_per_channel = header.buffer_size;
    let channel_count = header.channel_count;
    let mut data = Vec::with_capacity((channel_count * samples_per_channel * 4) as usize);

    let base_sample = sequence * u64::from(samples_per_channel);
    for channel in 0..channel_count {
        let freq_hz = 1.0 + channel as f32;
        for s in 0..samples_per_channel {
            let t = (base_sample + u64::from(s)) as f32 / header.sampling_rate;
            let value = (2.0 * std::f32::consts::PI * freq_hz * t).sin();
            data.extend_from_slice(&value.to_be_bytes());
        }
    }

    MeasurementBlock::new(sequence, samples_per_channel, data)
}

/// Spawns the producer task: one block per tick, pushed to the broadcaster.
///
/// Ticks while the source is not ready produce nothing.  The task exits when
/// the shutdown signal fires.
pub fn spawn_producer(
    source: Arc<SimulatedAcquisition>,
    broadcaster: StreamBroadcaster,
    tick: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(tick);
        loop {
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("producer stopping");
                        return;
                    }
                }
                _ = interval.tick() => {
                    match source.next_block() {
                        Some(block) => broadcaster.on_block_available(block).await,
                        None => warn!("tick with no measurement configured, no block produced"),
                    }
                }
            }
        }
    })
}
