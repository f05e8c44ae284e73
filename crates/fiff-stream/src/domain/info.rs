//! Measurement info header: the metadata a client must receive before
//! measurement blocks mean anything.

use serde::{Deserialize, Serialize};

/// Kind of an acquisition channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum ChannelKind {
    Meg = 0x01,
    Eeg = 0x02,
    Eog = 0x03,
    Stim = 0x04,
    Misc = 0x05,
}

impl TryFrom<u8> for ChannelKind {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, ()> {
        match value {
            0x01 => Ok(ChannelKind::Meg),
            0x02 => Ok(ChannelKind::Eeg),
            0x03 => Ok(ChannelKind::Eog),
            0x04 => Ok(ChannelKind::Stim),
            0x05 => Ok(ChannelKind::Misc),
            _ => Err(()),
        }
    }
}

/// Metadata for a single acquisition channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelInfo {
    /// Channel label, e.g. `"MEG 0113"` or `"EEG 001"`.
    pub name: String,
    /// What the channel measures.
    pub kind: ChannelKind,
}

/// Metadata block describing the running acquisition.
///
/// A session may only enter streaming mode once the acquisition source has
/// produced one of these; the channel count tells the client how to slice
/// each measurement block into samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InfoHeader {
    /// Number of acquired channels per sample.
    pub channel_count: u32,
    /// Sampling rate in Hz.
    pub sampling_rate: f32,
    /// Samples per measurement block under the current configuration.
    pub buffer_size: u32,
    /// Identifier of the running measurement.
    pub measurement_id: String,
    /// Per-channel metadata; length equals `channel_count`.
    pub channels: Vec<ChannelInfo>,
}

impl InfoHeader {
    /// Returns `true` when the channel table matches the declared count and
    /// the geometry fields are usable.
    pub fn is_consistent(&self) -> bool {
        self.channels.len() == self.channel_count as usize
            && self.channel_count > 0
            && self.sampling_rate > 0.0
            && self.buffer_size > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(channel_count: u32, channels: usize) -> InfoHeader {
        InfoHeader {
            channel_count,
            sampling_rate: 600.0,
            buffer_size: 100,
            measurement_id: "test".to_string(),
            channels: (0..channels)
                .map(|i| ChannelInfo {
                    name: format!("MEG {i:04}"),
                    kind: ChannelKind::Meg,
                })
                .collect(),
        }
    }

    #[test]
    fn test_consistent_header() {
        assert!(header(4, 4).is_consistent());
    }

    #[test]
    fn test_channel_count_mismatch_is_inconsistent() {
        assert!(!header(4, 3).is_consistent());
    }

    #[test]
    fn test_zero_geometry_is_inconsistent() {
        let mut h = header(4, 4);
        h.buffer_size = 0;
        assert!(!h.is_consistent());

        let mut h = header(4, 4);
        h.sampling_rate = 0.0;
        assert!(!h.is_consistent());
    }

    #[test]
    fn test_channel_kind_round_trips_through_u8() {
        for kind in [
            ChannelKind::Meg,
            ChannelKind::Eeg,
            ChannelKind::Eog,
            ChannelKind::Stim,
            ChannelKind::Misc,
        ] {
            assert_eq!(ChannelKind::try_from(kind as u8), Ok(kind));
        }
        assert!(ChannelKind::try_from(0x00).is_err());
    }
}
