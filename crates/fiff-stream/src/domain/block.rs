//! Opaque measurement block payloads.

use std::sync::Arc;

/// One chunk of acquired samples.
///
/// The server never interprets `data`; it is produced by the acquisition
/// collaborator and forwarded byte-for-byte to every streaming client.  The
/// payload is behind an `Arc` so fan-out to N clients clones a pointer, not
/// the sample data.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementBlock {
    /// Production sequence number, strictly increasing per measurement.
    pub sequence: u64,
    /// Number of samples (per channel) encoded in `data`.
    pub sample_count: u32,
    /// Raw sample bytes.
    pub data: Arc<[u8]>,
}

impl MeasurementBlock {
    pub fn new(sequence: u64, sample_count: u32, data: Vec<u8>) -> Self {
        Self {
            sequence,
            sample_count,
            data: data.into(),
        }
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_reports_payload_length() {
        let block = MeasurementBlock::new(7, 2, vec![1, 2, 3, 4]);
        assert_eq!(block.len(), 4);
        assert!(!block.is_empty());
        assert_eq!(block.sequence, 7);
    }

    #[test]
    fn test_clone_shares_payload_storage() {
        let block = MeasurementBlock::new(0, 1, vec![0u8; 1024]);
        let copy = block.clone();
        assert!(Arc::ptr_eq(&block.data, &copy.data));
    }
}
