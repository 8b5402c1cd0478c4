//! Client-side mirror of the server's per-peer `SnapshotHistory`: decodes
//! incoming `SnapshotData` against whichever prior snapshot the header names
//! as baseline, and keeps a short ring so the decoder always has one on hand.

use arcnet_core::{sequence16_greater_than, NetworkConfig, Snapshot, SnapshotCodec, SnapshotHistory};

#[derive(Debug)]
pub enum BufferError {
    Codec(arcnet_core::CodecError),
    MissingBaseline(u16),
}

impl std::fmt::Display for BufferError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BufferError::Codec(e) => write!(f, "codec error: {e}"),
            BufferError::MissingBaseline(seq) => write!(f, "missing baseline snapshot {seq}"),
        }
    }
}

impl std::error::Error for BufferError {}

/// Holds decoded snapshots in sequence order and exposes the pair the
/// interpolator needs to blend between.
pub struct SnapshotBuffer {
    codec: SnapshotCodec,
    history: SnapshotHistory,
    latest_sequence: Option<u16>,
}

impl SnapshotBuffer {
    pub fn new(config: &NetworkConfig) -> Self {
        Self {
            codec: SnapshotCodec::new(config),
            history: SnapshotHistory::new(config.history_size),
            latest_sequence: None,
        }
    }

    /// Decodes a freshly received snapshot payload and, if it's newer than
    /// anything buffered, inserts it into history. Older/duplicate packets
    /// (arrived out of order) are decoded but not treated as "latest".
    pub fn ingest(&mut self, bytes: &[u8]) -> Result<&Snapshot, BufferError> {
        let header = self.codec.peek_header(bytes).map_err(BufferError::Codec)?;

        let baseline = if header.baseline_sequence > 0 {
            let found = self.history.get(header.baseline_sequence);
            if found.is_none() {
                return Err(BufferError::MissingBaseline(header.baseline_sequence));
            }
            found
        } else {
            None
        };

        let snapshot = self.codec.decode(bytes, baseline).map_err(BufferError::Codec)?;
        let sequence = snapshot.sequence;
        self.history.insert(snapshot);

        let is_newest = match self.latest_sequence {
            None => true,
            Some(latest) => sequence16_greater_than(sequence, latest),
        };
        if is_newest {
            self.latest_sequence = Some(sequence);
        }

        Ok(self.history.get(sequence).unwrap())
    }

    pub fn latest(&self) -> Option<&Snapshot> {
        self.latest_sequence.and_then(|seq| self.history.get(seq))
    }

    pub fn latest_sequence(&self) -> Option<u16> {
        self.latest_sequence
    }

    pub fn get(&self, sequence: u16) -> Option<&Snapshot> {
        self.history.get(sequence)
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    /// Two snapshots straddling `render_time_ms`, oldest first, for the
    /// interpolator to blend between. Falls back to `(latest, latest)` when
    /// only one snapshot is buffered or `render_time_ms` is past everything
    /// we have, so callers never need to special-case a missing "to".
    pub fn interpolation_pair(&self, render_time_ms: f64) -> Option<(&Snapshot, &Snapshot)> {
        let latest_seq = self.latest_sequence?;
        let latest = self.history.get(latest_seq)?;
        if (render_time_ms as u32) >= latest.timestamp_ms {
            return Some((latest, latest));
        }

        let mut from = latest;
        let mut to = latest;
        let mut seq = latest_seq;
        loop {
            if let Some(snap) = self.history.get(seq) {
                if (snap.timestamp_ms as f64) <= render_time_ms {
                    from = snap;
                    break;
                }
                to = snap;
            }
            if seq == 0 {
                break;
            }
            seq = seq.wrapping_sub(1);
            if seq == latest_seq {
                break;
            }
        }
        Some((from, to))
    }
}
