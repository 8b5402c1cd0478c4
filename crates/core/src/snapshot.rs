//! The `Snapshot` data model and the server-side per-peer history ring.
//! Wire encoding itself lives in [`crate::codec`].

use std::collections::BTreeMap;

use crate::entity::{EntityId, EntityState};
use crate::protocol::sequence16_greater_than;

#[derive(Debug, Clone)]
pub struct Snapshot {
    pub sequence: u16,
    pub timestamp_ms: u32,
    pub baseline_sequence: u16,
    pub player_entity_id: u32,
    pub last_processed_input_tick: u32,
    /// Ordered by ascending entity id; this order is load-bearing for the
    /// encoding, not just presentation.
    pub states: BTreeMap<EntityId, EntityState>,
}

impl Snapshot {
    pub fn is_keyframe(&self) -> bool {
        self.baseline_sequence == 0
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.states.contains_key(&id)
    }
}

/// Bounded ring of per-peer snapshot history, keyed by sequence. Used both by
/// the server (to find a peer's acked baseline) and to evict entries older
/// than `history_size`.
#[derive(Debug, Default)]
pub struct SnapshotHistory {
    entries: BTreeMap<u16, Snapshot>,
    capacity: usize,
}

impl SnapshotHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: BTreeMap::new(),
            capacity,
        }
    }

    pub fn insert(&mut self, snapshot: Snapshot) {
        let sequence = snapshot.sequence;
        self.entries.insert(sequence, snapshot);
        while self.entries.len() > self.capacity {
            let oldest = self.oldest_sequence().unwrap();
            self.entries.remove(&oldest);
        }
    }

    /// The chronologically oldest entry by circular sequence comparison, not
    /// numeric minimum: a key is older than every other key it loses to under
    /// `sequence16_greater_than`, so this is wraparound-safe once a peer's
    /// sequence counter rolls past 65535.
    fn oldest_sequence(&self) -> Option<u16> {
        self.entries.keys().copied().fold(None, |oldest, key| match oldest {
            None => Some(key),
            Some(current) if sequence16_greater_than(current, key) => Some(key),
            Some(current) => Some(current),
        })
    }

    pub fn get(&self, sequence: u16) -> Option<&Snapshot> {
        self.entries.get(&sequence)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
