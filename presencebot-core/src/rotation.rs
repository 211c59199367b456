// File: presencebot-core/src/rotation.rs

use std::collections::HashMap;

use presencebot_common::models::{PresenceConfig, Slot};

/// Per-session position in every rotating slot. Lengths are fixed when the
/// set is created, matching the config snapshot the session is bound to.
#[derive(Debug, Clone)]
pub struct RotationCursors {
    lengths: HashMap<Slot, usize>,
    positions: HashMap<Slot, usize>,
}

impl RotationCursors {
    pub fn new(config: &PresenceConfig) -> Self {
        let lengths = Slot::ALL
            .iter()
            .map(|s| (*s, config.slot_len(*s)))
            .collect();
        let positions = Slot::ALL.iter().map(|s| (*s, 0)).collect();
        Self { lengths, positions }
    }

    /// Index into `slot`; always 0 for an empty slot.
    pub fn current(&self, slot: Slot) -> usize {
        self.positions.get(&slot).copied().unwrap_or(0)
    }

    /// The element `slot` currently points at, or `None` when it is empty.
    pub fn pick<'a, T>(&self, slot: Slot, values: &'a [T]) -> Option<&'a T> {
        values.get(self.current(slot))
    }

    /// Steps every cursor once. Called once per publish tick, after the
    /// payload for that tick has been built.
    pub fn advance_all(&mut self) {
        for slot in Slot::ALL {
            let len = self.lengths.get(&slot).copied().unwrap_or(0).max(1);
            if let Some(pos) = self.positions.get_mut(&slot) {
                *pos = (*pos + 1) % len;
            }
        }
    }

    pub fn positions(&self) -> HashMap<Slot, usize> {
        self.positions.clone()
    }
}
