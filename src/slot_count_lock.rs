//! Adaptive detection of the slot count of periodic null start code frames.
//!
//! DMX512 frames carry no length field, so a receiver normally only knows a frame is over when
//! the next break arrives. Most controllers send the same number of slots every frame. Once the
//! same size has been seen often enough in a row the port completes frames as soon as that many
//! slots have arrived.

use crate::consts::{DMX_MAX_SLOTS, SLOT_COUNT_REQUIRED_MATCHES};

/// `required_count` and `matching_frame_count` fit 6 bits, `matching_slot_count` fits 10 bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotCountLock {
    enabled: bool,
    locked: bool,
    required_count: u8,
    matching_frame_count: u8,
    matching_slot_count: u16,
}

impl Default for SlotCountLock {
    fn default() -> Self {
        Self::new(SLOT_COUNT_REQUIRED_MATCHES)
    }
}

impl SlotCountLock {
    const MAX_COUNT: u8 = 0x3F;

    pub fn new(required_count: u8) -> Self {
        Self {
            enabled: true,
            locked: false,
            required_count: required_count.clamp(1, Self::MAX_COUNT),
            matching_frame_count: 0,
            matching_slot_count: DMX_MAX_SLOTS as u16,
        }
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.unlock();
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn matching_slot_count(&self) -> u16 {
        self.matching_slot_count
    }

    pub fn matching_frame_count(&self) -> u8 {
        self.matching_frame_count
    }

    /// Slots a null start code frame is expected to carry.
    pub fn expected_slots(&self) -> usize {
        if self.locked {
            self.matching_slot_count as usize
        } else {
            DMX_MAX_SLOTS
        }
    }

    /// Feeds the slot count of a completed null start code frame.
    ///
    /// Returns true if this update unlocked the lock.
    pub fn update(&mut self, slot_count: u16) -> bool {
        if !self.enabled {
            return false;
        }

        let slot_count = slot_count.min(DMX_MAX_SLOTS as u16);

        if self.locked {
            if slot_count != self.matching_slot_count {
                log::debug!(
                    "slot count {} differs from locked {}, unlocking",
                    slot_count,
                    self.matching_slot_count
                );
                self.restart(slot_count);
                return true;
            }

            return false;
        }

        if self.matching_frame_count > 0 && slot_count == self.matching_slot_count {
            self.matching_frame_count = (self.matching_frame_count + 1).min(Self::MAX_COUNT);
            if self.matching_frame_count >= self.required_count {
                log::debug!("slot count locked to {}", slot_count);
                self.locked = true;
            }
        } else {
            self.restart(slot_count);
            if self.required_count <= 1 {
                self.locked = true;
            }
        }

        false
    }

    /// Drops the lock, for example when data shows up after a frame completed early.
    pub fn unlock(&mut self) {
        self.locked = false;
        self.matching_frame_count = 0;
    }

    fn restart(&mut self, slot_count: u16) {
        self.locked = false;
        self.matching_frame_count = 1;
        self.matching_slot_count = slot_count;
    }
}
