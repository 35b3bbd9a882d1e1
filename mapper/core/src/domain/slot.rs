// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Port slots and their binding states.
//!
//! A [`Slot`] is one of the fixed [`SLOTS_PER_PORT`] binding records on a
//! consumer port. Its `state` is only ever changed by
//! [`transition`](crate::domain::transition), which also owns every counter
//! derived from slot states.

use crate::domain::ids::QueueId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of queue binding slots on every load-balanced port.
pub const SLOTS_PER_PORT: usize = 8;

/// Highest scheduling priority a binding may carry (0 is highest).
pub const MAX_PRIORITY: u8 = 7;

/// A remap queued behind an in-flight removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingMap {
    pub queue: QueueId,
    pub priority: u8,
}

/// Binding state of a slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SlotState {
    /// No queue bound.
    #[default]
    Unmapped,
    /// Bound in software, waiting for the queue to drain before commit.
    MapInProgress,
    /// Bound and committed to hardware.
    Mapped,
    /// Removal requested, waiting for the port to drain.
    UnmapInProgress,
    /// Removal outstanding with a remap queued behind it.
    UnmapInProgressPendingMap(PendingMap),
}

impl SlotState {
    /// True for both flavours of outstanding removal.
    pub fn is_unmap_in_progress(&self) -> bool {
        matches!(self, Self::UnmapInProgress | Self::UnmapInProgressPendingMap(_))
    }

    /// The queued remap, if any.
    pub fn pending_map(&self) -> Option<PendingMap> {
        match self {
            Self::UnmapInProgressPendingMap(pending) => Some(*pending),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Unmapped => "unmapped",
            Self::MapInProgress => "map_in_progress",
            Self::Mapped => "mapped",
            Self::UnmapInProgress => "unmap_in_progress",
            Self::UnmapInProgressPendingMap(_) => "unmap_in_progress_pending_map",
        }
    }
}

impl fmt::Display for SlotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One binding record on a port.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub(in crate::domain) queue_id: Option<QueueId>,
    pub(in crate::domain) priority: u8,
    pub(in crate::domain) state: SlotState,
}

impl Slot {
    pub fn queue_id(&self) -> Option<QueueId> {
        self.queue_id
    }

    pub fn priority(&self) -> u8 {
        self.priority
    }

    pub fn state(&self) -> SlotState {
        self.state
    }

    /// Queue of the remap waiting on this slot's removal.
    pub fn pending_queue_id(&self) -> Option<QueueId> {
        self.state.pending_map().map(|p| p.queue)
    }

    /// Priority of the remap waiting on this slot's removal.
    pub fn pending_priority(&self) -> Option<u8> {
        self.state.pending_map().map(|p| p.priority)
    }

    /// Whether the slot currently references `queue` in a state matched by `pred`.
    pub fn holds(&self, queue: QueueId, pred: impl Fn(&SlotState) -> bool) -> bool {
        self.queue_id == Some(queue) && pred(&self.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_slot_is_unmapped() {
        let slot = Slot::default();
        assert_eq!(slot.state(), SlotState::Unmapped);
        assert_eq!(slot.queue_id(), None);
        assert_eq!(slot.pending_queue_id(), None);
    }

    #[test]
    fn test_pending_map_accessors() {
        let slot = Slot {
            queue_id: Some(QueueId(1)),
            priority: 2,
            state: SlotState::UnmapInProgressPendingMap(PendingMap { queue: QueueId(4), priority: 6 }),
        };
        assert!(slot.state().is_unmap_in_progress());
        assert_eq!(slot.pending_queue_id(), Some(QueueId(4)));
        assert_eq!(slot.pending_priority(), Some(6));
        assert!(slot.holds(QueueId(1), |s| s.is_unmap_in_progress()));
        assert!(!slot.holds(QueueId(4), |s| s.is_unmap_in_progress()));
    }
}
