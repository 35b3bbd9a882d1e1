// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use crate::domain::ids::{DomainId, PortId, QueueId, Tenancy};
use crate::domain::slot::{Slot, SlotState, SLOTS_PER_PORT};
use serde::Serialize;

/// A load-balanced consumer port and its binding slots.
#[derive(Debug, Clone, Serialize)]
pub struct Port {
    pub id: PortId,
    pub tenancy: Tenancy,
    /// Owning domain, `None` while the port sits in the device pool.
    pub(crate) domain: Option<DomainId>,
    pub(crate) configured: bool,
    /// Caller intent. Hardware enables are suppressed while removals are pending.
    pub(crate) enabled: bool,
    pub(in crate::domain) num_mappings: u32,
    pub(in crate::domain) num_pending_removals: u32,
    pub(in crate::domain) slots: [Slot; SLOTS_PER_PORT],
}

impl Port {
    pub(crate) fn new(id: PortId) -> Self {
        Self {
            id,
            tenancy: Tenancy { virt_id: id.0, owner: None },
            domain: None,
            configured: false,
            enabled: false,
            num_mappings: 0,
            num_pending_removals: 0,
            slots: [Slot::default(); SLOTS_PER_PORT],
        }
    }

    pub fn domain(&self) -> Option<DomainId> {
        self.domain
    }

    pub fn is_configured(&self) -> bool {
        self.configured
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Slots that are `Mapped` or still unmapping.
    pub fn num_mappings(&self) -> u32 {
        self.num_mappings
    }

    pub fn num_pending_removals(&self) -> u32 {
        self.num_pending_removals
    }

    pub fn slots(&self) -> &[Slot; SLOTS_PER_PORT] {
        &self.slots
    }

    pub fn slot(&self, index: usize) -> Option<&Slot> {
        self.slots.get(index)
    }

    /// Records the queue and priority a slot is about to be transitioned for.
    ///
    /// Only the binding target changes here; the slot state and all counters
    /// stay with the transition function.
    pub(crate) fn bind_slot(&mut self, index: usize, queue: QueueId, priority: u8) {
        if let Some(slot) = self.slots.get_mut(index) {
            slot.queue_id = Some(queue);
            slot.priority = priority;
        }
    }

    pub(crate) fn set_slot_priority(&mut self, index: usize, priority: u8) {
        if let Some(slot) = self.slots.get_mut(index) {
            slot.priority = priority;
        }
    }

    /// Updates the priority of a queued remap in place.
    pub(crate) fn set_pending_priority(&mut self, index: usize, priority: u8) {
        if let Some(SlotState::UnmapInProgressPendingMap(pending)) =
            self.slots.get_mut(index).map(|s| &mut s.state)
        {
            pending.priority = priority;
        }
    }

    /// First slot whose state satisfies `pred`.
    pub fn find_slot(&self, pred: impl Fn(&SlotState) -> bool) -> Option<usize> {
        self.slots.iter().position(|s| pred(&s.state))
    }

    /// First slot bound to `queue` whose state satisfies `pred`.
    pub fn find_queue_slot(&self, queue: QueueId, pred: impl Fn(&SlotState) -> bool) -> Option<usize> {
        self.slots.iter().position(|s| s.holds(queue, &pred))
    }

    /// Slot holding a queued remap to `queue`.
    pub fn find_pending_map_slot(&self, queue: QueueId) -> Option<usize> {
        self.slots
            .iter()
            .position(|s| s.state.pending_map().is_some_and(|p| p.queue == queue))
    }

    pub fn count_slots(&self, pred: impl Fn(&SlotState) -> bool) -> u32 {
        self.slots.iter().filter(|s| pred(&s.state)).count() as u32
    }

    /// Whether some slot is `Mapped` to `queue`.
    pub fn is_mapped_to(&self, queue: QueueId) -> bool {
        self.find_queue_slot(queue, |s| *s == SlotState::Mapped).is_some()
    }
}
