// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Slot State Machine
//!
//! The per-(port, slot) binding automaton. [`apply`] is the only code path
//! that changes a slot's state or any of the counters derived from slot
//! states (`Queue::num_mappings`, `Queue::num_pending_additions`,
//! `Port::num_mappings`, `Port::num_pending_removals`,
//! `Domain::pending_additions`, `Domain::pending_removals`).
//!
//! ```text
//! Unmapped ──► MapInProgress ──► Mapped ──► UnmapInProgress ──► Unmapped
//!    │              │              ▲  │           │  ▲
//!    └──────────────┼──────────────┘  │           ▼  │
//!                   └──► Unmapped     │   UnmapInProgressPendingMap ──► Unmapped
//!                                     └──► Unmapped
//! ```
//!
//! Any pair not listed in the table is a bookkeeping bug and yields
//! [`MappingError::InvalidStateTransition`].

use crate::domain::error::MappingError;
use crate::domain::port::Port;
use crate::domain::queue::Queue;
use crate::domain::sched_domain::Domain;
use crate::domain::slot::SlotState;
use tracing::{error, trace};

/// Moves `port.slots[slot]` to `to`, updating every derived counter.
///
/// `queue` must be the queue the slot is currently bound to and `domain` the
/// port's owning domain.
pub(crate) fn apply(
    domain: &mut Domain,
    port: &mut Port,
    queue: &mut Queue,
    slot: usize,
    to: SlotState,
) -> Result<(), MappingError> {
    use SlotState::*;

    let from = port
        .slots
        .get(slot)
        .map(|s| s.state)
        .ok_or(MappingError::InvalidPortOrSlot { port: port.id.0, slot: Some(slot) })?;

    match (from, to) {
        (Unmapped, Mapped) => {
            queue.num_mappings += 1;
            port.num_mappings += 1;
        }
        (Unmapped, MapInProgress) => {
            queue.num_pending_additions += 1;
            domain.pending_additions += 1;
        }
        (MapInProgress, Mapped) => {
            queue.num_mappings += 1;
            port.num_mappings += 1;
            queue.num_pending_additions -= 1;
            domain.pending_additions -= 1;
        }
        (MapInProgress, Unmapped) => {
            queue.num_pending_additions -= 1;
            domain.pending_additions -= 1;
        }
        (Mapped, UnmapInProgress) => {
            port.num_pending_removals += 1;
            domain.pending_removals += 1;
        }
        (Mapped, Unmapped) => {
            queue.num_mappings -= 1;
            port.num_mappings -= 1;
        }
        (Mapped, Mapped) => {}
        (UnmapInProgress, Unmapped) => {
            port.num_pending_removals -= 1;
            domain.pending_removals -= 1;
            queue.num_mappings -= 1;
            port.num_mappings -= 1;
        }
        (UnmapInProgress, Mapped) => {
            port.num_pending_removals -= 1;
            domain.pending_removals -= 1;
        }
        (UnmapInProgress, UnmapInProgressPendingMap(_)) => {}
        (UnmapInProgressPendingMap(_), UnmapInProgress) => {}
        (UnmapInProgressPendingMap(_), Unmapped) => {
            queue.num_mappings -= 1;
            port.num_mappings -= 1;
            port.num_pending_removals -= 1;
            domain.pending_removals -= 1;
        }
        _ => {
            error!(
                port = %port.id,
                slot,
                queue = %queue.id,
                %from,
                %to,
                "Internal error: invalid slot state transition"
            );
            return Err(MappingError::InvalidStateTransition { port: port.id, slot, from, to });
        }
    }

    trace!(port = %port.id, slot, queue = %queue.id, %from, %to, "Slot state transition");

    let entry = &mut port.slots[slot];
    entry.state = to;
    if to == Unmapped {
        entry.queue_id = None;
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
