// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Dynamic Mapper
//!
//! Binds a queue to a port while its domain is scheduling. The queue's
//! inflight limit is forced to zero so no new events are dispatched from it,
//! then the binding is committed once every previously scheduled event has
//! completed. If events are still in flight the slot stays `MapInProgress`
//! and the reconciliation engine retries the commit.
//!
//! Also hosts [`MappingContext::unmap`], the immediate removal primitive.

use crate::application::context::MappingContext;
use crate::domain::error::MappingError;
use crate::domain::events::MappingEvent;
use crate::domain::ids::{DomainId, PortId, QueueId};
use crate::domain::outcome::{MapPath, MappingOutcome};
use crate::domain::slot::SlotState;
use chrono::Utc;
use tracing::{debug, error, info, warn};

impl MappingContext<'_> {
    /// Maps `queue` to `port`, completing now if the queue is already drained.
    pub fn map_dynamic(
        &mut self,
        domain: DomainId,
        port: PortId,
        queue: QueueId,
        priority: u8,
    ) -> Result<MappingOutcome, MappingError> {
        Self::validate_priority(priority)?;
        self.validate_members(domain, port, queue)?;

        let slot = self
            .dir
            .port(port)?
            .find_slot(|s| *s == SlotState::Unmapped)
            .ok_or_else(|| {
                error!(%port, %queue, "Internal error: no free slot for dynamic map");
                MappingError::NoFreeSlot { port, queue }
            })?;

        self.device.set_inflight_limit(queue, 0);
        self.dir.queue_mut(queue)?.inflight_limit_is_zeroed = true;

        self.dir.port_mut(port)?.bind_slot(slot, queue, priority);
        self.dir.transition(port, slot, SlotState::MapInProgress)?;

        let inflight = self.device.queue_inflight_count(queue);
        if inflight > 0 {
            debug!(%port, %queue, slot, inflight, "Queue still has events in flight; map pending");
            return Ok(self.defer_map(domain, port, queue, slot));
        }

        if self.try_commit_map(domain, port, slot)? {
            Ok(MappingOutcome::Completed)
        } else {
            Ok(self.defer_map(domain, port, queue, slot))
        }
    }

    fn defer_map(&mut self, domain: DomainId, port: PortId, queue: QueueId, slot: usize) -> MappingOutcome {
        self.arm_worker();
        self.emit(MappingEvent::MapPending {
            domain_id: domain,
            port_id: port,
            queue_id: queue,
            slot,
            requested_at: Utc::now(),
        });
        MappingOutcome::Pending
    }

    /// Attempts to commit the `MapInProgress` binding in `slot`.
    ///
    /// Quiesces `port` and every port already mapped to the queue, then
    /// re-reads the queue's in-flight count. Returns `false` (and re-arms the
    /// worker) if events are still in flight.
    pub(crate) fn try_commit_map(
        &mut self,
        domain: DomainId,
        port: PortId,
        slot: usize,
    ) -> Result<bool, MappingError> {
        let binding = self.dir.port(port)?.slots()[slot];
        let queue = binding.queue_id().ok_or(MappingError::InvalidStateTransition {
            port,
            slot,
            from: binding.state(),
            to: SlotState::Mapped,
        })?;

        let mut quiesced = self.dir.ports_mapped_to(domain, queue)?;
        if !quiesced.contains(&port) {
            quiesced.push(port);
        }
        for p in &quiesced {
            self.device.disable_port(*p);
        }

        let inflight = self.device.queue_inflight_count(queue);
        if inflight > 0 {
            warn!(%port, %queue, slot, inflight, "Queue refilled while quiesced; retrying later");
            for p in &quiesced {
                self.enable_port_if_idle(*p)?;
            }
            self.arm_worker();
            return Ok(false);
        }

        let priority = binding.priority();
        self.device.program_binding(port, slot, queue, priority);

        let (atomic, non_atomic) = self.device.queue_backlog(queue).has_work();
        self.device.set_has_work_indicators(port, slot, atomic, non_atomic);
        self.device.reset_inflight_ok_indicator(port, slot);

        self.dir.transition(port, slot, SlotState::Mapped)?;
        self.restore_inflight_limit(queue)?;

        for p in &quiesced {
            self.enable_port_if_idle(*p)?;
        }

        info!(%domain, %port, %queue, slot, priority, "Mapped queue dynamically");
        self.emit(MappingEvent::QueueMapped {
            domain_id: domain,
            port_id: port,
            queue_id: queue,
            slot,
            priority,
            path: MapPath::Dynamic,
            mapped_at: Utc::now(),
        });
        Ok(true)
    }

    /// Restores the steady-state inflight limit once no addition for the
    /// queue is pending anywhere.
    pub(crate) fn restore_inflight_limit(&mut self, queue: QueueId) -> Result<(), MappingError> {
        let q = self.dir.queue_mut(queue)?;
        if q.inflight_limit_is_zeroed && q.num_pending_additions() == 0 {
            q.inflight_limit_is_zeroed = false;
            let limit = q.inflight_limit;
            self.device.set_inflight_limit(queue, limit);
            debug!(%queue, limit, "Restored queue inflight limit");
        }
        Ok(())
    }

    /// Drops a `MapInProgress` binding before it was committed.
    pub(crate) fn abort_map(&mut self, domain: DomainId, port: PortId, slot: usize) -> Result<(), MappingError> {
        let queue = self.dir.port(port)?.slots()[slot]
            .queue_id()
            .ok_or(MappingError::InvalidPortOrSlot { port: port.0, slot: Some(slot) })?;

        self.dir.transition(port, slot, SlotState::Unmapped)?;
        self.restore_inflight_limit(queue)?;

        info!(%domain, %port, %queue, slot, "Cancelled pending map");
        self.emit(MappingEvent::QueueUnmapped {
            domain_id: domain,
            port_id: port,
            queue_id: queue,
            slot,
            unmapped_at: Utc::now(),
        });
        Ok(())
    }

    /// Removes the binding of `queue` from `port` immediately.
    ///
    /// The slot may be mapped, in progress, or already unmapping. The port's
    /// in-flight events are not drained first; callers that need the drain
    /// use `unmap_qid`. An unmapping slot is released the way reconciliation
    /// releases it: the port is re-enabled once idle and a queued remap is
    /// applied.
    pub fn unmap(&mut self, domain: DomainId, port: PortId, queue: QueueId) -> Result<(), MappingError> {
        self.validate_members(domain, port, queue)?;

        let p = self.dir.port(port)?;
        let slot = p
            .find_queue_slot(queue, |s| *s == SlotState::Mapped)
            .or_else(|| p.find_queue_slot(queue, |s| *s == SlotState::MapInProgress))
            .or_else(|| p.find_queue_slot(queue, SlotState::is_unmap_in_progress))
            .ok_or(MappingError::QueueNotMapped { port, queue })?;

        match p.slots()[slot].state() {
            SlotState::MapInProgress => return self.abort_map(domain, port, slot),
            state if state.is_unmap_in_progress() => return self.finish_unmap_slot(domain, port, slot),
            _ => {}
        }

        self.device.clear_binding(port, slot);
        self.dir.transition(port, slot, SlotState::Unmapped)?;

        info!(%domain, %port, %queue, slot, "Unmapped queue");
        self.emit(MappingEvent::QueueUnmapped {
            domain_id: domain,
            port_id: port,
            queue_id: queue,
            slot,
            unmapped_at: Utc::now(),
        });
        Ok(())
    }
}
