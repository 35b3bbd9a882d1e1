// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Request Layer
//!
//! Caller-facing map, unmap and port enable requests. Ids are the ones the
//! requester sees (virtual for vdevs) and are resolved against the
//! directory before any state is touched.
//!
//! A map request is interpreted against what the port already holds for the
//! queue, in this order:
//!
//! 1. mapped: priority change
//! 2. unmapping: the removal is cancelled
//! 3. map in progress: the pending priority is updated
//! 4. queued behind an unmap: the queued priority is updated
//! 5. no unmapped slot left but one is draining: the map is queued on it
//! 6. otherwise a fresh static or dynamic map, depending on domain start

use crate::application::context::MappingContext;
use crate::domain::error::MappingError;
use crate::domain::events::MappingEvent;
use crate::domain::ids::{DomainId, PortId, QueueId, Requester};
use crate::domain::outcome::MappingOutcome;
use crate::domain::port::Port;
use crate::domain::slot::{PendingMap, SlotState};
use chrono::Utc;
use tracing::{debug, info};

/// Physical ids of a resolved request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedTarget {
    pub domain: DomainId,
    pub port: PortId,
    pub queue: Option<QueueId>,
}

impl MappingContext<'_> {
    pub fn resolve_port_target(
        &self,
        requester: Requester,
        domain: DomainId,
        port: PortId,
    ) -> Result<ResolvedTarget, MappingError> {
        let domain = self.dir.resolve_configured_domain(requester, domain.0)?;
        let port = self.dir.resolve_port(requester, domain, port.0)?;
        Ok(ResolvedTarget { domain, port, queue: None })
    }

    pub fn resolve_target(
        &self,
        requester: Requester,
        domain: DomainId,
        port: PortId,
        queue: QueueId,
    ) -> Result<ResolvedTarget, MappingError> {
        let target = self.resolve_port_target(requester, domain, port)?;
        let queue = self.dir.resolve_queue(requester, target.domain, queue.0)?;
        Ok(ResolvedTarget { queue: Some(queue), ..target })
    }

    /// Requests that `queue` be mapped to `port` at `priority`.
    pub fn map_qid(
        &mut self,
        requester: Requester,
        domain: DomainId,
        port: PortId,
        queue: QueueId,
        priority: u8,
    ) -> Result<MappingOutcome, MappingError> {
        Self::validate_priority(priority)?;
        let target = self.resolve_target(requester, domain, port, queue)?;
        let (domain, port) = (target.domain, target.port);
        let queue = target.queue.ok_or(MappingError::InvalidQueueId(queue.0))?;

        let p = self.dir.port(port)?;
        if !slot_available(p, queue) {
            return Err(MappingError::InsufficientResources(format!(
                "{} has no free slot for {}",
                port, queue
            )));
        }

        if let Some(slot) = p.find_queue_slot(queue, |s| *s == SlotState::Mapped) {
            self.change_priority(domain, port, queue, slot, priority)?;
            return Ok(MappingOutcome::Completed);
        }

        if let Some(slot) = p.find_queue_slot(queue, |s| *s == SlotState::UnmapInProgress) {
            self.cancel_unmap(domain, port, queue, slot, priority)?;
            return Ok(MappingOutcome::Completed);
        }

        if let Some(slot) = p.find_queue_slot(queue, |s| *s == SlotState::MapInProgress) {
            debug!(%port, %queue, slot, priority, "Updated priority of pending map");
            self.dir.port_mut(port)?.set_slot_priority(slot, priority);
            return Ok(MappingOutcome::Pending);
        }

        if let Some(slot) = p.find_pending_map_slot(queue) {
            debug!(%port, %queue, slot, priority, "Updated priority of queued remap");
            self.dir.port_mut(port)?.set_pending_priority(slot, priority);
            return Ok(MappingOutcome::Pending);
        }

        if p.find_slot(|s| *s == SlotState::Unmapped).is_none() {
            if let Some(slot) = p.find_slot(|s| *s == SlotState::UnmapInProgress) {
                self.queue_remap(domain, port, queue, slot, priority)?;
                return Ok(MappingOutcome::Pending);
            }
        }

        if self.dir.domain(domain)?.is_started() {
            self.map_dynamic(domain, port, queue, priority)
        } else {
            self.map_static(domain, port, queue, priority)?;
            Ok(MappingOutcome::Completed)
        }
    }

    fn change_priority(
        &mut self,
        domain: DomainId,
        port: PortId,
        queue: QueueId,
        slot: usize,
        priority: u8,
    ) -> Result<(), MappingError> {
        if self.dir.port(port)?.slots()[slot].priority() != priority {
            self.device.program_binding(port, slot, queue, priority);
            self.dir.port_mut(port)?.set_slot_priority(slot, priority);
        }
        self.dir.transition(port, slot, SlotState::Mapped)?;

        info!(%domain, %port, %queue, slot, priority, "Changed mapping priority");
        self.emit(MappingEvent::PriorityChanged {
            domain_id: domain,
            port_id: port,
            queue_id: queue,
            slot,
            priority,
            changed_at: Utc::now(),
        });
        Ok(())
    }

    fn cancel_unmap(
        &mut self,
        domain: DomainId,
        port: PortId,
        queue: QueueId,
        slot: usize,
        priority: u8,
    ) -> Result<(), MappingError> {
        if self.dir.port(port)?.slots()[slot].priority() != priority {
            self.device.program_binding(port, slot, queue, priority);
            self.dir.port_mut(port)?.set_slot_priority(slot, priority);
        }
        self.dir.transition(port, slot, SlotState::Mapped)?;
        self.enable_port_if_idle(port)?;

        info!(%domain, %port, %queue, slot, priority, "Cancelled pending unmap");
        self.emit(MappingEvent::PriorityChanged {
            domain_id: domain,
            port_id: port,
            queue_id: queue,
            slot,
            priority,
            changed_at: Utc::now(),
        });
        Ok(())
    }

    fn queue_remap(
        &mut self,
        domain: DomainId,
        port: PortId,
        queue: QueueId,
        slot: usize,
        priority: u8,
    ) -> Result<(), MappingError> {
        self.dir.transition(
            port,
            slot,
            SlotState::UnmapInProgressPendingMap(PendingMap { queue, priority }),
        )?;
        self.arm_worker();

        info!(%domain, %port, %queue, slot, priority, "Queued map behind pending unmap");
        self.emit(MappingEvent::RemapQueued {
            domain_id: domain,
            port_id: port,
            slot,
            queue_id: queue,
            priority,
            queued_at: Utc::now(),
        });
        Ok(())
    }

    /// Requests that `queue` be unmapped from `port`.
    ///
    /// A mapped queue is removed only after the port has no events in flight;
    /// if that is not the case yet the request returns `Pending` and the
    /// reconciliation worker finishes it.
    pub fn unmap_qid(
        &mut self,
        requester: Requester,
        domain: DomainId,
        port: PortId,
        queue: QueueId,
    ) -> Result<MappingOutcome, MappingError> {
        let target = self.resolve_target(requester, domain, port, queue)?;
        let (domain, port) = (target.domain, target.port);
        let queue = target.queue.ok_or(MappingError::InvalidQueueId(queue.0))?;

        let p = self.dir.port(port)?;
        let mapped = p.find_queue_slot(queue, |s| *s == SlotState::Mapped);
        let adding = p.find_queue_slot(queue, |s| *s == SlotState::MapInProgress);
        let queued = p.find_pending_map_slot(queue);

        if let Some(slot) = adding {
            self.abort_map(domain, port, slot)?;
            return Ok(MappingOutcome::Completed);
        }

        if let Some(slot) = queued {
            self.dir.transition(port, slot, SlotState::UnmapInProgress)?;
            info!(%domain, %port, %queue, slot, "Dropped queued remap");
            self.emit(MappingEvent::RemapDropped {
                domain_id: domain,
                port_id: port,
                slot,
                queue_id: queue,
                dropped_at: Utc::now(),
            });
            return Ok(MappingOutcome::Completed);
        }

        let slot = mapped.ok_or(MappingError::QueueNotMapped { port, queue })?;

        self.device.disable_port(port);
        self.dir.transition(port, slot, SlotState::UnmapInProgress)?;
        self.emit(MappingEvent::UnmapPending {
            domain_id: domain,
            port_id: port,
            queue_id: queue,
            slot,
            requested_at: Utc::now(),
        });

        if self.finish_unmap_port(domain, port)? {
            Ok(MappingOutcome::Completed)
        } else {
            self.arm_worker();
            Ok(MappingOutcome::Pending)
        }
    }

    /// Sets the caller's enable flag and enables the port in hardware unless
    /// removals are still draining.
    pub fn enable_port(&mut self, requester: Requester, domain: DomainId, port: PortId) -> Result<(), MappingError> {
        let target = self.resolve_port_target(requester, domain, port)?;
        let p = self.dir.port_mut(target.port)?;
        if p.enabled {
            return Ok(());
        }
        p.enabled = true;
        self.enable_port_if_idle(target.port)?;

        info!(domain = %target.domain, port = %target.port, "Enabled port");
        self.emit(MappingEvent::PortEnabled {
            domain_id: target.domain,
            port_id: target.port,
            enabled_at: Utc::now(),
        });
        Ok(())
    }

    /// Clears the caller's enable flag and disables the port in hardware.
    pub fn disable_port(&mut self, requester: Requester, domain: DomainId, port: PortId) -> Result<(), MappingError> {
        let target = self.resolve_port_target(requester, domain, port)?;
        let p = self.dir.port_mut(target.port)?;
        if !p.enabled {
            return Ok(());
        }
        p.enabled = false;
        self.device.disable_port(target.port);

        info!(domain = %target.domain, port = %target.port, "Disabled port");
        self.emit(MappingEvent::PortDisabled {
            domain_id: target.domain,
            port_id: target.port,
            disabled_at: Utc::now(),
        });
        Ok(())
    }
}

/// Whether a map request for `queue` can be placed on `port`.
fn slot_available(port: &Port, queue: QueueId) -> bool {
    port.find_queue_slot(queue, |s| matches!(s, SlotState::Mapped | SlotState::MapInProgress))
        .is_some()
        || port.find_pending_map_slot(queue).is_some()
        || port.find_slot(|s| matches!(s, SlotState::Unmapped | SlotState::UnmapInProgress)).is_some()
}
