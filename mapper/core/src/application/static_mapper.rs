// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Static Mapper
//!
//! Binds a queue to a port before its domain is started. Nothing is being
//! scheduled yet, so the binding is programmed and committed in one step.

use crate::application::context::MappingContext;
use crate::domain::error::MappingError;
use crate::domain::events::MappingEvent;
use crate::domain::ids::{DomainId, PortId, QueueId};
use crate::domain::outcome::MapPath;
use crate::domain::slot::SlotState;
use chrono::Utc;
use tracing::{error, info};

impl MappingContext<'_> {
    /// Maps `queue` to `port` synchronously.
    ///
    /// Reuses a slot already holding the queue (in progress or mapped) before
    /// claiming the first unmapped slot.
    pub fn map_static(
        &mut self,
        domain: DomainId,
        port: PortId,
        queue: QueueId,
        priority: u8,
    ) -> Result<(), MappingError> {
        Self::validate_priority(priority)?;
        self.validate_members(domain, port, queue)?;
        if self.dir.domain(domain)?.is_started() {
            return Err(MappingError::DomainAlreadyStarted(domain));
        }

        let p = self.dir.port(port)?;
        let slot = p
            .find_queue_slot(queue, |s| *s == SlotState::MapInProgress)
            .or_else(|| p.find_queue_slot(queue, |s| *s == SlotState::Mapped))
            .or_else(|| p.find_slot(|s| *s == SlotState::Unmapped))
            .ok_or_else(|| {
                error!(%port, %queue, "Internal error: no free slot for static map");
                MappingError::NoFreeSlot { port, queue }
            })?;
        let was_mapped = p.slots()[slot].state() == SlotState::Mapped;

        self.device.program_binding(port, slot, queue, priority);
        self.dir.port_mut(port)?.bind_slot(slot, queue, priority);
        self.dir.transition(port, slot, SlotState::Mapped)?;

        let now = Utc::now();
        if was_mapped {
            info!(%domain, %port, %queue, slot, priority, "Updated static mapping priority");
            self.emit(MappingEvent::PriorityChanged {
                domain_id: domain,
                port_id: port,
                queue_id: queue,
                slot,
                priority,
                changed_at: now,
            });
        } else {
            info!(%domain, %port, %queue, slot, priority, "Mapped queue statically");
            self.emit(MappingEvent::QueueMapped {
                domain_id: domain,
                port_id: port,
                queue_id: queue,
                slot,
                priority,
                path: MapPath::Static,
                mapped_at: now,
            });
        }
        Ok(())
    }
}
