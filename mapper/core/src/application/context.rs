// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Mapping Context
//!
//! Borrowed view of everything one mapping operation touches: the resource
//! directory, the device registers, the reconciliation worker and the list
//! of events to publish once the operation returns.
//!
//! The static mapper, dynamic mapper, reconciliation engine, lifecycle
//! controller and request layer are all `impl MappingContext` blocks in
//! their own modules. The caller is responsible for holding the directory
//! lock for the lifetime of the context.

use crate::domain::directory::ResourceDirectory;
use crate::domain::error::MappingError;
use crate::domain::events::MappingEvent;
use crate::domain::hardware::HardwareDevice;
use crate::domain::ids::{DomainId, PortId, QueueId};
use crate::domain::slot::MAX_PRIORITY;
use crate::domain::worker::ReconciliationWorker;
use tracing::debug;

pub struct MappingContext<'a> {
    pub(crate) dir: &'a mut ResourceDirectory,
    pub(crate) device: &'a dyn HardwareDevice,
    pub(crate) worker: &'a dyn ReconciliationWorker,
    pub(crate) events: &'a mut Vec<MappingEvent>,
}

impl<'a> MappingContext<'a> {
    pub fn new(
        dir: &'a mut ResourceDirectory,
        device: &'a dyn HardwareDevice,
        worker: &'a dyn ReconciliationWorker,
        events: &'a mut Vec<MappingEvent>,
    ) -> Self {
        Self { dir, device, worker, events }
    }

    pub fn directory(&self) -> &ResourceDirectory {
        &*self.dir
    }

    /// Checks that `port` and `queue` are configured members of `domain`.
    pub(crate) fn validate_members(
        &self,
        domain: DomainId,
        port: PortId,
        queue: QueueId,
    ) -> Result<(), MappingError> {
        self.dir.domain(domain)?;

        let q = self.dir.queue(queue)?;
        if !q.configured || q.domain != Some(domain) {
            return Err(MappingError::InvalidQueueId(queue.0));
        }

        let p = self.dir.port(port)?;
        if !p.configured || p.domain != Some(domain) {
            return Err(MappingError::InvalidPortOrSlot { port: port.0, slot: None });
        }
        Ok(())
    }

    pub(crate) fn validate_priority(priority: u8) -> Result<(), MappingError> {
        if priority > MAX_PRIORITY {
            return Err(MappingError::InvalidPriority(priority));
        }
        Ok(())
    }

    pub(crate) fn arm_worker(&self) {
        if !self.worker.is_armed() {
            debug!("Arming reconciliation worker");
            self.worker.arm();
        }
    }

    /// Enables the port in hardware unless the caller disabled it or removals
    /// are still draining.
    pub(crate) fn enable_port_if_idle(&self, port: PortId) -> Result<(), MappingError> {
        let p = self.dir.port(port)?;
        if p.enabled && p.num_pending_removals() == 0 {
            self.device.enable_port(port);
        }
        Ok(())
    }

    pub(crate) fn emit(&mut self, event: MappingEvent) {
        self.events.push(event);
    }
}
