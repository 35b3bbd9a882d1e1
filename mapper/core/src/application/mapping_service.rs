// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Mapping Application Service
//!
//! Entry point for hosts and the reconciliation worker. Coordinates:
//! - Domain layer: ResourceDirectory, slot state machine
//! - Hardware: HardwareDevice register backend
//! - Worker: ReconciliationWorker scheduling capability
//! - Event bus: publishing MappingEvents for observability
//!
//! All mutation is serialised behind one directory lock. Events produced by
//! an operation are published after the lock has been released.

use crate::application::context::MappingContext;
use crate::domain::config::{DomainConfig, PortConfig, QueueConfig};
use crate::domain::directory::{AvailableResources, ResourceDirectory};
use crate::domain::error::MappingError;
use crate::domain::hardware::HardwareDevice;
use crate::domain::ids::{DomainId, PortId, QueueId, Requester};
use crate::domain::outcome::MappingOutcome;
use crate::domain::port::Port;
use crate::domain::slot::{Slot, SLOTS_PER_PORT};
use crate::domain::worker::ReconciliationWorker;
use crate::infrastructure::event_bus::EventBus;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error};

// ============================================================================
// Views
// ============================================================================

/// Pending work counters of one domain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingCounts {
    pub pending_additions: u32,
    pub pending_removals: u32,
}

/// Snapshot of one slot, with queue ids as the requester sees them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotView {
    pub index: usize,
    pub state: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_id: Option<u32>,
    pub priority: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_queue_id: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_priority: Option<u8>,
}

/// Snapshot of one port and its slot table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortView {
    pub port_id: u32,
    pub physical_id: PortId,
    pub enabled: bool,
    pub num_mappings: u32,
    pub num_pending_removals: u32,
    pub slots: Vec<SlotView>,
}

// ============================================================================
// Service Trait
// ============================================================================

/// Requester-facing operations take the ids the requester sees. The
/// `map_static`, `map_dynamic`, `unmap` and `finish_*` primitives take
/// physical ids and skip request interpretation.
pub trait MappingService: Send + Sync {
    fn create_domain(&self, requester: Requester, config: DomainConfig) -> Result<DomainId, MappingError>;

    fn create_queue(
        &self,
        requester: Requester,
        domain: DomainId,
        config: QueueConfig,
    ) -> Result<QueueId, MappingError>;

    fn create_port(
        &self,
        requester: Requester,
        domain: DomainId,
        config: PortConfig,
    ) -> Result<PortId, MappingError>;

    fn start_domain(&self, requester: Requester, domain: DomainId) -> Result<(), MappingError>;

    fn map_qid(
        &self,
        requester: Requester,
        domain: DomainId,
        port: PortId,
        queue: QueueId,
        priority: u8,
    ) -> Result<MappingOutcome, MappingError>;

    fn unmap_qid(
        &self,
        requester: Requester,
        domain: DomainId,
        port: PortId,
        queue: QueueId,
    ) -> Result<MappingOutcome, MappingError>;

    fn enable_port(&self, requester: Requester, domain: DomainId, port: PortId) -> Result<(), MappingError>;

    fn disable_port(&self, requester: Requester, domain: DomainId, port: PortId) -> Result<(), MappingError>;

    fn map_static(&self, domain: DomainId, port: PortId, queue: QueueId, priority: u8) -> Result<(), MappingError>;

    fn map_dynamic(
        &self,
        domain: DomainId,
        port: PortId,
        queue: QueueId,
        priority: u8,
    ) -> Result<MappingOutcome, MappingError>;

    fn unmap(&self, domain: DomainId, port: PortId, queue: QueueId) -> Result<(), MappingError>;

    /// Returns the number of additions still pending.
    fn finish_pending_maps(&self) -> Result<u32, MappingError>;

    /// Returns the number of removals still pending.
    fn finish_pending_unmaps(&self) -> Result<u32, MappingError>;

    /// One reconciliation pass: unmaps, then maps. Returns the number of
    /// entries still pending and disarms the worker when it reaches zero.
    fn reconcile(&self) -> Result<u32, MappingError>;

    fn pending_port_unmaps(&self, requester: Requester, domain: DomainId, port: PortId) -> Result<u32, MappingError>;

    fn queue_mapping_count(&self, requester: Requester, domain: DomainId, queue: QueueId) -> Result<u32, MappingError>;

    fn domain_pending_counts(&self, requester: Requester, domain: DomainId) -> Result<PendingCounts, MappingError>;

    fn slot(&self, requester: Requester, domain: DomainId, port: PortId, slot: usize) -> Result<SlotView, MappingError>;

    fn port_view(&self, requester: Requester, domain: DomainId, port: PortId) -> Result<PortView, MappingError>;

    /// Views of every configured port of the domain, in configuration order.
    fn domain_ports(&self, requester: Requester, domain: DomainId) -> Result<Vec<PortView>, MappingError>;

    /// Domains, queues and ports still free for new domains.
    fn available_resources(&self) -> AvailableResources;
}

// ============================================================================
// Standard Implementation
// ============================================================================

pub struct StandardMappingService {
    directory: Mutex<ResourceDirectory>,
    device: Arc<dyn HardwareDevice>,
    worker: Arc<dyn ReconciliationWorker>,
    event_bus: Arc<EventBus>,
}

impl StandardMappingService {
    pub fn new(
        directory: ResourceDirectory,
        device: Arc<dyn HardwareDevice>,
        worker: Arc<dyn ReconciliationWorker>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            directory: Mutex::new(directory),
            device,
            worker,
            event_bus,
        }
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    /// Runs `f` read-only against the directory.
    pub fn inspect<T>(&self, f: impl FnOnce(&ResourceDirectory) -> T) -> T {
        f(&*self.directory.lock())
    }

    /// Runs one operation under the directory lock, then publishes the
    /// events it produced and records the outcome.
    fn execute<T>(
        &self,
        operation: &'static str,
        f: impl FnOnce(&mut MappingContext<'_>) -> Result<T, MappingError>,
    ) -> Result<T, MappingError> {
        let mut events = Vec::new();
        let result = {
            let mut directory = self.directory.lock();
            let mut ctx = MappingContext::new(
                &mut directory,
                self.device.as_ref(),
                self.worker.as_ref(),
                &mut events,
            );
            f(&mut ctx)
        };

        match &result {
            Ok(_) => {
                metrics::counter!("qidmap_operations_total", "operation" => operation, "result" => "ok")
                    .increment(1);
            }
            Err(e) => {
                if e.is_fatal() {
                    error!(operation, error = %e, "Mapping bookkeeping fault");
                } else {
                    debug!(operation, error = %e, "Mapping operation rejected");
                }
                metrics::counter!("qidmap_operations_total", "operation" => operation, "result" => "error")
                    .increment(1);
            }
        }

        for event in events {
            self.event_bus.publish(event);
        }
        result
    }

    fn port_snapshot(dir: &ResourceDirectory, requester: Requester, port: &Port) -> Result<PortView, MappingError> {
        let slots = (0..SLOTS_PER_PORT)
            .map(|index| Self::slot_snapshot(dir, requester, index, &port.slots()[index]))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(PortView {
            port_id: ResourceDirectory::visible_id(requester, port.id.0, &port.tenancy),
            physical_id: port.id,
            enabled: port.enabled,
            num_mappings: port.num_mappings(),
            num_pending_removals: port.num_pending_removals(),
            slots,
        })
    }

    fn slot_snapshot(
        dir: &ResourceDirectory,
        requester: Requester,
        index: usize,
        slot: &Slot,
    ) -> Result<SlotView, MappingError> {
        let visible = |queue: QueueId| -> Result<u32, MappingError> {
            let tenancy = dir.queue(queue)?.tenancy;
            Ok(ResourceDirectory::visible_id(requester, queue.0, &tenancy))
        };
        Ok(SlotView {
            index,
            state: slot.state().name(),
            queue_id: slot.queue_id().map(&visible).transpose()?,
            priority: slot.priority(),
            pending_queue_id: slot.pending_queue_id().map(&visible).transpose()?,
            pending_priority: slot.pending_priority(),
        })
    }
}

impl MappingService for StandardMappingService {
    fn create_domain(&self, requester: Requester, config: DomainConfig) -> Result<DomainId, MappingError> {
        self.execute("create_domain", |ctx| ctx.create_domain(requester, config))
    }

    fn create_queue(
        &self,
        requester: Requester,
        domain: DomainId,
        config: QueueConfig,
    ) -> Result<QueueId, MappingError> {
        self.execute("create_queue", |ctx| ctx.create_queue(requester, domain, config))
    }

    fn create_port(
        &self,
        requester: Requester,
        domain: DomainId,
        config: PortConfig,
    ) -> Result<PortId, MappingError> {
        self.execute("create_port", |ctx| ctx.create_port(requester, domain, config))
    }

    fn start_domain(&self, requester: Requester, domain: DomainId) -> Result<(), MappingError> {
        self.execute("start_domain", |ctx| {
            let domain = ctx.directory().resolve_domain(requester, domain.0)?;
            ctx.start_domain(domain)
        })
    }

    fn map_qid(
        &self,
        requester: Requester,
        domain: DomainId,
        port: PortId,
        queue: QueueId,
        priority: u8,
    ) -> Result<MappingOutcome, MappingError> {
        self.execute("map_qid", |ctx| ctx.map_qid(requester, domain, port, queue, priority))
    }

    fn unmap_qid(
        &self,
        requester: Requester,
        domain: DomainId,
        port: PortId,
        queue: QueueId,
    ) -> Result<MappingOutcome, MappingError> {
        self.execute("unmap_qid", |ctx| ctx.unmap_qid(requester, domain, port, queue))
    }

    fn enable_port(&self, requester: Requester, domain: DomainId, port: PortId) -> Result<(), MappingError> {
        self.execute("enable_port", |ctx| ctx.enable_port(requester, domain, port))
    }

    fn disable_port(&self, requester: Requester, domain: DomainId, port: PortId) -> Result<(), MappingError> {
        self.execute("disable_port", |ctx| ctx.disable_port(requester, domain, port))
    }

    fn map_static(&self, domain: DomainId, port: PortId, queue: QueueId, priority: u8) -> Result<(), MappingError> {
        self.execute("map_static", |ctx| ctx.map_static(domain, port, queue, priority))
    }

    fn map_dynamic(
        &self,
        domain: DomainId,
        port: PortId,
        queue: QueueId,
        priority: u8,
    ) -> Result<MappingOutcome, MappingError> {
        self.execute("map_dynamic", |ctx| ctx.map_dynamic(domain, port, queue, priority))
    }

    fn unmap(&self, domain: DomainId, port: PortId, queue: QueueId) -> Result<(), MappingError> {
        self.execute("unmap", |ctx| ctx.unmap(domain, port, queue))
    }

    fn finish_pending_maps(&self) -> Result<u32, MappingError> {
        self.execute("finish_pending_maps", |ctx| ctx.finish_pending_maps())
    }

    fn finish_pending_unmaps(&self) -> Result<u32, MappingError> {
        self.execute("finish_pending_unmaps", |ctx| ctx.finish_pending_unmaps())
    }

    fn reconcile(&self) -> Result<u32, MappingError> {
        self.execute("reconcile", |ctx| {
            let removals = ctx.finish_pending_unmaps()?;
            let additions = ctx.finish_pending_maps()?;

            metrics::gauge!("qidmap_pending_removals").set(removals as f64);
            metrics::gauge!("qidmap_pending_additions").set(additions as f64);

            let remaining = removals + additions;
            if remaining == 0 {
                ctx.worker.disarm();
            }
            debug!(removals, additions, "Reconciliation pass finished");
            Ok(remaining)
        })
    }

    fn pending_port_unmaps(&self, requester: Requester, domain: DomainId, port: PortId) -> Result<u32, MappingError> {
        let dir = self.directory.lock();
        let domain = dir.resolve_configured_domain(requester, domain.0)?;
        let port = dir.resolve_port(requester, domain, port.0)?;
        Ok(dir.port(port)?.num_pending_removals())
    }

    fn queue_mapping_count(&self, requester: Requester, domain: DomainId, queue: QueueId) -> Result<u32, MappingError> {
        let dir = self.directory.lock();
        let domain = dir.resolve_configured_domain(requester, domain.0)?;
        let queue = dir.resolve_queue(requester, domain, queue.0)?;
        Ok(dir.queue(queue)?.num_mappings())
    }

    fn domain_pending_counts(&self, requester: Requester, domain: DomainId) -> Result<PendingCounts, MappingError> {
        let dir = self.directory.lock();
        let domain = dir.resolve_configured_domain(requester, domain.0)?;
        let d = dir.domain(domain)?;
        Ok(PendingCounts {
            pending_additions: d.pending_additions(),
            pending_removals: d.pending_removals(),
        })
    }

    fn slot(&self, requester: Requester, domain: DomainId, port: PortId, slot: usize) -> Result<SlotView, MappingError> {
        let dir = self.directory.lock();
        let domain = dir.resolve_configured_domain(requester, domain.0)?;
        let port_id = dir.resolve_port(requester, domain, port.0)?;
        let entry = dir
            .port(port_id)?
            .slot(slot)
            .copied()
            .ok_or(MappingError::InvalidPortOrSlot { port: port.0, slot: Some(slot) })?;
        Self::slot_snapshot(&dir, requester, slot, &entry)
    }

    fn port_view(&self, requester: Requester, domain: DomainId, port: PortId) -> Result<PortView, MappingError> {
        let dir = self.directory.lock();
        let domain = dir.resolve_configured_domain(requester, domain.0)?;
        let port = dir.resolve_port(requester, domain, port.0)?;
        Self::port_snapshot(&dir, requester, dir.port(port)?)
    }

    fn domain_ports(&self, requester: Requester, domain: DomainId) -> Result<Vec<PortView>, MappingError> {
        let dir = self.directory.lock();
        let domain = dir.resolve_configured_domain(requester, domain.0)?;
        dir.domain(domain)?
            .ports()
            .iter()
            .map(|p| Self::port_snapshot(&dir, requester, dir.port(*p)?))
            .collect()
    }

    fn available_resources(&self) -> AvailableResources {
        self.directory.lock().available_resources()
    }
}
