// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use crate::domain::error::MappingError;
use crate::domain::ids::{DomainId, PortId, QueueId, Tenancy};
use serde::Serialize;

/// An isolated scheduling partition.
///
/// # Invariants
///
/// - `pending_additions` equals the number of `MapInProgress` slots over all
///   ports in `ports`.
/// - `pending_removals` equals the number of `UnmapInProgress` and
///   `UnmapInProgressPendingMap` slots over the same ports.
/// - `started` is set once and never cleared.
#[derive(Debug, Clone, Serialize)]
pub struct Domain {
    pub id: DomainId,
    pub tenancy: Tenancy,
    pub(in crate::domain) configured: bool,
    pub(in crate::domain) started: bool,
    pub(in crate::domain) pending_additions: u32,
    pub(in crate::domain) pending_removals: u32,
    /// Configured queues, in configuration order.
    pub(in crate::domain) queues: Vec<QueueId>,
    /// Configured ports, in configuration order.
    pub(in crate::domain) ports: Vec<PortId>,
    /// Queues allocated to the domain but not configured yet.
    pub(in crate::domain) avail_queues: Vec<QueueId>,
    /// Ports allocated to the domain but not configured yet.
    pub(in crate::domain) avail_ports: Vec<PortId>,
}

impl Domain {
    pub(crate) fn new(id: DomainId) -> Self {
        Self {
            id,
            tenancy: Tenancy { virt_id: id.0, owner: None },
            configured: false,
            started: false,
            pending_additions: 0,
            pending_removals: 0,
            queues: Vec::new(),
            ports: Vec::new(),
            avail_queues: Vec::new(),
            avail_ports: Vec::new(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.configured
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn pending_additions(&self) -> u32 {
        self.pending_additions
    }

    pub fn pending_removals(&self) -> u32 {
        self.pending_removals
    }

    pub fn queues(&self) -> &[QueueId] {
        &self.queues
    }

    pub fn ports(&self) -> &[PortId] {
        &self.ports
    }

    /// Checks that the domain may be started.
    pub fn ensure_startable(&self) -> Result<(), MappingError> {
        if !self.configured {
            return Err(MappingError::DomainNotConfigured(self.id));
        }
        if self.started {
            return Err(MappingError::DomainAlreadyStarted(self.id));
        }
        Ok(())
    }

    /// Marks the domain started. Scheduling may begin after this point.
    pub fn mark_started(&mut self) -> Result<(), MappingError> {
        self.ensure_startable()?;
        self.started = true;
        Ok(())
    }
}
