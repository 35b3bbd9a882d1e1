// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::domain::ids::{DomainId, PortId, QueueId};
use crate::domain::outcome::MapPath;

/// Mapping lifecycle events (all ids physical).
///
/// Published on the [`EventBus`](crate::infrastructure::event_bus::EventBus)
/// after the operation that produced them has released the resource lock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MappingEvent {
    DomainCreated {
        domain_id: DomainId,
        num_queues: u32,
        num_ports: u32,
        created_at: DateTime<Utc>,
    },
    DomainStarted {
        domain_id: DomainId,
        started_at: DateTime<Utc>,
    },
    QueueMapped {
        domain_id: DomainId,
        port_id: PortId,
        queue_id: QueueId,
        slot: usize,
        priority: u8,
        path: MapPath,
        mapped_at: DateTime<Utc>,
    },
    MapPending {
        domain_id: DomainId,
        port_id: PortId,
        queue_id: QueueId,
        slot: usize,
        requested_at: DateTime<Utc>,
    },
    PriorityChanged {
        domain_id: DomainId,
        port_id: PortId,
        queue_id: QueueId,
        slot: usize,
        priority: u8,
        changed_at: DateTime<Utc>,
    },
    RemapQueued {
        domain_id: DomainId,
        port_id: PortId,
        slot: usize,
        queue_id: QueueId,
        priority: u8,
        queued_at: DateTime<Utc>,
    },
    /// A queued remap was withdrawn before the slot finished unmapping.
    RemapDropped {
        domain_id: DomainId,
        port_id: PortId,
        slot: usize,
        queue_id: QueueId,
        dropped_at: DateTime<Utc>,
    },
    UnmapPending {
        domain_id: DomainId,
        port_id: PortId,
        queue_id: QueueId,
        slot: usize,
        requested_at: DateTime<Utc>,
    },
    QueueUnmapped {
        domain_id: DomainId,
        port_id: PortId,
        queue_id: QueueId,
        slot: usize,
        unmapped_at: DateTime<Utc>,
    },
    PortEnabled {
        domain_id: DomainId,
        port_id: PortId,
        enabled_at: DateTime<Utc>,
    },
    PortDisabled {
        domain_id: DomainId,
        port_id: PortId,
        disabled_at: DateTime<Utc>,
    },
}

impl MappingEvent {
    pub fn domain_id(&self) -> DomainId {
        match self {
            Self::DomainCreated { domain_id, .. }
            | Self::DomainStarted { domain_id, .. }
            | Self::QueueMapped { domain_id, .. }
            | Self::MapPending { domain_id, .. }
            | Self::PriorityChanged { domain_id, .. }
            | Self::RemapQueued { domain_id, .. }
            | Self::RemapDropped { domain_id, .. }
            | Self::UnmapPending { domain_id, .. }
            | Self::QueueUnmapped { domain_id, .. }
            | Self::PortEnabled { domain_id, .. }
            | Self::PortDisabled { domain_id, .. } => *domain_id,
        }
    }

    /// Port the event concerns, `None` for domain-wide events.
    pub fn port_id(&self) -> Option<PortId> {
        match self {
            Self::DomainCreated { .. } | Self::DomainStarted { .. } => None,
            Self::QueueMapped { port_id, .. }
            | Self::MapPending { port_id, .. }
            | Self::PriorityChanged { port_id, .. }
            | Self::RemapQueued { port_id, .. }
            | Self::RemapDropped { port_id, .. }
            | Self::UnmapPending { port_id, .. }
            | Self::QueueUnmapped { port_id, .. }
            | Self::PortEnabled { port_id, .. }
            | Self::PortDisabled { port_id, .. } => Some(*port_id),
        }
    }
}
