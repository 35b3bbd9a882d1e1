// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use crate::domain::ids::{DomainId, QueueId, Tenancy};
use serde::Serialize;

/// A load-balanced work queue.
///
/// Queues are allocated to a domain when the domain is created and become
/// mappable once configured. The mapping counters are maintained by the slot
/// state machine only.
#[derive(Debug, Clone, Serialize)]
pub struct Queue {
    pub id: QueueId,
    pub tenancy: Tenancy,
    /// Owning domain, `None` while the queue sits in the device pool.
    pub(crate) domain: Option<DomainId>,
    pub(crate) configured: bool,
    /// Steady-state inflight limit restored after a dynamic map commits.
    pub(crate) inflight_limit: u32,
    /// True while a dynamic map targeting this queue holds the limit at zero.
    pub(crate) inflight_limit_is_zeroed: bool,
    pub(in crate::domain) num_mappings: u32,
    pub(in crate::domain) num_pending_additions: u32,
}

impl Queue {
    pub(crate) fn new(id: QueueId) -> Self {
        Self {
            id,
            tenancy: Tenancy { virt_id: id.0, owner: None },
            domain: None,
            configured: false,
            inflight_limit: 0,
            inflight_limit_is_zeroed: false,
            num_mappings: 0,
            num_pending_additions: 0,
        }
    }

    pub fn domain(&self) -> Option<DomainId> {
        self.domain
    }

    pub fn is_configured(&self) -> bool {
        self.configured
    }

    pub fn inflight_limit(&self) -> u32 {
        self.inflight_limit
    }

    /// Slots, across all ports, bound to this queue that are `Mapped` or
    /// still unmapping.
    pub fn num_mappings(&self) -> u32 {
        self.num_mappings
    }

    /// Number of slots in `MapInProgress` state for this queue.
    pub fn num_pending_additions(&self) -> u32 {
        self.num_pending_additions
    }
}
