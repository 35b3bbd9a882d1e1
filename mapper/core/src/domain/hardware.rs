// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Device Register Interface
//!
//! The mappers never touch device memory directly. Everything they need from
//! the event device goes through [`HardwareDevice`], implemented by a real
//! register backend or by
//! [`SimulatedDevice`](crate::infrastructure::simulated_device::SimulatedDevice).
//!
//! All ids are physical. Register accesses are treated as fast and
//! infallible, so the trait is synchronous and returns plain values.

use crate::domain::ids::{PortId, QueueId};
use serde::{Deserialize, Serialize};

/// Work the scheduler still holds for a queue, used to seed has-work bits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueBacklog {
    /// Events with an active atomic flow.
    pub atomic_active: u32,
    /// Events enqueued for non-atomic (ordered/unordered) scheduling.
    pub enqueued: u32,
}

impl QueueBacklog {
    /// Has-work bits as `(atomic, non_atomic)`.
    pub fn has_work(&self) -> (bool, bool) {
        (self.atomic_active > 0, self.enqueued > 0)
    }
}

pub trait HardwareDevice: Send + Sync {
    /// Events scheduled from `queue` and not yet completed.
    fn queue_inflight_count(&self, queue: QueueId) -> u32;

    /// Events scheduled to `port` and not yet completed.
    fn port_inflight_count(&self, port: PortId) -> u32;

    fn queue_backlog(&self, queue: QueueId) -> QueueBacklog;

    /// Zero stops the scheduler from dispatching the queue.
    fn set_inflight_limit(&self, queue: QueueId, limit: u32);

    fn program_binding(&self, port: PortId, slot: usize, queue: QueueId, priority: u8);

    fn clear_binding(&self, port: PortId, slot: usize);

    fn set_has_work_indicators(&self, port: PortId, slot: usize, atomic: bool, non_atomic: bool);

    fn reset_inflight_ok_indicator(&self, port: PortId, slot: usize);

    fn enable_port(&self, port: PortId);

    fn disable_port(&self, port: PortId);

    /// Whether the device accepts enqueues to `queue`.
    fn set_write_permission(&self, queue: QueueId, enabled: bool);
}
