// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! In-memory [`HardwareDevice`] backend.
//!
//! Keeps the register state a real device would hold and records every
//! write in an operation log. In-flight counters can be scripted: each read
//! consumes the next scripted value and falls back to a steady value once
//! the script runs out. Used by the test suites and by `qidmap simulate`.

use crate::domain::hardware::{HardwareDevice, QueueBacklog};
use crate::domain::ids::{PortId, QueueId};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};

/// One register write, as recorded in the operation log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum DeviceOp {
    SetInflightLimit { queue: QueueId, limit: u32 },
    ProgramBinding { port: PortId, slot: usize, queue: QueueId, priority: u8 },
    ClearBinding { port: PortId, slot: usize },
    SetHasWork { port: PortId, slot: usize, atomic: bool, non_atomic: bool },
    ResetInflightOk { port: PortId, slot: usize },
    EnablePort { port: PortId },
    DisablePort { port: PortId },
    SetWritePermission { queue: QueueId, enabled: bool },
}

#[derive(Debug, Default)]
struct InflightCounter {
    scripted: VecDeque<u32>,
    steady: u32,
}

impl InflightCounter {
    fn read(&mut self) -> u32 {
        self.scripted.pop_front().unwrap_or(self.steady)
    }
}

#[derive(Debug, Default)]
struct Registers {
    queue_inflight: HashMap<QueueId, InflightCounter>,
    port_inflight: HashMap<PortId, InflightCounter>,
    backlog: HashMap<QueueId, QueueBacklog>,
    inflight_limits: HashMap<QueueId, Vec<u32>>,
    bindings: HashMap<(PortId, usize), (QueueId, u8)>,
    has_work: HashMap<(PortId, usize), (bool, bool)>,
    inflight_ok_resets: HashMap<(PortId, usize), usize>,
    enabled_ports: HashSet<PortId>,
    write_permissions: HashMap<QueueId, bool>,
    log: Vec<DeviceOp>,
}

#[derive(Debug, Default)]
pub struct SimulatedDevice {
    registers: Mutex<Registers>,
}

impl SimulatedDevice {
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------
    // Scripting
    // ------------------------------------------------------------------

    /// Queues values returned by successive `queue_inflight_count` reads.
    pub fn script_queue_inflight(&self, queue: QueueId, reads: impl IntoIterator<Item = u32>) {
        let mut regs = self.registers.lock();
        regs.queue_inflight.entry(queue).or_default().scripted.extend(reads);
    }

    /// Sets the value returned once the queue's script is exhausted.
    pub fn set_queue_inflight(&self, queue: QueueId, count: u32) {
        let mut regs = self.registers.lock();
        let counter = regs.queue_inflight.entry(queue).or_default();
        counter.scripted.clear();
        counter.steady = count;
    }

    /// Queues values returned by successive `port_inflight_count` reads.
    pub fn script_port_inflight(&self, port: PortId, reads: impl IntoIterator<Item = u32>) {
        let mut regs = self.registers.lock();
        regs.port_inflight.entry(port).or_default().scripted.extend(reads);
    }

    /// Sets the value returned once the port's script is exhausted.
    pub fn set_port_inflight(&self, port: PortId, count: u32) {
        let mut regs = self.registers.lock();
        let counter = regs.port_inflight.entry(port).or_default();
        counter.scripted.clear();
        counter.steady = count;
    }

    pub fn set_queue_backlog(&self, queue: QueueId, backlog: QueueBacklog) {
        self.registers.lock().backlog.insert(queue, backlog);
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    /// Current inflight limit of the queue, if ever written.
    pub fn inflight_limit(&self, queue: QueueId) -> Option<u32> {
        self.registers
            .lock()
            .inflight_limits
            .get(&queue)
            .and_then(|history| history.last().copied())
    }

    /// Every inflight limit written to the queue, oldest first.
    pub fn inflight_limit_history(&self, queue: QueueId) -> Vec<u32> {
        self.registers.lock().inflight_limits.get(&queue).cloned().unwrap_or_default()
    }

    pub fn binding(&self, port: PortId, slot: usize) -> Option<(QueueId, u8)> {
        self.registers.lock().bindings.get(&(port, slot)).copied()
    }

    /// Has-work bits as `(atomic, non_atomic)`.
    pub fn has_work(&self, port: PortId, slot: usize) -> (bool, bool) {
        self.registers.lock().has_work.get(&(port, slot)).copied().unwrap_or_default()
    }

    pub fn inflight_ok_resets(&self, port: PortId, slot: usize) -> usize {
        self.registers.lock().inflight_ok_resets.get(&(port, slot)).copied().unwrap_or(0)
    }

    pub fn is_port_enabled(&self, port: PortId) -> bool {
        self.registers.lock().enabled_ports.contains(&port)
    }

    pub fn write_permission(&self, queue: QueueId) -> bool {
        self.registers.lock().write_permissions.get(&queue).copied().unwrap_or(false)
    }

    pub fn operations(&self) -> Vec<DeviceOp> {
        self.registers.lock().log.clone()
    }

    pub fn clear_operations(&self) {
        self.registers.lock().log.clear();
    }
}

impl HardwareDevice for SimulatedDevice {
    fn queue_inflight_count(&self, queue: QueueId) -> u32 {
        self.registers.lock().queue_inflight.entry(queue).or_default().read()
    }

    fn port_inflight_count(&self, port: PortId) -> u32 {
        self.registers.lock().port_inflight.entry(port).or_default().read()
    }

    fn queue_backlog(&self, queue: QueueId) -> QueueBacklog {
        self.registers.lock().backlog.get(&queue).copied().unwrap_or_default()
    }

    fn set_inflight_limit(&self, queue: QueueId, limit: u32) {
        let mut regs = self.registers.lock();
        regs.inflight_limits.entry(queue).or_default().push(limit);
        regs.log.push(DeviceOp::SetInflightLimit { queue, limit });
    }

    fn program_binding(&self, port: PortId, slot: usize, queue: QueueId, priority: u8) {
        let mut regs = self.registers.lock();
        regs.bindings.insert((port, slot), (queue, priority));
        regs.log.push(DeviceOp::ProgramBinding { port, slot, queue, priority });
    }

    fn clear_binding(&self, port: PortId, slot: usize) {
        let mut regs = self.registers.lock();
        regs.bindings.remove(&(port, slot));
        regs.log.push(DeviceOp::ClearBinding { port, slot });
    }

    fn set_has_work_indicators(&self, port: PortId, slot: usize, atomic: bool, non_atomic: bool) {
        let mut regs = self.registers.lock();
        regs.has_work.insert((port, slot), (atomic, non_atomic));
        regs.log.push(DeviceOp::SetHasWork { port, slot, atomic, non_atomic });
    }

    fn reset_inflight_ok_indicator(&self, port: PortId, slot: usize) {
        let mut regs = self.registers.lock();
        *regs.inflight_ok_resets.entry((port, slot)).or_default() += 1;
        regs.log.push(DeviceOp::ResetInflightOk { port, slot });
    }

    fn enable_port(&self, port: PortId) {
        let mut regs = self.registers.lock();
        regs.enabled_ports.insert(port);
        regs.log.push(DeviceOp::EnablePort { port });
    }

    fn disable_port(&self, port: PortId) {
        let mut regs = self.registers.lock();
        regs.enabled_ports.remove(&port);
        regs.log.push(DeviceOp::DisablePort { port });
    }

    fn set_write_permission(&self, queue: QueueId, enabled: bool) {
        let mut regs = self.registers.lock();
        regs.write_permissions.insert(queue, enabled);
        regs.log.push(DeviceOp::SetWritePermission { queue, enabled });
    }
}
