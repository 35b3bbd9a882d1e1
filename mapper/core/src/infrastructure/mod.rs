// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod event_bus;
pub mod simulated_device;
pub mod worker;

pub use event_bus::{EventBus, EventBusError, EventReceiver, PortEventReceiver};
pub use simulated_device::{DeviceOp, SimulatedDevice};
pub use worker::PollingWorker;
