// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Domain
//!
//! Resource model and slot state machine of the mapping manager.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Aggregates, identifiers, errors, events and the
//!   capability traits the application layer drives.

pub mod ids;
pub mod slot;
pub mod queue;
pub mod port;
pub mod sched_domain;
pub mod directory;
pub mod transition;
pub mod error;
pub mod outcome;
pub mod events;
pub mod hardware;
pub mod worker;
pub mod config;

pub use ids::{DomainId, PortId, QueueId, Requester, Tenancy, VdevId};
pub use slot::{PendingMap, Slot, SlotState, MAX_PRIORITY, SLOTS_PER_PORT};
pub use queue::Queue;
pub use port::Port;
pub use sched_domain::Domain;
pub use directory::{AvailableResources, ResourceDirectory};
pub use error::{ErrorKind, MappingError};
pub use outcome::{MapPath, MappingOutcome};
pub use events::MappingEvent;
pub use hardware::{HardwareDevice, QueueBacklog};
pub use worker::ReconciliationWorker;
pub use config::{DeviceConfig, DomainConfig, MapperConfigManifest, PortConfig, QueueConfig};
