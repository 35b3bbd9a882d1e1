// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # `qidmap-core` - Load-Balanced Queue-to-Port Mapping Manager
//!
//! Decides which load-balanced queue is bound to which consumer port of an
//! event device, and moves those bindings safely while the device may still
//! be scheduling events.
//!
//! ## Crate Layout
//!
//! | Module | Layer | Contents |
//! |--------|-------|----------|
//! | [`domain`] | Domain | `ResourceDirectory`, `Domain`/`Queue`/`Port`/`Slot`, slot state machine, `HardwareDevice` and `ReconciliationWorker` traits, config manifest |
//! | [`application`] | Application | static and dynamic mappers, reconciliation engine, lifecycle, request layer, `MappingService` |
//! | [`infrastructure`] | Infrastructure | `EventBus`, `SimulatedDevice`, `PollingWorker` |
//!
//! ## Key Concepts
//!
//! - **Slot**: one of the 8 binding entries of a port. Its state machine is
//!   the only writer of the mapping counters.
//! - **Static map**: before a domain starts, bindings are committed at once.
//! - **Dynamic map**: after start, the queue is throttled to zero inflight
//!   events and the binding commits once the device has drained.
//! - **Reconciliation**: passes driven by the worker that finish maps and
//!   unmaps left pending.
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use qidmap_core::application::{MappingService, StandardMappingService};
//! use qidmap_core::domain::{DeviceConfig, DomainConfig, PortConfig, QueueConfig};
//! use qidmap_core::domain::{MappingOutcome, Requester, ResourceDirectory};
//! use qidmap_core::infrastructure::{EventBus, PollingWorker, SimulatedDevice};
//!
//! let service = StandardMappingService::new(
//!     ResourceDirectory::new(DeviceConfig::default()),
//!     Arc::new(SimulatedDevice::new()),
//!     Arc::new(PollingWorker::new(Default::default())),
//!     Arc::new(EventBus::default()),
//! );
//!
//! let me = Requester::Physical;
//! let domain = service.create_domain(me, DomainConfig { num_queues: 1, num_ports: 1 })?;
//! let queue = service.create_queue(me, domain, QueueConfig::default())?;
//! let port = service.create_port(me, domain, PortConfig::default())?;
//!
//! let outcome = service.map_qid(me, domain, port, queue, 3)?;
//! assert_eq!(outcome, MappingOutcome::Completed);
//! assert_eq!(service.queue_mapping_count(me, domain, queue)?, 1);
//! # Ok::<(), qidmap_core::domain::MappingError>(())
//! ```

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use domain::*;
