// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod context;
pub mod static_mapper;
pub mod dynamic_mapper;
pub mod reconciliation;
pub mod lifecycle;
pub mod request;
pub mod mapping_service;

// Re-export the service for convenience
pub use context::MappingContext;
pub use request::ResolvedTarget;
pub use mapping_service::{MappingService, PendingCounts, PortView, SlotView, StandardMappingService};
