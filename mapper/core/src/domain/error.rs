// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use crate::domain::ids::{DomainId, PortId, QueueId};
use crate::domain::slot::SlotState;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Domain Errors
// ============================================================================

/// Errors surfaced by mapping operations.
///
/// A dynamic map or unmap that is waiting for the device to drain is not an
/// error; it is reported as [`MappingOutcome::Pending`](crate::domain::MappingOutcome).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MappingError {
    #[error("Invalid domain id {0}")]
    InvalidDomainId(u32),

    #[error("Invalid queue id {0}")]
    InvalidQueueId(u32),

    #[error("Invalid port or slot: port {port}, slot {slot:?}")]
    InvalidPortOrSlot { port: u32, slot: Option<usize> },

    #[error("No free slot on {port} for {queue}")]
    NoFreeSlot { port: PortId, queue: QueueId },

    #[error("Invalid slot state transition from {from} to {to} ({port} slot {slot})")]
    InvalidStateTransition {
        port: PortId,
        slot: usize,
        from: SlotState,
        to: SlotState,
    },

    #[error("{0} is not configured")]
    DomainNotConfigured(DomainId),

    #[error("{0} is already started")]
    DomainAlreadyStarted(DomainId),

    #[error("Invalid priority {0} (maximum is 7)")]
    InvalidPriority(u8),

    #[error("{queue} is not mapped to {port}")]
    QueueNotMapped { port: PortId, queue: QueueId },

    #[error("Insufficient resources: {0}")]
    InsufficientResources(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

/// Field-less classification of [`MappingError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidDomainId,
    InvalidQueueId,
    InvalidPortOrSlot,
    NoFreeSlot,
    InvalidStateTransition,
    DomainNotConfigured,
    DomainAlreadyStarted,
    InvalidPriority,
    QueueNotMapped,
    InsufficientResources,
    InvalidConfiguration,
}

impl MappingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidDomainId(_) => ErrorKind::InvalidDomainId,
            Self::InvalidQueueId(_) => ErrorKind::InvalidQueueId,
            Self::InvalidPortOrSlot { .. } => ErrorKind::InvalidPortOrSlot,
            Self::NoFreeSlot { .. } => ErrorKind::NoFreeSlot,
            Self::InvalidStateTransition { .. } => ErrorKind::InvalidStateTransition,
            Self::DomainNotConfigured(_) => ErrorKind::DomainNotConfigured,
            Self::DomainAlreadyStarted(_) => ErrorKind::DomainAlreadyStarted,
            Self::InvalidPriority(_) => ErrorKind::InvalidPriority,
            Self::QueueNotMapped { .. } => ErrorKind::QueueNotMapped,
            Self::InsufficientResources(_) => ErrorKind::InsufficientResources,
            Self::InvalidConfiguration(_) => ErrorKind::InvalidConfiguration,
        }
    }

    /// Fatal errors mean the in-memory model has diverged from the device.
    pub fn is_fatal(&self) -> bool {
        matches!(self.kind(), ErrorKind::NoFreeSlot | ErrorKind::InvalidStateTransition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        let err = MappingError::NoFreeSlot { port: PortId(1), queue: QueueId(2) };
        assert_eq!(err.kind(), ErrorKind::NoFreeSlot);
        assert!(err.is_fatal());

        let err = MappingError::InvalidStateTransition {
            port: PortId(1),
            slot: 0,
            from: SlotState::Unmapped,
            to: SlotState::UnmapInProgress,
        };
        assert!(err.is_fatal());
        assert_eq!(
            err.to_string(),
            "Invalid slot state transition from unmapped to unmap_in_progress (port-1 slot 0)"
        );

        assert!(!MappingError::DomainAlreadyStarted(DomainId(0)).is_fatal());
        assert!(!MappingError::InvalidPriority(9).is_fatal());
    }
}
