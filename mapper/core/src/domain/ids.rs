// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Typed identifiers for directory resources.
//!
//! Every id newtype wraps the **physical** index of the resource inside the
//! [`ResourceDirectory`](crate::domain::directory::ResourceDirectory) arena.
//! Callers acting on behalf of a virtual device pass virtual ids in the same
//! newtypes; the directory resolves them before any mapper sees them.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! resource_id {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub u32);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($label, "{}"), self.0)
            }
        }
    };
}

resource_id!(
    /// Identifier of a scheduling domain.
    DomainId,
    "domain-"
);
resource_id!(
    /// Identifier of a load-balanced queue.
    QueueId,
    "queue-"
);
resource_id!(
    /// Identifier of a load-balanced consumer port.
    PortId,
    "port-"
);
resource_id!(
    /// Identifier of a virtual device (multi-tenant caller).
    VdevId,
    "vdev-"
);

/// Arena position of resources owned by the directory.
macro_rules! arena_index {
    ($($name:ident),+) => {
        $(
            impl $name {
                pub(crate) fn index(self) -> usize {
                    self.0 as usize
                }
            }
        )+
    };
}

arena_index!(DomainId, QueueId, PortId);

/// Who is issuing a request, which decides how ids are interpreted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "lowercase")]
pub enum Requester {
    /// Physical function: ids are physical indices.
    #[default]
    Physical,
    /// Virtual device: ids are virtual and only owned resources are visible.
    Vdev(VdevId),
}

impl Requester {
    pub fn vdev(&self) -> Option<VdevId> {
        match self {
            Self::Physical => None,
            Self::Vdev(id) => Some(*id),
        }
    }
}

/// Ownership and virtual numbering shared by domains, queues and ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Tenancy {
    /// Virtual id as seen by the owning vdev (equals the physical id otherwise).
    pub virt_id: u32,
    /// Owning vdev, `None` for resources used by the physical function.
    pub owner: Option<VdevId>,
}

impl Tenancy {
    /// Whether a caller addressing `id` refers to the resource with this tenancy.
    pub fn matches(&self, phys_id: u32, requester: Requester, id: u32) -> bool {
        match requester {
            Requester::Physical => phys_id == id,
            Requester::Vdev(vdev) => self.owner == Some(vdev) && self.virt_id == id,
        }
    }
}
