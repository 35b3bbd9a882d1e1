// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use serde::{Deserialize, Serialize};

/// Result of a map or unmap request that did not fail.
///
/// `Pending` is not a failure: the reconciliation worker completes the
/// operation once the device has drained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MappingOutcome {
    Completed,
    Pending,
}

impl MappingOutcome {
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }
}

/// Which binding procedure committed a mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MapPath {
    /// Before the domain started; no draining needed.
    Static,
    /// After start; committed once the queue drained.
    Dynamic,
}
