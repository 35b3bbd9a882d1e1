// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

/// Capability to schedule reconciliation passes.
///
/// The host decides what drives the passes (a tokio task, a timer, a
/// dedicated thread). The mappers only ask whether a driver is armed and arm
/// it when they leave work pending.
pub trait ReconciliationWorker: Send + Sync {
    fn is_armed(&self) -> bool;

    /// Requests passes until pending work is gone.
    fn arm(&self);

    /// Called under the resource lock once a pass leaves nothing pending.
    fn disarm(&self);
}
