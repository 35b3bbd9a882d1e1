// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Polling Reconciliation Worker - Background task completing pending maps
//!
//! Sleeps until a mapper arms it, then runs reconciliation passes every
//! `poll_interval` until the service reports nothing pending. The service
//! disarms the worker under the directory lock, so an arm racing with the
//! last pass is never lost.
//!
//! A failing pass is retried with an exponentially growing delay capped at
//! [`MAX_BACKOFF`]; the first failure of a streak is logged as an error and
//! the delay resets on the next successful pass.

use crate::application::mapping_service::MappingService;
use crate::domain::config::ReconciliationConfig;
use crate::domain::error::MappingError;
use crate::domain::worker::ReconciliationWorker;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Longest delay between passes while reconciliation keeps failing.
pub const MAX_BACKOFF: Duration = Duration::from_secs(1);

pub struct PollingWorker {
    armed: AtomicBool,
    arm_count: AtomicU64,
    failed_passes: AtomicU64,
    wake: Notify,
    poll_interval: Duration,
}

impl PollingWorker {
    pub fn new(config: ReconciliationConfig) -> Self {
        Self {
            armed: AtomicBool::new(false),
            arm_count: AtomicU64::new(0),
            failed_passes: AtomicU64::new(0),
            wake: Notify::new(),
            poll_interval: config.poll_interval(),
        }
    }

    /// Number of times the worker went from idle to armed.
    pub fn arm_count(&self) -> u64 {
        self.arm_count.load(Ordering::SeqCst)
    }

    /// Number of reconciliation passes that returned an error.
    pub fn failed_passes(&self) -> u64 {
        self.failed_passes.load(Ordering::SeqCst)
    }

    /// Delay before the next pass after `failures` consecutive failed passes.
    pub fn backoff_delay(&self, failures: u32) -> Duration {
        let factor = 1u32 << failures.min(16);
        self.poll_interval
            .saturating_mul(factor)
            .min(MAX_BACKOFF.max(self.poll_interval))
    }

    /// Start the worker background task
    /// Returns a handle that completes once `shutdown` is cancelled
    pub fn start(
        self: Arc<Self>,
        service: Arc<dyn MappingService>,
        shutdown: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        self.start_with(move || service.reconcile(), shutdown)
    }

    /// Start the worker with a custom reconciliation pass.
    pub fn start_with<F>(self: Arc<Self>, pass: F, shutdown: CancellationToken) -> tokio::task::JoinHandle<()>
    where
        F: FnMut() -> Result<u32, MappingError> + Send + 'static,
    {
        tokio::spawn(async move {
            self.run(pass, shutdown).await;
        })
    }

    async fn run<F>(&self, mut pass: F, shutdown: CancellationToken)
    where
        F: FnMut() -> Result<u32, MappingError>,
    {
        info!(
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            "Starting reconciliation worker"
        );

        let mut failures: u32 = 0;
        loop {
            if !self.is_armed() {
                tokio::select! {
                    _ = self.wake.notified() => continue,
                    _ = shutdown.cancelled() => break,
                }
            }

            let delay = match pass() {
                Ok(remaining) => {
                    if failures > 0 {
                        info!(failures, "Reconciliation recovered");
                        failures = 0;
                    }
                    if remaining == 0 {
                        debug!("Reconciliation complete; worker idle");
                        continue;
                    }
                    debug!(remaining, "Reconciliation pass left work pending");
                    self.poll_interval
                }
                Err(e) => {
                    failures = failures.saturating_add(1);
                    self.failed_passes.fetch_add(1, Ordering::SeqCst);
                    let delay = self.backoff_delay(failures);
                    if failures == 1 {
                        error!(error = %e, "Reconciliation pass failed");
                    } else {
                        debug!(failures, error = %e, retry_in_ms = delay.as_millis() as u64, "Reconciliation pass still failing");
                    }
                    delay
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.cancelled() => break,
            }
        }

        info!("Reconciliation worker stopped");
    }
}

impl ReconciliationWorker for PollingWorker {
    fn is_armed(&self) -> bool {
        self.armed.load(Ordering::SeqCst)
    }

    fn arm(&self) {
        if !self.armed.swap(true, Ordering::SeqCst) {
            self.arm_count.fetch_add(1, Ordering::SeqCst);
        }
        self.wake.notify_one();
    }

    fn disarm(&self) {
        self.armed.store(false, Ordering::SeqCst);
    }
}
