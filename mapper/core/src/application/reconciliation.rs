// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Reconciliation Engine
//!
//! Completes map and unmap operations left pending because the device still
//! had events in flight. Each pass re-reads the device and commits whatever
//! has drained; the rest stays pending for the next pass. Passes are
//! idempotent and do nothing when no work is pending.

use crate::application::context::MappingContext;
use crate::domain::error::MappingError;
use crate::domain::events::MappingEvent;
use crate::domain::ids::{DomainId, PortId};
use crate::domain::sched_domain::Domain;
use crate::domain::slot::{SlotState, SLOTS_PER_PORT};
use chrono::Utc;
use tracing::{debug, info};

impl MappingContext<'_> {
    /// Commits drained `MapInProgress` slots across all configured domains.
    ///
    /// Returns the number of additions still pending.
    pub fn finish_pending_maps(&mut self) -> Result<u32, MappingError> {
        for domain in self.dir.configured_domain_ids() {
            if self.dir.domain(domain)?.pending_additions() == 0 {
                continue;
            }
            self.finish_domain_maps(domain)?;
        }
        Ok(self.pending_total(|d| d.pending_additions()))
    }

    fn finish_domain_maps(&mut self, domain: DomainId) -> Result<(), MappingError> {
        let ports = self.dir.domain(domain)?.ports().to_vec();
        for port in ports {
            for slot in 0..SLOTS_PER_PORT {
                let binding = self.dir.port(port)?.slots()[slot];
                if binding.state() != SlotState::MapInProgress {
                    continue;
                }
                let Some(queue) = binding.queue_id() else {
                    continue;
                };
                if self.device.queue_inflight_count(queue) > 0 {
                    continue;
                }
                self.try_commit_map(domain, port, slot)?;
            }
        }
        Ok(())
    }

    /// Completes removals on every port whose in-flight events have drained.
    ///
    /// Returns the number of removals still pending.
    pub fn finish_pending_unmaps(&mut self) -> Result<u32, MappingError> {
        for domain in self.dir.configured_domain_ids() {
            let d = self.dir.domain(domain)?;
            if d.pending_removals() == 0 {
                continue;
            }
            let ports = d.ports().to_vec();
            for port in ports {
                if self.dir.port(port)?.num_pending_removals() == 0 {
                    continue;
                }
                self.finish_unmap_port(domain, port)?;
            }
        }
        Ok(self.pending_total(|d| d.pending_removals()))
    }

    /// Completes every removal on `port` if the port has drained.
    ///
    /// Returns `true` when nothing was left in flight and all unmapping slots
    /// were released. Queued remaps are handed to the mapper for the
    /// domain's current lifecycle phase.
    pub(crate) fn finish_unmap_port(&mut self, domain: DomainId, port: PortId) -> Result<bool, MappingError> {
        let inflight = self.device.port_inflight_count(port);
        if inflight > 0 {
            debug!(%port, inflight, "Port still has events in flight; unmap pending");
            return Ok(false);
        }

        for slot in 0..SLOTS_PER_PORT {
            if self.dir.port(port)?.slots()[slot].state().is_unmap_in_progress() {
                self.finish_unmap_slot(domain, port, slot)?;
            }
        }
        Ok(true)
    }

    /// Releases one unmapping slot and applies its queued remap, if any.
    pub(crate) fn finish_unmap_slot(&mut self, domain: DomainId, port: PortId, slot: usize) -> Result<(), MappingError> {
        let binding = self.dir.port(port)?.slots()[slot];
        let queue = binding
            .queue_id()
            .ok_or(MappingError::InvalidPortOrSlot { port: port.0, slot: Some(slot) })?;
        let pending = binding.state().pending_map();

        self.device.clear_binding(port, slot);
        self.dir.transition(port, slot, SlotState::Unmapped)?;
        self.device.set_has_work_indicators(port, slot, false, false);
        self.device.reset_inflight_ok_indicator(port, slot);
        self.enable_port_if_idle(port)?;

        info!(%domain, %port, %queue, slot, "Unmapped queue");
        self.emit(MappingEvent::QueueUnmapped {
            domain_id: domain,
            port_id: port,
            queue_id: queue,
            slot,
            unmapped_at: Utc::now(),
        });

        if let Some(remap) = pending {
            debug!(%port, queue = %remap.queue, priority = remap.priority, "Applying queued remap");
            if self.dir.domain(domain)?.is_started() {
                self.map_dynamic(domain, port, remap.queue, remap.priority)?;
            } else {
                self.map_static(domain, port, remap.queue, remap.priority)?;
            }
        }
        Ok(())
    }

    fn pending_total(&self, counter: impl Fn(&Domain) -> u32) -> u32 {
        self.dir
            .configured_domain_ids()
            .into_iter()
            .filter_map(|id| self.dir.domain(id).ok())
            .map(counter)
            .sum()
    }
}
