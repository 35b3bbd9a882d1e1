// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Resource Directory
//!
//! Owns every [`Domain`], [`Queue`] and [`Port`] of one event device. Each
//! kind lives in a flat arena indexed by its physical id; cross references
//! (a domain's queue list, a slot's queue) are ids looked up here.
//!
//! Callers address resources through a [`Requester`]. Physical callers use
//! physical ids. Vdev callers use the virtual ids handed out when their
//! resources were created and cannot see resources owned by anyone else.

use crate::domain::config::{DeviceConfig, DomainConfig, PortConfig, QueueConfig};
use crate::domain::error::MappingError;
use crate::domain::ids::{DomainId, PortId, QueueId, Requester, Tenancy, VdevId};
use crate::domain::port::Port;
use crate::domain::queue::Queue;
use crate::domain::sched_domain::Domain;
use crate::domain::slot::SlotState;
use crate::domain::transition;
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, info};

/// Next virtual id per resource kind for one vdev.
#[derive(Debug, Clone, Copy, Default)]
struct VirtCounters {
    domains: u32,
    queues: u32,
    ports: u32,
}

/// Resources still free for new scheduling domains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AvailableResources {
    pub num_domains: u32,
    pub num_queues: u32,
    pub num_ports: u32,
}

#[derive(Debug)]
pub struct ResourceDirectory {
    config: DeviceConfig,
    domains: Vec<Domain>,
    queues: Vec<Queue>,
    ports: Vec<Port>,
    virt_counters: HashMap<VdevId, VirtCounters>,
}

impl ResourceDirectory {
    pub fn new(config: DeviceConfig) -> Self {
        Self {
            config,
            domains: (0..config.num_domains).map(|i| Domain::new(DomainId(i))).collect(),
            queues: (0..config.num_queues).map(|i| Queue::new(QueueId(i))).collect(),
            ports: (0..config.num_ports).map(|i| Port::new(PortId(i))).collect(),
            virt_counters: HashMap::new(),
        }
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    // ========================================================================
    // Resource creation
    // ========================================================================

    /// Configures the first free domain and allocates queues and ports to it.
    ///
    /// Returns the physical id of the new domain.
    pub fn create_domain(
        &mut self,
        requester: Requester,
        request: DomainConfig,
    ) -> Result<DomainId, MappingError> {
        let domain_index = self
            .domains
            .iter()
            .position(|d| !d.configured)
            .ok_or_else(|| MappingError::InsufficientResources("no free scheduling domain".to_string()))?;

        let free_queues: Vec<QueueId> = self
            .queues
            .iter()
            .filter(|q| q.domain.is_none())
            .map(|q| q.id)
            .take(request.num_queues as usize)
            .collect();
        if free_queues.len() < request.num_queues as usize {
            return Err(MappingError::InsufficientResources(format!(
                "requested {} queues, {} available",
                request.num_queues,
                free_queues.len()
            )));
        }

        let free_ports: Vec<PortId> = self
            .ports
            .iter()
            .filter(|p| p.domain.is_none())
            .map(|p| p.id)
            .take(request.num_ports as usize)
            .collect();
        if free_ports.len() < request.num_ports as usize {
            return Err(MappingError::InsufficientResources(format!(
                "requested {} ports, {} available",
                request.num_ports,
                free_ports.len()
            )));
        }

        let domain_id = DomainId(domain_index as u32);
        for queue in &free_queues {
            self.queues[queue.index()].domain = Some(domain_id);
        }
        for port in &free_ports {
            self.ports[port.index()].domain = Some(domain_id);
        }

        let tenancy = match requester {
            Requester::Physical => Tenancy { virt_id: domain_id.0, owner: None },
            Requester::Vdev(vdev) => {
                let counters = self.virt_counters.entry(vdev).or_default();
                let virt_id = counters.domains;
                counters.domains += 1;
                Tenancy { virt_id, owner: Some(vdev) }
            }
        };

        let domain = &mut self.domains[domain_index];
        domain.tenancy = tenancy;
        domain.configured = true;
        domain.avail_queues = free_queues;
        domain.avail_ports = free_ports;

        info!(
            domain = %domain_id,
            num_queues = request.num_queues,
            num_ports = request.num_ports,
            "Created scheduling domain"
        );
        Ok(domain_id)
    }

    /// Configures one of the domain's allocated queues.
    pub fn create_queue(
        &mut self,
        requester: Requester,
        domain_id: DomainId,
        request: QueueConfig,
    ) -> Result<QueueId, MappingError> {
        if request.inflight_limit == 0 || request.inflight_limit > self.config.max_inflight_limit {
            return Err(MappingError::InvalidConfiguration(format!(
                "inflight_limit {} outside 1..={}",
                request.inflight_limit, self.config.max_inflight_limit
            )));
        }

        let domain = self.configured_domain_mut(domain_id)?;
        if domain.avail_queues.is_empty() {
            return Err(MappingError::InsufficientResources(format!(
                "{} has no unconfigured queues",
                domain_id
            )));
        }
        let queue_id = domain.avail_queues.remove(0);
        domain.queues.push(queue_id);
        let owner = domain.tenancy.owner;

        let virt_id = self.next_virt_id(requester, queue_id.0, |c| &mut c.queues);
        let queue = &mut self.queues[queue_id.index()];
        queue.tenancy = Tenancy { virt_id, owner };
        queue.configured = true;
        queue.inflight_limit = request.inflight_limit;

        debug!(domain = %domain_id, queue = %queue_id, inflight_limit = request.inflight_limit, "Configured queue");
        Ok(queue_id)
    }

    /// Configures one of the domain's allocated ports.
    pub fn create_port(
        &mut self,
        requester: Requester,
        domain_id: DomainId,
        request: PortConfig,
    ) -> Result<PortId, MappingError> {
        let domain = self.configured_domain_mut(domain_id)?;
        if domain.avail_ports.is_empty() {
            return Err(MappingError::InsufficientResources(format!(
                "{} has no unconfigured ports",
                domain_id
            )));
        }
        let port_id = domain.avail_ports.remove(0);
        domain.ports.push(port_id);
        let owner = domain.tenancy.owner;

        let virt_id = self.next_virt_id(requester, port_id.0, |c| &mut c.ports);
        let port = &mut self.ports[port_id.index()];
        port.tenancy = Tenancy { virt_id, owner };
        port.configured = true;
        port.enabled = request.enabled;

        debug!(domain = %domain_id, port = %port_id, enabled = request.enabled, "Configured port");
        Ok(port_id)
    }

    fn configured_domain_mut(&mut self, domain_id: DomainId) -> Result<&mut Domain, MappingError> {
        let domain = self.domain_mut(domain_id)?;
        if !domain.configured {
            return Err(MappingError::DomainNotConfigured(domain_id));
        }
        if domain.started {
            return Err(MappingError::DomainAlreadyStarted(domain_id));
        }
        Ok(domain)
    }

    fn next_virt_id(
        &mut self,
        requester: Requester,
        phys_id: u32,
        counter: impl Fn(&mut VirtCounters) -> &mut u32,
    ) -> u32 {
        match requester {
            Requester::Physical => phys_id,
            Requester::Vdev(vdev) => {
                let next = counter(self.virt_counters.entry(vdev).or_default());
                let virt_id = *next;
                *next += 1;
                virt_id
            }
        }
    }

    // ========================================================================
    // Id resolution
    // ========================================================================

    /// Resolves a requester-visible domain id to its physical id.
    pub fn resolve_domain(&self, requester: Requester, id: u32) -> Result<DomainId, MappingError> {
        match requester {
            Requester::Physical => self
                .domains
                .get(id as usize)
                .map(|d| d.id)
                .ok_or(MappingError::InvalidDomainId(id)),
            Requester::Vdev(_) => self
                .domains
                .iter()
                .find(|d| d.configured && d.tenancy.matches(d.id.0, requester, id))
                .map(|d| d.id)
                .ok_or(MappingError::InvalidDomainId(id)),
        }
    }

    /// Like [`resolve_domain`](Self::resolve_domain) but also requires the
    /// domain to be configured.
    pub fn resolve_configured_domain(
        &self,
        requester: Requester,
        id: u32,
    ) -> Result<DomainId, MappingError> {
        let domain_id = self.resolve_domain(requester, id)?;
        if !self.domains[domain_id.index()].configured {
            return Err(MappingError::DomainNotConfigured(domain_id));
        }
        Ok(domain_id)
    }

    /// Resolves a requester-visible queue id among the domain's configured queues.
    pub fn resolve_queue(
        &self,
        requester: Requester,
        domain_id: DomainId,
        id: u32,
    ) -> Result<QueueId, MappingError> {
        self.domain(domain_id)?
            .queues
            .iter()
            .copied()
            .find(|q| self.queues[q.index()].tenancy.matches(q.0, requester, id))
            .ok_or(MappingError::InvalidQueueId(id))
    }

    /// Resolves a requester-visible port id among the domain's configured ports.
    pub fn resolve_port(
        &self,
        requester: Requester,
        domain_id: DomainId,
        id: u32,
    ) -> Result<PortId, MappingError> {
        self.domain(domain_id)?
            .ports
            .iter()
            .copied()
            .find(|p| self.ports[p.index()].tenancy.matches(p.0, requester, id))
            .ok_or(MappingError::InvalidPortOrSlot { port: id, slot: None })
    }

    /// Id a requester uses to address a resource with the given tenancy.
    pub fn visible_id(requester: Requester, phys_id: u32, tenancy: &Tenancy) -> u32 {
        match requester {
            Requester::Physical => phys_id,
            Requester::Vdev(_) => tenancy.virt_id,
        }
    }

    // ========================================================================
    // Lookup
    // ========================================================================

    pub fn domain(&self, id: DomainId) -> Result<&Domain, MappingError> {
        self.domains.get(id.index()).ok_or(MappingError::InvalidDomainId(id.0))
    }

    pub(crate) fn domain_mut(&mut self, id: DomainId) -> Result<&mut Domain, MappingError> {
        self.domains.get_mut(id.index()).ok_or(MappingError::InvalidDomainId(id.0))
    }

    pub fn queue(&self, id: QueueId) -> Result<&Queue, MappingError> {
        self.queues.get(id.index()).ok_or(MappingError::InvalidQueueId(id.0))
    }

    pub(crate) fn queue_mut(&mut self, id: QueueId) -> Result<&mut Queue, MappingError> {
        self.queues.get_mut(id.index()).ok_or(MappingError::InvalidQueueId(id.0))
    }

    pub fn port(&self, id: PortId) -> Result<&Port, MappingError> {
        self.ports
            .get(id.index())
            .ok_or(MappingError::InvalidPortOrSlot { port: id.0, slot: None })
    }

    pub(crate) fn port_mut(&mut self, id: PortId) -> Result<&mut Port, MappingError> {
        self.ports
            .get_mut(id.index())
            .ok_or(MappingError::InvalidPortOrSlot { port: id.0, slot: None })
    }

    /// Counts the domains not yet configured and the queues and ports not
    /// yet claimed by any domain.
    pub fn available_resources(&self) -> AvailableResources {
        let free = |n: usize| u32::try_from(n).unwrap_or(u32::MAX);
        AvailableResources {
            num_domains: free(self.domains.iter().filter(|d| !d.configured).count()),
            num_queues: free(self.queues.iter().filter(|q| q.domain.is_none()).count()),
            num_ports: free(self.ports.iter().filter(|p| p.domain.is_none()).count()),
        }
    }

    pub fn configured_domain_ids(&self) -> Vec<DomainId> {
        self.domains.iter().filter(|d| d.configured).map(|d| d.id).collect()
    }

    /// Ports of `domain_id` with a `Mapped` slot bound to `queue`.
    pub fn ports_mapped_to(&self, domain_id: DomainId, queue: QueueId) -> Result<Vec<PortId>, MappingError> {
        Ok(self
            .domain(domain_id)?
            .ports
            .iter()
            .copied()
            .filter(|p| self.ports[p.index()].is_mapped_to(queue))
            .collect())
    }

    // ========================================================================
    // Slot state machine entry point
    // ========================================================================

    /// Transitions a slot, resolving the bound queue and owning domain.
    ///
    /// The slot must already be bound to a queue (see `Port::bind_slot`).
    pub(crate) fn transition(&mut self, port_id: PortId, slot: usize, to: SlotState) -> Result<(), MappingError> {
        let port = self
            .ports
            .get_mut(port_id.index())
            .ok_or(MappingError::InvalidPortOrSlot { port: port_id.0, slot: Some(slot) })?;
        let current = port
            .slot(slot)
            .copied()
            .ok_or(MappingError::InvalidPortOrSlot { port: port_id.0, slot: Some(slot) })?;
        let queue_id = current.queue_id().ok_or(MappingError::InvalidStateTransition {
            port: port_id,
            slot,
            from: current.state(),
            to,
        })?;
        let domain_id = port
            .domain
            .ok_or(MappingError::InvalidPortOrSlot { port: port_id.0, slot: Some(slot) })?;

        let queue = self
            .queues
            .get_mut(queue_id.index())
            .ok_or(MappingError::InvalidQueueId(queue_id.0))?;
        let domain = self
            .domains
            .get_mut(domain_id.index())
            .ok_or(MappingError::InvalidDomainId(domain_id.0))?;

        transition::apply(domain, port, queue, slot, to)
    }

    // ========================================================================
    // Invariant audit
    // ========================================================================

    /// Compares every bookkeeping counter with the slot states it summarises.
    ///
    /// Returns one message per mismatch; an empty list means the directory
    /// is consistent.
    pub fn counter_violations(&self) -> Vec<String> {
        let mut violations = Vec::new();

        for queue in &self.queues {
            let holds = |pred: fn(&SlotState) -> bool| -> u32 {
                self.ports
                    .iter()
                    .map(|p| p.slots.iter().filter(|s| s.holds(queue.id, pred)).count() as u32)
                    .sum()
            };
            let mapped = holds(|s| matches!(s, SlotState::Mapped) || s.is_unmap_in_progress());
            let adding = holds(|s| *s == SlotState::MapInProgress);
            if queue.num_mappings != mapped {
                violations.push(format!("{}: num_mappings {} != {}", queue.id, queue.num_mappings, mapped));
            }
            if queue.num_pending_additions != adding {
                violations.push(format!(
                    "{}: num_pending_additions {} != {}",
                    queue.id, queue.num_pending_additions, adding
                ));
            }
        }

        for port in &self.ports {
            let mapped = port.count_slots(|s| matches!(s, SlotState::Mapped) || s.is_unmap_in_progress());
            let removing = port.count_slots(SlotState::is_unmap_in_progress);
            if port.num_mappings != mapped {
                violations.push(format!("{}: num_mappings {} != {}", port.id, port.num_mappings, mapped));
            }
            if port.num_pending_removals != removing {
                violations.push(format!(
                    "{}: num_pending_removals {} != {}",
                    port.id, port.num_pending_removals, removing
                ));
            }
        }

        for domain in &self.domains {
            let owned = domain.ports.iter().chain(domain.avail_ports.iter());
            let (adding, removing) = owned.fold((0, 0), |(a, r), p| {
                let port = &self.ports[p.index()];
                (
                    a + port.count_slots(|s| *s == SlotState::MapInProgress),
                    r + port.count_slots(SlotState::is_unmap_in_progress),
                )
            });
            if domain.pending_additions != adding {
                violations.push(format!(
                    "{}: pending_additions {} != {}",
                    domain.id, domain.pending_additions, adding
                ));
            }
            if domain.pending_removals != removing {
                violations.push(format!(
                    "{}: pending_removals {} != {}",
                    domain.id, domain.pending_removals, removing
                ));
            }
        }

        violations
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_device() -> ResourceDirectory {
        ResourceDirectory::new(DeviceConfig {
            num_domains: 2,
            num_queues: 4,
            num_ports: 4,
            max_inflight_limit: 128,
        })
    }

    #[test]
    fn test_create_domain_allocates_from_pool() {
        let mut dir = small_device();
        let domain = dir
            .create_domain(Requester::Physical, DomainConfig { num_queues: 3, num_ports: 2 })
            .unwrap();
        assert_eq!(domain, DomainId(0));

        let err = dir
            .create_domain(Requester::Physical, DomainConfig { num_queues: 2, num_ports: 1 })
            .unwrap_err();
        assert!(matches!(err, MappingError::InsufficientResources(_)));

        // The failed request must not leak allocations.
        let second = dir
            .create_domain(Requester::Physical, DomainConfig { num_queues: 1, num_ports: 2 })
            .unwrap();
        assert_eq!(second, DomainId(1));
        assert!(dir.create_domain(Requester::Physical, DomainConfig::default()).is_err());
    }

    #[test]
    fn test_available_resources_shrink_with_domains() {
        let mut dir = small_device();
        assert_eq!(
            dir.available_resources(),
            AvailableResources { num_domains: 2, num_queues: 4, num_ports: 4 }
        );

        dir.create_domain(Requester::Physical, DomainConfig { num_queues: 3, num_ports: 1 })
            .unwrap();
        assert_eq!(
            dir.available_resources(),
            AvailableResources { num_domains: 1, num_queues: 1, num_ports: 3 }
        );

        // A rejected request leaves the pools untouched.
        dir.create_domain(Requester::Physical, DomainConfig { num_queues: 2, num_ports: 1 })
            .unwrap_err();
        assert_eq!(dir.available_resources().num_queues, 1);
    }

    #[test]
    fn test_create_queue_and_port() {
        let mut dir = small_device();
        let domain = dir
            .create_domain(Requester::Physical, DomainConfig { num_queues: 1, num_ports: 1 })
            .unwrap();

        let err = dir
            .create_queue(Requester::Physical, domain, QueueConfig { inflight_limit: 0 })
            .unwrap_err();
        assert!(matches!(err, MappingError::InvalidConfiguration(_)));
        let err = dir
            .create_queue(Requester::Physical, domain, QueueConfig { inflight_limit: 129 })
            .unwrap_err();
        assert!(matches!(err, MappingError::InvalidConfiguration(_)));

        let queue = dir.create_queue(Requester::Physical, domain, QueueConfig::default()).unwrap();
        let q = dir.queue(queue).unwrap();
        assert_eq!(q.inflight_limit(), 64);
        assert_eq!(q.domain(), Some(domain));
        assert!(q.is_configured());
        assert!(dir.create_queue(Requester::Physical, domain, QueueConfig::default()).is_err());

        let port = dir
            .create_port(Requester::Physical, domain, PortConfig { enabled: false })
            .unwrap();
        assert!(!dir.port(port).unwrap().is_enabled());
        assert!(dir.port(port).unwrap().is_configured());
        assert_eq!(dir.domain(domain).unwrap().ports(), &[port]);

        assert_eq!(dir.resolve_queue(Requester::Physical, domain, queue.0).unwrap(), queue);
        assert_eq!(dir.resolve_port(Requester::Physical, domain, port.0).unwrap(), port);
        assert!(dir.resolve_port(Requester::Physical, domain, 3).is_err());
    }

    #[test]
    fn test_unconfigured_domain_rejects_resources() {
        let mut dir = small_device();
        let err = dir
            .create_queue(Requester::Physical, DomainId(1), QueueConfig::default())
            .unwrap_err();
        assert_eq!(err, MappingError::DomainNotConfigured(DomainId(1)));
        assert_eq!(
            dir.resolve_configured_domain(Requester::Physical, 1).unwrap_err(),
            MappingError::DomainNotConfigured(DomainId(1))
        );
        assert_eq!(
            dir.resolve_domain(Requester::Physical, 7).unwrap_err(),
            MappingError::InvalidDomainId(7)
        );
    }

    #[test]
    fn test_vdev_ids_are_private() {
        let mut dir = small_device();
        let alice = Requester::Vdev(VdevId(1));
        let bob = Requester::Vdev(VdevId(2));

        dir.create_domain(Requester::Physical, DomainConfig { num_queues: 1, num_ports: 1 })
            .unwrap();
        let domain = dir
            .create_domain(alice, DomainConfig { num_queues: 2, num_ports: 1 })
            .unwrap();
        assert_eq!(domain, DomainId(1));
        assert_eq!(dir.domain(domain).unwrap().tenancy.virt_id, 0);

        assert_eq!(dir.resolve_domain(alice, 0).unwrap(), domain);
        assert!(dir.resolve_domain(bob, 0).is_err());

        let q0 = dir.create_queue(alice, domain, QueueConfig::default()).unwrap();
        let q1 = dir.create_queue(alice, domain, QueueConfig::default()).unwrap();
        assert_eq!(q0, QueueId(1));
        assert_eq!(dir.resolve_queue(alice, domain, 0).unwrap(), q0);
        assert_eq!(dir.resolve_queue(alice, domain, 1).unwrap(), q1);
        assert!(dir.resolve_queue(bob, domain, 0).is_err());
        assert_eq!(dir.resolve_queue(Requester::Physical, domain, 2).unwrap(), q1);
    }

    #[test]
    fn test_transition_requires_bound_slot() {
        let mut dir = small_device();
        let domain = dir
            .create_domain(Requester::Physical, DomainConfig { num_queues: 1, num_ports: 1 })
            .unwrap();
        let queue = dir.create_queue(Requester::Physical, domain, QueueConfig::default()).unwrap();
        let port = dir.create_port(Requester::Physical, domain, PortConfig::default()).unwrap();

        let err = dir.transition(port, 0, SlotState::Mapped).unwrap_err();
        assert!(err.is_fatal());

        dir.port_mut(port).unwrap().bind_slot(0, queue, 2);
        dir.transition(port, 0, SlotState::MapInProgress).unwrap();
        assert_eq!(dir.domain(domain).unwrap().pending_additions(), 1);
        assert!(dir.counter_violations().is_empty());

        dir.transition(port, 0, SlotState::Mapped).unwrap();
        assert_eq!(dir.ports_mapped_to(domain, queue).unwrap(), vec![port]);
        assert_eq!(dir.queue(queue).unwrap().num_mappings(), 1);
        assert!(dir.counter_violations().is_empty());
    }
}
