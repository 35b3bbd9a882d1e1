// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

#![allow(dead_code)]

use qidmap_core::application::{MappingService, StandardMappingService};
use qidmap_core::domain::config::ReconciliationConfig;
use qidmap_core::domain::{
    DeviceConfig, DomainConfig, DomainId, PortConfig, PortId, QueueConfig, QueueId, Requester,
    ResourceDirectory,
};
use qidmap_core::infrastructure::{EventBus, PollingWorker, SimulatedDevice};
use std::sync::Arc;

pub const ME: Requester = Requester::Physical;

pub struct Harness {
    pub service: Arc<StandardMappingService>,
    pub device: Arc<SimulatedDevice>,
    pub worker: Arc<PollingWorker>,
    pub event_bus: Arc<EventBus>,
}

pub struct TestDomain {
    pub id: DomainId,
    pub queues: Vec<QueueId>,
    pub ports: Vec<PortId>,
}

impl Harness {
    pub fn new() -> Self {
        let device = Arc::new(SimulatedDevice::new());
        let worker = Arc::new(PollingWorker::new(ReconciliationConfig { poll_interval_ms: 1 }));
        let event_bus = Arc::new(EventBus::new(256));
        let service = Arc::new(StandardMappingService::new(
            ResourceDirectory::new(DeviceConfig::default()),
            device.clone(),
            worker.clone(),
            event_bus.clone(),
        ));
        Self { service, device, worker, event_bus }
    }

    /// Creates a domain with every allocated queue and port configured.
    pub fn domain(&self, num_queues: u32, num_ports: u32) -> TestDomain {
        let id = self
            .service
            .create_domain(ME, DomainConfig { num_queues, num_ports })
            .unwrap();
        let queues = (0..num_queues)
            .map(|_| self.service.create_queue(ME, id, QueueConfig::default()).unwrap())
            .collect();
        let ports = (0..num_ports)
            .map(|_| self.service.create_port(ME, id, PortConfig::default()).unwrap())
            .collect();
        TestDomain { id, queues, ports }
    }

    pub fn started_domain(&self, num_queues: u32, num_ports: u32) -> TestDomain {
        let domain = self.domain(num_queues, num_ports);
        self.service.start_domain(ME, domain.id).unwrap();
        domain
    }

    pub fn assert_consistent(&self) {
        let violations = self.service.inspect(|dir| dir.counter_violations());
        assert!(violations.is_empty(), "counter violations: {:?}", violations);
    }
}
