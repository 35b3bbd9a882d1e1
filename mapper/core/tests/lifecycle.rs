// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

mod common;

use common::{Harness, ME};
use qidmap_core::application::MappingService;
use qidmap_core::domain::{
    DomainConfig, DomainId, MappingError, MappingEvent, MappingOutcome, PortConfig, PortId, QueueConfig,
    QueueId, Requester, VdevId,
};

#[test]
fn test_start_grants_write_permission() {
    let h = Harness::new();
    let d = h.domain(2, 1);
    assert!(!h.device.write_permission(d.queues[0]));

    let mut events = h.event_bus.subscribe();
    h.service.start_domain(ME, d.id).unwrap();

    assert!(h.device.write_permission(d.queues[0]));
    assert!(h.device.write_permission(d.queues[1]));
    assert!(matches!(events.try_recv().unwrap(), MappingEvent::DomainStarted { .. }));

    let err = h.service.start_domain(ME, d.id).unwrap_err();
    assert_eq!(err, MappingError::DomainAlreadyStarted(d.id));
}

#[test]
fn test_start_requires_configured_domain() {
    let h = Harness::new();
    let err = h.service.start_domain(ME, DomainId(3)).unwrap_err();
    assert_eq!(err, MappingError::DomainNotConfigured(DomainId(3)));

    let err = h.service.start_domain(ME, DomainId(99)).unwrap_err();
    assert_eq!(err, MappingError::InvalidDomainId(99));
}

#[test]
fn test_started_domain_rejects_new_resources() {
    let h = Harness::new();
    let id = h
        .service
        .create_domain(ME, DomainConfig { num_queues: 2, num_ports: 2 })
        .unwrap();
    h.service.create_queue(ME, id, QueueConfig::default()).unwrap();
    h.service.create_port(ME, id, PortConfig::default()).unwrap();
    h.service.start_domain(ME, id).unwrap();

    let err = h.service.create_queue(ME, id, QueueConfig::default()).unwrap_err();
    assert_eq!(err, MappingError::DomainAlreadyStarted(id));
    let err = h.service.create_port(ME, id, PortConfig::default()).unwrap_err();
    assert_eq!(err, MappingError::DomainAlreadyStarted(id));
}

#[test]
fn test_port_created_disabled() {
    let h = Harness::new();
    let id = h
        .service
        .create_domain(ME, DomainConfig { num_queues: 1, num_ports: 1 })
        .unwrap();
    let port = h.service.create_port(ME, id, PortConfig { enabled: false }).unwrap();
    assert!(!h.device.is_port_enabled(port));

    h.service.enable_port(ME, id, port).unwrap();
    assert!(h.device.is_port_enabled(port));
    assert!(h.service.port_view(ME, id, port).unwrap().enabled);
}

#[test]
fn test_pool_exhaustion() {
    let h = Harness::new();
    let err = h
        .service
        .create_domain(ME, DomainConfig { num_queues: 33, num_ports: 1 })
        .unwrap_err();
    assert!(matches!(err, MappingError::InsufficientResources(_)));

    let err = h
        .service
        .create_domain(ME, DomainConfig { num_queues: 1, num_ports: 65 })
        .unwrap_err();
    assert!(matches!(err, MappingError::InsufficientResources(_)));
}

#[test]
fn test_vdev_requests_use_virtual_ids() {
    let h = Harness::new();
    let alice = Requester::Vdev(VdevId(1));
    let bob = Requester::Vdev(VdevId(2));

    // Occupy physical resources so virtual and physical ids diverge.
    let _host = h.domain(3, 3);

    let domain = h
        .service
        .create_domain(alice, DomainConfig { num_queues: 2, num_ports: 1 })
        .unwrap();
    assert_eq!(domain, DomainId(0));
    let q0 = h.service.create_queue(alice, domain, QueueConfig::default()).unwrap();
    let q1 = h.service.create_queue(alice, domain, QueueConfig::default()).unwrap();
    let port = h.service.create_port(alice, domain, PortConfig::default()).unwrap();
    assert_eq!((q0, q1, port), (QueueId(0), QueueId(1), PortId(0)));

    let bobs = h
        .service
        .create_domain(bob, DomainConfig { num_queues: 1, num_ports: 1 })
        .unwrap();
    assert_eq!(bobs, DomainId(0));
    h.service.create_queue(bob, bobs, QueueConfig::default()).unwrap();
    h.service.create_port(bob, bobs, PortConfig::default()).unwrap();

    assert_eq!(h.service.map_qid(alice, domain, port, q1, 2).unwrap(), MappingOutcome::Completed);

    let view = h.service.port_view(alice, domain, port).unwrap();
    assert_eq!(view.port_id, 0);
    assert_eq!(view.physical_id, PortId(3));
    assert_eq!(view.slots[0].queue_id, Some(1));

    // The same physical port seen by the host.
    let host_view = h.service.port_view(ME, DomainId(1), PortId(3)).unwrap();
    assert_eq!(host_view.slots[0].queue_id, Some(4));

    // Bob's domain 0 has no queue 1.
    let err = h.service.map_qid(bob, bobs, PortId(0), QueueId(1), 0).unwrap_err();
    assert_eq!(err, MappingError::InvalidQueueId(1));

    let err = h.service.map_qid(Requester::Vdev(VdevId(9)), DomainId(0), port, q0, 0).unwrap_err();
    assert_eq!(err, MappingError::InvalidDomainId(0));
}

#[test]
fn test_available_resources_reflect_created_domains() {
    let h = Harness::new();
    let before = h.service.available_resources();
    assert_eq!((before.num_domains, before.num_queues, before.num_ports), (32, 32, 64));

    h.domain(4, 2);
    let after = h.service.available_resources();
    assert_eq!(after.num_domains, before.num_domains - 1);
    assert_eq!(after.num_queues, before.num_queues - 4);
    assert_eq!(after.num_ports, before.num_ports - 2);

    let err = h
        .service
        .create_domain(ME, DomainConfig { num_queues: 64, num_ports: 1 })
        .unwrap_err();
    assert!(matches!(err, MappingError::InsufficientResources(_)));
    assert_eq!(h.service.available_resources(), after);
}
