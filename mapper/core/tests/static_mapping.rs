// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

mod common;

use common::{Harness, ME};
use qidmap_core::application::MappingService;
use qidmap_core::domain::{MapPath, MappingError, MappingEvent, MappingOutcome, SlotState};

#[test]
fn test_static_map_binds_first_free_slot() {
    let h = Harness::new();
    let d = h.domain(2, 1);
    let (port, queue) = (d.ports[0], d.queues[1]);
    let mut events = h.event_bus.subscribe();

    h.service.map_static(d.id, port, queue, 5).unwrap();

    let slot = h.service.slot(ME, d.id, port, 0).unwrap();
    assert_eq!(slot.state, SlotState::Mapped.name());
    assert_eq!(slot.queue_id, Some(queue.0));
    assert_eq!(slot.priority, 5);
    assert_eq!(h.service.queue_mapping_count(ME, d.id, queue).unwrap(), 1);
    assert_eq!(h.device.binding(port, 0), Some((queue, 5)));

    match events.try_recv().unwrap() {
        MappingEvent::QueueMapped { path, slot, .. } => {
            assert_eq!(path, MapPath::Static);
            assert_eq!(slot, 0);
        }
        other => panic!("unexpected event {:?}", other),
    }
    h.assert_consistent();
}

#[test]
fn test_static_remap_of_same_queue_updates_priority() {
    let h = Harness::new();
    let d = h.domain(2, 1);
    let port = d.ports[0];

    h.service.map_static(d.id, port, d.queues[0], 1).unwrap();
    h.service.map_static(d.id, port, d.queues[1], 2).unwrap();
    h.service.map_static(d.id, port, d.queues[0], 7).unwrap();

    let view = h.service.port_view(ME, d.id, port).unwrap();
    assert_eq!(view.num_mappings, 2);
    assert_eq!(view.slots[0].priority, 7);
    assert_eq!(view.slots[1].queue_id, Some(d.queues[1].0));
    assert_eq!(view.slots[2].state, "unmapped");
    assert_eq!(h.service.queue_mapping_count(ME, d.id, d.queues[0]).unwrap(), 1);
    h.assert_consistent();
}

#[test]
fn test_static_map_rejected_after_start() {
    let h = Harness::new();
    let d = h.started_domain(1, 1);

    let err = h.service.map_static(d.id, d.ports[0], d.queues[0], 0).unwrap_err();
    assert_eq!(err, MappingError::DomainAlreadyStarted(d.id));
    assert!(!err.is_fatal());
}

#[test]
fn test_full_port_has_no_free_slot() {
    let h = Harness::new();
    let d = h.domain(9, 1);
    let port = d.ports[0];

    for queue in &d.queues[..8] {
        h.service.map_static(d.id, port, *queue, 0).unwrap();
    }

    let err = h.service.map_static(d.id, port, d.queues[8], 0).unwrap_err();
    assert!(matches!(err, MappingError::NoFreeSlot { .. }));
    assert!(err.is_fatal());

    // The request layer reports the same condition as a caller error.
    let err = h.service.map_qid(ME, d.id, port, d.queues[8], 0).unwrap_err();
    assert!(matches!(err, MappingError::InsufficientResources(_)));
    h.assert_consistent();
}

#[test]
fn test_map_qid_before_start_is_static() {
    let h = Harness::new();
    let d = h.domain(1, 1);

    let outcome = h.service.map_qid(ME, d.id, d.ports[0], d.queues[0], 3).unwrap();
    assert_eq!(outcome, MappingOutcome::Completed);

    let outcome = h.service.map_qid(ME, d.id, d.ports[0], d.queues[0], 4).unwrap();
    assert_eq!(outcome, MappingOutcome::Completed);
    assert_eq!(h.service.slot(ME, d.id, d.ports[0], 0).unwrap().priority, 4);
    assert_eq!(h.device.binding(d.ports[0], 0), Some((d.queues[0], 4)));
    assert_eq!(h.device.inflight_limit_history(d.queues[0]), vec![64]);
}

#[test]
fn test_invalid_requests() {
    let h = Harness::new();
    let d = h.domain(1, 1);
    let other = h.domain(1, 1);

    let err = h.service.map_qid(ME, d.id, d.ports[0], d.queues[0], 8).unwrap_err();
    assert_eq!(err, MappingError::InvalidPriority(8));

    let err = h.service.map_qid(ME, d.id, d.ports[0], other.queues[0], 0).unwrap_err();
    assert_eq!(err, MappingError::InvalidQueueId(other.queues[0].0));

    let err = h.service.map_static(d.id, other.ports[0], d.queues[0], 0).unwrap_err();
    assert!(matches!(err, MappingError::InvalidPortOrSlot { slot: None, .. }));

    let err = h.service.slot(ME, d.id, d.ports[0], 8).unwrap_err();
    assert!(matches!(err, MappingError::InvalidPortOrSlot { slot: Some(8), .. }));
}

#[test]
fn test_unmap_primitive_releases_slot() {
    let h = Harness::new();
    let d = h.domain(1, 1);
    let (port, queue) = (d.ports[0], d.queues[0]);

    h.service.map_static(d.id, port, queue, 2).unwrap();
    h.service.unmap(d.id, port, queue).unwrap();

    let slot = h.service.slot(ME, d.id, port, 0).unwrap();
    assert_eq!(slot.state, "unmapped");
    assert_eq!(slot.queue_id, None);
    assert_eq!(h.service.queue_mapping_count(ME, d.id, queue).unwrap(), 0);
    assert_eq!(h.device.binding(port, 0), None);

    let err = h.service.unmap(d.id, port, queue).unwrap_err();
    assert_eq!(err, MappingError::QueueNotMapped { port, queue });
    h.assert_consistent();
}
