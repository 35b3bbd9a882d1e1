// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

mod common;

use common::{Harness, ME};
use qidmap_core::application::MappingService;
use qidmap_core::domain::{MapPath, MappingEvent, MappingOutcome, QueueBacklog, ReconciliationWorker};
use qidmap_core::infrastructure::DeviceOp;

#[test]
fn test_map_completes_after_queue_drains() {
    let h = Harness::new();
    let d = h.started_domain(1, 1);
    let (port, queue) = (d.ports[0], d.queues[0]);
    h.device.script_queue_inflight(queue, [3, 0, 0]);

    let outcome = h.service.map_qid(ME, d.id, port, queue, 2).unwrap();
    assert_eq!(outcome, MappingOutcome::Pending);
    assert_eq!(h.service.slot(ME, d.id, port, 0).unwrap().state, "map_in_progress");
    assert_eq!(h.service.domain_pending_counts(ME, d.id).unwrap().pending_additions, 1);
    assert_eq!(h.device.inflight_limit(queue), Some(0));
    assert!(h.worker.is_armed());
    h.assert_consistent();

    let remaining = h.service.reconcile().unwrap();
    assert_eq!(remaining, 0);

    let slot = h.service.slot(ME, d.id, port, 0).unwrap();
    assert_eq!(slot.state, "mapped");
    assert_eq!(slot.queue_id, Some(queue.0));
    assert_eq!(slot.priority, 2);
    assert_eq!(h.service.queue_mapping_count(ME, d.id, queue).unwrap(), 1);
    assert_eq!(h.device.binding(port, 0), Some((queue, 2)));
    assert_eq!(h.device.inflight_limit_history(queue), vec![64, 0, 64]);
    assert!(!h.worker.is_armed());
    h.assert_consistent();
}

#[test]
fn test_map_completes_immediately_when_drained() {
    let h = Harness::new();
    let d = h.started_domain(1, 1);
    let (port, queue) = (d.ports[0], d.queues[0]);
    h.device.set_queue_backlog(queue, QueueBacklog { atomic_active: 2, enqueued: 0 });
    let mut events = h.event_bus.subscribe();

    let outcome = h.service.map_qid(ME, d.id, port, queue, 0).unwrap();
    assert_eq!(outcome, MappingOutcome::Completed);
    assert_eq!(h.device.has_work(port, 0), (true, false));
    assert_eq!(h.device.inflight_ok_resets(port, 0), 1);
    assert!(h.device.is_port_enabled(port));
    assert!(!h.worker.is_armed());

    match events.try_recv().unwrap() {
        MappingEvent::QueueMapped { path, .. } => assert_eq!(path, MapPath::Dynamic),
        other => panic!("unexpected event {:?}", other),
    }
}

#[test]
fn test_queue_refilled_while_quiesced_stays_pending() {
    let h = Harness::new();
    let d = h.started_domain(1, 1);
    let (port, queue) = (d.ports[0], d.queues[0]);
    h.device.script_queue_inflight(queue, [0, 2]);
    h.device.clear_operations();

    let outcome = h.service.map_qid(ME, d.id, port, queue, 1).unwrap();
    assert_eq!(outcome, MappingOutcome::Pending);

    let ops = h.device.operations();
    assert!(ops.contains(&DeviceOp::DisablePort { port }));
    assert_eq!(ops.last(), Some(&DeviceOp::EnablePort { port }));
    assert!(h.device.is_port_enabled(port));
    assert_eq!(h.device.binding(port, 0), None);

    assert_eq!(h.service.reconcile().unwrap(), 0);
    assert_eq!(h.service.slot(ME, d.id, port, 0).unwrap().state, "mapped");
}

#[test]
fn test_mapped_ports_are_quiesced_during_commit() {
    let h = Harness::new();
    let d = h.started_domain(1, 2);
    let queue = d.queues[0];

    h.service.map_qid(ME, d.id, d.ports[0], queue, 0).unwrap();
    h.device.clear_operations();

    h.service.map_qid(ME, d.id, d.ports[1], queue, 0).unwrap();

    let ops = h.device.operations();
    assert!(ops.contains(&DeviceOp::DisablePort { port: d.ports[0] }));
    assert!(ops.contains(&DeviceOp::DisablePort { port: d.ports[1] }));
    assert!(h.device.is_port_enabled(d.ports[0]));
    assert!(h.device.is_port_enabled(d.ports[1]));
    assert_eq!(h.service.queue_mapping_count(ME, d.id, queue).unwrap(), 2);
}

#[test]
fn test_limit_restored_once_after_last_addition() {
    let h = Harness::new();
    let d = h.started_domain(1, 2);
    let queue = d.queues[0];
    h.device.script_queue_inflight(queue, [5, 5]);

    assert!(h.service.map_qid(ME, d.id, d.ports[0], queue, 0).unwrap().is_pending());
    assert!(h.service.map_qid(ME, d.id, d.ports[1], queue, 0).unwrap().is_pending());
    assert_eq!(h.service.domain_pending_counts(ME, d.id).unwrap().pending_additions, 2);
    h.assert_consistent();

    assert_eq!(h.service.finish_pending_maps().unwrap(), 0);
    assert_eq!(h.device.inflight_limit_history(queue), vec![64, 0, 0, 64]);
    assert_eq!(h.service.queue_mapping_count(ME, d.id, queue).unwrap(), 2);
    h.assert_consistent();
}

#[test]
fn test_pending_map_priority_update_and_abort() {
    let h = Harness::new();
    let d = h.started_domain(1, 1);
    let (port, queue) = (d.ports[0], d.queues[0]);
    h.device.set_queue_inflight(queue, 4);

    assert!(h.service.map_qid(ME, d.id, port, queue, 1).unwrap().is_pending());
    assert!(h.service.map_qid(ME, d.id, port, queue, 6).unwrap().is_pending());
    assert_eq!(h.service.slot(ME, d.id, port, 0).unwrap().priority, 6);

    let outcome = h.service.unmap_qid(ME, d.id, port, queue).unwrap();
    assert_eq!(outcome, MappingOutcome::Completed);
    assert_eq!(h.service.slot(ME, d.id, port, 0).unwrap().state, "unmapped");
    assert_eq!(h.service.domain_pending_counts(ME, d.id).unwrap().pending_additions, 0);
    assert_eq!(h.device.inflight_limit(queue), Some(64));
    h.assert_consistent();

    // Nothing left to do; the pass disarms the worker.
    assert_eq!(h.service.reconcile().unwrap(), 0);
    assert!(!h.worker.is_armed());
}
