//! End-to-end relay sessions over the loopback hub.

use std::cell::RefCell;
use std::rc::Rc;

use netrep_net::{CodecConfig, LoopbackEndpoint, LoopbackHub};
use netrep_relay::{
    Clock, CustomEvent, EntityHandle, ManualClock, NamedVariable, RelayDispatcher, StateChange,
    VariableValue,
};

type Node = RelayDispatcher<LoopbackEndpoint, ManualClock>;

fn node(endpoint: LoopbackEndpoint) -> Node {
    RelayDispatcher::new(endpoint, ManualClock::new(0.0))
}

fn pump(node: &mut Node) -> usize {
    let messages = node.transport().drain();
    let n = messages.len();
    for message in messages {
        node.receive(message).unwrap();
    }
    n
}

type EventLog = Rc<RefCell<Vec<(EntityHandle, String, String)>>>;

fn watch_events(node: &mut Node) -> EventLog {
    let log: EventLog = Rc::default();
    let sink = Rc::clone(&log);
    node.listeners_mut().on_custom_event(move |source, event| {
        sink.borrow_mut()
            .push((source, event.name.clone(), event.data.clone()));
    });
    log
}

fn watch_variables(node: &mut Node) -> Rc<RefCell<Vec<(String, String)>>> {
    let log = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&log);
    node.listeners_mut().on_variable(move |_, var| {
        sink.borrow_mut()
            .push((var.name.clone(), var.value.render()));
    });
    log
}

#[test]
fn test_authority_variables_reach_every_observer() {
    let hub = LoopbackHub::new(CodecConfig::default());
    let mut authority = node(hub.authority());
    let mut observers: Vec<Node> = (0..2).map(|_| node(hub.add_observer())).collect();
    let seen: Vec<_> = observers.iter_mut().map(watch_variables).collect();

    let handles = [EntityHandle(1), EntityHandle(2), EntityHandle(3)];
    for h in handles {
        authority.register(h);
    }
    let values = [
        VariableValue::Int(100),
        VariableValue::Float(0.5),
        VariableValue::Bool(false),
        VariableValue::String("ready".into()),
        VariableValue::Int(99),
    ];
    for (i, value) in values.into_iter().enumerate() {
        authority.clock().set(i as f64);
        authority
            .replicate(
                handles[i % 3],
                StateChange::Variable(NamedVariable::new(format!("v{i}"), value)),
            )
            .unwrap();
    }

    assert_eq!(authority.snapshot().total_replications, 5);
    assert_eq!(authority.snapshot().last_event_time, Some(4.0));
    assert_eq!(authority.registry().count(), 3);

    for (obs, log) in observers.iter_mut().zip(&seen) {
        assert_eq!(pump(obs), 5);
        let log = log.borrow();
        assert_eq!(log.len(), 5);
        assert_eq!(log[0], ("v0".to_string(), "100".to_string()));
        assert_eq!(log[1], ("v1".to_string(), "0.500000".to_string()));
        assert_eq!(log[2], ("v2".to_string(), "false".to_string()));
        // Observers apply but never count.
        assert_eq!(obs.snapshot().total_replications, 0);
    }
}

#[test]
fn test_observer_event_takes_two_hops() {
    let hub = LoopbackHub::new(CodecConfig::default());
    let mut authority = node(hub.authority());
    let mut sender = node(hub.add_observer());
    let mut bystander = node(hub.add_observer());
    let authority_log = watch_events(&mut authority);
    let sender_log = watch_events(&mut sender);
    let bystander_log = watch_events(&mut bystander);

    let player = EntityHandle(42);
    sender
        .replicate(
            player,
            StateChange::CustomEvent(CustomEvent::new("Jump", "height=2.0")),
        )
        .unwrap();
    assert_eq!(sender.snapshot().total_replications, 1);
    assert!(sender_log.borrow().is_empty());

    assert_eq!(pump(&mut authority), 1);
    assert_eq!(authority.snapshot().total_replications, 1);
    assert_eq!(authority_log.borrow().len(), 1);

    pump(&mut sender);
    pump(&mut bystander);
    let expected = vec![(player, "Jump".to_string(), "height=2.0".to_string())];
    assert_eq!(*sender_log.borrow(), expected);
    assert_eq!(*bystander_log.borrow(), expected);
    assert_eq!(sender.snapshot().total_replications, 1);
}

#[test]
fn test_rejected_request_sends_nothing() {
    let hub = LoopbackHub::new(CodecConfig::default());
    let mut authority = node(hub.authority());
    let mut observer = node(hub.add_observer());

    let err = authority.replicate(
        EntityHandle(1),
        StateChange::CustomEvent(CustomEvent::new("", "data")),
    );
    assert!(err.is_err());
    assert_eq!(pump(&mut observer), 0);
    assert_eq!(hub.counters().snapshot_and_reset().messages_sent, 0);
}

#[test]
fn test_traffic_feeds_bandwidth_samples() {
    let hub = LoopbackHub::new(CodecConfig::default());
    let mut authority = node(hub.authority());
    let _observer = node(hub.add_observer());
    authority.instrumentation_mut().start_bandwidth_monitoring();

    for i in 0..10 {
        authority
            .replicate(
                EntityHandle(1),
                StateChange::Variable(NamedVariable::new("tick", VariableValue::Int(i))),
            )
            .unwrap();
    }
    let traffic = hub.counters().snapshot_and_reset();
    assert_eq!(traffic.messages_sent, 10);
    authority
        .instrumentation_mut()
        .record_bandwidth(traffic.kb_per_sec(1.0));

    let snap = authority.snapshot();
    assert_eq!(snap.bandwidth_samples, 1);
    assert!(snap.average_bandwidth_kb > 0.0);
    assert!(snap.within_thresholds);
}

#[test]
fn test_clock_is_read_at_submit_time() {
    let hub = LoopbackHub::new(CodecConfig::default());
    let mut authority = node(hub.authority());
    let request = authority.stamp(
        EntityHandle(1),
        StateChange::CustomEvent(CustomEvent::new("Late", "")),
    );
    authority.clock().advance(7.0);
    authority.submit(&request).unwrap();
    assert_eq!(request.origin_time(), 0.0);
    assert_eq!(
        authority.snapshot().last_event_time,
        Some(authority.clock().now())
    );
}
