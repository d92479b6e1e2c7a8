mod common;

use cozmo_behavior::{BehaviorManager, EventError, EventKind, RobotEvent, SchedulerError};
use cozmo_core::{ObjectId, RecordingSink, RobotState};

use common::{ctx, engine, recorded, with_chooser, Recorder};

#[test]
fn events_reach_running_and_idle_subscribers() {
    let recorder = Recorder::default();
    let config = with_chooser(
        engine(vec![
            recorded("A").with_param("subscribe", serde_json::json!(["object_seen"])),
            recorded("B").with_param("subscribe", serde_json::json!(["object_seen", "face_seen"])),
        ]),
        &["A"],
    );
    let mut manager = recorder.manager(&config);
    let mut sink = RecordingSink::new();
    let state = RobotState::default();

    manager.tick(&ctx(0), &state, &mut sink);
    recorder.take();
    manager
        .publish(RobotEvent::new(EventKind::ObjectSeen, 1).with_object(ObjectId(4)))
        .expect("declared kind");
    assert_eq!(manager.events().pending(), 1);
    manager.tick(&ctx(1), &state, &mut sink);

    assert_eq!(manager.events().pending(), 0);
    let log = recorder.take();
    assert_eq!(
        &log[..2],
        ["event:A:ObjectSeen:true", "event:B:ObjectSeen:false"]
    );
    assert!(log.iter().all(|e| !e.starts_with("event:Wait")));
}

#[test]
fn events_are_delivered_once() {
    let recorder = Recorder::default();
    let config = with_chooser(
        engine(vec![recorded("A").with_param("subscribe", serde_json::json!(["cliff_detected"]))]),
        &["A"],
    );
    let mut manager = recorder.manager(&config);
    let mut sink = RecordingSink::new();
    let state = RobotState::default();

    manager
        .publish(RobotEvent::new(EventKind::CliffDetected, 0))
        .expect("declared kind");
    for tick in 0..3 {
        manager.tick(&ctx(tick), &state, &mut sink);
    }

    // dispatched before the first activation
    assert_eq!(recorder.count("event:A:CliffDetected:false"), 1);
    assert_eq!(recorder.count("event:A:CliffDetected:true"), 0);
}

#[test]
fn publishing_an_undeclared_kind_fails() {
    let recorder = Recorder::default();
    let mut config = engine(vec![]);
    config.events = vec![EventKind::ObjectSeen];
    let mut manager = recorder.manager(&config);

    let err = manager
        .publish(RobotEvent::new(EventKind::CliffDetected, 0))
        .unwrap_err();

    assert_eq!(err, EventError::Undeclared(EventKind::CliffDetected));
    assert_eq!(manager.events().pending(), 0);
}

#[test]
fn subscribing_to_an_undeclared_kind_fails_at_startup() {
    let recorder = Recorder::default();
    let mut config = engine(vec![
        recorded("A").with_param("subscribe", serde_json::json!(["face_seen"])),
    ]);
    config.events = vec![EventKind::ObjectSeen];

    let err = BehaviorManager::from_config(&config, &recorder.factory())
        .err()
        .expect("undeclared subscription rejected");

    let scheduler = err
        .downcast_ref::<SchedulerError>()
        .expect("scheduler error at the root");
    assert_eq!(
        *scheduler,
        SchedulerError::Event(EventError::Undeclared(EventKind::FaceSeen))
    );
}
