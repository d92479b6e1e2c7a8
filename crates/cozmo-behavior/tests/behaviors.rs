mod common;

use std::collections::BTreeMap;

use cozmo_behavior::{BehaviorConfig, EngineConfig, FAILED_PICKUPS};
use cozmo_core::{ObjectId, ObservedObject, Pose, RecordingSink, RobotCommand, RobotState};
use cozmo_tools::{tags, TraceLog, TRACE_LOG};

use common::{active, ctx, engine, recorded, with_chooser, Recorder};

fn cube_ahead() -> RobotState {
    let mut objects = BTreeMap::new();
    objects.insert(
        ObjectId(1),
        ObservedObject {
            pose: Pose::new(300.0, 0.0, 0.0),
            last_seen_tick: 0,
            stacked_on: None,
        },
    );
    RobotState {
        objects,
        ..RobotState::default()
    }
}

fn fetch_engine() -> EngineConfig {
    let mut config = with_chooser(
        engine(vec![BehaviorConfig::new("Fetch", "FetchCube")]),
        &["Fetch"],
    );
    config.behaviors[0].carrying_object_handled_internally = true;
    config
}

fn stop_detail<'a>(trace: &'a TraceLog, id: &str) -> Option<&'a str> {
    trace
        .tagged(tags::BEHAVIOR_STOP)
        .find(|e| e.subject == id)
        .map(|e| e.detail.as_str())
}

#[test]
fn fetch_cube_drives_then_lifts_the_cube() {
    let recorder = Recorder::default();
    let mut manager = recorder.manager(&fetch_engine());
    manager.whiteboard_mut().set(TRACE_LOG, TraceLog::default());
    let mut sink = RecordingSink::auto_completing();

    manager.tick(&ctx(0), &cube_ahead(), &mut sink);
    assert_eq!(active(&manager), Some("Fetch"));
    assert_eq!(
        manager.behavior("Fetch").map(|b| b.debug_state()),
        Some("PickUpCube")
    );

    let mut lifted = cube_ahead();
    lifted.carrying_object = Some(ObjectId(1));
    manager.tick(&ctx(1), &lifted, &mut sink);

    assert_eq!(sink.count_where(|c| matches!(c, RobotCommand::DriveToPose { .. })), 1);
    assert_eq!(
        sink.count_where(|c| *c == RobotCommand::PickUpObject { object: ObjectId(1) }),
        1
    );
    let trace = manager.whiteboard().get(TRACE_LOG).expect("trace log installed");
    assert_eq!(stop_detail(trace, "Fetch"), Some("completed"));
    // carrying now, so only the idle behavior is runnable
    assert_eq!(active(&manager), Some("Wait"));
}

#[test]
fn fetch_cube_gives_up_after_its_attempts() {
    let recorder = Recorder::default();
    let mut manager = recorder.manager(&fetch_engine());
    manager.whiteboard_mut().set(TRACE_LOG, TraceLog::default());
    let mut sink = RecordingSink::auto_completing();
    let state = cube_ahead();

    for tick in 0..20 {
        manager.tick(&ctx(tick), &state, &mut sink);
    }

    // one drive per attempt, each from a different approach
    let drives: Vec<Pose> = sink
        .sent()
        .iter()
        .filter_map(|c| match &c.command {
            RobotCommand::DriveToPose { pose } => Some(*pose),
            _ => None,
        })
        .collect();
    assert_eq!(drives.len(), 2);
    assert_ne!(drives[0], drives[1]);
    assert_eq!(
        sink.count_where(|c| matches!(c, RobotCommand::PlayAnimation { name, .. } if name == "Confused")),
        1
    );

    let failed = manager.whiteboard().get(FAILED_PICKUPS).expect("failure recorded");
    assert!(failed.contains(&ObjectId(1)));
    let trace = manager.whiteboard().get(TRACE_LOG).expect("trace log installed");
    assert_eq!(stop_detail(trace, "Fetch"), Some("failed"));
    assert_eq!(manager.behavior("Fetch").map(|b| b.start_count()), Some(1));
    assert_eq!(active(&manager), Some("Wait"));
}

#[test]
fn sequence_runs_children_in_order() {
    let recorder = Recorder::default();
    let config = with_chooser(
        engine(vec![
            BehaviorConfig::new("Seq", "Sequence").with_param("children", serde_json::json!(["A", "B"])),
            recorded("A").with_param("finish_after", 1),
            recorded("B").with_param("finish_after", 1),
        ]),
        &["Seq"],
    );
    let mut manager = recorder.manager(&config);
    manager.whiteboard_mut().set(TRACE_LOG, TraceLog::default());
    let mut sink = RecordingSink::new();
    let state = RobotState::default();

    manager.tick(&ctx(0), &state, &mut sink);
    assert_eq!(manager.behavior("Seq").map(|b| b.debug_state()), Some("Child2"));
    manager.tick(&ctx(1), &state, &mut sink);

    let log = recorder.take();
    assert_eq!(
        &log[..6],
        [
            "init:A:-",
            "update:A",
            "stop:A:completed",
            "init:B:-",
            "update:B",
            "stop:B:completed",
        ]
    );
    let trace = manager.whiteboard().get(TRACE_LOG).expect("trace log installed");
    assert_eq!(stop_detail(trace, "Seq"), Some("completed"));
}

#[test]
fn sequence_fails_when_a_child_cannot_start() {
    let recorder = Recorder::default();
    let config = with_chooser(
        engine(vec![
            BehaviorConfig::new("Seq", "Sequence").with_param("children", serde_json::json!(["A", "B"])),
            recorded("A").with_param("finish_after", 1),
            recorded("B"),
        ]),
        &["Seq"],
    );
    let mut manager = recorder.manager(&config);
    manager.whiteboard_mut().set(TRACE_LOG, TraceLog::default());
    let mut sink = RecordingSink::new();

    recorder.block("B");
    manager.tick(&ctx(0), &RobotState::default(), &mut sink);

    assert_eq!(recorder.count("init:B:-"), 0);
    let trace = manager.whiteboard().get(TRACE_LOG).expect("trace log installed");
    assert_eq!(stop_detail(trace, "Seq"), Some("failed"));
}

#[test]
fn play_animation_sends_the_configured_clip() {
    let recorder = Recorder::default();
    let config = with_chooser(
        engine(vec![BehaviorConfig::new("Sneeze", "PlayAnimation")
            .with_param("animations", serde_json::json!(["Sneeze01"]))
            .with_param("loops", 2)]),
        &["Sneeze"],
    );
    let mut manager = recorder.manager(&config);
    let mut sink = RecordingSink::new();

    manager.tick(&ctx(0), &RobotState::default(), &mut sink);

    assert_eq!(
        sink.count_where(|c| {
            *c == RobotCommand::PlayAnimation {
                name: "Sneeze01".to_string(),
                loops: 2,
            }
        }),
        1
    );
    assert_eq!(manager.behavior("Sneeze").map(|b| b.debug_state()), Some("Playing"));
}

#[test]
fn wait_with_a_timeout_completes() {
    let recorder = Recorder::default();
    let mut config = engine(vec![]);
    config.behaviors[0] = BehaviorConfig::new("Wait", "Wait").with_param("timeout_s", 0.25);
    let mut manager = recorder.manager(&config);
    manager.whiteboard_mut().set(TRACE_LOG, TraceLog::default());
    let mut sink = RecordingSink::new();
    let state = RobotState::default();

    for tick in 0..4 {
        manager.tick(&ctx(tick), &state, &mut sink);
    }

    let trace = manager.whiteboard().get(TRACE_LOG).expect("trace log installed");
    assert_eq!(stop_detail(trace, "Wait"), Some("completed"));
    // the idle behavior is chosen again straight away
    assert_eq!(manager.behavior("Wait").map(|b| b.start_count()), Some(2));
}
