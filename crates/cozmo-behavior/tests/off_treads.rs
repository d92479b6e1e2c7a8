mod common;

use std::collections::BTreeMap;

use cozmo_behavior::{BehaviorConfig, EngineConfig, Lifecycle, TriggerCondition, IDLE_FLOOR_ID, MANAGER_ISSUER};
use cozmo_core::{
    ObjectId, ObservedObject, OffTreadsState, Pose, RecordingSink, RobotCommand, RobotState,
};
use cozmo_tools::{tags, TraceLog, TRACE_LOG};

use common::{active, ctx, engine, recorded, trigger, with_chooser, Recorder};

fn stack_in_view() -> RobotState {
    let mut objects = BTreeMap::new();
    objects.insert(
        ObjectId(1),
        ObservedObject {
            pose: Pose::new(200.0, 0.0, 0.0),
            last_seen_tick: 0,
            stacked_on: None,
        },
    );
    objects.insert(
        ObjectId(2),
        ObservedObject {
            pose: Pose::new(200.0, 0.0, 0.0),
            last_seen_tick: 0,
            stacked_on: Some(ObjectId(1)),
        },
    );
    RobotState {
        objects,
        ..RobotState::default()
    }
}

fn in_air(mut state: RobotState) -> RobotState {
    state.off_treads = OffTreadsState::InAir;
    state
}

fn wait_off_treads(config: &mut EngineConfig) {
    for behavior in config.behaviors.iter_mut().filter(|b| b.id.as_str() == "Wait") {
        behavior.run_while_off_treads = true;
    }
}

fn manager_stops(sink: &RecordingSink) -> usize {
    sink.sent()
        .iter()
        .filter(|c| c.issuer == MANAGER_ISSUER && c.command == RobotCommand::StopAllMotors)
        .count()
}

#[test]
fn wait_keeps_running_off_treads_while_react_to_stack_is_stopped() {
    let recorder = Recorder::default();
    let mut config = with_chooser(
        engine(vec![BehaviorConfig::new("ReactToStack", "ReactToStackOfCubes")]),
        &["ReactToStack"],
    );
    wait_off_treads(&mut config);
    let mut manager = recorder.manager(&config);
    manager.whiteboard_mut().set(TRACE_LOG, TraceLog::default());
    let mut sink = RecordingSink::new();

    manager.tick(&ctx(0), &stack_in_view(), &mut sink);
    assert_eq!(active(&manager), Some("ReactToStack"));
    assert!(manager.stack().has_action());
    assert_eq!(
        sink.count_where(|c| matches!(c, RobotCommand::PlayAnimation { name, .. } if name == "ReactToStack")),
        1
    );

    for tick in 1..6 {
        manager.tick(&ctx(tick), &in_air(stack_in_view()), &mut sink);
        assert_eq!(active(&manager), Some("Wait"), "tick {tick}");
    }

    let react = manager.behavior("ReactToStack").expect("configured");
    assert_eq!(react.lifecycle(), Lifecycle::Inactive);
    assert_eq!(manager.behavior("Wait").map(|b| b.start_count()), Some(1));
    assert_eq!(manager_stops(&sink), 1);

    let trace = manager.whiteboard().get(TRACE_LOG).expect("trace log installed");
    assert_eq!(trace.subjects(tags::SAFETY_STOP), vec!["ReactToStack"]);
    let stop = trace
        .tagged(tags::BEHAVIOR_STOP)
        .find(|e| e.subject == "ReactToStack")
        .expect("react stopped");
    assert_eq!(stop.detail, "interrupted");
}

#[test]
fn idle_without_the_flag_yields_to_the_floor_and_comes_back() {
    let recorder = Recorder::default();
    let config = engine(vec![]);
    let mut manager = recorder.manager(&config);
    let mut sink = RecordingSink::new();

    manager.tick(&ctx(0), &RobotState::default(), &mut sink);
    assert_eq!(active(&manager), Some("Wait"));

    manager.tick(&ctx(1), &in_air(RobotState::default()), &mut sink);
    assert_eq!(active(&manager), Some(IDLE_FLOOR_ID));

    manager.tick(&ctx(2), &RobotState::default(), &mut sink);
    assert_eq!(active(&manager), Some("Wait"));
    assert_eq!(manager.behavior("Wait").map(|b| b.start_count()), Some(2));
}

#[test]
fn carrying_an_object_stops_behaviors_that_do_not_handle_it() {
    let recorder = Recorder::default();
    let config = with_chooser(engine(vec![recorded("A")]), &["A"]);
    let mut manager = recorder.manager(&config);
    let mut sink = RecordingSink::new();

    manager.tick(&ctx(0), &RobotState::default(), &mut sink);
    let carrying = RobotState {
        carrying_object: Some(ObjectId(3)),
        ..RobotState::default()
    };
    manager.tick(&ctx(1), &carrying, &mut sink);

    assert_eq!(recorder.count("stop:A:interrupted"), 1);
    assert_eq!(active(&manager), Some(IDLE_FLOOR_ID));
}

#[test]
fn safety_check_looks_at_the_behavior_in_control() {
    let recorder = Recorder::default();
    let config = with_chooser(
        engine(vec![
            recorded("Parent")
                .run_while_off_treads(true)
                .with_param("child", "Child"),
            recorded("Child"),
        ]),
        &["Parent"],
    );
    let mut manager = recorder.manager(&config);
    let mut sink = RecordingSink::new();

    manager.tick(&ctx(0), &RobotState::default(), &mut sink);
    recorder.take();
    manager.tick(&ctx(1), &in_air(RobotState::default()), &mut sink);

    // the parent may run off treads but its child may not
    assert_eq!(
        recorder.take(),
        vec![
            "stop:Child:interrupted",
            "stop:Parent:interrupted",
            "init:Parent:-",
            "delegate:Parent:failed",
            "update:Parent",
        ]
    );
    let ids: Vec<&str> = manager.stack_ids().iter().map(|id| id.as_str()).collect();
    assert_eq!(ids, vec!["Parent"]);
}

#[test]
fn off_treads_reaction_runs_before_the_generic_safety_stop() {
    let recorder = Recorder::default();
    let mut config = with_chooser(
        engine(vec![
            recorded("A"),
            recorded("Righting").run_while_off_treads(true),
        ]),
        &["A"],
    );
    config.triggers = vec![trigger("off_treads", 10, "Righting", TriggerCondition::OffTreads)];
    let mut manager = recorder.manager(&config);
    manager.whiteboard_mut().set(TRACE_LOG, TraceLog::default());
    let mut sink = RecordingSink::new();

    manager.tick(&ctx(0), &RobotState::default(), &mut sink);
    let report = manager.tick(&ctx(1), &in_air(RobotState::default()), &mut sink);

    assert_eq!(report.reaction.as_deref(), Some("off_treads"));
    assert_eq!(active(&manager), Some("Righting"));
    assert_eq!(recorder.count("init:Righting:off_treads"), 1);
    let trace = manager.whiteboard().get(TRACE_LOG).expect("trace log installed");
    assert!(trace.subjects(tags::SAFETY_STOP).is_empty());
}

#[test]
fn behavior_that_handles_off_treads_is_not_interrupted_by_the_reaction() {
    let recorder = Recorder::default();
    let mut config = with_chooser(
        engine(vec![
            recorded("A").run_while_off_treads(true),
            recorded("Righting").run_while_off_treads(true),
        ]),
        &["A"],
    );
    config.triggers = vec![trigger("off_treads", 10, "Righting", TriggerCondition::OffTreads)];
    let mut manager = recorder.manager(&config);
    let mut sink = RecordingSink::new();

    manager.tick(&ctx(0), &RobotState::default(), &mut sink);
    let report = manager.tick(&ctx(1), &in_air(RobotState::default()), &mut sink);

    assert!(!report.switched_by_trigger);
    assert_eq!(active(&manager), Some("A"));
    assert_eq!(recorder.count("init:Righting:off_treads"), 0);
}

#[test]
fn off_treads_reaction_sees_the_child_in_control_not_the_flagged_parent() {
    let recorder = Recorder::default();
    let mut config = with_chooser(
        engine(vec![
            recorded("Top")
                .run_while_off_treads(true)
                .with_param("child", "Child"),
            recorded("Child"),
            recorded("Righting").run_while_off_treads(true),
        ]),
        &["Top"],
    );
    config.triggers = vec![trigger("off_treads", 10, "Righting", TriggerCondition::OffTreads)];
    let mut manager = recorder.manager(&config);
    let mut sink = RecordingSink::new();

    manager.tick(&ctx(0), &RobotState::default(), &mut sink);
    recorder.take();
    let report = manager.tick(&ctx(1), &in_air(RobotState::default()), &mut sink);

    assert_eq!(report.reaction.as_deref(), Some("off_treads"));
    assert_eq!(
        recorder.take(),
        vec![
            "stop:Child:interrupted",
            "stop:Top:interrupted",
            "init:Righting:off_treads",
        ]
    );
    assert_eq!(active(&manager), Some("Righting"));
}
