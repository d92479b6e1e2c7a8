mod common;

use cozmo_behavior::{BehaviorConfig, SchedulerConfig};
use cozmo_core::{RecordingSink, RobotState};
use cozmo_tools::{tags, TraceLog, TRACE_LOG};

use common::{ctx, engine, recorded, with_chooser, Recorder};

#[test]
fn first_tick_activates_the_chooser_pick_and_updates_it_once() {
    let recorder = Recorder::default();
    let config = with_chooser(engine(vec![recorded("A")]), &["A"]);
    let mut manager = recorder.manager(&config);
    let mut sink = RecordingSink::new();

    let report = manager.tick(&ctx(0), &RobotState::default(), &mut sink);

    assert_eq!(report.active.as_ref().map(|id| id.as_str()), Some("A"));
    assert_eq!(report.behavior_updates, 1);
    assert!(!report.switched_by_trigger);
    assert_eq!(recorder.take(), vec!["init:A:-", "update:A"]);
}

#[test]
fn ticks_without_triggers_only_update_the_running_behavior() {
    let recorder = Recorder::default();
    let config = with_chooser(engine(vec![recorded("A")]), &["A"]);
    let mut manager = recorder.manager(&config);
    let mut sink = RecordingSink::new();
    let state = RobotState::default();

    for tick in 0..12 {
        manager.tick(&ctx(tick), &state, &mut sink);
    }

    assert_eq!(recorder.count("init:A:-"), 1);
    assert_eq!(recorder.count("update:A"), 12);
    assert!(recorder.entries().iter().all(|e| !e.starts_with("stop:")));
    assert!(sink.sent().is_empty());
    assert_eq!(manager.behavior("A").map(|b| b.start_count()), Some(1));
}

#[test]
fn only_the_leaf_action_runs_each_tick() {
    let recorder = Recorder::default();
    let config = with_chooser(
        engine(vec![
            recorded("Top").with_param("child", "Middle"),
            recorded("Middle").with_param("action", "drive"),
        ]),
        &["Top"],
    );
    let mut manager = recorder.manager(&config);
    let mut sink = RecordingSink::new();
    let state = RobotState::default();

    for tick in 0..5 {
        let report = manager.tick(&ctx(tick), &state, &mut sink);
        assert_eq!(report.action_updates, 1);
        assert_eq!(report.behavior_updates, 2);
        assert_eq!(report.stack_depth, 3);
    }

    let ids: Vec<&str> = manager.stack_ids().iter().map(|id| id.as_str()).collect();
    assert_eq!(ids, vec!["Top", "Middle"]);
    assert_eq!(manager.controlling_behavior().map(|id| id.as_str()), Some("Middle"));
    assert!(manager.stack().has_action());

    let first_tick: Vec<String> = recorder.take().into_iter().take(4).collect();
    assert_eq!(
        first_tick,
        vec!["init:Top:-", "init:Middle:-", "update:Middle", "update:Top"]
    );
}

#[test]
fn finished_action_is_delivered_to_its_parent_in_the_same_tick() {
    let recorder = Recorder::default();
    let config = with_chooser(
        engine(vec![recorded("A")
            .with_param("action", "blink")
            .with_param("action_ticks", 2)]),
        &["A"],
    );
    let mut manager = recorder.manager(&config);
    let mut sink = RecordingSink::new();
    manager.whiteboard_mut().set(TRACE_LOG, TraceLog::default());
    let state = RobotState::default();

    manager.tick(&ctx(0), &state, &mut sink);
    let report = manager.tick(&ctx(1), &state, &mut sink);

    assert_eq!(report.action_updates, 1);
    assert_eq!(report.stack_depth, 1);
    assert_eq!(
        recorder.take(),
        vec!["init:A:-", "update:A", "delegate:A:ok", "update:A"]
    );
    let trace = manager.whiteboard().get(TRACE_LOG).expect("trace log installed");
    assert_eq!(trace.subjects(tags::ACTION_FINISHED), vec!["blink"]);
}

#[test]
fn request_current_behavior_end_cancels_deepest_first() {
    let recorder = Recorder::default();
    let config = with_chooser(
        engine(vec![
            recorded("B1").with_param("child", "B2"),
            recorded("B2").with_param("action", "A"),
        ]),
        &["B1"],
    );
    let mut manager = recorder.manager(&config);
    let mut sink = RecordingSink::new();
    let state = RobotState::default();

    manager.tick(&ctx(0), &state, &mut sink);
    manager.request_current_behavior_end("test");
    manager.tick(&ctx(1), &state, &mut sink);

    let teardown: Vec<String> = recorder
        .entries()
        .into_iter()
        .filter(|e| e.starts_with("cancel:") || e.starts_with("stop:"))
        .collect();
    assert_eq!(teardown, vec!["cancel:A", "stop:B2:cancelled", "stop:B1:cancelled"]);
    // chosen again right away
    assert_eq!(manager.active_behavior().map(|id| id.as_str()), Some("B1"));
    assert_eq!(recorder.count("init:B1:-"), 2);
}

#[test]
fn stop_on_next_delegate_complete_ends_the_behavior_after_its_action() {
    let recorder = Recorder::default();
    let config = with_chooser(
        engine(vec![recorded("A")
            .with_param("action", "nod")
            .with_param("action_ticks", 2)]),
        &["A"],
    );
    let mut manager = recorder.manager(&config);
    let mut sink = RecordingSink::new();
    let state = RobotState::default();

    manager.tick(&ctx(0), &state, &mut sink);
    manager.stop_on_next_delegate_complete();
    recorder.block("A");
    manager.tick(&ctx(1), &state, &mut sink);

    let log = recorder.take();
    assert_eq!(
        log,
        vec!["init:A:-", "update:A", "delegate:A:ok", "stop:A:completed"]
    );
    assert_eq!(manager.active_behavior().map(|id| id.as_str()), Some("Wait"));
}

#[test]
fn idle_is_replaced_once_a_chooser_candidate_becomes_runnable() {
    let recorder = Recorder::default();
    let config = with_chooser(engine(vec![recorded("A")]), &["A"]);
    let mut manager = recorder.manager(&config);
    let mut sink = RecordingSink::new();
    let state = RobotState::default();

    recorder.block("A");
    manager.tick(&ctx(0), &state, &mut sink);
    assert_eq!(manager.active_behavior().map(|id| id.as_str()), Some("Wait"));

    recorder.unblock("A");
    manager.tick(&ctx(1), &state, &mut sink);
    assert_eq!(manager.active_behavior().map(|id| id.as_str()), Some("A"));
    assert_eq!(manager.behavior("Wait").map(|b| b.is_active()), Some(false));
}

#[test]
fn failing_init_falls_through_to_the_next_candidate() {
    let recorder = Recorder::default();
    let config = with_chooser(engine(vec![recorded("A"), recorded("B")]), &["A", "B"]);
    let mut manager = recorder.manager(&config);
    let mut sink = RecordingSink::new();

    recorder.refuse_init("A");
    manager.tick(&ctx(0), &RobotState::default(), &mut sink);

    assert_eq!(manager.active_behavior().map(|id| id.as_str()), Some("B"));
    assert_eq!(recorder.take(), vec!["refused:A", "init:B:-", "update:B"]);
    // a refused init never counts as a start and is never stopped
    assert_eq!(manager.behavior("A").map(|b| b.start_count()), Some(0));
}

#[test]
fn idle_floor_runs_when_the_configured_idle_cannot() {
    let recorder = Recorder::default();
    let config = engine(vec![]);
    let mut manager = recorder.manager(&config);
    let mut sink = RecordingSink::new();
    let state = RobotState {
        on_charger: true,
        ..RobotState::default()
    };

    manager.tick(&ctx(0), &state, &mut sink);

    assert_eq!(
        manager.active_behavior().map(|id| id.as_str()),
        Some(cozmo_behavior::IDLE_FLOOR_ID)
    );
}

#[test]
#[should_panic(expected = "exceeds limit")]
fn delegation_past_the_depth_limit_panics_with_strict_contracts() {
    let recorder = Recorder::default();
    let mut config = with_chooser(
        engine(vec![
            recorded("A").with_param("child", "B"),
            recorded("B").with_param("child", "C"),
            recorded("C"),
        ]),
        &["A"],
    );
    config.scheduler.max_delegation_depth = 2;
    let mut manager = recorder.manager(&config);
    let mut sink = RecordingSink::new();

    manager.tick(&ctx(0), &RobotState::default(), &mut sink);
}

#[test]
fn delegation_past_the_depth_limit_falls_back_to_idle_when_lenient() {
    let recorder = Recorder::default();
    let mut config = with_chooser(
        engine(vec![
            recorded("A").with_param("child", "B"),
            recorded("B").with_param("child", "C"),
            recorded("C"),
        ]),
        &["A"],
    );
    config.scheduler = SchedulerConfig {
        max_delegation_depth: 2,
        strict_contracts: false,
        ..SchedulerConfig::default()
    };
    let mut manager = recorder.manager(&config);
    let mut sink = RecordingSink::new();

    manager.tick(&ctx(0), &RobotState::default(), &mut sink);

    assert_eq!(manager.active_behavior().map(|id| id.as_str()), Some("Wait"));
    let stops: Vec<String> = recorder
        .entries()
        .into_iter()
        .filter(|e| e.starts_with("stop:"))
        .collect();
    assert_eq!(stops, vec!["stop:B:cancelled", "stop:A:cancelled"]);
    assert!(recorder.entries().iter().all(|e| e != "init:C:-"));
}

#[test]
fn unknown_child_behavior_falls_back_to_idle_when_lenient() {
    let recorder = Recorder::default();
    let mut config = with_chooser(
        engine(vec![recorded("A").with_param("child", "Nope")]),
        &["A"],
    );
    config.scheduler.strict_contracts = false;
    let mut manager = recorder.manager(&config);
    let mut sink = RecordingSink::new();

    manager.tick(&ctx(0), &RobotState::default(), &mut sink);

    assert_eq!(manager.active_behavior().map(|id| id.as_str()), Some("Wait"));
    assert_eq!(recorder.count("stop:A:cancelled"), 1);
}

#[test]
fn behavior_config_flags_gate_runnability() {
    let recorder = Recorder::default();
    let config = with_chooser(
        engine(vec![
            recorded("Grounded"),
            BehaviorConfig::new("Airborne", "Recorded").run_while_off_treads(true),
        ]),
        &["Grounded", "Airborne"],
    );
    let mut manager = recorder.manager(&config);
    let mut sink = RecordingSink::new();
    let state = RobotState {
        off_treads: cozmo_core::OffTreadsState::InAir,
        ..RobotState::default()
    };

    manager.tick(&ctx(0), &state, &mut sink);

    assert_eq!(manager.active_behavior().map(|id| id.as_str()), Some("Airborne"));
}
