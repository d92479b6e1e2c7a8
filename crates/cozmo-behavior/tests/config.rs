use std::fs;

use cozmo_behavior::{
    BehaviorConfig, BehaviorFactory, BehaviorManager, EngineConfig, EventKind, TriggerCondition,
};

const ENGINE_YAML: &str = r#"
scheduler:
  tick_hz: 20
  strict_contracts: false
behaviors:
  - id: Wait
    class: Wait
    run_while_off_treads: true
  - id: Celebrate
    class: PlayAnimation
    cooldown_s: 4.0
    animations: [Happy, Dance]
    loops: 2
chooser: [Celebrate]
triggers:
  - name: pickup
    priority: 10
    behavior: Celebrate
    condition: picked_up
    resume_last_behavior: true
events: [object_seen, robot_picked_up]
"#;

#[test]
fn engine_config_loads_from_yaml() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("engine.yaml");
    fs::write(&path, ENGINE_YAML).expect("write config");

    let config = EngineConfig::load(&path).expect("valid config");

    assert_eq!(config.scheduler.tick_hz, 20);
    assert!((config.scheduler.tick_seconds() - 0.05).abs() < 1e-6);
    assert!(!config.scheduler.strict_contracts);
    assert_eq!(config.scheduler.max_delegation_depth, 8);
    assert_eq!(config.scheduler.idle_behavior.as_str(), "Wait");

    let celebrate = &config.behaviors[1];
    assert_eq!(celebrate.class, "PlayAnimation");
    assert_eq!(celebrate.cooldown_s, 4.0);
    assert_eq!(celebrate.params["loops"], serde_json::json!(2));
    assert!(config.behaviors[0].run_while_off_treads);

    let pickup = &config.triggers[0];
    assert_eq!(pickup.condition, TriggerCondition::PickedUp);
    assert!(pickup.resume_last_behavior);
    assert!(pickup.can_interrupt_other);
    assert!(!pickup.can_interrupt_self);
    assert_eq!(config.events, vec![EventKind::ObjectSeen, EventKind::RobotPickedUp]);

    let manager = BehaviorManager::from_config(&config, &BehaviorFactory::with_builtins())
        .expect("builds from loaded config");
    assert_eq!(manager.triggers().names().collect::<Vec<_>>(), vec!["pickup"]);
}

#[test]
fn missing_config_falls_back_to_defaults() {
    let dir = tempfile::tempdir().expect("tempdir");

    let config = EngineConfig::load_or_default(&dir.path().join("absent.yaml")).expect("defaults");

    assert_eq!(config, EngineConfig::default());
    assert_eq!(config.events.len(), EventKind::ALL.len());
    assert!(config.validate().is_ok());
}

#[test]
fn config_survives_a_yaml_round_trip() {
    let config: EngineConfig = serde_yaml::from_str(ENGINE_YAML).expect("parse");

    let yaml = config.to_yaml().expect("serialize");
    let again: EngineConfig = serde_yaml::from_str(&yaml).expect("reparse");

    assert_eq!(again, config);
}

#[test]
fn unparsable_files_name_the_path() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("broken.yaml");
    fs::write(&path, "behaviors: [").expect("write config");

    let err = EngineConfig::load(&path).unwrap_err();

    assert!(format!("{err}").contains("broken.yaml"), "{err}");
}

fn rejected(config: &EngineConfig) -> String {
    format!("{:#}", config.validate().unwrap_err())
}

#[test]
fn validation_catches_dangling_references() {
    let mut config = EngineConfig::default();
    config.chooser = vec!["Ghost".into()];
    assert!(rejected(&config).contains("chooser references unknown behavior `Ghost`"));

    let mut config = EngineConfig::default();
    config.scheduler.idle_behavior = "Nap".into();
    assert!(rejected(&config).contains("idle behavior `Nap` is not defined"));

    let mut config: EngineConfig = serde_yaml::from_str(ENGINE_YAML).expect("parse");
    config.triggers[0].behavior = "Ghost".into();
    assert!(rejected(&config).contains("trigger `pickup` targets unknown behavior `Ghost`"));
}

#[test]
fn validation_catches_duplicates_and_limits() {
    let mut config = EngineConfig::default();
    config.behaviors.push(BehaviorConfig::new("Wait", "Wait"));
    assert!(rejected(&config).contains("behavior id `Wait` defined more than once"));

    let mut config = EngineConfig::default();
    config.scheduler.max_delegation_depth = 0;
    assert!(rejected(&config).contains("max_delegation_depth"));

    let mut config: EngineConfig = serde_yaml::from_str(ENGINE_YAML).expect("parse");
    let mut twin = config.triggers[0].clone();
    twin.priority = 20;
    config.triggers.push(twin);
    assert!(rejected(&config).contains("trigger `pickup` defined more than once"));
}

#[test]
fn invalid_files_report_the_validation_failure() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("engine.yaml");
    fs::write(&path, "chooser: [Ghost]\n").expect("write config");

    let err = EngineConfig::load(&path).unwrap_err();

    let chain = format!("{err:#}");
    assert!(chain.contains("Invalid engine config"), "{chain}");
    assert!(chain.contains("Ghost"), "{chain}");
}
