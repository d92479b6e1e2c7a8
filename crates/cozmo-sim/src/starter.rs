//! Files written by `cozmo-sim init`.

pub const ENGINE_CONFIG: &str = r#"# Behavior engine configuration

scheduler:
  max_delegation_depth: 8
  strict_contracts: false
  idle_behavior: Wait
  tick_hz: 30

behaviors:
  - id: Wait
    class: Wait
    run_while_off_treads: true
    run_while_on_charger: true
    carrying_object_handled_internally: true
  - id: ReactToStack
    class: ReactToStackOfCubes
  - id: FetchCube
    class: FetchCube
    max_attempts: 2
  - id: CliffReaction
    class: PlayAnimation
    animations: [CliffReact, CliffBackUp]
  - id: PickupReaction
    class: PlayAnimation
    run_while_off_treads: true
    animations: [PickedUpGrumpy]

# tried in order whenever nothing is running
chooser: [ReactToStack, FetchCube]

triggers:
  - name: cliff
    priority: 50
    behavior: CliffReaction
    condition: cliff
    resume_last_behavior: true
  - name: picked_up
    priority: 40
    behavior: PickupReaction
    condition: picked_up
    cooldown_s: 5.0
"#;

pub const TIMELINE: &str = r#"# Scripted sensor input for `cozmo-sim run --timeline`

steps:
  - tick: 10
    set:
      objects:
        - { id: 1, x_mm: 250.0, y_mm: 0.0 }
        - { id: 2, x_mm: 250.0, y_mm: 0.0, stacked_on: 1 }
  - tick: 120
    set:
      cliff_detected: true
  - tick: 125
    set:
      cliff_detected: false
  - tick: 200
    set:
      picked_up: true
      off_treads: in_air
  - tick: 240
    set:
      picked_up: false
      off_treads: on_treads
"#;
