use std::fmt;

use anyhow::Result;

use cozmo_behavior::{BehaviorFactory, BehaviorManager, EngineConfig, RobotEvent, TickReport};
use cozmo_core::TickContext;
use cozmo_tools::{tags, TraceLog, TraceSink, TRACE_LOG, TRACE_SINK};

use crate::robot::SimRobot;
use crate::timeline::Timeline;

/// The behavior engine wired to a [`SimRobot`] and driven by a [`Timeline`].
pub struct Simulation {
    manager: BehaviorManager,
    robot: SimRobot,
    timeline: Timeline,
    tick: u64,
    dt_seconds: f32,
    seed: u64,
}

impl Simulation {
    pub fn new(config: &EngineConfig, timeline: Timeline, seed: u64) -> Result<Self> {
        let factory = BehaviorFactory::with_builtins();
        let mut manager = BehaviorManager::from_config(config, &factory)?;
        manager.whiteboard_mut().set(TRACE_LOG, TraceLog::default());
        let robot = SimRobot::new(timeline.initial.clone(), config.scheduler.tick_hz);
        Ok(Self {
            manager,
            robot,
            timeline,
            tick: 0,
            dt_seconds: config.scheduler.tick_seconds(),
            seed,
        })
    }

    /// Stream trace events to `sink` as well as the in-memory log.
    pub fn set_trace_sink(&mut self, sink: Box<dyn TraceSink>) {
        self.manager.whiteboard_mut().set(TRACE_SINK, sink);
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn manager(&self) -> &BehaviorManager {
        &self.manager
    }

    pub fn robot(&self) -> &SimRobot {
        &self.robot
    }

    pub fn trace(&self) -> Option<&TraceLog> {
        self.manager.whiteboard().get(TRACE_LOG)
    }

    /// Apply this tick's timeline steps, run one scheduler tick, then let
    /// the robot advance.
    pub fn step(&mut self) -> TickReport {
        let tick = self.tick;
        let mut events: Vec<RobotEvent> = Vec::new();
        for step in self.timeline.steps_at(tick) {
            events.extend(step.set.apply(self.robot.state_mut(), tick));
            events.extend(step.publish.iter().map(|kind| RobotEvent::new(*kind, tick)));
            if step.fail_next_commands > 0 {
                self.robot.fail_next_commands(step.fail_next_commands);
            }
        }
        for event in events {
            if let Err(err) = self.manager.publish(event) {
                tracing::debug!(error = %err, "event dropped");
            }
        }

        let ctx = TickContext::new(tick, self.dt_seconds, self.seed);
        let state = self.robot.state().clone();
        let report = self.manager.tick(&ctx, &state, &mut self.robot);
        self.robot.step();
        self.tick += 1;
        report
    }

    /// Stop everything and summarize the run.
    pub fn finish(mut self) -> RunSummary {
        let ctx = TickContext::new(self.tick, self.dt_seconds, self.seed);
        let state = self.robot.state().clone();
        self.manager.shutdown(&ctx, &state, &mut self.robot);
        // dropping the sink flushes it
        drop(self.manager.whiteboard_mut().remove(TRACE_SINK));

        let count = |tag: &str| self.trace().map_or(0, |log| log.tagged(tag).count());
        RunSummary {
            ticks: self.tick,
            starts: count(tags::BEHAVIOR_START) + count(tags::BEHAVIOR_RESUME),
            reactions: count(tags::REACTION_TRIGGER),
            suppressed: count(tags::REACTION_SUPPRESSED),
            safety_stops: count(tags::SAFETY_STOP),
            commands: self.robot.sent(),
        }
    }
}

impl fmt::Debug for Simulation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Simulation")
            .field("tick", &self.tick)
            .field("manager", &self.manager)
            .field("robot", &self.robot)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub ticks: u64,
    pub starts: usize,
    pub reactions: usize,
    pub suppressed: usize,
    pub safety_stops: usize,
    pub commands: u64,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ticks, {} behavior starts, {} reactions ({} suppressed), {} safety stops, {} commands",
            self.ticks, self.starts, self.reactions, self.suppressed, self.safety_stops, self.commands
        )
    }
}
