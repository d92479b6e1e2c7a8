//! Simulated robot and timeline runner for the behavior engine.

#![forbid(unsafe_code)]

pub mod robot;
pub mod simulation;
pub mod starter;
pub mod timeline;
pub mod trace_file;

pub use robot::SimRobot;
pub use simulation::{RunSummary, Simulation};
pub use timeline::{SeenObject, StatePatch, Timeline, TimelineStep};
pub use trace_file::JsonlTraceSink;
