//! Inspection tooling for the behavior engine.
//!
//! The scheduler emits [`TraceEvent`]s into the whiteboard; tools (the
//! simulator's JSONL writer, tests) read them back.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![forbid(unsafe_code)]

pub mod trace;

pub use trace::{emit, tags, TraceEvent, TraceLog, TraceSink, TRACE_LOG, TRACE_SINK};
