//! State module for tracking poll progress
//!
//! # Components
//!
//! - `PollPhase`: the orchestrator's position within one poll cycle

mod poll_phase;

pub use poll_phase::PollPhase;
