//! Agent framework for the autonomous cycle
//!
//! Implements the recall-think-act-reflect-persist-rest loop.

mod orchestrator;
pub mod prompt;
mod state;

#[cfg(test)]
mod testing;

pub use orchestrator::Orchestrator;
pub use state::{CycleOutcome, NoteUpdate};
