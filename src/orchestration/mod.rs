//! # Orchestration Engine
//!
//! Dispatch of bulk job items across a bounded concurrent worker pool and the
//! completion path that performs the exactly-once terminal transition.
//!
//! ## Core Components
//!
//! - **JobOrchestrator**: Public surface — creates jobs, dispatches items,
//!   handles cancellation and progress polling
//! - **Completion Detector** ([`check_and_complete`]): classifies and writes
//!   the terminal status, guarded so only one of N simultaneous finishers wins

pub mod completion;
pub mod orchestrator;

pub use completion::check_and_complete;
pub use orchestrator::{JobOrchestrator, SubmitOptions};
