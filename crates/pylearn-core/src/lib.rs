//! Code execution core for the PyLearn playground.
//!
//! Learner-authored Python is routed to one of two backends and every outcome
//! is reported through one contract:
//!
//! - **Validation**: blank submissions are rejected before any work is done
//! - **Remote gateway**: a single bounded call to a sandboxed execution service
//! - **Normalization**: the service's loosely shaped JSON becomes an `ExecutionResult`
//! - **Local interpreter**: a lazily loaded Python engine used as a degraded fallback
//! - **Orchestration**: a per-session state machine that tries strategies in order
//!   and never leaves the caller without a terminal state
//!
//! Configuration and lesson content loading live alongside the core so the
//! server and the command line share them.

pub mod config;
pub mod core_types;
pub mod errors;
pub mod executors;
pub mod lessons;
pub mod orchestrator;

pub use config::*;
pub use core_types::{
    ExecutionRequest, ExecutionResult, ExecutionStatus, NormalizedRequest, RunOutcome,
};
pub use errors::{ExecutionFailure, PylearnError};
pub use executors::{ExecutionStrategy, LocalInterpreter, RemoteExecutionGateway};
pub use lessons::LessonStore;
pub use orchestrator::{prepare_interpreter, ExecutionSession};
