//! Execution backends for learner code.
//!
//! Two heterogeneous paths produce the same `ExecutionResult`: the remote
//! sandboxed execution service (reached through the gateway and flattened by the
//! normalizer) and a local interpreter kept as a degraded fallback. Both are
//! exposed to the orchestrator as `ExecutionStrategy` trait objects.

use async_trait::async_trait;

use crate::core_types::{ExecutionResult, NormalizedRequest};
use crate::errors::ExecutionFailure;

pub mod local;
pub mod normalizer;
pub mod python;
pub mod remote;
pub mod validation;

pub use local::{EngineLoader, InterpreterEngine, LocalInterpreter, LocalStrategy};
pub use normalizer::normalize;
pub use python::{PythonEngine, PythonEngineLoader};
pub use remote::{RawBackendResponse, RemoteExecutionGateway, RemoteStrategy};
pub use validation::validate;

#[async_trait]
pub trait ExecutionStrategy: Send + Sync {
    fn name(&self) -> &str;

    /// A strategy that is not ready is skipped by the orchestrator.
    fn is_ready(&self) -> bool {
        true
    }

    /// Failure reported when this strategy was the only candidate and was not ready.
    fn unavailable_failure(&self) -> ExecutionFailure {
        ExecutionFailure::not_ready()
    }

    async fn execute(&self, request: &NormalizedRequest) -> Result<ExecutionResult, ExecutionFailure>;
}
