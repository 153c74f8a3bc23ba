//! Run orchestration for one editing session.
//!
//! A session owns its `ExecutionStatus` and an ordered list of strategies.
//! `run` validates the request, moves the session to `Running`, tries each
//! ready strategy in turn until one succeeds, and always leaves the session in
//! a terminal state. A request that arrives while another run is in flight is
//! rejected without touching the status: runs are never queued.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::config::{PylearnConfig, RunnerMode};
use crate::core_types::{ExecutionRequest, ExecutionStatus, NormalizedRequest, RunOutcome};
use crate::errors::ExecutionFailure;
use crate::executors::{
    validate, ExecutionStrategy, LocalInterpreter, LocalStrategy, RemoteExecutionGateway, RemoteStrategy,
};

pub struct ExecutionSession {
    strategies: Vec<Arc<dyn ExecutionStrategy>>,
    // Held only for the check-and-set of a transition, never across an await.
    status: Mutex<ExecutionStatus>,
}

impl ExecutionSession {
    pub fn new(strategies: Vec<Arc<dyn ExecutionStrategy>>) -> Self {
        Self {
            strategies,
            status: Mutex::new(ExecutionStatus::Idle),
        }
    }

    /// Builds the strategy list for the configured runner mode.
    ///
    /// In remote mode the gateway comes first and the local interpreter is
    /// appended only when fallback is enabled. In local mode the interpreter is
    /// the only strategy.
    pub fn from_config(
        config: &PylearnConfig,
        gateway: Arc<RemoteExecutionGateway>,
        interpreter: Arc<LocalInterpreter>,
    ) -> Self {
        let local: Arc<dyn ExecutionStrategy> = Arc::new(LocalStrategy::new(interpreter));
        let strategies = match config.fallback.mode {
            RunnerMode::Local => vec![local],
            RunnerMode::Remote => {
                let mut strategies: Vec<Arc<dyn ExecutionStrategy>> =
                    vec![Arc::new(RemoteStrategy::new(gateway))];
                if config.fallback.enabled {
                    strategies.push(local);
                }
                strategies
            }
        };
        Self::new(strategies)
    }

    pub fn strategy_names(&self) -> Vec<&str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    pub fn status(&self) -> ExecutionStatus {
        self.lock_status().clone()
    }

    /// Whether the run affordance should be disabled.
    pub fn is_running(&self) -> bool {
        matches!(*self.lock_status(), ExecutionStatus::Running)
    }

    pub async fn run(&self, request: ExecutionRequest) -> RunOutcome {
        let normalized = match self.begin(&request) {
            Ok(Some(normalized)) => normalized,
            Ok(None) => {
                log::debug!("Run request rejected: another run is in flight");
                return RunOutcome::Rejected;
            }
            Err(failure) => return RunOutcome::Failed(failure),
        };

        let mut guard = RunningGuard {
            status: &self.status,
            finished: false,
        };
        let outcome = self.dispatch(&normalized).await;
        guard.finish(&outcome);
        outcome
    }

    /// Transition out of Idle or a terminal state. `Ok(None)` means the session is busy.
    fn begin(&self, request: &ExecutionRequest) -> Result<Option<NormalizedRequest>, ExecutionFailure> {
        let mut status = self.lock_status();
        if matches!(*status, ExecutionStatus::Running) {
            return Ok(None);
        }

        match validate(request) {
            Ok(normalized) => {
                *status = ExecutionStatus::Running;
                log::debug!("Session is running ({} strategies)", self.strategies.len());
                Ok(Some(normalized))
            }
            Err(failure) => {
                log::debug!("Run request failed validation: {}", failure);
                *status = ExecutionStatus::Failed(failure.clone());
                Err(failure)
            }
        }
    }

    async fn dispatch(&self, request: &NormalizedRequest) -> RunOutcome {
        let mut last_failure: Option<ExecutionFailure> = None;
        let mut first_unavailable: Option<ExecutionFailure> = None;

        for strategy in &self.strategies {
            if !strategy.is_ready() {
                log::info!("Skipping {} strategy: not ready", strategy.name());
                if first_unavailable.is_none() {
                    first_unavailable = Some(strategy.unavailable_failure());
                }
                continue;
            }

            if let Some(previous) = &last_failure {
                log::info!("Falling back to {} strategy after: {}", strategy.name(), previous);
            }

            match strategy.execute(request).await {
                Ok(result) => {
                    log::info!("Run succeeded via {} strategy (exit code {})", strategy.name(), result.exit_code);
                    return RunOutcome::Succeeded(result);
                }
                Err(failure) => {
                    log::warn!("{} strategy failed: {}", strategy.name(), failure);
                    last_failure = Some(failure);
                }
            }
        }

        let failure = last_failure
            .or(first_unavailable)
            .unwrap_or_else(ExecutionFailure::not_ready);
        RunOutcome::Failed(failure)
    }

    fn lock_status(&self) -> MutexGuard<'_, ExecutionStatus> {
        self.status.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Loads the local interpreter before a one-shot run that may need it.
///
/// In local mode a load failure is returned. As a fallback behind the remote
/// gateway it is only logged and the run goes ahead remote-only.
pub async fn prepare_interpreter(config: &PylearnConfig, interpreter: &LocalInterpreter) -> Result<(), ExecutionFailure> {
    match config.fallback.mode {
        RunnerMode::Local => interpreter.ready().await,
        RunnerMode::Remote if config.fallback.enabled => {
            if let Err(failure) = interpreter.ready().await {
                log::warn!("Local fallback unavailable: {}", failure);
            }
            Ok(())
        }
        RunnerMode::Remote => Ok(()),
    }
}

/// Puts the session back to `Idle` if the run future is dropped mid-flight.
struct RunningGuard<'a> {
    status: &'a Mutex<ExecutionStatus>,
    finished: bool,
}

impl RunningGuard<'_> {
    fn finish(&mut self, outcome: &RunOutcome) {
        let terminal = match outcome {
            RunOutcome::Succeeded(result) => ExecutionStatus::Succeeded(result.clone()),
            RunOutcome::Failed(failure) => ExecutionStatus::Failed(failure.clone()),
            RunOutcome::Rejected => ExecutionStatus::Idle,
        };
        *self.status.lock().unwrap_or_else(|p| p.into_inner()) = terminal;
        self.finished = true;
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            log::warn!("Run was abandoned before completion; session reset to idle");
            *self.status.lock().unwrap_or_else(|p| p.into_inner()) = ExecutionStatus::Idle;
        }
    }
}
