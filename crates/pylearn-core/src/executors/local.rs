//! Local interpreter adapter used as the degraded fallback path.
//!
//! The engine is loaded lazily through a memoized async initializer and kept
//! for later runs. An engine whose process died is discarded so the next
//! `ready()` starts a fresh one. Every run resets the engine's capture
//! buffer, executes the submitted source in the interpreter's global scope,
//! then reads and clears the buffer. Isolation is only what the interpreter
//! itself provides.

use async_trait::async_trait;
use std::sync::{Arc, RwLock};
use tokio::sync::{Mutex, OnceCell};

use super::ExecutionStrategy;
use crate::core_types::{ExecutionResult, NormalizedRequest};
use crate::errors::{EngineError, ExecutionFailure};

/// Name of the capture object the engine installs as its standard output.
pub const CAPTURE_OBJECT: &str = "_pylearn_capture";

/// An initialized interpreter, treated as an opaque capability.
#[async_trait]
pub trait InterpreterEngine: Send + Sync {
    /// Version string reported by the interpreter.
    fn version(&self) -> &str;

    /// Executes statements in the interpreter's global scope.
    async fn run_source(&self, source: &str) -> Result<(), EngineError>;

    /// Evaluates an expression and returns its string form.
    async fn evaluate(&self, expression: &str) -> Result<String, EngineError>;
}

#[async_trait]
pub trait EngineLoader: Send + Sync {
    async fn load(&self) -> Result<Arc<dyn InterpreterEngine>, EngineError>;
}

type EngineSlot = OnceCell<Arc<dyn InterpreterEngine>>;

pub struct LocalInterpreter {
    loader: Arc<dyn EngineLoader>,
    // Swapped for an empty cell when the loaded engine turns out to be dead.
    engine: RwLock<Arc<EngineSlot>>,
    // The capture buffer is shared by every run on the one engine instance.
    run_lock: Mutex<()>,
}

impl LocalInterpreter {
    pub fn new(loader: Arc<dyn EngineLoader>) -> Self {
        Self {
            loader,
            engine: RwLock::new(Arc::new(OnceCell::new())),
            run_lock: Mutex::new(()),
        }
    }

    fn slot(&self) -> Arc<EngineSlot> {
        self.engine.read().unwrap_or_else(|poisoned| poisoned.into_inner()).clone()
    }

    fn current(&self) -> Option<Arc<dyn InterpreterEngine>> {
        self.slot().get().cloned()
    }

    pub fn is_ready(&self) -> bool {
        self.slot().initialized()
    }

    /// Loads the engine on first call; concurrent callers share the same load.
    /// A failed load is not cached, so a later call tries again. After the
    /// engine has been discarded the next call loads a fresh one.
    pub async fn ready(&self) -> Result<(), ExecutionFailure> {
        let slot = self.slot();
        let loaded = slot.get_or_try_init(|| async {
            log::info!("Loading local Python interpreter...");
            let engine = self.loader.load().await.map_err(|e| {
                log::error!("Failed to load Python interpreter: {}", e);
                ExecutionFailure::load_failed(e.to_string())
            })?;
            log::info!("Local Python {} is ready", engine.version());
            Ok::<_, ExecutionFailure>(engine)
        })
        .await
        .map(|_| ());
        loaded
    }

    pub fn version(&self) -> Option<String> {
        self.current().map(|engine| engine.version().to_string())
    }

    /// Forgets `engine` if it is still the loaded one.
    fn discard(&self, engine: &Arc<dyn InterpreterEngine>) {
        let mut slot = self.engine.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        let loaded = slot
            .get()
            .map_or(false, |current| Arc::as_ptr(current) as *const () == Arc::as_ptr(engine) as *const ());
        if loaded {
            log::warn!("Local Python engine stopped responding; it will be reloaded on next use");
            *slot = Arc::new(OnceCell::new());
        }
    }

    /// Passes `result` through, discarding the engine when the error means it is unusable.
    fn checked<T>(
        &self,
        engine: &Arc<dyn InterpreterEngine>,
        result: Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        if let Err(e) = &result {
            if e.is_fatal() {
                self.discard(engine);
            }
        }
        result
    }

    /// Runs `source` and returns everything it printed.
    pub async fn run_locally(&self, source: &str, stdin: &str) -> Result<String, ExecutionFailure> {
        let engine = self.current().ok_or_else(ExecutionFailure::not_ready)?;
        let _guard = self.run_lock.lock().await;

        let stdin_literal = serde_json::to_string(stdin)
            .map_err(|e| ExecutionFailure::exception(format!("Could not prepare standard input: {}", e), None))?;
        let reset = engine
            .run_source(&format!("{}.reset({})", CAPTURE_OBJECT, stdin_literal))
            .await;
        self.checked(&engine, reset).map_err(|e| engine_failure(e, None))?;

        let outcome = match self.checked(&engine, engine.run_source(source).await) {
            Err(e) if e.is_fatal() => return Err(engine_failure(e, None)),
            other => other,
        };
        let captured = engine
            .evaluate(&format!("{}.get_output()", CAPTURE_OBJECT))
            .await;
        let captured = self.checked(&engine, captured).map_err(|e| engine_failure(e, None))?;
        let cleared = engine.run_source(&format!("{}.reset()", CAPTURE_OBJECT)).await;
        self.checked(&engine, cleared).map_err(|e| engine_failure(e, None))?;

        match outcome {
            Ok(()) => Ok(captured),
            Err(e) => {
                log::debug!("Local run raised: {}", e);
                Err(engine_failure(e, Some(captured)))
            }
        }
    }
}

fn engine_failure(err: EngineError, partial_output: Option<String>) -> ExecutionFailure {
    match err {
        EngineError::Exception(message) => ExecutionFailure::exception(message, partial_output),
        EngineError::Load(message) => ExecutionFailure::load_failed(message),
        fatal => ExecutionFailure::engine_stopped(fatal.to_string()),
    }
}

/// Fallback path as seen by the orchestrator.
pub struct LocalStrategy {
    interpreter: Arc<LocalInterpreter>,
}

impl LocalStrategy {
    pub fn new(interpreter: Arc<LocalInterpreter>) -> Self {
        Self { interpreter }
    }
}

#[async_trait]
impl ExecutionStrategy for LocalStrategy {
    fn name(&self) -> &str {
        "local"
    }

    fn is_ready(&self) -> bool {
        self.interpreter.is_ready()
    }

    async fn execute(&self, request: &NormalizedRequest) -> Result<ExecutionResult, ExecutionFailure> {
        let captured = self
            .interpreter
            .run_locally(&request.source_text, &request.standard_input)
            .await?;

        Ok(ExecutionResult {
            standard_output: captured.clone(),
            standard_error: String::new(),
            combined_output: captured,
            exit_code: 0,
            exit_signal: None,
            language_id: request.language_id.clone(),
            language_version_used: self
                .interpreter
                .version()
                .unwrap_or_else(|| request.language_version.clone()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::InterpreterErrorKind;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    /// Engine double that understands only the capture commands plus `print:<text>`,
    /// `raise:<msg>` and `crash`, after which every call fails like a closed pipe.
    #[derive(Default)]
    struct FakeEngine {
        buffer: StdMutex<String>,
        stdin: StdMutex<String>,
        dead: AtomicBool,
    }

    fn broken_pipe() -> EngineError {
        EngineError::Io(std::io::Error::from(std::io::ErrorKind::BrokenPipe))
    }

    #[async_trait]
    impl InterpreterEngine for FakeEngine {
        fn version(&self) -> &str {
            "3.11.4"
        }

        async fn run_source(&self, source: &str) -> Result<(), EngineError> {
            if self.dead.load(Ordering::SeqCst) {
                return Err(broken_pipe());
            }
            if let Some(args) = source.strip_prefix(&format!("{}.reset(", CAPTURE_OBJECT)) {
                self.buffer.lock().unwrap().clear();
                let literal = args.trim_end_matches(')');
                if !literal.is_empty() {
                    *self.stdin.lock().unwrap() = serde_json::from_str(literal).unwrap();
                }
                return Ok(());
            }
            for line in source.lines() {
                if let Some(text) = line.strip_prefix("print:") {
                    let mut buffer = self.buffer.lock().unwrap();
                    buffer.push_str(text);
                    buffer.push('\n');
                } else if line == "echo_stdin" {
                    let stdin = self.stdin.lock().unwrap().clone();
                    self.buffer.lock().unwrap().push_str(&stdin);
                } else if let Some(message) = line.strip_prefix("raise:") {
                    return Err(EngineError::Exception(message.to_string()));
                } else if line == "crash" {
                    self.dead.store(true, Ordering::SeqCst);
                    return Err(EngineError::Protocol("interpreter exited".to_string()));
                }
            }
            Ok(())
        }

        async fn evaluate(&self, expression: &str) -> Result<String, EngineError> {
            if self.dead.load(Ordering::SeqCst) {
                return Err(broken_pipe());
            }
            assert_eq!(expression, format!("{}.get_output()", CAPTURE_OBJECT));
            Ok(self.buffer.lock().unwrap().clone())
        }
    }

    struct CountingLoader {
        loads: AtomicUsize,
        fail_first: bool,
    }

    impl CountingLoader {
        fn new() -> Self {
            Self {
                loads: AtomicUsize::new(0),
                fail_first: false,
            }
        }
    }

    #[async_trait]
    impl EngineLoader for CountingLoader {
        async fn load(&self) -> Result<Arc<dyn InterpreterEngine>, EngineError> {
            let attempt = self.loads.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            if self.fail_first && attempt == 0 {
                return Err(EngineError::Load("download interrupted".to_string()));
            }
            Ok(Arc::new(FakeEngine::default()))
        }
    }

    #[tokio::test]
    async fn test_run_before_ready_is_not_ready() {
        let interpreter = LocalInterpreter::new(Arc::new(CountingLoader::new()));
        let err = interpreter.run_locally("print:hi", "").await.unwrap_err();
        match err {
            ExecutionFailure::InterpreterError { kind, .. } => assert_eq!(kind, InterpreterErrorKind::NotReady),
            other => panic!("unexpected failure: {:?}", other),
        }
        assert!(!interpreter.is_ready());
    }

    #[tokio::test]
    async fn test_concurrent_ready_calls_share_one_load() {
        let loader = Arc::new(CountingLoader::new());
        let interpreter = Arc::new(LocalInterpreter::new(loader.clone()));

        let waits = (0..5).map(|_| {
            let interpreter = interpreter.clone();
            async move { interpreter.ready().await }
        });
        let results = futures_util::future::join_all(waits).await;

        assert!(results.iter().all(|r| r.is_ok()));
        assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
        interpreter.ready().await.unwrap();
        assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
        assert_eq!(interpreter.version().as_deref(), Some("3.11.4"));
    }

    #[tokio::test]
    async fn test_failed_load_is_retried() {
        let loader = Arc::new(CountingLoader {
            loads: AtomicUsize::new(0),
            fail_first: true,
        });
        let interpreter = LocalInterpreter::new(loader.clone());

        let err = interpreter.ready().await.unwrap_err();
        assert!(matches!(
            err,
            ExecutionFailure::InterpreterError { kind: InterpreterErrorKind::LoadFailed, .. }
        ));
        assert!(!interpreter.is_ready());

        interpreter.ready().await.unwrap();
        assert!(interpreter.is_ready());
        assert_eq!(loader.loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_dead_engine_is_discarded_and_reloaded() {
        let loader = Arc::new(CountingLoader::new());
        let interpreter = LocalInterpreter::new(loader.clone());
        interpreter.ready().await.unwrap();

        let err = interpreter.run_locally("print:partial\ncrash", "").await.unwrap_err();
        assert_eq!(err, ExecutionFailure::engine_stopped("Interpreter protocol error: interpreter exited"));
        assert!(!interpreter.is_ready());
        assert_eq!(interpreter.version(), None);

        let err = interpreter.run_locally("print:again", "").await.unwrap_err();
        assert_eq!(err, ExecutionFailure::not_ready());

        interpreter.ready().await.unwrap();
        assert_eq!(loader.loads.load(Ordering::SeqCst), 2);
        assert_eq!(interpreter.run_locally("print:again", "").await.unwrap(), "again\n");
    }

    #[tokio::test]
    async fn test_user_exception_keeps_engine_loaded() {
        let loader = Arc::new(CountingLoader::new());
        let interpreter = LocalInterpreter::new(loader.clone());
        interpreter.ready().await.unwrap();

        interpreter.run_locally("raise:ValueError: bad", "").await.unwrap_err();
        assert!(interpreter.is_ready());
        assert_eq!(interpreter.run_locally("print:ok", "").await.unwrap(), "ok\n");
        assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_buffer_is_reset_between_runs() {
        let interpreter = LocalInterpreter::new(Arc::new(CountingLoader::new()));
        interpreter.ready().await.unwrap();

        let first = interpreter.run_locally("print:one", "").await.unwrap();
        let second = interpreter.run_locally("print:two", "").await.unwrap();
        assert_eq!(first, "one\n");
        assert_eq!(second, "two\n");
    }

    #[tokio::test]
    async fn test_stdin_is_installed_per_run() {
        let interpreter = LocalInterpreter::new(Arc::new(CountingLoader::new()));
        interpreter.ready().await.unwrap();

        let output = interpreter.run_locally("echo_stdin", "Ada \"Lovelace\"\n").await.unwrap();
        assert_eq!(output, "Ada \"Lovelace\"\n");
    }

    #[tokio::test]
    async fn test_exception_becomes_interpreter_error_with_partial_output() {
        let interpreter = LocalInterpreter::new(Arc::new(CountingLoader::new()));
        interpreter.ready().await.unwrap();

        let err = interpreter
            .run_locally("print:before\nraise:NameError: name 'x' is not defined", "")
            .await
            .unwrap_err();
        assert_eq!(err.message(), "NameError: name 'x' is not defined");
        assert_eq!(err.detail(), Some("before\n"));

        // nothing leaks into the next run
        let next = interpreter.run_locally("print:clean", "").await.unwrap();
        assert_eq!(next, "clean\n");
    }

    #[tokio::test]
    async fn test_local_strategy_result_shape() {
        let interpreter = Arc::new(LocalInterpreter::new(Arc::new(CountingLoader::new())));
        let strategy = LocalStrategy::new(interpreter.clone());
        assert!(!strategy.is_ready());
        interpreter.ready().await.unwrap();
        assert!(strategy.is_ready());

        let request = NormalizedRequest {
            source_text: "print:hello".to_string(),
            standard_input: String::new(),
            language_id: "python".to_string(),
            language_version: "3.10.0".to_string(),
        };
        let result = strategy.execute(&request).await.unwrap();
        assert_eq!(result.combined_output, "hello\n");
        assert_eq!(result.standard_output, "hello\n");
        assert_eq!(result.standard_error, "");
        assert_eq!(result.exit_code, 0);
        assert_eq!(result.language_version_used, "3.11.4");
    }
}
