//! Concrete interpreter engine: a persistent Python process.
//!
//! The process runs a small bootstrap that installs the capture object as
//! `sys.stdout`, keeps one global namespace for its lifetime and answers
//! line-delimited JSON commands on private pipes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use which::which;

use super::local::{EngineLoader, InterpreterEngine, CAPTURE_OBJECT};
use crate::errors::EngineError;

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_CANDIDATES: &[&str] = &["python3", "python"];

// The protocol runs on duplicates of fds 0 and 1; the originals are pointed at
// /dev/null so learner code cannot write into the reply stream.
const BOOTSTRAP: &str = r#"
import io, json, os, sys, traceback

_commands = os.fdopen(os.dup(0), "r", encoding="utf-8")
_replies = os.fdopen(os.dup(1), "w", encoding="utf-8")
os.dup2(os.open(os.devnull, os.O_RDONLY), 0)
os.dup2(os.open(os.devnull, os.O_WRONLY), 1)


class _OutputCapture:
    def __init__(self):
        self.output = io.StringIO()

    def write(self, text):
        return self.output.write(text)

    def flush(self):
        pass

    def reset(self, stdin=None):
        self.output = io.StringIO()
        sys.stdout = self
        sys.stderr = sys.__stderr__
        if stdin is not None:
            sys.stdin = io.StringIO(stdin)

    def get_output(self):
        return self.output.getvalue()


__CAPTURE__ = _OutputCapture()
sys.stdout = __CAPTURE__
sys.stdin = io.StringIO("")
_scope = {"__name__": "__main__", "__builtins__": __builtins__, "__CAPTURE__": __CAPTURE__}


def _reply(payload):
    _replies.write(json.dumps(payload) + "\n")
    _replies.flush()


_reply({"ok": True, "value": sys.version.split()[0]})
for _line in _commands:
    _scope["__CAPTURE__"] = __CAPTURE__
    try:
        _command = json.loads(_line)
        if _command["op"] == "eval":
            _value = eval(_command["source"], _scope)
            _reply({"ok": True, "value": None if _value is None else str(_value)})
        else:
            exec(compile(_command["source"], "<main>", "exec"), _scope)
            _reply({"ok": True, "value": None})
    except BaseException as _exc:
        _reply({"ok": False, "error": "".join(traceback.format_exception_only(type(_exc), _exc)).strip()})
"#;

#[derive(Serialize)]
struct EngineCommand<'a> {
    op: &'a str,
    source: &'a str,
}

#[derive(Debug, Deserialize)]
struct EngineReply {
    ok: bool,
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

struct EngineChannel {
    // Held so the interpreter is killed when the engine is dropped.
    _child: Child,
    commands: ChildStdin,
    replies: Lines<BufReader<ChildStdout>>,
}

/// A long-lived Python interpreter with one global namespace.
pub struct PythonEngine {
    version: String,
    channel: Arc<Mutex<EngineChannel>>,
}

impl PythonEngine {
    pub async fn spawn(interpreter: &Path) -> Result<Self, EngineError> {
        let bootstrap = BOOTSTRAP.replace("__CAPTURE__", CAPTURE_OBJECT);
        let mut cmd = Command::new(interpreter);
        cmd.arg("-u")
            .arg("-c")
            .arg(bootstrap)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            EngineError::Load(format!("failed to start {}: {}", interpreter.display(), e))
        })?;
        let commands = child
            .stdin
            .take()
            .ok_or_else(|| EngineError::Load("interpreter stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EngineError::Load("interpreter stdout unavailable".to_string()))?;
        let mut replies = BufReader::new(stdout).lines();

        let handshake = tokio::time::timeout(HANDSHAKE_TIMEOUT, read_reply(&mut replies))
            .await
            .map_err(|_| EngineError::Load("interpreter did not answer the handshake".to_string()))?
            .map_err(|e| EngineError::Load(e.to_string()))?;
        let version = match handshake {
            EngineReply { ok: true, value: Some(version), .. } => version,
            other => {
                return Err(EngineError::Load(format!("unexpected handshake: {:?}", other)));
            }
        };

        log::debug!("Started {} (Python {})", interpreter.display(), version);
        Ok(Self {
            version,
            channel: Arc::new(Mutex::new(EngineChannel {
                _child: child,
                commands,
                replies,
            })),
        })
    }

    /// Sends one command and waits for its reply.
    ///
    /// The write and the matching read happen in a spawned task that owns the
    /// channel lock, so a caller that gives up mid-exchange cannot leave a
    /// reply unread for the next command.
    async fn request(&self, op: &str, source: &str) -> Result<Option<String>, EngineError> {
        let mut line = serde_json::to_string(&EngineCommand { op, source })?;
        line.push('\n');

        let channel = Arc::clone(&self.channel);
        let exchange = tokio::spawn(async move {
            let mut channel = channel.lock_owned().await;
            channel.commands.write_all(line.as_bytes()).await?;
            channel.commands.flush().await?;
            read_reply(&mut channel.replies).await
        });
        let reply = exchange
            .await
            .map_err(|e| EngineError::Protocol(format!("interpreter exchange aborted: {}", e)))??;

        if reply.ok {
            Ok(reply.value)
        } else {
            Err(EngineError::Exception(
                reply.error.unwrap_or_else(|| "Unknown error".to_string()),
            ))
        }
    }
}

async fn read_reply(replies: &mut Lines<BufReader<ChildStdout>>) -> Result<EngineReply, EngineError> {
    match replies.next_line().await? {
        Some(line) => Ok(serde_json::from_str(&line)?),
        None => Err(EngineError::Protocol("interpreter exited".to_string())),
    }
}

#[async_trait]
impl InterpreterEngine for PythonEngine {
    fn version(&self) -> &str {
        &self.version
    }

    async fn run_source(&self, source: &str) -> Result<(), EngineError> {
        self.request("exec", source).await.map(|_| ())
    }

    async fn evaluate(&self, expression: &str) -> Result<String, EngineError> {
        Ok(self.request("eval", expression).await?.unwrap_or_default())
    }
}

/// Finds a Python interpreter and starts a `PythonEngine` on it.
#[derive(Debug, Clone, Default)]
pub struct PythonEngineLoader {
    interpreter: Option<PathBuf>,
}

impl PythonEngineLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_interpreter(mut self, interpreter: impl Into<PathBuf>) -> Self {
        self.interpreter = Some(interpreter.into());
        self
    }

    fn locate(&self) -> Result<PathBuf, EngineError> {
        if let Some(path) = &self.interpreter {
            return which(path).map_err(|e| {
                EngineError::Load(format!("interpreter {} not usable: {}", path.display(), e))
            });
        }
        DEFAULT_CANDIDATES
            .iter()
            .find_map(|candidate| which(candidate).ok())
            .ok_or_else(|| EngineError::Load("no Python interpreter found on PATH".to_string()))
    }
}

#[async_trait]
impl EngineLoader for PythonEngineLoader {
    async fn load(&self) -> Result<Arc<dyn InterpreterEngine>, EngineError> {
        let path = self.locate()?;
        let engine = PythonEngine::spawn(&path).await?;
        Ok(Arc::new(engine))
    }
}
