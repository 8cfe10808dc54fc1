//! Session Engine running as a sidecar child process.
//!
//! The sidecar speaks NDJSON over stdio (see `wire`). Each `connect()` spawns
//! a fresh process; its stdout becomes the connection's event stream.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{Mutex, mpsc, oneshot};
use tracing::{debug, error, info, warn};

use super::wire::{self, SidecarMessage};
use super::{
    CloseReason, ConnectionUpdate, Credentials, EngineConnection, EngineError, EngineEvent,
    EngineHandle, SessionEngine,
};

/// File inside the auth dir holding persisted credentials.
const CREDENTIALS_FILE: &str = "creds.json";

/// Pending send acknowledgements keyed by request id.
type PendingAcks = Arc<Mutex<HashMap<String, oneshot::Sender<Result<(), String>>>>>;

/// Configuration for the sidecar engine.
#[derive(Debug, Clone)]
pub struct ProcessEngineConfig {
    /// Engine executable.
    pub command: PathBuf,
    /// Extra arguments for `command`.
    pub args: Vec<String>,
    /// Authentication-state directory, shared with the engine.
    pub auth_dir: PathBuf,
    /// How long a send waits for its acknowledgement.
    pub send_timeout: Duration,
    /// Grace period before a terminating engine is killed.
    pub terminate_timeout: Duration,
}

impl ProcessEngineConfig {
    /// Create a config with default timeouts.
    pub fn new(command: PathBuf, auth_dir: PathBuf) -> Self {
        Self {
            command,
            args: Vec::new(),
            auth_dir,
            send_timeout: Duration::from_secs(30),
            terminate_timeout: Duration::from_secs(5),
        }
    }
}

/// Session Engine backed by a sidecar process.
pub struct ProcessEngine {
    config: ProcessEngineConfig,
}

impl ProcessEngine {
    pub const fn new(config: ProcessEngineConfig) -> Self {
        Self { config }
    }

    fn credentials_path(&self) -> PathBuf {
        self.config.auth_dir.join(CREDENTIALS_FILE)
    }
}

#[async_trait]
impl SessionEngine for ProcessEngine {
    async fn load_credentials(&self) -> Result<Option<Credentials>, EngineError> {
        let path = self.credentials_path();
        match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map(|value| Some(Credentials(value)))
                .map_err(|e| {
                    EngineError::Credentials(format!("Failed to parse {}: {e}", path.display()))
                }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save_credentials(&self, credentials: &Credentials) -> Result<(), EngineError> {
        let path = self.credentials_path();
        let tmp = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(&credentials.0)
            .map_err(|e| EngineError::Credentials(e.to_string()))?;

        tokio::fs::create_dir_all(&self.config.auth_dir).await?;
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;

        debug!(path = %path.display(), "Credentials persisted");
        Ok(())
    }

    #[allow(clippy::too_many_lines)]
    async fn connect(
        &self,
        credentials: Option<Credentials>,
    ) -> Result<EngineConnection, EngineError> {
        let mut cmd = Command::new(&self.config.command);
        cmd.args(&self.config.args)
            .env("AUTH_DIR", &self.config.auth_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        info!(
            command = %self.config.command.display(),
            auth_dir = %self.config.auth_dir.display(),
            has_credentials = credentials.is_some(),
            "Spawning engine process"
        );
        let mut child = cmd.spawn().map_err(|e| EngineError::Spawn {
            reason: e.to_string(),
        })?;

        let process_id = uuid::Uuid::new_v4().to_string();

        let stdin = child.stdin.take().ok_or_else(|| EngineError::Spawn {
            reason: "Failed to capture stdin".to_string(),
        })?;
        let stdout = child.stdout.take().ok_or_else(|| EngineError::Spawn {
            reason: "Failed to capture stdout".to_string(),
        })?;

        // Stdin writer
        let (stdin_tx, mut stdin_rx) = mpsc::channel::<String>(32);
        tokio::spawn(async move {
            let mut stdin = stdin;
            while let Some(line) = stdin_rx.recv().await {
                if let Err(e) = stdin.write_all(line.as_bytes()).await {
                    error!("Failed to write to engine stdin: {}", e);
                    break;
                }
                if let Err(e) = stdin.write_all(b"\n").await {
                    error!("Failed to write newline: {}", e);
                    break;
                }
                if let Err(e) = stdin.flush().await {
                    error!("Failed to flush engine stdin: {}", e);
                    break;
                }
            }
        });

        // Stdout reader: events in engine order, acks resolved in place
        let (events_tx, events_rx) = mpsc::channel::<EngineEvent>(64);
        let pending: PendingAcks = Arc::new(Mutex::new(HashMap::new()));
        let reader_pending = Arc::clone(&pending);
        let pid = process_id.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                match wire::parse_line(&line) {
                    Ok(SidecarMessage::Event(event)) => {
                        if events_tx.send(event).await.is_err() {
                            debug!(process_id = %pid, "Event receiver dropped");
                            break;
                        }
                    }
                    Ok(SidecarMessage::Ack { request_id, error }) => {
                        let waiter = reader_pending.lock().await.remove(&request_id);
                        match waiter {
                            Some(tx) => {
                                let _ = tx.send(error.map_or(Ok(()), Err));
                            }
                            None => debug!(process_id = %pid, request_id, "Ack for unknown request"),
                        }
                    }
                    Ok(SidecarMessage::Unknown { msg_type }) => {
                        debug!(process_id = %pid, msg_type, "Ignoring unknown engine line");
                    }
                    Err(e) => warn!(process_id = %pid, error = %e, "Unparseable engine line"),
                }
            }

            // Outstanding sends can no longer be acknowledged.
            reader_pending.lock().await.clear();
            let _ = events_tx
                .send(EngineEvent::Connection(ConnectionUpdate::Close(
                    CloseReason::other("engine process exited"),
                )))
                .await;
            info!(process_id = %pid, "Engine stdout reader finished");
        });

        if let Some(stderr) = child.stderr.take() {
            let pid_err = process_id.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    warn!(process_id = %pid_err, "engine stderr: {}", line);
                }
            });
        }

        let auth_dir = self.config.auth_dir.to_string_lossy();
        stdin_tx
            .send(wire::connect_line(&auth_dir, credentials.as_ref()))
            .await
            .map_err(|_| EngineError::Closed)?;

        let handle = SidecarHandle {
            process_id,
            stdin_tx,
            pending,
            child: Mutex::new(Some(child)),
            send_timeout: self.config.send_timeout,
            terminate_timeout: self.config.terminate_timeout,
        };

        Ok(EngineConnection {
            handle: Arc::new(handle),
            events: events_rx,
        })
    }
}

/// Handle to one running sidecar process.
struct SidecarHandle {
    process_id: String,
    stdin_tx: mpsc::Sender<String>,
    pending: PendingAcks,
    child: Mutex<Option<Child>>,
    send_timeout: Duration,
    terminate_timeout: Duration,
}

#[async_trait]
impl EngineHandle for SidecarHandle {
    async fn send_text(&self, to: &str, text: &str) -> Result<(), EngineError> {
        let request_id = uuid::Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(request_id.clone(), tx);

        if self
            .stdin_tx
            .send(wire::send_line(&request_id, to, text))
            .await
            .is_err()
        {
            self.pending.lock().await.remove(&request_id);
            return Err(EngineError::Closed);
        }

        match tokio::time::timeout(self.send_timeout, rx).await {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(cause))) => Err(EngineError::Rejected(cause)),
            Ok(Err(_)) => Err(EngineError::Closed),
            Err(_) => {
                self.pending.lock().await.remove(&request_id);
                Err(EngineError::Timeout(self.send_timeout))
            }
        }
    }

    async fn terminate(&self) {
        let Some(mut child) = self.child.lock().await.take() else {
            return;
        };
        let process_id = self.process_id.as_str();
        debug!(process_id, "Terminating engine process");

        if self.stdin_tx.send(wire::terminate_line()).await.is_err() {
            debug!(process_id, "Engine stdin already closed");
        }

        match tokio::time::timeout(self.terminate_timeout, child.wait()).await {
            Ok(Ok(status)) => info!(process_id, ?status, "Engine exited gracefully"),
            Ok(Err(e)) => {
                warn!(process_id, error = %e, "Error waiting for engine");
                child.kill().await.ok();
            }
            Err(_) => {
                warn!(process_id, "Timeout waiting for engine shutdown, killing");
                child.kill().await.ok();
            }
        }
    }
}
