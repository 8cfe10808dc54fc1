//! Scripted Session Engine for unit tests.

#![allow(clippy::unwrap_used)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{Credentials, EngineConnection, EngineError, EngineEvent, EngineHandle, SessionEngine};

#[derive(Default)]
struct Script {
    connects: usize,
    failing_connects: usize,
    stored: Option<Credentials>,
    saved: Vec<Credentials>,
    event_txs: Vec<mpsc::Sender<EngineEvent>>,
    sends: Vec<(String, String)>,
    send_failure: Option<String>,
    terminations: usize,
}

/// Engine whose connections are driven by the test.
#[derive(Clone, Default)]
pub(crate) struct ScriptedEngine {
    script: Arc<Mutex<Script>>,
}

impl ScriptedEngine {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_credentials(credentials: Credentials) -> Self {
        let engine = Self::new();
        engine.script.lock().unwrap().stored = Some(credentials);
        engine
    }

    pub(crate) fn connect_count(&self) -> usize {
        self.script.lock().unwrap().connects
    }

    pub(crate) fn fail_next_connects(&self, n: usize) {
        self.script.lock().unwrap().failing_connects = n;
    }

    pub(crate) fn fail_sends_with(&self, cause: &str) {
        self.script.lock().unwrap().send_failure = Some(cause.to_string());
    }

    pub(crate) fn sends(&self) -> Vec<(String, String)> {
        self.script.lock().unwrap().sends.clone()
    }

    pub(crate) fn saved_credentials(&self) -> Vec<Credentials> {
        self.script.lock().unwrap().saved.clone()
    }

    pub(crate) fn terminations(&self) -> usize {
        self.script.lock().unwrap().terminations
    }

    /// Raise an event on the most recent connection.
    pub(crate) async fn emit(&self, event: EngineEvent) {
        let tx = self.script.lock().unwrap().event_txs.last().cloned();
        if let Some(tx) = tx {
            let _ = tx.send(event).await;
        }
    }

    /// Raise an event on the connection opened `index`-th (0-based).
    pub(crate) async fn emit_on(&self, index: usize, event: EngineEvent) {
        let tx = self.script.lock().unwrap().event_txs.get(index).cloned();
        if let Some(tx) = tx {
            let _ = tx.send(event).await;
        }
    }
}

#[async_trait]
impl SessionEngine for ScriptedEngine {
    async fn load_credentials(&self) -> Result<Option<Credentials>, EngineError> {
        Ok(self.script.lock().unwrap().stored.clone())
    }

    async fn save_credentials(&self, credentials: &Credentials) -> Result<(), EngineError> {
        let mut script = self.script.lock().unwrap();
        script.stored = Some(credentials.clone());
        script.saved.push(credentials.clone());
        Ok(())
    }

    async fn connect(
        &self,
        _credentials: Option<Credentials>,
    ) -> Result<EngineConnection, EngineError> {
        let mut script = self.script.lock().unwrap();
        script.connects += 1;
        if script.failing_connects > 0 {
            script.failing_connects -= 1;
            return Err(EngineError::Spawn {
                reason: "scripted failure".into(),
            });
        }
        let (tx, rx) = mpsc::channel(64);
        script.event_txs.push(tx);
        drop(script);

        Ok(EngineConnection {
            handle: Arc::new(ScriptedHandle {
                script: Arc::clone(&self.script),
            }),
            events: rx,
        })
    }
}

struct ScriptedHandle {
    script: Arc<Mutex<Script>>,
}

#[async_trait]
impl EngineHandle for ScriptedHandle {
    async fn send_text(&self, to: &str, text: &str) -> Result<(), EngineError> {
        let mut script = self.script.lock().unwrap();
        script.sends.push((to.to_string(), text.to_string()));
        match &script.send_failure {
            Some(cause) => Err(EngineError::Rejected(cause.clone())),
            None => Ok(()),
        }
    }

    async fn terminate(&self) {
        self.script.lock().unwrap().terminations += 1;
    }
}
