//! Session manager.
//!
//! Drives the engine connection through its lifecycle. Every engine
//! connection is tagged with a generation; events arriving from an older
//! generation are dropped, so a torn-down connection can never schedule a
//! reconnect or flip the reported status.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, MutexGuard, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use chatbridge_core::{ConnectionStatus, Envelope, RelayEvent, normalize};

use super::state::{SessionSlot, SessionState};
use super::types::{SessionConfig, SessionError};
use crate::engine::{
    BatchKind, CloseReason, ConnectionUpdate, EngineEvent, SessionEngine,
};

/// Owns the single Session Engine connection.
///
/// Cheap to clone; all clones drive the same session.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

struct Inner {
    engine: Arc<dyn SessionEngine>,
    config: SessionConfig,
    events: mpsc::Sender<RelayEvent>,
    slot: Mutex<SessionSlot>,
}

impl SessionManager {
    /// Create a manager. Relay events are delivered on `events` in the order
    /// the engine raised the underlying notifications.
    pub fn new(
        engine: Arc<dyn SessionEngine>,
        config: SessionConfig,
        events: mpsc::Sender<RelayEvent>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                engine,
                config,
                events,
                slot: Mutex::new(SessionSlot::new()),
            }),
        }
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> SessionState {
        self.inner.slot.lock().await.state
    }

    /// Open an engine connection with any persisted credentials.
    ///
    /// No-op while a connection is already live. Cancels a pending reconnect.
    pub async fn connect(&self) -> Result<(), SessionError> {
        let generation = {
            let mut slot = self.inner.slot.lock().await;
            if slot.state.is_live() {
                debug!(state = %slot.state, "Session already live, ignoring connect");
                return Ok(());
            }
            slot.cancel_reconnect();
            slot.begin_connecting()
        };
        self.open(generation).await
    }

    /// Send a text message through the live engine connection.
    pub async fn send_message(&self, to: &str, text: &str) -> Result<(), SessionError> {
        let handle = self
            .inner
            .slot
            .lock()
            .await
            .handle
            .clone()
            .ok_or(SessionError::NotConnected)?;

        handle.send_text(to, text).await.map_err(SessionError::Send)?;
        debug!(to, "Message dispatched");
        Ok(())
    }

    /// Tear the session down without reporting a status change.
    ///
    /// Cancels any pending reconnect and handshake timer. Late events from
    /// the torn-down connection are ignored.
    pub async fn disconnect(&self) {
        let handle = {
            let mut slot = self.inner.slot.lock().await;
            slot.cancel_reconnect();
            slot.cancel_handshake();
            slot.generation += 1;
            slot.state = SessionState::Disconnected;
            slot.handle.take()
        };
        if let Some(handle) = handle {
            info!("Tearing down engine connection");
            handle.terminate().await;
        }
    }

    async fn open(&self, generation: u64) -> Result<(), SessionError> {
        let credentials = match self.inner.engine.load_credentials().await {
            Ok(credentials) => credentials,
            Err(e) => {
                self.abandon_connect(generation).await;
                return Err(e.into());
            }
        };
        info!(
            generation,
            has_credentials = credentials.is_some(),
            "Opening engine connection"
        );

        let connection = match self.inner.engine.connect(credentials).await {
            Ok(connection) => connection,
            Err(e) => {
                self.abandon_connect(generation).await;
                return Err(e.into());
            }
        };

        let mut slot = self.inner.slot.lock().await;
        if slot.generation != generation || slot.state != SessionState::Connecting {
            drop(slot);
            debug!(generation, "Session torn down while connecting, discarding connection");
            connection.handle.terminate().await;
            return Ok(());
        }
        slot.handle = Some(Arc::clone(&connection.handle));
        slot.handshake_timer = self.arm_handshake_timer(generation);
        drop(slot);

        self.spawn_event_pump(generation, connection.events);
        Ok(())
    }

    async fn abandon_connect(&self, generation: u64) {
        let mut slot = self.inner.slot.lock().await;
        if slot.generation == generation && slot.state == SessionState::Connecting {
            slot.state = SessionState::Disconnected;
        }
    }

    fn spawn_event_pump(&self, generation: u64, mut events: mpsc::Receiver<EngineEvent>) {
        let this = self.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if !this.handle_engine_event(generation, event).await {
                    debug!(generation, "Event pump superseded");
                    return;
                }
            }
            this.on_stream_end(generation).await;
        });
    }

    /// Apply one engine event. Returns `false` once the generation is stale.
    async fn handle_engine_event(&self, generation: u64, event: EngineEvent) -> bool {
        let mut slot = self.inner.slot.lock().await;
        if slot.generation != generation {
            debug!(generation, current = slot.generation, "Dropping stale engine event");
            return false;
        }

        match event {
            EngineEvent::PairingCode(code) => {
                if !slot.state.in_handshake() {
                    debug!(state = %slot.state, "Ignoring pairing code outside handshake");
                    return true;
                }
                slot.state = SessionState::AwaitingPairing;
                slot.cancel_handshake();
                slot.handshake_timer = self.arm_handshake_timer(generation);
                drop(slot);
                info!("Pairing code issued, scan it from Linked Devices on the phone");
                self.emit(RelayEvent::PairingCode { qr: code }).await;
            }
            EngineEvent::Connection(ConnectionUpdate::Open) => {
                if !slot.state.is_live() {
                    debug!(state = %slot.state, "Ignoring open outside a live session");
                    return true;
                }
                slot.cancel_handshake();
                slot.state = SessionState::Connected;
                drop(slot);
                info!("Session connected");
                self.emit(RelayEvent::status(ConnectionStatus::Connected)).await;
            }
            EngineEvent::Connection(ConnectionUpdate::Close(reason)) => {
                self.handle_close(slot, generation, reason).await;
            }
            EngineEvent::CredentialsChanged(credentials) => {
                drop(slot);
                if let Err(e) = self.inner.engine.save_credentials(&credentials).await {
                    error!(error = %e, "Failed to persist engine credentials");
                }
            }
            EngineEvent::InboundBatch { kind, envelopes } => {
                drop(slot);
                if kind == BatchKind::Notify {
                    self.forward_batch(&envelopes).await;
                } else {
                    debug!(?kind, count = envelopes.len(), "Skipping non-notify batch");
                }
            }
        }
        true
    }

    async fn forward_batch(&self, envelopes: &[Envelope]) {
        for envelope in envelopes {
            match normalize(envelope) {
                Some(message) => self.emit(RelayEvent::Message(message)).await,
                None => debug!(
                    id = %envelope.id,
                    kind = envelope.content.kind(),
                    "Envelope not surfaced"
                ),
            }
        }
    }

    async fn on_stream_end(&self, generation: u64) {
        let slot = self.inner.slot.lock().await;
        if slot.generation != generation || !slot.state.is_live() {
            return;
        }
        warn!(generation, "Engine event stream ended");
        self.handle_close(slot, generation, CloseReason::other("engine event stream ended"))
            .await;
    }

    /// Shared close path for engine closes, stream loss and handshake expiry.
    async fn handle_close(
        &self,
        mut slot: MutexGuard<'_, SessionSlot>,
        generation: u64,
        reason: CloseReason,
    ) {
        if !slot.state.is_live() {
            debug!(state = %slot.state, ?reason, "Ignoring close, no live connection");
            return;
        }

        let handle = slot.handle.take();
        slot.cancel_handshake();

        if reason.is_logged_out() {
            slot.state = SessionState::Disconnected;
            warn!("Session logged out, re-pair required");
        } else {
            let delay = self.inner.config.reconnect_delay;
            info!(
                status_code = ?reason.status_code(),
                ?reason,
                delay_secs = delay.as_secs(),
                "Connection closed, reconnect scheduled"
            );
            slot.state = SessionState::ReconnectPending;
            slot.reconnect_timer = Some(self.schedule_reconnect(generation, delay));
        }
        drop(slot);
        self.emit(RelayEvent::status(ConnectionStatus::Disconnected))
            .await;

        if let Some(handle) = handle {
            handle.terminate().await;
        }
    }

    fn schedule_reconnect(&self, generation: u64, delay: Duration) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            this.reconnect_due(generation).await;
        })
    }

    async fn reconnect_due(&self, scheduled_for: u64) {
        let generation = {
            let mut slot = self.inner.slot.lock().await;
            if slot.generation != scheduled_for || slot.state != SessionState::ReconnectPending {
                return;
            }
            // This task is the timer; release it without aborting.
            slot.reconnect_timer.take();
            slot.begin_connecting()
        };

        info!(generation, "Reconnecting");
        if let Err(e) = self.open(generation).await {
            warn!(error = %e, "Reconnect failed, retrying");
            let mut slot = self.inner.slot.lock().await;
            if slot.generation == generation && slot.state == SessionState::Disconnected {
                slot.state = SessionState::ReconnectPending;
                slot.reconnect_timer =
                    Some(self.schedule_reconnect(generation, self.inner.config.reconnect_delay));
            }
        }
    }

    fn arm_handshake_timer(&self, generation: u64) -> Option<JoinHandle<()>> {
        let timeout = self.inner.config.handshake_timeout?;
        let this = self.clone();
        Some(tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            this.handshake_expired(generation, timeout).await;
        }))
    }

    async fn handshake_expired(&self, generation: u64, timeout: Duration) {
        let mut slot = self.inner.slot.lock().await;
        if slot.generation != generation || !slot.state.in_handshake() {
            return;
        }
        // This task is the timer; release it without aborting.
        slot.handshake_timer.take();
        warn!(
            timeout_secs = timeout.as_secs(),
            state = %slot.state,
            "Engine handshake timed out"
        );
        self.handle_close(slot, generation, CloseReason::other("handshake timed out"))
            .await;
    }

    async fn emit(&self, event: RelayEvent) {
        if self.inner.events.send(event).await.is_err() {
            debug!("Relay event receiver dropped");
        }
    }
}
