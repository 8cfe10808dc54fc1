//! WebSocket consumer lifecycle, from upgrade through disconnect.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use chatbridge_core::{ProtocolError, RelayEvent};

use super::AppState;
use super::dispatch::handle_frame;
use crate::registry::{CONSUMER_QUEUE_CAPACITY, ConsumerConnection, Outbound};

/// Interval between server-initiated Ping frames.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// How long the writer may take to flush queued frames and the Close.
const CLOSE_FLUSH: Duration = Duration::from_secs(1);

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    // Held until the consumer task ends so shutdown can wait on it.
    let token = state.consumers.token();
    ws.on_upgrade(move |socket| async move {
        run_consumer(socket, state).await;
        drop(token);
    })
}

/// Serve one consumer until its socket closes.
async fn run_consumer(socket: WebSocket, state: AppState) {
    let (tx, rx) = mpsc::channel(CONSUMER_QUEUE_CAPACITY);
    let conn = state.registry.register(tx).await;
    if state.shutdown.is_cancelled() {
        conn.close();
    }
    serve_consumer(socket, Arc::clone(&conn), rx, &state).await;
    state.registry.unregister(&conn.id).await;
}

#[instrument(skip_all, fields(consumer_id = %conn.id))]
async fn serve_consumer(
    socket: WebSocket,
    conn: Arc<ConsumerConnection>,
    mut outbound: mpsc::Receiver<Outbound>,
    state: &AppState,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    let writer_conn = Arc::clone(&conn);
    let mut writer = tokio::spawn(async move {
        let mut ping_interval = tokio::time::interval(PING_INTERVAL);
        let _ = ping_interval.tick().await;

        loop {
            tokio::select! {
                item = outbound.recv() => match item {
                    Some(Outbound::Frame(frame)) => {
                        if ws_tx.send(Message::Text(String::clone(&frame).into())).await.is_err() {
                            break;
                        }
                    }
                    Some(Outbound::Close) | None => {
                        let _ = ws_tx.send(Message::Close(None)).await;
                        break;
                    }
                },
                _ = ping_interval.tick() => {
                    if ws_tx.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
            }
        }
        writer_conn.mark_closed();
    });

    loop {
        let msg = tokio::select! {
            msg = ws_rx.next() => match msg {
                Some(msg) => msg,
                None => break,
            },
            () = state.shutdown.cancelled() => {
                debug!("Relay shutting down, no further commands");
                break;
            }
        };
        let frame = match msg {
            Ok(Message::Text(text)) => Ok(text.as_str().to_owned()),
            Ok(Message::Binary(data)) => std::str::from_utf8(&data)
                .map(str::to_owned)
                .map_err(|_| ProtocolError::NotUtf8),
            Ok(Message::Close(_)) => {
                debug!("Consumer sent close frame");
                break;
            }
            Ok(Message::Ping(_) | Message::Pong(_)) => continue,
            Err(e) => {
                info!(error = %e, "Consumer socket error");
                break;
            }
        };

        if !conn.is_open() {
            debug!("Consumer closed, dropping command");
            break;
        }
        let answer = match frame {
            Ok(frame) => handle_frame(&frame, &state.session).await,
            Err(e) => {
                warn!(error = %e, "Rejected consumer frame");
                RelayEvent::error(e)
            }
        };
        if !conn.send_event(&answer) {
            debug!("Consumer gone before answer could be queued");
        }
    }

    conn.close();
    if tokio::time::timeout(CLOSE_FLUSH, &mut writer).await.is_err() {
        writer.abort();
    }
}
