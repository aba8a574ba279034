//! Live progress channel.
//!
//! The client opens `GET /job/{id}/ws` and sends `{"type":"ready"}`. The
//! server subscribes, replays the current snapshot, then forwards every
//! message until a terminal one, and closes.

use crate::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::IntoResponse,
};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use shelfwise_core::application::JobStateHub;
use shelfwise_core::domain::{ClientSignal, JobId, ProgressMessage};
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

/// How long the server waits for the ready signal
const READY_TIMEOUT: Duration = Duration::from_secs(10);

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(job_id): Path<String>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let job_id = JobId::new(job_id);
    ws.on_upgrade(move |socket| handle_socket(socket, state, job_id))
}

/// Outcome of delivering one message
enum Delivery {
    Sent,
    Terminal,
    Disconnected,
}

async fn handle_socket(socket: WebSocket, state: AppState, job_id: JobId) {
    let (mut sink, mut stream) = socket.split();
    let hub = state.processor.hub().clone();

    // First message must be the ready signal
    let ready = tokio::time::timeout(READY_TIMEOUT, stream.next()).await;
    let Ok(Some(Ok(Message::Text(first_msg)))) = ready else {
        debug!(job_id = %job_id, "Channel closed before ready signal");
        return;
    };
    if !matches!(serde_json::from_str::<ClientSignal>(&first_msg), Ok(ClientSignal::Ready)) {
        let _ = sink
            .send(Message::Text(r#"{"error":"first message must be ready"}"#.into()))
            .await;
        return;
    }

    // Subscribe before the snapshot so nothing published in between is lost
    let mut rx = hub.subscribe(&job_id);
    info!(job_id = %job_id, "Progress channel ready");

    let finished = match replay_snapshot(&hub, &job_id, &mut sink).await {
        Delivery::Sent => false,
        Delivery::Terminal | Delivery::Disconnected => true,
    };

    if !finished {
        loop {
            tokio::select! {
                received = rx.recv() => {
                    let delivery = match received {
                        Ok(message) => send(&mut sink, &message).await,
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(job_id = %job_id, skipped, "Progress channel lagged, replaying snapshot");
                            replay_snapshot(&hub, &job_id, &mut sink).await
                        }
                        Err(RecvError::Closed) => {
                            // Writer finished: the snapshot holds the terminal status
                            let _ = replay_snapshot(&hub, &job_id, &mut sink).await;
                            Delivery::Terminal
                        }
                    };
                    if !matches!(delivery, Delivery::Sent) {
                        break;
                    }
                }
                incoming = stream.next() => {
                    match incoming {
                        Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                        Some(Ok(_)) => {}
                    }
                }
            }
        }
    }

    let _ = sink.send(Message::Close(None)).await;
    drop(rx);
    hub.prune(&job_id);
    info!(job_id = %job_id, "Progress channel closed");
}

async fn replay_snapshot(
    hub: &JobStateHub,
    job_id: &JobId,
    sink: &mut SplitSink<WebSocket, Message>,
) -> Delivery {
    match hub.snapshot(job_id).await {
        Ok(Some(state)) => match state.to_message() {
            Some(message) => send(sink, &message).await,
            None => Delivery::Sent,
        },
        Ok(None) => Delivery::Sent,
        Err(e) => {
            warn!(job_id = %job_id, error = %e, "Snapshot read failed");
            Delivery::Sent
        }
    }
}

async fn send(sink: &mut SplitSink<WebSocket, Message>, message: &ProgressMessage) -> Delivery {
    let text = match serde_json::to_string(message) {
        Ok(text) => text,
        Err(e) => {
            warn!(job_id = %message.job_id(), error = %e, "Failed to encode progress message");
            return Delivery::Sent;
        }
    };

    if sink.send(Message::Text(text.into())).await.is_err() {
        return Delivery::Disconnected;
    }
    if message.is_terminal() {
        Delivery::Terminal
    } else {
        Delivery::Sent
    }
}
