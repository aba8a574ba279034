//! WebSocket progress channel (`GET /job/{id}/ws`)

use crate::error::{ClientError, Result};
use crate::transport::{ChannelEvent, LiveChannel};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use shelfwise_core::domain::{ClientSignal, JobId, ProgressMessage};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, warn};

const EVENT_BUFFER: usize = 64;

pub struct WebSocketChannel {
    /// `ws://host:port`, without a trailing slash
    base_ws_url: String,
}

impl WebSocketChannel {
    pub fn new(base_ws_url: impl Into<String>) -> Self {
        Self {
            base_ws_url: base_ws_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Derive the channel base from an `http(s)://` API base URL
    pub fn from_http_base(base_url: &str) -> Self {
        let base = base_url
            .replacen("https://", "wss://", 1)
            .replacen("http://", "ws://", 1);
        Self::new(base)
    }

    fn url(&self, job_id: &JobId) -> String {
        format!("{}/job/{}/ws", self.base_ws_url, job_id)
    }
}

#[async_trait]
impl LiveChannel for WebSocketChannel {
    async fn open(&self, job_id: &JobId) -> Result<mpsc::Receiver<ChannelEvent>> {
        let url = self.url(job_id);
        let (ws_stream, _) = connect_async(&url)
            .await
            .map_err(|e| ClientError::Connection(format!("channel connect failed: {}", e)))?;
        let (mut sink, mut stream) = ws_stream.split();

        let ready = serde_json::to_string(&ClientSignal::Ready)?;
        sink.send(Message::Text(ready.into()))
            .await
            .map_err(|e| ClientError::Connection(format!("ready signal failed: {}", e)))?;
        debug!(job_id = %job_id, "Channel open, ready sent");

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let job_id = job_id.clone();
        tokio::spawn(async move {
            loop {
                let frame = tokio::select! {
                    frame = stream.next() => frame,
                    // Receiver dropped: the selector abandoned this channel
                    _ = tx.closed() => break,
                };

                let event = match frame {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ProgressMessage>(&text) {
                            Ok(message) => ChannelEvent::Message(message),
                            Err(e) => {
                                warn!(job_id = %job_id, error = %e, "Undecodable channel frame");
                                ChannelEvent::Closed(format!("undecodable frame: {}", e))
                            }
                        }
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        let _ = sink.send(Message::Pong(payload)).await;
                        continue;
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        ChannelEvent::Closed("server closed the channel".to_string())
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => ChannelEvent::Closed(format!("channel error: {}", e)),
                };

                let last = matches!(event, ChannelEvent::Closed(_));
                if tx.send(event).await.is_err() || last {
                    break;
                }
            }
            let _ = sink.close().await;
        });

        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_from_http_base() {
        let channel = WebSocketChannel::from_http_base("http://127.0.0.1:8787/");
        assert_eq!(channel.url(&JobId::new("j1")), "ws://127.0.0.1:8787/job/j1/ws");

        let channel = WebSocketChannel::from_http_base("https://shelf.example");
        assert_eq!(channel.url(&JobId::new("j2")), "wss://shelf.example/job/j2/ws");
    }

    #[tokio::test]
    async fn test_connect_refused_is_connection_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let channel = WebSocketChannel::new(format!("ws://127.0.0.1:{}", port));
        assert!(matches!(
            channel.open(&JobId::new("j1")).await,
            Err(ClientError::Connection(_))
        ));
    }
}
