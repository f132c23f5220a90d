//! Change feed over the realtime WebSocket.
//!
//! [`RealtimeFeed::subscribe`] opens a socket, joins the project's
//! channel, and hands back a [`FeedSubscription`]. A spawned session
//! task forwards row changes into the subscription and keeps the socket
//! alive with heartbeats. When the socket closes or errors, the task
//! ends and the subscription's stream ends with it; resubscribing is
//! the caller's job.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use radar_core::error::FeedError;
use radar_core::ports::{ChangeFeed, FeedEvent, FeedSubscription, SessionProvider};
use radar_core::types::ProjectId;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::messages::{parse_message, topic_for, OutboundMessage, RealtimeMessage};

/// Buffered feed events per subscription.
const FEED_CHANNEL_CAPACITY: usize = 256;

/// How long to wait for the server to accept a join.
const JOIN_TIMEOUT: Duration = Duration::from_secs(10);

type Socket = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Realtime change feed for the scan tables.
pub struct RealtimeFeed {
    url: String,
    session: Arc<dyn SessionProvider>,
    heartbeat_interval: Duration,
}

impl RealtimeFeed {
    pub fn new(url: String, session: Arc<dyn SessionProvider>, heartbeat_interval: Duration) -> Self {
        Self {
            url,
            session,
            heartbeat_interval,
        }
    }
}

#[async_trait]
impl ChangeFeed for RealtimeFeed {
    async fn subscribe(&self, project_id: ProjectId) -> Result<FeedSubscription, FeedError> {
        let token = self
            .session
            .access_token()
            .await
            .map_err(|e| FeedError::Connection(format!("no access token: {e}")))?;

        let (mut ws, _response) = connect_async(self.url.as_str())
            .await
            .map_err(|e| FeedError::Connection(format!("Failed to connect to realtime: {e}")))?;

        let join = OutboundMessage::join(project_id, token.as_str(), 1);
        ws.send(Message::Text(join.to_text()))
            .await
            .map_err(|e| FeedError::Connection(e.to_string()))?;

        let topic = topic_for(project_id);
        tokio::time::timeout(JOIN_TIMEOUT, await_join(&mut ws, &topic))
            .await
            .map_err(|_| FeedError::Protocol("timed out waiting for join reply".into()))??;

        tracing::info!(%project_id, topic = %topic, "Subscribed to realtime changes");

        let (tx, rx) = mpsc::channel(FEED_CHANNEL_CAPACITY);
        tokio::spawn(run_session(ws, topic, project_id, tx, self.heartbeat_interval));
        Ok(FeedSubscription::new(rx))
    }
}

/// Read frames until the join for `topic` is acknowledged.
async fn await_join(ws: &mut Socket, topic: &str) -> Result<(), FeedError> {
    while let Some(frame) = ws.next().await {
        let frame = frame.map_err(|e| FeedError::Connection(e.to_string()))?;
        let Message::Text(text) = frame else {
            continue;
        };
        match parse_message(&text) {
            Ok(RealtimeMessage::Reply {
                topic: reply_topic,
                ok,
                detail,
                ..
            }) if reply_topic == topic => {
                return if ok {
                    Ok(())
                } else {
                    Err(FeedError::Protocol(format!("join refused: {detail}")))
                };
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(error = %e, raw_message = %text, "Failed to parse realtime message");
            }
        }
    }
    Err(FeedError::Connection("socket closed before join reply".into()))
}

/// Forward changes to the subscriber and keep the socket alive.
async fn run_session(
    mut ws: Socket,
    topic: String,
    project_id: ProjectId,
    tx: mpsc::Sender<FeedEvent>,
    heartbeat_interval: Duration,
) {
    let mut heartbeat = tokio::time::interval(heartbeat_interval);
    heartbeat.tick().await;
    let mut reference: u64 = 1;

    loop {
        tokio::select! {
            _ = tx.closed() => {
                tracing::debug!(%project_id, "Feed subscriber dropped; closing socket");
                let _ = ws.close(None).await;
                break;
            }
            _ = heartbeat.tick() => {
                reference += 1;
                let beat = OutboundMessage::heartbeat(reference);
                if let Err(e) = ws.send(Message::Text(beat.to_text())).await {
                    tracing::warn!(%project_id, error = %e, "Heartbeat failed");
                    break;
                }
            }
            frame = ws.next() => {
                let Some(frame) = frame else {
                    tracing::info!(%project_id, "Realtime stream ended");
                    break;
                };
                match frame {
                    Ok(Message::Text(text)) => {
                        if !handle_text_message(&text, &topic, project_id, &tx).await {
                            break;
                        }
                    }
                    Ok(Message::Binary(_)) => {
                        tracing::trace!(%project_id, "Ignoring binary frame");
                    }
                    Ok(Message::Ping(_) | Message::Pong(_)) => {
                        // Handled automatically by tungstenite.
                    }
                    Ok(Message::Close(frame)) => {
                        tracing::info!(%project_id, ?frame, "Realtime socket closed");
                        break;
                    }
                    Ok(Message::Frame(_)) => {}
                    Err(e) => {
                        tracing::error!(%project_id, error = %e, "Realtime receive error");
                        break;
                    }
                }
            }
        }
    }
}

/// Returns `false` when the session should end.
async fn handle_text_message(
    text: &str,
    topic: &str,
    project_id: ProjectId,
    tx: &mpsc::Sender<FeedEvent>,
) -> bool {
    match parse_message(text) {
        Ok(RealtimeMessage::Change(event)) => {
            if !belongs_to(&event, project_id) {
                tracing::debug!(%project_id, "Dropping change for another project");
                return true;
            }
            tx.send(event).await.is_ok()
        }
        Ok(RealtimeMessage::ChannelClosed {
            topic: closed,
            reason,
        }) if closed == topic => {
            tracing::warn!(%project_id, reason = %reason, "Realtime channel closed by server");
            false
        }
        Ok(RealtimeMessage::Reply { ok: false, detail, .. }) => {
            tracing::warn!(%project_id, %detail, "Realtime request refused");
            true
        }
        Ok(_) => true,
        Err(e) => {
            tracing::warn!(
                %project_id,
                error = %e,
                raw_message = %text,
                "Failed to parse realtime message",
            );
            true
        }
    }
}

fn belongs_to(event: &FeedEvent, project_id: ProjectId) -> bool {
    match event {
        FeedEvent::Result { row, .. } => row.project_id == project_id,
        FeedEvent::Status { row, .. } => row.project_id == project_id,
    }
}
