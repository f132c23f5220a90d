//! Realtime channel protocol messages.
//!
//! The realtime server speaks Phoenix channels: every frame is a JSON
//! object with `topic`, `event`, `payload` and `ref`. Only the subset
//! needed to follow row changes on two tables is modelled here.

use radar_core::ports::{FeedEvent, FeedKind};
use radar_core::rows::{JobStatusRow, ResultRow};
use radar_core::types::ProjectId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const RESULTS_TABLE: &str = "radar_catch_all";
pub const STATUS_TABLE: &str = "radar_scans";

const EVENT_JOIN: &str = "phx_join";
const EVENT_REPLY: &str = "phx_reply";
const EVENT_ERROR: &str = "phx_error";
const EVENT_CLOSE: &str = "phx_close";
const EVENT_HEARTBEAT: &str = "heartbeat";
const EVENT_CHANGES: &str = "postgres_changes";
const PHOENIX_TOPIC: &str = "phoenix";

/// Channel topic for a project.
pub fn topic_for(project_id: ProjectId) -> String {
    format!("realtime:radar:{project_id}")
}

#[derive(Debug, Serialize)]
pub struct OutboundMessage {
    pub topic: String,
    pub event: &'static str,
    pub payload: Value,
    #[serde(rename = "ref")]
    pub reference: String,
}

impl OutboundMessage {
    /// Join a project's channel, following inserts and updates on both
    /// tables filtered to that project.
    pub fn join(project_id: ProjectId, access_token: &str, reference: u64) -> Self {
        let filter = format!("project_id=eq.{project_id}");
        let changes: Vec<Value> = [RESULTS_TABLE, STATUS_TABLE]
            .iter()
            .map(|table| {
                serde_json::json!({
                    "event": "*",
                    "schema": "public",
                    "table": table,
                    "filter": filter,
                })
            })
            .collect();

        Self {
            topic: topic_for(project_id),
            event: EVENT_JOIN,
            payload: serde_json::json!({
                "config": {
                    "broadcast": {"self": false},
                    "presence": {"key": ""},
                    "postgres_changes": changes,
                },
                "access_token": access_token,
            }),
            reference: reference.to_string(),
        }
    }

    pub fn heartbeat(reference: u64) -> Self {
        Self {
            topic: PHOENIX_TOPIC.to_string(),
            event: EVENT_HEARTBEAT,
            payload: serde_json::json!({}),
            reference: reference.to_string(),
        }
    }

    pub fn to_text(&self) -> String {
        // Serializing a struct of strings and JSON values cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
struct InboundFrame {
    #[serde(default)]
    topic: String,
    event: String,
    #[serde(default)]
    payload: Value,
    #[serde(rename = "ref", default)]
    reference: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChangeData {
    #[serde(rename = "type")]
    kind: String,
    table: String,
    #[serde(default)]
    record: Value,
}

/// A decoded inbound frame.
#[derive(Debug)]
pub enum RealtimeMessage {
    /// Reply to a request we sent, e.g. the join.
    Reply {
        topic: String,
        reference: Option<String>,
        ok: bool,
        detail: Value,
    },
    /// A row change on one of the followed tables.
    Change(FeedEvent),
    /// The server closed or errored the channel.
    ChannelClosed { topic: String, reason: String },
    /// Anything else (presence, system messages, deletes).
    Ignored(String),
}

#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    #[error("invalid frame: {0}")]
    Frame(#[from] serde_json::Error),

    #[error("unexpected {table} record: {reason}")]
    Record { table: String, reason: String },
}

/// Parse a raw text frame.
pub fn parse_message(text: &str) -> Result<RealtimeMessage, MessageError> {
    let frame: InboundFrame = serde_json::from_str(text)?;

    match frame.event.as_str() {
        EVENT_REPLY => {
            let ok = frame.payload.get("status").and_then(Value::as_str) == Some("ok");
            Ok(RealtimeMessage::Reply {
                topic: frame.topic,
                reference: frame.reference,
                ok,
                detail: frame.payload.get("response").cloned().unwrap_or(Value::Null),
            })
        }
        EVENT_ERROR | EVENT_CLOSE => Ok(RealtimeMessage::ChannelClosed {
            topic: frame.topic,
            reason: frame.event,
        }),
        EVENT_CHANGES => {
            let data: ChangeData = serde_json::from_value(
                frame.payload.get("data").cloned().unwrap_or(Value::Null),
            )?;
            parse_change(data)
        }
        other => Ok(RealtimeMessage::Ignored(other.to_string())),
    }
}

fn parse_change(data: ChangeData) -> Result<RealtimeMessage, MessageError> {
    let kind = match data.kind.as_str() {
        "INSERT" => FeedKind::Insert,
        "UPDATE" => FeedKind::Update,
        other => return Ok(RealtimeMessage::Ignored(format!("{}:{other}", data.table))),
    };

    let record_err = |e: serde_json::Error| MessageError::Record {
        table: data.table.clone(),
        reason: e.to_string(),
    };

    let event = match data.table.as_str() {
        RESULTS_TABLE => FeedEvent::Result {
            kind,
            row: serde_json::from_value::<ResultRow>(data.record.clone()).map_err(record_err)?,
        },
        STATUS_TABLE => FeedEvent::Status {
            kind,
            row: serde_json::from_value::<JobStatusRow>(data.record.clone())
                .map_err(record_err)?,
        },
        other => return Ok(RealtimeMessage::Ignored(format!("table {other}"))),
    };
    Ok(RealtimeMessage::Change(event))
}
