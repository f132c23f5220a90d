//! Result records and their extraction from producer rows.
//!
//! The producer writes candidates in several envelope shapes. This module
//! flattens them into [`ResultRecord`]s with stable identities and a
//! normalized field map. Anything that cannot be read is reported as
//! [`MalformedPayload`]: a bad payload loses the whole row, a bad list
//! member only itself.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::rows::ResultRow;
use crate::types::{JobId, ProjectId, RecordId, Timestamp};

/// Score assigned when the producer did not rate a candidate.
pub const DEFAULT_SCORE: i64 = 85;
pub const DEFAULT_CONTEXT: &str = "Identified by Agent";
pub const DEFAULT_ACTIVITY: &str = "N/A";
pub const UNKNOWN_NAME: &str = "Unknown";

/// Channel a record was observed through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Push,
    Poll,
    Recovery,
}

impl Channel {
    pub fn as_str(self) -> &'static str {
        match self {
            Channel::Push => "push",
            Channel::Poll => "poll",
            Channel::Recovery => "recovery",
        }
    }
}

/// One candidate in the result set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultRecord {
    pub id: RecordId,
    pub project_id: ProjectId,
    pub job_id: Option<JobId>,
    pub fields: Map<String, Value>,
    pub observed_via: Channel,
    pub observed_at: Timestamp,
    /// Server sequence of the producing write, when the row carries one.
    pub sequence: Option<i64>,
}

impl ResultRecord {
    /// Last-write-wins ordering between two observations of the same id.
    ///
    /// Differing server sequences decide when both sides carry one.
    /// Otherwise, including two copies of the same write, `observed_at`
    /// decides. Timestamp ties replace, so a re-delivery is accepted.
    pub fn supersedes(&self, existing: &ResultRecord) -> bool {
        match (self.sequence, existing.sequence) {
            (Some(incoming), Some(current)) if incoming != current => incoming > current,
            _ => self.observed_at >= existing.observed_at,
        }
    }

    pub fn name(&self) -> &str {
        self.fields
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or(UNKNOWN_NAME)
    }
}

/// A producer row whose payload could not be turned into records.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Malformed result payload in row {row_id}: {reason}")]
pub struct MalformedPayload {
    pub row_id: String,
    pub reason: String,
}

/// Records read from one row, plus the list members that were skipped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowRecords {
    pub records: Vec<ResultRecord>,
    pub rejected: Vec<MalformedPayload>,
}

/// Flatten a producer row into normalized records.
///
/// Candidate lists are looked up in order: `data.companies`, `companies`,
/// `data` as an array, then the payload itself as an array. List members
/// get the id `<row id>-<index>`; members that are not objects are
/// reported in [`RowRecords::rejected`] and the rest are kept. A bare
/// object payload is a single candidate identified by the row id.
pub fn records_from_row(
    row: &ResultRow,
    via: Channel,
    job_id: Option<JobId>,
) -> Result<RowRecords, MalformedPayload> {
    let malformed = |reason: &str| MalformedPayload {
        row_id: row.id.clone(),
        reason: reason.to_string(),
    };

    let make = |id: RecordId, candidate: &Map<String, Value>| ResultRecord {
        id,
        project_id: row.project_id,
        job_id,
        fields: normalize_fields(candidate),
        observed_via: via,
        observed_at: row.updated_at,
        sequence: row.seq,
    };

    if let Some(list) = candidate_list(&row.raw_data) {
        let mut out = RowRecords {
            records: Vec::with_capacity(list.len()),
            rejected: Vec::new(),
        };
        for (index, candidate) in list.iter().enumerate() {
            match candidate.as_object() {
                Some(candidate) => out.records.push(make(format!("{}-{index}", row.id), candidate)),
                None => out
                    .rejected
                    .push(malformed(&format!("candidate {index} is not an object"))),
            }
        }
        return Ok(out);
    }

    match &row.raw_data {
        Value::Object(candidate) if !candidate.is_empty() => Ok(RowRecords {
            records: vec![make(row.id.clone(), candidate)],
            rejected: Vec::new(),
        }),
        Value::Object(_) => Err(malformed("empty object")),
        Value::Null => Err(malformed("payload is null")),
        _ => Err(malformed("payload is neither an object nor a list")),
    }
}

fn candidate_list(raw: &Value) -> Option<&Vec<Value>> {
    raw.pointer("/data/companies")
        .and_then(Value::as_array)
        .or_else(|| raw.get("companies").and_then(Value::as_array))
        .or_else(|| raw.get("data").and_then(Value::as_array))
        .or_else(|| raw.as_array())
}

/// Map producer field names onto the record's canonical fields. Unknown
/// fields pass through untouched.
pub fn normalize_fields(candidate: &Map<String, Value>) -> Map<String, Value> {
    let mut fields = candidate.clone();

    let name = first_str(candidate, &["company_name", "name", "Company Name"])
        .unwrap_or(UNKNOWN_NAME)
        .to_string();
    fields.insert("name".into(), Value::String(name));

    if let Some(url) = first_str(candidate, &["url", "website", "URL"]) {
        fields.insert("url".into(), Value::String(with_scheme(url)));
    }

    let score = candidate
        .get("relevance_score")
        .and_then(score_value)
        .unwrap_or(DEFAULT_SCORE);
    fields.insert("score".into(), Value::from(score));

    let context = first_str(candidate, &["context", "reason_for_matching"])
        .unwrap_or(DEFAULT_CONTEXT)
        .to_string();
    fields.insert("context".into(), Value::String(context));

    if !matches!(fields.get("activity"), Some(Value::String(s)) if !s.is_empty()) {
        fields.insert("activity".into(), Value::String(DEFAULT_ACTIVITY.into()));
    }

    fields
}

fn first_str<'a>(candidate: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|k| candidate.get(*k).and_then(Value::as_str))
        .map(str::trim)
        .find(|s| !s.is_empty())
}

fn score_value(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
        Value::String(s) => s.trim().parse::<f64>().ok().map(|f| f.round() as i64),
        _ => None,
    }
}

fn with_scheme(url: &str) -> String {
    if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!("https://{url}")
    }
}
