//! HTTP client for the scan backend's remote functions.
//!
//! Every function is a `POST {api_url}/functions/v1/<name>` with a JSON
//! body and a bearer token. Functions answer with a JSON envelope that
//! may carry `success: false` and an `error` string even on a 2xx.

use std::collections::BTreeMap;

use async_trait::async_trait;
use radar_core::error::RemoteError;
use radar_core::interaction::{
    FeedbackAction, RecalibrationMode, RecalibrationOutcome, RippleResult,
};
use radar_core::ports::{
    AccessToken, CompileRequest, CompiledStrategy, DispatchAck, FeedbackRequest, JobCheck,
    RadarFunctions,
};
use radar_core::types::{ProjectId, UserId};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;

const FN_STRATEGIZE: &str = "strategize-radar";
const FN_EXECUTE: &str = "execute-radar";
const FN_CHECK: &str = "check-firecrawl";
const FN_RECALIBRATE_POOL: &str = "recalibrate-pool";
const FN_RECALIBRATE_RADAR: &str = "recalibrate-radar";

/// HTTP client for the remote functions of one backend.
pub struct EdgeFunctionsClient {
    client: reqwest::Client,
    api_url: String,
    anon_key: String,
}

// ---- wire shapes ----

#[derive(Debug, Deserialize)]
struct StrategizeResponse {
    #[serde(default)]
    identity: Value,
    #[serde(default)]
    strategy: Option<StrategyBody>,
    #[serde(default)]
    fallback_mode: bool,
}

#[derive(Debug, Deserialize)]
struct StrategyBody {
    #[serde(default)]
    queries: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ExecuteResponse {
    #[serde(default = "default_true")]
    success: bool,
    #[serde(default)]
    recovered: bool,
}

#[derive(Debug, Deserialize)]
struct CheckResponse {
    #[serde(default)]
    done: bool,
    #[serde(default)]
    inserted: u64,
}

#[derive(Debug, Deserialize)]
struct PoolResponse {
    result: RippleWire,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RippleWire {
    action: String,
    #[serde(default)]
    affected_attributes: Vec<String>,
    #[serde(default)]
    adjusted_weights: BTreeMap<String, f64>,
    #[serde(default)]
    companies_removed: u32,
    #[serde(default)]
    companies_affected: Vec<String>,
    #[serde(default)]
    new_search_suggestion: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecalibrateResponse {
    mode: String,
    #[serde(default)]
    mode_reason: String,
    #[serde(default)]
    learned_insights: Vec<String>,
}

fn default_true() -> bool {
    true
}

impl EdgeFunctionsClient {
    pub fn new(api_url: String, anon_key: String) -> Self {
        Self::with_client(reqwest::Client::new(), api_url, anon_key)
    }

    /// Reuse an existing [`reqwest::Client`] (shared pool, timeouts).
    pub fn with_client(client: reqwest::Client, api_url: String, anon_key: String) -> Self {
        Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            anon_key,
        }
    }

    fn function_url(&self, name: &str) -> String {
        format!("{}/functions/v1/{name}", self.api_url)
    }

    /// Invoke one function and decode its envelope into `T`.
    async fn invoke<T: serde::de::DeserializeOwned>(
        &self,
        token: &AccessToken,
        name: &str,
        body: Value,
    ) -> Result<T, RemoteError> {
        let response = self
            .client
            .post(self.function_url(name))
            .bearer_auth(token.as_str())
            .header("apikey", &self.anon_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| RemoteError::Unavailable(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| RemoteError::Unavailable(e.to_string()))?;

        tracing::debug!(function = name, status = status.as_u16(), "Remote function answered");

        let value = unwrap_envelope(status, &text)?;
        serde_json::from_value(value).map_err(|e| RemoteError::Decode(format!("{name}: {e}")))
    }
}

/// Turn a status and raw body into the JSON payload or a [`RemoteError`].
fn unwrap_envelope(status: StatusCode, text: &str) -> Result<Value, RemoteError> {
    if status == StatusCode::UNAUTHORIZED {
        return Err(RemoteError::SessionExpired);
    }

    let parsed: Option<Value> = serde_json::from_str(text).ok();

    if !status.is_success() {
        return Err(RemoteError::Rejected {
            status: status.as_u16(),
            body: error_text(parsed.as_ref(), text),
        });
    }

    let value = parsed.ok_or_else(|| RemoteError::Decode(format!("body is not JSON: {text}")))?;
    if value.get("success").and_then(Value::as_bool) == Some(false) {
        return Err(RemoteError::Rejected {
            status: status.as_u16(),
            body: error_text(Some(&value), text),
        });
    }
    Ok(value)
}

/// The envelope's `error` string, or the raw body when there is none.
fn error_text(parsed: Option<&Value>, raw: &str) -> String {
    parsed
        .and_then(|v| v.get("error"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| raw.to_string())
}

fn ripple_from_wire(wire: RippleWire) -> Result<RippleResult, RemoteError> {
    let action = match wire.action.as_str() {
        "exclude" => FeedbackAction::Reject,
        "validate" => FeedbackAction::Accept,
        other => return Err(RemoteError::Decode(format!("unknown ripple action {other:?}"))),
    };
    Ok(RippleResult {
        action,
        affected_parameters: wire.affected_attributes,
        parameter_deltas: wire.adjusted_weights,
        records_removed: wire.companies_removed,
        removed_record_ids: wire.companies_affected,
        new_search_suggestion: wire.new_search_suggestion.filter(|s| !s.is_empty()),
    })
}

fn mode_from_wire(mode: &str) -> Result<RecalibrationMode, RemoteError> {
    match mode {
        "expansion" => Ok(RecalibrationMode::Expansion),
        "pivot" => Ok(RecalibrationMode::Pivot),
        other => Err(RemoteError::Decode(format!("unknown recalibration mode {other:?}"))),
    }
}

#[async_trait]
impl RadarFunctions for EdgeFunctionsClient {
    async fn compile_strategy(
        &self,
        token: &AccessToken,
        request: &CompileRequest,
    ) -> Result<CompiledStrategy, RemoteError> {
        let body = serde_json::json!({
            "projectId": request.project_id,
            "force_analyze": request.force_refresh,
            "weights": request.parameters.weights(),
        });
        let response: StrategizeResponse = self.invoke(token, FN_STRATEGIZE, body).await?;
        Ok(CompiledStrategy {
            identity: response.identity,
            queries: response.strategy.map(|s| s.queries).unwrap_or_default(),
            fallback_mode: response.fallback_mode,
        })
    }

    async fn dispatch_job(
        &self,
        token: &AccessToken,
        project_id: ProjectId,
        approved_queries: &[String],
    ) -> Result<DispatchAck, RemoteError> {
        let body = serde_json::json!({
            "projectId": project_id,
            "approved_queries": approved_queries,
        });
        let response: ExecuteResponse = self.invoke(token, FN_EXECUTE, body).await?;
        Ok(DispatchAck {
            accepted: response.success,
            recovered: response.recovered,
        })
    }

    async fn check_job_status(
        &self,
        token: &AccessToken,
        project_id: ProjectId,
    ) -> Result<JobCheck, RemoteError> {
        let body = serde_json::json!({ "projectId": project_id });
        let response: CheckResponse = self.invoke(token, FN_CHECK, body).await?;
        Ok(JobCheck {
            done: response.done,
            inserted_count: response.inserted,
        })
    }

    async fn submit_feedback(
        &self,
        token: &AccessToken,
        request: &FeedbackRequest,
    ) -> Result<RippleResult, RemoteError> {
        let body = serde_json::json!({
            "projectId": request.project_id,
            "companyId": request.record_id,
            "action": request.action.wire_name(),
            "userId": request.user_id,
        });
        let response: PoolResponse = self.invoke(token, FN_RECALIBRATE_POOL, body).await?;
        ripple_from_wire(response.result)
    }

    async fn recalibrate(
        &self,
        token: &AccessToken,
        project_id: ProjectId,
        user_id: UserId,
        force_fresh_start: bool,
    ) -> Result<RecalibrationOutcome, RemoteError> {
        let body = serde_json::json!({
            "projectId": project_id,
            "userId": user_id,
            "force_fresh_start": force_fresh_start,
        });
        let response: RecalibrateResponse =
            self.invoke(token, FN_RECALIBRATE_RADAR, body).await?;
        Ok(RecalibrationOutcome {
            mode: mode_from_wire(&response.mode)?,
            mode_reason: response.mode_reason,
            learned_insights: response.learned_insights,
        })
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn unauthorized_maps_to_session_expired() {
        assert_matches!(
            unwrap_envelope(StatusCode::UNAUTHORIZED, "{}"),
            Err(RemoteError::SessionExpired)
        );
    }

    #[test]
    fn server_error_carries_error_text() {
        let err = unwrap_envelope(
            StatusCode::INTERNAL_SERVER_ERROR,
            r#"{"success":false,"error":"quota exceeded"}"#,
        )
        .unwrap_err();
        assert_eq!(
            err,
            RemoteError::Rejected {
                status: 500,
                body: "quota exceeded".into()
            }
        );
    }

    #[test]
    fn success_false_on_200_is_rejected() {
        assert_matches!(
            unwrap_envelope(StatusCode::OK, r#"{"success":false,"error":"Company not found"}"#),
            Err(RemoteError::Rejected { status: 200, body }) if body == "Company not found"
        );
    }

    #[test]
    fn non_json_success_is_decode_error() {
        assert_matches!(
            unwrap_envelope(StatusCode::OK, "ok"),
            Err(RemoteError::Decode(_))
        );
    }

    #[test]
    fn execute_response_defaults() {
        let value = unwrap_envelope(StatusCode::OK, r#"{"success":true,"recovered":true}"#).unwrap();
        let parsed: ExecuteResponse = serde_json::from_value(value).unwrap();
        assert!(parsed.success && parsed.recovered);

        let parsed: ExecuteResponse =
            serde_json::from_value(serde_json::json!({"message": "started"})).unwrap();
        assert!(parsed.success && !parsed.recovered);
    }

    #[test]
    fn ripple_wire_maps_to_domain() {
        let wire: RippleWire = serde_json::from_value(serde_json::json!({
            "action": "exclude",
            "affectedAttributes": ["legal"],
            "adjustedWeights": {"legal": -15},
            "companiesRemoved": 2,
            "companiesAffected": ["a-0", "a-1"],
            "newSearchSuggestion": ""
        }))
        .unwrap();
        let ripple = ripple_from_wire(wire).unwrap();
        assert_eq!(ripple.action, FeedbackAction::Reject);
        assert_eq!(ripple.parameter_deltas["legal"], -15.0);
        assert_eq!(ripple.removed_record_ids, vec!["a-0", "a-1"]);
        assert_eq!(ripple.new_search_suggestion, None);
    }

    #[test]
    fn unknown_modes_and_actions_are_decode_errors() {
        assert_matches!(mode_from_wire("sideways"), Err(RemoteError::Decode(_)));
        assert_eq!(mode_from_wire("pivot").unwrap(), RecalibrationMode::Pivot);
        let wire: RippleWire = serde_json::from_value(serde_json::json!({"action": "maybe"})).unwrap();
        assert_matches!(ripple_from_wire(wire), Err(RemoteError::Decode(_)));
    }

    #[test]
    fn function_urls() {
        let api = EdgeFunctionsClient::new("https://x.supabase.co/".into(), "key".into());
        assert_eq!(
            api.function_url(FN_CHECK),
            "https://x.supabase.co/functions/v1/check-firecrawl"
        );
    }
}
