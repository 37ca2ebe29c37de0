//! Workflow handler: validates the raw input, signs, fetches and wraps the
//! result in a uniform [`HandlerOutput`].

use serde_json::Value;

use crate::client::{BVID_KEY, VideoStatsClient};
use crate::error::{StatsError, StatsResult};
use crate::types::{HandlerInput, HandlerOutput, VideoStatFields};
use crate::wbi::RequestParams;

fn param_value(key: &str, value: Value) -> StatsResult<String> {
    match value {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(StatsError::validation(format!(
            "param '{}' must be a string, number or boolean, got {}",
            key,
            json_type(&other)
        ))),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn object_params(map: serde_json::Map<String, Value>) -> StatsResult<RequestParams> {
    map.into_iter()
        .map(|(key, value)| {
            let value = param_value(&key, value)?;
            Ok((key, value))
        })
        .collect()
}

/// Accept params as an object, a JSON-encoded object, or nothing.
pub fn parse_params(params: Option<Value>) -> StatsResult<RequestParams> {
    match params {
        None | Some(Value::Null) => {
            tracing::warn!("no params supplied, using an empty map");
            Ok(RequestParams::new())
        }
        Some(Value::Object(map)) => object_params(map),
        Some(Value::String(raw)) => {
            let parsed: Value = serde_json::from_str(&raw).map_err(|e| {
                StatsError::validation(format!("params string is not valid JSON: {}", e))
            })?;
            match parsed {
                Value::Object(map) => {
                    let params = object_params(map)?;
                    tracing::info!(?params, "parsed params from JSON string");
                    Ok(params)
                }
                other => Err(StatsError::validation(format!(
                    "params string must encode an object, got {}",
                    json_type(&other)
                ))),
            }
        }
        Some(other) => Err(StatsError::validation(format!(
            "params must be an object or a JSON string, got {}",
            json_type(&other)
        ))),
    }
}

fn required(value: Option<String>, name: &str) -> StatsResult<String> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| StatsError::validation(format!("{} must not be empty", name)))
}

impl VideoStatsClient {
    /// Run the handler and keep the typed error.
    pub async fn try_handle(&self, input: HandlerInput) -> StatsResult<VideoStatFields> {
        let mut params = parse_params(input.params)?;
        let cookie = required(input.cookie, "cookie")?;
        let bvid = required(input.bvid, BVID_KEY)?;

        params.insert(BVID_KEY.to_string(), bvid.clone());
        tracing::info!(?params, "generating WBI signature");
        let signature = self.signer.sign(params);

        self.fetch_stats(&cookie, &bvid, &signature).await
    }

    /// Run the handler. Failures never escape; they become `{fields: null, error}`.
    pub async fn handle(&self, input: HandlerInput) -> HandlerOutput {
        match self.try_handle(input).await {
            Ok(fields) => HandlerOutput::success(fields),
            Err(e) => {
                tracing::error!(error = %e, "video stats request failed");
                HandlerOutput::failure(e)
            }
        }
    }
}
