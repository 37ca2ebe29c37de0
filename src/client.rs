use std::time::Duration;

use serde_json::Value;
use url::Url;
use wreq::{Client, header};
use wreq_util::Emulation;

use crate::error::{StatsError, StatsResult};
use crate::normalize::video_stat_fields;
use crate::types::{VideoRecord, VideoStatFields};
use crate::wbi::{W_RID_KEY, WTS_KEY, WbiSignature, WbiSigner, unix_now};

const API_URL: &str = "https://member.bilibili.com/x/web/data/archive_diagnose/compare";
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/58.0.3029.110 Safari/537.3";
const REFERER: &str = "https://www.bilibili.com/";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Query key for the video identifier
pub const BVID_KEY: &str = "bvid";

/// Configuration for VideoStatsClient
#[derive(Debug, Clone)]
pub struct StatsConfig {
    /// Analytics endpoint (overridable for testing)
    pub api_url: String,
    /// Upper bound for the whole request
    pub timeout: Duration,
    /// Secret the WBI mixin key is derived from
    pub wbi_key: Option<String>,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            api_url: API_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            wbi_key: None,
        }
    }
}

impl StatsConfig {
    /// Read overrides from `BILI_STATS_API_URL`, `BILI_STATS_TIMEOUT_SECS` and `BILI_WBI_KEY`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_url: std::env::var("BILI_STATS_API_URL").unwrap_or(defaults.api_url),
            timeout: std::env::var("BILI_STATS_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            wbi_key: std::env::var("BILI_WBI_KEY").ok().filter(|k| !k.is_empty()),
        }
    }
}

pub struct VideoStatsClient {
    http_client: Client,
    api_url: Url,
    pub(crate) signer: WbiSigner,
}

impl VideoStatsClient {
    pub fn new() -> StatsResult<Self> {
        Self::with_config(StatsConfig::default())
    }

    pub fn with_config(config: StatsConfig) -> StatsResult<Self> {
        let signer = match config.wbi_key.as_deref() {
            Some(key) => WbiSigner::new(key)?,
            None => WbiSigner::default(),
        };

        let api_url = Url::parse(&config.api_url).map_err(|e| {
            StatsError::validation(format!("invalid api url '{}': {}", config.api_url, e))
        })?;

        let http_client = Client::builder()
            .emulation(Emulation::Chrome143)
            .gzip(true)
            .brotli(true)
            .zstd(true)
            .timeout(config.timeout)
            .build()
            .map_err(|e| StatsError::Transport(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            api_url,
            signer,
        })
    }

    pub fn signer(&self) -> &WbiSigner {
        &self.signer
    }

    /// Fetch and flatten the statistics of one video.
    ///
    /// `signature` must have been computed over a parameter set containing
    /// `bvid`; exactly that set plus `w_rid` is sent.
    pub async fn fetch_stats(
        &self,
        credential: &str,
        bvid: &str,
        signature: &WbiSignature,
    ) -> StatsResult<VideoStatFields> {
        if credential.is_empty() {
            return Err(StatsError::validation("cookie must not be empty"));
        }
        if signature.params().get(BVID_KEY).map(String::as_str) != Some(bvid) {
            return Err(StatsError::validation(format!(
                "signature does not cover {}={}",
                BVID_KEY, bvid
            )));
        }

        let mut url = self.api_url.clone();
        url.set_query(Some(&signature.query_string()));

        let cookies = format!(
            "SESSDATA={}; {}={}; {}={}",
            credential, WTS_KEY, signature.wts, W_RID_KEY, signature.w_rid
        );
        let cookies = header::HeaderValue::from_str(&cookies)
            .map_err(|_| StatsError::validation("cookie contains invalid characters"))?;

        tracing::info!(bvid, wts = signature.wts, "fetching video stats");

        let response = self
            .http_client
            .get(url.as_str())
            .header(header::USER_AGENT, USER_AGENT)
            .header(header::REFERER, REFERER)
            .header(header::COOKIE, cookies)
            .send()
            .await
            .map_err(|e| StatsError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| StatsError::Transport(format!("failed to read body: {}", e)))?;

        if !status.is_success() {
            return Err(StatsError::Transport(format!(
                "API request failed: {} {}",
                status, body
            )));
        }

        parse_stats_response(&body, unix_now())
    }
}

/// Whether a JSON value counts as empty (null, false, 0, "", [] or {}).
fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}

/// Strings as-is, everything else in its JSON form.
fn json_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn is_zero_code(code: &Value) -> bool {
    matches!(code, Value::Number(n) if n.as_f64() == Some(0.0))
}

/// Validate the response envelope and flatten its first record.
pub fn parse_stats_response(body: &str, fetched_at: i64) -> StatsResult<VideoStatFields> {
    let envelope: Value = serde_json::from_str(body)
        .map_err(|e| StatsError::format(format!("empty response (invalid JSON: {})", e)))?;

    if is_blank(&envelope) {
        return Err(StatsError::format("empty response"));
    }

    if let Some(code) = envelope.get("code")
        && !is_zero_code(code)
    {
        let message = match envelope.get("message") {
            None | Some(Value::Null) => "unknown error".to_string(),
            Some(message) => json_text(message),
        };
        return Err(StatsError::Api {
            code: json_text(code),
            message,
        });
    }

    let data = envelope
        .get("data")
        .ok_or_else(|| StatsError::format("missing data"))?;
    let list = data
        .get("list")
        .and_then(Value::as_array)
        .ok_or_else(|| StatsError::format("missing list"))?;
    let first = list
        .first()
        .ok_or_else(|| StatsError::format("empty list"))?;

    let record: VideoRecord = serde_json::from_value(first.clone())
        .map_err(|e| StatsError::format(format!("malformed record: {}", e)))?;

    Ok(video_stat_fields(record, fetched_at))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const FETCHED_AT: i64 = 1_700_000_600;

    fn parse(value: Value) -> StatsResult<VideoStatFields> {
        parse_stats_response(&value.to_string(), FETCHED_AT)
    }

    #[test]
    fn test_empty_list() {
        let err = parse(json!({"code": 0, "data": {"list": []}})).unwrap_err();
        assert!(matches!(&err, StatsError::ResponseFormat(m) if m == "empty list"));
    }

    #[test]
    fn test_api_error_carries_message() {
        let err = parse(json!({"code": 1, "message": "x"})).unwrap_err();
        assert!(matches!(&err, StatsError::Api { code, message } if code == "1" && message == "x"));

        let err = parse(json!({"code": -101})).unwrap_err();
        assert!(matches!(&err, StatsError::Api { message, .. } if message == "unknown error"));
    }

    #[test]
    fn test_api_error_renders_loose_code_and_message() {
        let err = parse(json!({"code": "-101", "message": 42})).unwrap_err();
        assert!(matches!(&err, StatsError::Api { code, message } if code == "-101" && message == "42"));
        assert_eq!(err.to_string(), "API error -101: 42");
    }

    #[test]
    fn test_loosely_typed_identity_fields() {
        let fields = parse(json!({
            "code": 0,
            "data": {"list": [{
                "bvid": "BV1xx411c7mD",
                "pubtime": 1_700_000_000.0,
                "duration": "183"
            }]}
        }))
        .unwrap();

        assert_eq!(fields.duration, 183);
        assert_eq!(
            fields.pubtime,
            crate::normalize::format_timestamp(1_700_000_000)
        );
    }

    #[test]
    fn test_envelope_failures_in_order() {
        let cases = [
            ("", "empty response (invalid JSON"),
            ("not json", "empty response (invalid JSON"),
            ("{}", "empty response"),
            ("null", "empty response"),
            (r#"{"code":0}"#, "missing data"),
            (r#"{"code":0,"data":{}}"#, "missing list"),
            (r#"{"code":0,"data":{"list":{}}}"#, "missing list"),
            (r#"{"code":0,"data":{"list":[]}}"#, "empty list"),
        ];

        for (body, expected) in cases {
            match parse_stats_response(body, FETCHED_AT) {
                Err(StatsError::ResponseFormat(m)) => {
                    assert!(m.starts_with(expected), "body {:?}: got {:?}", body, m)
                }
                other => panic!("body {:?}: unexpected {:?}", body, other),
            }
        }
    }

    #[test]
    fn test_code_absent_is_accepted() {
        let fields = parse(json!({"data": {"list": [{"bvid": "BV1xx411c7mD"}]}})).unwrap();
        assert_eq!(fields.bvid, "BV1xx411c7mD");
    }

    #[test]
    fn test_first_record_is_used() {
        let fields = parse(json!({
            "code": 0,
            "message": "0",
            "data": {"list": [
                {"bvid": "BV1first", "stat": {"full_play_ratio": 0, "play_trans_fan_rate": 50000}},
                {"bvid": "BV1second"}
            ]}
        }))
        .unwrap();

        assert_eq!(fields.bvid, "BV1first");
        assert_eq!(fields.full_play_ratio, 0.0);
        assert_eq!(fields.play_trans_fan_rate, 5.0);
    }

    #[test]
    fn test_config_defaults() {
        let config = StatsConfig::default();
        assert_eq!(config.api_url, API_URL);
        assert_eq!(config.timeout, DEFAULT_TIMEOUT);
        assert!(config.wbi_key.is_none());
    }
}
