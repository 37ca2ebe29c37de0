use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Numeric reading of a JSON value; numeric strings count too.
fn coerce_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Integer reading of a JSON value, truncating fractions.
fn coerce_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        other => coerce_number(other).map(|f| f as i64),
    }
}

fn loose_int<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(coerce_int))
}

/// One entry of `data.list` in the archive diagnose response
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VideoRecord {
    #[serde(default)]
    pub bvid: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub cover: Option<String>,
    /// Publish time, epoch seconds or milliseconds
    #[serde(default, deserialize_with = "loose_int")]
    pub pubtime: Option<i64>,
    /// Length in seconds
    #[serde(default, deserialize_with = "loose_int")]
    pub duration: Option<i64>,
    #[serde(default)]
    pub stat: Option<StatBlock>,
}

/// The nested `stat` object. Kept as a loose map because the platform adds and
/// drops metrics without notice.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct StatBlock(pub Map<String, Value>);

impl StatBlock {
    /// Numeric value of `key`, or 0.0 when missing, null or non-numeric.
    pub fn number(&self, key: &str) -> f64 {
        self.0.get(key).and_then(coerce_number).unwrap_or(0.0)
    }

    /// Integer counter value of `key`, or 0.
    pub fn count(&self, key: &str) -> i64 {
        self.0.get(key).and_then(coerce_int).unwrap_or(0)
    }
}

/// Flattened statistics for one video.
///
/// Fields ending in `_rate`, `_ratio` or `_med` are fractions in `[0, 1]`,
/// except `play_viewer_rate` which is passed through unscaled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoStatFields {
    pub bvid: String,
    pub cover: String,
    pub title: String,
    /// Publish time as `YYYY/MM/DD HH:MM:SS` local time
    pub pubtime: String,
    /// When these numbers were fetched, same format as `pubtime`
    pub updatetime: String,
    pub duration: i64,
    pub play: i64,
    pub like: i64,
    pub comment: i64,
    pub dm: i64,
    pub fav: i64,
    pub coin: i64,
    pub share: i64,
    /// Average fraction of the video watched
    pub full_play_ratio: f64,
    pub play_viewer_rate: f64,
    pub active_fans_rate: f64,
    /// Cover/title click-through rate
    pub tm_rate: f64,
    pub tm_rate_med: f64,
    pub tm_fan_simi_rate_med: f64,
    pub tm_viewer_simi_rate_med: f64,
    pub tm_fan_rate: f64,
    pub tm_viewer_rate: f64,
    pub tm_pass_rate: f64,
    pub tm_fan_pass_rate: f64,
    pub tm_viewer_pass_rate: f64,
    /// Share of viewers leaving within 3 seconds
    pub crash_rate: f64,
    pub crash_fan_simi_rate_med: f64,
    pub crash_viewer_simi_rate_med: f64,
    pub crash_fan_rate: f64,
    pub crash_viewer_rate: f64,
    pub interact_rate: f64,
    pub interact_fan_simi_rate_med: f64,
    pub interact_viewer_simi_rate_med: f64,
    pub interact_fan_rate: f64,
    pub interact_viewer_rate: f64,
    /// New followers gained from this video
    pub total_new_attention_cnt: i64,
    pub play_trans_fan_rate: f64,
    pub play_trans_fan_rate_med: f64,
}

/// Handler input as posted by the workflow runtime
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HandlerInput {
    /// `SESSDATA` session cookie value
    #[serde(default)]
    pub cookie: Option<String>,
    #[serde(default)]
    pub bvid: Option<String>,
    /// Extra query params: an object, a JSON-encoded object, or absent
    #[serde(default)]
    pub params: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldsEntry {
    pub fields: VideoStatFields,
}

/// Uniform handler result. Exactly one of `fields` and `error` is non-null.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandlerOutput {
    pub fields: Option<Vec<FieldsEntry>>,
    pub error: Option<String>,
}

impl HandlerOutput {
    pub fn success(fields: VideoStatFields) -> Self {
        Self {
            fields: Some(vec![FieldsEntry { fields }]),
            error: None,
        }
    }

    pub fn failure(error: impl ToString) -> Self {
        Self {
            fields: None,
            error: Some(error.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}
