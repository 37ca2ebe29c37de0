//! Turns a raw [`VideoRecord`] into the flat [`VideoStatFields`] output.

use chrono::{Local, TimeZone};

use crate::types::{StatBlock, VideoRecord, VideoStatFields};

/// Rate metrics arrive as integers scaled by this factor.
pub const RATE_SCALE: f64 = 10_000.0;

/// Timestamps above this are taken to be in milliseconds.
pub const MILLIS_THRESHOLD: i64 = 9_999_999_999;

pub const DATE_FORMAT: &str = "%Y/%m/%d %H:%M:%S";

/// Restore a scaled rate to `[0, 1]`. Zero stays zero.
pub fn scale_rate(raw: f64) -> f64 {
    if raw == 0.0 { 0.0 } else { raw / RATE_SCALE }
}

/// Format epoch seconds or milliseconds as local `YYYY/MM/DD HH:MM:SS`.
///
/// Returns an empty string if the instant cannot be represented.
pub fn format_timestamp(timestamp: i64) -> String {
    let secs = if timestamp > MILLIS_THRESHOLD {
        timestamp / 1000
    } else {
        timestamp
    };

    Local
        .timestamp_opt(secs, 0)
        .earliest()
        .map(|dt| dt.format(DATE_FORMAT).to_string())
        .unwrap_or_default()
}

fn rate(stat: &StatBlock, key: &str) -> f64 {
    scale_rate(stat.number(key))
}

/// Build the output fields from a record fetched at `fetched_at` (epoch seconds).
pub fn video_stat_fields(record: VideoRecord, fetched_at: i64) -> VideoStatFields {
    let stat = record.stat.unwrap_or_default();

    VideoStatFields {
        bvid: record.bvid.unwrap_or_default(),
        cover: record.cover.unwrap_or_default(),
        title: record.title.unwrap_or_default(),
        pubtime: record.pubtime.map(format_timestamp).unwrap_or_default(),
        updatetime: format_timestamp(fetched_at),
        duration: record.duration.unwrap_or_default(),
        play: stat.count("play"),
        like: stat.count("like"),
        comment: stat.count("comment"),
        dm: stat.count("dm"),
        fav: stat.count("fav"),
        coin: stat.count("coin"),
        share: stat.count("share"),
        full_play_ratio: rate(&stat, "full_play_ratio"),
        play_viewer_rate: stat.number("play_viewer_rate"),
        active_fans_rate: rate(&stat, "active_fans_rate"),
        tm_rate: rate(&stat, "tm_rate"),
        tm_rate_med: rate(&stat, "tm_rate_med"),
        tm_fan_simi_rate_med: rate(&stat, "tm_fan_simi_rate_med"),
        tm_viewer_simi_rate_med: rate(&stat, "tm_viewer_simi_rate_med"),
        tm_fan_rate: rate(&stat, "tm_fan_rate"),
        tm_viewer_rate: rate(&stat, "tm_viewer_rate"),
        tm_pass_rate: rate(&stat, "tm_pass_rate"),
        tm_fan_pass_rate: rate(&stat, "tm_fan_pass_rate"),
        tm_viewer_pass_rate: rate(&stat, "tm_viewer_pass_rate"),
        crash_rate: rate(&stat, "crash_rate"),
        crash_fan_simi_rate_med: rate(&stat, "crash_fan_simi_rate_med"),
        crash_viewer_simi_rate_med: rate(&stat, "crash_viewer_simi_rate_med"),
        crash_fan_rate: rate(&stat, "crash_fan_rate"),
        crash_viewer_rate: rate(&stat, "crash_viewer_rate"),
        interact_rate: rate(&stat, "interact_rate"),
        interact_fan_simi_rate_med: rate(&stat, "interact_fan_simi_rate_med"),
        interact_viewer_simi_rate_med: rate(&stat, "interact_viewer_simi_rate_med"),
        interact_fan_rate: rate(&stat, "interact_fan_rate"),
        interact_viewer_rate: rate(&stat, "interact_viewer_rate"),
        total_new_attention_cnt: stat.count("total_new_attention_cnt"),
        play_trans_fan_rate: rate(&stat, "play_trans_fan_rate"),
        play_trans_fan_rate_med: rate(&stat, "play_trans_fan_rate_med"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: serde_json::Value) -> VideoRecord {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_scale_rate() {
        assert_eq!(scale_rate(0.0), 0.0);
        assert_eq!(scale_rate(50_000.0), 5.0);
        assert_eq!(scale_rate(1_234.0), 0.1234);
    }

    #[test]
    fn test_millis_and_seconds_agree() {
        assert_eq!(
            format_timestamp(1_700_000_000_000),
            format_timestamp(1_700_000_000)
        );
        // Exactly at the threshold is still seconds
        assert_ne!(format_timestamp(MILLIS_THRESHOLD), format_timestamp(MILLIS_THRESHOLD / 1000));
    }

    #[test]
    fn test_date_format_shape() {
        let formatted = format_timestamp(1_700_000_000);
        assert_eq!(formatted.len(), 19);
        let bytes = formatted.as_bytes();
        assert_eq!(bytes[4], b'/');
        assert_eq!(bytes[7], b'/');
        assert_eq!(bytes[10], b' ');
        assert_eq!(bytes[13], b':');
        assert_eq!(bytes[16], b':');
        assert!(formatted.starts_with("2023/11/1"));
    }

    #[test]
    fn test_rate_fields_scaled_once() {
        let fields = video_stat_fields(
            record(json!({
                "bvid": "BV1xx411c7mD",
                "title": "测试视频",
                "cover": "https://i0.hdslb.com/bfs/archive/cover.jpg",
                "pubtime": 1_700_000_000,
                "duration": 215,
                "stat": {
                    "play": 10_432,
                    "like": 880,
                    "full_play_ratio": 0,
                    "play_trans_fan_rate": 50_000,
                    "tm_rate": 812,
                    "play_viewer_rate": 6_100,
                    "total_new_attention_cnt": 37
                }
            })),
            1_700_000_600,
        );

        assert_eq!(fields.bvid, "BV1xx411c7mD");
        assert_eq!(fields.title, "测试视频");
        assert_eq!(fields.duration, 215);
        assert_eq!(fields.play, 10_432);
        assert_eq!(fields.like, 880);
        assert_eq!(fields.full_play_ratio, 0.0);
        assert_eq!(fields.play_trans_fan_rate, 5.0);
        assert_eq!(fields.tm_rate, 0.0812);
        assert_eq!(fields.play_viewer_rate, 6_100.0);
        assert_eq!(fields.total_new_attention_cnt, 37);
        assert_eq!(fields.pubtime, format_timestamp(1_700_000_000));
        assert_eq!(fields.updatetime, format_timestamp(1_700_000_600));
    }

    #[test]
    fn test_missing_stat_defaults_to_zero() {
        let fields = video_stat_fields(record(json!({"bvid": "BV1xx411c7mD"})), 1_700_000_000);
        assert_eq!(fields.play, 0);
        assert_eq!(fields.crash_rate, 0.0);
        assert_eq!(fields.pubtime, "");
        assert_eq!(fields.title, "");
    }
}
