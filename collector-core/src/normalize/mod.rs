//! Canonical record shapes and the field-fallback helpers both platform
//! normalizers share. Everything here is pure.

pub mod douyin;
pub mod xhs;

use std::fmt;

use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Xhs,
    Douyin,
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::Xhs => write!(f, "xhs"),
            Platform::Douyin => write!(f, "douyin"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Author {
    pub id: String,
    pub nickname: String,
    pub avatar: String,
    pub home_url: String,
}

/// One collected item, platform-agnostic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NormalizedRecord {
    pub platform: Platform,
    pub item_id: String,
    pub title: String,
    pub body: String,
    pub note_type: String,
    pub note_url: String,
    pub cover_url: String,
    pub image_urls: Vec<String>,
    pub video_url: String,
    pub tags: Vec<String>,
    pub liked: u64,
    pub collected: u64,
    pub comments: u64,
    pub shares: u64,
    pub published_at_ms: i64,
    pub author: Author,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    #[default]
    Unknown,
    Male,
    Female,
}

impl Gender {
    pub fn from_code(value: &Value) -> Self {
        match value.as_i64() {
            Some(1) => Gender::Male,
            Some(2) => Gender::Female,
            _ => Gender::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreatorProfile {
    pub platform: Platform,
    pub user_id: String,
    pub nickname: String,
    pub handle: String,
    pub bio: String,
    pub gender: Gender,
    pub ip_location: String,
    pub avatar: String,
    pub follows: u64,
    pub fans: u64,
    pub likes_and_collects: u64,
    pub home_url: String,
    pub tags: Vec<String>,
}

/// Falsy in the loose sense the upstream payloads rely on: null, false, zero
/// and empty strings, arrays or objects.
pub fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(flag) => !flag,
        Value::Number(number) => number.as_f64() == Some(0.0),
        Value::String(text) => text.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
    }
}

/// First non-blank value under any of `keys`, in priority order.
pub fn pick<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| value.get(*key))
        .find(|candidate| !is_blank(candidate))
}

pub fn pick_str<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|key| value.get(*key).and_then(Value::as_str))
        .find(|text| !text.is_empty())
}

pub fn pick_string(value: &Value, keys: &[&str]) -> String {
    pick_str(value, keys).unwrap_or_default().to_string()
}

/// Tolerant counter parsing: numbers, numeric strings, comma groups and the
/// `万` (ten thousand) suffix. Anything else is 0.
pub fn coerce_count(value: &Value) -> u64 {
    match value {
        Value::Number(number) => number
            .as_u64()
            .or_else(|| number.as_f64().filter(|f| *f > 0.0).map(|f| f as u64))
            .unwrap_or(0),
        Value::String(text) => coerce_count_text(text),
        _ => 0,
    }
}

fn coerce_count_text(text: &str) -> u64 {
    let cleaned = text.replace(',', "");
    let cleaned = cleaned.trim();
    if let Some(stem) = cleaned.strip_suffix('万') {
        return stem
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|f| f.is_finite() && *f > 0.0)
            .map(|f| (f * 10_000.0).round() as u64)
            .unwrap_or(0);
    }
    cleaned
        .parse::<f64>()
        .ok()
        .filter(|f| f.is_finite() && *f > 0.0)
        .map(|f| f as u64)
        .unwrap_or(0)
}

pub fn coerce_i64(value: &Value) -> i64 {
    match value {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().map(|f| f as i64))
            .unwrap_or(0),
        Value::String(text) => text.trim().parse::<i64>().unwrap_or(0),
        _ => 0,
    }
}

const VIDEO_URL_KEYS: [&str; 9] = [
    "origin_video_key",
    "originVideoKey",
    "url",
    "url_default",
    "url_pre",
    "urlPre",
    "download_url",
    "origin_url",
    "stream_url",
];

const VIDEO_CDN: &str = "https://sns-video-qc.xhscdn.com/";

/// Depth-first scan for the first usable URL. Priority keys are tried before
/// the remaining object values.
pub fn find_first_url(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => url_from_text(text.trim()),
        Value::Array(items) => items.iter().find_map(find_first_url),
        Value::Object(map) => VIDEO_URL_KEYS
            .iter()
            .filter_map(|key| map.get(*key))
            .find_map(find_first_url)
            .or_else(|| map.values().find_map(find_first_url)),
        _ => None,
    }
}

fn url_from_text(text: &str) -> Option<String> {
    if text.starts_with("http") {
        Some(text.to_string())
    } else if text.starts_with("//") {
        Some(format!("https:{text}"))
    } else if [".mp4", ".mov", ".m3u8"].iter().any(|ext| text.ends_with(ext)) {
        Some(format!("{VIDEO_CDN}{}", text.trim_start_matches('/')))
    } else {
        None
    }
}

/// Last entry of a `url_list`, the highest quality rendition upstream.
pub fn last_listed_url(value: &Value, list_keys: &[&str]) -> Option<String> {
    list_keys
        .iter()
        .filter_map(|key| value.get(*key).and_then(Value::as_array))
        .find(|list| !list.is_empty())
        .and_then(|list| list.last())
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn counts_tolerate_upstream_spellings() {
        assert_eq!(coerce_count(&json!("1.2万")), 12_000);
        assert_eq!(coerce_count(&json!("3,456")), 3_456);
        assert_eq!(coerce_count(&json!("")), 0);
        assert_eq!(coerce_count(&json!("10+")), 0);
        assert_eq!(coerce_count(&json!(42)), 42);
        assert_eq!(coerce_count(&json!(7.9)), 7);
        assert_eq!(coerce_count(&json!(-3)), 0);
        assert_eq!(coerce_count(&Value::Null), 0);
    }

    #[test]
    fn pick_skips_blank_values() {
        let value = json!({"nickname": "", "nickName": "Mia", "zero": 0, "count": 3});
        assert_eq!(pick_str(&value, &["nickname", "nickName"]), Some("Mia"));
        assert_eq!(pick(&value, &["zero", "count"]), Some(&json!(3)));
        assert_eq!(pick_string(&value, &["missing"]), "");
    }

    #[test]
    fn url_scan_prefers_priority_keys() {
        let video = json!({
            "capa": {"duration": 12},
            "media": {
                "stream": {"h264": [{"master_url": "http://cdn/a.mp4", "backup_urls": []}]},
                "video": {"origin_video_key": "pre_post/abc.mp4"}
            }
        });
        assert_eq!(
            find_first_url(&video).as_deref(),
            Some("http://cdn/a.mp4")
        );
        assert_eq!(
            find_first_url(&json!({"origin_video_key": "/pre_post/abc.mp4", "url": "http://x"})).as_deref(),
            Some("https://sns-video-qc.xhscdn.com/pre_post/abc.mp4")
        );
        assert_eq!(
            find_first_url(&json!(["plain", "//cdn/v.m3u8"])).as_deref(),
            Some("https://cdn/v.m3u8")
        );
        assert_eq!(find_first_url(&json!({"duration": 3})), None);
    }

    #[test]
    fn last_listed_url_takes_final_rendition() {
        let cover = json!({"url_list": ["http://a", "http://b"]});
        assert_eq!(last_listed_url(&cover, &["url_list"]).as_deref(), Some("http://b"));
        assert_eq!(last_listed_url(&json!({"url_list": []}), &["url_list"]), None);
    }
}
