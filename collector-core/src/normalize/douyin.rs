use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;
use serde_json::{json, Value};

use crate::error::{CollectError, CollectResult};
use crate::locator::cached_regex;

use super::{
    coerce_count, coerce_i64, is_blank, last_listed_url, pick, pick_str, pick_string, Author,
    CreatorProfile, Gender, NormalizedRecord, Platform,
};

const WEB_HOST: &str = "https://www.douyin.com";

static HASHTAG: OnceLock<Regex> = OnceLock::new();

pub fn user_url(sec_uid: &str) -> String {
    if sec_uid.is_empty() {
        String::new()
    } else {
        format!("{WEB_HOST}/user/{sec_uid}")
    }
}

pub fn video_url(aweme_id: &str) -> String {
    if aweme_id.is_empty() {
        String::new()
    } else {
        format!("{WEB_HOST}/video/{aweme_id}")
    }
}

/// List entries that already carry statistics and media skip the detail call.
pub fn has_full_detail(aweme: &Value) -> bool {
    let present = |key: &str| aweme.get(key).map(|value| !is_blank(value)).unwrap_or(false);
    present("statistics") && (present("video") || present("images"))
}

pub fn video_record(aweme: &Value) -> CollectResult<NormalizedRecord> {
    if !aweme.is_object() || is_blank(aweme) {
        return Err(CollectError::UpstreamFormatChanged(
            "aweme payload is not an object".to_string(),
        ));
    }
    let empty = json!({});
    let video = aweme.get("video").unwrap_or(&empty);
    let statistics = aweme.get("statistics").unwrap_or(&empty);
    let author = aweme.get("author").unwrap_or(&empty);

    let image_urls: Vec<String> = aweme
        .get("images")
        .and_then(Value::as_array)
        .map(|images| {
            images
                .iter()
                .filter_map(|image| last_listed_url(image, &["url_list", "download_url_list"]))
                .collect()
        })
        .unwrap_or_default();

    let cover_url = pick(video, &["raw_cover", "origin_cover", "cover"])
        .and_then(|cover| last_listed_url(cover, &["url_list"]))
        .or_else(|| image_urls.first().cloned())
        .unwrap_or_default();

    let play_url = ["play_addr_h264", "play_addr_256", "play_addr", "download_addr"]
        .iter()
        .filter_map(|key| video.get(*key))
        .find_map(|addr| last_listed_url(addr, &["url_list"]))
        .unwrap_or_default();

    let item_id = pick_string(aweme, &["aweme_id"]);
    let desc = pick_string(aweme, &["desc"]);
    let sec_uid = pick_string(author, &["sec_uid"]);
    let avatar = ["avatar_medium", "avatar_thumb"]
        .iter()
        .filter_map(|key| author.get(*key)?.get("url_list")?.as_array())
        .find(|list| !list.is_empty())
        .and_then(|list| list.first())
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    Ok(NormalizedRecord {
        platform: Platform::Douyin,
        note_type: if image_urls.is_empty() { "video" } else { "normal" }.to_string(),
        note_url: video_url(&item_id),
        tags: tags(aweme, &desc),
        title: desc.clone(),
        body: desc,
        cover_url,
        image_urls,
        video_url: play_url,
        liked: statistics.get("digg_count").map(coerce_count).unwrap_or(0),
        collected: statistics.get("collect_count").map(coerce_count).unwrap_or(0),
        comments: statistics.get("comment_count").map(coerce_count).unwrap_or(0),
        shares: statistics.get("share_count").map(coerce_count).unwrap_or(0),
        published_at_ms: aweme
            .get("create_time")
            .map(coerce_i64)
            .unwrap_or(0)
            .saturating_mul(1000),
        author: Author {
            id: sec_uid.clone(),
            nickname: pick_string(author, &["nickname"]),
            avatar,
            home_url: user_url(&sec_uid),
        },
        item_id,
    })
}

/// Hashtags from `text_extra`, else `#tag` runs in the description; first
/// occurrence wins.
fn tags(aweme: &Value, desc: &str) -> Vec<String> {
    let mut found: Vec<String> = aweme
        .get("text_extra")
        .and_then(Value::as_array)
        .map(|extras| {
            extras
                .iter()
                .filter_map(|extra| pick_str(extra, &["hashtag_name"]))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    if found.is_empty() {
        found = cached_regex(&HASHTAG, r"#([^#\s]+)")
            .captures_iter(desc)
            .map(|caps| caps[1].trim().to_string())
            .filter(|tag| !tag.is_empty())
            .collect();
    }

    let mut seen = HashSet::new();
    found.retain(|tag| seen.insert(tag.clone()));
    found
}

pub fn creator_profile(data: &Value, sec_user_id: &str) -> CollectResult<CreatorProfile> {
    let user = data
        .get("user")
        .filter(|user| !is_blank(user))
        .ok_or_else(|| CollectError::ItemUnavailable("creator not found".to_string()))?;

    let avatar = pick(user, &["avatar_300x300", "avatar_medium", "avatar_thumb"])
        .and_then(|info| info.get("url_list"))
        .and_then(Value::as_array)
        .and_then(|list| list.first())
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let user_id = if sec_user_id.is_empty() {
        pick_string(user, &["sec_uid", "uid"])
    } else {
        sec_user_id.to_string()
    };

    Ok(CreatorProfile {
        platform: Platform::Douyin,
        nickname: pick_string(user, &["nickname"]),
        handle: pick(user, &["unique_id", "short_id", "uid"])
            .map(|value| match value {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            })
            .unwrap_or_default(),
        bio: pick_string(user, &["signature"]),
        gender: user.get("gender").map(Gender::from_code).unwrap_or_default(),
        ip_location: pick_string(user, &["ip_location"]),
        avatar,
        follows: user.get("following_count").map(coerce_count).unwrap_or(0),
        fans: pick(user, &["max_follower_count", "follower_count"])
            .map(coerce_count)
            .unwrap_or(0),
        likes_and_collects: user.get("total_favorited").map(coerce_count).unwrap_or(0),
        home_url: user_url(sec_user_id),
        user_id,
        tags: Vec::new(),
    })
}
