use serde::Serialize;
use serde_json::{json, Value};

use crate::error::{CollectError, CollectResult};

use super::{
    coerce_count, coerce_i64, find_first_url, is_blank, pick, pick_str, pick_string, Author,
    CreatorProfile, Gender, NormalizedRecord, Platform,
};

const WEB_HOST: &str = "https://www.xiaohongshu.com";

pub fn profile_url(user_id: &str) -> String {
    if user_id.is_empty() {
        String::new()
    } else {
        format!("{WEB_HOST}/user/profile/{user_id}")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HintUser {
    pub nickname: String,
    pub user_id: String,
    pub avatar: String,
}

/// What a list view (or a note page) tells us about a note before its detail
/// is fetched. Serializes back into the flat list-item shape it parses from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NoteHints {
    pub note_id: String,
    pub xsec_token: String,
    pub display_title: String,
    #[serde(rename = "type")]
    pub note_type: String,
    pub user: HintUser,
}

impl NoteHints {
    /// Reads a profile-listing note or a search item. Items without an id are
    /// dropped.
    pub fn from_list_item(item: &Value) -> Option<Self> {
        let empty = json!({});
        let card = pick(
            item,
            &["note_card", "noteCard", "note_info", "noteInfo", "note"],
        )
        .filter(|card| card.is_object())
        .unwrap_or(&empty);

        let note_id = pick_str(card, &["note_id", "noteId"])
            .or_else(|| pick_str(item, &["note_id", "noteId", "id"]))?
            .to_string();
        let xsec_token = pick_str(card, &["xsec_token", "xsecToken"])
            .or_else(|| pick_str(item, &["xsec_token", "xsecToken"]))
            .unwrap_or_default()
            .to_string();
        let title_keys = ["display_title", "displayTitle", "title"];
        let display_title = pick_str(card, &title_keys)
            .or_else(|| pick_str(item, &title_keys))
            .unwrap_or_default()
            .to_string();
        let note_type = pick_str(card, &["type"])
            .or_else(|| pick_str(item, &["type"]))
            .unwrap_or_default()
            .to_string();
        let user = pick(card, &["user", "user_info", "userInfo"])
            .or_else(|| pick(item, &["user"]))
            .unwrap_or(&empty);

        Some(Self {
            note_id,
            xsec_token,
            display_title,
            note_type,
            user: HintUser {
                nickname: pick_string(user, &["nickname", "nick_name", "nickName"]),
                user_id: pick_string(user, &["user_id", "userId"]),
                avatar: pick_string(user, &["avatar", "avatar_url", "image"]),
            },
        })
    }

    /// Hints lifted from a note page's `note.noteDetailMap`.
    pub fn from_note_state(state: &Value, note_id: &str) -> Option<Self> {
        let map = state.pointer("/note/noteDetailMap")?.as_object()?;
        let entry = map.get(note_id).or_else(|| map.values().next())?;
        let detail = pick(entry, &["note", "noteCard"]).unwrap_or(entry);
        if !detail.is_object() {
            return None;
        }
        let empty = json!({});
        let user = detail.get("user").unwrap_or(&empty);
        Some(Self {
            note_id: note_id.to_string(),
            xsec_token: String::new(),
            display_title: pick_string(detail, &["display_title", "displayTitle", "title"]),
            note_type: pick_string(detail, &["type"]),
            user: HintUser {
                nickname: pick_string(user, &["nickname", "nickName"]),
                user_id: pick_string(user, &["userId", "user_id"]),
                avatar: pick_string(user, &["avatar"]),
            },
        })
    }

    /// Copies every non-empty field of `other` over this one.
    pub fn merge_from(&mut self, other: &NoteHints) {
        fn take(slot: &mut String, value: &str) {
            if !value.is_empty() {
                *slot = value.to_string();
            }
        }
        take(&mut self.xsec_token, &other.xsec_token);
        take(&mut self.display_title, &other.display_title);
        take(&mut self.note_type, &other.note_type);
        take(&mut self.user.nickname, &other.user.nickname);
        take(&mut self.user.user_id, &other.user.user_id);
        take(&mut self.user.avatar, &other.user.avatar);
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Image URL from an image entry, descending into `infoList` when the flat
/// keys are absent.
pub fn image_url(info: &Value) -> Option<String> {
    if !info.is_object() {
        return None;
    }
    pick_str(info, &["url_default", "url_pre", "url", "urlDefault", "urlPre"])
        .map(str::to_string)
        .or_else(|| {
            info.get("infoList")
                .and_then(Value::as_array)
                .and_then(|list| list.iter().find_map(image_url))
        })
}

/// Maps a feed `note_card` to a record, falling back to list-view hints for
/// identity fields the detail omits.
pub fn note_record(card: &Value, hints: &NoteHints) -> CollectResult<NormalizedRecord> {
    if !card.is_object() || is_blank(card) {
        return Err(CollectError::UpstreamFormatChanged(
            "feed item has no note_card".to_string(),
        ));
    }
    let empty = json!({});
    let user = card.get("user").unwrap_or(&empty);
    let interact = card.get("interact_info").unwrap_or(&empty);
    let images: &[Value] = card
        .get("image_list")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[]);

    let image_urls: Vec<String> = images
        .iter()
        .filter_map(|image| pick_str(image, &["url_default", "url_pre", "url"]))
        .map(str::to_string)
        .collect();

    let tags = card
        .get("tag_list")
        .and_then(Value::as_array)
        .map(|list| {
            list.iter()
                .filter(|tag| tag.get("type").and_then(Value::as_str) == Some("topic"))
                .filter_map(|tag| pick_str(tag, &["name"]))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let video_url = card
        .get("video")
        .filter(|video| video.is_object())
        .and_then(find_first_url)
        .unwrap_or_default();

    let cover_url = card
        .get("cover")
        .and_then(image_url)
        .or_else(|| images.first().and_then(image_url))
        .unwrap_or_default();

    let item_id = pick_str(card, &["note_id"])
        .unwrap_or(&hints.note_id)
        .to_string();
    let token = pick_str(card, &["xsec_token"]).unwrap_or(&hints.xsec_token);
    let note_url = format!("{WEB_HOST}/explore/{item_id}?xsec_token={token}&xsec_source=pc_user");

    let author_id = pick_str(user, &["user_id", "userId"])
        .unwrap_or(&hints.user.user_id)
        .to_string();
    let home_url = if hints.user.user_id.is_empty() {
        profile_url(&author_id)
    } else {
        profile_url(&hints.user.user_id)
    };
    let author = Author {
        nickname: pick_str(user, &["nickname", "nickName", "nick_name"])
            .unwrap_or(&hints.user.nickname)
            .to_string(),
        avatar: pick_str(user, &["avatar", "avatar_url", "avatarUrl"])
            .unwrap_or(&hints.user.avatar)
            .to_string(),
        id: author_id,
        home_url,
    };

    Ok(NormalizedRecord {
        platform: Platform::Xhs,
        title: pick_string(card, &["title", "display_title"]),
        body: pick_string(card, &["desc"]),
        note_type: pick_string(card, &["type"]),
        item_id,
        note_url,
        cover_url,
        image_urls,
        video_url,
        tags,
        liked: interact.get("liked_count").map(coerce_count).unwrap_or(0),
        collected: interact.get("collected_count").map(coerce_count).unwrap_or(0),
        comments: interact.get("comment_count").map(coerce_count).unwrap_or(0),
        shares: interact.get("share_count").map(coerce_count).unwrap_or(0),
        published_at_ms: card.get("time").map(coerce_i64).unwrap_or(0),
        author,
    })
}

/// Creator profile from a profile page's embedded state.
pub fn creator_profile(state: &Value, user_id_hint: Option<&str>) -> CollectResult<CreatorProfile> {
    let page = state
        .pointer("/user/userPageData")
        .filter(|page| !is_blank(page))
        .ok_or_else(|| {
            CollectError::UpstreamFormatChanged("user.userPageData missing".to_string())
        })?;

    if let Some(result) = page.get("result").filter(|result| !is_blank(result)) {
        if result.get("success").and_then(Value::as_bool) == Some(false) {
            return Err(CollectError::Upstream {
                code: result.get("code").and_then(Value::as_i64).unwrap_or(-1),
                message: pick_string(result, &["message"]),
            });
        }
    }

    let empty = json!({});
    let basic = page.get("basicInfo").unwrap_or(&empty);
    let nickname = pick_str(basic, &["nickname"])
        .ok_or_else(|| CollectError::ItemUnavailable("creator not found".to_string()))?
        .to_string();

    let user_id = user_id_hint
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| pick_string(basic, &["userId", "user_id"]));

    let interactions: &[Value] = page
        .get("interactions")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[]);
    let interaction = |kind: &str| {
        interactions
            .iter()
            .find(|entry| entry.get("type").and_then(Value::as_str) == Some(kind))
            .and_then(|entry| entry.get("count"))
            .map(coerce_count)
            .unwrap_or(0)
    };

    let tags = page
        .get("tags")
        .and_then(Value::as_array)
        .map(|list| {
            list.iter()
                .filter_map(|tag| pick_str(tag, &["name"]))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    Ok(CreatorProfile {
        platform: Platform::Xhs,
        handle: pick_string(basic, &["redId"]),
        bio: pick_string(basic, &["desc"]),
        gender: basic.get("gender").map(Gender::from_code).unwrap_or_default(),
        ip_location: pick_string(basic, &["ipLocation"]),
        avatar: avatar_url(basic),
        follows: interaction("follows"),
        fans: interaction("fans"),
        likes_and_collects: interaction("interaction"),
        home_url: profile_url(&user_id),
        user_id,
        nickname,
        tags,
    })
}

fn avatar_url(basic: &Value) -> String {
    let Some(avatar) = pick(basic, &["imageb", "images", "image"]) else {
        return String::new();
    };
    let avatar = match avatar {
        Value::Array(list) => match list.first() {
            Some(first) => first,
            None => return String::new(),
        },
        other => other,
    };
    match avatar {
        Value::String(text) => text.clone(),
        Value::Object(_) => pick_string(avatar, &["url", "urlDefault", "url_pre", "urlPre"]),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
