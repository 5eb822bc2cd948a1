use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;
use url::Url;

use crate::error::{CollectError, CollectResult};

pub(crate) fn cached_regex(cell: &'static OnceLock<Regex>, source: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(source).expect("valid regex"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SortMode {
    #[default]
    General,
    MostPopular,
    Latest,
}

impl SortMode {
    pub fn xhs_value(self) -> &'static str {
        match self {
            SortMode::General => "general",
            SortMode::MostPopular => "hot_desc",
            SortMode::Latest => "time_desc",
        }
    }

    pub fn douyin_value(self) -> u8 {
        match self {
            SortMode::General => 0,
            SortMode::MostPopular => 1,
            SortMode::Latest => 2,
        }
    }
}

impl FromStr for SortMode {
    type Err = CollectError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "general" => Ok(SortMode::General),
            "hot" | "hot_desc" | "most_like" | "popularity_descending" => {
                Ok(SortMode::MostPopular)
            }
            "latest" | "time_desc" | "time_descending" => Ok(SortMode::Latest),
            other => Err(CollectError::LocatorFormat(format!("unknown sort mode {other:?}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteTypeFilter {
    #[default]
    All,
    Image,
    Video,
}

impl NoteTypeFilter {
    pub fn code(self) -> u8 {
        match self {
            NoteTypeFilter::All => 0,
            NoteTypeFilter::Image => 1,
            NoteTypeFilter::Video => 2,
        }
    }

    pub fn from_code(code: u8) -> CollectResult<Self> {
        match code {
            0 => Ok(NoteTypeFilter::All),
            1 => Ok(NoteTypeFilter::Image),
            2 => Ok(NoteTypeFilter::Video),
            other => Err(CollectError::LocatorFormat(format!(
                "note type must be 0, 1 or 2, got {other}"
            ))),
        }
    }
}

/// Raw caller input, before any parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetSpec {
    Profile(String),
    Item(String),
    Keyword {
        text: String,
        sort: SortMode,
        type_filter: NoteTypeFilter,
    },
}

/// What to collect, once parsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TargetLocator {
    Profile {
        id: String,
    },
    Item {
        id: String,
        token: Option<String>,
    },
    Keyword {
        text: String,
        sort: SortMode,
        type_filter: NoteTypeFilter,
    },
}

impl TargetLocator {
    pub fn is_keyword(&self) -> bool {
        matches!(self, TargetLocator::Keyword { .. })
    }
}

impl fmt::Display for TargetLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetLocator::Profile { id } => write!(f, "profile:{id}"),
            TargetLocator::Item { id, .. } => write!(f, "item:{id}"),
            TargetLocator::Keyword { text, .. } => write!(f, "keyword:{text}"),
        }
    }
}

/// Keyword locators reject blank text.
pub fn keyword_locator(
    text: &str,
    sort: SortMode,
    type_filter: NoteTypeFilter,
) -> CollectResult<TargetLocator> {
    let text = text.trim();
    if text.is_empty() {
        return Err(CollectError::LocatorFormat("keyword is empty".to_string()));
    }
    Ok(TargetLocator::Keyword {
        text: text.to_string(),
        sort,
        type_filter,
    })
}

static XHS_PROFILE: OnceLock<Regex> = OnceLock::new();
static XHS_EXPLORE: OnceLock<Regex> = OnceLock::new();
static XHS_DISCOVERY: OnceLock<Regex> = OnceLock::new();
static DOUYIN_VIDEO: OnceLock<Regex> = OnceLock::new();
static DOUYIN_USER: OnceLock<Regex> = OnceLock::new();
static TABLE_NAMESPACE: OnceLock<Regex> = OnceLock::new();
static TABLE_ID: OnceLock<Regex> = OnceLock::new();

pub fn parse_xhs_profile_url(url: &str) -> CollectResult<String> {
    cached_regex(&XHS_PROFILE, r"/user/profile/([a-f0-9]+)")
        .captures(url.trim())
        .map(|caps| caps[1].to_string())
        .ok_or_else(|| CollectError::LocatorFormat(format!("no user id in {url:?}")))
}

/// Note id plus the `xsec_token` query parameter when the link carries one.
pub fn parse_xhs_note_url(url: &str) -> CollectResult<(String, Option<String>)> {
    let url = url.trim();
    let id = [
        cached_regex(&XHS_EXPLORE, r"/explore/([a-zA-Z0-9]+)"),
        cached_regex(&XHS_DISCOVERY, r"/discovery/item/([a-zA-Z0-9]+)"),
    ]
    .iter()
    .find_map(|pattern| pattern.captures(url).map(|caps| caps[1].to_string()))
    .ok_or_else(|| CollectError::LocatorFormat(format!("no note id in {url:?}")))?;
    Ok((id, query_param(url, "xsec_token")))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DouyinVideoRef {
    Id(String),
    ShortLink(String),
}

pub fn parse_douyin_video_url(url: &str) -> CollectResult<DouyinVideoRef> {
    let url = url.trim();
    if !url.is_empty() && url.chars().all(|c| c.is_ascii_digit()) {
        return Ok(DouyinVideoRef::Id(url.to_string()));
    }
    if url.contains("v.douyin.com") {
        return Ok(DouyinVideoRef::ShortLink(url.to_string()));
    }
    if let Some(modal_id) = query_param(url, "modal_id") {
        return Ok(DouyinVideoRef::Id(modal_id));
    }
    cached_regex(&DOUYIN_VIDEO, r"/video/(\d+)")
        .captures(url)
        .map(|caps| DouyinVideoRef::Id(caps[1].to_string()))
        .ok_or_else(|| CollectError::LocatorFormat(format!("no video id in {url:?}")))
}

/// `sec_user_id` from a profile link, or a bare id passed through.
pub fn parse_douyin_user(url: &str) -> CollectResult<String> {
    let url = url.trim();
    if url.is_empty() {
        return Err(CollectError::LocatorFormat("profile link is empty".to_string()));
    }
    if url.starts_with("MS4wLjAB") || (!url.starts_with("http") && !url.contains("douyin.com")) {
        return Ok(url.to_string());
    }
    cached_regex(&DOUYIN_USER, r"/user/([^/?]+)")
        .captures(url)
        .map(|caps| caps[1].to_string())
        .ok_or_else(|| CollectError::LocatorFormat(format!("no user id in {url:?}")))
}

/// Destination table of a record sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableLocator {
    pub namespace: String,
    pub table_id: String,
}

pub fn parse_table_url(url: &str) -> CollectResult<TableLocator> {
    let url = url.trim();
    let namespace = cached_regex(&TABLE_NAMESPACE, r"/base/([a-zA-Z0-9]+)")
        .captures(url)
        .map(|caps| caps[1].to_string())
        .ok_or_else(|| CollectError::LocatorFormat(format!("no base namespace in {url:?}")))?;
    let table_id = cached_regex(&TABLE_ID, r"[?&]table=([a-zA-Z0-9]+)")
        .captures(url)
        .map(|caps| caps[1].to_string())
        .ok_or_else(|| CollectError::LocatorFormat(format!("no table=... parameter in {url:?}")))?;
    Ok(TableLocator {
        namespace,
        table_id,
    })
}

fn query_param(url: &str, name: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    parsed
        .query_pairs()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
}
