use std::sync::OnceLock;

use async_trait::async_trait;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use regex::Regex;
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};
use url::form_urlencoded;

use crate::config::XhsSection;
use crate::error::{CollectError, CollectResult};
use crate::locator::{
    cached_regex, keyword_locator, parse_xhs_note_url, parse_xhs_profile_url, NoteTypeFilter,
    SortMode, TargetLocator, TargetSpec,
};
use crate::normalize::xhs::{creator_profile, note_record, profile_url, NoteHints};
use crate::normalize::{CreatorProfile, NormalizedRecord, Platform};
use crate::pipeline::{ListItem, ListPage, PageCursor, PlatformSource};
use crate::session::SessionCredential;
use crate::sign::{get_content_string, SignRequest, XhsSigner};
use crate::transport::{HttpRequest, HttpResponse, Transport};

use super::embedded::parse_initial_state;

const USER_POSTED: &str = "/api/sns/web/v1/user_posted";
const SEARCH_NOTES: &str = "/api/sns/web/v1/search/notes";
const FEED: &str = "/api/sns/web/v1/feed";
const IMAGE_FORMATS: [&str; 3] = ["jpg", "webp", "avif"];
const SESSION_EXPIRED_CODE: i64 = -100;
const SIGNATURE_REJECTED_STATUS: u16 = 406;
const HTML_ACCEPT: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8";
const JSON_ACCEPT: &str = "application/json, text/plain, */*";
const ACCEPT_LANGUAGE: &str = "zh-CN,zh;q=0.9";

const PATH_SAFE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'/');

static TOKEN_SNAKE: OnceLock<Regex> = OnceLock::new();
static TOKEN_CAMEL: OnceLock<Regex> = OnceLock::new();

/// Reads the Xiaohongshu response envelope.
pub fn check_envelope(response: &HttpResponse, context: &str) -> CollectResult<Value> {
    if response.status == SIGNATURE_REJECTED_STATUS {
        return Err(CollectError::SignatureRejected {
            status: response.status,
        });
    }
    if !response.is_success() {
        return Err(CollectError::Http {
            status: response.status,
            context: context.to_string(),
        });
    }
    let body = response.json()?;
    match body.get("code").and_then(Value::as_i64) {
        Some(0) => Ok(body),
        Some(SESSION_EXPIRED_CODE) => Err(CollectError::SessionExpired),
        code => Err(CollectError::Upstream {
            code: code.unwrap_or(-1),
            message: body
                .get("msg")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string(),
        }),
    }
}

/// `xsec_token` from a note page. Patterns anchored on the note id win over
/// the first token anywhere on the page.
pub fn token_from_html(html: &str, note_id: &str) -> Option<String> {
    let mut anchored = Vec::new();
    if !note_id.is_empty() {
        let id = regex::escape(note_id);
        for pattern in [
            format!(r#"(?s)"note_id"\s*:\s*"{id}".+?"xsec_token"\s*:\s*"([^"]+)""#),
            format!(r#"(?s)"noteId"\s*:\s*"{id}".+?"xsecToken"\s*:\s*"([^"]+)""#),
        ] {
            if let Ok(regex) = Regex::new(&pattern) {
                anchored.push(regex);
            }
        }
    }
    let generic = [
        cached_regex(&TOKEN_SNAKE, r#""xsec_token"\s*:\s*"([^"]+)""#),
        cached_regex(&TOKEN_CAMEL, r#""xsecToken"\s*:\s*"([^"]+)""#),
    ];
    let found = anchored
        .iter()
        .chain(generic)
        .find_map(|regex| regex.captures(html).map(|caps| caps[1].to_string()));
    found
}

pub struct XhsClient<T: Transport> {
    transport: T,
    session: SessionCredential,
    signer: XhsSigner,
    config: XhsSection,
}

impl<T: Transport> XhsClient<T> {
    pub fn new(transport: T, session: SessionCredential, config: XhsSection) -> Self {
        let signer = XhsSigner::new(config.app_id.clone());
        Self::with_signer(transport, session, config, signer)
    }

    pub fn with_signer(
        transport: T,
        session: SessionCredential,
        config: XhsSection,
        signer: XhsSigner,
    ) -> Self {
        Self {
            transport,
            session,
            signer,
            config,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}{path}", self.config.api_host)
    }

    fn web_url(&self, path: &str) -> String {
        format!("{}{path}", self.config.web_host)
    }

    async fn signed_get(
        &mut self,
        path: &str,
        params: &Map<String, Value>,
        referer: String,
    ) -> CollectResult<Value> {
        let url = self.api_url(path);
        let signed = self
            .signer
            .sign(&SignRequest::Get { url: &url, params }, &self.session)?;
        let request = HttpRequest::get(get_content_string(&url, params))
            .header("accept", JSON_ACCEPT)
            .header("accept-language", ACCEPT_LANGUAGE)
            .header("cookie", self.session.cookie())
            .header("origin", self.config.web_host.as_str())
            .header("referer", referer)
            .header("user-agent", self.session.user_agent())
            .headers(signed.headers());
        let response = self.transport.execute(request).await?;
        check_envelope(&response, path)
    }

    async fn signed_post(&mut self, path: &str, body: &Value, referer: String) -> CollectResult<Value> {
        let url = self.api_url(path);
        let signed = self
            .signer
            .sign(&SignRequest::Post { url: &url, body }, &self.session)?;
        let request = HttpRequest::post(url, serde_json::to_string(body)?)
            .header("content-type", "application/json;charset=UTF-8")
            .header("accept", JSON_ACCEPT)
            .header("origin", self.config.web_host.as_str())
            .header("referer", referer)
            .header("user-agent", self.session.user_agent())
            .header("cookie", self.session.cookie())
            .headers(signed.headers());
        let response = self.transport.execute(request).await?;
        check_envelope(&response, path)
    }

    async fn fetch_html(&self, url: &str) -> CollectResult<String> {
        let request = HttpRequest::get(url)
            .header("accept", HTML_ACCEPT)
            .header("accept-language", ACCEPT_LANGUAGE)
            .header("cache-control", "max-age=0")
            .header("upgrade-insecure-requests", "1")
            .header("user-agent", self.session.user_agent())
            .header("cookie", self.session.cookie())
            .header("referer", format!("{}/", self.config.web_host));
        let response = self.transport.execute(request).await?;
        if response.status != 200 {
            return Err(CollectError::Http {
                status: response.status,
                context: url.to_string(),
            });
        }
        Ok(response.body)
    }

    async fn list_profile(
        &mut self,
        user_id: &str,
        cursor: &PageCursor,
        remaining: usize,
    ) -> CollectResult<ListPage> {
        let mut params = Map::new();
        let num = remaining.min(self.config.profile_page_size).max(1);
        params.insert("num".into(), json!(num.to_string()));
        params.insert("cursor".into(), json!(cursor.token.clone().unwrap_or_default()));
        params.insert("user_id".into(), json!(user_id));
        params.insert("image_formats".into(), json!(IMAGE_FORMATS.join(",")));

        let referer = profile_url(user_id);
        let body = self.signed_get(USER_POSTED, &params, referer).await?;
        let data = body.get("data").cloned().unwrap_or(Value::Null);
        let items = data
            .get("notes")
            .and_then(Value::as_array)
            .map(|notes| {
                notes
                    .iter()
                    .filter_map(NoteHints::from_list_item)
                    .map(|mut hints| {
                        if hints.user.user_id.is_empty() {
                            hints.user.user_id = user_id.to_string();
                        }
                        hint_item(hints)
                    })
                    .collect()
            })
            .unwrap_or_default();
        let next_cursor = data
            .get("cursor")
            .and_then(Value::as_str)
            .filter(|cursor| !cursor.is_empty())
            .map(str::to_string);

        Ok(ListPage {
            items,
            has_more: data.get("has_more").and_then(Value::as_bool).unwrap_or(false)
                && next_cursor.is_some(),
            next: PageCursor {
                page: cursor.page + 1,
                token: next_cursor,
                offset: 0,
            },
        })
    }

    async fn search_page(
        &mut self,
        keyword: &str,
        sort: SortMode,
        type_filter: NoteTypeFilter,
        cursor: &PageCursor,
        remaining: usize,
    ) -> CollectResult<ListPage> {
        let page = cursor.page + 1;
        let page_size = remaining.min(self.config.search_page_size).max(1);
        let mut body = json!({
            "keyword": keyword,
            "page": page,
            "page_size": page_size,
            "sort": sort.xhs_value(),
            "note_type": type_filter.code(),
            "image_formats": IMAGE_FORMATS,
        });
        if let (Some(search_id), Some(object)) = (cursor.token.as_ref(), body.as_object_mut()) {
            object.insert("search_id".into(), json!(search_id));
        }

        let referer = self.web_url(&format!(
            "/search_result?keyword={}",
            utf8_percent_encode(keyword, PATH_SAFE)
        ));
        let response = self.signed_post(SEARCH_NOTES, &body, referer).await?;
        let data = response.get("data").cloned().unwrap_or(Value::Null);
        let items: Vec<ListItem> = ["items", "notes"]
            .iter()
            .filter_map(|key| data.get(*key).and_then(Value::as_array))
            .find(|list| !list.is_empty())
            .map(|list| {
                list.iter()
                    .filter_map(NoteHints::from_list_item)
                    .map(hint_item)
                    .collect()
            })
            .unwrap_or_default();
        let has_more = ["has_more", "hasMore"]
            .iter()
            .any(|key| data.get(*key).and_then(Value::as_bool).unwrap_or(false));
        let search_id = ["search_id", "searchId"]
            .iter()
            .find_map(|key| data.get(*key).and_then(Value::as_str))
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .or_else(|| cursor.token.clone());

        debug!(page, items = items.len(), has_more, "search page fetched");
        Ok(ListPage {
            items,
            has_more,
            next: PageCursor {
                page,
                token: search_id,
                offset: 0,
            },
        })
    }

    /// Search through the server-rendered result page.
    pub async fn search_html(&self, keyword: &str, max_items: usize) -> CollectResult<Vec<ListItem>> {
        let query: String = form_urlencoded::Serializer::new(String::new())
            .append_pair("keyword", keyword)
            .append_pair("source", "web_explore_feed")
            .finish();
        let html = self.fetch_html(&self.web_url(&format!("/search_result?{query}"))).await?;
        let state = parse_initial_state(&html)?;
        let feeds = state.pointer("/search/feeds").unwrap_or(&Value::Null);
        let list = match feeds {
            Value::Array(list) => Some(list),
            Value::Object(_) => ["value", "_value", "items", "list"]
                .iter()
                .filter_map(|key| feeds.get(*key).and_then(Value::as_array))
                .find(|list| !list.is_empty()),
            _ => None,
        };
        Ok(list
            .map(|list| {
                list.iter()
                    .filter_map(NoteHints::from_list_item)
                    .map(hint_item)
                    .take(max_items)
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn recover(&self, item: &ListItem) -> CollectResult<ListItem> {
        let html = self.fetch_html(&self.web_url(&format!("/explore/{}", item.id))).await?;
        let token = token_from_html(&html, &item.id).ok_or_else(|| {
            CollectError::ItemUnavailable(format!("note page for {} carries no xsec_token", item.id))
        })?;

        let mut hints = hints_for(item);
        match parse_initial_state(&html) {
            Ok(state) => {
                if let Some(page_hints) = NoteHints::from_note_state(&state, &item.id) {
                    hints.merge_from(&page_hints);
                }
            }
            Err(err) => debug!(item_id = %item.id, error = %err, "note page state unreadable"),
        }
        hints.xsec_token = token.clone();
        debug!(item_id = %item.id, "access token recovered from note page");
        Ok(ListItem::new(item.id.clone(), hints.to_value())
            .with_token(Some(token))
            .requiring_token())
    }

    async fn feed(&mut self, item: &ListItem) -> CollectResult<Value> {
        let body = json!({
            "source_note_id": item.id,
            "image_formats": IMAGE_FORMATS,
            "extra": {"need_body_topic": "1"},
            "xsec_source": "pc_user",
            "xsec_token": item.access_token.clone().unwrap_or_default(),
        });
        let referer = self.web_url(&format!("/explore/{}", item.id));
        let response = self.signed_post(FEED, &body, referer).await?;
        response
            .pointer("/data/items/0/note_card")
            .cloned()
            .ok_or_else(|| CollectError::ItemUnavailable(format!("feed returned no note for {}", item.id)))
    }

    /// Creator profile from the profile page's embedded state.
    pub async fn creator(&self, url: &str) -> CollectResult<CreatorProfile> {
        let user_id = parse_xhs_profile_url(url)?;
        let html = self.fetch_html(url.trim()).await?;
        let state = parse_initial_state(&html)?;
        let profile = creator_profile(&state, Some(&user_id))?;
        info!(user_id = %profile.user_id, fans = profile.fans, "creator profile collected");
        Ok(profile)
    }
}

fn hint_item(hints: NoteHints) -> ListItem {
    let token = Some(hints.xsec_token.clone());
    ListItem::new(hints.note_id.clone(), hints.to_value())
        .with_token(token)
        .requiring_token()
}

fn hints_for(item: &ListItem) -> NoteHints {
    let mut hints = NoteHints::from_list_item(&item.summary).unwrap_or_default();
    hints.note_id = item.id.clone();
    if let Some(token) = &item.access_token {
        hints.xsec_token = token.clone();
    }
    hints
}

#[async_trait(?Send)]
impl<T: Transport> PlatformSource for XhsClient<T> {
    fn platform(&self) -> Platform {
        Platform::Xhs
    }

    async fn resolve_target(&mut self, spec: &TargetSpec) -> CollectResult<TargetLocator> {
        match spec {
            TargetSpec::Profile(url) => Ok(TargetLocator::Profile {
                id: parse_xhs_profile_url(url)?,
            }),
            TargetSpec::Item(url) => {
                let (id, token) = parse_xhs_note_url(url)?;
                Ok(TargetLocator::Item { id, token })
            }
            TargetSpec::Keyword {
                text,
                sort,
                type_filter,
            } => keyword_locator(text, *sort, *type_filter),
        }
    }

    fn target_item(&self, id: &str, token: Option<&str>) -> ListItem {
        hint_item(NoteHints {
            note_id: id.to_string(),
            xsec_token: token.unwrap_or_default().to_string(),
            ..NoteHints::default()
        })
    }

    async fn list_page(
        &mut self,
        target: &TargetLocator,
        cursor: &PageCursor,
        remaining: usize,
    ) -> CollectResult<ListPage> {
        match target {
            TargetLocator::Profile { id } => self.list_profile(id, cursor, remaining).await,
            TargetLocator::Keyword {
                text,
                sort,
                type_filter,
            } => {
                self.search_page(text, *sort, *type_filter, cursor, remaining)
                    .await
            }
            TargetLocator::Item { id, .. } => Err(CollectError::LocatorFormat(format!(
                "note {id} is not a listing target"
            ))),
        }
    }

    async fn search_fallback(
        &mut self,
        target: &TargetLocator,
        max_items: usize,
    ) -> CollectResult<Option<Vec<ListItem>>> {
        match target {
            TargetLocator::Keyword { text, .. } => {
                let items = self.search_html(text, max_items).await?;
                warn!(items = items.len(), "search served from result page");
                Ok(Some(items))
            }
            _ => Ok(None),
        }
    }

    async fn recover_token(&mut self, item: &ListItem) -> CollectResult<ListItem> {
        self.recover(item).await
    }

    async fn fetch_detail(&mut self, item: &ListItem) -> CollectResult<Value> {
        self.feed(item).await
    }

    fn normalize(&self, item: &ListItem, detail: &Value) -> CollectResult<NormalizedRecord> {
        note_record(detail, &hints_for(item))
    }
}
