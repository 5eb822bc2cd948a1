use async_trait::async_trait;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde_json::{json, Value};
use tracing::{debug, info};
use url::form_urlencoded;

use crate::config::DouyinSection;
use crate::error::{CollectError, CollectResult};
use crate::locator::{
    keyword_locator, parse_douyin_user, parse_douyin_video_url, DouyinVideoRef, SortMode,
    TargetLocator, TargetSpec,
};
use crate::normalize::douyin::{creator_profile, has_full_detail, user_url, video_record};
use crate::normalize::{is_blank, CreatorProfile, NormalizedRecord, Platform};
use crate::pipeline::{ListItem, ListPage, PageCursor, PlatformSource};
use crate::session::SessionCredential;
use crate::sign::SignOracle;
use crate::transport::{HttpRequest, HttpResponse, Transport};

const USER_POSTS: &str = "/aweme/v1/web/aweme/post/";
const GENERAL_SEARCH: &str = "/aweme/v1/web/general/search/single/";
const VIDEO_DETAIL: &str = "/aweme/v1/web/aweme/detail/";
const USER_PROFILE: &str = "/aweme/v1/web/user/profile/other/";
const SEARCH_FROM_GROUP: &str = "7378810571505847586";
const WEBID_TEMPLATE: &str = "10000000-1000-4000-8000-100000000000";
const REDIRECT_STATUSES: [u16; 5] = [301, 302, 303, 307, 308];

const WEB_CLIENT_PARAMS: [(&str, &str); 24] = [
    ("device_platform", "webapp"),
    ("aid", "6383"),
    ("channel", "channel_pc_web"),
    ("version_code", "190600"),
    ("version_name", "19.6.0"),
    ("update_version_code", "170400"),
    ("pc_client_type", "1"),
    ("cookie_enabled", "true"),
    ("browser_language", "zh-CN"),
    ("browser_platform", "MacIntel"),
    ("browser_name", "Chrome"),
    ("browser_version", "125.0.0.0"),
    ("browser_online", "true"),
    ("engine_name", "Blink"),
    ("engine_version", "109.0"),
    ("os_name", "Mac OS"),
    ("os_version", "10.15.7"),
    ("cpu_core_num", "8"),
    ("device_memory", "8"),
    ("platform", "PC"),
    ("screen_width", "2560"),
    ("screen_height", "1440"),
    ("effective_type", "4g"),
    ("round_trip_time", "50"),
];

type Params = Vec<(String, String)>;

fn param(name: &str, value: impl ToString) -> (String, String) {
    (name.to_string(), value.to_string())
}

/// 19 decimal digits derived from a fixed template by replacing each 0, 1 or 8
/// digit `d` with `d ^ (r >> (d / 4))` for a random nibble `r`.
pub fn generate_webid<R: Rng>(rng: &mut R) -> String {
    let mut webid = String::with_capacity(40);
    for ch in WEBID_TEMPLATE.chars() {
        match ch.to_digit(10) {
            Some(digit @ (0 | 1 | 8)) => {
                let nibble: u32 = rng.gen_range(0..16);
                webid.push_str(&(digit ^ (nibble >> (digit / 4))).to_string());
            }
            Some(_) => webid.push(ch),
            None => {}
        }
    }
    webid.truncate(19);
    webid
}

pub fn encode_query(params: &[(String, String)]) -> String {
    form_urlencoded::Serializer::new(String::new())
        .extend_pairs(params.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .finish()
}

/// Reads the Douyin response envelope. A signed call answered with an
/// empty 200 body means the signature was refused.
pub fn check_envelope(response: &HttpResponse, context: &str, signed: bool) -> CollectResult<Value> {
    if response.status != 200 {
        return Err(CollectError::Http {
            status: response.status,
            context: context.to_string(),
        });
    }
    if signed && response.body.trim().is_empty() {
        return Err(CollectError::SignatureRejected {
            status: response.status,
        });
    }
    let body = response.json()?;
    match body.get("status_code") {
        None | Some(Value::Null) => Ok(body),
        Some(code) if code.as_i64() == Some(0) => Ok(body),
        Some(code) => Err(CollectError::Upstream {
            code: code.as_i64().unwrap_or(-1),
            message: body
                .get("status_msg")
                .and_then(Value::as_str)
                .filter(|msg| !msg.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| code.to_string()),
        }),
    }
}

pub struct DouyinClient<T: Transport> {
    transport: T,
    session: SessionCredential,
    oracle: Option<Box<dyn SignOracle>>,
    config: DouyinSection,
    webid: String,
}

impl<T: Transport> DouyinClient<T> {
    pub fn new(
        transport: T,
        session: SessionCredential,
        oracle: Option<Box<dyn SignOracle>>,
        config: DouyinSection,
    ) -> Self {
        let webid = generate_webid(&mut ChaCha8Rng::from_entropy());
        Self {
            transport,
            session,
            oracle,
            config,
            webid,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn webid(&self) -> &str {
        &self.webid
    }

    fn common_params(&self) -> Params {
        let mut params: Params = WEB_CLIENT_PARAMS
            .iter()
            .map(|(name, value)| param(name, value))
            .collect();
        params.push(param("webid", &self.webid));
        if let Some(ms_token) = self.session.ms_token() {
            params.push(param("msToken", ms_token));
        }
        params
    }

    async fn get(
        &self,
        path: &str,
        mut params: Params,
        referer: String,
        sign: bool,
    ) -> CollectResult<Value> {
        params.extend(self.common_params());
        let mut query = encode_query(&params);
        if sign {
            let oracle = self.oracle.as_ref().ok_or_else(|| {
                CollectError::SignOracleUnavailable("no sign oracle configured".to_string())
            })?;
            let token = oracle
                .sign(&query, self.session.user_agent())
                .await
                .map_err(|err| CollectError::SignOracleUnavailable(err.to_string()))?;
            query.push('&');
            query.push_str(&encode_query(&[param("a_bogus", token)]));
        }

        let request = HttpRequest::get(format!("{}{path}?{query}", self.config.host))
            .header("Accept", "application/json, text/plain, */*")
            .header("Origin", self.config.host.as_str())
            .header("Referer", referer)
            .header("User-Agent", self.session.user_agent())
            .header("Cookie", self.session.cookie());
        let response = self.transport.execute(request).await?;
        check_envelope(&response, path, sign)
    }

    /// Follows one redirect hop of a share link without fetching the target.
    pub async fn resolve_short_link(&self, url: &str) -> CollectResult<String> {
        let unresolved = || CollectError::LocatorFormat(format!("cannot resolve short link {url:?}"));
        let response = self
            .transport
            .execute(HttpRequest::get(url.trim()).no_redirects())
            .await
            .map_err(|err| {
                debug!(url, error = %err, "short link request failed");
                unresolved()
            })?;
        if !REDIRECT_STATUSES.contains(&response.status) {
            return Err(unresolved());
        }
        let location = response.header("location").ok_or_else(unresolved)?;
        match parse_douyin_video_url(location)? {
            DouyinVideoRef::Id(id) => Ok(id),
            DouyinVideoRef::ShortLink(_) => Err(unresolved()),
        }
    }

    async fn list_posts(&self, sec_user_id: &str, cursor: &PageCursor) -> CollectResult<ListPage> {
        let max_cursor = cursor.token.clone().unwrap_or_else(|| "0".to_string());
        let params = vec![
            param("sec_user_id", sec_user_id),
            param("count", self.config.posts_page_size),
            param("max_cursor", &max_cursor),
            param("locate_query", "false"),
            param("publish_video_strategy_type", 2),
            param("verifyFp", &self.config.verify_fp),
            param("fp", &self.config.verify_fp),
        ];
        let body = self
            .get(USER_POSTS, params, user_url(sec_user_id), true)
            .await?;
        let items = body
            .get("aweme_list")
            .and_then(Value::as_array)
            .map(|list| list.iter().filter_map(aweme_item).collect())
            .unwrap_or_default();
        let next = match body.get("max_cursor") {
            Some(Value::String(text)) if !text.is_empty() => text.clone(),
            Some(Value::Number(number)) => number.to_string(),
            _ => "0".to_string(),
        };
        Ok(ListPage {
            items,
            has_more: body.get("has_more").map(|flag| !is_blank(flag)).unwrap_or(false),
            next: PageCursor {
                page: cursor.page + 1,
                token: Some(next),
                offset: 0,
            },
        })
    }

    async fn search(
        &self,
        keyword: &str,
        sort: SortMode,
        cursor: &PageCursor,
        remaining: usize,
    ) -> CollectResult<ListPage> {
        let count = remaining.min(self.config.search_page_size).max(1);
        let search_id = cursor.token.clone().unwrap_or_default();
        let mut params = vec![
            param("search_channel", "aweme_general"),
            param("enable_history", "1"),
            param("keyword", keyword),
            param("search_source", "tab_search"),
            param("query_correct_type", "1"),
            param("is_filter_search", "0"),
            param("from_group_id", SEARCH_FROM_GROUP),
            param("offset", cursor.offset),
            param("count", count),
            param("need_filter_settings", "1"),
            param("list_type", "multi"),
            param("search_id", &search_id),
        ];
        let sort_value = sort.douyin_value();
        if sort_value != 0 {
            let filter = json!({"sort_type": sort_value.to_string(), "publish_time": "0"});
            params.push(param("filter_selected", filter));
            if let Some(slot) = params.iter_mut().find(|(name, _)| name == "is_filter_search") {
                slot.1 = "1".to_string();
            }
        }

        let referer = format!(
            "{}/search/{}?type=general",
            self.config.host,
            percent_encoding::utf8_percent_encode(keyword, percent_encoding::NON_ALPHANUMERIC)
        );
        let body = self.get(GENERAL_SEARCH, params, referer, false).await?;
        let items: Vec<ListItem> = body
            .get("data")
            .and_then(Value::as_array)
            .map(|list| list.iter().filter_map(search_entry).filter_map(aweme_item).collect())
            .unwrap_or_default();
        let next_search_id = body
            .pointer("/extra/logid")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .or(Some(search_id).filter(|id| !id.is_empty()));
        let has_more = body
            .get("has_more")
            .map(|flag| !is_blank(flag))
            .unwrap_or(!items.is_empty());

        Ok(ListPage {
            items,
            has_more,
            next: PageCursor {
                page: cursor.page + 1,
                token: next_search_id,
                offset: cursor.offset + count as u64,
            },
        })
    }

    async fn detail(&self, aweme_id: &str) -> CollectResult<Value> {
        let params = vec![param("aweme_id", aweme_id)];
        let referer = format!("{}/video/{aweme_id}", self.config.host);
        let body = self.get(VIDEO_DETAIL, params, referer, true).await?;
        body.get("aweme_detail")
            .filter(|detail| !is_blank(detail))
            .cloned()
            .ok_or_else(|| CollectError::ItemUnavailable(format!("no detail for video {aweme_id}")))
    }

    pub async fn creator(&self, url: &str) -> CollectResult<CreatorProfile> {
        let sec_user_id = parse_douyin_user(url)?;
        let params = vec![
            param("sec_user_id", &sec_user_id),
            param("publish_video_strategy_type", 2),
            param("personal_center_strategy", 1),
        ];
        let body = self
            .get(USER_PROFILE, params, user_url(&sec_user_id), true)
            .await?;
        let profile = creator_profile(&body, &sec_user_id)?;
        info!(user_id = %profile.user_id, fans = profile.fans, "creator profile collected");
        Ok(profile)
    }
}

/// The video inside a general-search entry: `aweme_info`, or the first item
/// of a mix.
fn search_entry(entry: &Value) -> Option<&Value> {
    entry
        .get("aweme_info")
        .filter(|info| !is_blank(info))
        .or_else(|| entry.pointer("/aweme_mix_info/mix_items/0"))
        .filter(|info| info.is_object())
}

fn aweme_item(aweme: &Value) -> Option<ListItem> {
    let id = match aweme.get("aweme_id")? {
        Value::String(text) if !text.is_empty() => text.clone(),
        Value::Number(number) => number.to_string(),
        _ => return None,
    };
    Some(ListItem::new(id, aweme.clone()).with_full_detail(has_full_detail(aweme)))
}

#[async_trait(?Send)]
impl<T: Transport> PlatformSource for DouyinClient<T> {
    fn platform(&self) -> Platform {
        Platform::Douyin
    }

    async fn resolve_target(&mut self, spec: &TargetSpec) -> CollectResult<TargetLocator> {
        match spec {
            TargetSpec::Profile(url) => Ok(TargetLocator::Profile {
                id: parse_douyin_user(url)?,
            }),
            TargetSpec::Item(url) => {
                let id = match parse_douyin_video_url(url)? {
                    DouyinVideoRef::Id(id) => id,
                    DouyinVideoRef::ShortLink(link) => self.resolve_short_link(&link).await?,
                };
                Ok(TargetLocator::Item { id, token: None })
            }
            TargetSpec::Keyword {
                text,
                sort,
                type_filter,
            } => keyword_locator(text, *sort, *type_filter),
        }
    }

    fn target_item(&self, id: &str, _token: Option<&str>) -> ListItem {
        ListItem::new(id, json!({ "aweme_id": id }))
    }

    async fn list_page(
        &mut self,
        target: &TargetLocator,
        cursor: &PageCursor,
        remaining: usize,
    ) -> CollectResult<ListPage> {
        match target {
            TargetLocator::Profile { id } => self.list_posts(id, cursor).await,
            TargetLocator::Keyword { text, sort, .. } => {
                self.search(text, *sort, cursor, remaining).await
            }
            TargetLocator::Item { id, .. } => Err(CollectError::LocatorFormat(format!(
                "video {id} is not a listing target"
            ))),
        }
    }

    async fn fetch_detail(&mut self, item: &ListItem) -> CollectResult<Value> {
        self.detail(&item.id).await
    }

    fn normalize(&self, _item: &ListItem, detail: &Value) -> CollectResult<NormalizedRecord> {
        video_record(detail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn webid_is_nineteen_digits() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        for _ in 0..50 {
            let webid = generate_webid(&mut rng);
            assert_eq!(webid.len(), 19);
            assert!(webid.chars().all(|c| c.is_ascii_digit()), "{webid}");
        }
    }

    #[test]
    fn query_encoding_matches_form_rules() {
        let query = encode_query(&[param("keyword", "latte art"), param("x", "a/b=c")]);
        assert_eq!(query, "keyword=latte+art&x=a%2Fb%3Dc");
    }

    #[test]
    fn envelope_classification() {
        assert!(matches!(
            check_envelope(&HttpResponse::new(403, ""), "detail", true),
            Err(CollectError::Http { status: 403, .. })
        ));
        assert!(matches!(
            check_envelope(&HttpResponse::new(200, ""), "detail", true),
            Err(CollectError::SignatureRejected { status: 200 })
        ));
        assert!(matches!(
            check_envelope(&HttpResponse::new(200, r#"{"status_code":8,"status_msg":"bad"}"#), "detail", true),
            Err(CollectError::Upstream { code: 8, .. })
        ));
        assert!(check_envelope(&HttpResponse::new(200, r#"{"status_code":0}"#), "detail", true).is_ok());
        assert!(check_envelope(&HttpResponse::new(200, r#"{"data":[]}"#), "search", false).is_ok());
    }

    #[test]
    fn search_entries_unwrap_mixes() {
        let entry = json!({"aweme_mix_info": {"mix_items": [{"aweme_id": "9"}]}});
        assert_eq!(search_entry(&entry).unwrap()["aweme_id"], "9");
        assert!(search_entry(&json!({"type": 999})).is_none());
        assert!(aweme_item(&json!({"desc": "no id"})).is_none());
        assert_eq!(aweme_item(&json!({"aweme_id": 12})).unwrap().id, "12");
    }
}
