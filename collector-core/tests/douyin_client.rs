mod support;

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};

use collector_core::config::DouyinSection;
use collector_core::{
    CollectError, CollectRequest, CollectionPipeline, DouyinClient, HttpResponse,
    NoteTypeFilter, PipelineConfig, SessionCredential, SignError, SignOracle, SignResult,
    SortMode, TargetSpec, Verdict,
};

use support::{quiet_pacer, MockTransport};

const SEC_UID: &str = "MS4wLjABAAAAv7iSuuXDJGDvJkmH_vz1qkDZYo1apxgzaxdBSeIuPiM";

#[derive(Clone, Default)]
struct MockOracle {
    queries: Arc<Mutex<Vec<String>>>,
    fail: bool,
}

#[async_trait(?Send)]
impl SignOracle for MockOracle {
    async fn sign(&self, query: &str, _user_agent: &str) -> SignResult<String> {
        self.queries.lock().unwrap().push(query.to_string());
        if self.fail {
            Err(SignError::Oracle("node exited with status 1".to_string()))
        } else {
            Ok("AB/123=".to_string())
        }
    }
}

fn session() -> SessionCredential {
    SessionCredential::new("msToken=mst-1; ttwid=tw; sessionid=s1", "Mozilla/5.0 test")
}

fn pipeline(
    transport: MockTransport,
    oracle: Option<MockOracle>,
) -> CollectionPipeline<DouyinClient<MockTransport>> {
    let oracle = oracle.map(|oracle| Box::new(oracle) as Box<dyn SignOracle>);
    let client = DouyinClient::new(transport, session(), oracle, DouyinSection::default());
    CollectionPipeline::new(
        client,
        quiet_pacer(),
        PipelineConfig {
            failed_preview: 5,
            pre_listing_pause: false,
        },
    )
}

fn aweme(id: &str, with_stats: bool) -> Value {
    let mut aweme = json!({
        "aweme_id": id,
        "desc": format!("clip {id} #coffee"),
        "create_time": 1_700_000_000,
        "author": {
            "sec_uid": SEC_UID,
            "nickname": "Roaster",
            "avatar_thumb": {"url_list": ["https://p3/avatar.jpeg"]}
        },
        "video": {
            "play_addr": {"url_list": ["https://v/low.mp4", "https://v/play.mp4"]},
            "cover": {"url_list": ["https://p3/cover.jpeg"]}
        },
        "text_extra": [{"hashtag_name": "coffee"}]
    });
    if with_stats {
        aweme["statistics"] = json!({"digg_count": 120, "collect_count": 8, "comment_count": 3, "share_count": 1});
    }
    aweme
}

fn query_pairs(url: &str) -> Vec<(String, String)> {
    let query = url.split_once('?').map(|(_, query)| query).unwrap_or_default();
    url::form_urlencoded::parse(query.as_bytes())
        .into_owned()
        .collect()
}

fn query_value(url: &str, name: &str) -> Option<String> {
    query_pairs(url)
        .into_iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value)
}

#[tokio::test]
async fn profile_posts_are_signed_and_need_no_detail_call() {
    let transport = MockTransport::new().json(
        "/aweme/v1/web/aweme/post/",
        json!({
            "status_code": 0,
            "has_more": 0,
            "max_cursor": 1_699_000_000_000i64,
            "aweme_list": [aweme("7311", true), aweme("7312", true)]
        }),
    );
    let oracle = MockOracle::default();
    let mut pipeline = pipeline(transport.clone(), Some(oracle.clone()));

    let result = pipeline
        .run(CollectRequest::new(
            TargetSpec::Profile(format!("https://www.douyin.com/user/{SEC_UID}?from_tab_name=main")),
            10,
        ))
        .await
        .unwrap();

    assert_eq!(result.verdict(), Verdict::Succeeded);
    assert_eq!(result.list_calls, 1);
    assert!(transport.requests_to("/aweme/detail/").is_empty());

    let record = &result.records[0];
    assert_eq!(record.item_id, "7311");
    assert_eq!(record.video_url, "https://v/play.mp4");
    assert_eq!(record.note_type, "video");
    assert_eq!(record.liked, 120);
    assert_eq!(record.published_at_ms, 1_700_000_000_000);
    assert_eq!(record.tags, vec!["coffee"]);
    assert_eq!(record.note_url, "https://www.douyin.com/video/7311");
    assert_eq!(record.author.home_url, format!("https://www.douyin.com/user/{SEC_UID}"));

    let requests = transport.requests();
    let url = &requests[0].url;
    assert_eq!(query_value(url, "sec_user_id").as_deref(), Some(SEC_UID));
    assert_eq!(query_value(url, "count").as_deref(), Some("18"));
    assert_eq!(query_value(url, "max_cursor").as_deref(), Some("0"));
    assert_eq!(query_value(url, "device_platform").as_deref(), Some("webapp"));
    assert_eq!(query_value(url, "aid").as_deref(), Some("6383"));
    assert_eq!(query_value(url, "msToken").as_deref(), Some("mst-1"));
    assert_eq!(query_value(url, "webid").map(|id| id.len()), Some(19));
    assert_eq!(query_value(url, "a_bogus").as_deref(), Some("AB/123="));
    assert_eq!(requests[0].header_value("cookie"), Some("msToken=mst-1; ttwid=tw; sessionid=s1"));

    let signed = oracle.queries.lock().unwrap().clone();
    assert_eq!(signed.len(), 1);
    assert!(signed[0].starts_with("sec_user_id="));
    assert!(!signed[0].contains("a_bogus"));
}

#[tokio::test]
async fn profile_pages_follow_max_cursor() {
    let transport = MockTransport::new()
        .json(
            "/aweme/v1/web/aweme/post/",
            json!({"status_code": 0, "has_more": 1, "max_cursor": 1_699_000_000_000i64, "aweme_list": [aweme("1", true)]}),
        )
        .json(
            "/aweme/v1/web/aweme/post/",
            json!({"status_code": 0, "has_more": 0, "max_cursor": 0, "aweme_list": [aweme("2", true)]}),
        );
    let mut pipeline = pipeline(transport.clone(), Some(MockOracle::default()));

    let result = pipeline
        .run(CollectRequest::new(TargetSpec::Profile(SEC_UID.into()), 10))
        .await
        .unwrap();

    assert_eq!(result.list_calls, 2);
    assert_eq!(result.success_count, 2);
    let requests = transport.requests();
    assert_eq!(
        query_value(&requests[1].url, "max_cursor").as_deref(),
        Some("1699000000000")
    );
}

#[tokio::test]
async fn signed_call_without_oracle_fails_the_run() {
    let transport = MockTransport::new();
    let mut pipeline = pipeline(transport.clone(), None);

    let err = pipeline
        .run(CollectRequest::new(TargetSpec::Profile(SEC_UID.into()), 5))
        .await
        .unwrap_err();

    assert!(matches!(err, CollectError::SignOracleUnavailable(_)));
    assert!(transport.requests().is_empty());
}

#[tokio::test]
async fn oracle_failure_is_run_fatal() {
    let transport = MockTransport::new();
    let oracle = MockOracle {
        fail: true,
        ..MockOracle::default()
    };
    let mut pipeline = pipeline(transport.clone(), Some(oracle));

    let err = pipeline
        .run(CollectRequest::new(TargetSpec::Profile(SEC_UID.into()), 5))
        .await
        .unwrap_err();

    match err {
        CollectError::SignOracleUnavailable(message) => assert!(message.contains("status 1")),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn empty_signed_response_is_a_rejected_signature() {
    let transport = MockTransport::new().route("/aweme/v1/web/aweme/post/", HttpResponse::new(200, ""));
    let mut pipeline = pipeline(transport, Some(MockOracle::default()));

    let err = pipeline
        .run(CollectRequest::new(TargetSpec::Profile(SEC_UID.into()), 5))
        .await
        .unwrap_err();

    assert!(matches!(err, CollectError::SignatureRejected { status: 200 }));
}

#[tokio::test]
async fn short_link_resolves_to_a_video_detail() {
    let transport = MockTransport::new()
        .route(
            "v.douyin.com",
            HttpResponse::new(302, "")
                .with_header("Location", "https://www.iesdouyin.com/share/video/7311/?region=CN"),
        )
        .json(
            "/aweme/v1/web/aweme/detail/",
            json!({"status_code": 0, "aweme_detail": aweme("7311", true)}),
        );
    let mut pipeline = pipeline(transport.clone(), Some(MockOracle::default()));

    let result = pipeline
        .run(CollectRequest::new(
            TargetSpec::Item("https://v.douyin.com/iRNBho6u/".into()),
            10,
        ))
        .await
        .unwrap();

    assert_eq!(result.records[0].item_id, "7311");
    let short = transport.requests_to("v.douyin.com");
    assert!(!short[0].follow_redirects);
    let detail = transport.requests_to("/aweme/detail/");
    assert_eq!(query_value(&detail[0].url, "aweme_id").as_deref(), Some("7311"));
    assert!(query_value(&detail[0].url, "a_bogus").is_some());
}

#[tokio::test]
async fn short_link_without_redirect_is_a_locator_error() {
    let transport =
        MockTransport::new().route("v.douyin.com", HttpResponse::new(200, "<html></html>"));
    let mut pipeline = pipeline(transport.clone(), Some(MockOracle::default()));

    let err = pipeline
        .run(CollectRequest::new(
            TargetSpec::Item("https://v.douyin.com/iRNBho6u/".into()),
            10,
        ))
        .await
        .unwrap_err();

    assert!(matches!(err, CollectError::LocatorFormat(_)));
    assert!(transport.requests_to("/aweme/detail/").is_empty());
}

#[tokio::test]
async fn missing_video_detail_fails_only_that_item() {
    let transport = MockTransport::new().json(
        "/aweme/v1/web/aweme/detail/",
        json!({"status_code": 0, "aweme_detail": null}),
    );
    let mut pipeline = pipeline(transport, Some(MockOracle::default()));

    let result = pipeline
        .run(CollectRequest::new(
            TargetSpec::Item("https://www.douyin.com/video/7311".into()),
            10,
        ))
        .await
        .unwrap();

    assert_eq!(result.fail_count, 1);
    assert_eq!(result.failed_ids, vec!["7311"]);
}

#[tokio::test]
async fn search_is_unsigned_and_pages_by_offset() {
    let transport = MockTransport::new()
        .json(
            "/aweme/v1/web/general/search/single/",
            json!({
                "status_code": 0,
                "has_more": 1,
                "extra": {"logid": "log-1"},
                "data": [
                    {"type": 1, "aweme_info": aweme("9001", true)},
                    {"type": 1, "aweme_info": aweme("9002", false)},
                    {"type": 999, "user_list": []}
                ]
            }),
        )
        .json(
            "/aweme/v1/web/general/search/single/",
            json!({
                "status_code": 0,
                "has_more": 0,
                "data": [{"aweme_mix_info": {"mix_items": [aweme("9003", true)]}}]
            }),
        )
        .json(
            "/aweme/v1/web/aweme/detail/",
            json!({"status_code": 0, "aweme_detail": aweme("9002", true)}),
        );
    let oracle = MockOracle::default();
    let mut pipeline = pipeline(transport.clone(), Some(oracle.clone()));

    let result = pipeline
        .run(CollectRequest::new(
            TargetSpec::Keyword {
                text: "pour over".into(),
                sort: SortMode::Latest,
                type_filter: NoteTypeFilter::All,
            },
            4,
        ))
        .await
        .unwrap();

    let ids: Vec<_> = result.records.iter().map(|record| record.item_id.as_str()).collect();
    assert_eq!(ids, vec!["9001", "9002", "9003"]);
    assert_eq!(result.list_calls, 2);

    let searches = transport.requests_to("/general/search/single/");
    let first = &searches[0].url;
    assert_eq!(query_value(first, "keyword").as_deref(), Some("pour over"));
    assert_eq!(query_value(first, "offset").as_deref(), Some("0"));
    assert_eq!(query_value(first, "count").as_deref(), Some("4"));
    assert_eq!(query_value(first, "is_filter_search").as_deref(), Some("1"));
    assert_eq!(
        query_value(first, "filter_selected").as_deref(),
        Some(r#"{"sort_type":"2","publish_time":"0"}"#)
    );
    assert!(query_value(first, "a_bogus").is_none());

    let second = &searches[1].url;
    assert_eq!(query_value(second, "offset").as_deref(), Some("4"));
    assert_eq!(query_value(second, "count").as_deref(), Some("2"));
    assert_eq!(query_value(second, "search_id").as_deref(), Some("log-1"));

    // only the detail call for the stats-less entry was signed
    assert_eq!(oracle.queries.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn upstream_status_code_surfaces_as_upstream_error() {
    let transport = MockTransport::new().json(
        "/aweme/v1/web/general/search/single/",
        json!({"status_code": 2483, "status_msg": "search busy"}),
    );
    let mut pipeline = pipeline(transport, None);

    let err = pipeline
        .run(CollectRequest::new(
            TargetSpec::Keyword {
                text: "latte".into(),
                sort: SortMode::General,
                type_filter: NoteTypeFilter::All,
            },
            4,
        ))
        .await
        .unwrap_err();

    assert!(matches!(err, CollectError::Upstream { code: 2483, ref message } if message == "search busy"));
}

#[tokio::test]
async fn creator_profile_reads_the_user_block() {
    let transport = MockTransport::new().json(
        "/aweme/v1/web/user/profile/other/",
        json!({
            "status_code": 0,
            "user": {
                "nickname": "Roaster",
                "unique_id": "roaster01",
                "signature": "beans daily",
                "gender": 2,
                "ip_location": "IP: Hangzhou",
                "following_count": 12,
                "max_follower_count": 5400,
                "follower_count": 5300,
                "total_favorited": "8.8万",
                "avatar_300x300": {"url_list": ["https://p3/a300.jpeg"]}
            }
        }),
    );
    let client = DouyinClient::new(
        transport,
        session(),
        Some(Box::new(MockOracle::default())),
        DouyinSection::default(),
    );

    let profile = client
        .creator(&format!("https://www.douyin.com/user/{SEC_UID}"))
        .await
        .unwrap();

    assert_eq!(profile.user_id, SEC_UID);
    assert_eq!(profile.handle, "roaster01");
    assert_eq!(profile.fans, 5400);
    assert_eq!(profile.likes_and_collects, 88_000);
    assert_eq!(profile.avatar, "https://p3/a300.jpeg");
}
