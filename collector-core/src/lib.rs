pub mod collaborators;
pub mod config;
pub mod error;
pub mod locator;
pub mod normalize;
pub mod pipeline;
pub mod platform;
pub mod session;
pub mod sign;
pub mod transport;

pub use collaborators::{
    EntitlementCheck, EntitlementDecision, JsonLinesSink, RecordSink, SinkReport,
    StaticEntitlement,
};
pub use config::{load_collector_config, CollectorConfig};
pub use error::{CollectError, CollectResult, ConfigError, Result};
pub use locator::{
    keyword_locator, parse_douyin_user, parse_douyin_video_url, parse_table_url,
    parse_xhs_note_url, parse_xhs_profile_url, DouyinVideoRef, NoteTypeFilter, SortMode,
    TableLocator, TargetLocator, TargetSpec,
};
pub use normalize::{Author, CreatorProfile, Gender, NormalizedRecord, Platform};
pub use pipeline::{
    CollectRequest, CollectionPipeline, CollectionResult, ListItem, ListPage, Pacer, PageCursor,
    PipelineConfig, PipelineState, PlatformSource, Verdict,
};
pub use platform::{DouyinClient, XhsClient};
pub use session::SessionCredential;
pub use sign::{SignError, SignOracle, SignResult, SignedHeaderSet, XhsSigner};
pub use transport::{HttpMethod, HttpRequest, HttpResponse, ReqwestTransport, Transport};
