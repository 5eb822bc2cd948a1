use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::info;

use collector_core::sign::{CommandSignOracle, SignRequest};
use collector_core::{
    load_collector_config, parse_table_url, CollectError, CollectRequest, CollectionPipeline,
    CollectionResult, CollectorConfig, ConfigError, CreatorProfile, DouyinClient,
    EntitlementCheck, JsonLinesSink, NormalizedRecord, NoteTypeFilter, Pacer, Platform,
    PipelineConfig, PlatformSource, RecordSink, ReqwestTransport, SessionCredential, SignOracle,
    SignedHeaderSet, SinkReport, SortMode, StaticEntitlement, TargetSpec, Verdict, XhsClient,
    XhsSigner,
};

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("{0}")]
    Collect(#[from] CollectError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("authentication failed ({code}): {message}")]
    Authentication { code: i64, message: String },
    #[error("session cookie missing, pass --cookie or set COLLECTORCTL_COOKIE")]
    MissingCookie,
    #[error("every item failed ({total}): {preview}")]
    RunFailed { total: usize, preview: String },
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Signed-request collector for Xiaohongshu and Douyin", long_about = None)]
pub struct Cli {
    /// Path to collector.toml
    #[arg(long, default_value = "configs/collector.toml")]
    pub config: PathBuf,
    /// Logged-in session cookie
    #[arg(long, env = "COLLECTORCTL_COOKIE", hide_env_values = true)]
    pub cookie: Option<String>,
    /// User agent sent with every request (defaults to http.default_user_agent)
    #[arg(long)]
    pub user_agent: Option<String>,
    /// Entitlement key
    #[arg(long, env = "COLLECTORCTL_KEY", hide_env_values = true)]
    pub key: Option<String>,
    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
    /// Table link (`.../base/{namespace}?table={id}`); records are appended to its JSON-lines file
    #[arg(long)]
    pub table_url: Option<String>,
    /// Overrides sink.dir
    #[arg(long)]
    pub sink_dir: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Xiaohongshu notes and creators
    #[command(subcommand)]
    Xhs(XhsCommands),
    /// Douyin videos and creators
    #[command(subcommand)]
    Douyin(DouyinCommands),
    /// Prints the signed header set for one request
    Sign(SignArgs),
}

#[derive(Subcommand, Debug)]
pub enum XhsCommands {
    /// Notes published by a profile
    Profile(ListArgs),
    /// One note
    Note(UrlArgs),
    /// Keyword search
    Search(XhsSearchArgs),
    /// Creator profile
    Creator(UrlArgs),
}

#[derive(Subcommand, Debug)]
pub enum DouyinCommands {
    /// Videos published by a creator
    Videos(ListArgs),
    /// One video (full link, share link or id)
    Video(UrlArgs),
    /// Keyword search
    Search(DouyinSearchArgs),
    /// Creator profile
    Creator(UrlArgs),
}

#[derive(Args, Debug)]
pub struct UrlArgs {
    pub url: String,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    pub url: String,
    /// Item cap, clamped to collection.max_items_limit
    #[arg(long)]
    pub max: Option<usize>,
}

#[derive(Args, Debug)]
pub struct XhsSearchArgs {
    pub keyword: String,
    #[arg(long)]
    pub max: Option<usize>,
    /// general, hot or latest
    #[arg(long, default_value = "general", value_parser = parse_sort)]
    pub sort: SortMode,
    /// 0 all, 1 image, 2 video
    #[arg(long, default_value_t = 0, value_parser = parse_note_type)]
    pub note_type: u8,
}

#[derive(Args, Debug)]
pub struct DouyinSearchArgs {
    pub keyword: String,
    #[arg(long)]
    pub max: Option<usize>,
    /// general, most_like or latest
    #[arg(long, default_value = "general", value_parser = parse_sort)]
    pub sort: SortMode,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum SignMethod {
    Get,
    Post,
}

#[derive(Args, Debug)]
pub struct SignArgs {
    /// Full API URL; GET parameters are read from its query string
    pub url: String,
    #[arg(long, value_enum, default_value_t = SignMethod::Get)]
    pub method: SignMethod,
    /// JSON body for POST requests
    #[arg(long)]
    pub body: Option<String>,
}

fn parse_sort(value: &str) -> std::result::Result<SortMode, String> {
    SortMode::from_str(value).map_err(|err| err.to_string())
}

fn parse_note_type(value: &str) -> std::result::Result<u8, String> {
    let code: u8 = value
        .parse()
        .map_err(|_| format!("note type must be 0, 1 or 2, got {value:?}"))?;
    NoteTypeFilter::from_code(code)
        .map(|_| code)
        .map_err(|err| err.to_string())
}

pub fn run(cli: Cli) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(execute(cli))
}

async fn execute(cli: Cli) -> Result<()> {
    let config = load_collector_config(&cli.config)?;
    enforce_entitlement(&config, cli.key.as_deref()).await?;
    let session = session_for(&cli, &config)?;

    match &cli.command {
        Commands::Xhs(command) => {
            let transport = ReqwestTransport::new(&config.http)?;
            let client = XhsClient::new(transport, session, config.xhs.clone());
            let (target, max) = match command {
                XhsCommands::Creator(args) => {
                    let profile = client.creator(&args.url).await?;
                    return render(&profile, cli.format);
                }
                XhsCommands::Profile(args) => (TargetSpec::Profile(args.url.clone()), args.max),
                XhsCommands::Note(args) => (TargetSpec::Item(args.url.clone()), Some(1)),
                XhsCommands::Search(args) => (
                    TargetSpec::Keyword {
                        text: args.keyword.clone(),
                        sort: args.sort,
                        type_filter: NoteTypeFilter::from_code(args.note_type)?,
                    },
                    args.max,
                ),
            };
            let pacer = Pacer::new(&config.pacing, None);
            let result = collect(client, pacer, &config, target, max).await?;
            finish(&cli, &config, result).await
        }
        Commands::Douyin(command) => {
            let transport = ReqwestTransport::new(&config.http)?;
            let client =
                DouyinClient::new(transport, session, sign_oracle(&config), config.douyin.clone());
            let (target, max) = match command {
                DouyinCommands::Creator(args) => {
                    let profile = client.creator(&args.url).await?;
                    return render(&profile, cli.format);
                }
                DouyinCommands::Videos(args) => (TargetSpec::Profile(args.url.clone()), args.max),
                DouyinCommands::Video(args) => (TargetSpec::Item(args.url.clone()), Some(1)),
                DouyinCommands::Search(args) => (
                    TargetSpec::Keyword {
                        text: args.keyword.clone(),
                        sort: args.sort,
                        type_filter: NoteTypeFilter::All,
                    },
                    args.max,
                ),
            };
            let pacer = Pacer::new(&config.pacing, Some(config.douyin.page_delay_secs));
            let result = collect(client, pacer, &config, target, max).await?;
            finish(&cli, &config, result).await
        }
        Commands::Sign(args) => {
            let headers = sign_headers(&config, &session, args)?;
            render(&headers, cli.format)
        }
    }
}

async fn enforce_entitlement(config: &CollectorConfig, key: Option<&str>) -> Result<()> {
    let gate = StaticEntitlement::new(config.entitlement.keys.iter().cloned());
    let decision = gate.check(key.unwrap_or_default()).await?;
    if decision.allowed {
        Ok(())
    } else {
        Err(AppError::Authentication {
            code: decision.code,
            message: decision.message,
        })
    }
}

fn session_for(cli: &Cli, config: &CollectorConfig) -> Result<SessionCredential> {
    let cookie = cli
        .cookie
        .as_deref()
        .map(str::trim)
        .filter(|cookie| !cookie.is_empty())
        .ok_or(AppError::MissingCookie)?;
    let user_agent = cli
        .user_agent
        .clone()
        .unwrap_or_else(|| config.http.default_user_agent.clone());
    Ok(SessionCredential::new(cookie, user_agent))
}

fn sign_oracle(config: &CollectorConfig) -> Option<Box<dyn SignOracle>> {
    config.douyin.oracle.as_ref().map(|oracle| {
        Box::new(CommandSignOracle::new(
            &oracle.program,
            oracle.args.clone(),
            Duration::from_secs(oracle.timeout_secs),
        )) as Box<dyn SignOracle>
    })
}

async fn collect<S: PlatformSource>(
    source: S,
    pacer: Pacer,
    config: &CollectorConfig,
    target: TargetSpec,
    max: Option<usize>,
) -> Result<CollectionResult> {
    let request = CollectRequest::new(target, config.clamp_max_items(max));
    let mut pipeline = CollectionPipeline::new(source, pacer, PipelineConfig::from_config(config));
    Ok(pipeline.run(request).await?)
}

async fn finish(cli: &Cli, config: &CollectorConfig, result: CollectionResult) -> Result<()> {
    let sink = match &cli.table_url {
        Some(table_url) if !result.records.is_empty() => {
            let dir = cli
                .sink_dir
                .clone()
                .unwrap_or_else(|| PathBuf::from(&config.sink.dir));
            Some(write_records(dir, config.sink.batch_size, table_url, &result).await?)
        }
        _ => None,
    };

    let summary = RunSummary::new(result, sink);
    render(&summary, cli.format)?;
    match summary.verdict {
        Verdict::Failed { total, preview } => Err(AppError::RunFailed {
            total,
            preview: preview.join(", "),
        }),
        _ => Ok(()),
    }
}

async fn write_records(
    dir: PathBuf,
    batch_size: usize,
    table_url: &str,
    result: &CollectionResult,
) -> Result<SinkReport> {
    let destination = parse_table_url(table_url)?;
    let sink = JsonLinesSink::new(dir, batch_size);
    let report = sink.write(&destination, &result.records).await?;
    info!(
        path = %sink.path_for(&destination).display(),
        written = report.total_success,
        "records written to sink"
    );
    Ok(report)
}

/// Signs one request the way the Xiaohongshu client would send it.
fn sign_headers(
    config: &CollectorConfig,
    session: &SessionCredential,
    args: &SignArgs,
) -> Result<SignedHeaderSet> {
    let mut signer = XhsSigner::new(config.xhs.app_id.clone());
    let (base, query) = args
        .url
        .split_once('?')
        .unwrap_or((args.url.as_str(), ""));
    let signed = match args.method {
        SignMethod::Get => {
            let params: Map<String, Value> = url::form_urlencoded::parse(query.as_bytes())
                .map(|(key, value)| (key.into_owned(), Value::String(value.into_owned())))
                .collect();
            signer.sign(&SignRequest::Get { url: base, params: &params }, session)
        }
        SignMethod::Post => {
            let body: Value = serde_json::from_str(args.body.as_deref().unwrap_or("{}"))?;
            signer.sign(&SignRequest::Post { url: &args.url, body: &body }, session)
        }
    };
    signed.map_err(|err| AppError::Collect(err.into()))
}

/// Rendered outcome of one run. A run where every item failed reports its ids
/// only through `verdict.preview`.
#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub platform: Platform,
    pub verdict: Verdict,
    pub success_count: usize,
    pub fail_count: usize,
    pub list_calls: usize,
    pub total_wait_ms: u64,
    pub duration_secs: u64,
    pub records: Vec<NormalizedRecord>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed_ids: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sink: Option<SinkReport>,
}

impl RunSummary {
    pub fn new(result: CollectionResult, sink: Option<SinkReport>) -> Self {
        let verdict = result.verdict();
        let (failed_ids, errors) = match verdict {
            Verdict::Failed { .. } => (Vec::new(), Vec::new()),
            _ => (result.failed_ids, result.errors),
        };
        Self {
            platform: result.platform,
            verdict,
            success_count: result.success_count,
            fail_count: result.fail_count,
            list_calls: result.list_calls,
            total_wait_ms: result.total_wait_ms,
            duration_secs: result.duration_secs,
            records: result.records,
            failed_ids,
            errors,
            sink,
        }
    }
}

fn render<T>(value: &T, format: OutputFormat) -> Result<()>
where
    T: Serialize + DisplayFallback,
{
    match format {
        OutputFormat::Text => {
            println!("{}", value.display());
            Ok(())
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{}", json);
            Ok(())
        }
    }
}

trait DisplayFallback {
    fn display(&self) -> String;
}

impl DisplayFallback for RunSummary {
    fn display(&self) -> String {
        let result = self;
        let headline = match &self.verdict {
            Verdict::Succeeded => "succeeded".to_string(),
            Verdict::PartiallySucceeded => "partially succeeded".to_string(),
            Verdict::Failed { total, .. } => format!("failed ({total} items)"),
            Verdict::Empty => "nothing found".to_string(),
        };
        let mut lines = vec![
            format!("{}: {headline}", result.platform),
            format!(
                "  collected {} / failed {} in {}s ({} list calls, {:.1}s waiting)",
                result.success_count,
                result.fail_count,
                result.duration_secs,
                result.list_calls,
                result.total_wait_ms as f64 / 1000.0
            ),
        ];
        for record in &result.records {
            lines.push(format!(
                "  - {} [{}] {} | likes {} | {}",
                record.item_id,
                record.note_type,
                if record.title.is_empty() { "-" } else { record.title.as_str() },
                record.liked,
                record.note_url
            ));
        }
        if let Verdict::Failed { preview, total } = &self.verdict {
            let mut failed = preview.join(", ");
            if *total > preview.len() {
                failed.push_str(&format!(" (+{} more)", total - preview.len()));
            }
            lines.push(format!("  failed ids: {failed}"));
        } else if !result.errors.is_empty() {
            lines.push("  errors:".to_string());
            for error in &result.errors {
                lines.push(format!("    {error}"));
            }
        }
        if let Some(sink) = &self.sink {
            lines.push(format!(
                "  sink: {} written, {} failed",
                sink.total_success, sink.total_failed
            ));
        }
        lines.join("\n")
    }
}

impl DisplayFallback for CreatorProfile {
    fn display(&self) -> String {
        let mut lines = vec![
            format!("{} ({}) on {}", self.nickname, self.user_id, self.platform),
            format!(
                "  follows {} | fans {} | likes+collects {}",
                self.follows, self.fans, self.likes_and_collects
            ),
        ];
        for (label, value) in [
            ("handle", &self.handle),
            ("bio", &self.bio),
            ("ip", &self.ip_location),
            ("home", &self.home_url),
        ] {
            if !value.is_empty() {
                lines.push(format!("  {label}: {value}"));
            }
        }
        if !self.tags.is_empty() {
            lines.push(format!("  tags: {}", self.tags.join(", ")));
        }
        lines.join("\n")
    }
}

impl DisplayFallback for SignedHeaderSet {
    fn display(&self) -> String {
        self.headers()
            .into_iter()
            .map(|(name, value)| format!("{name}: {value}"))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use collector_core::Author;

    fn fixture_config() -> CollectorConfig {
        load_collector_config("../configs/collector.toml").unwrap()
    }

    fn cli(args: &[&str]) -> Cli {
        let mut argv = vec!["collectorctl"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    fn record(id: &str) -> NormalizedRecord {
        NormalizedRecord {
            platform: Platform::Xhs,
            item_id: id.to_string(),
            title: format!("note {id}"),
            body: String::new(),
            note_type: "normal".into(),
            note_url: format!("https://www.xiaohongshu.com/explore/{id}"),
            cover_url: String::new(),
            image_urls: Vec::new(),
            video_url: String::new(),
            tags: Vec::new(),
            liked: 7,
            collected: 0,
            comments: 0,
            shares: 0,
            published_at_ms: 0,
            author: Author::default(),
        }
    }

    #[test]
    fn parses_search_flags() {
        let cli = cli(&[
            "--cookie",
            "a1=abc",
            "--format",
            "json",
            "xhs",
            "search",
            "coffee",
            "--max",
            "5",
            "--sort",
            "latest",
            "--note-type",
            "2",
        ]);
        assert!(matches!(cli.format, OutputFormat::Json));
        match cli.command {
            Commands::Xhs(XhsCommands::Search(args)) => {
                assert_eq!(args.keyword, "coffee");
                assert_eq!(args.max, Some(5));
                assert_eq!(args.sort, SortMode::Latest);
                assert_eq!(args.note_type, 2);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn douyin_sort_spellings_are_accepted() {
        let cli = cli(&["douyin", "search", "latte", "--sort", "most_like"]);
        match cli.command {
            Commands::Douyin(DouyinCommands::Search(args)) => {
                assert_eq!(args.sort, SortMode::MostPopular)
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn rejects_bad_note_type_and_sort() {
        let argv = ["collectorctl", "xhs", "search", "tea", "--note-type", "3"];
        assert!(Cli::try_parse_from(argv).is_err());
        let argv = ["collectorctl", "xhs", "search", "tea", "--sort", "random"];
        assert!(Cli::try_parse_from(argv).is_err());
    }

    #[test]
    fn missing_cookie_is_reported() {
        let mut cli = cli(&["xhs", "note", "https://www.xiaohongshu.com/explore/abc"]);
        cli.cookie = None;
        assert!(matches!(
            session_for(&cli, &fixture_config()),
            Err(AppError::MissingCookie)
        ));
    }

    #[test]
    fn user_agent_defaults_to_config() {
        let mut cli = cli(&["xhs", "note", "https://www.xiaohongshu.com/explore/abc"]);
        cli.cookie = Some("a1=abc".into());
        let config = fixture_config();
        let session = session_for(&cli, &config).unwrap();
        assert_eq!(session.user_agent(), config.http.default_user_agent);
        assert_eq!(session.identity(), Some("abc"));
    }

    #[tokio::test]
    async fn entitlement_gate_uses_configured_keys() {
        let mut config = fixture_config();
        assert!(enforce_entitlement(&config, None).await.is_ok());

        config.entitlement.keys = vec!["k-1".into()];
        assert!(enforce_entitlement(&config, Some("k-1")).await.is_ok());
        let err = enforce_entitlement(&config, Some("nope")).await.unwrap_err();
        assert!(matches!(err, AppError::Authentication { code: 401, .. }));
    }

    #[test]
    fn sign_command_produces_the_header_set() {
        let config = fixture_config();
        let session = SessionCredential::new("a1=18c4ed5b1f9abcdef; web_session=1", "UA");
        let args = SignArgs {
            url: "https://edith.xiaohongshu.com/api/sns/web/v1/user_posted?num=30&cursor=&user_id=5ff0".into(),
            method: SignMethod::Get,
            body: None,
        };
        let headers = sign_headers(&config, &session, &args).unwrap();
        assert!(headers.primary_token.starts_with("XYS_"));
        let text = headers.display();
        assert!(text.starts_with("x-s: XYS_"));
        assert_eq!(text.lines().count(), 5);

        let post = SignArgs {
            url: "https://edith.xiaohongshu.com/api/sns/web/v1/feed".into(),
            method: SignMethod::Post,
            body: Some(r#"{"source_note_id":"abc"}"#.into()),
        };
        assert!(sign_headers(&config, &session, &post).is_ok());

        let anonymous = SessionCredential::new("web_session=1", "UA");
        assert!(matches!(
            sign_headers(&config, &anonymous, &args),
            Err(AppError::Collect(CollectError::Sign(_)))
        ));
    }

    #[test]
    fn summary_text_lists_records() {
        let mut result = CollectionResult::new(Platform::Xhs, 5);
        result.records = vec![record("n1"), record("n2")];
        result.success_count = 2;
        result.list_calls = 1;
        result.total_wait_ms = 4_500;
        result.duration_secs = 9;
        let summary = RunSummary::new(result, None);
        let text = summary.display();
        assert!(text.starts_with("xhs: succeeded"));
        assert!(text.contains("collected 2 / failed 0 in 9s (1 list calls, 4.5s waiting)"));
        assert!(text.contains("- n1 [normal] note n1 | likes 7"));

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["verdict"]["outcome"], "succeeded");
        assert_eq!(json["success_count"], 2);
        assert!(json.get("sink").is_none());
    }

    #[test]
    fn failed_run_reports_only_the_preview() {
        let mut result = CollectionResult::new(Platform::Douyin, 5);
        for index in 0..50 {
            let id = format!("v{index}");
            result.errors.push(format!("{id}: item unavailable"));
            result.failed_ids.push(id);
        }
        result.fail_count = 50;
        let summary = RunSummary::new(result, None);

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["verdict"]["outcome"], "failed");
        assert_eq!(json["verdict"]["total"], 50);
        assert_eq!(
            json["verdict"]["preview"],
            serde_json::json!(["v0", "v1", "v2", "v3", "v4"])
        );
        assert_eq!(json["fail_count"], 50);
        assert!(json.get("failed_ids").is_none());
        assert!(json.get("errors").is_none());

        let text = summary.display();
        assert!(text.contains("failed ids: v0, v1, v2, v3, v4 (+45 more)"));
        assert!(!text.contains("v49"));
    }

    #[test]
    fn partial_run_keeps_failed_ids() {
        let mut result = CollectionResult::new(Platform::Xhs, 5);
        result.records = vec![record("n1")];
        result.success_count = 1;
        result.failed_ids = vec!["n2".into()];
        result.errors = vec!["n2: item unavailable".into()];
        result.fail_count = 1;
        let json = serde_json::to_value(RunSummary::new(result, None)).unwrap();
        assert_eq!(json["verdict"]["outcome"], "partially_succeeded");
        assert_eq!(json["failed_ids"], serde_json::json!(["n2"]));
        assert_eq!(json["errors"][0], "n2: item unavailable");
    }

    #[tokio::test]
    async fn records_are_appended_to_the_table_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut result = CollectionResult::new(Platform::Xhs, 5);
        result.records = vec![record("n1")];
        result.success_count = 1;
        let report = write_records(
            dir.path().to_path_buf(),
            10,
            "https://example.feishu.cn/base/Bas3x?table=tblQ1&view=vew1",
            &result,
        )
        .await
        .unwrap();
        assert_eq!(report.total_success, 1);
        let written = std::fs::read_to_string(dir.path().join("Bas3x_tblQ1.jsonl")).unwrap();
        assert!(written.contains("\"item_id\":\"n1\""));

        let err = write_records(dir.path().to_path_buf(), 10, "https://example.com/x", &result)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Collect(CollectError::LocatorFormat(_))));
    }
}
