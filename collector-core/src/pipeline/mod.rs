//! One collection run: resolve the target, page through listings, resolve
//! each item's detail, normalize, aggregate.

mod pacing;
mod source;

use std::collections::HashSet;
use std::time::Instant;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::CollectorConfig;
use crate::error::{CollectError, CollectResult};
use crate::locator::{TargetLocator, TargetSpec};
use crate::normalize::{NormalizedRecord, Platform};

pub use pacing::{DelayBands, DelayRange, Pacer};
pub use source::{ListItem, ListPage, PageCursor, PlatformSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PipelineState {
    ResolvingTarget,
    Listing { page: usize },
    DetailResolution { index: usize },
    Normalizing { index: usize },
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectRequest {
    pub target: TargetSpec,
    pub max_items: usize,
}

impl CollectRequest {
    pub fn new(target: TargetSpec, max_items: usize) -> Self {
        Self {
            target,
            max_items: max_items.max(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub failed_preview: usize,
    pub pre_listing_pause: bool,
}

impl PipelineConfig {
    pub fn from_config(config: &CollectorConfig) -> Self {
        Self {
            failed_preview: config.collection.failed_preview,
            pre_listing_pause: true,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            failed_preview: 5,
            pre_listing_pause: true,
        }
    }
}

/// Caller-facing reading of a finished run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Verdict {
    Succeeded,
    PartiallySucceeded,
    Failed { preview: Vec<String>, total: usize },
    Empty,
}

#[derive(Debug, Clone, Serialize)]
pub struct CollectionResult {
    pub platform: Platform,
    pub records: Vec<NormalizedRecord>,
    pub success_count: usize,
    pub fail_count: usize,
    pub failed_ids: Vec<String>,
    pub errors: Vec<String>,
    pub list_calls: usize,
    pub total_wait_ms: u64,
    pub duration_secs: u64,
    #[serde(skip)]
    failed_preview: usize,
}

impl CollectionResult {
    pub fn new(platform: Platform, failed_preview: usize) -> Self {
        Self {
            platform,
            records: Vec::new(),
            success_count: 0,
            fail_count: 0,
            failed_ids: Vec::new(),
            errors: Vec::new(),
            list_calls: 0,
            total_wait_ms: 0,
            duration_secs: 0,
            failed_preview,
        }
    }

    pub fn items_attempted(&self) -> usize {
        self.success_count + self.fail_count
    }

    pub fn verdict(&self) -> Verdict {
        match (self.success_count, self.fail_count) {
            (0, 0) => Verdict::Empty,
            (0, total) => Verdict::Failed {
                preview: self
                    .failed_ids
                    .iter()
                    .take(self.failed_preview)
                    .cloned()
                    .collect(),
                total,
            },
            (_, 0) => Verdict::Succeeded,
            _ => Verdict::PartiallySucceeded,
        }
    }

    fn record_success(&mut self, record: NormalizedRecord) {
        self.records.push(record);
        self.success_count += 1;
    }

    fn record_failure(&mut self, id: &str, err: &CollectError) {
        self.failed_ids.push(id.to_string());
        self.errors.push(format!("{id}: {err}"));
        self.fail_count += 1;
    }
}

pub struct CollectionPipeline<S: PlatformSource> {
    source: S,
    pacer: Pacer,
    config: PipelineConfig,
    state: PipelineState,
}

impl<S: PlatformSource> CollectionPipeline<S> {
    pub fn new(source: S, pacer: Pacer, config: PipelineConfig) -> Self {
        Self {
            source,
            pacer,
            config,
            state: PipelineState::ResolvingTarget,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    pub fn into_source(self) -> S {
        self.source
    }

    /// Page-level and target errors abort the run; per-item errors land in
    /// the result unless they are run-fatal.
    pub async fn run(&mut self, request: CollectRequest) -> CollectResult<CollectionResult> {
        let started = Instant::now();
        let platform = self.source.platform();
        let wait_before = self.pacer.total_wait();
        self.transition(PipelineState::ResolvingTarget);

        let outcome = self.collect(&request, platform).await;
        match outcome {
            Ok(mut result) => {
                self.transition(PipelineState::Completed);
                result.total_wait_ms = (self.pacer.total_wait() - wait_before).as_millis() as u64;
                result.duration_secs = started.elapsed().as_secs();
                info!(
                    platform = %platform,
                    success = result.success_count,
                    failed = result.fail_count,
                    list_calls = result.list_calls,
                    duration = result.duration_secs,
                    "collection run finished"
                );
                Ok(result)
            }
            Err(err) => {
                self.transition(PipelineState::Failed);
                warn!(platform = %platform, kind = err.kind(), error = %err, "collection run aborted");
                Err(err)
            }
        }
    }

    async fn collect(
        &mut self,
        request: &CollectRequest,
        platform: Platform,
    ) -> CollectResult<CollectionResult> {
        let target = self.source.resolve_target(&request.target).await?;
        let max_items = request.max_items.max(1);
        let mut result = CollectionResult::new(platform, self.config.failed_preview);
        info!(platform = %platform, target = %target, max_items, "collection run started");

        let items = match &target {
            TargetLocator::Item { id, token } => {
                vec![self.source.target_item(id, token.as_deref())]
            }
            TargetLocator::Profile { .. } => {
                if self.config.pre_listing_pause {
                    self.pacer.before_listing().await;
                }
                self.list_items(&target, max_items, &mut result).await?
            }
            TargetLocator::Keyword { .. } => {
                self.list_items(&target, max_items, &mut result).await?
            }
        };
        info!(platform = %platform, items = items.len(), "listing completed");

        let last = items.len().saturating_sub(1);
        for (index, item) in items.iter().enumerate() {
            self.transition(PipelineState::DetailResolution { index });
            match self.resolve_item(index, item).await {
                Ok(record) => result.record_success(record),
                Err(err) if err.is_run_fatal() => return Err(err),
                Err(err) => {
                    warn!(item_id = %item.id, kind = err.kind(), error = %err, "item collection failed");
                    result.record_failure(&item.id, &err);
                }
            }
            if index < last {
                self.pacer.between_items(index).await;
            }
        }

        Ok(result)
    }

    async fn list_items(
        &mut self,
        target: &TargetLocator,
        max_items: usize,
        result: &mut CollectionResult,
    ) -> CollectResult<Vec<ListItem>> {
        let mut items: Vec<ListItem> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut cursor = PageCursor::start();
        let mut page_index = 0usize;

        while items.len() < max_items {
            self.transition(PipelineState::Listing { page: page_index });
            if page_index > 0 {
                self.pacer.between_pages().await;
            }

            let remaining = max_items - items.len();
            let page = match self.source.list_page(target, &cursor, remaining).await {
                Ok(page) => page,
                Err(err) if page_index == 0 && target.is_keyword() && !err.is_run_fatal() => {
                    warn!(error = %err, "search api failed on first page, trying fallback");
                    match self.source.search_fallback(target, max_items).await? {
                        Some(fallback) => {
                            accept(&mut items, &mut seen, fallback, max_items);
                            break;
                        }
                        None => return Err(err),
                    }
                }
                Err(err) => return Err(err),
            };
            result.list_calls += 1;

            if page.items.is_empty() {
                debug!(page = page_index, "empty page ends listing");
                break;
            }
            let added = accept(&mut items, &mut seen, page.items, max_items);
            debug!(page = page_index, added, total = items.len(), has_more = page.has_more, "page listed");
            if added == 0 || !page.has_more {
                break;
            }
            cursor = page.next;
            page_index += 1;
        }

        Ok(items)
    }

    async fn resolve_item(&mut self, index: usize, item: &ListItem) -> CollectResult<NormalizedRecord> {
        let recovered;
        let item = if item.needs_token() {
            debug!(item_id = %item.id, "recovering access token");
            recovered = self.source.recover_token(item).await?;
            if recovered.needs_token() {
                return Err(CollectError::ItemUnavailable(format!(
                    "no access token for {}",
                    item.id
                )));
            }
            &recovered
        } else {
            item
        };

        let fetched: Value;
        let detail = if item.full_detail {
            &item.summary
        } else {
            fetched = self.source.fetch_detail(item).await?;
            &fetched
        };

        self.transition(PipelineState::Normalizing { index });
        self.source.normalize(item, detail)
    }

    fn transition(&mut self, next: PipelineState) {
        debug!(from = ?self.state, to = ?next, "pipeline state");
        self.state = next;
    }
}

/// Appends unseen items up to the cap; returns how many were new.
fn accept(
    items: &mut Vec<ListItem>,
    seen: &mut HashSet<String>,
    incoming: Vec<ListItem>,
    max_items: usize,
) -> usize {
    let mut added = 0;
    for item in incoming {
        if items.len() >= max_items {
            break;
        }
        if !seen.insert(item.id.clone()) {
            debug!(item_id = %item.id, "duplicate item dropped");
            continue;
        }
        items.push(item);
        added += 1;
    }
    added
}
