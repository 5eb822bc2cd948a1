use async_trait::async_trait;
use serde_json::Value;

use crate::error::{CollectError, CollectResult};
use crate::locator::{TargetLocator, TargetSpec};
use crate::normalize::{NormalizedRecord, Platform};

/// One entry from a list or search page.
#[derive(Debug, Clone, PartialEq)]
pub struct ListItem {
    pub id: String,
    pub access_token: Option<String>,
    /// The detail call needs `access_token`.
    pub requires_token: bool,
    /// Whatever the list view said about the item.
    pub summary: Value,
    /// `summary` is already a complete detail payload.
    pub full_detail: bool,
}

impl ListItem {
    pub fn new(id: impl Into<String>, summary: Value) -> Self {
        Self {
            id: id.into(),
            access_token: None,
            requires_token: false,
            summary,
            full_detail: false,
        }
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.access_token = token.filter(|token| !token.is_empty());
        self
    }

    pub fn requiring_token(mut self) -> Self {
        self.requires_token = true;
        self
    }

    pub fn with_full_detail(mut self, full_detail: bool) -> Self {
        self.full_detail = full_detail;
        self
    }

    pub fn needs_token(&self) -> bool {
        self.requires_token && self.access_token.is_none()
    }
}

/// Position in a paginated listing. Each platform uses the parts it needs:
/// a page number, an opaque continuation token, or a result offset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageCursor {
    pub page: u32,
    pub token: Option<String>,
    pub offset: u64,
}

impl PageCursor {
    pub fn start() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListPage {
    pub items: Vec<ListItem>,
    pub has_more: bool,
    pub next: PageCursor,
}

impl ListPage {
    pub fn last(items: Vec<ListItem>) -> Self {
        Self {
            items,
            has_more: false,
            next: PageCursor::default(),
        }
    }
}

/// What a platform client offers the collection pipeline.
#[async_trait(?Send)]
pub trait PlatformSource {
    fn platform(&self) -> Platform;

    async fn resolve_target(&mut self, spec: &TargetSpec) -> CollectResult<TargetLocator>;

    /// The list item standing in for a directly addressed item.
    fn target_item(&self, id: &str, token: Option<&str>) -> ListItem;

    /// One page of a profile or keyword listing. `remaining` is how many more
    /// items the run can still take.
    async fn list_page(
        &mut self,
        target: &TargetLocator,
        cursor: &PageCursor,
        remaining: usize,
    ) -> CollectResult<ListPage>;

    /// Alternate search path tried once when the first search page fails.
    /// `None` means the platform has none.
    async fn search_fallback(
        &mut self,
        _target: &TargetLocator,
        _max_items: usize,
    ) -> CollectResult<Option<Vec<ListItem>>> {
        Ok(None)
    }

    async fn recover_token(&mut self, item: &ListItem) -> CollectResult<ListItem> {
        Err(CollectError::ItemUnavailable(format!(
            "no access token for {}",
            item.id
        )))
    }

    async fn fetch_detail(&mut self, item: &ListItem) -> CollectResult<Value>;

    fn normalize(&self, item: &ListItem, detail: &Value) -> CollectResult<NormalizedRecord>;
}
