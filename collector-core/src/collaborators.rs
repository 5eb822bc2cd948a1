use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use crate::error::{CollectError, CollectResult};
use crate::locator::TableLocator;
use crate::normalize::NormalizedRecord;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntitlementDecision {
    pub allowed: bool,
    pub code: i64,
    pub message: String,
}

impl EntitlementDecision {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            code: 0,
            message: "ok".to_string(),
        }
    }

    pub fn deny(code: i64, message: impl Into<String>) -> Self {
        Self {
            allowed: false,
            code,
            message: message.into(),
        }
    }

    pub fn into_result(self) -> CollectResult<()> {
        if self.allowed {
            Ok(())
        } else {
            Err(CollectError::EntitlementDenied {
                code: self.code,
                message: self.message,
            })
        }
    }
}

/// Gate consulted once per external request, before any collection.
#[async_trait(?Send)]
pub trait EntitlementCheck {
    async fn check(&self, key: &str) -> CollectResult<EntitlementDecision>;
}

/// Admits a fixed key set. An empty set admits every caller.
#[derive(Debug, Clone, Default)]
pub struct StaticEntitlement {
    keys: HashSet<String>,
}

impl StaticEntitlement {
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keys: keys
                .into_iter()
                .map(Into::into)
                .filter(|key: &String| !key.trim().is_empty())
                .collect(),
        }
    }
}

#[async_trait(?Send)]
impl EntitlementCheck for StaticEntitlement {
    async fn check(&self, key: &str) -> CollectResult<EntitlementDecision> {
        if self.keys.is_empty() {
            return Ok(EntitlementDecision::allow());
        }
        let key = key.trim();
        if key.is_empty() {
            return Ok(EntitlementDecision::deny(401, "missing key"));
        }
        if self.keys.contains(key) {
            Ok(EntitlementDecision::allow())
        } else {
            Ok(EntitlementDecision::deny(401, "invalid key"))
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SinkReport {
    pub success: bool,
    pub total_success: usize,
    pub total_failed: usize,
    pub errors: Vec<String>,
}

#[async_trait(?Send)]
pub trait RecordSink {
    async fn write(
        &self,
        destination: &TableLocator,
        records: &[NormalizedRecord],
    ) -> CollectResult<SinkReport>;
}

/// Appends one JSON object per record to `<dir>/<namespace>_<table>.jsonl`.
#[derive(Debug, Clone)]
pub struct JsonLinesSink {
    dir: PathBuf,
    batch_size: usize,
}

impl JsonLinesSink {
    pub fn new(dir: impl Into<PathBuf>, batch_size: usize) -> Self {
        Self {
            dir: dir.into(),
            batch_size: batch_size.max(1),
        }
    }

    pub fn path_for(&self, destination: &TableLocator) -> PathBuf {
        self.dir.join(format!(
            "{}_{}.jsonl",
            destination.namespace, destination.table_id
        ))
    }

    async fn append(path: &Path, payload: &[u8]) -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        file.write_all(payload).await?;
        file.flush().await
    }
}

#[async_trait(?Send)]
impl RecordSink for JsonLinesSink {
    async fn write(
        &self,
        destination: &TableLocator,
        records: &[NormalizedRecord],
    ) -> CollectResult<SinkReport> {
        fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(destination);
        let mut report = SinkReport::default();

        for (batch_index, batch) in records.chunks(self.batch_size).enumerate() {
            let mut payload = Vec::new();
            let mut encoded = 0;
            for record in batch {
                match serde_json::to_vec(record) {
                    Ok(line) => {
                        payload.extend_from_slice(&line);
                        payload.push(b'\n');
                        encoded += 1;
                    }
                    Err(err) => {
                        report.total_failed += 1;
                        report.errors.push(format!("{}: {err}", record.item_id));
                    }
                }
            }
            match Self::append(&path, &payload).await {
                Ok(()) => report.total_success += encoded,
                Err(err) => {
                    warn!(path = %path.display(), batch = batch_index, error = %err, "record batch failed");
                    report.total_failed += encoded;
                    report.errors.push(format!("batch {batch_index}: {err}"));
                }
            }
        }

        report.success = report.total_failed == 0;
        info!(
            path = %path.display(),
            written = report.total_success,
            failed = report.total_failed,
            "records appended"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::{Author, Platform};

    fn record(id: &str) -> NormalizedRecord {
        NormalizedRecord {
            platform: Platform::Douyin,
            item_id: id.to_string(),
            title: format!("title {id}"),
            body: String::new(),
            note_type: "video".into(),
            note_url: String::new(),
            cover_url: String::new(),
            image_urls: Vec::new(),
            video_url: String::new(),
            tags: vec!["coffee".into()],
            liked: 1,
            collected: 0,
            comments: 0,
            shares: 0,
            published_at_ms: 0,
            author: Author::default(),
        }
    }

    #[tokio::test]
    async fn static_entitlement_decisions() {
        let open = StaticEntitlement::default();
        assert!(open.check("").await.unwrap().allowed);

        let gate = StaticEntitlement::new(["k-1", " "]);
        assert!(gate.check("k-1").await.unwrap().allowed);
        let denied = gate.check("nope").await.unwrap();
        assert_eq!(denied, EntitlementDecision::deny(401, "invalid key"));
        assert!(matches!(
            denied.into_result(),
            Err(CollectError::EntitlementDenied { code: 401, .. })
        ));
        assert_eq!(gate.check("").await.unwrap().message, "missing key");
    }

    #[tokio::test]
    async fn json_lines_sink_appends_in_batches() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonLinesSink::new(dir.path().join("out"), 2);
        let table = TableLocator {
            namespace: "base1".into(),
            table_id: "tbl1".into(),
        };
        let records: Vec<_> = ["a", "b", "c"].into_iter().map(record).collect();

        let report = sink.write(&table, &records).await.unwrap();
        assert!(report.success);
        assert_eq!(report.total_success, 3);
        sink.write(&table, &records[..1]).await.unwrap();

        let text = std::fs::read_to_string(sink.path_for(&table)).unwrap();
        let ids: Vec<String> = text
            .lines()
            .map(|line| serde_json::from_str::<serde_json::Value>(line).unwrap()["item_id"]
                .as_str()
                .unwrap()
                .to_string())
            .collect();
        assert_eq!(ids, vec!["a", "b", "c", "a"]);
        assert!(sink.path_for(&table).ends_with("base1_tbl1.jsonl"));
    }
}
