use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{ConfigError, Result};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CollectorConfig {
    #[serde(default)]
    pub http: HttpSection,
    #[serde(default)]
    pub pacing: PacingSection,
    #[serde(default)]
    pub collection: CollectionSection,
    #[serde(default)]
    pub xhs: XhsSection,
    #[serde(default)]
    pub douyin: DouyinSection,
    #[serde(default)]
    pub sink: SinkSection,
    #[serde(default)]
    pub entitlement: EntitlementSection,
}

impl CollectorConfig {
    pub fn validate(&self) -> Result<()> {
        let ranges = [
            ("pacing.before_listing_secs", self.pacing.before_listing_secs),
            ("pacing.early_secs", self.pacing.early_secs),
            ("pacing.middle_secs", self.pacing.middle_secs),
            ("pacing.late_secs", self.pacing.late_secs),
            ("douyin.page_delay_secs", self.douyin.page_delay_secs),
        ];
        for (name, [min, max]) in ranges {
            if !(min.is_finite() && max.is_finite() && min >= 0.0 && min <= max) {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be an ascending finite non-negative range, got [{min}, {max}]"
                )));
            }
        }
        if self.pacing.early_until > self.pacing.middle_until {
            return Err(ConfigError::Invalid(
                "pacing.early_until must not exceed pacing.middle_until".to_string(),
            ));
        }
        let sizes = [
            ("xhs.profile_page_size", self.xhs.profile_page_size),
            ("xhs.search_page_size", self.xhs.search_page_size),
            ("douyin.posts_page_size", self.douyin.posts_page_size),
            ("douyin.search_page_size", self.douyin.search_page_size),
            ("collection.max_items_limit", self.collection.max_items_limit),
            ("sink.batch_size", self.sink.batch_size),
        ];
        for (name, size) in sizes {
            if size == 0 {
                return Err(ConfigError::Invalid(format!("{name} must be positive")));
            }
        }
        if self.collection.default_max_items > self.collection.max_items_limit {
            return Err(ConfigError::Invalid(
                "collection.default_max_items exceeds collection.max_items_limit".to_string(),
            ));
        }
        Ok(())
    }

    /// Clamps a caller-supplied cap into `1..=max_items_limit`.
    pub fn clamp_max_items(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.collection.default_max_items)
            .clamp(1, self.collection.max_items_limit)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpSection {
    pub timeout_secs: u64,
    pub redirect_timeout_secs: u64,
    pub default_user_agent: String,
}

impl Default for HttpSection {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            redirect_timeout_secs: 10,
            default_user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/143.0.0.0 Safari/537.36".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PacingSection {
    pub before_listing_secs: [f64; 2],
    pub early_secs: [f64; 2],
    pub middle_secs: [f64; 2],
    pub late_secs: [f64; 2],
    pub early_until: usize,
    pub middle_until: usize,
}

impl Default for PacingSection {
    fn default() -> Self {
        Self {
            before_listing_secs: [0.5, 2.0],
            early_secs: [3.0, 5.0],
            middle_secs: [4.0, 6.0],
            late_secs: [5.0, 8.0],
            early_until: 5,
            middle_until: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CollectionSection {
    pub default_max_items: usize,
    pub max_items_limit: usize,
    pub failed_preview: usize,
}

impl Default for CollectionSection {
    fn default() -> Self {
        Self {
            default_max_items: 20,
            max_items_limit: 50,
            failed_preview: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct XhsSection {
    pub api_host: String,
    pub web_host: String,
    pub app_id: String,
    pub profile_page_size: usize,
    pub search_page_size: usize,
}

impl Default for XhsSection {
    fn default() -> Self {
        Self {
            api_host: "https://edith.xiaohongshu.com".to_string(),
            web_host: "https://www.xiaohongshu.com".to_string(),
            app_id: "xhs-pc-web".to_string(),
            profile_page_size: 30,
            search_page_size: 20,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DouyinSection {
    pub host: String,
    pub posts_page_size: usize,
    pub search_page_size: usize,
    pub page_delay_secs: [f64; 2],
    pub verify_fp: String,
    #[serde(default)]
    pub oracle: Option<OracleSection>,
}

impl Default for DouyinSection {
    fn default() -> Self {
        Self {
            host: "https://www.douyin.com".to_string(),
            posts_page_size: 18,
            search_page_size: 15,
            page_delay_secs: [0.4, 1.2],
            verify_fp: "verify_ma3hrt8n_q2q2HyYA_uLyO_4N6D_BLvX_E2LgoGmkA1BU".to_string(),
            oracle: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OracleSection {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SinkSection {
    pub dir: String,
    pub batch_size: usize,
}

impl Default for SinkSection {
    fn default() -> Self {
        Self {
            dir: "data/records".to_string(),
            batch_size: 100,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EntitlementSection {
    #[serde(default)]
    pub keys: Vec<String>,
}

pub fn load_collector_config<P: AsRef<Path>>(path: P) -> Result<CollectorConfig> {
    let config: CollectorConfig = load_toml(path)?;
    config.validate()?;
    Ok(config)
}

fn load_toml<T, P>(path: P) -> Result<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        source,
        path: path.to_path_buf(),
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        source,
        path: path.to_path_buf(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_fixture_config() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../configs/collector.toml");
        let config = load_collector_config(path).expect("fixture should parse");
        assert_eq!(config.xhs.app_id, "xhs-pc-web");
        assert_eq!(config.pacing.early_secs, [3.0, 5.0]);
        assert_eq!(config.douyin.posts_page_size, 18);
        assert_eq!(config.collection.failed_preview, 5);
        assert!(config.douyin.oracle.is_some());
    }

    #[test]
    fn missing_sections_fall_back_to_defaults() {
        let config: CollectorConfig = toml::from_str("[xhs]\napi_host = \"http://localhost\"\nweb_host = \"http://localhost\"\napp_id = \"xhs-pc-web\"\nprofile_page_size = 10\nsearch_page_size = 5\n").unwrap();
        assert_eq!(config.xhs.profile_page_size, 10);
        assert_eq!(config.pacing.late_secs, [5.0, 8.0]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_inverted_range() {
        let mut config = CollectorConfig::default();
        config.pacing.middle_secs = [6.0, 4.0];
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_unbounded_range() {
        let mut config = CollectorConfig::default();
        config.pacing.late_secs = [1.0, f64::INFINITY];
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid(message)) if message.contains("pacing.late_secs")
        ));

        let mut config = CollectorConfig::default();
        config.douyin.page_delay_secs = [f64::NAN, 1.0];
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_page_size() {
        let mut config = CollectorConfig::default();
        config.douyin.search_page_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn clamps_requested_items() {
        let config = CollectorConfig::default();
        assert_eq!(config.clamp_max_items(None), 20);
        assert_eq!(config.clamp_max_items(Some(0)), 1);
        assert_eq!(config.clamp_max_items(Some(500)), 50);
    }

    #[test]
    fn io_error_names_path() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");
        let err = load_collector_config(&missing).unwrap_err();
        assert!(err.to_string().contains("absent.toml"));
    }
}
