use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::storage::Compression;

/// Collector configuration, loaded from TOML. Defaults mirror the observed
/// production setup so the binary runs without a config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    pub base_url: String,
    pub schedule_endpoint: String,
    pub current_term: String,
    /// Subject codes to collect, or the single entry "ALL".
    pub departments: Vec<String>,
    pub terms: Vec<Term>,
    pub rate_limit: RateLimit,
    pub http: HttpConfig,
    pub storage: StorageConfig,
    /// Fixed Banner search fields sent with every listing request.
    pub search_params: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Term {
    pub code: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimit {
    pub requests_per_second: f64,
    pub retry_attempts: u32,
    pub base_backoff_ms: u64,
}

impl Default for RateLimit {
    fn default() -> Self {
        RateLimit {
            requests_per_second: 2.0,
            retry_attempts: 3,
            base_backoff_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_seconds: u64,
    pub verify_ssl: bool,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        HttpConfig {
            timeout_seconds: 60,
            // The Banner host serves an incomplete chain; overridable.
            verify_ssl: true,
            user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: String,
    pub compression: Compression,
    /// Snapshots to retain per data directory; 0 disables cleanup.
    pub keep_snapshots: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            data_dir: "data".into(),
            compression: Compression::None,
            keep_snapshots: 30,
        }
    }
}

impl Default for CollectorConfig {
    fn default() -> Self {
        let search_params: BTreeMap<String, String> = [
            ("sel_day", "dummy"),
            ("sel_schd", "dummy"),
            ("sel_camp", "%"),
            ("sel_ism", "%"),
            ("sel_sess", "%"),
            ("sel_instr", "%"),
            ("sel_ptrm", "%"),
            ("sel_attrib", "%"),
            ("sel_zero", "N"),
            ("begin_hh", "5"),
            ("begin_mi", "0"),
            ("begin_ap", "a"),
            ("end_hh", "11"),
            ("end_mi", "0"),
            ("end_ap", "p"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        CollectorConfig {
            base_url: "https://ssb.riohondo.edu:8443/prodssb".into(),
            schedule_endpoint: "pw_pub_sched.p_listthislist".into(),
            current_term: "202570".into(),
            terms: vec![Term { code: "202570".into(), name: "Fall 2025".into() }],
            departments: vec!["ALL".into()],
            rate_limit: RateLimit::default(),
            http: HttpConfig::default(),
            storage: StorageConfig::default(),
            search_params,
        }
    }
}

impl CollectorConfig {
    /// Load from `path` when it exists, otherwise fall back to defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("no config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let cfg: CollectorConfig = toml::from_str(&text)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        Ok(cfg)
    }

    pub fn schedule_url(&self) -> String {
        format!("{}/{}", self.base_url, self.schedule_endpoint)
    }

    /// Display name for a term code, "Term <code>" when unconfigured.
    pub fn term_name(&self, code: &str) -> String {
        self.terms
            .iter()
            .find(|t| t.code == code)
            .map(|t| t.name.clone())
            .unwrap_or_else(|| format!("Term {code}"))
    }
}

// ── Tests ──
