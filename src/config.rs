// src/config.rs
//! Application configuration: TOML file with env-var path override, plus the
//! `"ENV"` sentinel for API keys so secrets never land in the file.

use serde::{Deserialize, Serialize};
use std::{env, fs, path::Path};

pub const DEFAULT_CONFIG_PATH: &str = "config/app.toml";
pub const ENV_CONFIG_PATH: &str = "APP_CONFIG_PATH";

fn default_daily_search_cap() -> u32 {
    60
}
fn default_cycle_quota_cost() -> u32 {
    2
}
fn default_poll_interval_secs() -> u64 {
    1800
}
fn default_retention_days() -> i64 {
    7
}
fn default_freshness_cutoff() -> u8 {
    40
}
fn default_max_candidates() -> usize {
    8
}
fn default_enhance_top_n() -> usize {
    5
}
fn default_db_path() -> String {
    "data/market_pulse.db".to_string()
}
// Exchange-local offset in minutes; +330 = IST, the reference market.
fn default_market_tz_offset_minutes() -> i32 {
    330
}
fn default_bind_addr() -> String {
    "0.0.0.0:8000".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_daily_search_cap")]
    pub daily_search_cap: u32,
    /// Flat quota units charged per cycle that reached the fetch stage.
    #[serde(default = "default_cycle_quota_cost")]
    pub cycle_quota_cost: u32,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,
    #[serde(default = "default_freshness_cutoff")]
    pub freshness_cutoff: u8,
    #[serde(default = "default_max_candidates")]
    pub max_candidates: usize,
    #[serde(default = "default_enhance_top_n")]
    pub enhance_top_n: usize,
    #[serde(default = "default_db_path")]
    pub db_path: String,
    #[serde(default = "default_market_tz_offset_minutes")]
    pub market_tz_offset_minutes: i32,
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub ai: AiConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        toml::from_str("").expect("empty config populates all defaults")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DedupKind {
    #[default]
    TitlePrefix,
    ContentHash,
}

fn default_search_endpoint() -> String {
    "https://google.serper.dev/search".to_string()
}
fn default_results_per_query() -> usize {
    10
}
fn default_max_queries_per_cycle() -> usize {
    2
}
fn default_provider_timeout_secs() -> u64 {
    20
}
fn default_dedup_prefix_len() -> usize {
    50
}
fn env_sentinel() -> String {
    "ENV".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_search_endpoint")]
    pub endpoint: String,
    /// "ENV" means: read from SEARCH_API_KEY.
    #[serde(default = "env_sentinel")]
    pub api_key: String,
    #[serde(default = "default_results_per_query")]
    pub results_per_query: usize,
    #[serde(default = "default_max_queries_per_cycle")]
    pub max_queries_per_cycle: usize,
    #[serde(default = "default_provider_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub dedup: DedupKind,
    #[serde(default = "default_dedup_prefix_len")]
    pub dedup_prefix_len: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        toml::from_str("").expect("empty search config populates all defaults")
    }
}

fn default_true() -> bool {
    true
}
fn default_ai_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_confidence_bump() -> u8 {
    5
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_ai_model")]
    pub model: String,
    /// "ENV" means: read from OPENAI_API_KEY.
    #[serde(default = "env_sentinel")]
    pub api_key: String,
    #[serde(default = "default_provider_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_confidence_bump")]
    pub confidence_bump: u8,
}

impl Default for AiConfig {
    fn default() -> Self {
        toml::from_str("").expect("empty ai config populates all defaults")
    }
}

impl AppConfig {
    /// Load from $APP_CONFIG_PATH or `config/app.toml`; a missing file yields
    /// the built-in defaults so the service can boot bare.
    pub fn load() -> anyhow::Result<Self> {
        let path = env::var(ENV_CONFIG_PATH).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        if !Path::new(&path).exists() {
            return Ok(Self::default());
        }
        Self::load_from_file(&path)
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let data = fs::read_to_string(&path)?;
        let mut cfg: AppConfig = toml::from_str(&data)?;
        cfg.resolve_keys()?;
        Ok(cfg)
    }

    /// Resolve "ENV" sentinels; a missing env var leaves the key empty so the
    /// provider factory can fall back to a disabled provider.
    fn resolve_keys(&mut self) -> anyhow::Result<()> {
        if self.search.api_key.trim().eq_ignore_ascii_case("env") {
            self.search.api_key = env::var("SEARCH_API_KEY").unwrap_or_default();
        }
        if self.ai.api_key.trim().eq_ignore_ascii_case("env") {
            self.ai.api_key = env::var("OPENAI_API_KEY").unwrap_or_default();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_yields_reference_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.daily_search_cap, 60);
        assert_eq!(cfg.cycle_quota_cost, 2);
        assert_eq!(cfg.poll_interval_secs, 1800);
        assert_eq!(cfg.retention_days, 7);
        assert_eq!(cfg.freshness_cutoff, 40);
        assert_eq!(cfg.max_candidates, 8);
        assert_eq!(cfg.enhance_top_n, 5);
        assert_eq!(cfg.search.dedup_prefix_len, 50);
        assert_eq!(cfg.search.max_queries_per_cycle, 2);
        assert_eq!(cfg.ai.confidence_bump, 5);
        assert_eq!(cfg.search.dedup, DedupKind::TitlePrefix);
    }

    #[test]
    #[serial_test::serial]
    fn load_honors_the_config_path_env_var() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.toml");
        fs::write(&path, "daily_search_cap = 12\n").unwrap();

        env::set_var(ENV_CONFIG_PATH, &path);
        let cfg = AppConfig::load().unwrap();
        env::remove_var(ENV_CONFIG_PATH);

        assert_eq!(cfg.daily_search_cap, 12);
        assert_eq!(cfg.cycle_quota_cost, 2);
    }

    #[test]
    #[serial_test::serial]
    fn env_sentinel_resolves_keys_from_the_environment() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.toml");
        fs::write(&path, "[search]\napi_key = \"ENV\"\n").unwrap();

        env::set_var("SEARCH_API_KEY", "secret-key");
        let cfg = AppConfig::load_from_file(&path).unwrap();
        env::remove_var("SEARCH_API_KEY");

        assert_eq!(cfg.search.api_key, "secret-key");
    }

    #[test]
    #[serial_test::serial]
    fn env_sentinel_falls_back_to_empty_when_unset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.toml");
        fs::write(&path, "[ai]\napi_key = \"ENV\"\n").unwrap();

        env::remove_var("OPENAI_API_KEY");
        let cfg = AppConfig::load_from_file(&path).unwrap();
        assert!(cfg.ai.api_key.is_empty());
    }

    #[test]
    fn partial_toml_overrides_only_named_fields() {
        let cfg: AppConfig = toml::from_str(
            r#"
daily_search_cap = 10
cycle_quota_cost = 1

[search]
dedup = "content_hash"
"#,
        )
        .unwrap();
        assert_eq!(cfg.daily_search_cap, 10);
        assert_eq!(cfg.cycle_quota_cost, 1);
        assert_eq!(cfg.search.dedup, DedupKind::ContentHash);
        // untouched defaults
        assert_eq!(cfg.retention_days, 7);
        assert_eq!(cfg.search.results_per_query, 10);
    }
}
