use std::collections::HashMap;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

/// Central configuration for every pipeline component. Components receive a
/// reference explicitly; there is no process-wide mutable default.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GhostmapConfig {
    pub verbose: bool,

    // HTTP client
    /// Target request rate in requests per second; the throttler derives its
    /// initial delay from this.
    pub rate_limit: f64,
    pub max_retries: u32,
    /// Exponential backoff multiplier between retries.
    pub retry_backoff: f64,
    /// Seconds.
    pub request_timeout: u64,
    pub user_agents: Vec<String>,
    /// Extra headers sent on every request (e.g. auth for testing engagements).
    pub headers: HashMap<String, String>,

    // Collector
    pub wayback_timeout: u64,
    pub commoncrawl_timeout: u64,
    pub max_js_file_size: usize,

    // Auditor
    pub probe_timeout: u64,
    pub probe_concurrency: usize,
    pub probe_methods: Vec<String>,

    // Risk scoring weights
    pub weight_undocumented: u32,
    pub weight_active: u32,
    pub weight_sensitive_keywords: u32,
    pub weight_no_auth: u32,
    pub weight_staleness: u32,

    pub sensitive_keywords: Vec<String>,
}

impl Default for GhostmapConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            rate_limit: 2.0,
            max_retries: 3,
            retry_backoff: 1.5,
            request_timeout: 30,
            user_agents: vec![
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
                "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
                "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0".to_string(),
                "ghostmap/0.1 (Security Research Tool)".to_string(),
            ],
            headers: HashMap::new(),
            wayback_timeout: 60,
            commoncrawl_timeout: 60,
            max_js_file_size: 5 * 1024 * 1024,
            probe_timeout: 10,
            probe_concurrency: 10,
            probe_methods: vec!["HEAD".to_string(), "GET".to_string()],
            weight_undocumented: 30,
            weight_active: 25,
            weight_sensitive_keywords: 20,
            weight_no_auth: 15,
            weight_staleness: 10,
            sensitive_keywords: [
                "debug", "admin", "internal", "test", "staging", "dev",
                "backup", "old", "temp", "tmp", "secret", "private",
                "config", "setup", "install", "phpinfo", "console",
                "actuator", "health", "metrics", "env", "swagger",
                "graphql", "graphiql", "playground",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

impl GhostmapConfig {
    /// Load configuration from a YAML or JSON file. Unknown keys are ignored;
    /// a malformed file is a fatal error.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("config file not found: {}", path.display()))?;

        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();

        let config = match ext.as_str() {
            "yaml" | "yml" => serde_yaml::from_str(&raw)
                .with_context(|| format!("invalid YAML config: {}", path.display()))?,
            "json" => serde_json::from_str(&raw)
                .with_context(|| format!("invalid JSON config: {}", path.display()))?,
            other => bail!("config file must be .yaml or .json, got .{other}"),
        };
        Ok(config)
    }
}
