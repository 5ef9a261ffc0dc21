use std::collections::BTreeSet;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use url::Url;

use crate::record::UrlRecord;

static BRACE_PARAM: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{[^}]+\}").unwrap());
static COLON_PARAM: Lazy<Regex> = Lazy::new(|| Regex::new(r":[A-Za-z_][A-Za-z0-9_]*").unwrap());
static NUMERIC_SEGMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"/\d+(/|$)").unwrap());

/// Extract the path component from a URL string; relative inputs pass through.
pub fn extract_path(url: &str) -> String {
    if url.starts_with("http://") || url.starts_with("https://") {
        return Url::parse(url)
            .map(|parsed| parsed.path().to_string())
            .unwrap_or_default();
    }
    url.to_string()
}

/// Normalize a path for documentation comparison: lowercase, no trailing
/// slash, and every parameter spelling collapsed to `{param}`.
pub fn normalize_path(path: &str) -> String {
    let path = path.trim().to_ascii_lowercase();
    let path = path.trim_end_matches('/');
    if path.is_empty() {
        return "/".to_string();
    }

    let path = BRACE_PARAM.replace_all(path, "{param}");
    let path = COLON_PARAM.replace_all(&path, "{param}");

    // Numeric segments are almost always IDs. The fixed-point loop handles
    // adjacent segments like /users/1/2.
    let mut current = path.into_owned();
    loop {
        let next = NUMERIC_SEGMENT
            .replace_all(&current, "/{param}$1")
            .into_owned();
        if next == current {
            break;
        }
        current = next;
    }
    current
}

#[derive(Debug, Clone, Serialize)]
pub struct SpecDetails {
    pub title: String,
    pub version: String,
    pub endpoint_count: usize,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ComparisonStats {
    pub total_collected: usize,
    pub total_documented: usize,
    pub ghost_count: usize,
    pub documented_found: usize,
    pub spec_only_count: usize,
}

/// Three disjoint sets: collected−documented, collected∩documented, and
/// documented−collected, all compared on normalized paths.
#[derive(Debug, Default)]
pub struct ComparisonResult {
    pub ghost: Vec<UrlRecord>,
    pub documented: Vec<UrlRecord>,
    pub spec_only: Vec<String>,
    pub stats: ComparisonStats,
}

/// Loads OpenAPI/Swagger specs and compares their documented paths against a
/// collected footprint to isolate ghost endpoints.
#[derive(Default)]
pub struct SpecComparator {
    spec_endpoints: BTreeSet<String>,
    spec_data: Option<Value>,
}

impl SpecComparator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a JSON or YAML spec and extract its documented paths. A missing
    /// or unparseable file yields an empty set; the audit proceeds without
    /// the documentation axis.
    pub fn load_spec(&mut self, spec_path: &Path) -> BTreeSet<String> {
        let raw = match std::fs::read_to_string(spec_path) {
            Ok(raw) => raw,
            Err(err) => {
                tracing::error!(path = %spec_path.display(), error = %err, "spec file not found");
                return BTreeSet::new();
            }
        };

        let is_yaml = matches!(
            spec_path.extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        );
        let parsed: Result<Value, String> = if is_yaml {
            serde_yaml::from_str(&raw).map_err(|e| e.to_string())
        } else {
            serde_json::from_str(&raw).map_err(|e| e.to_string())
        };

        self.spec_data = match parsed {
            Ok(data) => Some(data),
            Err(err) => {
                tracing::error!(path = %spec_path.display(), error = %err, "failed to parse spec file");
                return BTreeSet::new();
            }
        };

        self.spec_endpoints = self.extract_paths();
        tracing::info!(
            path = %spec_path.display(),
            count = self.spec_endpoints.len(),
            "loaded documented endpoints from spec"
        );
        self.spec_endpoints.clone()
    }

    fn extract_paths(&self) -> BTreeSet<String> {
        let Some(spec) = &self.spec_data else {
            return BTreeSet::new();
        };

        // OpenAPI 3.x: base path comes from the first server URL. Swagger
        // 2.0: basePath wins when present.
        let mut base_path = spec
            .get("servers")
            .and_then(Value::as_array)
            .and_then(|servers| servers.first())
            .and_then(|server| server.get("url"))
            .and_then(Value::as_str)
            .map(server_base_path)
            .unwrap_or_default();
        if let Some(swagger_base) = spec.get("basePath").and_then(Value::as_str) {
            base_path = swagger_base.trim_end_matches('/').to_string();
        }

        let mut paths = BTreeSet::new();
        if let Some(spec_paths) = spec.get("paths").and_then(Value::as_object) {
            for path_key in spec_paths.keys() {
                let full_path = format!("{base_path}{path_key}");
                paths.insert(normalize_path(&full_path));
            }
        }
        paths
    }

    pub fn spec_details(&self) -> Option<SpecDetails> {
        let spec = self.spec_data.as_ref()?;
        let info = spec.get("info");
        let field = |key: &str| {
            info.and_then(|i| i.get(key))
                .and_then(Value::as_str)
                .unwrap_or("Unknown")
                .to_string()
        };
        Some(SpecDetails {
            title: field("title"),
            version: field("version"),
            endpoint_count: self.spec_endpoints.len(),
        })
    }

    pub fn documented_endpoints(&self) -> &BTreeSet<String> {
        &self.spec_endpoints
    }

    /// Compare collected records against documented paths. `documented`
    /// defaults to the loaded spec's endpoints.
    pub fn compare(
        &self,
        collected: &[UrlRecord],
        documented: Option<&BTreeSet<String>>,
    ) -> ComparisonResult {
        let documented_input = documented.unwrap_or(&self.spec_endpoints);
        let documented_normalized: BTreeSet<String> = documented_input
            .iter()
            .map(|path| normalize_path(path))
            .collect();

        let mut collected_paths: std::collections::BTreeMap<String, &UrlRecord> =
            std::collections::BTreeMap::new();
        for record in collected {
            let url = if record.raw_url.is_empty() {
                &record.canonical_key
            } else {
                &record.raw_url
            };
            let normalized = normalize_path(&extract_path(url));
            if !normalized.is_empty() {
                collected_paths.insert(normalized, record);
            }
        }

        let collected_set: BTreeSet<String> = collected_paths.keys().cloned().collect();
        let ghost_paths: Vec<&String> = collected_set.difference(&documented_normalized).collect();
        let documented_found: Vec<&String> =
            collected_set.intersection(&documented_normalized).collect();
        let spec_only: Vec<String> = documented_normalized
            .difference(&collected_set)
            .cloned()
            .collect();

        let result = ComparisonResult {
            ghost: ghost_paths
                .iter()
                .filter_map(|path| collected_paths.get(*path).map(|r| (*r).clone()))
                .collect(),
            documented: documented_found
                .iter()
                .filter_map(|path| collected_paths.get(*path).map(|r| (*r).clone()))
                .collect(),
            stats: ComparisonStats {
                total_collected: collected_set.len(),
                total_documented: documented_normalized.len(),
                ghost_count: ghost_paths.len(),
                documented_found: documented_found.len(),
                spec_only_count: spec_only.len(),
            },
            spec_only,
        };

        tracing::info!(
            ghost = result.stats.ghost_count,
            documented = result.stats.documented_found,
            spec_only = result.stats.spec_only_count,
            "documentation comparison complete"
        );
        result
    }
}

fn server_base_path(server_url: &str) -> String {
    let path = if server_url.contains("://") {
        Url::parse(server_url)
            .map(|u| u.path().to_string())
            .unwrap_or_default()
    } else {
        server_url.to_string()
    };
    path.trim_end_matches('/').to_string()
}
