use std::collections::{BTreeSet, HashMap};

use serde::Serialize;
use url::Url;

use crate::record::{CandidateUrl, UrlRecord};

/// Canonicalize a URL into its dedup identity:
/// - lowercase scheme and host
/// - strip the fragment
/// - drop default ports (http:80, https:443)
/// - collapse the trailing slash except for a bare `/`
/// - sort query parameters by key, values verbatim
///
/// Relative inputs keep their relative form but still get the path and query
/// treatment. Empty input yields an empty key. The function is idempotent.
pub fn normalize_url(url: &str) -> String {
    let url = url.trim();
    if url.is_empty() {
        return String::new();
    }

    let lower = url.to_ascii_lowercase();
    let absolute = ["http://", "https://", "ws://", "wss://"]
        .iter()
        .any(|scheme| lower.starts_with(scheme));

    if !absolute {
        return normalize_relative(url);
    }

    let parsed = match Url::parse(url) {
        Ok(parsed) => parsed,
        Err(_) => return url.to_string(),
    };

    // Url::parse already lowercases scheme and host and treats default ports
    // as absent.
    let scheme = parsed.scheme();
    let host = parsed.host_str().unwrap_or("");
    let netloc = match parsed.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    };

    let path = normalize_path_segment(parsed.path());
    let query = sort_query(parsed.query());

    match query {
        Some(query) => format!("{scheme}://{netloc}{path}?{query}"),
        None => format!("{scheme}://{netloc}{path}"),
    }
}

fn normalize_relative(url: &str) -> String {
    // Fragment never participates in identity.
    let without_fragment = url.split('#').next().unwrap_or("");
    let (path, query) = match without_fragment.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (without_fragment, None),
    };

    let mut path = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    };
    path = normalize_path_segment(&path);

    match query.and_then(|q| sort_query(Some(q))) {
        Some(query) => format!("{path}?{query}"),
        None => path,
    }
}

fn normalize_path_segment(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Sort query pairs by key (stable, so repeated keys keep their order) and
/// rebuild without touching values. A key with no `=` becomes `key=`, the
/// blank value preserved.
fn sort_query(query: Option<&str>) -> Option<String> {
    let query = query?;
    if query.is_empty() {
        return None;
    }
    let mut pairs: Vec<(&str, &str)> = query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| pair.split_once('=').unwrap_or((pair, "")))
        .collect();
    if pairs.is_empty() {
        return None;
    }
    pairs.sort_by(|a, b| a.0.cmp(b.0));
    Some(
        pairs
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&"),
    )
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DedupAddStats {
    pub new: usize,
    pub merged: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct DedupStats {
    pub unique_endpoints: usize,
    pub total_occurrences: u64,
    pub dedup_ratio: f64,
    pub sources: Vec<String>,
}

/// Merges discoveries into one canonical record per endpoint, keyed by the
/// normalized URL. First-seen record wins; later entries union their
/// metadata into it.
#[derive(Default)]
pub struct DedupEngine {
    seen: HashMap<String, UrlRecord>,
}

impl DedupEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one entry. Returns true for a new unique endpoint, false when it
    /// merged into an existing record.
    pub fn add(&mut self, entry: CandidateUrl) -> bool {
        if entry.url.is_empty() {
            return false;
        }
        let key = normalize_url(&entry.url);
        if key.is_empty() {
            return false;
        }

        if let Some(existing) = self.seen.get_mut(&key) {
            merge_entry(existing, &entry);
            return false;
        }

        let timestamp = if entry.timestamp.is_empty() {
            chrono::Utc::now().to_rfc3339()
        } else {
            entry.timestamp.clone()
        };
        let source = if entry.source.is_empty() {
            "unknown".to_string()
        } else {
            entry.source.clone()
        };

        let mut record = UrlRecord {
            raw_url: entry.url.clone(),
            canonical_key: key.clone(),
            first_seen: timestamp.clone(),
            last_seen: timestamp,
            occurrence_count: 1,
            ..Default::default()
        };
        record.sources.insert(source);
        insert_non_empty(&mut record.observed_status_codes, &entry.status_code);
        insert_non_empty(&mut record.observed_mime_types, &entry.mime_type);
        insert_non_empty(&mut record.pattern_names, &entry.pattern_name);
        insert_non_empty(&mut record.source_files, &entry.source_file);

        self.seen.insert(key, record);
        true
    }

    /// Re-admit an already-merged record, e.g. when a later stage mixes new
    /// discoveries into an existing record set. Records colliding on the
    /// canonical key are merged field by field.
    pub fn absorb(&mut self, record: UrlRecord) {
        let key = if record.canonical_key.is_empty() {
            normalize_url(&record.raw_url)
        } else {
            record.canonical_key.clone()
        };
        if key.is_empty() {
            return;
        }

        match self.seen.get_mut(&key) {
            Some(existing) => {
                existing.occurrence_count += record.occurrence_count;
                existing.sources.extend(record.sources);
                existing
                    .observed_status_codes
                    .extend(record.observed_status_codes);
                existing.observed_mime_types.extend(record.observed_mime_types);
                existing.pattern_names.extend(record.pattern_names);
                existing.source_files.extend(record.source_files);
                existing.warnings.extend(record.warnings);
                if !record.first_seen.is_empty()
                    && (existing.first_seen.is_empty() || record.first_seen < existing.first_seen)
                {
                    existing.first_seen = record.first_seen;
                }
                if record.last_seen > existing.last_seen {
                    existing.last_seen = record.last_seen;
                }
                if existing.probe.is_none() {
                    existing.probe = record.probe;
                }
            }
            None => {
                let mut record = record;
                record.canonical_key = key.clone();
                self.seen.insert(key, record);
            }
        }
    }

    pub fn add_many(&mut self, entries: Vec<CandidateUrl>) -> DedupAddStats {
        let mut stats = DedupAddStats::default();
        for entry in entries {
            if self.add(entry) {
                stats.new += 1;
            } else {
                stats.merged += 1;
            }
        }
        tracing::info!(
            new = stats.new,
            merged = stats.merged,
            total = self.seen.len(),
            "dedup pass complete"
        );
        stats
    }

    /// All merged records, sorted by canonical key.
    pub fn results(&self) -> Vec<UrlRecord> {
        let mut records: Vec<UrlRecord> = self.seen.values().cloned().collect();
        records.sort_by(|a, b| a.canonical_key.cmp(&b.canonical_key));
        records
    }

    pub fn stats(&self) -> DedupStats {
        let total_occurrences: u64 = self.seen.values().map(|r| r.occurrence_count).sum();
        let mut sources = BTreeSet::new();
        for record in self.seen.values() {
            sources.extend(record.sources.iter().cloned());
        }
        let unique = self.seen.len();
        DedupStats {
            unique_endpoints: unique,
            total_occurrences,
            dedup_ratio: if total_occurrences > 0 {
                ((1.0 - unique as f64 / total_occurrences as f64) * 100.0).round() / 100.0
            } else {
                0.0
            },
            sources: sources.into_iter().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    pub fn clear(&mut self) {
        self.seen.clear();
    }
}

fn merge_entry(existing: &mut UrlRecord, entry: &CandidateUrl) {
    existing.occurrence_count += 1;

    let source = if entry.source.is_empty() {
        "unknown"
    } else {
        entry.source.as_str()
    };
    existing.sources.insert(source.to_string());

    if !entry.timestamp.is_empty() && entry.timestamp > existing.last_seen {
        existing.last_seen = entry.timestamp.clone();
    }
    insert_non_empty(&mut existing.observed_status_codes, &entry.status_code);
    insert_non_empty(&mut existing.observed_mime_types, &entry.mime_type);
    insert_non_empty(&mut existing.pattern_names, &entry.pattern_name);
    insert_non_empty(&mut existing.source_files, &entry.source_file);
}

fn insert_non_empty(set: &mut BTreeSet<String>, value: &str) {
    if !value.is_empty() {
        set.insert(value.to_string());
    }
}
