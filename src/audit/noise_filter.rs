use serde::Serialize;
use url::Url;

use crate::collect::dedup::normalize_url;
use crate::record::UrlRecord;

/// Path prefixes that are almost always public content.
const PUBLIC_CONTENT_PREFIXES: [&str; 41] = [
    "/blog",
    "/news",
    "/press",
    "/media",
    "/events",
    "/faq",
    "/help",
    "/support",
    "/kb",
    "/knowledge",
    "/docs",
    "/documentation",
    "/guide",
    "/tutorial",
    "/how-to",
    "/about",
    "/careers",
    "/jobs",
    "/team",
    "/contact",
    "/terms",
    "/privacy",
    "/legal",
    "/cookie",
    "/disclaimer",
    "/pricing",
    "/plans",
    "/features",
    "/product",
    "/category",
    "/tag",
    "/archive",
    "/author",
    "/sitemap",
    "/rss",
    "/feed",
    "/atom",
    "/wp-content",
    "/wp-includes",
    "/wp-json/wp",
    "/cdn-cgi",
];

/// File extensions that are never interesting endpoints.
const STATIC_EXTENSIONS: [&str; 26] = [
    ".css", ".js", ".png", ".jpg", ".jpeg", ".gif", ".svg", ".ico", ".woff", ".woff2", ".ttf",
    ".eot", ".otf", ".mp4", ".webm", ".mp3", ".wav", ".pdf", ".zip", ".gz", ".tar", ".map",
    ".xml", ".txt", ".webp", ".avif",
];

/// Query params that are marketing / tracking noise.
const NOISE_QUERY_PARAMS: [&str; 21] = [
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "fbclid",
    "gclid",
    "msclkid",
    "mc_cid",
    "mc_eid",
    "ref",
    "source",
    "share",
    "lang",
    "locale",
    "page",
    "p",
    "sort",
    "order",
    "limit",
    "offset",
];

/// Keywords that rescue an endpoint from a public-content prefix drop.
const RESCUE_KEYWORDS: [&str; 25] = [
    "admin", "login", "auth", "token", "secret", "key", "config", "debug", "internal", "api",
    "graphql", "actuator", "console", "upload", "export", "import", "backup", "database", "sql",
    "webhook", "callback", "oauth", "session", "password", "cred",
];

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct NoiseFilterStats {
    pub total: usize,
    pub filtered: usize,
    pub kept: usize,
}

/// Drops public-content and tracking-artifact URLs from the record set.
/// Rescue keywords win over prefix drops. Idempotent.
#[derive(Default)]
pub struct NoiseFilter {
    stats: NoiseFilterStats,
}

impl NoiseFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> NoiseFilterStats {
        self.stats
    }

    pub fn filter_records(&mut self, records: Vec<UrlRecord>) -> Vec<UrlRecord> {
        self.stats = NoiseFilterStats {
            total: records.len(),
            ..Default::default()
        };

        let mut kept = Vec::new();
        for mut record in records {
            let url = if record.raw_url.is_empty() {
                record.canonical_key.clone()
            } else {
                record.raw_url.clone()
            };

            if is_noise(&url) {
                self.stats.filtered += 1;
                continue;
            }

            let clean = strip_noise_params(&url);
            if clean != url {
                // Keep the pre-strip URL for audit; the canonical key tracks
                // the cleaned form so it stays a pure function of raw_url.
                record.original_url = Some(url);
                record.canonical_key = normalize_url(&clean);
                record.raw_url = clean;
            }
            kept.push(record);
        }

        self.stats.kept = kept.len();
        tracing::info!(
            filtered = self.stats.filtered,
            kept = self.stats.kept,
            total = self.stats.total,
            "noise filter complete"
        );
        kept
    }
}

fn split_path_and_query(url: &str) -> (String, Vec<(String, String)>) {
    if url.contains("://") {
        if let Ok(parsed) = Url::parse(url) {
            let pairs = parsed
                .query()
                .map(|q| parse_query(q))
                .unwrap_or_default();
            return (parsed.path().to_string(), pairs);
        }
    }
    let without_fragment = url.split('#').next().unwrap_or("");
    match without_fragment.split_once('?') {
        Some((path, query)) => (path.to_string(), parse_query(query)),
        None => (without_fragment.to_string(), Vec::new()),
    }
}

fn parse_query(query: &str) -> Vec<(String, String)> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
            (name.to_string(), value.to_string())
        })
        .collect()
}

fn is_noise(url: &str) -> bool {
    if url.is_empty() {
        return true;
    }

    let (path, pairs) = split_path_and_query(url);
    let path = path.to_ascii_lowercase();
    let path = path.trim_end_matches('/');

    for ext in STATIC_EXTENSIONS {
        if path.ends_with(ext) {
            return true;
        }
    }

    // A URL whose entire query is tracking params adds nothing.
    if !pairs.is_empty()
        && pairs
            .iter()
            .all(|(name, _)| NOISE_QUERY_PARAMS.contains(&name.to_ascii_lowercase().as_str()))
    {
        return true;
    }

    for prefix in PUBLIC_CONTENT_PREFIXES {
        if path.starts_with(prefix) {
            if RESCUE_KEYWORDS.iter().any(|keyword| path.contains(keyword)) {
                return false;
            }
            return true;
        }
    }

    false
}

/// Remove tracking params; non-tracking params keep their order and values.
fn strip_noise_params(url: &str) -> String {
    let Some((base, query)) = url.split_once('?') else {
        return url.to_string();
    };
    if query.is_empty() {
        return url.to_string();
    }

    let kept: Vec<&str> = query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .filter(|pair| {
            let name = pair.split_once('=').map(|(n, _)| n).unwrap_or(pair);
            !NOISE_QUERY_PARAMS.contains(&name.to_ascii_lowercase().as_str())
        })
        .collect();

    if kept.is_empty() {
        base.to_string()
    } else {
        format!("{base}?{}", kept.join("&"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::CandidateUrl;
    use crate::collect::dedup::DedupEngine;

    fn records(urls: &[&str]) -> Vec<UrlRecord> {
        let mut dedup = DedupEngine::new();
        for url in urls {
            dedup.add(CandidateUrl::new(*url, "wayback"));
        }
        dedup.results()
    }

    #[test]
    fn public_content_is_dropped() {
        let mut filter = NoiseFilter::new();
        let kept = filter.filter_records(records(&[
            "https://example.com/blog/post-1",
            "https://example.com/pricing",
            "https://example.com/api/v1/users",
        ]));
        assert_eq!(kept.len(), 1);
        assert!(kept[0].raw_url.contains("/api/"));
        assert_eq!(filter.stats().filtered, 2);
    }

    #[test]
    fn rescue_keyword_wins_over_prefix() {
        let mut filter = NoiseFilter::new();
        let kept = filter.filter_records(records(&[
            "https://example.com/docs/internal/admin-panel",
            "https://example.com/docs/getting-started",
        ]));
        assert_eq!(kept.len(), 1);
        assert!(kept[0].raw_url.contains("admin"));
    }

    #[test]
    fn static_assets_are_dropped() {
        let mut filter = NoiseFilter::new();
        let kept = filter.filter_records(records(&[
            "https://example.com/main.css",
            "https://example.com/api/data",
        ]));
        assert_eq!(kept.len(), 1);
    }

    #[test]
    fn tracking_only_query_is_noise() {
        let mut filter = NoiseFilter::new();
        let kept = filter.filter_records(records(&[
            "https://example.com/landing?utm_source=x&utm_campaign=y",
        ]));
        assert!(kept.is_empty());
    }

    #[test]
    fn tracking_params_are_stripped_and_preserved() {
        let mut filter = NoiseFilter::new();
        let kept = filter.filter_records(records(&[
            "https://example.com/api/data?id=5&utm_source=mail",
        ]));
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].raw_url, "https://example.com/api/data?id=5");
        assert!(kept[0]
            .original_url
            .as_deref()
            .unwrap()
            .contains("utm_source"));
        assert_eq!(kept[0].canonical_key, "https://example.com/api/data?id=5");
    }

    #[test]
    fn filtering_is_idempotent() {
        let mut filter = NoiseFilter::new();
        let once = filter.filter_records(records(&[
            "https://example.com/api/data?id=5&utm_source=mail",
            "https://example.com/blog/post",
            "https://example.com/v2/orders",
        ]));
        let mut filter2 = NoiseFilter::new();
        let twice = filter2.filter_records(once.clone());
        assert_eq!(once.len(), twice.len());
        for (a, b) in once.iter().zip(twice.iter()) {
            assert_eq!(a.raw_url, b.raw_url);
            assert_eq!(a.canonical_key, b.canonical_key);
        }
    }
}
