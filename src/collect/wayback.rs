use std::collections::BTreeSet;
use std::time::Duration;

use serde_json::Value;
use url::Url;

use crate::config::GhostmapConfig;
use crate::http_client::{RateLimitedClient, RequestOpts};
use crate::record::{CandidateUrl, SOURCE_WAYBACK};

pub const WAYBACK_CDX_URL: &str = "https://web.archive.org/cdx/search/cdx";

/// The CDX API serves pages of up to this many rows; a short page means the
/// listing is exhausted.
const PAGE_SIZE: usize = 10_000;

/// Progress callback: (batch_size, running_total).
pub type ProgressFn<'a> = &'a (dyn Fn(usize, usize) + Send + Sync);

/// Scrapes the Wayback Machine CDX API for historical URLs associated with a
/// target domain.
pub struct WaybackScraper {
    config: GhostmapConfig,
    client: RateLimitedClient,
    cdx_url: String,
}

impl WaybackScraper {
    pub fn new(config: &GhostmapConfig, client: RateLimitedClient) -> Self {
        Self {
            config: config.clone(),
            client,
            cdx_url: WAYBACK_CDX_URL.to_string(),
        }
    }

    /// Point the scraper at a different CDX endpoint (mirrors, test servers).
    pub fn with_cdx_url(mut self, url: impl Into<String>) -> Self {
        self.cdx_url = url.into();
        self
    }

    /// Query the CDX API page by page until a short page or an error. A page
    /// failure aborts only the remaining pages; rows already collected stand.
    pub async fn fetch_urls(
        &self,
        domain: &str,
        limit: Option<usize>,
        progress: Option<ProgressFn<'_>>,
    ) -> Vec<CandidateUrl> {
        tracing::info!(domain, "querying Wayback Machine CDX");

        let mut results: Vec<CandidateUrl> = Vec::new();
        let mut page: usize = 0;
        let mut total_fetched: usize = 0;

        loop {
            let mut query = vec![
                ("url".to_string(), format!("*.{domain}")),
                ("output".to_string(), "json".to_string()),
                (
                    "fl".to_string(),
                    "original,timestamp,statuscode,mimetype".to_string(),
                ),
                ("matchType".to_string(), "domain".to_string()),
                ("collapse".to_string(), "urlkey".to_string()),
                ("page".to_string(), page.to_string()),
            ];
            if let Some(limit) = limit {
                query.push(("limit".to_string(), limit.to_string()));
            }

            let opts = RequestOpts::default()
                .with_query(query)
                .with_timeout(Duration::from_secs(self.config.wayback_timeout));

            let response = match self.client.get_with(&self.cdx_url, opts).await {
                Ok(response) if response.status().is_success() => response,
                Ok(response) => {
                    tracing::error!(page, status = %response.status(), "Wayback CDX request failed");
                    break;
                }
                Err(err) => {
                    tracing::error!(page, error = %err, "Wayback CDX request failed");
                    break;
                }
            };

            let data: Value = match response.json().await {
                Ok(data) => data,
                Err(_) => {
                    // The last page often comes back empty or as invalid JSON.
                    tracing::debug!(page, "no more results");
                    break;
                }
            };

            let rows = match data.as_array() {
                // First row is the header schema, so one row means no data.
                Some(rows) if rows.len() > 1 => &rows[1..],
                _ => break,
            };

            let mut batch_size = 0;
            for row in rows {
                let Some(fields) = row.as_array() else {
                    continue;
                };
                if fields.len() < 4 {
                    continue;
                }
                let field = |i: usize| -> String {
                    fields[i].as_str().unwrap_or_default().to_string()
                };
                let url = field(0);
                if url.is_empty() {
                    continue;
                }
                results.push(CandidateUrl {
                    url,
                    timestamp: field(1),
                    status_code: field(2),
                    mime_type: field(3),
                    source: SOURCE_WAYBACK.to_string(),
                    ..Default::default()
                });
                batch_size += 1;
            }

            total_fetched += batch_size;
            tracing::info!(page, batch_size, total_fetched, "Wayback page fetched");
            if let Some(callback) = progress {
                callback(batch_size, total_fetched);
            }

            if let Some(limit) = limit {
                if total_fetched >= limit {
                    results.truncate(limit);
                    break;
                }
            }
            if batch_size < PAGE_SIZE {
                break;
            }
            page += 1;
        }

        tracing::info!(domain, count = results.len(), "Wayback scraping complete");
        results
    }

    /// Filter results down to likely API endpoints based on URL substrings.
    pub fn extract_api_urls(&self, urls: &[CandidateUrl]) -> Vec<CandidateUrl> {
        const API_INDICATORS: [&str; 25] = [
            "/api/", "/api.", "/v1/", "/v2/", "/v3/", "/v4/", "/rest/", "/graphql", "/webhook",
            "/callback", "/oauth", "/auth/", "/login", "/signup", "/admin", "/debug", "/internal",
            "/health", ".json", ".xml", ".yaml", ".yml", "/swagger", "/openapi", "/docs/",
        ];

        let api_urls: Vec<CandidateUrl> = urls
            .iter()
            .filter(|entry| {
                let lower = entry.url.to_ascii_lowercase();
                API_INDICATORS.iter().any(|needle| lower.contains(needle))
            })
            .cloned()
            .collect();

        tracing::info!(
            kept = api_urls.len(),
            total = urls.len(),
            "filtered to likely API URLs"
        );
        api_urls
    }

    /// Unique JavaScript file URLs (query-stripped) for the JS analyzer.
    pub fn extract_js_urls(&self, urls: &[CandidateUrl]) -> Vec<String> {
        let mut js_urls: BTreeSet<String> = BTreeSet::new();
        for entry in urls {
            let Ok(parsed) = Url::parse(&entry.url) else {
                continue;
            };
            let path = parsed.path().to_ascii_lowercase();
            if path.ends_with(".js") || path.ends_with(".mjs") {
                let host = parsed.host_str().unwrap_or_default();
                js_urls.insert(format!("{}://{}{}", parsed.scheme(), host, parsed.path()));
            }
        }
        let result: Vec<String> = js_urls.into_iter().collect();
        tracing::info!(count = result.len(), "unique JS file URLs found");
        result
    }
}
