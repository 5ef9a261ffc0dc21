use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::config::GhostmapConfig;
use crate::http_client::{RateLimitedClient, RequestOpts};
use crate::record::{CandidateUrl, SOURCE_COMMONCRAWL};

pub const CC_INDEX_LIST_URL: &str = "https://index.commoncrawl.org/collinfo.json";

/// Progress callback: (batch_size, running_total).
pub type ProgressFn<'a> = &'a (dyn Fn(usize, usize) + Send + Sync);

#[derive(Debug, Deserialize)]
struct CollectionInfo {
    #[serde(rename = "cdx-api")]
    cdx_api: Option<String>,
}

/// Scrapes the CommonCrawl Index API: picks the most recent crawl indexes and
/// queries each one for URLs under the target domain.
pub struct CommonCrawlScraper {
    config: GhostmapConfig,
    client: RateLimitedClient,
    index_list_url: String,
    max_indexes: usize,
}

impl CommonCrawlScraper {
    pub fn new(config: &GhostmapConfig, client: RateLimitedClient) -> Self {
        Self {
            config: config.clone(),
            client,
            index_list_url: CC_INDEX_LIST_URL.to_string(),
            max_indexes: 3,
        }
    }

    pub fn with_index_list_url(mut self, url: impl Into<String>) -> Self {
        self.index_list_url = url.into();
        self
    }

    pub fn with_max_indexes(mut self, max_indexes: usize) -> Self {
        self.max_indexes = max_indexes;
        self
    }

    /// The most recent CDX API URLs, newest first.
    async fn index_urls(&self) -> Vec<String> {
        let opts = RequestOpts::default()
            .with_timeout(Duration::from_secs(self.config.commoncrawl_timeout));
        let response = match self.client.get_with(&self.index_list_url, opts).await {
            Ok(response) if response.status().is_success() => response,
            Ok(response) => {
                tracing::error!(status = %response.status(), "failed to fetch CommonCrawl index list");
                return Vec::new();
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to fetch CommonCrawl index list");
                return Vec::new();
            }
        };

        match response.json::<Vec<CollectionInfo>>().await {
            Ok(collections) => collections
                .into_iter()
                .filter_map(|info| info.cdx_api)
                .take(self.max_indexes)
                .collect(),
            Err(err) => {
                tracing::error!(error = %err, "invalid CommonCrawl index list");
                Vec::new()
            }
        }
    }

    /// Query each selected index with `url=*.{domain}&output=json`. Responses
    /// are newline-delimited JSON; invalid lines are skipped, a failed index
    /// is skipped whole.
    pub async fn fetch_urls(
        &self,
        domain: &str,
        limit: Option<usize>,
        progress: Option<ProgressFn<'_>>,
    ) -> Vec<CandidateUrl> {
        tracing::info!(domain, "querying CommonCrawl");

        let index_urls = self.index_urls().await;
        if index_urls.is_empty() {
            tracing::warn!("no CommonCrawl indexes available");
            return Vec::new();
        }
        tracing::info!(indexes = index_urls.len(), "querying CommonCrawl indexes");

        let mut results: Vec<CandidateUrl> = Vec::new();
        let mut total_fetched = 0usize;

        for index_url in &index_urls {
            let index_name = index_url.rsplit('/').nth(1).unwrap_or(index_url);

            let mut query = vec![
                ("url".to_string(), format!("*.{domain}")),
                ("output".to_string(), "json".to_string()),
            ];
            if let Some(limit) = limit {
                query.push(("limit".to_string(), limit.to_string()));
            }
            let opts = RequestOpts::default()
                .with_query(query)
                .with_timeout(Duration::from_secs(self.config.commoncrawl_timeout));

            let response = match self.client.get_with(index_url, opts).await {
                Ok(response) if response.status().is_success() => response,
                Ok(response) => {
                    tracing::warn!(index = index_name, status = %response.status(), "CommonCrawl index query failed");
                    continue;
                }
                Err(err) => {
                    tracing::warn!(index = index_name, error = %err, "CommonCrawl index query failed");
                    continue;
                }
            };

            let body = match response.text().await {
                Ok(body) => body,
                Err(err) => {
                    tracing::warn!(index = index_name, error = %err, "failed to read CommonCrawl response");
                    continue;
                }
            };

            let mut batch_size = 0usize;
            for line in body.lines() {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let Ok(record) = serde_json::from_str::<Value>(line) else {
                    continue;
                };
                let url = record
                    .get("url")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                if url.is_empty() {
                    continue;
                }
                // `status` shows up as either a string or a number across
                // crawl generations.
                let status_code = match record.get("status") {
                    Some(Value::String(s)) => s.clone(),
                    Some(Value::Number(n)) => n.to_string(),
                    _ => String::new(),
                };
                results.push(CandidateUrl {
                    url,
                    timestamp: record
                        .get("timestamp")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    status_code,
                    mime_type: record
                        .get("mime")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    source: SOURCE_COMMONCRAWL.to_string(),
                    ..Default::default()
                });
                batch_size += 1;
            }

            total_fetched += batch_size;
            tracing::info!(index = index_name, batch_size, total_fetched, "CommonCrawl index fetched");
            if let Some(callback) = progress {
                callback(batch_size, total_fetched);
            }
        }

        tracing::info!(domain, count = results.len(), "CommonCrawl scraping complete");
        results
    }
}
