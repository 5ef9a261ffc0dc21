use scraper::{Html, Selector};
use url::Url;

use crate::collect::extractor::{EndpointExtractor, EndpointMatch};
use crate::config::GhostmapConfig;
use crate::http_client::RateLimitedClient;

/// One endpoint attributed to the JS file it was found in.
#[derive(Debug, Clone)]
pub struct JsEndpoint {
    pub endpoint: String,
    pub source_file: String,
    pub pattern_name: &'static str,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JsAnalysisStats {
    pub files_analyzed: usize,
    pub files_failed: usize,
    pub total_endpoints: usize,
}

#[derive(Debug, Default)]
pub struct JsAnalysis {
    pub endpoints: Vec<JsEndpoint>,
    pub stats: JsAnalysisStats,
}

/// Endpoints mined out of a single HTML page: inline script hits plus the
/// external script URLs worth downloading next.
#[derive(Debug, Default)]
pub struct HtmlAnalysis {
    pub inline_endpoints: Vec<EndpointMatch>,
    pub js_urls: Vec<String>,
}

/// Downloads JavaScript files and feeds their content to the endpoint
/// extractor.
pub struct JsAnalyzer {
    config: GhostmapConfig,
    client: RateLimitedClient,
    extractor: EndpointExtractor,
}

impl JsAnalyzer {
    pub fn new(config: &GhostmapConfig, client: RateLimitedClient) -> Self {
        Self {
            config: config.clone(),
            client,
            extractor: EndpointExtractor::new(),
        }
    }

    /// Download and analyze each JS file. A failed or oversized file is
    /// skipped; endpoints are deduplicated across files, attributed to the
    /// first file they appeared in.
    pub async fn analyze_js_urls(&self, js_urls: &[String], base_domain: &str) -> JsAnalysis {
        let mut analysis = JsAnalysis::default();
        let mut seen: std::collections::HashSet<String> = std::collections::HashSet::new();
        let total = js_urls.len();

        tracing::info!(total, "analyzing JavaScript files");

        for (index, js_url) in js_urls.iter().enumerate() {
            let Some(content) = self.download_js(js_url).await else {
                analysis.stats.files_failed += 1;
                continue;
            };

            let extracted = self.extractor.extract(&content, base_domain);
            analysis.stats.files_analyzed += 1;
            tracing::debug!(
                url = %js_url,
                index = index + 1,
                total,
                found = extracted.len(),
                "JS file analyzed"
            );

            for item in extracted {
                if seen.insert(item.endpoint.clone()) {
                    analysis.endpoints.push(JsEndpoint {
                        endpoint: item.endpoint,
                        source_file: js_url.clone(),
                        pattern_name: item.pattern_name,
                    });
                }
            }
        }

        analysis.stats.total_endpoints = analysis.endpoints.len();
        tracing::info!(
            analyzed = analysis.stats.files_analyzed,
            failed = analysis.stats.files_failed,
            endpoints = analysis.stats.total_endpoints,
            "JS analysis complete"
        );
        analysis
    }

    /// Pull inline `<script>` bodies and `src` attributes out of an HTML
    /// page. Relative script srcs are resolved against `page_url`.
    pub fn extract_from_html(
        &self,
        html_content: &str,
        page_url: &str,
        base_domain: &str,
    ) -> HtmlAnalysis {
        let document = Html::parse_document(html_content);
        let Ok(selector) = Selector::parse("script") else {
            return HtmlAnalysis::default();
        };

        let mut inline_text = String::new();
        let mut js_urls = Vec::new();

        for script in document.select(&selector) {
            if let Some(src) = script.value().attr("src") {
                if src.starts_with("http://") || src.starts_with("https://") {
                    js_urls.push(src.to_string());
                } else if !page_url.is_empty() {
                    if let Ok(resolved) = Url::parse(page_url).and_then(|base| base.join(src)) {
                        js_urls.push(resolved.to_string());
                    }
                }
            } else {
                for text in script.text() {
                    inline_text.push_str(text);
                    inline_text.push('\n');
                }
            }
        }

        HtmlAnalysis {
            inline_endpoints: self.extractor.extract(&inline_text, base_domain),
            js_urls,
        }
    }

    /// Fetch one JS file, enforcing the configured size limit.
    async fn download_js(&self, url: &str) -> Option<String> {
        let response = match self.client.get(url).await {
            Ok(response) if response.status().is_success() => response,
            Ok(response) => {
                tracing::debug!(url, status = %response.status(), "failed to download JS");
                return None;
            }
            Err(err) => {
                tracing::debug!(url, error = %err, "failed to download JS");
                return None;
            }
        };

        let bytes = response.bytes().await.ok()?;
        if bytes.len() > self.config.max_js_file_size {
            tracing::warn!(url, size = bytes.len(), "JS file too large, skipping");
            return None;
        }
        Some(String::from_utf8_lossy(&bytes).into_owned())
    }
}
