use std::collections::BTreeSet;
use std::time::Duration;

use reqwest::header::HeaderMap;

use crate::http_client::{RateLimitedClient, RequestOpts};

/// Fingerprints the target's stack from response headers and body signatures
/// so the fuzzer can pick targeted wordlists. Failures are swallowed; the
/// floor is always `common`.
pub struct TechDetector {
    client: RateLimitedClient,
}

impl TechDetector {
    pub fn new(client: RateLimitedClient) -> Self {
        Self { client }
    }

    pub async fn detect(&self, url: &str) -> Vec<String> {
        let mut tags: BTreeSet<&'static str> = BTreeSet::new();
        tags.insert("common");

        let opts = RequestOpts::default().with_timeout(Duration::from_secs(5));
        let response = match self.client.get_with(url, opts).await {
            Ok(response) => response,
            Err(err) => {
                tracing::debug!(url, error = %err, "tech detection request failed");
                return collect(tags);
            }
        };

        let headers = response.headers().clone();
        let server = header_value(&headers, "server");
        let x_powered_by = header_value(&headers, "x-powered-by");
        let cookies = header_value(&headers, "set-cookie");
        let x_generator = header_value(&headers, "x-generator");
        let liferay_header = header_value(&headers, "liferay-portal");

        if x_powered_by.contains("php") || cookies.contains("php") || cookies.contains("phpsessid")
        {
            tags.insert("php");
        }
        if x_powered_by.contains("asp.net")
            || cookies.contains("asp.net")
            || cookies.contains("aspnet")
        {
            tags.insert("asp");
        }
        if x_powered_by.contains("express") || x_powered_by.contains("node") {
            tags.insert("node");
        }
        if server.contains("gunicorn")
            || server.contains("python")
            || cookies.contains("django")
            || cookies.contains("csrftoken")
        {
            tags.insert("django");
        }

        let body = response.text().await.unwrap_or_default().to_lowercase();

        if body.contains("whitelabel error page") || body.contains("spring boot") {
            tags.insert("spring");
        }
        if body.contains("laravel") {
            tags.insert("php");
            tags.insert("laravel");
        }
        if body.contains("rails") {
            tags.insert("rails");
        }
        if body.contains("liferay") || !liferay_header.is_empty() {
            tags.insert("liferay");
        }
        if body.contains("wordpress") || body.contains("wp-content") {
            tags.insert("wordpress");
            tags.insert("php");
        }
        if body.contains("drupal") || x_generator.contains("drupal") {
            tags.insert("drupal");
            tags.insert("php");
        }
        if server.contains("apache-coyote") || body.contains("tomcat") {
            tags.insert("tomcat");
            tags.insert("java");
        }
        if server.contains("jboss") || body.contains("jboss") {
            tags.insert("jboss");
            tags.insert("java");
        }

        let result = collect(tags);
        tracing::info!(url, tags = ?result, "technology detection complete");
        result
    }
}

fn header_value(headers: &HeaderMap, name: &str) -> String {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_lowercase()
}

fn collect(tags: BTreeSet<&'static str>) -> Vec<String> {
    tags.into_iter().map(|tag| tag.to_string()).collect()
}
