use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use rand::distributions::Alphanumeric;
use rand::Rng;
use reqwest::Method;
use tokio::sync::Semaphore;

use crate::audit::soft404::{is_soft_404, Baseline};
use crate::audit::swagger::extract_path;
use crate::config::GhostmapConfig;
use crate::http_client::{RateLimitedClient, RequestOpts};
use crate::record::{ProbeOutcome, UrlRecord};

const DEBUG_INDICATORS: [&str; 8] = [
    "debug",
    "stack trace",
    "traceback",
    "exception",
    "phpinfo",
    "server info",
    "environment variables",
    "django debug",
];

const ADMIN_INDICATORS: [&str; 5] = [
    "admin panel",
    "dashboard",
    "control panel",
    "management console",
    "admin login",
];

/// How much of a 200 body gets scanned for debug/admin indicators.
const BODY_SCAN_LIMIT: usize = 5000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeCategory {
    Active,
    AuthRequired,
    Redirect,
    Soft404,
    Error,
    Dead,
}

#[derive(Debug, Default)]
pub struct ProbeReport {
    pub total: usize,
    pub active: usize,
    pub auth_required: usize,
    pub redirect: usize,
    pub soft_404: usize,
    pub error: usize,
    pub dead: usize,
    /// Characterization per probed path.
    pub details: HashMap<String, ProbeOutcome>,
}

/// Probes discovered endpoints against a live origin to find out which are
/// active, auth-gated, or dead. Workers share the per-host throttler through
/// the client and a semaphore bounds in-flight requests.
pub struct EndpointProber {
    config: GhostmapConfig,
    client: RateLimitedClient,
}

impl EndpointProber {
    pub fn new(config: &GhostmapConfig, client: RateLimitedClient) -> Self {
        Self {
            config: config.clone(),
            client,
        }
    }

    pub async fn probe_all(&self, records: &[UrlRecord], base_url: &str) -> ProbeReport {
        let base = base_url.trim_end_matches('/').to_string();

        let baseline = self.establish_baseline(&base).await;
        if baseline.is_none() {
            tracing::warn!("no probe baseline; soft-404 suppression disabled");
        }

        // Unique path components; records carrying full URLs contribute just
        // their paths.
        let mut paths: HashSet<String> = HashSet::new();
        for record in records {
            let url = if record.raw_url.is_empty() {
                &record.canonical_key
            } else {
                &record.raw_url
            };
            let path = extract_path(url);
            if !path.is_empty() {
                paths.insert(path);
            }
        }

        let total = paths.len();
        tracing::info!(
            total,
            concurrency = self.config.probe_concurrency,
            "starting endpoint probing"
        );

        let semaphore = Arc::new(Semaphore::new(self.config.probe_concurrency.max(1)));
        let baseline = baseline.as_ref();
        let base = &base;

        let outcomes: Vec<(String, ProbeOutcome, ProbeCategory)> = stream::iter(paths)
            .map(|path| {
                let semaphore = semaphore.clone();
                async move {
                    let _permit = semaphore
                        .acquire_owned()
                        .await
                        .expect("probe semaphore closed");
                    let url = format!("{base}{path}");
                    let (mut outcome, location) = self.probe_single(&url).await;
                    let category = categorize(&outcome, &location, baseline);
                    outcome.is_soft_404 = category == ProbeCategory::Soft404;
                    tracing::debug!(url, status = outcome.status_code, "probe complete");
                    (path, outcome, category)
                }
            })
            .buffer_unordered(self.config.probe_concurrency.max(1))
            .collect()
            .await;

        let mut report = ProbeReport {
            total,
            ..Default::default()
        };
        for (path, outcome, category) in outcomes {
            match category {
                ProbeCategory::Active => report.active += 1,
                ProbeCategory::AuthRequired => report.auth_required += 1,
                ProbeCategory::Redirect => report.redirect += 1,
                ProbeCategory::Soft404 => report.soft_404 += 1,
                ProbeCategory::Error => report.error += 1,
                ProbeCategory::Dead => report.dead += 1,
            }
            report.details.insert(path, outcome);
        }

        tracing::info!(
            active = report.active,
            auth_required = report.auth_required,
            redirect = report.redirect,
            soft_404 = report.soft_404,
            dead = report.dead,
            error = report.error,
            "probing complete"
        );
        report
    }

    /// Try each configured method in order, falling through 405s. A GET that
    /// lands a 200 gets its body scanned for debug and admin indicators.
    async fn probe_single(&self, url: &str) -> (ProbeOutcome, String) {
        let mut outcome = ProbeOutcome::default();
        let mut location = String::new();

        for method_name in &self.config.probe_methods {
            let method = match method_name.to_ascii_uppercase().as_str() {
                "HEAD" => Method::HEAD,
                "GET" => Method::GET,
                "OPTIONS" => Method::OPTIONS,
                other => {
                    tracing::debug!(method = other, "unsupported probe method skipped");
                    continue;
                }
            };
            let is_get = method == Method::GET;
            let opts = RequestOpts::no_redirects()
                .with_timeout(Duration::from_secs(self.config.probe_timeout));

            let response = match self.client.request(method, url, opts).await {
                Ok(response) => response,
                Err(_) => {
                    outcome.status_code = 0;
                    continue;
                }
            };

            outcome.status_code = response.status().as_u16();
            outcome.content_type = response
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|value| value.to_str().ok())
                .unwrap_or_default()
                .to_string();
            location = response
                .headers()
                .get(reqwest::header::LOCATION)
                .and_then(|value| value.to_str().ok())
                .unwrap_or_default()
                .to_string();
            outcome.has_auth = response.headers().contains_key(reqwest::header::WWW_AUTHENTICATE)
                || response.headers().contains_key(reqwest::header::AUTHORIZATION);

            if is_get && outcome.status_code == 200 {
                if let Ok(body) = response.bytes().await {
                    outcome.response_size = body.len() as u64;
                    let scan = String::from_utf8_lossy(&body[..body.len().min(BODY_SCAN_LIMIT)])
                        .to_lowercase();
                    outcome.is_debug = DEBUG_INDICATORS.iter().any(|needle| scan.contains(needle));
                    outcome.is_admin = ADMIN_INDICATORS.iter().any(|needle| scan.contains(needle));
                }
            } else if let Some(length) = response.content_length() {
                outcome.response_size = length;
            }

            // 405 means the method is refused, not the endpoint; try the next
            // method.
            if outcome.status_code != 405 {
                break;
            }
        }

        (outcome, location)
    }

    async fn establish_baseline(&self, base: &str) -> Option<Baseline> {
        let token: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(32)
            .map(char::from)
            .collect();
        let url = format!("{base}/{token}");
        let opts = RequestOpts::no_redirects().with_timeout(Duration::from_secs(5));

        match self.client.get_with(&url, opts).await {
            Ok(response) => {
                let status = response.status().as_u16();
                let location = response
                    .headers()
                    .get(reqwest::header::LOCATION)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                let length = response.bytes().await.map(|b| b.len() as u64).unwrap_or(0);
                tracing::info!(status, length, location, "probe baseline established");
                Some(Baseline {
                    status,
                    body_length: length,
                    redirect_location: location,
                })
            }
            Err(err) => {
                tracing::warn!(error = %err, "probe baseline failed");
                None
            }
        }
    }
}

fn categorize(
    outcome: &ProbeOutcome,
    location: &str,
    baseline: Option<&Baseline>,
) -> ProbeCategory {
    let status = outcome.status_code;

    if is_soft_404(status, outcome.response_size, location, baseline) {
        return ProbeCategory::Soft404;
    }
    match status {
        200..=299 => ProbeCategory::Active,
        301 | 302 | 307 | 308 => ProbeCategory::Redirect,
        401 | 403 => ProbeCategory::AuthRequired,
        0 => ProbeCategory::Error,
        _ => ProbeCategory::Dead,
    }
}
