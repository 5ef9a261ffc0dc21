use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use rand::seq::SliceRandom;
use reqwest::{Client, ClientBuilder, Method, Response};

use crate::config::GhostmapConfig;
use crate::throttle::{AdaptiveThrottler, HostThrottlers};

/// Statuses worth retrying on idempotent requests.
const RETRY_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

/// Per-call request options. Defaults follow redirects and use the configured
/// request timeout.
#[derive(Debug, Clone, Default)]
pub struct RequestOpts {
    pub query: Vec<(String, String)>,
    pub headers: HashMap<String, String>,
    pub timeout: Option<Duration>,
    pub no_redirects: bool,
}

impl RequestOpts {
    pub fn no_redirects() -> Self {
        Self {
            no_redirects: true,
            ..Default::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_query(mut self, query: Vec<(String, String)>) -> Self {
        self.query = query;
        self
    }
}

/// HTTP request issuer shared by every network-facing component: waits on the
/// per-host throttler, rotates User-Agents, retries idempotent methods, and
/// feeds the final status back to the throttler.
#[derive(Clone)]
pub struct RateLimitedClient {
    /// Redirect-following client for collection fetches.
    client: Client,
    /// Non-following client for probes, fuzzing, and baselines.
    raw_client: Client,
    config: GhostmapConfig,
    throttlers: HostThrottlers,
}

fn build_client(config: &GhostmapConfig, follow_redirects: bool) -> Result<Client> {
    let redirect = if follow_redirects {
        reqwest::redirect::Policy::limited(5)
    } else {
        reqwest::redirect::Policy::none()
    };
    ClientBuilder::new()
        .pool_max_idle_per_host(50)
        .pool_idle_timeout(Some(Duration::from_secs(90)))
        .tcp_keepalive(Some(Duration::from_secs(60)))
        .tcp_nodelay(true)
        .timeout(Duration::from_secs(config.request_timeout))
        .connect_timeout(Duration::from_secs(5))
        .gzip(true)
        .brotli(true)
        .use_rustls_tls()
        .danger_accept_invalid_certs(true)
        .redirect(redirect)
        .build()
        .context("failed to build HTTP client")
}

impl RateLimitedClient {
    pub fn new(config: &GhostmapConfig, throttlers: HostThrottlers) -> Result<Self> {
        Ok(Self {
            client: build_client(config, true)?,
            raw_client: build_client(config, false)?,
            config: config.clone(),
            throttlers,
        })
    }

    /// Throttler governing a given host; callers use this to apply their own
    /// pacing hints (e.g. a WAF-suggested rate).
    pub fn throttler_for(&self, host: &str) -> Arc<AdaptiveThrottler> {
        self.throttlers.for_host(host)
    }

    pub async fn get(&self, url: &str) -> Result<Response> {
        self.request(Method::GET, url, RequestOpts::default()).await
    }

    pub async fn get_with(&self, url: &str, opts: RequestOpts) -> Result<Response> {
        self.request(Method::GET, url, opts).await
    }

    pub async fn head_with(&self, url: &str, opts: RequestOpts) -> Result<Response> {
        self.request(Method::HEAD, url, opts).await
    }

    pub async fn request(&self, method: Method, url: &str, opts: RequestOpts) -> Result<Response> {
        let host = url::Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_string()))
            .unwrap_or_default();
        let throttler = self.throttlers.for_host(&host);
        throttler.wait().await;

        let idempotent = matches!(method, Method::GET | Method::HEAD | Method::OPTIONS);
        let mut attempt: u32 = 0;

        loop {
            match self.send_once(&method, url, &opts).await {
                Ok(response) => {
                    let status = response.status().as_u16();
                    if RETRY_STATUSES.contains(&status)
                        && idempotent
                        && attempt < self.config.max_retries
                    {
                        attempt += 1;
                        let backoff = self.config.retry_backoff.powi(attempt as i32);
                        tracing::debug!(url, status, attempt, backoff, "retrying request");
                        tokio::time::sleep(Duration::from_secs_f64(backoff)).await;
                        continue;
                    }
                    throttler.report(status);
                    return Ok(response);
                }
                Err(err) => {
                    if idempotent && attempt < self.config.max_retries {
                        attempt += 1;
                        let backoff = self.config.retry_backoff.powi(attempt as i32);
                        tracing::debug!(url, error = %err, attempt, "transport error, retrying");
                        tokio::time::sleep(Duration::from_secs_f64(backoff)).await;
                        continue;
                    }
                    // Transport failure after retries counts as status 0.
                    throttler.report(0);
                    return Err(err).with_context(|| format!("request failed: {url}"));
                }
            }
        }
    }

    async fn send_once(
        &self,
        method: &Method,
        url: &str,
        opts: &RequestOpts,
    ) -> Result<Response, reqwest::Error> {
        let client = if opts.no_redirects {
            &self.raw_client
        } else {
            &self.client
        };

        let mut request = client.request(method.clone(), url);

        // Insert semantics so per-call headers replace configured ones
        // instead of stacking a second value.
        let mut headers = reqwest::header::HeaderMap::new();
        if let Some(agent) = self.config.user_agents.choose(&mut rand::thread_rng()) {
            if let Ok(value) = reqwest::header::HeaderValue::from_str(agent) {
                headers.insert(reqwest::header::USER_AGENT, value);
            }
        }
        for (key, value) in self.config.headers.iter().chain(opts.headers.iter()) {
            let name = reqwest::header::HeaderName::from_bytes(key.as_bytes());
            let value = reqwest::header::HeaderValue::from_str(value);
            if let (Ok(name), Ok(value)) = (name, value) {
                headers.insert(name, value);
            }
        }
        request = request.headers(headers);
        if !opts.query.is_empty() {
            request = request.query(&opts.query);
        }
        if let Some(timeout) = opts.timeout {
            request = request.timeout(timeout);
        }

        request.send().await
    }
}
