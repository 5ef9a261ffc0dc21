use std::str::FromStr;
use std::time::Duration;

use rand::distributions::Alphanumeric;
use rand::Rng;

use crate::audit::soft404::{is_soft_404, Baseline};
use crate::audit::tech::TechDetector;
use crate::audit::wordlists::{all_payloads, payloads_for_tags};
use crate::http_client::{RateLimitedClient, RequestOpts};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FuzzMode {
    /// Detect the stack first and fuzz only the matching wordlists.
    #[default]
    Auto,
    /// Brute-force every known wordlist.
    All,
}

impl FromStr for FuzzMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(FuzzMode::Auto),
            "all" => Ok(FuzzMode::All),
            other => Err(format!("unknown fuzz mode: {other} (expected auto|all)")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FuzzFinding {
    /// Full URL of the discovered endpoint.
    pub endpoint: String,
    pub status: u16,
    pub payload: String,
    pub length: u64,
}

/// Wordlist-driven discovery of hidden paths, with a soft-404 baseline so SPA
/// fallback pages don't flood the results.
pub struct GhostFuzzer {
    client: RateLimitedClient,
}

impl GhostFuzzer {
    pub fn new(client: RateLimitedClient) -> Self {
        Self { client }
    }

    pub async fn fuzz(&self, base_url: &str, mode: FuzzMode) -> Vec<FuzzFinding> {
        let base = if base_url.starts_with("http") {
            base_url.trim_end_matches('/').to_string()
        } else {
            format!("https://{}", base_url.trim_end_matches('/'))
        };

        let payloads = match mode {
            FuzzMode::Auto => {
                let tags = TechDetector::new(self.client.clone()).detect(&base).await;
                tracing::info!(?tags, "fuzzing in auto mode");
                payloads_for_tags(&tags)
            }
            FuzzMode::All => {
                tracing::info!("fuzzing in all mode, every wordlist enabled");
                all_payloads()
            }
        };
        tracing::info!(count = payloads.len(), "payloads generated");

        let baseline = self.establish_baseline(&base).await;
        let mut found = Vec::new();

        for payload in &payloads {
            let target = format!("{base}/{payload}");
            let opts = RequestOpts::no_redirects().with_timeout(Duration::from_secs(5));

            let response = match self.client.get_with(&target, opts).await {
                Ok(response) => response,
                Err(err) => {
                    tracing::debug!(target, error = %err, "fuzz probe failed");
                    continue;
                }
            };

            let status = response.status().as_u16();
            if status == 404 {
                continue;
            }

            let location = header_string(&response, reqwest::header::LOCATION);
            let length = response.bytes().await.map(|b| b.len() as u64).unwrap_or(0);

            if is_soft_404(status, length, &location, baseline.as_ref()) {
                tracing::debug!(target, status, "soft 404 ignored");
                continue;
            }

            tracing::info!(target, status, "hidden endpoint found");
            found.push(FuzzFinding {
                endpoint: target,
                status,
                payload: payload.clone(),
                length,
            });
        }

        found
    }

    /// Probe a random nonexistent path so we know what this server's "not
    /// found" actually looks like.
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
                let location = header_string(&response, reqwest::header::LOCATION);
                let length = response.bytes().await.map(|b| b.len() as u64).unwrap_or(0);
                tracing::info!(status, length, location, "fuzzer baseline established");
                Some(Baseline {
                    status,
                    body_length: length,
                    redirect_location: location,
                })
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to establish baseline");
                None
            }
        }
    }
}

fn header_string(response: &reqwest::Response, name: reqwest::header::HeaderName) -> String {
    response
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fuzz_mode_parses() {
        assert_eq!("auto".parse::<FuzzMode>().unwrap(), FuzzMode::Auto);
        assert_eq!("ALL".parse::<FuzzMode>().unwrap(), FuzzMode::All);
        assert!("everything".parse::<FuzzMode>().is_err());
    }
}
