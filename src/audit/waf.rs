use std::time::Duration;

use crate::http_client::{RateLimitedClient, RequestOpts};

/// WAF block responses used by the behavioral check.
const BLOCK_STATUSES: [u16; 3] = [403, 406, 501];

/// Harmless payloads that signature-based WAFs reject on sight.
const PROBE_PAYLOADS: [&str; 2] = ["<script>alert(1)</script>", "' OR 1=1 --"];

#[derive(Debug, Clone, Default)]
pub struct WafDetection {
    pub detected: bool,
    pub name: String,
    /// Conservative request rate to adopt when a WAF is present, in req/s.
    /// Zero means no suggestion.
    pub suggested_rate_limit: f64,
}

/// Two-phase WAF detection: passive header signatures first, then a
/// behavioral check with benign payloads.
pub struct WafDetector {
    client: RateLimitedClient,
}

impl WafDetector {
    pub fn new(client: RateLimitedClient) -> Self {
        Self { client }
    }

    pub async fn detect(&self, url: &str) -> WafDetection {
        let opts = RequestOpts::default().with_timeout(Duration::from_secs(10));
        let baseline = match self.client.get_with(url, opts).await {
            Ok(response) => response,
            Err(err) => {
                tracing::warn!(url, error = %err, "WAF detection failed");
                return WafDetection::default();
            }
        };

        // Phase 1: passive header analysis.
        let headers = baseline.headers();
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .unwrap_or_default()
                .to_lowercase()
        };
        let server = header("server");
        let via = header("via");
        let x_cdn = header("x-cdn");
        let cf_ray = header("cf-ray");

        let passive_name = if server.contains("cloudflare") || !cf_ray.is_empty() {
            Some("Cloudflare")
        } else if server.contains("akamai") || via.contains("akamai") || x_cdn.contains("akamai") {
            Some("Akamai")
        } else if server.contains("aws") || via.contains("cloudfront") {
            Some("AWS CloudFront")
        } else if server.contains("imperva") || via.contains("incapsula") {
            Some("Imperva/Incapsula")
        } else {
            None
        };

        if let Some(name) = passive_name {
            tracing::info!(url, waf = name, "passive WAF detection hit");
            return WafDetection {
                detected: true,
                name: name.to_string(),
                suggested_rate_limit: 2.0,
            };
        }

        let baseline_status = baseline.status().as_u16();
        let baseline_blocked = BLOCK_STATUSES.contains(&baseline_status);

        // Phase 2: behavioral analysis with benign payloads.
        for payload in PROBE_PAYLOADS {
            let opts = RequestOpts::default()
                .with_timeout(Duration::from_secs(5))
                .with_query(vec![("id".to_string(), payload.to_string())]);

            match self.client.get_with(url, opts).await {
                Ok(response) => {
                    let status = response.status().as_u16();
                    if BLOCK_STATUSES.contains(&status) && !baseline_blocked {
                        tracing::info!(url, payload, status, "behavioral WAF detection hit");
                        return WafDetection {
                            detected: true,
                            name: "Generic WAF (Behavioral)".to_string(),
                            suggested_rate_limit: 1.0,
                        };
                    }
                }
                Err(err) => {
                    tracing::warn!(url, error = %err, "WAF probe failed");
                    return WafDetection::default();
                }
            }

            tokio::time::sleep(Duration::from_millis(500)).await;
        }

        WafDetection::default()
    }
}
