use ghostmap::audit::fuzzer::{FuzzMode, GhostFuzzer};
use ghostmap::audit::prober::EndpointProber;
use ghostmap::audit::tech::TechDetector;
use ghostmap::audit::waf::WafDetector;
use ghostmap::collect::dedup::DedupEngine;
use ghostmap::config::GhostmapConfig;
use ghostmap::http_client::{RateLimitedClient, RequestOpts};
use ghostmap::record::{CandidateUrl, UrlRecord};
use ghostmap::throttle::HostThrottlers;
use wiremock::matchers::{any, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_config() -> GhostmapConfig {
    GhostmapConfig {
        rate_limit: 0.0,
        max_retries: 0,
        retry_backoff: 0.0,
        request_timeout: 5,
        probe_timeout: 5,
        ..Default::default()
    }
}

fn client(config: &GhostmapConfig) -> RateLimitedClient {
    RateLimitedClient::new(config, HostThrottlers::new(config.rate_limit)).unwrap()
}

fn records(urls: &[&str]) -> Vec<UrlRecord> {
    let mut dedup = DedupEngine::new();
    for url in urls {
        dedup.add(CandidateUrl::new(*url, "wayback"));
    }
    dedup.results()
}

// --- HTTP client ---------------------------------------------------------

#[tokio::test]
async fn client_sends_a_configured_user_agent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ua"))
        .and(header("user-agent", "test-agent/1.0"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let config = GhostmapConfig {
        user_agents: vec!["test-agent/1.0".to_string()],
        ..test_config()
    };
    let response = client(&config)
        .get(&format!("{}/ua", server.uri()))
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
}

#[tokio::test]
async fn per_call_headers_override_configured_ones() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/hdr"))
        .and(header("x-scan", "per-call"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let mut config = test_config();
    config
        .headers
        .insert("X-Scan".to_string(), "from-config".to_string());

    let mut opts = RequestOpts::default();
    opts.headers.insert("X-Scan".to_string(), "per-call".to_string());

    let response = client(&config)
        .get_with(&format!("{}/hdr", server.uri()), opts)
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
}

#[tokio::test]
async fn client_retries_transient_server_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(200))
        .with_priority(5)
        .mount(&server)
        .await;

    let config = GhostmapConfig {
        max_retries: 2,
        ..test_config()
    };
    let response = client(&config)
        .get(&format!("{}/flaky", server.uri()))
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
}

#[tokio::test]
async fn rate_limit_responses_reach_the_throttler() {
    let server = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let config = test_config();
    let client = client(&config);
    let _ = client.get(&format!("{}/limited", server.uri())).await;

    let throttler = client.throttler_for("127.0.0.1");
    assert!(throttler.is_throttled());
    assert!(throttler.current_delay() >= 1.0);
}

// --- Tech detector -------------------------------------------------------

#[tokio::test]
async fn tech_detector_spots_spring_from_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("Whitelabel Error Page"))
        .mount(&server)
        .await;

    let config = test_config();
    let tags = TechDetector::new(client(&config)).detect(&server.uri()).await;
    assert!(tags.contains(&"spring".to_string()));
    assert!(tags.contains(&"common".to_string()));
}

#[tokio::test]
async fn tech_detector_spots_php_from_headers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).insert_header("X-Powered-By", "PHP/7.4"))
        .mount(&server)
        .await;

    let config = test_config();
    let tags = TechDetector::new(client(&config)).detect(&server.uri()).await;
    assert!(tags.contains(&"php".to_string()));
}

#[tokio::test]
async fn tech_detector_spots_django_from_cookies() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200).insert_header("Set-Cookie", "csrftoken=xyz; Path=/"),
        )
        .mount(&server)
        .await;

    let config = test_config();
    let tags = TechDetector::new(client(&config)).detect(&server.uri()).await;
    assert!(tags.contains(&"django".to_string()));
}

#[tokio::test]
async fn tech_detector_unreachable_target_is_just_common() {
    let config = test_config();
    let tags = TechDetector::new(client(&config))
        .detect("http://127.0.0.1:1/")
        .await;
    assert_eq!(tags, vec!["common".to_string()]);
}

// --- WAF detector --------------------------------------------------------

#[tokio::test]
async fn waf_passive_detection_from_server_header() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).insert_header("Server", "cloudflare"))
        .mount(&server)
        .await;

    let config = test_config();
    let detection = WafDetector::new(client(&config)).detect(&server.uri()).await;
    assert!(detection.detected);
    assert_eq!(detection.name, "Cloudflare");
    assert_eq!(detection.suggested_rate_limit, 2.0);
}

#[tokio::test]
async fn waf_behavioral_detection_on_blocked_payload() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(query_param("id", "<script>alert(1)</script>"))
        .respond_with(ResponseTemplate::new(403))
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200))
        .with_priority(99)
        .mount(&server)
        .await;

    let config = test_config();
    let detection = WafDetector::new(client(&config)).detect(&server.uri()).await;
    assert!(detection.detected);
    assert_eq!(detection.name, "Generic WAF (Behavioral)");
    assert_eq!(detection.suggested_rate_limit, 1.0);
}

#[tokio::test]
async fn no_waf_detected_on_clean_target() {
    let server = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let config = test_config();
    let detection = WafDetector::new(client(&config)).detect(&server.uri()).await;
    assert!(!detection.detected);
}

// --- Fuzzer --------------------------------------------------------------

#[tokio::test]
async fn fuzzer_auto_mode_targets_the_detected_stack() {
    let server = MockServer::start().await;
    // The root page fingerprints as Spring; only /actuator exists.
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("Whitelabel Error Page"))
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/actuator"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"status":"UP"}"#))
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
        .with_priority(99)
        .mount(&server)
        .await;

    let config = test_config();
    let findings = GhostFuzzer::new(client(&config))
        .fuzz(&server.uri(), FuzzMode::Auto)
        .await;

    assert!(!findings.is_empty());
    assert!(findings.iter().all(|f| f.endpoint.contains("actuator")));
    assert!(!findings.iter().any(|f| f.endpoint.contains("phpinfo")));
}

#[tokio::test]
async fn fuzzer_suppresses_soft_404_pages() {
    let server = MockServer::start().await;
    // Everything returns the same 200 fallback page, including the random
    // baseline path: nothing should count as found.
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("x".repeat(2048)))
        .mount(&server)
        .await;

    let config = test_config();
    let findings = GhostFuzzer::new(client(&config))
        .fuzz(&server.uri(), FuzzMode::Auto)
        .await;
    assert!(findings.is_empty());
}

// --- Prober --------------------------------------------------------------

#[tokio::test]
async fn prober_counts_categories() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/live"))
        .respond_with(ResponseTemplate::new(200).set_body_string("plenty of real content here"))
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/auth"))
        .respond_with(ResponseTemplate::new(401))
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/broken"))
        .respond_with(ResponseTemplate::new(410))
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(404))
        .with_priority(99)
        .mount(&server)
        .await;

    let config = GhostmapConfig {
        probe_methods: vec!["GET".to_string()],
        ..test_config()
    };
    let prober = EndpointProber::new(&config, client(&config));
    let report = prober
        .probe_all(
            &records(&["/api/live", "/api/auth", "/api/broken", "/api/gone"]),
            &server.uri(),
        )
        .await;

    assert_eq!(report.total, 4);
    assert_eq!(report.active, 1);
    assert_eq!(report.auth_required, 1);
    // 410 is dead outright; a plain 404 matches the 404 baseline and lands
    // in the soft-404 bucket.
    assert_eq!(report.dead, 1);
    assert_eq!(report.soft_404, 1);
    assert_eq!(report.details["/api/live"].status_code, 200);
}

#[tokio::test]
async fn prober_flags_soft_404_instead_of_active() {
    let server = MockServer::start().await;
    // Baseline fallback page is 2048 bytes; /api/x serves 2100 bytes of the
    // same thing, within the 10% tolerance.
    Mock::given(method("GET"))
        .and(path("/api/x"))
        .respond_with(ResponseTemplate::new(200).set_body_string("y".repeat(2100)))
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200).set_body_string("x".repeat(2048)))
        .with_priority(99)
        .mount(&server)
        .await;

    let config = GhostmapConfig {
        probe_methods: vec!["GET".to_string()],
        ..test_config()
    };
    let prober = EndpointProber::new(&config, client(&config));
    let report = prober.probe_all(&records(&["/api/x"]), &server.uri()).await;

    assert_eq!(report.soft_404, 1);
    assert_eq!(report.active, 0);
    assert!(report.details["/api/x"].is_soft_404);
}

#[tokio::test]
async fn prober_scans_bodies_for_debug_indicators() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/trace"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("Exception: stack trace follows\n  at handler()"),
        )
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(404))
        .with_priority(99)
        .mount(&server)
        .await;

    let config = GhostmapConfig {
        probe_methods: vec!["GET".to_string()],
        ..test_config()
    };
    let prober = EndpointProber::new(&config, client(&config));
    let report = prober.probe_all(&records(&["/api/trace"]), &server.uri()).await;
    assert!(report.details["/api/trace"].is_debug);
}

#[tokio::test]
async fn prober_with_no_endpoints_reports_nothing() {
    let server = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let config = test_config();
    let prober = EndpointProber::new(&config, client(&config));
    let report = prober.probe_all(&[], &server.uri()).await;
    assert_eq!(report.total, 0);
    assert!(report.details.is_empty());
}
