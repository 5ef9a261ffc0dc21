use ghostmap::collect::commoncrawl::CommonCrawlScraper;
use ghostmap::collect::js_analyzer::JsAnalyzer;
use ghostmap::collect::wayback::WaybackScraper;
use ghostmap::config::GhostmapConfig;
use ghostmap::http_client::RateLimitedClient;
use ghostmap::record::CandidateUrl;
use ghostmap::throttle::HostThrottlers;
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_config() -> GhostmapConfig {
    GhostmapConfig {
        rate_limit: 0.0,
        max_retries: 0,
        retry_backoff: 0.0,
        request_timeout: 5,
        ..Default::default()
    }
}

fn client(config: &GhostmapConfig) -> RateLimitedClient {
    RateLimitedClient::new(config, HostThrottlers::new(config.rate_limit)).unwrap()
}

#[tokio::test]
async fn wayback_parses_cdx_rows_after_header() {
    let server = MockServer::start().await;
    let rows = json!([
        ["original", "timestamp", "statuscode", "mimetype"],
        ["https://example.com/api/v1/users", "20230101120000", "200", "text/html"],
        ["https://example.com/api/v1/products", "20230201120000", "200", "application/json"],
    ]);
    Mock::given(method("GET"))
        .and(path("/cdx"))
        .and(query_param("page", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(rows))
        .mount(&server)
        .await;

    let config = test_config();
    let scraper = WaybackScraper::new(&config, client(&config))
        .with_cdx_url(format!("{}/cdx", server.uri()));
    let results = scraper.fetch_urls("example.com", None, None).await;

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].url, "https://example.com/api/v1/users");
    assert_eq!(results[0].source, "wayback");
    assert_eq!(results[0].timestamp, "20230101120000");
}

#[tokio::test]
async fn wayback_progress_callback_fires() {
    let server = MockServer::start().await;
    let rows = json!([
        ["original", "timestamp", "statuscode", "mimetype"],
        ["https://example.com/api/v1", "20230101", "200", "text/html"],
    ]);
    Mock::given(method("GET"))
        .and(path("/cdx"))
        .respond_with(ResponseTemplate::new(200).set_body_json(rows))
        .mount(&server)
        .await;

    let config = test_config();
    let scraper = WaybackScraper::new(&config, client(&config))
        .with_cdx_url(format!("{}/cdx", server.uri()));

    let calls = std::sync::Mutex::new(Vec::new());
    let callback = |batch: usize, total: usize| {
        calls.lock().unwrap().push((batch, total));
    };
    scraper.fetch_urls("example.com", None, Some(&callback)).await;

    let calls = calls.into_inner().unwrap();
    assert_eq!(calls, vec![(1, 1)]);
}

#[tokio::test]
async fn wayback_http_error_yields_empty() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cdx"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let config = test_config();
    let scraper = WaybackScraper::new(&config, client(&config))
        .with_cdx_url(format!("{}/cdx", server.uri()));
    assert!(scraper.fetch_urls("example.com", None, None).await.is_empty());
}

#[tokio::test]
async fn wayback_invalid_json_stops_pagination() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cdx"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json at all"))
        .mount(&server)
        .await;

    let config = test_config();
    let scraper = WaybackScraper::new(&config, client(&config))
        .with_cdx_url(format!("{}/cdx", server.uri()));
    assert!(scraper.fetch_urls("example.com", None, None).await.is_empty());
}

#[test]
fn wayback_api_filter_keeps_indicator_urls() {
    let config = test_config();
    let scraper = WaybackScraper::new(&config, client(&config));
    let urls: Vec<CandidateUrl> = [
        "https://example.com/api/v1/users",
        "https://example.com/index.html",
        "https://example.com/swagger/docs",
        "https://example.com/about",
    ]
    .iter()
    .map(|u| CandidateUrl::new(*u, "wayback"))
    .collect();

    let api_urls = scraper.extract_api_urls(&urls);
    assert_eq!(api_urls.len(), 2);
}

#[test]
fn wayback_js_urls_are_unique_and_query_stripped() {
    let config = test_config();
    let scraper = WaybackScraper::new(&config, client(&config));
    let urls: Vec<CandidateUrl> = [
        "https://example.com/static/app.js",
        "https://example.com/static/app.js?v=2",
        "https://example.com/bundle.min.js?v=123",
        "https://example.com/api/data",
        "https://example.com/module.mjs",
    ]
    .iter()
    .map(|u| CandidateUrl::new(*u, "wayback"))
    .collect();

    let js_urls = scraper.extract_js_urls(&urls);
    assert_eq!(js_urls.len(), 3);
    assert!(js_urls.contains(&"https://example.com/static/app.js".to_string()));
    assert!(js_urls.contains(&"https://example.com/module.mjs".to_string()));
}

#[tokio::test]
async fn commoncrawl_reads_ndjson_and_skips_garbage() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/collinfo.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "CC-MAIN-2024-10", "cdx-api": format!("{}/cc-index", server.uri())}
        ])))
        .mount(&server)
        .await;

    let body = concat!(
        r#"{"url": "https://example.com/api/users", "timestamp": "20240101", "status": 200, "mime": "text/html"}"#,
        "\n",
        "this line is not json\n",
        r#"{"url": "https://example.com/login", "timestamp": "20240102", "status": "301", "mime": "text/html"}"#,
        "\n",
    );
    Mock::given(method("GET"))
        .and(path("/cc-index"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(&server)
        .await;

    let config = test_config();
    let scraper = CommonCrawlScraper::new(&config, client(&config))
        .with_index_list_url(format!("{}/collinfo.json", server.uri()));
    let results = scraper.fetch_urls("example.com", None, None).await;

    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r.source == "commoncrawl"));
    assert_eq!(results[1].status_code, "301");
}

#[tokio::test]
async fn commoncrawl_without_indexes_yields_empty() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/collinfo.json"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let config = test_config();
    let scraper = CommonCrawlScraper::new(&config, client(&config))
        .with_index_list_url(format!("{}/collinfo.json", server.uri()));
    assert!(scraper.fetch_urls("example.com", None, None).await.is_empty());
}

#[tokio::test]
async fn js_analyzer_extracts_and_attributes_endpoints() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/app.js"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("fetch('/api/from-js'); axios.get('/api/other/thing');"),
        )
        .mount(&server)
        .await;

    let config = test_config();
    let analyzer = JsAnalyzer::new(&config, client(&config));
    let js_url = format!("{}/app.js", server.uri());
    let analysis = analyzer.analyze_js_urls(&[js_url.clone()], "").await;

    assert_eq!(analysis.stats.files_analyzed, 1);
    assert_eq!(analysis.stats.files_failed, 0);
    assert!(analysis.endpoints.iter().any(|e| e.endpoint == "/api/from-js"));
    assert!(analysis.endpoints.iter().all(|e| e.source_file == js_url));
}

#[tokio::test]
async fn js_analyzer_skips_oversized_files() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/big.js"))
        .respond_with(ResponseTemplate::new(200).set_body_string("x".repeat(1024)))
        .mount(&server)
        .await;

    let config = GhostmapConfig {
        max_js_file_size: 100,
        ..test_config()
    };
    let analyzer = JsAnalyzer::new(&config, client(&config));
    let analysis = analyzer
        .analyze_js_urls(&[format!("{}/big.js", server.uri())], "")
        .await;

    assert_eq!(analysis.stats.files_analyzed, 0);
    assert_eq!(analysis.stats.files_failed, 1);
    assert!(analysis.endpoints.is_empty());
}

#[tokio::test]
async fn js_analyzer_tolerates_failed_downloads() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gone.js"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let config = test_config();
    let analyzer = JsAnalyzer::new(&config, client(&config));
    let analysis = analyzer
        .analyze_js_urls(&[format!("{}/gone.js", server.uri())], "")
        .await;
    assert_eq!(analysis.stats.files_failed, 1);
}
