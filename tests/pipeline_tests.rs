use std::collections::{BTreeSet, HashMap};
use std::io::Write;

use ghostmap::audit::noise_filter::NoiseFilter;
use ghostmap::audit::risk::RiskScorer;
use ghostmap::audit::swagger::SpecComparator;
use ghostmap::collect::dedup::DedupEngine;
use ghostmap::config::GhostmapConfig;
use ghostmap::record::{CandidateUrl, Meta, ProbeOutcome, RiskLevel, ScanDocument};
use ghostmap::sanitize::FootprintSanitizer;

fn spec_file() -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
    write!(
        file,
        r#"{{
            "openapi": "3.0.0",
            "info": {{"title": "Shop API", "version": "1.2.0"}},
            "servers": [{{"url": "https://api.shop.example/v1"}}],
            "paths": {{
                "/users": {{"get": {{}}}},
                "/users/{{id}}": {{"get": {{}}}},
                "/products": {{"get": {{}}}}
            }}
        }}"#
    )
    .unwrap();
    file
}

/// Collected footprint -> noise filter -> documentation comparison -> risk
/// scoring, with probe results injected where the live probe would run.
#[test]
fn full_audit_flags_the_ghost_endpoint() {
    // Collect.
    let mut dedup = DedupEngine::new();
    for (url, source, timestamp) in [
        ("https://shop.example/v1/users", "wayback", "2023-01-01"),
        ("https://shop.example/v1/users", "commoncrawl", "2024-02-02"),
        ("https://shop.example/v1/admin/debug", "wayback", "2021-06-01"),
        ("https://shop.example/blog/how-we-built-it", "wayback", "2023-09-09"),
        ("https://shop.example/v1/internal/metrics", "wayback", "2020-01-01"),
    ] {
        dedup.add(CandidateUrl {
            url: url.to_string(),
            source: source.to_string(),
            timestamp: timestamp.to_string(),
            ..Default::default()
        });
    }
    let records = dedup.results();
    assert_eq!(records.len(), 4);

    // Audit: noise filter drops the blog post.
    let mut filter = NoiseFilter::new();
    let records = filter.filter_records(records);
    assert_eq!(records.len(), 3);

    // Documentation comparison.
    let file = spec_file();
    let mut comparator = SpecComparator::new();
    let documented = comparator.load_spec(file.path());
    let comparison = comparator.compare(&records, Some(&documented));
    assert_eq!(comparison.stats.ghost_count, 2);
    assert_eq!(comparison.stats.documented_found, 1);
    assert_eq!(comparison.stats.spec_only_count, 2);

    // Probe results as the prober would report them.
    let mut probes = HashMap::new();
    probes.insert(
        "/v1/admin/debug".to_string(),
        ProbeOutcome {
            status_code: 200,
            has_auth: false,
            is_debug: true,
            ..Default::default()
        },
    );

    // Risk scoring.
    let scorer = RiskScorer::new(&GhostmapConfig::default());
    let scored = scorer.score_all(records, &documented, &probes);

    // Highest risk first, and the worst offender is the live debug ghost.
    let top = &scored[0];
    assert!(top.raw_url.contains("/admin/debug"));
    let risk = top.risk.as_ref().unwrap();
    assert!(risk.score >= 70);
    assert_eq!(risk.level, RiskLevel::High);
    assert!(risk.is_ghost);
    assert!(!risk.is_documented);

    // The documented endpoint scored low and is not a ghost.
    let users = scored
        .iter()
        .find(|r| r.raw_url.ends_with("/v1/users"))
        .unwrap();
    let users_risk = users.risk.as_ref().unwrap();
    assert!(users_risk.is_documented);
    assert!(!users_risk.is_ghost);
}

#[test]
fn sanitize_then_audit_keeps_record_identity() {
    let mut dedup = DedupEngine::new();
    dedup.add(CandidateUrl::new(
        "https://shop.example/v1/export?token=abc123&fmt=csv",
        "wayback",
    ));
    let document = ScanDocument {
        meta: Meta::new(),
        summary: None,
        endpoints: dedup.results(),
    };

    let mut sanitizer = FootprintSanitizer::new();
    let sanitized = sanitizer.sanitize(&document).unwrap();
    assert!(sanitizer.validate(&sanitized));

    // The token never survives, but the record is still auditable.
    let record = &sanitized.endpoints[0];
    assert!(!record.raw_url.contains("abc123"));
    assert!(record.raw_url.contains("fmt=csv"));

    let scorer = RiskScorer::new(&GhostmapConfig::default());
    let scored = scorer.score_all(sanitized.endpoints, &BTreeSet::new(), &HashMap::new());
    assert!(scored[0].risk.is_some());
}

#[test]
fn scan_document_round_trips_through_json() {
    let mut dedup = DedupEngine::new();
    dedup.add(CandidateUrl {
        url: "https://shop.example/v1/users".to_string(),
        source: "wayback".to_string(),
        timestamp: "2023-01-01".to_string(),
        status_code: "200".to_string(),
        mime_type: "application/json".to_string(),
        ..Default::default()
    });

    let mut meta = Meta::new();
    meta.domain = Some("shop.example".to_string());
    let records = RiskScorer::new(&GhostmapConfig::default()).score_all(
        dedup.results(),
        &BTreeSet::new(),
        &HashMap::new(),
    );
    let document = ScanDocument {
        meta,
        summary: Some(ghostmap::record::Summary::from_records(&records)),
        endpoints: records,
    };

    let serialized = serde_json::to_string_pretty(&document).unwrap();
    let parsed: ScanDocument = serde_json::from_str(&serialized).unwrap();

    assert_eq!(parsed.meta.tool, "ghostmap");
    assert_eq!(parsed.meta.domain.as_deref(), Some("shop.example"));
    assert_eq!(parsed.endpoints.len(), 1);

    let record = &parsed.endpoints[0];
    assert_eq!(record.occurrence_count, 1);
    assert!(record.observed_status_codes.contains("200"));
    let risk = record.risk.as_ref().unwrap();
    assert_eq!(risk.level, RiskLevel::Medium);

    // Level names serialize in their uppercase wire form.
    assert!(serialized.contains("\"MEDIUM\""));
}

#[test]
fn empty_footprint_flows_through_every_stage() {
    let mut filter = NoiseFilter::new();
    let records = filter.filter_records(Vec::new());
    assert!(records.is_empty());

    let comparator = SpecComparator::new();
    let comparison = comparator.compare(&records, None);
    assert_eq!(comparison.stats.total_collected, 0);

    let scorer = RiskScorer::new(&GhostmapConfig::default());
    let scored = scorer.score_all(records, &BTreeSet::new(), &HashMap::new());
    assert!(scored.is_empty());

    let document = ScanDocument {
        meta: Meta::new(),
        summary: Some(ghostmap::record::Summary::from_records(&scored)),
        endpoints: scored,
    };
    assert_eq!(document.summary.unwrap().total_endpoints, 0);
}
