use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde_json::json;

use crate::cli::{Cli, Commands};
use ghostmap::audit::fuzzer::{FuzzMode, GhostFuzzer};
use ghostmap::audit::noise_filter::NoiseFilter;
use ghostmap::audit::prober::EndpointProber;
use ghostmap::audit::risk::RiskScorer;
use ghostmap::audit::route_miner::RouteMiner;
use ghostmap::audit::swagger::SpecComparator;
use ghostmap::audit::waf::WafDetector;
use ghostmap::collect::commoncrawl::CommonCrawlScraper;
use ghostmap::collect::dedup::DedupEngine;
use ghostmap::collect::js_analyzer::JsAnalyzer;
use ghostmap::collect::wayback::WaybackScraper;
use ghostmap::config::GhostmapConfig;
use ghostmap::http_client::RateLimitedClient;
use ghostmap::record::{
    CandidateUrl, Meta, ScanDocument, Summary, SOURCE_GHOST_FUZZER, SOURCE_JS_ANALYSIS,
};
use ghostmap::sanitize::FootprintSanitizer;
use ghostmap::throttle::HostThrottlers;

pub async fn run_from_cli(cli: Cli) -> Result<()> {
    // Our crate at the requested level; reqwest/hyper stay at info so debug
    // runs don't drown in connection chatter.
    use tracing_subscriber::EnvFilter;
    let crate_level = if cli.verbose { "debug" } else { "info" };
    let filter_str = format!("ghostmap={crate_level},reqwest=info,hyper=info,h2=info");
    let env_filter =
        EnvFilter::try_new(&filter_str).unwrap_or_else(|_| EnvFilter::new(crate_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_ansi(true)
        .with_target(false)
        .init();

    let mut config = match &cli.config {
        Some(path) => GhostmapConfig::load_from_file(Path::new(path))?,
        None => GhostmapConfig::default(),
    };
    config.verbose = cli.verbose;

    match cli.command {
        Commands::Collect {
            domain,
            output,
            limit,
            skip_js,
            skip_commoncrawl,
            rate_limit,
            headers,
        } => {
            if let Some(rate) = rate_limit {
                config.rate_limit = rate;
            }
            for header in &headers {
                let Some((key, value)) = header.split_once(':') else {
                    bail!("invalid header (expected K:V): {header}");
                };
                config
                    .headers
                    .insert(key.trim().to_string(), value.trim().to_string());
            }
            run_collect(config, domain, output, limit, skip_js, skip_commoncrawl).await
        }
        Commands::Sanitize {
            input,
            output,
            strict,
        } => run_sanitize(input, output, strict).await,
        Commands::Audit {
            input,
            output,
            swagger,
            git_repo,
            probe,
            base_url,
            fuzz,
            fuzz_mode,
            scan_all,
        } => {
            let fuzz_mode: FuzzMode = fuzz_mode.parse().map_err(anyhow::Error::msg)?;
            run_audit(AuditArgs {
                config,
                input,
                output,
                swagger,
                git_repo,
                probe,
                base_url,
                fuzz,
                fuzz_mode,
                scan_all,
            })
            .await
        }
    }
}

async fn run_collect(
    config: GhostmapConfig,
    domain: String,
    output: Option<String>,
    limit: Option<usize>,
    skip_js: bool,
    skip_commoncrawl: bool,
) -> Result<()> {
    // Accept a full URL as target and reduce it to its host.
    let domain = if domain.starts_with("http://") || domain.starts_with("https://") {
        url::Url::parse(&domain)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_string()))
            .unwrap_or(domain)
    } else {
        domain
    };

    tracing::info!(domain, "starting collection");

    let throttlers = HostThrottlers::new(config.rate_limit);
    let client = RateLimitedClient::new(&config, throttlers)?;
    let mut dedup = DedupEngine::new();

    let wayback = WaybackScraper::new(&config, client.clone());
    let wayback_results = wayback.fetch_urls(&domain, limit, None).await;
    let js_urls = wayback.extract_js_urls(&wayback_results);
    let api_candidates = wayback.extract_api_urls(&wayback_results).len();
    dedup.add_many(wayback_results);

    if !skip_commoncrawl {
        let commoncrawl = CommonCrawlScraper::new(&config, client.clone());
        let cc_results = commoncrawl.fetch_urls(&domain, limit, None).await;
        dedup.add_many(cc_results);
    }

    if !skip_js && !js_urls.is_empty() {
        let analyzer = JsAnalyzer::new(&config, client.clone());
        let analysis = analyzer.analyze_js_urls(&js_urls, &domain).await;
        let candidates: Vec<CandidateUrl> = analysis
            .endpoints
            .into_iter()
            .map(|found| CandidateUrl {
                url: found.endpoint,
                source: SOURCE_JS_ANALYSIS.to_string(),
                pattern_name: found.pattern_name.to_string(),
                source_file: found.source_file,
                ..Default::default()
            })
            .collect();
        dedup.add_many(candidates);
    }

    let stats = dedup.stats();
    let mut meta = Meta::new();
    meta.domain = Some(domain.clone());
    meta.stats = json!({
        "dedup": stats,
        "wayback_api_candidates": api_candidates,
    });

    let document = ScanDocument {
        meta,
        summary: None,
        endpoints: dedup.results(),
    };

    let output = output.unwrap_or_else(|| format!("{domain}_footprint.json"));
    write_document(Path::new(&output), &document).await?;
    println!(
        "Collected {} unique endpoints -> {}",
        document.endpoints.len(),
        output
    );
    Ok(())
}

async fn run_sanitize(input: String, output: Option<String>, strict: bool) -> Result<()> {
    let document = load_document(Path::new(&input)).await?;

    let mut sanitizer = if strict {
        FootprintSanitizer::strict()
    } else {
        FootprintSanitizer::new()
    };
    let mut sanitized = sanitizer.sanitize(&document)?;
    sanitized.meta.input_file = Some(input.clone());

    let report = sanitizer.report();
    tracing::info!(
        records = report.total_processed,
        params = report.params_removed,
        emails = report.emails_removed,
        jwts = report.jwts_removed,
        suspicious = report.suspicious_patterns,
        "sanitization complete"
    );
    merge_stats(&mut sanitized.meta, "sanitize", json!(report));

    if !sanitizer.validate(&sanitized) {
        tracing::warn!("sanitized output still contains redactable patterns");
    }

    let output = output.unwrap_or_else(|| derive_output(&input, "sanitized"));
    write_document(Path::new(&output), &sanitized).await?;
    println!(
        "Sanitized {} endpoints -> {}",
        sanitized.endpoints.len(),
        output
    );
    Ok(())
}

struct AuditArgs {
    config: GhostmapConfig,
    input: String,
    output: Option<String>,
    swagger: Option<String>,
    git_repo: Option<String>,
    probe: bool,
    base_url: Option<String>,
    fuzz: bool,
    fuzz_mode: FuzzMode,
    scan_all: bool,
}

async fn run_audit(args: AuditArgs) -> Result<()> {
    let mut document = load_document(Path::new(&args.input)).await?;
    document.meta.input_file = Some(args.input.clone());
    let config = args.config;

    let throttlers = HostThrottlers::new(config.rate_limit);
    let client = RateLimitedClient::new(&config, throttlers)?;

    // Stage 1: drop public-content noise, unless the caller wants everything.
    let mut records = document.endpoints;
    if !args.scan_all {
        let mut filter = NoiseFilter::new();
        records = filter.filter_records(records);
        merge_stats(&mut document.meta, "noise_filter", json!(filter.stats()));
    }

    // Stage 2: assemble the documented set from the spec and the source tree.
    let mut documented: BTreeSet<String> = BTreeSet::new();
    let mut comparator = SpecComparator::new();
    if let Some(spec_path) = &args.swagger {
        documented.extend(comparator.load_spec(Path::new(spec_path)));
        if let Some(details) = comparator.spec_details() {
            document.meta.swagger_spec =
                Some(format!("{} {} ({})", details.title, details.version, spec_path));
        }
    }
    if let Some(repo) = &args.git_repo {
        documented.extend(RouteMiner::new().mine(Path::new(repo)));
        document.meta.git_repo = Some(repo.clone());
    }

    // Resolve the probing origin.
    let base_url = args
        .base_url
        .or_else(|| document.meta.base_url.clone())
        .or_else(|| {
            document
                .meta
                .domain
                .as_ref()
                .map(|domain| format!("https://{domain}"))
        });

    if (args.probe || args.fuzz) && base_url.is_none() {
        bail!("--probe/--fuzz need --base-url or a footprint with a domain");
    }

    // A WAF in front of the origin means we slow down before touching it.
    if args.probe || args.fuzz {
        let base = base_url.as_deref().unwrap_or_default();
        let detection = WafDetector::new(client.clone()).detect(base).await;
        if detection.detected {
            tracing::warn!(
                waf = %detection.name,
                rate = detection.suggested_rate_limit,
                "WAF detected, lowering request rate"
            );
            if let Some(host) = url::Url::parse(base).ok().and_then(|u| u.host_str().map(String::from)) {
                client
                    .throttler_for(&host)
                    .slow_to(detection.suggested_rate_limit);
            }
            merge_stats(&mut document.meta, "waf", json!({ "name": detection.name }));
        }
    }

    // Stage 3: fuzz for hidden paths and merge the findings in.
    if args.fuzz {
        let base = base_url.as_deref().unwrap_or_default();
        let findings = GhostFuzzer::new(client.clone()).fuzz(base, args.fuzz_mode).await;
        tracing::info!(found = findings.len(), "fuzzing complete");

        let mut engine = DedupEngine::new();
        for record in records {
            engine.absorb(record);
        }
        for finding in findings {
            engine.add(CandidateUrl {
                url: finding.endpoint,
                source: SOURCE_GHOST_FUZZER.to_string(),
                status_code: finding.status.to_string(),
                ..Default::default()
            });
        }
        records = engine.results();
    }

    // Stage 4: documentation comparison.
    let comparison = comparator.compare(&records, Some(&documented));
    merge_stats(&mut document.meta, "comparison", json!(comparison.stats));

    // Stage 5: live probing.
    let mut probe_details = HashMap::new();
    if args.probe {
        let base = base_url.as_deref().unwrap_or_default();
        let prober = EndpointProber::new(&config, client.clone());
        let report = prober.probe_all(&records, base).await;
        merge_stats(
            &mut document.meta,
            "probe",
            json!({
                "total": report.total,
                "active": report.active,
                "auth_required": report.auth_required,
                "redirect": report.redirect,
                "soft_404": report.soft_404,
                "dead": report.dead,
                "error": report.error,
            }),
        );
        probe_details = report.details;
    }

    // Stage 6: risk scoring (sorts by score, attaches probe outcomes).
    let scorer = RiskScorer::new(&config);
    let records = scorer.score_all(records, &documented, &probe_details);

    let summary = Summary::from_records(&records);
    document.meta.base_url = base_url;
    document.meta.probing_enabled = args.probe;
    document.summary = Some(summary.clone());
    document.endpoints = records;

    let output = args
        .output
        .unwrap_or_else(|| derive_output(&args.input, "audited"));
    write_document(Path::new(&output), &document).await?;

    println!(
        "Audited {} endpoints ({} high, {} medium, {} low risk) -> {}",
        summary.total_endpoints, summary.high_risk, summary.medium_risk, summary.low_risk, output
    );
    Ok(())
}

async fn load_document(path: &Path) -> Result<ScanDocument> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("cannot read input file: {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("invalid scan document: {}", path.display()))
}

async fn write_document(path: &Path, document: &ScanDocument) -> Result<()> {
    let raw = serde_json::to_string_pretty(document)?;
    tokio::fs::write(path, raw)
        .await
        .with_context(|| format!("cannot write output file: {}", path.display()))
}

fn derive_output(input: &str, suffix: &str) -> String {
    let path = PathBuf::from(input);
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("ghostmap");
    let parent = path.parent().unwrap_or(Path::new(""));
    parent
        .join(format!("{stem}_{suffix}.json"))
        .to_string_lossy()
        .into_owned()
}

fn merge_stats(meta: &mut Meta, key: &str, value: serde_json::Value) {
    if !meta.stats.is_object() {
        meta.stats = json!({});
    }
    if let Some(map) = meta.stats.as_object_mut() {
        map.insert(key.to_string(), value);
    }
}
