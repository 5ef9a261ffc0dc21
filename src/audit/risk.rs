use std::collections::{BTreeSet, HashMap};

use regex::Regex;

use crate::audit::swagger::{extract_path, normalize_path};
use crate::config::GhostmapConfig;
use crate::record::{ProbeOutcome, Risk, RiskFactor, RiskLevel, UrlRecord};

/// Weighted additive risk scoring, capped at 100. Output is re-sorted by
/// score descending but otherwise unchanged.
pub struct RiskScorer {
    config: GhostmapConfig,
    /// One compiled matcher per sensitive keyword, bounded to path segment
    /// boundaries so "dev" hits "/dev/" but not "/devices/".
    keyword_patterns: Vec<(String, Regex)>,
}

impl RiskScorer {
    pub fn new(config: &GhostmapConfig) -> Self {
        let keyword_patterns = config
            .sensitive_keywords
            .iter()
            .filter_map(|keyword| {
                let pattern = format!(r"(?:^|[/\-_.]){}(?:$|[/\-_.])", regex::escape(keyword));
                Regex::new(&pattern)
                    .ok()
                    .map(|regex| (keyword.clone(), regex))
            })
            .collect();
        Self {
            config: config.clone(),
            keyword_patterns,
        }
    }

    /// Score every record and sort the result by score descending.
    pub fn score_all(
        &self,
        records: Vec<UrlRecord>,
        documented: &BTreeSet<String>,
        probes: &HashMap<String, ProbeOutcome>,
    ) -> Vec<UrlRecord> {
        let documented_normalized: BTreeSet<String> =
            documented.iter().map(|path| normalize_path(path)).collect();

        let mut scored: Vec<UrlRecord> = records
            .into_iter()
            .map(|record| self.score_one(record, &documented_normalized, probes))
            .collect();

        scored.sort_by(|a, b| {
            let score = |r: &UrlRecord| r.risk.as_ref().map(|risk| risk.score).unwrap_or(0);
            score(b).cmp(&score(a))
        });

        let high = scored.iter().filter(|r| level(r) == Some(RiskLevel::High)).count();
        let medium = scored.iter().filter(|r| level(r) == Some(RiskLevel::Medium)).count();
        let low = scored.iter().filter(|r| level(r) == Some(RiskLevel::Low)).count();
        tracing::info!(high, medium, low, "risk scoring complete");

        scored
    }

    fn score_one(
        &self,
        mut record: UrlRecord,
        documented: &BTreeSet<String>,
        probes: &HashMap<String, ProbeOutcome>,
    ) -> UrlRecord {
        let url = if record.raw_url.is_empty() {
            record.canonical_key.clone()
        } else {
            record.raw_url.clone()
        };
        let path = extract_path(&url);
        let path_lower = path.to_lowercase();

        let mut score: u32 = 0;
        let mut factors: Vec<RiskFactor> = Vec::new();

        // Documentation status.
        let is_documented = !documented.is_empty() && documented.contains(&normalize_path(&path));
        if !is_documented {
            score += self.config.weight_undocumented;
            factors.push(RiskFactor {
                name: "undocumented".to_string(),
                points: self.config.weight_undocumented,
                detail: "Endpoint not found in API documentation".to_string(),
            });
        }

        // Live status.
        let probe = probes.get(&path).cloned().or_else(|| record.probe.clone());
        let status = probe.as_ref().map(|p| p.status_code).unwrap_or(0);
        if (200..300).contains(&status) {
            score += self.config.weight_active;
            factors.push(RiskFactor {
                name: "active".to_string(),
                points: self.config.weight_active,
                detail: format!("Endpoint returns HTTP {status}"),
            });
        } else if status == 401 || status == 403 {
            let points = (self.config.weight_active as f64 * 0.6) as u32;
            score += points;
            factors.push(RiskFactor {
                name: "active_auth_required".to_string(),
                points,
                detail: format!("Endpoint requires auth (HTTP {status})"),
            });
        }

        // Sensitive keywords at path segment boundaries.
        let matched: Vec<&str> = self
            .keyword_patterns
            .iter()
            .filter(|(_, regex)| regex.is_match(&path_lower))
            .map(|(keyword, _)| keyword.as_str())
            .collect();
        if !matched.is_empty() {
            let weight = self.config.weight_sensitive_keywords;
            let points = ((matched.len() as u32) * (weight / 2)).min(weight);
            score += points;
            factors.push(RiskFactor {
                name: "sensitive_keywords".to_string(),
                points,
                detail: format!("Contains: {}", matched.join(", ")),
            });
        }

        // Missing authentication on a live endpoint.
        if let Some(probe) = &probe {
            if (200..300).contains(&status) && !probe.has_auth {
                score += self.config.weight_no_auth;
                factors.push(RiskFactor {
                    name: "no_auth".to_string(),
                    points: self.config.weight_no_auth,
                    detail: "Endpoint accessible without authentication".to_string(),
                });
            }
            if probe.is_debug {
                score += 10;
                factors.push(RiskFactor {
                    name: "debug_endpoint".to_string(),
                    points: 10,
                    detail: "Response contains debug/diagnostic information".to_string(),
                });
            }
            if probe.is_admin {
                score += 10;
                factors.push(RiskFactor {
                    name: "admin_endpoint".to_string(),
                    points: 10,
                    detail: "Response appears to be an admin panel".to_string(),
                });
            }
        }

        // Staleness: only ever seen in historical archives.
        if record.sources.len() == 1 && record.sources.contains("wayback") {
            score += self.config.weight_staleness;
            factors.push(RiskFactor {
                name: "stale".to_string(),
                points: self.config.weight_staleness,
                detail: "Only found in historical archives (potentially forgotten)".to_string(),
            });
        }

        let score = score.min(100);
        record.risk = Some(Risk {
            score,
            level: RiskLevel::from_score(score),
            factors,
            is_documented,
            is_ghost: !is_documented && score >= 40,
        });
        if record.probe.is_none() {
            record.probe = probe;
        }
        record
    }
}

fn level(record: &UrlRecord) -> Option<RiskLevel> {
    record.risk.as_ref().map(|risk| risk.level)
}
