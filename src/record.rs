use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Source tags attached to records by the producers.
pub const SOURCE_WAYBACK: &str = "wayback";
pub const SOURCE_COMMONCRAWL: &str = "commoncrawl";
pub const SOURCE_JS_ANALYSIS: &str = "js_analysis";
pub const SOURCE_GHOST_FUZZER: &str = "ghost_fuzzer";
pub const SOURCE_GIT_MINER: &str = "git_miner";

/// A raw discovery before deduplication. Producers fill in whatever they know;
/// empty strings mean "not observed".
#[derive(Debug, Clone, Default)]
pub struct CandidateUrl {
    pub url: String,
    pub source: String,
    pub timestamp: String,
    pub status_code: String,
    pub mime_type: String,
    pub pattern_name: String,
    pub source_file: String,
}

impl CandidateUrl {
    pub fn new(url: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            source: source.into(),
            ..Default::default()
        }
    }
}

/// The pipeline's unit of data: one deduplicated endpoint with everything the
/// stages have learned about it. Set-valued fields are BTreeSets so the
/// serialized document is deterministic.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UrlRecord {
    pub raw_url: String,
    pub canonical_key: String,
    pub sources: BTreeSet<String>,
    pub first_seen: String,
    pub last_seen: String,
    pub occurrence_count: u64,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub observed_status_codes: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub observed_mime_types: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub pattern_names: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub source_files: BTreeSet<String>,
    /// Pre-cleanup URL kept for audit when the noise filter strips tracking params.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probe: Option<ProbeOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk: Option<Risk>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub warnings: BTreeSet<String>,
}

/// Result of actively probing one endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProbeOutcome {
    pub status_code: u16,
    #[serde(default)]
    pub content_type: String,
    #[serde(default)]
    pub response_size: u64,
    #[serde(default)]
    pub has_auth: bool,
    #[serde(default)]
    pub is_debug: bool,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub is_soft_404: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskLevel {
    #[serde(rename = "HIGH")]
    High,
    #[serde(rename = "MEDIUM")]
    Medium,
    #[serde(rename = "LOW")]
    Low,
}

impl RiskLevel {
    /// HIGH at 70+, MEDIUM at 40..70, LOW below.
    pub fn from_score(score: u32) -> Self {
        if score >= 70 {
            RiskLevel::High
        } else if score >= 40 {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskFactor {
    pub name: String,
    pub points: u32,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Risk {
    pub score: u32,
    pub level: RiskLevel,
    pub factors: Vec<RiskFactor>,
    pub is_documented: bool,
    pub is_ghost: bool,
}

/// Top-level persisted document: `{meta, summary, endpoints}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanDocument {
    pub meta: Meta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<Summary>,
    #[serde(default)]
    pub endpoints: Vec<UrlRecord>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Meta {
    pub tool: String,
    pub version: String,
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub swagger_spec: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_repo: Option<String>,
    #[serde(default)]
    pub probing_enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sanitized: Option<bool>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub stats: Value,
}

impl Meta {
    pub fn new() -> Self {
        Self {
            tool: "ghostmap".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            stats: Value::Null,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Summary {
    pub total_endpoints: usize,
    pub high_risk: usize,
    pub medium_risk: usize,
    pub low_risk: usize,
    pub documented: usize,
}

impl Summary {
    pub fn from_records(records: &[UrlRecord]) -> Self {
        let mut summary = Summary {
            total_endpoints: records.len(),
            ..Default::default()
        };
        for record in records {
            if let Some(risk) = &record.risk {
                match risk.level {
                    RiskLevel::High => summary.high_risk += 1,
                    RiskLevel::Medium => summary.medium_risk += 1,
                    RiskLevel::Low => summary.low_risk += 1,
                }
                if risk.is_documented {
                    summary.documented += 1;
                }
            }
        }
        summary
    }
}
