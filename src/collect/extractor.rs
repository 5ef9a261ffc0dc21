use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

/// One extracted endpoint with the pattern that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointMatch {
    pub endpoint: String,
    pub pattern_name: &'static str,
    pub raw_match: String,
}

struct NamedPattern {
    name: &'static str,
    regex: Regex,
    /// Route-definition dialects capture bare paths (no leading slash,
    /// sometimes regex anchors) and get the route cleanup instead.
    route: bool,
}

macro_rules! pattern {
    ($name:literal, $re:literal) => {
        NamedPattern {
            name: $name,
            regex: Regex::new($re).unwrap(),
            route: false,
        }
    };
    ($name:literal, $re:literal, route) => {
        NamedPattern {
            name: $name,
            regex: Regex::new($re).unwrap(),
            route: true,
        }
    };
}

/// The extraction library. Quote classes include backticks so template
/// literals in bundled JS are caught.
static PATTERNS: Lazy<Vec<NamedPattern>> = Lazy::new(|| {
    vec![
        // REST API paths: /api/v1/users, /rest/orders, /v2/items
        pattern!(
            "rest_api_path",
            r#"(?i)['"`](/(?:api|rest|v\d+)/[a-zA-Z0-9/_\-{}:.]+)['"`]"#
        ),
        // Absolute URLs
        pattern!(
            "absolute_url",
            r#"(?i)(https?://[a-zA-Z0-9.\-]+(?::\d+)?/[a-zA-Z0-9/_\-?&=%.#{}:@]+)"#
        ),
        // Quoted relative paths
        pattern!(
            "relative_path",
            r#"['"`](/[a-zA-Z0-9/_\-{}:.]+(?:\?[a-zA-Z0-9_=&]+)?)['"`]"#
        ),
        // fetch('/api/data')
        pattern!("fetch_call", r#"(?i)fetch\s*\(\s*['"`]([^'"`\s]+)['"`]"#),
        // axios.get('/api/data')
        pattern!(
            "axios_call",
            r#"(?i)axios\.(?:get|post|put|patch|delete|head|options)\s*\(\s*['"`]([^'"`\s]+)['"`]"#
        ),
        // xhr.open('GET', '/api/data')
        pattern!(
            "xhr_call",
            r#"\.open\s*\(\s*['"`](?:GET|POST|PUT|PATCH|DELETE|HEAD|OPTIONS)['"`]\s*,\s*['"`]([^'"`\s]+)['"`]"#
        ),
        // $.ajax({url: ...}), $.get(...)
        pattern!(
            "jquery_ajax",
            r#"(?i)\$\.(?:ajax|get|post|getJSON)\s*\(\s*['"`]([^'"`\s]+)['"`]"#
        ),
        // path: '/users', route = '/api/data'
        pattern!(
            "route_definition",
            r#"(?i)(?:path|route|url|endpoint|uri)\s*[:=]\s*['"`](/[a-zA-Z0-9/_\-{}:.]+)['"`]"#
        ),
        // app.get('/api/data', ...)
        pattern!(
            "express_route",
            r#"(?i)(?:app|router)\.(?:get|post|put|patch|delete|all|use)\s*\(\s*['"`](/[^'"`\s]+)['"`]"#
        ),
        // Flask / FastAPI decorators
        pattern!(
            "python_route",
            r#"@(?:app|router|blueprint|bp)\.(?:route|get|post|put|patch|delete)\s*\(\s*['"]([^'"]+)['"]"#
        ),
        // Spring @GetMapping("/x"), @RequestMapping(value = "/x")
        pattern!(
            "spring_mapping",
            r#"@(?:Get|Post|Put|Patch|Delete|Request)Mapping\s*\(\s*(?:value\s*=\s*)?['"]([^'"]+)['"]"#
        ),
        // Django urlconf: path("x/", ...), re_path(r"^x/$", ...)
        pattern!(
            "django_route",
            r#"(?:path|re_path|url)\s*\(\s*r?['"]([^'"]+)['"]"#,
            route
        ),
        // Rails routes: get '/x', post "/x"
        pattern!(
            "rails_route",
            r#"(?:get|post|put|patch|delete|match)\s+['"](/[^'"]+)['"]"#,
            route
        ),
        // ASP.NET attribute routing
        pattern!("aspnet_route", r#"\[Route\(\s*"([^"]+)"\s*\)\]"#, route),
        // Go routers: mux.HandleFunc("/x", ...), r.GET("/x", ...)
        pattern!(
            "go_router",
            r#"(?:HandleFunc|Handle|GET|POST|PUT|PATCH|DELETE)\s*\(\s*"(/[^"]*)""#,
            route
        ),
        // GraphQL endpoints
        pattern!("graphql_endpoint", r#"(?i)['"`](/graphql[a-zA-Z0-9/_\-]*)['"`]"#),
        // WebSocket URLs
        pattern!(
            "websocket_url",
            r#"(?i)(wss?://[a-zA-Z0-9.\-]+(?::\d+)?/[a-zA-Z0-9/_\-?&=%.]+)"#
        ),
    ]
});

/// Static assets and common false positives.
const EXCLUDED_EXTENSIONS: [&str; 20] = [
    ".css", ".png", ".jpg", ".jpeg", ".gif", ".svg", ".ico", ".woff", ".woff2", ".ttf", ".eot",
    ".otf", ".map", ".mp3", ".mp4", ".webm", ".ogg", ".pdf", ".zip", ".gz",
];

const EXCLUDED_PREFIXES: [&str; 10] = [
    "/static/",
    "/assets/",
    "/images/",
    "/img/",
    "/css/",
    "/fonts/",
    "/media/",
    "/public/",
    "/#",
    "/node_modules/",
];

static TYPED_PARAM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<(?:int|string|float|path|uuid|slug):([A-Za-z_][A-Za-z0-9_]*)>").unwrap());
static SIMPLE_PARAM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<([A-Za-z_][A-Za-z0-9_]*)>").unwrap());
static COLON_PARAM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r":([A-Za-z_][A-Za-z0-9_]*)").unwrap());
static REGEX_GROUP: Lazy<Regex> = Lazy::new(|| Regex::new(r"\([^)]*\)").unwrap());

/// Rewrite framework path placeholders into a uniform `{name}` form:
/// `<int:id>` and `<id>` and `:id` become `{id}`; inline regex groups become
/// `{param}`.
pub fn normalize_placeholders(path: &str) -> String {
    let path = TYPED_PARAM.replace_all(path, "{$1}");
    let path = SIMPLE_PARAM.replace_all(&path, "{$1}");
    let path = COLON_PARAM.replace_all(&path, "{$1}");
    REGEX_GROUP.replace_all(&path, "{param}").into_owned()
}

/// Trim an extracted match down to a usable endpoint; empty result means the
/// match should be discarded.
pub fn clean_endpoint(raw: &str) -> String {
    let endpoint = normalize_placeholders(raw.trim());
    let endpoint = endpoint.trim_end_matches('/');
    let endpoint = endpoint.trim_end_matches(|c| ".,;:!?)'\"".contains(c));
    if endpoint.len() < 2 {
        return String::new();
    }
    endpoint.to_string()
}

/// Route definitions come without a leading slash and with regex anchors in
/// some dialects; strip the anchors, add the slash, then apply the shared
/// cleanup.
pub fn clean_route(raw: &str) -> Option<String> {
    let trimmed = raw.trim().trim_start_matches('^').trim_end_matches('$');
    if trimmed.is_empty() {
        return None;
    }
    let with_slash = if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    };
    let cleaned = clean_endpoint(&with_slash);
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

/// Extract API endpoints and paths from arbitrary text content using the
/// pattern library.
#[derive(Default)]
pub struct EndpointExtractor;

impl EndpointExtractor {
    pub fn new() -> Self {
        Self
    }

    /// All unique endpoints in `text`. Absolute URLs whose host does not
    /// match `base_domain` are dropped; relative paths always pass.
    pub fn extract(&self, text: &str, base_domain: &str) -> Vec<EndpointMatch> {
        let mut found = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        for pattern in PATTERNS.iter() {
            for captures in pattern.regex.captures_iter(text) {
                let raw = match captures.get(1) {
                    Some(group) => group.as_str(),
                    None => continue,
                };
                let endpoint = if pattern.route {
                    clean_route(raw).unwrap_or_default()
                } else {
                    clean_endpoint(raw)
                };
                if endpoint.is_empty() || seen.contains(&endpoint) {
                    continue;
                }
                if should_exclude(&endpoint) {
                    continue;
                }
                if !base_domain.is_empty() && !matches_domain(&endpoint, base_domain) {
                    continue;
                }

                seen.insert(endpoint.clone());
                found.push(EndpointMatch {
                    endpoint,
                    pattern_name: pattern.name,
                    raw_match: raw.to_string(),
                });
            }
        }

        tracing::debug!(
            count = found.len(),
            text_len = text.len(),
            "extracted endpoints from text"
        );
        found
    }

    /// Just the endpoint strings, sorted.
    pub fn extract_endpoints_only(&self, text: &str, base_domain: &str) -> Vec<String> {
        let mut endpoints: Vec<String> = self
            .extract(text, base_domain)
            .into_iter()
            .map(|m| m.endpoint)
            .collect();
        endpoints.sort();
        endpoints
    }
}

fn should_exclude(endpoint: &str) -> bool {
    let lower = endpoint.to_ascii_lowercase();

    for ext in EXCLUDED_EXTENSIONS {
        if lower.ends_with(ext) {
            return true;
        }
    }

    let path = if endpoint.contains("://") {
        Url::parse(endpoint)
            .map(|u| u.path().to_ascii_lowercase())
            .unwrap_or(lower.clone())
    } else {
        lower.clone()
    };
    EXCLUDED_PREFIXES.iter().any(|prefix| path.starts_with(prefix))
}

fn matches_domain(endpoint: &str, base_domain: &str) -> bool {
    let lower = endpoint.to_ascii_lowercase();
    let absolute = ["http://", "https://", "ws://", "wss://"]
        .iter()
        .any(|scheme| lower.starts_with(scheme));
    if !absolute {
        return true;
    }
    match Url::parse(endpoint) {
        Ok(parsed) => parsed
            .host_str()
            .map(|host| host.ends_with(base_domain))
            .unwrap_or(false),
        Err(_) => false,
    }
}
