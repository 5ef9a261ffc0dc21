use std::collections::BTreeSet;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use walkdir::WalkDir;

use crate::collect::extractor::clean_route;

/// Directories that only ever contain dependencies or build output.
const SKIP_DIRS: [&str; 12] = [
    ".git",
    "node_modules",
    "vendor",
    "dist",
    "build",
    "target",
    "__pycache__",
    ".venv",
    "venv",
    ".idea",
    ".vscode",
    ".tox",
];

/// Only files with these extensions are opened.
const SOURCE_EXTENSIONS: [&str; 13] = [
    "py", "js", "ts", "jsx", "tsx", "java", "kt", "rb", "go", "php", "cs", "scala", "rs",
];

struct FrameworkPattern {
    name: &'static str,
    regex: Regex,
}

static FRAMEWORK_PATTERNS: Lazy<Vec<FrameworkPattern>> = Lazy::new(|| {
    let table: [(&'static str, &'static str); 8] = [
        // Flask / FastAPI decorators: @app.route("/x"), @router.get("/x")
        (
            "flask_fastapi",
            r#"@(?:app|router|blueprint|bp)\.(?:route|get|post|put|patch|delete)\s*\(\s*['"]([^'"]+)['"]"#,
        ),
        // Django urlconf: path("x/", ...), re_path(r"^x/$", ...)
        (
            "django",
            r#"(?:path|re_path|url)\s*\(\s*r?['"]([^'"]+)['"]"#,
        ),
        // Express: app.get('/x', ...), router.use('/x', ...)
        (
            "express",
            r#"(?:app|router)\.(?:get|post|put|patch|delete|all|use)\s*\(\s*['"](/[^'"]*)['"]"#,
        ),
        // Spring annotations
        (
            "spring",
            r#"@(?:Get|Post|Put|Patch|Delete|Request)Mapping\s*\(\s*(?:value\s*=\s*)?['"]([^'"]+)['"]"#,
        ),
        // Rails routes.rb: get '/x', post "/x"
        (
            "rails",
            r#"(?:get|post|put|patch|delete|match)\s+['"](/[^'"]+)['"]"#,
        ),
        // ASP.NET attribute routing
        ("aspnet_route", r#"\[Route\(\s*"([^"]+)"\s*\)\]"#),
        (
            "aspnet_http",
            r#"\[Http(?:Get|Post|Put|Patch|Delete)\(\s*"([^"]+)"\s*\)\]"#,
        ),
        // Go routers: mux.HandleFunc("/x", ...), r.GET("/x", ...)
        (
            "go_router",
            r#"(?:HandleFunc|Handle|GET|POST|PUT|PATCH|DELETE)\s*\(\s*"(/[^"]*)""#,
        ),
    ];
    table
        .into_iter()
        .map(|(name, pattern)| FrameworkPattern {
            name,
            regex: Regex::new(pattern).unwrap(),
        })
        .collect()
});

/// Mines route definitions out of a source tree across framework dialects.
/// Per-file read errors skip the file; the walk continues.
#[derive(Default)]
pub struct RouteMiner;

impl RouteMiner {
    pub fn new() -> Self {
        Self
    }

    pub fn mine(&self, root: &Path) -> BTreeSet<String> {
        let mut endpoints = BTreeSet::new();
        let mut files_scanned = 0usize;

        let walker = WalkDir::new(root).into_iter().filter_entry(|entry| {
            let name = entry.file_name().to_string_lossy();
            !(entry.file_type().is_dir() && SKIP_DIRS.contains(&name.as_ref()))
        });

        for entry in walker.filter_map(Result::ok) {
            if !entry.file_type().is_file() {
                continue;
            }
            let ext = entry
                .path()
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or("");
            if !SOURCE_EXTENSIONS.contains(&ext) {
                continue;
            }

            let content = match std::fs::read_to_string(entry.path()) {
                Ok(content) => content,
                Err(err) => {
                    tracing::debug!(path = %entry.path().display(), error = %err, "skipping unreadable file");
                    continue;
                }
            };
            files_scanned += 1;

            for pattern in FRAMEWORK_PATTERNS.iter() {
                for captures in pattern.regex.captures_iter(&content) {
                    let Some(group) = captures.get(1) else {
                        continue;
                    };
                    if let Some(endpoint) = clean_route(group.as_str()) {
                        tracing::debug!(
                            endpoint = %endpoint,
                            dialect = pattern.name,
                            file = %entry.path().display(),
                            "route definition found"
                        );
                        endpoints.insert(endpoint);
                    }
                }
            }
        }

        tracing::info!(
            files = files_scanned,
            routes = endpoints.len(),
            root = %root.display(),
            "source-tree route mining complete"
        );
        endpoints
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, rel: &str, content: &str) {
        let path = dir.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn mines_across_framework_dialects() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "app.py",
            "@app.route('/api/users')\ndef users(): pass\n@app.get(\"/api/items/<int:item_id>\")\n",
        );
        write(
            dir.path(),
            "routes.js",
            "app.get('/api/orders', handler);\nrouter.post('/api/orders/:id/cancel', h);\n",
        );
        write(
            dir.path(),
            "Controller.java",
            "@GetMapping(\"/api/products\")\npublic List<Product> all() {}\n",
        );
        write(dir.path(), "main.go", "mux.HandleFunc(\"/healthz\", health)\n");

        let routes = RouteMiner::new().mine(dir.path());
        assert!(routes.contains("/api/users"));
        assert!(routes.contains("/api/items/{item_id}"));
        assert!(routes.contains("/api/orders"));
        assert!(routes.contains("/api/orders/{id}/cancel"));
        assert!(routes.contains("/api/products"));
        assert!(routes.contains("/healthz"));
    }

    #[test]
    fn skips_dependency_directories() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "node_modules/lib/index.js",
            "app.get('/should/not/appear', h);\n",
        );
        write(dir.path(), "src/index.js", "app.get('/real/route', h);\n");

        let routes = RouteMiner::new().mine(dir.path());
        assert!(routes.contains("/real/route"));
        assert!(!routes.iter().any(|r| r.contains("should")));
    }

    #[test]
    fn ignores_non_source_files() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "README.md", "app.get('/docs/only', h);\n");
        let routes = RouteMiner::new().mine(dir.path());
        assert!(routes.is_empty());
    }

    #[test]
    fn empty_tree_yields_no_routes() {
        let dir = tempfile::tempdir().unwrap();
        assert!(RouteMiner::new().mine(dir.path()).is_empty());
    }
}
