use std::collections::BTreeMap;

use once_cell::sync::Lazy;

/// Payloads worth trying against any stack, cloud/devops artifacts included.
const COMMON: &[&str] = &[
    ".env",
    "robots.txt",
    "sitemap.xml",
    ".git/HEAD",
    ".vscode/settings.json",
    "backup.zip",
    "backup.sql",
    "dump.sql",
    "admin/",
    "administrator/",
    "login/",
    "dashboard/",
    "api/",
    "api/v1/",
    "graphql",
    "swagger.json",
    "openapi.json",
    ".DS_Store",
    "server-status",
    "elmah.axd",
    "web.config",
    "manifest.json",
    ".aws/credentials",
    ".aws/config",
    ".env.local",
    ".env.dev",
    ".env.prod",
    "docker-compose.yml",
    "Dockerfile",
    ".gitlab-ci.yml",
    ".circleci/config.yml",
    ".travis.yml",
    "jenkins/",
    "kube-system/",
    "config/k8s.yml",
];

const SPRING: &[&str] = &[
    "actuator",
    "actuator/health",
    "actuator/info",
    "actuator/env",
    "actuator/heapdump",
    "actuator/mappings",
    "actuator/metrics",
    "actuator/beans",
    "actuator/configprops",
    "h2-console",
];

const DJANGO: &[&str] = &["admin/", "admin/login/", "static/admin/", "__debug__/"];

const RAILS: &[&str] = &["rails/info/properties", "rails/info/routes", "rails/info"];

const PHP: &[&str] = &[
    "phpinfo.php",
    "info.php",
    "config.php",
    "wp-admin/",
    "wp-login.php",
    "composer.json",
    "composer.lock",
];

const NODE: &[&str] = &["package.json", "package-lock.json", "node_modules/"];

const LIFERAY: &[&str] = &[
    "api/jsonws",
    "api/jsonws/invoke",
    "c/portal/login",
    "web/guest/home",
    "group/control_panel",
    "image/image_gallery",
];

const WORDPRESS: &[&str] = &[
    "wp-admin/",
    "wp-login.php",
    "wp-config.php",
    "wp-config.php.bak",
    "wp-includes/",
    "xmlrpc.php",
];

const TOMCAT: &[&str] = &[
    "manager/html",
    "manager/status",
    "host-manager/html",
    "examples/servlets/",
];

const JBOSS: &[&str] = &["jmx-console/", "web-console/", "invoker/JMXInvokerServlet"];

const DRUPAL: &[&str] = &["user/login", "CHANGELOG.txt", "sites/default/settings.php"];

/// Technology tag to payload list. `common` is the floor every fuzz run
/// includes.
pub static WORDLISTS: Lazy<BTreeMap<&'static str, &'static [&'static str]>> = Lazy::new(|| {
    BTreeMap::from([
        ("common", COMMON),
        ("spring", SPRING),
        ("django", DJANGO),
        ("rails", RAILS),
        ("php", PHP),
        ("node", NODE),
        ("liferay", LIFERAY),
        ("wordpress", WORDPRESS),
        ("tomcat", TOMCAT),
        ("jboss", JBOSS),
        ("drupal", DRUPAL),
    ])
});

/// Union the lists for the given tags; unknown tags contribute nothing.
/// Result is deduplicated and sorted.
pub fn payloads_for_tags(tags: &[String]) -> Vec<String> {
    let mut payloads: Vec<String> = tags
        .iter()
        .filter_map(|tag| WORDLISTS.get(tag.as_str()))
        .flat_map(|list| list.iter().map(|payload| payload.to_string()))
        .collect();
    payloads.sort();
    payloads.dedup();
    payloads
}

/// Every payload from every list, deduplicated and sorted.
pub fn all_payloads() -> Vec<String> {
    let mut payloads: Vec<String> = WORDLISTS
        .values()
        .flat_map(|list| list.iter().map(|payload| payload.to_string()))
        .collect();
    payloads.sort();
    payloads.dedup();
    payloads
}
