use clap::Parser;

#[derive(clap::Parser, Debug)]
#[command(
    author,
    version,
    about = "ghostmap - Discover undocumented API endpoints before attackers do",
    long_about = None,
    after_help = "EXAMPLES:
  Collect historical endpoints:
    ghostmap collect --domain example.com --output footprint.json

  Redact a footprint before sharing:
    ghostmap sanitize --input footprint.json --strict

  Full audit with live probing and fuzzing:
    ghostmap audit --input footprint.json --swagger openapi.yaml \\
        --base-url https://example.com --probe --fuzz"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose debug logging
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Path to a YAML/JSON config file
    #[arg(long, short = 'c', global = true)]
    pub config: Option<String>,
}

#[derive(clap::Subcommand, Debug)]
pub enum Commands {
    #[command(about = "Harvest candidate URLs from web archives and JavaScript")]
    Collect {
        /// Target domain (e.g. example.com)
        #[arg(long, short = 'd')]
        domain: String,

        /// Output file [default: <domain>_footprint.json]
        #[arg(long, short = 'o')]
        output: Option<String>,

        /// Cap on archive results per source
        #[arg(long)]
        limit: Option<usize>,

        /// Skip JavaScript download and analysis
        #[arg(long)]
        skip_js: bool,

        /// Skip the CommonCrawl index
        #[arg(long)]
        skip_commoncrawl: bool,

        /// Requests per second against each host
        #[arg(long, short = 'r')]
        rate_limit: Option<f64>,

        /// Extra header to send on every request (K:V, repeatable)
        #[arg(long = "header", value_name = "K:V")]
        headers: Vec<String>,
    },

    #[command(about = "Redact sensitive data from a collected footprint")]
    Sanitize {
        /// Input footprint file
        #[arg(long, short = 'i')]
        input: String,

        /// Output file [default: <input>_sanitized.json]
        #[arg(long, short = 'o')]
        output: Option<String>,

        /// Also blank every query value and redact private IPs
        #[arg(long)]
        strict: bool,
    },

    #[command(about = "Compare against documentation, probe, fuzz, and score risk")]
    Audit {
        /// Input footprint file
        #[arg(long, short = 'i')]
        input: String,

        /// Output file [default: <input>_audited.json]
        #[arg(long, short = 'o')]
        output: Option<String>,

        /// OpenAPI/Swagger spec (JSON or YAML) for the documented set
        #[arg(long)]
        swagger: Option<String>,

        /// Source tree to mine for route definitions
        #[arg(long)]
        git_repo: Option<String>,

        /// Actively probe endpoints for liveness
        #[arg(long)]
        probe: bool,

        /// Origin to probe against [default: https://<domain>]
        #[arg(long)]
        base_url: Option<String>,

        /// Fuzz for hidden paths with technology wordlists
        #[arg(long)]
        fuzz: bool,

        /// Wordlist selection: auto (detect stack) or all
        #[arg(long, default_value = "auto")]
        fuzz_mode: String,

        /// Audit every record, bypassing the noise filter
        #[arg(long)]
        scan_all: bool,
    },
}

pub fn parse_cli() -> Cli {
    Cli::parse()
}
