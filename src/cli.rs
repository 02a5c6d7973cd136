//! Command-line interface definitions for allurls.
//!
//! Every option can also be set in the YAML config file; a flag given on the
//! command line wins over the file.

use clap::Parser;
use std::path::PathBuf;

/// Fetch known URLs from the Wayback Machine, Common Crawl, AlienVault OTX
/// and urlscan.io for one or more domains.
///
/// # Examples
///
/// ```sh
/// # Single domain, plain output
/// allurls example.com
///
/// # Domains from stdin, 4 workers, subdomains included, JSON to a file
/// cat domains.txt | allurls --threads 4 --subs --json -o urls.jsonl
///
/// # Skip images and collapse query-string variants
/// allurls --blacklist png,jpg,gif,svg --fp example.com
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Domains to fetch URLs for (read line by line from stdin when omitted)
    pub domains: Vec<String>,

    /// File to append results to (stdout when omitted)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Location of the config file (default $HOME/.allurls.yaml)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Number of workers to spawn
    #[arg(long)]
    pub threads: Option<usize>,

    /// Timeout (in seconds) for each HTTP request
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Retries for each HTTP request
    #[arg(long)]
    pub retries: Option<u32>,

    /// HTTP or SOCKS5 proxy to use (e.g. socks5://127.0.0.1:9050)
    #[arg(long)]
    pub proxy: Option<String>,

    /// Comma-separated list of extensions to skip
    #[arg(long, value_delimiter = ',')]
    pub blacklist: Vec<String>,

    /// Comma-separated list of path fragments to skip
    #[arg(long = "blacklist-path", value_delimiter = ',')]
    pub blacklist_paths: Vec<String>,

    /// Comma-separated list of providers to use (wayback,commoncrawl,otx,urlscan)
    #[arg(long, value_delimiter = ',')]
    pub providers: Vec<String>,

    /// Include subdomains of the target domain
    #[arg(long)]
    pub subs: bool,

    /// Remove different parameters of the same endpoint
    #[arg(long)]
    pub fp: bool,

    /// Output one JSON object per line
    #[arg(long)]
    pub json: bool,

    /// Accept invalid TLS certificates
    #[arg(long)]
    pub insecure: bool,

    /// Show progress logs on stderr
    #[arg(short, long)]
    pub verbose: bool,

    /// Stop fetching after this many seconds, keeping what was found
    #[arg(long)]
    pub deadline: Option<u64>,

    /// Comma-separated list of status codes to match
    #[arg(long = "mc", value_delimiter = ',')]
    pub match_status_codes: Vec<String>,

    /// Comma-separated list of status codes to filter out
    #[arg(long = "fc", value_delimiter = ',')]
    pub filter_status_codes: Vec<String>,

    /// Comma-separated list of mime-types to match
    #[arg(long = "mt", value_delimiter = ',')]
    pub match_mime_types: Vec<String>,

    /// Comma-separated list of mime-types to filter out
    #[arg(long = "ft", value_delimiter = ',')]
    pub filter_mime_types: Vec<String>,

    /// Fetch URLs captured from this month on (format: YYYYMM)
    #[arg(long)]
    pub from: Option<String>,

    /// Fetch URLs captured up to this month (format: YYYYMM)
    #[arg(long)]
    pub to: Option<String>,

    /// urlscan.io API key
    #[arg(long, env = "URLSCAN_API_KEY", hide_env_values = true)]
    pub urlscan_api_key: Option<String>,
}
