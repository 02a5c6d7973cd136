//! Run configuration: the optional YAML file, merged with CLI flags into one
//! validated [`Settings`] value.
//!
//! # File Format
//!
//! ```yaml
//! threads: 4
//! timeout: 45
//! retries: 5
//! subdomains: false
//! parameters: false
//! providers: [wayback, commoncrawl, otx, urlscan]
//! blacklist: [ttf, woff, svg, png]
//! blacklist_paths: [/wp-content/]
//! json: false
//! filters:
//!   from: "202001"
//!   matchstatuscodes: ["200"]
//! urlscan:
//!   apikey: ...
//! ```

use crate::cli::Cli;
use crate::error::ConfigError;
use crate::http::{RetryPolicy, RequestExecutor, build_client};
use crate::output::{Format, UrlFilter};
use crate::providers::{Endpoints, Filters, ProviderConfig, ProviderKind};
use chrono::NaiveDate;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use url::Url;

const DEFAULT_THREADS: usize = 1;
const DEFAULT_TIMEOUT_SECS: u64 = 45;
const DEFAULT_RETRIES: u32 = 5;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct UrlScanFileConfig {
    pub host: Option<String>,
    pub apikey: Option<String>,
}

/// Contents of the YAML config file. Every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub threads: Option<usize>,
    pub timeout: Option<u64>,
    pub retries: Option<u32>,
    pub proxy: Option<String>,
    pub subdomains: bool,
    pub parameters: bool,
    pub providers: Vec<String>,
    pub blacklist: Vec<String>,
    pub blacklist_paths: Vec<String>,
    pub json: bool,
    pub insecure: bool,
    pub filters: Filters,
    pub urlscan: UrlScanFileConfig,
    /// OTX base URL override.
    pub otx: Option<String>,
    /// Wayback base URL override.
    pub wayback: Option<String>,
    /// Common Crawl `collinfo.json` URL override.
    pub commoncrawl: Option<String>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let display = path.display().to_string();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: display.clone(),
            source,
        })?;
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&text).map_err(|source| ConfigError::Yaml {
            path: display,
            source,
        })
    }
}

/// `$HOME/.allurls.yaml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".allurls.yaml"))
}

/// Read the config file.
///
/// An explicit path must exist. Without one, the default path is used if
/// present, and built-in defaults otherwise.
#[instrument(level = "debug")]
pub fn read_config(explicit: Option<&Path>) -> Result<FileConfig, ConfigError> {
    if let Some(path) = explicit {
        return FileConfig::load(path);
    }
    match default_config_path() {
        Some(path) if path.exists() => {
            info!(path = %path.display(), "loading config file");
            FileConfig::load(&path)
        }
        Some(path) => {
            warn!(path = %path.display(), "config file not found, using default config");
            Ok(FileConfig::default())
        }
        None => Ok(FileConfig::default()),
    }
}

/// Fully resolved, validated settings for one run.
#[derive(Debug, Clone)]
pub struct Settings {
    pub threads: usize,
    pub timeout: Duration,
    pub retries: u32,
    pub proxy: Option<String>,
    pub insecure: bool,
    pub include_subdomains: bool,
    pub remove_parameters: bool,
    pub providers: Vec<ProviderKind>,
    pub blacklist: Vec<String>,
    pub blacklist_paths: Vec<String>,
    pub output: Option<PathBuf>,
    pub format: Format,
    pub filters: Filters,
    pub endpoints: Endpoints,
    pub urlscan_api_key: Option<String>,
    pub deadline: Option<Duration>,
}

fn non_empty_or(cli: &[String], file: Vec<String>) -> Vec<String> {
    if cli.is_empty() { file } else { cli.to_vec() }
}

impl Settings {
    /// Merge CLI flags over the file config and validate the result.
    pub fn resolve(cli: &Cli, file: FileConfig) -> Result<Self, ConfigError> {
        let provider_names = non_empty_or(&cli.providers, file.providers);
        let providers = if provider_names.is_empty() {
            ProviderKind::ALL.to_vec()
        } else {
            provider_names
                .iter()
                .filter(|name| !name.trim().is_empty())
                .map(|name| name.parse::<ProviderKind>().map_err(ConfigError::Invalid))
                .collect::<Result<Vec<_>, _>>()?
        };

        let file_filters = file.filters;
        let filters = Filters {
            from: cli.from.clone().or(file_filters.from),
            to: cli.to.clone().or(file_filters.to),
            match_status_codes: non_empty_or(&cli.match_status_codes, file_filters.match_status_codes),
            match_mime_types: non_empty_or(&cli.match_mime_types, file_filters.match_mime_types),
            filter_status_codes: non_empty_or(&cli.filter_status_codes, file_filters.filter_status_codes),
            filter_mime_types: non_empty_or(&cli.filter_mime_types, file_filters.filter_mime_types),
        };

        let defaults = Endpoints::default();
        let endpoints = Endpoints {
            wayback: file.wayback.unwrap_or(defaults.wayback),
            commoncrawl_index: file.commoncrawl.unwrap_or(defaults.commoncrawl_index),
            otx: file.otx.unwrap_or(defaults.otx),
            urlscan: file.urlscan.host.unwrap_or(defaults.urlscan),
        };

        let settings = Self {
            threads: cli.threads.or(file.threads).unwrap_or(DEFAULT_THREADS),
            timeout: Duration::from_secs(cli.timeout.or(file.timeout).unwrap_or(DEFAULT_TIMEOUT_SECS)),
            retries: cli.retries.or(file.retries).unwrap_or(DEFAULT_RETRIES),
            proxy: cli.proxy.clone().or(file.proxy).filter(|p| !p.trim().is_empty()),
            insecure: cli.insecure || file.insecure,
            include_subdomains: cli.subs || file.subdomains,
            remove_parameters: cli.fp || file.parameters,
            providers,
            blacklist: non_empty_or(&cli.blacklist, file.blacklist),
            blacklist_paths: non_empty_or(&cli.blacklist_paths, file.blacklist_paths),
            output: cli.output.clone(),
            format: if cli.json || file.json { Format::Json } else { Format::Plain },
            filters,
            endpoints,
            urlscan_api_key: cli
                .urlscan_api_key
                .clone()
                .or(file.urlscan.apikey)
                .filter(|k| !k.is_empty()),
            deadline: cli.deadline.map(Duration::from_secs),
        };
        settings.validate()?;
        debug!(?settings.providers, threads = settings.threads, "resolved settings");
        Ok(settings)
    }

    /// Check every field, returning the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.threads == 0 {
            return Err(ConfigError::Invalid("threads must be greater than 0".into()));
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::Invalid("timeout must be greater than 0".into()));
        }
        if self.providers.is_empty() {
            return Err(ConfigError::Invalid("at least one provider must be enabled".into()));
        }
        if self.deadline.is_some_and(|d| d.is_zero()) {
            return Err(ConfigError::Invalid("deadline must be greater than 0".into()));
        }
        for (field, value) in [("from", &self.filters.from), ("to", &self.filters.to)] {
            if let Some(value) = value {
                if !is_year_month(value) {
                    return Err(ConfigError::Invalid(format!(
                        "{field} must be in YYYYMM format, got {value:?}"
                    )));
                }
            }
        }
        if let Some(proxy) = &self.proxy {
            let parsed = Url::parse(proxy)
                .map_err(|e| ConfigError::Invalid(format!("proxy url: {e}")))?;
            if !matches!(parsed.scheme(), "http" | "https" | "socks5" | "socks5h") {
                return Err(ConfigError::Invalid(format!(
                    "unsupported proxy scheme: {}",
                    parsed.scheme()
                )));
            }
        }
        Ok(())
    }

    /// Build the shared, read-only provider configuration.
    pub fn provider_config(&self) -> Result<ProviderConfig, ConfigError> {
        let client = build_client(self.proxy.as_deref(), self.insecure)
            .map_err(|e| ConfigError::Invalid(format!("failed to build HTTP client: {e}")))?;
        Ok(ProviderConfig {
            executor: RequestExecutor::new(client, RetryPolicy::new(self.retries), self.timeout),
            include_subdomains: self.include_subdomains,
            filters: self.filters.clone(),
            endpoints: self.endpoints.clone(),
            urlscan_api_key: self.urlscan_api_key.clone(),
        })
    }

    pub fn url_filter(&self) -> UrlFilter {
        UrlFilter::new(&self.blacklist, &self.blacklist_paths, self.remove_parameters)
    }
}

fn is_year_month(value: &str) -> bool {
    value.len() == 6
        && value.bytes().all(|b| b.is_ascii_digit())
        && NaiveDate::parse_from_str(&format!("{value}01"), "%Y%m%d").is_ok()
}
