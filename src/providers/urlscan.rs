//! urlscan.io search provider.
//!
//! Searches `domain:<target>` and pages with the `search_after` cursor built
//! from the `sort` values of the last hit on each page. The search matches
//! loosely, so hits are kept only when their page domain is the target (or
//! a subdomain of it when `include_subdomains` is set).
//!
//! urlscan signals throttling either with HTTP 429 or with `"status": 429`
//! in the body; both end the fetch without an error.

use super::{Provider, ProviderConfig, decode, fetch_page, send_url};
use crate::error::ProviderError;
use crate::models::UrlRecord;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc::Sender;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use url::form_urlencoded;

pub const NAME: &str = "urlscan";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    status: Option<u64>,
    #[serde(default)]
    results: Vec<SearchHit>,
    #[serde(default)]
    has_more: bool,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    #[serde(default)]
    page: ArchivedPage,
    #[serde(default)]
    sort: Vec<Value>,
}

#[derive(Debug, Default, Deserialize)]
struct ArchivedPage {
    #[serde(default)]
    domain: String,
    #[serde(default)]
    url: String,
}

/// Join the string and numeric sort keys into a `search_after` cursor.
fn search_after(sort: &[Value]) -> String {
    sort.iter()
        .filter_map(|v| match v {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join(",")
}

#[derive(Debug)]
pub struct UrlScan {
    config: Arc<ProviderConfig>,
}

impl UrlScan {
    pub fn new(config: Arc<ProviderConfig>) -> Self {
        Self { config }
    }

    fn format_url(&self, domain: &str, after: Option<&str>) -> String {
        let mut url = format!(
            "{}/api/v1/search/?q=domain:{domain}&size=100",
            self.config.endpoints.urlscan.trim_end_matches('/'),
        );
        if let Some(after) = after {
            url.push_str("&search_after=");
            url.extend(form_urlencoded::byte_serialize(after.as_bytes()));
        }
        url
    }

    fn in_scope(&self, page_domain: &str, domain: &str) -> bool {
        if page_domain.eq_ignore_ascii_case(domain) {
            return true;
        }
        self.config.include_subdomains
            && page_domain
                .to_ascii_lowercase()
                .ends_with(&format!(".{}", domain.to_ascii_lowercase()))
    }
}

impl Provider for UrlScan {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn fetch(
        &self,
        cancel: &CancellationToken,
        domain: &str,
        results: &Sender<UrlRecord>,
    ) -> Result<(), ProviderError> {
        let headers: Vec<(&str, &str)> = self
            .config
            .urlscan_api_key
            .as_deref()
            .filter(|key| !key.is_empty())
            .map(|key| vec![("API-Key", key)])
            .unwrap_or_default();

        let mut cursor: Option<String> = None;
        for page in 0u64.. {
            if cancel.is_cancelled() {
                return Ok(());
            }
            info!(provider = NAME, page, %domain, "fetching");

            let url = self.format_url(domain, cursor.as_deref());
            let Some(body) = fetch_page(&self.config, cancel, NAME, page, &url, &headers).await? else {
                return Ok(());
            };
            let response: SearchResponse = decode(NAME, page, &body)?;
            if response.status == Some(429) {
                warn!(provider = NAME, "urlscan responded with 429, probably being rate limited");
                return Ok(());
            }

            let next = response.results.last().map(|hit| search_after(&hit.sort));
            for hit in response.results {
                if !self.in_scope(&hit.page.domain, domain) || hit.page.url.is_empty() {
                    continue;
                }
                if !send_url(cancel, results, hit.page.url, NAME).await {
                    return Ok(());
                }
            }

            if !response.has_more {
                return Ok(());
            }
            match next {
                Some(after) if !after.is_empty() => cursor = Some(after),
                _ => return Ok(()),
            }
        }
        Ok(())
    }
}
