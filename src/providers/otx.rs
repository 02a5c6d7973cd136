//! AlienVault OTX provider.
//!
//! OTX exposes two URL-list endpoints: one scoped to a registrable domain
//! (which includes every subdomain) and one scoped to a single hostname.
//! Which one is used depends on the input and on `include_subdomains`:
//!
//! | input | include_subdomains | endpoint |
//! |-------|--------------------|----------|
//! | `example.com` | any | `domain/example.com` |
//! | `www.example.com` | yes | `domain/example.com` |
//! | `www.example.com` | no | `hostname/www.example.com` |

use super::domain::{apex_domain, has_subdomain};
use super::{Provider, ProviderConfig, decode, fetch_page, send_url};
use crate::error::ProviderError;
use crate::models::UrlRecord;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc::Sender;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub const NAME: &str = "otx";

#[derive(Debug, Deserialize)]
struct UrlListPage {
    #[serde(default)]
    has_next: bool,
    #[serde(default)]
    url_list: Vec<UrlListEntry>,
}

#[derive(Debug, Deserialize)]
struct UrlListEntry {
    #[serde(default)]
    url: String,
}

#[derive(Debug)]
pub struct Otx {
    config: Arc<ProviderConfig>,
}

impl Otx {
    pub fn new(config: Arc<ProviderConfig>) -> Self {
        Self { config }
    }

    fn format_url(&self, domain: &str, page: u64) -> String {
        let (scope, target) = if !has_subdomain(domain) {
            ("domain", domain.to_string())
        } else if self.config.include_subdomains {
            ("domain", apex_domain(domain))
        } else {
            ("hostname", domain.to_string())
        };
        format!(
            "{}/api/v1/indicators/{scope}/{target}/url_list?limit=100&page={page}",
            self.config.endpoints.otx.trim_end_matches('/'),
        )
    }
}

impl Provider for Otx {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn fetch(
        &self,
        cancel: &CancellationToken,
        domain: &str,
        results: &Sender<UrlRecord>,
    ) -> Result<(), ProviderError> {
        // OTX pages are 1-based.
        for page in 1u64.. {
            if cancel.is_cancelled() {
                return Ok(());
            }
            info!(provider = NAME, page, %domain, "fetching");

            let url = self.format_url(domain, page);
            let Some(body) = fetch_page(&self.config, cancel, NAME, page, &url, &[]).await? else {
                return Ok(());
            };
            let listing: UrlListPage = decode(NAME, page, &body)?;
            if listing.url_list.is_empty() {
                return Ok(());
            }

            for entry in listing.url_list {
                if entry.url.is_empty() {
                    continue;
                }
                if !send_url(cancel, results, entry.url, NAME).await {
                    return Ok(());
                }
            }

            if !listing.has_next {
                return Ok(());
            }
        }
        Ok(())
    }
}
