//! Common Crawl index provider.
//!
//! The CDX endpoint changes with every crawl, so construction first asks
//! `collinfo.json` for the list of indexes and keeps the newest one. If that
//! discovery fails the provider cannot be built and is left out of the run.
//!
//! A fetch asks for the page count (`showNumPages=true`) and then walks the
//! pages in order. Each page is newline-delimited JSON, one `{"url": ...}`
//! object per line.

use super::filters::Dialect;
use super::{Provider, ProviderConfig, decode, fetch_page, send_url};
use crate::error::{ProviderError, RequestError};
use crate::models::UrlRecord;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc::Sender;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

pub const NAME: &str = "commoncrawl";

#[derive(Debug, Deserialize)]
struct IndexInfo {
    #[serde(rename = "cdx-api")]
    cdx_api: String,
}

#[derive(Debug, Deserialize)]
struct Pagination {
    #[serde(default)]
    pages: u64,
}

#[derive(Debug, Deserialize)]
struct CdxLine {
    #[serde(default)]
    url: String,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug)]
pub struct CommonCrawl {
    config: Arc<ProviderConfig>,
    api_url: String,
}

impl CommonCrawl {
    /// Discover the newest CDX index and build the provider around it.
    ///
    /// # Errors
    ///
    /// [`ProviderError::Discovery`] if the index list cannot be fetched,
    /// cannot be decoded, or is empty.
    #[instrument(level = "info", skip_all)]
    pub async fn new(
        config: Arc<ProviderConfig>,
        cancel: &CancellationToken,
    ) -> Result<Self, ProviderError> {
        let discovery = |message: String| ProviderError::Discovery {
            provider: NAME,
            message,
        };

        let body = config
            .executor
            .get(cancel, &config.endpoints.commoncrawl_index, &[])
            .await
            .map_err(|e| discovery(format!("could not fetch index list: {e}")))?;
        let indexes: Vec<IndexInfo> = serde_json::from_slice(&body)
            .map_err(|e| discovery(format!("could not decode index list: {e}")))?;
        let api_url = indexes
            .into_iter()
            .next()
            .map(|index| index.cdx_api)
            .ok_or_else(|| discovery("failed to grab latest commoncrawl index".into()))?;

        info!(%api_url, "using commoncrawl index");
        Ok(Self { config, api_url })
    }

    fn format_url(&self, domain: &str, page: u64) -> String {
        let domain = if self.config.include_subdomains {
            format!("*.{domain}")
        } else {
            domain.to_string()
        };
        format!(
            "{}?url={domain}/*&output=json&fl=url&page={page}{}",
            self.api_url,
            self.config.filters.query_suffix(Dialect::CommonCrawl),
        )
    }

    /// Fetch a page; a 404 is how the index server says "no captures".
    async fn page_body(
        &self,
        cancel: &CancellationToken,
        page: u64,
        url: &str,
    ) -> Result<Option<bytes::Bytes>, ProviderError> {
        match fetch_page(&self.config, cancel, NAME, page, url, &[]).await {
            Err(ProviderError::Request {
                source: RequestError::Status(404),
                ..
            }) => Ok(None),
            other => other,
        }
    }
}

impl Provider for CommonCrawl {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn fetch(
        &self,
        cancel: &CancellationToken,
        domain: &str,
        results: &Sender<UrlRecord>,
    ) -> Result<(), ProviderError> {
        if cancel.is_cancelled() {
            return Ok(());
        }

        let count_url = format!("{}&showNumPages=true", self.format_url(domain, 0));
        let Some(body) = self.page_body(cancel, 0, &count_url).await? else {
            return Ok(());
        };
        let pagination: Pagination = decode(NAME, 0, &body)?;
        if pagination.pages == 0 {
            info!(provider = NAME, %domain, "no results");
            return Ok(());
        }

        for page in 0..pagination.pages {
            if cancel.is_cancelled() {
                return Ok(());
            }
            info!(provider = NAME, page, %domain, "fetching");

            let url = self.format_url(domain, page);
            let Some(body) = self.page_body(cancel, page, &url).await? else {
                return Ok(());
            };

            for line in body.split(|b| *b == b'\n') {
                if line.iter().all(u8::is_ascii_whitespace) {
                    continue;
                }
                let entry: CdxLine = decode(NAME, page, line)?;
                if let Some(message) = entry.error.filter(|m| !m.is_empty()) {
                    return Err(ProviderError::Api {
                        provider: NAME,
                        message,
                    });
                }
                if entry.url.is_empty() {
                    continue;
                }
                if !send_url(cancel, results, entry.url, NAME).await {
                    return Ok(());
                }
            }
        }
        Ok(())
    }
}
