//! Archive providers: each one paginates a single third-party index and
//! pushes the URLs it finds onto the shared results channel.
//!
//! # Supported Sources
//!
//! | Provider | Module | Pagination | Notes |
//! |----------|--------|------------|-------|
//! | Wayback Machine | [`wayback`] | page index until empty | first row of every page is a header |
//! | Common Crawl | [`commoncrawl`] | page count from `showNumPages` | index URL discovered at startup |
//! | AlienVault OTX | [`otx`] | page index while `has_next` | domain vs hostname endpoint |
//! | urlscan.io | [`urlscan`] | `search_after` cursor while `has_more` | client-side hostname filter |
//!
//! # Common Pattern
//!
//! Every provider checks the shared [`CancellationToken`] before each page
//! and returns `Ok(())` once it fires. A 400 or 429 from the API ends
//! pagination cleanly; any other request or decode failure aborts the fetch
//! with a [`ProviderError`], keeping the URLs already sent.

pub mod commoncrawl;
pub mod domain;
pub mod filters;
pub mod otx;
pub mod urlscan;
pub mod wayback;

use crate::error::{ProviderError, RequestError};
use crate::http::RequestExecutor;
use crate::models::UrlRecord;
use crate::utils::truncate_for_log;
use bytes::Bytes;
use itertools::Itertools;
use serde::de::DeserializeOwned;
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::mpsc::Sender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub use commoncrawl::CommonCrawl;
pub use filters::Filters;
pub use otx::Otx;
pub use urlscan::UrlScan;
pub use wayback::Wayback;

/// A source of archived URLs.
///
/// Implementations must be `Send + Sync`: one provider instance is shared by
/// every worker that receives a work unit for it.
pub trait Provider: Send + Sync {
    /// Stable lowercase name, used in logs and JSON output.
    fn name(&self) -> &'static str;

    /// Fetch every URL known for `domain` and send them on `results`.
    ///
    /// Returns `Ok(())` when pagination is exhausted, when `cancel` fires,
    /// or when the API signals a bad request or rate limit.
    fn fetch(
        &self,
        cancel: &CancellationToken,
        domain: &str,
        results: &Sender<UrlRecord>,
    ) -> impl Future<Output = Result<(), ProviderError>> + Send;
}

/// The set of providers a run can be configured with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    Wayback,
    CommonCrawl,
    Otx,
    UrlScan,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 4] = [
        ProviderKind::Wayback,
        ProviderKind::CommonCrawl,
        ProviderKind::Otx,
        ProviderKind::UrlScan,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ProviderKind::Wayback => wayback::NAME,
            ProviderKind::CommonCrawl => commoncrawl::NAME,
            ProviderKind::Otx => otx::NAME,
            ProviderKind::UrlScan => urlscan::NAME,
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        ProviderKind::ALL
            .into_iter()
            .find(|kind| kind.name() == wanted)
            .ok_or_else(|| format!("unknown provider: {s}"))
    }
}

/// Base URLs for every provider. Overridable for self-hosted mirrors and
/// tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub wayback: String,
    pub commoncrawl_index: String,
    pub otx: String,
    pub urlscan: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            wayback: "https://web.archive.org".into(),
            commoncrawl_index: "https://index.commoncrawl.org/collinfo.json".into(),
            otx: "https://otx.alienvault.com".into(),
            urlscan: "https://urlscan.io".into(),
        }
    }
}

/// Read-only settings shared by every provider for the lifetime of a run.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub executor: RequestExecutor,
    pub include_subdomains: bool,
    pub filters: Filters,
    pub endpoints: Endpoints,
    pub urlscan_api_key: Option<String>,
}

/// Closed set of provider variants behind the [`Provider`] interface.
#[derive(Debug)]
pub enum AnyProvider {
    Wayback(Wayback),
    CommonCrawl(CommonCrawl),
    Otx(Otx),
    UrlScan(UrlScan),
}

impl Provider for AnyProvider {
    fn name(&self) -> &'static str {
        match self {
            AnyProvider::Wayback(p) => p.name(),
            AnyProvider::CommonCrawl(p) => p.name(),
            AnyProvider::Otx(p) => p.name(),
            AnyProvider::UrlScan(p) => p.name(),
        }
    }

    async fn fetch(
        &self,
        cancel: &CancellationToken,
        domain: &str,
        results: &Sender<UrlRecord>,
    ) -> Result<(), ProviderError> {
        match self {
            AnyProvider::Wayback(p) => p.fetch(cancel, domain, results).await,
            AnyProvider::CommonCrawl(p) => p.fetch(cancel, domain, results).await,
            AnyProvider::Otx(p) => p.fetch(cancel, domain, results).await,
            AnyProvider::UrlScan(p) => p.fetch(cancel, domain, results).await,
        }
    }
}

/// Construct the requested providers.
///
/// A provider whose construction fails is logged and left out; the run
/// continues with the rest. Duplicate kinds are constructed once.
pub async fn build_providers(
    kinds: &[ProviderKind],
    config: Arc<ProviderConfig>,
    cancel: &CancellationToken,
) -> Vec<AnyProvider> {
    let mut providers = Vec::with_capacity(kinds.len());
    for kind in kinds.iter().copied().unique() {
        let provider = match kind {
            ProviderKind::Wayback => AnyProvider::Wayback(Wayback::new(Arc::clone(&config))),
            ProviderKind::Otx => AnyProvider::Otx(Otx::new(Arc::clone(&config))),
            ProviderKind::UrlScan => AnyProvider::UrlScan(UrlScan::new(Arc::clone(&config))),
            ProviderKind::CommonCrawl => match CommonCrawl::new(Arc::clone(&config), cancel).await {
                Ok(cc) => AnyProvider::CommonCrawl(cc),
                Err(e) => {
                    warn!(provider = %kind, error = %e, "excluding provider from run");
                    continue;
                }
            },
        };
        providers.push(provider);
    }
    info!(
        count = providers.len(),
        providers = ?providers.iter().map(|p| p.name()).collect::<Vec<_>>(),
        "providers ready"
    );
    providers
}

/// Fetch one page, mapping terminal API signals and cancellation to
/// `Ok(None)`.
pub(crate) async fn fetch_page(
    config: &ProviderConfig,
    cancel: &CancellationToken,
    provider: &'static str,
    page: u64,
    url: &str,
    headers: &[(&str, &str)],
) -> Result<Option<Bytes>, ProviderError> {
    match config.executor.get(cancel, url, headers).await {
        Ok(body) => Ok(Some(body)),
        Err(RequestError::Cancelled) => {
            debug!(provider, page, "cancelled; stopping pagination");
            Ok(None)
        }
        Err(RequestError::BadRequest) => {
            debug!(provider, page, "bad request; stopping pagination");
            Ok(None)
        }
        Err(RequestError::RateLimited) => {
            warn!(provider, page, "rate limited; stopping pagination");
            Ok(None)
        }
        Err(source) => Err(ProviderError::Request {
            provider,
            page,
            source,
        }),
    }
}

/// Decode a JSON page body, logging a preview of the body on failure.
pub(crate) fn decode<T: DeserializeOwned>(
    provider: &'static str,
    page: u64,
    body: &[u8],
) -> Result<T, ProviderError> {
    serde_json::from_slice(body).map_err(|source| {
        debug!(
            provider,
            page,
            body = %truncate_for_log(&String::from_utf8_lossy(body), 300),
            "undecodable response body"
        );
        ProviderError::Decode {
            provider,
            page,
            source,
        }
    })
}

/// Send one URL unless the run has been cancelled.
///
/// Returns `false` when the caller should stop: cancellation fired or the
/// output stage has gone away.
pub(crate) async fn send_url(
    cancel: &CancellationToken,
    results: &Sender<UrlRecord>,
    url: String,
    provider: &'static str,
) -> bool {
    if cancel.is_cancelled() {
        return false;
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        sent = results.send(UrlRecord::new(url, provider)) => sent.is_ok(),
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::{config_for, config_with_retry};
    use super::*;
    use crate::http::RetryPolicy;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn provider_kind_parses_case_insensitively() {
        assert_eq!("Wayback".parse::<ProviderKind>(), Ok(ProviderKind::Wayback));
        assert_eq!(" otx ".parse::<ProviderKind>(), Ok(ProviderKind::Otx));
        assert_eq!("commoncrawl".parse::<ProviderKind>(), Ok(ProviderKind::CommonCrawl));
        assert_eq!("urlscan".parse::<ProviderKind>(), Ok(ProviderKind::UrlScan));
        assert!("google".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn any_provider_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<AnyProvider>();
    }

    #[tokio::test]
    async fn failed_construction_excludes_provider() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/collinfo.json"))
            .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
            .mount(&server)
            .await;

        let config = Arc::new(config_for(&server.uri(), false));
        let providers = build_providers(&ProviderKind::ALL, config, &CancellationToken::new()).await;
        let names: Vec<_> = providers.iter().map(|p| p.name()).collect();
        assert_eq!(names, vec!["wayback", "otx", "urlscan"]);
    }

    #[tokio::test]
    async fn duplicate_kinds_are_built_once() {
        let config = Arc::new(config_for("http://127.0.0.1:1", false));
        let kinds = [ProviderKind::Otx, ProviderKind::Otx, ProviderKind::Wayback];
        let providers = build_providers(&kinds, config, &CancellationToken::new()).await;
        assert_eq!(providers.len(), 2);
    }

    #[tokio::test]
    async fn fetch_page_stops_cleanly_when_cancelled_mid_retry() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let config = config_with_retry(&server.uri(), false, RetryPolicy::new(5));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let url = format!("{}/cdx/search/cdx", server.uri());
        let page = tokio::time::timeout(
            Duration::from_secs(2),
            fetch_page(&config, &cancel, "wayback", 0, &url, &[]),
        )
        .await
        .expect("cancellation should return promptly");
        assert!(matches!(page, Ok(None)));
    }

    #[tokio::test]
    async fn send_url_stops_after_cancellation() {
        let (tx, mut rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();
        assert!(send_url(&cancel, &tx, "https://a.example/".into(), "wayback").await);
        cancel.cancel();
        assert!(!send_url(&cancel, &tx, "https://b.example/".into(), "wayback").await);
        drop(tx);
        assert_eq!(rx.recv().await.map(|r| r.url), Some("https://a.example/".to_string()));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn send_url_reports_closed_channel() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let cancel = CancellationToken::new();
        assert!(!send_url(&cancel, &tx, "https://a.example/".into(), "otx").await);
    }
}
