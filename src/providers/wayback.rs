//! Wayback Machine CDX provider.
//!
//! Pages through `/cdx/search/cdx` with `output=json&fl=original`. Every page
//! is a JSON array of arrays whose first row is the `["original"]` header,
//! so the first row is always skipped. Pagination ends on an empty page or
//! on a 400, which the CDX server returns once `page` runs past the end.

use super::filters::Dialect;
use super::{Provider, ProviderConfig, decode, fetch_page, send_url};
use crate::error::ProviderError;
use crate::models::UrlRecord;
use std::sync::Arc;
use tokio::sync::mpsc::Sender;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub const NAME: &str = "wayback";

#[derive(Debug)]
pub struct Wayback {
    config: Arc<ProviderConfig>,
}

impl Wayback {
    pub fn new(config: Arc<ProviderConfig>) -> Self {
        Self { config }
    }

    fn format_url(&self, domain: &str, page: u64) -> String {
        let domain = if self.config.include_subdomains {
            format!("*.{domain}")
        } else {
            domain.to_string()
        };
        format!(
            "{}/cdx/search/cdx?url={domain}/*&output=json&collapse=urlkey&fl=original&pageSize=100&page={page}{}",
            self.config.endpoints.wayback.trim_end_matches('/'),
            self.config.filters.query_suffix(Dialect::Wayback),
        )
    }
}

impl Provider for Wayback {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn fetch(
        &self,
        cancel: &CancellationToken,
        domain: &str,
        results: &Sender<UrlRecord>,
    ) -> Result<(), ProviderError> {
        for page in 0u64.. {
            if cancel.is_cancelled() {
                return Ok(());
            }
            info!(provider = NAME, page, %domain, "fetching");

            let url = self.format_url(domain, page);
            let Some(body) = fetch_page(&self.config, cancel, NAME, page, &url, &[]).await? else {
                return Ok(());
            };
            let rows: Vec<Vec<String>> = decode(NAME, page, &body)?;

            // Only the header row (or nothing at all) means no more captures.
            if rows.len() <= 1 {
                return Ok(());
            }

            for row in rows.into_iter().skip(1) {
                let Some(url) = row.into_iter().next() else {
                    continue;
                };
                if !send_url(cancel, results, url, NAME).await {
                    return Ok(());
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::Filters;
    use crate::http::RetryPolicy;
    use crate::providers::test_support::{collect, config_for, config_with_retry};
    use std::time::Duration;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn mount_page(server: &MockServer, page: &str, body: &str) {
        Mock::given(method("GET"))
            .and(path("/cdx/search/cdx"))
            .and(query_param("page", page))
            .respond_with(ResponseTemplate::new(200).set_body_string(body.to_string()))
            .expect(1)
            .mount(server)
            .await;
    }

    #[test]
    fn format_url_with_subdomains_and_filters() {
        let mut config = config_for("https://web.archive.org/", true);
        config.filters = Filters {
            match_status_codes: vec!["200".into()],
            ..Default::default()
        };
        let wayback = Wayback::new(Arc::new(config));
        assert_eq!(
            wayback.format_url("example.com", 2),
            "https://web.archive.org/cdx/search/cdx?url=*.example.com/*&output=json&collapse=urlkey&fl=original&pageSize=100&page=2&filter=statuscode%3A200"
        );
    }

    #[tokio::test]
    async fn skips_header_row_and_stops_on_empty_page() {
        let server = MockServer::start().await;
        mount_page(
            &server,
            "0",
            r#"[["original"],["https://example.com/a"],["https://example.com/b"]]"#,
        )
        .await;
        mount_page(&server, "1", r#"[["original"],["https://example.com/c"]]"#).await;
        mount_page(&server, "2", "[]").await;

        let wayback = Wayback::new(Arc::new(config_for(&server.uri(), false)));
        let (outcome, records) = collect(&wayback, "example.com").await;

        assert!(outcome.is_ok());
        let urls: Vec<_> = records.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://example.com/a",
                "https://example.com/b",
                "https://example.com/c"
            ]
        );
        assert!(records.iter().all(|r| r.provider == NAME));
    }

    #[tokio::test]
    async fn bad_request_ends_pagination_cleanly() {
        let server = MockServer::start().await;
        mount_page(&server, "0", r#"[["original"],["https://example.com/a"]]"#).await;
        Mock::given(method("GET"))
            .and(path("/cdx/search/cdx"))
            .and(query_param("page", "1"))
            .respond_with(ResponseTemplate::new(400))
            .mount(&server)
            .await;

        let wayback = Wayback::new(Arc::new(config_for(&server.uri(), false)));
        let (outcome, records) = collect(&wayback, "example.com").await;

        assert!(outcome.is_ok());
        assert_eq!(records.len(), 1);
    }

    #[tokio::test]
    async fn malformed_page_aborts_with_decode_error() {
        let server = MockServer::start().await;
        mount_page(&server, "0", r#"[["original"],["https://example.com/a"]]"#).await;
        mount_page(&server, "1", "<html>maintenance</html>").await;

        let wayback = Wayback::new(Arc::new(config_for(&server.uri(), false)));
        let (outcome, records) = collect(&wayback, "example.com").await;

        assert!(matches!(outcome, Err(ProviderError::Decode { page: 1, .. })));
        // results from the first page are kept
        assert_eq!(records.len(), 1);
    }

    #[tokio::test]
    async fn cancelled_before_start_sends_nothing() {
        let server = MockServer::start().await;
        let wayback = Wayback::new(Arc::new(config_for(&server.uri(), false)));
        let (tx, mut rx) = tokio::sync::mpsc::channel(8);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = wayback.fetch(&cancel, "example.com", &tx).await;
        drop(tx);

        assert!(outcome.is_ok());
        assert!(rx.recv().await.is_none());
        let requests = server.received_requests().await.expect("recording enabled");
        assert!(requests.is_empty());
    }

    #[tokio::test]
    async fn cancelled_during_failing_page_keeps_results_and_returns_ok() {
        let server = MockServer::start().await;
        mount_page(&server, "0", r#"[["original"],["https://example.com/a"]]"#).await;
        Mock::given(method("GET"))
            .and(path("/cdx/search/cdx"))
            .and(query_param("page", "1"))
            .respond_with(ResponseTemplate::new(503).set_delay(Duration::from_millis(300)))
            .mount(&server)
            .await;

        let config = config_with_retry(&server.uri(), false, RetryPolicy::new(5));
        let wayback = Wayback::new(Arc::new(config));
        let (tx, mut rx) = tokio::sync::mpsc::channel(8);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            trigger.cancel();
        });

        let outcome = tokio::time::timeout(
            Duration::from_secs(2),
            wayback.fetch(&cancel, "example.com", &tx),
        )
        .await
        .expect("fetch should return promptly once cancelled");
        drop(tx);

        assert!(outcome.is_ok());
        assert_eq!(rx.recv().await.map(|r| r.url), Some("https://example.com/a".to_string()));
        assert!(rx.recv().await.is_none());
    }
}
