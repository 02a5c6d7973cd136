//! Server-side result filters shared by the CDX-style providers.
//!
//! Wayback and Common Crawl both accept repeated `filter=` parameters plus a
//! `from`/`to` date range, but spell the field names and negation
//! differently.

use serde::Deserialize;
use url::form_urlencoded;

/// Status-code, mime-type and date-range filters.
///
/// Dates use the `YYYYMM` form accepted by both CDX servers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Filters {
    pub from: Option<String>,
    pub to: Option<String>,
    #[serde(rename = "matchstatuscodes")]
    pub match_status_codes: Vec<String>,
    #[serde(rename = "matchmimetypes")]
    pub match_mime_types: Vec<String>,
    #[serde(rename = "filterstatuscodes")]
    pub filter_status_codes: Vec<String>,
    #[serde(rename = "filtermimetypes")]
    pub filter_mime_types: Vec<String>,
}

/// Which CDX dialect to render the filters for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Wayback,
    CommonCrawl,
}

impl Filters {
    pub fn is_empty(&self) -> bool {
        self.from.is_none()
            && self.to.is_none()
            && self.match_status_codes.is_empty()
            && self.match_mime_types.is_empty()
            && self.filter_status_codes.is_empty()
            && self.filter_mime_types.is_empty()
    }

    /// Render the active filters as a query-string suffix.
    ///
    /// Returns `""` when no filter is set, otherwise a string starting with
    /// `&` that can be appended to an existing query.
    pub fn query_suffix(&self, dialect: Dialect) -> String {
        if self.is_empty() {
            return String::new();
        }
        let (status, mime, negate) = match dialect {
            Dialect::Wayback => ("statuscode:", "mimetype:", "!"),
            Dialect::CommonCrawl => ("status:", "mime:", "!="),
        };

        let mut form = form_urlencoded::Serializer::new(String::new());
        // Keys are emitted in sorted order: filter, from, to.
        for code in &self.match_status_codes {
            form.append_pair("filter", &format!("{status}{code}"));
        }
        for mime_type in &self.match_mime_types {
            form.append_pair("filter", &format!("{mime}{mime_type}"));
        }
        for code in &self.filter_status_codes {
            form.append_pair("filter", &format!("{negate}{status}{code}"));
        }
        for mime_type in &self.filter_mime_types {
            form.append_pair("filter", &format!("{negate}{mime}{mime_type}"));
        }
        if let Some(from) = self.from.as_deref().filter(|f| !f.is_empty()) {
            form.append_pair("from", from);
        }
        if let Some(to) = self.to.as_deref().filter(|t| !t.is_empty()) {
            form.append_pair("to", to);
        }

        let params = form.finish();
        if params.is_empty() {
            params
        } else {
            format!("&{params}")
        }
    }
}
