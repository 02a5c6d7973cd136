//! Data carried between the scheduler, the providers and the output stage.
//!
//! - [`UrlRecord`]: one harvested URL on its way to the output stage
//! - [`Work`]: one (domain, provider) pair handed to a worker

use serde::Serialize;
use std::sync::Arc;

/// A single harvested URL plus the provider that produced it.
///
/// Lives only on the results channel; serialized as one JSON object per
/// line in JSON output mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UrlRecord {
    pub url: String,
    #[serde(skip_serializing_if = "is_blank")]
    pub provider: &'static str,
}

fn is_blank(provider: &&'static str) -> bool {
    provider.is_empty()
}

impl UrlRecord {
    pub fn new(url: impl Into<String>, provider: &'static str) -> Self {
        Self {
            url: url.into(),
            provider,
        }
    }
}

/// One unit of work: fetch everything `provider` knows about `domain`.
///
/// Consumed exactly once by exactly one worker.
#[derive(Debug)]
pub struct Work<P> {
    pub domain: String,
    pub provider: Arc<P>,
}

impl<P> Work<P> {
    pub fn new(domain: impl Into<String>, provider: Arc<P>) -> Self {
        Self {
            domain: domain.into(),
            provider,
        }
    }
}
