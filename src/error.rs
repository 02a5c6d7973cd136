//! Error types for fetching, decoding, and writing archived URLs.
//!
//! The taxonomy is layered: [`RequestError`] comes out of the request
//! executor, providers wrap it in [`ProviderError`] (which stays isolated to
//! one domain/provider pair), and only [`OutputError`] is fatal to a run.

/// Failure of a single HTTP GET after the retry budget is spent.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    /// The API answered 400. Callers treat this as "stop paginating".
    #[error("API responded with 400 status code")]
    BadRequest,

    /// The API answered 429.
    #[error("API responded with 429 status code (rate limited)")]
    RateLimited,

    /// Any other non-200 status.
    #[error("API responded with non-200 status code: {0}")]
    Status(u16),

    /// The response carried no body.
    #[error("unexpected empty response")]
    EmptyResponse,

    /// Connection, TLS, timeout or body read failure.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The run was cancelled while the request was in flight or backing off.
    #[error("request cancelled")]
    Cancelled,
}

impl RequestError {
    /// Whether another attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::BadRequest | Self::RateLimited | Self::Cancelled)
    }
}

/// Failure of one provider for one domain.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("failed to fetch {provider} page {page}: {source}")]
    Request {
        provider: &'static str,
        page: u64,
        #[source]
        source: RequestError,
    },

    #[error("failed to decode {provider} results for page {page}: {source}")]
    Decode {
        provider: &'static str,
        page: u64,
        #[source]
        source: serde_json::Error,
    },

    /// The API returned an explicit error message inside a well-formed body.
    #[error("received an error from {provider}: {message}")]
    Api {
        provider: &'static str,
        message: String,
    },

    /// Provider could not be constructed (e.g. index discovery failed).
    #[error("failed to initialise {provider}: {message}")]
    Discovery {
        provider: &'static str,
        message: String,
    },
}

/// Failure of the output stage. Fatal to the whole run.
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    #[error("error writing results: {0}")]
    Io(#[from] std::io::Error),

    #[error("error encoding result: {0}")]
    Json(#[from] serde_json::Error),
}

/// Invalid or unreadable configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("could not parse config file {path}: {source}")]
    Yaml {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("config error: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bad_request_and_rate_limit_are_not_retryable() {
        assert!(!RequestError::BadRequest.is_retryable());
        assert!(!RequestError::RateLimited.is_retryable());
        assert!(!RequestError::Cancelled.is_retryable());
        assert!(RequestError::Status(503).is_retryable());
        assert!(RequestError::EmptyResponse.is_retryable());
    }

    #[test]
    fn display_provider_request_error() {
        let err = ProviderError::Request {
            provider: "wayback",
            page: 3,
            source: RequestError::Status(502),
        };
        assert_eq!(
            err.to_string(),
            "failed to fetch wayback page 3: API responded with non-200 status code: 502"
        );
    }

    #[test]
    fn display_api_error() {
        let err = ProviderError::Api {
            provider: "commoncrawl",
            message: "No Captures found".into(),
        };
        assert_eq!(
            err.to_string(),
            "received an error from commoncrawl: No Captures found"
        );
    }

    #[test]
    fn display_config_invalid() {
        let err = ConfigError::Invalid("threads must be greater than 0".into());
        assert_eq!(err.to_string(), "config error: threads must be greater than 0");
    }

    #[test]
    fn errors_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<RequestError>();
        assert_send_sync::<ProviderError>();
        assert_send_sync::<OutputError>();
    }
}
