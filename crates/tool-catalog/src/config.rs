use std::fmt::{self, Debug};
use std::time::Duration;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Builder for [`CatalogConfig`].
#[derive(Clone, PartialEq, Eq)]
pub struct CatalogConfigBuilder {
    endpoint: String,
    api_key: Option<String>,
    timeout: Option<Duration>,
}

impl CatalogConfigBuilder {
    /// Creates a builder for the catalog at `endpoint`.
    #[inline]
    pub fn with_endpoint<S: Into<String>>(endpoint: S) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: None,
            timeout: None,
        }
    }

    /// Sets the API key sent with every request.
    #[inline]
    pub fn with_api_key<S: Into<String>>(mut self, api_key: S) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Sets the timeout of each request, 30 seconds by default.
    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Builds the configuration.
    #[inline]
    pub fn build(self) -> CatalogConfig {
        CatalogConfig {
            endpoint: self.endpoint,
            api_key: self.api_key.filter(|key| !key.is_empty()),
            timeout: self.timeout.unwrap_or(DEFAULT_TIMEOUT),
        }
    }
}

impl Debug for CatalogConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CatalogConfigBuilder")
            .field("endpoint", &self.endpoint)
            .field("api_key", &self.api_key.as_ref().map(|_| "<deducted>"))
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Configuration for [`crate::CatalogClient`].
#[derive(Clone, PartialEq, Eq)]
pub struct CatalogConfig {
    pub(crate) endpoint: String,
    pub(crate) api_key: Option<String>,
    pub(crate) timeout: Duration,
}

impl CatalogConfig {
    /// Returns the catalog endpoint.
    #[inline]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Returns the request timeout.
    #[inline]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Debug for CatalogConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CatalogConfig")
            .field("endpoint", &self.endpoint)
            .field("api_key", &self.api_key.as_ref().map(|_| "<deducted>"))
            .field("timeout", &self.timeout)
            .finish()
    }
}
