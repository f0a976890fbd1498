use async_trait::async_trait;
use geoquery_core::{GeoQueryError, HttpReply, NetworkConfig, Result, TransportFailure};
use reqwest::Client;
use std::time::Duration;

/// One raw HTTP GET against the feature service.
///
/// Implementations perform exactly one attempt; retries belong to
/// [`geoquery_core::RetryLayer`].
#[async_trait]
pub trait FeatureTransport: Send + Sync {
    async fn get(
        &self,
        url: &str,
        params: &[(String, String)],
    ) -> std::result::Result<HttpReply, TransportFailure>;
}

/// Pooled reqwest-backed transport.
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(config: &NetworkConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(
                config.connect_timeout_secs + config.read_timeout_secs,
            ))
            .pool_max_idle_per_host(config.max_connections)
            .pool_idle_timeout(Duration::from_secs(config.keepalive_secs))
            .build()
            .map_err(|e| GeoQueryError::Connection(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

/// Map a reqwest error onto the retry layer's failure classes.
pub fn classify_reqwest_error(err: &reqwest::Error) -> TransportFailure {
    if err.is_timeout() {
        TransportFailure::timeout(format!("Request timeout: {}", err))
    } else if err.is_connect() || err.is_request() {
        TransportFailure::connect(format!("Connection failed: {}", err))
    } else {
        TransportFailure::other(format!("Request failed: {}", err))
    }
}

#[async_trait]
impl FeatureTransport for ReqwestTransport {
    async fn get(
        &self,
        url: &str,
        params: &[(String, String)],
    ) -> std::result::Result<HttpReply, TransportFailure> {
        let response = self
            .client
            .get(url)
            .query(params)
            .send()
            .await
            .map_err(|e| classify_reqwest_error(&e))?;

        let status = response.status().as_u16();
        // Reading the body to the end hands the connection back to the pool.
        let body = response
            .text()
            .await
            .map_err(|e| classify_reqwest_error(&e))?;

        Ok(HttpReply { status, body })
    }
}
