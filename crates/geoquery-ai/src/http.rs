use geoquery_arcgis::classify_reqwest_error;
use geoquery_core::{GeoQueryError, HttpReply, Result, RetryLayer, TransportFailure};
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

pub(crate) fn build_client(timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| GeoQueryError::translation(format!("Failed to create HTTP client: {}", e)))
}

/// POST `body` as JSON through the retry layer and return the response text.
///
/// Every failure, including retry exhaustion, is reported as a translation
/// error tagged with the provider name.
pub(crate) async fn post_json<B: Serialize + Sync>(
    client: &Client,
    retry: &RetryLayer,
    provider: &str,
    url: &str,
    headers: &[(&str, &str)],
    body: &B,
) -> Result<String> {
    let operation = format!("{} completion", provider);
    let reply = retry
        .execute(&operation, |_| async move {
            let mut request = client.post(url).json(body);
            for (name, value) in headers {
                request = request.header(*name, *value);
            }
            let response = request.send().await.map_err(|e| classify_reqwest_error(&e))?;
            let status = response.status().as_u16();
            let text = response.text().await.map_err(|e| classify_reqwest_error(&e))?;
            Ok::<_, TransportFailure>(HttpReply::new(status, text))
        })
        .await
        .map_err(|e| GeoQueryError::translation(format!("{} API error: {}", provider, e)))?;

    Ok(reply.body)
}

/// Parse a provider response body, mapping schema mismatches to translation errors.
pub(crate) fn decode<T: serde::de::DeserializeOwned>(provider: &str, body: &str) -> Result<T> {
    serde_json::from_str(body).map_err(|e| {
        GeoQueryError::translation(format!("Failed to parse {} API response: {}", provider, e))
    })
}
