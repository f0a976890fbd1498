use crate::request::{page_params, NearbyRequest, QueryRequest, SpatialParams};
use crate::transport::{FeatureTransport, ReqwestTransport};
use geoquery_cache::{CacheConfig, CacheKeyBuilder, CacheStats, ResponseCache};
use geoquery_core::{
    Feature, FeatureCollection, FieldDescriptor, GeoQueryConfig, GeoQueryError, QueryConfig,
    Result, RetryLayer, RetryPolicy, SpatialReference,
};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

const CACHE_NAMESPACE: &str = "arcgis";

/// One decoded page of a feature service response.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FeaturePage {
    pub features: Vec<Feature>,
    pub exceeded_transfer_limit: bool,
    pub spatial_reference: Option<SpatialReference>,
    pub fields: Vec<FieldDescriptor>,
    pub geometry_type: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPage {
    #[serde(default)]
    error: Option<ServiceError>,
    #[serde(default)]
    features: Option<Vec<Feature>>,
    #[serde(default)]
    exceeded_transfer_limit: bool,
    #[serde(default)]
    spatial_reference: Option<SpatialReference>,
    #[serde(default)]
    fields: Option<Vec<FieldDescriptor>>,
    #[serde(default)]
    geometry_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ServiceError {
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    details: Vec<Value>,
}

impl ServiceError {
    fn describe(&self) -> String {
        let mut text = self
            .message
            .clone()
            .unwrap_or_else(|| "Unknown service error".to_string());
        if let Some(code) = self.code {
            text = format!("{} (code {})", text, code);
        }
        let details: Vec<String> = self
            .details
            .iter()
            .map(|d| match d {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .filter(|d| !d.is_empty())
            .collect();
        if !details.is_empty() {
            text = format!("{}: {}", text, details.join("; "));
        }
        text
    }
}

/// Decode a page body. Service-reported errors and malformed payloads are query errors.
pub fn parse_page(body: &str) -> Result<FeaturePage> {
    let raw: RawPage = serde_json::from_str(body)
        .map_err(|e| GeoQueryError::query(format!("Malformed service response: {}", e)))?;

    if let Some(error) = raw.error {
        return Err(GeoQueryError::query(format!(
            "Feature service error: {}",
            error.describe()
        )));
    }

    let features = raw.features.ok_or_else(|| {
        GeoQueryError::query("Malformed service response: missing 'features' array")
    })?;

    Ok(FeaturePage {
        features,
        exceeded_transfer_limit: raw.exceeded_transfer_limit,
        spatial_reference: raw.spatial_reference,
        fields: raw.fields.unwrap_or_default(),
        geometry_type: raw.geometry_type,
    })
}

/// Paginated, retried and optionally cached access to one feature layer.
pub struct FeatureQueryClient {
    service_url: String,
    transport: Arc<dyn FeatureTransport>,
    retry: RetryLayer,
    cache: Option<Arc<ResponseCache<FeaturePage>>>,
    query_config: QueryConfig,
}

impl FeatureQueryClient {
    /// Client with a pooled HTTP transport configured from `config`.
    pub fn new(service_url: impl Into<String>, config: &GeoQueryConfig) -> Result<Self> {
        let transport = ReqwestTransport::new(&config.network)?;
        Self::with_transport(service_url, config, Arc::new(transport))
    }

    pub fn with_transport(
        service_url: impl Into<String>,
        config: &GeoQueryConfig,
        transport: Arc<dyn FeatureTransport>,
    ) -> Result<Self> {
        let service_url = normalize_service_url(service_url.into())?;
        let cache = config.cache.enabled.then(|| {
            Arc::new(ResponseCache::new(CacheConfig::from_settings(&config.cache)))
        });

        info!(
            service_url = %service_url,
            cache_enabled = cache.is_some(),
            max_retries = config.network.max_retries,
            "Feature query client ready"
        );

        Ok(Self {
            service_url,
            transport,
            retry: RetryLayer::new(RetryPolicy::from_network_config(&config.network)),
            cache,
            query_config: config.query.clone(),
        })
    }

    /// Share a response cache between clients.
    pub fn with_cache(mut self, cache: Arc<ResponseCache<FeaturePage>>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn without_cache(mut self) -> Self {
        self.cache = None;
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = RetryLayer::new(policy);
        self
    }

    pub fn service_url(&self) -> &str {
        &self.service_url
    }

    pub fn query_url(&self) -> String {
        format!("{}/query", self.service_url)
    }

    pub fn query_config(&self) -> &QueryConfig {
        &self.query_config
    }

    /// A request pre-filled with the configured defaults.
    pub fn request(&self, where_clause: impl Into<String>) -> QueryRequest {
        QueryRequest::from_config(where_clause, &self.query_config)
    }

    /// Attribute query, following pagination until the service reports no more data.
    #[instrument(skip(self, request), fields(where_clause = %request.where_clause))]
    pub async fn query(&self, request: &QueryRequest) -> Result<FeatureCollection> {
        self.validate_request(request)?;
        self.run_pages(request, None).await
    }

    /// Features related to a point buffered by `distance_miles`.
    ///
    /// Returned features are not re-checked against the distance; membership
    /// is whatever the service's spatial operator decides.
    #[instrument(skip(self, request), fields(point = %request.point, distance = request.distance_miles))]
    pub async fn query_nearby(&self, request: &NearbyRequest) -> Result<FeatureCollection> {
        request.validate()?;
        self.validate_request(&request.query)?;

        let spatial = SpatialParams {
            point: request.point,
            distance_miles: request.distance_miles,
            relationship: request.spatial_relationship,
            wkid: self.query_config.spatial_reference_wkid,
        };
        self.run_pages(&request.query, Some(&spatial)).await
    }

    /// Drop every cached page. Returns the number of entries removed.
    pub fn clear_cache(&self) -> usize {
        match &self.cache {
            Some(cache) => {
                let cleared = cache.clear();
                info!(cleared, "Cleared feature query cache");
                cleared
            }
            None => 0,
        }
    }

    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.cache.as_ref().map(|cache| cache.stats())
    }

    fn validate_request(&self, request: &QueryRequest) -> Result<()> {
        request.validate()?;
        if request.page_size > self.query_config.max_page_size {
            return Err(GeoQueryError::validation(format!(
                "page_size {} exceeds the maximum of {}",
                request.page_size, self.query_config.max_page_size
            )));
        }
        Ok(())
    }

    async fn run_pages(
        &self,
        request: &QueryRequest,
        spatial: Option<&SpatialParams>,
    ) -> Result<FeatureCollection> {
        let max_pages = request.max_pages.unwrap_or(self.query_config.max_pages).max(1);
        let started = Instant::now();
        let mut collection = FeatureCollection::default();
        let mut offset = 0usize;

        loop {
            let page = self.fetch_page(request, spatial, offset).await?;
            let more = page.exceeded_transfer_limit;
            let page_len = page.features.len();

            if collection.pages_fetched == 0 {
                collection.spatial_reference = page.spatial_reference;
                collection.fields = page.fields;
                collection.geometry_type = page.geometry_type;
            }
            collection.pages_fetched += 1;
            collection.features.extend(page.features);

            debug!(
                page = collection.pages_fetched,
                page_features = page_len,
                features_so_far = collection.features.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Fetched page"
            );

            if let Some(limit) = request.max_features {
                if collection.features.len() >= limit {
                    collection.features.truncate(limit);
                    break;
                }
            }
            if !request.paginate || page_len == 0 || !more {
                break;
            }
            if collection.pages_fetched >= max_pages {
                collection.max_pages_reached = true;
                warn!(
                    max_pages,
                    features = collection.features.len(),
                    "Page cap reached while the service still reported more data; results are partial"
                );
                break;
            }
            offset += request.page_size;
        }

        info!(
            features = collection.features.len(),
            pages = collection.pages_fetched,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Query complete"
        );
        Ok(collection)
    }

    async fn fetch_page(
        &self,
        request: &QueryRequest,
        spatial: Option<&SpatialParams>,
        offset: usize,
    ) -> Result<FeaturePage> {
        let cache = self.cache.as_ref().filter(|_| request.use_cache);
        let key = cache.map(|_| page_cache_key(&self.service_url, request, spatial, offset));

        if let (Some(cache), Some(key)) = (cache, key.as_deref()) {
            if let Some(page) = cache.get(key) {
                debug!(offset, "Page served from cache");
                return Ok(page);
            }
        }

        let url = self.query_url();
        let params = page_params(request, spatial, offset);
        let transport = Arc::clone(&self.transport);
        let reply = self
            .retry
            .execute("feature query", |_| {
                let transport = Arc::clone(&transport);
                let url = url.clone();
                let params = params.clone();
                async move { transport.get(&url, &params).await }
            })
            .await?;

        let page = parse_page(&reply.body)?;

        if let (Some(cache), Some(key)) = (cache, key) {
            cache.set(key, page.clone(), None);
        }
        Ok(page)
    }
}

fn normalize_service_url(url: String) -> Result<String> {
    let trimmed = url.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(GeoQueryError::validation("service_url must be non-empty"));
    }
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return Err(GeoQueryError::validation(format!(
            "service_url must be an http(s) URL, got '{}'",
            trimmed
        )));
    }
    Ok(trimmed.strip_suffix("/query").unwrap_or(trimmed).to_string())
}

fn page_cache_key(
    service_url: &str,
    request: &QueryRequest,
    spatial: Option<&SpatialParams>,
    offset: usize,
) -> String {
    let mut key = CacheKeyBuilder::new(CACHE_NAMESPACE)
        .text("url", service_url)
        .text("where", &request.where_clause)
        .text("out_fields", request.out_fields_param())
        .number("page_size", request.page_size)
        .number("offset", offset)
        .flag("return_geometry", request.return_geometry);

    if let Some(spatial) = spatial {
        key = key
            .float("x", spatial.point.x)
            .float("y", spatial.point.y)
            .float("distance", spatial.distance_miles)
            .text("spatial_rel", spatial.relationship.as_str())
            .number("wkid", spatial.wkid);
    }
    key.build()
}
