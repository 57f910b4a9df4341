/// CloudFront wrapper for storage drivers
///
/// Constructs temporary signed CloudFront URLs from the driver's bucket keys so
/// the caller can issue temporary redirects to the edge. Clients inside the
/// configured AWS ranges are sent to the driver's own redirect instead.
use crate::config::{CloudFrontConfig, MiddlewareOptions};
use crate::decider::{RedirectDecider, RedirectDecision};
use crate::error::{ConfigError, Result};
use crate::ranges::{HttpRangeSource, RangeRefresher, RangeSource};
use crate::request::RedirectRequest;
use crate::signer::{CloudFrontSigner, UrlSigner};
use crate::storage::{EdgeKeyer, StorageDriver};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

pub struct CloudFrontMiddleware<D> {
    driver: D,
    decider: RedirectDecider,
}

impl<D: StorageDriver> CloudFrontMiddleware<D> {
    /// Validate options, load the signing key and start IP range refresh if enabled.
    pub async fn new(driver: D, options: &MiddlewareOptions) -> std::result::Result<Self, ConfigError> {
        let config = CloudFrontConfig::from_options(options)?;
        Self::from_config(driver, config).await
    }

    pub async fn from_config(driver: D, config: CloudFrontConfig) -> std::result::Result<Self, ConfigError> {
        let signer = CloudFrontSigner::from_pem_file(&config.key_pair_id, &config.private_key_path)?;
        let source = Arc::new(HttpRangeSource::new(config.fetch_timeout));
        Ok(Self::with_components(driver, config, Arc::new(signer), source).await)
    }

    /// Build from already constructed parts.
    pub async fn with_components(
        driver: D,
        config: CloudFrontConfig,
        signer: Arc<dyn UrlSigner>,
        source: Arc<dyn RangeSource>,
    ) -> Self {
        let mut decider = RedirectDecider::new(signer, config.base_url.clone(), config.duration)
            .with_cold_start_policy(config.cold_start);

        if let Some(policy) = config.refresh_policy() {
            decider = decider.with_ip_filter(RangeRefresher::start(source, policy).await);
        }

        info!(
            driver = driver.name(),
            base_url = %config.base_url,
            duration_secs = config.duration.as_secs(),
            ip_filter = ?config.ip_filter,
            "CloudFront storage middleware initialized"
        );

        Self { driver, decider }
    }

    pub fn decider(&self) -> &RedirectDecider {
        &self.decider
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Stop background IP range refresh.
    pub fn shutdown(&self) {
        if let Some(refresher) = self.decider.ip_filter() {
            refresher.stop();
        }
    }
}

#[async_trait]
impl<D: StorageDriver> StorageDriver for CloudFrontMiddleware<D> {
    fn name(&self) -> &str {
        self.driver.name()
    }

    async fn redirect_url(&self, request: &RedirectRequest, path: &str) -> Result<Option<String>> {
        let origin = request.remote_ip().unwrap_or_default();

        match self.decider.decide(origin, path, self.driver.edge_keyer())? {
            RedirectDecision::Origin => self.driver.redirect_url(request, path).await,
            RedirectDecision::Edge { url, .. } => Ok(Some(url)),
        }
    }

    fn edge_keyer(&self) -> Option<&dyn EdgeKeyer> {
        self.driver.edge_keyer()
    }
}
