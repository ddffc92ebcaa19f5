use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use crate::{
    clients::{ErpClient, NlpClient},
    config::AppConfig,
    ratelimit::RateLimiter,
    repository::Repository,
    service::Service,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub service: Arc<Service>,
    pub rate_limiter: Arc<dyn RateLimiter>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        repository: Arc<dyn Repository>,
        rate_limiter: Arc<dyn RateLimiter>,
    ) -> Result<Self> {
        let nlp = NlpClient::new(
            &config.nlp_service_url,
            Duration::from_secs(config.outbound_timeout_secs),
        )?;
        let erp = ErpClient::new(&config)?;
        let service = Service::new(repository, nlp, erp, config.enable_test_login);

        Ok(Self {
            config: Arc::new(config),
            service: Arc::new(service),
            rate_limiter,
        })
    }
}
