//! # Infrastructure Layer
//!
//! This crate implements the infrastructure layer for the SmsGate gateway. It
//! provides the concrete backends behind the traits defined in `sg_core`.
//!
//! ## Architecture
//!
//! The infrastructure layer contains:
//! - **Cache**: Redis client, Redis counter store for the rate limiter and
//!   Redis OTP repository
//! - **SMS**: carrier adapters (mock and Twilio)
//! - **Bootstrap**: [`initialize`] wires configuration into a ready
//!   [`GatewayServices`] container

use std::sync::Arc;

use sg_core::errors::DomainError;
use sg_core::repositories::{InMemoryOtpRepository, OtpRepository};
use sg_core::services::otp::{OtpService, OtpServiceConfig};
use sg_core::services::providers::{ProviderManager, ProviderManagerConfig};
use sg_core::services::rate_limit::{CounterStore, RateLimiter};
use sg_core::services::templates::TemplateRenderer;
use sg_shared::config::AppConfig;

/// Cache module - Redis client and Redis-backed stores
pub mod cache;

/// SMS module - carrier adapters
pub mod sms;

use cache::{RedisClient, RedisCounterStore, RedisOtpRepository};
use sms::{MockCarrier, TwilioCarrier, TwilioConfig};

/// Infrastructure-specific error types
#[derive(Debug, thiserror::Error)]
pub enum InfrastructureError {
    /// Redis cache error
    #[error("Cache error: {0}")]
    Cache(#[from] redis::RedisError),

    /// HTTP request error for carrier APIs
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// SMS carrier error
    #[error("SMS service error: {0}")]
    Sms(String),

    /// Stored data could not be (de)serialised
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// General infrastructure error
    #[error("Infrastructure error: {0}")]
    General(String),
}

impl From<InfrastructureError> for DomainError {
    fn from(error: InfrastructureError) -> Self {
        match error {
            InfrastructureError::Cache(e) => DomainError::Storage {
                message: format!("Redis: {}", e),
            },
            InfrastructureError::Serialization(e) => DomainError::Storage {
                message: format!("Corrupt record: {}", e),
            },
            InfrastructureError::Config(message) => DomainError::Validation { message },
            other => DomainError::Internal {
                message: other.to_string(),
            },
        }
    }
}

/// Ready-to-use gateway services
#[derive(Clone)]
pub struct GatewayServices {
    pub providers: Arc<ProviderManager>,
    pub rate_limiter: Arc<RateLimiter>,
    pub otp: Arc<OtpService>,
    /// Present when Redis was reachable at startup
    pub redis: Option<RedisClient>,
}

impl GatewayServices {
    /// Stop the background health checks
    ///
    /// The limiter cleanup task ends by itself once the services are dropped.
    pub async fn shutdown(&self) {
        self.providers.stop_health_checks().await;
        tracing::info!("Gateway services stopped");
    }
}

/// Initialize the gateway from configuration
///
/// This function sets up:
/// - The Redis connection, falling back to in-process state when it is unreachable
/// - Every enabled carrier, registered by priority
/// - The health check loop and the limiter cleanup task
/// - The OTP service on top of them
pub async fn initialize(config: &AppConfig) -> Result<GatewayServices, InfrastructureError> {
    tracing::info!(environment = %config.environment, "Initializing gateway services...");

    config
        .validate()
        .map_err(|e| InfrastructureError::Config(e.to_string()))?;

    let redis = connect_redis(config).await;

    let (counter_store, otp_repository) = match &redis {
        Some(client) => {
            let store: Arc<dyn CounterStore> = Arc::new(RedisCounterStore::new(client.clone()));
            let repository: Arc<dyn OtpRepository> =
                Arc::new(RedisOtpRepository::new(client.clone()));
            (Some(store), repository)
        }
        None => {
            let repository: Arc<dyn OtpRepository> = Arc::new(InMemoryOtpRepository::new());
            (None, repository)
        }
    };

    let providers = Arc::new(ProviderManager::new(ProviderManagerConfig::from(
        &config.providers,
    )));
    register_carriers(&providers, config).await?;
    if providers.list_providers().await.is_empty() {
        tracing::warn!("No SMS carriers enabled; every send will fail");
    }
    providers.start_health_checks().await;

    let rate_limiter = Arc::new(RateLimiter::new(config.rate_limit.clone(), counter_store));
    let _cleanup = rate_limiter.start_cleanup_task();

    let otp = Arc::new(OtpService::new(
        otp_repository,
        Arc::new(TemplateRenderer::with_defaults()),
        providers.clone(),
        rate_limiter.clone(),
        OtpServiceConfig::from(&config.otp),
    ));

    tracing::info!(
        redis = redis.is_some(),
        carriers = ?providers.list_providers().await,
        "Gateway services initialized successfully"
    );

    Ok(GatewayServices {
        providers,
        rate_limiter,
        otp,
        redis,
    })
}

async fn connect_redis(config: &AppConfig) -> Option<RedisClient> {
    if !config.cache.is_enabled() {
        tracing::info!("Redis not configured, using in-process state");
        return None;
    }

    match RedisClient::new(config.cache.clone()).await {
        Ok(client) => Some(client),
        Err(e) => {
            tracing::warn!(
                error = %e,
                "Redis unavailable, falling back to in-process state"
            );
            None
        }
    }
}

async fn register_carriers(
    providers: &ProviderManager,
    config: &AppConfig,
) -> Result<(), InfrastructureError> {
    let carriers = &config.providers;

    if carriers.twilio.enabled {
        let twilio = TwilioCarrier::new(TwilioConfig::from(&carriers.twilio))?;
        providers
            .register(Arc::new(twilio), carriers.twilio.priority)
            .await;
    }

    if carriers.mock.enabled {
        providers
            .register(Arc::new(MockCarrier::new()), carriers.mock.priority)
            .await;
    }

    Ok(())
}
