//! Integration tests for the OTP flow across failover, rate limiting and storage

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use chrono::Utc;

    use sg_core::domain::entities::{OtpPurpose, OtpState};
    use sg_core::domain::value_objects::{
        BalanceInfo, DeliveryReport, DeliveryStatus, SendRequest, SendResponse,
    };
    use sg_core::errors::{DomainError, OtpError, ProviderError};
    use sg_core::repositories::InMemoryOtpRepository;
    use sg_core::services::otp::{OtpService, OtpServiceConfig, SendOtpRequest, VerifyOtpRequest};
    use sg_core::services::providers::{CarrierAdapter, ProviderManager, ProviderManagerConfig};
    use sg_core::services::rate_limit::RateLimiter;
    use sg_core::services::templates::TemplateRenderer;
    use sg_shared::config::RateLimitConfig;

    // Carrier with a kill switch that remembers what it delivered
    struct TestCarrier {
        name: String,
        down: AtomicBool,
        outbox: Mutex<Vec<String>>,
    }

    impl TestCarrier {
        fn new(name: &str, down: bool) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                down: AtomicBool::new(down),
                outbox: Mutex::new(Vec::new()),
            })
        }

        fn last_text(&self) -> Option<String> {
            self.outbox.lock().unwrap().last().cloned()
        }
    }

    #[async_trait]
    impl CarrierAdapter for TestCarrier {
        fn name(&self) -> &str {
            &self.name
        }

        async fn send(&self, request: &SendRequest) -> Result<SendResponse, ProviderError> {
            if self.down.load(Ordering::SeqCst) {
                return Err(ProviderError::DeliveryFailed {
                    provider: self.name.clone(),
                    reason: "service unavailable".to_string(),
                });
            }
            let mut outbox = self.outbox.lock().unwrap();
            outbox.push(request.message.clone());
            Ok(SendResponse {
                message_id: format!("{}-{}", self.name, outbox.len()),
                provider: self.name.clone(),
                status: DeliveryStatus::Sent,
                status_message: None,
                segment_count: 1,
                cost: None,
                currency: None,
                sent_at: Utc::now(),
            })
        }

        async fn get_status(&self, message_id: &str) -> Result<DeliveryReport, ProviderError> {
            Ok(DeliveryReport {
                message_id: message_id.to_string(),
                provider: self.name.clone(),
                status: DeliveryStatus::Delivered,
                error_code: None,
                error_message: None,
                delivered_at: Some(Utc::now()),
                updated_at: Utc::now(),
            })
        }

        async fn get_balance(&self) -> Result<BalanceInfo, ProviderError> {
            Ok(BalanceInfo {
                provider: self.name.clone(),
                balance: 1.0,
                currency: "USD".to_string(),
                updated_at: Utc::now(),
            })
        }

        fn validate_phone_number(&self, raw: &str) -> Result<String, ProviderError> {
            Ok(raw.to_string())
        }

        fn parse_webhook(&self, _payload: &[u8]) -> Result<DeliveryReport, ProviderError> {
            Err(ProviderError::InvalidWebhook {
                reason: "unsupported".to_string(),
            })
        }

        async fn is_healthy(&self) -> bool {
            !self.down.load(Ordering::SeqCst)
        }

        fn max_message_length(&self) -> usize {
            160
        }

        fn supports_scheduling(&self) -> bool {
            false
        }
    }

    fn service(providers: Arc<ProviderManager>, limits: RateLimitConfig) -> OtpService {
        OtpService::new(
            Arc::new(InMemoryOtpRepository::new()),
            Arc::new(TemplateRenderer::with_defaults()),
            providers,
            Arc::new(RateLimiter::new(limits, None)),
            OtpServiceConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_otp_delivered_through_backup_carrier() {
        let primary = TestCarrier::new("primary", true);
        let backup = TestCarrier::new("backup", false);

        let providers = Arc::new(ProviderManager::new(ProviderManagerConfig::default()));
        providers.register(primary.clone(), 1).await;
        providers.register(backup.clone(), 2).await;

        let service = service(providers.clone(), RateLimitConfig::default());

        let response = service
            .send(SendOtpRequest::new("+447700900123", OtpPurpose::TwoFactor).with_template("{{code}}"))
            .await
            .expect("send should fail over to the backup carrier");
        assert_eq!(response.provider, "backup");

        // The failing primary was taken out of rotation
        let status = providers.get_provider_status().await;
        let primary_status = status.iter().find(|s| s.name == "primary").unwrap();
        assert!(!primary_status.healthy);

        let code = backup.last_text().unwrap();
        let result = service
            .verify(VerifyOtpRequest::by_phone("+447700900123", OtpPurpose::TwoFactor, code))
            .await
            .unwrap();
        assert!(result.valid);

        let status = service.get_status(response.request_id).await.unwrap();
        assert_eq!(status.state, OtpState::Verified);
        assert!(status.verified_at.is_some());
    }

    #[tokio::test]
    async fn test_recovered_carrier_takes_traffic_again() {
        let primary = TestCarrier::new("primary", true);
        let backup = TestCarrier::new("backup", false);

        let providers = Arc::new(ProviderManager::new(ProviderManagerConfig::default()));
        providers.register(primary.clone(), 1).await;
        providers.register(backup.clone(), 2).await;

        let service = service(providers.clone(), RateLimitConfig::disabled());

        let first = service
            .send(SendOtpRequest::new("+14155550100", OtpPurpose::Login))
            .await
            .unwrap();
        assert_eq!(first.provider, "backup");

        primary.down.store(false, Ordering::SeqCst);
        providers.check_all_providers().await;

        let second = service
            .send(SendOtpRequest::new("+14155550100", OtpPurpose::Verification))
            .await
            .unwrap();
        assert_eq!(second.provider, "primary");
    }

    #[tokio::test]
    async fn test_all_carriers_down() {
        let providers = Arc::new(ProviderManager::new(ProviderManagerConfig::default()));
        providers.register(TestCarrier::new("only", true), 1).await;

        let service = service(providers, RateLimitConfig::default());
        let first = service
            .send(SendOtpRequest::new("+14155550100", OtpPurpose::Login))
            .await;
        assert!(matches!(
            first,
            Err(DomainError::Provider(ProviderError::DeliveryFailed { .. }))
        ));

        // The carrier is now unhealthy, so nothing is even attempted
        let second = service
            .send(SendOtpRequest::new("+14155550100", OtpPurpose::Login))
            .await;
        assert_eq!(
            second.err(),
            Some(DomainError::Provider(ProviderError::NoProvidersAvailable))
        );
    }

    #[tokio::test]
    async fn test_phone_daily_cap_spans_purposes() {
        let providers = Arc::new(ProviderManager::new(ProviderManagerConfig::default()));
        providers.register(TestCarrier::new("only", false), 1).await;

        let limits = RateLimitConfig {
            otp_per_phone_per_day: 2,
            ..RateLimitConfig::default()
        };
        let service = service(providers, limits);

        for purpose in [OtpPurpose::Login, OtpPurpose::Registration] {
            service
                .send(SendOtpRequest::new("+14155550100", purpose).with_user("u-1"))
                .await
                .unwrap();
        }

        let third = service
            .send(SendOtpRequest::new("+14155550100", OtpPurpose::Transaction).with_user("u-2"))
            .await;
        assert!(matches!(third, Err(DomainError::RateLimited { limit: 2, .. })));

        // Cooldown is reported before any quota is spent
        let cooled = service
            .send(SendOtpRequest::new("+14155550100", OtpPurpose::Login).with_user("u-1"))
            .await;
        assert!(matches!(
            cooled,
            Err(DomainError::Otp(OtpError::ResendCooldown { .. }))
        ));
    }
}
