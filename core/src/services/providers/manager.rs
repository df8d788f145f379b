//! Provider failover manager
//!
//! Keeps a priority-ordered registry of carriers and routes each send through
//! the best healthy one, falling over to the next on failure.
//!
//! ## Health model
//!
//! - A failed send marks the carrier unhealthy immediately
//! - Only a successful probe from the health-check loop marks it healthy again
//! - Carriers with equal priority are tried in registration order

use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{timeout, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use sg_shared::config::ProvidersConfig;
use sg_shared::utils::phone::mask_phone_number;

use super::traits::CarrierAdapter;
use crate::domain::value_objects::{SendRequest, SendResponse};
use crate::errors::ProviderError;

/// Timing configuration for the provider manager
#[derive(Debug, Clone)]
pub struct ProviderManagerConfig {
    /// How often every carrier is probed
    pub health_check_interval: Duration,
    /// Deadline for a single probe
    pub health_check_timeout: Duration,
    /// Deadline for a single carrier send
    pub send_timeout: Duration,
}

impl Default for ProviderManagerConfig {
    fn default() -> Self {
        Self {
            health_check_interval: Duration::from_secs(30),
            health_check_timeout: Duration::from_secs(10),
            send_timeout: Duration::from_secs(15),
        }
    }
}

impl From<&ProvidersConfig> for ProviderManagerConfig {
    fn from(config: &ProvidersConfig) -> Self {
        Self {
            health_check_interval: Duration::from_secs(config.health_check_interval_seconds),
            health_check_timeout: Duration::from_secs(config.health_check_timeout_seconds),
            send_timeout: Duration::from_secs(config.send_timeout_seconds),
        }
    }
}

/// Registry slot for one carrier
struct CarrierEntry {
    name: String,
    adapter: Arc<dyn CarrierAdapter>,
    /// Lower is preferred
    priority: i32,
    healthy: bool,
    last_checked_at: Option<DateTime<Utc>>,
    /// Registration order, used as the tie-break between equal priorities
    seq: u64,
}

impl CarrierEntry {
    fn status(&self) -> ProviderStatus {
        ProviderStatus {
            name: self.name.clone(),
            priority: self.priority,
            healthy: self.healthy,
            last_checked_at: self.last_checked_at,
            max_message_length: self.adapter.max_message_length(),
            supports_scheduling: self.adapter.supports_scheduling(),
        }
    }
}

#[derive(Default)]
struct Registry {
    /// Always sorted by (priority, seq)
    entries: Vec<CarrierEntry>,
    next_seq: u64,
}

impl Registry {
    fn find_mut(&mut self, name: &str) -> Option<&mut CarrierEntry> {
        self.entries.iter_mut().find(|e| e.name == name)
    }

    fn sort(&mut self) {
        self.entries.sort_by_key(|e| (e.priority, e.seq));
    }
}

/// Point-in-time copy of a registry entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderStatus {
    pub name: String,
    pub priority: i32,
    pub healthy: bool,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub max_message_length: usize,
    pub supports_scheduling: bool,
}

/// Routes outbound SMS across registered carriers
pub struct ProviderManager {
    registry: RwLock<Registry>,
    config: ProviderManagerConfig,
    health_task: Mutex<Option<JoinHandle<()>>>,
}

impl ProviderManager {
    pub fn new(config: ProviderManagerConfig) -> Self {
        Self {
            registry: RwLock::new(Registry::default()),
            config,
            health_task: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &ProviderManagerConfig {
        &self.config
    }

    /// Register or replace a carrier
    ///
    /// Replacing keeps the original registration order and health flag; a new
    /// carrier starts out healthy.
    pub async fn register(&self, adapter: Arc<dyn CarrierAdapter>, priority: i32) {
        let name = adapter.name().to_string();
        let mut registry = self.registry.write().await;

        if let Some(entry) = registry.find_mut(&name) {
            entry.adapter = adapter;
            entry.priority = priority;
            info!(provider = %name, priority, "SMS provider re-registered");
        } else {
            let seq = registry.next_seq;
            registry.next_seq += 1;
            registry.entries.push(CarrierEntry {
                name: name.clone(),
                adapter,
                priority,
                healthy: true,
                last_checked_at: None,
                seq,
            });
            info!(provider = %name, priority, "SMS provider registered");
        }

        registry.sort();
    }

    /// Remove a carrier; returns whether it was registered
    pub async fn unregister(&self, name: &str) -> bool {
        let mut registry = self.registry.write().await;
        let before = registry.entries.len();
        registry.entries.retain(|e| e.name != name);
        let removed = registry.entries.len() != before;
        if removed {
            info!(provider = %name, "SMS provider unregistered");
        }
        removed
    }

    /// Look up a carrier by name, regardless of health
    pub async fn get(&self, name: &str) -> Result<Arc<dyn CarrierAdapter>, ProviderError> {
        let registry = self.registry.read().await;
        registry
            .entries
            .iter()
            .find(|e| e.name == name)
            .map(|e| Arc::clone(&e.adapter))
            .ok_or_else(|| ProviderError::ProviderNotFound {
                name: name.to_string(),
            })
    }

    /// Highest-priority healthy carrier
    pub async fn get_best(&self) -> Result<Arc<dyn CarrierAdapter>, ProviderError> {
        let registry = self.registry.read().await;
        registry
            .entries
            .iter()
            .find(|e| e.healthy)
            .map(|e| Arc::clone(&e.adapter))
            .ok_or(ProviderError::NoProvidersAvailable)
    }

    /// Send through the best healthy carrier, failing over down the priority list
    ///
    /// The candidate list is snapshotted once; carrier I/O happens outside the
    /// registry lock. Each carrier is tried at most once.
    pub async fn send(&self, request: &SendRequest) -> Result<SendResponse, ProviderError> {
        let candidates: Vec<(String, Arc<dyn CarrierAdapter>)> = {
            let registry = self.registry.read().await;
            registry
                .entries
                .iter()
                .filter(|e| e.healthy)
                .map(|e| (e.name.clone(), Arc::clone(&e.adapter)))
                .collect()
        };

        if candidates.is_empty() {
            warn!(event = "sms_no_providers", "No healthy SMS providers available");
            return Err(ProviderError::NoProvidersAvailable);
        }

        let mut last_error = None;

        for (name, adapter) in candidates {
            match self.send_with_deadline(&name, adapter.as_ref(), request).await {
                Ok(response) => {
                    info!(
                        event = "sms_sent",
                        provider = %name,
                        message_id = %response.message_id,
                        to = %mask_phone_number(&request.to),
                        "SMS sent"
                    );
                    return Ok(response);
                }
                Err(e) => {
                    warn!(
                        event = "sms_send_failed",
                        provider = %name,
                        to = %mask_phone_number(&request.to),
                        error = %e,
                        "SMS provider failed, trying next"
                    );
                    self.mark_unhealthy(&name).await;
                    last_error = Some(e);
                }
            }
        }

        let error = last_error.unwrap_or(ProviderError::NoProvidersAvailable);
        error!(event = "sms_failover_exhausted", error = %error, "All SMS providers failed");
        Err(error)
    }

    /// Send through one named carrier without failover or health bookkeeping
    pub async fn send_with_provider(
        &self,
        name: &str,
        request: &SendRequest,
    ) -> Result<SendResponse, ProviderError> {
        let adapter = self.get(name).await?;
        self.send_with_deadline(name, adapter.as_ref(), request).await
    }

    /// Carrier names in routing order
    pub async fn list_providers(&self) -> Vec<String> {
        let registry = self.registry.read().await;
        registry.entries.iter().map(|e| e.name.clone()).collect()
    }

    /// Snapshot of every registry entry in routing order
    pub async fn get_provider_status(&self) -> Vec<ProviderStatus> {
        let registry = self.registry.read().await;
        registry.entries.iter().map(CarrierEntry::status).collect()
    }

    /// Probe every carrier once and record the results
    ///
    /// This is the only path that can mark an unhealthy carrier healthy again.
    pub async fn check_all_providers(&self) {
        let snapshot: Vec<(String, Arc<dyn CarrierAdapter>)> = {
            let registry = self.registry.read().await;
            registry
                .entries
                .iter()
                .map(|e| (e.name.clone(), Arc::clone(&e.adapter)))
                .collect()
        };

        let probe_timeout = self.config.health_check_timeout;
        let mut probes = JoinSet::new();
        for (name, adapter) in snapshot {
            probes.spawn(async move {
                let healthy = timeout(probe_timeout, adapter.is_healthy())
                    .await
                    .unwrap_or(false);
                (name, healthy)
            });
        }

        let mut results = Vec::new();
        while let Some(joined) = probes.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(e) => error!(error = %e, "Health probe task failed"),
            }
        }

        let now = Utc::now();
        let mut registry = self.registry.write().await;
        for (name, healthy) in results {
            // The carrier may have been unregistered while probing
            if let Some(entry) = registry.find_mut(&name) {
                if entry.healthy != healthy {
                    if healthy {
                        info!(event = "provider_recovered", provider = %name, "SMS provider healthy again");
                    } else {
                        warn!(event = "provider_unhealthy", provider = %name, "SMS provider failed health check");
                    }
                }
                entry.healthy = healthy;
                entry.last_checked_at = Some(now);
            }
        }
        debug!(providers = registry.entries.len(), "Health check cycle complete");
    }

    /// Start the periodic health-check task if it is not already running
    ///
    /// The task holds a weak reference and stops once the manager is dropped.
    pub async fn start_health_checks(self: &Arc<Self>) {
        let mut task = self.health_task.lock().await;
        if task.as_ref().map(|h| !h.is_finished()).unwrap_or(false) {
            debug!("Health check task already running");
            return;
        }

        let manager: Weak<Self> = Arc::downgrade(self);
        let period = self.config.health_check_interval;

        *task = Some(tokio::spawn(async move {
            info!(interval_secs = period.as_secs(), "Provider health checks started");

            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                ticker.tick().await;
                match manager.upgrade() {
                    Some(manager) => manager.check_all_providers().await,
                    None => break,
                }
            }

            debug!("Provider manager dropped, health checks stopped");
        }));
    }

    /// Abort the health-check task
    pub async fn stop_health_checks(&self) {
        if let Some(handle) = self.health_task.lock().await.take() {
            handle.abort();
            info!("Provider health checks stopped");
        }
    }

    async fn send_with_deadline(
        &self,
        name: &str,
        adapter: &dyn CarrierAdapter,
        request: &SendRequest,
    ) -> Result<SendResponse, ProviderError> {
        let deadline = self.config.send_timeout;
        match timeout(deadline, adapter.send(request)).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout {
                provider: name.to_string(),
                seconds: deadline.as_secs(),
            }),
        }
    }

    async fn mark_unhealthy(&self, name: &str) {
        let mut registry = self.registry.write().await;
        if let Some(entry) = registry.find_mut(name) {
            if entry.healthy {
                entry.healthy = false;
                warn!(event = "provider_unhealthy", provider = %name, "SMS provider marked unhealthy");
            }
        }
    }
}
