//! Health monitoring
//!
//! Periodically folds per-instance health reports into a per-module
//! aggregate and a system-wide status weighted by declared criticality.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::config::HealthConfig;
use crate::event::bus::EventBus;
use crate::event::types::{Event, EventKind, REGISTRY_SOURCE};
use crate::registry::store::ModuleRegistry;
use crate::registry::types::{Criticality, ModuleRecord, ModuleState};
use crate::utils::tasks::join_settled;
use crate::utils::time::current_timestamp;

/// Aggregate health status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    /// Operating normally
    Healthy,
    /// Functional but impaired
    Degraded,
    /// Not functioning correctly
    Unhealthy,
    /// Not responding
    Down,
}

impl HealthStatus {
    fn severity(self) -> u8 {
        match self {
            HealthStatus::Healthy => 0,
            HealthStatus::Degraded => 1,
            HealthStatus::Unhealthy => 2,
            HealthStatus::Down => 3,
        }
    }

    /// The worse of two statuses
    pub fn worst(self, other: HealthStatus) -> HealthStatus {
        if other.severity() > self.severity() {
            other
        } else {
            self
        }
    }
}

/// Health of a single module in the system report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    /// Module name
    pub module: String,
    /// Folded status
    pub status: HealthStatus,
    /// Optional detail message
    pub message: Option<String>,
    /// Timestamp of this check
    pub last_check: u64,
}

/// System-wide health report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    /// Worst-of across modules, weighted by criticality
    pub overall_status: HealthStatus,
    /// Per-module detail
    pub components: Vec<ComponentHealth>,
    /// Report generation timestamp
    pub timestamp: u64,
    /// Monitor uptime in seconds
    pub uptime_seconds: u64,
}

impl Default for HealthReport {
    fn default() -> Self {
        Self {
            overall_status: HealthStatus::Healthy,
            components: Vec::new(),
            timestamp: current_timestamp(),
            uptime_seconds: 0,
        }
    }
}

impl HealthReport {
    /// JSON payload for read-only health endpoints
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Failed per-module health check
#[derive(Debug)]
struct CheckFailure {
    module: String,
    reason: String,
}

/// Periodic health monitor
pub struct HealthMonitor {
    registry: Arc<ModuleRegistry>,
    bus: Arc<EventBus>,
    interval: Duration,
    check_timeout: Duration,
    start_time: Instant,
}

impl HealthMonitor {
    /// Create a monitor over the given registry and bus
    pub fn new(registry: Arc<ModuleRegistry>, bus: Arc<EventBus>, config: &HealthConfig) -> Self {
        Self {
            registry,
            bus,
            interval: Duration::from_millis(config.sample_interval_ms),
            check_timeout: Duration::from_millis(config.check_timeout_ms),
            start_time: Instant::now(),
        }
    }

    /// Drive the sampling loop until the task is aborted
    pub async fn run(self) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last_overall = None;
        loop {
            interval.tick().await;
            self.sample_once(&mut last_overall).await;
        }
    }

    /// Run one sampling pass and fold the results into the registry
    ///
    /// Per-module checks run as a concurrent task group; a check that fails
    /// or times out surfaces as an `Unhealthy` component rather than
    /// aborting the pass.
    pub async fn sample_once(&self, last_overall: &mut Option<HealthStatus>) -> HealthReport {
        let records = self.registry.snapshot().await;
        let now = current_timestamp();

        let checks: Vec<_> = records
            .iter()
            .filter(|r| !r.is_tombstone())
            .map(|record| {
                let record = record.clone();
                let name = record.name().to_string();
                let timeout = self.check_timeout;
                async move {
                    match tokio::time::timeout(timeout, Self::check_module(record)).await {
                        Ok(component) => component,
                        Err(_) => Err(CheckFailure {
                            module: name,
                            reason: "health check timed out".to_string(),
                        }),
                    }
                }
            })
            .collect();

        let outcome = join_settled(checks).await;
        let mut components = outcome.succeeded;
        for failure in outcome.failed {
            warn!(module = %failure.module, reason = %failure.reason, "health check failed");
            components.push(ComponentHealth {
                module: failure.module,
                status: HealthStatus::Unhealthy,
                message: Some(failure.reason),
                last_check: now,
            });
        }
        components.sort_by(|a, b| a.module.cmp(&b.module));

        let overall = Self::fold_overall(&records, &components);
        let report = HealthReport {
            overall_status: overall,
            components: components.clone(),
            timestamp: now,
            uptime_seconds: self.start_time.elapsed().as_secs(),
        };

        let statuses: Vec<(String, HealthStatus)> = components
            .iter()
            .map(|c| (c.module.clone(), c.status))
            .collect();
        self.registry.apply_health_fold(&statuses, report.clone()).await;

        if last_overall.as_ref() != Some(&overall) {
            debug!(?overall, "system health changed");
            *last_overall = Some(overall);
            let event = Event::local(REGISTRY_SOURCE, EventKind::HealthChanged { status: overall });
            if let Err(e) = self.bus.publish(event).await {
                warn!("failed to publish health change: {e}");
            }
        }

        report
    }

    /// Fold one module's instance reports into a component entry
    async fn check_module(record: ModuleRecord) -> Result<ComponentHealth, CheckFailure> {
        let now = current_timestamp();
        let status = match record.instances_healthy() {
            Some(true) => HealthStatus::Healthy,
            Some(false) => HealthStatus::Degraded,
            // No instance has reported yet: derive from lifecycle state.
            None => match record.state {
                ModuleState::Ready => HealthStatus::Healthy,
                _ => HealthStatus::Degraded,
            },
        };
        let message = if record.instances.is_empty() {
            None
        } else {
            let healthy = record.instances.values().filter(|i| i.healthy).count();
            Some(format!(
                "instances: {}/{} healthy",
                healthy,
                record.instances.len()
            ))
        };
        Ok(ComponentHealth {
            module: record.name().to_string(),
            status,
            message,
            last_check: now,
        })
    }

    /// Worst-of fold across components, weighted by criticality
    ///
    /// A degraded high-criticality module escalates to `Unhealthy`; a
    /// degraded low-criticality module never pushes the system past
    /// `Degraded`.
    fn fold_overall(records: &[ModuleRecord], components: &[ComponentHealth]) -> HealthStatus {
        let mut overall = HealthStatus::Healthy;
        for component in components {
            let criticality = records
                .iter()
                .find(|r| r.name() == component.module)
                .map(|r| r.descriptor.criticality)
                .unwrap_or(Criticality::Normal);
            let weighted = match (component.status, criticality) {
                (HealthStatus::Degraded, Criticality::High) => HealthStatus::Unhealthy,
                (HealthStatus::Unhealthy, Criticality::Low) => HealthStatus::Degraded,
                (status, _) => status,
            };
            overall = overall.worst(weighted);
        }
        overall
    }
}
