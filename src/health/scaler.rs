//! Autoscaling control loop
//!
//! Consumes per-module metric windows and emits scaling decisions through a
//! hysteresis loop: a decision requires every sample in the window to cross
//! the threshold, and each decision starts a cooldown during which the
//! module is left alone. Provisioning itself is delegated to an external
//! orchestrator; failures come back as `scaling.action_failed` events.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::ScalingConfig;
use crate::event::bus::EventBus;
use crate::event::types::{Event, EventKind};
use crate::registry::store::ModuleRegistry;

/// Per-module autoscaling policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalingPolicy {
    /// Floor on desired instances
    #[serde(default = "default_min_instances")]
    pub min_instances: u32,
    /// Ceiling on desired instances
    #[serde(default = "default_max_instances")]
    pub max_instances: u32,
    /// Every sample in the window must exceed this to scale up
    #[serde(default = "default_scale_up_threshold")]
    pub scale_up_threshold: f64,
    /// Every sample in the window must fall below this to scale down
    #[serde(default = "default_scale_down_threshold")]
    pub scale_down_threshold: f64,
    /// Window length, and the length of the post-decision cooldown in ticks
    #[serde(default = "default_cooldown_samples")]
    pub cooldown_samples: usize,
}

fn default_min_instances() -> u32 {
    1
}

fn default_max_instances() -> u32 {
    8
}

fn default_scale_up_threshold() -> f64 {
    80.0
}

fn default_scale_down_threshold() -> f64 {
    20.0
}

fn default_cooldown_samples() -> usize {
    3
}

impl Default for ScalingPolicy {
    fn default() -> Self {
        Self {
            min_instances: default_min_instances(),
            max_instances: default_max_instances(),
            scale_up_threshold: default_scale_up_threshold(),
            scale_down_threshold: default_scale_down_threshold(),
            cooldown_samples: default_cooldown_samples(),
        }
    }
}

/// One emitted scaling decision
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScalingDecision {
    pub module: String,
    pub scale_up: bool,
    pub delta: u32,
}

/// Periodic autoscaler
///
/// Owned by a single task; cooldown bookkeeping lives behind `&mut self`,
/// so overlapping ticks cannot double-emit a decision for one module.
pub struct AutoScaler {
    registry: Arc<ModuleRegistry>,
    bus: Arc<EventBus>,
    interval: Duration,
    cooldowns: HashMap<String, u32>,
}

impl AutoScaler {
    /// Create an autoscaler over the given registry and bus
    pub fn new(registry: Arc<ModuleRegistry>, bus: Arc<EventBus>, config: &ScalingConfig) -> Self {
        Self {
            registry,
            bus,
            interval: Duration::from_millis(config.tick_interval_ms),
            cooldowns: HashMap::new(),
        }
    }

    /// Drive the control loop until the task is aborted
    pub async fn run(mut self) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            self.tick().await;
        }
    }

    /// Run one control-loop tick over every module with a scaling policy
    pub async fn tick(&mut self) -> Vec<ScalingDecision> {
        let records = self.registry.snapshot().await;
        let mut decisions = Vec::new();

        for record in records.iter().filter(|r| !r.is_tombstone()) {
            let Some(policy) = record.descriptor.scaling.clone() else {
                continue;
            };
            let name = record.name().to_string();

            if let Some(remaining) = self.cooldowns.get_mut(&name) {
                if *remaining > 0 {
                    *remaining -= 1;
                    debug!(module = %name, remaining = *remaining, "in scaling cooldown");
                    continue;
                }
            }

            if record.metrics.len() < policy.cooldown_samples {
                continue;
            }
            let window: Vec<f64> = record
                .metrics
                .iter()
                .rev()
                .take(policy.cooldown_samples)
                .map(|s| s.value)
                .collect();

            let decision = if window.iter().all(|v| *v > policy.scale_up_threshold)
                && record.desired_instances < policy.max_instances
            {
                Some(true)
            } else if window.iter().all(|v| *v < policy.scale_down_threshold)
                && record.desired_instances > policy.min_instances
            {
                Some(false)
            } else {
                None
            };

            let Some(scale_up) = decision else {
                continue;
            };

            let delta = 1u32;
            let adjusted = if scale_up {
                self.registry.adjust_desired_instances(&name, delta as i64).await
            } else {
                self.registry.adjust_desired_instances(&name, -(delta as i64)).await
            };
            if let Err(e) = adjusted {
                warn!(module = %name, "failed to adjust desired instances: {e}");
                continue;
            }

            let kind = if scale_up {
                EventKind::ScaleUp {
                    module: name.clone(),
                    delta,
                }
            } else {
                EventKind::ScaleDown {
                    module: name.clone(),
                    delta,
                }
            };
            info!(module = %name, scale_up, "scaling decision");
            if let Err(e) = self.bus.publish(Event::local(name.clone(), kind)).await {
                warn!(module = %name, "failed to publish scaling decision: {e}");
            }

            self.cooldowns
                .insert(name.clone(), policy.cooldown_samples as u32);
            decisions.push(ScalingDecision {
                module: name,
                scale_up,
                delta,
            });
        }

        decisions
    }

    /// Record a provisioning failure reported by the external orchestrator
    ///
    /// The failure is observable but not retried here; retry policy belongs
    /// to the orchestrator that owns the infrastructure operation.
    pub async fn record_action_failure(&self, module: &str, reason: &str) {
        publish_action_failure(&self.bus, module, reason).await;
    }
}

/// Publish a `scaling.action_failed` event on behalf of the external
/// orchestrator's failure callback
pub async fn publish_action_failure(bus: &EventBus, module: &str, reason: &str) {
    warn!(module, reason, "scaling action failed");
    let event = Event::local(
        module.to_string(),
        EventKind::ScalingActionFailed {
            module: module.to_string(),
            reason: reason.to_string(),
        },
    );
    if let Err(e) = bus.publish(event).await {
        warn!(module, "failed to publish scaling action failure: {e}");
    }
}
