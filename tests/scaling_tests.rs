//! Autoscaler tests
//!
//! Hysteresis behavior: full-window thresholds, spike rejection, and
//! post-decision cooldown.

mod common;

use common::test_registry;
use std::sync::Arc;

use orchestron::config::ScalingConfig;
use orchestron::event::EventKind;
use orchestron::health::{AutoScaler, ScalingPolicy};
use orchestron::registry::ModuleDescriptor;

fn policy() -> ScalingPolicy {
    ScalingPolicy {
        min_instances: 1,
        max_instances: 5,
        scale_up_threshold: 80.0,
        scale_down_threshold: 20.0,
        cooldown_samples: 3,
    }
}

fn scaler_for(
    registry: &Arc<orchestron::registry::ModuleRegistry>,
    bus: &Arc<orchestron::event::EventBus>,
) -> AutoScaler {
    AutoScaler::new(
        Arc::clone(registry),
        Arc::clone(bus),
        &ScalingConfig { tick_interval_ms: 10 },
    )
}

#[tokio::test]
async fn test_sustained_load_triggers_single_scale_up() {
    let (bus, registry) = test_registry();
    registry
        .register(ModuleDescriptor::new("api", "1.0.0").with_scaling(policy()), false)
        .await
        .unwrap();

    let mut events = bus.subscribe("scaling.*").await;
    for value in [85.0, 90.0, 88.0] {
        registry.record_metric("api", value).await.unwrap();
    }

    let mut scaler = scaler_for(&registry, &bus);
    let decisions = scaler.tick().await;

    assert_eq!(decisions.len(), 1);
    assert!(decisions[0].scale_up);
    assert_eq!(decisions[0].module, "api");
    assert_eq!(
        registry.get_record("api").await.unwrap().desired_instances,
        2
    );

    let event = events.next().await.unwrap();
    assert!(matches!(
        event.kind,
        EventKind::ScaleUp { ref module, delta: 1 } if module == "api"
    ));
}

#[tokio::test]
async fn test_transient_spike_is_ignored() {
    let (bus, registry) = test_registry();
    registry
        .register(ModuleDescriptor::new("api", "1.0.0").with_scaling(policy()), false)
        .await
        .unwrap();

    for value in [50.0, 95.0, 60.0] {
        registry.record_metric("api", value).await.unwrap();
    }

    let mut scaler = scaler_for(&registry, &bus);
    assert!(scaler.tick().await.is_empty());
}

#[tokio::test]
async fn test_cooldown_suppresses_consecutive_decisions() {
    let (bus, registry) = test_registry();
    registry
        .register(ModuleDescriptor::new("api", "1.0.0").with_scaling(policy()), false)
        .await
        .unwrap();

    for value in [85.0, 90.0, 88.0] {
        registry.record_metric("api", value).await.unwrap();
    }

    let mut scaler = scaler_for(&registry, &bus);
    assert_eq!(scaler.tick().await.len(), 1);

    // Load stays high, but the module is cooling down.
    for _ in 0..3 {
        registry.record_metric("api", 95.0).await.unwrap();
        assert!(scaler.tick().await.is_empty());
    }

    // Cooldown elapsed; the still-saturated window allows another decision.
    let decisions = scaler.tick().await;
    assert_eq!(decisions.len(), 1);
    assert_eq!(
        registry.get_record("api").await.unwrap().desired_instances,
        3
    );
}

#[tokio::test]
async fn test_scale_down_requires_full_window_below_threshold() {
    let (bus, registry) = test_registry();
    registry
        .register(ModuleDescriptor::new("api", "1.0.0").with_scaling(policy()), false)
        .await
        .unwrap();
    registry.adjust_desired_instances("api", 2).await.unwrap();

    for value in [10.0, 25.0, 5.0] {
        registry.record_metric("api", value).await.unwrap();
    }
    let mut scaler = scaler_for(&registry, &bus);
    assert!(scaler.tick().await.is_empty());

    registry.record_metric("api", 5.0).await.unwrap();
    registry.record_metric("api", 3.0).await.unwrap();
    let decisions = scaler.tick().await;
    assert_eq!(decisions.len(), 1);
    assert!(!decisions[0].scale_up);
    assert_eq!(
        registry.get_record("api").await.unwrap().desired_instances,
        2
    );
}

#[tokio::test]
async fn test_scale_down_never_drops_below_minimum() {
    let (bus, registry) = test_registry();
    registry
        .register(ModuleDescriptor::new("api", "1.0.0").with_scaling(policy()), false)
        .await
        .unwrap();

    for value in [1.0, 2.0, 1.0] {
        registry.record_metric("api", value).await.unwrap();
    }

    let mut scaler = scaler_for(&registry, &bus);
    // desired_instances started at min_instances, so no decision fires.
    assert!(scaler.tick().await.is_empty());
    assert_eq!(
        registry.get_record("api").await.unwrap().desired_instances,
        1
    );
}

#[tokio::test]
async fn test_action_failure_is_recorded_not_retried() {
    let (bus, registry) = test_registry();
    let mut events = bus.subscribe("scaling.action_failed").await;

    let scaler = scaler_for(&registry, &bus);
    scaler.record_action_failure("api", "quota exceeded").await;

    let event = events.next().await.unwrap();
    assert!(matches!(
        event.kind,
        EventKind::ScalingActionFailed { ref module, ref reason }
            if module == "api" && reason == "quota exceeded"
    ));
}
