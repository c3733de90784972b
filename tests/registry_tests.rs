//! Registry tests
//!
//! Registration, conflict handling, cycle rejection, discovery, and
//! tombstone behavior.

mod common;

use common::{descriptor, registry_with_config, test_registry};
use orchestron::config::RegistryConfig;
use orchestron::event::EventKind;
use orchestron::registry::{DiscoveryFilter, ModuleDescriptor, ModuleState, RegistryError};

#[tokio::test]
async fn test_register_and_discover_sorted_by_name() {
    let (_bus, registry) = test_registry();

    registry.register(descriptor("zeta", &[]), false).await.unwrap();
    registry.register(descriptor("alpha", &[]), false).await.unwrap();
    registry.register(descriptor("mid", &[]), false).await.unwrap();

    let records = registry.discover(&DiscoveryFilter::default()).await;
    let names: Vec<&str> = records.iter().map(|r| r.name()).collect();
    assert_eq!(names, vec!["alpha", "mid", "zeta"]);
}

#[tokio::test]
async fn test_duplicate_registration_conflict_leaves_state_unchanged() {
    let (_bus, registry) = test_registry();

    registry.register(descriptor("store", &[]), false).await.unwrap();
    let err = registry
        .register(ModuleDescriptor::new("store", "2.0.0"), false)
        .await
        .unwrap_err();
    match err {
        RegistryError::RegistrationConflict { name, existing } => {
            assert_eq!(name, "store");
            assert_eq!(existing, "1.0.0");
        }
        other => panic!("expected RegistrationConflict, got {other:?}"),
    }

    let record = registry.get_record("store").await.unwrap();
    assert_eq!(record.descriptor.version, "1.0.0");
}

#[tokio::test]
async fn test_replace_flag_upgrades_in_place() {
    let (_bus, registry) = test_registry();

    registry.register(descriptor("store", &[]), false).await.unwrap();
    let before = registry.get_record("store").await.unwrap();

    let outcome = registry
        .register(ModuleDescriptor::new("store", "2.0.0"), true)
        .await
        .unwrap();
    assert!(outcome.replaced);

    let after = registry.get_record("store").await.unwrap();
    assert_eq!(after.descriptor.version, "2.0.0");
    // The logical clock keeps advancing across the replacement.
    assert!(after.clock > before.clock);
}

#[tokio::test]
async fn test_cycle_closing_registration_rejected_atomically() {
    let (_bus, registry) = test_registry();

    registry.register(descriptor("a", &[]), false).await.unwrap();
    registry.register(descriptor("b", &["a"]), false).await.unwrap();
    registry.register(descriptor("c", &["b"]), false).await.unwrap();

    let order = registry.resolve_order().await.unwrap();
    assert_eq!(order.load_order, vec!["a", "b", "c"]);

    registry.register(descriptor("d", &["c"]), false).await.unwrap();

    // Redeclaring a with a dependency on d closes a → d → c → b → a.
    let err = registry
        .register(descriptor("a", &["d"]), true)
        .await
        .unwrap_err();
    match err {
        RegistryError::CyclicDependency { members } => {
            assert_eq!(members, vec!["a", "b", "c", "d"]);
        }
        other => panic!("expected CyclicDependency, got {other:?}"),
    }

    // The previous registry state is untouched.
    let record = registry.get_record("a").await.unwrap();
    assert!(record.descriptor.dependencies.is_empty());
    assert_eq!(registry.discover(&DiscoveryFilter::default()).await.len(), 4);
}

#[tokio::test]
async fn test_dependent_degraded_until_dependency_registers() {
    let (bus, registry) = test_registry();
    let mut events = bus.subscribe("module.*").await;

    let outcome = registry.register(descriptor("app", &["store"]), false).await.unwrap();
    assert_eq!(outcome.state, ModuleState::Degraded);

    let registered = events.next().await.unwrap();
    assert!(matches!(
        registered.kind,
        EventKind::ModuleRegistered { ref name, state: ModuleState::Degraded, .. } if name == "app"
    ));

    registry.register(descriptor("store", &[]), false).await.unwrap();

    let store_registered = events.next().await.unwrap();
    assert_eq!(store_registered.kind.name(), "module.registered");

    // Exactly one additional event reflects app's healed transition.
    let healed = events.next().await.unwrap();
    match healed.kind {
        EventKind::ModuleUpdated { ref name, state } => {
            assert_eq!(name, "app");
            assert_eq!(state, ModuleState::Ready);
        }
        other => panic!("expected ModuleUpdated, got {other:?}"),
    }
    assert!(events.try_next().is_none());

    assert_eq!(
        registry.get_record("app").await.unwrap().state,
        ModuleState::Ready
    );
}

#[tokio::test]
async fn test_unregister_unknown_module() {
    let (_bus, registry) = test_registry();
    let err = registry.unregister("ghost").await.unwrap_err();
    assert!(matches!(err, RegistryError::NotFound(_)));
}

#[tokio::test]
async fn test_unregister_leaves_tombstone_and_degrades_dependents() {
    let (bus, registry) = test_registry();

    registry.register(descriptor("store", &[]), false).await.unwrap();
    registry.register(descriptor("app", &["store"]), false).await.unwrap();

    let mut events = bus.subscribe("module.unregistered").await;
    registry.unregister("store").await.unwrap();
    assert_eq!(events.next().await.unwrap().kind.name(), "module.unregistered");

    // Tombstones are invisible to plain discovery but reachable by state.
    let visible = registry.discover(&DiscoveryFilter::default()).await;
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].name(), "app");
    assert_eq!(visible[0].state, ModuleState::Degraded);

    let tombstones = registry
        .discover(&DiscoveryFilter::default().with_state(ModuleState::Terminated))
        .await;
    assert_eq!(tombstones.len(), 1);
    assert_eq!(tombstones[0].name(), "store");
}

#[tokio::test]
async fn test_discovery_filters_are_anded() {
    let (_bus, registry) = test_registry();

    registry
        .register(
            ModuleDescriptor::new("store", "1.0.0")
                .with_capability("kv.read")
                .with_interface("store.api"),
            false,
        )
        .await
        .unwrap();
    registry
        .register(ModuleDescriptor::new("cache", "1.0.0").with_capability("kv.read"), false)
        .await
        .unwrap();

    let by_capability = registry
        .discover(&DiscoveryFilter::default().with_capability("kv.read"))
        .await;
    assert_eq!(by_capability.len(), 2);

    let both = registry
        .discover(
            &DiscoveryFilter::default()
                .with_capability("kv.read")
                .with_interface("store.api"),
        )
        .await;
    assert_eq!(both.len(), 1);
    assert_eq!(both[0].name(), "store");

    let ready_with_interface = registry
        .discover(
            &DiscoveryFilter::default()
                .with_interface("store.api")
                .with_state(ModuleState::Degraded),
        )
        .await;
    assert!(ready_with_interface.is_empty());
}

#[tokio::test]
async fn test_capability_vocabulary_enforced() {
    let config = RegistryConfig {
        capability_vocabulary: vec!["kv.read".to_string(), "kv.write".to_string()],
        ..RegistryConfig::default()
    };
    let (_bus, registry) = registry_with_config(config, "local");

    let err = registry
        .register(
            ModuleDescriptor::new("rogue", "1.0.0").with_capability("fs.raw"),
            false,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::InvalidDescriptor(_)));

    registry
        .register(
            ModuleDescriptor::new("store", "1.0.0").with_capability("kv.read"),
            false,
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_self_dependency_rejected() {
    let (_bus, registry) = test_registry();
    let err = registry
        .register(descriptor("narcissus", &["narcissus"]), false)
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::InvalidDescriptor(_)));
}

#[tokio::test]
async fn test_every_mutation_is_published_before_return() {
    let (bus, registry) = test_registry();
    let mut events = bus.subscribe("module.*").await;

    registry.register(descriptor("solo", &[]), false).await.unwrap();
    // The registration event is already enqueued by the time the call
    // returned.
    assert_eq!(
        events.try_next().expect("event enqueued").kind.name(),
        "module.registered"
    );

    registry.unregister("solo").await.unwrap();
    assert_eq!(
        events.try_next().expect("event enqueued").kind.name(),
        "module.unregistered"
    );
}
