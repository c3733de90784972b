//! Event system
//!
//! Typed event vocabulary and the in-process publish/subscribe bus.

pub mod bus;
pub mod types;

pub use bus::{EventBus, EventBusError, HandlerSubscription, HistoryFilter, Subscription};
pub use types::{Event, EventKind, EventMetadata, EventPattern, REGISTRY_SOURCE};
