//! Health monitoring and autoscaling

pub mod monitor;
pub mod scaler;

pub use monitor::{ComponentHealth, HealthMonitor, HealthReport, HealthStatus};
pub use scaler::{AutoScaler, ScalingDecision, ScalingPolicy};
