pub mod notifications;
pub mod throttle;

pub use notifications::{NotificationPipeline, PipelineStats};
pub use throttle::ThrottleGate;
