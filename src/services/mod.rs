//! 业务逻辑层（Service）

pub mod evaluator;

mod dispatcher;
mod escalation;
mod monitor;
mod registry;
mod threshold_store;

pub use dispatcher::NotificationDispatcher;
pub use escalation::EscalationScheduler;
pub use monitor::Monitor;
pub use registry::{AlertDispatch, AlertRegistry};
pub use threshold_store::ThresholdStore;
