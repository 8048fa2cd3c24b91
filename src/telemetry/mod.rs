//! 遥测接入模块
//!
//! 链路（重连 + 分发）、退避策略、传输层与报文解析相互独立，
//! 传输机制可注入替换。

mod backoff;
mod link;
mod payload;
mod transport;

pub use backoff::BackoffPolicy;
pub use link::{LinkEvent, Subscription, TelemetryLink};
pub use payload::parse_reading;
pub use transport::{MqttTransport, TelemetryStream, TelemetryTransport};
