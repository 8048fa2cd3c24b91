//! Lotus - 水库远程监测与预警核心
//!
//! 无人值守水库的监控与告警子系统，支持：
//! - 遥测长连接接入与自动重连
//! - 阈值评估与严重程度分档
//! - 预警去重、确认与自动升级
//! - 多渠道通知调度（邮件 / 短信 / 推送）

pub mod channels;
pub mod config;
pub mod errors;
pub mod models;
pub mod repositories;
pub mod services;
pub mod telemetry;

pub use errors::AppError;
