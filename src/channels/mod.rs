//! 通知渠道模块
//!
//! 每个渠道实现同一个发送契约；具体网关（SMTP、短信服务商、
//! 推送服务）均为外部协作方。发送失败只影响本渠道。

mod email;
mod push;
mod sms;

use async_trait::async_trait;

use crate::errors::AppError;
use crate::models::{NotificationChannel, NotificationMessage};

/// 渠道发送契约
#[async_trait]
pub trait ChannelSender: Send + Sync {
    /// 本实现对应的渠道
    fn channel(&self) -> NotificationChannel;

    /// 发送一条通知
    async fn send(&self, recipient: &str, message: &NotificationMessage) -> Result<(), AppError>;
}

pub use email::EmailSender;
pub use push::WebPushSender;
pub use sms::SmsSender;
