//! 邮件渠道
//!
//! 基于 SMTP 异步发送预警邮件。

use async_trait::async_trait;
use lettre::{
    transport::smtp::authentication::Credentials, AsyncSmtpTransport, AsyncTransport, Message,
    Tokio1Executor,
};
use secrecy::ExposeSecret;

use crate::channels::ChannelSender;
use crate::config::{Settings, SmtpSettings};
use crate::errors::AppError;
use crate::models::{NotificationChannel, NotificationMessage};

/// 邮件发送器
pub struct EmailSender {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    settings: SmtpSettings,
}

impl EmailSender {
    /// 创建邮件发送器；SMTP 未启用时返回配置错误
    pub fn new(settings: &Settings) -> Result<Self, AppError> {
        let smtp_settings = settings.smtp.clone();
        if !smtp_settings.enabled {
            return Err(AppError::ConfigError("SMTP 未启用".to_string()));
        }

        let password = Settings::smtp_password()
            .ok_or_else(|| AppError::ConfigError("SMTP_PASSWORD 未设置".to_string()))?;

        let creds = Credentials::new(
            smtp_settings.username.clone(),
            password.expose_secret().clone(),
        );

        let mailer = if smtp_settings.tls {
            // 隐式 TLS（465 端口）用 relay，其余走 STARTTLS（常见 587）
            if smtp_settings.port == 465 {
                AsyncSmtpTransport::<Tokio1Executor>::relay(&smtp_settings.host)
                    .map_err(|e| AppError::ConfigError(format!("SMTP 配置错误: {}", e)))?
                    .port(smtp_settings.port)
                    .credentials(creds)
                    .build()
            } else {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&smtp_settings.host)
                    .map_err(|e| AppError::ConfigError(format!("SMTP 配置错误: {}", e)))?
                    .port(smtp_settings.port)
                    .credentials(creds)
                    .build()
            }
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&smtp_settings.host)
                .port(smtp_settings.port)
                .credentials(creds)
                .build()
        };

        Ok(Self {
            mailer,
            settings: smtp_settings,
        })
    }
}

#[async_trait]
impl ChannelSender for EmailSender {
    fn channel(&self) -> NotificationChannel {
        NotificationChannel::Email
    }

    async fn send(&self, recipient: &str, message: &NotificationMessage) -> Result<(), AppError> {
        let from = format!("{} <{}>", self.settings.from_name, self.settings.from_email);

        let email = Message::builder()
            .from(from.parse().map_err(|e| AppError::DispatchError {
                channel: NotificationChannel::Email,
                reason: format!("发件人地址无效: {}", e),
            })?)
            .to(recipient.parse().map_err(|e| AppError::DispatchError {
                channel: NotificationChannel::Email,
                reason: format!("收件人地址无效: {}", e),
            })?)
            .subject(&message.title)
            .body(message.body.clone())
            .map_err(|e| AppError::DispatchError {
                channel: NotificationChannel::Email,
                reason: format!("邮件构建失败: {}", e),
            })?;

        self.mailer
            .send(email)
            .await
            .map_err(|e| AppError::DispatchError {
                channel: NotificationChannel::Email,
                reason: format!("SMTP 发送失败: {}", e),
            })?;

        tracing::info!(
            alert_id = %message.alert_id,
            "预警邮件已发送"
        );
        Ok(())
    }
}
