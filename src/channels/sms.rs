//! 短信渠道
//!
//! 通过短信服务商的 HTTP API 发送，API 密钥从环境变量读取。

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;

use crate::channels::ChannelSender;
use crate::config::{Settings, SmsSettings};
use crate::errors::AppError;
use crate::models::{NotificationChannel, NotificationMessage};

/// 短信发送器
pub struct SmsSender {
    client: reqwest::Client,
    settings: SmsSettings,
    api_key: SecretString,
}

impl SmsSender {
    /// 创建短信发送器；短信网关未启用时返回配置错误
    pub fn new(settings: &Settings) -> Result<Self, AppError> {
        let sms_settings = settings.sms.clone();
        if !sms_settings.enabled {
            return Err(AppError::ConfigError("短信网关未启用".to_string()));
        }
        if sms_settings.api_url.is_empty() {
            return Err(AppError::ConfigError("短信网关地址未配置".to_string()));
        }

        let api_key = Settings::sms_api_key()
            .ok_or_else(|| AppError::ConfigError("SMS_API_KEY 未设置".to_string()))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(sms_settings.timeout_seconds))
            .build()
            .map_err(|e| AppError::ConfigError(format!("HTTP 客户端构建失败: {}", e)))?;

        Ok(Self {
            client,
            settings: sms_settings,
            api_key,
        })
    }
}

#[async_trait]
impl ChannelSender for SmsSender {
    fn channel(&self) -> NotificationChannel {
        NotificationChannel::Sms
    }

    async fn send(&self, recipient: &str, message: &NotificationMessage) -> Result<(), AppError> {
        // 短信正文受长度限制，标题加摘要即可
        let text = format!("{} {}", message.title, message.body);

        let payload = serde_json::json!({
            "to": recipient,
            "from": self.settings.sender,
            "text": text,
        });

        let response = self
            .client
            .post(&self.settings.api_url)
            .bearer_auth(self.api_key.expose_secret())
            .json(&payload)
            .send()
            .await
            .map_err(|e| AppError::DispatchError {
                channel: NotificationChannel::Sms,
                reason: format!("短信网关请求失败: {}", e),
            })?;

        if !response.status().is_success() {
            return Err(AppError::DispatchError {
                channel: NotificationChannel::Sms,
                reason: format!("短信网关响应异常: {}", response.status()),
            });
        }

        tracing::info!(
            alert_id = %message.alert_id,
            "预警短信已发送"
        );
        Ok(())
    }
}
