//! Web Push 渠道
//!
//! 基于 VAPID 签名推送。收件标识是 JSON 编码的浏览器订阅信息
//! （endpoint + p256dh + auth），由设置子系统写入。

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::Deserialize;
use web_push::{
    ContentEncoding, PartialVapidSignatureBuilder, SubscriptionInfo, VapidSignatureBuilder,
    WebPushClient, WebPushMessageBuilder, URL_SAFE_NO_PAD,
};

use crate::channels::ChannelSender;
use crate::config::Settings;
use crate::errors::AppError;
use crate::models::{NotificationChannel, NotificationMessage};

/// 浏览器推送订阅信息
#[derive(Debug, Deserialize)]
struct PushRecipient {
    endpoint: String,
    p256dh: String,
    auth: String,
}

/// Web Push 发送器
pub struct WebPushSender {
    client: WebPushClient,
    // 不含订阅信息的签名模板，每次发送克隆后补上订阅
    vapid: PartialVapidSignatureBuilder,
    subject: String,
}

impl WebPushSender {
    /// 创建推送发送器；VAPID 密钥缺失或无效时返回配置错误
    pub fn new(settings: &Settings) -> Result<Self, AppError> {
        if !settings.push.enabled {
            return Err(AppError::ConfigError("Web Push 未启用".to_string()));
        }

        let vapid_private_key = Settings::vapid_private_key()
            .ok_or_else(|| AppError::ConfigError("VAPID_PRIVATE_KEY 未设置".to_string()))?;

        // 启动时即校验密钥，发送阶段只做克隆
        let vapid = VapidSignatureBuilder::from_base64_no_sub(
            vapid_private_key.expose_secret(),
            URL_SAFE_NO_PAD,
        )
        .map_err(|e| AppError::ConfigError(format!("VAPID 私钥无效: {}", e)))?;

        let subject = format!("mailto:{}", settings.smtp.from_email);

        let client = WebPushClient::new()
            .map_err(|e| AppError::InternalError(format!("创建 WebPush 客户端失败: {}", e)))?;

        Ok(Self {
            client,
            vapid,
            subject,
        })
    }
}

#[async_trait]
impl ChannelSender for WebPushSender {
    fn channel(&self) -> NotificationChannel {
        NotificationChannel::Push
    }

    async fn send(&self, recipient: &str, message: &NotificationMessage) -> Result<(), AppError> {
        let recipient: PushRecipient =
            serde_json::from_str(recipient).map_err(|e| AppError::DispatchError {
                channel: NotificationChannel::Push,
                reason: format!("推送订阅信息无效: {}", e),
            })?;

        let subscription_info =
            SubscriptionInfo::new(recipient.endpoint, recipient.p256dh, recipient.auth);

        let payload = serde_json::json!({
            "title": message.title,
            "body": message.body,
            "data": {
                "alert_id": message.alert_id,
                "alert_type": message.alert_type,
                "severity": message.severity,
            },
            "timestamp": chrono::Utc::now().timestamp_millis(),
        });
        let payload_json = serde_json::to_string(&payload)
            .map_err(|e| AppError::InternalError(format!("序列化通知负载失败: {}", e)))?;

        let mut sig_builder = self.vapid.clone().add_sub_info(&subscription_info);
        sig_builder.add_claim("sub", self.subject.as_str());
        let signature = sig_builder.build().map_err(|e| AppError::DispatchError {
            channel: NotificationChannel::Push,
            reason: format!("构建 VAPID 签名失败: {}", e),
        })?;

        let mut message_builder =
            WebPushMessageBuilder::new(&subscription_info).map_err(|e| AppError::DispatchError {
                channel: NotificationChannel::Push,
                reason: format!("构建推送消息失败: {}", e),
            })?;
        message_builder.set_payload(ContentEncoding::Aes128Gcm, payload_json.as_bytes());
        message_builder.set_vapid_signature(signature);

        let push_message = message_builder.build().map_err(|e| AppError::DispatchError {
            channel: NotificationChannel::Push,
            reason: format!("构建推送消息失败: {}", e),
        })?;

        self.client
            .send(push_message)
            .await
            .map_err(|e| AppError::DispatchError {
                channel: NotificationChannel::Push,
                reason: format!("推送发送失败: {}", e),
            })?;

        tracing::info!(
            alert_id = %message.alert_id,
            "预警推送已发送"
        );
        Ok(())
    }
}
