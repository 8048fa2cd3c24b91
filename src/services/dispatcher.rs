//! 通知调度服务
//!
//! 根据通知设置决定各渠道是否发送、何时发送：
//! - 渠道未启用或预警类型不在关注列表内则跳过（推送渠道另有
//!   critical_only 过滤）
//! - immediate 立即发送；hourly/daily 进入按 (收件人, 渠道) 聚合的
//!   摘要队列，由外部周期任务触发 flush
//! - 单渠道发送有独立超时，失败只记日志，绝不阻塞其他渠道或
//!   评估管线
//! - 开启自动升级时向升级调度器登记

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::channels::ChannelSender;
use crate::errors::AppError;
use crate::models::{
    AlertSeverity, ChannelSettings, NotificationChannel, NotificationFrequency,
    NotificationMessage, NotificationSettings, TechnicalAlert,
};
use crate::repositories::NotificationSettingsRepository;
use crate::services::escalation::EscalationScheduler;
use crate::services::registry::AlertDispatch;

/// 单渠道发送超时，超时即放弃并记为失败
const SEND_TIMEOUT: Duration = Duration::from_secs(5);

type DigestKey = (NotificationChannel, String);

/// 通知调度器
pub struct NotificationDispatcher {
    settings_repo: Arc<dyn NotificationSettingsRepository>,
    senders: Vec<Arc<dyn ChannelSender>>,
    escalation: Arc<EscalationScheduler>,
    // 摘要队列：(渠道, 收件人) → 待发消息
    digests: Mutex<HashMap<DigestKey, DigestQueue>>,
}

struct DigestQueue {
    frequency: NotificationFrequency,
    messages: Vec<NotificationMessage>,
}

impl NotificationDispatcher {
    pub fn new(
        settings_repo: Arc<dyn NotificationSettingsRepository>,
        senders: Vec<Arc<dyn ChannelSender>>,
        escalation: Arc<EscalationScheduler>,
    ) -> Self {
        Self {
            settings_repo,
            senders,
            escalation,
            digests: Mutex::new(HashMap::new()),
        }
    }

    /// 调度一条预警的通知
    pub async fn dispatch(&self, alert: &TechnicalAlert) -> Result<(), AppError> {
        let settings = self.settings_repo.get().await?;
        let message = NotificationMessage::from_alert(alert);
        let quiet = is_in_quiet_hours(&settings);

        let mut immediate = Vec::new();
        for sender in &self.senders {
            let channel = sender.channel();
            let channel_settings = settings.channel(channel);
            if !self.channel_accepts(channel, channel_settings, alert) {
                continue;
            }

            match channel_settings.frequency {
                NotificationFrequency::Immediate => {
                    // 安静时段抑制非 Critical 的即时通知
                    if quiet && alert.severity != AlertSeverity::Critical {
                        debug!(
                            channel = ?channel,
                            alert_id = %alert.id,
                            "安静时段，即时通知已抑制"
                        );
                        continue;
                    }
                    immediate.push((sender.clone(), channel_settings.recipient.clone()));
                }
                frequency => {
                    self.enqueue_digest(
                        channel,
                        channel_settings.recipient.clone(),
                        frequency,
                        message.clone(),
                    );
                }
            }
        }

        // 各渠道并发发送，互不阻塞
        let sends = immediate.into_iter().map(|(sender, recipient)| {
            let message = message.clone();
            async move { send_with_timeout(sender.as_ref(), &recipient, &message).await }
        });
        futures::future::join_all(sends).await;

        // 自动升级登记
        if settings.auto_escalation {
            self.escalation
                .register(alert.id, settings.escalation_delay_minutes);
        }

        Ok(())
    }

    /// 渠道启用且关注该预警类型（推送另查 critical_only）
    fn channel_accepts(
        &self,
        channel: NotificationChannel,
        channel_settings: &ChannelSettings,
        alert: &TechnicalAlert,
    ) -> bool {
        if !channel_settings.enabled {
            return false;
        }
        if !channel_settings.alert_types.contains(&alert.alert_type) {
            debug!(
                channel = ?channel,
                alert_type = ?alert.alert_type,
                "预警类型不在渠道关注列表，跳过"
            );
            return false;
        }
        if channel == NotificationChannel::Push
            && channel_settings.critical_only
            && alert.severity != AlertSeverity::Critical
        {
            return false;
        }
        true
    }

    fn enqueue_digest(
        &self,
        channel: NotificationChannel,
        recipient: String,
        frequency: NotificationFrequency,
        message: NotificationMessage,
    ) {
        let mut digests = self.digests.lock().expect("摘要队列锁中毒");
        let queue = digests
            .entry((channel, recipient))
            .or_insert_with(|| DigestQueue {
                frequency,
                messages: Vec::new(),
            });
        queue.frequency = frequency;
        queue.messages.push(message);
    }

    /// 发送并清空指定频率的摘要队列（由周期任务调用）
    pub async fn flush_digests(&self, frequency: NotificationFrequency) {
        let due: Vec<(DigestKey, Vec<NotificationMessage>)> = {
            let mut digests = self.digests.lock().expect("摘要队列锁中毒");
            let keys: Vec<DigestKey> = digests
                .iter()
                .filter(|(_, q)| q.frequency == frequency && !q.messages.is_empty())
                .map(|(k, _)| k.clone())
                .collect();
            keys.into_iter()
                .filter_map(|k| digests.remove(&k).map(|q| (k, q.messages)))
                .collect()
        };

        for ((channel, recipient), messages) in due {
            let Some(sender) = self.sender_for(channel) else {
                warn!(channel = ?channel, "摘要队列存在但渠道发送器缺失");
                continue;
            };
            let digest = build_digest(&messages);
            send_with_timeout(sender.as_ref(), &recipient, &digest).await;
            info!(
                channel = ?channel,
                count = messages.len(),
                "摘要通知已处理"
            );
        }
    }

    fn sender_for(&self, channel: NotificationChannel) -> Option<Arc<dyn ChannelSender>> {
        self.senders
            .iter()
            .find(|s| s.channel() == channel)
            .cloned()
    }
}

#[async_trait]
impl AlertDispatch for NotificationDispatcher {
    async fn dispatch_alert(&self, alert: TechnicalAlert) {
        if let Err(e) = self.dispatch(&alert).await {
            // 通知失败不回传管线；已持久化的预警仍可查询
            error!(alert_id = %alert.id, error = %e, "通知调度失败");
        }
    }
}

/// 带超时发送；失败与超时都只记日志
async fn send_with_timeout(
    sender: &dyn ChannelSender,
    recipient: &str,
    message: &NotificationMessage,
) {
    match tokio::time::timeout(SEND_TIMEOUT, sender.send(recipient, message)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            error!(channel = ?sender.channel(), error = %e, "渠道发送失败");
        }
        Err(_) => {
            error!(
                channel = ?sender.channel(),
                timeout_secs = SEND_TIMEOUT.as_secs(),
                "渠道发送超时，已放弃"
            );
        }
    }
}

/// 把多条消息合并为一条摘要
fn build_digest(messages: &[NotificationMessage]) -> NotificationMessage {
    let top_severity = messages
        .iter()
        .map(|m| m.severity)
        .max()
        .unwrap_or(AlertSeverity::Low);
    let body = messages
        .iter()
        .map(|m| format!("- {} {}", m.title, m.body))
        .collect::<Vec<_>>()
        .join("\n");
    NotificationMessage {
        alert_id: messages[0].alert_id,
        title: format!("预警摘要（{} 条）", messages.len()),
        body,
        severity: top_severity,
        alert_type: messages[0].alert_type,
    }
}

/// 判断当前是否处于安静时段（跨午夜时段取并集）
fn is_in_quiet_hours(settings: &NotificationSettings) -> bool {
    let (start, end) = match (settings.quiet_hours_start, settings.quiet_hours_end) {
        (Some(s), Some(e)) => (s, e),
        _ => return false,
    };

    let tz: chrono_tz::Tz = settings
        .quiet_hours_timezone
        .parse()
        .unwrap_or(chrono_tz::UTC);
    let now = Utc::now().with_timezone(&tz).time();

    if start < end {
        now >= start && now < end
    } else {
        now >= start || now < end
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AlertDetails, AlertType};
    use crate::repositories::{
        AlertRepository, MemoryAlertRepository, MemoryNotificationSettingsRepository,
    };
    use chrono::{Duration as ChronoDuration, NaiveTime};
    use std::collections::HashSet;
    use uuid::Uuid;

    /// 记录发送调用的间谍渠道
    struct SpySender {
        target: NotificationChannel,
        calls: Mutex<Vec<(String, NotificationMessage)>>,
        fail: bool,
    }

    impl SpySender {
        fn new(target: NotificationChannel) -> Arc<Self> {
            Arc::new(Self {
                target,
                calls: Mutex::new(Vec::new()),
                fail: false,
            })
        }

        fn failing(target: NotificationChannel) -> Arc<Self> {
            Arc::new(Self {
                target,
                calls: Mutex::new(Vec::new()),
                fail: true,
            })
        }

        fn count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ChannelSender for SpySender {
        fn channel(&self) -> NotificationChannel {
            self.target
        }

        async fn send(
            &self,
            recipient: &str,
            message: &NotificationMessage,
        ) -> Result<(), AppError> {
            self.calls
                .lock()
                .unwrap()
                .push((recipient.to_string(), message.clone()));
            if self.fail {
                return Err(AppError::DispatchError {
                    channel: self.target,
                    reason: "网关不可用".to_string(),
                });
            }
            Ok(())
        }
    }

    fn all_types() -> HashSet<AlertType> {
        [
            AlertType::LowWaterLevel,
            AlertType::LowBattery,
            AlertType::WeakSignal,
            AlertType::LowAccuracy,
            AlertType::SensorFailed,
            AlertType::MaintenanceNeeded,
            AlertType::CalibrationDue,
        ]
        .into_iter()
        .collect()
    }

    fn enabled_channel(recipient: &str) -> ChannelSettings {
        ChannelSettings {
            enabled: true,
            recipient: recipient.to_string(),
            alert_types: all_types(),
            frequency: NotificationFrequency::Immediate,
            critical_only: false,
        }
    }

    fn alert(severity: AlertSeverity, alert_type: AlertType) -> TechnicalAlert {
        TechnicalAlert {
            id: Uuid::new_v4(),
            sensor_id: Uuid::new_v4(),
            site_id: Uuid::new_v4(),
            alert_type,
            severity,
            message: "测试预警".to_string(),
            details: AlertDetails {
                sensor_name: "S1".to_string(),
                site_name: "A 站".to_string(),
                current_value: 15.0,
                threshold: 20.0,
                unit: "%".to_string(),
            },
            is_read: false,
            created_at: Utc::now(),
            escalated_at: None,
        }
    }

    fn dispatcher_with(
        settings: NotificationSettings,
        senders: Vec<Arc<dyn ChannelSender>>,
    ) -> (NotificationDispatcher, Arc<EscalationScheduler>, Arc<MemoryAlertRepository>) {
        let alert_repo = Arc::new(MemoryAlertRepository::new());
        let scheduler = Arc::new(EscalationScheduler::new(alert_repo.clone()));
        let dispatcher = NotificationDispatcher::new(
            Arc::new(MemoryNotificationSettingsRepository::new(settings)),
            senders,
            scheduler.clone(),
        );
        (dispatcher, scheduler, alert_repo)
    }

    #[tokio::test]
    async fn test_disabled_channel_never_receives_send() {
        let email = SpySender::new(NotificationChannel::Email);
        let sms = SpySender::new(NotificationChannel::Sms);
        let settings = NotificationSettings {
            email: enabled_channel("op@example.com"),
            sms: ChannelSettings::disabled(),
            ..Default::default()
        };
        let (dispatcher, _, _) =
            dispatcher_with(settings, vec![email.clone(), sms.clone()]);

        dispatcher
            .dispatch(&alert(AlertSeverity::High, AlertType::LowWaterLevel))
            .await
            .unwrap();

        assert_eq!(email.count(), 1);
        assert_eq!(sms.count(), 0);
    }

    #[tokio::test]
    async fn test_alert_type_filter_skips_channel() {
        let email = SpySender::new(NotificationChannel::Email);
        let mut email_settings = enabled_channel("op@example.com");
        email_settings.alert_types = [AlertType::SensorFailed].into_iter().collect();
        let settings = NotificationSettings {
            email: email_settings,
            ..Default::default()
        };
        let (dispatcher, _, _) = dispatcher_with(settings, vec![email.clone()]);

        dispatcher
            .dispatch(&alert(AlertSeverity::High, AlertType::LowBattery))
            .await
            .unwrap();
        assert_eq!(email.count(), 0);

        dispatcher
            .dispatch(&alert(AlertSeverity::Critical, AlertType::SensorFailed))
            .await
            .unwrap();
        assert_eq!(email.count(), 1);
    }

    #[tokio::test]
    async fn test_push_critical_only_filter() {
        let push = SpySender::new(NotificationChannel::Push);
        let mut push_settings = enabled_channel(r#"{"endpoint":"e","p256dh":"k","auth":"a"}"#);
        push_settings.critical_only = true;
        let settings = NotificationSettings {
            push: push_settings,
            ..Default::default()
        };
        let (dispatcher, _, _) = dispatcher_with(settings, vec![push.clone()]);

        dispatcher
            .dispatch(&alert(AlertSeverity::High, AlertType::LowWaterLevel))
            .await
            .unwrap();
        assert_eq!(push.count(), 0);

        dispatcher
            .dispatch(&alert(AlertSeverity::Critical, AlertType::LowWaterLevel))
            .await
            .unwrap();
        assert_eq!(push.count(), 1);
    }

    #[tokio::test]
    async fn test_failed_channel_does_not_block_others() {
        let email = SpySender::failing(NotificationChannel::Email);
        let sms = SpySender::new(NotificationChannel::Sms);
        let settings = NotificationSettings {
            email: enabled_channel("op@example.com"),
            sms: enabled_channel("+8613800000000"),
            ..Default::default()
        };
        let (dispatcher, _, _) =
            dispatcher_with(settings, vec![email.clone(), sms.clone()]);

        // 邮件渠道失败不影响短信渠道，dispatch 本身不报错
        dispatcher
            .dispatch(&alert(AlertSeverity::High, AlertType::LowWaterLevel))
            .await
            .unwrap();
        assert_eq!(email.count(), 1);
        assert_eq!(sms.count(), 1);
    }

    #[tokio::test]
    async fn test_hourly_frequency_enqueues_digest() {
        let email = SpySender::new(NotificationChannel::Email);
        let mut email_settings = enabled_channel("op@example.com");
        email_settings.frequency = NotificationFrequency::Hourly;
        let settings = NotificationSettings {
            email: email_settings,
            ..Default::default()
        };
        let (dispatcher, _, _) = dispatcher_with(settings, vec![email.clone()]);

        dispatcher
            .dispatch(&alert(AlertSeverity::High, AlertType::LowWaterLevel))
            .await
            .unwrap();
        dispatcher
            .dispatch(&alert(AlertSeverity::Medium, AlertType::LowBattery))
            .await
            .unwrap();
        // 入队不发送
        assert_eq!(email.count(), 0);

        dispatcher
            .flush_digests(NotificationFrequency::Hourly)
            .await;
        // 刷新后合并为一条摘要
        assert_eq!(email.count(), 1);
        let calls = email.calls.lock().unwrap();
        assert!(calls[0].1.title.contains("2"));

        drop(calls);
        dispatcher
            .flush_digests(NotificationFrequency::Hourly)
            .await;
        // 队列已清空，重复刷新不再发送
        assert_eq!(email.count(), 1);
    }

    #[tokio::test]
    async fn test_auto_escalation_registers_alert() {
        let email = SpySender::new(NotificationChannel::Email);
        let settings = NotificationSettings {
            email: enabled_channel("op@example.com"),
            auto_escalation: true,
            escalation_delay_minutes: 30,
            ..Default::default()
        };
        let (dispatcher, scheduler, alert_repo) =
            dispatcher_with(settings, vec![email.clone()]);
        scheduler.set_dispatcher(Arc::new(NoopDispatch));

        let alert = alert(AlertSeverity::Medium, AlertType::LowWaterLevel);
        alert_repo.insert(&alert).await.unwrap();
        dispatcher.dispatch(&alert).await.unwrap();

        // 31 分钟后 tick：登记生效，预警升级
        let escalated = scheduler
            .tick(Utc::now() + ChronoDuration::minutes(31))
            .await;
        assert_eq!(escalated, 1);
        let stored = alert_repo.get(alert.id).await.unwrap().unwrap();
        assert_eq!(stored.severity, AlertSeverity::High);
    }

    struct NoopDispatch;

    #[async_trait]
    impl AlertDispatch for NoopDispatch {
        async fn dispatch_alert(&self, _alert: TechnicalAlert) {}
    }

    #[tokio::test]
    async fn test_quiet_hours_suppress_non_critical() {
        let email = SpySender::new(NotificationChannel::Email);
        // 起止相同视为全天安静
        let settings = NotificationSettings {
            email: enabled_channel("op@example.com"),
            quiet_hours_start: Some(NaiveTime::from_hms_opt(0, 0, 0).unwrap()),
            quiet_hours_end: Some(NaiveTime::from_hms_opt(0, 0, 0).unwrap()),
            quiet_hours_timezone: "UTC".to_string(),
            ..Default::default()
        };
        let (dispatcher, _, _) = dispatcher_with(settings, vec![email.clone()]);

        dispatcher
            .dispatch(&alert(AlertSeverity::High, AlertType::LowWaterLevel))
            .await
            .unwrap();
        assert_eq!(email.count(), 0);

        // Critical 不受安静时段限制
        dispatcher
            .dispatch(&alert(AlertSeverity::Critical, AlertType::LowWaterLevel))
            .await
            .unwrap();
        assert_eq!(email.count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_sender_abandoned_after_timeout() {
        struct HangingSender;

        #[async_trait]
        impl ChannelSender for HangingSender {
            fn channel(&self) -> NotificationChannel {
                NotificationChannel::Email
            }
            async fn send(
                &self,
                _recipient: &str,
                _message: &NotificationMessage,
            ) -> Result<(), AppError> {
                futures::future::pending::<()>().await;
                unreachable!()
            }
        }

        let settings = NotificationSettings {
            email: enabled_channel("op@example.com"),
            ..Default::default()
        };
        let (dispatcher, _, _) = dispatcher_with(settings, vec![Arc::new(HangingSender)]);

        // 悬挂的发送在超时后被放弃，dispatch 正常返回
        dispatcher
            .dispatch(&alert(AlertSeverity::High, AlertType::LowWaterLevel))
            .await
            .unwrap();
    }
}
