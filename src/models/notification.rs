//! 通知配置与消息模型

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

use crate::models::{AlertSeverity, AlertType, TechnicalAlert};

/// 通知渠道
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum NotificationChannel {
    Email,
    Sms,
    Push,
}

/// 通知频率
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NotificationFrequency {
    /// 立即同步发送
    Immediate,
    /// 进入小时摘要队列
    Hourly,
    /// 进入每日摘要队列
    Daily,
}

/// 单渠道通知配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelSettings {
    pub enabled: bool,
    /// 收件地址（邮箱 / 手机号 / 推送订阅标识）
    pub recipient: String,
    /// 该渠道关注的预警类型；为空集合表示不接收任何类型
    pub alert_types: HashSet<AlertType>,
    pub frequency: NotificationFrequency,
    /// 仅 Critical 级别才发送（推送渠道专用语义）
    #[serde(default)]
    pub critical_only: bool,
}

impl ChannelSettings {
    /// 默认关闭的渠道配置
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            recipient: String::new(),
            alert_types: HashSet::new(),
            frequency: NotificationFrequency::Immediate,
            critical_only: false,
        }
    }
}

/// 通知设置（调度器只读，由设置子系统维护）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationSettings {
    pub email: ChannelSettings,
    pub sms: ChannelSettings,
    pub push: ChannelSettings,
    /// 未确认预警是否自动升级
    pub auto_escalation: bool,
    /// 升级延迟（分钟）
    pub escalation_delay_minutes: i64,
    /// 安静时段（非 Critical 的即时通知在该时段内被抑制）
    pub quiet_hours_start: Option<NaiveTime>,
    pub quiet_hours_end: Option<NaiveTime>,
    pub quiet_hours_timezone: String,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            email: ChannelSettings::disabled(),
            sms: ChannelSettings::disabled(),
            push: ChannelSettings::disabled(),
            auto_escalation: false,
            escalation_delay_minutes: 30,
            quiet_hours_start: None,
            quiet_hours_end: None,
            quiet_hours_timezone: "UTC".to_string(),
        }
    }
}

impl NotificationSettings {
    pub fn channel(&self, channel: NotificationChannel) -> &ChannelSettings {
        match channel {
            NotificationChannel::Email => &self.email,
            NotificationChannel::Sms => &self.sms,
            NotificationChannel::Push => &self.push,
        }
    }
}

/// 渠道发送的消息内容
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationMessage {
    pub alert_id: Uuid,
    pub title: String,
    pub body: String,
    pub severity: AlertSeverity,
    pub alert_type: AlertType,
}

impl NotificationMessage {
    /// 由预警记录构建通知内容
    pub fn from_alert(alert: &TechnicalAlert) -> Self {
        let title = format!("[{:?}] {:?}", alert.severity, alert.alert_type);
        let body = format!(
            "{} | 站点: {} | 传感器: {} | 当前值: {}{} (阈值 {}{})",
            alert.message,
            alert.details.site_name,
            alert.details.sensor_name,
            alert.details.current_value,
            alert.details.unit,
            alert.details.threshold,
            alert.details.unit,
        );
        Self {
            alert_id: alert.id,
            title,
            body,
            severity: alert.severity,
            alert_type: alert.alert_type,
        }
    }
}
