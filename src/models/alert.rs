//! 预警模型

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 预警严重程度（全序：Low < Medium < High < Critical）
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl AlertSeverity {
    /// 升级一档，封顶 Critical
    pub fn promoted(self) -> Self {
        match self {
            AlertSeverity::Low => AlertSeverity::Medium,
            AlertSeverity::Medium => AlertSeverity::High,
            AlertSeverity::High => AlertSeverity::Critical,
            AlertSeverity::Critical => AlertSeverity::Critical,
        }
    }
}

/// 预警类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    LowWaterLevel,
    LowBattery,
    WeakSignal,
    LowAccuracy,
    SensorFailed,
    MaintenanceNeeded,
    CalibrationDue,
}

/// 预警详情（用于通知展示）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlertDetails {
    pub sensor_name: String,
    pub site_name: String,
    pub current_value: f64,
    pub threshold: f64,
    pub unit: String,
}

/// 瞬态预警条件
///
/// 评估器的输出，不直接持久化，由 AlertRegistry 立即消费。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertCondition {
    pub site_id: Uuid,
    pub sensor_id: Uuid,
    pub alert_type: AlertType,
    pub severity: AlertSeverity,
    pub measured_value: f64,
    pub threshold: f64,
    pub message: String,
    pub detected_at: DateTime<Utc>,
    pub details: AlertDetails,
}

/// 持久化的技术预警记录
///
/// 生命周期：首次检测创建（未读）→ 人工确认后终结。
/// 指标恢复不会自动关闭未确认的预警。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TechnicalAlert {
    pub id: Uuid,
    pub sensor_id: Uuid,
    pub site_id: Uuid,
    pub alert_type: AlertType,
    pub severity: AlertSeverity,
    pub message: String,
    pub details: AlertDetails,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
    pub escalated_at: Option<DateTime<Utc>>,
}

impl TechnicalAlert {
    /// 从预警条件创建新的预警记录
    pub fn from_condition(condition: &AlertCondition) -> Self {
        Self {
            id: Uuid::new_v4(),
            sensor_id: condition.sensor_id,
            site_id: condition.site_id,
            alert_type: condition.alert_type,
            severity: condition.severity,
            message: condition.message.clone(),
            details: condition.details.clone(),
            is_read: false,
            created_at: condition.detected_at,
            escalated_at: None,
        }
    }
}
