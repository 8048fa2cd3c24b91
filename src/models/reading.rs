//! 遥测读数模型

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 指标类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    /// 水位（百分比）
    Level,
    /// 电池电量（百分比）
    Battery,
    /// 信号强度（百分比）
    Signal,
    /// 测量精度（百分比）
    Accuracy,
}

/// 一次传感器测量读数
///
/// 发出后不可变；同一传感器的读数按 `observed_at` 有序，
/// 重复读数（相同传感器 + 时间戳）由链路幂等丢弃。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reading {
    pub site_id: Uuid,
    pub sensor_id: Uuid,
    pub kind: MetricKind,
    pub value: f64,
    pub unit: String,
    pub observed_at: DateTime<Utc>,
    pub source: String,
}

/// 传感器运行状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SensorStatus {
    Active,
    Failed,
    Maintenance,
}

/// 周期性传感器状态快照
///
/// 由传感器目录（外部协作方）提供，评估器据此产生
/// 状态类与校准类预警条件。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorSnapshot {
    pub site_id: Uuid,
    pub sensor_id: Uuid,
    pub sensor_name: String,
    pub site_name: String,
    pub status: SensorStatus,
    pub battery_percent: Option<f64>,
    pub signal_percent: Option<f64>,
    pub accuracy_percent: Option<f64>,
    pub last_calibrated_at: Option<DateTime<Utc>>,
}
