//! 预警阈值模型
//!
//! 阈值按类别分组，每个类别内按严重程度排列（对"越低越糟"的指标，
//! 数值依次递减）。默认值为编译期常量，保证任何读取都能得到
//! 完整结构，即使存储记录损坏或缺字段。

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::errors::AppError;

/// 阈值作用域：全局默认，或按站点覆盖
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdScope {
    Global,
    Site(Uuid),
}

/// 水位阈值（三档，百分比，递减）
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct WaterLevelBands {
    pub warning: f64,
    pub critical: f64,
    pub emergency: f64,
}

/// 两档阈值（电池 / 信号 / 精度，百分比，递减）
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct TwoTierBands {
    pub warning: f64,
    pub critical: f64,
}

/// 维护与校准周期配置
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct MaintenanceIntervals {
    /// 校准提醒周期（天）
    pub calibration_reminder_days: i64,
    /// 预防性维护周期（天），超期判定"校准到期"
    pub preventive_interval_days: i64,
}

/// 完整阈值配置
///
/// 评估器只读，不做任何修改；变更只能经由 ThresholdStore 的
/// update / reset 操作。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct AlertThresholds {
    pub water_level: WaterLevelBands,
    pub battery: TwoTierBands,
    pub signal: TwoTierBands,
    pub accuracy: TwoTierBands,
    pub maintenance: MaintenanceIntervals,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            water_level: WaterLevelBands {
                warning: 30.0,
                critical: 20.0,
                emergency: 10.0,
            },
            battery: TwoTierBands {
                warning: 20.0,
                critical: 10.0,
            },
            signal: TwoTierBands {
                warning: 30.0,
                critical: 15.0,
            },
            accuracy: TwoTierBands {
                warning: 85.0,
                critical: 70.0,
            },
            maintenance: MaintenanceIntervals {
                calibration_reminder_days: 7,
                preventive_interval_days: 30,
            },
        }
    }
}

/// 阈值部分更新（所有字段可选，缺省字段保持原值）
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, Validate)]
pub struct ThresholdPatch {
    pub water_level_warning: Option<f64>,
    pub water_level_critical: Option<f64>,
    pub water_level_emergency: Option<f64>,
    pub battery_warning: Option<f64>,
    pub battery_critical: Option<f64>,
    pub signal_warning: Option<f64>,
    pub signal_critical: Option<f64>,
    pub accuracy_warning: Option<f64>,
    pub accuracy_critical: Option<f64>,
    #[validate(range(min = 1, max = 365, message = "校准提醒周期应在 1-365 天之间"))]
    pub calibration_reminder_days: Option<i64>,
    #[validate(range(min = 1, max = 365, message = "预防性维护周期应在 1-365 天之间"))]
    pub preventive_interval_days: Option<i64>,
}

impl ThresholdPatch {
    /// 将补丁叠加到基础配置上，返回完整配置
    pub fn merged_over(&self, base: &AlertThresholds) -> AlertThresholds {
        let mut merged = *base;
        if let Some(v) = self.water_level_warning {
            merged.water_level.warning = v;
        }
        if let Some(v) = self.water_level_critical {
            merged.water_level.critical = v;
        }
        if let Some(v) = self.water_level_emergency {
            merged.water_level.emergency = v;
        }
        if let Some(v) = self.battery_warning {
            merged.battery.warning = v;
        }
        if let Some(v) = self.battery_critical {
            merged.battery.critical = v;
        }
        if let Some(v) = self.signal_warning {
            merged.signal.warning = v;
        }
        if let Some(v) = self.signal_critical {
            merged.signal.critical = v;
        }
        if let Some(v) = self.accuracy_warning {
            merged.accuracy.warning = v;
        }
        if let Some(v) = self.accuracy_critical {
            merged.accuracy.critical = v;
        }
        if let Some(v) = self.calibration_reminder_days {
            merged.maintenance.calibration_reminder_days = v;
        }
        if let Some(v) = self.preventive_interval_days {
            merged.maintenance.preventive_interval_days = v;
        }
        merged
    }
}

impl AlertThresholds {
    /// 校验档位顺序不变量：emergency < critical < warning
    pub fn validate_ordering(&self) -> Result<(), AppError> {
        let wl = &self.water_level;
        if !(wl.emergency < wl.critical && wl.critical < wl.warning) {
            return Err(AppError::ValidationError(
                "水位阈值必须满足 emergency < critical < warning".to_string(),
            ));
        }
        for (name, bands) in [
            ("电池", &self.battery),
            ("信号", &self.signal),
            ("精度", &self.accuracy),
        ] {
            if !(bands.critical < bands.warning) {
                return Err(AppError::ValidationError(format!(
                    "{}阈值必须满足 critical < warning",
                    name
                )));
            }
        }
        Ok(())
    }
}
