//! 预警评估器
//!
//! `(读数或状态快照, 阈值)` 的纯函数，每个 (指标, 传感器) 至多产生
//! 一条预警条件。评估器无状态，去重由 AlertRegistry 负责，这样
//! 档位判定可以按函数表直接单测。
//!
//! 严重程度映射：
//! - 水位三档：emergency → Critical，critical → High，warning → Medium
//! - 电池/信号/精度两档：critical → Critical，warning → Medium
//! - 传感器故障 → Critical；维护中 → Medium；校准到期 → Low

use chrono::{DateTime, Utc};

use crate::models::{
    AlertCondition, AlertDetails, AlertSeverity, AlertThresholds, AlertType, MetricKind, Reading,
    SensorSnapshot, SensorStatus, TwoTierBands,
};

/// 评估一条读数，返回至多一条预警条件
pub fn evaluate_reading(
    reading: &Reading,
    thresholds: &AlertThresholds,
) -> Option<AlertCondition> {
    let (alert_type, severity, threshold, message) = match reading.kind {
        MetricKind::Level => {
            let bands = &thresholds.water_level;
            if reading.value <= bands.emergency {
                (
                    AlertType::LowWaterLevel,
                    AlertSeverity::Critical,
                    bands.emergency,
                    format!("水位过低: {}%（紧急阈值 {}%）", reading.value, bands.emergency),
                )
            } else if reading.value <= bands.critical {
                (
                    AlertType::LowWaterLevel,
                    AlertSeverity::High,
                    bands.critical,
                    format!("水位过低: {}%（严重阈值 {}%）", reading.value, bands.critical),
                )
            } else if reading.value <= bands.warning {
                (
                    AlertType::LowWaterLevel,
                    AlertSeverity::Medium,
                    bands.warning,
                    format!("水位偏低: {}%（警告阈值 {}%）", reading.value, bands.warning),
                )
            } else {
                return None;
            }
        }
        MetricKind::Battery => two_tier(
            reading.value,
            &thresholds.battery,
            AlertType::LowBattery,
            "电池电量",
        )?,
        MetricKind::Signal => two_tier(
            reading.value,
            &thresholds.signal,
            AlertType::WeakSignal,
            "信号强度",
        )?,
        MetricKind::Accuracy => two_tier(
            reading.value,
            &thresholds.accuracy,
            AlertType::LowAccuracy,
            "测量精度",
        )?,
    };

    Some(AlertCondition {
        site_id: reading.site_id,
        sensor_id: reading.sensor_id,
        alert_type,
        severity,
        measured_value: reading.value,
        threshold,
        message,
        detected_at: reading.observed_at,
        details: AlertDetails {
            sensor_name: reading.sensor_id.to_string(),
            site_name: reading.site_id.to_string(),
            current_value: reading.value,
            threshold,
            unit: reading.unit.clone(),
        },
    })
}

/// 两档判定：critical → Critical，warning → Medium
fn two_tier(
    value: f64,
    bands: &TwoTierBands,
    alert_type: AlertType,
    label: &str,
) -> Option<(AlertType, AlertSeverity, f64, String)> {
    if value <= bands.critical {
        Some((
            alert_type,
            AlertSeverity::Critical,
            bands.critical,
            format!("{}过低: {}%（严重阈值 {}%）", label, value, bands.critical),
        ))
    } else if value <= bands.warning {
        Some((
            alert_type,
            AlertSeverity::Medium,
            bands.warning,
            format!("{}偏低: {}%（警告阈值 {}%）", label, value, bands.warning),
        ))
    } else {
        None
    }
}

/// 评估一份传感器状态快照，返回零或多条预警条件
pub fn evaluate_snapshot(
    snapshot: &SensorSnapshot,
    thresholds: &AlertThresholds,
    now: DateTime<Utc>,
) -> Vec<AlertCondition> {
    let mut conditions = Vec::new();

    let details = |value: f64, threshold: f64, unit: &str| AlertDetails {
        sensor_name: snapshot.sensor_name.clone(),
        site_name: snapshot.site_name.clone(),
        current_value: value,
        threshold,
        unit: unit.to_string(),
    };
    let condition = |alert_type, severity, value: f64, threshold: f64, message: String, unit: &str| {
        AlertCondition {
            site_id: snapshot.site_id,
            sensor_id: snapshot.sensor_id,
            alert_type,
            severity,
            measured_value: value,
            threshold,
            message,
            detected_at: now,
            details: details(value, threshold, unit),
        }
    };

    // 状态类条件优先于数值阈值，无条件触发
    match snapshot.status {
        SensorStatus::Failed => {
            conditions.push(condition(
                AlertType::SensorFailed,
                AlertSeverity::Critical,
                0.0,
                0.0,
                format!("传感器 {} 故障", snapshot.sensor_name),
                "",
            ));
        }
        SensorStatus::Maintenance => {
            conditions.push(condition(
                AlertType::MaintenanceNeeded,
                AlertSeverity::Medium,
                0.0,
                0.0,
                format!("传感器 {} 处于维护状态", snapshot.sensor_name),
                "",
            ));
        }
        SensorStatus::Active => {}
    }

    // 快照携带的数值指标按两档判定
    if let Some(battery) = snapshot.battery_percent {
        if let Some((t, sev, th, msg)) = two_tier(battery, &thresholds.battery, AlertType::LowBattery, "电池电量") {
            conditions.push(condition(t, sev, battery, th, msg, "%"));
        }
    }
    if let Some(signal) = snapshot.signal_percent {
        if let Some((t, sev, th, msg)) = two_tier(signal, &thresholds.signal, AlertType::WeakSignal, "信号强度") {
            conditions.push(condition(t, sev, signal, th, msg, "%"));
        }
    }
    if let Some(accuracy) = snapshot.accuracy_percent {
        if let Some((t, sev, th, msg)) = two_tier(accuracy, &thresholds.accuracy, AlertType::LowAccuracy, "测量精度") {
            conditions.push(condition(t, sev, accuracy, th, msg, "%"));
        }
    }

    // 校准：超过预防性维护周期，或从无校准记录，判定到期
    let interval_days = thresholds.maintenance.preventive_interval_days;
    let calibration_due = match snapshot.last_calibrated_at {
        Some(last) => (now - last).num_days() > interval_days,
        None => true,
    };
    if calibration_due {
        let days_since = snapshot
            .last_calibrated_at
            .map(|last| (now - last).num_days());
        let message = match days_since {
            Some(days) => format!(
                "传感器 {} 已 {} 天未校准（周期 {} 天）",
                snapshot.sensor_name, days, interval_days
            ),
            None => format!("传感器 {} 无校准记录", snapshot.sensor_name),
        };
        conditions.push(condition(
            AlertType::CalibrationDue,
            AlertSeverity::Low,
            days_since.unwrap_or(0) as f64,
            interval_days as f64,
            message,
            "天",
        ));
    }

    conditions
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use uuid::Uuid;

    fn level_reading(value: f64) -> Reading {
        Reading {
            site_id: Uuid::new_v4(),
            sensor_id: Uuid::new_v4(),
            kind: MetricKind::Level,
            value,
            unit: "%".to_string(),
            observed_at: Utc::now(),
            source: "test".to_string(),
        }
    }

    fn reading_of(kind: MetricKind, value: f64) -> Reading {
        Reading {
            kind,
            ..level_reading(value)
        }
    }

    fn snapshot(status: SensorStatus) -> SensorSnapshot {
        SensorSnapshot {
            site_id: Uuid::new_v4(),
            sensor_id: Uuid::new_v4(),
            sensor_name: "S1".to_string(),
            site_name: "A 站".to_string(),
            status,
            battery_percent: None,
            signal_percent: None,
            accuracy_percent: None,
            last_calibrated_at: Some(Utc::now()),
        }
    }

    #[test]
    fn test_water_level_boundary_table() {
        let thresholds = AlertThresholds::default(); // 30/20/10
        let table: Vec<(f64, Option<AlertSeverity>)> = vec![
            (5.0, Some(AlertSeverity::Critical)),
            // 边界值恰好等于阈值时落入更严重的档
            (10.0, Some(AlertSeverity::Critical)),
            (10.1, Some(AlertSeverity::High)),
            (15.0, Some(AlertSeverity::High)),
            (20.0, Some(AlertSeverity::High)),
            (20.1, Some(AlertSeverity::Medium)),
            (30.0, Some(AlertSeverity::Medium)),
            (30.1, None),
            (95.0, None),
        ];
        for (value, expected) in table {
            let result = evaluate_reading(&level_reading(value), &thresholds);
            assert_eq!(
                result.as_ref().map(|c| c.severity),
                expected,
                "水位 {} 档位判定错误",
                value
            );
            if let Some(condition) = result {
                assert_eq!(condition.alert_type, AlertType::LowWaterLevel);
                assert_eq!(condition.measured_value, value);
            }
        }
    }

    #[test]
    fn test_battery_band_selection_scenario() {
        // 电量从 85% 跌到 15%，阈值 {warning:20, critical:10}：
        // 15 > 10 未触及 critical 档，应取 warning 档
        let thresholds = AlertThresholds::default();
        assert!(evaluate_reading(&reading_of(MetricKind::Battery, 85.0), &thresholds).is_none());

        let condition =
            evaluate_reading(&reading_of(MetricKind::Battery, 15.0), &thresholds).unwrap();
        assert_eq!(condition.alert_type, AlertType::LowBattery);
        assert_eq!(condition.severity, AlertSeverity::Medium);
        assert_eq!(condition.threshold, 20.0);
    }

    #[test]
    fn test_two_tier_metrics_boundaries() {
        let thresholds = AlertThresholds::default();
        // 信号 30/15
        for (value, expected) in [
            (15.0, Some(AlertSeverity::Critical)),
            (30.0, Some(AlertSeverity::Medium)),
            (30.1, None),
        ] {
            let result = evaluate_reading(&reading_of(MetricKind::Signal, value), &thresholds);
            assert_eq!(result.map(|c| c.severity), expected, "信号 {}", value);
        }
        // 精度 85/70
        for (value, expected) in [
            (70.0, Some(AlertSeverity::Critical)),
            (85.0, Some(AlertSeverity::Medium)),
            (99.0, None),
        ] {
            let result = evaluate_reading(&reading_of(MetricKind::Accuracy, value), &thresholds);
            assert_eq!(result.map(|c| c.severity), expected, "精度 {}", value);
        }
    }

    #[test]
    fn test_failed_sensor_raises_critical_unconditionally() {
        let thresholds = AlertThresholds::default();
        let conditions = evaluate_snapshot(&snapshot(SensorStatus::Failed), &thresholds, Utc::now());
        assert!(conditions
            .iter()
            .any(|c| c.alert_type == AlertType::SensorFailed
                && c.severity == AlertSeverity::Critical));
    }

    #[test]
    fn test_maintenance_sensor_raises_medium() {
        let thresholds = AlertThresholds::default();
        let conditions =
            evaluate_snapshot(&snapshot(SensorStatus::Maintenance), &thresholds, Utc::now());
        assert!(conditions
            .iter()
            .any(|c| c.alert_type == AlertType::MaintenanceNeeded
                && c.severity == AlertSeverity::Medium));
    }

    #[test]
    fn test_calibration_due_after_interval() {
        let thresholds = AlertThresholds::default(); // 周期 30 天
        let now = Utc::now();

        let mut snap = snapshot(SensorStatus::Active);
        snap.last_calibrated_at = Some(now - Duration::days(31));
        let conditions = evaluate_snapshot(&snap, &thresholds, now);
        assert!(conditions
            .iter()
            .any(|c| c.alert_type == AlertType::CalibrationDue));

        // 30 天整不算超期
        snap.last_calibrated_at = Some(now - Duration::days(30));
        let conditions = evaluate_snapshot(&snap, &thresholds, now);
        assert!(!conditions
            .iter()
            .any(|c| c.alert_type == AlertType::CalibrationDue));
    }

    #[test]
    fn test_missing_calibration_record_is_always_due() {
        let thresholds = AlertThresholds::default();
        let mut snap = snapshot(SensorStatus::Active);
        snap.last_calibrated_at = None;
        let conditions = evaluate_snapshot(&snap, &thresholds, Utc::now());
        assert!(conditions
            .iter()
            .any(|c| c.alert_type == AlertType::CalibrationDue
                && c.severity == AlertSeverity::Low));
    }

    #[test]
    fn test_snapshot_numeric_metrics_are_banded() {
        let thresholds = AlertThresholds::default();
        let mut snap = snapshot(SensorStatus::Active);
        snap.battery_percent = Some(8.0);
        snap.signal_percent = Some(25.0);
        snap.accuracy_percent = Some(95.0);

        let conditions = evaluate_snapshot(&snap, &thresholds, Utc::now());
        let battery = conditions
            .iter()
            .find(|c| c.alert_type == AlertType::LowBattery)
            .unwrap();
        assert_eq!(battery.severity, AlertSeverity::Critical);
        let signal = conditions
            .iter()
            .find(|c| c.alert_type == AlertType::WeakSignal)
            .unwrap();
        assert_eq!(signal.severity, AlertSeverity::Medium);
        assert!(!conditions
            .iter()
            .any(|c| c.alert_type == AlertType::LowAccuracy));
    }
}
