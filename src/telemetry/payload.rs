//! 网关原始报文解析
//!
//! 网关报文为 JSON：`{ siteId, sensorId?, timestamp, distance|level, source }`。
//! `level` 与旧版 `distance` 字段等价；缺少 `sensorId` 时以站点 ID
//! 作为传感器键（站点级单传感器的旧设备）。

use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::{MetricKind, Reading};

/// 原始遥测报文
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPayload {
    site_id: Uuid,
    #[serde(default)]
    sensor_id: Option<Uuid>,
    timestamp: DateTime<Utc>,
    #[serde(default)]
    level: Option<f64>,
    /// 旧版字段名，与 level 等价
    #[serde(default)]
    distance: Option<f64>,
    #[serde(default)]
    unit: Option<String>,
    source: String,
}

/// 解析网关报文为规范读数
pub fn parse_reading(raw: &str) -> Result<Reading, AppError> {
    let payload: RawPayload = serde_json::from_str(raw)?;

    let value = payload
        .level
        .or(payload.distance)
        .ok_or_else(|| AppError::ParseError("报文缺少 level/distance 字段".to_string()))?;

    Ok(Reading {
        site_id: payload.site_id,
        sensor_id: payload.sensor_id.unwrap_or(payload.site_id),
        kind: MetricKind::Level,
        value,
        unit: payload.unit.unwrap_or_else(|| "%".to_string()),
        observed_at: payload.timestamp,
        source: payload.source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level_field() {
        let raw = r#"{
            "siteId": "7b6a4b8e-7a10-4b9e-9f6e-0d5a3f3c2b1a",
            "sensorId": "11111111-2222-3333-4444-555555555555",
            "timestamp": "2026-08-30T10:00:00Z",
            "level": 42.5,
            "source": "gateway-1"
        }"#;
        let reading = parse_reading(raw).unwrap();
        assert_eq!(reading.value, 42.5);
        assert_eq!(reading.kind, MetricKind::Level);
        assert_eq!(reading.unit, "%");
    }

    #[test]
    fn test_parse_legacy_distance_field() {
        let raw = r#"{
            "siteId": "7b6a4b8e-7a10-4b9e-9f6e-0d5a3f3c2b1a",
            "timestamp": "2026-08-30T10:00:00Z",
            "distance": 17.0,
            "source": "gateway-1"
        }"#;
        let reading = parse_reading(raw).unwrap();
        assert_eq!(reading.value, 17.0);
        // 缺 sensorId 时退回站点 ID
        assert_eq!(reading.sensor_id, reading.site_id);
    }

    #[test]
    fn test_parse_rejects_payload_without_value() {
        let raw = r#"{
            "siteId": "7b6a4b8e-7a10-4b9e-9f6e-0d5a3f3c2b1a",
            "timestamp": "2026-08-30T10:00:00Z",
            "source": "gateway-1"
        }"#;
        assert!(matches!(parse_reading(raw), Err(AppError::ParseError(_))));
    }

    #[test]
    fn test_parse_rejects_malformed_json() {
        assert!(parse_reading("not json").is_err());
    }
}
