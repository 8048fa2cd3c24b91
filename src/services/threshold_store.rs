//! 阈值存储服务
//!
//! 评估器所依赖的唯一阈值来源。读取永不失败：站点覆盖叠加在
//! 全局覆盖之上，再叠加在编译期默认值之上，存储缺字段或读取
//! 出错时退回默认值，保证返回的结构始终完整。

use std::sync::Arc;
use tracing::warn;
use validator::Validate;

use crate::errors::AppError;
use crate::models::{AlertThresholds, ThresholdPatch, ThresholdScope};
use crate::repositories::ThresholdRepository;

/// 阈值存储服务
pub struct ThresholdStore {
    threshold_repo: Arc<dyn ThresholdRepository>,
}

impl ThresholdStore {
    pub fn new(threshold_repo: Arc<dyn ThresholdRepository>) -> Self {
        Self { threshold_repo }
    }

    /// 获取某作用域的完整阈值配置（永不失败）
    pub async fn get(&self, scope: ThresholdScope) -> AlertThresholds {
        let mut merged = AlertThresholds::default();

        // 全局覆盖
        match self.threshold_repo.load(ThresholdScope::Global).await {
            Ok(Some(patch)) => merged = patch.merged_over(&merged),
            Ok(None) => {}
            Err(e) => warn!(error = %e, "全局阈值读取失败，使用默认值"),
        }

        // 站点覆盖
        if let ThresholdScope::Site(_) = scope {
            match self.threshold_repo.load(scope).await {
                Ok(Some(patch)) => merged = patch.merged_over(&merged),
                Ok(None) => {}
                Err(e) => warn!(error = %e, "站点阈值读取失败，使用上层配置"),
            }
        }

        merged
    }

    /// 更新某作用域的阈值（部分更新，校验档位顺序后持久化）
    pub async fn update(&self, scope: ThresholdScope, patch: ThresholdPatch) -> Result<(), AppError> {
        patch.validate()?;

        // 合并现有覆盖，整体校验顺序不变量
        let existing = self
            .threshold_repo
            .load(scope)
            .await?
            .unwrap_or_default();
        let combined = merge_patches(&existing, &patch);
        let base = match scope {
            ThresholdScope::Global => AlertThresholds::default(),
            ThresholdScope::Site(_) => self.get(ThresholdScope::Global).await,
        };
        combined.merged_over(&base).validate_ordering()?;

        self.threshold_repo
            .save(scope, &combined)
            .await
            .map_err(|e| AppError::PersistenceError(format!("阈值保存失败: {}", e)))
    }

    /// 重置为默认值（删除该作用域的覆盖）
    pub async fn reset_to_defaults(&self, scope: ThresholdScope) -> Result<(), AppError> {
        self.threshold_repo
            .delete(scope)
            .await
            .map_err(|e| AppError::PersistenceError(format!("阈值重置失败: {}", e)))
    }
}

/// 新补丁字段覆盖旧补丁字段
fn merge_patches(base: &ThresholdPatch, update: &ThresholdPatch) -> ThresholdPatch {
    ThresholdPatch {
        water_level_warning: update.water_level_warning.or(base.water_level_warning),
        water_level_critical: update.water_level_critical.or(base.water_level_critical),
        water_level_emergency: update.water_level_emergency.or(base.water_level_emergency),
        battery_warning: update.battery_warning.or(base.battery_warning),
        battery_critical: update.battery_critical.or(base.battery_critical),
        signal_warning: update.signal_warning.or(base.signal_warning),
        signal_critical: update.signal_critical.or(base.signal_critical),
        accuracy_warning: update.accuracy_warning.or(base.accuracy_warning),
        accuracy_critical: update.accuracy_critical.or(base.accuracy_critical),
        calibration_reminder_days: update
            .calibration_reminder_days
            .or(base.calibration_reminder_days),
        preventive_interval_days: update
            .preventive_interval_days
            .or(base.preventive_interval_days),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::MemoryThresholdRepository;
    use uuid::Uuid;

    fn store() -> ThresholdStore {
        ThresholdStore::new(Arc::new(MemoryThresholdRepository::new()))
    }

    #[tokio::test]
    async fn test_get_without_overrides_returns_defaults() {
        let store = store();
        let thresholds = store.get(ThresholdScope::Global).await;
        assert_eq!(thresholds, AlertThresholds::default());
    }

    #[tokio::test]
    async fn test_site_override_layers_over_global() {
        let store = store();
        let site = ThresholdScope::Site(Uuid::new_v4());

        store
            .update(
                ThresholdScope::Global,
                ThresholdPatch {
                    water_level_warning: Some(35.0),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        store
            .update(
                site,
                ThresholdPatch {
                    water_level_critical: Some(25.0),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let thresholds = store.get(site).await;
        // 站点未覆盖的字段取全局覆盖，再未覆盖的取默认
        assert_eq!(thresholds.water_level.warning, 35.0);
        assert_eq!(thresholds.water_level.critical, 25.0);
        assert_eq!(thresholds.water_level.emergency, 10.0);
    }

    #[tokio::test]
    async fn test_update_rejects_inverted_bands() {
        let store = store();
        let result = store
            .update(
                ThresholdScope::Global,
                ThresholdPatch {
                    water_level_emergency: Some(50.0),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(result, Err(AppError::ValidationError(_))));
    }

    #[tokio::test]
    async fn test_reset_removes_override() {
        let store = store();
        store
            .update(
                ThresholdScope::Global,
                ThresholdPatch {
                    battery_warning: Some(50.0),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        store.reset_to_defaults(ThresholdScope::Global).await.unwrap();

        let thresholds = store.get(ThresholdScope::Global).await;
        assert_eq!(thresholds.battery.warning, 20.0);
    }
}
