//! 预警记录数据访问层
//!
//! 持久化技术由外部协作方决定，核心只依赖该 trait；
//! 内存实现用于测试与单机运行。

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::{AlertType, TechnicalAlert};

/// 预警记录仓库接口
#[async_trait]
pub trait AlertRepository: Send + Sync {
    /// 插入新预警
    async fn insert(&self, alert: &TechnicalAlert) -> Result<(), AppError>;

    /// 整体更新已有预警
    async fn update(&self, alert: &TechnicalAlert) -> Result<(), AppError>;

    /// 按 ID 查询
    async fn get(&self, alert_id: Uuid) -> Result<Option<TechnicalAlert>, AppError>;

    /// 查询某 (传感器, 类型) 当前未读的预警
    async fn find_open(
        &self,
        sensor_id: Uuid,
        alert_type: AlertType,
    ) -> Result<Option<TechnicalAlert>, AppError>;

    /// 标记已读（确认），返回更新后的记录
    async fn mark_read(&self, alert_id: Uuid) -> Result<TechnicalAlert, AppError>;

    /// 列出所有未读预警
    async fn list_open(&self) -> Result<Vec<TechnicalAlert>, AppError>;
}

/// 内存实现
#[derive(Default)]
pub struct MemoryAlertRepository {
    alerts: RwLock<HashMap<Uuid, TechnicalAlert>>,
}

impl MemoryAlertRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AlertRepository for MemoryAlertRepository {
    async fn insert(&self, alert: &TechnicalAlert) -> Result<(), AppError> {
        let mut alerts = self.alerts.write().await;
        if alerts.contains_key(&alert.id) {
            return Err(AppError::PersistenceError(format!(
                "预警已存在: {}",
                alert.id
            )));
        }
        alerts.insert(alert.id, alert.clone());
        Ok(())
    }

    async fn update(&self, alert: &TechnicalAlert) -> Result<(), AppError> {
        let mut alerts = self.alerts.write().await;
        match alerts.get_mut(&alert.id) {
            Some(existing) => {
                *existing = alert.clone();
                Ok(())
            }
            None => Err(AppError::PersistenceError(format!(
                "预警不存在: {}",
                alert.id
            ))),
        }
    }

    async fn get(&self, alert_id: Uuid) -> Result<Option<TechnicalAlert>, AppError> {
        Ok(self.alerts.read().await.get(&alert_id).cloned())
    }

    async fn find_open(
        &self,
        sensor_id: Uuid,
        alert_type: AlertType,
    ) -> Result<Option<TechnicalAlert>, AppError> {
        Ok(self
            .alerts
            .read()
            .await
            .values()
            .find(|a| a.sensor_id == sensor_id && a.alert_type == alert_type && !a.is_read)
            .cloned())
    }

    async fn mark_read(&self, alert_id: Uuid) -> Result<TechnicalAlert, AppError> {
        let mut alerts = self.alerts.write().await;
        match alerts.get_mut(&alert_id) {
            Some(alert) => {
                alert.is_read = true;
                Ok(alert.clone())
            }
            None => Err(AppError::NotFound(format!("预警不存在: {}", alert_id))),
        }
    }

    async fn list_open(&self) -> Result<Vec<TechnicalAlert>, AppError> {
        Ok(self
            .alerts
            .read()
            .await
            .values()
            .filter(|a| !a.is_read)
            .cloned()
            .collect())
    }
}
