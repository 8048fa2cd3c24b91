//! 预警登记处
//!
//! 把瞬态预警条件转换为持久化预警记录的状态机，按 (传感器, 类型)
//! 逐键串行：
//!
//! - 无预警 → 检测到条件 → 创建未读预警并交给通知调度
//! - 未读预警存在 → 重复检测只就地更新详情；严重程度升高才重新通知
//! - 未读 → 已确认：仅由外部确认动作触发
//! - 指标恢复不会自动关闭预警（产品要求，见 models::TechnicalAlert）

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::{AlertCondition, AlertType, TechnicalAlert};
use crate::repositories::AlertRepository;

/// 预警通知入口（由 NotificationDispatcher 实现；测试中用间谍替身）
///
/// 发送失败在实现内部按渠道记录，不向登记处传播。
#[async_trait]
pub trait AlertDispatch: Send + Sync {
    async fn dispatch_alert(&self, alert: TechnicalAlert);
}

type AlertKey = (Uuid, AlertType);

/// 预警登记处
pub struct AlertRegistry {
    alert_repo: Arc<dyn AlertRepository>,
    dispatcher: Arc<dyn AlertDispatch>,
    // 逐键互斥，避免同一 (传感器, 类型) 并发评估产生重复预警
    key_locks: Mutex<HashMap<AlertKey, Arc<tokio::sync::Mutex<()>>>>,
}

impl AlertRegistry {
    pub fn new(alert_repo: Arc<dyn AlertRepository>, dispatcher: Arc<dyn AlertDispatch>) -> Self {
        Self {
            alert_repo,
            dispatcher,
            key_locks: Mutex::new(HashMap::new()),
        }
    }

    fn key_lock(&self, key: AlertKey) -> Arc<tokio::sync::Mutex<()>> {
        self.key_locks
            .lock()
            .expect("键锁表锁中毒")
            .entry(key)
            .or_default()
            .clone()
    }

    /// 消费一条预警条件，返回创建或更新后的预警记录
    pub async fn process_condition(
        &self,
        condition: &AlertCondition,
    ) -> Result<TechnicalAlert, AppError> {
        let lock = self.key_lock((condition.sensor_id, condition.alert_type));
        let _guard = lock.lock().await;

        match self
            .alert_repo
            .find_open(condition.sensor_id, condition.alert_type)
            .await?
        {
            None => {
                let alert = TechnicalAlert::from_condition(condition);
                self.persist_with_retry(|| self.alert_repo.insert(&alert))
                    .await?;
                info!(
                    alert_id = %alert.id,
                    sensor_id = %alert.sensor_id,
                    alert_type = ?alert.alert_type,
                    severity = ?alert.severity,
                    "新预警已创建"
                );
                self.dispatcher.dispatch_alert(alert.clone()).await;
                Ok(alert)
            }
            Some(existing) => {
                let mut updated = existing.clone();
                updated.message = condition.message.clone();
                updated.details = condition.details.clone();

                let escalated = condition.severity > existing.severity;
                if escalated {
                    updated.severity = condition.severity;
                }

                self.persist_with_retry(|| self.alert_repo.update(&updated))
                    .await?;

                if escalated {
                    info!(
                        alert_id = %updated.id,
                        from = ?existing.severity,
                        to = ?updated.severity,
                        "预警严重程度升高，重新通知"
                    );
                    self.dispatcher.dispatch_alert(updated.clone()).await;
                }
                Ok(updated)
            }
        }
    }

    /// 标记预警已读（外部确认动作，进入 ACKNOWLEDGED 的唯一途径）
    pub async fn mark_alert_read(&self, alert_id: Uuid) -> Result<TechnicalAlert, AppError> {
        let alert = self.alert_repo.mark_read(alert_id).await?;
        info!(alert_id = %alert_id, "预警已确认");
        Ok(alert)
    }

    /// 持久化操作重试一次，仍失败则上抛并记日志
    async fn persist_with_retry<F, Fut>(&self, op: F) -> Result<(), AppError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<(), AppError>>,
    {
        if let Err(first) = op().await {
            warn!(error = %first, "预警持久化失败，重试一次");
            if let Err(second) = op().await {
                error!(error = %second, "预警持久化重试仍失败");
                return Err(second);
            }
        }
        Ok(())
    }
}
