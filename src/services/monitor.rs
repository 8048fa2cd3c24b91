//! 监控管线
//!
//! 数据流：遥测链路 → 评估器（查阈值存储）→ 预警登记处。
//! 每个订阅站点一个消费任务；另有周期任务巡检传感器状态快照。
//! 单个传感器的处理失败只记日志，不影响其他传感器。

use chrono::Utc;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::models::{AlertCondition, ThresholdScope};
use crate::repositories::SensorDirectory;
use crate::services::evaluator::{evaluate_reading, evaluate_snapshot};
use crate::services::registry::AlertRegistry;
use crate::services::threshold_store::ThresholdStore;
use crate::telemetry::{LinkEvent, Subscription};

/// 监控管线
pub struct Monitor {
    threshold_store: Arc<ThresholdStore>,
    registry: Arc<AlertRegistry>,
    sensor_directory: Arc<dyn SensorDirectory>,
}

impl Monitor {
    pub fn new(
        threshold_store: Arc<ThresholdStore>,
        registry: Arc<AlertRegistry>,
        sensor_directory: Arc<dyn SensorDirectory>,
    ) -> Self {
        Self {
            threshold_store,
            registry,
            sensor_directory,
        }
    }

    /// 处理一个链路事件
    pub async fn handle_event(&self, site_id: Uuid, event: LinkEvent) {
        match event {
            LinkEvent::Reading(reading) => {
                let thresholds = self
                    .threshold_store
                    .get(ThresholdScope::Site(reading.site_id))
                    .await;
                if let Some(condition) = evaluate_reading(&reading, &thresholds) {
                    self.submit(condition).await;
                }
            }
            LinkEvent::LinkDown => {
                // 链路终止需要人工介入，站点停止产生新读数
                error!(site_id = %site_id, "遥测链路终止，站点读数中断");
            }
        }
    }

    /// 消费某站点的读数流（独立任务运行）
    pub async fn run_site(
        self: Arc<Self>,
        site_id: Uuid,
        mut subscription: Subscription,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!(site_id = %site_id, "站点监控启动");
        loop {
            tokio::select! {
                event = subscription.recv() => match event {
                    Some(event) => self.handle_event(site_id, event).await,
                    None => {
                        warn!(site_id = %site_id, "站点事件流已关闭");
                        return;
                    }
                },
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!(site_id = %site_id, "站点监控收到关闭信号，退出");
                        return;
                    }
                }
            }
        }
    }

    /// 巡检一个站点的传感器状态快照
    pub async fn sweep_site(&self, site_id: Uuid) {
        let snapshots = match self.sensor_directory.snapshots(site_id).await {
            Ok(snapshots) => snapshots,
            Err(e) => {
                warn!(site_id = %site_id, error = %e, "传感器快照获取失败");
                return;
            }
        };

        let thresholds = self
            .threshold_store
            .get(ThresholdScope::Site(site_id))
            .await;
        let now = Utc::now();
        for snapshot in &snapshots {
            for condition in evaluate_snapshot(snapshot, &thresholds, now) {
                self.submit(condition).await;
            }
        }
    }

    /// 周期巡检循环（独立任务运行）
    pub async fn run_snapshot_sweep(
        self: Arc<Self>,
        sites: Vec<Uuid>,
        period: std::time::Duration,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    for site_id in &sites {
                        self.sweep_site(*site_id).await;
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("快照巡检收到关闭信号，退出");
                        return;
                    }
                }
            }
        }
    }

    /// 提交条件给登记处；持久化失败只记日志，管线继续
    async fn submit(&self, condition: AlertCondition) {
        if let Err(e) = self.registry.process_condition(&condition).await {
            error!(
                sensor_id = %condition.sensor_id,
                alert_type = ?condition.alert_type,
                error = %e,
                "预警条件处理失败"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        AlertSeverity, AlertType, SensorSnapshot, SensorStatus, TechnicalAlert,
    };
    use crate::repositories::{
        AlertRepository, MemoryAlertRepository, MemorySensorDirectory, MemoryThresholdRepository,
    };
    use crate::services::registry::AlertDispatch;
    use async_trait::async_trait;

    struct NoopDispatch;

    #[async_trait]
    impl AlertDispatch for NoopDispatch {
        async fn dispatch_alert(&self, _alert: TechnicalAlert) {}
    }

    #[tokio::test]
    async fn test_failed_sensor_snapshot_raises_alert() {
        let alert_repo = Arc::new(MemoryAlertRepository::new());
        let directory = Arc::new(MemorySensorDirectory::new());
        let site_id = Uuid::new_v4();
        directory
            .put_site(
                site_id,
                vec![SensorSnapshot {
                    site_id,
                    sensor_id: Uuid::new_v4(),
                    sensor_name: "S1".to_string(),
                    site_name: "A 站".to_string(),
                    status: SensorStatus::Failed,
                    battery_percent: None,
                    signal_percent: None,
                    accuracy_percent: None,
                    last_calibrated_at: Some(Utc::now()),
                }],
            )
            .await;

        let monitor = Monitor::new(
            Arc::new(ThresholdStore::new(Arc::new(
                MemoryThresholdRepository::new(),
            ))),
            Arc::new(AlertRegistry::new(alert_repo.clone(), Arc::new(NoopDispatch))),
            directory,
        );

        monitor.sweep_site(site_id).await;

        let open = alert_repo.list_open().await.unwrap();
        assert!(open
            .iter()
            .any(|a| a.alert_type == AlertType::SensorFailed
                && a.severity == AlertSeverity::Critical));
    }
}
