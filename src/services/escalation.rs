//! 升级调度器
//!
//! 单定时循环：扫描登记为自动升级、超过升级延迟仍未确认的预警，
//! 严重程度升一档（封顶 Critical）并重新通知一次。同一检测实例
//! 只升级一次（`escalated_at` 标记），确认后的新实例重新计时。
//! 截止时间按 `<= now` 判定，错过的周期在下一次 tick 一次性补上，
//! 不会重复触发。

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::repositories::AlertRepository;
use crate::services::registry::AlertDispatch;

/// 升级调度器
pub struct EscalationScheduler {
    alert_repo: Arc<dyn AlertRepository>,
    // 预警 ID → 升级截止时间
    registrations: Mutex<HashMap<Uuid, DateTime<Utc>>>,
    // 延迟注入，化解与 NotificationDispatcher 的相互依赖
    dispatcher: RwLock<Option<Arc<dyn AlertDispatch>>>,
}

impl EscalationScheduler {
    pub fn new(alert_repo: Arc<dyn AlertRepository>) -> Self {
        Self {
            alert_repo,
            registrations: Mutex::new(HashMap::new()),
            dispatcher: RwLock::new(None),
        }
    }

    /// 注入通知调度器（构造完成后调用一次）
    pub fn set_dispatcher(&self, dispatcher: Arc<dyn AlertDispatch>) {
        *self.dispatcher.write().expect("调度器锁中毒") = Some(dispatcher);
    }

    /// 登记一条预警，`delay_minutes` 分钟后仍未确认则升级
    pub fn register(&self, alert_id: Uuid, delay_minutes: i64) {
        let deadline = Utc::now() + Duration::minutes(delay_minutes);
        self.register_with_deadline(alert_id, deadline);
    }

    /// 以显式截止时间登记（测试入口）
    ///
    /// 同一预警重复登记保留首次截止时间：升级前的重复通知
    /// 不得把截止时间推后到创建时刻 + 升级延迟之外。
    pub fn register_with_deadline(&self, alert_id: Uuid, deadline: DateTime<Utc>) {
        self.registrations
            .lock()
            .expect("登记表锁中毒")
            .entry(alert_id)
            .or_insert(deadline);
        debug!(alert_id = %alert_id, deadline = %deadline, "预警已登记自动升级");
    }

    /// 执行一次扫描，返回本次升级的预警数
    pub async fn tick(&self, now: DateTime<Utc>) -> usize {
        let due: Vec<Uuid> = {
            let registrations = self.registrations.lock().expect("登记表锁中毒");
            registrations
                .iter()
                .filter(|(_, deadline)| **deadline <= now)
                .map(|(id, _)| *id)
                .collect()
        };

        let mut escalated = 0;
        for alert_id in due {
            match self.escalate(alert_id, now).await {
                Ok(true) => escalated += 1,
                Ok(false) => {}
                Err(e) => {
                    // 单条失败不影响其余预警；登记保留，下个 tick 再试
                    error!(alert_id = %alert_id, error = %e, "预警升级失败");
                    continue;
                }
            }
            self.registrations
                .lock()
                .expect("登记表锁中毒")
                .remove(&alert_id);
        }
        escalated
    }

    /// 升级单条预警；返回是否实际执行了升级
    async fn escalate(&self, alert_id: Uuid, now: DateTime<Utc>) -> Result<bool, AppError> {
        let alert = match self.alert_repo.get(alert_id).await? {
            Some(alert) => alert,
            None => {
                warn!(alert_id = %alert_id, "登记的预警不存在，跳过升级");
                return Ok(false);
            }
        };

        // 已确认或已升级过的实例不再升级
        if alert.is_read || alert.escalated_at.is_some() {
            return Ok(false);
        }

        let mut promoted = alert.clone();
        promoted.severity = alert.severity.promoted();
        promoted.escalated_at = Some(now);

        // 持久化重试一次
        if let Err(first) = self.alert_repo.update(&promoted).await {
            warn!(error = %first, "升级持久化失败，重试一次");
            self.alert_repo.update(&promoted).await?;
        }

        info!(
            alert_id = %alert_id,
            from = ?alert.severity,
            to = ?promoted.severity,
            "未确认预警已升级"
        );

        let dispatcher = self.dispatcher.read().expect("调度器锁中毒").clone();
        match dispatcher {
            Some(dispatcher) => dispatcher.dispatch_alert(promoted).await,
            None => warn!("通知调度器未注入，升级后未重新通知"),
        }
        Ok(true)
    }

    /// 定时循环（独立任务运行，收到关闭信号后返回）
    pub async fn run(
        self: Arc<Self>,
        period: std::time::Duration,
        mut shutdown: tokio::sync::watch::Receiver<bool>,
    ) {
        let mut interval = tokio::time::interval(period);
        // 进程暂停错过的 tick 合并为一次，靠截止时间判定补扫
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick(Utc::now()).await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("升级调度器收到关闭信号，退出");
                        return;
                    }
                }
            }
        }
    }
}
