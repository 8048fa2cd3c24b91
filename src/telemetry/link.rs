//! 遥测链路
//!
//! 维护到传感器网关的长连接：断线按线性退避重连，重连次数耗尽后
//! 进入终止态并向所有订阅者广播 LinkDown。每条读数规范化后按站点
//! 分发，单个订阅者的消费速度不影响其他订阅者。

use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::Reading;
use crate::telemetry::backoff::BackoffPolicy;
use crate::telemetry::payload::parse_reading;
use crate::telemetry::transport::TelemetryTransport;

/// 每站点历史读数缓冲上限
const HISTORY_CAPACITY: usize = 1024;

/// 链路事件
#[derive(Debug, Clone)]
pub enum LinkEvent {
    /// 一条规范化读数
    Reading(Reading),
    /// 链路终止（重连次数耗尽），订阅者不会再收到读数
    LinkDown,
}

type SubscriberMap = HashMap<Uuid, HashMap<Uuid, mpsc::UnboundedSender<LinkEvent>>>;

/// 订阅句柄
///
/// 持有事件接收端；drop 或调用 `unsubscribe` 即取消注册。
pub struct Subscription {
    id: Uuid,
    site_id: Uuid,
    receiver: mpsc::UnboundedReceiver<LinkEvent>,
    subscribers: Arc<RwLock<SubscriberMap>>,
}

impl Subscription {
    /// 接收下一个链路事件；链路关闭且无缓存事件时返回 None
    pub async fn recv(&mut self) -> Option<LinkEvent> {
        self.receiver.recv().await
    }

    /// 显式取消订阅
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Ok(mut subs) = self.subscribers.write() {
            if let Some(site_subs) = subs.get_mut(&self.site_id) {
                site_subs.remove(&self.id);
                if site_subs.is_empty() {
                    subs.remove(&self.site_id);
                }
            }
        }
    }
}

/// 遥测链路
pub struct TelemetryLink {
    transport: Arc<dyn TelemetryTransport>,
    backoff: BackoffPolicy,
    subscribers: Arc<RwLock<SubscriberMap>>,
    history: RwLock<HashMap<Uuid, VecDeque<Reading>>>,
    // 终止态锁存：链路终止后注册的订阅者也能立刻收到 LinkDown
    link_down: AtomicBool,
}

impl TelemetryLink {
    pub fn new(transport: Arc<dyn TelemetryTransport>, backoff: BackoffPolicy) -> Self {
        Self {
            transport,
            backoff,
            subscribers: Arc::new(RwLock::new(HashMap::new())),
            history: RwLock::new(HashMap::new()),
            link_down: AtomicBool::new(false),
        }
    }

    /// 订阅某站点的读数流
    pub fn subscribe(&self, site_id: Uuid) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();
        {
            // 注册与终止态检查持同一把锁，与广播互斥，事件恰好一次
            let mut subscribers = self.subscribers.write().expect("订阅表锁中毒");
            if self.link_down.load(Ordering::SeqCst) {
                let _ = tx.send(LinkEvent::LinkDown);
            }
            subscribers.entry(site_id).or_default().insert(id, tx);
        }
        Subscription {
            id,
            site_id,
            receiver: rx,
            subscribers: self.subscribers.clone(),
        }
    }

    /// 查询站点在时间范围内的历史读数（内存环形缓冲，用于回填/图表）
    pub fn get_history(
        &self,
        site_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Vec<Reading> {
        self.history
            .read()
            .expect("历史缓冲锁中毒")
            .get(&site_id)
            .map(|buf| {
                buf.iter()
                    .filter(|r| r.observed_at >= from && r.observed_at <= to)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// 链路主循环（独立任务运行，收到关闭信号后返回）
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut attempts: u32 = 0;
        // 每传感器最近一次读数时间，用于幂等去重
        let mut last_seen: HashMap<Uuid, DateTime<Utc>> = HashMap::new();

        loop {
            if *shutdown.borrow() {
                info!("遥测链路收到关闭信号，退出");
                return;
            }

            match self.transport.connect().await {
                Ok(mut stream) => {
                    // 连接建立，重连计数归零
                    attempts = 0;
                    info!("遥测链路已建立");

                    loop {
                        tokio::select! {
                            _ = shutdown.changed() => {
                                if *shutdown.borrow() {
                                    info!("遥测链路收到关闭信号，退出");
                                    return;
                                }
                            }
                            msg = stream.next_message() => match msg {
                                Ok(Some(raw)) => self.handle_raw(&raw, &mut last_seen),
                                Ok(None) => {
                                    warn!("遥测链路被对端关闭");
                                    break;
                                }
                                Err(e) => {
                                    warn!(error = %e, "遥测链路读取失败");
                                    break;
                                }
                            }
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, "遥测链路连接失败");
                }
            }

            attempts += 1;
            match self.backoff.delay_for(attempts) {
                Some(delay) => {
                    info!(attempts, delay_secs = delay.as_secs(), "遥测链路将重连");
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = shutdown.changed() => {
                            if *shutdown.borrow() {
                                info!("遥测链路收到关闭信号，退出");
                                return;
                            }
                        }
                    }
                }
                None => {
                    error!(attempts, "遥测链路重连次数耗尽，进入终止态");
                    self.broadcast_link_down();
                    return;
                }
            }
        }
    }

    /// 解析并分发一条原始报文；解析失败只记日志，绝不中断链路
    fn handle_raw(&self, raw: &str, last_seen: &mut HashMap<Uuid, DateTime<Utc>>) {
        let reading = match parse_reading(raw) {
            Ok(reading) => reading,
            Err(e) => {
                warn!(error = %e, "读数解析失败，消息已丢弃");
                return;
            }
        };

        // 幂等去重：同一传感器时间戳不前进的读数直接忽略
        if let Some(last) = last_seen.get(&reading.sensor_id) {
            if reading.observed_at <= *last {
                debug!(
                    sensor_id = %reading.sensor_id,
                    observed_at = %reading.observed_at,
                    "重复读数已忽略"
                );
                return;
            }
        }
        last_seen.insert(reading.sensor_id, reading.observed_at);

        // 写入历史缓冲
        {
            let mut history = self.history.write().expect("历史缓冲锁中毒");
            let buf = history.entry(reading.site_id).or_default();
            if buf.len() == HISTORY_CAPACITY {
                buf.pop_front();
            }
            buf.push_back(reading.clone());
        }

        // 按站点分发；单个订阅者失败不影响其他订阅者
        let subs = self.subscribers.read().expect("订阅表锁中毒");
        if let Some(site_subs) = subs.get(&reading.site_id) {
            for tx in site_subs.values() {
                let _ = tx.send(LinkEvent::Reading(reading.clone()));
            }
        }
    }

    /// 向所有订阅者广播链路终止，并锁存终止态
    fn broadcast_link_down(&self) {
        let subs = self.subscribers.write().expect("订阅表锁中毒");
        self.link_down.store(true, Ordering::SeqCst);
        for site_subs in subs.values() {
            for tx in site_subs.values() {
                let _ = tx.send(LinkEvent::LinkDown);
            }
        }
    }
}
