//! Lotus - 水库远程监测与预警核心
//!
//! 组装并运行监控管线：遥测链路 → 评估 → 登记 → 通知 → 升级。

use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lotus::{
    channels::{ChannelSender, EmailSender, SmsSender, WebPushSender},
    config::Settings,
    models::NotificationFrequency,
    repositories::{
        MemoryAlertRepository, MemoryNotificationSettingsRepository, MemorySensorDirectory,
        MemoryThresholdRepository,
    },
    services::{
        AlertRegistry, EscalationScheduler, Monitor, NotificationDispatcher, ThresholdStore,
    },
    telemetry::{BackoffPolicy, MqttTransport, TelemetryLink},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 加载环境变量
    dotenvy::dotenv().ok();

    // 初始化日志
    init_tracing();

    info!("🪷 Lotus 监控核心启动中...");

    // 加载配置
    let settings = Settings::load()?;
    info!("✅ 配置加载完成");

    // 初始化仓库（持久化由外部系统承接，此处为内存实现）
    let alert_repo = Arc::new(MemoryAlertRepository::new());
    let threshold_repo = Arc::new(MemoryThresholdRepository::new());
    let settings_repo = Arc::new(MemoryNotificationSettingsRepository::default());
    let sensor_directory = Arc::new(MemorySensorDirectory::new());

    // 初始化通知渠道（未配置的渠道跳过）
    let mut senders: Vec<Arc<dyn ChannelSender>> = Vec::new();
    match EmailSender::new(&settings) {
        Ok(sender) => senders.push(Arc::new(sender)),
        Err(e) => warn!(error = %e, "邮件渠道未启用"),
    }
    match SmsSender::new(&settings) {
        Ok(sender) => senders.push(Arc::new(sender)),
        Err(e) => warn!(error = %e, "短信渠道未启用"),
    }
    match WebPushSender::new(&settings) {
        Ok(sender) => senders.push(Arc::new(sender)),
        Err(e) => warn!(error = %e, "推送渠道未启用"),
    }
    info!(channels = senders.len(), "✅ 通知渠道初始化完成");

    // 初始化服务（升级调度器与通知调度器相互依赖，延迟注入）
    let escalation = Arc::new(EscalationScheduler::new(alert_repo.clone()));
    let dispatcher = Arc::new(NotificationDispatcher::new(
        settings_repo.clone(),
        senders,
        escalation.clone(),
    ));
    escalation.set_dispatcher(dispatcher.clone());

    let threshold_store = Arc::new(ThresholdStore::new(threshold_repo.clone()));
    let registry = Arc::new(AlertRegistry::new(alert_repo.clone(), dispatcher.clone()));
    let monitor = Arc::new(Monitor::new(
        threshold_store.clone(),
        registry.clone(),
        sensor_directory.clone(),
    ));

    // 初始化遥测链路
    let backoff = BackoffPolicy::new(
        Duration::from_secs(settings.gateway.reconnect_base_delay_seconds),
        settings.gateway.reconnect_max_attempts,
    );
    let transport = Arc::new(MqttTransport::new(settings.gateway.clone()));
    let link = Arc::new(TelemetryLink::new(transport, backoff));
    info!("✅ 服务初始化完成");

    // 优雅关闭信号
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let mut tasks = Vec::new();

    // 各站点消费任务
    for site_id in &settings.monitoring.sites {
        let subscription = link.subscribe(*site_id);
        tasks.push(tokio::spawn(monitor.clone().run_site(
            *site_id,
            subscription,
            shutdown_rx.clone(),
        )));
    }

    // 遥测链路
    tasks.push(tokio::spawn(link.clone().run(shutdown_rx.clone())));

    // 快照巡检
    tasks.push(tokio::spawn(monitor.clone().run_snapshot_sweep(
        settings.monitoring.sites.clone(),
        Duration::from_secs(settings.monitoring.snapshot_sweep_interval_seconds),
        shutdown_rx.clone(),
    )));

    // 升级调度器
    tasks.push(tokio::spawn(escalation.clone().run(
        Duration::from_secs(settings.escalation.tick_interval_seconds),
        shutdown_rx.clone(),
    )));

    // 摘要刷新任务
    tasks.push(tokio::spawn(run_digest_flush(
        dispatcher.clone(),
        shutdown_rx.clone(),
    )));

    info!(sites = settings.monitoring.sites.len(), "🚀 监控管线已启动");

    // 等待退出信号
    tokio::signal::ctrl_c().await?;
    info!("收到退出信号，开始优雅关闭...");
    shutdown_tx.send(true)?;

    for task in tasks {
        if let Err(e) = task.await {
            warn!(error = %e, "任务退出异常");
        }
    }

    info!("👋 Lotus 已关闭");
    Ok(())
}

/// 摘要刷新循环：每小时刷新 hourly 队列，UTC 零点刷新 daily 队列
async fn run_digest_flush(
    dispatcher: Arc<NotificationDispatcher>,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(Duration::from_secs(3600));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                dispatcher.flush_digests(NotificationFrequency::Hourly).await;
                if chrono::Utc::now().format("%H").to_string() == "00" {
                    dispatcher.flush_digests(NotificationFrequency::Daily).await;
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("摘要刷新任务收到关闭信号，退出");
                    return;
                }
            }
        }
    }
}

/// 初始化日志系统
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,lotus=debug"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}
