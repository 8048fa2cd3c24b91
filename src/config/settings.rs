//! 应用配置加载和管理

use config::{Config, ConfigError, Environment, File};
use secrecy::SecretString;
use serde::Deserialize;
use std::env;
use uuid::Uuid;

/// 应用配置结构
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub gateway: GatewaySettings,
    pub monitoring: MonitoringSettings,
    pub escalation: EscalationSettings,
    pub logging: LoggingSettings,
    #[serde(default)]
    pub smtp: SmtpSettings,
    #[serde(default)]
    pub sms: SmsSettings,
    #[serde(default)]
    pub push: PushSettings,
}

/// 传感器网关（MQTT）连接配置
#[derive(Debug, Clone, Deserialize)]
pub struct GatewaySettings {
    pub host: String,
    pub port: u16,
    /// 遥测主题
    #[serde(default = "default_topic")]
    pub topic: String,
    #[serde(default = "default_client_id_prefix")]
    pub client_id_prefix: String,
    /// 线性退避基础延迟（秒）
    #[serde(default = "default_base_delay")]
    pub reconnect_base_delay_seconds: u64,
    /// 最大重连次数，超过后链路进入终止态
    #[serde(default = "default_max_attempts")]
    pub reconnect_max_attempts: u32,
}

/// 监控管线配置
#[derive(Debug, Clone, Deserialize)]
pub struct MonitoringSettings {
    /// 订阅的站点列表
    #[serde(default)]
    pub sites: Vec<Uuid>,
    /// 传感器状态快照巡检间隔（秒）
    #[serde(default = "default_sweep_interval")]
    pub snapshot_sweep_interval_seconds: u64,
}

/// 升级调度器配置
#[derive(Debug, Clone, Deserialize)]
pub struct EscalationSettings {
    /// 扫描周期（秒）
    #[serde(default = "default_tick_interval")]
    pub tick_interval_seconds: u64,
}

impl Default for EscalationSettings {
    fn default() -> Self {
        Self {
            tick_interval_seconds: default_tick_interval(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    pub level: String,
    pub format: String,
}

/// SMTP 邮件服务配置
#[derive(Debug, Clone, Deserialize)]
pub struct SmtpSettings {
    /// 是否启用 SMTP
    #[serde(default)]
    pub enabled: bool,
    /// SMTP 服务器地址
    #[serde(default = "default_smtp_host")]
    pub host: String,
    /// SMTP 端口
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    /// SMTP 用户名
    #[serde(default)]
    pub username: String,
    /// 是否使用 TLS
    #[serde(default = "default_true")]
    pub tls: bool,
    /// 发件人邮箱
    #[serde(default)]
    pub from_email: String,
    /// 发件人名称
    #[serde(default = "default_from_name")]
    pub from_name: String,
}

impl Default for SmtpSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            host: default_smtp_host(),
            port: default_smtp_port(),
            username: String::new(),
            tls: true,
            from_email: String::new(),
            from_name: default_from_name(),
        }
    }
}

/// 短信网关（HTTP API）配置
#[derive(Debug, Clone, Deserialize)]
pub struct SmsSettings {
    /// 是否启用短信发送
    #[serde(default)]
    pub enabled: bool,
    /// 网关 API 地址
    #[serde(default)]
    pub api_url: String,
    /// 发送方署名
    #[serde(default = "default_sms_sender")]
    pub sender: String,
    /// 请求超时（秒）
    #[serde(default = "default_sms_timeout")]
    pub timeout_seconds: u64,
}

impl Default for SmsSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            api_url: String::new(),
            sender: default_sms_sender(),
            timeout_seconds: default_sms_timeout(),
        }
    }
}

/// Web Push 推送配置
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PushSettings {
    /// 是否启用推送
    #[serde(default)]
    pub enabled: bool,
}

fn default_topic() -> String { "telemetry/+/readings".to_string() }
fn default_client_id_prefix() -> String { "lotus".to_string() }
fn default_base_delay() -> u64 { 5 }
fn default_max_attempts() -> u32 { 10 }
fn default_sweep_interval() -> u64 { 300 }
fn default_tick_interval() -> u64 { 60 }
fn default_smtp_host() -> String { "smtp.example.com".to_string() }
fn default_smtp_port() -> u16 { 587 }
fn default_from_name() -> String { "Lotus".to_string() }
fn default_sms_sender() -> String { "Lotus".to_string() }
fn default_sms_timeout() -> u64 { 5 }
fn default_true() -> bool { true }

impl Settings {
    /// 从配置文件和环境变量加载配置
    pub fn load() -> Result<Self, ConfigError> {
        let run_mode = env::var("APP_ENV").unwrap_or_else(|_| "development".into());

        let settings = Config::builder()
            // 加载默认配置
            .add_source(File::with_name("config/development"))
            // 根据环境加载对应配置
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // 环境变量覆盖，前缀 LOTUS，分隔符 __
            .add_source(
                Environment::with_prefix("LOTUS")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        settings.try_deserialize()
    }

    /// 获取 SMTP 密码（从环境变量）
    pub fn smtp_password() -> Option<SecretString> {
        env::var("SMTP_PASSWORD").ok().map(SecretString::new)
    }

    /// 获取短信网关 API 密钥（从环境变量）
    pub fn sms_api_key() -> Option<SecretString> {
        env::var("SMS_API_KEY").ok().map(SecretString::new)
    }

    /// 获取 VAPID 私钥（从环境变量，base64 url-safe 编码）
    pub fn vapid_private_key() -> Option<SecretString> {
        env::var("VAPID_PRIVATE_KEY").ok().map(SecretString::new)
    }

    /// 获取 VAPID 公钥（从环境变量）
    pub fn vapid_public_key() -> Option<String> {
        env::var("VAPID_PUBLIC_KEY").ok()
    }
}
