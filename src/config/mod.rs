//! 配置管理模块

mod settings;

pub use settings::{
    EscalationSettings, GatewaySettings, LoggingSettings, MonitoringSettings, PushSettings,
    Settings, SmsSettings, SmtpSettings,
};
