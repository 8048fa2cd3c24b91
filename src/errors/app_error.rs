//! 统一错误类型定义
//!
//! 本核心中没有任何错误会终止进程：链路错误走重连，解析错误丢弃
//! 记日志，持久化错误重试一次后上抛，发送错误按渠道隔离。

use crate::models::NotificationChannel;

/// 应用错误类型
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // 遥测链路错误（可通过重连恢复）
    #[error("遥测链路错误: {0}")]
    LinkError(String),

    // 链路终止（重连次数耗尽）
    #[error("遥测链路已终止")]
    LinkDown,

    // 读数解析错误（丢弃消息，不致命）
    #[error("读数解析失败: {0}")]
    ParseError(String),

    // 持久化错误（重试一次后上抛）
    #[error("持久化失败: {0}")]
    PersistenceError(String),

    // 通知发送错误（按渠道记录，不阻塞其他渠道）
    #[error("通知发送失败 [{channel:?}]: {reason}")]
    DispatchError {
        channel: NotificationChannel,
        reason: String,
    },

    // 请求验证错误
    #[error("请求参数无效: {0}")]
    ValidationError(String),

    // 资源不存在
    #[error("资源不存在: {0}")]
    NotFound(String),

    // 配置错误
    #[error("配置错误: {0}")]
    ConfigError(String),

    // 内部错误
    #[error("内部服务错误: {0}")]
    InternalError(String),
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::ParseError(err.to_string())
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(err.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::ValidationError(err.to_string())
    }
}
