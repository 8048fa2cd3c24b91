//! 通知设置数据访问层
//!
//! 通知设置由设置子系统（外部协作方）维护，调度器只读。

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::errors::AppError;
use crate::models::NotificationSettings;

/// 通知设置仓库接口
#[async_trait]
pub trait NotificationSettingsRepository: Send + Sync {
    async fn get(&self) -> Result<NotificationSettings, AppError>;
}

/// 内存实现（测试与单机运行）
pub struct MemoryNotificationSettingsRepository {
    settings: RwLock<NotificationSettings>,
}

impl MemoryNotificationSettingsRepository {
    pub fn new(settings: NotificationSettings) -> Self {
        Self {
            settings: RwLock::new(settings),
        }
    }

    /// 替换当前设置（供设置子系统写入）
    pub async fn set(&self, settings: NotificationSettings) {
        *self.settings.write().await = settings;
    }
}

impl Default for MemoryNotificationSettingsRepository {
    fn default() -> Self {
        Self::new(NotificationSettings::default())
    }
}

#[async_trait]
impl NotificationSettingsRepository for MemoryNotificationSettingsRepository {
    async fn get(&self) -> Result<NotificationSettings, AppError> {
        Ok(self.settings.read().await.clone())
    }
}
