//! 数据访问层（Repository）

mod alert_repo;
mod sensor_repo;
mod settings_repo;
mod threshold_repo;

pub use alert_repo::{AlertRepository, MemoryAlertRepository};
pub use sensor_repo::{MemorySensorDirectory, SensorDirectory};
pub use settings_repo::{MemoryNotificationSettingsRepository, NotificationSettingsRepository};
pub use threshold_repo::{MemoryThresholdRepository, ThresholdRepository};
