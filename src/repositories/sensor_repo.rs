//! 传感器目录数据访问层
//!
//! 传感器台账由外部系统维护，本核心只消费状态快照。

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::SensorSnapshot;

/// 传感器目录接口
#[async_trait]
pub trait SensorDirectory: Send + Sync {
    /// 获取某站点全部传感器的当前状态快照
    async fn snapshots(&self, site_id: Uuid) -> Result<Vec<SensorSnapshot>, AppError>;
}

/// 内存实现
#[derive(Default)]
pub struct MemorySensorDirectory {
    sensors: RwLock<HashMap<Uuid, Vec<SensorSnapshot>>>,
}

impl MemorySensorDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// 写入/覆盖某站点的快照集合
    pub async fn put_site(&self, site_id: Uuid, snapshots: Vec<SensorSnapshot>) {
        self.sensors.write().await.insert(site_id, snapshots);
    }
}

#[async_trait]
impl SensorDirectory for MemorySensorDirectory {
    async fn snapshots(&self, site_id: Uuid) -> Result<Vec<SensorSnapshot>, AppError> {
        Ok(self
            .sensors
            .read()
            .await
            .get(&site_id)
            .cloned()
            .unwrap_or_default())
    }
}
