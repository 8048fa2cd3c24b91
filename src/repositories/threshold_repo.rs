//! 阈值覆盖数据访问层

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::errors::AppError;
use crate::models::{ThresholdPatch, ThresholdScope};

/// 阈值覆盖仓库接口
///
/// 只存储各作用域的"补丁"，完整配置由 ThresholdStore 合并得出。
#[async_trait]
pub trait ThresholdRepository: Send + Sync {
    async fn load(&self, scope: ThresholdScope) -> Result<Option<ThresholdPatch>, AppError>;

    async fn save(&self, scope: ThresholdScope, patch: &ThresholdPatch) -> Result<(), AppError>;

    async fn delete(&self, scope: ThresholdScope) -> Result<(), AppError>;
}

/// 内存实现
#[derive(Default)]
pub struct MemoryThresholdRepository {
    patches: RwLock<HashMap<ThresholdScope, ThresholdPatch>>,
}

impl MemoryThresholdRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ThresholdRepository for MemoryThresholdRepository {
    async fn load(&self, scope: ThresholdScope) -> Result<Option<ThresholdPatch>, AppError> {
        Ok(self.patches.read().await.get(&scope).copied())
    }

    async fn save(&self, scope: ThresholdScope, patch: &ThresholdPatch) -> Result<(), AppError> {
        self.patches.write().await.insert(scope, *patch);
        Ok(())
    }

    async fn delete(&self, scope: ThresholdScope) -> Result<(), AppError> {
        self.patches.write().await.remove(&scope);
        Ok(())
    }
}
