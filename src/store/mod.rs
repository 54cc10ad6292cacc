//! 检测目标存储模块
//!
//! 定义核心需要的外部存储协作方接口。检测目标的所有数据由协作方持有，
//! 核心只发起资格查询和结果写回。

pub mod memory;

use crate::error::StoreError;
use crate::health::{CheckTarget, LinkStatus};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use memory::MemoryTargetStore;

/// 所有者保存的调度偏好
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerPreferences {
    /// 是否启用周期检测
    pub enabled: bool,
    /// 检测间隔（分钟）
    pub interval_minutes: u64,
    /// 每轮最多检测的目标数
    pub batch_size: usize,
}

/// 存储协作方trait
#[async_trait]
pub trait TargetStore: Send + Sync {
    /// 列出当前可检测的目标
    ///
    /// 实现方需要按照 [`crate::health::backoff`] 中的资格条件过滤并排序
    ///
    /// # 参数
    /// * `limit` - 最多返回的目标数
    /// * `owner_id` - 所有者范围，None表示不限所有者
    async fn list_eligible_targets(
        &self,
        limit: usize,
        owner_id: Option<&str>,
    ) -> Result<Vec<CheckTarget>, StoreError>;

    /// 原子写回检测结果，同时把最近检测时间设为当前时间
    ///
    /// # 参数
    /// * `id` - 目标ID
    /// * `status` - 新状态
    /// * `http_status` - HTTP状态码
    /// * `fail_count` - 新的连续失败次数，None表示保持不变
    async fn write_check_result(
        &self,
        id: &str,
        status: LinkStatus,
        http_status: Option<u16>,
        fail_count: Option<u32>,
    ) -> Result<(), StoreError>;

    /// 读取所有者的调度偏好
    async fn get_owner_preferences(
        &self,
        owner_id: &str,
    ) -> Result<Option<OwnerPreferences>, StoreError>;

    /// 按ID读取单个目标
    async fn get_target(&self, id: &str) -> Result<Option<CheckTarget>, StoreError>;

    /// 列出某个所有者的目标，可按ID过滤
    async fn list_targets(
        &self,
        owner_id: Option<&str>,
        ids: Option<&[String]>,
    ) -> Result<Vec<CheckTarget>, StoreError>;
}
