//! 批量检测执行器
//!
//! 以固定并发度分组探测目标，组与组之间冷却一段时间，
//! 并把每个目标的结果写回存储。单个目标写回失败不会中断整批。

use crate::error::StoreError;
use crate::health::checker::LinkProber;
use crate::health::result::{CheckResult, CheckTarget, LinkStatus};
use crate::store::TargetStore;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};
use uuid::Uuid;

/// 批量执行参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSettings {
    /// 每组并发探测数
    pub concurrency: usize,
    /// 组间冷却时间
    pub cooldown: Duration,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            concurrency: 5,
            cooldown: Duration::from_secs(2),
        }
    }
}

/// 单个目标的失败记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchFailure {
    /// 目标ID
    pub id: String,
    /// 失败原因
    pub reason: String,
}

/// 批量检测汇总
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    /// 本轮ID，用于关联日志
    pub run_id: Uuid,
    /// 开始时间
    pub started_at: DateTime<Utc>,
    /// 结束时间
    pub finished_at: DateTime<Utc>,
    /// 探测的目标总数
    pub total: usize,
    /// 结果为正常的数量
    pub ok: usize,
    /// 结果为失效的数量
    pub broken: usize,
    /// 结果为超时的数量
    pub timeout: usize,
    /// 成功写回的结果
    pub succeeded: Vec<CheckResult>,
    /// 写回失败的目标
    pub failed: Vec<BatchFailure>,
}

impl BatchReport {
    fn new() -> Self {
        let now = Utc::now();
        Self {
            run_id: Uuid::new_v4(),
            started_at: now,
            finished_at: now,
            total: 0,
            ok: 0,
            broken: 0,
            timeout: 0,
            succeeded: Vec::new(),
            failed: Vec::new(),
        }
    }

    /// 空的汇总（没有可检测目标时使用）
    pub fn empty() -> Self {
        Self::new()
    }

    /// 成功写回的目标ID
    pub fn checked_ids(&self) -> Vec<String> {
        self.succeeded.iter().map(|r| r.id.clone()).collect()
    }

    fn record(&mut self, id: String, result: Result<CheckResult, StoreError>) {
        self.total += 1;
        match result {
            Ok(check) => {
                match check.status {
                    LinkStatus::Ok => self.ok += 1,
                    LinkStatus::Broken => self.broken += 1,
                    LinkStatus::Timeout => self.timeout += 1,
                    LinkStatus::Unknown => {}
                }
                self.succeeded.push(check);
            }
            Err(e) => {
                error!("写回检测结果失败 {}: {}", id, e);
                self.failed.push(BatchFailure {
                    id,
                    reason: e.to_string(),
                });
            }
        }
    }
}

/// 批量检测执行器
pub struct BatchRunner {
    /// 链接探测器
    prober: Arc<dyn LinkProber>,
    /// 存储协作方
    store: Arc<dyn TargetStore>,
    /// 执行参数
    settings: BatchSettings,
}

impl BatchRunner {
    /// 创建新的批量检测执行器
    ///
    /// # 参数
    /// * `prober` - 链接探测器
    /// * `store` - 存储协作方
    /// * `settings` - 执行参数
    pub fn new(
        prober: Arc<dyn LinkProber>,
        store: Arc<dyn TargetStore>,
        settings: BatchSettings,
    ) -> Self {
        Self {
            prober,
            store,
            settings,
        }
    }

    /// 执行参数
    pub fn settings(&self) -> &BatchSettings {
        &self.settings
    }

    /// 探测单个目标并写回结果
    ///
    /// 探测本身不会失败，只有写回可能返回错误
    pub async fn check_one(&self, target: &CheckTarget) -> Result<CheckResult, StoreError> {
        let outcome = self.prober.probe(&target.url).await;
        let result = target.result_for(outcome);

        self.store
            .write_check_result(
                &result.id,
                result.status,
                result.http_status,
                Some(result.fail_count),
            )
            .await?;

        debug!(
            "目标检测完成: {} -> {} (失败次数 {})",
            result.id, result.status, result.fail_count
        );
        Ok(result)
    }

    /// 批量检测
    ///
    /// # 参数
    /// * `targets` - 待检测目标
    ///
    /// # 返回
    /// * `BatchReport` - 汇总结果，写回失败记录在 `failed` 中
    pub async fn run_batch(&self, targets: &[CheckTarget]) -> BatchReport {
        let mut report = BatchReport::new();
        if targets.is_empty() {
            return report;
        }

        let group_size = self.settings.concurrency.max(1);
        let group_count = targets.len().div_ceil(group_size);
        info!(
            "开始批量检测[{}]: {} 个目标，分 {} 组",
            report.run_id,
            targets.len(),
            group_count
        );

        for (index, group) in targets.chunks(group_size).enumerate() {
            let futures = group.iter().map(|target| async move {
                (target.id.clone(), self.check_one(target).await)
            });

            for (id, result) in join_all(futures).await {
                report.record(id, result);
            }

            if index + 1 < group_count && !self.settings.cooldown.is_zero() {
                tokio::time::sleep(self.settings.cooldown).await;
            }
        }

        report.finished_at = Utc::now();
        info!(
            "批量检测完成[{}]: 共 {}，正常 {}，失效 {}，超时 {}，写回失败 {}",
            report.run_id,
            report.total,
            report.ok,
            report.broken,
            report.timeout,
            report.failed.len()
        );
        report
    }
}
