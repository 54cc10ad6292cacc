//! 链接健康服务
//!
//! 对调用方暴露的入口：单目标检测、批量检测、调度状态查询与配置。
//! 负责把探测器、批量执行器和调度注册表组装到一起，并管理它们的生命周期。

use crate::config::GlobalConfig;
use crate::error::{Result, StoreError};
use crate::guard::{SsrfGuard, SystemResolver};
use crate::health::batch::{BatchFailure, BatchRunner, BatchSettings};
use crate::health::checker::{HttpLinkProber, LinkProber};
use crate::health::result::LinkStatus;
use crate::health::scheduler::{RunOutcome, SchedulerRegistry, SchedulerStatus, Scope};
use crate::store::TargetStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{error, info, warn};

/// 单目标检测结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckReport {
    /// 目标ID
    pub id: String,
    /// 检测状态
    pub status: LinkStatus,
    /// HTTP状态码
    pub http_status: Option<u16>,
    /// 新的连续失败次数
    pub fail_count: u32,
    /// 检测时间
    pub last_checked_at: DateTime<Utc>,
}

/// 批量检测结果
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkCheckReport {
    /// 已检测并写回的目标ID
    pub checked_ids: Vec<String>,
    /// 失败的目标
    pub failed: Vec<BatchFailure>,
}

/// 链接健康服务
pub struct LinkHealthService {
    /// 存储协作方
    store: Arc<dyn TargetStore>,
    /// 批量检测执行器
    runner: Arc<BatchRunner>,
    /// 调度注册表
    registry: SchedulerRegistry,
}

impl LinkHealthService {
    /// 使用已有组件创建服务
    ///
    /// # 参数
    /// * `store` - 存储协作方
    /// * `prober` - 链接探测器
    /// * `batch_settings` - 批量执行参数
    pub fn new(
        store: Arc<dyn TargetStore>,
        prober: Arc<dyn LinkProber>,
        batch_settings: BatchSettings,
    ) -> Self {
        let runner = Arc::new(BatchRunner::new(prober, Arc::clone(&store), batch_settings));
        let registry = SchedulerRegistry::new(Arc::clone(&store), Arc::clone(&runner));
        Self {
            store,
            runner,
            registry,
        }
    }

    /// 根据全局配置组装真实的SSRF守卫和HTTP探测器
    ///
    /// # 参数
    /// * `config` - 全局配置
    /// * `store` - 存储协作方
    ///
    /// # 返回
    /// * `Result<Self>` - HTTP客户端构建失败时返回错误
    pub fn from_config(config: &GlobalConfig, store: Arc<dyn TargetStore>) -> Result<Self> {
        let resolver = Arc::new(SystemResolver::new(config.dns_timeout()));
        let guard = Arc::new(SsrfGuard::new(resolver));
        let prober = Arc::new(HttpLinkProber::new(guard, config.probe_settings())?);
        Ok(Self::new(store, prober, config.batch_settings()))
    }

    /// 存储协作方
    pub fn store(&self) -> &Arc<dyn TargetStore> {
        &self.store
    }

    /// 调度注册表
    pub fn registry(&self) -> &SchedulerRegistry {
        &self.registry
    }

    /// 立即检测单个目标
    ///
    /// 不受退避窗口限制；仍然经过SSRF守卫和超时控制
    ///
    /// # 参数
    /// * `target_id` - 目标ID
    ///
    /// # 返回
    /// * `Result<CheckReport>` - 目标不存在或写回失败时返回错误
    pub async fn check(&self, target_id: &str) -> Result<CheckReport> {
        let target = self
            .store
            .get_target(target_id)
            .await?
            .ok_or_else(|| StoreError::TargetNotFound {
                id: target_id.to_string(),
            })?;

        let result = self.runner.check_one(&target).await?;
        let last_checked_at = self
            .store
            .get_target(target_id)
            .await?
            .and_then(|t| t.last_checked_at)
            .unwrap_or_else(Utc::now);

        info!("单目标检测完成: {} -> {}", result.id, result.status);
        Ok(CheckReport {
            id: result.id,
            status: result.status,
            http_status: result.http_status,
            fail_count: result.fail_count,
            last_checked_at,
        })
    }

    /// 批量检测某个所有者的目标
    ///
    /// # 参数
    /// * `owner_id` - 所有者ID
    /// * `target_ids` - 要检测的目标，None表示该所有者的全部目标
    ///
    /// # 返回
    /// * `BulkCheckReport` - 不存在或不属于该所有者的ID会列入 `failed`；
    ///   读取目标失败且未指定ID时，`failed` 中只有一条以所有者ID为键的记录
    pub async fn bulk_check(&self, owner_id: &str, target_ids: Option<&[String]>) -> BulkCheckReport {
        let targets = match self.store.list_targets(Some(owner_id), target_ids).await {
            Ok(targets) => targets,
            Err(e) => {
                error!("读取所有者目标失败 {}: {}", owner_id, e);
                let reason = e.to_string();
                let failed = match target_ids {
                    Some(ids) => ids
                        .iter()
                        .map(|id| BatchFailure {
                            id: id.clone(),
                            reason: reason.clone(),
                        })
                        .collect(),
                    None => vec![BatchFailure {
                        id: owner_id.to_string(),
                        reason,
                    }],
                };
                return BulkCheckReport {
                    checked_ids: Vec::new(),
                    failed,
                };
            }
        };

        let mut missing = Vec::new();
        if let Some(ids) = target_ids {
            let found: HashSet<&str> = targets.iter().map(|t| t.id.as_str()).collect();
            for id in ids {
                if !found.contains(id.as_str()) {
                    warn!("批量检测跳过不存在的目标: {} (所有者 {})", id, owner_id);
                    missing.push(BatchFailure {
                        id: id.clone(),
                        reason: StoreError::TargetNotFound { id: id.clone() }.to_string(),
                    });
                }
            }
        }

        let report = self.runner.run_batch(&targets).await;
        let mut failed = report.failed.clone();
        failed.extend(missing);

        BulkCheckReport {
            checked_ids: report.checked_ids(),
            failed,
        }
    }

    /// 查询所有者的调度状态
    pub fn get_scheduler_status(&self, owner_id: &str) -> SchedulerStatus {
        self.registry.status(&Scope::owner(owner_id))
    }

    /// 设置所有者的调度配置
    ///
    /// 间隔和批量大小不足下限时会被修正，不会报错
    pub fn set_scheduler_config(
        &self,
        owner_id: &str,
        enabled: bool,
        interval_minutes: u64,
        batch_size: usize,
    ) -> SchedulerStatus {
        self.registry
            .configure(Scope::owner(owner_id), enabled, interval_minutes, batch_size)
    }

    /// 立即为所有者执行一轮检测
    pub async fn run_now(&self, owner_id: &str) -> RunOutcome {
        self.registry.run_now(&Scope::owner(owner_id)).await
    }

    /// 读取存储中的所有者偏好并应用
    ///
    /// # 返回
    /// * `Result<Option<SchedulerStatus>>` - 没有保存偏好时返回None
    pub async fn apply_owner_preferences(&self, owner_id: &str) -> Result<Option<SchedulerStatus>> {
        let Some(preferences) = self.store.get_owner_preferences(owner_id).await? else {
            return Ok(None);
        };
        Ok(Some(self.set_scheduler_config(
            owner_id,
            preferences.enabled,
            preferences.interval_minutes,
            preferences.batch_size,
        )))
    }

    /// 启动系统范围的周期检测
    pub fn start_system_scheduler(&self, interval_minutes: u64, batch_size: usize) -> SchedulerStatus {
        self.registry
            .configure(Scope::System, true, interval_minutes, batch_size)
    }

    /// 系统范围的调度状态
    pub fn system_scheduler_status(&self) -> SchedulerStatus {
        self.registry.status(&Scope::System)
    }

    /// 停止所有周期检测
    pub fn shutdown(&self) {
        self.registry.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LinkVitalsError;
    use crate::health::result::{CheckTarget, ProbeOutcome};
    use crate::store::{MemoryTargetStore, OwnerPreferences};
    use async_trait::async_trait;
    use std::time::Duration;

    struct PathProber;

    #[async_trait]
    impl LinkProber for PathProber {
        async fn probe(&self, url: &str) -> ProbeOutcome {
            if url.ends_with("/gone") {
                ProbeOutcome::broken(Some(404))
            } else {
                ProbeOutcome::ok(200)
            }
        }
    }

    /// 列举目标总是失败的存储
    struct BrokenListStore {
        inner: MemoryTargetStore,
    }

    #[async_trait]
    impl TargetStore for BrokenListStore {
        async fn list_eligible_targets(
            &self,
            limit: usize,
            owner_id: Option<&str>,
        ) -> std::result::Result<Vec<CheckTarget>, StoreError> {
            self.inner.list_eligible_targets(limit, owner_id).await
        }

        async fn write_check_result(
            &self,
            id: &str,
            status: LinkStatus,
            http_status: Option<u16>,
            fail_count: Option<u32>,
        ) -> std::result::Result<(), StoreError> {
            self.inner
                .write_check_result(id, status, http_status, fail_count)
                .await
        }

        async fn get_owner_preferences(
            &self,
            owner_id: &str,
        ) -> std::result::Result<Option<OwnerPreferences>, StoreError> {
            self.inner.get_owner_preferences(owner_id).await
        }

        async fn get_target(
            &self,
            id: &str,
        ) -> std::result::Result<Option<CheckTarget>, StoreError> {
            self.inner.get_target(id).await
        }

        async fn list_targets(
            &self,
            _owner_id: Option<&str>,
            _ids: Option<&[String]>,
        ) -> std::result::Result<Vec<CheckTarget>, StoreError> {
            Err(StoreError::Backend("connection reset".to_string()))
        }
    }

    fn create_test_service() -> (LinkHealthService, Arc<MemoryTargetStore>) {
        let store = Arc::new(MemoryTargetStore::with_targets(vec![
            CheckTarget::new("a1", "https://a.example/ok", Some("alice".to_string())),
            CheckTarget::new("a2", "https://a.example/gone", Some("alice".to_string()))
                .with_fail_count(2),
            CheckTarget::new("b1", "https://b.example/ok", Some("bob".to_string())),
        ]));
        let settings = BatchSettings {
            concurrency: 5,
            cooldown: Duration::ZERO,
        };
        let service = LinkHealthService::new(store.clone(), Arc::new(PathProber), settings);
        (service, store)
    }

    #[tokio::test]
    async fn test_check_single_target() {
        let (service, store) = create_test_service();

        let report = service.check("a2").await.unwrap();
        assert_eq!(report.status, LinkStatus::Broken);
        assert_eq!(report.http_status, Some(404));
        assert_eq!(report.fail_count, 3);

        let stored = store.get_target("a2").await.unwrap().unwrap();
        assert_eq!(stored.last_checked_at, Some(report.last_checked_at));
    }

    #[tokio::test]
    async fn test_check_ignores_backoff_window() {
        let (service, store) = create_test_service();
        store
            .insert_target(
                CheckTarget::new("fresh", "https://a.example/ok", None)
                    .with_fail_count(7)
                    .with_last_checked_at(Utc::now()),
            )
            .await;

        let report = service.check("fresh").await.unwrap();
        assert_eq!(report.status, LinkStatus::Ok);
        assert_eq!(report.fail_count, 0);
    }

    #[tokio::test]
    async fn test_check_missing_target() {
        let (service, _) = create_test_service();
        let err = service.check("nope").await.unwrap_err();
        assert!(matches!(
            err,
            LinkVitalsError::Store(StoreError::TargetNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_bulk_check_whole_owner() {
        let (service, store) = create_test_service();

        let report = service.bulk_check("alice", None).await;
        assert_eq!(report.checked_ids, vec!["a1", "a2"]);
        assert!(report.failed.is_empty());

        // 其他所有者的目标不受影响
        let bob = store.get_target("b1").await.unwrap().unwrap();
        assert!(bob.last_checked_at.is_none());
    }

    #[tokio::test]
    async fn test_bulk_check_selected_ids() {
        let (service, store) = create_test_service();
        store.fail_writes_for("a1").await;

        let ids = vec!["a1".to_string(), "b1".to_string(), "zz".to_string()];
        let report = service.bulk_check("alice", Some(&ids)).await;

        assert!(report.checked_ids.is_empty());
        let failed: Vec<&str> = report.failed.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(failed, vec!["a1", "b1", "zz"]);
    }

    #[tokio::test]
    async fn test_bulk_check_reports_store_failure() {
        let store = Arc::new(BrokenListStore {
            inner: MemoryTargetStore::with_targets(vec![CheckTarget::new(
                "a1",
                "https://a.example/ok",
                Some("alice".to_string()),
            )]),
        });
        let service =
            LinkHealthService::new(store, Arc::new(PathProber), BatchSettings::default());

        let report = service.bulk_check("alice", None).await;
        assert!(report.checked_ids.is_empty());
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].id, "alice");
        assert!(report.failed[0].reason.contains("connection reset"));

        let ids = vec!["a1".to_string(), "a9".to_string()];
        let report = service.bulk_check("alice", Some(&ids)).await;
        let failed: Vec<&str> = report.failed.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(failed, vec!["a1", "a9"]);
    }

    #[tokio::test]
    async fn test_scheduler_config_and_status() {
        let (service, _) = create_test_service();

        let status = service.set_scheduler_config("alice", false, 0, 0);
        assert_eq!(status.interval_minutes, 1);
        assert_eq!(status.batch_size, 1);

        let outcome = service.run_now("alice").await;
        assert_eq!(outcome.report().map(|r| r.total), Some(1));

        let status = service.get_scheduler_status("alice");
        assert!(!status.enabled);
        assert!(status.last_run_at.is_some());
    }

    #[tokio::test]
    async fn test_apply_owner_preferences() {
        let (service, store) = create_test_service();
        assert!(service.apply_owner_preferences("alice").await.unwrap().is_none());

        store
            .set_owner_preferences(
                "alice",
                OwnerPreferences {
                    enabled: false,
                    interval_minutes: 45,
                    batch_size: 7,
                },
            )
            .await;
        let status = service.apply_owner_preferences("alice").await.unwrap().unwrap();
        assert_eq!(status.interval_minutes, 45);
        assert_eq!(status.batch_size, 7);
        assert!(!status.running);
    }

    #[tokio::test(start_paused = true)]
    async fn test_system_scheduler_and_shutdown() {
        let (service, store) = create_test_service();

        let status = service.start_system_scheduler(10, 100);
        assert!(status.running);
        tokio::time::sleep(Duration::from_secs(1)).await;

        // 系统范围不限所有者
        for target in store.snapshot().await {
            assert!(target.last_checked_at.is_some(), "{}", target.id);
        }

        service.shutdown();
        assert!(!service.system_scheduler_status().running);
    }

    #[tokio::test]
    async fn test_from_config_builds_real_prober() {
        let store: Arc<dyn TargetStore> = Arc::new(MemoryTargetStore::new());
        assert!(LinkHealthService::from_config(&GlobalConfig::default(), store).is_ok());
    }
}
