//! 内存存储实现
//!
//! 供命令行服务模式和测试使用的参考实现，不做持久化

use crate::error::StoreError;
use crate::health::backoff::{select_eligible, BackoffPolicy};
use crate::health::{CheckTarget, LinkStatus};
use crate::store::{OwnerPreferences, TargetStore};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap, HashSet};
use tokio::sync::RwLock;

/// 内存检测目标存储
#[derive(Debug, Default)]
pub struct MemoryTargetStore {
    /// 检测目标（按ID排序，保证同等资格时顺序稳定）
    targets: RwLock<BTreeMap<String, CheckTarget>>,
    /// 所有者调度偏好
    preferences: RwLock<HashMap<String, OwnerPreferences>>,
    /// 写回时需要模拟失败的目标ID
    failing_writes: RwLock<HashSet<String>>,
    /// 退避策略
    policy: BackoffPolicy,
}

impl MemoryTargetStore {
    /// 创建空的内存存储
    pub fn new() -> Self {
        Self::default()
    }

    /// 使用初始目标创建内存存储
    pub fn with_targets(targets: impl IntoIterator<Item = CheckTarget>) -> Self {
        let map = targets
            .into_iter()
            .map(|target| (target.id.clone(), target))
            .collect();
        Self {
            targets: RwLock::new(map),
            ..Self::default()
        }
    }

    /// 插入或替换一个目标
    pub async fn insert_target(&self, target: CheckTarget) {
        self.targets.write().await.insert(target.id.clone(), target);
    }

    /// 保存所有者的调度偏好
    pub async fn set_owner_preferences(&self, owner_id: &str, preferences: OwnerPreferences) {
        self.preferences
            .write()
            .await
            .insert(owner_id.to_string(), preferences);
    }

    /// 让指定目标的写回失败
    pub async fn fail_writes_for(&self, id: &str) {
        self.failing_writes.write().await.insert(id.to_string());
    }

    /// 当前所有目标的快照
    pub async fn snapshot(&self) -> Vec<CheckTarget> {
        self.targets.read().await.values().cloned().collect()
    }

    /// 目标数量
    pub async fn len(&self) -> usize {
        self.targets.read().await.len()
    }

    /// 是否为空
    pub async fn is_empty(&self) -> bool {
        self.targets.read().await.is_empty()
    }
}

fn owned_by(target: &CheckTarget, owner_id: Option<&str>) -> bool {
    match owner_id {
        Some(owner) => target.owner_id.as_deref() == Some(owner),
        None => true,
    }
}

#[async_trait]
impl TargetStore for MemoryTargetStore {
    async fn list_eligible_targets(
        &self,
        limit: usize,
        owner_id: Option<&str>,
    ) -> Result<Vec<CheckTarget>, StoreError> {
        let targets = self.targets.read().await;
        let scoped = targets.values().filter(|t| owned_by(t, owner_id));
        Ok(select_eligible(&self.policy, scoped, Utc::now(), limit))
    }

    async fn write_check_result(
        &self,
        id: &str,
        status: LinkStatus,
        http_status: Option<u16>,
        fail_count: Option<u32>,
    ) -> Result<(), StoreError> {
        if self.failing_writes.read().await.contains(id) {
            return Err(StoreError::Backend(format!("写回失败: {id}")));
        }

        let mut targets = self.targets.write().await;
        let target = targets
            .get_mut(id)
            .ok_or_else(|| StoreError::TargetNotFound { id: id.to_string() })?;

        target.status = status;
        target.http_status = http_status;
        target.last_checked_at = Some(Utc::now());
        if let Some(fail_count) = fail_count {
            target.fail_count = fail_count;
        }
        Ok(())
    }

    async fn get_owner_preferences(
        &self,
        owner_id: &str,
    ) -> Result<Option<OwnerPreferences>, StoreError> {
        Ok(self.preferences.read().await.get(owner_id).copied())
    }

    async fn get_target(&self, id: &str) -> Result<Option<CheckTarget>, StoreError> {
        Ok(self.targets.read().await.get(id).cloned())
    }

    async fn list_targets(
        &self,
        owner_id: Option<&str>,
        ids: Option<&[String]>,
    ) -> Result<Vec<CheckTarget>, StoreError> {
        let targets = self.targets.read().await;
        Ok(targets
            .values()
            .filter(|t| owned_by(t, owner_id))
            .filter(|t| ids.is_none_or(|ids| ids.contains(&t.id)))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn create_test_store() -> MemoryTargetStore {
        MemoryTargetStore::with_targets(vec![
            CheckTarget::new("a1", "https://a.example/1", Some("alice".to_string())),
            CheckTarget::new("a2", "https://a.example/2", Some("alice".to_string()))
                .with_last_checked_at(Utc::now() - ChronoDuration::minutes(5)),
            CheckTarget::new("b1", "https://b.example/1", Some("bob".to_string())),
            CheckTarget::new("s1", "https://s.example/1", None),
        ])
    }

    #[tokio::test]
    async fn test_list_eligible_is_owner_scoped() {
        let store = create_test_store();

        let alice = store.list_eligible_targets(10, Some("alice")).await.unwrap();
        let ids: Vec<&str> = alice.iter().map(|t| t.id.as_str()).collect();
        // a2 五分钟前刚检测过，还在冷却中
        assert_eq!(ids, vec!["a1"]);

        let all = store.list_eligible_targets(10, None).await.unwrap();
        assert_eq!(all.len(), 3);

        let limited = store.list_eligible_targets(1, None).await.unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn test_write_check_result_updates_fields() {
        let store = create_test_store();
        store
            .write_check_result("a1", LinkStatus::Broken, Some(404), Some(1))
            .await
            .unwrap();

        let target = store.get_target("a1").await.unwrap().unwrap();
        assert_eq!(target.status, LinkStatus::Broken);
        assert_eq!(target.http_status, Some(404));
        assert_eq!(target.fail_count, 1);
        assert!(target.last_checked_at.is_some());

        // 不提供失败次数时保持原值
        store
            .write_check_result("a1", LinkStatus::Timeout, None, None)
            .await
            .unwrap();
        let target = store.get_target("a1").await.unwrap().unwrap();
        assert_eq!(target.fail_count, 1);
        assert!(target.http_status.is_none());
    }

    #[tokio::test]
    async fn test_write_check_result_missing_target() {
        let store = create_test_store();
        let err = store
            .write_check_result("nope", LinkStatus::Ok, Some(200), Some(0))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            StoreError::TargetNotFound {
                id: "nope".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_injected_write_failure() {
        let store = create_test_store();
        store.fail_writes_for("b1").await;
        assert!(store
            .write_check_result("b1", LinkStatus::Ok, Some(200), Some(0))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_list_targets_with_id_filter() {
        let store = create_test_store();
        let ids = vec!["a2".to_string(), "b1".to_string()];

        let alice = store.list_targets(Some("alice"), Some(&ids)).await.unwrap();
        assert_eq!(alice.len(), 1);
        assert_eq!(alice[0].id, "a2");

        let alice_all = store.list_targets(Some("alice"), None).await.unwrap();
        assert_eq!(alice_all.len(), 2);
    }

    #[tokio::test]
    async fn test_owner_preferences_roundtrip() {
        let store = MemoryTargetStore::new();
        assert!(store.get_owner_preferences("alice").await.unwrap().is_none());

        let prefs = OwnerPreferences {
            enabled: true,
            interval_minutes: 15,
            batch_size: 10,
        };
        store.set_owner_preferences("alice", prefs).await;
        assert_eq!(store.get_owner_preferences("alice").await.unwrap(), Some(prefs));
    }
}
