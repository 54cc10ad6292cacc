//! 周期检测调度器模块
//!
//! 每个所有者（以及可选的系统范围）各有一个调度上下文，
//! 上下文持有定时器句柄和互斥标志，保证同一范围内不会有两轮检测重叠执行。

use crate::health::batch::{BatchReport, BatchRunner};
use crate::logging::batch_log;
use crate::store::TargetStore;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};

/// 最小检测间隔（分钟）
pub const MIN_INTERVAL_MINUTES: u64 = 1;
/// 最大检测间隔（分钟），即365天
pub const MAX_INTERVAL_MINUTES: u64 = 365 * 24 * 60;
/// 最小批量大小
pub const MIN_BATCH_SIZE: usize = 1;
/// 默认检测间隔（分钟）
pub const DEFAULT_INTERVAL_MINUTES: u64 = 60;
/// 默认批量大小
pub const DEFAULT_BATCH_SIZE: usize = 50;

/// 调度范围
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "owner_id")]
pub enum Scope {
    /// 系统范围，资格查询不限所有者
    System,
    /// 单个所有者
    Owner(String),
}

impl Scope {
    /// 创建所有者范围
    pub fn owner(owner_id: impl Into<String>) -> Self {
        Self::Owner(owner_id.into())
    }

    /// 资格查询使用的所有者ID
    pub fn owner_id(&self) -> Option<&str> {
        match self {
            Self::System => None,
            Self::Owner(id) => Some(id),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::Owner(id) => write!(f, "owner:{id}"),
        }
    }
}

/// 调度参数（已完成上下限修正）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerSettings {
    /// 是否启用周期检测
    pub enabled: bool,
    /// 检测间隔（分钟）
    pub interval_minutes: u64,
    /// 每轮最多检测的目标数
    pub batch_size: usize,
}

impl SchedulerSettings {
    /// 创建调度参数
    ///
    /// 间隔修正到 `[MIN_INTERVAL_MINUTES, MAX_INTERVAL_MINUTES]`，批量大小不足下限时修正为下限
    pub fn new(enabled: bool, interval_minutes: u64, batch_size: usize) -> Self {
        Self {
            enabled,
            interval_minutes: interval_minutes.clamp(MIN_INTERVAL_MINUTES, MAX_INTERVAL_MINUTES),
            batch_size: batch_size.max(MIN_BATCH_SIZE),
        }
    }

    /// 检测间隔
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_minutes.saturating_mul(60))
    }
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self::new(false, DEFAULT_INTERVAL_MINUTES, DEFAULT_BATCH_SIZE)
    }
}

/// 计算下一轮的预计开始时间，溢出时返回None
fn next_run_after(last: DateTime<Utc>, interval_minutes: u64) -> Option<DateTime<Utc>> {
    let minutes = i64::try_from(interval_minutes).ok()?;
    last.checked_add_signed(TimeDelta::try_minutes(minutes)?)
}

/// 调度上下文
#[derive(Debug)]
pub struct SchedulerContext {
    /// 调度范围
    pub scope: Scope,
    /// 调度参数
    pub settings: SchedulerSettings,
    /// 是否有一轮检测正在执行
    pub is_checking: bool,
    /// 最近一轮开始时间
    pub last_run_at: Option<DateTime<Utc>>,
    /// 定时器任务
    timer: Option<JoinHandle<()>>,
}

impl SchedulerContext {
    fn new(scope: Scope, settings: SchedulerSettings) -> Self {
        Self {
            scope,
            settings,
            is_checking: false,
            last_run_at: None,
            timer: None,
        }
    }

    /// 定时器是否存在
    pub fn is_running(&self) -> bool {
        self.timer.is_some()
    }

    fn stop_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }

    fn status(&self) -> SchedulerStatus {
        let running = self.is_running();
        let next_run_at = match (running, self.last_run_at) {
            (true, Some(last)) => next_run_after(last, self.settings.interval_minutes),
            _ => None,
        };
        SchedulerStatus {
            scope: self.scope.clone(),
            enabled: self.settings.enabled,
            running,
            checking: self.is_checking,
            interval_minutes: self.settings.interval_minutes,
            batch_size: self.settings.batch_size,
            last_run_at: self.last_run_at,
            next_run_at,
        }
    }
}

/// 调度状态
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerStatus {
    /// 调度范围
    pub scope: Scope,
    /// 是否启用
    pub enabled: bool,
    /// 定时器是否存在
    pub running: bool,
    /// 是否正在检测
    pub checking: bool,
    /// 检测间隔（分钟）
    pub interval_minutes: u64,
    /// 批量大小
    pub batch_size: usize,
    /// 最近一轮开始时间
    pub last_run_at: Option<DateTime<Utc>>,
    /// 预计下一轮时间
    pub next_run_at: Option<DateTime<Utc>>,
}

impl SchedulerStatus {
    /// 尚未创建上下文时的状态
    pub fn idle(scope: Scope) -> Self {
        SchedulerContext::new(scope, SchedulerSettings::default()).status()
    }
}

/// 一轮检测的结果
#[derive(Debug, Clone)]
pub enum RunOutcome {
    /// 已执行
    Completed(BatchReport),
    /// 上一轮尚未结束，本轮跳过
    Skipped,
}

impl RunOutcome {
    /// 是否被跳过
    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped)
    }

    /// 执行结果
    pub fn report(&self) -> Option<&BatchReport> {
        match self {
            Self::Completed(report) => Some(report),
            Self::Skipped => None,
        }
    }
}

struct RegistryInner {
    contexts: Mutex<HashMap<Scope, SchedulerContext>>,
    store: Arc<dyn TargetStore>,
    runner: Arc<BatchRunner>,
}

impl RegistryInner {
    fn lock(&self) -> MutexGuard<'_, HashMap<Scope, SchedulerContext>> {
        self.contexts.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 尝试开始一轮检测，成功时返回本轮批量大小
    fn try_begin(&self, scope: &Scope, create_if_missing: bool) -> Option<usize> {
        let mut contexts = self.lock();
        let context = if create_if_missing {
            contexts
                .entry(scope.clone())
                .or_insert_with(|| SchedulerContext::new(scope.clone(), SchedulerSettings::default()))
        } else {
            contexts.get_mut(scope)?
        };

        if context.is_checking {
            debug!("上一轮检测尚未结束，跳过: {}", scope);
            return None;
        }
        context.is_checking = true;
        context.last_run_at = Some(Utc::now());
        Some(context.settings.batch_size)
    }

    fn finish(&self, scope: &Scope) {
        if let Some(context) = self.lock().get_mut(scope) {
            context.is_checking = false;
        }
    }

    async fn run(&self, scope: &Scope, create_if_missing: bool) -> RunOutcome {
        let Some(batch_size) = self.try_begin(scope, create_if_missing) else {
            return RunOutcome::Skipped;
        };
        let _guard = CheckingGuard { inner: self, scope };

        let targets = match self
            .store
            .list_eligible_targets(batch_size, scope.owner_id())
            .await
        {
            Ok(targets) => targets,
            Err(e) => {
                error!("查询可检测目标失败 {}: {}", scope, e);
                return RunOutcome::Completed(BatchReport::empty());
            }
        };

        let report = self.runner.run_batch(&targets).await;
        batch_log(&scope.to_string(), &report);
        RunOutcome::Completed(report)
    }
}

/// 无论本轮如何结束都会清除互斥标志
struct CheckingGuard<'a> {
    inner: &'a RegistryInner,
    scope: &'a Scope,
}

impl Drop for CheckingGuard<'_> {
    fn drop(&mut self) {
        self.inner.finish(self.scope);
    }
}

async fn run_timer(inner: Arc<RegistryInner>, scope: Scope, period: Duration) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        // 单独的任务执行本轮，取消定时器不会打断进行中的检测
        let inner = Arc::clone(&inner);
        let scope = scope.clone();
        tokio::spawn(async move {
            inner.run(&scope, false).await;
        });
    }
}

/// 调度上下文注册表
///
/// 由应用在启动时创建、关闭时销毁，按引用传递
pub struct SchedulerRegistry {
    inner: Arc<RegistryInner>,
}

impl SchedulerRegistry {
    /// 创建新的调度注册表
    ///
    /// # 参数
    /// * `store` - 存储协作方
    /// * `runner` - 批量检测执行器
    pub fn new(store: Arc<dyn TargetStore>, runner: Arc<BatchRunner>) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                contexts: Mutex::new(HashMap::new()),
                store,
                runner,
            }),
        }
    }

    /// 配置某个范围的调度
    ///
    /// 间隔和批量大小会被修正到下限。已有的定时器总是先被取消，
    /// 启用时立即执行一轮并按新间隔重新启动定时器。必须在tokio运行时内调用。
    ///
    /// # 参数
    /// * `scope` - 调度范围
    /// * `enabled` - 是否启用
    /// * `interval_minutes` - 检测间隔（分钟）
    /// * `batch_size` - 批量大小
    ///
    /// # 返回
    /// * `SchedulerStatus` - 配置后的状态
    pub fn configure(
        &self,
        scope: Scope,
        enabled: bool,
        interval_minutes: u64,
        batch_size: usize,
    ) -> SchedulerStatus {
        let settings = SchedulerSettings::new(enabled, interval_minutes, batch_size);
        let mut contexts = self.inner.lock();
        let context = contexts
            .entry(scope.clone())
            .or_insert_with(|| SchedulerContext::new(scope.clone(), settings));

        context.settings = settings;
        context.stop_timer();

        if settings.enabled {
            let task = tokio::spawn(run_timer(
                Arc::clone(&self.inner),
                scope.clone(),
                settings.interval(),
            ));
            context.timer = Some(task);
            info!(
                "启动周期检测: {}，间隔 {} 分钟，批量 {}",
                scope, settings.interval_minutes, settings.batch_size
            );
        } else {
            info!("停用周期检测: {}", scope);
        }

        context.status()
    }

    /// 立即执行一轮检测
    ///
    /// 与定时触发遵循相同的互斥规则。范围不存在时创建一个未启用的上下文。
    pub async fn run_now(&self, scope: &Scope) -> RunOutcome {
        self.inner.run(scope, true).await
    }

    /// 查询调度状态，范围不存在时返回未启用状态
    pub fn status(&self, scope: &Scope) -> SchedulerStatus {
        self.inner
            .lock()
            .get(scope)
            .map(SchedulerContext::status)
            .unwrap_or_else(|| SchedulerStatus::idle(scope.clone()))
    }

    /// 范围是否已有上下文
    pub fn contains(&self, scope: &Scope) -> bool {
        self.inner.lock().contains_key(scope)
    }

    /// 所有上下文的状态快照
    pub fn contexts(&self) -> Vec<SchedulerStatus> {
        self.inner
            .lock()
            .values()
            .map(SchedulerContext::status)
            .collect()
    }

    /// 移除某个范围，取消其定时器
    pub fn remove(&self, scope: &Scope) -> bool {
        match self.inner.lock().remove(scope) {
            Some(mut context) => {
                context.stop_timer();
                info!("移除调度上下文: {}", scope);
                true
            }
            None => false,
        }
    }

    /// 取消所有定时器
    pub fn shutdown(&self) {
        let mut contexts = self.inner.lock();
        let count = contexts.values().filter(|c| c.is_running()).count();
        for context in contexts.values_mut() {
            context.stop_timer();
        }
        info!("调度器已停止，取消 {} 个定时器", count);
    }
}

impl Drop for SchedulerRegistry {
    fn drop(&mut self) {
        for context in self.inner.lock().values_mut() {
            context.stop_timer();
        }
    }
}
