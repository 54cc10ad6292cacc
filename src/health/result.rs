//! 链接检测结果数据结构
//!
//! 定义检测目标、探测结果和链接状态枚举

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 链接状态枚举
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkStatus {
    /// 尚未检测
    #[default]
    Unknown,
    /// 可访问
    Ok,
    /// 不可访问
    Broken,
    /// 超时
    Timeout,
}

impl std::fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LinkStatus::Unknown => write!(f, "未知"),
            LinkStatus::Ok => write!(f, "正常"),
            LinkStatus::Broken => write!(f, "失效"),
            LinkStatus::Timeout => write!(f, "超时"),
        }
    }
}

impl LinkStatus {
    /// 判断状态是否为健康
    pub fn is_healthy(&self) -> bool {
        matches!(self, LinkStatus::Ok)
    }

    /// 线上格式的状态名
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkStatus::Unknown => "unknown",
            LinkStatus::Ok => "ok",
            LinkStatus::Broken => "broken",
            LinkStatus::Timeout => "timeout",
        }
    }
}

/// 单次探测的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeOutcome {
    /// 探测状态（ok / broken / timeout）
    pub status: LinkStatus,
    /// 最后观察到的HTTP状态码
    pub http_status: Option<u16>,
}

impl ProbeOutcome {
    /// 可访问
    pub fn ok(http_status: u16) -> Self {
        Self {
            status: LinkStatus::Ok,
            http_status: Some(http_status),
        }
    }

    /// 不可访问
    pub fn broken(http_status: Option<u16>) -> Self {
        Self {
            status: LinkStatus::Broken,
            http_status,
        }
    }

    /// 超时，不带状态码
    pub fn timeout() -> Self {
        Self {
            status: LinkStatus::Timeout,
            http_status: None,
        }
    }
}

/// 被观察的检测目标
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckTarget {
    /// 外部协作方分配的ID
    pub id: String,
    /// 不可信的绝对URL
    pub url: String,
    /// 所有者ID，None表示系统范围
    #[serde(default)]
    pub owner_id: Option<String>,
    /// 当前状态
    #[serde(default)]
    pub status: LinkStatus,
    /// 最后观察到的HTTP状态码
    #[serde(default)]
    pub http_status: Option<u16>,
    /// 连续失败次数
    #[serde(default)]
    pub fail_count: u32,
    /// 最近一次探测时间（失败也会记录）
    #[serde(default)]
    pub last_checked_at: Option<DateTime<Utc>>,
}

impl CheckTarget {
    /// 创建新的检测目标，初始状态为未知
    pub fn new(id: impl Into<String>, url: impl Into<String>, owner_id: Option<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            owner_id,
            status: LinkStatus::Unknown,
            http_status: None,
            fail_count: 0,
            last_checked_at: None,
        }
    }

    /// 设置连续失败次数
    pub fn with_fail_count(mut self, fail_count: u32) -> Self {
        self.fail_count = fail_count;
        self
    }

    /// 设置最近一次探测时间
    pub fn with_last_checked_at(mut self, last_checked_at: DateTime<Utc>) -> Self {
        self.last_checked_at = Some(last_checked_at);
        self
    }

    /// 根据探测结果生成需要写回的检测结果
    pub fn result_for(&self, outcome: ProbeOutcome) -> CheckResult {
        CheckResult::from_outcome(&self.id, outcome, self.fail_count)
    }
}

/// 需要写回存储的检测结果
///
/// 状态与失败次数总是一起生成，避免出现 `ok` 搭配非零失败次数
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    /// 目标ID
    pub id: String,
    /// 新状态
    pub status: LinkStatus,
    /// HTTP状态码
    pub http_status: Option<u16>,
    /// 新的连续失败次数
    pub fail_count: u32,
}

impl CheckResult {
    /// 根据探测结果和之前的失败次数生成写回内容
    pub fn from_outcome(id: &str, outcome: ProbeOutcome, previous_fail_count: u32) -> Self {
        Self {
            id: id.to_string(),
            status: outcome.status,
            http_status: outcome.http_status,
            fail_count: next_fail_count(outcome.status, previous_fail_count),
        }
    }
}

/// 计算新的连续失败次数：成功归零，其余加一
pub fn next_fail_count(status: LinkStatus, previous: u32) -> u32 {
    if status.is_healthy() {
        0
    } else {
        previous.saturating_add(1)
    }
}
