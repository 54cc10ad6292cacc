//! 配置数据结构定义
//!
//! 定义应用程序的配置结构体和验证逻辑

use crate::health::batch::BatchSettings;
use crate::health::checker::ProbeSettings;
use crate::health::result::CheckTarget;
use crate::store::OwnerPreferences;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

/// 主配置结构
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// 全局配置项
    #[serde(default)]
    pub global: GlobalConfig,
    /// 系统范围调度，缺省时不启动
    pub system_scheduler: Option<SchedulerConfig>,
    /// Web API 配置
    pub web: Option<WebConfig>,
    /// 所有者保存的调度偏好
    #[serde(default)]
    pub owners: Vec<OwnerConfig>,
    /// 内存存储的初始检测目标
    #[serde(default)]
    pub targets: Vec<TargetConfig>,
}

/// 全局配置结构
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GlobalConfig {
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// 单次探测超时时间（秒）
    #[serde(default = "default_timeout")]
    pub request_timeout_seconds: u64,
    /// 最多跟随的重定向次数
    #[serde(default = "default_max_redirects")]
    pub max_redirects: u32,
    /// 响应 Content-Length 上限（字节）
    #[serde(default = "default_max_content_length")]
    pub max_content_length_bytes: u64,
    /// 批量检测并发数
    #[serde(default = "default_batch_concurrency")]
    pub batch_concurrency: usize,
    /// 组间冷却时间（毫秒）
    #[serde(default = "default_batch_cooldown")]
    pub batch_cooldown_ms: u64,
    /// DNS 解析超时时间（秒）
    #[serde(default = "default_dns_timeout")]
    pub dns_timeout_seconds: u64,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            request_timeout_seconds: default_timeout(),
            max_redirects: default_max_redirects(),
            max_content_length_bytes: default_max_content_length(),
            batch_concurrency: default_batch_concurrency(),
            batch_cooldown_ms: default_batch_cooldown(),
            dns_timeout_seconds: default_dns_timeout(),
        }
    }
}

impl GlobalConfig {
    /// 探测参数
    pub fn probe_settings(&self) -> ProbeSettings {
        ProbeSettings {
            timeout: Duration::from_secs(self.request_timeout_seconds),
            max_redirects: self.max_redirects,
            max_content_length: self.max_content_length_bytes,
        }
    }

    /// 批量执行参数
    pub fn batch_settings(&self) -> BatchSettings {
        BatchSettings {
            concurrency: self.batch_concurrency,
            cooldown: Duration::from_millis(self.batch_cooldown_ms),
        }
    }

    /// DNS 解析超时时间
    pub fn dns_timeout(&self) -> Duration {
        Duration::from_secs(self.dns_timeout_seconds)
    }
}

/// 调度配置（系统范围）
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// 是否启用
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// 检测间隔（分钟）
    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u64,
    /// 批量大小
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

/// 所有者调度偏好
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OwnerConfig {
    /// 所有者ID
    pub owner_id: String,
    /// 是否启用
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// 检测间隔（分钟）
    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u64,
    /// 批量大小
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl OwnerConfig {
    /// 转换为存储中的调度偏好
    pub fn preferences(&self) -> OwnerPreferences {
        OwnerPreferences {
            enabled: self.enabled,
            interval_minutes: self.interval_minutes,
            batch_size: self.batch_size,
        }
    }
}

/// 检测目标种子数据
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TargetConfig {
    /// 目标ID
    pub id: String,
    /// 目标URL
    pub url: String,
    /// 所有者ID，缺省为系统范围
    pub owner_id: Option<String>,
}

impl From<&TargetConfig> for CheckTarget {
    fn from(target: &TargetConfig) -> Self {
        CheckTarget::new(target.id.clone(), target.url.clone(), target.owner_id.clone())
    }
}

/// Web API 配置结构
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WebConfig {
    /// 是否启用 Web API
    #[serde(default = "default_web_enabled")]
    pub enabled: bool,
    /// 监听端口
    #[serde(default = "default_web_port")]
    pub port: u16,
    /// 绑定地址
    #[serde(default = "default_web_bind_address")]
    pub bind_address: String,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            enabled: default_web_enabled(),
            port: default_web_port(),
            bind_address: default_web_bind_address(),
        }
    }
}

// 默认值函数
fn default_log_level() -> String {
    "info".to_string()
}
fn default_timeout() -> u64 {
    10
}
fn default_max_redirects() -> u32 {
    5
}
fn default_max_content_length() -> u64 {
    10 * 1024 * 1024
}
fn default_batch_concurrency() -> usize {
    5
}
fn default_batch_cooldown() -> u64 {
    2000
}
fn default_dns_timeout() -> u64 {
    5
}
fn default_enabled() -> bool {
    true
}
fn default_interval_minutes() -> u64 {
    60
}
fn default_batch_size() -> usize {
    50
}
fn default_web_enabled() -> bool {
    false
}
fn default_web_port() -> u16 {
    3030
}
fn default_web_bind_address() -> String {
    "127.0.0.1".to_string()
}

/// 配置验证函数
///
/// 调度间隔和批量大小不在这里校验，应用时会被修正到下限
///
/// # 参数
/// * `config` - 要验证的配置
///
/// # 返回
/// * `Result<(), String>` - 验证结果，错误时返回错误信息
pub fn validate_config(config: &Config) -> Result<(), String> {
    if config.global.request_timeout_seconds == 0 {
        return Err("请求超时时间不能为0".to_string());
    }

    if config.global.batch_concurrency == 0 {
        return Err("批量检测并发数不能为0".to_string());
    }

    if config.global.max_content_length_bytes == 0 {
        return Err("响应大小上限不能为0".to_string());
    }

    let valid_log_levels = ["debug", "info", "warn", "error"];
    if !valid_log_levels.contains(&config.global.log_level.as_str()) {
        return Err(format!(
            "无效的日志级别: {}，支持的级别: {:?}",
            config.global.log_level, valid_log_levels
        ));
    }

    if let Some(ref web_config) = config.web {
        if web_config.enabled && web_config.bind_address.trim().is_empty() {
            return Err("Web服务器绑定地址不能为空".to_string());
        }
    }

    for owner in &config.owners {
        if owner.owner_id.trim().is_empty() {
            return Err("所有者ID不能为空".to_string());
        }
    }

    let mut seen = HashSet::new();
    for target in &config.targets {
        if target.id.trim().is_empty() {
            return Err(format!("检测目标ID不能为空: {}", target.url));
        }
        if !seen.insert(target.id.as_str()) {
            return Err(format!("检测目标ID重复: {}", target.id));
        }
    }

    Ok(())
}
