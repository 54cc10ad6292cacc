//! Link Vitals - SSRF安全的链接健康检测工具
//!
//! 对由外部存储协作方持有的URL集合做周期性的健康验证，支持：
//! - 出站请求前的SSRF守卫（协议、主机名、解析地址、端口）
//! - 手动跟随重定向并逐跳校验的HEAD探测
//! - 按连续失败次数退避的检测资格
//! - 有并发上限和批次间隔的批量执行
//! - 按所有者隔离的周期调度
//! - 可选的HTTP API

pub mod cli;
pub mod config;
pub mod error;
pub mod guard;
pub mod health;
pub mod logging;
pub mod service;
pub mod store;
pub mod web;

// 重新导出主要类型
pub use config::{Config, GlobalConfig};
pub use error::LinkVitalsError;
pub use guard::{SsrfGuard, Verdict};
pub use health::{CheckTarget, LinkStatus, ProbeOutcome};
pub use service::LinkHealthService;

/// 应用程序版本信息
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// 应用程序名称
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");

/// 应用程序描述
pub const APP_DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
