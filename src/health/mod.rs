//! 链接健康检测模块
//!
//! 提供单目标探测、退避策略、批量执行和周期调度功能

pub mod backoff;
pub mod batch;
pub mod checker;
pub mod result;
pub mod scheduler;

// 重新导出主要类型
pub use backoff::{required_cooldown_minutes, BackoffPolicy};
pub use batch::{BatchFailure, BatchReport, BatchRunner, BatchSettings};
pub use checker::{HttpLinkProber, LinkProber, ProbeSettings};
pub use result::{CheckResult, CheckTarget, LinkStatus, ProbeOutcome};
pub use scheduler::{RunOutcome, SchedulerRegistry, SchedulerSettings, SchedulerStatus, Scope};
