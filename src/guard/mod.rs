//! SSRF防护模块
//!
//! 提供URL安全校验和可替换的主机名解析

pub mod resolver;
pub mod ssrf;

// 重新导出主要类型
pub use resolver::{HostResolver, StaticResolver, SystemResolver};
pub use ssrf::{DenyReason, SsrfGuard, UrlPolicy, Verdict};
