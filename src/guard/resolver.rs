//! 主机名解析器
//!
//! SSRF守卫通过 [`HostResolver`] 解析主机名，便于在测试中替换为固定映射

use async_trait::async_trait;
use std::collections::HashMap;
use std::io;
use std::net::IpAddr;
use std::time::Duration;
use tokio::time::timeout;

/// 主机名解析trait
#[async_trait]
pub trait HostResolver: Send + Sync {
    /// 将主机名解析为一个IP地址
    ///
    /// # 参数
    /// * `host` - 主机名（不含端口）
    ///
    /// # 返回
    /// * `io::Result<IpAddr>` - 解析得到的第一个地址
    async fn resolve(&self, host: &str) -> io::Result<IpAddr>;
}

/// 基于系统DNS的解析器
#[derive(Debug, Clone)]
pub struct SystemResolver {
    /// 单次解析超时时间
    timeout: Duration,
}

impl SystemResolver {
    /// 创建新的系统解析器
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for SystemResolver {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

#[async_trait]
impl HostResolver for SystemResolver {
    async fn resolve(&self, host: &str) -> io::Result<IpAddr> {
        // 端口号对解析结果无影响，只是lookup_host要求的格式
        let lookup = tokio::net::lookup_host((host, 80u16));
        let mut addrs = timeout(self.timeout, lookup)
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, format!("DNS解析超时: {host}")))??;

        addrs.next().map(|addr| addr.ip()).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("DNS解析未返回任何地址: {host}"),
            )
        })
    }
}

/// 固定映射解析器
///
/// 未登记的主机名一律解析失败
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    entries: HashMap<String, IpAddr>,
}

impl StaticResolver {
    /// 创建空的固定映射解析器
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记一条主机映射
    pub fn with_host(mut self, host: &str, ip: IpAddr) -> Self {
        self.entries.insert(host.to_ascii_lowercase(), ip);
        self
    }
}

#[async_trait]
impl HostResolver for StaticResolver {
    async fn resolve(&self, host: &str) -> io::Result<IpAddr> {
        self.entries
            .get(&host.to_ascii_lowercase())
            .copied()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("未知主机: {host}")))
    }
}
