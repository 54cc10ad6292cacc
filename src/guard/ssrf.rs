//! SSRF守卫实现
//!
//! 在发起任何出站请求之前判断URL是否可以安全访问。检查顺序固定，
//! 遇到第一个失败即短路返回：
//!
//! 1. 协议白名单（仅 `http` / `https`）
//! 2. 主机名黑名单（回环地址与云元数据主机名，大小写不敏感）
//! 3. DNS解析 + 地址类别检查（解析失败视为拒绝）
//! 4. 显式端口黑名单
//!
//! 守卫没有缓存，每一跳重定向都必须用解析后的绝对URL重新调用。

use crate::guard::resolver::HostResolver;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::Arc;
use tracing::debug;
use url::{Host, Url};

/// 允许的协议
const ALLOWED_SCHEMES: &[&str] = &["http", "https"];

/// 主机名黑名单（精确匹配，大小写不敏感）
const BLOCKED_HOSTNAMES: &[&str] = &[
    "localhost",
    "127.0.0.1",
    "::1",
    "0.0.0.0",
    "metadata.google.internal",
    "169.254.169.254",
    "metadata.azure.com",
    "metadata.packet.net",
];

/// 端口黑名单（非HTTP内部服务）
const BLOCKED_PORTS: &[u16] = &[
    22,    // SSH
    23,    // Telnet
    25,    // SMTP
    53,    // DNS
    135,   // RPC
    139,   // NetBIOS
    445,   // SMB
    993,   // IMAPS
    995,   // POP3S
    1433,  // MSSQL
    3306,  // MySQL
    3389,  // RDP
    5432,  // PostgreSQL
    5984,  // CouchDB
    6379,  // Redis
    8080,  // 常见内部代理/管理端口
    9200,  // Elasticsearch
    27017, // MongoDB
];

/// 拒绝原因
///
/// 只用于内部日志，不会透出给调用方
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DenyReason {
    /// URL无法解析
    InvalidUrl { message: String },
    /// 协议不在白名单中
    UnsupportedScheme { scheme: String },
    /// URL不含主机
    MissingHost,
    /// 主机名命中黑名单
    BlockedHostname { host: String },
    /// DNS解析失败
    DnsFailure { host: String, message: String },
    /// 解析地址属于受限网段
    BlockedAddress { ip: IpAddr },
    /// 显式端口命中黑名单
    BlockedPort { port: u16 },
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DenyReason::InvalidUrl { message } => write!(f, "URL无效: {message}"),
            DenyReason::UnsupportedScheme { scheme } => write!(f, "不支持的协议: {scheme}"),
            DenyReason::MissingHost => write!(f, "URL缺少主机"),
            DenyReason::BlockedHostname { host } => write!(f, "主机名被禁止: {host}"),
            DenyReason::DnsFailure { host, message } => {
                write!(f, "DNS解析失败: {host} ({message})")
            }
            DenyReason::BlockedAddress { ip } => write!(f, "地址属于受限网段: {ip}"),
            DenyReason::BlockedPort { port } => write!(f, "端口被禁止: {port}"),
        }
    }
}

/// 守卫判定结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// 允许访问
    Allow,
    /// 拒绝访问
    Deny(DenyReason),
}

impl Verdict {
    /// 是否允许
    pub fn is_allowed(&self) -> bool {
        matches!(self, Verdict::Allow)
    }

    /// 拒绝原因（允许时为None）
    pub fn deny_reason(&self) -> Option<&DenyReason> {
        match self {
            Verdict::Allow => None,
            Verdict::Deny(reason) => Some(reason),
        }
    }
}

/// URL访问策略trait，探测器通过它校验初始URL和每一跳重定向
#[async_trait]
pub trait UrlPolicy: Send + Sync {
    /// 校验URL
    ///
    /// # 参数
    /// * `url` - 已解析的绝对URL
    ///
    /// # 返回
    /// * `Verdict` - 判定结果
    async fn validate(&self, url: &Url) -> Verdict;
}

/// SSRF守卫
#[derive(Clone)]
pub struct SsrfGuard {
    resolver: Arc<dyn HostResolver>,
}

impl SsrfGuard {
    /// 创建新的SSRF守卫
    ///
    /// # 参数
    /// * `resolver` - 主机名解析器
    pub fn new(resolver: Arc<dyn HostResolver>) -> Self {
        Self { resolver }
    }

    /// 校验字符串形式的URL，解析失败即拒绝
    pub async fn validate_str(&self, raw: &str) -> Verdict {
        match Url::parse(raw) {
            Ok(url) => self.validate(&url).await,
            Err(e) => Verdict::Deny(DenyReason::InvalidUrl {
                message: e.to_string(),
            }),
        }
    }

    /// 解析主机并检查地址类别
    async fn check_address(&self, url: &Url) -> Result<(), DenyReason> {
        let ip = match url.host() {
            Some(Host::Ipv4(v4)) => IpAddr::V4(v4),
            Some(Host::Ipv6(v6)) => IpAddr::V6(v6),
            Some(Host::Domain(domain)) => {
                self.resolver
                    .resolve(domain)
                    .await
                    .map_err(|e| DenyReason::DnsFailure {
                        host: domain.to_string(),
                        message: e.to_string(),
                    })?
            }
            None => return Err(DenyReason::MissingHost),
        };

        if is_blocked_ip(&ip) {
            return Err(DenyReason::BlockedAddress { ip });
        }
        Ok(())
    }
}

#[async_trait]
impl UrlPolicy for SsrfGuard {
    async fn validate(&self, url: &Url) -> Verdict {
        let scheme = url.scheme();
        if !ALLOWED_SCHEMES.contains(&scheme) {
            return Verdict::Deny(DenyReason::UnsupportedScheme {
                scheme: scheme.to_string(),
            });
        }

        let host = match url.host_str() {
            Some(host) if !host.is_empty() => host,
            _ => return Verdict::Deny(DenyReason::MissingHost),
        };

        if is_blocked_hostname(host) {
            return Verdict::Deny(DenyReason::BlockedHostname {
                host: host.to_string(),
            });
        }

        if let Err(reason) = self.check_address(url).await {
            return Verdict::Deny(reason);
        }

        // url::Url::port() 只返回非默认端口
        if let Some(port) = url.port() {
            if is_blocked_port(port) {
                return Verdict::Deny(DenyReason::BlockedPort { port });
            }
        }

        debug!("SSRF守卫放行: {}", url);
        Verdict::Allow
    }
}

/// 主机名是否命中黑名单
///
/// IPv6字面量会先去掉方括号再比较
pub fn is_blocked_hostname(host: &str) -> bool {
    let normalized = host
        .trim_start_matches('[')
        .trim_end_matches(']')
        .to_ascii_lowercase();
    BLOCKED_HOSTNAMES.contains(&normalized.as_str())
}

/// 端口是否命中黑名单
pub fn is_blocked_port(port: u16) -> bool {
    BLOCKED_PORTS.contains(&port)
}

/// IP地址是否属于受限网段
pub fn is_blocked_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_blocked_ipv4(v4),
        IpAddr::V6(v6) => is_blocked_ipv6(v6),
    }
}

/// IPv4受限网段：私有、回环、链路本地、组播、保留，另加本网络和运营商级NAT
pub fn is_blocked_ipv4(ip: &Ipv4Addr) -> bool {
    let octets = ip.octets();
    ip.is_private()             // 10/8, 172.16/12, 192.168/16
        || ip.is_loopback()     // 127/8
        || ip.is_link_local()   // 169.254/16
        || ip.is_multicast()    // 224/4
        || octets[0] >= 240     // 240/4
        || octets[0] == 0       // 0/8
        || (octets[0] == 100 && (octets[1] & 0xc0) == 64) // 100.64/10
}

/// IPv6受限网段：回环、唯一本地、链路本地，以及映射到受限IPv4的地址
pub fn is_blocked_ipv6(ip: &Ipv6Addr) -> bool {
    if let Some(v4) = ip.to_ipv4_mapped() {
        return is_blocked_ipv4(&v4);
    }

    let first = ip.segments()[0];
    ip.is_loopback()
        || ip.is_unspecified()
        || (first & 0xfe00) == 0xfc00 // fc00::/7
        || (first & 0xffc0) == 0xfe80 // fe80::/10
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guard::resolver::StaticResolver;

    fn public_ip() -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(93, 184, 216, 34))
    }

    fn create_test_guard() -> SsrfGuard {
        let resolver = StaticResolver::new()
            .with_host("example.com", public_ip())
            .with_host("internal.corp", IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5)))
            .with_host("mapped.test", "::ffff:192.168.1.10".parse().unwrap())
            .with_host("v6.test", "2606:2800:220:1::1".parse().unwrap())
            .with_host("ula.test", "fd12:3456::1".parse().unwrap());
        SsrfGuard::new(Arc::new(resolver))
    }

    async fn deny_reason(url: &str) -> Option<DenyReason> {
        create_test_guard().validate_str(url).await.deny_reason().cloned()
    }

    #[tokio::test]
    async fn test_allows_public_urls() {
        let guard = create_test_guard();
        assert!(guard.validate_str("http://example.com").await.is_allowed());
        assert!(guard
            .validate_str("https://example.com/path?q=1")
            .await
            .is_allowed());
        assert!(guard.validate_str("https://v6.test/").await.is_allowed());
        assert!(guard.validate_str("http://93.184.216.34:8443/").await.is_allowed());
    }

    #[tokio::test]
    async fn test_denies_non_http_schemes() {
        for url in [
            "file:///etc/passwd",
            "ftp://example.com/",
            "gopher://example.com/",
            "javascript:alert(1)",
        ] {
            assert!(
                matches!(
                    deny_reason(url).await,
                    Some(DenyReason::UnsupportedScheme { .. })
                ),
                "应拒绝: {url}"
            );
        }
    }

    #[tokio::test]
    async fn test_denies_unparseable_url() {
        assert!(matches!(
            deny_reason("not a url").await,
            Some(DenyReason::InvalidUrl { .. })
        ));
    }

    #[tokio::test]
    async fn test_denies_blocked_hostnames_case_insensitive() {
        for url in [
            "http://localhost/",
            "http://LOCALHOST:3000/",
            "http://Metadata.Google.Internal/computeMetadata/v1/",
            "http://metadata.azure.com/",
            "http://metadata.packet.net/",
            "http://[::1]/",
            "http://0.0.0.0/",
        ] {
            assert!(
                matches!(
                    deny_reason(url).await,
                    Some(DenyReason::BlockedHostname { .. })
                ),
                "应拒绝: {url}"
            );
        }
    }

    #[tokio::test]
    async fn test_loopback_literal_denied_before_dns() {
        // StaticResolver中没有登记127.0.0.1，命中主机名黑名单后不会走到DNS
        assert_eq!(
            deny_reason("http://127.0.0.1:6379").await,
            Some(DenyReason::BlockedHostname {
                host: "127.0.0.1".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_denies_private_ipv4_literals() {
        for url in [
            "http://10.1.2.3/",
            "http://172.16.0.1/",
            "http://172.31.255.255/",
            "http://192.168.0.10/",
            "http://127.0.0.2/",
            "http://169.254.1.1/",
            "http://224.0.0.1/",
            "http://240.0.0.1/",
            "http://255.255.255.255/",
            "http://0.1.2.3/",
            "http://100.64.0.1/",
        ] {
            assert!(
                matches!(
                    deny_reason(url).await,
                    Some(DenyReason::BlockedAddress { .. })
                ),
                "应拒绝: {url}"
            );
        }
    }

    #[tokio::test]
    async fn test_denies_hostname_resolving_to_private_address() {
        assert_eq!(
            deny_reason("http://internal.corp/admin").await,
            Some(DenyReason::BlockedAddress {
                ip: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5))
            })
        );
        assert!(matches!(
            deny_reason("http://mapped.test/").await,
            Some(DenyReason::BlockedAddress { .. })
        ));
        assert!(matches!(
            deny_reason("http://ula.test/").await,
            Some(DenyReason::BlockedAddress { .. })
        ));
    }

    #[tokio::test]
    async fn test_dns_failure_fails_closed() {
        assert!(matches!(
            deny_reason("https://does-not-resolve.test/").await,
            Some(DenyReason::DnsFailure { .. })
        ));
    }

    #[tokio::test]
    async fn test_denies_blocked_ports() {
        assert_eq!(
            deny_reason("http://example.com:6379/").await,
            Some(DenyReason::BlockedPort { port: 6379 })
        );
        assert_eq!(
            deny_reason("https://example.com:22/").await,
            Some(DenyReason::BlockedPort { port: 22 })
        );
        assert_eq!(
            deny_reason("http://example.com:8080/").await,
            Some(DenyReason::BlockedPort { port: 8080 })
        );
        // 默认端口不算显式端口
        assert!(deny_reason("http://example.com:80/").await.is_none());
    }

    #[test]
    fn test_ipv4_classification() {
        assert!(is_blocked_ipv4(&Ipv4Addr::new(10, 0, 0, 1)));
        assert!(is_blocked_ipv4(&Ipv4Addr::new(172, 20, 0, 1)));
        assert!(!is_blocked_ipv4(&Ipv4Addr::new(172, 32, 0, 1)));
        assert!(is_blocked_ipv4(&Ipv4Addr::new(169, 254, 169, 254)));
        assert!(is_blocked_ipv4(&Ipv4Addr::new(239, 255, 255, 250)));
        assert!(!is_blocked_ipv4(&Ipv4Addr::new(8, 8, 8, 8)));
        assert!(!is_blocked_ipv4(&Ipv4Addr::new(1, 1, 1, 1)));
    }

    #[test]
    fn test_ipv4_this_network_and_shared_ranges() {
        assert!(is_blocked_ipv4(&Ipv4Addr::new(0, 0, 0, 0)));
        assert!(is_blocked_ipv4(&Ipv4Addr::new(0, 1, 2, 3)));
        assert!(is_blocked_ipv4(&Ipv4Addr::new(100, 64, 0, 1)));
        assert!(is_blocked_ipv4(&Ipv4Addr::new(100, 127, 255, 254)));
        assert!(!is_blocked_ipv4(&Ipv4Addr::new(100, 63, 255, 255)));
        assert!(!is_blocked_ipv4(&Ipv4Addr::new(100, 128, 0, 1)));
        assert!(is_blocked_ipv6(&"::ffff:100.64.0.1".parse().unwrap()));
    }

    #[test]
    fn test_ipv6_classification() {
        assert!(is_blocked_ipv6(&"::1".parse().unwrap()));
        assert!(is_blocked_ipv6(&"fc00::1".parse().unwrap()));
        assert!(is_blocked_ipv6(&"fdff:ffff::1".parse().unwrap()));
        assert!(is_blocked_ipv6(&"fe80::1".parse().unwrap()));
        assert!(is_blocked_ipv6(&"febf::1".parse().unwrap()));
        assert!(is_blocked_ipv6(&"::ffff:127.0.0.1".parse().unwrap()));
        assert!(is_blocked_ipv6(&"::ffff:169.254.169.254".parse().unwrap()));
        assert!(!is_blocked_ipv6(&"::ffff:8.8.8.8".parse().unwrap()));
        assert!(!is_blocked_ipv6(&"2001:4860:4860::8888".parse().unwrap()));
    }

    #[test]
    fn test_deny_reason_display() {
        let reason = DenyReason::BlockedPort { port: 6379 };
        assert_eq!(reason.to_string(), "端口被禁止: 6379");
    }
}
