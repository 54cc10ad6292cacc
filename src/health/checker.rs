//! HTTP链接探测器实现
//!
//! 对单个URL执行一次安全探测：先经过SSRF守卫，再以HEAD请求访问，
//! 手动跟随重定向并对每一跳重新校验，最后把结果归约为
//! 正常 / 失效 / 超时 三种状态。探测器从不向调用方返回错误。

use crate::error::ProbeSetupError;
use crate::guard::{UrlPolicy, Verdict};
use crate::health::result::{LinkStatus, ProbeOutcome};
use crate::logging::probe_log;
use async_trait::async_trait;
use reqwest::header::{
    HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CACHE_CONTROL, CONTENT_LENGTH, LOCATION,
    UPGRADE_INSECURE_REQUESTS,
};
use reqwest::{Client, Method, Response, StatusCode};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, warn};
use url::Url;

/// 模拟常见浏览器的User-Agent
const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// 链接探测器trait，定义探测接口
#[async_trait]
pub trait LinkProber: Send + Sync {
    /// 探测单个URL
    ///
    /// # 参数
    /// * `url` - 不可信的绝对URL
    ///
    /// # 返回
    /// * `ProbeOutcome` - 探测结果，所有内部错误都已归约
    async fn probe(&self, url: &str) -> ProbeOutcome;
}

/// 探测参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeSettings {
    /// 整次探测（含所有重定向）的时间预算
    pub timeout: Duration,
    /// 最多跟随的重定向次数
    pub max_redirects: u32,
    /// 响应 Content-Length 上限（字节）
    pub max_content_length: u64,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            max_redirects: 5,
            max_content_length: 10 * 1024 * 1024,
        }
    }
}

/// HTTP链接探测器实现
pub struct HttpLinkProber {
    /// HTTP客户端（禁用自动重定向）
    client: Client,
    /// URL访问策略
    policy: Arc<dyn UrlPolicy>,
    /// 探测参数
    settings: ProbeSettings,
}

impl HttpLinkProber {
    /// 创建新的HTTP链接探测器
    ///
    /// # 参数
    /// * `policy` - 初始URL和每一跳重定向都要经过的访问策略
    /// * `settings` - 探测参数
    ///
    /// # 返回
    /// * `Result<Self, ProbeSetupError>` - 探测器实例
    pub fn new(policy: Arc<dyn UrlPolicy>, settings: ProbeSettings) -> Result<Self, ProbeSetupError> {
        // 重定向必须由探测器自己处理，否则第二跳之后会绕过守卫
        let client = Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .no_proxy()
            .user_agent(BROWSER_USER_AGENT)
            .default_headers(Self::browser_headers())
            .connect_timeout(settings.timeout)
            .build()?;

        Ok(Self {
            client,
            policy,
            settings,
        })
    }

    /// 探测参数
    pub fn settings(&self) -> &ProbeSettings {
        &self.settings
    }

    /// 浏览器风格的默认请求头
    fn browser_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
            ),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        headers.insert(UPGRADE_INSECURE_REQUESTS, HeaderValue::from_static("1"));
        headers
    }

    /// 根据最终状态码分类
    ///
    /// 2xx 为正常，>= 400 为失效，其余未能继续跟随的 1xx/3xx 视为可达
    pub fn classify_status(status: u16) -> LinkStatus {
        match status {
            200..=299 => LinkStatus::Ok,
            400..=u16::MAX => LinkStatus::Broken,
            _ => LinkStatus::Ok,
        }
    }

    /// 读取响应头中声明的长度
    ///
    /// 不能使用 `Response::content_length`，HEAD响应的body大小提示总是0
    fn declared_length(response: &Response) -> Option<u64> {
        response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
    }

    /// 把请求错误归约为探测结果
    fn outcome_for_error(error: &reqwest::Error, last_status: Option<u16>) -> ProbeOutcome {
        if error.is_timeout() {
            ProbeOutcome::timeout()
        } else {
            ProbeOutcome::broken(last_status)
        }
    }

    /// 发送单个请求，405时改用GET重试一次
    async fn send(&self, url: &Url) -> Result<Response, reqwest::Error> {
        let response = self
            .client
            .request(Method::HEAD, url.clone())
            .send()
            .await?;

        if response.status() == StatusCode::METHOD_NOT_ALLOWED {
            debug!("HEAD不被允许，改用GET: {}", url);
            return self.client.request(Method::GET, url.clone()).send().await;
        }
        Ok(response)
    }

    /// 从已通过校验的URL开始跟随重定向，直到得到最终响应
    async fn follow(&self, start: Url) -> ProbeOutcome {
        let mut current = start;
        let mut hops: u32 = 0;
        let mut last_status: Option<u16> = None;

        loop {
            let response = match self.send(&current).await {
                Ok(response) => response,
                Err(e) => {
                    debug!("请求失败 {}: {}", current, e);
                    return Self::outcome_for_error(&e, last_status);
                }
            };

            let status = response.status();
            last_status = Some(status.as_u16());

            if let Some(length) = Self::declared_length(&response) {
                if length > self.settings.max_content_length {
                    warn!(
                        "响应体过大，放弃下载: {} ({} > {} 字节)",
                        current, length, self.settings.max_content_length
                    );
                    return ProbeOutcome::broken(last_status);
                }
            }

            if status.is_redirection() {
                let location = response
                    .headers()
                    .get(LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);

                if let Some(location) = location {
                    if hops >= self.settings.max_redirects {
                        warn!("重定向次数超过上限 {}: {}", self.settings.max_redirects, current);
                        return ProbeOutcome::broken(last_status);
                    }

                    let next = match current.join(&location) {
                        Ok(next) => next,
                        Err(e) => {
                            warn!("无效的重定向地址 {}: {}", location, e);
                            return ProbeOutcome::broken(last_status);
                        }
                    };

                    if let Verdict::Deny(reason) = self.policy.validate(&next).await {
                        warn!("重定向目标被SSRF守卫拒绝: {} -> {} ({})", current, next, reason);
                        return ProbeOutcome::broken(last_status);
                    }

                    hops += 1;
                    debug!("跟随重定向[{}]: {} -> {}", hops, current, next);
                    current = next;
                    continue;
                }
            }

            return ProbeOutcome {
                status: Self::classify_status(status.as_u16()),
                http_status: last_status,
            };
        }
    }
}

#[async_trait]
impl LinkProber for HttpLinkProber {
    async fn probe(&self, url: &str) -> ProbeOutcome {
        let parsed = match Url::parse(url) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("URL无法解析，视为失效: {} ({})", url, e);
                return ProbeOutcome::broken(None);
            }
        };

        if let Verdict::Deny(reason) = self.policy.validate(&parsed).await {
            warn!("URL被SSRF守卫拒绝: {} ({})", url, reason);
            return ProbeOutcome::broken(None);
        }

        let start_time = Instant::now();
        let outcome = match timeout(self.settings.timeout, self.follow(parsed)).await {
            Ok(outcome) => outcome,
            Err(_) => ProbeOutcome::timeout(),
        };

        probe_log(url, &outcome, start_time.elapsed());
        outcome
    }
}
