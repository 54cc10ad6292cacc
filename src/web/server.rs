//! Web服务器实现
//!
//! 提供HTTP服务器和路由管理

use super::{api, ApiState};
use crate::config::WebConfig;
use crate::error::{ConfigError, LinkVitalsError, Result};
use crate::service::LinkHealthService;
use axum::Router;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Web服务器
pub struct WebServer {
    /// 配置
    config: WebConfig,
    /// 链接健康服务
    service: Arc<LinkHealthService>,
    /// 关闭信号接收器
    shutdown_rx: Option<broadcast::Receiver<()>>,
}

impl WebServer {
    /// 创建新的Web服务器
    ///
    /// # 参数
    /// * `config` - Web配置
    /// * `service` - 链接健康服务
    /// * `shutdown_rx` - 关闭信号接收器
    pub fn new(
        config: WebConfig,
        service: Arc<LinkHealthService>,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            config,
            service,
            shutdown_rx: Some(shutdown_rx),
        }
    }

    /// 监听地址
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self.config.bind_address.trim().parse().map_err(|e| {
            ConfigError::ValidationError(format!(
                "无效的Web服务器绑定地址 {}: {}",
                self.config.bind_address, e
            ))
        })?;
        Ok(SocketAddr::new(ip, self.config.port))
    }

    /// 创建路由
    pub fn router(&self) -> Router {
        api::create_api_routes(ApiState::new(Arc::clone(&self.service)))
            .layer(TraceLayer::new_for_http())
    }

    /// 绑定监听端口
    pub async fn bind(&self) -> Result<TcpListener> {
        let addr = self.socket_addr()?;
        Ok(TcpListener::bind(addr).await?)
    }

    /// 启动Web服务器，直到收到关闭信号
    pub async fn start(&mut self) -> Result<()> {
        if !self.config.enabled {
            info!("Web服务器已禁用");
            return Ok(());
        }

        let listener = self.bind().await?;
        self.serve(listener).await
    }

    /// 在已绑定的端口上提供服务
    pub async fn serve(&mut self, listener: TcpListener) -> Result<()> {
        let mut shutdown_rx = self.shutdown_rx.take().ok_or_else(|| {
            LinkVitalsError::Other(anyhow::anyhow!("关闭信号接收器已被使用"))
        })?;

        let addr = listener.local_addr()?;
        info!("Web服务器已启动: http://{}", addr);
        info!("API地址: http://{}/api/v1/health", addr);

        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
                info!("接收到关闭信号，正在关闭Web服务器...");
            })
            .await?;

        info!("Web服务器已关闭");
        Ok(())
    }
}
