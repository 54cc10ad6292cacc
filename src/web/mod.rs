//! Web API 模块
//!
//! 通过HTTP暴露单目标检测、批量检测和调度配置接口

use crate::error::{LinkVitalsError, StoreError};
use crate::service::LinkHealthService;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub mod api;
pub mod server;

pub use server::WebServer;

/// Web服务器共享状态
#[derive(Clone)]
pub struct ApiState {
    /// 链接健康服务
    pub service: Arc<LinkHealthService>,
    /// 启动时间
    pub start_time: chrono::DateTime<chrono::Utc>,
}

impl ApiState {
    /// 创建新的共享状态
    pub fn new(service: Arc<LinkHealthService>) -> Self {
        Self {
            service,
            start_time: chrono::Utc::now(),
        }
    }
}

/// API响应包装器
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    /// 是否成功
    pub success: bool,
    /// 响应数据
    pub data: Option<T>,
    /// 错误信息
    pub error: Option<String>,
    /// 时间戳
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl<T> ApiResponse<T> {
    /// 创建成功响应
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            timestamp: chrono::Utc::now(),
        }
    }

    /// 创建错误响应
    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: chrono::Utc::now(),
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let status = if self.success {
            StatusCode::OK
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        (status, Json(self)).into_response()
    }
}

/// API错误类型
#[derive(Debug)]
pub struct ApiError {
    /// HTTP状态码
    pub status: StatusCode,
    /// 错误消息
    pub message: String,
}

impl ApiError {
    /// 创建新的API错误
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// 请求参数错误
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }
}

impl From<LinkVitalsError> for ApiError {
    fn from(error: LinkVitalsError) -> Self {
        let status = match &error {
            LinkVitalsError::Store(StoreError::TargetNotFound { .. }) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, error.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiResponse::<()>::error(self.message);
        (self.status, Json(body)).into_response()
    }
}

/// 健康检查响应
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// 服务状态
    pub status: String,
    /// 版本信息
    pub version: String,
    /// 运行时间
    pub uptime_seconds: u64,
}
