//! API端点实现
//!
//! 提供RESTful API接口

use super::{ApiError, ApiResponse, ApiState, HealthResponse};
use crate::health::batch::BatchReport;
use crate::health::scheduler::{RunOutcome, SchedulerStatus};
use crate::service::{BulkCheckReport, CheckReport};
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::info;

/// 批量检测请求体
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct BulkCheckRequest {
    /// 要检测的目标，缺省表示该所有者的全部目标
    pub target_ids: Option<Vec<String>>,
}

/// 调度配置请求体
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SchedulerConfigRequest {
    /// 是否启用
    pub enabled: bool,
    /// 检测间隔（分钟）
    pub interval_minutes: u64,
    /// 批量大小
    pub batch_size: usize,
}

/// 立即执行的响应
#[derive(Debug, Serialize, Deserialize)]
pub struct RunNowResponse {
    /// 上一轮尚未结束而被跳过
    pub skipped: bool,
    /// 本轮汇总
    pub report: Option<BatchReport>,
}

impl From<RunOutcome> for RunNowResponse {
    fn from(outcome: RunOutcome) -> Self {
        match outcome {
            RunOutcome::Completed(report) => Self {
                skipped: false,
                report: Some(report),
            },
            RunOutcome::Skipped => Self {
                skipped: true,
                report: None,
            },
        }
    }
}

/// 创建API路由
pub fn create_api_routes(state: ApiState) -> Router {
    Router::new()
        .route("/api/v1/health", get(health))
        .route("/api/v1/schedulers", get(list_schedulers))
        .route("/api/v1/targets/{id}/check", post(check_target))
        .route("/api/v1/owners/{owner}/bulk-check", post(bulk_check))
        .route(
            "/api/v1/owners/{owner}/scheduler",
            get(scheduler_status).put(configure_scheduler),
        )
        .route("/api/v1/owners/{owner}/scheduler/run", post(run_now))
        .with_state(state)
}

async fn health(State(state): State<ApiState>) -> ApiResponse<HealthResponse> {
    let uptime = (chrono::Utc::now() - state.start_time).num_seconds().max(0) as u64;
    ApiResponse::success(HealthResponse {
        status: "ok".to_string(),
        version: crate::VERSION.to_string(),
        uptime_seconds: uptime,
    })
}

async fn list_schedulers(State(state): State<ApiState>) -> ApiResponse<Vec<SchedulerStatus>> {
    let mut statuses = state.service.registry().contexts();
    statuses.sort_by_key(|status| status.scope.to_string());
    ApiResponse::success(statuses)
}

async fn check_target(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<ApiResponse<CheckReport>, ApiError> {
    let report = state.service.check(&id).await?;
    Ok(ApiResponse::success(report))
}

async fn bulk_check(
    State(state): State<ApiState>,
    Path(owner): Path<String>,
    body: Bytes,
) -> Result<ApiResponse<BulkCheckReport>, ApiError> {
    // 请求体可以为空
    let request: BulkCheckRequest = if body.iter().all(u8::is_ascii_whitespace) {
        BulkCheckRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::bad_request(format!("无效的请求体: {e}")))?
    };

    let report = state
        .service
        .bulk_check(&owner, request.target_ids.as_deref())
        .await;
    info!(
        "批量检测请求完成: {}，成功 {}，失败 {}",
        owner,
        report.checked_ids.len(),
        report.failed.len()
    );
    Ok(ApiResponse::success(report))
}

async fn scheduler_status(
    State(state): State<ApiState>,
    Path(owner): Path<String>,
) -> ApiResponse<SchedulerStatus> {
    ApiResponse::success(state.service.get_scheduler_status(&owner))
}

async fn configure_scheduler(
    State(state): State<ApiState>,
    Path(owner): Path<String>,
    Json(request): Json<SchedulerConfigRequest>,
) -> ApiResponse<SchedulerStatus> {
    ApiResponse::success(state.service.set_scheduler_config(
        &owner,
        request.enabled,
        request.interval_minutes,
        request.batch_size,
    ))
}

async fn run_now(
    State(state): State<ApiState>,
    Path(owner): Path<String>,
) -> ApiResponse<RunNowResponse> {
    ApiResponse::success(state.service.run_now(&owner).await.into())
}
