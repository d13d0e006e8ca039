//! HTTP request handlers

use crate::api::server::AppContext;
use crate::error::Error;
use crate::worker::QueueSnapshot;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use chanplay_common::events::{ChannelId, RequestInfo};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<StatusResponse>)>;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub module: String,
    pub version: String,
    pub git_hash: String,
    pub build_timestamp: String,
    pub build_profile: String,
    pub port: u16,
}

#[derive(Debug, Serialize)]
pub struct ChannelListResponse {
    pub channels: Vec<ChannelId>,
}

#[derive(Debug, Serialize)]
pub struct ChannelResponse {
    pub status: String,
    pub channel_id: ChannelId,
}

#[derive(Debug, Deserialize)]
pub struct EnqueueRequest {
    pub request: String,
    #[serde(default = "default_requester")]
    pub requester: String,
}

fn default_requester() -> String {
    "anonymous".to_string()
}

#[derive(Debug, Serialize)]
pub struct EnqueueResponse {
    pub status: String,
    pub request: RequestInfo,
}

#[derive(Debug, Deserialize, Default)]
pub struct SkipRequest {
    #[serde(default = "default_skip_count")]
    pub count: i64,
}

fn default_skip_count() -> i64 {
    1
}

/// Map a service error to an HTTP status
pub fn error_status(e: &Error) -> StatusCode {
    match e {
        Error::InvalidArgument(_) | Error::Unparseable(_) => StatusCode::BAD_REQUEST,
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::QueueClosed => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(e: Error) -> (StatusCode, Json<StatusResponse>) {
    let status = error_status(&e);
    if status.is_server_error() {
        error!("Request failed: {}", e);
    } else {
        warn!("Request rejected: {}", e);
    }
    (
        status,
        Json(StatusResponse {
            status: format!("error: {}", e),
        }),
    )
}

fn ok_status(status: &str) -> Json<StatusResponse> {
    Json(StatusResponse {
        status: status.to_string(),
    })
}

// ============================================================================
// Health Endpoint
// ============================================================================

/// GET /health - Health check endpoint
pub async fn health(State(ctx): State<AppContext>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        module: "chanplay-ap".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        git_hash: env!("GIT_HASH").to_string(),
        build_timestamp: env!("BUILD_TIMESTAMP").to_string(),
        build_profile: env!("BUILD_PROFILE").to_string(),
        port: ctx.port,
    })
}

// ============================================================================
// Channel Lifecycle
// ============================================================================

/// GET /channels - List channels with a worker
pub async fn list_channels(State(ctx): State<AppContext>) -> Json<ChannelListResponse> {
    Json(ChannelListResponse {
        channels: ctx.registry.channels().await,
    })
}

/// POST /channels/:channel_id/start - Start (or reuse) a channel worker
pub async fn start_channel(
    State(ctx): State<AppContext>,
    Path(channel_id): Path<String>,
) -> ApiResult<ChannelResponse> {
    ctx.registry
        .start(&channel_id)
        .await
        .map_err(error_response)?;
    info!("Channel {} started", channel_id);
    Ok(Json(ChannelResponse {
        status: "started".to_string(),
        channel_id,
    }))
}

/// DELETE /channels/:channel_id - Stop a channel worker
pub async fn stop_channel(
    State(ctx): State<AppContext>,
    Path(channel_id): Path<String>,
) -> ApiResult<ChannelResponse> {
    if !ctx.registry.stop(&channel_id).await {
        return Err(error_response(Error::NotFound(format!("channel {}", channel_id))));
    }
    info!("Channel {} stopped", channel_id);
    Ok(Json(ChannelResponse {
        status: "stopped".to_string(),
        channel_id,
    }))
}

// ============================================================================
// Queue Operations
// ============================================================================

/// POST /channels/:channel_id/queue - Enqueue a request
pub async fn enqueue(
    State(ctx): State<AppContext>,
    Path(channel_id): Path<String>,
    Json(req): Json<EnqueueRequest>,
) -> ApiResult<EnqueueResponse> {
    let request = ctx
        .registry
        .enqueue(&channel_id, &req.request, &req.requester)
        .await
        .map_err(error_response)?;

    Ok(Json(EnqueueResponse {
        status: "enqueued".to_string(),
        request,
    }))
}

/// GET /channels/:channel_id/queue - Queue snapshot, current item first
pub async fn get_queue(
    State(ctx): State<AppContext>,
    Path(channel_id): Path<String>,
) -> Json<QueueSnapshot> {
    Json(ctx.registry.queue(&channel_id).await)
}

/// POST /channels/:channel_id/skip - Skip `count` items (default 1)
pub async fn skip(
    State(ctx): State<AppContext>,
    Path(channel_id): Path<String>,
    body: Option<Json<SkipRequest>>,
) -> ApiResult<StatusResponse> {
    let count = body.map(|Json(req)| req.count).unwrap_or_else(default_skip_count);
    ctx.registry
        .skip(&channel_id, count)
        .await
        .map_err(error_response)?;
    Ok(ok_status("skipped"))
}

/// POST /channels/:channel_id/clear - Drop the current item and everything queued
pub async fn clear(
    State(ctx): State<AppContext>,
    Path(channel_id): Path<String>,
) -> ApiResult<StatusResponse> {
    ctx.registry
        .clear(&channel_id)
        .await
        .map_err(error_response)?;
    Ok(ok_status("cleared"))
}
