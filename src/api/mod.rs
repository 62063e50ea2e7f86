//! HTTP API：roadmap、代码生成、计划与工作区文件读写

pub mod handlers;

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use color_eyre::eyre::{Context, Result};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::agent::Agent;
use crate::commands::CommandContext;
use crate::error::WorkspaceError;
use crate::generators::CodeGenerator;
use crate::roadmap::RoadmapManager;

/// 所有 handler 共享的状态
#[derive(Clone)]
pub struct ApiState {
    pub ctx: CommandContext,
    pub roadmap: Arc<RoadmapManager>,
    pub code: Arc<CodeGenerator>,
    pub agent: Arc<Agent>,
}

impl ApiState {
    pub fn new(ctx: CommandContext) -> Self {
        let roadmap = RoadmapManager::in_project(ctx.workspace.root(), ctx.memory.clone());
        let code = CodeGenerator::new(
            ctx.provider.clone(),
            ctx.memory.clone(),
            ctx.profile.clone(),
            ctx.options,
        );
        let agent = Agent::new(ctx.provider.clone(), ctx.memory.clone(), ctx.options);
        Self {
            roadmap: Arc::new(roadmap),
            code: Arc::new(code),
            agent: Arc::new(agent),
            ctx,
        }
    }
}

/// handler 错误：渲染为 `{"error": ...}` 加对应状态码
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    /// LLM 或其他上游调用失败
    pub fn upstream(err: color_eyre::Report) -> Self {
        Self {
            status: StatusCode::BAD_GATEWAY,
            message: format!("{:#}", err),
        }
    }

    pub fn internal(err: color_eyre::Report) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: format!("{:#}", err),
        }
    }
}

impl From<WorkspaceError> for ApiError {
    fn from(err: WorkspaceError) -> Self {
        let status = match &err {
            WorkspaceError::OutsideRoot(_) => StatusCode::FORBIDDEN,
            WorkspaceError::NotAFile(_) => StatusCode::NOT_FOUND,
            WorkspaceError::Io { source, .. }
                if source.kind() == std::io::ErrorKind::NotFound =>
            {
                StatusCode::NOT_FOUND
            }
            WorkspaceError::Io { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!("api error ({}): {}", self.status, self.message);
        }
        (self.status, Json(serde_json::json!({ "error": self.message }))).into_response()
    }
}

/// 构建路由
pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .merge(handlers::routes())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// 监听 `bind` 直到 Ctrl-C
pub async fn serve(state: ApiState, bind: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .wrap_err_with(|| format!("failed to bind {}", bind))?;
    info!("Giblet API listening on http://{}", bind);
    println!("Giblet API listening on http://{}", bind);

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("API server shutting down");
        })
        .await
        .wrap_err("API server failed")
}
