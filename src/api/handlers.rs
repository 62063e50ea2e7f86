use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::commands::LAST_FILE_WRITTEN;
use crate::duplication::DuplicationAnalyzer;

use super::{ApiError, ApiState};

pub fn routes() -> Router<ApiState> {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/roadmap", get(roadmap))
        .route("/generate/function", post(generate_function))
        .route("/generate/tests", post(generate_tests))
        .route("/agent/plan", post(agent_plan))
        .route("/file/write", post(file_write))
        .route("/file/read", get(file_read))
        .route("/analyze/duplicates", get(duplicates))
}

#[derive(Debug, Deserialize)]
pub struct GenerationRequest {
    pub prompt: String,
}

#[derive(Debug, Deserialize)]
pub struct FileRequest {
    pub filepath: String,
}

#[derive(Debug, Deserialize)]
pub struct PlanRequest {
    pub goal: String,
}

#[derive(Debug, Deserialize)]
pub struct WriteRequest {
    pub filepath: String,
    pub content: String,
}

pub async fn root() -> Json<Value> {
    Json(json!({ "message": "Welcome to The Giblet API." }))
}

pub async fn health(State(state): State<ApiState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "provider": state.ctx.provider.name(),
        "memory_backend": state.ctx.memory.backend_name(),
    }))
}

pub async fn roadmap(State(state): State<ApiState>) -> Result<Json<Value>, ApiError> {
    let tasks = state.roadmap.tasks().map_err(ApiError::internal)?;
    Ok(Json(json!({ "roadmap": tasks })))
}

pub async fn generate_function(
    State(state): State<ApiState>,
    Json(req): Json<GenerationRequest>,
) -> Result<Json<Value>, ApiError> {
    if req.prompt.trim().is_empty() {
        return Err(ApiError::bad_request("prompt must not be empty"));
    }
    let code = state
        .code
        .generate_function(&req.prompt)
        .await
        .map_err(ApiError::upstream)?;
    Ok(Json(json!({ "generated_code": code })))
}

pub async fn generate_tests(
    State(state): State<ApiState>,
    Json(req): Json<FileRequest>,
) -> Result<Json<Value>, ApiError> {
    let source = state.ctx.workspace.read_file(&req.filepath).await?;
    if source.trim().is_empty() {
        return Err(ApiError::bad_request("File is empty."));
    }
    let tests = state
        .code
        .generate_unit_tests(&source, &req.filepath)
        .await
        .map_err(ApiError::upstream)?;
    Ok(Json(json!({ "generated_code": tests })))
}

pub async fn agent_plan(
    State(state): State<ApiState>,
    Json(req): Json<PlanRequest>,
) -> Result<Json<Value>, ApiError> {
    if req.goal.trim().is_empty() {
        return Err(ApiError::bad_request("goal must not be empty"));
    }
    let plan = state
        .agent
        .create_plan(&req.goal)
        .await
        .map_err(ApiError::upstream)?;
    Ok(Json(json!({ "goal": req.goal, "plan": plan })))
}

pub async fn file_write(
    State(state): State<ApiState>,
    Json(req): Json<WriteRequest>,
) -> Result<Json<Value>, ApiError> {
    let ws = &state.ctx.workspace;
    let resolved = ws.write_file(&req.filepath, &req.content).await?;
    let relative = ws.relative(&resolved);
    state.ctx.memory.remember(LAST_FILE_WRITTEN, relative.clone());
    info!("api wrote {}", relative);
    Ok(Json(json!({ "filepath": relative, "bytes": req.content.len() })))
}

pub async fn file_read(
    State(state): State<ApiState>,
    Query(req): Query<FileRequest>,
) -> Result<Json<Value>, ApiError> {
    let content = state.ctx.workspace.read_file(&req.filepath).await?;
    Ok(Json(json!({ "filepath": req.filepath, "content": content })))
}

pub async fn duplicates(State(state): State<ApiState>) -> Result<Json<Value>, ApiError> {
    let root = state.ctx.workspace.root().to_path_buf();
    let groups = tokio::task::spawn_blocking(move || DuplicationAnalyzer::find_duplicates(&root))
        .await
        .map_err(|e| ApiError::internal(e.into()))?;
    Ok(Json(json!({ "syntactic": groups })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::http::StatusCode;

    use crate::commands::{test_context, test_context_with};
    use crate::providers::testing::ScriptedProvider;

    #[tokio::test]
    async fn root_and_health() {
        let (ctx, _root, _data) = test_context().await;
        let state = ApiState::new(ctx);
        assert!(root().await.0["message"].as_str().unwrap().contains("Giblet"));

        let health = health(State(state)).await.0;
        assert_eq!(health["status"], "ok");
        assert_eq!(health["provider"], "scripted");
        assert_eq!(health["memory_backend"], "json");
    }

    #[tokio::test]
    async fn roadmap_lists_tasks() {
        let (ctx, root, _data) = test_context().await;
        std::fs::write(root.path().join("roadmap.md"), "- [x] Parse\n- [ ] **Ship**\n").unwrap();

        let body = roadmap(State(ApiState::new(ctx))).await.unwrap().0;
        assert_eq!(body["roadmap"][0]["complete"], true);
        assert_eq!(body["roadmap"][1]["description"], "Ship");
    }

    #[tokio::test]
    async fn generate_function_strips_fences() {
        let provider = Arc::new(ScriptedProvider::new(vec!["```python\ndef add(a, b):\n    return a + b\n```"]));
        let (ctx, _root, _data) = test_context_with(provider).await;

        let body = generate_function(
            State(ApiState::new(ctx)),
            Json(GenerationRequest {
                prompt: "add two numbers".to_string(),
            }),
        )
        .await
        .unwrap()
        .0;
        assert_eq!(body["generated_code"], "def add(a, b):\n    return a + b");
    }

    #[tokio::test]
    async fn empty_prompt_is_bad_request() {
        let (ctx, _root, _data) = test_context().await;
        let err = generate_function(
            State(ApiState::new(ctx)),
            Json(GenerationRequest {
                prompt: "  ".to_string(),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn generate_tests_for_missing_file_is_not_found() {
        let (ctx, _root, _data) = test_context().await;
        let err = generate_tests(
            State(ApiState::new(ctx)),
            Json(FileRequest {
                filepath: "nope.py".to_string(),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn provider_failure_is_bad_gateway() {
        let provider = Arc::new(ScriptedProvider::failing("quota exceeded"));
        let (ctx, _root, _data) = test_context_with(provider).await;
        let err = agent_plan(
            State(ApiState::new(ctx)),
            Json(PlanRequest {
                goal: "add a lexer".to_string(),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_GATEWAY);
        assert!(err.message.contains("quota exceeded"));
    }

    #[tokio::test]
    async fn bad_gateway_body_names_the_underlying_cause() {
        use crate::config::GeminiConfig;
        use crate::providers::gemini::GeminiProvider;
        use crate::providers::reliable::{ReliableProvider, RetryConfig};

        let gemini = GeminiProvider::new(&GeminiConfig {
            api_key: String::new(),
            ..GeminiConfig::default()
        });
        let provider = Arc::new(ReliableProvider::new(Box::new(gemini), RetryConfig::default()));
        let (ctx, _root, _data) = test_context_with(provider).await;
        let err = agent_plan(
            State(ApiState::new(ctx)),
            Json(PlanRequest {
                goal: "add a lexer".to_string(),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_GATEWAY);
        assert!(err.message.contains("all providers failed"), "{}", err.message);
        assert!(err.message.contains("Gemini API key missing"), "{}", err.message);
    }

    #[tokio::test]
    async fn agent_plan_returns_steps() {
        let provider = Arc::new(ScriptedProvider::new(vec![r#"["ls", "read main.py"]"#]));
        let (ctx, _root, _data) = test_context_with(provider).await;
        let body = agent_plan(
            State(ApiState::new(ctx)),
            Json(PlanRequest {
                goal: "look around".to_string(),
            }),
        )
        .await
        .unwrap()
        .0;
        assert_eq!(body["plan"], json!(["ls", "read main.py"]));
    }

    #[tokio::test]
    async fn write_then_read_file() {
        let (ctx, _root, _data) = test_context().await;
        let state = ApiState::new(ctx);

        let written = file_write(
            State(state.clone()),
            Json(WriteRequest {
                filepath: "notes/todo.md".to_string(),
                content: "- [ ] test".to_string(),
            }),
        )
        .await
        .unwrap()
        .0;
        assert_eq!(written["filepath"], "notes/todo.md");
        assert_eq!(
            state.ctx.memory.recall_str(LAST_FILE_WRITTEN).as_deref(),
            Some("notes/todo.md")
        );

        let read = file_read(
            State(state),
            Query(FileRequest {
                filepath: "notes/todo.md".to_string(),
            }),
        )
        .await
        .unwrap()
        .0;
        assert_eq!(read["content"], "- [ ] test");
    }

    #[tokio::test]
    async fn duplicates_reports_syntactic_groups() {
        let (ctx, root, _data) = test_context().await;
        let body = "    if x:\n        return x * 2\n    return 0\n";
        std::fs::write(root.path().join("a.py"), format!("def one(x):\n{}", body)).unwrap();
        std::fs::write(root.path().join("b.py"), format!("def two(y):\n{}", body.replace('x', "y"))).unwrap();

        let report = duplicates(State(ApiState::new(ctx))).await.unwrap().0;
        assert_eq!(report["syntactic"][0][0]["function_name"], "one");
        assert_eq!(report["syntactic"][0][1]["file"], "b.py");
        assert_eq!(report["syntactic"][0][1]["line_number"], 1);
    }

    #[tokio::test]
    async fn escaping_path_is_forbidden() {
        let (ctx, _root, _data) = test_context().await;
        let err = file_read(
            State(ApiState::new(ctx)),
            Query(FileRequest {
                filepath: "../../etc/passwd".to_string(),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::FORBIDDEN);
    }
}
