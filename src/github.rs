use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info, warn};

use crate::config::GithubConfig;
use crate::error::GitHubError;

pub const GITHUB_API_URL: &str = "https://api.github.com";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// 新建仓库的关键信息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoInfo {
    pub name: String,
    pub full_name: String,
    pub html_url: String,
    #[serde(default)]
    pub clone_url: String,
    #[serde(default)]
    pub private: bool,
}

/// GitHub REST API 的最小封装（目前只有创建仓库）
pub struct GitHubClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl GitHubClient {
    pub fn new(token: impl Into<String>) -> Self {
        let token = token.into();
        if token.is_empty() {
            warn!("GitHub token not set, GitHub operations will fail");
        }
        Self {
            client: reqwest::Client::new(),
            base_url: GITHUB_API_URL.to_string(),
            token,
        }
    }

    /// `[github].token`，为空时已由配置层回退到 GITHUB_TOKEN
    pub fn from_config(config: &GithubConfig) -> Self {
        Self::new(config.token.clone())
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn has_token(&self) -> bool {
        !self.token.is_empty()
    }

    /// 为当前用户创建仓库（带初始提交）
    pub async fn create_repo(
        &self,
        name: &str,
        description: &str,
        private: bool,
    ) -> Result<RepoInfo, GitHubError> {
        if !self.has_token() {
            return Err(GitHubError::MissingToken);
        }

        info!("creating GitHub repository '{}'", name);
        let resp = self
            .client
            .post(format!("{}/user/repos", self.base_url))
            .header("Authorization", format!("token {}", self.token))
            .header("Accept", "application/vnd.github.v3+json")
            .header("User-Agent", concat!("giblet/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .json(&create_repo_body(name, description, private))
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            let message = api_error_message(&body);
            error!("GitHub API error creating '{}': {}", name, message);
            return Err(GitHubError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let repo: RepoInfo = serde_json::from_str(&body).map_err(|e| GitHubError::Api {
            status: status.as_u16(),
            message: format!("unexpected response body: {}", e),
        })?;
        info!("created repository {}", repo.html_url);
        Ok(repo)
    }
}

fn create_repo_body(name: &str, description: &str, private: bool) -> Value {
    serde_json::json!({
        "name": name,
        "description": description,
        "private": private,
        "auto_init": true,
    })
}

/// 从错误响应中提取 `message`，附加第一条 `errors[].message`
fn api_error_message(body: &str) -> String {
    let parsed: Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(_) if body.trim().is_empty() => return "Unknown HTTP error.".to_string(),
        Err(_) => return body.trim().to_string(),
    };

    let mut message = parsed
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("An unknown error occurred.")
        .to_string();
    if let Some(detail) = parsed
        .get("errors")
        .and_then(Value::as_array)
        .and_then(|errors| errors.first())
        .and_then(|e| e.get("message"))
        .and_then(Value::as_str)
    {
        message.push_str(" Details: ");
        message.push_str(detail);
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, StatusCode};
    use axum::{routing::post, Json, Router};

    /// 本地假 GitHub：名为 "taken" 的仓库返回 422，其余返回 201
    async fn stub_github() -> String {
        async fn create(headers: HeaderMap, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
            if headers.get("authorization").and_then(|v| v.to_str().ok()) != Some("token t0k") {
                return (
                    StatusCode::UNAUTHORIZED,
                    Json(serde_json::json!({"message": "Bad credentials"})),
                );
            }
            let name = body["name"].as_str().unwrap_or_default().to_string();
            if name == "taken" {
                return (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    Json(serde_json::json!({
                        "message": "Repository creation failed.",
                        "errors": [{"message": "name already exists on this account"}],
                    })),
                );
            }
            (
                StatusCode::CREATED,
                Json(serde_json::json!({
                    "name": name,
                    "full_name": format!("ada/{}", name),
                    "html_url": format!("https://github.com/ada/{}", name),
                    "clone_url": format!("https://github.com/ada/{}.git", name),
                    "private": body["private"],
                    "auto_init_seen": body["auto_init"],
                })),
            )
        }

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new().route("/user/repos", post(create));
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/", addr)
    }

    #[tokio::test]
    async fn create_repo_parses_created_response() {
        let client = GitHubClient::new("t0k").with_base_url(&stub_github().await);
        let repo = client.create_repo("demo", "A demo", true).await.unwrap();
        assert_eq!(repo.full_name, "ada/demo");
        assert_eq!(repo.clone_url, "https://github.com/ada/demo.git");
        assert!(repo.private);
    }

    #[tokio::test]
    async fn create_repo_surfaces_validation_errors() {
        let client = GitHubClient::new("t0k").with_base_url(&stub_github().await);
        match client.create_repo("taken", "", false).await {
            Err(GitHubError::Api { status, message }) => {
                assert_eq!(status, 422);
                assert_eq!(
                    message,
                    "Repository creation failed. Details: name already exists on this account"
                );
            }
            other => panic!("expected a 422 API error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn create_repo_reports_bad_credentials() {
        let client = GitHubClient::new("wrong").with_base_url(&stub_github().await);
        assert!(matches!(
            client.create_repo("demo", "", false).await,
            Err(GitHubError::Api { status: 401, .. })
        ));
    }

    #[tokio::test]
    async fn missing_token_fails_without_request() {
        let client = GitHubClient::new("").with_base_url("http://127.0.0.1:9");
        assert!(matches!(
            client.create_repo("demo", "", true).await,
            Err(GitHubError::MissingToken)
        ));
    }

    #[test]
    fn body_requests_initial_commit() {
        let body = create_repo_body("demo", "A demo", false);
        assert_eq!(body["name"], "demo");
        assert_eq!(body["private"], false);
        assert_eq!(body["auto_init"], true);
    }

    #[test]
    fn error_message_includes_first_detail() {
        let body = r#"{"message":"Repository creation failed.","errors":[{"resource":"Repository","message":"name already exists on this account"},{"message":"other"}]}"#;
        assert_eq!(
            api_error_message(body),
            "Repository creation failed. Details: name already exists on this account"
        );
    }

    #[test]
    fn error_message_without_details_or_json() {
        assert_eq!(api_error_message(r#"{"message":"Bad credentials"}"#), "Bad credentials");
        assert_eq!(api_error_message("<html>502</html>"), "<html>502</html>");
        assert_eq!(api_error_message(""), "Unknown HTTP error.");
        assert_eq!(api_error_message("{}"), "An unknown error occurred.");
    }

    #[test]
    fn api_error_displays_status() {
        let err = GitHubError::Api {
            status: 422,
            message: "Validation Failed".to_string(),
        };
        assert_eq!(err.to_string(), "GitHub API error (422): Validation Failed");
    }

    #[test]
    fn repo_info_parses_github_payload() {
        let json = r#"{"id":1,"name":"demo","full_name":"ada/demo","html_url":"https://github.com/ada/demo","clone_url":"https://github.com/ada/demo.git","private":true,"owner":{"login":"ada"}}"#;
        let repo: RepoInfo = serde_json::from_str(json).unwrap();
        assert_eq!(repo.full_name, "ada/demo");
        assert!(repo.private);
    }
}
