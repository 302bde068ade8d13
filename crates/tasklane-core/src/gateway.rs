use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tasklane_shared::{
    LoginArgs, SignupArgs, TaskCreate, TaskDto, TaskPatch, TasksListArgs, TokenResponse, UserDto,
};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::error::TaskError;
use crate::session::Session;

/// Remote task operations consumed by the engine.
#[async_trait]
pub trait TaskGateway: Send + Sync {
    async fn list(&self, args: &TasksListArgs) -> Result<Vec<TaskDto>, TaskError>;

    async fn get(&self, id: Uuid) -> Result<TaskDto, TaskError>;

    async fn create(&self, payload: &TaskCreate) -> Result<TaskDto, TaskError>;

    async fn update(&self, id: Uuid, patch: &TaskPatch) -> Result<TaskDto, TaskError>;

    async fn toggle_complete(&self, id: Uuid) -> Result<TaskDto, TaskError>;

    async fn delete(&self, id: Uuid) -> Result<(), TaskError>;
}

#[async_trait]
pub trait AuthGateway: Send + Sync {
    async fn signup(&self, args: &SignupArgs) -> Result<TokenResponse, TaskError>;

    async fn login(&self, args: &LoginArgs) -> Result<TokenResponse, TaskError>;

    async fn me(&self) -> Result<UserDto, TaskError>;
}

/// REST client for the task service. Reads the bearer credential from the
/// shared [`Session`] on every call and never retries.
#[derive(Debug, Clone)]
pub struct HttpGateway {
    client: reqwest::Client,
    base_url: String,
    session: Arc<Session>,
}

impl HttpGateway {
    pub fn new(base_url: &str, timeout: Duration, session: Arc<Session>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed building HTTP client for task service")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            session,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, method: Method, path: &str) -> Result<RequestBuilder, TaskError> {
        let Some(token) = self.session.token() else {
            debug!(path, "no credential available; refusing request");
            return Err(TaskError::Unauthorized);
        };
        Ok(self.client.request(method, self.url(path)).bearer_auth(token))
    }

    fn anonymous(&self, method: Method, path: &str) -> RequestBuilder {
        self.client.request(method, self.url(path))
    }
}

#[async_trait]
impl TaskGateway for HttpGateway {
    #[instrument(skip(self), fields(filter = ?args.filter, sort_by = ?args.sort_by, search = ?args.search))]
    async fn list(&self, args: &TasksListArgs) -> Result<Vec<TaskDto>, TaskError> {
        let request = self.authorized(Method::GET, "/api/tasks")?.query(args);
        let tasks: Vec<TaskDto> = decode(send(request).await?).await?;
        debug!(count = tasks.len(), "listed tasks");
        Ok(tasks)
    }

    #[instrument(skip(self))]
    async fn get(&self, id: Uuid) -> Result<TaskDto, TaskError> {
        let request = self.authorized(Method::GET, &format!("/api/tasks/{id}"))?;
        decode(send(request).await?).await
    }

    #[instrument(skip(self, payload), fields(title_len = payload.title.len()))]
    async fn create(&self, payload: &TaskCreate) -> Result<TaskDto, TaskError> {
        let request = self.authorized(Method::POST, "/api/tasks")?.json(payload);
        decode(send(request).await?).await
    }

    #[instrument(skip(self, patch))]
    async fn update(&self, id: Uuid, patch: &TaskPatch) -> Result<TaskDto, TaskError> {
        let request = self
            .authorized(Method::PUT, &format!("/api/tasks/{id}"))?
            .json(patch);
        decode(send(request).await?).await
    }

    #[instrument(skip(self))]
    async fn toggle_complete(&self, id: Uuid) -> Result<TaskDto, TaskError> {
        let request = self.authorized(Method::PATCH, &format!("/api/tasks/{id}/complete"))?;
        decode(send(request).await?).await
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: Uuid) -> Result<(), TaskError> {
        let request = self.authorized(Method::DELETE, &format!("/api/tasks/{id}"))?;
        let response = send(request).await?;
        if response.status().is_success() {
            return Ok(());
        }
        Err(failure(response).await)
    }
}

#[async_trait]
impl AuthGateway for HttpGateway {
    #[instrument(skip(self, args), fields(email = %args.email))]
    async fn signup(&self, args: &SignupArgs) -> Result<TokenResponse, TaskError> {
        let request = self.anonymous(Method::POST, "/api/auth/signup").json(args);
        decode_anonymous(send(request).await?).await
    }

    #[instrument(skip(self, args), fields(email = %args.email))]
    async fn login(&self, args: &LoginArgs) -> Result<TokenResponse, TaskError> {
        let request = self.anonymous(Method::POST, "/api/auth/login").json(args);
        decode_anonymous(send(request).await?).await
    }

    #[instrument(skip(self))]
    async fn me(&self) -> Result<UserDto, TaskError> {
        let request = self.authorized(Method::GET, "/api/auth/me")?;
        decode(send(request).await?).await
    }
}

async fn send(request: RequestBuilder) -> Result<Response, TaskError> {
    request.send().await.map_err(|err| {
        warn!(error = %err, "request did not complete");
        TaskError::NetworkFailure(err.to_string())
    })
}

/// Decodes a credential exchange. Without a session a 401 means the
/// submitted email or password was wrong, not that a session expired.
async fn decode_anonymous<T: DeserializeOwned>(response: Response) -> Result<T, TaskError> {
    if response.status() == StatusCode::UNAUTHORIZED {
        let (_, detail) = read_failure(response).await;
        debug!(detail = %detail, "credentials rejected");
        return Err(TaskError::ValidationFailure(detail));
    }
    decode(response).await
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, TaskError> {
    if !response.status().is_success() {
        return Err(failure(response).await);
    }

    response
        .json::<T>()
        .await
        .map_err(|err| TaskError::NetworkFailure(format!("undecodable response body: {err}")))
}

async fn read_failure(response: Response) -> (StatusCode, String) {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let detail = extract_detail(&body).unwrap_or_else(|| {
        status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string()
    });
    (status, detail)
}

async fn failure(response: Response) -> TaskError {
    let (status, detail) = read_failure(response).await;

    if status == StatusCode::UNAUTHORIZED {
        warn!("task service rejected the credential");
    } else {
        debug!(status = status.as_u16(), detail = %detail, "task service returned an error");
    }

    TaskError::from_status(status.as_u16(), detail)
}

/// Pulls the human-readable `detail` out of an error body. Validation errors
/// carry a list of `{loc, msg}` entries instead of a string.
fn extract_detail(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    match value.get("detail")? {
        Value::String(text) => Some(text.clone()),
        Value::Array(entries) => {
            let messages: Vec<String> = entries
                .iter()
                .filter_map(|entry| {
                    let msg = entry.get("msg")?.as_str()?;
                    let field = entry
                        .get("loc")
                        .and_then(Value::as_array)
                        .and_then(|loc| loc.last())
                        .and_then(Value::as_str);
                    Some(match field {
                        Some(field) => format!("{field}: {msg}"),
                        None => msg.to_string(),
                    })
                })
                .collect();
            (!messages.is_empty()).then(|| messages.join("; "))
        }
        other => Some(other.to_string()),
    }
}
