/// RPC client for the worker UI server
///
/// Every call resolves to `Result<ApiResult<T>, NetworkError>`: the outer error is a
/// transport failure, the inner result is whatever the worker answered.

use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::ClientConfig;
use crate::error::{ApiResult, NetworkError, ResponseError, ServerMessage, NO_WORKER_MESSAGE};
use crate::models::{WorkerConfig, WorkerState};

const STATE_PATH: &str = "/state";
const START_PATH: &str = "/start";
const CONNECT_PATH: &str = "/connect";
const SHUTDOWN_PATH: &str = "/shutdown";
const DISCONNECT_PATH: &str = "/disconnect";

#[derive(Debug, Clone)]
pub struct RpcClient {
    base: String,
    http: reqwest::Client,
}

impl RpcClient {
    /// `base` is the server address with no trailing path, e.g. `http://127.0.0.1:8000`
    pub fn new(base: impl Into<String>) -> Self {
        Self::with_http(base, reqwest::Client::new())
    }

    pub fn with_http(base: impl Into<String>, http: reqwest::Client) -> Self {
        let base: String = base.into();
        Self {
            base: base.trim_end_matches('/').to_string(),
            http,
        }
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self, NetworkError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.request_timeout)
            .build()?;
        Ok(Self::with_http(config.rpc_base(), http))
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub async fn get_state(&self) -> Result<ApiResult<WorkerState>, NetworkError> {
        self.request::<(), _>(Method::GET, STATE_PATH, None).await
    }

    /// Create a new worker
    pub async fn start(
        &self,
        config: &WorkerConfig,
    ) -> Result<ApiResult<WorkerState>, NetworkError> {
        self.request(Method::POST, START_PATH, Some(config)).await
    }

    /// Attach the worker to a manager
    pub async fn connect(
        &self,
        config: &WorkerConfig,
    ) -> Result<ApiResult<WorkerState>, NetworkError> {
        self.request(Method::POST, CONNECT_PATH, Some(config)).await
    }

    pub async fn shutdown(&self) -> Result<ApiResult<WorkerState>, NetworkError> {
        self.request::<(), _>(Method::POST, SHUTDOWN_PATH, None).await
    }

    pub async fn disconnect(&self) -> Result<ApiResult<WorkerState>, NetworkError> {
        self.request::<(), _>(Method::POST, DISCONNECT_PATH, None).await
    }

    async fn request<B, T>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<ApiResult<T>, NetworkError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base, path);
        let mut request = self.http.request(method.clone(), &url);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        tracing::debug!("{} {} -> {}", method, path, status);

        if status.is_success() {
            let body = response.bytes().await?;
            return Ok(decode_success(status, &body));
        }

        // Client errors carry structured JSON; server errors may be anything
        let server_message = if status.as_u16() < 500 {
            let body = response.bytes().await?;
            json_or_text(&body)
        } else {
            ServerMessage::Text(response.text().await?)
        };

        Ok(Err(ResponseError {
            message: status_text(status),
            code: status.as_u16(),
            server_message: Some(server_message),
        }))
    }
}

fn decode_success<T: DeserializeOwned>(status: StatusCode, body: &[u8]) -> ApiResult<T> {
    serde_json::from_slice(body).map_err(|e| {
        let mut err = ResponseError {
            message: format!("invalid response body: {}", e),
            code: status.as_u16(),
            server_message: Some(json_or_text(body)),
        };
        if err.is_no_worker() {
            err.message = NO_WORKER_MESSAGE.to_string();
        } else {
            tracing::warn!("Response body does not match the expected schema: {}", e);
        }
        err
    })
}

fn json_or_text(body: &[u8]) -> ServerMessage {
    match serde_json::from_slice(body) {
        Ok(value) => ServerMessage::Json(value),
        Err(_) => ServerMessage::Text(String::from_utf8_lossy(body).into_owned()),
    }
}

fn status_text(status: StatusCode) -> String {
    status.canonical_reason().unwrap_or("Unknown Status").to_string()
}
