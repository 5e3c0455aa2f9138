// HTTP collaborator: request/response types and the reqwest-backed client

use crate::error::{ApiError, ApiResult};
use async_trait::async_trait;
use http::{Method, StatusCode};
use serde::de::DeserializeOwned;
use std::fmt;
use tracing::debug;

/// Request body variants the backend accepts
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Empty,
    Json(serde_json::Value),
    Form(Vec<(String, String)>),
}

/// A single call against the backend, relative to the configured base URL
#[derive(Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub bearer: Option<String>,
    pub body: RequestBody,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            bearer: None,
            body: RequestBody::Empty,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Attach a JSON body; serialization failures surface as `Decode`
    pub fn json<T: serde::Serialize>(mut self, body: &T) -> ApiResult<Self> {
        let value = serde_json::to_value(body).map_err(|e| ApiError::Decode(e.to_string()))?;
        self.body = RequestBody::Json(value);
        Ok(self)
    }

    pub fn form(mut self, pairs: &[(&str, &str)]) -> Self {
        self.body = RequestBody::Form(pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect());
        self
    }

    pub fn query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    pub fn bearer(mut self, token: &str) -> Self {
        self.bearer = Some(token.to_string());
        self
    }
}

impl fmt::Debug for ApiRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Form bodies carry passwords and bearer carries the token
        let body = match &self.body {
            RequestBody::Empty => "empty",
            RequestBody::Json(_) => "json",
            RequestBody::Form(_) => "form",
        };
        f.debug_struct("ApiRequest")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("query", &self.query)
            .field("authorized", &self.bearer.is_some())
            .field("body", &body)
            .finish()
    }
}

/// Raw reply; any status code is a response, not an error
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub body: Vec<u8>,
}

impl ApiResponse {
    pub fn new(status: StatusCode, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Map non-2xx replies to `ApiError::Status`
    pub fn into_result(self) -> ApiResult<Self> {
        if self.status.is_success() {
            Ok(self)
        } else {
            Err(ApiError::from_status(self.status, &self.body))
        }
    }

    pub fn json<T: DeserializeOwned>(&self) -> ApiResult<T> {
        serde_json::from_slice(&self.body).map_err(|e| ApiError::Decode(e.to_string()))
    }
}

/// Transport capability the core is built on
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Perform the request; only transport failures are errors
    async fn send(&self, request: &ApiRequest) -> ApiResult<ApiResponse>;
}

/// Production client over reqwest
pub struct ReqwestClient {
    client: reqwest::Client,
    api_base: String,
}

impl ReqwestClient {
    pub fn new(api_base: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: api_base.into(),
        }
    }

    pub fn with_client(client: reqwest::Client, api_base: impl Into<String>) -> Self {
        Self {
            client,
            api_base: api_base.into(),
        }
    }

    /// `api_base + path`, so a base path prefix like `/api` survives
    pub fn url_for(&self, request: &ApiRequest) -> ApiResult<url::Url> {
        let raw = format!(
            "{}/{}",
            self.api_base.trim_end_matches('/'),
            request.path.trim_start_matches('/')
        );
        let mut url = url::Url::parse(&raw).map_err(|e| ApiError::Transport(format!("invalid url {}: {}", raw, e)))?;
        if !request.query.is_empty() {
            url.query_pairs_mut().extend_pairs(request.query.iter());
        }
        Ok(url)
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn send(&self, request: &ApiRequest) -> ApiResult<ApiResponse> {
        let url = self.url_for(request)?;
        debug!(method = %request.method, %url, "send: dispatching request");

        let mut builder = self.client.request(request.method.clone(), url);
        if let Some(token) = &request.bearer {
            builder = builder.bearer_auth(token);
        }
        builder = match &request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(value),
            RequestBody::Form(pairs) => builder.form(pairs),
        };

        let response = builder.send().await.map_err(|e| ApiError::Transport(e.to_string()))?;
        let status = response.status();
        let body = response.bytes().await.map_err(|e| ApiError::Transport(e.to_string()))?;

        debug!(status = status.as_u16(), len = body.len(), "send: response received");
        Ok(ApiResponse::new(status, body.to_vec()))
    }
}
