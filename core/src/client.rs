//! HTTP accessor bound to a fixed base URL.
//!
//! # Design
//! `RemoteClient` holds only a `base_url` and a transport and carries no
//! mutable state between calls. Each verb is split into a pure `build_*`
//! method that produces an `HttpRequest`, the transport round-trip, and a
//! pure `parse` that decodes the response. The async verbs (`get`, `post`,
//! `put`, `delete`) chain the three.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::ApiError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::transport::Transport;

const JSON_HEADER: (&str, &str) = ("content-type", "application/json");

#[derive(Debug, Clone)]
pub struct RemoteClient<T> {
    base_url: String,
    transport: T,
}

impl<T> RemoteClient<T> {
    pub fn new(base_url: &str, transport: T) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            transport,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn build_get(&self, path: &str, query: &[(&str, String)]) -> HttpRequest {
        HttpRequest {
            method: HttpMethod::Get,
            path: self.url(path),
            query: query
                .iter()
                .map(|(key, value)| (key.to_string(), value.clone()))
                .collect(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn build_post<B: Serialize>(&self, path: &str, body: &B) -> Result<HttpRequest, ApiError> {
        self.build_with_body(HttpMethod::Post, path, body)
    }

    pub fn build_put<B: Serialize>(&self, path: &str, body: &B) -> Result<HttpRequest, ApiError> {
        self.build_with_body(HttpMethod::Put, path, body)
    }

    pub fn build_delete(&self, path: &str) -> HttpRequest {
        HttpRequest {
            method: HttpMethod::Delete,
            path: self.url(path),
            query: Vec::new(),
            headers: Vec::new(),
            body: None,
        }
    }

    /// Decode a response body, mapping non-2xx statuses to errors.
    ///
    /// An empty body decodes as JSON `null`, so acknowledgements without a
    /// payload can be read into `()`, `Option<_>` or `IgnoredAny`.
    pub fn parse<R: DeserializeOwned>(&self, response: HttpResponse) -> Result<R, ApiError> {
        check_status(&response)?;
        let body = match response.body.trim() {
            "" => "null",
            body => body,
        };
        serde_json::from_str(body).map_err(|e| ApiError::Deserialization(e.to_string()))
    }

    fn build_with_body<B: Serialize>(
        &self,
        method: HttpMethod,
        path: &str,
        body: &B,
    ) -> Result<HttpRequest, ApiError> {
        let body = serde_json::to_string(body).map_err(|e| ApiError::Serialization(e.to_string()))?;
        Ok(HttpRequest {
            method,
            path: self.url(path),
            query: Vec::new(),
            headers: vec![(JSON_HEADER.0.to_string(), JSON_HEADER.1.to_string())],
            body: Some(body),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

impl<T: Transport> RemoteClient<T> {
    pub async fn get<R: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<R, ApiError> {
        let request = self.build_get(path, query);
        self.send(request).await
    }

    pub async fn post<B: Serialize, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R, ApiError> {
        let request = self.build_post(path, body)?;
        self.send(request).await
    }

    pub async fn put<B: Serialize, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R, ApiError> {
        let request = self.build_put(path, body)?;
        self.send(request).await
    }

    pub async fn delete<R: DeserializeOwned>(&self, path: &str) -> Result<R, ApiError> {
        let request = self.build_delete(path);
        self.send(request).await
    }

    async fn send<R: DeserializeOwned>(&self, request: HttpRequest) -> Result<R, ApiError> {
        tracing::debug!(method = %request.method, path = %request.path, "sending request");
        let response = self.transport.execute(request).await?;
        tracing::debug!(status = response.status, "received response");
        self.parse(response)
    }
}

/// Map non-success status codes to the appropriate `ApiError` variant.
fn check_status(response: &HttpResponse) -> Result<(), ApiError> {
    if response.is_success() {
        return Ok(());
    }
    if response.status == 404 {
        return Err(ApiError::NotFound);
    }
    Err(ApiError::Http {
        status: response.status,
        body: response.body.clone(),
    })
}
