//! Outbound HTTP transport used by the failover router.

use async_trait::async_trait;
use http::header::CONTENT_TYPE;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::types::{ProxyRequest, ProxyResponse};

/// Why a single endpoint attempt failed.
///
/// These never reach the caller directly; the router records them as
/// endpoint failures and moves on to the next candidate.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection, TLS or protocol failure. The URL is stripped.
    #[error("request failed: {0}")]
    Http(#[source] reqwest::Error),

    /// A client middleware rejected or failed the request.
    #[error("middleware error: {0}")]
    Middleware(String),

    #[error("upstream returned status {0}")]
    Status(u16),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("failed to encode request body: {0}")]
    Encode(#[from] serde_json::Error),
}

impl From<reqwest_middleware::Error> for TransportError {
    fn from(err: reqwest_middleware::Error) -> Self {
        match err {
            reqwest_middleware::Error::Reqwest(err) => Self::from(err),
            other => Self::Middleware(other.to_string()),
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        Self::Http(err.without_url())
    }
}

/// Sends one request to one endpoint.
///
/// Implementations should not retry; retries across endpoints belong to the
/// router. Non-success statuses must be reported as errors.
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    async fn send(
        &self,
        endpoint: &str,
        request: &ProxyRequest,
    ) -> Result<ProxyResponse, TransportError>;
}

/// [`Transport`] backed by a reqwest client with middleware.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: ClientWithMiddleware,
}

impl HttpTransport {
    #[must_use]
    pub fn new(client: ClientWithMiddleware) -> Self {
        Self { client }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new(ClientBuilder::new(reqwest::Client::new()).build())
    }
}

impl From<reqwest::Client> for HttpTransport {
    fn from(client: reqwest::Client) -> Self {
        Self::new(ClientBuilder::new(client).build())
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(
        &self,
        endpoint: &str,
        request: &ProxyRequest,
    ) -> Result<ProxyResponse, TransportError> {
        let mut builder = self
            .client
            .request(request.method.clone(), request.url_for(endpoint));
        if let Some(body) = &request.body {
            builder = builder
                .header(CONTENT_TYPE, "application/json")
                .body(serde_json::to_vec(body)?);
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }

        let body = response.bytes().await?;
        Ok(ProxyResponse {
            status: status.as_u16(),
            body: body.to_vec(),
        })
    }
}
