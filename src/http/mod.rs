use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

// the request handed to an HttpClient; proxy and certificate policy live on the client itself
#[derive(Clone, Debug)]
pub struct HttpRequest<'a> {
    pub url: &'a str,
    pub user_agent: &'a str,
    pub timeout: Duration,
}

// what a successful GET reports back once redirects have been followed
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body_length: u64,
    pub final_url: String,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("failed to read response body: {0}")]
    Body(String),

    #[error("request failed: {0}")]
    Request(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout
        } else if e.is_connect() {
            TransportError::Connect(e.to_string())
        } else if e.is_body() || e.is_decode() {
            TransportError::Body(e.to_string())
        } else {
            TransportError::Request(e.to_string())
        }
    }
}

/// Issues a single GET and follows redirects.
///
/// Implementations must not keep per-request state (headers, proxy) between
/// calls: one client is shared by every worker of a scan.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn get(&self, request: HttpRequest<'_>) -> Result<HttpResponse, TransportError>;
}

/// Suspends the caller; used for the retry cooldown.
#[async_trait]
pub trait Clock: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

#[derive(Clone, Copy, Debug, Default)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[derive(Clone, Debug)]
pub struct ReqwestHttpClient {
    client: reqwest::Client,
}

impl ReqwestHttpClient {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn get(&self, request: HttpRequest<'_>) -> Result<HttpResponse, TransportError> {
        let resp = self
            .client
            .get(request.url)
            .header(reqwest::header::USER_AGENT, request.user_agent)
            .timeout(request.timeout)
            .send()
            .await?;

        let status = resp.status().as_u16();
        let final_url = resp.url().to_string();
        let body = resp.bytes().await?;

        Ok(HttpResponse {
            status,
            body_length: body.len() as u64,
            final_url,
        })
    }
}
