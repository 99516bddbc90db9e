//! reqwest-backed transport and context host

use async_trait::async_trait;
use farm_common::GameSession;
use farm_engine::config::HttpConfig;
use farm_engine::{ContextHost, FarmError, FarmResult, HttpRequest, HttpResponse, Method, Transport};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Marker present on every in-game page once the session is accepted
const GAME_PAGE_MARKER: &str = "game_data";

/// Sends requests with the session's cookies and headers attached
pub struct ReqwestTransport {
    client: reqwest::Client,
    session_headers: HashMap<String, String>,
    timeout_ms: u64,
}

impl ReqwestTransport {
    pub fn new(config: &HttpConfig, session: &GameSession) -> FarmResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .connect_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .user_agent(config.user_agent.clone())
            .gzip(true)
            .deflate(true)
            .brotli(true)
            .build()
            .map_err(|e| FarmError::configuration("http", e.to_string()))?;

        Ok(Self {
            client,
            session_headers: session.get_http_headers(),
            timeout_ms: config.timeout_seconds * 1000,
        })
    }
}

fn map_error(error: reqwest::Error, url: &str, timeout_ms: u64) -> FarmError {
    if error.is_timeout() {
        FarmError::Timeout {
            operation: url.to_string(),
            duration_ms: timeout_ms,
        }
    } else {
        FarmError::network(error.to_string())
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: &HttpRequest) -> FarmResult<HttpResponse> {
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
        };
        let mut builder = self.client.request(method, &request.url);

        for (k, v) in self.session_headers.iter().chain(request.headers.iter()) {
            builder = builder.header(k.as_str(), v.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await.map_err(|e| map_error(e, &request.url, self.timeout_ms))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| Some((name.to_string(), value.to_str().ok()?.to_string())))
            .collect();
        let body = response.text().await.map_err(|e| map_error(e, &request.url, self.timeout_ms))?;

        debug!(url = %request.url, status, bytes = body.len(), "response received");

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

/// Opens a game screen over HTTP and treats it as ready once the page
/// proves the session is logged in
pub struct HttpContextHost {
    transport: Arc<dyn Transport + Send + Sync>,
}

impl HttpContextHost {
    pub fn new(transport: Arc<dyn Transport + Send + Sync>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl ContextHost for HttpContextHost {
    async fn open(&self, url: &str) -> FarmResult<()> {
        let response = self.transport.send(&HttpRequest::get(url)).await?;

        if !response.is_success() {
            return Err(FarmError::ContextFailed {
                url: url.to_string(),
                reason: format!("HTTP {}", response.status),
            });
        }
        if !response.body.contains(GAME_PAGE_MARKER) {
            return Err(FarmError::SessionInvalid {
                reason: format!("{} did not render a game page", url),
            });
        }

        info!(url, "context ready");
        Ok(())
    }
}
