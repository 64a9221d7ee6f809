//! Transport abstraction for the status protocol.
//!
//! The transport layer sends one HTTP request and returns the raw response.
//! Status codes are interpreted by [`LsdClient`](crate::LsdClient), so a
//! transport only fails when no response was received at all.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use url::Url;

use crate::error::TransportError;

/// HTTP method used by the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Put,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: Url,
    /// Overrides the transport's default timeout.
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::Get,
            url,
            timeout: None,
        }
    }

    pub fn put(url: Url) -> Self {
        Self {
            method: Method::Put,
            url,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            content_type: None,
            body: body.into(),
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body as text, for error reports.
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Transport settings.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Default timeout for a whole request.
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: concat!("lcp-rs/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Sends HTTP requests.
///
/// Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

#[async_trait]
impl<T: HttpTransport + ?Sized> HttpTransport for Arc<T> {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        (**self).execute(request).await
    }
}

/// Transport backed by a shared [`reqwest::Client`].
#[cfg(feature = "http")]
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

#[cfg(feature = "http")]
impl ReqwestTransport {
    pub fn new(config: &TransportConfig) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;
        Ok(Self { client })
    }

    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[cfg(feature = "http")]
fn map_reqwest_error(error: reqwest::Error) -> TransportError {
    if error.is_timeout() {
        TransportError::Timeout
    } else if error.is_builder() {
        TransportError::InvalidRequest(error.to_string())
    } else {
        TransportError::Connect(error.to_string())
    }
}

#[cfg(feature = "http")]
#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let mut builder = match request.method {
            Method::Get => self.client.get(request.url),
            Method::Put => self.client.put(request.url),
        };
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await.map_err(map_reqwest_error)?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await.map_err(map_reqwest_error)?;

        Ok(HttpResponse {
            status,
            content_type,
            body,
        })
    }
}

/// A scripted in-memory transport for testing.
///
/// Responses are queued per method and path. The last response queued for a
/// route is replayed once the queue is drained.
pub mod memory {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    type Scripted = Result<HttpResponse, TransportError>;

    struct Route {
        method: Method,
        path: String,
        responses: VecDeque<Scripted>,
    }

    #[derive(Default)]
    struct State {
        routes: Vec<Route>,
        requests: Vec<HttpRequest>,
    }

    /// In-memory transport implementation.
    #[derive(Default)]
    pub struct ScriptedTransport {
        state: Mutex<State>,
    }

    impl ScriptedTransport {
        pub fn new() -> Self {
            Self::default()
        }

        /// Queue a response for requests with `method` to `path`.
        pub fn respond(&self, method: Method, path: &str, response: HttpResponse) -> &Self {
            self.push(method, path, Ok(response))
        }

        /// Queue a transport failure for requests with `method` to `path`.
        pub fn fail(&self, method: Method, path: &str, error: TransportError) -> &Self {
            self.push(method, path, Err(error))
        }

        fn push(&self, method: Method, path: &str, scripted: Scripted) -> &Self {
            if let Ok(mut state) = self.state.lock() {
                let position = state
                    .routes
                    .iter()
                    .position(|r| r.method == method && r.path == path);
                match position {
                    Some(index) => state.routes[index].responses.push_back(scripted),
                    None => state.routes.push(Route {
                        method,
                        path: path.to_string(),
                        responses: VecDeque::from([scripted]),
                    }),
                }
            }
            self
        }

        /// Requests received so far, in order.
        pub fn requests(&self) -> Vec<HttpRequest> {
            self.state
                .lock()
                .map(|state| state.requests.clone())
                .unwrap_or_default()
        }

        /// Number of requests received for `method` and `path`.
        pub fn count(&self, method: Method, path: &str) -> usize {
            self.requests()
                .iter()
                .filter(|r| r.method == method && r.url.path() == path)
                .count()
        }
    }

    #[async_trait]
    impl HttpTransport for ScriptedTransport {
        async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
            let mut state = self
                .state
                .lock()
                .map_err(|e| TransportError::Connect(format!("transport poisoned: {e}")))?;
            state.requests.push(request.clone());

            let route = state
                .routes
                .iter_mut()
                .find(|r| r.method == request.method && r.path == request.url.path())
                .ok_or_else(|| {
                    TransportError::Connect(format!(
                        "no scripted response for {:?} {}",
                        request.method,
                        request.url.path()
                    ))
                })?;

            if route.responses.len() > 1 {
                route
                    .responses
                    .pop_front()
                    .ok_or_else(|| TransportError::Connect("empty script".into()))?
            } else {
                route
                    .responses
                    .front()
                    .cloned()
                    .ok_or_else(|| TransportError::Connect("empty script".into()))?
            }
        }
    }
}
