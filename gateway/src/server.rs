//! HTTP transport.
//!
//! A blocking `tiny_http` accept loop hands every request to the tokio
//! runtime, so slow upstreams never hold up the next connection. Routing is a
//! plain async function over method, URL and body, which keeps it testable
//! without a socket.

use std::io::Read;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use mfe_engine::{
    Engine, ErrorExtensions, QueryRequest, QueryResponse, ResolveError, ResponseError,
};
use serde::Serialize;
use thiserror::Error;
use tokio::runtime::Handle;

pub const GRAPHQL_PATH: &str = "/graphql";
pub const HEALTH_PATH: &str = "/healthz";

/// Upper bound on an accepted request body.
const MAX_BODY_BYTES: u64 = 1024 * 1024;

#[derive(Debug, Error)]
pub enum ServeError {
    #[error("failed to bind {addr}: {message}")]
    Bind { addr: String, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status_code: u16,
    pub content_type: &'static str,
    pub body: Vec<u8>,
    pub allow: Option<&'static str>,
}

impl HttpResponse {
    fn json<T: Serialize>(status_code: u16, value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(body) => Self {
                status_code,
                content_type: "application/json",
                body,
                allow: None,
            },
            Err(err) => {
                tracing::error!(error = %err, "response serialization failed");
                Self::text(500, "internal error\n")
            }
        }
    }

    fn text(status_code: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status_code,
            content_type: "text/plain; charset=utf-8",
            body: body.into(),
            allow: None,
        }
    }

    fn method_not_allowed(allow: &'static str) -> Self {
        Self {
            allow: Some(allow),
            ..Self::text(405, "method not allowed\n")
        }
    }

    fn envelope_error(status_code: u16, code: &str, message: impl Into<String>) -> Self {
        let response = QueryResponse {
            data: serde_json::Value::Null,
            errors: vec![ResponseError {
                message: message.into(),
                extensions: ErrorExtensions { code: code.to_string() },
            }],
        };
        Self::json(status_code, &response)
    }
}

/// Answer one request.
pub async fn route(
    engine: &Engine,
    request_timeout: Duration,
    method: &tiny_http::Method,
    url: &str,
    body: &[u8],
) -> HttpResponse {
    let path = url.split_once('?').map_or(url, |(path, _)| path);
    match (path, method) {
        (HEALTH_PATH, tiny_http::Method::Get) => HttpResponse::text(200, "ok\n"),
        (HEALTH_PATH, _) => HttpResponse::method_not_allowed("GET"),
        (GRAPHQL_PATH, tiny_http::Method::Post) => graphql(engine, request_timeout, body).await,
        (GRAPHQL_PATH, _) => HttpResponse::method_not_allowed("POST"),
        _ => HttpResponse::text(404, "not found\n"),
    }
}

async fn graphql(engine: &Engine, request_timeout: Duration, body: &[u8]) -> HttpResponse {
    let request: QueryRequest = match serde_json::from_slice(body) {
        Ok(request) => request,
        Err(err) => {
            return HttpResponse::envelope_error(
                400,
                "BAD_REQUEST",
                format!("request body is not a query request: {err}"),
            );
        }
    };

    match tokio::time::timeout(request_timeout, engine.execute(&request)).await {
        Ok(Ok(data)) => HttpResponse::json(200, &QueryResponse::from_result(Ok(data))),
        Ok(Err(err @ ResolveError::Query(_))) => {
            HttpResponse::json(400, &QueryResponse::from_error(&err))
        }
        Ok(Err(err @ ResolveError::EntryResolution(_))) => {
            HttpResponse::json(200, &QueryResponse::from_error(&err))
        }
        Err(_) => {
            tracing::warn!(
                timeout_secs = request_timeout.as_secs(),
                "query abandoned after timeout"
            );
            HttpResponse::envelope_error(
                504,
                "TIMEOUT",
                format!("query did not finish within {}s", request_timeout.as_secs()),
            )
        }
    }
}

/// Unblocks a running [`GatewayServer::run`] from another thread.
#[derive(Clone)]
pub struct ShutdownHandle(Arc<tiny_http::Server>);

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.0.unblock();
    }
}

pub struct GatewayServer {
    http: Arc<tiny_http::Server>,
    engine: Engine,
    request_timeout: Duration,
}

impl GatewayServer {
    pub fn bind(addr: &str, engine: Engine, request_timeout: Duration) -> Result<Self, ServeError> {
        let http = tiny_http::Server::http(addr).map_err(|e| ServeError::Bind {
            addr: addr.to_string(),
            message: e.to_string(),
        })?;
        Ok(Self {
            http: Arc::new(http),
            engine,
            request_timeout,
        })
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.http.server_addr().to_ip()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle(Arc::clone(&self.http))
    }

    /// Accept requests until shut down. Blocks the calling thread; each
    /// request is answered on `runtime`.
    pub fn run(self, runtime: &Handle) {
        for mut req in self.http.incoming_requests() {
            let method = req.method().clone();
            let url = req.url().to_string();

            let mut body = Vec::new();
            if let Err(err) = req.as_reader().take(MAX_BODY_BYTES).read_to_end(&mut body) {
                tracing::debug!(error = %err, url = %url, "failed to read request body");
                respond(req, HttpResponse::text(400, "unreadable body\n"));
                continue;
            }

            let engine = self.engine.clone();
            let request_timeout = self.request_timeout;
            runtime.spawn(async move {
                let started = Instant::now();
                let response = route(&engine, request_timeout, &method, &url, &body).await;
                tracing::info!(
                    method = %method,
                    url = %url,
                    status = response.status_code,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "request served"
                );
                // Writing the response is blocking socket I/O.
                run_blocking(move || respond(req, response)).await;
            });
        }
        tracing::info!("gateway stopped accepting requests");
    }
}

/// Run `task` on the blocking pool. A panic or cancellation is logged and
/// reported as `false`; it never reaches the accept loop.
async fn run_blocking<F>(task: F) -> bool
where
    F: FnOnce() + Send + 'static,
{
    match tokio::task::spawn_blocking(task).await {
        Ok(()) => true,
        Err(err) => {
            tracing::warn!(error = %err, panicked = err.is_panic(), "response writer task failed");
            false
        }
    }
}

fn respond(req: tiny_http::Request, response: HttpResponse) {
    let mut tiny = tiny_http::Response::from_data(response.body).with_status_code(response.status_code);
    if let Ok(header) =
        tiny_http::Header::from_bytes(&b"Content-Type"[..], response.content_type.as_bytes())
    {
        tiny = tiny.with_header(header);
    }
    if let Some(allow) = response.allow
        && let Ok(header) = tiny_http::Header::from_bytes(&b"Allow"[..], allow.as_bytes())
    {
        tiny = tiny.with_header(header);
    }
    if let Err(err) = req.respond(tiny) {
        tracing::debug!(error = %err, "failed to write response");
    }
}
