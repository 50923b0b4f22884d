use leadcall_core::{LeadId, LeadService};
use serde::Deserialize;
use serde_json::{Value, json};
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

pub const MAX_BODY_BYTES: usize = 64 * 1024;

const MAX_HEAD_BYTES: usize = 16 * 1024;
const READ_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct HttpServerConfig {
    pub bind: SocketAddr,
}

#[derive(Debug, Error)]
pub enum HttpServeError {
    #[error("bind failed: {0}")]
    Bind(std::io::Error),
    #[error("accept failed: {0}")]
    Accept(std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct HttpResponse {
    status: u16,
    body: Option<Value>,
}

impl HttpResponse {
    fn json(status: u16, body: Value) -> Self {
        Self {
            status,
            body: Some(body),
        }
    }

    fn error(status: u16, message: impl Into<String>) -> Self {
        Self::json(status, json!({ "error": message.into() }))
    }

    fn no_content() -> Self {
        Self {
            status: 204,
            body: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct RequestHead {
    method: String,
    target: String,
    content_length: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Route {
    Preflight,
    Healthz,
    Submit,
    Lead(LeadId),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
enum RouteError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("method not allowed: {0}")]
    MethodNotAllowed(&'static str),
    #[error("payload too large")]
    PayloadTooLarge,
}

impl RouteError {
    fn into_response(self) -> HttpResponse {
        match self {
            Self::BadRequest(msg) => HttpResponse::error(400, msg),
            Self::NotFound(msg) => HttpResponse::error(404, msg),
            Self::MethodNotAllowed(allowed) => {
                HttpResponse::error(405, format!("method not allowed; use {allowed}"))
            }
            Self::PayloadTooLarge => HttpResponse::error(
                413,
                format!("request body exceeds {MAX_BODY_BYTES} bytes"),
            ),
        }
    }
}

/// Intake payload. Missing or null fields count as empty.
#[derive(Debug, Default, Deserialize)]
struct SubmitRequest {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    phone: Option<String>,
}

pub async fn bind(config: &HttpServerConfig) -> Result<TcpListener, HttpServeError> {
    TcpListener::bind(config.bind)
        .await
        .map_err(HttpServeError::Bind)
}

/// Accept connections until `shutdown` resolves. Each connection is served
/// on its own task and carries exactly one request.
pub async fn serve_intake<F>(
    listener: TcpListener,
    service: LeadService,
    shutdown: F,
) -> Result<(), HttpServeError>
where
    F: Future<Output = ()>,
{
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "intake endpoint listening");
    }
    tokio::pin!(shutdown);

    loop {
        let accepted = tokio::select! {
            _ = &mut shutdown => break,
            accepted = listener.accept() => accepted,
        };
        let (mut stream, peer) = accepted.map_err(HttpServeError::Accept)?;
        let service = service.clone();
        tokio::spawn(async move {
            if let Err(err) = handle_connection(&mut stream, &service).await {
                debug!(%peer, %err, "connection dropped");
            }
        });
    }

    info!("intake endpoint stopped");
    Ok(())
}

async fn handle_connection(stream: &mut TcpStream, service: &LeadService) -> std::io::Result<()> {
    let response = match tokio::time::timeout(READ_TIMEOUT, read_request(stream)).await {
        Ok(Ok((head, body))) => respond(service, &head, &body).await,
        Ok(Err(err)) => err.into_response(),
        Err(_) => HttpResponse::error(408, "timed out reading request"),
    };
    write_json_response(stream, response).await
}

async fn read_request(stream: &mut TcpStream) -> Result<(RequestHead, Vec<u8>), RouteError> {
    let mut buf = Vec::with_capacity(1024);
    let mut chunk = [0u8; 4096];

    let head_end = loop {
        if let Some(end) = find_head_end(&buf) {
            break end;
        }
        if buf.len() > MAX_HEAD_BYTES {
            return Err(RouteError::BadRequest("request head too large".to_string()));
        }
        let n = stream
            .read(&mut chunk)
            .await
            .map_err(|e| RouteError::BadRequest(format!("failed to read request: {e}")))?;
        if n == 0 {
            return Err(RouteError::BadRequest("incomplete request".to_string()));
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = parse_head(&String::from_utf8_lossy(&buf[..head_end]))?;
    if head.content_length > MAX_BODY_BYTES {
        return Err(RouteError::PayloadTooLarge);
    }

    let mut body = buf.split_off(head_end + 4);
    while body.len() < head.content_length {
        let n = stream
            .read(&mut chunk)
            .await
            .map_err(|e| RouteError::BadRequest(format!("failed to read body: {e}")))?;
        if n == 0 {
            return Err(RouteError::BadRequest("truncated body".to_string()));
        }
        body.extend_from_slice(&chunk[..n]);
    }
    body.truncate(head.content_length);
    Ok((head, body))
}

fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|window| window == b"\r\n\r\n")
}

fn parse_head(head: &str) -> Result<RequestHead, RouteError> {
    let mut lines = head.lines();
    let line = lines
        .next()
        .ok_or_else(|| RouteError::BadRequest("missing request line".to_string()))?;
    let (method, target) = parse_request_line(line)?;

    let mut content_length = 0usize;
    for header in lines {
        let Some((name, value)) = header.split_once(':') else {
            continue;
        };
        if name.trim().eq_ignore_ascii_case("content-length") {
            content_length = value
                .trim()
                .parse()
                .map_err(|_| RouteError::BadRequest("invalid content-length".to_string()))?;
        }
    }

    Ok(RequestHead {
        method,
        target,
        content_length,
    })
}

fn parse_request_line(line: &str) -> Result<(String, String), RouteError> {
    let mut parts = line.split_whitespace();
    let method = parts
        .next()
        .ok_or_else(|| RouteError::BadRequest("missing method".to_string()))?;
    let target = parts
        .next()
        .ok_or_else(|| RouteError::BadRequest("missing target".to_string()))?;
    Ok((method.to_string(), target.to_string()))
}

fn parse_route(method: &str, target: &str) -> Result<Route, RouteError> {
    let (path, query) = target.split_once('?').unwrap_or((target, ""));
    if method == "OPTIONS" {
        return Ok(Route::Preflight);
    }

    match path {
        "/healthz" => {
            expect_method(method, "GET")?;
            Ok(Route::Healthz)
        }
        "/submit" => {
            expect_method(method, "POST")?;
            Ok(Route::Submit)
        }
        "/lead" => {
            expect_method(method, "GET")?;
            let raw = query_param(query, "id").ok_or_else(|| {
                RouteError::BadRequest("missing lead id (use /lead?id=<lead_id>)".to_string())
            })?;
            let id = raw
                .parse()
                .map_err(|_| RouteError::BadRequest(format!("invalid lead id: {raw}")))?;
            Ok(Route::Lead(id))
        }
        _ => Err(RouteError::NotFound(format!("unknown route: {path}"))),
    }
}

fn expect_method(method: &str, allowed: &'static str) -> Result<(), RouteError> {
    if method == allowed {
        Ok(())
    } else {
        Err(RouteError::MethodNotAllowed(allowed))
    }
}

/// First value of `name` in a query string, form-decoded.
fn query_param(query: &str, name: &str) -> Option<String> {
    query
        .split('&')
        .map(|pair| pair.split_once('=').unwrap_or((pair, "")))
        .find(|(key, _)| decode_component(key) == name)
        .map(|(_, value)| decode_component(value))
}

/// Decode `+` and `%XX` escapes. A malformed escape is kept as written.
fn decode_component(input: &str) -> String {
    let mut out = Vec::with_capacity(input.len());
    let mut rest = input.as_bytes();
    while let Some((&first, tail)) = rest.split_first() {
        let escaped = (first == b'%')
            .then(|| tail.get(..2))
            .flatten()
            .filter(|hex| hex.iter().all(u8::is_ascii_hexdigit))
            .and_then(|hex| std::str::from_utf8(hex).ok())
            .and_then(|hex| u8::from_str_radix(hex, 16).ok());
        match (first, escaped) {
            (_, Some(byte)) => {
                out.push(byte);
                rest = &tail[2..];
            }
            (b'+', None) => {
                out.push(b' ');
                rest = tail;
            }
            (other, None) => {
                out.push(other);
                rest = tail;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

async fn respond(service: &LeadService, head: &RequestHead, body: &[u8]) -> HttpResponse {
    match parse_route(&head.method, &head.target) {
        Ok(route) => execute_route(service, route, body).await,
        Err(err) => err.into_response(),
    }
}

async fn execute_route(service: &LeadService, route: Route, body: &[u8]) -> HttpResponse {
    match route {
        Route::Preflight => HttpResponse::no_content(),
        Route::Healthz => HttpResponse::json(200, json!({ "ok": true })),
        Route::Lead(id) => match service.store().lead(id) {
            Some(lead) => match serde_json::to_value(&lead) {
                Ok(body) => HttpResponse::json(200, body),
                Err(err) => HttpResponse::error(500, err.to_string()),
            },
            None => HttpResponse::error(404, format!("lead not found: {id}")),
        },
        Route::Submit => {
            let request: SubmitRequest = match serde_json::from_slice(body) {
                Ok(request) => request,
                Err(err) => {
                    debug!(%err, "rejecting malformed intake payload");
                    return HttpResponse::error(400, format!("invalid json body: {err}"));
                }
            };
            let dispatched = service
                .dispatcher()
                .dispatch(
                    request.name.unwrap_or_default(),
                    request.phone.unwrap_or_default(),
                )
                .await;
            if !dispatched.report.is_complete() {
                warn!(
                    lead_id = dispatched.lead_id,
                    failed = dispatched.report.failed.len(),
                    "lead reached only some channels"
                );
            }
            HttpResponse::json(
                200,
                json!({
                    "status": "ok",
                    "lead_id": dispatched.lead_id,
                    "delivered": dispatched.report.delivered.len(),
                    "failed": dispatched.report.failed.len(),
                }),
            )
        }
    }
}

async fn write_json_response(stream: &mut TcpStream, response: HttpResponse) -> std::io::Result<()> {
    let body = match &response.body {
        Some(value) => serde_json::to_vec(value)?,
        None => Vec::new(),
    };
    let content_type = if response.body.is_some() {
        "Content-Type: application/json\r\n"
    } else {
        ""
    };
    let header = format!(
        "HTTP/1.1 {} {}\r\n{content_type}Content-Length: {}\r\nAccess-Control-Allow-Origin: *\r\nAccess-Control-Allow-Methods: GET, POST, OPTIONS\r\nAccess-Control-Allow-Headers: Content-Type\r\nConnection: close\r\n\r\n",
        response.status,
        reason_phrase(response.status),
        body.len()
    );
    stream.write_all(header.as_bytes()).await?;
    stream.write_all(&body).await?;
    stream.flush().await
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        204 => "No Content",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        408 => "Request Timeout",
        413 => "Payload Too Large",
        500 => "Internal Server Error",
        _ => "Unknown",
    }
}
