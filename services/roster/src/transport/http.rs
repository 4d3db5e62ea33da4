use std::{collections::HashMap, io::Write, net::TcpStream, time::Duration};

const BACKPRESSURE_QUEUE_FULL_MESSAGE: &str = "service unavailable: roster worker queue full";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: String,
    pub target: String,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub content_type: &'static str,
    pub body: String,
}

impl HttpResponse {
    pub(crate) fn ok_json(body: String) -> Self {
        Self::json(200, body)
    }

    pub(crate) fn json(status: u16, body: String) -> Self {
        Self {
            status,
            content_type: "application/json",
            body,
        }
    }

    pub(crate) fn error(status: u16, message: &str) -> Self {
        Self::json(status, serde_json::json!({ "error": message }).to_string())
    }

    pub(crate) fn bad_request(message: &str) -> Self {
        Self::error(400, message)
    }

    pub(crate) fn not_found(message: &str) -> Self {
        Self::error(404, message)
    }

    pub(crate) fn method_not_allowed(message: &str) -> Self {
        Self::error(405, message)
    }

    pub(crate) fn service_unavailable(message: &str) -> Self {
        Self::error(503, message)
    }
}

/// HTTP status for a failed operation on the JSON routes.
pub(crate) fn status_for_error(kind: Option<&str>) -> u16 {
    match kind {
        None => 200,
        Some("invalid_input") => 400,
        Some("size_limit_exceeded") => 413,
        Some("source_unavailable") | Some("archival_failed") => 502,
        Some("backend_unavailable") => 503,
        Some(_) => 500,
    }
}

pub(crate) fn write_backpressure_response(
    mut stream: TcpStream,
    socket_timeout_secs: u64,
) -> std::io::Result<()> {
    stream.set_write_timeout(Some(Duration::from_secs(socket_timeout_secs)))?;
    let response = HttpResponse::service_unavailable(BACKPRESSURE_QUEUE_FULL_MESSAGE);
    stream.write_all(render_response_text(&response).as_bytes())?;
    stream.flush()
}

pub(crate) fn write_response(
    stream: &mut TcpStream,
    response: HttpResponse,
) -> std::io::Result<()> {
    stream.write_all(render_response_text(&response).as_bytes())?;
    stream.flush()
}

pub(crate) fn render_response_text(response: &HttpResponse) -> String {
    let status_text = match response.status {
        200 => "200 OK",
        400 => "400 Bad Request",
        404 => "404 Not Found",
        405 => "405 Method Not Allowed",
        413 => "413 Payload Too Large",
        502 => "502 Bad Gateway",
        503 => "503 Service Unavailable",
        _ => "500 Internal Server Error",
    };
    let body_len = response.body.len();
    format!(
        "HTTP/1.1 {status_text}\r\nContent-Type: {}\r\nContent-Length: {body_len}\r\nConnection: close\r\n\r\n{}",
        response.content_type, response.body
    )
}
