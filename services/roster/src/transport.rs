use std::{
    collections::HashMap,
    net::{TcpListener, TcpStream},
    sync::{Arc, Mutex, mpsc},
    time::Duration,
};

use tracing::{error, info, warn};

use crate::RosterService;

mod http;
mod request;
mod routes;
mod server_runtime;
#[cfg(test)]
mod tests;

pub use http::{HttpRequest, HttpResponse};
pub use routes::handle_request;

use http::{render_response_text, write_backpressure_response, write_response};
use request::{parse_content_length, parse_header_line, parse_request_line, read_http_request};

pub type SharedService = Arc<RosterService>;
const MAX_HTTP_BODY_BYTES: usize = 64 * 1024;
const SOCKET_TIMEOUT_SECS: u64 = 5;
const DEFAULT_HTTP_WORKERS: usize = 4;
const HTTP_QUEUE_CAPACITY_PER_WORKER: usize = 64;

pub fn serve_http(service: RosterService, bind_addr: &str) -> std::io::Result<()> {
    serve_http_with_workers(service, bind_addr, DEFAULT_HTTP_WORKERS)
}

pub fn serve_http_with_workers(
    service: RosterService,
    bind_addr: &str,
    worker_count: usize,
) -> std::io::Result<()> {
    server_runtime::serve_http_with_workers(Arc::new(service), bind_addr, worker_count)
}

/// Run one raw HTTP/1.1 request through the router and return the raw
/// response bytes.
pub fn handle_http_request_bytes(
    service: &RosterService,
    raw_request: &[u8],
) -> Result<Vec<u8>, String> {
    let request_text =
        std::str::from_utf8(raw_request).map_err(|_| "request must be valid UTF-8".to_string())?;
    let (header_block, body) = request_text
        .split_once("\r\n\r\n")
        .ok_or_else(|| "missing HTTP header terminator".to_string())?;

    let mut lines = header_block.split("\r\n");
    let request_line = lines
        .next()
        .ok_or_else(|| "missing request line".to_string())?;
    let (method, target) = parse_request_line(request_line)?;

    let mut headers = HashMap::new();
    for line in lines {
        if line.trim().is_empty() {
            continue;
        }
        let (name, value) = parse_header_line(line)?;
        headers.insert(name, value);
    }

    let content_length = parse_content_length(&headers)?;
    if content_length != body.len() {
        return Err("content-length does not match body size".to_string());
    }

    let request = HttpRequest {
        method,
        target,
        headers,
        body: body.as_bytes().to_vec(),
    };
    let response = handle_request(service, &request);
    Ok(render_response_text(&response).into_bytes())
}

fn handle_connection(service: &RosterService, mut stream: TcpStream) -> std::io::Result<()> {
    stream.set_read_timeout(Some(Duration::from_secs(SOCKET_TIMEOUT_SECS)))?;
    stream.set_write_timeout(Some(Duration::from_secs(SOCKET_TIMEOUT_SECS)))?;

    let request = match read_http_request(&mut stream) {
        Ok(Some(request)) => request,
        Ok(None) => return Ok(()),
        Err(err) => return write_response(&mut stream, HttpResponse::bad_request(&err)),
    };

    let response = handle_request(service, &request);
    write_response(&mut stream, response)
}
