use serde::Deserialize;
use tracing::debug;

use super::{
    HttpRequest, HttpResponse,
    http::status_for_error,
    request::{parse_form, split_target},
};
use crate::{OperationResult, RosterService};

#[derive(Debug, Deserialize)]
struct LoadBody {
    url: String,
}

pub fn handle_request(service: &RosterService, request: &HttpRequest) -> HttpResponse {
    let (path, query) = split_target(&request.target);
    match (request.method.as_str(), path.as_str()) {
        ("GET", "/health") => HttpResponse::ok_json("{\"status\":\"ok\"}".to_string()),
        ("GET", "/q") => {
            debug!("/q called");
            // `last` is the partition key, `first` the row key.
            let last = query.get("last").map(String::as_str).unwrap_or("");
            let first = query.get("first").map(String::as_str).unwrap_or("");
            HttpResponse::ok_json(service.query(last, first).to_json())
        }
        ("POST", "/load") => {
            debug!("/load called");
            let form = parse_form(&request.body);
            let raw_url = form
                .get("url")
                .or_else(|| query.get("url"))
                .map(String::as_str)
                .unwrap_or("");
            let result = if raw_url.is_empty() {
                rejected_load("url cannot be empty")
            } else if url::Url::parse(raw_url).is_err() {
                rejected_load("url is invalid")
            } else {
                service.load(raw_url)
            };
            HttpResponse::ok_json(result.to_json())
        }
        ("POST", "/clear") => {
            debug!("/clear called");
            HttpResponse::ok_json(service.clear().to_json())
        }
        ("GET", "/v1/query") => {
            let partition_key = query.get("partition_key").map(String::as_str).unwrap_or("");
            let row_key = query.get("row_key").map(String::as_str).unwrap_or("");
            envelope_response(service.query(partition_key, row_key))
        }
        ("POST", "/v1/load") => {
            if let Some(content_type) = request.headers.get("content-type")
                && !content_type
                    .to_ascii_lowercase()
                    .contains("application/json")
            {
                return HttpResponse::bad_request(
                    "content-type must include application/json for POST /v1/load",
                );
            }
            let body: LoadBody = match serde_json::from_slice(&request.body) {
                Ok(body) => body,
                Err(err) => return HttpResponse::bad_request(&format!("invalid JSON body: {err}")),
            };
            envelope_response(service.load(&body.url))
        }
        ("POST", "/v1/clear") => envelope_response(service.clear()),
        (_, "/health" | "/q" | "/load" | "/clear" | "/v1/query" | "/v1/load" | "/v1/clear") => {
            HttpResponse::method_not_allowed("method not allowed")
        }
        _ => HttpResponse::not_found("not found"),
    }
}

fn rejected_load(message: &str) -> OperationResult {
    OperationResult {
        msg: message.to_string(),
        ..OperationResult::default()
    }
}

fn envelope_response(result: OperationResult) -> HttpResponse {
    HttpResponse::json(status_for_error(result.error_kind), result.to_json())
}
