use super::*;
use crate::{FetchedSource, RosterError, SourceFetcher, StorePhase};
use store::{InMemoryObjectStore, InMemoryTableStore};
use url::Url;

struct FeedFetcher(&'static str);

impl SourceFetcher for FeedFetcher {
    fn fetch(&self, _: &Url) -> Result<FetchedSource, RosterError> {
        Ok(FetchedSource::from_bytes(self.0))
    }
}

fn sample_service(feed: &'static str) -> RosterService {
    RosterService::new(
        Arc::new(InMemoryTableStore::new("prog4")),
        Arc::new(InMemoryObjectStore::new("input.txt")),
        Arc::new(FeedFetcher(feed)),
    )
}

fn request(method: &str, target: &str, body: &str) -> HttpRequest {
    let mut headers = HashMap::new();
    headers.insert("content-length".to_string(), body.len().to_string());
    HttpRequest {
        method: method.to_string(),
        target: target.to_string(),
        headers,
        body: body.as_bytes().to_vec(),
    }
}

fn envelope(response: &HttpResponse) -> crate::OperationResult {
    serde_json::from_str(&response.body).expect("response should be an envelope")
}

#[test]
fn load_form_then_query_by_last_name() {
    let service = sample_service("Doe John age=30\nSmith Jane\nBadLine\n");

    let response = handle_request(
        &service,
        &request(
            "POST",
            "/load",
            "url=http%3A%2F%2Ffeeds.example%2Fpeople.txt",
        ),
    );
    assert_eq!(response.status, 200);
    let loaded = envelope(&response);
    assert!(loaded.success, "{}", loaded.msg);
    assert!(loaded.msg.contains("memory://roster/input.txt"));

    let response = handle_request(&service, &request("GET", "/q?first=&last=Doe", ""));
    let result = envelope(&response);
    assert!(result.success);
    assert!(result.is_query);
    assert_eq!(result.query_res, vec!["Doe John age=30"]);
}

#[test]
fn query_route_maps_first_to_row_key() {
    let service = sample_service("Doe Jane\nSmith Jane\nSmith John\n");
    handle_request(
        &service,
        &request("POST", "/load", "url=http://feeds.example/people.txt"),
    );

    let result = envelope(&handle_request(
        &service,
        &request("GET", "/q?first=Jane&last=", ""),
    ));
    assert_eq!(result.query_res, vec!["Doe Jane", "Smith Jane"]);

    let result = envelope(&handle_request(
        &service,
        &request("GET", "/q?first=John&last=Smith", ""),
    ));
    assert_eq!(result.query_res, vec!["Smith John"]);
}

#[test]
fn query_without_names_reports_failure_in_envelope() {
    let service = sample_service("");
    let response = handle_request(&service, &request("GET", "/q?first=&last=", ""));
    assert_eq!(response.status, 200);
    let result = envelope(&response);
    assert!(!result.success);
    assert!(result.is_query);
    assert_eq!(result.msg, "first and/or last name must be provided");
}

#[test]
fn query_with_no_match_is_success() {
    let service = sample_service("");
    let result = envelope(&handle_request(
        &service,
        &request("GET", "/q?first=Nobody&last=", ""),
    ));
    assert!(result.success);
    assert_eq!(result.msg, "no match found");
    assert!(result.query_res.is_empty());
}

#[test]
fn load_form_validates_url_before_engine() {
    let service = sample_service("Doe John\n");
    service.clear();
    assert_eq!(service.phase(), StorePhase::Pristine);

    let result = envelope(&handle_request(&service, &request("POST", "/load", "")));
    assert_eq!(result.msg, "url cannot be empty");
    let result = envelope(&handle_request(
        &service,
        &request("POST", "/load", "url=not+a+url"),
    ));
    assert_eq!(result.msg, "url is invalid");
    assert!(!result.success);
    assert_eq!(service.phase(), StorePhase::Pristine);
}

#[test]
fn clear_route_is_idempotent() {
    let service = sample_service("Doe John\n");
    for _ in 0..2 {
        let result = envelope(&handle_request(&service, &request("POST", "/clear", "")));
        assert!(result.success);
        assert_eq!(result.msg, "cleared blob/table");
    }
}

#[test]
fn json_routes_map_failures_to_status_codes() {
    let service = sample_service("Doe John\n");

    let response = handle_request(&service, &request("GET", "/v1/query", ""));
    assert_eq!(response.status, 400);

    let mut load = request("POST", "/v1/load", r#"{"url":"http://feeds.example/a.txt"}"#);
    load.headers
        .insert("content-type".to_string(), "application/json".to_string());
    let response = handle_request(&service, &load);
    assert_eq!(response.status, 200);

    let response = handle_request(
        &service,
        &request("GET", "/v1/query?partition_key=Doe&row_key=John", ""),
    );
    assert_eq!(response.status, 200);
    assert_eq!(envelope(&response).query_res, vec!["Doe John"]);

    let mut bad = request("POST", "/v1/load", "url=x");
    bad.headers.insert(
        "content-type".to_string(),
        "application/x-www-form-urlencoded".to_string(),
    );
    assert_eq!(handle_request(&service, &bad).status, 400);
}

#[test]
fn json_load_over_limit_is_payload_too_large() {
    let service = sample_service("Doe John\nSmith Jane\n").with_size_limit(4);
    let response = handle_request(
        &service,
        &request("POST", "/v1/load", r#"{"url":"http://feeds.example/a.txt"}"#),
    );
    assert_eq!(response.status, 413);
    assert_eq!(envelope(&response).msg, "size limit exceeded");
}

#[test]
fn unknown_routes_and_methods_are_rejected() {
    let service = sample_service("");
    assert_eq!(
        handle_request(&service, &request("GET", "/missing", "")).status,
        404
    );
    assert_eq!(
        handle_request(&service, &request("GET", "/clear", "")).status,
        405
    );
}

#[test]
fn read_http_request_parses_headers_and_body() {
    let raw = b"POST /load HTTP/1.1\r\nHost: localhost\r\nContent-Length: 5\r\n\r\nurl=x";
    let request = read_http_request(&raw[..]).unwrap().unwrap();
    assert_eq!(request.method, "POST");
    assert_eq!(request.target, "/load");
    assert_eq!(request.headers.get("host").map(String::as_str), Some("localhost"));
    assert_eq!(request.body, b"url=x");

    assert!(read_http_request(&b""[..]).unwrap().is_none());
    assert!(read_http_request(&b"GET / HTTP/2\r\n\r\n"[..]).is_err());
}
