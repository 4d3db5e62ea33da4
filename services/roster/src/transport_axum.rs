use std::{collections::HashMap, sync::Arc};

use axum::{
    Router,
    body::{Body, to_bytes},
    extract::State,
    http::{Request, Response, StatusCode, header::CONTENT_TYPE},
    response::IntoResponse,
    routing::any,
};
use tracing::info;

use crate::{
    RosterService,
    transport::{HttpRequest, HttpResponse, SharedService, handle_request},
};

const MAX_HTTP_BODY_BYTES: usize = 64 * 1024;

#[derive(Clone)]
struct AppState {
    service: SharedService,
}

pub fn serve_http_with_axum(
    service: RosterService,
    bind_addr: &str,
    worker_threads: usize,
) -> Result<(), String> {
    let worker_threads = worker_threads.max(1);
    let tokio_runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(worker_threads)
        .enable_all()
        .build()
        .map_err(|e| format!("failed to build tokio runtime: {e}"))?;

    let bind_addr = bind_addr.to_string();
    tokio_runtime.block_on(async move {
        let listener = tokio::net::TcpListener::bind(&bind_addr)
            .await
            .map_err(|e| format!("failed to bind {bind_addr}: {e}"))?;
        info!(bind_addr = %bind_addr, worker_threads, "roster axum transport listening");

        let state = AppState {
            service: Arc::new(service),
        };

        let app = Router::new()
            .fallback(any(dispatch))
            .with_state(state)
            .layer(axum::extract::DefaultBodyLimit::max(MAX_HTTP_BODY_BYTES));

        axum::serve(listener, app)
            .await
            .map_err(|e| format!("axum server failed: {e}"))
    })
}

async fn dispatch(State(state): State<AppState>, request: Request<Body>) -> impl IntoResponse {
    let method = request.method().to_string();
    let target = request
        .uri()
        .path_and_query()
        .map(|value| value.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());

    let mut headers = HashMap::new();
    for (name, value) in request.headers() {
        if let Ok(value) = value.to_str() {
            headers.insert(name.as_str().to_ascii_lowercase(), value.to_string());
        }
    }

    let body = match to_bytes(request.into_body(), MAX_HTTP_BODY_BYTES).await {
        Ok(bytes) => bytes.to_vec(),
        Err(err) => {
            return response_from_transport(HttpResponse::bad_request(&format!(
                "request body error: {err}"
            )));
        }
    };

    let request = HttpRequest {
        method,
        target,
        headers,
        body,
    };

    // Loads block on the source fetch and the exclusive guard.
    let service = Arc::clone(&state.service);
    let response = tokio::task::spawn_blocking(move || handle_request(&service, &request))
        .await
        .unwrap_or_else(|err| {
            HttpResponse::error(500, &format!("request handler failed: {err}"))
        });
    response_from_transport(response)
}

fn response_from_transport(response: HttpResponse) -> Response<Body> {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut out = Response::new(Body::from(response.body));
    *out.status_mut() = status;
    out.headers_mut().insert(
        CONTENT_TYPE,
        response
            .content_type
            .parse()
            .unwrap_or(axum::http::HeaderValue::from_static("application/json")),
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FetchedSource, RosterError, SourceFetcher};
    use store::{InMemoryObjectStore, InMemoryTableStore};
    use url::Url;

    struct FeedFetcher;

    impl SourceFetcher for FeedFetcher {
        fn fetch(&self, _: &Url) -> Result<FetchedSource, RosterError> {
            Ok(FetchedSource::from_bytes("Doe John age=30\n"))
        }
    }

    fn sample_state() -> AppState {
        AppState {
            service: Arc::new(RosterService::new(
                Arc::new(InMemoryTableStore::new("prog4")),
                Arc::new(InMemoryObjectStore::new("input.txt")),
                Arc::new(FeedFetcher),
            )),
        }
    }

    async fn body_text(response: Response<Body>) -> String {
        let bytes = to_bytes(response.into_body(), MAX_HTTP_BODY_BYTES)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn dispatch_health_returns_ok_json() {
        let request = Request::builder()
            .method("GET")
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let response = dispatch(State(sample_state()), request)
            .await
            .into_response();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_text(response).await;
        assert!(body.contains("\"status\":\"ok\""));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn dispatch_load_then_query_returns_matches() {
        let state = sample_state();
        let load = Request::builder()
            .method("POST")
            .uri("/load")
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from("url=http%3A%2F%2Ffeeds.example%2Fpeople.txt"))
            .unwrap();
        let response = dispatch(State(state.clone()), load).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response).await.contains("\"success\":true"));

        let query = Request::builder()
            .method("GET")
            .uri("/q?first=John&last=Doe")
            .body(Body::empty())
            .unwrap();
        let response = dispatch(State(state), query).await.into_response();
        let body = body_text(response).await;
        assert!(body.contains("\"query_res\":[\"Doe John age=30\"]"));
    }
}
