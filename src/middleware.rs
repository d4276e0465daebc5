/// Middleware chain: outermost request-context layer, then the rate-limit
/// decision layer wrapping the forwarder.
use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::net::SocketAddr;
use tracing::info;
use uuid::Uuid;

use crate::ratelimiter::RateLimiterStore;

const CLIENT_ID_HEADER: &str = "x-api-key";

/// Derives the client identifier: the `x-api-key` header if present,
/// else the remote peer address.
fn client_id(req: &Request<Body>, remote: SocketAddr) -> String {
    req.headers()
        .get(CLIENT_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| remote.to_string())
}

pub async fn request_context(
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let request_id = Uuid::new_v4().to_string();
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let start = Instant::now();

    info!(request_id = %request_id, %method, %path, remote = %remote, "request start");

    let response = next.run(req).await;

    let status = response.status().as_u16();
    let elapsed_ms = start.elapsed().as_millis();
    info!(
        request_id = %request_id,
        %method,
        %path,
        remote = %remote,
        status,
        elapsed_ms,
        "request done"
    );

    response
}

pub async fn rate_limit(
    State(store): State<Arc<RateLimiterStore>>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let id = client_id(&req, remote);
    let bucket = store.get_bucket(&id).await;

    if bucket.allow() {
        next.run(req).await
    } else {
        (
            StatusCode::TOO_MANY_REQUESTS,
            [("content-type", "application/json")],
            r#"{"code":429,"message":"rate limit exceeded"}"#,
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefers_the_api_key_header_over_remote_address() {
        let req = Request::builder()
            .header(CLIENT_ID_HEADER, "alice")
            .body(Body::empty())
            .unwrap();
        let remote: SocketAddr = "127.0.0.1:9999".parse().unwrap();
        assert_eq!(client_id(&req, remote), "alice");
    }

    #[test]
    fn falls_back_to_remote_address_when_header_absent() {
        let req = Request::builder().body(Body::empty()).unwrap();
        let remote: SocketAddr = "127.0.0.1:9999".parse().unwrap();
        assert_eq!(client_id(&req, remote), "127.0.0.1:9999");
    }
}
