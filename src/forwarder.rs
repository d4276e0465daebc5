/// Reverse-proxy forwarding engine: selects a backend, streams the request
/// through to it, and retries on transport-level failure.
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use tracing::{info, warn};

use crate::backend::{track_conn, Backend};
use crate::selector::Selector;

const MAX_ATTEMPTS: usize = 10;

pub struct Forwarder {
    client: reqwest::Client,
    selector: Box<dyn Selector>,
}

impl Forwarder {
    pub fn new(selector: Box<dyn Selector>) -> Forwarder {
        Forwarder {
            client: reqwest::Client::new(),
            selector,
        }
    }

    /// Forwards `req` to a live backend, retrying on transport failure up to
    /// `MAX_ATTEMPTS` times. Once a backend response has started streaming,
    /// the attempt is final regardless of its status code.
    pub async fn forward(&self, req: Request<Body>) -> Response<Body> {
        let (parts, body) = req.into_parts();
        let body_bytes = match axum::body::to_bytes(body, usize::MAX).await {
            Ok(b) => b,
            Err(e) => {
                warn!(error = %e, "failed to buffer request body");
                return plain_response(StatusCode::BAD_GATEWAY, "all backends failed");
            }
        };

        for attempt in 1..=MAX_ATTEMPTS {
            let Some(backend) = self.selector.next() else {
                return plain_response(StatusCode::SERVICE_UNAVAILABLE, "no backend available");
            };

            let guard = track_conn(&backend);
            match self
                .send_to(&backend, &parts, body_bytes.clone())
                .await
            {
                Ok(resp) => {
                    drop(guard);
                    return resp;
                }
                Err(e) => {
                    backend.set_alive(false);
                    warn!(
                        backend = %backend.name,
                        attempt,
                        error = %e,
                        "backend unreachable, marking down and retrying"
                    );
                    drop(guard);
                    continue;
                }
            }
        }

        warn!(attempts = MAX_ATTEMPTS, "all backends failed");
        plain_response(StatusCode::BAD_GATEWAY, "all backends failed")
    }

    /// Single forwarding attempt. Any `Err` here means no byte of a response
    /// reached the client yet, so the caller is free to retry.
    async fn send_to(
        &self,
        backend: &Arc<Backend>,
        parts: &axum::http::request::Parts,
        body: axum::body::Bytes,
    ) -> Result<Response<Body>, reqwest::Error> {
        let url = backend
            .url
            .join(parts.uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/"))
            .unwrap_or_else(|_| backend.url.clone());

        let mut req = self.client.request(parts.method.clone(), url).body(body);
        for (name, value) in parts.headers.iter() {
            if name == axum::http::header::HOST {
                continue;
            }
            req = req.header(name, value);
        }
        // Host is rewritten to the backend's own host (reqwest does this from
        // the request URL); the inbound Host is preserved for the backend to
        // see under X-Forwarded-Host.
        if let Some(inbound_host) = parts.headers.get(axum::http::header::HOST) {
            req = req.header("x-forwarded-host", inbound_host);
        }

        let upstream = req.send().await?;
        let status = StatusCode::from_u16(upstream.status().as_u16())
            .unwrap_or(StatusCode::BAD_GATEWAY);
        let headers = upstream.headers().clone();
        let stream = upstream.bytes_stream();

        info!(backend = %backend.name, status = status.as_u16(), "forwarded");

        let mut builder = Response::builder().status(status);
        for (name, value) in headers.iter() {
            builder = builder.header(name, value);
        }
        Ok(builder.body(Body::from_stream(stream)).unwrap())
    }
}

fn plain_response(status: StatusCode, body: &'static str) -> Response<Body> {
    Response::builder()
        .status(status)
        .body(Body::from(body))
        .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendRegistry;
    use crate::selector::build_selector;
    use axum::http::Method;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn req(path: &str) -> Request<Body> {
        Request::builder()
            .method(Method::GET)
            .uri(path)
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn forwards_to_the_only_live_backend() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let registry = BackendRegistry::new(vec![Arc::new(Backend::new(
            "b1".to_string(),
            server.uri().parse().unwrap(),
        ))]);
        let selector = build_selector("round_robin", registry.backends().to_vec());
        let forwarder = Forwarder::new(selector);

        let resp = forwarder.forward(req("/")).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn no_live_backend_returns_503() {
        let backend = Arc::new(Backend::new("b1".to_string(), "http://127.0.0.1:1".parse().unwrap()));
        backend.set_alive(false);
        let registry = BackendRegistry::new(vec![backend]);
        let selector = build_selector("round_robin", registry.backends().to_vec());
        let forwarder = Forwarder::new(selector);

        let resp = forwarder.forward(req("/")).await;
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn unreachable_backend_marks_down_and_falls_back() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let dead = Arc::new(Backend::new(
            "dead".to_string(),
            "http://127.0.0.1:1".parse().unwrap(),
        ));
        let live = Arc::new(Backend::new("live".to_string(), server.uri().parse().unwrap()));
        let registry = BackendRegistry::new(vec![dead.clone(), live]);
        let selector = build_selector("round_robin", registry.backends().to_vec());
        let forwarder = Forwarder::new(selector);

        let resp = forwarder.forward(req("/")).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(!dead.is_alive());
    }

    #[tokio::test]
    async fn all_backends_unreachable_returns_502() {
        let dead1 = Arc::new(Backend::new("d1".to_string(), "http://127.0.0.1:1".parse().unwrap()));
        let dead2 = Arc::new(Backend::new("d2".to_string(), "http://127.0.0.1:2".parse().unwrap()));
        let registry = BackendRegistry::new(vec![dead1, dead2]);
        let selector = build_selector("round_robin", registry.backends().to_vec());
        let forwarder = Forwarder::new(selector);

        let resp = forwarder.forward(req("/")).await;
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    }
}
