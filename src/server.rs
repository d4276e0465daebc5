/// Assembles the data-path and admin routers and serves them with graceful
/// shutdown.
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::Request;
use axum::routing::any;
use axum::{middleware as axum_middleware, Router};
use tokio::net::TcpListener;
use tokio::signal;
use tracing::info;

use crate::error::AppError;
use crate::forwarder::Forwarder;
use crate::middleware::{rate_limit, request_context};
use crate::ratelimiter::RateLimiterStore;

pub struct App {
    pub listen_addr: SocketAddr,
    pub forwarder: Arc<Forwarder>,
    pub rate_limiter: Arc<RateLimiterStore>,
}

impl App {
    /// Binds the listen address and serves the combined router until a
    /// shutdown signal arrives.
    pub async fn run(self) -> Result<(), AppError> {
        let listener = TcpListener::bind(self.listen_addr)
            .await
            .map_err(AppError::Bind)?;
        info!(addr = %self.listen_addr, "listening");

        let router = self.router();
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(AppError::Bind)?;

        Ok(())
    }

    fn router(&self) -> Router {
        let data_path = Router::new()
            .route("/", any(forward))
            .route("/*path", any(forward))
            .with_state(Arc::clone(&self.forwarder))
            .layer(axum_middleware::from_fn_with_state(
                Arc::clone(&self.rate_limiter),
                rate_limit,
            ));

        let admin = crate::admin::router(Arc::clone(&self.rate_limiter));

        Router::new()
            .merge(admin)
            .merge(data_path)
            .layer(axum_middleware::from_fn(request_context))
    }
}

async fn forward(
    State(forwarder): State<Arc<Forwarder>>,
    req: Request<axum::body::Body>,
) -> axum::response::Response {
    forwarder.forward(req).await
}

/// Waits for Ctrl-C or, on unix, SIGTERM, whichever arrives first.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("shutdown signal received");
}
