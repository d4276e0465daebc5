use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use rlb::backend::{Backend, BackendRegistry};
use rlb::forwarder::Forwarder;
use rlb::health::HealthSupervisor;
use rlb::ratelimiter::RateLimiterStore;
use rlb::selector::{build_selector, validate_algorithm};
use rlb::server::App;
use rlb::storage::postgres::PostgresRepository;
use rlb::storage::ClientRepository;
use rlb::{AppError, Config};
use tracing::info;

#[derive(Parser)]
struct Args {
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let _ = dotenvy::dotenv();
    rlb::logging::init();

    let args = Args::parse();
    let config = Config::load(&args.config)?;
    validate_algorithm(&config.algorithm)?;

    let repo: Arc<dyn ClientRepository> = Arc::new(PostgresRepository::connect(&config.db_dsn).await?);
    repo.init_schema().await?;

    let backends: Vec<Arc<Backend>> = config
        .backends
        .iter()
        .map(|b| {
            let url = b
                .url
                .parse()
                .unwrap_or_else(|_| panic!("invalid backend url: {}", b.url));
            Arc::new(Backend::new(b.name.clone(), url))
        })
        .collect();
    let registry = BackendRegistry::new(backends);

    let rate_limiter = RateLimiterStore::new(
        config.default_rate_limit.capacity,
        config.default_rate_limit.rate_per_sec,
        repo,
    )
    .await?;
    Arc::clone(&rate_limiter).start();

    let health = Arc::new(HealthSupervisor::new(
        registry.clone(),
        config.health_interval()?,
    ));
    let health_handle = Arc::clone(&health).spawn();

    let selector = build_selector(&config.algorithm, registry.backends().to_vec());
    let forwarder = Arc::new(Forwarder::new(selector));

    let app = App {
        listen_addr: config
            .listen_addr
            .parse()
            .map_err(|e| AppError::Config(format!("invalid listen_addr: {e}")))?,
        forwarder,
        rate_limiter: Arc::clone(&rate_limiter),
    };

    let result = app.run().await;

    info!("shutting down background loops");
    health.stop(health_handle).await;
    rate_limiter.stop();

    result
}
