//! NIIBot API Gateway
//!
//! The main entry point for all external API requests.
//! Handles:
//! - Startup wiring (registry, collections, embedder, generator)
//! - Rate limiting
//! - Request routing into the query pipeline
//! - Observability (logging, metrics, tracing)

mod handlers;
mod middleware;

use anyhow::Context;
use axum::{
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use niibot_common::{
    collections::CollectionCatalog,
    config::AppConfig,
    context::{create_generator, EntityRegistry, Generator},
    embeddings::create_embedder,
    metrics,
};
use niibot_context::QueryPipeline;
use niibot_search::{CollectionRetriever, RetrieverSettings};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower::limit::GlobalConcurrencyLimitLayer;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub pipeline: Arc<QueryPipeline>,
    pub retriever: Arc<CollectionRetriever>,
    pub registry_entities: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = AppConfig::load().context("failed to load configuration")?;
    init_tracing(&config);
    config.validate()?;

    info!("Starting NIIBot API Gateway v{}", niibot_common::VERSION);

    let config = Arc::new(config);

    // Initialize metrics
    if config.observability.metrics_port > 0 {
        let addr = SocketAddr::from(([0, 0, 0, 0], config.observability.metrics_port));
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("failed to install Prometheus exporter")?;
        info!("Metrics exporter listening on {}", addr);
    }
    metrics::register_metrics();

    // The registry is the one input the service cannot run without
    let registry = Arc::new(EntityRegistry::load(&config.data.registry_path)?);

    let embedder = create_embedder(&config.embedding)?;
    let catalog = CollectionCatalog::load_dir(
        &config.data.collections_dir,
        embedder.clone(),
        config.embedding.batch_size,
    )
    .await;
    info!(collections = catalog.len(), dir = %config.data.collections_dir, "Collections loaded");

    let retriever = Arc::new(CollectionRetriever::new(
        catalog,
        embedder,
        RetrieverSettings::from_config(&config.retrieval, &config.embedding),
    ));
    let generator = create_generator(&config.generation)?;
    info!(model = generator.model_name(), "Answer generator ready");

    let registry_entities = registry.len();
    let pipeline = Arc::new(QueryPipeline::new(&config, registry, retriever.clone(), generator));

    // Create app state
    let state = AppState {
        config: config.clone(),
        pipeline,
        retriever,
        registry_entities,
    };

    // Build the router
    let app = create_router(state)?;

    // Start the server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("invalid server.host / server.port")?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.observability.log_level));

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    if config.observability.json_logging {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Create the main application router
fn create_router(state: AppState) -> niibot_common::Result<Router> {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    // API routes
    let mut api_routes = Router::new()
        .route("/query", post(handlers::query::query))
        .route("/cache/stats", get(handlers::cache::stats))
        .route(
            "/sessions/{id}",
            get(handlers::sessions::get_session).delete(handlers::sessions::delete_session),
        );

    let rate_limit = &state.config.rate_limit;
    if rate_limit.enabled {
        let limiter = middleware::rate_limit::create_rate_limiter(rate_limit.requests_per_second, rate_limit.burst)?;
        api_routes = api_routes.layer(axum::middleware::from_fn_with_state(
            limiter,
            middleware::rate_limit::rate_limit_middleware,
        ));
    }

    // Compose the app
    Ok(Router::new()
        // Health endpoints (never rate limited)
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))
        .nest("/v1", api_routes)
        .layer(TimeoutLayer::new(state.config.request_timeout()))
        .layer(GlobalConcurrencyLimitLayer::new(state.config.server.max_concurrent_requests))
        .layer(axum::middleware::from_fn(middleware::metrics::track_requests))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(propagate_id)
        .layer(request_id)
        .with_state(state))
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}
