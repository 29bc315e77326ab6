pub mod handlers;
pub mod state;

use crate::{config::Config, error::Result, hls::PROXY_PATH, metrics};
use axum::{
    Router,
    http::{HeaderValue, Method},
    middleware,
    response::Response,
    routing::get,
};
use state::AppState;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info};

const VERSION_HEADER: &str = "x-relay-version";

/// Build the application router.
///
/// `/proxy` answers CORS itself, including preflight. The remaining routes
/// get a permissive `CorsLayer`.
pub async fn build_router(config: Config) -> Result<Router> {
    let state = AppState::new(config, metrics::install_recorder())?;

    let service_routes = Router::new()
        .route("/", get(handlers::health::health_check))
        .route("/health", get(handlers::health::health_check))
        .route("/metrics", get(handlers::metrics::serve_metrics))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::HEAD, Method::OPTIONS]),
        );

    let proxy_routes = Router::new().route(
        PROXY_PATH,
        get(handlers::proxy::serve_proxy).options(handlers::proxy::preflight),
    );

    Ok(service_routes
        .merge(proxy_routes)
        .layer(middleware::map_response(stamp_version))
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}

async fn stamp_version(mut response: Response) -> Response {
    response.headers_mut().insert(
        VERSION_HEADER,
        HeaderValue::from_static(env!("CARGO_PKG_VERSION")),
    );
    response
}

/// Start the Axum HTTP server
pub async fn start(config: Config) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let addr = format!("0.0.0.0:{}", config.port);

    let app = build_router(config).await?;

    // Bind TCP listener
    let listener = match tokio::net::TcpListener::bind(addr.as_str()).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to address {}: {}", addr, e);
            return Err(e.into());
        }
    };

    info!("🚀 Server listening on http://{}", addr);

    if let Err(e) = axum::serve(listener, app).await {
        error!("Server error: {}", e);
        return Err(e.into());
    }

    Ok(())
}
