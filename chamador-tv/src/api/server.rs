//! HTTP server setup and routing

use crate::context::TvContext;
use crate::error::{Error, Result};
use crate::speech::PageSpeech;
use axum::{
    routing::{delete, get, post},
    Router,
};
use chamador_common::db::CallStore;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared application context passed to all handlers
#[derive(Clone)]
pub struct AppContext {
    pub store: CallStore,
    pub tv: Arc<TvContext>,
    /// Page-side speech bridge (SSE pages register here)
    pub page_speech: Arc<PageSpeech>,
}

/// Build the router with every route attached
pub fn create_router(ctx: AppContext) -> Router {
    let tv_page = include_str!("tv_page.html");

    Router::new()
        // TV page
        .route("/", get(move || async move { axum::response::Html(tv_page) }))

        // Health endpoint
        .route("/health", get(super::handlers::health))

        // Calls (admin side)
        .route("/api/calls", post(super::handlers::call_now))
        .route("/api/calls", get(super::handlers::list_calls))
        .route("/api/calls/recall-last", post(super::handlers::recall_last))
        .route("/api/calls/clear", post(super::handlers::clear_calls))

        // Room slots
        .route("/api/rooms", get(super::handlers::list_rooms))
        .route("/api/rooms/:room/recall", post(super::handlers::recall_room))
        .route("/api/rooms/:room", delete(super::handlers::attend_room))

        // Sound check
        .route("/api/announce/test", post(super::handlers::announce_test))

        // Operating configuration
        .route(
            "/api/config",
            get(super::handlers::get_config).put(super::handlers::put_config),
        )

        // Display state and live events
        .route("/api/display", get(super::handlers::get_display))
        .route("/api/events", get(super::sse::event_stream))

        // Page speech completion
        .route(
            "/api/speech/:utterance_id/done",
            post(super::handlers::speech_done),
        )

        .with_state(ctx)
        .layer(TraceLayer::new_for_http())
        // Admin panel and TV page may be served from elsewhere on the LAN
        .layer(CorsLayer::permissive())
}

/// Serve the API until `shutdown` resolves
pub async fn run(
    ctx: AppContext,
    port: u16,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let app = create_router(ctx);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Http(format!("Failed to bind to {}: {}", addr, e)))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| Error::Http(format!("Server error: {}", e)))?;

    info!("HTTP server stopped");
    Ok(())
}
