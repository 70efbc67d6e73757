use crate::api::{self, AppState};
use crate::{static_assets, ws};
use axum::{
    Router,
    http::{Method, header},
    routing::get,
};
use tower_http::cors::{Any, CorsLayer};

pub fn build_router(core: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/health", get(health_check))
        .route("/ws", get(ws::ws_handler))
        .nest("/api", api::router())
        .fallback(static_assets::static_handler)
        .layer(cors)
        .with_state(core)
}

async fn health_check() -> &'static str {
    "OK"
}
