pub mod auth;
pub mod export;
pub mod games;
pub mod guilds;
pub mod participants;
pub mod templates;

use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().nest("/api/v1", api_routes())
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .nest("/auth", auth::routes())
        .nest("/guilds", guilds::routes())
        .nest("/templates", templates::routes())
        .nest("/games", games::routes().merge(participants::routes()))
        .nest("/export", export::routes())
}

async fn health_check() -> impl IntoResponse {
    axum::Json(serde_json::json!({ "status": "ok" }))
}
