use axum::Router;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::Deployment;

pub mod bubbles;
pub mod health;
pub mod notifications;
pub mod projects;
pub mod workflows;

pub fn router(deployment: Deployment) -> Router {
    let api = Router::new()
        .merge(health::router(&deployment))
        .merge(workflows::router(&deployment))
        .merge(projects::router(&deployment))
        .merge(notifications::router(&deployment))
        .merge(bubbles::router(&deployment));

    Router::new()
        .nest("/api", api)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(deployment)
}
