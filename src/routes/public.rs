use crate::{AppState, handlers};
use axum::{Router, routing::get};

/// Public Router Module
///
/// Read-only pages. Anonymous viewers only ever see published posts in published
/// categories whose publication date has passed; a post's author also sees their own.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness probe for the load balancer.
        .route("/health", get(|| async { "ok" }))
        // GET /?page=
        // Front page, ten posts per page.
        .route("/", get(handlers::index))
        // GET /category/{category_slug}/
        // 404 for unknown or unpublished categories.
        .route("/category/{category_slug}/", get(handlers::category_posts))
        // GET /profile/{username}/
        .route("/profile/{username}/", get(handlers::profile))
        // GET /posts/{post_id}/
        .route("/posts/{post_id}/", get(handlers::post_detail))
}
