use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Authenticated Router Module
///
/// Every route here sits behind the `AuthUser` guard, so an anonymous request gets 401.
/// Ownership is checked inside the handlers: a user who is not the author of the
/// post or comment is redirected back to the post and nothing changes.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // GET/POST /edit_profile/
        // The current user's own profile; there is no way to address anyone else's.
        .route(
            "/edit_profile/",
            get(handlers::edit_profile_page).post(handlers::edit_profile),
        )
        // --- Posts ---
        // GET/POST /posts/create/
        .route(
            "/posts/create/",
            get(handlers::create_post_page).post(handlers::create_post),
        )
        // GET/POST /posts/{post_id}/edit/
        .route(
            "/posts/{post_id}/edit/",
            get(handlers::edit_post_page).post(handlers::edit_post),
        )
        // GET shows the confirmation, POST deletes the post together with its comments.
        .route(
            "/posts/{post_id}/delete/",
            get(handlers::delete_post_page).post(handlers::delete_post),
        )
        // --- Comments ---
        // POST /posts/{post_id}/comment/
        .route("/posts/{post_id}/comment/", post(handlers::add_comment))
        .route(
            "/posts/{post_id}/edit_comment/{comment_id}/",
            get(handlers::edit_comment_page).post(handlers::edit_comment),
        )
        .route(
            "/posts/{post_id}/delete_comment/{comment_id}/",
            get(handlers::delete_comment_page).post(handlers::delete_comment),
        )
        // --- Media ---
        // POST /uploads/presigned
        // A 10-minute presigned PUT URL for a post image; the client uploads straight to storage.
        .route("/uploads/presigned", post(handlers::request_image_upload))
}
