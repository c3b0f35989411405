use axum::{
    Router,
    extract::{FromRef, Request},
    http::HeaderName,
    middleware::{self, Next},
    response::Response,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Core application services and components.
pub mod auth;
pub mod config;
pub mod error;
pub mod forms;
pub mod handlers;
pub mod models;
pub mod pagination;
pub mod policy;
pub mod render;
pub mod repository;
pub mod storage;

// Routing split by access level (public, authenticated).
pub mod routes;
use auth::AuthUser;
use routes::{authenticated, public};

// --- Public Re-exports ---

pub use config::AppConfig;
pub use render::{JsonRenderer, RendererState};
pub use repository::{InMemoryRepository, PostgresRepository, RepositoryState};
pub use storage::{MockStorageService, S3StorageClient, StorageState};

/// ApiDoc
///
/// The OpenAPI document for every page and endpoint, served at `/api-docs/openapi.json`.
/// Pages are documented with the `RenderedTemplate` body the default renderer produces.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::index, handlers::category_posts, handlers::profile,
        handlers::edit_profile_page, handlers::edit_profile,
        handlers::post_detail, handlers::create_post_page, handlers::create_post,
        handlers::edit_post_page, handlers::edit_post,
        handlers::delete_post_page, handlers::delete_post,
        handlers::add_comment, handlers::edit_comment_page, handlers::edit_comment,
        handlers::delete_comment_page, handlers::delete_comment,
        handlers::request_image_upload
    ),
    components(
        schemas(
            models::User, models::Category, models::Post, models::PostSummary, models::Comment,
            models::PresignedUrlRequest, models::PresignedUrlResponse, models::RenderedTemplate,
            forms::PostForm, forms::CommentForm, forms::ProfileForm,
        )
    ),
    tags(
        (name = "blogicum", description = "Blogicum blog pages")
    )
)]
struct ApiDoc;

/// AppState
///
/// Everything a handler needs, cloned cheaply into each request. Each service sits
/// behind an `Arc<dyn Trait>`, so tests swap in `InMemoryRepository`,
/// `MockStorageService` or another renderer without touching the handlers.
///
/// Extractors that only need one part (`AuthUser`, `Viewer`) get it through the
/// `FromRef` impls below.
#[derive(Clone)]
pub struct AppState {
    /// Posts, categories, comments and users.
    pub repo: RepositoryState,
    /// Presigned uploads for post images.
    pub storage: StorageState,
    /// Turns a template name plus context into the response body.
    pub renderer: RendererState,
    /// Loaded once at startup; read by the auth extractors.
    pub config: AppConfig,
}

impl AppState {
    /// State with the JSON renderer, which is what the service runs with.
    pub fn new(repo: RepositoryState, storage: StorageState, config: AppConfig) -> Self {
        Self {
            repo,
            storage,
            renderer: std::sync::Arc::new(JsonRenderer),
            config,
        }
    }
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for StorageState {
    fn from_ref(app_state: &AppState) -> StorageState {
        app_state.storage.clone()
    }
}

impl FromRef<AppState> for RendererState {
    fn from_ref(app_state: &AppState) -> RendererState {
        app_state.renderer.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// auth_middleware
///
/// Guards the authenticated router: `AuthUser` rejects with 401 before any handler runs.
/// The handlers extract `AuthUser` again for the identity itself.
async fn auth_middleware(_auth_user: AuthUser, request: Request, next: Next) -> Response {
    next.run(request).await
}

/// create_router
///
/// Assembles the application's routing and middleware:
/// 1. API docs: Swagger UI at `/swagger-ui`, backed by `ApiDoc`.
/// 2. Public routes: listings, profiles and post details. Any viewer, but presented
///    credentials must be valid.
/// 3. Authenticated routes: every mutation and the upload endpoint, guarded by
///    `auth_middleware` as a route layer so unmatched paths still 404.
/// 4. Global layers: a request id is assigned and echoed back, each request gets a
///    tracing span, and CORS is open.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // Listings, profiles and post details. Visibility is decided per viewer in the handlers.
        .merge(public::public_routes())
        .merge(
            authenticated::authenticated_routes().route_layer(middleware::from_fn_with_state(
                state.clone(),
                auth_middleware,
            )),
        )
        .with_state(state);

    base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// One span per request, tagged with the `x-request-id` set by the layer above it.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
