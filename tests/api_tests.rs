use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use blogicum_web::{
    AppConfig, AppState, InMemoryRepository, MockStorageService, create_router,
    auth::{Claims, DEV_USER_HEADER},
    config::Env,
    models::{Category, NewPost, User},
    repository::{Repository, RepositoryState},
    storage::StorageState,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{EncodingKey, Header, encode};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

struct TestApp {
    router: Router,
    repo: Arc<InMemoryRepository>,
    author: User,
    reader: User,
    category: Category,
    config: AppConfig,
}

fn spawn_app_with(config: AppConfig) -> TestApp {
    let repo = Arc::new(InMemoryRepository::new());
    let author = repo
        .insert_user(User {
            id: Uuid::new_v4(),
            username: "author".to_string(),
            ..User::default()
        })
        .unwrap();
    let reader = repo
        .insert_user(User {
            id: Uuid::new_v4(),
            username: "reader".to_string(),
            ..User::default()
        })
        .unwrap();
    let category = repo
        .insert_category(Category {
            title: "News".to_string(),
            slug: "news".to_string(),
            is_published: true,
            ..Category::default()
        })
        .unwrap();

    let state = AppState::new(
        repo.clone() as RepositoryState,
        Arc::new(MockStorageService::new()) as StorageState,
        config.clone(),
    );

    TestApp {
        router: create_router(state),
        repo,
        author,
        reader,
        category,
        config,
    }
}

fn spawn_app() -> TestApp {
    spawn_app_with(AppConfig::default())
}

impl TestApp {
    async fn post(&self, title: &str, is_published: bool) -> i64 {
        self.repo
            .create_post(
                self.author.id,
                NewPost {
                    title: title.to_string(),
                    text: "body".to_string(),
                    pub_date: Utc::now() - Duration::hours(1),
                    is_published,
                    category_id: self.category.id,
                    image: None,
                },
            )
            .await
            .unwrap()
            .id
    }

    async fn send(&self, request: Request<Body>) -> axum::response::Response {
        self.router.clone().oneshot(request).await.unwrap()
    }
}

fn get(uri: &str, user: Option<&User>) -> Request<Body> {
    let mut builder = Request::builder().method(Method::GET).uri(uri);
    if let Some(user) = user {
        builder = builder.header(DEV_USER_HEADER, user.id.to_string());
    }
    builder.body(Body::empty()).unwrap()
}

fn post_form(uri: &str, user: Option<&User>, body: &str) -> Request<Body> {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
    if let Some(user) = user {
        builder = builder.header(DEV_USER_HEADER, user.id.to_string());
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

async fn json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn bearer(secret: &str, user_id: Uuid) -> String {
    let now = Utc::now().timestamp() as usize;
    let claims = Claims {
        sub: user_id,
        iat: now,
        exp: now + 3600,
    };
    let token = encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap();
    format!("Bearer {token}")
}

#[tokio::test]
async fn test_health_check() {
    let app = spawn_app();
    let response = app.send(get("/health", None)).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn test_openapi_document_is_served() {
    let app = spawn_app();
    let response = app.send(get("/api-docs/openapi.json", None)).await;

    assert_eq!(response.status(), StatusCode::OK);
    let doc = json(response).await;
    assert!(doc["paths"]["/posts/{post_id}/"].is_object());
}

#[tokio::test]
async fn test_index_page_renders_for_anonymous_viewer() {
    let app = spawn_app();
    app.post("public", true).await;
    app.post("draft", false).await;

    let response = app.send(get("/?page=1", None)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = json(response).await;
    assert_eq!(body["template"], "blog/index.html");
    assert_eq!(body["context"]["page_obj"]["count"], 1);
}

#[tokio::test]
async fn test_authenticated_routes_require_credentials() {
    let app = spawn_app();
    let post_id = app.post("p", true).await;

    for uri in [
        "/posts/create/".to_string(),
        "/edit_profile/".to_string(),
        format!("/posts/{post_id}/edit/"),
        format!("/posts/{post_id}/delete/"),
    ] {
        let response = app.send(get(&uri, None)).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{uri}");
    }

    let response = app
        .send(post_form(&format!("/posts/{post_id}/comment/"), None, "text=hi"))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(app.repo.list_comments(post_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_draft_visible_only_to_its_author_over_http() {
    let app = spawn_app();
    let draft = app.post("draft", false).await;
    let uri = format!("/posts/{draft}/");

    assert_eq!(app.send(get(&uri, None)).await.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        app.send(get(&uri, Some(&app.reader))).await.status(),
        StatusCode::NOT_FOUND
    );
    assert_eq!(
        app.send(get(&uri, Some(&app.author))).await.status(),
        StatusCode::OK
    );
}

#[tokio::test]
async fn test_create_post_through_form_submission() {
    let app = spawn_app();
    let body = format!(
        "title=From+the+form&text=Hello&pub_date=2024-01-01T10%3A00&category={}&is_published=on",
        app.category.id
    );

    let response = app
        .send(post_form("/posts/create/", Some(&app.reader), &body))
        .await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        response.headers().get(header::LOCATION).unwrap(),
        "/profile/reader/"
    );

    let created = app.repo.post(1).unwrap().unwrap();
    assert_eq!(created.title, "From the form");
    assert_eq!(created.author_id, app.reader.id);
    assert!(created.is_published);
}

#[tokio::test]
async fn test_unparseable_form_values_rerender_instead_of_rejecting() {
    let app = spawn_app();

    for body in [
        format!("title=T&text=X&pub_date=tomorrow&category={}", app.category.id),
        "title=T&text=X&pub_date=2024-01-01T10%3A00&category=abc".to_string(),
    ] {
        let response = app
            .send(post_form("/posts/create/", Some(&app.reader), &body))
            .await;
        assert_eq!(response.status(), StatusCode::OK, "{body}");

        let page = json(response).await;
        assert_eq!(page["template"], "blog/create.html");
        assert!(page["context"]["form"]["errors"].as_object().unwrap().len() == 1);
    }
    assert!(app.repo.post(1).unwrap().is_none());
}

#[tokio::test]
async fn test_invalid_bearer_token_is_rejected_on_category_pages() {
    let app = spawn_app();
    let request = Request::builder()
        .uri("/category/news/")
        .header(header::AUTHORIZATION, "Bearer not-a-jwt")
        .body(Body::empty())
        .unwrap();

    assert_eq!(app.send(request).await.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_comment_then_detail_lists_it() {
    let app = spawn_app();
    let post_id = app.post("chatty", true).await;

    let response = app
        .send(post_form(
            &format!("/posts/{post_id}/comment/"),
            Some(&app.reader),
            "text=Great+post",
        ))
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let detail = json(app.send(get(&format!("/posts/{post_id}/"), None)).await).await;
    assert_eq!(detail["context"]["comments"][0]["text"], "Great post");
}

#[tokio::test]
async fn test_non_author_delete_over_http_redirects() {
    let app = spawn_app();
    let post_id = app.post("mine", true).await;

    let response = app
        .send(post_form(&format!("/posts/{post_id}/delete/"), Some(&app.reader), ""))
        .await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        response.headers().get(header::LOCATION).unwrap(),
        format!("/posts/{post_id}/").as_str()
    );
    assert!(app.repo.post(post_id).unwrap().is_some());
}

#[tokio::test]
async fn test_bearer_token_authenticates() {
    let app = spawn_app();
    let request = Request::builder()
        .uri("/edit_profile/")
        .header(header::AUTHORIZATION, bearer(&app.config.jwt_secret, app.author.id))
        .body(Body::empty())
        .unwrap();

    let response = app.send(request).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json(response).await["context"]["form"]["data"]["username"], "author");
}

#[tokio::test]
async fn test_invalid_bearer_token_is_rejected_even_on_public_pages() {
    let app = spawn_app();
    let request = Request::builder()
        .uri("/")
        .header(header::AUTHORIZATION, bearer("some-other-secret", app.author.id))
        .body(Body::empty())
        .unwrap();

    assert_eq!(app.send(request).await.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_dev_header_ignored_in_production() {
    let app = spawn_app_with(AppConfig {
        env: Env::Production,
        ..AppConfig::default()
    });

    let response = app.send(get("/edit_profile/", Some(&app.author))).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_presigned_upload_endpoint() {
    let app = spawn_app();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/uploads/presigned")
        .header(DEV_USER_HEADER, app.author.id.to_string())
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            r#"{"filename":"cover.png","file_type":"image/png"}"#,
        ))
        .unwrap();

    let response = app.send(request).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = json(response).await;
    assert!(body["upload_url"].as_str().unwrap().contains("signature=fake"));
    assert!(body["resource_key"].as_str().unwrap().ends_with(".png"));
}
