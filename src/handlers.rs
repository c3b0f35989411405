use crate::{
    AppState,
    auth::AuthUser,
    error::{AppError, AppResult},
    forms::{CommentForm, FormView, PostForm, ProfileForm, field_error},
    models::{Comment, NewPost, PostSummary, PresignedUrlRequest, PresignedUrlResponse, RenderedTemplate},
    pagination::{Page, PageQuery, Paginator},
    policy::{self, Viewer},
    render::{
        CATEGORY_TEMPLATE, COMMENT_FORM_TEMPLATE, Context, DETAIL_TEMPLATE, EDIT_PROFILE_TEMPLATE,
        INDEX_TEMPLATE, POST_FORM_TEMPLATE, PROFILE_TEMPLATE,
    },
    repository::{PostFilter, RepositoryError},
};
use axum::{
    Form, Json,
    extract::{Path, Query, State},
    response::{IntoResponse, Redirect, Response},
};
use chrono::Utc;
use uuid::Uuid;
use validator::ValidationErrors;

// --- Canonical locations ---

pub fn index_url() -> String {
    "/".to_string()
}

pub fn profile_url(username: &str) -> String {
    format!("/profile/{username}/")
}

pub fn post_detail_url(post_id: i64) -> String {
    format!("/posts/{post_id}/")
}

// --- Helpers ---

fn render(state: &AppState, template: &str, context: Context) -> AppResult<Response> {
    Ok(state.renderer.render(template, context)?)
}

/// Counts, resolves the requested page and fetches only that slice.
async fn paginate_posts(
    state: &AppState,
    filter: &PostFilter,
    query: &PageQuery,
) -> AppResult<Page<PostSummary>> {
    let paginator = Paginator::default();
    let count = state.repo.count_posts(filter).await?;
    let window = paginator.window(count, query.page.as_deref());
    let posts = state
        .repo
        .list_posts(filter, window.limit, window.offset)
        .await?;
    Ok(Page::new(posts, window))
}

/// Unconditional lookup used by the mutation routes; the ownership check follows.
async fn load_post(state: &AppState, post_id: i64) -> AppResult<PostSummary> {
    state
        .repo
        .get_post(post_id, &PostFilter::default())
        .await?
        .ok_or(AppError::NotFound)
}

async fn load_comment(state: &AppState, post_id: i64, comment_id: i64) -> AppResult<Comment> {
    state
        .repo
        .get_comment(post_id, comment_id)
        .await?
        .ok_or(AppError::NotFound)
}

/// A rejected ownership check: back to the post, nothing changed, no error shown.
fn redirect_non_author(user: &AuthUser, post_id: i64) -> Response {
    tracing::warn!(user = %user.username, post_id, "mutation by non-author redirected");
    Redirect::to(&post_detail_url(post_id)).into_response()
}

/// Field validation plus the checks that need the store.
async fn clean_post_form(
    state: &AppState,
    form: &PostForm,
) -> AppResult<Result<NewPost, ValidationErrors>> {
    let new_post = match form.clean() {
        Ok(new_post) => new_post,
        Err(errors) => return Ok(Err(errors)),
    };
    if state.repo.get_category(new_post.category_id).await?.is_none() {
        return Ok(Err(field_error(
            "category",
            "invalid_choice",
            "Select a valid choice.",
        )));
    }
    Ok(Ok(new_post))
}

async fn render_post_form(
    state: &AppState,
    form: FormView<PostForm>,
    post: Option<&PostSummary>,
) -> AppResult<Response> {
    let categories = state.repo.list_categories().await?;
    let context = Context::new()
        .insert("form", &form)?
        .insert("categories", &categories)?
        .insert("post", &post)?;
    render(state, POST_FORM_TEMPLATE, context)
}

// --- Listings ---

/// index
///
/// Front page: every publicly visible post, newest first, ten per page.
/// The listing is the same for everyone, but credentials are still checked.
#[utoipa::path(
    get,
    path = "/",
    params(PageQuery),
    responses(
        (status = 200, description = "Rendered blog/index.html", body = RenderedTemplate),
        (status = 401, description = "Invalid credentials")
    )
)]
pub async fn index(
    _viewer: Viewer,
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> AppResult<Response> {
    let filter = PostFilter::visible(Utc::now());
    let page_obj = paginate_posts(&state, &filter, &query).await?;

    let context = Context::new().insert("page_obj", &page_obj)?;
    render(&state, INDEX_TEMPLATE, context)
}

/// category_posts
///
/// Publicly visible posts of one category. Unknown and unpublished categories are 404.
#[utoipa::path(
    get,
    path = "/category/{category_slug}/",
    params(("category_slug" = String, Path, description = "Category slug"), PageQuery),
    responses(
        (status = 200, description = "Rendered blog/category.html", body = RenderedTemplate),
        (status = 401, description = "Invalid credentials"),
        (status = 404, description = "Category missing or unpublished")
    )
)]
pub async fn category_posts(
    _viewer: Viewer,
    State(state): State<AppState>,
    Path(category_slug): Path<String>,
    Query(query): Query<PageQuery>,
) -> AppResult<Response> {
    let category = state
        .repo
        .get_category_by_slug(&category_slug)
        .await?
        .filter(|c| c.is_published)
        .ok_or(AppError::NotFound)?;

    let filter = PostFilter::visible(Utc::now()).in_category(category.id);
    let page_obj = paginate_posts(&state, &filter, &query).await?;

    let context = Context::new()
        .insert("category", &category)?
        .insert("page_obj", &page_obj)?;
    render(&state, CATEGORY_TEMPLATE, context)
}

/// profile
///
/// A user's page with their posts. The owner sees drafts and scheduled posts too;
/// everybody else gets the publicly visible subset.
#[utoipa::path(
    get,
    path = "/profile/{username}/",
    params(("username" = String, Path, description = "Username"), PageQuery),
    responses(
        (status = 200, description = "Rendered blog/profile.html", body = RenderedTemplate),
        (status = 404, description = "No such user")
    )
)]
pub async fn profile(
    viewer: Viewer,
    State(state): State<AppState>,
    Path(username): Path<String>,
    Query(query): Query<PageQuery>,
) -> AppResult<Response> {
    let user = state
        .repo
        .get_user_by_username(&username)
        .await?
        .ok_or(AppError::NotFound)?;

    let filter = if viewer.is(user.id) {
        PostFilter::default().by_author(user.id)
    } else {
        PostFilter::visible(Utc::now()).by_author(user.id)
    };
    let page_obj = paginate_posts(&state, &filter, &query).await?;

    let context = Context::new()
        .insert("profile", &user)?
        .insert("page_obj", &page_obj)?;
    render(&state, PROFILE_TEMPLATE, context)
}

// --- Profile editing ---

/// edit_profile_page
///
/// [Authenticated Route] The profile form, pre-filled with the current values.
#[utoipa::path(
    get,
    path = "/edit_profile/",
    responses(
        (status = 200, description = "Rendered blog/user.html", body = RenderedTemplate),
        (status = 401, description = "Not signed in")
    )
)]
pub async fn edit_profile_page(
    user: AuthUser,
    State(state): State<AppState>,
) -> AppResult<Response> {
    let current = state
        .repo
        .get_user(user.id)
        .await?
        .ok_or(AppError::NotFound)?;

    let context = Context::new().insert("form", &FormView::unbound(ProfileForm::from_user(&current)))?;
    render(&state, EDIT_PROFILE_TEMPLATE, context)
}

/// edit_profile
///
/// [Authenticated Route] Saves the profile and redirects to it, or re-renders the form.
#[utoipa::path(
    post,
    path = "/edit_profile/",
    request_body(content = ProfileForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Form re-rendered with errors", body = RenderedTemplate),
        (status = 303, description = "Saved, redirect to the profile"),
        (status = 401, description = "Not signed in")
    )
)]
pub async fn edit_profile(
    user: AuthUser,
    State(state): State<AppState>,
    Form(form): Form<ProfileForm>,
) -> AppResult<Response> {
    let errors = match form.clean() {
        Ok(update) => {
            let taken = state
                .repo
                .get_user_by_username(&update.username)
                .await?
                .is_some_and(|other| other.id != user.id);

            if taken {
                username_taken()
            } else {
                // The lookup above can race another rename; the store has the last word.
                match state.repo.update_user(user.id, update).await {
                    Ok(Some(updated)) => {
                        tracing::info!(user_id = %updated.id, username = %updated.username, "profile updated");
                        return Ok(Redirect::to(&profile_url(&updated.username)).into_response());
                    }
                    Ok(None) => return Err(AppError::NotFound),
                    Err(RepositoryError::UsernameTaken) => username_taken(),
                    Err(e) => return Err(e.into()),
                }
            }
        }
        Err(errors) => errors,
    };

    let context = Context::new().insert("form", &FormView::with_errors(form, &errors))?;
    render(&state, EDIT_PROFILE_TEMPLATE, context)
}

fn username_taken() -> ValidationErrors {
    field_error("username", "unique", "A user with that username already exists.")
}

// --- Posts ---

/// post_detail
///
/// A single post with its comments. Non-authors only get posts passing the
/// public visibility rules; anything else is 404.
#[utoipa::path(
    get,
    path = "/posts/{post_id}/",
    params(("post_id" = i64, Path, description = "Post ID")),
    responses(
        (status = 200, description = "Rendered blog/detail.html", body = RenderedTemplate),
        (status = 404, description = "Missing or not visible to this viewer")
    )
)]
pub async fn post_detail(
    viewer: Viewer,
    State(state): State<AppState>,
    Path(post_id): Path<i64>,
) -> AppResult<Response> {
    let mut post = load_post(&state, post_id).await?;
    if !viewer.is(post.author_id) {
        post = state
            .repo
            .get_post(post_id, &PostFilter::visible(Utc::now()))
            .await?
            .ok_or(AppError::NotFound)?;
    }

    let comments = state.repo.list_comments(post.id).await?;

    let context = Context::new()
        .insert("post", &post)?
        .insert("form", &FormView::unbound(CommentForm::default()))?
        .insert("comments", &comments)?;
    render(&state, DETAIL_TEMPLATE, context)
}

/// create_post_page
///
/// [Authenticated Route] Empty post form.
#[utoipa::path(
    get,
    path = "/posts/create/",
    responses(
        (status = 200, description = "Rendered blog/create.html", body = RenderedTemplate),
        (status = 401, description = "Not signed in")
    )
)]
pub async fn create_post_page(_user: AuthUser, State(state): State<AppState>) -> AppResult<Response> {
    render_post_form(&state, FormView::unbound(PostForm::blank()), None).await
}

/// create_post
///
/// [Authenticated Route] Publishes a post authored by the current user and redirects to their profile.
#[utoipa::path(
    post,
    path = "/posts/create/",
    request_body(content = PostForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Form re-rendered with errors", body = RenderedTemplate),
        (status = 303, description = "Created, redirect to the author's profile"),
        (status = 401, description = "Not signed in")
    )
)]
pub async fn create_post(
    user: AuthUser,
    State(state): State<AppState>,
    Form(form): Form<PostForm>,
) -> AppResult<Response> {
    match clean_post_form(&state, &form).await? {
        Ok(new_post) => {
            let post = state.repo.create_post(user.id, new_post).await?;
            tracing::info!(post_id = post.id, author = %user.username, "post created");
            Ok(Redirect::to(&profile_url(&user.username)).into_response())
        }
        Err(errors) => render_post_form(&state, FormView::with_errors(form, &errors), None).await,
    }
}

/// edit_post_page
///
/// [Authenticated Route] The post form pre-filled for its author. Anyone else is sent back to the post.
#[utoipa::path(
    get,
    path = "/posts/{post_id}/edit/",
    params(("post_id" = i64, Path, description = "Post ID")),
    responses(
        (status = 200, description = "Rendered blog/create.html", body = RenderedTemplate),
        (status = 303, description = "Not the author, redirect to the post"),
        (status = 404, description = "No such post")
    )
)]
pub async fn edit_post_page(
    user: AuthUser,
    State(state): State<AppState>,
    Path(post_id): Path<i64>,
) -> AppResult<Response> {
    let post = load_post(&state, post_id).await?;
    if !policy::authorize(&user, post.author_id).is_authorized() {
        return Ok(redirect_non_author(&user, post_id));
    }

    render_post_form(&state, FormView::unbound(PostForm::from_post(&post)), Some(&post)).await
}

/// edit_post
///
/// [Authenticated Route] Saves the author's changes and redirects to the post.
#[utoipa::path(
    post,
    path = "/posts/{post_id}/edit/",
    params(("post_id" = i64, Path, description = "Post ID")),
    request_body(content = PostForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Form re-rendered with errors", body = RenderedTemplate),
        (status = 303, description = "Saved, or not the author; redirect to the post"),
        (status = 404, description = "No such post")
    )
)]
pub async fn edit_post(
    user: AuthUser,
    State(state): State<AppState>,
    Path(post_id): Path<i64>,
    Form(form): Form<PostForm>,
) -> AppResult<Response> {
    let post = load_post(&state, post_id).await?;
    if !policy::authorize(&user, post.author_id).is_authorized() {
        return Ok(redirect_non_author(&user, post_id));
    }

    match clean_post_form(&state, &form).await? {
        Ok(changes) => {
            state
                .repo
                .update_post(post_id, changes)
                .await?
                .ok_or(AppError::NotFound)?;
            tracing::info!(post_id, author = %user.username, "post updated");
            Ok(Redirect::to(&post_detail_url(post_id)).into_response())
        }
        Err(errors) => {
            render_post_form(&state, FormView::with_errors(form, &errors), Some(&post)).await
        }
    }
}

/// delete_post_page
///
/// [Authenticated Route] Delete confirmation, showing the post as it stands.
#[utoipa::path(
    get,
    path = "/posts/{post_id}/delete/",
    params(("post_id" = i64, Path, description = "Post ID")),
    responses(
        (status = 200, description = "Rendered blog/create.html", body = RenderedTemplate),
        (status = 303, description = "Not the author, redirect to the post"),
        (status = 404, description = "No such post")
    )
)]
pub async fn delete_post_page(
    user: AuthUser,
    State(state): State<AppState>,
    Path(post_id): Path<i64>,
) -> AppResult<Response> {
    let post = load_post(&state, post_id).await?;
    if !policy::authorize(&user, post.author_id).is_authorized() {
        return Ok(redirect_non_author(&user, post_id));
    }

    render_post_form(&state, FormView::unbound(PostForm::from_post(&post)), Some(&post)).await
}

/// delete_post
///
/// [Authenticated Route] Deletes the post and its comments, then redirects to the front page.
/// A second submission finds nothing and yields 404.
#[utoipa::path(
    post,
    path = "/posts/{post_id}/delete/",
    params(("post_id" = i64, Path, description = "Post ID")),
    responses(
        (status = 303, description = "Deleted (redirect to index), or not the author (redirect to the post)"),
        (status = 404, description = "No such post")
    )
)]
pub async fn delete_post(
    user: AuthUser,
    State(state): State<AppState>,
    Path(post_id): Path<i64>,
) -> AppResult<Response> {
    let post = load_post(&state, post_id).await?;
    if !policy::authorize(&user, post.author_id).is_authorized() {
        return Ok(redirect_non_author(&user, post_id));
    }

    if !state.repo.delete_post(post_id).await? {
        return Err(AppError::NotFound);
    }
    tracing::info!(post_id, author = %user.username, "post deleted");
    Ok(Redirect::to(&index_url()).into_response())
}

// --- Comments ---

/// add_comment
///
/// [Authenticated Route] Comments on a post the user can see. An empty comment is
/// dropped; either way the user lands back on the post.
#[utoipa::path(
    post,
    path = "/posts/{post_id}/comment/",
    params(("post_id" = i64, Path, description = "Post ID")),
    request_body(content = CommentForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 303, description = "Redirect to the post"),
        (status = 404, description = "Missing or not visible to this user")
    )
)]
pub async fn add_comment(
    user: AuthUser,
    State(state): State<AppState>,
    Path(post_id): Path<i64>,
    Form(form): Form<CommentForm>,
) -> AppResult<Response> {
    let post = load_post(&state, post_id).await?;
    if !policy::can_view(&Viewer::User(user.clone()), &post, Utc::now()) {
        return Err(AppError::NotFound);
    }

    match validator::Validate::validate(&form) {
        Ok(()) => {
            let comment = state.repo.add_comment(post_id, user.id, form.text).await?;
            tracing::info!(post_id, comment_id = comment.id, author = %user.username, "comment added");
        }
        Err(errors) => tracing::debug!(post_id, %errors, "empty comment dropped"),
    }
    Ok(Redirect::to(&post_detail_url(post_id)).into_response())
}

/// edit_comment_page
///
/// [Authenticated Route] The comment form for the comment's author.
#[utoipa::path(
    get,
    path = "/posts/{post_id}/edit_comment/{comment_id}/",
    params(
        ("post_id" = i64, Path, description = "Post ID"),
        ("comment_id" = i64, Path, description = "Comment ID")
    ),
    responses(
        (status = 200, description = "Rendered blog/comment.html", body = RenderedTemplate),
        (status = 303, description = "Not the author, redirect to the post"),
        (status = 404, description = "No such comment on this post")
    )
)]
pub async fn edit_comment_page(
    user: AuthUser,
    State(state): State<AppState>,
    Path((post_id, comment_id)): Path<(i64, i64)>,
) -> AppResult<Response> {
    let comment = load_comment(&state, post_id, comment_id).await?;
    if !policy::authorize(&user, comment.author_id).is_authorized() {
        return Ok(redirect_non_author(&user, post_id));
    }

    let form = CommentForm {
        text: comment.text.clone(),
    };
    let context = Context::new()
        .insert("form", &FormView::unbound(form))?
        .insert("comment", &comment)?;
    render(&state, COMMENT_FORM_TEMPLATE, context)
}

/// edit_comment
///
/// [Authenticated Route] Saves the author's new comment text and redirects to the post.
#[utoipa::path(
    post,
    path = "/posts/{post_id}/edit_comment/{comment_id}/",
    params(
        ("post_id" = i64, Path, description = "Post ID"),
        ("comment_id" = i64, Path, description = "Comment ID")
    ),
    request_body(content = CommentForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Form re-rendered with errors", body = RenderedTemplate),
        (status = 303, description = "Saved, or not the author; redirect to the post"),
        (status = 404, description = "No such comment on this post")
    )
)]
pub async fn edit_comment(
    user: AuthUser,
    State(state): State<AppState>,
    Path((post_id, comment_id)): Path<(i64, i64)>,
    Form(form): Form<CommentForm>,
) -> AppResult<Response> {
    let comment = load_comment(&state, post_id, comment_id).await?;
    if !policy::authorize(&user, comment.author_id).is_authorized() {
        return Ok(redirect_non_author(&user, post_id));
    }

    if let Err(errors) = validator::Validate::validate(&form) {
        let context = Context::new()
            .insert("form", &FormView::with_errors(form, &errors))?
            .insert("comment", &comment)?;
        return render(&state, COMMENT_FORM_TEMPLATE, context);
    }

    state
        .repo
        .update_comment(comment_id, form.text)
        .await?
        .ok_or(AppError::NotFound)?;
    tracing::info!(post_id, comment_id, author = %user.username, "comment updated");
    Ok(Redirect::to(&post_detail_url(post_id)).into_response())
}

/// delete_comment_page
///
/// [Authenticated Route] Delete confirmation for a comment.
#[utoipa::path(
    get,
    path = "/posts/{post_id}/delete_comment/{comment_id}/",
    params(
        ("post_id" = i64, Path, description = "Post ID"),
        ("comment_id" = i64, Path, description = "Comment ID")
    ),
    responses(
        (status = 200, description = "Rendered blog/comment.html", body = RenderedTemplate),
        (status = 303, description = "Not the author, redirect to the post"),
        (status = 404, description = "No such comment on this post")
    )
)]
pub async fn delete_comment_page(
    user: AuthUser,
    State(state): State<AppState>,
    Path((post_id, comment_id)): Path<(i64, i64)>,
) -> AppResult<Response> {
    let comment = load_comment(&state, post_id, comment_id).await?;
    if !policy::authorize(&user, comment.author_id).is_authorized() {
        return Ok(redirect_non_author(&user, post_id));
    }

    let context = Context::new().insert("comment", &comment)?;
    render(&state, COMMENT_FORM_TEMPLATE, context)
}

/// delete_comment
///
/// [Authenticated Route] Deletes the author's comment and redirects to the post.
#[utoipa::path(
    post,
    path = "/posts/{post_id}/delete_comment/{comment_id}/",
    params(
        ("post_id" = i64, Path, description = "Post ID"),
        ("comment_id" = i64, Path, description = "Comment ID")
    ),
    responses(
        (status = 303, description = "Deleted, or not the author; redirect to the post"),
        (status = 404, description = "No such comment on this post")
    )
)]
pub async fn delete_comment(
    user: AuthUser,
    State(state): State<AppState>,
    Path((post_id, comment_id)): Path<(i64, i64)>,
) -> AppResult<Response> {
    let comment = load_comment(&state, post_id, comment_id).await?;
    if !policy::authorize(&user, comment.author_id).is_authorized() {
        return Ok(redirect_non_author(&user, post_id));
    }

    if !state.repo.delete_comment(comment_id).await? {
        return Err(AppError::NotFound);
    }
    tracing::info!(post_id, comment_id, author = %user.username, "comment deleted");
    Ok(Redirect::to(&post_detail_url(post_id)).into_response())
}

// --- Media ---

/// request_image_upload
///
/// [Authenticated Route] Issues a presigned URL for uploading a post image straight
/// to object storage. The returned `resource_key` goes into the post form's `image` field.
#[utoipa::path(
    post,
    path = "/uploads/presigned",
    request_body = PresignedUrlRequest,
    responses(
        (status = 200, description = "Upload URL", body = PresignedUrlResponse),
        (status = 400, description = "Not an image content type")
    )
)]
pub async fn request_image_upload(
    user: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<PresignedUrlRequest>,
) -> AppResult<Json<PresignedUrlResponse>> {
    if !payload.file_type.starts_with("image/") {
        return Err(AppError::BadRequest(format!(
            "unsupported content type: {}",
            payload.file_type
        )));
    }

    let extension = std::path::Path::new(&payload.filename)
        .extension()
        .and_then(std::ffi::OsStr::to_str)
        .filter(|ext| ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or("img")
        .to_ascii_lowercase();
    let resource_key = format!("posts/{}.{}", Uuid::new_v4(), extension);

    let upload_url = state
        .storage
        .presign_image_upload(&resource_key, &payload.file_type)
        .await?;
    tracing::info!(user = %user.username, key = %resource_key, "image upload URL issued");

    Ok(Json(PresignedUrlResponse {
        upload_url,
        resource_key,
    }))
}
