use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

// --- Core Blog Schemas (Mapped to Database) ---

/// User
///
/// A registered author/reader from the `users` table. Identity is issued by the
/// authentication layer; this service only reads it and lets a user edit their own profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct User {
    pub id: Uuid,
    // Unique, used in the canonical profile URL.
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

/// Category
///
/// A rubric posts are filed under. Unpublished categories hide every post they contain
/// from anyone but the post's author.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Category {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub slug: String,
    pub is_published: bool,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

/// Post
///
/// The raw `posts` row. Handlers mostly work with the joined [`PostSummary`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Post {
    pub id: i64,
    pub title: String,
    pub text: String,
    // Scheduled publication moment. A post dated in the future stays hidden until then.
    #[ts(type = "string")]
    pub pub_date: DateTime<Utc>,
    pub is_published: bool,
    pub author_id: Uuid,
    pub category_id: i64,
    // Object storage key of the attached image, if any.
    pub image: Option<String>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

/// PostSummary
///
/// A post joined with its author, its category and the number of comments.
/// This is the shape used by every listing and by the detail page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct PostSummary {
    pub id: i64,
    pub title: String,
    pub text: String,
    #[ts(type = "string")]
    pub pub_date: DateTime<Utc>,
    pub is_published: bool,
    pub author_id: Uuid,
    pub author_username: String,
    pub category_id: i64,
    pub category_slug: String,
    pub category_title: String,
    pub category_is_published: bool,
    pub image: Option<String>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    pub comment_count: i64,
}

/// Comment
///
/// A `comments` row joined with the author's username.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Comment {
    pub id: i64,
    pub post_id: i64,
    pub author_id: Uuid,
    #[sqlx(default)]
    pub author_username: String,
    pub text: String,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

// --- Write Models (validated form output) ---

/// NewPost
///
/// The persisted fields of a post, produced from a validated `PostForm`.
/// Used both for creation and for full replacement on edit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct NewPost {
    pub title: String,
    pub text: String,
    pub pub_date: DateTime<Utc>,
    pub is_published: bool,
    pub category_id: i64,
    pub image: Option<String>,
}

/// ProfileUpdate
///
/// The editable subset of [`User`], produced from a validated `ProfileForm`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ProfileUpdate {
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

// --- Media Upload Schemas ---

/// PresignedUrlRequest
///
/// Input payload for requesting a short-lived upload URL for a post image (POST /uploads/presigned).
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema, TS, Default)]
#[ts(export)]
pub struct PresignedUrlRequest {
    /// The original filename, used to derive the file extension.
    #[schema(example = "sunset.jpg")]
    pub filename: String,
    /// The MIME type. Only `image/*` is accepted.
    #[schema(example = "image/jpeg")]
    pub file_type: String,
}

/// PresignedUrlResponse
///
/// The temporary upload URL plus the object key to submit as the post's `image` field.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, TS, Default)]
#[ts(export)]
pub struct PresignedUrlResponse {
    pub upload_url: String,
    pub resource_key: String,
}

/// RenderedTemplate
///
/// Wire shape produced by the JSON renderer: the template that would be rendered and its context.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RenderedTemplate {
    pub template: String,
    #[schema(value_type = Object)]
    pub context: serde_json::Value,
}
