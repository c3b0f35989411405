use crate::models::{Category, Comment, NewPost, Post, PostSummary, ProfileUpdate, User};
use crate::policy;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, query_builder::QueryBuilder};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("in-memory store lock poisoned")]
    Poisoned,

    #[error("username already taken")]
    UsernameTaken,
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// PostFilter
///
/// The query-side form of the visibility rules. An empty filter matches every post;
/// handlers add constraints depending on who is asking.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PostFilter {
    /// When set, only posts that are published, dated at or before this instant
    /// and filed under a published category match.
    pub visible_at: Option<DateTime<Utc>>,
    pub category_id: Option<i64>,
    pub author_id: Option<Uuid>,
}

impl PostFilter {
    /// Everything visible to a generic viewer at `now`.
    pub fn visible(now: DateTime<Utc>) -> Self {
        Self {
            visible_at: Some(now),
            ..Self::default()
        }
    }

    pub fn in_category(mut self, category_id: i64) -> Self {
        self.category_id = Some(category_id);
        self
    }

    pub fn by_author(mut self, author_id: Uuid) -> Self {
        self.author_id = Some(author_id);
        self
    }

    /// In-process evaluation of the filter. Must agree with the SQL built by `push_post_filter`.
    pub fn matches(&self, post: &PostSummary) -> bool {
        if let Some(now) = self.visible_at {
            if !policy::is_publicly_visible(
                post.is_published,
                post.pub_date,
                post.category_is_published,
                now,
            ) {
                return false;
            }
        }
        if self.category_id.is_some_and(|id| id != post.category_id) {
            return false;
        }
        if self.author_id.is_some_and(|id| id != post.author_id) {
            return false;
        }
        true
    }
}

/// Repository Trait
///
/// The persistence contract the handlers are written against. Visibility is expressed
/// through [`PostFilter`]; ownership is checked by the handlers before any mutation,
/// so the write methods here operate on ids only.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Users ---
    async fn get_user(&self, id: Uuid) -> RepositoryResult<Option<User>>;
    async fn get_user_by_username(&self, username: &str) -> RepositoryResult<Option<User>>;
    async fn update_user(&self, id: Uuid, update: ProfileUpdate) -> RepositoryResult<Option<User>>;

    // --- Categories ---
    // Regardless of publication status. Callers decide what an unpublished category means.
    async fn get_category_by_slug(&self, slug: &str) -> RepositoryResult<Option<Category>>;
    async fn get_category(&self, id: i64) -> RepositoryResult<Option<Category>>;
    async fn list_categories(&self) -> RepositoryResult<Vec<Category>>;

    // --- Posts ---
    async fn count_posts(&self, filter: &PostFilter) -> RepositoryResult<i64>;
    // Newest publication date first.
    async fn list_posts(
        &self,
        filter: &PostFilter,
        limit: i64,
        offset: i64,
    ) -> RepositoryResult<Vec<PostSummary>>;
    async fn get_post(&self, id: i64, filter: &PostFilter) -> RepositoryResult<Option<PostSummary>>;
    async fn create_post(&self, author_id: Uuid, post: NewPost) -> RepositoryResult<Post>;
    async fn update_post(&self, id: i64, post: NewPost) -> RepositoryResult<Option<Post>>;
    // Removes the post and its comments. Returns false if nothing was deleted.
    async fn delete_post(&self, id: i64) -> RepositoryResult<bool>;

    // --- Comments ---
    // Oldest first.
    async fn list_comments(&self, post_id: i64) -> RepositoryResult<Vec<Comment>>;
    async fn get_comment(&self, post_id: i64, comment_id: i64) -> RepositoryResult<Option<Comment>>;
    async fn add_comment(&self, post_id: i64, author_id: Uuid, text: String) -> RepositoryResult<Comment>;
    async fn update_comment(&self, id: i64, text: String) -> RepositoryResult<Option<Comment>>;
    async fn delete_comment(&self, id: i64) -> RepositoryResult<bool>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the application state.
pub type RepositoryState = Arc<dyn Repository>;

// --- Postgres ---

const POST_SUMMARY_SELECT: &str = r#"
    SELECT
        p.id, p.title, p.text, p.pub_date, p.is_published, p.author_id,
        u.username AS author_username,
        p.category_id, c.slug AS category_slug, c.title AS category_title,
        c.is_published AS category_is_published,
        p.image, p.created_at,
        (SELECT COUNT(*) FROM comments cm WHERE cm.post_id = p.id) AS comment_count
    FROM posts p
    JOIN users u ON u.id = p.author_id
    JOIN categories c ON c.id = p.category_id
    WHERE TRUE
"#;

const POST_COLUMNS: &str =
    "id, title, text, pub_date, is_published, author_id, category_id, image, created_at";

const CATEGORY_COLUMNS: &str = "id, title, description, slug, is_published, created_at";

const USER_COLUMNS: &str = "id, username, first_name, last_name, email";

/// Appends the `WHERE` constraints of `filter`. Expects `p` (posts) and `c` (categories) in scope.
fn push_post_filter(builder: &mut QueryBuilder<'_, Postgres>, filter: &PostFilter) {
    if let Some(now) = filter.visible_at {
        builder
            .push(" AND p.is_published = TRUE AND c.is_published = TRUE AND p.pub_date <= ")
            .push_bind(now);
    }
    if let Some(category_id) = filter.category_id {
        builder.push(" AND p.category_id = ").push_bind(category_id);
    }
    if let Some(author_id) = filter.author_id {
        builder.push(" AND p.author_id = ").push_bind(author_id);
    }
}

/// PostgresRepository
///
/// The production implementation of [`Repository`], backed by a `PgPool`.
/// Dynamic filters go through `QueryBuilder` so every value is a bound parameter.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Applies the embedded migrations in `migrations/`.
    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn get_user(&self, id: Uuid) -> RepositoryResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn get_user_by_username(&self, username: &str) -> RepositoryResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE username = $1");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn update_user(&self, id: Uuid, update: ProfileUpdate) -> RepositoryResult<Option<User>> {
        let sql = format!(
            "UPDATE users SET username = $2, first_name = $3, last_name = $4, email = $5 \
             WHERE id = $1 RETURNING {USER_COLUMNS}"
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .bind(update.username)
            .bind(update.first_name)
            .bind(update.last_name)
            .bind(update.email)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(db) if db.is_unique_violation() => RepositoryError::UsernameTaken,
                other => RepositoryError::Database(other),
            })?;
        Ok(user)
    }

    async fn get_category_by_slug(&self, slug: &str) -> RepositoryResult<Option<Category>> {
        let sql = format!("SELECT {CATEGORY_COLUMNS} FROM categories WHERE slug = $1");
        let category = sqlx::query_as::<_, Category>(&sql)
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;
        Ok(category)
    }

    async fn get_category(&self, id: i64) -> RepositoryResult<Option<Category>> {
        let sql = format!("SELECT {CATEGORY_COLUMNS} FROM categories WHERE id = $1");
        let category = sqlx::query_as::<_, Category>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(category)
    }

    async fn list_categories(&self) -> RepositoryResult<Vec<Category>> {
        let sql = format!("SELECT {CATEGORY_COLUMNS} FROM categories ORDER BY title");
        let categories = sqlx::query_as::<_, Category>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(categories)
    }

    async fn count_posts(&self, filter: &PostFilter) -> RepositoryResult<i64> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "SELECT COUNT(*) FROM posts p JOIN categories c ON c.id = p.category_id WHERE TRUE",
        );
        push_post_filter(&mut builder, filter);

        let count = builder
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn list_posts(
        &self,
        filter: &PostFilter,
        limit: i64,
        offset: i64,
    ) -> RepositoryResult<Vec<PostSummary>> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(POST_SUMMARY_SELECT);
        push_post_filter(&mut builder, filter);
        builder
            .push(" ORDER BY p.pub_date DESC, p.id DESC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);

        let posts = builder
            .build_query_as::<PostSummary>()
            .fetch_all(&self.pool)
            .await?;
        Ok(posts)
    }

    async fn get_post(&self, id: i64, filter: &PostFilter) -> RepositoryResult<Option<PostSummary>> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(POST_SUMMARY_SELECT);
        builder.push(" AND p.id = ").push_bind(id);
        push_post_filter(&mut builder, filter);

        let post = builder
            .build_query_as::<PostSummary>()
            .fetch_optional(&self.pool)
            .await?;
        Ok(post)
    }

    async fn create_post(&self, author_id: Uuid, post: NewPost) -> RepositoryResult<Post> {
        let sql = format!(
            "INSERT INTO posts (title, text, pub_date, is_published, author_id, category_id, image, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, NOW()) RETURNING {POST_COLUMNS}"
        );
        let created = sqlx::query_as::<_, Post>(&sql)
            .bind(post.title)
            .bind(post.text)
            .bind(post.pub_date)
            .bind(post.is_published)
            .bind(author_id)
            .bind(post.category_id)
            .bind(post.image)
            .fetch_one(&self.pool)
            .await?;
        Ok(created)
    }

    async fn update_post(&self, id: i64, post: NewPost) -> RepositoryResult<Option<Post>> {
        let sql = format!(
            "UPDATE posts SET title = $2, text = $3, pub_date = $4, is_published = $5, \
             category_id = $6, image = $7 WHERE id = $1 RETURNING {POST_COLUMNS}"
        );
        let updated = sqlx::query_as::<_, Post>(&sql)
            .bind(id)
            .bind(post.title)
            .bind(post.text)
            .bind(post.pub_date)
            .bind(post.is_published)
            .bind(post.category_id)
            .bind(post.image)
            .fetch_optional(&self.pool)
            .await?;
        Ok(updated)
    }

    async fn delete_post(&self, id: i64) -> RepositoryResult<bool> {
        // Comments go with it through ON DELETE CASCADE.
        let result = sqlx::query("DELETE FROM posts WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_comments(&self, post_id: i64) -> RepositoryResult<Vec<Comment>> {
        let comments = sqlx::query_as::<_, Comment>(
            r#"
            SELECT cm.id, cm.post_id, cm.author_id, u.username AS author_username, cm.text, cm.created_at
            FROM comments cm
            JOIN users u ON u.id = cm.author_id
            WHERE cm.post_id = $1
            ORDER BY cm.created_at ASC, cm.id ASC
            "#,
        )
        .bind(post_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(comments)
    }

    async fn get_comment(&self, post_id: i64, comment_id: i64) -> RepositoryResult<Option<Comment>> {
        let comment = sqlx::query_as::<_, Comment>(
            r#"
            SELECT cm.id, cm.post_id, cm.author_id, u.username AS author_username, cm.text, cm.created_at
            FROM comments cm
            JOIN users u ON u.id = cm.author_id
            WHERE cm.id = $1 AND cm.post_id = $2
            "#,
        )
        .bind(comment_id)
        .bind(post_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(comment)
    }

    async fn add_comment(&self, post_id: i64, author_id: Uuid, text: String) -> RepositoryResult<Comment> {
        // Insert and join the author's username in one round trip.
        let comment = sqlx::query_as::<_, Comment>(
            r#"
            WITH inserted AS (
                INSERT INTO comments (post_id, author_id, text, created_at)
                VALUES ($1, $2, $3, NOW())
                RETURNING id, post_id, author_id, text, created_at
            )
            SELECT i.id, i.post_id, i.author_id, u.username AS author_username, i.text, i.created_at
            FROM inserted i JOIN users u ON u.id = i.author_id
            "#,
        )
        .bind(post_id)
        .bind(author_id)
        .bind(text)
        .fetch_one(&self.pool)
        .await?;
        Ok(comment)
    }

    async fn update_comment(&self, id: i64, text: String) -> RepositoryResult<Option<Comment>> {
        let comment = sqlx::query_as::<_, Comment>(
            r#"
            WITH updated AS (
                UPDATE comments SET text = $2 WHERE id = $1
                RETURNING id, post_id, author_id, text, created_at
            )
            SELECT d.id, d.post_id, d.author_id, u.username AS author_username, d.text, d.created_at
            FROM updated d JOIN users u ON u.id = d.author_id
            "#,
        )
        .bind(id)
        .bind(text)
        .fetch_optional(&self.pool)
        .await?;
        Ok(comment)
    }

    async fn delete_comment(&self, id: i64) -> RepositoryResult<bool> {
        let result = sqlx::query("DELETE FROM comments WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

// --- In-memory ---

#[derive(Debug, Default)]
struct Tables {
    users: BTreeMap<Uuid, User>,
    categories: BTreeMap<i64, Category>,
    posts: BTreeMap<i64, Post>,
    comments: BTreeMap<i64, Comment>,
    next_category_id: i64,
    next_post_id: i64,
    next_comment_id: i64,
}

impl Tables {
    fn summarize(&self, post: &Post) -> Option<PostSummary> {
        let author = self.users.get(&post.author_id)?;
        let category = self.categories.get(&post.category_id)?;
        let comment_count = self
            .comments
            .values()
            .filter(|c| c.post_id == post.id)
            .count() as i64;

        Some(PostSummary {
            id: post.id,
            title: post.title.clone(),
            text: post.text.clone(),
            pub_date: post.pub_date,
            is_published: post.is_published,
            author_id: post.author_id,
            author_username: author.username.clone(),
            category_id: post.category_id,
            category_slug: category.slug.clone(),
            category_title: category.title.clone(),
            category_is_published: category.is_published,
            image: post.image.clone(),
            created_at: post.created_at,
            comment_count,
        })
    }

    fn matching(&self, filter: &PostFilter) -> Vec<PostSummary> {
        let mut posts: Vec<PostSummary> = self
            .posts
            .values()
            .filter_map(|p| self.summarize(p))
            .filter(|p| filter.matches(p))
            .collect();
        posts.sort_by(|a, b| b.pub_date.cmp(&a.pub_date).then(b.id.cmp(&a.id)));
        posts
    }

    fn with_username(&self, mut comment: Comment) -> Comment {
        if let Some(author) = self.users.get(&comment.author_id) {
            comment.author_username = author.username.clone();
        }
        comment
    }
}

/// InMemoryRepository
///
/// A [`Repository`] over process memory. Used by the test suites and for running
/// the service without a database.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    tables: RwLock<Tables>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RepositoryResult<RwLockReadGuard<'_, Tables>> {
        self.tables.read().map_err(|_| RepositoryError::Poisoned)
    }

    fn write(&self) -> RepositoryResult<RwLockWriteGuard<'_, Tables>> {
        self.tables.write().map_err(|_| RepositoryError::Poisoned)
    }

    /// Adds (or replaces) a user. Users are provisioned by the identity layer, not by this service.
    pub fn insert_user(&self, user: User) -> RepositoryResult<User> {
        self.write()?.users.insert(user.id, user.clone());
        Ok(user)
    }

    /// Adds a category. An id of 0 is replaced by the next free id.
    pub fn insert_category(&self, mut category: Category) -> RepositoryResult<Category> {
        let mut tables = self.write()?;
        if category.id == 0 {
            tables.next_category_id += 1;
            category.id = tables.next_category_id;
        } else {
            tables.next_category_id = tables.next_category_id.max(category.id);
        }
        tables.categories.insert(category.id, category.clone());
        Ok(category)
    }

    /// Raw access for assertions.
    pub fn post(&self, id: i64) -> RepositoryResult<Option<Post>> {
        Ok(self.read()?.posts.get(&id).cloned())
    }

    /// Raw access for assertions.
    pub fn comment(&self, id: i64) -> RepositoryResult<Option<Comment>> {
        Ok(self.read()?.comments.get(&id).cloned())
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn get_user(&self, id: Uuid) -> RepositoryResult<Option<User>> {
        Ok(self.read()?.users.get(&id).cloned())
    }

    async fn get_user_by_username(&self, username: &str) -> RepositoryResult<Option<User>> {
        Ok(self
            .read()?
            .users
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn update_user(&self, id: Uuid, update: ProfileUpdate) -> RepositoryResult<Option<User>> {
        let mut tables = self.write()?;
        if tables
            .users
            .values()
            .any(|other| other.id != id && other.username == update.username)
        {
            return Err(RepositoryError::UsernameTaken);
        }
        let Some(user) = tables.users.get_mut(&id) else {
            return Ok(None);
        };
        user.username = update.username;
        user.first_name = update.first_name;
        user.last_name = update.last_name;
        user.email = update.email;
        Ok(Some(user.clone()))
    }

    async fn get_category_by_slug(&self, slug: &str) -> RepositoryResult<Option<Category>> {
        Ok(self
            .read()?
            .categories
            .values()
            .find(|c| c.slug == slug)
            .cloned())
    }

    async fn get_category(&self, id: i64) -> RepositoryResult<Option<Category>> {
        Ok(self.read()?.categories.get(&id).cloned())
    }

    async fn list_categories(&self) -> RepositoryResult<Vec<Category>> {
        let mut categories: Vec<Category> = self.read()?.categories.values().cloned().collect();
        categories.sort_by(|a, b| a.title.cmp(&b.title));
        Ok(categories)
    }

    async fn count_posts(&self, filter: &PostFilter) -> RepositoryResult<i64> {
        Ok(self.read()?.matching(filter).len() as i64)
    }

    async fn list_posts(
        &self,
        filter: &PostFilter,
        limit: i64,
        offset: i64,
    ) -> RepositoryResult<Vec<PostSummary>> {
        Ok(self
            .read()?
            .matching(filter)
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn get_post(&self, id: i64, filter: &PostFilter) -> RepositoryResult<Option<PostSummary>> {
        let tables = self.read()?;
        Ok(tables
            .posts
            .get(&id)
            .and_then(|p| tables.summarize(p))
            .filter(|p| filter.matches(p)))
    }

    async fn create_post(&self, author_id: Uuid, post: NewPost) -> RepositoryResult<Post> {
        let mut tables = self.write()?;
        tables.next_post_id += 1;
        let created = Post {
            id: tables.next_post_id,
            title: post.title,
            text: post.text,
            pub_date: post.pub_date,
            is_published: post.is_published,
            author_id,
            category_id: post.category_id,
            image: post.image,
            created_at: Utc::now(),
        };
        tables.posts.insert(created.id, created.clone());
        Ok(created)
    }

    async fn update_post(&self, id: i64, post: NewPost) -> RepositoryResult<Option<Post>> {
        let mut tables = self.write()?;
        let Some(existing) = tables.posts.get_mut(&id) else {
            return Ok(None);
        };
        existing.title = post.title;
        existing.text = post.text;
        existing.pub_date = post.pub_date;
        existing.is_published = post.is_published;
        existing.category_id = post.category_id;
        existing.image = post.image;
        Ok(Some(existing.clone()))
    }

    async fn delete_post(&self, id: i64) -> RepositoryResult<bool> {
        let mut tables = self.write()?;
        let removed = tables.posts.remove(&id).is_some();
        if removed {
            tables.comments.retain(|_, c| c.post_id != id);
        }
        Ok(removed)
    }

    async fn list_comments(&self, post_id: i64) -> RepositoryResult<Vec<Comment>> {
        let tables = self.read()?;
        let mut comments: Vec<Comment> = tables
            .comments
            .values()
            .filter(|c| c.post_id == post_id)
            .cloned()
            .map(|c| tables.with_username(c))
            .collect();
        comments.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(comments)
    }

    async fn get_comment(&self, post_id: i64, comment_id: i64) -> RepositoryResult<Option<Comment>> {
        let tables = self.read()?;
        Ok(tables
            .comments
            .get(&comment_id)
            .filter(|c| c.post_id == post_id)
            .cloned()
            .map(|c| tables.with_username(c)))
    }

    async fn add_comment(&self, post_id: i64, author_id: Uuid, text: String) -> RepositoryResult<Comment> {
        let mut tables = self.write()?;
        tables.next_comment_id += 1;
        let comment = Comment {
            id: tables.next_comment_id,
            post_id,
            author_id,
            author_username: String::new(),
            text,
            created_at: Utc::now(),
        };
        let comment = tables.with_username(comment);
        tables.comments.insert(comment.id, comment.clone());
        Ok(comment)
    }

    async fn update_comment(&self, id: i64, text: String) -> RepositoryResult<Option<Comment>> {
        let mut tables = self.write()?;
        let Some(comment) = tables.comments.get_mut(&id) else {
            return Ok(None);
        };
        comment.text = text;
        let comment = comment.clone();
        Ok(Some(tables.with_username(comment)))
    }

    async fn delete_comment(&self, id: i64) -> RepositoryResult<bool> {
        Ok(self.write()?.comments.remove(&id).is_some())
    }
}
