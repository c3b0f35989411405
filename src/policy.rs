//! Visibility and ownership rules.
//!
//! Every handler decides what a viewer may see or change through these predicates.
//! The query-side counterpart of [`is_publicly_visible`] is
//! [`PostFilter::visible`](crate::repository::PostFilter::visible); both repository
//! implementations must agree with it.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{auth::AuthUser, models::PostSummary};

/// Viewer
///
/// The identity behind the current request. Anonymous requests are first-class:
/// public pages are served to them with the generic visibility rules.
#[derive(Debug, Clone, PartialEq)]
pub enum Viewer {
    Anonymous,
    User(AuthUser),
}

impl Viewer {
    pub fn id(&self) -> Option<Uuid> {
        match self {
            Viewer::Anonymous => None,
            Viewer::User(user) => Some(user.id),
        }
    }

    /// True when this viewer is the given user.
    pub fn is(&self, user_id: Uuid) -> bool {
        self.id() == Some(user_id)
    }
}

impl From<AuthUser> for Viewer {
    fn from(user: AuthUser) -> Self {
        Viewer::User(user)
    }
}

/// Authorization
///
/// Outcome of the ownership check guarding every edit/delete route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authorization {
    Authorized,
    Unauthorized,
}

impl Authorization {
    pub fn is_authorized(self) -> bool {
        self == Authorization::Authorized
    }
}

/// A post is visible to a generic viewer iff it is published, its publication
/// date has passed and its category is published.
pub fn is_publicly_visible(
    is_published: bool,
    pub_date: DateTime<Utc>,
    category_is_published: bool,
    now: DateTime<Utc>,
) -> bool {
    is_published && pub_date <= now && category_is_published
}

/// Whether `viewer` may open the detail page of `post`.
/// Authors always see their own posts, drafts and scheduled ones included.
pub fn can_view(viewer: &Viewer, post: &PostSummary, now: DateTime<Utc>) -> bool {
    viewer.is(post.author_id)
        || is_publicly_visible(
            post.is_published,
            post.pub_date,
            post.category_is_published,
            now,
        )
}

/// Mutations on posts and comments are reserved to their author.
pub fn authorize(user: &AuthUser, author_id: Uuid) -> Authorization {
    if user.id == author_id {
        Authorization::Authorized
    } else {
        Authorization::Unauthorized
    }
}
