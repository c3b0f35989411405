/// Router Module Index
///
/// Routes are split by access level; the authenticated router is wrapped in the
/// `AuthUser` guard in `create_router`, the public one is not.

/// Pages anyone may request. Handlers still resolve the optional viewer to decide
/// what drafts and scheduled posts are shown.
pub mod public;

/// Pages and endpoints that require a signed-in user.
pub mod authenticated;
