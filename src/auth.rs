use axum::{
    extract::{FromRef, FromRequestParts},
    http::{StatusCode, header, request::Parts},
};
use jsonwebtoken::{DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    config::{AppConfig, Env},
    policy::Viewer,
    repository::RepositoryState,
};

/// Header accepted in `Env::Local` in place of a bearer token.
pub const DEV_USER_HEADER: &str = "x-user-id";

/// Claims
///
/// Payload of the bearer tokens issued by the identity provider, signed with
/// `AppConfig::jwt_secret`.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the id of a row in `users`.
    pub sub: Uuid,
    /// Expiry (seconds since the epoch). Expired tokens are a 401.
    pub exp: usize,
    /// Issued at.
    pub iat: usize,
}

/// AuthUser
///
/// A resolved, authenticated identity. Handlers behind the authenticated router
/// take it as an argument and compare `id` against post and comment authors.
///
/// As an extractor it rejects the request with 401 when the credentials are
/// missing or invalid. `Viewer` is the lenient counterpart for public pages.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthUser {
    pub id: Uuid,
    pub username: String,
}

/// Resolves the request's credentials.
///
/// The steps are:
/// 1. Dependency resolution: the repository and config come from the state via `FromRef`.
/// 2. Local bypass: in `Env::Local`, a known user id in `x-user-id` wins. An unknown
///    id falls through to the next step.
/// 3. Token validation: `Authorization: Bearer <jwt>`, checked for signature and expiry.
/// 4. User lookup: the subject must still exist.
///
/// `Ok(None)` means the request carries no credentials at all. Malformed or
/// invalid credentials are a 401 rather than a silent downgrade to anonymous,
/// and a failing store is a 500.
async fn resolve<S>(parts: &Parts, state: &S) -> Result<Option<AuthUser>, StatusCode>
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    let repo = RepositoryState::from_ref(state);
    let config = AppConfig::from_ref(state);

    // Local development bypass: a known user id in `x-user-id`.
    if config.env == Env::Local {
        if let Some(user_id) = parts
            .headers
            .get(DEV_USER_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| Uuid::parse_str(value).ok())
        {
            match repo.get_user(user_id).await {
                Ok(Some(user)) => {
                    return Ok(Some(AuthUser {
                        id: user.id,
                        username: user.username,
                    }));
                }
                Ok(None) => tracing::debug!(%user_id, "dev bypass user not found"),
                Err(e) => {
                    tracing::error!(error = %e, "user lookup failed");
                    return Err(StatusCode::INTERNAL_SERVER_ERROR);
                }
            }
        }
    }

    let Some(auth_header) = parts.headers.get(header::AUTHORIZATION) else {
        return Ok(None);
    };

    let token = auth_header
        .to_str()
        .ok()
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let decoding_key = DecodingKey::from_secret(config.jwt_secret.as_bytes());
    let mut validation = Validation::default();
    validation.validate_exp = true;

    let token_data = decode::<Claims>(token, &decoding_key, &validation).map_err(|e| {
        tracing::debug!(error = %e, "rejected bearer token");
        StatusCode::UNAUTHORIZED
    })?;

    // The user may have been removed after the token was issued.
    let user = repo
        .get_user(token_data.claims.sub)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "user lookup failed");
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .ok_or(StatusCode::UNAUTHORIZED)?;

    Ok(Some(AuthUser {
        id: user.id,
        username: user.username,
    }))
}

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        resolve(parts, state).await?.ok_or(StatusCode::UNAUTHORIZED)
    }
}

/// Viewer Extractor Implementation
///
/// Public pages accept anonymous requests, so absent credentials become
/// `Viewer::Anonymous`. Presented credentials go through the same checks as
/// `AuthUser`.
impl<S> FromRequestParts<S> for Viewer
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        Ok(match resolve(parts, state).await? {
            Some(user) => Viewer::User(user),
            None => Viewer::Anonymous,
        })
    }
}
