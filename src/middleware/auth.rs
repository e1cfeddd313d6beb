use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::Role,
    AppState,
};

/// Identity resolved from a verified access token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser {
    pub id: Uuid,
    pub role: Role,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }

    pub fn can_approve(&self) -> bool {
        self.role.can_approve()
    }
}

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

pub fn ensure_admin(user: Option<&AuthUser>) -> AppResult<AuthUser> {
    let user = user.ok_or_else(|| AppError::unauthorized("Authentication required"))?;
    if !user.is_admin() {
        return Err(AppError::forbidden("Administrator role required"));
    }
    Ok(*user)
}

pub fn ensure_approver(user: Option<&AuthUser>) -> AppResult<AuthUser> {
    let user = user.ok_or_else(|| AppError::unauthorized("Authentication required"))?;
    if !user.can_approve() {
        return Err(AppError::forbidden("Approver or administrator role required"));
    }
    Ok(*user)
}

pub async fn authenticate(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(request.headers())
        .ok_or_else(|| AppError::unauthorized("Authentication required"))?;

    let claims = state.tokens.verify_token(token).map_err(|err| {
        log::warn!("rejected access token for {}: {}", request.uri().path(), err);
        AppError::unauthorized("Invalid or expired token")
    })?;

    request.extensions_mut().insert(AuthUser {
        id: claims.sub,
        role: claims.role,
    });
    Ok(next.run(request).await)
}

pub async fn require_admin(request: Request, next: Next) -> Result<Response, AppError> {
    let user = ensure_admin(request.extensions().get::<AuthUser>()).map_err(|err| {
        log::warn!("admin check failed on {}: {}", request.uri().path(), err);
        err
    })?;
    log::debug!("admin {} calling {}", user.id, request.uri().path());
    Ok(next.run(request).await)
}

pub async fn require_approver(request: Request, next: Next) -> Result<Response, AppError> {
    ensure_approver(request.extensions().get::<AuthUser>()).map_err(|err| {
        log::warn!("approver check failed on {}: {}", request.uri().path(), err);
        err
    })?;
    Ok(next.run(request).await)
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .copied()
            .ok_or_else(|| AppError::unauthorized("Authentication required"))
    }
}
