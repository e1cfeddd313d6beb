use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use super::{hash_password, non_empty, validate, verify_password, Input, SuccessResponse, Validate};
use crate::{
    error::{AppError, AppResult},
    middleware::AuthUser,
    models::{NewUser, Role, User, UserSummary},
    AppState,
};

#[derive(Debug, Deserialize)]
pub struct RegisterInput {
    pub name: String,
    pub email: String,
    pub password: String,
    pub department: Option<String>,
}

impl Validate for RegisterInput {
    fn validate(&self) -> AppResult<()> {
        validate::required("name", &self.name)?;
        validate::email(&self.email)?;
        validate::password(&self.password)
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginInput {
    pub email: String,
    pub password: String,
}

impl Validate for LoginInput {
    fn validate(&self) -> AppResult<()> {
        validate::email(&self.email)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshInput {
    pub refresh_token: String,
}

impl Validate for RefreshInput {
    fn validate(&self) -> AppResult<()> {
        validate::required("refreshToken", &self.refresh_token)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub token: String,
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub user: UserSummary,
    #[serde(flatten)]
    pub tokens: TokenPair,
}

/// Mints a fresh pair and stores the refresh half, replacing any earlier
/// session of the same user.
async fn issue_tokens(state: &AppState, user: &User) -> AppResult<TokenPair> {
    let token = state
        .tokens
        .generate_token(user.id, user.role)
        .map_err(AppError::internal)?;
    let refresh_token = state
        .tokens
        .generate_refresh_token(user.id)
        .map_err(AppError::internal)?;

    state
        .repo
        .set_refresh_token(user.id, Some(&refresh_token))
        .await?;

    Ok(TokenPair {
        token,
        refresh_token,
    })
}

pub async fn register(
    State(state): State<AppState>,
    Input(input): Input<RegisterInput>,
) -> AppResult<Json<AuthResponse>> {
    let password = hash_password(input.password).await?;
    let user = state
        .repo
        .insert_user(NewUser {
            name: input.name.trim().to_string(),
            email: input.email,
            password,
            department: non_empty(input.department),
            role: Role::User,
        })
        .await?;

    let tokens = issue_tokens(&state, &user).await?;
    log::info!("registered user {}", user.id);

    Ok(Json(AuthResponse {
        user: UserSummary::from(&user),
        tokens,
    }))
}

pub async fn login(
    State(state): State<AppState>,
    Input(input): Input<LoginInput>,
) -> AppResult<Json<AuthResponse>> {
    let user = state
        .repo
        .find_user_by_email(&input.email)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))?;

    if !verify_password(input.password, user.password_hash.clone()).await? {
        log::warn!("failed login for user {}", user.id);
        return Err(AppError::unauthorized("Incorrect email or password"));
    }

    let tokens = issue_tokens(&state, &user).await?;
    log::info!("user {} logged in", user.id);

    Ok(Json(AuthResponse {
        user: UserSummary::from(&user),
        tokens,
    }))
}

pub async fn refresh_token(
    State(state): State<AppState>,
    Input(input): Input<RefreshInput>,
) -> AppResult<Json<TokenPair>> {
    let invalid = || AppError::unauthorized("Invalid refresh token");

    let claims = state
        .tokens
        .verify_refresh_token(&input.refresh_token)
        .map_err(|err| {
            log::warn!("refresh token rejected: {}", err);
            invalid()
        })?;

    let user = state.repo.find_user(claims.sub).await?.ok_or_else(invalid)?;
    if user.refresh_token.as_deref() != Some(input.refresh_token.as_str()) {
        log::warn!("stale refresh token presented for user {}", user.id);
        return Err(invalid());
    }

    Ok(Json(issue_tokens(&state, &user).await?))
}

pub async fn logout(
    State(state): State<AppState>,
    auth: AuthUser,
) -> AppResult<Json<SuccessResponse>> {
    state.repo.set_refresh_token(auth.id, None).await?;
    log::info!("user {} logged out", auth.id);
    Ok(SuccessResponse::ok())
}

pub async fn me(State(state): State<AppState>, auth: AuthUser) -> AppResult<Json<UserSummary>> {
    let user = state
        .repo
        .find_user(auth.id)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))?;
    Ok(Json(UserSummary::from(&user)))
}
