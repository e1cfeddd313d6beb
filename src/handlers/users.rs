use axum::{extract::State, Json};
use serde::Deserialize;
use uuid::Uuid;

use super::{hash_password, validate, IdInput, Input, Params, SuccessResponse, Validate};
use crate::{
    error::{AppError, AppResult},
    middleware::AuthUser,
    models::{NewUser, Role, UserChanges, UserResponse, UserSummary},
    AppState,
};

#[derive(Debug, Deserialize)]
pub struct CreateUserInput {
    pub name: String,
    pub email: String,
    pub password: String,
    pub department: Option<String>,
    #[serde(default)]
    pub role: Role,
}

impl Validate for CreateUserInput {
    fn validate(&self) -> AppResult<()> {
        validate::required("name", &self.name)?;
        validate::email(&self.email)?;
        validate::password(&self.password)
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserInput {
    pub id: Uuid,
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub department: Option<String>,
    pub role: Option<Role>,
}

impl Validate for UpdateUserInput {
    fn validate(&self) -> AppResult<()> {
        validate_profile_fields(
            self.name.as_deref(),
            self.email.as_deref(),
            self.password.as_deref(),
        )
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateProfileInput {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub department: Option<String>,
}

impl Validate for UpdateProfileInput {
    fn validate(&self) -> AppResult<()> {
        validate_profile_fields(
            self.name.as_deref(),
            self.email.as_deref(),
            self.password.as_deref(),
        )
    }
}

fn validate_profile_fields(
    name: Option<&str>,
    email: Option<&str>,
    password: Option<&str>,
) -> AppResult<()> {
    if let Some(name) = name {
        validate::required("name", name)?;
    }
    if let Some(email) = email {
        validate::email(email)?;
    }
    if let Some(password) = password {
        validate::password(password)?;
    }
    Ok(())
}

async fn changes(
    name: Option<String>,
    email: Option<String>,
    password: Option<String>,
    department: Option<String>,
    role: Option<Role>,
) -> AppResult<UserChanges> {
    let password = match password {
        Some(password) => Some(hash_password(password).await?),
        None => None,
    };

    Ok(UserChanges {
        name: name.map(|name| name.trim().to_string()),
        email,
        password,
        department,
        role,
    })
}

pub async fn list(State(state): State<AppState>) -> AppResult<Json<Vec<UserResponse>>> {
    let users = state.repo.list_users().await?;
    Ok(Json(users.into_iter().map(UserResponse::from).collect()))
}

pub async fn get_by_id(
    State(state): State<AppState>,
    Params(input): Params<IdInput>,
) -> AppResult<Json<UserResponse>> {
    let user = state
        .repo
        .find_user(input.id)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))?;
    Ok(Json(UserResponse::from(user)))
}

pub async fn create(
    State(state): State<AppState>,
    auth: AuthUser,
    Input(input): Input<CreateUserInput>,
) -> AppResult<Json<UserSummary>> {
    let password = hash_password(input.password).await?;
    let user = state
        .repo
        .insert_user(NewUser {
            name: input.name.trim().to_string(),
            email: input.email,
            password,
            department: super::non_empty(input.department),
            role: input.role,
        })
        .await?;

    log::info!("admin {} created user {} as {}", auth.id, user.id, user.role);
    Ok(Json(UserSummary::from(&user)))
}

pub async fn update(
    State(state): State<AppState>,
    auth: AuthUser,
    Input(input): Input<UpdateUserInput>,
) -> AppResult<Json<UserSummary>> {
    let changes = changes(
        input.name,
        input.email,
        input.password,
        input.department,
        input.role,
    )
    .await?;

    let user = state
        .repo
        .update_user(input.id, changes)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))?;

    log::info!("admin {} updated user {}", auth.id, user.id);
    Ok(Json(UserSummary::from(&user)))
}

pub async fn delete(
    State(state): State<AppState>,
    auth: AuthUser,
    Input(input): Input<IdInput>,
) -> AppResult<Json<SuccessResponse>> {
    if state.repo.find_user(input.id).await?.is_none() {
        return Err(AppError::not_found("User not found"));
    }
    if input.id == auth.id {
        return Err(AppError::bad_request("You cannot delete your own account"));
    }

    if !state.repo.delete_user(input.id).await? {
        return Err(AppError::not_found("User not found"));
    }

    log::info!("admin {} deleted user {}", auth.id, input.id);
    Ok(SuccessResponse::ok())
}

pub async fn update_profile(
    State(state): State<AppState>,
    auth: AuthUser,
    Input(input): Input<UpdateProfileInput>,
) -> AppResult<Json<UserSummary>> {
    let changes = changes(
        input.name,
        input.email,
        input.password,
        input.department,
        None,
    )
    .await?;

    let user = state
        .repo
        .update_user(auth.id, changes)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))?;
    Ok(Json(UserSummary::from(&user)))
}
