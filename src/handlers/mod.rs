pub mod auth;
pub mod expenses;
pub mod health;
pub mod upload;
pub mod users;
pub mod validate;

use axum::{
    async_trait,
    extract::{FromRequest, FromRequestParts, Query, Request},
    http::request::Parts,
    Json,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::ExpenseFilter,
    utils::{self, HashedPassword},
};
pub use validate::Validate;

/// JSON body of a mutation, validated before the handler runs.
pub struct Input<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for Input<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| AppError::bad_request(rejection.body_text()))?;
        value.validate()?;
        Ok(Input(value))
    }
}

/// Query-string input of a query procedure, validated before the handler runs.
pub struct Params<T>(pub T);

#[async_trait]
impl<S, T> FromRequestParts<S> for Params<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state)
            .await
            .map_err(|rejection| AppError::bad_request(rejection.body_text()))?;
        value.validate()?;
        Ok(Params(value))
    }
}

/// Expense listing filter, parsed and checked from the query string once.
pub struct ListFilter(pub ExpenseFilter);

#[async_trait]
impl<S> FromRequestParts<S> for ListFilter
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(input) = Query::<expenses::ListExpensesInput>::from_request_parts(parts, state)
            .await
            .map_err(|rejection| AppError::bad_request(rejection.body_text()))?;
        Ok(ListFilter(input.to_filter()?))
    }
}

#[derive(Debug, Deserialize)]
pub struct IdInput {
    pub id: Uuid,
}

impl Validate for IdInput {
    fn validate(&self) -> AppResult<()> {
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

impl SuccessResponse {
    pub fn ok() -> Json<Self> {
        Json(Self { success: true })
    }
}

pub(crate) fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

/// bcrypt on the blocking pool.
pub(crate) async fn hash_password(password: String) -> AppResult<HashedPassword> {
    let hashed = tokio::task::spawn_blocking(move || utils::hash_password(&password))
        .await
        .map_err(AppError::internal)??;
    Ok(hashed)
}

pub(crate) async fn verify_password(password: String, hash: String) -> AppResult<bool> {
    tokio::task::spawn_blocking(move || utils::verify_password(&password, &hash))
        .await
        .map_err(AppError::internal)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn password_hashing_runs_off_the_executor() {
        let hashed = hash_password("correct-horse".to_string()).await.unwrap();
        assert!(hashed.hash.starts_with("$2b$10$"));

        assert!(verify_password("correct-horse".to_string(), hashed.hash.clone())
            .await
            .unwrap());
        assert!(!verify_password("wrong-horse".to_string(), hashed.hash)
            .await
            .unwrap());
    }

    #[test]
    fn blank_text_becomes_none() {
        assert_eq!(non_empty(Some("  ".to_string())), None);
        assert_eq!(non_empty(Some(String::new())), None);
        assert_eq!(non_empty(Some("x".to_string())), Some("x".to_string()));
    }
}
