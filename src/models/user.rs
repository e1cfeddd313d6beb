use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;
use chrono::{DateTime, Utc};

use super::Role;
use crate::utils::HashedPassword;

#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub salt: String,
    pub department: Option<String>,
    pub role: Role,
    pub refresh_token: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password: HashedPassword,
    pub department: Option<String>,
    pub role: Role,
}

/// Partial update; `None` leaves the column untouched.
#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<HashedPassword>,
    pub department: Option<String>,
    pub role: Option<Role>,
}

/// Public view of a user embedded in other payloads.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub department: Option<String>,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            role: user.role,
            department: user.department.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub department: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            role: user.role,
            department: user.department,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_response_hides_credentials() {
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            name: "Jiro".to_string(),
            email: "jiro@example.com".to_string(),
            password_hash: "$2b$10$secret".to_string(),
            salt: "$2b$10$salt".to_string(),
            department: Some("Sales".to_string()),
            role: Role::User,
            refresh_token: Some("refresh".to_string()),
            created_at: now,
            updated_at: now,
        };

        let json = serde_json::to_value(UserResponse::from(user)).unwrap();
        assert_eq!(json["email"], "jiro@example.com");
        assert_eq!(json["role"], "USER");
        assert!(json.get("passwordHash").is_none());
        assert!(json.get("salt").is_none());
        assert!(json.get("refreshToken").is_none());
        assert!(json.get("createdAt").is_some());
    }
}
