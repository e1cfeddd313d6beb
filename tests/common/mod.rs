#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use reimburse::{
    create_router,
    models::{NewUser, Role, User},
    repository::{MemoryRepository, Repository},
    utils::{hash_password, TokenKeys},
    AppState,
};

pub const SECRET: &str = "integration-test-secret";
pub const PASSWORD: &str = "correct-horse";

pub struct TestApp {
    pub router: Router,
    pub repo: Arc<MemoryRepository>,
    pub tokens: TokenKeys,
    pub upload_dir: TempDir,
}

pub struct Session {
    pub user: User,
    pub token: String,
}

impl TestApp {
    pub fn new() -> Self {
        let upload_dir = tempfile::tempdir().expect("temp dir");
        let repo = Arc::new(MemoryRepository::new());
        let tokens = TokenKeys::new(SECRET);
        let state = AppState::new(
            repo.clone() as Arc<dyn Repository>,
            tokens.clone(),
            upload_dir.path().to_path_buf(),
        );

        Self {
            router: create_router(state),
            repo,
            tokens,
            upload_dir,
        }
    }

    /// Inserts a user directly and mints an access token for them.
    pub async fn user(&self, email: &str, role: Role) -> Session {
        let user = self
            .repo
            .insert_user(NewUser {
                name: format!("{} user", role),
                email: email.to_string(),
                password: hash_password(PASSWORD).expect("hash"),
                department: Some("Finance".to_string()),
                role,
            })
            .await
            .expect("insert user");
        let token = self.tokens.generate_token(user.id, role).expect("token");
        Session { user, token }
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, body)
    }

    pub async fn query(&self, procedure: &str, params: &str, token: Option<&str>) -> (StatusCode, Value) {
        let uri = if params.is_empty() {
            format!("/api/trpc/{}", procedure)
        } else {
            format!("/api/trpc/{}?{}", procedure, params)
        };
        let mut builder = Request::builder().method(Method::GET).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        self.send(builder.body(Body::empty()).expect("request")).await
    }

    pub async fn mutate(&self, procedure: &str, input: Value, token: Option<&str>) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri(format!("/api/trpc/{}", procedure))
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        self.send(builder.body(Body::from(input.to_string())).expect("request"))
            .await
    }

    pub async fn create_expense(&self, session: &Session, title: &str) -> Value {
        let (status, body) = self
            .mutate(
                "expense.create",
                json!({ "title": title, "amount": "4200.00", "category": "TRAVEL" }),
                Some(&session.token),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        body
    }
}

pub fn error_code(body: &Value) -> &str {
    body["error"]["code"].as_str().unwrap_or_default()
}
