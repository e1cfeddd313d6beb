mod common;

use axum::http::StatusCode;
use serde_json::json;

use common::{error_code, TestApp, PASSWORD};
use reimburse::models::Role;

#[tokio::test]
async fn health_reports_ok() {
    let app = TestApp::new();
    let request = axum::http::Request::get("/health")
        .body(axum::body::Body::empty())
        .unwrap();
    let (status, body) = app.send(request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "ok" }));
}

#[tokio::test]
async fn register_creates_plain_user_and_rejects_duplicates() {
    let app = TestApp::new();
    let input = json!({
        "name": "Sato Hanako",
        "email": "hanako@example.com",
        "password": PASSWORD,
        "department": "Sales",
    });

    let (status, body) = app.mutate("auth.register", input.clone(), None).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["user"]["role"], "USER");
    assert_eq!(body["user"]["email"], "hanako@example.com");
    assert!(body["user"].get("passwordHash").is_none());

    let token = body["token"].as_str().unwrap().to_string();
    let (status, me) = app.query("auth.me", "", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["name"], "Sato Hanako");

    let (status, body) = app.mutate("auth.register", input, None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error_code(&body), "CONFLICT");
}

#[tokio::test]
async fn register_validates_input() {
    let app = TestApp::new();

    let (status, body) = app
        .mutate(
            "auth.register",
            json!({ "name": "A", "email": "not-an-email", "password": PASSWORD }),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&body), "BAD_REQUEST");

    let (status, _) = app
        .mutate(
            "auth.register",
            json!({ "name": "A", "email": "a@example.com", "password": "short" }),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn login_distinguishes_unknown_user_from_bad_password() {
    let app = TestApp::new();
    app.user("taro@example.com", Role::User).await;

    let (status, _) = app
        .mutate(
            "auth.login",
            json!({ "email": "nobody@example.com", "password": PASSWORD }),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = app
        .mutate(
            "auth.login",
            json!({ "email": "taro@example.com", "password": "wrong-password" }),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(&body), "UNAUTHORIZED");

    let (status, body) = app
        .mutate(
            "auth.login",
            json!({ "email": "taro@example.com", "password": PASSWORD }),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["token"].is_string());
    assert!(body["refreshToken"].is_string());
}

#[tokio::test]
async fn refresh_tokens_rotate_and_die_on_logout() {
    let app = TestApp::new();
    app.user("jiro@example.com", Role::User).await;
    let login = json!({ "email": "jiro@example.com", "password": PASSWORD });

    let (_, first) = app.mutate("auth.login", login.clone(), None).await;
    let first_refresh = first["refreshToken"].as_str().unwrap().to_string();

    let (status, rotated) = app
        .mutate("auth.refreshToken", json!({ "refreshToken": first_refresh }), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let second_refresh = rotated["refreshToken"].as_str().unwrap().to_string();
    assert_ne!(first_refresh, second_refresh);

    let (status, _) = app
        .mutate("auth.refreshToken", json!({ "refreshToken": first_refresh }), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // A second login replaces the stored session.
    let (_, relogin) = app.mutate("auth.login", login, None).await;
    let (status, _) = app
        .mutate("auth.refreshToken", json!({ "refreshToken": second_refresh }), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let access = relogin["token"].as_str().unwrap();
    let latest_refresh = relogin["refreshToken"].as_str().unwrap();
    let (status, body) = app.mutate("auth.logout", json!({}), Some(access)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let (status, _) = app
        .mutate("auth.refreshToken", json!({ "refreshToken": latest_refresh }), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn guards_reject_missing_bad_and_underprivileged_callers() {
    let app = TestApp::new();
    let user = app.user("user@example.com", Role::User).await;
    let approver = app.user("approver@example.com", Role::Approver).await;
    let admin = app.user("admin@example.com", Role::Admin).await;

    let (status, body) = app.query("auth.me", "", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(&body), "UNAUTHORIZED");

    let (status, _) = app.query("auth.me", "", Some("not.a.token")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let refresh = app.tokens.generate_refresh_token(user.user.id).unwrap();
    let (status, _) = app.query("auth.me", "", Some(&refresh)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = app.query("user.getAll", "", Some(&user.token)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(error_code(&body), "FORBIDDEN");

    let (status, _) = app.query("expense.getAll", "", Some(&user.token)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app.query("user.getAll", "", Some(&approver.token)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app.query("expense.getAll", "", Some(&approver.token)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app.query("user.getAll", "", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, users) = app.query("user.getAll", "", Some(&admin.token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(users.as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn categories_are_public() {
    let app = TestApp::new();
    let (status, body) = app.query("expense.getCategories", "", None).await;

    assert_eq!(status, StatusCode::OK);
    let categories = body.as_array().unwrap();
    assert_eq!(categories.len(), 6);
    assert_eq!(categories[0]["value"], "TRAVEL");
    assert!(categories[0]["label"].is_string());
}

#[tokio::test]
async fn unknown_procedure_is_not_found() {
    let app = TestApp::new();
    let (status, body) = app.query("expense.doesNotExist", "", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error_code(&body), "NOT_FOUND");
}
