pub mod config;
pub mod database;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod repository;
pub mod seed;
pub mod utils;

use std::{path::PathBuf, sync::Arc};

use axum::{
    extract::DefaultBodyLimit,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

use crate::{
    error::AppError,
    handlers::{auth, expenses, health, upload, users},
    middleware::{authenticate, require_admin, require_approver},
    repository::Repository,
    utils::TokenKeys,
};

/// Shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn Repository>,
    pub tokens: Arc<TokenKeys>,
    pub upload_dir: PathBuf,
}

impl AppState {
    pub fn new(repo: Arc<dyn Repository>, tokens: TokenKeys, upload_dir: PathBuf) -> Self {
        Self {
            repo,
            tokens: Arc::new(tokens),
            upload_dir,
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    let public = Router::new()
        .route("/api/trpc/auth.register", post(auth::register))
        .route("/api/trpc/auth.login", post(auth::login))
        .route("/api/trpc/auth.refreshToken", post(auth::refresh_token))
        .route("/api/trpc/expense.getCategories", get(expenses::get_categories));

    let protected = Router::new()
        .route("/api/trpc/auth.logout", post(auth::logout))
        .route("/api/trpc/auth.me", get(auth::me))
        .route("/api/trpc/user.updateProfile", post(users::update_profile))
        .route("/api/trpc/expense.getMyExpenses", get(expenses::get_my_expenses))
        .route("/api/trpc/expense.getById", get(expenses::get_by_id))
        .route("/api/trpc/expense.create", post(expenses::create))
        .route("/api/trpc/expense.update", post(expenses::update))
        .route("/api/trpc/expense.delete", post(expenses::delete))
        .route("/api/trpc/expense.addComment", post(expenses::add_comment))
        .route("/api/trpc/expense.deleteComment", post(expenses::delete_comment))
        .route_layer(from_fn_with_state(state.clone(), authenticate));

    let approver = Router::new()
        .route("/api/trpc/expense.getAll", get(expenses::get_all))
        .route("/api/trpc/expense.updateStatus", post(expenses::update_status))
        .route_layer(from_fn(require_approver))
        .route_layer(from_fn_with_state(state.clone(), authenticate));

    let admin = Router::new()
        .route("/api/trpc/user.getAll", get(users::list))
        .route("/api/trpc/user.getById", get(users::get_by_id))
        .route("/api/trpc/user.create", post(users::create))
        .route("/api/trpc/user.update", post(users::update))
        .route("/api/trpc/user.delete", post(users::delete))
        .route_layer(from_fn(require_admin))
        .route_layer(from_fn_with_state(state.clone(), authenticate));

    // Multipart framing needs some headroom over the file size cap.
    let uploads = Router::new()
        .route("/api/upload", post(upload::upload_file))
        .layer(DefaultBodyLimit::max(upload::MAX_UPLOAD_BYTES + 64 * 1024));

    Router::new()
        .merge(public)
        .merge(protected)
        .merge(approver)
        .merge(admin)
        .merge(uploads)
        .route("/health", get(health::health))
        .nest_service("/uploads", ServeDir::new(&state.upload_dir))
        .fallback(|| async { AppError::not_found("No such procedure") })
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}
