pub mod auth;

pub use auth::{authenticate, require_admin, require_approver, AuthUser};
