//! Persistence seam. Handlers only talk to [`Repository`]; multi-table
//! writes are single trait methods so each implementation can make them
//! atomic.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    Approval, ApprovalEntry, Comment, CommentEntry, DecisionOutcome, Expense, ExpenseChanges,
    ExpenseFilter, ExpensePage, ExpenseRemoval, NewComment, NewDecision, NewExpense, NewUser,
    User, UserChanges,
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryRepository;
pub use postgres::PgRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("{0}")]
    Conflict(String),
}

pub(crate) const DUPLICATE_EMAIL: &str = "Email address is already in use";

#[async_trait]
pub trait Repository: Send + Sync {
    async fn find_user(&self, id: Uuid) -> Result<Option<User>, RepositoryError>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError>;
    async fn list_users(&self) -> Result<Vec<User>, RepositoryError>;
    /// Fails with [`RepositoryError::Conflict`] when the email is taken.
    async fn insert_user(&self, user: NewUser) -> Result<User, RepositoryError>;
    async fn update_user(
        &self,
        id: Uuid,
        changes: UserChanges,
    ) -> Result<Option<User>, RepositoryError>;
    async fn set_refresh_token(
        &self,
        id: Uuid,
        token: Option<&str>,
    ) -> Result<(), RepositoryError>;
    /// Removes the user with their comments and approvals, plus their
    /// expenses together with everything attached to those expenses.
    async fn delete_user(&self, id: Uuid) -> Result<bool, RepositoryError>;

    async fn list_expenses(&self, filter: &ExpenseFilter) -> Result<ExpensePage, RepositoryError>;
    async fn find_expense(&self, id: Uuid) -> Result<Option<Expense>, RepositoryError>;
    async fn insert_expense(&self, expense: NewExpense) -> Result<Expense, RepositoryError>;
    /// Applies `changes` only while the expense is still pending; `None`
    /// means no pending expense with that id exists.
    async fn update_pending_expense(
        &self,
        id: Uuid,
        changes: ExpenseChanges,
    ) -> Result<Option<Expense>, RepositoryError>;
    /// Removes comments, approvals and the expense in one unit. With
    /// `pending_only`, the status is re-checked under the same lock and a
    /// decided expense is left alone.
    async fn delete_expense(
        &self,
        id: Uuid,
        pending_only: bool,
    ) -> Result<ExpenseRemoval, RepositoryError>;

    /// Flips the status, appends the approval and the optional comment in
    /// one unit. Only a pending expense can be decided.
    async fn record_decision(
        &self,
        decision: NewDecision,
    ) -> Result<DecisionOutcome, RepositoryError>;
    async fn find_approval(
        &self,
        expense_id: Uuid,
        approver_id: Uuid,
    ) -> Result<Option<Approval>, RepositoryError>;
    async fn list_approvals(&self, expense_id: Uuid)
        -> Result<Vec<ApprovalEntry>, RepositoryError>;

    async fn insert_comment(&self, comment: NewComment) -> Result<Comment, RepositoryError>;
    async fn find_comment(&self, id: Uuid) -> Result<Option<Comment>, RepositoryError>;
    async fn delete_comment(&self, id: Uuid) -> Result<Option<Comment>, RepositoryError>;
    async fn list_comments(&self, expense_id: Uuid) -> Result<Vec<CommentEntry>, RepositoryError>;
}
