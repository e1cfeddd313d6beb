use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use super::{ParseEnumError, UserSummary};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExpenseStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl ExpenseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExpenseStatus::Pending => "PENDING",
            ExpenseStatus::Approved => "APPROVED",
            ExpenseStatus::Rejected => "REJECTED",
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, ExpenseStatus::Pending)
    }
}

impl FromStr for ExpenseStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(ExpenseStatus::Pending),
            "APPROVED" => Ok(ExpenseStatus::Approved),
            "REJECTED" => Ok(ExpenseStatus::Rejected),
            other => Err(ParseEnumError::new("status", other)),
        }
    }
}

impl fmt::Display for ExpenseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

text_column!(ExpenseStatus);

/// The outcome an approver records; the only two statuses an expense can
/// move to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Decision {
    Approved,
    Rejected,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        self.status().as_str()
    }

    pub fn status(&self) -> ExpenseStatus {
        match self {
            Decision::Approved => ExpenseStatus::Approved,
            Decision::Rejected => ExpenseStatus::Rejected,
        }
    }
}

impl FromStr for Decision {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "APPROVED" => Ok(Decision::Approved),
            "REJECTED" => Ok(Decision::Rejected),
            other => Err(ParseEnumError::new("decision", other)),
        }
    }
}

text_column!(Decision);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExpenseCategory {
    Travel,
    Accommodation,
    Meals,
    Supplies,
    Entertainment,
    Other,
}

impl ExpenseCategory {
    pub const ALL: [ExpenseCategory; 6] = [
        ExpenseCategory::Travel,
        ExpenseCategory::Accommodation,
        ExpenseCategory::Meals,
        ExpenseCategory::Supplies,
        ExpenseCategory::Entertainment,
        ExpenseCategory::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExpenseCategory::Travel => "TRAVEL",
            ExpenseCategory::Accommodation => "ACCOMMODATION",
            ExpenseCategory::Meals => "MEALS",
            ExpenseCategory::Supplies => "SUPPLIES",
            ExpenseCategory::Entertainment => "ENTERTAINMENT",
            ExpenseCategory::Other => "OTHER",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ExpenseCategory::Travel => "Transportation",
            ExpenseCategory::Accommodation => "Accommodation",
            ExpenseCategory::Meals => "Meals",
            ExpenseCategory::Supplies => "Office supplies",
            ExpenseCategory::Entertainment => "Client entertainment",
            ExpenseCategory::Other => "Other",
        }
    }
}

impl FromStr for ExpenseCategory {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ExpenseCategory::ALL
            .into_iter()
            .find(|category| category.as_str() == s)
            .ok_or_else(|| ParseEnumError::new("category", s))
    }
}

text_column!(ExpenseCategory);

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Expense {
    pub id: Uuid,
    pub title: String,
    pub amount: Decimal,
    pub description: Option<String>,
    pub category: Option<ExpenseCategory>,
    pub receipt_url: Option<String>,
    pub status: ExpenseStatus,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseWithOwner {
    #[serde(flatten)]
    pub expense: Expense,
    pub user: UserSummary,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseDetail {
    #[serde(flatten)]
    pub expense: Expense,
    pub user: UserSummary,
    pub approvals: Vec<ApprovalEntry>,
    pub comments: Vec<CommentEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExpensePage {
    pub expenses: Vec<ExpenseWithOwner>,
    pub total: i64,
}

#[derive(Debug, Clone)]
pub struct NewExpense {
    pub title: String,
    pub amount: Decimal,
    pub description: Option<String>,
    pub category: Option<ExpenseCategory>,
    pub receipt_url: Option<String>,
    pub user_id: Uuid,
}

#[derive(Debug, Clone, Default)]
pub struct ExpenseChanges {
    pub title: Option<String>,
    pub amount: Option<Decimal>,
    pub description: Option<String>,
    pub category: Option<ExpenseCategory>,
    pub receipt_url: Option<String>,
}

/// Listing criteria. Created-at bounds are `[created_from, created_before)`.
#[derive(Debug, Clone)]
pub struct ExpenseFilter {
    pub user_id: Option<Uuid>,
    pub status: Option<ExpenseStatus>,
    pub category: Option<ExpenseCategory>,
    pub created_from: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
    pub limit: i64,
    pub offset: i64,
}

impl Default for ExpenseFilter {
    fn default() -> Self {
        Self {
            user_id: None,
            status: None,
            category: None,
            created_from: None,
            created_before: None,
            limit: 10,
            offset: 0,
        }
    }
}

impl ExpenseFilter {
    pub fn matches(&self, expense: &Expense) -> bool {
        self.user_id.map_or(true, |id| expense.user_id == id)
            && self.status.map_or(true, |status| expense.status == status)
            && self.category.map_or(true, |category| expense.category == Some(category))
            && self.created_from.map_or(true, |from| expense.created_at >= from)
            && self.created_before.map_or(true, |before| expense.created_at < before)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Approval {
    pub id: Uuid,
    pub status: Decision,
    pub comment: Option<String>,
    pub expense_id: Uuid,
    pub approver_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalEntry {
    #[serde(flatten)]
    pub approval: Approval,
    pub approver: UserSummary,
}

#[derive(Debug, Clone)]
pub struct NewDecision {
    pub expense_id: Uuid,
    pub approver_id: Uuid,
    pub decision: Decision,
    pub comment: Option<String>,
}

#[derive(Debug, Clone)]
pub enum DecisionOutcome {
    Recorded { expense: Expense, approval: Approval },
    /// Another decision flipped the status first.
    AlreadyProcessed,
    /// This approver already has an approval on record for the expense.
    AlreadyDecided,
}

#[derive(Debug, Clone)]
pub enum ExpenseRemoval {
    Removed(Expense),
    /// Refused because the expense left PENDING before the delete ran.
    NotPending,
    Missing,
}

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: Uuid,
    pub content: String,
    pub expense_id: Uuid,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentEntry {
    #[serde(flatten)]
    pub comment: Comment,
    pub user: UserSummary,
}

#[derive(Debug, Clone)]
pub struct NewComment {
    pub expense_id: Uuid,
    pub user_id: Uuid,
    pub content: String,
}
