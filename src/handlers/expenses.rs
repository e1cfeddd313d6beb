use axum::{extract::State, Json};
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{non_empty, validate, IdInput, Input, ListFilter, Params, SuccessResponse, Validate};
use crate::{
    error::{AppError, AppResult},
    middleware::AuthUser,
    models::{
        Approval, CommentEntry, Decision, DecisionOutcome, Expense, ExpenseCategory,
        ExpenseChanges, ExpenseDetail, ExpenseFilter, ExpensePage, ExpenseRemoval, ExpenseStatus,
        NewComment, NewDecision, NewExpense, UserSummary,
    },
    AppState,
};

const MAX_PAGE_SIZE: i64 = 100;

// Query strings arrive as raw text so that empty form values mean "no filter".
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListExpensesInput {
    pub user_id: Option<String>,
    pub status: Option<String>,
    pub category: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub limit: Option<String>,
    pub offset: Option<String>,
}

impl ListExpensesInput {
    pub fn to_filter(&self) -> AppResult<ExpenseFilter> {
        let mut filter = ExpenseFilter::default();

        if let Some(user_id) = present(&self.user_id) {
            filter.user_id = Some(
                Uuid::parse_str(user_id).map_err(|_| AppError::bad_request("Invalid userId"))?,
            );
        }
        if let Some(status) = present(&self.status) {
            filter.status = Some(
                status
                    .parse::<ExpenseStatus>()
                    .map_err(|err| AppError::bad_request(err.to_string()))?,
            );
        }
        if let Some(category) = present(&self.category) {
            filter.category = Some(
                category
                    .parse::<ExpenseCategory>()
                    .map_err(|err| AppError::bad_request(err.to_string()))?,
            );
        }

        let start = present(&self.start_date)
            .map(|value| parse_date("startDate", value))
            .transpose()?;
        let end = present(&self.end_date)
            .map(|value| parse_date("endDate", value))
            .transpose()?;
        if let (Some(start), Some(end)) = (start, end) {
            if start > end {
                return Err(AppError::bad_request("startDate must not be after endDate"));
            }
        }
        filter.created_from = start.map(start_of_day);
        filter.created_before = end.map(|end| start_of_day(end) + Duration::days(1));

        if let Some(limit) = present(&self.limit) {
            filter.limit = match limit.parse::<i64>() {
                Ok(n) if (1..=MAX_PAGE_SIZE).contains(&n) => n,
                _ => {
                    return Err(AppError::bad_request(format!(
                        "limit must be between 1 and {}",
                        MAX_PAGE_SIZE
                    )))
                }
            };
        }
        if let Some(offset) = present(&self.offset) {
            filter.offset = match offset.parse::<i64>() {
                Ok(n) if n >= 0 => n,
                _ => return Err(AppError::bad_request("offset must not be negative")),
            };
        }

        Ok(filter)
    }
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|value| !value.is_empty())
}

/// Accepts a calendar date or a full RFC 3339 timestamp (only its UTC date
/// is used).
fn parse_date(field: &str, value: &str) -> AppResult<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .or_else(|_| DateTime::parse_from_rfc3339(value).map(|ts| ts.with_timezone(&Utc).date_naive()))
        .map_err(|_| AppError::bad_request(format!("{} must be a date (YYYY-MM-DD)", field)))
}

fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateExpenseInput {
    pub title: String,
    pub amount: Decimal,
    pub description: Option<String>,
    pub category: Option<ExpenseCategory>,
    pub receipt_url: Option<String>,
}

impl Validate for CreateExpenseInput {
    fn validate(&self) -> AppResult<()> {
        validate::required("title", &self.title)?;
        validate::amount(self.amount)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateExpenseInput {
    pub id: Uuid,
    pub title: Option<String>,
    pub amount: Option<Decimal>,
    pub description: Option<String>,
    pub category: Option<ExpenseCategory>,
    pub receipt_url: Option<String>,
}

impl Validate for UpdateExpenseInput {
    fn validate(&self) -> AppResult<()> {
        if let Some(title) = &self.title {
            validate::required("title", title)?;
        }
        if let Some(amount) = self.amount {
            validate::amount(amount)?;
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusInput {
    pub id: Uuid,
    pub status: Decision,
    pub comment: Option<String>,
}

impl Validate for UpdateStatusInput {
    fn validate(&self) -> AppResult<()> {
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddCommentInput {
    pub expense_id: Uuid,
    pub content: String,
}

impl Validate for AddCommentInput {
    fn validate(&self) -> AppResult<()> {
        validate::required("content", &self.content)
    }
}

#[derive(Debug, Serialize)]
pub struct StatusUpdate {
    pub expense: Expense,
    pub approval: Approval,
}

#[derive(Debug, Serialize)]
pub struct CategoryOption {
    pub value: ExpenseCategory,
    pub label: &'static str,
}

async fn load_expense(state: &AppState, id: Uuid) -> AppResult<Expense> {
    state
        .repo
        .find_expense(id)
        .await?
        .ok_or_else(|| AppError::not_found("Expense request not found"))
}

async fn load_summary(state: &AppState, user_id: Uuid) -> AppResult<UserSummary> {
    state
        .repo
        .find_user(user_id)
        .await?
        .map(|user| UserSummary::from(&user))
        .ok_or_else(|| AppError::not_found("User not found"))
}

fn ensure_can_view(auth: &AuthUser, expense: &Expense) -> AppResult<()> {
    if expense.user_id != auth.id && !auth.can_approve() {
        return Err(AppError::forbidden(
            "You do not have permission to access this expense request",
        ));
    }
    Ok(())
}

pub async fn get_my_expenses(
    State(state): State<AppState>,
    auth: AuthUser,
    ListFilter(mut filter): ListFilter,
) -> AppResult<Json<ExpensePage>> {
    filter.user_id = Some(auth.id);
    Ok(Json(state.repo.list_expenses(&filter).await?))
}

pub async fn get_all(
    State(state): State<AppState>,
    ListFilter(filter): ListFilter,
) -> AppResult<Json<ExpensePage>> {
    Ok(Json(state.repo.list_expenses(&filter).await?))
}

pub async fn get_by_id(
    State(state): State<AppState>,
    auth: AuthUser,
    Params(input): Params<IdInput>,
) -> AppResult<Json<ExpenseDetail>> {
    let expense = load_expense(&state, input.id).await?;
    ensure_can_view(&auth, &expense)?;

    let user = load_summary(&state, expense.user_id).await?;
    let approvals = state.repo.list_approvals(expense.id).await?;
    let comments = state.repo.list_comments(expense.id).await?;

    Ok(Json(ExpenseDetail {
        expense,
        user,
        approvals,
        comments,
    }))
}

pub async fn create(
    State(state): State<AppState>,
    auth: AuthUser,
    Input(input): Input<CreateExpenseInput>,
) -> AppResult<Json<Expense>> {
    let expense = state
        .repo
        .insert_expense(NewExpense {
            title: input.title.trim().to_string(),
            amount: input.amount,
            description: non_empty(input.description),
            category: input.category,
            receipt_url: non_empty(input.receipt_url),
            user_id: auth.id,
        })
        .await?;

    log::info!("user {} submitted expense {}", auth.id, expense.id);
    Ok(Json(expense))
}

pub async fn update(
    State(state): State<AppState>,
    auth: AuthUser,
    Input(input): Input<UpdateExpenseInput>,
) -> AppResult<Json<Expense>> {
    let expense = load_expense(&state, input.id).await?;
    if expense.user_id != auth.id {
        return Err(AppError::forbidden(
            "You do not have permission to update this expense request",
        ));
    }
    if !expense.status.is_pending() {
        return Err(AppError::bad_request(
            "A processed expense request cannot be updated",
        ));
    }

    let changes = ExpenseChanges {
        title: input.title.map(|title| title.trim().to_string()),
        amount: input.amount,
        description: non_empty(input.description),
        category: input.category,
        receipt_url: non_empty(input.receipt_url),
    };

    // The status may have moved on since the read above.
    let updated = state
        .repo
        .update_pending_expense(expense.id, changes)
        .await?
        .ok_or_else(|| AppError::bad_request("A processed expense request cannot be updated"))?;
    Ok(Json(updated))
}

pub async fn delete(
    State(state): State<AppState>,
    auth: AuthUser,
    Input(input): Input<IdInput>,
) -> AppResult<Json<Expense>> {
    let expense = load_expense(&state, input.id).await?;
    if expense.user_id != auth.id && !auth.is_admin() {
        return Err(AppError::forbidden(
            "You do not have permission to delete this expense request",
        ));
    }
    if !expense.status.is_pending() && !auth.is_admin() {
        return Err(AppError::bad_request(
            "A processed expense request cannot be deleted",
        ));
    }

    // Admins may remove decided expenses; everyone else only pending ones.
    let deleted = match state.repo.delete_expense(expense.id, !auth.is_admin()).await? {
        ExpenseRemoval::Removed(deleted) => deleted,
        ExpenseRemoval::NotPending => {
            return Err(AppError::bad_request(
                "A processed expense request cannot be deleted",
            ))
        }
        ExpenseRemoval::Missing => return Err(AppError::not_found("Expense request not found")),
    };

    log::info!("user {} deleted expense {}", auth.id, deleted.id);
    Ok(Json(deleted))
}

pub async fn update_status(
    State(state): State<AppState>,
    auth: AuthUser,
    Input(input): Input<UpdateStatusInput>,
) -> AppResult<Json<StatusUpdate>> {
    let expense = load_expense(&state, input.id).await?;
    if expense.user_id == auth.id {
        return Err(AppError::bad_request(
            "You cannot approve or reject your own expense request",
        ));
    }
    if !expense.status.is_pending() {
        return Err(AppError::bad_request("This expense request has already been processed"));
    }
    if state.repo.find_approval(expense.id, auth.id).await?.is_some() {
        return Err(AppError::bad_request("You have already reviewed this expense request"));
    }

    let outcome = state
        .repo
        .record_decision(NewDecision {
            expense_id: expense.id,
            approver_id: auth.id,
            decision: input.status,
            comment: non_empty(input.comment),
        })
        .await?;

    match outcome {
        DecisionOutcome::Recorded { expense, approval } => {
            log::info!(
                "expense {} moved to {} by {}",
                expense.id,
                expense.status,
                auth.id
            );
            Ok(Json(StatusUpdate { expense, approval }))
        }
        DecisionOutcome::AlreadyProcessed => Err(AppError::bad_request(
            "This expense request has already been processed",
        )),
        DecisionOutcome::AlreadyDecided => Err(AppError::bad_request(
            "You have already reviewed this expense request",
        )),
    }
}

pub async fn add_comment(
    State(state): State<AppState>,
    auth: AuthUser,
    Input(input): Input<AddCommentInput>,
) -> AppResult<Json<CommentEntry>> {
    let expense = load_expense(&state, input.expense_id).await?;
    if expense.user_id != auth.id && !auth.can_approve() {
        return Err(AppError::forbidden(
            "You do not have permission to comment on this expense request",
        ));
    }

    let user = load_summary(&state, auth.id).await?;
    let comment = state
        .repo
        .insert_comment(NewComment {
            expense_id: expense.id,
            user_id: auth.id,
            content: input.content.trim().to_string(),
        })
        .await?;

    Ok(Json(CommentEntry { comment, user }))
}

pub async fn delete_comment(
    State(state): State<AppState>,
    auth: AuthUser,
    Input(input): Input<IdInput>,
) -> AppResult<Json<SuccessResponse>> {
    let comment = state
        .repo
        .find_comment(input.id)
        .await?
        .ok_or_else(|| AppError::not_found("Comment not found"))?;

    if comment.user_id != auth.id && !auth.is_admin() {
        return Err(AppError::forbidden(
            "You do not have permission to delete this comment",
        ));
    }

    state.repo.delete_comment(comment.id).await?;
    Ok(SuccessResponse::ok())
}

pub async fn get_categories() -> Json<Vec<CategoryOption>> {
    Json(
        ExpenseCategory::ALL
            .into_iter()
            .map(|category| CategoryOption {
                value: category,
                label: category.label(),
            })
            .collect(),
    )
}
