use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, Postgres, QueryBuilder};
use uuid::Uuid;

use super::{Repository, RepositoryError, DUPLICATE_EMAIL};
use crate::{
    database::Database,
    models::{
        Approval, ApprovalEntry, Comment, CommentEntry, Decision, DecisionOutcome, Expense,
        ExpenseCategory, ExpenseChanges, ExpenseFilter, ExpensePage, ExpenseRemoval,
        ExpenseStatus, ExpenseWithOwner, NewComment, NewDecision, NewExpense, NewUser, Role, User, UserChanges,
        UserSummary,
    },
};

pub struct PgRepository {
    pool: Database,
}

impl PgRepository {
    pub fn new(pool: Database) -> Self {
        Self { pool }
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        if let Some(code) = db_err.code() {
            return code.as_ref() == "23505";
        }
    }
    false
}

fn map_user_write(err: sqlx::Error) -> RepositoryError {
    if is_unique_violation(&err) {
        RepositoryError::Conflict(DUPLICATE_EMAIL.to_string())
    } else {
        RepositoryError::Database(err)
    }
}

#[derive(FromRow)]
struct ExpenseOwnerRow {
    id: Uuid,
    title: String,
    amount: Decimal,
    description: Option<String>,
    category: Option<ExpenseCategory>,
    receipt_url: Option<String>,
    status: ExpenseStatus,
    user_id: Uuid,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    owner_name: String,
    owner_email: String,
    owner_role: Role,
    owner_department: Option<String>,
}

impl From<ExpenseOwnerRow> for ExpenseWithOwner {
    fn from(row: ExpenseOwnerRow) -> Self {
        Self {
            user: UserSummary {
                id: row.user_id,
                name: row.owner_name,
                email: row.owner_email,
                role: row.owner_role,
                department: row.owner_department,
            },
            expense: Expense {
                id: row.id,
                title: row.title,
                amount: row.amount,
                description: row.description,
                category: row.category,
                receipt_url: row.receipt_url,
                status: row.status,
                user_id: row.user_id,
                created_at: row.created_at,
                updated_at: row.updated_at,
            },
        }
    }
}

#[derive(FromRow)]
struct ApprovalRow {
    id: Uuid,
    status: Decision,
    comment: Option<String>,
    expense_id: Uuid,
    approver_id: Uuid,
    created_at: DateTime<Utc>,
    approver_name: String,
    approver_email: String,
    approver_role: Role,
    approver_department: Option<String>,
}

impl From<ApprovalRow> for ApprovalEntry {
    fn from(row: ApprovalRow) -> Self {
        Self {
            approver: UserSummary {
                id: row.approver_id,
                name: row.approver_name,
                email: row.approver_email,
                role: row.approver_role,
                department: row.approver_department,
            },
            approval: Approval {
                id: row.id,
                status: row.status,
                comment: row.comment,
                expense_id: row.expense_id,
                approver_id: row.approver_id,
                created_at: row.created_at,
            },
        }
    }
}

#[derive(FromRow)]
struct CommentRow {
    id: Uuid,
    content: String,
    expense_id: Uuid,
    user_id: Uuid,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    author_name: String,
    author_email: String,
    author_role: Role,
    author_department: Option<String>,
}

impl From<CommentRow> for CommentEntry {
    fn from(row: CommentRow) -> Self {
        Self {
            user: UserSummary {
                id: row.user_id,
                name: row.author_name,
                email: row.author_email,
                role: row.author_role,
                department: row.author_department,
            },
            comment: Comment {
                id: row.id,
                content: row.content,
                expense_id: row.expense_id,
                user_id: row.user_id,
                created_at: row.created_at,
                updated_at: row.updated_at,
            },
        }
    }
}

fn push_expense_filters(builder: &mut QueryBuilder<'_, Postgres>, filter: &ExpenseFilter) {
    let mut keyword = " WHERE ";

    if let Some(user_id) = filter.user_id {
        builder.push(keyword).push("e.user_id = ").push_bind(user_id);
        keyword = " AND ";
    }
    if let Some(status) = filter.status {
        builder.push(keyword).push("e.status = ").push_bind(status);
        keyword = " AND ";
    }
    if let Some(category) = filter.category {
        builder.push(keyword).push("e.category = ").push_bind(category);
        keyword = " AND ";
    }
    if let Some(from) = filter.created_from {
        builder.push(keyword).push("e.created_at >= ").push_bind(from);
        keyword = " AND ";
    }
    if let Some(before) = filter.created_before {
        builder.push(keyword).push("e.created_at < ").push_bind(before);
    }
}

#[async_trait]
impl Repository for PgRepository {
    async fn find_user(&self, id: Uuid) -> Result<Option<User>, RepositoryError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn list_users(&self) -> Result<Vec<User>, RepositoryError> {
        let users = sqlx::query_as::<_, User>("SELECT * FROM users ORDER BY created_at")
            .fetch_all(&self.pool)
            .await?;
        Ok(users)
    }

    async fn insert_user(&self, user: NewUser) -> Result<User, RepositoryError> {
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, name, email, password_hash, salt, department, role)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password.hash)
        .bind(&user.password.salt)
        .bind(&user.department)
        .bind(user.role)
        .fetch_one(&self.pool)
        .await
        .map_err(map_user_write)
    }

    async fn update_user(
        &self,
        id: Uuid,
        changes: UserChanges,
    ) -> Result<Option<User>, RepositoryError> {
        let (hash, salt) = match changes.password {
            Some(password) => (Some(password.hash), Some(password.salt)),
            None => (None, None),
        };

        sqlx::query_as::<_, User>(
            r#"
            UPDATE users SET
                name = COALESCE($2, name),
                email = COALESCE($3, email),
                password_hash = COALESCE($4, password_hash),
                salt = COALESCE($5, salt),
                department = COALESCE($6, department),
                role = COALESCE($7, role),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(changes.name)
        .bind(changes.email)
        .bind(hash)
        .bind(salt)
        .bind(changes.department)
        .bind(changes.role)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_user_write)
    }

    async fn set_refresh_token(
        &self,
        id: Uuid,
        token: Option<&str>,
    ) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE users SET refresh_token = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_user(&self, id: Uuid) -> Result<bool, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            DELETE FROM comments
            WHERE user_id = $1
               OR expense_id IN (SELECT id FROM expense_requests WHERE user_id = $1)
            "#,
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            DELETE FROM approvals
            WHERE approver_id = $1
               OR expense_id IN (SELECT id FROM expense_requests WHERE user_id = $1)
            "#,
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM expense_requests WHERE user_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let deleted = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;
        Ok(deleted > 0)
    }

    async fn list_expenses(&self, filter: &ExpenseFilter) -> Result<ExpensePage, RepositoryError> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM expense_requests e");
        push_expense_filters(&mut count, filter);
        let total = count
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?;

        let mut select = QueryBuilder::<Postgres>::new(
            r#"
            SELECT
                e.id, e.title, e.amount, e.description, e.category, e.receipt_url,
                e.status, e.user_id, e.created_at, e.updated_at,
                u.name AS owner_name,
                u.email AS owner_email,
                u.role AS owner_role,
                u.department AS owner_department
            FROM expense_requests e
            JOIN users u ON u.id = e.user_id
            "#,
        );
        push_expense_filters(&mut select, filter);
        select
            .push(" ORDER BY e.created_at DESC LIMIT ")
            .push_bind(filter.limit)
            .push(" OFFSET ")
            .push_bind(filter.offset);

        let expenses = select
            .build_query_as::<ExpenseOwnerRow>()
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(ExpenseWithOwner::from)
            .collect();

        Ok(ExpensePage { expenses, total })
    }

    async fn find_expense(&self, id: Uuid) -> Result<Option<Expense>, RepositoryError> {
        let expense = sqlx::query_as::<_, Expense>("SELECT * FROM expense_requests WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(expense)
    }

    async fn insert_expense(&self, expense: NewExpense) -> Result<Expense, RepositoryError> {
        let expense = sqlx::query_as::<_, Expense>(
            r#"
            INSERT INTO expense_requests
                (id, title, amount, description, category, receipt_url, status, user_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&expense.title)
        .bind(expense.amount)
        .bind(&expense.description)
        .bind(expense.category)
        .bind(&expense.receipt_url)
        .bind(ExpenseStatus::Pending)
        .bind(expense.user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(expense)
    }

    async fn update_pending_expense(
        &self,
        id: Uuid,
        changes: ExpenseChanges,
    ) -> Result<Option<Expense>, RepositoryError> {
        let expense = sqlx::query_as::<_, Expense>(
            r#"
            UPDATE expense_requests SET
                title = COALESCE($2, title),
                amount = COALESCE($3, amount),
                description = COALESCE($4, description),
                category = COALESCE($5, category),
                receipt_url = COALESCE($6, receipt_url),
                updated_at = NOW()
            WHERE id = $1 AND status = 'PENDING'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(changes.title)
        .bind(changes.amount)
        .bind(changes.description)
        .bind(changes.category)
        .bind(changes.receipt_url)
        .fetch_optional(&self.pool)
        .await?;
        Ok(expense)
    }

    async fn delete_expense(
        &self,
        id: Uuid,
        pending_only: bool,
    ) -> Result<ExpenseRemoval, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        // The row lock orders this delete against a concurrent decision.
        let expense = sqlx::query_as::<_, Expense>(
            "SELECT * FROM expense_requests WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(expense) = expense else {
            tx.rollback().await?;
            return Ok(ExpenseRemoval::Missing);
        };
        if pending_only && !expense.status.is_pending() {
            tx.rollback().await?;
            return Ok(ExpenseRemoval::NotPending);
        }

        sqlx::query("DELETE FROM comments WHERE expense_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM approvals WHERE expense_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM expense_requests WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(ExpenseRemoval::Removed(expense))
    }

    async fn record_decision(
        &self,
        decision: NewDecision,
    ) -> Result<DecisionOutcome, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let already_decided = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM approvals WHERE expense_id = $1 AND approver_id = $2)",
        )
        .bind(decision.expense_id)
        .bind(decision.approver_id)
        .fetch_one(&mut *tx)
        .await?;

        if already_decided {
            tx.rollback().await?;
            return Ok(DecisionOutcome::AlreadyDecided);
        }

        // The status guard makes the first concurrent writer win.
        let expense = sqlx::query_as::<_, Expense>(
            r#"
            UPDATE expense_requests SET status = $2, updated_at = NOW()
            WHERE id = $1 AND status = 'PENDING'
            RETURNING *
            "#,
        )
        .bind(decision.expense_id)
        .bind(decision.decision.status())
        .fetch_optional(&mut *tx)
        .await?;

        let Some(expense) = expense else {
            tx.rollback().await?;
            return Ok(DecisionOutcome::AlreadyProcessed);
        };

        let approval = sqlx::query_as::<_, Approval>(
            r#"
            INSERT INTO approvals (id, status, comment, expense_id, approver_id)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(decision.decision)
        .bind(&decision.comment)
        .bind(decision.expense_id)
        .bind(decision.approver_id)
        .fetch_one(&mut *tx)
        .await?;

        if let Some(content) = decision.comment.as_deref().filter(|c| !c.trim().is_empty()) {
            sqlx::query(
                "INSERT INTO comments (id, content, expense_id, user_id) VALUES ($1, $2, $3, $4)",
            )
            .bind(Uuid::new_v4())
            .bind(content)
            .bind(decision.expense_id)
            .bind(decision.approver_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(DecisionOutcome::Recorded { expense, approval })
    }

    async fn find_approval(
        &self,
        expense_id: Uuid,
        approver_id: Uuid,
    ) -> Result<Option<Approval>, RepositoryError> {
        let approval = sqlx::query_as::<_, Approval>(
            "SELECT * FROM approvals WHERE expense_id = $1 AND approver_id = $2",
        )
        .bind(expense_id)
        .bind(approver_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(approval)
    }

    async fn list_approvals(
        &self,
        expense_id: Uuid,
    ) -> Result<Vec<ApprovalEntry>, RepositoryError> {
        let approvals = sqlx::query_as::<_, ApprovalRow>(
            r#"
            SELECT
                a.id, a.status, a.comment, a.expense_id, a.approver_id, a.created_at,
                u.name AS approver_name,
                u.email AS approver_email,
                u.role AS approver_role,
                u.department AS approver_department
            FROM approvals a
            JOIN users u ON u.id = a.approver_id
            WHERE a.expense_id = $1
            ORDER BY a.created_at
            "#,
        )
        .bind(expense_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(ApprovalEntry::from)
        .collect();
        Ok(approvals)
    }

    async fn insert_comment(&self, comment: NewComment) -> Result<Comment, RepositoryError> {
        let comment = sqlx::query_as::<_, Comment>(
            r#"
            INSERT INTO comments (id, content, expense_id, user_id)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&comment.content)
        .bind(comment.expense_id)
        .bind(comment.user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(comment)
    }

    async fn find_comment(&self, id: Uuid) -> Result<Option<Comment>, RepositoryError> {
        let comment = sqlx::query_as::<_, Comment>("SELECT * FROM comments WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(comment)
    }

    async fn delete_comment(&self, id: Uuid) -> Result<Option<Comment>, RepositoryError> {
        let comment = sqlx::query_as::<_, Comment>("DELETE FROM comments WHERE id = $1 RETURNING *")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(comment)
    }

    async fn list_comments(&self, expense_id: Uuid) -> Result<Vec<CommentEntry>, RepositoryError> {
        let comments = sqlx::query_as::<_, CommentRow>(
            r#"
            SELECT
                c.id, c.content, c.expense_id, c.user_id, c.created_at, c.updated_at,
                u.name AS author_name,
                u.email AS author_email,
                u.role AS author_role,
                u.department AS author_department
            FROM comments c
            JOIN users u ON u.id = c.user_id
            WHERE c.expense_id = $1
            ORDER BY c.created_at
            "#,
        )
        .bind(expense_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(CommentEntry::from)
        .collect();
        Ok(comments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn count_sql(filter: &ExpenseFilter) -> String {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM expense_requests e");
        push_expense_filters(&mut builder, filter);
        builder.sql().to_string()
    }

    #[test]
    fn no_filter_adds_no_where_clause() {
        assert_eq!(
            count_sql(&ExpenseFilter::default()),
            "SELECT COUNT(*) FROM expense_requests e"
        );
    }

    #[test]
    fn filters_are_joined_with_and_in_bind_order() {
        let now = Utc::now();
        let filter = ExpenseFilter {
            user_id: Some(Uuid::new_v4()),
            status: Some(ExpenseStatus::Pending),
            category: Some(ExpenseCategory::Travel),
            created_from: Some(now),
            created_before: Some(now + Duration::days(1)),
            ..Default::default()
        };

        assert_eq!(
            count_sql(&filter),
            "SELECT COUNT(*) FROM expense_requests e WHERE e.user_id = $1 AND e.status = $2 \
             AND e.category = $3 AND e.created_at >= $4 AND e.created_at < $5"
        );
    }

    #[test]
    fn single_filter_starts_the_where_clause() {
        let filter = ExpenseFilter {
            created_before: Some(Utc::now()),
            ..Default::default()
        };
        assert_eq!(
            count_sql(&filter),
            "SELECT COUNT(*) FROM expense_requests e WHERE e.created_at < $1"
        );
    }
}
