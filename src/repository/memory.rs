use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{Repository, RepositoryError, DUPLICATE_EMAIL};
use crate::models::{
    Approval, ApprovalEntry, Comment, CommentEntry, DecisionOutcome, Expense, ExpenseChanges,
    ExpenseFilter, ExpensePage, ExpenseRemoval, ExpenseStatus, ExpenseWithOwner, NewComment,
    NewDecision, NewExpense, NewUser, User, UserChanges, UserSummary,
};

#[derive(Default)]
struct Tables {
    users: Vec<User>,
    expenses: Vec<Expense>,
    approvals: Vec<Approval>,
    comments: Vec<Comment>,
}

impl Tables {
    fn user(&self, id: Uuid) -> Option<&User> {
        self.users.iter().find(|user| user.id == id)
    }

    fn summary(&self, id: Uuid) -> Option<UserSummary> {
        self.user(id).map(UserSummary::from)
    }

    fn email_taken(&self, email: &str, except: Option<Uuid>) -> bool {
        self.users
            .iter()
            .any(|user| user.email == email && Some(user.id) != except)
    }
}

/// Process-local repository. Every operation holds the single lock for its
/// whole duration, so multi-step writes are atomic.
#[derive(Default)]
pub struct MemoryRepository {
    tables: RwLock<Tables>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn find_user(&self, id: Uuid) -> Result<Option<User>, RepositoryError> {
        Ok(self.tables.read().await.user(id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables.users.iter().find(|user| user.email == email).cloned())
    }

    async fn list_users(&self) -> Result<Vec<User>, RepositoryError> {
        Ok(self.tables.read().await.users.clone())
    }

    async fn insert_user(&self, user: NewUser) -> Result<User, RepositoryError> {
        let mut tables = self.tables.write().await;
        if tables.email_taken(&user.email, None) {
            return Err(RepositoryError::Conflict(DUPLICATE_EMAIL.to_string()));
        }

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            name: user.name,
            email: user.email,
            password_hash: user.password.hash,
            salt: user.password.salt,
            department: user.department,
            role: user.role,
            refresh_token: None,
            created_at: now,
            updated_at: now,
        };
        tables.users.push(user.clone());
        Ok(user)
    }

    async fn update_user(
        &self,
        id: Uuid,
        changes: UserChanges,
    ) -> Result<Option<User>, RepositoryError> {
        let mut tables = self.tables.write().await;
        if let Some(email) = &changes.email {
            if tables.email_taken(email, Some(id)) {
                return Err(RepositoryError::Conflict(DUPLICATE_EMAIL.to_string()));
            }
        }

        let Some(user) = tables.users.iter_mut().find(|user| user.id == id) else {
            return Ok(None);
        };
        if let Some(name) = changes.name {
            user.name = name;
        }
        if let Some(email) = changes.email {
            user.email = email;
        }
        if let Some(password) = changes.password {
            user.password_hash = password.hash;
            user.salt = password.salt;
        }
        if let Some(department) = changes.department {
            user.department = Some(department);
        }
        if let Some(role) = changes.role {
            user.role = role;
        }
        user.updated_at = Utc::now();
        Ok(Some(user.clone()))
    }

    async fn set_refresh_token(
        &self,
        id: Uuid,
        token: Option<&str>,
    ) -> Result<(), RepositoryError> {
        let mut tables = self.tables.write().await;
        if let Some(user) = tables.users.iter_mut().find(|user| user.id == id) {
            user.refresh_token = token.map(str::to_string);
            user.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn delete_user(&self, id: Uuid) -> Result<bool, RepositoryError> {
        let mut tables = self.tables.write().await;
        if tables.user(id).is_none() {
            return Ok(false);
        }

        let owned: Vec<Uuid> = tables
            .expenses
            .iter()
            .filter(|expense| expense.user_id == id)
            .map(|expense| expense.id)
            .collect();

        tables
            .comments
            .retain(|comment| comment.user_id != id && !owned.contains(&comment.expense_id));
        tables
            .approvals
            .retain(|approval| approval.approver_id != id && !owned.contains(&approval.expense_id));
        tables.expenses.retain(|expense| expense.user_id != id);
        tables.users.retain(|user| user.id != id);
        Ok(true)
    }

    async fn list_expenses(&self, filter: &ExpenseFilter) -> Result<ExpensePage, RepositoryError> {
        let tables = self.tables.read().await;

        // Newest first; later inserts win ties on identical timestamps.
        let mut matching: Vec<&Expense> = tables
            .expenses
            .iter()
            .rev()
            .filter(|expense| filter.matches(expense))
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = matching.len() as i64;
        let expenses = matching
            .into_iter()
            .skip(filter.offset.max(0) as usize)
            .take(filter.limit.max(0) as usize)
            .filter_map(|expense| {
                tables.summary(expense.user_id).map(|user| ExpenseWithOwner {
                    expense: expense.clone(),
                    user,
                })
            })
            .collect();

        Ok(ExpensePage { expenses, total })
    }

    async fn find_expense(&self, id: Uuid) -> Result<Option<Expense>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables.expenses.iter().find(|expense| expense.id == id).cloned())
    }

    async fn insert_expense(&self, expense: NewExpense) -> Result<Expense, RepositoryError> {
        let now = Utc::now();
        let expense = Expense {
            id: Uuid::new_v4(),
            title: expense.title,
            amount: expense.amount,
            description: expense.description,
            category: expense.category,
            receipt_url: expense.receipt_url,
            status: ExpenseStatus::Pending,
            user_id: expense.user_id,
            created_at: now,
            updated_at: now,
        };
        self.tables.write().await.expenses.push(expense.clone());
        Ok(expense)
    }

    async fn update_pending_expense(
        &self,
        id: Uuid,
        changes: ExpenseChanges,
    ) -> Result<Option<Expense>, RepositoryError> {
        let mut tables = self.tables.write().await;
        let Some(expense) = tables
            .expenses
            .iter_mut()
            .find(|expense| expense.id == id && expense.status.is_pending())
        else {
            return Ok(None);
        };

        if let Some(title) = changes.title {
            expense.title = title;
        }
        if let Some(amount) = changes.amount {
            expense.amount = amount;
        }
        if let Some(description) = changes.description {
            expense.description = Some(description);
        }
        if let Some(category) = changes.category {
            expense.category = Some(category);
        }
        if let Some(receipt_url) = changes.receipt_url {
            expense.receipt_url = Some(receipt_url);
        }
        expense.updated_at = Utc::now();
        Ok(Some(expense.clone()))
    }

    async fn delete_expense(
        &self,
        id: Uuid,
        pending_only: bool,
    ) -> Result<ExpenseRemoval, RepositoryError> {
        let mut tables = self.tables.write().await;
        let Some(position) = tables.expenses.iter().position(|expense| expense.id == id) else {
            return Ok(ExpenseRemoval::Missing);
        };
        if pending_only && !tables.expenses[position].status.is_pending() {
            return Ok(ExpenseRemoval::NotPending);
        }

        tables.comments.retain(|comment| comment.expense_id != id);
        tables.approvals.retain(|approval| approval.expense_id != id);
        Ok(ExpenseRemoval::Removed(tables.expenses.remove(position)))
    }

    async fn record_decision(
        &self,
        decision: NewDecision,
    ) -> Result<DecisionOutcome, RepositoryError> {
        let mut tables = self.tables.write().await;

        let already_decided = tables.approvals.iter().any(|approval| {
            approval.expense_id == decision.expense_id
                && approval.approver_id == decision.approver_id
        });
        if already_decided {
            return Ok(DecisionOutcome::AlreadyDecided);
        }

        let now = Utc::now();
        let expense = match tables
            .expenses
            .iter_mut()
            .find(|expense| expense.id == decision.expense_id && expense.status.is_pending())
        {
            Some(expense) => {
                expense.status = decision.decision.status();
                expense.updated_at = now;
                expense.clone()
            }
            None => return Ok(DecisionOutcome::AlreadyProcessed),
        };

        let approval = Approval {
            id: Uuid::new_v4(),
            status: decision.decision,
            comment: decision.comment.clone(),
            expense_id: decision.expense_id,
            approver_id: decision.approver_id,
            created_at: now,
        };
        tables.approvals.push(approval.clone());

        if let Some(content) = decision.comment.filter(|c| !c.trim().is_empty()) {
            tables.comments.push(Comment {
                id: Uuid::new_v4(),
                content,
                expense_id: decision.expense_id,
                user_id: decision.approver_id,
                created_at: now,
                updated_at: now,
            });
        }

        Ok(DecisionOutcome::Recorded { expense, approval })
    }

    async fn find_approval(
        &self,
        expense_id: Uuid,
        approver_id: Uuid,
    ) -> Result<Option<Approval>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables
            .approvals
            .iter()
            .find(|approval| approval.expense_id == expense_id && approval.approver_id == approver_id)
            .cloned())
    }

    async fn list_approvals(
        &self,
        expense_id: Uuid,
    ) -> Result<Vec<ApprovalEntry>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables
            .approvals
            .iter()
            .filter(|approval| approval.expense_id == expense_id)
            .filter_map(|approval| {
                tables.summary(approval.approver_id).map(|approver| ApprovalEntry {
                    approval: approval.clone(),
                    approver,
                })
            })
            .collect())
    }

    async fn insert_comment(&self, comment: NewComment) -> Result<Comment, RepositoryError> {
        let now = Utc::now();
        let comment = Comment {
            id: Uuid::new_v4(),
            content: comment.content,
            expense_id: comment.expense_id,
            user_id: comment.user_id,
            created_at: now,
            updated_at: now,
        };
        self.tables.write().await.comments.push(comment.clone());
        Ok(comment)
    }

    async fn find_comment(&self, id: Uuid) -> Result<Option<Comment>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables.comments.iter().find(|comment| comment.id == id).cloned())
    }

    async fn delete_comment(&self, id: Uuid) -> Result<Option<Comment>, RepositoryError> {
        let mut tables = self.tables.write().await;
        Ok(tables
            .comments
            .iter()
            .position(|comment| comment.id == id)
            .map(|position| tables.comments.remove(position)))
    }

    async fn list_comments(&self, expense_id: Uuid) -> Result<Vec<CommentEntry>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables
            .comments
            .iter()
            .filter(|comment| comment.expense_id == expense_id)
            .filter_map(|comment| {
                tables.summary(comment.user_id).map(|user| CommentEntry {
                    comment: comment.clone(),
                    user,
                })
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Decision, Role};
    use crate::utils::HashedPassword;
    use rust_decimal::Decimal;

    fn new_user(email: &str, role: Role) -> NewUser {
        NewUser {
            name: "Test User".to_string(),
            email: email.to_string(),
            password: HashedPassword {
                hash: "$2b$10$hash".to_string(),
                salt: "$2b$10$salt".to_string(),
            },
            department: None,
            role,
        }
    }

    fn new_expense(user_id: Uuid, title: &str) -> NewExpense {
        NewExpense {
            title: title.to_string(),
            amount: Decimal::new(5000, 0),
            description: None,
            category: None,
            receipt_url: None,
            user_id,
        }
    }

    #[tokio::test]
    async fn duplicate_email_is_a_conflict() {
        let repo = MemoryRepository::new();
        repo.insert_user(new_user("a@example.com", Role::User)).await.unwrap();

        let err = repo
            .insert_user(new_user("a@example.com", Role::Admin))
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));
    }

    #[tokio::test]
    async fn second_decision_on_same_expense_is_refused() {
        let repo = MemoryRepository::new();
        let owner = repo.insert_user(new_user("owner@example.com", Role::User)).await.unwrap();
        let first = repo.insert_user(new_user("ap1@example.com", Role::Approver)).await.unwrap();
        let second = repo.insert_user(new_user("ap2@example.com", Role::Approver)).await.unwrap();
        let expense = repo.insert_expense(new_expense(owner.id, "Taxi")).await.unwrap();

        let outcome = repo
            .record_decision(NewDecision {
                expense_id: expense.id,
                approver_id: first.id,
                decision: Decision::Approved,
                comment: Some("ok".to_string()),
            })
            .await
            .unwrap();
        assert!(matches!(outcome, DecisionOutcome::Recorded { .. }));

        let again = repo
            .record_decision(NewDecision {
                expense_id: expense.id,
                approver_id: first.id,
                decision: Decision::Rejected,
                comment: None,
            })
            .await
            .unwrap();
        assert!(matches!(again, DecisionOutcome::AlreadyDecided));

        let other = repo
            .record_decision(NewDecision {
                expense_id: expense.id,
                approver_id: second.id,
                decision: Decision::Rejected,
                comment: None,
            })
            .await
            .unwrap();
        assert!(matches!(other, DecisionOutcome::AlreadyProcessed));

        let stored = repo.find_expense(expense.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ExpenseStatus::Approved);
        assert_eq!(repo.list_approvals(expense.id).await.unwrap().len(), 1);
        assert_eq!(repo.list_comments(expense.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn update_only_touches_pending_expenses() {
        let repo = MemoryRepository::new();
        let owner = repo.insert_user(new_user("owner@example.com", Role::User)).await.unwrap();
        let approver = repo.insert_user(new_user("ap@example.com", Role::Approver)).await.unwrap();
        let expense = repo.insert_expense(new_expense(owner.id, "Hotel")).await.unwrap();

        repo.record_decision(NewDecision {
            expense_id: expense.id,
            approver_id: approver.id,
            decision: Decision::Rejected,
            comment: None,
        })
        .await
        .unwrap();

        let updated = repo
            .update_pending_expense(
                expense.id,
                ExpenseChanges {
                    title: Some("Cheaper hotel".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(updated.is_none());
    }

    #[tokio::test]
    async fn pending_only_delete_spares_decided_expense() {
        let repo = MemoryRepository::new();
        let owner = repo.insert_user(new_user("owner@example.com", Role::User)).await.unwrap();
        let approver = repo.insert_user(new_user("ap@example.com", Role::Approver)).await.unwrap();
        let expense = repo.insert_expense(new_expense(owner.id, "Dinner")).await.unwrap();

        repo.record_decision(NewDecision {
            expense_id: expense.id,
            approver_id: approver.id,
            decision: Decision::Approved,
            comment: Some("fine".to_string()),
        })
        .await
        .unwrap();

        let outcome = repo.delete_expense(expense.id, true).await.unwrap();
        assert!(matches!(outcome, ExpenseRemoval::NotPending));
        assert!(repo.find_expense(expense.id).await.unwrap().is_some());
        assert_eq!(repo.list_approvals(expense.id).await.unwrap().len(), 1);

        let outcome = repo.delete_expense(expense.id, false).await.unwrap();
        assert!(matches!(outcome, ExpenseRemoval::Removed(ref removed) if removed.id == expense.id));
        assert!(repo.list_approvals(expense.id).await.unwrap().is_empty());
        assert!(repo.list_comments(expense.id).await.unwrap().is_empty());

        let outcome = repo.delete_expense(expense.id, false).await.unwrap();
        assert!(matches!(outcome, ExpenseRemoval::Missing));
    }

    #[tokio::test]
    async fn deleting_user_cascades_to_dependents() {
        let repo = MemoryRepository::new();
        let owner = repo.insert_user(new_user("owner@example.com", Role::User)).await.unwrap();
        let approver = repo.insert_user(new_user("ap@example.com", Role::Approver)).await.unwrap();
        let own = repo.insert_expense(new_expense(owner.id, "Mine")).await.unwrap();
        let other_owner = repo.insert_user(new_user("other@example.com", Role::User)).await.unwrap();
        let other = repo.insert_expense(new_expense(other_owner.id, "Theirs")).await.unwrap();

        repo.insert_comment(NewComment {
            expense_id: own.id,
            user_id: approver.id,
            content: "receipt missing".to_string(),
        })
        .await
        .unwrap();
        repo.insert_comment(NewComment {
            expense_id: other.id,
            user_id: owner.id,
            content: "drive-by".to_string(),
        })
        .await
        .unwrap();
        repo.record_decision(NewDecision {
            expense_id: own.id,
            approver_id: approver.id,
            decision: Decision::Approved,
            comment: None,
        })
        .await
        .unwrap();

        assert!(repo.delete_user(owner.id).await.unwrap());

        assert!(repo.find_user(owner.id).await.unwrap().is_none());
        assert!(repo.find_expense(own.id).await.unwrap().is_none());
        assert!(repo.list_approvals(own.id).await.unwrap().is_empty());
        assert!(repo.list_comments(own.id).await.unwrap().is_empty());
        assert!(repo.list_comments(other.id).await.unwrap().is_empty());
        assert!(repo.find_expense(other.id).await.unwrap().is_some());
        assert!(!repo.delete_user(owner.id).await.unwrap());
    }

    #[tokio::test]
    async fn listing_pages_newest_first() {
        let repo = MemoryRepository::new();
        let owner = repo.insert_user(new_user("owner@example.com", Role::User)).await.unwrap();
        for n in 0..5 {
            repo.insert_expense(new_expense(owner.id, &format!("expense {n}")))
                .await
                .unwrap();
        }

        let page = repo
            .list_expenses(&ExpenseFilter {
                limit: 2,
                offset: 1,
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(page.total, 5);
        let titles: Vec<&str> = page.expenses.iter().map(|e| e.expense.title.as_str()).collect();
        assert_eq!(titles, vec!["expense 3", "expense 2"]);
        assert_eq!(page.expenses[0].user.email, "owner@example.com");
    }
}
