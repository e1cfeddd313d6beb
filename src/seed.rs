//! Demo dataset and first-admin bootstrap.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::{
    models::{
        Decision, ExpenseCategory, NewComment, NewDecision, NewExpense, NewUser, Role, User,
    },
    repository::{Repository, RepositoryError},
    utils::hash_password,
};

#[derive(Debug, Error)]
pub enum SeedError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error("failed to hash password: {0}")]
    Hash(#[from] bcrypt::BcryptError),
}

struct SeedUser {
    name: &'static str,
    email: &'static str,
    password: &'static str,
    role: Role,
    department: &'static str,
}

struct SeedExpense {
    owner: usize,
    title: &'static str,
    /// Whole yen.
    amount: i64,
    description: &'static str,
    category: ExpenseCategory,
    decision: Option<(Decision, &'static str)>,
    /// `(author, content)`; authors index into [`USERS`].
    comments: &'static [(usize, &'static str)],
}

const ADMIN: usize = 0;
const APPROVER: usize = 1;
const USER_ONE: usize = 2;
const USER_TWO: usize = 3;

const USERS: &[SeedUser] = &[
    SeedUser {
        name: "Taro Kanri",
        email: "admin@example.com",
        password: "admin123",
        role: Role::Admin,
        department: "Corporate Planning",
    },
    SeedUser {
        name: "Hanako Shonin",
        email: "approver@example.com",
        password: "approver123",
        role: Role::Approver,
        department: "Accounting",
    },
    SeedUser {
        name: "Jiro Ippan",
        email: "user1@example.com",
        password: "user123",
        role: Role::User,
        department: "Sales",
    },
    SeedUser {
        name: "Saburo Ippan",
        email: "user2@example.com",
        password: "user123",
        role: Role::User,
        department: "Development",
    },
];

const EXPENSES: &[SeedExpense] = &[
    SeedExpense {
        owner: USER_ONE,
        title: "Tokyo business trip fare",
        amount: 12_500,
        description: "Shinkansen tickets for the head office visit",
        category: ExpenseCategory::Travel,
        decision: Some((Decision::Approved, "Approved as a valid business expense")),
        comments: &[
            (USER_ONE, "Receipt attached"),
            (APPROVER, "Checked, no problems"),
        ],
    },
    SeedExpense {
        owner: USER_ONE,
        title: "Client entertainment",
        amount: 35_000,
        description: "Dinner after the negotiation with Company A",
        category: ExpenseCategory::Entertainment,
        decision: None,
        comments: &[(APPROVER, "Please add details about the guests")],
    },
    SeedExpense {
        owner: USER_ONE,
        title: "Office supplies",
        amount: 8_000,
        description: "Desk lamp",
        category: ExpenseCategory::Supplies,
        decision: Some((Decision::Rejected, "Rejected due to department budget limits")),
        comments: &[
            (APPROVER, "Please check the department budget"),
            (USER_ONE, "Explaining why the budget was exceeded"),
        ],
    },
    SeedExpense {
        owner: USER_TWO,
        title: "Osaka trip accommodation",
        amount: 15_000,
        description: "Hotel for the Osaka branch visit",
        category: ExpenseCategory::Accommodation,
        decision: None,
        comments: &[],
    },
    SeedExpense {
        owner: USER_TWO,
        title: "Team lunch",
        amount: 20_000,
        description: "Lunch celebrating the project launch",
        category: ExpenseCategory::Meals,
        decision: Some((Decision::Approved, "Approved as a team reward")),
        comments: &[],
    },
];

/// Loads the demo users, expenses, decisions and comments. Existing rows are
/// never touched; returns `false` when the demo admin already exists.
pub async fn seed_demo_data(repo: &dyn Repository) -> Result<bool, SeedError> {
    if repo.find_user_by_email(USERS[ADMIN].email).await?.is_some() {
        log::info!("demo data already present, skipping");
        return Ok(false);
    }

    let mut users: Vec<User> = Vec::with_capacity(USERS.len());
    for seed in USERS {
        let user = repo
            .insert_user(NewUser {
                name: seed.name.to_string(),
                email: seed.email.to_string(),
                password: hash_password(seed.password)?,
                department: Some(seed.department.to_string()),
                role: seed.role,
            })
            .await?;
        log::info!("seeded {} user {}", user.role, user.email);
        users.push(user);
    }

    for seed in EXPENSES {
        let expense = repo
            .insert_expense(NewExpense {
                title: seed.title.to_string(),
                amount: Decimal::new(seed.amount, 0),
                description: Some(seed.description.to_string()),
                category: Some(seed.category),
                receipt_url: None,
                user_id: users[seed.owner].id,
            })
            .await?;

        for (author, content) in seed.comments {
            repo.insert_comment(NewComment {
                expense_id: expense.id,
                user_id: users[*author].id,
                content: content.to_string(),
            })
            .await?;
        }

        if let Some((decision, comment)) = seed.decision {
            repo.record_decision(NewDecision {
                expense_id: expense.id,
                approver_id: users[APPROVER].id,
                decision,
                comment: Some(comment.to_string()),
            })
            .await?;
        }
        log::info!("seeded expense {}", expense.title);
    }

    Ok(true)
}

/// Creates an admin with the given credentials unless the email is already
/// registered. An existing account keeps its role and password.
pub async fn ensure_admin_account(
    repo: &dyn Repository,
    email: &str,
    password: &str,
) -> Result<Option<User>, SeedError> {
    if repo.find_user_by_email(email).await?.is_some() {
        log::info!("admin account {} already exists", email);
        return Ok(None);
    }

    let user = repo
        .insert_user(NewUser {
            name: "Administrator".to_string(),
            email: email.to_string(),
            password: hash_password(password)?,
            department: None,
            role: Role::Admin,
        })
        .await?;
    log::info!("created admin account {}", user.email);
    Ok(Some(user))
}
