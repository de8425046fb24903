//! Users, roles, branches and the caller abstraction used by domain rules

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Staff roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(
    feature = "db",
    derive(sqlx::Type),
    sqlx(type_name = "VARCHAR", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Owner,
    Manager,
    Waiter,
    Cashier,
    Bartender,
    /// Operator of the food (meat) station
    Meat,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Owner => "owner",
            Role::Manager => "manager",
            Role::Waiter => "waiter",
            Role::Cashier => "cashier",
            Role::Bartender => "bartender",
            Role::Meat => "meat",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "admin" => Some(Role::Admin),
            "owner" => Some(Role::Owner),
            "manager" => Some(Role::Manager),
            "waiter" => Some(Role::Waiter),
            "cashier" => Some(Role::Cashier),
            "bartender" => Some(Role::Bartender),
            "meat" => Some(Role::Meat),
            _ => None,
        }
    }

    /// Roles that act on every branch
    pub fn is_global(&self) -> bool {
        matches!(self, Role::Admin | Role::Owner)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A branch of the business
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct Branch {
    pub id: Uuid,
    pub name: String,
    pub location: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A staff account
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct User {
    pub id: Uuid,
    pub branch_id: Option<Uuid>,
    pub username: String,
    pub name: String,
    pub role: Role,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Identity of whoever invokes a domain operation.
///
/// The domain never reads request state directly; handlers pass the
/// authenticated user through this trait.
pub trait Caller {
    fn caller_id(&self) -> Uuid;
    fn caller_role(&self) -> Role;
    fn caller_branch(&self) -> Option<Uuid>;

    /// Whether the caller can see and act on records of `branch_id`
    fn in_branch(&self, branch_id: Uuid) -> bool {
        self.caller_role().is_global() || self.caller_branch() == Some(branch_id)
    }

    /// Managers of the branch, owners and admins
    fn manages_branch(&self, branch_id: Uuid) -> bool {
        match self.caller_role() {
            Role::Admin | Role::Owner => true,
            Role::Manager => self.caller_branch() == Some(branch_id),
            _ => false,
        }
    }

    fn has_role(&self, roles: &[Role]) -> bool {
        roles.contains(&self.caller_role())
    }
}

/// A fixed caller, used by background work and tests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticCaller {
    pub id: Uuid,
    pub role: Role,
    pub branch_id: Option<Uuid>,
}

impl StaticCaller {
    pub fn new(role: Role, branch_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            branch_id: Some(branch_id),
        }
    }
}

impl Caller for StaticCaller {
    fn caller_id(&self) -> Uuid {
        self.id
    }

    fn caller_role(&self) -> Role {
        self.role
    }

    fn caller_branch(&self) -> Option<Uuid> {
        self.branch_id
    }
}
