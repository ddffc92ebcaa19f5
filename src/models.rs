use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::schema::*;

pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_USER: &str = "user";
pub const STATUS_PENDING: &str = "pending";

/// A stored user. `password_hash` holds ciphertext while in the database and
/// the decrypted value once it leaves the repository.
#[derive(Debug, Clone, Queryable, Identifiable, Serialize, Deserialize)]
#[diesel(table_name = users)]
pub struct User {
    pub id: i32,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub role: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Insertable, AsChangeset, Deserialize)]
#[diesel(table_name = users)]
pub struct NewUser {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password_hash: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub role: String,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations, Serialize, Deserialize)]
#[diesel(table_name = leave_requests)]
#[diesel(belongs_to(User))]
pub struct LeaveRequest {
    pub id: i32,
    pub user_id: i32,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub leave_type: String,
    pub status: String,
    pub reason: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable, AsChangeset, Deserialize)]
#[diesel(table_name = leave_requests)]
pub struct NewLeaveRequest {
    pub user_id: i32,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    #[serde(default)]
    pub leave_type: String,
    #[serde(default = "default_status")]
    pub status: String,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations, Serialize, Deserialize)]
#[diesel(table_name = purchase_requests)]
#[diesel(belongs_to(User))]
pub struct PurchaseRequest {
    pub id: i32,
    pub user_id: i32,
    pub item_name: String,
    pub quantity: i32,
    pub estimated_cost: f64,
    pub status: String,
    pub reason: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable, AsChangeset, Deserialize)]
#[diesel(table_name = purchase_requests)]
pub struct NewPurchaseRequest {
    pub user_id: i32,
    #[serde(default)]
    pub item_name: String,
    pub quantity: i32,
    pub estimated_cost: f64,
    #[serde(default = "default_status")]
    pub status: String,
    #[serde(default)]
    pub reason: String,
}

fn default_status() -> String {
    STATUS_PENDING.to_string()
}

/// Page/limit pair for per-user listings. Out-of-range values fall back to
/// the defaults instead of failing the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaginationQuery {
    page: i64,
    limit: i64,
}

impl PaginationQuery {
    pub const DEFAULT_PAGE: i64 = 1;
    pub const DEFAULT_LIMIT: i64 = 10;
    pub const MAX_LIMIT: i64 = 100;

    pub fn new(page: Option<i64>, limit: Option<i64>) -> Self {
        let page = page.filter(|page| *page >= 1).unwrap_or(Self::DEFAULT_PAGE);
        let limit = limit
            .filter(|limit| (1..=Self::MAX_LIMIT).contains(limit))
            .unwrap_or(Self::DEFAULT_LIMIT);
        Self { page, limit }
    }

    pub fn page(&self) -> i64 {
        self.page
    }

    pub fn limit(&self) -> i64 {
        self.limit
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.limit)
    }
}

impl Default for PaginationQuery {
    fn default() -> Self {
        Self::new(None, None)
    }
}
