use async_trait::async_trait;
use chrono::Utc;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use thiserror::Error;
use tokio::task;

use crate::{
    auth::PasswordCipher,
    db::PgPool,
    models::{
        LeaveRequest, NewLeaveRequest, NewPurchaseRequest, NewUser, PaginationQuery,
        PurchaseRequest, User,
    },
    schema::{leave_requests, purchase_requests, users},
};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("record not found")]
    NotFound,
    #[error("database error: {0}")]
    Database(#[source] diesel::result::Error),
    #[error("connection pool error: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),
    #[error("password cipher error: {0}")]
    Cipher(#[source] anyhow::Error),
    #[error("database task failed: {0}")]
    Task(#[from] task::JoinError),
}

impl From<diesel::result::Error> for RepositoryError {
    fn from(value: diesel::result::Error) -> Self {
        match value {
            diesel::result::Error::NotFound => RepositoryError::NotFound,
            other => RepositoryError::Database(other),
        }
    }
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Durable store for users and their requests.
///
/// Implementations own password encryption: callers hand in and receive the
/// plaintext `password_hash`, while the stored column holds ciphertext.
#[async_trait]
pub trait Repository: Send + Sync + 'static {
    async fn create_user(&self, user: NewUser) -> RepositoryResult<User>;
    async fn get_user(&self, id: i32) -> RepositoryResult<User>;
    async fn update_user(&self, id: i32, user: NewUser) -> RepositoryResult<User>;
    async fn delete_user(&self, id: i32) -> RepositoryResult<()>;

    async fn create_leave_request(&self, request: NewLeaveRequest) -> RepositoryResult<LeaveRequest>;
    async fn get_leave_request(&self, id: i32) -> RepositoryResult<LeaveRequest>;
    async fn update_leave_request(
        &self,
        id: i32,
        request: NewLeaveRequest,
    ) -> RepositoryResult<LeaveRequest>;
    async fn delete_leave_request(&self, id: i32) -> RepositoryResult<()>;
    async fn list_leave_requests(
        &self,
        user_id: i32,
        pagination: PaginationQuery,
    ) -> RepositoryResult<Vec<LeaveRequest>>;

    async fn create_purchase_request(
        &self,
        request: NewPurchaseRequest,
    ) -> RepositoryResult<PurchaseRequest>;
    async fn get_purchase_request(&self, id: i32) -> RepositoryResult<PurchaseRequest>;
    async fn update_purchase_request(
        &self,
        id: i32,
        request: NewPurchaseRequest,
    ) -> RepositoryResult<PurchaseRequest>;
    async fn delete_purchase_request(&self, id: i32) -> RepositoryResult<()>;
    async fn list_purchase_requests(
        &self,
        user_id: i32,
        pagination: PaginationQuery,
    ) -> RepositoryResult<Vec<PurchaseRequest>>;
}

pub struct PgRepository {
    pool: PgPool,
    cipher: PasswordCipher,
}

impl PgRepository {
    pub fn new(pool: PgPool, cipher: PasswordCipher) -> Self {
        Self { pool, cipher }
    }

    async fn run<T, F>(&self, op: F) -> RepositoryResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut PgConnection) -> RepositoryResult<T> + Send + 'static,
    {
        let pool = self.pool.clone();
        task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            op(&mut conn)
        })
        .await?
    }

    fn seal(&self, mut user: NewUser) -> RepositoryResult<NewUser> {
        user.password_hash = self
            .cipher
            .encrypt(&user.password_hash)
            .map_err(RepositoryError::Cipher)?;
        Ok(user)
    }

    fn open(&self, mut user: User) -> RepositoryResult<User> {
        user.password_hash = self
            .cipher
            .decrypt(&user.password_hash)
            .map_err(RepositoryError::Cipher)?;
        Ok(user)
    }
}

fn expect_deleted(affected: usize) -> RepositoryResult<()> {
    if affected == 0 {
        Err(RepositoryError::NotFound)
    } else {
        Ok(())
    }
}

#[async_trait]
impl Repository for PgRepository {
    async fn create_user(&self, user: NewUser) -> RepositoryResult<User> {
        let sealed = self.seal(user)?;
        let stored = self
            .run(move |conn| {
                diesel::insert_into(users::table)
                    .values(&sealed)
                    .get_result::<User>(conn)
                    .map_err(RepositoryError::from)
            })
            .await?;
        self.open(stored)
    }

    async fn get_user(&self, id: i32) -> RepositoryResult<User> {
        let stored = self
            .run(move |conn| {
                users::table
                    .find(id)
                    .first::<User>(conn)
                    .map_err(RepositoryError::from)
            })
            .await?;
        self.open(stored)
    }

    async fn update_user(&self, id: i32, user: NewUser) -> RepositoryResult<User> {
        let sealed = self.seal(user)?;
        let stored = self
            .run(move |conn| {
                diesel::update(users::table.find(id))
                    .set((&sealed, users::updated_at.eq(Utc::now())))
                    .get_result::<User>(conn)
                    .map_err(RepositoryError::from)
            })
            .await?;
        self.open(stored)
    }

    async fn delete_user(&self, id: i32) -> RepositoryResult<()> {
        self.run(move |conn| {
            let affected = diesel::delete(users::table.find(id)).execute(conn)?;
            expect_deleted(affected)
        })
        .await
    }

    async fn create_leave_request(&self, request: NewLeaveRequest) -> RepositoryResult<LeaveRequest> {
        self.run(move |conn| {
            diesel::insert_into(leave_requests::table)
                .values(&request)
                .get_result::<LeaveRequest>(conn)
                .map_err(RepositoryError::from)
        })
        .await
    }

    async fn get_leave_request(&self, id: i32) -> RepositoryResult<LeaveRequest> {
        self.run(move |conn| {
            leave_requests::table
                .find(id)
                .first::<LeaveRequest>(conn)
                .map_err(RepositoryError::from)
        })
        .await
    }

    async fn update_leave_request(
        &self,
        id: i32,
        request: NewLeaveRequest,
    ) -> RepositoryResult<LeaveRequest> {
        self.run(move |conn| {
            diesel::update(leave_requests::table.find(id))
                .set((&request, leave_requests::updated_at.eq(Utc::now())))
                .get_result::<LeaveRequest>(conn)
                .map_err(RepositoryError::from)
        })
        .await
    }

    async fn delete_leave_request(&self, id: i32) -> RepositoryResult<()> {
        self.run(move |conn| {
            let affected = diesel::delete(leave_requests::table.find(id)).execute(conn)?;
            expect_deleted(affected)
        })
        .await
    }

    async fn list_leave_requests(
        &self,
        user_id: i32,
        pagination: PaginationQuery,
    ) -> RepositoryResult<Vec<LeaveRequest>> {
        self.run(move |conn| {
            leave_requests::table
                .filter(leave_requests::user_id.eq(user_id))
                .order((leave_requests::created_at.desc(), leave_requests::id.desc()))
                .limit(pagination.limit())
                .offset(pagination.offset())
                .load::<LeaveRequest>(conn)
                .map_err(RepositoryError::from)
        })
        .await
    }

    async fn create_purchase_request(
        &self,
        request: NewPurchaseRequest,
    ) -> RepositoryResult<PurchaseRequest> {
        self.run(move |conn| {
            diesel::insert_into(purchase_requests::table)
                .values(&request)
                .get_result::<PurchaseRequest>(conn)
                .map_err(RepositoryError::from)
        })
        .await
    }

    async fn get_purchase_request(&self, id: i32) -> RepositoryResult<PurchaseRequest> {
        self.run(move |conn| {
            purchase_requests::table
                .find(id)
                .first::<PurchaseRequest>(conn)
                .map_err(RepositoryError::from)
        })
        .await
    }

    async fn update_purchase_request(
        &self,
        id: i32,
        request: NewPurchaseRequest,
    ) -> RepositoryResult<PurchaseRequest> {
        self.run(move |conn| {
            diesel::update(purchase_requests::table.find(id))
                .set((&request, purchase_requests::updated_at.eq(Utc::now())))
                .get_result::<PurchaseRequest>(conn)
                .map_err(RepositoryError::from)
        })
        .await
    }

    async fn delete_purchase_request(&self, id: i32) -> RepositoryResult<()> {
        self.run(move |conn| {
            let affected = diesel::delete(purchase_requests::table.find(id)).execute(conn)?;
            expect_deleted(affected)
        })
        .await
    }

    async fn list_purchase_requests(
        &self,
        user_id: i32,
        pagination: PaginationQuery,
    ) -> RepositoryResult<Vec<PurchaseRequest>> {
        self.run(move |conn| {
            purchase_requests::table
                .filter(purchase_requests::user_id.eq(user_id))
                .order((
                    purchase_requests::created_at.desc(),
                    purchase_requests::id.desc(),
                ))
                .limit(pagination.limit())
                .offset(pagination.offset())
                .load::<PurchaseRequest>(conn)
                .map_err(RepositoryError::from)
        })
        .await
    }
}
