//! Operation set behind the HTTP handlers.
//!
//! Every method logs what it is about to do, delegates to the repository or an
//! upstream client, and turns failures into an [`AppError`] whose message is
//! safe to show to the caller. The underlying cause travels as the error
//! source and is logged here.

use std::sync::Arc;

use serde_json::Value;
use tracing::{error, info, warn};

use crate::{
    auth::SessionToken,
    clients::{ErpClient, ErpError, IntentResponse, NlpClient, UserInput},
    error::{AppError, AppResult, ErrorKind},
    models::{
        LeaveRequest, NewLeaveRequest, NewPurchaseRequest, NewUser, PaginationQuery,
        PurchaseRequest, User,
    },
    repository::{Repository, RepositoryError},
    validation::{validate_leave_request, validate_purchase_request, validate_user},
};

pub const TEST_LOGIN_CREDENTIAL: &str = "test";
pub const TEST_LOGIN_TOKEN: &str = "temporary_test_token";

const USER_NOT_FOUND: &str = "User not found";
const LEAVE_NOT_FOUND: &str = "Leave request not found";
const PURCHASE_NOT_FOUND: &str = "Purchase request not found";

pub struct Service {
    repository: Arc<dyn Repository>,
    nlp: NlpClient,
    erp: ErpClient,
    enable_test_login: bool,
}

fn repository_failure(err: RepositoryError, not_found: &str, failure: &str) -> AppError {
    match err {
        RepositoryError::NotFound => AppError::not_found(not_found),
        RepositoryError::Cipher(_) => {
            error!(error = %err, "{failure}");
            AppError::new(ErrorKind::Internal, failure).with_source(err)
        }
        other => {
            error!(error = %other, "{failure}");
            AppError::new(ErrorKind::Database, failure).with_source(other)
        }
    }
}

impl Service {
    pub fn new(
        repository: Arc<dyn Repository>,
        nlp: NlpClient,
        erp: ErpClient,
        enable_test_login: bool,
    ) -> Self {
        if enable_test_login {
            warn!("test login bypass is enabled; disable ENABLE_TEST_LOGIN in production");
        }
        Self {
            repository,
            nlp,
            erp,
            enable_test_login,
        }
    }

    pub async fn create_user(&self, user: NewUser) -> AppResult<User> {
        info!(username = %user.username, "creating user");
        validate_user(&user)?;
        self.repository
            .create_user(user)
            .await
            .map_err(|err| repository_failure(err, USER_NOT_FOUND, "Failed to create user"))
    }

    pub async fn get_user(&self, id: i32) -> AppResult<User> {
        info!(user_id = id, "getting user");
        self.repository
            .get_user(id)
            .await
            .map_err(|err| repository_failure(err, USER_NOT_FOUND, "Failed to get user"))
    }

    pub async fn update_user(&self, id: i32, user: NewUser) -> AppResult<User> {
        info!(user_id = id, "updating user");
        validate_user(&user)?;
        self.repository
            .update_user(id, user)
            .await
            .map_err(|err| repository_failure(err, USER_NOT_FOUND, "Failed to update user"))
    }

    pub async fn delete_user(&self, id: i32) -> AppResult<()> {
        info!(user_id = id, "deleting user");
        self.repository
            .delete_user(id)
            .await
            .map_err(|err| repository_failure(err, USER_NOT_FOUND, "Failed to delete user"))
    }

    pub async fn create_leave_request(&self, request: NewLeaveRequest) -> AppResult<LeaveRequest> {
        info!(user_id = request.user_id, "creating leave request");
        validate_leave_request(&request)?;
        self.repository
            .create_leave_request(request)
            .await
            .map_err(|err| {
                repository_failure(err, LEAVE_NOT_FOUND, "Failed to create leave request")
            })
    }

    pub async fn get_leave_request(&self, id: i32) -> AppResult<LeaveRequest> {
        info!(leave_request_id = id, "getting leave request");
        self.repository
            .get_leave_request(id)
            .await
            .map_err(|err| repository_failure(err, LEAVE_NOT_FOUND, "Failed to get leave request"))
    }

    pub async fn update_leave_request(
        &self,
        id: i32,
        request: NewLeaveRequest,
    ) -> AppResult<LeaveRequest> {
        info!(leave_request_id = id, "updating leave request");
        validate_leave_request(&request)?;
        self.repository
            .update_leave_request(id, request)
            .await
            .map_err(|err| {
                repository_failure(err, LEAVE_NOT_FOUND, "Failed to update leave request")
            })
    }

    pub async fn delete_leave_request(&self, id: i32) -> AppResult<()> {
        info!(leave_request_id = id, "deleting leave request");
        self.repository
            .delete_leave_request(id)
            .await
            .map_err(|err| {
                repository_failure(err, LEAVE_NOT_FOUND, "Failed to delete leave request")
            })
    }

    pub async fn leave_requests_for_user(
        &self,
        user_id: i32,
        pagination: PaginationQuery,
    ) -> AppResult<Vec<LeaveRequest>> {
        info!(
            user_id,
            page = pagination.page(),
            limit = pagination.limit(),
            "listing leave requests"
        );
        self.repository
            .list_leave_requests(user_id, pagination)
            .await
            .map_err(|err| repository_failure(err, LEAVE_NOT_FOUND, "Failed to get leave requests"))
    }

    pub async fn create_purchase_request(
        &self,
        request: NewPurchaseRequest,
    ) -> AppResult<PurchaseRequest> {
        info!(user_id = request.user_id, item = %request.item_name, "creating purchase request");
        validate_purchase_request(&request)?;
        self.repository
            .create_purchase_request(request)
            .await
            .map_err(|err| {
                repository_failure(err, PURCHASE_NOT_FOUND, "Failed to create purchase request")
            })
    }

    pub async fn get_purchase_request(&self, id: i32) -> AppResult<PurchaseRequest> {
        info!(purchase_request_id = id, "getting purchase request");
        self.repository
            .get_purchase_request(id)
            .await
            .map_err(|err| {
                repository_failure(err, PURCHASE_NOT_FOUND, "Failed to get purchase request")
            })
    }

    pub async fn update_purchase_request(
        &self,
        id: i32,
        request: NewPurchaseRequest,
    ) -> AppResult<PurchaseRequest> {
        info!(purchase_request_id = id, "updating purchase request");
        validate_purchase_request(&request)?;
        self.repository
            .update_purchase_request(id, request)
            .await
            .map_err(|err| {
                repository_failure(err, PURCHASE_NOT_FOUND, "Failed to update purchase request")
            })
    }

    pub async fn delete_purchase_request(&self, id: i32) -> AppResult<()> {
        info!(purchase_request_id = id, "deleting purchase request");
        self.repository
            .delete_purchase_request(id)
            .await
            .map_err(|err| {
                repository_failure(err, PURCHASE_NOT_FOUND, "Failed to delete purchase request")
            })
    }

    pub async fn purchase_requests_for_user(
        &self,
        user_id: i32,
        pagination: PaginationQuery,
    ) -> AppResult<Vec<PurchaseRequest>> {
        info!(
            user_id,
            page = pagination.page(),
            limit = pagination.limit(),
            "listing purchase requests"
        );
        self.repository
            .list_purchase_requests(user_id, pagination)
            .await
            .map_err(|err| {
                repository_failure(err, PURCHASE_NOT_FOUND, "Failed to get purchase requests")
            })
    }

    /// Probes the ERP with the user's credentials and returns an encoded session token.
    pub async fn login(&self, personnel_number: &str, password: &str) -> AppResult<String> {
        info!(personnel_number, "logging in");
        if personnel_number.is_empty() || password.is_empty() {
            return Err(AppError::validation(
                "personnel_number and password are required",
            ));
        }
        if personnel_number.contains(':') {
            return Err(AppError::validation(
                "personnel_number must not contain ':'",
            ));
        }

        if self.enable_test_login
            && personnel_number == TEST_LOGIN_CREDENTIAL
            && password == TEST_LOGIN_CREDENTIAL
        {
            warn!("test login bypass used");
            return Ok(TEST_LOGIN_TOKEN.to_string());
        }

        match self.erp.login(personnel_number, password).await {
            Ok(session) => Ok(session.encode()),
            Err(ErpError::Rejected(status)) => {
                warn!(personnel_number, %status, "ERP rejected login");
                Err(AppError::new(ErrorKind::Authentication, "Invalid credentials"))
            }
            Err(err) => {
                error!(personnel_number, error = %err, "ERP login failed");
                Err(AppError::new(ErrorKind::Internal, "ERP login failed").with_source(err))
            }
        }
    }

    pub async fn send_leave_request(
        &self,
        session: &SessionToken,
        start_date: &str,
        end_date: &str,
    ) -> AppResult<Value> {
        info!(
            personnel_number = %session.personnel_number,
            start_date,
            end_date,
            "sending leave request to ERP"
        );
        if start_date.trim().is_empty() || end_date.trim().is_empty() {
            return Err(AppError::validation("start_date and end_date are required"));
        }

        self.erp
            .submit_leave(session, start_date, end_date)
            .await
            .map_err(|err| {
                error!(personnel_number = %session.personnel_number, error = %err, "ERP leave submission failed");
                AppError::new(ErrorKind::Internal, "Failed to send leave request").with_source(err)
            })
    }

    pub async fn process_message(&self, input: UserInput) -> AppResult<IntentResponse> {
        info!(
            personnel_number = %input.personnel_number,
            text_len = input.text.len(),
            "classifying message"
        );
        self.nlp.classify(&input.text).await.map_err(|err| {
            error!(error = %err, "Error classifying intent");
            AppError::new(ErrorKind::Internal, "Error classifying intent").with_source(err)
        })
    }
}
