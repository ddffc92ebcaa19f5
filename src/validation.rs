//! Field checks applied before a row is written.

use thiserror::Error;

use crate::models::{NewLeaveRequest, NewPurchaseRequest, NewUser, ROLE_ADMIN, ROLE_USER};

pub const USERNAME_MIN_LENGTH: usize = 3;
pub const USERNAME_MAX_LENGTH: usize = 50;
pub const MAX_EMAIL_LENGTH: usize = 254;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{0} cannot be empty")]
    Empty(&'static str),
    #[error("{field} must be between {min} and {max} characters")]
    Length {
        field: &'static str,
        min: usize,
        max: usize,
    },
    #[error("Invalid email: {0}")]
    InvalidEmail(&'static str),
    #[error("role must be one of: admin, user")]
    InvalidRole,
    #[error("{0} must be a positive integer")]
    NotPositive(&'static str),
    #[error("estimated_cost must be a non-negative number")]
    InvalidCost,
    #[error("start_date must not be after end_date")]
    DateRange,
}

pub fn validate_email(email: &str) -> Result<(), ValidationError> {
    if email.trim().is_empty() {
        return Err(ValidationError::Empty("email"));
    }
    if email.len() > MAX_EMAIL_LENGTH {
        return Err(ValidationError::InvalidEmail("too long"));
    }

    let Some((local, domain)) = email.split_once('@') else {
        return Err(ValidationError::InvalidEmail("must contain an @ symbol"));
    };
    if domain.contains('@') {
        return Err(ValidationError::InvalidEmail("must contain exactly one @ symbol"));
    }
    if local.is_empty() {
        return Err(ValidationError::InvalidEmail("missing local part"));
    }
    if domain.is_empty() {
        return Err(ValidationError::InvalidEmail("missing domain"));
    }
    if email.chars().any(char::is_whitespace) {
        return Err(ValidationError::InvalidEmail("contains whitespace"));
    }
    Ok(())
}

fn require(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::Empty(field))
    } else {
        Ok(())
    }
}

pub fn validate_user(user: &NewUser) -> Result<(), ValidationError> {
    require("username", &user.username)?;
    let length = user.username.chars().count();
    if !(USERNAME_MIN_LENGTH..=USERNAME_MAX_LENGTH).contains(&length) {
        return Err(ValidationError::Length {
            field: "username",
            min: USERNAME_MIN_LENGTH,
            max: USERNAME_MAX_LENGTH,
        });
    }
    validate_email(&user.email)?;
    if user.password_hash.is_empty() {
        return Err(ValidationError::Empty("password_hash"));
    }
    require("first_name", &user.first_name)?;
    require("last_name", &user.last_name)?;
    if user.role != ROLE_ADMIN && user.role != ROLE_USER {
        return Err(ValidationError::InvalidRole);
    }
    Ok(())
}

pub fn validate_leave_request(request: &NewLeaveRequest) -> Result<(), ValidationError> {
    if request.user_id < 1 {
        return Err(ValidationError::NotPositive("user_id"));
    }
    require("leave_type", &request.leave_type)?;
    if request.start_date > request.end_date {
        return Err(ValidationError::DateRange);
    }
    Ok(())
}

pub fn validate_purchase_request(request: &NewPurchaseRequest) -> Result<(), ValidationError> {
    if request.user_id < 1 {
        return Err(ValidationError::NotPositive("user_id"));
    }
    require("item_name", &request.item_name)?;
    if request.quantity < 1 {
        return Err(ValidationError::NotPositive("quantity"));
    }
    if !request.estimated_cost.is_finite() || request.estimated_cost < 0.0 {
        return Err(ValidationError::InvalidCost);
    }
    Ok(())
}
