use serde::Deserialize;

use crate::{error::AppError, models::PaginationQuery};

/// Parses a numeric path segment, answering 400 with `message` when it is not a positive id.
pub fn parse_id(raw: &str, message: &'static str) -> Result<i32, AppError> {
    match raw.trim().parse::<i32>() {
        Ok(id) if id >= 1 => Ok(id),
        _ => Err(AppError::bad_request(message)),
    }
}

/// Raw `page`/`limit` query parameters. Kept as strings so garbage falls back
/// to the defaults instead of rejecting the request.
#[derive(Debug, Default, Deserialize)]
pub struct PageParams {
    page: Option<String>,
    limit: Option<String>,
}

impl PageParams {
    pub fn pagination(&self) -> PaginationQuery {
        let parse = |value: &Option<String>| value.as_deref().and_then(|raw| raw.trim().parse().ok());
        PaginationQuery::new(parse(&self.page), parse(&self.limit))
    }
}
