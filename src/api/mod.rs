//! API handlers for the lending ledger REST endpoints

pub mod health;
pub mod items;
pub mod loans;
pub mod openapi;

use axum::{
    async_trait,
    extract::{FromRequestParts, Query},
    http::request::Parts,
};
use serde::{de::DeserializeOwned, Deserialize};
use utoipa::IntoParams;

use crate::{error::AppError, AppState};

/// Header carrying the borrower id resolved by the upstream identity provider
pub const BORROWER_HEADER: &str = "x-borrower-id";

/// Borrower identity, trusted as supplied by the gateway
pub struct BorrowerIdentity(pub i64);

#[async_trait]
impl FromRequestParts<AppState> for BorrowerIdentity {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &AppState) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(BORROWER_HEADER)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| AppError::Authentication("Missing borrower identity".to_string()))?;

        let borrower_id = value
            .trim()
            .parse::<i64>()
            .map_err(|_| AppError::Authentication("Invalid borrower identity".to_string()))?;

        Ok(BorrowerIdentity(borrower_id))
    }
}

/// Query string extractor that reports malformed parameters as `BadRequest`
pub struct ApiQuery<T>(pub T);

#[async_trait]
impl<T, S> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state)
            .await
            .map_err(|rejection| AppError::BadRequest(rejection.body_text()))?;
        Ok(ApiQuery(value))
    }
}

/// Pagination query parameters
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PageQuery {
    /// Page number (default: 1)
    pub page: Option<i64>,
    /// Items per page (default and maximum from configuration)
    pub per_page: Option<i64>,
}
