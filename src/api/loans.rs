//! Loan endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::loan::{Loan, LoanFilter, LoanStatus},
    services::loans::LoanPage,
    AppState,
};

use super::{ApiQuery, BorrowerIdentity, PageQuery};

/// Borrow request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateLoanRequest {
    /// Item to borrow
    #[validate(range(min = 1, message = "item_id must be positive"))]
    pub item_id: i64,
    /// Due date (ISO 8601), strictly in the future
    pub due_at: DateTime<Utc>,
}

/// Loan with its computed overdue flag
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LoanResponse {
    pub id: i64,
    pub item_id: i64,
    pub borrower_id: i64,
    pub status: LoanStatus,
    pub borrowed_at: DateTime<Utc>,
    pub due_at: DateTime<Utc>,
    pub returned_at: Option<DateTime<Utc>>,
    /// Due date passed and not yet returned
    pub is_overdue: bool,
}

impl From<Loan> for LoanResponse {
    fn from(loan: Loan) -> Self {
        let is_overdue = loan.is_overdue_at(Utc::now());
        Self {
            id: loan.id,
            item_id: loan.item_id,
            borrower_id: loan.borrower_id,
            status: loan.status,
            borrowed_at: loan.borrowed_at,
            due_at: loan.due_at,
            returned_at: loan.returned_at,
            is_overdue,
        }
    }
}

/// Paginated loan list
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LoanListResponse {
    pub items: Vec<LoanResponse>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
    pub total_pages: i64,
}

impl From<LoanPage> for LoanListResponse {
    fn from(page: LoanPage) -> Self {
        Self {
            items: page.items.into_iter().map(LoanResponse::from).collect(),
            total: page.total,
            page: page.page,
            per_page: page.per_page,
            total_pages: page.total_pages,
        }
    }
}

/// Sweep result
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SweepResponse {
    /// Loans moved from active to overdue
    pub transitioned: u64,
}

/// Borrow an item
#[utoipa::path(
    post,
    path = "/loans",
    tag = "loans",
    params(("x-borrower-id" = i64, Header, description = "Borrower id from the identity provider")),
    request_body = CreateLoanRequest,
    responses(
        (status = 201, description = "Loan created", body = LoanResponse),
        (status = 400, description = "Invalid request or due date"),
        (status = 401, description = "Missing borrower identity"),
        (status = 404, description = "Item not found"),
        (status = 409, description = "Item out of stock"),
        (status = 503, description = "Storage unavailable, retry later")
    )
)]
pub async fn create_loan(
    State(state): State<AppState>,
    BorrowerIdentity(borrower_id): BorrowerIdentity,
    Json(request): Json<CreateLoanRequest>,
) -> AppResult<(StatusCode, Json<LoanResponse>)> {
    request
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let loan = state
        .services
        .ledger
        .open_loan(request.item_id, borrower_id, request.due_at)
        .await?;

    Ok((StatusCode::CREATED, Json(loan.into())))
}

/// Get a loan by ID
#[utoipa::path(
    get,
    path = "/loans/{id}",
    tag = "loans",
    params(("id" = i64, Path, description = "Loan ID")),
    responses(
        (status = 200, description = "Loan", body = LoanResponse),
        (status = 404, description = "Loan not found")
    )
)]
pub async fn get_loan(
    State(state): State<AppState>,
    Path(loan_id): Path<i64>,
) -> AppResult<Json<LoanResponse>> {
    let loan = state.services.loans.get(loan_id).await?;
    Ok(Json(loan.into()))
}

/// Return a borrowed item
#[utoipa::path(
    post,
    path = "/loans/{id}/return",
    tag = "loans",
    params(("id" = i64, Path, description = "Loan ID")),
    responses(
        (status = 200, description = "Loan returned", body = LoanResponse),
        (status = 404, description = "Loan not found"),
        (status = 409, description = "Loan already returned"),
        (status = 503, description = "Storage unavailable, retry later")
    )
)]
pub async fn return_loan(
    State(state): State<AppState>,
    Path(loan_id): Path<i64>,
) -> AppResult<Json<LoanResponse>> {
    let loan = state.services.ledger.close_loan(loan_id).await?;
    Ok(Json(loan.into()))
}

/// List loans with filters and pagination
#[utoipa::path(
    get,
    path = "/loans",
    tag = "loans",
    params(LoanFilter, PageQuery),
    responses(
        (status = 200, description = "Loans, newest first", body = LoanListResponse)
    )
)]
pub async fn list_loans(
    State(state): State<AppState>,
    ApiQuery(filter): ApiQuery<LoanFilter>,
    ApiQuery(page): ApiQuery<PageQuery>,
) -> AppResult<Json<LoanListResponse>> {
    let loans = state
        .services
        .loans
        .search(&filter, page.page, page.per_page)
        .await?;
    Ok(Json(loans.into()))
}

/// List overdue loans (sweeps first)
#[utoipa::path(
    get,
    path = "/loans/overdue",
    tag = "loans",
    params(PageQuery),
    responses(
        (status = 200, description = "Overdue loans, newest first", body = LoanListResponse)
    )
)]
pub async fn list_overdue(
    State(state): State<AppState>,
    ApiQuery(page): ApiQuery<PageQuery>,
) -> AppResult<Json<LoanListResponse>> {
    let loans = state
        .services
        .loans
        .search(&LoanFilter::overdue(), page.page, page.per_page)
        .await?;
    Ok(Json(loans.into()))
}

/// Loans of the calling borrower
#[utoipa::path(
    get,
    path = "/loans/mine",
    tag = "loans",
    params(
        ("x-borrower-id" = i64, Header, description = "Borrower id from the identity provider"),
        PageQuery
    ),
    responses(
        (status = 200, description = "The borrower's loans, newest first", body = LoanListResponse),
        (status = 401, description = "Missing borrower identity")
    )
)]
pub async fn my_loans(
    State(state): State<AppState>,
    BorrowerIdentity(borrower_id): BorrowerIdentity,
    ApiQuery(page): ApiQuery<PageQuery>,
) -> AppResult<Json<LoanListResponse>> {
    let loans = state
        .services
        .loans
        .search(&LoanFilter::for_borrower(borrower_id), page.page, page.per_page)
        .await?;
    Ok(Json(loans.into()))
}

/// Run the overdue sweep now
#[utoipa::path(
    post,
    path = "/loans/sweep",
    tag = "loans",
    responses(
        (status = 200, description = "Sweep completed", body = SweepResponse),
        (status = 503, description = "Storage unavailable, retry later")
    )
)]
pub async fn sweep_overdue(State(state): State<AppState>) -> AppResult<Json<SweepResponse>> {
    let transitioned = state.services.ledger.sweep_overdue().await?;
    Ok(Json(SweepResponse { transitioned }))
}
