//! OpenAPI documentation

use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{health, items, loans};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Lending Ledger API",
        version = "1.0.0",
        description = "Borrow, return and overdue tracking for a shared pool of library items",
        license(name = "AGPL-3.0", url = "https://www.gnu.org/licenses/agpl-3.0.html")
    ),
    servers(
        (url = "/api/v1", description = "API v1")
    ),
    paths(
        // Health
        health::health_check,
        health::readiness_check,
        // Loans
        loans::create_loan,
        loans::get_loan,
        loans::return_loan,
        loans::list_loans,
        loans::list_overdue,
        loans::my_loans,
        loans::sweep_overdue,
        // Items
        items::get_stock,
        items::most_borrowed,
    ),
    components(
        schemas(
            loans::CreateLoanRequest,
            loans::LoanResponse,
            loans::LoanListResponse,
            loans::SweepResponse,
            crate::models::loan::LoanStatus,
            crate::models::loan::BorrowCount,
            crate::models::item::ItemStock,
            health::HealthResponse,
            crate::error::ErrorResponse,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "loans", description = "Borrowing, returns and loan queries"),
        (name = "items", description = "Item stock and rankings")
    )
)]
pub struct ApiDoc;

/// Create the OpenAPI documentation router
pub fn create_openapi_router() -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
