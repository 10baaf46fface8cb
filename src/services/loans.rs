//! Read-only loan queries

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    config::LedgerConfig,
    error::{AppError, AppResult},
    models::loan::{BorrowCount, Loan, LoanFilter},
    repository::Store,
    services::ledger::LedgerService,
};

/// Page of loans with totals
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LoanPage {
    pub items: Vec<Loan>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
    pub total_pages: i64,
}

#[derive(Clone)]
pub struct LoansService {
    store: Arc<dyn Store>,
    ledger: LedgerService,
    default_page_size: i64,
    max_page_size: i64,
    most_borrowed_limit: i64,
}

impl LoansService {
    pub fn new(store: Arc<dyn Store>, ledger: LedgerService, config: &LedgerConfig) -> Self {
        Self {
            store,
            ledger,
            default_page_size: config.default_page_size.max(1),
            max_page_size: config.max_page_size,
            most_borrowed_limit: config.most_borrowed_limit,
        }
    }

    /// Get a loan by ID
    pub async fn get(&self, loan_id: i64) -> AppResult<Loan> {
        self.store.get_loan(loan_id).await
    }

    /// Loans matching `filter`, newest first
    pub async fn list(&self, filter: &LoanFilter, limit: i64, offset: i64) -> AppResult<Vec<Loan>> {
        self.refresh_overdue(filter).await?;
        self.store
            .list_loans(filter, limit.max(0), offset.max(0))
            .await
    }

    pub async fn count(&self, filter: &LoanFilter) -> AppResult<i64> {
        self.refresh_overdue(filter).await?;
        self.store.count_loans(filter).await
    }

    /// One page of loans plus the total across all pages.
    /// Out-of-range page sizes fall back to the default; pages start at 1.
    pub async fn search(
        &self,
        filter: &LoanFilter,
        page: Option<i64>,
        per_page: Option<i64>,
    ) -> AppResult<LoanPage> {
        let page = page.filter(|p| *p >= 1).unwrap_or(1);
        let per_page = per_page
            .filter(|n| (1..=self.max_page_size).contains(n))
            .unwrap_or(self.default_page_size);

        let offset = (page - 1)
            .checked_mul(per_page)
            .ok_or_else(|| AppError::BadRequest(format!("page {} is out of range", page)))?;

        self.refresh_overdue(filter).await?;
        let items = self.store.list_loans(filter, per_page, offset).await?;
        let total = self.store.count_loans(filter).await?;

        Ok(LoanPage {
            items,
            total,
            page,
            per_page,
            total_pages: (total + per_page - 1) / per_page,
        })
    }

    /// Items ranked by number of loans. A non-positive limit uses the configured default.
    pub async fn most_borrowed(&self, limit: i64) -> AppResult<Vec<BorrowCount>> {
        let limit = if limit > 0 { limit } else { self.most_borrowed_limit };
        self.store.most_borrowed(limit).await
    }

    // Overdue views read the persisted status, so bring it up to date first.
    async fn refresh_overdue(&self, filter: &LoanFilter) -> AppResult<()> {
        if filter.overdue {
            self.ledger.sweep_overdue().await?;
        }
        Ok(())
    }
}
