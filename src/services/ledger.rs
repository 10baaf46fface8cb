//! Lending ledger: the only place where stock and loan status change.
//!
//! Every operation runs as one store transaction under a bounded timeout. The item row
//! is locked before its stock is checked, so concurrent borrows of the same item are
//! serialized by the store and the last unit can never be handed out twice. A
//! transaction that fails for a transient reason is attempted once more; business-rule
//! failures are returned as they are.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::{
    config::LedgerConfig,
    error::{AppError, AppResult},
    models::loan::{Loan, LoanStatus, NewLoan},
    repository::{Store, StoreTx},
};

#[derive(Clone)]
pub struct LedgerService {
    store: Arc<dyn Store>,
    timeout: Duration,
}

impl LedgerService {
    pub fn new(store: Arc<dyn Store>, config: &LedgerConfig) -> Self {
        Self::with_timeout(store, Duration::from_millis(config.operation_timeout_ms))
    }

    pub fn with_timeout(store: Arc<dyn Store>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// Available units of an item
    pub async fn stock(&self, item_id: i64) -> AppResult<i32> {
        self.store.stock(item_id).await
    }

    /// Borrow one unit of `item_id` for `borrower_id` until `due_at`
    pub async fn open_loan(
        &self,
        item_id: i64,
        borrower_id: i64,
        due_at: DateTime<Utc>,
    ) -> AppResult<Loan> {
        if due_at <= Utc::now() {
            return Err(AppError::InvalidDueDate(format!(
                "due date {} is not in the future",
                due_at
            )));
        }

        self.run("open_loan", || self.try_open_loan(item_id, borrower_id, due_at))
            .await
    }

    /// Return the unit held by a loan. Valid from both active and overdue.
    pub async fn close_loan(&self, loan_id: i64) -> AppResult<Loan> {
        self.run("close_loan", || self.try_close_loan(loan_id)).await
    }

    /// Mark every unreturned active loan past its due date as overdue.
    /// Returns how many loans were transitioned.
    pub async fn sweep_overdue(&self) -> AppResult<u64> {
        self.run("sweep_overdue", || self.try_sweep_overdue()).await
    }

    async fn try_open_loan(
        &self,
        item_id: i64,
        borrower_id: i64,
        due_at: DateTime<Utc>,
    ) -> AppResult<Loan> {
        let borrowed_at = Utc::now();
        if due_at <= borrowed_at {
            return Err(AppError::InvalidDueDate(format!(
                "due date {} is not after borrow time {}",
                due_at, borrowed_at
            )));
        }

        let mut tx = self.store.begin().await?;

        let stock = tx
            .lock_stock(item_id)
            .await?
            .ok_or(AppError::ItemNotFound(item_id))?;
        if stock < 0 {
            return Err(AppError::Invariant(format!(
                "item {} has negative stock {}",
                item_id, stock
            )));
        }
        if stock == 0 {
            return Err(AppError::OutOfStock(item_id));
        }

        let remaining = tx.decrement_stock(item_id).await?;
        if remaining < 0 {
            return Err(AppError::Invariant(format!(
                "item {} stock went negative ({})",
                item_id, remaining
            )));
        }

        let loan = tx
            .insert_loan(&NewLoan {
                item_id,
                borrower_id,
                status: LoanStatus::Active,
                borrowed_at,
                due_at,
            })
            .await?;
        loan.check_consistency()?;

        tx.commit().await?;

        tracing::info!(
            loan_id = loan.id,
            item_id,
            borrower_id,
            remaining,
            "Loan opened"
        );
        Ok(loan)
    }

    async fn try_close_loan(&self, loan_id: i64) -> AppResult<Loan> {
        let mut tx = self.store.begin().await?;

        let loan = tx
            .lock_loan(loan_id)
            .await?
            .ok_or(AppError::LoanNotFound(loan_id))?;
        loan.check_consistency()?;

        if loan.status == LoanStatus::Returned {
            return Err(AppError::AlreadyReturned(loan_id));
        }
        ensure_transition(loan.status, LoanStatus::Returned)?;

        let returned = tx
            .update_status(loan_id, LoanStatus::Returned, Some(Utc::now()))
            .await?;
        returned.check_consistency()?;

        match tx.increment_stock(loan.item_id).await? {
            Some(stock) => tracing::debug!(item_id = loan.item_id, stock, "Stock restored"),
            None => tracing::warn!(
                loan_id,
                item_id = loan.item_id,
                "Returned loan references an item that no longer exists; stock not restored"
            ),
        }

        tx.commit().await?;

        tracing::info!(loan_id, item_id = loan.item_id, from = %loan.status, "Loan returned");
        Ok(returned)
    }

    async fn try_sweep_overdue(&self) -> AppResult<u64> {
        ensure_transition(LoanStatus::Active, LoanStatus::Overdue)?;

        let mut tx = self.store.begin().await?;
        let moved = tx
            .bulk_transition(LoanStatus::Active, LoanStatus::Overdue, Utc::now())
            .await?;
        tx.commit().await?;

        if moved > 0 {
            tracing::info!(moved, "Overdue sweep transitioned loans");
        }
        Ok(moved)
    }

    /// Run one transactional attempt under the timeout, retrying once on a transient failure.
    async fn run<T, F, Fut>(&self, op: &'static str, mut attempt: F) -> AppResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        let mut retried = false;
        loop {
            // A timed-out attempt is dropped here, which rolls its transaction back.
            let result = match tokio::time::timeout(self.timeout, attempt()).await {
                Ok(result) => result,
                Err(_) => Err(AppError::Unavailable(format!(
                    "{} timed out after {:?}",
                    op, self.timeout
                ))),
            };

            match result {
                Err(e) if e.is_transient() && !retried => {
                    tracing::warn!(op, error = %e, "Ledger transaction failed, retrying once");
                    retried = true;
                }
                Err(e) if e.is_transient() => {
                    return Err(match e {
                        AppError::Unavailable(msg) => AppError::Unavailable(msg),
                        other => AppError::Unavailable(format!("{}: {}", op, other)),
                    });
                }
                Err(e) if e.is_business() => {
                    tracing::debug!(op, reason = %e, "Ledger request rejected");
                    return Err(e);
                }
                Err(AppError::Invariant(msg)) => {
                    tracing::error!(op, "Ledger invariant violated: {}", msg);
                    return Err(AppError::Invariant(msg));
                }
                other => return other,
            }
        }
    }
}

/// Reject any status change outside the lifecycle table
fn ensure_transition(from: LoanStatus, to: LoanStatus) -> AppResult<()> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(AppError::Invariant(format!(
            "illegal loan transition {} -> {}",
            from, to
        )))
    }
}
