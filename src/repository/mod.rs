//! Repository layer: the item pool and loan record store behind one transactional seam

pub mod items;
pub mod loans;
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, Pool, Postgres, Transaction};

use crate::{
    error::{AppError, AppResult},
    models::loan::{BorrowCount, Loan, LoanFilter, LoanStatus, NewLoan},
};

pub use memory::MemoryStore;

/// One open store transaction.
///
/// Dropping a transaction without calling [`StoreTx::commit`] rolls back every change
/// made through it. Row reads named `lock_*` hold the row until the transaction ends.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StoreTx: Send {
    /// Current stock of an item, `None` when the item does not exist
    async fn lock_stock(&mut self, item_id: i64) -> AppResult<Option<i32>>;

    /// Take one unit; fails with `ItemNotFound` or `OutOfStock`
    async fn decrement_stock(&mut self, item_id: i64) -> AppResult<i32>;

    /// Give one unit back; `None` when the item no longer exists
    async fn increment_stock(&mut self, item_id: i64) -> AppResult<Option<i32>>;

    async fn insert_loan(&mut self, loan: &NewLoan) -> AppResult<Loan>;

    async fn lock_loan(&mut self, loan_id: i64) -> AppResult<Option<Loan>>;

    async fn update_status(
        &mut self,
        loan_id: i64,
        status: LoanStatus,
        returned_at: Option<DateTime<Utc>>,
    ) -> AppResult<Loan>;

    async fn bulk_transition(
        &mut self,
        from: LoanStatus,
        to: LoanStatus,
        cutoff: DateTime<Utc>,
    ) -> AppResult<u64>;

    async fn commit(&mut self) -> AppResult<()>;
}

/// Backing store shared by the ledger and the query layer.
///
/// Reads outside a transaction always hit persisted state; nothing is cached.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Store: Send + Sync {
    async fn begin(&self) -> AppResult<Box<dyn StoreTx>>;

    async fn ping(&self) -> AppResult<()>;

    async fn stock(&self, item_id: i64) -> AppResult<i32>;

    async fn get_loan(&self, loan_id: i64) -> AppResult<Loan>;

    async fn list_loans(&self, filter: &LoanFilter, limit: i64, offset: i64)
        -> AppResult<Vec<Loan>>;

    async fn count_loans(&self, filter: &LoanFilter) -> AppResult<i64>;

    async fn most_borrowed(&self, limit: i64) -> AppResult<Vec<BorrowCount>>;
}

/// PostgreSQL-backed store holding the connection pool
#[derive(Clone)]
pub struct Repository {
    pub pool: Pool<Postgres>,
    pub items: items::ItemsRepository,
    pub loans: loans::LoansRepository,
}

impl Repository {
    /// Create a new repository with the given database pool
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self {
            items: items::ItemsRepository::new(pool.clone()),
            loans: loans::LoansRepository::new(pool.clone()),
            pool,
        }
    }
}

#[async_trait]
impl Store for Repository {
    async fn begin(&self) -> AppResult<Box<dyn StoreTx>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgStoreTx { tx: Some(tx) }))
    }

    async fn ping(&self) -> AppResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn stock(&self, item_id: i64) -> AppResult<i32> {
        self.items.get_stock(item_id).await
    }

    async fn get_loan(&self, loan_id: i64) -> AppResult<Loan> {
        self.loans.get_by_id(loan_id).await
    }

    async fn list_loans(
        &self,
        filter: &LoanFilter,
        limit: i64,
        offset: i64,
    ) -> AppResult<Vec<Loan>> {
        self.loans.list_filtered(filter, limit, offset).await
    }

    async fn count_loans(&self, filter: &LoanFilter) -> AppResult<i64> {
        self.loans.count_filtered(filter).await
    }

    async fn most_borrowed(&self, limit: i64) -> AppResult<Vec<BorrowCount>> {
        self.loans.most_borrowed(limit).await
    }
}

/// A PostgreSQL transaction; sqlx rolls it back when dropped uncommitted
pub struct PgStoreTx {
    tx: Option<Transaction<'static, Postgres>>,
}

impl PgStoreTx {
    fn conn(&mut self) -> AppResult<&mut PgConnection> {
        self.tx
            .as_deref_mut()
            .ok_or_else(|| AppError::Internal("transaction already committed".to_string()))
    }
}

#[async_trait]
impl StoreTx for PgStoreTx {
    async fn lock_stock(&mut self, item_id: i64) -> AppResult<Option<i32>> {
        items::ItemsRepository::lock_stock(self.conn()?, item_id).await
    }

    async fn decrement_stock(&mut self, item_id: i64) -> AppResult<i32> {
        items::ItemsRepository::decrement(self.conn()?, item_id).await
    }

    async fn increment_stock(&mut self, item_id: i64) -> AppResult<Option<i32>> {
        items::ItemsRepository::increment(self.conn()?, item_id).await
    }

    async fn insert_loan(&mut self, loan: &NewLoan) -> AppResult<Loan> {
        loans::LoansRepository::insert(self.conn()?, loan).await
    }

    async fn lock_loan(&mut self, loan_id: i64) -> AppResult<Option<Loan>> {
        loans::LoansRepository::lock(self.conn()?, loan_id).await
    }

    async fn update_status(
        &mut self,
        loan_id: i64,
        status: LoanStatus,
        returned_at: Option<DateTime<Utc>>,
    ) -> AppResult<Loan> {
        loans::LoansRepository::update_status(self.conn()?, loan_id, status, returned_at).await
    }

    async fn bulk_transition(
        &mut self,
        from: LoanStatus,
        to: LoanStatus,
        cutoff: DateTime<Utc>,
    ) -> AppResult<u64> {
        loans::LoansRepository::bulk_transition(self.conn()?, from, to, cutoff).await
    }

    async fn commit(&mut self) -> AppResult<()> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| AppError::Internal("transaction already committed".to_string()))?;
        tx.commit().await?;
        Ok(())
    }
}
