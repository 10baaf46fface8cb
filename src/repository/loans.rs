//! Loans repository for database operations

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, Pool, Postgres, QueryBuilder};

use crate::{
    error::{AppError, AppResult},
    models::loan::{BorrowCount, Loan, LoanFilter, LoanRow, LoanStatus, NewLoan},
};

const LOAN_COLUMNS: &str = "id, item_id, borrower_id, status, borrowed_at, due_at, returned_at";

#[derive(Clone)]
pub struct LoansRepository {
    pool: Pool<Postgres>,
}

impl LoansRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Get loan by ID
    pub async fn get_by_id(&self, id: i64) -> AppResult<Loan> {
        sqlx::query_as::<_, LoanRow>(&format!("SELECT {} FROM loans WHERE id = $1", LOAN_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(AppError::LoanNotFound(id))?
            .try_into()
    }

    /// Filtered page of loans, newest first
    pub async fn list_filtered(
        &self,
        filter: &LoanFilter,
        limit: i64,
        offset: i64,
    ) -> AppResult<Vec<Loan>> {
        let mut qb = QueryBuilder::<Postgres>::new(format!("SELECT {} FROM loans", LOAN_COLUMNS));
        push_filter(&mut qb, filter);
        qb.push(" ORDER BY id DESC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);

        qb.build_query_as::<LoanRow>()
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(Loan::try_from)
            .collect()
    }

    /// Count loans matching a filter
    pub async fn count_filtered(&self, filter: &LoanFilter) -> AppResult<i64> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM loans");
        push_filter(&mut qb, filter);
        let count = qb.build_query_scalar::<i64>().fetch_one(&self.pool).await?;
        Ok(count)
    }

    /// Loan counts per item, highest first, ties by item id
    pub async fn most_borrowed(&self, limit: i64) -> AppResult<Vec<BorrowCount>> {
        let rows = sqlx::query_as::<_, BorrowCount>(
            r#"
            SELECT item_id, COUNT(*) AS borrow_count
            FROM loans
            GROUP BY item_id
            ORDER BY borrow_count DESC, item_id ASC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn insert(conn: &mut PgConnection, loan: &NewLoan) -> AppResult<Loan> {
        sqlx::query_as::<_, LoanRow>(&format!(
            r#"
            INSERT INTO loans (item_id, borrower_id, status, borrowed_at, due_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {}
            "#,
            LOAN_COLUMNS
        ))
        .bind(loan.item_id)
        .bind(loan.borrower_id)
        .bind(loan.status.as_str())
        .bind(loan.borrowed_at)
        .bind(loan.due_at)
        .fetch_one(&mut *conn)
        .await?
        .try_into()
    }

    /// Read a loan and hold its row lock until the transaction ends
    pub async fn lock(conn: &mut PgConnection, id: i64) -> AppResult<Option<Loan>> {
        sqlx::query_as::<_, LoanRow>(&format!(
            "SELECT {} FROM loans WHERE id = $1 FOR UPDATE",
            LOAN_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .map(Loan::try_from)
        .transpose()
    }

    pub async fn update_status(
        conn: &mut PgConnection,
        id: i64,
        status: LoanStatus,
        returned_at: Option<DateTime<Utc>>,
    ) -> AppResult<Loan> {
        sqlx::query_as::<_, LoanRow>(&format!(
            "UPDATE loans SET status = $1, returned_at = $2 WHERE id = $3 RETURNING {}",
            LOAN_COLUMNS
        ))
        .bind(status.as_str())
        .bind(returned_at)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(AppError::LoanNotFound(id))?
        .try_into()
    }

    /// Move every unreturned loan in `from` that fell due before `cutoff` to `to`
    pub async fn bulk_transition(
        conn: &mut PgConnection,
        from: LoanStatus,
        to: LoanStatus,
        cutoff: DateTime<Utc>,
    ) -> AppResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE loans SET status = $1
            WHERE status = $2 AND due_at < $3 AND returned_at IS NULL
            "#,
        )
        .bind(to.as_str())
        .bind(from.as_str())
        .bind(cutoff)
        .execute(&mut *conn)
        .await?;
        Ok(result.rows_affected())
    }
}

fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &LoanFilter) {
    qb.push(" WHERE TRUE");
    if let Some(item_id) = filter.item_id {
        qb.push(" AND item_id = ").push_bind(item_id);
    }
    if let Some(borrower_id) = filter.borrower_id {
        qb.push(" AND borrower_id = ").push_bind(borrower_id);
    }
    if let Some(status) = filter.status {
        qb.push(" AND status = ").push_bind(status.as_str());
    }
    if filter.overdue {
        qb.push(" AND status IN ('active', 'overdue') AND due_at < ")
            .push_bind(Utc::now());
    }
    if let Some(from) = filter.from {
        qb.push(" AND borrowed_at >= ").push_bind(from);
    }
    if let Some(to) = filter.to {
        qb.push(" AND borrowed_at <= ").push_bind(to);
    }
}
