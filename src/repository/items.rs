//! Item pool: the live stock counter per catalog item

use sqlx::{PgConnection, Pool, Postgres};

use crate::error::{AppError, AppResult};

#[derive(Clone)]
pub struct ItemsRepository {
    pool: Pool<Postgres>,
}

impl ItemsRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Get available units of an item
    pub async fn get_stock(&self, item_id: i64) -> AppResult<i32> {
        sqlx::query_scalar::<_, i32>("SELECT stock FROM items WHERE id = $1")
            .bind(item_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(AppError::ItemNotFound(item_id))
    }

    /// Read stock and hold the row lock until the transaction ends
    pub async fn lock_stock(conn: &mut PgConnection, item_id: i64) -> AppResult<Option<i32>> {
        let stock = sqlx::query_scalar::<_, i32>("SELECT stock FROM items WHERE id = $1 FOR UPDATE")
            .bind(item_id)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(stock)
    }

    /// Take one unit. Returns the remaining stock.
    pub async fn decrement(conn: &mut PgConnection, item_id: i64) -> AppResult<i32> {
        let remaining = sqlx::query_scalar::<_, i32>(
            "UPDATE items SET stock = stock - 1 WHERE id = $1 AND stock > 0 RETURNING stock",
        )
        .bind(item_id)
        .fetch_optional(&mut *conn)
        .await?;

        if let Some(remaining) = remaining {
            return Ok(remaining);
        }

        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM items WHERE id = $1)")
            .bind(item_id)
            .fetch_one(&mut *conn)
            .await?;

        if exists {
            Err(AppError::OutOfStock(item_id))
        } else {
            Err(AppError::ItemNotFound(item_id))
        }
    }

    /// Give one unit back. `None` when the item no longer exists.
    pub async fn increment(conn: &mut PgConnection, item_id: i64) -> AppResult<Option<i32>> {
        let stock = sqlx::query_scalar::<_, i32>(
            "UPDATE items SET stock = stock + 1 WHERE id = $1 RETURNING stock",
        )
        .bind(item_id)
        .fetch_optional(&mut *conn)
        .await?;
        Ok(stock)
    }
}
