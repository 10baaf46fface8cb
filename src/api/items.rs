//! Item stock and ranking endpoints

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use utoipa::IntoParams;

use super::ApiQuery;
use crate::{
    error::AppResult,
    models::{item::ItemStock, loan::BorrowCount},
    AppState,
};

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct MostBorrowedQuery {
    /// Number of items to return (default from configuration)
    pub limit: Option<i64>,
}

/// Available units of an item
#[utoipa::path(
    get,
    path = "/items/{id}/stock",
    tag = "items",
    params(("id" = i64, Path, description = "Item ID")),
    responses(
        (status = 200, description = "Current stock", body = ItemStock),
        (status = 404, description = "Item not found")
    )
)]
pub async fn get_stock(
    State(state): State<AppState>,
    Path(item_id): Path<i64>,
) -> AppResult<Json<ItemStock>> {
    let stock = state.services.ledger.stock(item_id).await?;
    Ok(Json(ItemStock { item_id, stock }))
}

/// Items ranked by number of loans
#[utoipa::path(
    get,
    path = "/items/most-borrowed",
    tag = "items",
    params(MostBorrowedQuery),
    responses(
        (status = 200, description = "Most borrowed items, highest count first", body = Vec<BorrowCount>)
    )
)]
pub async fn most_borrowed(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<MostBorrowedQuery>,
) -> AppResult<Json<Vec<BorrowCount>>> {
    let ranked = state
        .services
        .loans
        .most_borrowed(query.limit.unwrap_or(0))
        .await?;
    Ok(Json(ranked))
}
