//! Item pool model

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Available units of one catalog item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ItemStock {
    pub item_id: i64,
    pub stock: i32,
}
