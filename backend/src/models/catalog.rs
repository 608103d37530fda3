//! Read-only pricing view of the catalog.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

use crate::types::{ProductModelId, SizeId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
/// Unit price of one purchasable (model, size) pair, in minor currency units.
pub struct ModelSizePrice {
    pub model_id: ProductModelId,
    pub size_id: SizeId,
    pub model_name: String,
    pub size_label: String,
    pub unit_price_cents: i64,
    /// ISO 4217 code, lower case.
    pub currency: String,
}
