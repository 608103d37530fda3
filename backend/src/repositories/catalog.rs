//! Price lookups against the catalog's `model_sizes` table.

use async_trait::async_trait;
use sqlx::PgPool;

use crate::error::AppError;
use crate::models::catalog::ModelSizePrice;
use crate::types::{ProductModelId, SizeId};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    /// Price of a (model, size) pair, or `None` when that combination is not sold.
    async fn find_model_size(
        &self,
        model_id: ProductModelId,
        size_id: SizeId,
    ) -> Result<Option<ModelSizePrice>, AppError>;
}

#[derive(Clone)]
pub struct PgCatalogRepository {
    pool: PgPool,
}

impl PgCatalogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CatalogRepository for PgCatalogRepository {
    async fn find_model_size(
        &self,
        model_id: ProductModelId,
        size_id: SizeId,
    ) -> Result<Option<ModelSizePrice>, AppError> {
        let row = sqlx::query_as::<_, ModelSizePrice>(
            "SELECT model_id, size_id, model_name, size_label, unit_price_cents, currency \
             FROM model_sizes WHERE model_id = $1 AND size_id = $2",
        )
        .bind(model_id)
        .bind(size_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }
}
