use crate::catalog::{DeliveryHistoryStore, PendingFilter, StockCatalog};
use crate::domain::stock::{DeliveryHistoryRow, PriceEntry, StockEntry, Unit};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

/// Postgres-backed catalog over the web app's existing tables.
#[derive(Debug, Clone)]
pub struct PgCatalog {
    pool: sqlx::PgPool,
}

impl PgCatalog {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &sqlx::PgPool {
        &self.pool
    }
}

#[async_trait::async_trait]
impl StockCatalog for PgCatalog {
    async fn fetch_stocks_for_product(
        &self,
        product_id: &str,
        outlet_id: &str,
    ) -> Result<Vec<StockEntry>> {
        let rows = sqlx::query_as::<_, (String, Option<f64>, Option<DateTime<Utc>>, Option<String>)>(
            "SELECT s.unit_id, s.price_per_quantity::float8, b.created_at, s.stock_batch_id \
             FROM stocks s \
             LEFT JOIN stock_batches b ON b.id = s.stock_batch_id \
             WHERE s.product_id = $1 AND s.outlet_id = $2 \
             ORDER BY s.created_at ASC, s.id ASC",
        )
        .persistent(false)
        .bind(product_id)
        .bind(outlet_id)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("select stocks failed (product_id={product_id}, outlet_id={outlet_id})"))?;

        Ok(rows
            .into_iter()
            .map(|(unit_id, price_per_quantity, stock_batch_created_at, stock_batch_id)| StockEntry {
                unit_id,
                price_per_quantity,
                stock_batch_created_at,
                stock_batch_id,
            })
            .collect())
    }

    async fn fetch_units_for_product(&self, product_id: &str) -> Result<Vec<Unit>> {
        let rows = sqlx::query_as::<_, (String, Option<String>)>(
            "SELECT id, name FROM units WHERE product_id = $1 ORDER BY created_at ASC, id ASC",
        )
        .persistent(false)
        .bind(product_id)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("select units failed (product_id={product_id})"))?;

        Ok(rows.into_iter().map(|(id, name)| Unit { id, name }).collect())
    }
}

#[async_trait::async_trait]
impl DeliveryHistoryStore for PgCatalog {
    async fn fetch_pending(&self, filter: &PendingFilter) -> Result<Vec<DeliveryHistoryRow>> {
        let mut qb = sqlx::QueryBuilder::<sqlx::Postgres>::new(
            "SELECT id, product_id, outlet_id FROM delivery_histories WHERE 1 = 1",
        );
        if filter.only_missing {
            qb.push(" AND latest_price IS NULL");
        }
        if let Some(product_id) = &filter.product_id {
            qb.push(" AND product_id = ").push_bind(product_id.clone());
        }
        qb.push(" ORDER BY created_at ASC, id ASC");
        if let Some(limit) = filter.limit {
            qb.push(" LIMIT ").push_bind(limit);
        }

        let rows = qb
            .build_query_as::<(String, String, String)>()
            .persistent(false)
            .fetch_all(&self.pool)
            .await
            .context("select delivery_histories failed")?;

        Ok(rows
            .into_iter()
            .map(|(id, product_id, outlet_id)| DeliveryHistoryRow {
                id,
                product_id,
                outlet_id,
            })
            .collect())
    }

    async fn write_latest_price(
        &self,
        delivery_history_id: &str,
        prices: &[PriceEntry],
        modified_at: DateTime<Utc>,
    ) -> Result<()> {
        let latest_price = serde_json::to_value(prices).context("serialize latest_price failed")?;

        let res = sqlx::query(
            "UPDATE delivery_histories SET latest_price = $2, updated_at = $3 WHERE id = $1",
        )
        .persistent(false)
        .bind(delivery_history_id)
        .bind(latest_price)
        .bind(modified_at)
        .execute(&self.pool)
        .await
        .with_context(|| format!("update delivery_histories failed (id={delivery_history_id})"))?;

        anyhow::ensure!(
            res.rows_affected() == 1,
            "delivery history {delivery_history_id} not found"
        );
        Ok(())
    }
}
