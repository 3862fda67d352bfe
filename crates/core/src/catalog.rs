use crate::domain::stock::{DeliveryHistoryRow, PriceEntry, StockEntry, Unit};
use anyhow::Result;
use chrono::{DateTime, Utc};

#[async_trait::async_trait]
pub trait StockCatalog: Send + Sync {
    async fn fetch_stocks_for_product(
        &self,
        product_id: &str,
        outlet_id: &str,
    ) -> Result<Vec<StockEntry>>;

    async fn fetch_units_for_product(&self, product_id: &str) -> Result<Vec<Unit>>;
}

#[derive(Debug, Clone, Default)]
pub struct PendingFilter {
    /// Only rows whose latest price has never been written.
    pub only_missing: bool,
    pub product_id: Option<String>,
    pub limit: Option<i64>,
}

#[async_trait::async_trait]
pub trait DeliveryHistoryStore: Send + Sync {
    async fn fetch_pending(&self, filter: &PendingFilter) -> Result<Vec<DeliveryHistoryRow>>;

    async fn write_latest_price(
        &self,
        delivery_history_id: &str,
        prices: &[PriceEntry],
        modified_at: DateTime<Utc>,
    ) -> Result<()>;
}
