use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One recorded stock line for a product at an outlet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockEntry {
    pub unit_id: String,
    pub price_per_quantity: Option<f64>,
    pub stock_batch_created_at: Option<DateTime<Utc>>,
    pub stock_batch_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

impl Unit {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
        }
    }
}

/// Per-unit price snapshot. This is the JSON shape stored on delivery history records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceEntry {
    pub unit_id: String,
    pub price_per_quantity: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryHistoryRow {
    pub id: String,
    pub product_id: String,
    pub outlet_id: String,
}
