use crate::domain::stock::{StockEntry, Unit};
use crate::time::instant::{from_epoch_millis, parse_instant};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

/// Stock row as exported by the web app. Field names vary between exports, so every
/// field is kept loose here and reconciled once in [`RawStockEntry::normalize`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawStockEntry {
    #[serde(default)]
    pub unit_id: Value,
    #[serde(default)]
    pub price_per_quantity: Value,
    #[serde(default)]
    pub stock_batch_created_at: Value,
    #[serde(default)]
    pub stock_batch_id: Value,
    #[serde(default)]
    pub batch_id: Value,
    /// Nested batch relation; only an object carries `id` / `createdAt`.
    #[serde(default)]
    pub stock_batch: Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawUnit {
    #[serde(default)]
    pub id: Value,
    #[serde(default)]
    pub name: Value,
}

/// Input document for the `resolve` command: `{ "stocks": [...], "units": [...] }`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResolveInput {
    #[serde(default)]
    pub stocks: Option<Vec<RawStockEntry>>,
    #[serde(default)]
    pub units: Option<Vec<RawUnit>>,
}

impl ResolveInput {
    pub fn into_parts(self) -> (Vec<StockEntry>, Vec<Unit>) {
        let stocks = self
            .stocks
            .unwrap_or_default()
            .into_iter()
            .map(RawStockEntry::normalize)
            .collect();
        let units = self
            .units
            .unwrap_or_default()
            .into_iter()
            .filter_map(RawUnit::normalize)
            .collect();
        (stocks, units)
    }
}

impl RawStockEntry {
    pub fn normalize(self) -> StockEntry {
        let nested = self.stock_batch.as_object();
        let nested_field = |key: &str| nested.and_then(|o| o.get(key)).unwrap_or(&Value::Null);

        let stock_batch_id = json_to_id(&self.stock_batch_id)
            .or_else(|| json_to_id(&self.batch_id))
            .or_else(|| json_to_id(nested_field("id")));

        let stock_batch_created_at = json_to_instant(&self.stock_batch_created_at)
            .or_else(|| json_to_instant(nested_field("createdAt")));

        StockEntry {
            unit_id: json_to_id(&self.unit_id).unwrap_or_default(),
            price_per_quantity: json_to_price(&self.price_per_quantity),
            stock_batch_created_at,
            stock_batch_id,
        }
    }
}

impl RawUnit {
    /// Units without a usable id cannot be reported on and are dropped.
    pub fn normalize(self) -> Option<Unit> {
        let id = json_to_id(&self.id)?;
        let name = match self.name {
            Value::String(s) => Some(s),
            _ => None,
        };
        Some(Unit { id, name })
    }
}

fn json_to_id(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

// Prices arrive as numbers or as decimal strings (Prisma Decimal serializes to a string).
fn json_to_price(v: &Value) -> Option<f64> {
    let n = match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    n.is_finite().then_some(n)
}

fn json_to_instant(v: &Value) -> Option<DateTime<Utc>> {
    match v {
        Value::String(s) => parse_instant(s),
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64))
            .and_then(from_epoch_millis),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(v: Value) -> RawStockEntry {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn reconciles_alternate_batch_id_fields() {
        let a = raw(json!({"unitId": "u1", "stockBatchId": "b1"})).normalize();
        let b = raw(json!({"unitId": "u1", "batchId": "b2"})).normalize();
        let c = raw(json!({"unitId": "u1", "stockBatch": {"id": "b3"}})).normalize();
        let d = raw(json!({"unitId": "u1", "stockBatchId": "b1", "batchId": "b2"})).normalize();

        assert_eq!(a.stock_batch_id.as_deref(), Some("b1"));
        assert_eq!(b.stock_batch_id.as_deref(), Some("b2"));
        assert_eq!(c.stock_batch_id.as_deref(), Some("b3"));
        assert_eq!(d.stock_batch_id.as_deref(), Some("b1"));
    }

    #[test]
    fn falls_back_to_nested_batch_created_at() {
        let e = raw(json!({
            "unitId": "u1",
            "stockBatch": {"id": 7, "createdAt": "2025-01-01T00:00:00Z"}
        }))
        .normalize();
        assert_eq!(e.stock_batch_id.as_deref(), Some("7"));
        assert!(e.stock_batch_created_at.is_some());
    }

    #[test]
    fn coerces_prices_and_tolerates_garbage() {
        let num = raw(json!({"unitId": "u1", "pricePerQuantity": 12.5})).normalize();
        let text = raw(json!({"unitId": "u1", "pricePerQuantity": " 8.25 "})).normalize();
        let bad = raw(json!({
            "unitId": "u1",
            "pricePerQuantity": "abc",
            "stockBatchCreatedAt": "yesterday"
        }))
        .normalize();
        let missing = raw(json!({})).normalize();

        assert_eq!(num.price_per_quantity, Some(12.5));
        assert_eq!(text.price_per_quantity, Some(8.25));
        assert_eq!(bad.price_per_quantity, None);
        assert_eq!(bad.stock_batch_created_at, None);
        assert_eq!(missing.unit_id, "");
    }

    #[test]
    fn float_epoch_millis_are_truncated() {
        let e = raw(json!({"unitId": "u1", "stockBatchCreatedAt": 1738368000000.75})).normalize();
        assert_eq!(
            e.stock_batch_created_at.map(|t| t.timestamp_millis()),
            Some(1738368000000)
        );
    }

    #[test]
    fn odd_shapes_in_one_row_do_not_reject_the_document() {
        let input: ResolveInput = serde_json::from_value(json!({
            "units": [{"id": "u1", "name": 5}, {"id": "u2", "name": "box"}],
            "stocks": [
                {"unitId": "u1", "pricePerQuantity": 4, "stockBatch": "b1",
                 "stockBatchCreatedAt": "2025-02-01"},
                {"unitId": "u2", "pricePerQuantity": 3, "stockBatch": [1, 2],
                 "stockBatchCreatedAt": "2025-01-01"}
            ]
        }))
        .unwrap();
        let (stocks, units) = input.into_parts();

        assert_eq!(stocks.len(), 2);
        assert_eq!(stocks[0].stock_batch_id, None);
        assert!(stocks[0].stock_batch_created_at.is_some());
        assert_eq!(units[0].name, None);
        assert_eq!(units[1].name.as_deref(), Some("box"));
    }

    #[test]
    fn resolve_input_accepts_absent_lists() {
        let input: ResolveInput = serde_json::from_value(json!({"units": [{"id": "u1"}, {}]})).unwrap();
        let (stocks, units) = input.into_parts();
        assert!(stocks.is_empty());
        assert_eq!(units, vec![Unit::new("u1")]);
    }
}
