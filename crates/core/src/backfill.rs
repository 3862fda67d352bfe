use crate::catalog::{DeliveryHistoryStore, PendingFilter, StockCatalog};
use crate::domain::stock::{DeliveryHistoryRow, PriceEntry};
use crate::pricing::{resolve_with, GroupingStrategy};
use anyhow::Result;
use chrono::Utc;
use serde::Serialize;

#[derive(Debug, Clone, Default)]
pub struct BackfillOptions {
    pub grouping: GroupingStrategy,
    /// Resolve everything but skip the writes.
    pub dry_run: bool,
    pub filter: PendingFilter,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BackfillReport {
    pub scanned: usize,
    pub updated: usize,
    /// Rows resolved during a dry run; nothing was written for them.
    pub would_update: usize,
    pub skipped_no_units: usize,
    pub failed: usize,
    pub dry_run: bool,
}

/// Recomputes the latest price snapshot of every pending delivery history row.
///
/// Rows are processed one at a time in query order. A failing row is logged and counted;
/// the run carries on with the next one. Only the initial listing can fail the run.
pub async fn run_backfill<C, S>(
    catalog: &C,
    store: &S,
    opts: &BackfillOptions,
) -> Result<BackfillReport>
where
    C: StockCatalog + ?Sized,
    S: DeliveryHistoryStore + ?Sized,
{
    let rows = store.fetch_pending(&opts.filter).await?;
    tracing::info!(
        rows = rows.len(),
        grouping = %opts.grouping,
        dry_run = opts.dry_run,
        "backfill: pending delivery histories loaded"
    );

    let mut report = BackfillReport {
        dry_run: opts.dry_run,
        ..Default::default()
    };

    for row in &rows {
        report.scanned += 1;
        match backfill_row(catalog, store, row, opts).await {
            Ok(RowOutcome::Updated) => report.updated += 1,
            Ok(RowOutcome::WouldUpdate) => report.would_update += 1,
            Ok(RowOutcome::NoUnits) => report.skipped_no_units += 1,
            Err(err) => {
                report.failed += 1;
                let error = format!("{err:#}");
                tracing::error!(
                    delivery_history_id = %row.id,
                    product_id = %row.product_id,
                    %error,
                    "backfill row failed"
                );
            }
        }
    }

    tracing::info!(
        scanned = report.scanned,
        updated = report.updated,
        would_update = report.would_update,
        skipped_no_units = report.skipped_no_units,
        failed = report.failed,
        dry_run = report.dry_run,
        "backfill finished"
    );
    Ok(report)
}

enum RowOutcome {
    Updated,
    WouldUpdate,
    NoUnits,
}

async fn backfill_row<C, S>(
    catalog: &C,
    store: &S,
    row: &DeliveryHistoryRow,
    opts: &BackfillOptions,
) -> Result<RowOutcome>
where
    C: StockCatalog + ?Sized,
    S: DeliveryHistoryStore + ?Sized,
{
    let prices = preview_latest_prices(catalog, &row.product_id, &row.outlet_id, opts.grouping)
        .await?;

    if prices.is_empty() {
        tracing::warn!(
            delivery_history_id = %row.id,
            product_id = %row.product_id,
            "product has no units; leaving delivery history untouched"
        );
        return Ok(RowOutcome::NoUnits);
    }

    if opts.dry_run {
        tracing::info!(
            delivery_history_id = %row.id,
            prices = %serde_json::to_string(&prices).unwrap_or_default(),
            "dry-run: would write latest price"
        );
        return Ok(RowOutcome::WouldUpdate);
    }

    store.write_latest_price(&row.id, &prices, Utc::now()).await?;
    tracing::debug!(delivery_history_id = %row.id, units = prices.len(), "latest price written");
    Ok(RowOutcome::Updated)
}

/// Fetches a product's stock and units at an outlet and resolves its latest prices.
pub async fn preview_latest_prices<C>(
    catalog: &C,
    product_id: &str,
    outlet_id: &str,
    grouping: GroupingStrategy,
) -> Result<Vec<PriceEntry>>
where
    C: StockCatalog + ?Sized,
{
    let units = catalog.fetch_units_for_product(product_id).await?;
    if units.is_empty() {
        return Ok(Vec::new());
    }
    let stocks = catalog.fetch_stocks_for_product(product_id, outlet_id).await?;
    Ok(resolve_with(&stocks, &units, grouping))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::stock::{StockEntry, Unit};
    use crate::time::instant::parse_instant;
    use chrono::DateTime;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeDb {
        stocks: HashMap<(String, String), Vec<StockEntry>>,
        units: HashMap<String, Vec<Unit>>,
        rows: Vec<DeliveryHistoryRow>,
        broken_products: Vec<String>,
        written: Mutex<Vec<(String, Vec<PriceEntry>)>>,
    }

    #[async_trait::async_trait]
    impl StockCatalog for FakeDb {
        async fn fetch_stocks_for_product(
            &self,
            product_id: &str,
            outlet_id: &str,
        ) -> Result<Vec<StockEntry>> {
            anyhow::ensure!(
                !self.broken_products.iter().any(|p| p == product_id),
                "connection reset"
            );
            Ok(self
                .stocks
                .get(&(product_id.to_string(), outlet_id.to_string()))
                .cloned()
                .unwrap_or_default())
        }

        async fn fetch_units_for_product(&self, product_id: &str) -> Result<Vec<Unit>> {
            Ok(self.units.get(product_id).cloned().unwrap_or_default())
        }
    }

    #[async_trait::async_trait]
    impl DeliveryHistoryStore for FakeDb {
        async fn fetch_pending(&self, filter: &PendingFilter) -> Result<Vec<DeliveryHistoryRow>> {
            let rows = self
                .rows
                .iter()
                .filter(|r| filter.product_id.as_deref().map_or(true, |p| p == r.product_id))
                .cloned();
            Ok(match filter.limit {
                Some(n) => rows.take(n as usize).collect(),
                None => rows.collect(),
            })
        }

        async fn write_latest_price(
            &self,
            delivery_history_id: &str,
            prices: &[PriceEntry],
            _modified_at: DateTime<Utc>,
        ) -> Result<()> {
            self.written
                .lock()
                .unwrap()
                .push((delivery_history_id.to_string(), prices.to_vec()));
            Ok(())
        }
    }

    fn row(id: &str, product: &str) -> DeliveryHistoryRow {
        DeliveryHistoryRow {
            id: id.to_string(),
            product_id: product.to_string(),
            outlet_id: "o1".to_string(),
        }
    }

    fn stock(unit: &str, price: f64, at: &str) -> StockEntry {
        StockEntry {
            unit_id: unit.to_string(),
            price_per_quantity: Some(price),
            stock_batch_created_at: parse_instant(at),
            stock_batch_id: None,
        }
    }

    fn seeded() -> FakeDb {
        let mut db = FakeDb::default();
        db.units.insert(
            "p1".to_string(),
            vec![Unit::new("u1"), Unit::new("u2")],
        );
        db.units.insert("p3".to_string(), vec![Unit::new("u9")]);
        db.stocks.insert(
            ("p1".to_string(), "o1".to_string()),
            vec![
                stock("u1", 10.0, "2025-01-01"),
                stock("u1", 15.0, "2025-02-01"),
                stock("u2", 5.0, "2025-01-01"),
            ],
        );
        db.rows = vec![row("d1", "p1"), row("d2", "p2"), row("d3", "p3")];
        db
    }

    #[tokio::test]
    async fn writes_latest_prices_and_skips_products_without_units() {
        let db = seeded();
        let report = run_backfill(&db, &db, &BackfillOptions::default())
            .await
            .unwrap();

        assert_eq!(report.scanned, 3);
        assert_eq!(report.updated, 2);
        assert_eq!(report.would_update, 0);
        assert_eq!(report.skipped_no_units, 1);
        assert_eq!(report.failed, 0);

        let written = db.written.lock().unwrap();
        assert_eq!(written.len(), 2);
        assert_eq!(written[0].0, "d1");
        assert_eq!(
            written[0].1,
            vec![
                PriceEntry { unit_id: "u1".into(), price_per_quantity: 15.0 },
                PriceEntry { unit_id: "u2".into(), price_per_quantity: 0.0 },
            ]
        );
        // p3 has a unit but no stock at the outlet.
        assert_eq!(written[1].0, "d3");
        assert_eq!(written[1].1[0].price_per_quantity, 0.0);
    }

    #[tokio::test]
    async fn dry_run_writes_nothing() {
        let db = seeded();
        let opts = BackfillOptions {
            dry_run: true,
            ..Default::default()
        };
        let report = run_backfill(&db, &db, &opts).await.unwrap();
        assert!(report.dry_run);
        assert_eq!(report.updated, 0);
        assert_eq!(report.would_update, 2);
        assert_eq!(report.skipped_no_units, 1);
        assert!(db.written.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn failing_row_does_not_stop_the_run() {
        let mut db = seeded();
        db.broken_products.push("p1".to_string());
        let report = run_backfill(&db, &db, &BackfillOptions::default())
            .await
            .unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.updated, 1);
        assert_eq!(db.written.lock().unwrap()[0].0, "d3");
    }

    #[tokio::test]
    async fn grouping_and_filter_are_honoured() {
        let db = seeded();
        let opts = BackfillOptions {
            grouping: GroupingStrategy::LatestPerUnit,
            filter: PendingFilter {
                product_id: Some("p1".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        let report = run_backfill(&db, &db, &opts).await.unwrap();
        assert_eq!(report.scanned, 1);

        let written = db.written.lock().unwrap();
        assert_eq!(written[0].1[1].price_per_quantity, 5.0);
    }
}
