use anyhow::Context;
use std::io::Read;
use stockprice_core::catalog::StockCatalog;
use stockprice_core::domain::stock::{PriceEntry, StockEntry, Unit};
use stockprice_core::ingest::raw::ResolveInput;
use stockprice_core::pricing::{resolve_with, summarize_batches, GroupingStrategy};
use stockprice_core::storage::PgCatalog;

pub fn resolve_file(input: &str, grouping: GroupingStrategy) -> anyhow::Result<()> {
    let text = if input == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("read stdin failed")?;
        buf
    } else {
        std::fs::read_to_string(input).with_context(|| format!("read {input} failed"))?
    };

    let prices = resolve_document(&text, grouping)?;
    println!("{}", serde_json::to_string_pretty(&prices)?);
    Ok(())
}

fn resolve_document(text: &str, grouping: GroupingStrategy) -> anyhow::Result<Vec<PriceEntry>> {
    let doc: ResolveInput =
        serde_json::from_str(text).context("input is not a {\"stocks\", \"units\"} document")?;
    let (stocks, units) = doc.into_parts();
    tracing::debug!(stocks = stocks.len(), units = units.len(), %grouping, "resolving document");
    Ok(resolve_with(&stocks, &units, grouping))
}

pub async fn inspect_product(
    pool: &sqlx::PgPool,
    product_id: &str,
    outlet_id: &str,
    grouping: GroupingStrategy,
) -> anyhow::Result<()> {
    let catalog = PgCatalog::new(pool.clone());
    let units = catalog.fetch_units_for_product(product_id).await?;
    let stocks = catalog.fetch_stocks_for_product(product_id, outlet_id).await?;

    tracing::info!(
        product_id,
        outlet_id,
        units = units.len(),
        stocks = stocks.len(),
        "loaded product stock"
    );
    report(&stocks, &units, grouping);

    let prices = resolve_with(&stocks, &units, grouping);
    println!("{}", serde_json::to_string_pretty(&prices)?);
    Ok(())
}

fn report(stocks: &[StockEntry], units: &[Unit], grouping: GroupingStrategy) {
    if units.is_empty() {
        tracing::warn!("product has no units; nothing to price");
    }
    if stocks.is_empty() {
        tracing::warn!("no stock entries at this outlet; every unit resolves to 0");
    }

    let undated = stocks
        .iter()
        .filter(|s| s.stock_batch_created_at.is_none())
        .count();
    if undated > 0 {
        tracing::warn!(undated, "stock entries without batch timestamp sort as the epoch");
    }

    for (idx, batch) in summarize_batches(stocks).iter().enumerate() {
        tracing::info!(
            rank = idx + 1,
            batch_id = batch.batch_id.as_deref().unwrap_or("-"),
            created_at = ?batch.created_at,
            entries = batch.entries,
            prices = ?batch.prices,
            "stock batch"
        );
    }

    // Compare against the other strategies so divergent variants are visible.
    let selected = resolve_with(stocks, units, grouping);
    for other in [
        GroupingStrategy::BatchIdOrTimestamp,
        GroupingStrategy::TimestampOnly,
        GroupingStrategy::LatestPerUnit,
    ] {
        if other == grouping {
            continue;
        }
        if resolve_with(stocks, units, other) != selected {
            tracing::warn!(
                selected = %grouping,
                other = %other,
                "grouping strategies disagree for this product"
            );
        }
    }
}
