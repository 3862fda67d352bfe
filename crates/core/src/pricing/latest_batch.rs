use super::GroupingStrategy;
use crate::domain::stock::{PriceEntry, StockEntry, Unit};
use crate::time::instant::instant_millis;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Latest per-unit prices using the default grouping strategy.
pub fn resolve(stocks: &[StockEntry], units: &[Unit]) -> Vec<PriceEntry> {
    resolve_with(stocks, units, GroupingStrategy::default())
}

/// Computes one [`PriceEntry`] per distinct unit id, in unit order.
///
/// Units missing from the latest batch resolve to `0`, as do entries with a missing or
/// non-finite price. Entries with missing timestamps compare as the epoch. Never fails.
pub fn resolve_with(
    stocks: &[StockEntry],
    units: &[Unit],
    strategy: GroupingStrategy,
) -> Vec<PriceEntry> {
    if units.is_empty() {
        return Vec::new();
    }

    let prices = match strategy {
        GroupingStrategy::BatchIdOrTimestamp | GroupingStrategy::TimestampOnly => {
            latest_batch_prices(stocks, strategy)
        }
        GroupingStrategy::LatestPerUnit => latest_price_per_unit(stocks),
    };

    let mut seen = HashSet::with_capacity(units.len());
    units
        .iter()
        .filter(|u| seen.insert(u.id.as_str()))
        .map(|u| PriceEntry {
            unit_id: u.id.clone(),
            price_per_quantity: prices.get(u.id.as_str()).copied().unwrap_or(0.0),
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum BatchKey<'a> {
    Id(&'a str),
    Instant(i64),
}

impl<'a> BatchKey<'a> {
    fn of(entry: &'a StockEntry, strategy: GroupingStrategy) -> Self {
        match (strategy, batch_id(entry)) {
            (GroupingStrategy::TimestampOnly, _) | (_, None) => {
                Self::Instant(instant_millis(entry.stock_batch_created_at))
            }
            (_, Some(id)) => Self::Id(id),
        }
    }

    fn contains(&self, entry: &StockEntry) -> bool {
        match *self {
            Self::Id(id) => batch_id(entry) == Some(id),
            Self::Instant(t) => instant_millis(entry.stock_batch_created_at) == t,
        }
    }
}

fn batch_id(entry: &StockEntry) -> Option<&str> {
    entry.stock_batch_id.as_deref().filter(|s| !s.is_empty())
}

fn price_of(entry: &StockEntry) -> f64 {
    entry
        .price_per_quantity
        .filter(|p| p.is_finite())
        .unwrap_or(0.0)
}

// Strict comparison keeps the first entry on ties.
fn latest_entry(stocks: &[StockEntry]) -> Option<&StockEntry> {
    let mut best: Option<(&StockEntry, i64)> = None;
    for entry in stocks {
        let t = instant_millis(entry.stock_batch_created_at);
        match best {
            Some((_, best_t)) if t <= best_t => {}
            _ => best = Some((entry, t)),
        }
    }
    best.map(|(entry, _)| entry)
}

fn latest_batch_prices(stocks: &[StockEntry], strategy: GroupingStrategy) -> HashMap<&str, f64> {
    let mut out = HashMap::new();
    let Some(reference) = latest_entry(stocks) else {
        return out;
    };

    let key = BatchKey::of(reference, strategy);
    // Repeated units inside one batch: the later row wins.
    for entry in stocks.iter().filter(|e| key.contains(e)) {
        out.insert(entry.unit_id.as_str(), price_of(entry));
    }
    out
}

fn latest_price_per_unit(stocks: &[StockEntry]) -> HashMap<&str, f64> {
    let mut latest: HashMap<&str, (i64, f64)> = HashMap::new();
    for entry in stocks {
        let t = instant_millis(entry.stock_batch_created_at);
        let price = price_of(entry);
        latest
            .entry(entry.unit_id.as_str())
            .and_modify(|slot| {
                if t > slot.0 {
                    *slot = (t, price);
                }
            })
            .or_insert((t, price));
    }
    latest.into_iter().map(|(k, (_, p))| (k, p)).collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchSummary {
    pub batch_id: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub entries: usize,
    pub prices: BTreeMap<String, f64>,
}

/// Groups stock entries into batches, newest first.
pub fn summarize_batches(stocks: &[StockEntry]) -> Vec<BatchSummary> {
    let mut index: HashMap<BatchKey<'_>, usize> = HashMap::new();
    let mut out: Vec<BatchSummary> = Vec::new();

    for entry in stocks {
        let key = BatchKey::of(entry, GroupingStrategy::BatchIdOrTimestamp);
        let idx = *index.entry(key).or_insert_with(|| {
            out.push(BatchSummary {
                batch_id: batch_id(entry).map(str::to_string),
                created_at: entry.stock_batch_created_at,
                entries: 0,
                prices: BTreeMap::new(),
            });
            out.len() - 1
        });

        let summary = &mut out[idx];
        summary.entries += 1;
        if instant_millis(entry.stock_batch_created_at) > instant_millis(summary.created_at) {
            summary.created_at = entry.stock_batch_created_at;
        }
        summary.prices.insert(entry.unit_id.clone(), price_of(entry));
    }

    // Stable sort: batches sharing an instant keep first-seen order.
    out.sort_by_key(|s| std::cmp::Reverse(instant_millis(s.created_at)));
    out
}
