use anyhow::Context;

pub const COUNTED_TABLES: [&str; 5] = [
    "stocks",
    "stock_batches",
    "units",
    "delivery_histories",
    "products",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableCount {
    pub table: &'static str,
    /// `None` when the table (or the counted column) does not exist in this database.
    pub rows: Option<i64>,
}

const UNDEFINED_TABLE: &str = "42P01";
const UNDEFINED_COLUMN: &str = "42703";

fn is_undefined_table_error(err: &sqlx::Error) -> bool {
    has_sqlstate(err, &[UNDEFINED_TABLE])
}

fn is_undefined_table_or_column_error(err: &sqlx::Error) -> bool {
    has_sqlstate(err, &[UNDEFINED_TABLE, UNDEFINED_COLUMN])
}

fn has_sqlstate(err: &sqlx::Error, codes: &[&str]) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err
            .code()
            .is_some_and(|code| has_sqlstate_code(&code, codes)),
        _ => false,
    }
}

fn has_sqlstate_code(code: &str, codes: &[&str]) -> bool {
    codes.contains(&code)
}

pub async fn table_counts(pool: &sqlx::PgPool) -> anyhow::Result<Vec<TableCount>> {
    let mut out = Vec::with_capacity(COUNTED_TABLES.len());
    for table in COUNTED_TABLES {
        // Table names come from the fixed list above, never from input.
        let sql = format!("SELECT COUNT(*) FROM {table}");
        let rows = match sqlx::query_scalar::<_, i64>(&sql)
            .persistent(false)
            .fetch_one(pool)
            .await
        {
            Ok(n) => Some(n),
            Err(e) if is_undefined_table_error(&e) => None,
            Err(e) => return Err(e).with_context(|| format!("count {table} failed")),
        };
        out.push(TableCount { table, rows });
    }

    // Rows still waiting for a price snapshot.
    let pending = match sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM delivery_histories WHERE latest_price IS NULL",
    )
    .persistent(false)
    .fetch_one(pool)
    .await
    {
        Ok(n) => Some(n),
        Err(e) if is_undefined_table_or_column_error(&e) => None,
        Err(e) => return Err(e).context("count pending delivery_histories failed"),
    };
    out.push(TableCount {
        table: "delivery_histories (latest_price IS NULL)",
        rows: pending,
    });

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_database_errors_are_never_treated_as_missing_schema() {
        assert!(!is_undefined_table_error(&sqlx::Error::RowNotFound));
        assert!(!is_undefined_table_or_column_error(&sqlx::Error::PoolTimedOut));
    }

    #[test]
    fn sqlstate_lists_cover_missing_columns_for_pending_count() {
        assert!(has_sqlstate_code("42703", &[UNDEFINED_TABLE, UNDEFINED_COLUMN]));
        assert!(has_sqlstate_code("42P01", &[UNDEFINED_TABLE, UNDEFINED_COLUMN]));
        assert!(!has_sqlstate_code("42703", &[UNDEFINED_TABLE]));
        assert!(!has_sqlstate_code("23505", &[UNDEFINED_TABLE, UNDEFINED_COLUMN]));
    }
}
