//! LP mint/burn event operations for the repository.

use crate::domain::{Address, Balance, DataKind, LpEvent, LpEventType, Timestamp};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use tracing::warn;

use super::swaps::token_from_row;
use super::{address_from_row, decimal_from_row, insert_token, Repository};

impl Repository {
    /// Insert LP events idempotently in a single transaction.
    ///
    /// The uniqueness key is `(tx_hash, log_index, event_type)`. Returns the
    /// number of newly inserted events.
    pub async fn add_lp_events(&self, events: &[LpEvent]) -> Result<usize, sqlx::Error> {
        if events.is_empty() {
            return Ok(0);
        }

        let mut total_inserted = 0usize;
        let mut tx = self.pool.begin().await?;

        for event in events {
            insert_token(&mut tx, &event.token0).await?;
            insert_token(&mut tx, &event.token1).await?;

            let result = sqlx::query(
                r#"
                INSERT INTO amm_lp_events (
                    tx_hash, log_index, event_type, address, timestamp, pool_address,
                    token0_address, token1_address, amount0, amount1, lp_amount, usd_value
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(tx_hash, log_index, event_type) DO NOTHING
                "#,
            )
            .bind(event.tx_hash.to_ascii_lowercase())
            .bind(event.log_index)
            .bind(event.event_type.label())
            .bind(event.address.as_str())
            .bind(event.timestamp.as_i64())
            .bind(event.pool_address.as_str())
            .bind(event.token0.address.as_str())
            .bind(event.token1.address.as_str())
            .bind(event.amount0.to_canonical_string())
            .bind(event.amount1.to_canonical_string())
            .bind(event.lp_amount.amount.to_canonical_string())
            .bind(event.lp_amount.usd_value.map(|v| v.to_canonical_string()))
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() > 0 {
                total_inserted += 1;
            }
        }

        tx.commit().await?;
        Ok(total_inserted)
    }

    /// LP events of `address` with `from <= timestamp <= to`, ordered by
    /// `(timestamp, log_index)`.
    pub async fn get_lp_events(
        &self,
        address: &Address,
        from: Timestamp,
        to: Timestamp,
    ) -> Result<Vec<LpEvent>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT e.tx_hash, e.log_index, e.event_type, e.address, e.timestamp,
                   e.pool_address, e.amount0, e.amount1, e.lp_amount, e.usd_value,
                   t0.address AS t0_address, t0.symbol AS t0_symbol,
                   t0.name AS t0_name, t0.decimals AS t0_decimals,
                   t1.address AS t1_address, t1.symbol AS t1_symbol,
                   t1.name AS t1_name, t1.decimals AS t1_decimals
            FROM amm_lp_events e
            JOIN tokens t0 ON t0.address = e.token0_address
            JOIN tokens t1 ON t1.address = e.token1_address
            WHERE e.address = ? AND e.timestamp >= ? AND e.timestamp <= ?
            ORDER BY e.timestamp ASC, e.log_index ASC
            "#,
        )
        .bind(address.as_str())
        .bind(from.as_i64())
        .bind(to.as_i64())
        .fetch_all(&self.pool)
        .await?;

        let mut events = Vec::with_capacity(rows.len());
        for row in &rows {
            if let Some(event) = lp_event_from_row(row)? {
                events.push(event);
            }
        }
        Ok(events)
    }

    /// Delete LP events for one address (or all) and the matching coverage.
    pub async fn delete_lp_events(&self, address: Option<&Address>) -> Result<u64, sqlx::Error> {
        self.delete_history(DataKind::AmmEvents, "amm_lp_events", address)
            .await
    }
}

fn lp_event_from_row(row: &SqliteRow) -> Result<Option<LpEvent>, sqlx::Error> {
    let label: String = row.get("event_type");
    let Some(event_type) = LpEventType::from_label(&label) else {
        warn!(event_type = %label, "Unknown stored LP event type, skipping row");
        return Ok(None);
    };
    let amount = |column: &str| decimal_from_row(&row.get::<String, _>(column), column);
    let usd_value: Option<String> = row.get("usd_value");

    Ok(Some(LpEvent {
        tx_hash: row.get("tx_hash"),
        log_index: row.get("log_index"),
        event_type,
        address: address_from_row(&row.get::<String, _>("address"))?,
        timestamp: Timestamp::new(row.get("timestamp")),
        pool_address: address_from_row(&row.get::<String, _>("pool_address"))?,
        token0: token_from_row(row, "t0")?,
        token1: token_from_row(row, "t1")?,
        amount0: amount("amount0"),
        amount1: amount("amount1"),
        lp_amount: Balance::new(
            amount("lp_amount"),
            usd_value.map(|v| decimal_from_row(&v, "usd_value")),
        ),
    }))
}
