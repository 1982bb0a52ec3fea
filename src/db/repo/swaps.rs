//! AMM swap leg operations for the repository.

use crate::domain::{Address, DataKind, RawSwapLeg, Timestamp, Token};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::{
    address_from_row, decimal_from_row, decimals_from_row, insert_token, Repository,
};

impl Repository {
    /// Insert swap legs idempotently in a single transaction.
    ///
    /// Legs already stored under the same `(tx_hash, log_index, pool_address)`
    /// are ignored. Returns the number of newly inserted legs.
    pub async fn add_amm_swaps(&self, legs: &[RawSwapLeg]) -> Result<usize, sqlx::Error> {
        if legs.is_empty() {
            return Ok(0);
        }

        let mut total_inserted = 0usize;
        let mut tx = self.pool.begin().await?;

        for leg in legs {
            insert_token(&mut tx, &leg.token0).await?;
            insert_token(&mut tx, &leg.token1).await?;

            let result = sqlx::query(
                r#"
                INSERT INTO amm_swaps (
                    tx_hash, log_index, pool_address, address, from_address, to_address,
                    timestamp, token0_address, token1_address,
                    amount0_in, amount1_in, amount0_out, amount1_out
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(tx_hash, log_index, pool_address) DO NOTHING
                "#,
            )
            .bind(leg.tx_hash.to_ascii_lowercase())
            .bind(leg.log_index)
            .bind(leg.pool_address.as_str())
            .bind(leg.address.as_str())
            .bind(leg.from_address.as_str())
            .bind(leg.to_address.as_str())
            .bind(leg.timestamp.as_i64())
            .bind(leg.token0.address.as_str())
            .bind(leg.token1.address.as_str())
            .bind(leg.amount0_in.to_canonical_string())
            .bind(leg.amount1_in.to_canonical_string())
            .bind(leg.amount0_out.to_canonical_string())
            .bind(leg.amount1_out.to_canonical_string())
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() > 0 {
                total_inserted += 1;
            }
        }

        tx.commit().await?;
        Ok(total_inserted)
    }

    /// Swap legs owned by `address` with `from <= timestamp <= to`, ordered by
    /// `(timestamp, tx_hash, log_index)`.
    pub async fn get_amm_swaps(
        &self,
        address: &Address,
        from: Timestamp,
        to: Timestamp,
    ) -> Result<Vec<RawSwapLeg>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT s.tx_hash, s.log_index, s.pool_address, s.address, s.from_address,
                   s.to_address, s.timestamp,
                   s.amount0_in, s.amount1_in, s.amount0_out, s.amount1_out,
                   t0.address AS t0_address, t0.symbol AS t0_symbol,
                   t0.name AS t0_name, t0.decimals AS t0_decimals,
                   t1.address AS t1_address, t1.symbol AS t1_symbol,
                   t1.name AS t1_name, t1.decimals AS t1_decimals
            FROM amm_swaps s
            JOIN tokens t0 ON t0.address = s.token0_address
            JOIN tokens t1 ON t1.address = s.token1_address
            WHERE s.address = ? AND s.timestamp >= ? AND s.timestamp <= ?
            ORDER BY s.timestamp ASC, s.tx_hash ASC, s.log_index ASC
            "#,
        )
        .bind(address.as_str())
        .bind(from.as_i64())
        .bind(to.as_i64())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(swap_from_row).collect()
    }

    /// Delete swap legs for one address (or all) and the matching coverage.
    pub async fn delete_amm_swaps(&self, address: Option<&Address>) -> Result<u64, sqlx::Error> {
        self.delete_history(DataKind::AmmTrades, "amm_swaps", address)
            .await
    }
}

pub(super) fn token_from_row(row: &SqliteRow, prefix: &str) -> Result<Token, sqlx::Error> {
    let address: String = row.get(format!("{}_address", prefix).as_str());
    let symbol: String = row.get(format!("{}_symbol", prefix).as_str());
    let name: String = row.get(format!("{}_name", prefix).as_str());
    let decimals: i64 = row.get(format!("{}_decimals", prefix).as_str());
    Ok(Token::new(
        address_from_row(&address)?,
        &symbol,
        &name,
        decimals_from_row(decimals),
    ))
}

fn swap_from_row(row: &SqliteRow) -> Result<RawSwapLeg, sqlx::Error> {
    let amount = |column: &str| decimal_from_row(&row.get::<String, _>(column), column);

    Ok(RawSwapLeg {
        tx_hash: row.get("tx_hash"),
        log_index: row.get("log_index"),
        address: address_from_row(&row.get::<String, _>("address"))?,
        from_address: address_from_row(&row.get::<String, _>("from_address"))?,
        to_address: address_from_row(&row.get::<String, _>("to_address"))?,
        timestamp: Timestamp::new(row.get("timestamp")),
        pool_address: address_from_row(&row.get::<String, _>("pool_address"))?,
        token0: token_from_row(row, "t0")?,
        token1: token_from_row(row, "t1")?,
        amount0_in: amount("amount0_in"),
        amount1_in: amount("amount1_in"),
        amount0_out: amount("amount0_out"),
        amount1_out: amount("amount1_out"),
    })
}
