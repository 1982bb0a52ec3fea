//! Repository layer for database operations.
//!
//! This module provides the `Repository` struct for all database operations.
//! Methods are organized across submodules by protocol:
//! - `swaps.rs` - AMM swap leg storage
//! - `lp_events.rs` - AMM LP mint/burn storage
//! - `staking.rs` - Staking event storage
//!
//! Range entries and token metadata are shared and live here.

mod lp_events;
mod staking;
mod swaps;

use crate::domain::{Address, DataKind, Decimal, TimeRange, Timestamp, Token};
use sqlx::sqlite::SqlitePool;
use sqlx::{Row, Sqlite, Transaction};
use tracing::{info, warn};

/// Repository for database operations.
#[derive(Debug, Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Repository { pool }
    }

    /// Round-trip a trivial query through the pool.
    pub async fn ping(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    // =========================================================================
    // Used query ranges
    // =========================================================================

    /// Coverage recorded under `name`, or `None` if never fetched.
    pub async fn get_used_query_range(&self, name: &str) -> Result<Option<TimeRange>, sqlx::Error> {
        let row = sqlx::query("SELECT start_ts, end_ts FROM used_query_ranges WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.and_then(|r| {
            TimeRange::new(
                Timestamp::new(r.get("start_ts")),
                Timestamp::new(r.get("end_ts")),
            )
        }))
    }

    /// Overwrite the coverage recorded under `name`.
    pub async fn update_used_query_range(
        &self,
        name: &str,
        start: Timestamp,
        end: Timestamp,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO used_query_ranges (name, start_ts, end_ts)
            VALUES (?, ?, ?)
            ON CONFLICT(name) DO UPDATE SET
                start_ts = excluded.start_ts,
                end_ts = excluded.end_ts
            "#,
        )
        .bind(name)
        .bind(start.as_i64())
        .bind(end.as_i64())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // =========================================================================
    // Tokens
    // =========================================================================

    /// Return the stored token for `address`, inserting the given metadata
    /// first if the token is unknown. The first stored metadata wins.
    pub async fn resolve_or_create_token(
        &self,
        address: &Address,
        symbol: &str,
        name: &str,
        decimals: u8,
    ) -> Result<Token, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        insert_token(&mut tx, &Token::new(address.clone(), symbol, name, decimals)).await?;
        let row = sqlx::query("SELECT address, symbol, name, decimals FROM tokens WHERE address = ?")
            .bind(address.as_str())
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(Token::new(
            address.clone(),
            row.get::<String, _>("symbol").as_str(),
            row.get::<String, _>("name").as_str(),
            decimals_from_row(row.get("decimals")),
        ))
    }

    // =========================================================================
    // Protocol deletion (history + coverage, atomically)
    // =========================================================================

    /// Delete stored history of `kind` for one address, or for everyone when
    /// `address` is `None`, together with the matching range entries.
    async fn delete_history(
        &self,
        kind: DataKind,
        table: &'static str,
        address: Option<&Address>,
    ) -> Result<u64, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let deleted = match address {
            Some(address) => {
                let deleted = sqlx::query(&format!("DELETE FROM {} WHERE address = ?", table))
                    .bind(address.as_str())
                    .execute(&mut *tx)
                    .await?
                    .rows_affected();
                sqlx::query("DELETE FROM used_query_ranges WHERE name = ?")
                    .bind(kind.range_key(address))
                    .execute(&mut *tx)
                    .await?;
                deleted
            }
            None => {
                let deleted = sqlx::query(&format!("DELETE FROM {}", table))
                    .execute(&mut *tx)
                    .await?
                    .rows_affected();
                delete_ranges_with_prefix(&mut tx, &format!("{}_", kind.range_prefix()))
                    .await?;
                deleted
            }
        };

        tx.commit().await?;
        info!(kind = kind.range_prefix(), ?address, deleted, "Deleted stored history");
        Ok(deleted)
    }
}

/// Delete every range entry whose name starts with `prefix`, compared
/// literally so `_` is not a wildcard.
async fn delete_ranges_with_prefix(
    tx: &mut Transaction<'_, Sqlite>,
    prefix: &str,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM used_query_ranges WHERE instr(name, ?) = 1")
        .bind(prefix)
        .execute(&mut **tx)
        .await?;
    Ok(result.rows_affected())
}

async fn insert_token(tx: &mut Transaction<'_, Sqlite>, token: &Token) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO tokens (address, symbol, name, decimals)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(address) DO NOTHING
        "#,
    )
    .bind(token.address.as_str())
    .bind(token.symbol.as_str())
    .bind(token.name.as_str())
    .bind(i64::from(token.decimals))
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Addresses are written checksummed; a value that no longer parses means the
/// row was written by something else.
fn address_from_row(raw: &str) -> Result<Address, sqlx::Error> {
    Address::parse(raw).map_err(|e| sqlx::Error::Decode(Box::new(e)))
}

fn decimal_from_row(raw: &str, column: &str) -> Decimal {
    Decimal::from_str_canonical(raw).unwrap_or_else(|e| {
        warn!(column, value = %raw, error = %e, "Failed to parse stored decimal, using default");
        Decimal::default()
    })
}

fn decimals_from_row(raw: i64) -> u8 {
    u8::try_from(raw).unwrap_or_else(|_| {
        warn!(decimals = raw, "Stored token decimals out of range, using 18");
        18
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrations::init_db;
    use tempfile::TempDir;

    pub(super) async fn setup_test_db() -> (Repository, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir
            .path()
            .join("test.db")
            .to_string_lossy()
            .to_string();
        let pool = init_db(&db_path).await.expect("init_db failed");
        (Repository::new(pool), temp_dir)
    }

    fn addr(hex_digit: char) -> Address {
        Address::parse(&format!("0x{}", hex_digit.to_string().repeat(40))).unwrap()
    }

    #[tokio::test]
    async fn test_range_absent_then_overwritten() {
        let (repo, _temp) = setup_test_db().await;
        let key = DataKind::AmmTrades.range_key(&addr('a'));

        assert_eq!(repo.get_used_query_range(&key).await.unwrap(), None);

        repo.update_used_query_range(&key, Timestamp::zero(), Timestamp::new(1000))
            .await
            .unwrap();
        repo.update_used_query_range(&key, Timestamp::zero(), Timestamp::new(2000))
            .await
            .unwrap();

        let range = repo.get_used_query_range(&key).await.unwrap().unwrap();
        assert_eq!(range.start, Timestamp::zero());
        assert_eq!(range.end, Timestamp::new(2000));
    }

    #[tokio::test]
    async fn test_protocol_delete_clears_only_its_ranges() {
        let (repo, _temp) = setup_test_db().await;
        let amm = DataKind::AmmTrades.range_key(&addr('a'));
        let staking = DataKind::StakingEvents.range_key(&addr('a'));
        // `_` must not act as a LIKE wildcard.
        let lookalike = format!("ammXtrades_{}", addr('b'));

        for name in [&amm, &staking, &lookalike] {
            repo.update_used_query_range(name, Timestamp::zero(), Timestamp::new(5))
                .await
                .unwrap();
        }

        repo.delete_amm_swaps(None).await.unwrap();
        assert!(repo.get_used_query_range(&amm).await.unwrap().is_none());
        assert!(repo.get_used_query_range(&staking).await.unwrap().is_some());
        assert!(repo.get_used_query_range(&lookalike).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_resolve_or_create_token_first_write_wins() {
        let (repo, _temp) = setup_test_db().await;
        let address = addr('c');

        let created = repo
            .resolve_or_create_token(&address, "ADX", "AdEx Network", 18)
            .await
            .unwrap();
        let resolved = repo
            .resolve_or_create_token(&address, "OTHER", "Other", 6)
            .await
            .unwrap();

        assert_eq!(created, resolved);
        assert_eq!(resolved.symbol, "ADX");
        assert_eq!(resolved.decimals, 18);
    }
}
