//! Staking event operations for the repository.

use crate::domain::{
    Address, Balance, DataKind, EventCore, StakingEvent, StakingEventType, Timestamp,
};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use tracing::warn;

use super::{address_from_row, decimal_from_row, Repository};

/// `(timestamp, secondary key, event type)`, matching [`StakingEvent::ordering_key`].
const STAKING_ORDER: &str = r#"
    ORDER BY timestamp ASC,
             secondary_key ASC,
             CASE event_type
                 WHEN 'deposit' THEN 0
                 WHEN 'withdraw' THEN 1
                 WHEN 'withdraw request' THEN 2
                 ELSE 3
             END ASC
"#;

impl Repository {
    /// Insert staking events idempotently in a single transaction.
    ///
    /// The uniqueness key is `(tx_hash, event_type, secondary_key)`, stored
    /// lowercased. Returns the number of newly inserted events.
    pub async fn add_staking_events(&self, events: &[StakingEvent]) -> Result<usize, sqlx::Error> {
        if events.is_empty() {
            return Ok(0);
        }

        let mut total_inserted = 0usize;
        let mut tx = self.pool.begin().await?;

        for event in events {
            let core = event.core();
            let (nonce, slashed_at, unlock_at) = match event {
                StakingEvent::Bond {
                    nonce, slashed_at, ..
                } => (Some(*nonce), Some(slashed_at.as_i64()), None),
                StakingEvent::UnbondRequest { unlock_at, .. } => {
                    (None, None, Some(unlock_at.as_i64()))
                }
                StakingEvent::Unbond { .. } | StakingEvent::ChannelWithdraw { .. } => {
                    (None, None, None)
                }
            };

            let result = sqlx::query(
                r#"
                INSERT INTO staking_events (
                    tx_hash, event_type, secondary_key, address, identity_address,
                    timestamp, pool_id, amount, usd_value, nonce, slashed_at, unlock_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(tx_hash, event_type, secondary_key) DO NOTHING
                "#,
            )
            .bind(core.tx_hash.to_ascii_lowercase())
            .bind(event.event_type().label())
            .bind(event.secondary_key().to_ascii_lowercase())
            .bind(core.address.as_str())
            .bind(core.identity_address.as_str())
            .bind(core.timestamp.as_i64())
            .bind(core.pool_id.to_ascii_lowercase())
            .bind(core.value.amount.to_canonical_string())
            .bind(core.value.usd_value.map(|v| v.to_canonical_string()))
            .bind(nonce)
            .bind(slashed_at)
            .bind(unlock_at)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() > 0 {
                total_inserted += 1;
            }
        }

        tx.commit().await?;
        Ok(total_inserted)
    }

    /// Staking events of `address` with `from <= timestamp <= to` in display order.
    pub async fn get_staking_events(
        &self,
        address: &Address,
        from: Timestamp,
        to: Timestamp,
    ) -> Result<Vec<StakingEvent>, sqlx::Error> {
        let sql = format!(
            r#"
            SELECT tx_hash, event_type, secondary_key, address, identity_address,
                   timestamp, pool_id, amount, usd_value, nonce, slashed_at, unlock_at
            FROM staking_events
            WHERE address = ? AND timestamp >= ? AND timestamp <= ?
            {}
            "#,
            STAKING_ORDER
        );
        let rows = sqlx::query(&sql)
            .bind(address.as_str())
            .bind(from.as_i64())
            .bind(to.as_i64())
            .fetch_all(&self.pool)
            .await?;

        let mut events = Vec::with_capacity(rows.len());
        for row in &rows {
            if let Some(event) = staking_event_from_row(row)? {
                events.push(event);
            }
        }
        Ok(events)
    }

    /// Delete staking events for one address (or all) and the matching coverage.
    pub async fn delete_staking_events(
        &self,
        address: Option<&Address>,
    ) -> Result<u64, sqlx::Error> {
        self.delete_history(DataKind::StakingEvents, "staking_events", address)
            .await
    }
}

fn staking_event_from_row(row: &SqliteRow) -> Result<Option<StakingEvent>, sqlx::Error> {
    let label: String = row.get("event_type");
    let Some(event_type) = StakingEventType::from_label(&label) else {
        warn!(event_type = %label, "Unknown stored staking event type, skipping row");
        return Ok(None);
    };

    let amount: String = row.get("amount");
    let usd_value: Option<String> = row.get("usd_value");
    let core = EventCore {
        tx_hash: row.get("tx_hash"),
        address: address_from_row(&row.get::<String, _>("address"))?,
        identity_address: address_from_row(&row.get::<String, _>("identity_address"))?,
        timestamp: Timestamp::new(row.get("timestamp")),
        pool_id: row.get("pool_id"),
        value: Balance::new(
            decimal_from_row(&amount, "amount"),
            usd_value.map(|v| decimal_from_row(&v, "usd_value")),
        ),
    };
    let key: String = row.get("secondary_key");
    let nonce: Option<i64> = row.get("nonce");
    let slashed_at: Option<i64> = row.get("slashed_at");
    let unlock_at: Option<i64> = row.get("unlock_at");

    let event = match event_type {
        StakingEventType::Bond => StakingEvent::Bond {
            core,
            bond_id: key,
            nonce: nonce.unwrap_or_default(),
            slashed_at: Timestamp::new(slashed_at.unwrap_or_default()),
        },
        StakingEventType::Unbond => StakingEvent::Unbond { core, bond_id: key },
        StakingEventType::UnbondRequest => StakingEvent::UnbondRequest {
            core,
            bond_id: key,
            unlock_at: Timestamp::new(unlock_at.unwrap_or_default()),
        },
        StakingEventType::ChannelWithdraw => StakingEvent::ChannelWithdraw {
            core,
            channel_id: key,
        },
    };
    Ok(Some(event))
}
