//! AMM exchange: swap history, trades, LP events and LP balances.

use super::lp_events::AmmEventsProtocol;
use super::sync::{HistorySource, ReconciledHistory, SyncEngine, SyncError, SyncReport};
use crate::datasource::queries::SWAPS_QUERY;
use crate::datasource::schema::{self, GraphSwap, GraphSwapEntry, GraphToken};
use crate::datasource::{
    decode_record, FetchedPages, PageQuery, PaginatedFetcher, PaginationMode, PriceSource,
    QueryExecutor, RecordError, GRAPH_QUERY_LIMIT,
};
use crate::db::Repository;
use crate::domain::{Address, DataKind, LiquidityPool, LpEvent, RawSwapLeg, Timestamp, Token, Trade};
use crate::engine::SwapGrouper;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Capability set for syncing AMM swap legs.
#[derive(Debug, Clone)]
pub struct AmmProtocol {
    executor: Arc<dyn QueryExecutor>,
    repo: Arc<Repository>,
    page_size: usize,
}

impl AmmProtocol {
    pub fn new(executor: Arc<dyn QueryExecutor>, repo: Arc<Repository>) -> Self {
        Self {
            executor,
            repo,
            page_size: GRAPH_QUERY_LIMIT,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    fn fetcher(&self) -> PaginatedFetcher<'_, dyn QueryExecutor> {
        PaginatedFetcher::with_page_size(self.executor.as_ref(), self.page_size)
    }
}

pub(super) fn address_list(addresses: &[Address]) -> Value {
    Value::Array(
        addresses
            .iter()
            .map(|a| Value::String(a.to_lowercase()))
            .collect(),
    )
}

/// Decode one matched swap and every leg of its transaction.
///
/// Malformed legs are skipped individually; an unusable owner or pool
/// address fails the whole record.
fn decode_swap_entry(value: Value) -> Result<Vec<RawSwapLeg>, RecordError> {
    let entry: GraphSwapEntry = decode_record(value)?;
    let owner = schema::identity_address(&entry.to, "to")?;

    let mut legs = Vec::with_capacity(entry.transaction.swaps.len());
    for raw in entry.transaction.swaps {
        match decode_leg(&owner, raw) {
            Ok(leg) => legs.push(leg),
            Err(RecordError::Skip(reason)) => {
                warn!(owner = %owner, %reason, "Skipping malformed swap leg")
            }
            Err(corrupt) => return Err(corrupt),
        }
    }
    Ok(legs)
}

fn decode_leg(owner: &Address, value: Value) -> Result<RawSwapLeg, RecordError> {
    let swap: GraphSwap = decode_record(value)?;
    let pool_address = schema::identity_address(&swap.pair.id, "pair.id")?;

    Ok(RawSwapLeg {
        tx_hash: schema::tx_hash_from_id(&swap.id),
        log_index: swap.log_index,
        address: owner.clone(),
        from_address: schema::descriptive_address(&swap.sender, "sender")?,
        to_address: schema::descriptive_address(&swap.to, "to")?,
        timestamp: Timestamp::new(swap.timestamp),
        pool_address,
        token0: wire_token(&swap.pair.token0, RecordError::Skip)?,
        token1: wire_token(&swap.pair.token1, RecordError::Skip)?,
        amount0_in: schema::amount(&swap.amount0_in, "amount0In")?,
        amount1_in: schema::amount(&swap.amount1_in, "amount1In")?,
        amount0_out: schema::amount(&swap.amount0_out, "amount0Out")?,
        amount1_out: schema::amount(&swap.amount1_out, "amount1Out")?,
    })
}

pub(super) fn wire_token(
    token: &GraphToken,
    on_error: fn(String) -> RecordError,
) -> Result<Token, RecordError> {
    let address = Address::parse(&token.id)
        .map_err(|e| on_error(format!("token {}: {}", token.id, e)))?;
    Ok(Token::new(address, &token.symbol, &token.name, token.decimals))
}

#[async_trait]
impl HistorySource for AmmProtocol {
    type Record = RawSwapLeg;

    fn kind(&self) -> DataKind {
        DataKind::AmmTrades
    }

    async fn fetch(
        &self,
        addresses: &[Address],
        start: Timestamp,
        end: Timestamp,
    ) -> FetchedPages<RawSwapLeg> {
        let query = PageQuery::new(SWAPS_QUERY, "swaps")
            .filter("addresses", "[Bytes!]", address_list(addresses))
            .filter("start_ts", "BigInt!", Value::String(start.to_string()))
            .filter("end_ts", "BigInt!", Value::String(end.to_string()));

        let result = self
            .fetcher()
            .fetch_all(&query, PaginationMode::Partial, decode_swap_entry)
            .await;
        match result {
            Ok(pages) => FetchedPages {
                records: pages.records.into_iter().flatten().collect(),
                pages: pages.pages,
                skipped: pages.skipped,
                error: pages.error,
            },
            Err(error) => FetchedPages {
                records: Vec::new(),
                pages: 0,
                skipped: 0,
                error: Some(error),
            },
        }
    }

    async fn store(&self, records: &[RawSwapLeg]) -> Result<usize, sqlx::Error> {
        self.repo.add_amm_swaps(records).await
    }

    async fn load(
        &self,
        address: &Address,
        from: Timestamp,
        to: Timestamp,
    ) -> Result<Vec<RawSwapLeg>, sqlx::Error> {
        self.repo.get_amm_swaps(address, from, to).await
    }

    async fn purge(&self, address: Option<&Address>) -> Result<u64, sqlx::Error> {
        self.repo.delete_amm_swaps(address).await
    }
}

/// Trades per address, with the sync outcome when the indexer was queried.
#[derive(Debug, Clone)]
pub struct TradesHistory {
    pub report: Option<SyncReport>,
    pub trades: BTreeMap<Address, Vec<Trade>>,
}

/// Entry point for AMM history and balances.
pub struct AmmService {
    engine: SyncEngine<AmmProtocol>,
    events: SyncEngine<AmmEventsProtocol>,
}

impl AmmService {
    pub fn new(protocol: AmmProtocol, prices: Arc<dyn PriceSource>) -> Self {
        let repo = protocol.repo.clone();
        let events = AmmEventsProtocol::new(protocol.executor.clone(), repo.clone(), prices)
            .with_page_size(protocol.page_size);
        Self {
            engine: SyncEngine::new(protocol, repo.clone()),
            events: SyncEngine::new(events, repo),
        }
    }

    pub fn engine(&self) -> &SyncEngine<AmmProtocol> {
        &self.engine
    }

    pub fn events_engine(&self) -> &SyncEngine<AmmEventsProtocol> {
        &self.events
    }

    /// Trades of `addresses` in `[from, to]`.
    ///
    /// `only_cache` answers from local storage alone. `reset` wipes stored
    /// AMM history first and refetches from scratch.
    pub async fn trades_history(
        &self,
        addresses: &[Address],
        from: Timestamp,
        to: Timestamp,
        only_cache: bool,
        reset: bool,
    ) -> Result<TradesHistory, SyncError> {
        let (report, legs) = if only_cache && !reset {
            (None, self.engine.cached(addresses, from, to).await?)
        } else {
            let history = self.engine.history(addresses, from, to, reset).await?;
            (Some(history.report), history.records)
        };

        let trades = legs
            .into_iter()
            .map(|(address, legs)| (address, SwapGrouper::group(legs)))
            .collect();
        Ok(TradesHistory { report, trades })
    }

    /// LP mints and burns of `addresses` in `[from, to]` with per-pool
    /// profit/loss.
    pub async fn events_history(
        &self,
        addresses: &[Address],
        from: Timestamp,
        to: Timestamp,
        reset: bool,
    ) -> Result<ReconciledHistory<LpEvent>, SyncError> {
        let history = self
            .events
            .reconciled_history(addresses, from, to, reset)
            .await?;
        info!(
            addresses = history.history.records.len(),
            failed = history.history.report.failed.len(),
            "LP event history ready"
        );
        Ok(history)
    }

    /// Current LP positions of `addresses`, with underlying assets priced.
    pub async fn balances(
        &self,
        addresses: &[Address],
    ) -> Result<BTreeMap<Address, Vec<LiquidityPool>>, SyncError> {
        self.events.source().lp_balances(addresses).await
    }

    /// Delete all stored AMM history and coverage.
    pub async fn deactivate(&self) -> Result<u64, sqlx::Error> {
        let trades = self.engine.purge(None).await?;
        let events = self.events.purge(None).await?;
        Ok(trades + events)
    }
}
