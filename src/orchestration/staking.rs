//! Staking platform: bond lifecycle and claim history, live stakes, and
//! per-pool profit/loss.

use super::sync::{HistorySource, ReconciledHistory, SnapshotSource, SyncEngine, SyncError};
use crate::datasource::queries::{
    BONDS_QUERY, CHANNEL_WITHDRAWS_QUERY, STAKES_QUERY, UNBONDS_QUERY, UNBOND_REQUESTS_QUERY,
};
use crate::datasource::schema::{
    self, GraphBond, GraphChannelWithdraw, GraphStake, GraphUnbond, GraphUnbondRequest,
};
use crate::datasource::{
    decode_record, FetchedPages, PageQuery, PaginatedFetcher, PaginationMode, PriceSource,
    QueryExecutor, RecordError, RemoteError, GRAPH_QUERY_LIMIT,
};
use crate::db::Repository;
use crate::domain::{
    Address, Balance, DataKind, Decimal, EventCore, PoolBalanceSnapshot, RewardBalance,
    StakingEvent, Timestamp, Token,
};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

type Decoder = fn(Value, u8) -> Result<StakingEvent, RecordError>;

/// Event queries, fetched in this order.
const EVENT_QUERIES: [(&str, &str, Decoder); 4] = [
    (BONDS_QUERY, "bonds", decode_bond),
    (UNBONDS_QUERY, "unbonds", decode_unbond),
    (UNBOND_REQUESTS_QUERY, "unbondRequests", decode_unbond_request),
    (CHANNEL_WITHDRAWS_QUERY, "channelWithdraws", decode_channel_withdraw),
];

/// Capability set for syncing staking events.
#[derive(Debug, Clone)]
pub struct StakingProtocol {
    executor: Arc<dyn QueryExecutor>,
    repo: Arc<Repository>,
    prices: Arc<dyn PriceSource>,
    /// The staked token; amounts are reported in its base units.
    token: Token,
    /// Second token some pools pay rewards in.
    reward_token: Option<Token>,
    page_size: usize,
}

impl StakingProtocol {
    pub fn new(
        executor: Arc<dyn QueryExecutor>,
        repo: Arc<Repository>,
        prices: Arc<dyn PriceSource>,
        token: Token,
    ) -> Self {
        Self {
            executor,
            repo,
            prices,
            token,
            reward_token: None,
            page_size: GRAPH_QUERY_LIMIT,
        }
    }

    pub fn with_reward_token(mut self, token: Token) -> Self {
        self.reward_token = Some(token);
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    fn fetcher(&self) -> PaginatedFetcher<'_, dyn QueryExecutor> {
        PaginatedFetcher::with_page_size(self.executor.as_ref(), self.page_size)
    }

    /// Attach the USD value at event time to each event.
    async fn price_events(&self, events: &mut [StakingEvent]) -> Result<(), RemoteError> {
        for event in events.iter_mut() {
            let core = core_mut(event);
            let price = self.prices.price_of(&self.token, Some(core.timestamp)).await?;
            core.value = Balance::at_price(core.value.amount, price);
        }
        Ok(())
    }
}

fn core_mut(event: &mut StakingEvent) -> &mut EventCore {
    match event {
        StakingEvent::Bond { core, .. }
        | StakingEvent::Unbond { core, .. }
        | StakingEvent::UnbondRequest { core, .. }
        | StakingEvent::ChannelWithdraw { core, .. } => core,
    }
}

fn event_core(
    id: &str,
    owner: &str,
    identity: &str,
    timestamp: i64,
    pool_id: &str,
    amount: &str,
    decimals: u8,
) -> Result<EventCore, RecordError> {
    Ok(EventCore {
        tx_hash: schema::tx_hash_from_id(id),
        address: schema::identity_address(owner, "owner")?,
        identity_address: schema::descriptive_address(identity, "identity")?,
        timestamp: Timestamp::new(timestamp),
        pool_id: pool_id.to_ascii_lowercase(),
        value: Balance::new(schema::base_units(amount, decimals, "amount")?, None),
    })
}

fn decode_bond(value: Value, decimals: u8) -> Result<StakingEvent, RecordError> {
    let bond: GraphBond = decode_record(value)?;
    Ok(StakingEvent::Bond {
        core: event_core(
            &bond.id,
            &bond.owner,
            &bond.identity,
            bond.timestamp,
            &bond.pool_id,
            &bond.amount,
            decimals,
        )?,
        bond_id: bond.bond_id.to_ascii_lowercase(),
        nonce: bond.nonce,
        slashed_at: Timestamp::new(bond.slashed_at_start),
    })
}

fn decode_unbond(value: Value, decimals: u8) -> Result<StakingEvent, RecordError> {
    let unbond: GraphUnbond = decode_record(value)?;
    Ok(StakingEvent::Unbond {
        core: event_core(
            &unbond.id,
            &unbond.owner,
            &unbond.identity,
            unbond.timestamp,
            &unbond.bond.pool_id,
            &unbond.bond.amount,
            decimals,
        )?,
        bond_id: unbond.bond.id.to_ascii_lowercase(),
    })
}

fn decode_unbond_request(value: Value, decimals: u8) -> Result<StakingEvent, RecordError> {
    let request: GraphUnbondRequest = decode_record(value)?;
    Ok(StakingEvent::UnbondRequest {
        core: event_core(
            &request.id,
            &request.owner,
            &request.identity,
            request.timestamp,
            &request.bond.pool_id,
            &request.bond.amount,
            decimals,
        )?,
        bond_id: request.bond.id.to_ascii_lowercase(),
        unlock_at: Timestamp::new(request.will_unlock),
    })
}

fn decode_channel_withdraw(value: Value, decimals: u8) -> Result<StakingEvent, RecordError> {
    let withdraw: GraphChannelWithdraw = decode_record(value)?;
    Ok(StakingEvent::ChannelWithdraw {
        core: event_core(
            &withdraw.id,
            &withdraw.owner,
            &withdraw.identity,
            withdraw.timestamp,
            &withdraw.pool_id,
            &withdraw.amount,
            decimals,
        )?,
        channel_id: withdraw.channel_id.to_ascii_lowercase(),
    })
}

#[async_trait]
impl HistorySource for StakingProtocol {
    type Record = StakingEvent;

    fn kind(&self) -> DataKind {
        DataKind::StakingEvents
    }

    async fn fetch(
        &self,
        addresses: &[Address],
        start: Timestamp,
        end: Timestamp,
    ) -> FetchedPages<StakingEvent> {
        let addresses: Vec<Value> = addresses
            .iter()
            .map(|a| Value::String(a.to_lowercase()))
            .collect();
        let decimals = self.token.decimals;
        let mut fetched = FetchedPages {
            records: Vec::new(),
            pages: 0,
            skipped: 0,
            error: None,
        };

        for (template, root_key, decode) in EVENT_QUERIES {
            let query = PageQuery::new(template, root_key)
                .filter("addresses", "[String!]", Value::Array(addresses.clone()))
                .filter("start_ts", "Int!", Value::from(start.as_i64()))
                .filter("end_ts", "Int!", Value::from(end.as_i64()));
            let pages = match self
                .fetcher()
                .fetch_all(&query, PaginationMode::Partial, |v| decode(v, decimals))
                .await
            {
                Ok(pages) => pages,
                Err(error) => {
                    fetched.error = Some(error);
                    break;
                }
            };
            debug!(root = root_key, records = pages.records.len(), "Fetched staking events");
            fetched.records.extend(pages.records);
            fetched.pages += pages.pages;
            fetched.skipped += pages.skipped;
            if pages.error.is_some() {
                fetched.error = pages.error;
                break;
            }
        }

        if let Err(error) = self.price_events(&mut fetched.records).await {
            fetched.records.clear();
            fetched.error = Some(error);
        }
        fetched
    }

    async fn store(&self, records: &[StakingEvent]) -> Result<usize, sqlx::Error> {
        self.repo.add_staking_events(records).await
    }

    async fn load(
        &self,
        address: &Address,
        from: Timestamp,
        to: Timestamp,
    ) -> Result<Vec<StakingEvent>, sqlx::Error> {
        self.repo.get_staking_events(address, from, to).await
    }

    async fn purge(&self, address: Option<&Address>) -> Result<u64, sqlx::Error> {
        self.repo.delete_staking_events(address).await
    }
}

#[async_trait]
impl SnapshotSource for StakingProtocol {
    async fn snapshots(
        &self,
        addresses: &[Address],
    ) -> Result<HashMap<Address, Vec<PoolBalanceSnapshot>>, SyncError> {
        let mut snapshots: HashMap<Address, Vec<PoolBalanceSnapshot>> = HashMap::new();
        if addresses.is_empty() {
            return Ok(snapshots);
        }

        let query = PageQuery::new(STAKES_QUERY, "stakes").filter(
            "addresses",
            "[String!]",
            Value::Array(
                addresses
                    .iter()
                    .map(|a| Value::String(a.to_lowercase()))
                    .collect(),
            ),
        );
        let decimals = self.token.decimals;
        let reward_decimals = self.reward_token.as_ref().map(|t| t.decimals);
        let stakes = self
            .fetcher()
            .fetch_all(&query, PaginationMode::Strict, |v| {
                decode_stake(v, decimals, reward_decimals)
            })
            .await?
            .records;
        let price = self.prices.price_of(&self.token, None).await?;
        let reward_price = match &self.reward_token {
            Some(token) => self.prices.price_of(token, None).await?,
            None => None,
        };

        for stake in stakes {
            let reward = self
                .reward_token
                .clone()
                .zip(stake.reward)
                .map(|(token, amount)| RewardBalance {
                    token,
                    unclaimed: Balance::at_price(amount, reward_price),
                });
            snapshots
                .entry(stake.owner.clone())
                .or_default()
                .push(PoolBalanceSnapshot {
                    address: stake.owner,
                    pool_id: stake.pool_id,
                    balance: Balance::at_price(stake.bonded, price),
                    unclaimed: Balance::at_price(stake.unclaimed, price),
                    reward,
                    pool_total_staked: stake.pool_total_staked,
                });
        }
        Ok(snapshots)
    }
}

struct DecodedStake {
    owner: Address,
    pool_id: String,
    bonded: Decimal,
    unclaimed: Decimal,
    /// Only decoded when the reward token is known.
    reward: Option<Decimal>,
    pool_total_staked: Option<Decimal>,
}

fn decode_stake(
    value: Value,
    decimals: u8,
    reward_decimals: Option<u8>,
) -> Result<DecodedStake, RecordError> {
    let stake: GraphStake = decode_record(value)?;
    let reward = match (stake.unclaimed_reward_secondary.as_deref(), reward_decimals) {
        (Some(raw), Some(reward_decimals)) => Some(schema::base_units(
            raw,
            reward_decimals,
            "unclaimedRewardSecondary",
        )?),
        _ => None,
    };
    let pool_total_staked = stake
        .pool_total_staked
        .as_deref()
        .map(|raw| schema::base_units(raw, decimals, "poolTotalStaked"))
        .transpose()?;
    Ok(DecodedStake {
        owner: schema::identity_address(&stake.owner, "owner")?,
        pool_id: stake.pool_id.to_ascii_lowercase(),
        bonded: schema::base_units(&stake.bonded, decimals, "bonded")?,
        unclaimed: schema::base_units(&stake.unclaimed_reward, decimals, "unclaimedReward")?,
        reward,
        pool_total_staked,
    })
}

/// Entry point for staking history and profit/loss.
pub struct StakingService {
    engine: SyncEngine<StakingProtocol>,
}

impl StakingService {
    pub fn new(protocol: StakingProtocol) -> Self {
        let repo = protocol.repo.clone();
        Self {
            engine: SyncEngine::new(protocol, repo),
        }
    }

    pub fn engine(&self) -> &SyncEngine<StakingProtocol> {
        &self.engine
    }

    /// Events of `addresses` in `[from, to]` with per-pool profit/loss.
    pub async fn staking_history(
        &self,
        addresses: &[Address],
        from: Timestamp,
        to: Timestamp,
        reset: bool,
    ) -> Result<ReconciledHistory<StakingEvent>, SyncError> {
        let history = self
            .engine
            .reconciled_history(addresses, from, to, reset)
            .await?;
        info!(
            addresses = history.history.records.len(),
            failed = history.history.report.failed.len(),
            "Staking history ready"
        );
        Ok(history)
    }

    /// Delete all stored staking history and coverage.
    pub async fn deactivate(&self) -> Result<u64, sqlx::Error> {
        self.engine.purge(None).await
    }
}
