//! AMM liquidity: LP mint/burn history and current LP positions.

use super::amm::{address_list, wire_token};
use super::sync::{HistorySource, SnapshotSource, SyncError};
use crate::datasource::queries::{BURNS_QUERY, LIQUIDITY_POSITIONS_QUERY, MINTS_QUERY};
use crate::datasource::schema::{self, GraphLiquidityEvent, GraphLiquidityPosition};
use crate::datasource::{
    decode_record, FetchedPages, PageQuery, PaginatedFetcher, PaginationMode, PriceSource,
    QueryExecutor, RecordError, GRAPH_QUERY_LIMIT,
};
use crate::db::Repository;
use crate::domain::{
    Address, Balance, DataKind, Decimal, LiquidityPool, LiquidityPoolAsset, LpEvent, LpEventType,
    PoolBalanceSnapshot, Timestamp, Token,
};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info};

/// Event queries, fetched in this order.
const EVENT_QUERIES: [(&str, &str, LpEventType); 2] = [
    (MINTS_QUERY, "mints", LpEventType::Mint),
    (BURNS_QUERY, "burns", LpEventType::Burn),
];

/// Capability set for syncing LP mints and burns.
#[derive(Debug, Clone)]
pub struct AmmEventsProtocol {
    executor: Arc<dyn QueryExecutor>,
    repo: Arc<Repository>,
    prices: Arc<dyn PriceSource>,
    page_size: usize,
}

impl AmmEventsProtocol {
    pub fn new(
        executor: Arc<dyn QueryExecutor>,
        repo: Arc<Repository>,
        prices: Arc<dyn PriceSource>,
    ) -> Self {
        Self {
            executor,
            repo,
            prices,
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

    /// Current LP positions of `addresses`, with underlying assets priced.
    ///
    /// Every requested address is present in the result, possibly with no
    /// pools.
    pub async fn lp_balances(
        &self,
        addresses: &[Address],
    ) -> Result<BTreeMap<Address, Vec<LiquidityPool>>, SyncError> {
        let mut balances: BTreeMap<Address, Vec<LiquidityPool>> = addresses
            .iter()
            .map(|a| (a.clone(), Vec::new()))
            .collect();
        if addresses.is_empty() {
            return Ok(balances);
        }

        let query = PageQuery::new(LIQUIDITY_POSITIONS_QUERY, "liquidityPositions")
            .filter("addresses", "[String!]", address_list(addresses))
            .filter("balance", "BigDecimal!", Value::String("0".to_string()));
        let positions = self
            .fetcher()
            .fetch_all(&query, PaginationMode::Strict, decode_position)
            .await?
            .records;

        for position in positions {
            let (user, pool) = self.liquidity_pool(position).await?;
            balances.entry(user).or_default().push(pool);
        }
        info!(addresses = addresses.len(), "Fetched LP balances");
        Ok(balances)
    }

    async fn liquidity_pool(
        &self,
        position: DecodedPosition,
    ) -> Result<(Address, LiquidityPool), SyncError> {
        let share = position
            .user_lp
            .checked_div(position.total_supply)
            .unwrap_or_else(Decimal::zero);

        let mut assets = Vec::with_capacity(position.reserves.len());
        for (wire, reserve) in position.reserves {
            let token = self
                .repo
                .resolve_or_create_token(&wire.address, &wire.symbol, &wire.name, wire.decimals)
                .await?;
            let price = self.prices.price_of(&token, None).await?;
            assets.push(LiquidityPoolAsset {
                user_balance: Balance::at_price(share * reserve, price),
                total_amount: reserve,
                asset: token,
            });
        }

        let usd_value = assets
            .iter()
            .map(|a| a.user_balance.usd_value)
            .sum::<Option<Decimal>>();
        Ok((
            position.user,
            LiquidityPool {
                address: position.pool,
                assets,
                total_supply: position.total_supply,
                user_balance: Balance::new(position.user_lp, usd_value),
            },
        ))
    }
}

/// Decode one mint or burn.
///
/// The provider is `to` for mints and `sender` for burns; without it the
/// record cannot be attributed and is corrupt.
fn decode_lp_event(value: Value, event_type: LpEventType) -> Result<LpEvent, RecordError> {
    let event: GraphLiquidityEvent = decode_record(value)?;
    let (provider, field) = match event_type {
        LpEventType::Mint => (event.to.as_deref(), "to"),
        LpEventType::Burn => (event.sender.as_deref(), "sender"),
    };
    let provider =
        provider.ok_or_else(|| RecordError::Corrupt(format!("{} missing", field)))?;
    let usd_value = event
        .amount_usd
        .as_deref()
        .and_then(|raw| Decimal::from_str_canonical(raw).ok());

    Ok(LpEvent {
        tx_hash: schema::tx_hash_from_id(&event.id),
        log_index: event.log_index,
        event_type,
        address: schema::identity_address(provider, field)?,
        timestamp: Timestamp::new(event.timestamp),
        pool_address: schema::identity_address(&event.pair.id, "pair.id")?,
        token0: wire_token(&event.pair.token0, RecordError::Skip)?,
        token1: wire_token(&event.pair.token1, RecordError::Skip)?,
        amount0: schema::amount(&event.amount0, "amount0")?,
        amount1: schema::amount(&event.amount1, "amount1")?,
        lp_amount: Balance::new(schema::amount(&event.liquidity, "liquidity")?, usd_value),
    })
}

#[async_trait]
impl HistorySource for AmmEventsProtocol {
    type Record = LpEvent;

    fn kind(&self) -> DataKind {
        DataKind::AmmEvents
    }

    async fn fetch(
        &self,
        addresses: &[Address],
        start: Timestamp,
        end: Timestamp,
    ) -> FetchedPages<LpEvent> {
        let mut fetched = FetchedPages {
            records: Vec::new(),
            pages: 0,
            skipped: 0,
            error: None,
        };

        for (template, root_key, event_type) in EVENT_QUERIES {
            let query = PageQuery::new(template, root_key)
                .filter("addresses", "[Bytes!]", address_list(addresses))
                .filter("start_ts", "BigInt!", Value::String(start.to_string()))
                .filter("end_ts", "BigInt!", Value::String(end.to_string()));
            let pages = match self
                .fetcher()
                .fetch_all(&query, PaginationMode::Partial, |v| {
                    decode_lp_event(v, event_type)
                })
                .await
            {
                Ok(pages) => pages,
                Err(error) => {
                    fetched.error = Some(error);
                    break;
                }
            };
            debug!(root = root_key, records = pages.records.len(), "Fetched LP events");
            fetched.records.extend(pages.records);
            fetched.pages += pages.pages;
            fetched.skipped += pages.skipped;
            if pages.error.is_some() {
                fetched.error = pages.error;
                break;
            }
        }
        fetched
    }

    async fn store(&self, records: &[LpEvent]) -> Result<usize, sqlx::Error> {
        self.repo.add_lp_events(records).await
    }

    async fn load(
        &self,
        address: &Address,
        from: Timestamp,
        to: Timestamp,
    ) -> Result<Vec<LpEvent>, sqlx::Error> {
        self.repo.get_lp_events(address, from, to).await
    }

    async fn purge(&self, address: Option<&Address>) -> Result<u64, sqlx::Error> {
        self.repo.delete_lp_events(address).await
    }
}

#[async_trait]
impl SnapshotSource for AmmEventsProtocol {
    async fn snapshots(
        &self,
        addresses: &[Address],
    ) -> Result<HashMap<Address, Vec<PoolBalanceSnapshot>>, SyncError> {
        let balances = self.lp_balances(addresses).await?;
        Ok(balances
            .into_iter()
            .map(|(user, pools)| {
                let snapshots = pools
                    .into_iter()
                    .map(|pool| {
                        PoolBalanceSnapshot::holding(
                            user.clone(),
                            pool.address.to_lowercase(),
                            pool.user_balance,
                        )
                    })
                    .collect();
                (user, snapshots)
            })
            .collect())
    }
}

struct DecodedPosition {
    user: Address,
    pool: Address,
    user_lp: Decimal,
    total_supply: Decimal,
    reserves: Vec<(Token, Decimal)>,
}

fn decode_position(value: Value) -> Result<DecodedPosition, RecordError> {
    let position: GraphLiquidityPosition = decode_record(value)?;
    let pair = &position.pair;
    Ok(DecodedPosition {
        user: schema::identity_address(&position.user.id, "user.id")?,
        pool: schema::identity_address(&pair.id, "pair.id")?,
        user_lp: schema::amount(&position.liquidity_token_balance, "liquidityTokenBalance")?,
        total_supply: schema::amount(&pair.total_supply, "totalSupply")?,
        reserves: vec![
            (
                wire_token(&pair.token0, RecordError::Corrupt)?,
                schema::amount(&pair.reserve0, "reserve0")?,
            ),
            (
                wire_token(&pair.token1, RecordError::Corrupt)?,
                schema::amount(&pair.reserve1, "reserve1")?,
            ),
        ],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::{MockExecutor, RemoteError, StaticPriceSource};
    use crate::db::init_db;
    use crate::domain::PnlBasis;
    use crate::orchestration::SyncEngine;
    use serde_json::json;
    use tempfile::TempDir;

    const USER: &str = "0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed";
    const PAIR: &str = "0x397ff1542f962076d0bfe58ea045ffa2d347aca0";
    const ROUTER: &str = "0x7a250d5630b4cf539739df2c5dacb4c659f2488d";
    const USDC: &str = "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48";
    const WETH: &str = "0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2";

    fn d(s: &str) -> Decimal {
        Decimal::from_str_canonical(s).unwrap()
    }

    fn token(id: &str) -> Value {
        json!({"id": id, "symbol": "TKN", "name": "Token", "decimals": "18"})
    }

    fn liquidity_event(id: &str, to: &str, sender: &str, ts: i64, lp: &str, usd: &str) -> Value {
        json!({
            "id": id,
            "logIndex": "3",
            "to": to,
            "sender": sender,
            "timestamp": ts.to_string(),
            "pair": {"id": PAIR, "token0": token(USDC), "token1": token(WETH)},
            "amount0": "1000",
            "amount1": "0.5",
            "liquidity": lp,
            "amountUSD": usd
        })
    }

    fn mint(ts: i64, lp: &str, usd: &str) -> Value {
        liquidity_event(&format!("0x{:02x}-0", ts), USER, ROUTER, ts, lp, usd)
    }

    fn burn(ts: i64, lp: &str, usd: &str) -> Value {
        liquidity_event(&format!("0x{:02x}-1", ts), PAIR, USER, ts, lp, usd)
    }

    fn position(lp: &str) -> Value {
        json!({
            "user": {"id": USER},
            "liquidityTokenBalance": lp,
            "pair": {
                "id": PAIR,
                "reserve0": "1000",
                "reserve1": "2",
                "totalSupply": "100",
                "token0": token(USDC),
                "token1": token(WETH)
            }
        })
    }

    fn user() -> Address {
        Address::parse(USER).unwrap()
    }

    async fn setup(mock: Arc<MockExecutor>) -> (SyncEngine<AmmEventsProtocol>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("test.db").to_string_lossy().to_string();
        let repo = Arc::new(Repository::new(init_db(&path).await.unwrap()));
        let prices = StaticPriceSource::new()
            .with_price(&Address::parse(USDC).unwrap(), d("1"))
            .with_price(&Address::parse(WETH).unwrap(), d("500"));
        let protocol =
            AmmEventsProtocol::new(mock, repo.clone(), Arc::new(prices)).with_page_size(10);
        (SyncEngine::new(protocol, repo), temp_dir)
    }

    #[test]
    fn test_decode_attributes_mint_to_recipient_and_burn_to_sender() {
        let minted = decode_lp_event(mint(100, "10", "2000"), LpEventType::Mint).unwrap();
        assert_eq!(minted.address, user());
        assert_eq!(minted.tx_hash, "0x64");
        assert_eq!(minted.lp_amount, Balance::priced(d("10"), d("2000")));

        let burned = decode_lp_event(burn(200, "4", "900"), LpEventType::Burn).unwrap();
        assert_eq!(burned.address, user());
        assert_eq!(burned.pool_address, Address::parse(PAIR).unwrap());
    }

    #[test]
    fn test_decode_error_classes() {
        let mut no_sender = burn(200, "4", "900");
        no_sender["sender"] = Value::Null;
        assert!(matches!(
            decode_lp_event(no_sender, LpEventType::Burn),
            Err(RecordError::Corrupt(_))
        ));

        let mut bad_amount = mint(100, "10", "2000");
        bad_amount["amount0"] = json!("lots");
        assert!(matches!(
            decode_lp_event(bad_amount, LpEventType::Mint),
            Err(RecordError::Skip(_))
        ));

        let mut unpriced = mint(100, "10", "2000");
        unpriced["amountUSD"] = json!("n/a");
        let event = decode_lp_event(unpriced, LpEventType::Mint).unwrap();
        assert_eq!(event.lp_amount.usd_value, None);
    }

    #[tokio::test]
    async fn test_history_reconciles_against_lp_balance() {
        let mock = Arc::new(
            MockExecutor::new()
                .with_records("mints", vec![mint(100, "10", "2000")])
                .with_records("burns", vec![burn(200, "4", "900")])
                .with_records("liquidityPositions", vec![position("6")]),
        );
        let (engine, _dir) = setup(mock.clone()).await;

        let result = engine
            .reconciled_history(&[user()], Timestamp::zero(), Timestamp::new(1_000), false)
            .await
            .unwrap();

        let events = &result.history.records[&user()];
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, LpEventType::Mint);
        assert_eq!(events[1].event_type, LpEventType::Burn);

        // 6 LP of 100 over 1000 USDC + 2 WETH is worth 60 + 60.
        let pnl = &result.profit_loss[&user()];
        assert_eq!(pnl.len(), 1);
        assert_eq!(pnl[0].pool_id, PAIR);
        assert_eq!(pnl[0].basis, PnlBasis::Current);
        assert_eq!(pnl[0].profit_loss, Balance::priced(d("0"), d("-980")));
        assert_eq!(mock.requests_for("liquidityPositions").len(), 1);
    }

    #[tokio::test]
    async fn test_windowed_history_is_historical_delta() {
        let mock = Arc::new(MockExecutor::new().with_records("mints", vec![mint(100, "10", "2000")]));
        let (engine, _dir) = setup(mock.clone()).await;

        let result = engine
            .reconciled_history(&[user()], Timestamp::new(50), Timestamp::new(1_000), false)
            .await
            .unwrap();

        let pnl = &result.profit_loss[&user()][0];
        assert_eq!(pnl.basis, PnlBasis::HistoricalDelta);
        assert_eq!(pnl.profit_loss, Balance::priced(d("-10"), d("-2000")));
        assert!(mock.requests_for("liquidityPositions").is_empty());
    }

    #[tokio::test]
    async fn test_balance_failure_degrades_to_historical_delta() {
        let mock = Arc::new(MockExecutor::new().with_records("mints", vec![mint(100, "10", "2000")]));
        mock.set_root_failure("liquidityPositions", Some(RemoteError::RateLimited));
        let (engine, _dir) = setup(mock).await;

        let result = engine
            .reconciled_history(&[user()], Timestamp::zero(), Timestamp::new(1_000), false)
            .await
            .unwrap();

        assert_eq!(result.profit_loss[&user()][0].basis, PnlBasis::HistoricalDelta);
        assert_eq!(result.history.records[&user()].len(), 1);
    }

    #[tokio::test]
    async fn test_burn_failure_keeps_mints_but_not_range() {
        let mock = Arc::new(MockExecutor::new().with_records("mints", vec![mint(100, "10", "2000")]));
        mock.set_root_failure("burns", Some(RemoteError::Timeout(10)));
        let (engine, _dir) = setup(mock).await;

        let result = engine.sync(&[user()], Timestamp::new(1_000)).await;
        assert!(matches!(result, Err(SyncError::Remote(RemoteError::Timeout(10)))));

        let stored = engine
            .cached(&[user()], Timestamp::zero(), Timestamp::new(1_000))
            .await
            .unwrap();
        assert_eq!(stored[&user()].len(), 1);
        assert_eq!(engine.ranges().get_range(&user()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_lp_balances_prices_user_share() {
        let mock = Arc::new(
            MockExecutor::new().with_records("liquidityPositions", vec![position("10")]),
        );
        let (engine, _dir) = setup(mock).await;

        let balances = engine.source().lp_balances(&[user()]).await.unwrap();
        let pool = &balances[&user()][0];
        assert_eq!(pool.address, Address::parse(PAIR).unwrap());
        assert_eq!(pool.assets[0].user_balance, Balance::priced(d("100"), d("100")));
        assert_eq!(pool.assets[1].user_balance.amount, d("0.2"));
        assert_eq!(pool.user_balance, Balance::priced(d("10"), d("200")));
    }
}
