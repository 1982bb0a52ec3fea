//! USD price lookup for tokens.

use super::pagination::{PageQuery, PaginatedFetcher};
use super::queries::TOKEN_DAY_DATAS_QUERY;
use super::schema::{self, GraphTokenDayData};
use super::{decode_record, QueryExecutor, RecordError, RemoteError};
use crate::domain::{Address, Decimal, Timestamp, Token};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

const SECONDS_PER_DAY: i64 = 86_400;

/// Spot or historical USD prices.
#[async_trait]
pub trait PriceSource: Send + Sync + fmt::Debug {
    /// Price of one whole `token` at `at` (today when `None`).
    ///
    /// `Ok(None)` means the token has no known price.
    async fn price_of(
        &self,
        token: &Token,
        at: Option<Timestamp>,
    ) -> Result<Option<Decimal>, RemoteError>;
}

/// Fixed prices, independent of time.
#[derive(Debug, Clone, Default)]
pub struct StaticPriceSource {
    prices: HashMap<Address, Decimal>,
}

impl StaticPriceSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_price(mut self, token: &Address, price: Decimal) -> Self {
        self.prices.insert(token.clone(), price);
        self
    }
}

#[async_trait]
impl PriceSource for StaticPriceSource {
    async fn price_of(
        &self,
        token: &Token,
        _at: Option<Timestamp>,
    ) -> Result<Option<Decimal>, RemoteError> {
        Ok(self.prices.get(&token.address).copied())
    }
}

/// Daily USD close prices from the AMM indexer's token day data.
///
/// The price at a moment is the newest daily close at or before that day.
/// Lookups are cached per `(token, day)` once the answer can no longer change.
#[derive(Debug)]
pub struct IndexerPriceSource {
    executor: Arc<dyn QueryExecutor>,
    cache: Mutex<HashMap<(Address, i64), Option<Decimal>>>,
}

impl IndexerPriceSource {
    pub fn new(executor: Arc<dyn QueryExecutor>) -> Self {
        Self {
            executor,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Start of the UTC day containing `ts`.
    pub fn day_start(ts: Timestamp) -> i64 {
        ts.as_i64().div_euclid(SECONDS_PER_DAY) * SECONDS_PER_DAY
    }

    /// Newest close of `token` recorded on or before `day`, with its date.
    pub async fn latest_close(
        &self,
        token: &Address,
        day: i64,
    ) -> Result<Option<(i64, Decimal)>, RemoteError> {
        let query = PageQuery::new(TOKEN_DAY_DATAS_QUERY, "tokenDayDatas")
            .filter("token_id", "String!", Value::String(token.to_lowercase()))
            .filter("date", "Int!", Value::from(day));

        let closes = PaginatedFetcher::with_page_size(self.executor.as_ref(), 1)
            .fetch_first_page(&query, decode_day_data)
            .await?;
        Ok(closes.into_iter().next())
    }
}

fn decode_day_data(value: Value) -> Result<(i64, Decimal), RecordError> {
    let record: GraphTokenDayData = decode_record(value)?;
    let price = schema::amount(&record.price_usd, "priceUSD")?;
    Ok((record.date, price))
}

#[async_trait]
impl PriceSource for IndexerPriceSource {
    async fn price_of(
        &self,
        token: &Token,
        at: Option<Timestamp>,
    ) -> Result<Option<Decimal>, RemoteError> {
        let day = Self::day_start(at.unwrap_or_else(Timestamp::now));
        let key = (token.address.clone(), day);
        if let Some(cached) = self.cache.lock().await.get(&key) {
            return Ok(*cached);
        }

        let close = self.latest_close(&token.address, day).await?;
        let price = close.map(|(_, price)| price);
        debug!(token = %token.symbol, day, ?close, "Resolved indexer price");

        // Today's close may still be written; a fallback to an older day is
        // only final for past days.
        let settled = matches!(close, Some((date, _)) if date == day)
            || day < Self::day_start(Timestamp::now());
        if settled {
            self.cache.lock().await.insert(key, price);
        }
        Ok(price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::MockExecutor;
    use serde_json::json;

    const WETH: &str = "0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2";

    fn weth() -> Token {
        Token::new(Address::parse(WETH).unwrap(), "WETH", "Wrapped Ether", 18)
    }

    #[test]
    fn test_day_start() {
        assert_eq!(IndexerPriceSource::day_start(Timestamp::new(86_400 + 5)), 86_400);
        assert_eq!(IndexerPriceSource::day_start(Timestamp::new(86_399)), 0);
    }

    #[tokio::test]
    async fn test_indexer_price_is_cached() {
        let mock = Arc::new(MockExecutor::new().with_records(
            "tokenDayDatas",
            vec![json!({"token": {"id": WETH}, "date": 86_400, "priceUSD": "2500.5"})],
        ));
        let source = IndexerPriceSource::new(mock.clone());

        let price = source
            .price_of(&weth(), Some(Timestamp::new(90_000)))
            .await
            .unwrap();
        assert_eq!(price, Some(Decimal::from_str_canonical("2500.5").unwrap()));

        source
            .price_of(&weth(), Some(Timestamp::new(100_000)))
            .await
            .unwrap();
        assert_eq!(mock.request_count(), 1);
    }

    #[tokio::test]
    async fn test_indexer_price_falls_back_to_latest_earlier_close() {
        let mock = Arc::new(MockExecutor::new().with_records(
            "tokenDayDatas",
            vec![
                json!({"token": {"id": WETH}, "date": 0, "priceUSD": "1"}),
                json!({"token": {"id": WETH}, "date": 86_400, "priceUSD": "2500"}),
                json!({"token": {"id": WETH}, "date": 86_400 * 5, "priceUSD": "9"}),
            ],
        ));
        let source = IndexerPriceSource::new(mock.clone());

        let price = source
            .price_of(&weth(), Some(Timestamp::new(86_400 * 2 + 60)))
            .await
            .unwrap();
        assert_eq!(price, Some(Decimal::from(2500)));

        let request = &mock.requests_for("tokenDayDatas")[0];
        assert_eq!(request.values.get("date"), Some(&json!(86_400 * 2)));
        assert_eq!(request.values.get("token_id"), Some(&json!(WETH)));
        assert_eq!(request.limit, 1);
    }

    #[tokio::test]
    async fn test_indexer_price_before_first_close_is_unknown() {
        let mock = Arc::new(MockExecutor::new().with_records(
            "tokenDayDatas",
            vec![json!({"token": {"id": WETH}, "date": 86_400 * 3, "priceUSD": "1"})],
        ));
        let source = IndexerPriceSource::new(mock);
        let price = source
            .price_of(&weth(), Some(Timestamp::new(86_400)))
            .await
            .unwrap();
        assert_eq!(price, None);
    }

    #[tokio::test]
    async fn test_todays_fallback_price_is_not_cached() {
        let mock = Arc::new(MockExecutor::new().with_records(
            "tokenDayDatas",
            vec![json!({"token": {"id": WETH}, "date": 0, "priceUSD": "3"})],
        ));
        let source = IndexerPriceSource::new(mock.clone());

        assert_eq!(
            source.price_of(&weth(), None).await.unwrap(),
            Some(Decimal::from(3))
        );
        source.price_of(&weth(), None).await.unwrap();
        assert_eq!(mock.request_count(), 2);
    }

    #[tokio::test]
    async fn test_indexer_price_error_is_strict() {
        let mock = Arc::new(MockExecutor::new().fail_on_request(0, RemoteError::RateLimited));
        let source = IndexerPriceSource::new(mock);
        let result = source.price_of(&weth(), None).await;
        assert_eq!(result, Err(RemoteError::RateLimited));
    }

    #[tokio::test]
    async fn test_static_price_source() {
        let source = StaticPriceSource::new()
            .with_price(&weth().address, Decimal::from(3000));
        assert_eq!(
            source.price_of(&weth(), None).await.unwrap(),
            Some(Decimal::from(3000))
        );
    }
}
