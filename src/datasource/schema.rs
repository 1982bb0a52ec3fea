//! Typed wire records returned by the indexers.
//!
//! Records are decoded strictly at the fetch boundary. Numeric fields the
//! indexer encodes as BigInt strings accept either strings or JSON numbers;
//! BigDecimal amounts stay strings until the conversion step parses them.

use super::RecordError;
use crate::domain::{Address, Decimal};
use serde::{Deserialize, Deserializer};

#[derive(Deserialize)]
#[serde(untagged)]
enum IntOrString {
    Int(i64),
    Str(String),
}

fn de_i64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    match IntOrString::deserialize(deserializer)? {
        IntOrString::Int(v) => Ok(v),
        IntOrString::Str(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

fn de_u8<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u8, D::Error> {
    let value = de_i64(deserializer)?;
    u8::try_from(value).map_err(serde::de::Error::custom)
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GraphId {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GraphToken {
    pub id: String,
    pub symbol: String,
    pub name: String,
    #[serde(deserialize_with = "de_u8")]
    pub decimals: u8,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GraphPair {
    pub id: String,
    pub token0: GraphToken,
    pub token1: GraphToken,
}

/// One leg inside a swap entry's transaction.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphSwap {
    /// `{tx_hash}-{n}`.
    pub id: String,
    #[serde(deserialize_with = "de_i64")]
    pub log_index: i64,
    pub sender: String,
    pub to: String,
    #[serde(deserialize_with = "de_i64")]
    pub timestamp: i64,
    pub amount0_in: String,
    pub amount1_in: String,
    pub amount0_out: String,
    pub amount1_out: String,
    pub pair: GraphPair,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GraphTransaction {
    /// Decoded leg by leg so one malformed leg does not drop the transaction.
    pub swaps: Vec<serde_json::Value>,
}

/// A swap matched by the address filter, carrying every leg of its transaction.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GraphSwapEntry {
    pub to: String,
    #[serde(deserialize_with = "de_i64")]
    pub timestamp: i64,
    pub transaction: GraphTransaction,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphLpPair {
    pub id: String,
    pub reserve0: String,
    pub reserve1: String,
    pub total_supply: String,
    pub token0: GraphToken,
    pub token1: GraphToken,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphLiquidityPosition {
    pub user: GraphId,
    pub liquidity_token_balance: String,
    pub pair: GraphLpPair,
}

/// A mint or burn of a pair's LP token.
///
/// Mints are attributed to `to`, burns to `sender`; the other side may be a
/// router or null.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphLiquidityEvent {
    /// `{tx_hash}-{n}`.
    pub id: String,
    #[serde(deserialize_with = "de_i64")]
    pub log_index: i64,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub sender: Option<String>,
    #[serde(deserialize_with = "de_i64")]
    pub timestamp: i64,
    pub pair: GraphPair,
    pub amount0: String,
    pub amount1: String,
    pub liquidity: String,
    #[serde(default, rename = "amountUSD")]
    pub amount_usd: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GraphTokenDayData {
    pub token: GraphId,
    #[serde(deserialize_with = "de_i64")]
    pub date: i64,
    #[serde(rename = "priceUSD")]
    pub price_usd: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphBond {
    pub id: String,
    pub bond_id: String,
    pub owner: String,
    pub identity: String,
    pub amount: String,
    pub pool_id: String,
    #[serde(deserialize_with = "de_i64")]
    pub nonce: i64,
    #[serde(deserialize_with = "de_i64")]
    pub slashed_at_start: i64,
    #[serde(deserialize_with = "de_i64")]
    pub timestamp: i64,
}

/// The bond an unbond or unbond request refers to.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphBondRef {
    pub id: String,
    pub amount: String,
    pub pool_id: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GraphUnbond {
    pub id: String,
    pub owner: String,
    pub identity: String,
    #[serde(deserialize_with = "de_i64")]
    pub timestamp: i64,
    pub bond: GraphBondRef,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphUnbondRequest {
    pub id: String,
    pub owner: String,
    pub identity: String,
    #[serde(deserialize_with = "de_i64")]
    pub timestamp: i64,
    #[serde(deserialize_with = "de_i64")]
    pub will_unlock: i64,
    pub bond: GraphBondRef,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphChannelWithdraw {
    pub id: String,
    pub owner: String,
    pub identity: String,
    #[serde(deserialize_with = "de_i64")]
    pub timestamp: i64,
    pub channel_id: String,
    pub amount: String,
    pub pool_id: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphStake {
    pub owner: String,
    pub pool_id: String,
    pub bonded: String,
    pub unclaimed_reward: String,
    /// Reward accrued in the pool's second reward token, in its base units.
    #[serde(default)]
    pub unclaimed_reward_secondary: Option<String>,
    #[serde(default)]
    pub pool_total_staked: Option<String>,
}

/// Transaction hash part of an entity id such as `0xabc-3`.
pub fn tx_hash_from_id(id: &str) -> String {
    id.split('-').next().unwrap_or(id).to_ascii_lowercase()
}

/// Parse an address that only describes a record; failure drops the record.
pub fn descriptive_address(raw: &str, field: &str) -> Result<Address, RecordError> {
    Address::parse(raw).map_err(|e| RecordError::Skip(format!("{}: {}", field, e)))
}

/// Parse an address that identifies a persisted record; failure is corrupt data.
pub fn identity_address(raw: &str, field: &str) -> Result<Address, RecordError> {
    Address::parse(raw).map_err(|e| RecordError::Corrupt(format!("{}: {}", field, e)))
}

pub fn amount(raw: &str, field: &str) -> Result<Decimal, RecordError> {
    Decimal::from_str_canonical(raw)
        .map_err(|e| RecordError::Skip(format!("{} {:?}: {}", field, raw, e)))
}

/// Integer base-unit amount (e.g. wei) scaled by the token's decimals.
pub fn base_units(raw: &str, decimals: u8, field: &str) -> Result<Decimal, RecordError> {
    Decimal::from_base_units(raw, decimals)
        .ok_or_else(|| RecordError::Skip(format!("{} {:?}: not an integer amount", field, raw)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::decode_record;
    use serde_json::json;

    fn token(id: &str) -> serde_json::Value {
        json!({"id": id, "symbol": "TKN", "name": "Token", "decimals": "18"})
    }

    #[test]
    fn test_swap_leg_decodes_bigint_strings() {
        let leg: GraphSwap = decode_record(json!({
            "id": "0xabc-0",
            "logIndex": "7",
            "sender": "0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed",
            "to": "0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed",
            "timestamp": 1600000000,
            "amount0In": "0",
            "amount1In": "1.5",
            "amount0Out": "3",
            "amount1Out": "0",
            "pair": {
                "id": "0x397ff1542f962076d0bfe58ea045ffa2d347aca0",
                "token0": token("0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48"),
                "token1": token("0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2"),
            }
        }))
        .unwrap();
        assert_eq!(leg.log_index, 7);
        assert_eq!(leg.timestamp, 1_600_000_000);
        assert_eq!(leg.pair.token0.decimals, 18);
    }

    #[test]
    fn test_missing_field_is_skip() {
        let result: Result<GraphStake, _> = decode_record(json!({"owner": "0x1"}));
        assert!(matches!(result, Err(RecordError::Skip(_))));
    }

    #[test]
    fn test_decimals_out_of_range_is_skip() {
        let result: Result<GraphToken, _> = decode_record(json!({
            "id": "0x1", "symbol": "X", "name": "X", "decimals": "300"
        }));
        assert!(matches!(result, Err(RecordError::Skip(_))));
    }

    #[test]
    fn test_base_units() {
        assert_eq!(
            base_units("2500000", 6, "amount").unwrap(),
            Decimal::from_str_canonical("2.5").unwrap()
        );
        assert!(matches!(base_units("2.5", 6, "amount"), Err(RecordError::Skip(_))));
    }

    #[test]
    fn test_tx_hash_from_id() {
        assert_eq!(tx_hash_from_id("0xABC-12"), "0xabc");
        assert_eq!(tx_hash_from_id("0xabc"), "0xabc");
    }

    #[test]
    fn test_address_error_classes() {
        assert!(matches!(
            descriptive_address("nope", "sender"),
            Err(RecordError::Skip(_))
        ));
        assert!(matches!(
            identity_address("nope", "owner"),
            Err(RecordError::Corrupt(_))
        ));
    }
}
