use axum::http::StatusCode;
use lpledger::api;
use lpledger::datasource::{MockExecutor, RemoteError, StaticPriceSource};
use lpledger::db::init_db;
use lpledger::domain::{Address, Decimal, Token, TOM_POOL_ID};
use lpledger::orchestration::{AmmProtocol, StakingProtocol};
use lpledger::{AmmService, Repository, StakingService};
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;
use tower::util::ServiceExt;

const USER: &str = "0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed";
const CHECKSUMMED: &str = "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed";
const PAIR: &str = "0x397ff1542f962076d0bfe58ea045ffa2d347aca0";
const STAKING_TOKEN: &str = "0xaa7a9ca87d3694b5755f213b5d04094b8d0f0a6f";

struct TestApp {
    app: axum::Router,
    amm_indexer: Arc<MockExecutor>,
    staking_indexer: Arc<MockExecutor>,
    _temp: TempDir,
}

async fn setup_test_app(amm_indexer: MockExecutor, staking_indexer: MockExecutor) -> TestApp {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir
        .path()
        .join("test.db")
        .to_string_lossy()
        .to_string();
    let pool = init_db(&db_path).await.expect("init_db failed");
    let repo = Arc::new(Repository::new(pool));

    let staking_token = Token::new(Address::parse(STAKING_TOKEN).unwrap(), "ADX", "AdEx", 18);
    let prices = Arc::new(
        StaticPriceSource::new().with_price(&staking_token.address, Decimal::from(2)),
    );
    let amm_indexer = Arc::new(amm_indexer);
    let staking_indexer = Arc::new(staking_indexer);

    let amm = Arc::new(AmmService::new(
        AmmProtocol::new(amm_indexer.clone(), repo.clone()),
        prices.clone(),
    ));
    let staking = Arc::new(StakingService::new(StakingProtocol::new(
        staking_indexer.clone(),
        repo.clone(),
        prices,
        staking_token,
    )));
    let app = api::create_router(api::AppState::new(repo, amm, staking));

    TestApp {
        app,
        amm_indexer,
        staking_indexer,
        _temp: temp_dir,
    }
}

async fn request(app: axum::Router, method: &str, uri: &str) -> (StatusCode, Value) {
    let req = axum::http::Request::builder()
        .method(method)
        .uri(uri)
        .body(axum::body::Body::empty())
        .unwrap();

    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

fn token(id: &str) -> Value {
    json!({"id": id, "symbol": "TKN", "name": "Token", "decimals": "18"})
}

fn swap_entry(tx: &str, ts: i64) -> Value {
    json!({
        "to": USER,
        "timestamp": ts.to_string(),
        "transaction": {"swaps": [{
            "id": format!("{}-0", tx),
            "logIndex": "3",
            "sender": USER,
            "to": USER,
            "timestamp": ts.to_string(),
            "amount0In": "5",
            "amount1In": "0",
            "amount0Out": "0",
            "amount1Out": "10",
            "pair": {
                "id": PAIR,
                "token0": token("0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48"),
                "token1": token("0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2")
            }
        }]}
    })
}

fn bond(tx: &str, ts: i64) -> Value {
    json!({
        "id": format!("{}-0", tx),
        "bondId": "0xb1",
        "owner": USER,
        "identity": "0xfb6916095ca1df60bb79ce92ce3ea74c37c5d359",
        "amount": "4000000000000000000",
        "poolId": TOM_POOL_ID,
        "nonce": "0",
        "slashedAtStart": "0",
        "timestamp": ts.to_string()
    })
}

#[tokio::test]
async fn test_health() {
    let t = setup_test_app(MockExecutor::new(), MockExecutor::new()).await;
    let (status, body) = request(t.app, "GET", "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_ready_when_database_answers() {
    let t = setup_test_app(MockExecutor::new(), MockExecutor::new()).await;
    let (status, body) = request(t.app, "GET", "/ready").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");
}

#[tokio::test]
async fn test_trades_endpoint_returns_grouped_trades() {
    let t = setup_test_app(
        MockExecutor::new().with_records("swaps", vec![swap_entry("0xaa", 100)]),
        MockExecutor::new(),
    )
    .await;

    let (status, body) = request(
        t.app,
        "GET",
        &format!("/v1/amm/trades?addresses={}&toTs=1000", USER),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let trade = &body["trades"][CHECKSUMMED][0];
    assert_eq!(trade["tradeId"], "0xaa-0");
    assert_eq!(trade["direction"], "sell");
    assert_eq!(trade["amountIn"], "5");
    assert_eq!(trade["amountOut"], "10");
    assert_eq!(trade["rate"], "2");
    assert_eq!(trade["swaps"][0]["logIndex"], 3);
    assert_eq!(body["failedAddresses"], json!([]));
}

#[tokio::test]
async fn test_only_cache_does_not_contact_indexer() {
    let t = setup_test_app(
        MockExecutor::new().with_records("swaps", vec![swap_entry("0xaa", 100)]),
        MockExecutor::new(),
    )
    .await;

    let (status, body) = request(
        t.app,
        "GET",
        &format!("/v1/amm/trades?addresses={}&toTs=1000&onlyCache=true", USER),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["trades"][CHECKSUMMED], json!([]));
    assert_eq!(t.amm_indexer.request_count(), 0);
}

#[tokio::test]
async fn test_invalid_window_and_address_are_bad_requests() {
    let t = setup_test_app(MockExecutor::new(), MockExecutor::new()).await;

    let (status, _) = request(
        t.app.clone(),
        "GET",
        &format!("/v1/amm/trades?addresses={}&fromTs=20&toTs=10", USER),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = request(
        t.app.clone(),
        "GET",
        &format!("/v1/staking/history?addresses={}&toTs=-1", USER),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("toTs"));

    let (status, body) = request(t.app, "GET", "/v1/staking/history?addresses=0xnope").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_indexer_failure_without_progress_is_bad_gateway() {
    let amm_indexer = MockExecutor::new();
    amm_indexer.set_root_failure("swaps", Some(RemoteError::RateLimited));
    let t = setup_test_app(amm_indexer, MockExecutor::new()).await;

    let (status, _) = request(
        t.app,
        "GET",
        &format!("/v1/amm/trades?addresses={}&toTs=1000", USER),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn test_staking_history_endpoint() {
    let t = setup_test_app(
        MockExecutor::new(),
        MockExecutor::new()
            .with_records("bonds", vec![bond("0x01", 100)])
            .with_records(
                "stakes",
                vec![json!({
                    "owner": USER,
                    "poolId": TOM_POOL_ID,
                    "bonded": "4000000000000000000",
                    "unclaimedReward": "1000000000000000000"
                })],
            ),
    )
    .await;

    let (status, body) = request(
        t.app,
        "GET",
        &format!("/v1/staking/history?addresses={}&toTs=1000", USER),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let history = &body["history"][CHECKSUMMED];
    let event = &history["events"][0];
    assert_eq!(event["eventType"], "deposit");
    assert_eq!(event["bondId"], "0xb1");
    assert_eq!(event["value"], json!({"amount": "4", "usdValue": "8"}));

    let pool = &history["pools"][0];
    assert_eq!(pool["poolName"], "Tom");
    assert_eq!(pool["basis"], "current");
    assert_eq!(pool["profitLoss"], json!({"amount": "1", "usdValue": "2"}));
    assert_eq!(t.staking_indexer.requests_for("stakes").len(), 1);
}

fn lp_event(tx: &str, to: &str, sender: &str, ts: i64, liquidity: &str, usd: &str) -> Value {
    json!({
        "id": format!("{}-0", tx),
        "logIndex": "1",
        "to": to,
        "sender": sender,
        "timestamp": ts.to_string(),
        "pair": {
            "id": PAIR,
            "token0": token("0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48"),
            "token1": token("0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2")
        },
        "amount0": "100",
        "amount1": "1",
        "liquidity": liquidity,
        "amountUSD": usd
    })
}

#[tokio::test]
async fn test_amm_events_endpoint_reports_lp_profit_loss() {
    let t = setup_test_app(
        MockExecutor::new()
            .with_records("mints", vec![lp_event("0x01", USER, USER, 100, "10", "200")])
            .with_records("burns", vec![lp_event("0x02", PAIR, USER, 200, "4", "90")])
            .with_records("liquidityPositions", vec![]),
        MockExecutor::new(),
    )
    .await;

    let (status, body) = request(
        t.app,
        "GET",
        &format!("/v1/amm/events?addresses={}&toTs=1000", USER),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let history = &body["history"][CHECKSUMMED];
    assert_eq!(history["events"][0]["eventType"], "mint");
    assert_eq!(history["events"][1]["eventType"], "burn");
    assert_eq!(
        history["events"][0]["lpAmount"],
        json!({"amount": "10", "usdValue": "200"})
    );

    // The position is gone: the whole remaining LP is counted at zero.
    let pool = &history["pools"][0];
    assert_eq!(pool["poolId"], PAIR);
    assert_eq!(pool["basis"], "current");
    assert_eq!(pool["profitLoss"], json!({"amount": "-6", "usdValue": "-110"}));
    assert_eq!(body["failedAddresses"], json!([]));
}

#[tokio::test]
async fn test_delete_history_forces_full_refetch() {
    let t = setup_test_app(
        MockExecutor::new().with_records("swaps", vec![swap_entry("0xaa", 100)]),
        MockExecutor::new(),
    )
    .await;
    let uri = format!("/v1/amm/trades?addresses={}&toTs=1000", USER);

    let (status, _) = request(t.app.clone(), "GET", &uri).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = request(t.app.clone(), "DELETE", "/v1/amm/history").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deleted"], 1);

    t.amm_indexer.clear_requests();
    let (status, _) = request(t.app.clone(), "GET", &uri).await;
    assert_eq!(status, StatusCode::OK);
    let requests = t.amm_indexer.requests_for("swaps");
    assert_eq!(requests[0].values.get("start_ts"), Some(&json!("0")));

    let (status, _) = request(t.app, "DELETE", "/v1/unknown/history").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
