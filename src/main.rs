use lpledger::datasource::{IndexerPriceSource, PriceSource, QueryExecutor};
use lpledger::orchestration::{AmmProtocol, StakingProtocol};
use lpledger::{
    api, config::Config, db::init_db, Address, AmmService, GraphClient, Repository,
    StakingService, Token,
};
use std::net::SocketAddr;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .init();

    // Load configuration
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    let staking_token_address = match Address::parse(&config.staking_token.address) {
        Ok(a) => a,
        Err(e) => {
            eprintln!("Configuration error: STAKING_TOKEN_ADDRESS: {}", e);
            std::process::exit(1);
        }
    };

    let staking_reward_token = match &config.staking_reward_token {
        Some(reward) => match Address::parse(&reward.address) {
            Ok(address) => Some(Token::new(address, &reward.symbol, &reward.symbol, reward.decimals)),
            Err(e) => {
                eprintln!("Configuration error: STAKING_REWARD_TOKEN_ADDRESS: {}", e);
                std::process::exit(1);
            }
        },
        None => None,
    };

    let port = config.port;

    // Initialize database and dependencies
    let pool = match init_db(&config.database_path).await {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Failed to initialize database: {}", e);
            std::process::exit(1);
        }
    };

    let repo = Arc::new(Repository::new(pool));
    let amm_indexer: Arc<dyn QueryExecutor> = Arc::new(GraphClient::new(
        config.amm_subgraph_url.clone(),
        config.request_timeout,
        config.retry_max_elapsed,
    ));
    let staking_indexer: Arc<dyn QueryExecutor> = Arc::new(GraphClient::new(
        config.staking_subgraph_url.clone(),
        config.request_timeout,
        config.retry_max_elapsed,
    ));
    let prices: Arc<dyn PriceSource> = Arc::new(IndexerPriceSource::new(amm_indexer.clone()));

    let staking_token = Token::new(
        staking_token_address,
        &config.staking_token.symbol,
        &config.staking_token.symbol,
        config.staking_token.decimals,
    );

    let amm = Arc::new(AmmService::new(
        AmmProtocol::new(amm_indexer, repo.clone()),
        prices.clone(),
    ));
    let mut staking_protocol =
        StakingProtocol::new(staking_indexer, repo.clone(), prices, staking_token);
    if let Some(reward_token) = staking_reward_token {
        staking_protocol = staking_protocol.with_reward_token(reward_token);
    }
    let staking = Arc::new(StakingService::new(staking_protocol));

    // Create router
    let app = api::create_router(api::AppState::new(repo, amm, staking));

    // Bind to address
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            eprintln!("Failed to bind to {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    tracing::info!("Server listening on {}", addr);

    // Run server
    if let Err(e) = axum::serve(listener, app).await {
        eprintln!("Server error: {}", e);
        std::process::exit(1);
    }
}
