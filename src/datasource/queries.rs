//! Query templates. Each starts with the root field the page is read from.

pub const SWAPS_QUERY: &str = r#"
swaps(
    first: $limit,
    skip: $offset,
    orderBy: timestamp,
    orderDirection: asc,
    where: { to_in: $addresses, timestamp_gte: $start_ts, timestamp_lte: $end_ts }
) {
    to
    timestamp
    transaction {
        swaps(orderBy: logIndex, orderDirection: asc) {
            id
            logIndex
            sender
            to
            timestamp
            amount0In
            amount1In
            amount0Out
            amount1Out
            pair {
                id
                token0 { id symbol name decimals }
                token1 { id symbol name decimals }
            }
        }
    }
}"#;

pub const LIQUIDITY_POSITIONS_QUERY: &str = r#"
liquidityPositions(
    first: $limit,
    skip: $offset,
    where: { user_in: $addresses, liquidityTokenBalance_gt: $balance }
) {
    user { id }
    liquidityTokenBalance
    pair {
        id
        reserve0
        reserve1
        totalSupply
        token0 { id symbol name decimals }
        token1 { id symbol name decimals }
    }
}"#;

pub const MINTS_QUERY: &str = r#"
mints(
    first: $limit,
    skip: $offset,
    orderBy: timestamp,
    orderDirection: asc,
    where: { to_in: $addresses, timestamp_gte: $start_ts, timestamp_lte: $end_ts }
) {
    id
    logIndex
    to
    sender
    timestamp
    pair {
        id
        token0 { id symbol name decimals }
        token1 { id symbol name decimals }
    }
    amount0
    amount1
    liquidity
    amountUSD
}"#;

pub const BURNS_QUERY: &str = r#"
burns(
    first: $limit,
    skip: $offset,
    orderBy: timestamp,
    orderDirection: asc,
    where: { sender_in: $addresses, timestamp_gte: $start_ts, timestamp_lte: $end_ts }
) {
    id
    logIndex
    to
    sender
    timestamp
    pair {
        id
        token0 { id symbol name decimals }
        token1 { id symbol name decimals }
    }
    amount0
    amount1
    liquidity
    amountUSD
}"#;

pub const TOKEN_DAY_DATAS_QUERY: &str = r#"
tokenDayDatas(
    first: $limit,
    skip: $offset,
    orderBy: date,
    orderDirection: desc,
    where: { token: $token_id, date_lte: $date }
) {
    token { id }
    date
    priceUSD
}"#;

pub const BONDS_QUERY: &str = r#"
bonds(
    first: $limit,
    skip: $offset,
    where: { owner_in: $addresses, timestamp_gte: $start_ts, timestamp_lte: $end_ts }
) {
    id
    bondId
    owner
    identity
    amount
    poolId
    nonce
    slashedAtStart
    timestamp
}"#;

pub const UNBONDS_QUERY: &str = r#"
unbonds(
    first: $limit,
    skip: $offset,
    where: { owner_in: $addresses, timestamp_gte: $start_ts, timestamp_lte: $end_ts }
) {
    id
    owner
    identity
    timestamp
    bond { id amount poolId }
}"#;

pub const UNBOND_REQUESTS_QUERY: &str = r#"
unbondRequests(
    first: $limit,
    skip: $offset,
    where: { owner_in: $addresses, timestamp_gte: $start_ts, timestamp_lte: $end_ts }
) {
    id
    owner
    identity
    timestamp
    willUnlock
    bond { id amount poolId }
}"#;

pub const CHANNEL_WITHDRAWS_QUERY: &str = r#"
channelWithdraws(
    first: $limit,
    skip: $offset,
    where: { owner_in: $addresses, timestamp_gte: $start_ts, timestamp_lte: $end_ts }
) {
    id
    owner
    identity
    timestamp
    channelId
    amount
    poolId
}"#;

pub const STAKES_QUERY: &str = r#"
stakes(
    first: $limit,
    skip: $offset,
    where: { owner_in: $addresses }
) {
    owner
    poolId
    bonded
    unclaimedReward
    unclaimedRewardSecondary
    poolTotalStaked
}"#;
