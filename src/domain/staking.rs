//! Staking platform events.

use crate::domain::{
    Address, Balance, FlowDirection, HistoryRecord, PoolFlow, Timestamp,
};
use serde::{Deserialize, Serialize};

pub const TOM_POOL_ID: &str = "0x2ce0c96383fb229d9776f33846e983a956a7d95844fac57b180ed0071d93bb28";

/// Display name of a known staking pool.
pub fn pool_name(pool_id: &str) -> Option<&'static str> {
    if pool_id.eq_ignore_ascii_case(TOM_POOL_ID) {
        Some("Tom")
    } else {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum StakingEventType {
    Bond,
    Unbond,
    UnbondRequest,
    ChannelWithdraw,
}

impl StakingEventType {
    pub const ALL: [StakingEventType; 4] = [
        StakingEventType::Bond,
        StakingEventType::Unbond,
        StakingEventType::UnbondRequest,
        StakingEventType::ChannelWithdraw,
    ];

    /// User-facing label, also the persisted discriminator.
    pub fn label(&self) -> &'static str {
        match self {
            StakingEventType::Bond => "deposit",
            StakingEventType::Unbond => "withdraw",
            StakingEventType::UnbondRequest => "withdraw request",
            StakingEventType::ChannelWithdraw => "claim",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.label() == label)
    }
}

impl std::fmt::Display for StakingEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Fields every staking event carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventCore {
    pub tx_hash: String,
    /// Staker.
    pub address: Address,
    /// On-chain proxy that actually holds the stake.
    pub identity_address: Address,
    pub timestamp: Timestamp,
    pub pool_id: String,
    pub value: Balance,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum StakingEvent {
    Bond {
        #[serde(flatten)]
        core: EventCore,
        bond_id: String,
        nonce: i64,
        slashed_at: Timestamp,
    },
    Unbond {
        #[serde(flatten)]
        core: EventCore,
        bond_id: String,
    },
    UnbondRequest {
        #[serde(flatten)]
        core: EventCore,
        bond_id: String,
        unlock_at: Timestamp,
    },
    ChannelWithdraw {
        #[serde(flatten)]
        core: EventCore,
        channel_id: String,
    },
}

impl StakingEvent {
    pub fn core(&self) -> &EventCore {
        match self {
            StakingEvent::Bond { core, .. }
            | StakingEvent::Unbond { core, .. }
            | StakingEvent::UnbondRequest { core, .. }
            | StakingEvent::ChannelWithdraw { core, .. } => core,
        }
    }

    pub fn event_type(&self) -> StakingEventType {
        match self {
            StakingEvent::Bond { .. } => StakingEventType::Bond,
            StakingEvent::Unbond { .. } => StakingEventType::Unbond,
            StakingEvent::UnbondRequest { .. } => StakingEventType::UnbondRequest,
            StakingEvent::ChannelWithdraw { .. } => StakingEventType::ChannelWithdraw,
        }
    }

    /// Bond id for bond-lifecycle events, channel id for claims.
    pub fn secondary_key(&self) -> &str {
        match self {
            StakingEvent::Bond { bond_id, .. }
            | StakingEvent::Unbond { bond_id, .. }
            | StakingEvent::UnbondRequest { bond_id, .. } => bond_id,
            StakingEvent::ChannelWithdraw { channel_id, .. } => channel_id,
        }
    }

    /// Display ordering: timestamp, then secondary key, then event type.
    pub fn ordering_key(&self) -> (Timestamp, String, StakingEventType) {
        (
            self.core().timestamp,
            self.secondary_key().to_ascii_lowercase(),
            self.event_type(),
        )
    }
}

impl HistoryRecord for StakingEvent {
    fn owner(&self) -> &Address {
        &self.core().address
    }

    fn timestamp(&self) -> Timestamp {
        self.core().timestamp
    }

    fn natural_key(&self) -> String {
        format!(
            "{}:{}:{}",
            self.core().tx_hash.to_ascii_lowercase(),
            self.event_type().label(),
            self.secondary_key().to_ascii_lowercase()
        )
    }
}

impl PoolFlow for StakingEvent {
    fn pool_id(&self) -> &str {
        &self.core().pool_id
    }

    fn flow(&self) -> FlowDirection {
        match self.event_type() {
            StakingEventType::Bond => FlowDirection::Deposit,
            StakingEventType::Unbond | StakingEventType::ChannelWithdraw => {
                FlowDirection::Withdraw
            }
            StakingEventType::UnbondRequest => FlowDirection::Neutral,
        }
    }

    fn value(&self) -> Balance {
        self.core().value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Decimal;

    fn core(ts: i64) -> EventCore {
        let addr = Address::parse("0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed").unwrap();
        EventCore {
            tx_hash: "0xABC".to_string(),
            address: addr.clone(),
            identity_address: addr,
            timestamp: Timestamp::new(ts),
            pool_id: TOM_POOL_ID.to_string(),
            value: Balance::priced(Decimal::from(100), Decimal::from(100)),
        }
    }

    #[test]
    fn test_labels_round_trip() {
        for t in StakingEventType::ALL {
            assert_eq!(StakingEventType::from_label(t.label()), Some(t));
        }
        assert_eq!(StakingEventType::from_label("stake"), None);
        assert_eq!(StakingEventType::ChannelWithdraw.to_string(), "claim");
    }

    #[test]
    fn test_flow_classification() {
        let bond = StakingEvent::Bond {
            core: core(1),
            bond_id: "0x1".into(),
            nonce: 0,
            slashed_at: Timestamp::zero(),
        };
        let request = StakingEvent::UnbondRequest {
            core: core(2),
            bond_id: "0x1".into(),
            unlock_at: Timestamp::new(100),
        };
        let claim = StakingEvent::ChannelWithdraw {
            core: core(3),
            channel_id: "0xc".into(),
        };
        assert_eq!(bond.flow(), FlowDirection::Deposit);
        assert_eq!(request.flow(), FlowDirection::Neutral);
        assert_eq!(claim.flow(), FlowDirection::Withdraw);
    }

    #[test]
    fn test_natural_key_is_case_insensitive() {
        let a = StakingEvent::Unbond {
            core: core(1),
            bond_id: "0xB0".into(),
        };
        let mut lower = core(1);
        lower.tx_hash = "0xabc".into();
        let b = StakingEvent::Unbond {
            core: lower,
            bond_id: "0xb0".into(),
        };
        assert_eq!(a.natural_key(), b.natural_key());
    }

    #[test]
    fn test_pool_name() {
        assert_eq!(pool_name(&TOM_POOL_ID.to_ascii_uppercase()), Some("Tom"));
        assert_eq!(pool_name(TOM_POOL_ID), Some("Tom"));
        assert_eq!(pool_name("0xdead"), None);
    }
}
