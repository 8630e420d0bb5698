use crate::{
    economy::{CurrencyKind, ItemId},
    pending::IdempotencyKey,
};
use std::{error::Error, fmt};

/// How a purchase is paid for. Ad-rewarded purchases are legitimately
/// repeatable, so callers must pair them with per-instance idempotency keys.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PurchaseMethod {
    SoftCurrency,
    HardCurrency,
    RewardedAd,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SpendResponse {
    pub new_balance: u64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PurchaseResponse {
    pub owned: bool,
    pub currency_left: Option<u64>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct EquipResponse {
    /// The server-authoritative equipped set after the call.
    pub equipped_item_ids: Vec<ItemId>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ClaimResponse {
    /// Amount actually granted, which may differ from the optimistic guess
    /// when the server uses a different reward table.
    pub granted: u64,
}

/// Business rejections returned by the backend. `AlreadyClaimed` and
/// `AlreadyOwned` are idempotent successes at the coordinator, the rest
/// trigger a rollback.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RejectionReason {
    AlreadyClaimed,
    AlreadyOwned,
    InsufficientFunds,
    LevelNotReached,
    MaxCapacityReached,
    Other(String),
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectionReason::AlreadyClaimed => write!(f, "already claimed"),
            RejectionReason::AlreadyOwned => write!(f, "already owned"),
            RejectionReason::InsufficientFunds => write!(f, "insufficient funds"),
            RejectionReason::LevelNotReached => write!(f, "level not reached"),
            RejectionReason::MaxCapacityReached => write!(f, "max capacity reached"),
            RejectionReason::Other(msg) => write!(f, "{msg}"),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum GatewayError {
    /// Timeout or connectivity loss; safe to retry with a fresh key.
    Transport(String),
    Rejected(RejectionReason),
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatewayError::Transport(msg) => write!(f, "transport failure: {msg}"),
            GatewayError::Rejected(reason) => write!(f, "rejected: {reason}"),
        }
    }
}

impl Error for GatewayError {}

/// The only outward boundary the core depends on. The wire transport behind
/// these calls is not this crate's concern.
pub trait RemoteGateway {
    fn spend_currency(
        &self,
        kind: CurrencyKind,
        amount: u64,
        key: &IdempotencyKey,
    ) -> impl Future<Output = Result<SpendResponse, GatewayError>>;

    fn purchase_item(
        &self,
        item: &ItemId,
        method: PurchaseMethod,
        key: &IdempotencyKey,
    ) -> impl Future<Output = Result<PurchaseResponse, GatewayError>>;

    fn equip_item(
        &self,
        item: &ItemId,
    ) -> impl Future<Output = Result<EquipResponse, GatewayError>>;

    fn unequip_item(
        &self,
        item: &ItemId,
    ) -> impl Future<Output = Result<EquipResponse, GatewayError>>;

    fn claim_achievement_reward(
        &self,
        type_id: &str,
        level: u32,
    ) -> impl Future<Output = Result<ClaimResponse, GatewayError>>;
}
