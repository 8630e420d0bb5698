use crate::{
    economy::{
        CurrencyKind,
        EconomyCache,
        ItemId,
        LocalMutation,
        ServerTruth,
        Snapshot,
        ValidationError,
    },
    events::{ChangeEvent, ChangeNotifier, ChangePhase, ResourceChange},
    gateway::{GatewayError, PurchaseMethod, RejectionReason, RemoteGateway},
    mirror::PersistentMirror,
    pending::{BeginError, IdempotencyKey, PendingOperationLog, PendingOutcome},
};
use futures::future::join_all;
use std::{
    collections::BTreeSet,
    error::Error,
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};
use tracing::{debug, error, warn};

/// An optimistic operation and its arguments. The resource keys, the
/// serialization domain for the fail-fast concurrency check, are derived
/// from the kind, so two different UI surfaces triggering the same purchase
/// still collide on the same keys.
#[derive(Clone, Debug, PartialEq)]
pub enum OperationKind {
    Spend {
        kind: CurrencyKind,
        amount: u64,
    },
    Purchase {
        item: ItemId,
        method: PurchaseMethod,
        cost: Option<(CurrencyKind, u64)>,
    },
    Equip {
        item: ItemId,
    },
    Unequip {
        item: ItemId,
    },
    ClaimReward {
        type_id: String,
        level: u32,
        reward: Option<(CurrencyKind, u64)>,
    },
}

impl OperationKind {
    pub fn resource_key(&self) -> String {
        match self {
            OperationKind::Spend { kind, .. } => format!("currency:{kind}"),
            OperationKind::Purchase { item, .. }
            | OperationKind::Equip { item }
            | OperationKind::Unequip { item } => format!("item:{item}"),
            OperationKind::ClaimReward { type_id, .. } => {
                format!("achievement:{type_id}")
            }
        }
    }

    /// Every resource key the operation touches, primary first. A purchase
    /// or claim that moves currency also holds that currency's key, so a
    /// rollback can never overwrite a balance some overlapping operation
    /// confirmed in the meantime.
    pub fn resource_keys(&self) -> Vec<String> {
        let mut keys = vec![self.resource_key()];
        match self {
            OperationKind::Purchase {
                cost: Some((kind, _)),
                ..
            }
            | OperationKind::ClaimReward {
                reward: Some((kind, _)),
                ..
            } => keys.push(format!("currency:{kind}")),
            _ => {}
        }
        keys
    }

    fn action_name(&self) -> &'static str {
        match self {
            OperationKind::Spend { .. } => "spend",
            OperationKind::Purchase { .. } => "purchase",
            OperationKind::Equip { .. } => "equip",
            OperationKind::Unequip { .. } => "unequip",
            OperationKind::ClaimReward { .. } => "claim",
        }
    }

    fn local_mutation(&self) -> LocalMutation {
        match self {
            OperationKind::Spend { kind, amount } => LocalMutation::SpendCurrency {
                kind: *kind,
                amount: *amount,
            },
            OperationKind::Purchase { item, cost, .. } => LocalMutation::PurchaseItem {
                item: item.clone(),
                cost: *cost,
            },
            OperationKind::Equip { item } => LocalMutation::EquipItem {
                item: item.clone(),
            },
            OperationKind::Unequip { item } => LocalMutation::UnequipItem {
                item: item.clone(),
            },
            OperationKind::ClaimReward {
                type_id,
                level,
                reward,
            } => LocalMutation::ClaimReward {
                type_id: type_id.clone(),
                level: *level,
                reward: *reward,
            },
        }
    }

    fn optimistic_reward(&self) -> u64 {
        match self {
            OperationKind::ClaimReward { reward, .. } => {
                reward.map(|(_, amount)| amount).unwrap_or(0)
            }
            _ => 0,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct OperationRequest {
    pub kind: OperationKind,
    pub key: IdempotencyKey,
}

impl OperationRequest {
    pub fn new(kind: OperationKind, key: IdempotencyKey) -> Self {
        OperationRequest { kind, key }
    }

    /// Per-instance key: every invocation is a distinct logical operation.
    /// Use for legitimately repeatable actions (consumable purchases,
    /// ad-rewarded top-ups).
    pub fn repeatable(kind: OperationKind) -> Self {
        let key = IdempotencyKey::per_instance(&Self::action_identity(&kind));
        OperationRequest { kind, key }
    }

    /// Per-resource key: retries and duplicates of the same action collapse
    /// into one operation. Use for claim-once flows.
    pub fn once(kind: OperationKind) -> Self {
        let key = IdempotencyKey::per_resource(&Self::action_identity(&kind));
        OperationRequest { kind, key }
    }

    fn action_identity(kind: &OperationKind) -> String {
        format!("{}:{}", kind.action_name(), kind.resource_key())
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Outcome {
    Confirmed,
    /// The server reported the operation already done (already-claimed,
    /// already-owned); the optimistic state stood as-is.
    ConfirmedIdempotent,
}

#[derive(Clone, Debug, PartialEq)]
pub struct OperationReceipt {
    pub key: IdempotencyKey,
    pub resource_key: String,
    pub outcome: Outcome,
    /// True when the confirmed values differed from the optimistic guess.
    pub corrected: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub enum OperationError {
    /// Another operation on the same resource key is still in flight.
    OperationInProgress { resource_key: String },
    /// An operation with this idempotency key is already pending.
    DuplicateOperation { key: IdempotencyKey },
    /// Rejected locally before anything was applied or sent.
    Validation(ValidationError),
    /// The server rejected the operation; local state was rolled back.
    Rejected(RejectionReason),
    /// The call never completed; local state was rolled back. Safe to retry
    /// with a fresh idempotency key.
    Transport(String),
}

impl fmt::Display for OperationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationError::OperationInProgress { resource_key } => {
                write!(f, "an operation on {resource_key} is already in flight")
            }
            OperationError::DuplicateOperation { key } => {
                write!(f, "operation {key} is already pending")
            }
            OperationError::Validation(err) => write!(f, "validation failed: {err}"),
            OperationError::Rejected(reason) => {
                write!(f, "rejected by server: {reason}")
            }
            OperationError::Transport(msg) => write!(f, "transport failure: {msg}"),
        }
    }
}

impl Error for OperationError {}

impl From<ValidationError> for OperationError {
    fn from(err: ValidationError) -> Self {
        OperationError::Validation(err)
    }
}

/// One achievement the bulk claim should attempt.
#[derive(Clone, Debug, PartialEq)]
pub struct ClaimCandidate {
    pub type_id: String,
    pub level: u32,
    pub reward: Option<(CurrencyKind, u64)>,
}

/// Per-candidate outcome of `claim_all_eligible`. Failed entries kept their
/// optimistic local state (the batch never rolls back); the next full server
/// sync reconciles them.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BulkClaimReport {
    pub confirmed: Vec<String>,
    pub already_claimed: Vec<String>,
    pub failed: Vec<(String, String)>,
    pub skipped: Vec<String>,
}

/// Values an operation can touch, read back from the cache around each state
/// transition so events always carry the displayed-before and landed-after
/// pair.
#[derive(Clone, Debug, PartialEq)]
struct ObservedValues {
    currency: Option<(CurrencyKind, u64)>,
    item: Option<(ItemId, bool, bool)>,
    achievement: Option<(String, u32, BTreeSet<u32>)>,
}

fn observe(cache: &EconomyCache, kind: &OperationKind) -> ObservedValues {
    let currency = match kind {
        OperationKind::Spend { kind, .. } => Some(*kind),
        OperationKind::Purchase { cost, .. } => cost.map(|(kind, _)| kind),
        OperationKind::ClaimReward { reward, .. } => reward.map(|(kind, _)| kind),
        _ => None,
    }
    .map(|kind| (kind, cache.balance(kind)));

    let item = match kind {
        OperationKind::Purchase { item, .. }
        | OperationKind::Equip { item }
        | OperationKind::Unequip { item } => {
            Some((item.clone(), cache.owns(item), cache.is_equipped(item)))
        }
        _ => None,
    };

    let achievement = match kind {
        OperationKind::ClaimReward { type_id, .. } => {
            let state = cache.achievement(type_id);
            Some((
                type_id.clone(),
                state.map(|a| a.level).unwrap_or(0),
                state.map(|a| a.claimed_levels.clone()).unwrap_or_default(),
            ))
        }
        _ => None,
    };

    ObservedValues {
        currency,
        item,
        achievement,
    }
}

/// What the gateway confirmed, before it is folded into a `ServerTruth`.
enum RemoteSuccess {
    NewBalance(u64),
    Purchase { owned: bool, currency_left: Option<u64> },
    EquippedSet(Vec<ItemId>),
    Granted(u64),
}

/// The apply → call → confirm/rollback engine. Sole writer of the economy
/// cache; one instance per logged-in session.
pub struct OperationCoordinator<G, M> {
    cache: Arc<Mutex<EconomyCache>>,
    pending: PendingOperationLog,
    notifier: ChangeNotifier,
    gateway: G,
    mirror: M,
}

impl<G: RemoteGateway, M: PersistentMirror> OperationCoordinator<G, M> {
    pub fn new(
        cache: Arc<Mutex<EconomyCache>>,
        notifier: ChangeNotifier,
        gateway: G,
        mirror: M,
    ) -> Self {
        OperationCoordinator {
            cache,
            pending: PendingOperationLog::new(),
            notifier,
            gateway,
            mirror,
        }
    }

    fn cache(&self) -> MutexGuard<'_, EconomyCache> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn pending(&self) -> &PendingOperationLog {
        &self.pending
    }

    pub fn notifier(&self) -> &ChangeNotifier {
        &self.notifier
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    /// Run one optimistic operation to completion: apply the local mutation,
    /// call the server, then either commit the confirmed values or restore
    /// the pre-apply snapshot.
    ///
    /// At most one operation per resource key may be in flight; a second one
    /// is rejected outright rather than queued. Expected failures come back
    /// as `OperationError` values, never panics.
    pub async fn execute(
        &self,
        request: OperationRequest,
    ) -> Result<OperationReceipt, OperationError> {
        let resource_key = request.kind.resource_key();
        if let Err(err) = self
            .pending
            .try_begin(request.key.clone(), &request.kind.resource_keys())
        {
            return Err(match err {
                BeginError::ResourceBusy { resource_key } => {
                    debug!(%resource_key, "rejected: resource busy");
                    OperationError::OperationInProgress { resource_key }
                }
                BeginError::DuplicateKey { key } => {
                    debug!(%key, "rejected: duplicate idempotency key");
                    OperationError::DuplicateOperation { key }
                }
            });
        }

        let mutation = request.kind.local_mutation();
        let applied = {
            let mut cache = self.cache();
            let before = observe(&cache, &request.kind);
            match cache.apply_local(&mutation) {
                Ok(snapshot) => {
                    let after = observe(&cache, &request.kind);
                    Ok((snapshot, before, after))
                }
                Err(err) => Err(err),
            }
        };
        let (snapshot, before, after) = match applied {
            Ok(applied) => applied,
            Err(err) => {
                // a claim already recorded locally is a no-op, not a
                // failure: the level stays claimed and the caller sees
                // success with nothing sent out
                if matches!(err, ValidationError::AlreadyClaimed { .. }) {
                    debug!(key = %request.key, "claim already recorded locally");
                    return self.settle_idempotent(&request, resource_key);
                }
                // nothing was applied and no event goes out; free the key
                self.pending.complete(&request.key, PendingOutcome::Failed);
                debug!(key = %request.key, error = %err, "rejected locally");
                return Err(OperationError::Validation(err));
            }
        };
        self.emit_transition(
            ChangePhase::Optimistic,
            &before,
            &after,
            request.kind.optimistic_reward(),
        );
        debug!(key = %request.key, %resource_key, "optimistic state applied");

        match self.dispatch(&request).await {
            Ok(success) => self.settle_confirmed(&request, resource_key, success),
            Err(GatewayError::Rejected(reason))
                if matches!(
                    reason,
                    RejectionReason::AlreadyClaimed | RejectionReason::AlreadyOwned
                ) =>
            {
                debug!(key = %request.key, reason = %reason, "idempotent success");
                self.settle_idempotent(&request, resource_key)
            }
            Err(err) => self.settle_failed(&request, resource_key, snapshot, err),
        }
    }

    /// Claim every eligible level in one batch. One umbrella local mutation
    /// goes in up front, then the remote claims fire concurrently; an
    /// individual remote failure is logged and reported but does not roll
    /// the batch back.
    pub async fn claim_all_eligible(
        &self,
        candidates: Vec<ClaimCandidate>,
    ) -> BulkClaimReport {
        let mut report = BulkClaimReport::default();
        let mut applied: Vec<(ClaimCandidate, IdempotencyKey)> = Vec::new();

        for candidate in candidates {
            let kind = OperationKind::ClaimReward {
                type_id: candidate.type_id.clone(),
                level: candidate.level,
                reward: candidate.reward,
            };
            let resource_key = kind.resource_key();
            let request = OperationRequest::once(kind.clone());
            // batch claims never roll back, so only the achievement key is
            // held; reward currencies stay free for the other candidates
            if self
                .pending
                .try_begin(request.key.clone(), std::slice::from_ref(&resource_key))
                .is_err()
            {
                report.skipped.push(candidate.type_id);
                continue;
            }
            let outcome = {
                let mut cache = self.cache();
                let before = observe(&cache, &kind);
                cache
                    .apply_local(&kind.local_mutation())
                    .map(|_| (before, observe(&cache, &kind)))
            };
            match outcome {
                Ok((before, after)) => {
                    self.emit_transition(
                        ChangePhase::Optimistic,
                        &before,
                        &after,
                        kind.optimistic_reward(),
                    );
                    applied.push((candidate, request.key));
                }
                Err(err) => {
                    if matches!(err, ValidationError::AlreadyClaimed { .. }) {
                        self.pending
                            .complete(&request.key, PendingOutcome::Confirmed);
                        report.already_claimed.push(candidate.type_id);
                        continue;
                    }
                    self.pending.complete(&request.key, PendingOutcome::Failed);
                    debug!(type_id = %candidate.type_id, error = %err, "bulk claim skipped");
                    report.skipped.push(candidate.type_id);
                }
            }
        }

        let calls = applied.iter().map(|(candidate, _)| {
            self.gateway
                .claim_achievement_reward(&candidate.type_id, candidate.level)
        });
        let results = join_all(calls).await;

        let mut any_confirmed = false;
        for ((candidate, key), result) in applied.into_iter().zip(results) {
            let kind = OperationKind::ClaimReward {
                type_id: candidate.type_id.clone(),
                level: candidate.level,
                reward: candidate.reward,
            };
            match result {
                Ok(response) => {
                    let (before, after) = {
                        let mut cache = self.cache();
                        let before = observe(&cache, &kind);
                        let truth = claim_truth(&cache, &kind, response.granted);
                        cache.commit(&truth);
                        (before, observe(&cache, &kind))
                    };
                    self.pending.complete(&key, PendingOutcome::Confirmed);
                    self.emit_transition(
                        ChangePhase::Confirmed,
                        &before,
                        &after,
                        response.granted,
                    );
                    report.confirmed.push(candidate.type_id);
                    any_confirmed = true;
                }
                Err(GatewayError::Rejected(RejectionReason::AlreadyClaimed)) => {
                    self.pending.complete(&key, PendingOutcome::Confirmed);
                    let observed = observe(&self.cache(), &kind);
                    self.emit_transition(ChangePhase::Confirmed, &observed, &observed, 0);
                    report.already_claimed.push(candidate.type_id);
                    any_confirmed = true;
                }
                Err(err) => {
                    // deliberate asymmetry: the umbrella mutation stays; the
                    // next full sync reconciles this entry
                    error!(
                        type_id = %candidate.type_id,
                        level = candidate.level,
                        error = %err,
                        "bulk claim call failed"
                    );
                    self.pending.complete(&key, PendingOutcome::Failed);
                    report.failed.push((candidate.type_id, err.to_string()));
                }
            }
        }

        if any_confirmed {
            self.save_mirror();
        }
        report
    }

    /// Fold a server-pushed update (progress tick, balance sync) into the
    /// cache outside the optimistic protocol and notify subscribers. The
    /// value is already confirmed, so there is nothing to roll back.
    pub fn apply_confirmed(&self, truth: ServerTruth) {
        let events = {
            let mut cache = self.cache();
            let events = confirmed_push_events(&cache, &truth);
            cache.commit(&truth);
            finalize_push_events(&cache, events)
        };
        for event in events {
            self.notifier.emit(event);
        }
        self.save_mirror();
    }

    async fn dispatch(
        &self,
        request: &OperationRequest,
    ) -> Result<RemoteSuccess, GatewayError> {
        match &request.kind {
            OperationKind::Spend { kind, amount } => {
                let response = self
                    .gateway
                    .spend_currency(*kind, *amount, &request.key)
                    .await?;
                Ok(RemoteSuccess::NewBalance(response.new_balance))
            }
            OperationKind::Purchase { item, method, .. } => {
                let response = self
                    .gateway
                    .purchase_item(item, *method, &request.key)
                    .await?;
                Ok(RemoteSuccess::Purchase {
                    owned: response.owned,
                    currency_left: response.currency_left,
                })
            }
            OperationKind::Equip { item } => {
                let response = self.gateway.equip_item(item).await?;
                Ok(RemoteSuccess::EquippedSet(response.equipped_item_ids))
            }
            OperationKind::Unequip { item } => {
                let response = self.gateway.unequip_item(item).await?;
                Ok(RemoteSuccess::EquippedSet(response.equipped_item_ids))
            }
            OperationKind::ClaimReward { type_id, level, .. } => {
                let response = self
                    .gateway
                    .claim_achievement_reward(type_id, *level)
                    .await?;
                Ok(RemoteSuccess::Granted(response.granted))
            }
        }
    }

    fn settle_confirmed(
        &self,
        request: &OperationRequest,
        resource_key: String,
        success: RemoteSuccess,
    ) -> Result<OperationReceipt, OperationError> {
        let (before, after, reward_granted) = {
            let mut cache = self.cache();
            let before = observe(&cache, &request.kind);
            let (truth, reward_granted) = match success {
                RemoteSuccess::NewBalance(balance) => {
                    let kind = match request.kind {
                        OperationKind::Spend { kind, .. } => kind,
                        _ => unreachable!("new-balance response outside a spend"),
                    };
                    (ServerTruth::CurrencyBalance { kind, balance }, 0)
                }
                RemoteSuccess::Purchase {
                    owned,
                    currency_left,
                } => {
                    let (item, cost) = match &request.kind {
                        OperationKind::Purchase { item, cost, .. } => (item, cost),
                        _ => unreachable!("purchase response outside a purchase"),
                    };
                    let currency = match (cost, currency_left) {
                        (Some((kind, _)), Some(left)) => Some((*kind, left)),
                        _ => None,
                    };
                    (
                        ServerTruth::Purchase {
                            item: item.clone(),
                            owned,
                            currency,
                        },
                        0,
                    )
                }
                RemoteSuccess::EquippedSet(equipped) => {
                    (ServerTruth::EquippedSet { equipped }, 0)
                }
                RemoteSuccess::Granted(granted) => {
                    (claim_truth(&cache, &request.kind, granted), granted)
                }
            };
            cache.commit(&truth);
            let after = observe(&cache, &request.kind);
            (before, after, reward_granted)
        };
        self.pending
            .complete(&request.key, PendingOutcome::Confirmed);
        let corrected = before != after;
        self.emit_transition(ChangePhase::Confirmed, &before, &after, reward_granted);
        debug!(key = %request.key, %resource_key, corrected, "operation confirmed");
        self.save_mirror();
        Ok(OperationReceipt {
            key: request.key.clone(),
            resource_key,
            outcome: Outcome::Confirmed,
            corrected,
        })
    }

    fn settle_idempotent(
        &self,
        request: &OperationRequest,
        resource_key: String,
    ) -> Result<OperationReceipt, OperationError> {
        // this state is already in effect; the current values stand
        let observed = observe(&self.cache(), &request.kind);
        self.pending
            .complete(&request.key, PendingOutcome::Confirmed);
        self.emit_transition(ChangePhase::Confirmed, &observed, &observed, 0);
        self.save_mirror();
        Ok(OperationReceipt {
            key: request.key.clone(),
            resource_key,
            outcome: Outcome::ConfirmedIdempotent,
            corrected: false,
        })
    }

    fn settle_failed(
        &self,
        request: &OperationRequest,
        resource_key: String,
        snapshot: Snapshot,
        err: GatewayError,
    ) -> Result<OperationReceipt, OperationError> {
        let (before, after) = {
            let mut cache = self.cache();
            let before = observe(&cache, &request.kind);
            cache.restore(snapshot);
            (before, observe(&cache, &request.kind))
        };
        self.pending.complete(&request.key, PendingOutcome::Failed);
        warn!(
            key = %request.key,
            %resource_key,
            error = %err,
            "optimistic operation rolled back"
        );
        self.emit_transition(ChangePhase::RolledBack, &before, &after, 0);
        Err(match err {
            GatewayError::Transport(msg) => OperationError::Transport(msg),
            GatewayError::Rejected(reason) => OperationError::Rejected(reason),
        })
    }

    fn emit_transition(
        &self,
        phase: ChangePhase,
        before: &ObservedValues,
        after: &ObservedValues,
        reward_granted: u64,
    ) {
        if let (Some((kind, previous)), Some((_, current))) =
            (&before.currency, &after.currency)
        {
            self.notifier.emit(ChangeEvent {
                phase,
                change: ResourceChange::Currency {
                    kind: *kind,
                    previous: *previous,
                    current: *current,
                },
            });
        }
        if let Some((item, owned, equipped)) = &after.item {
            self.notifier.emit(ChangeEvent {
                phase,
                change: ResourceChange::Inventory {
                    item: item.clone(),
                    owned: *owned,
                    equipped: *equipped,
                },
            });
        }
        if let Some((type_id, level, claimed_levels)) = &after.achievement {
            self.notifier.emit(ChangeEvent {
                phase,
                change: ResourceChange::Achievement {
                    type_id: type_id.clone(),
                    level: *level,
                    claimed_levels: claimed_levels.clone(),
                    reward_granted,
                },
            });
        }
    }

    /// Replace the whole cached state with a fresh server snapshot (login,
    /// periodic full sync). Last confirmed server state wins.
    pub fn seed(&self, state: crate::economy::EconomyState) {
        self.cache().replace(state);
        self.save_mirror();
    }

    fn save_mirror(&self) {
        let state = self.cache().state().clone();
        if let Err(err) = self.mirror.save_snapshot(&state) {
            warn!(error = %err, "failed to persist economy mirror");
        }
    }
}

/// Server truth for a confirmed claim. The gateway reports the granted
/// amount, not an absolute balance, so the confirmed balance is the current
/// displayed value with the optimistic guess swapped for the actual grant.
fn claim_truth(cache: &EconomyCache, kind: &OperationKind, granted: u64) -> ServerTruth {
    let (type_id, level, reward) = match kind {
        OperationKind::ClaimReward {
            type_id,
            level,
            reward,
        } => (type_id, level, reward),
        _ => unreachable!("claim truth outside a claim"),
    };
    let currency = reward.map(|(currency_kind, guessed)| {
        let displayed = cache.balance(currency_kind);
        let balance = displayed.saturating_sub(guessed).saturating_add(granted);
        (currency_kind, balance)
    });
    ServerTruth::ClaimGranted {
        type_id: type_id.clone(),
        level: *level,
        currency,
    }
}

/// Event skeletons for a server-pushed commit, with previous values read
/// before the commit lands.
enum PushEvent {
    Currency { kind: CurrencyKind, previous: u64 },
    Achievement { type_id: String },
}

fn confirmed_push_events(cache: &EconomyCache, truth: &ServerTruth) -> Vec<PushEvent> {
    match truth {
        ServerTruth::CurrencyBalance { kind, .. } => vec![PushEvent::Currency {
            kind: *kind,
            previous: cache.balance(*kind),
        }],
        ServerTruth::Progress { type_id, .. } => vec![PushEvent::Achievement {
            type_id: type_id.clone(),
        }],
        ServerTruth::ClaimGranted {
            type_id, currency, ..
        } => {
            let mut events = vec![PushEvent::Achievement {
                type_id: type_id.clone(),
            }];
            if let Some((kind, _)) = currency {
                events.push(PushEvent::Currency {
                    kind: *kind,
                    previous: cache.balance(*kind),
                });
            }
            events
        }
        ServerTruth::Purchase { .. } | ServerTruth::EquippedSet { .. } => Vec::new(),
    }
}

fn finalize_push_events(cache: &EconomyCache, events: Vec<PushEvent>) -> Vec<ChangeEvent> {
    events
        .into_iter()
        .map(|event| match event {
            PushEvent::Currency { kind, previous } => ChangeEvent {
                phase: ChangePhase::Confirmed,
                change: ResourceChange::Currency {
                    kind,
                    previous,
                    current: cache.balance(kind),
                },
            },
            PushEvent::Achievement { type_id } => {
                let state = cache.achievement(&type_id);
                ChangeEvent {
                    phase: ChangePhase::Confirmed,
                    change: ResourceChange::Achievement {
                        level: state.map(|a| a.level).unwrap_or(0),
                        claimed_levels: state
                            .map(|a| a.claimed_levels.clone())
                            .unwrap_or_default(),
                        reward_granted: 0,
                        type_id,
                    },
                }
            }
        })
        .collect()
}
