use crate::{
    economy::{CurrencyKind, EconomyState, ItemId},
    events::ChangeEvent,
    gateway::{
        ClaimResponse,
        EquipResponse,
        GatewayError,
        PurchaseMethod,
        PurchaseResponse,
        RemoteGateway,
        SpendResponse,
    },
    mirror::InMemoryMirror,
    pending::IdempotencyKey,
    session::{EconomyConfig, EconomySession},
};
use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};
use tokio::sync::broadcast;

type Script<T> = Arc<Mutex<VecDeque<Result<T, GatewayError>>>>;

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Gateway double with per-method scripted outcomes. Unscripted calls fail
/// with a transport error so a test that forgot to script something fails
/// loudly instead of proceeding on made-up data. An optional latency keeps
/// calls in flight long enough to exercise the busy-resource window.
#[derive(Clone, Default)]
pub struct FakeGateway {
    spend: Script<SpendResponse>,
    purchase: Script<PurchaseResponse>,
    equip: Script<EquipResponse>,
    unequip: Script<EquipResponse>,
    claim: Script<ClaimResponse>,
    latency: Arc<Mutex<Duration>>,
    spend_calls: Arc<Mutex<Vec<(CurrencyKind, u64, IdempotencyKey)>>>,
    purchase_calls: Arc<Mutex<Vec<(ItemId, PurchaseMethod, IdempotencyKey)>>>,
    equip_calls: Arc<Mutex<Vec<ItemId>>>,
    unequip_calls: Arc<Mutex<Vec<ItemId>>>,
    claim_calls: Arc<Mutex<Vec<(String, u32)>>>,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_latency(&self, latency: Duration) {
        *lock(&self.latency) = latency;
    }

    pub fn script_spend(&self, result: Result<SpendResponse, GatewayError>) {
        lock(&self.spend).push_back(result);
    }

    pub fn script_purchase(&self, result: Result<PurchaseResponse, GatewayError>) {
        lock(&self.purchase).push_back(result);
    }

    pub fn script_equip(&self, result: Result<EquipResponse, GatewayError>) {
        lock(&self.equip).push_back(result);
    }

    pub fn script_unequip(&self, result: Result<EquipResponse, GatewayError>) {
        lock(&self.unequip).push_back(result);
    }

    pub fn script_claim(&self, result: Result<ClaimResponse, GatewayError>) {
        lock(&self.claim).push_back(result);
    }

    pub fn spend_calls(&self) -> Vec<(CurrencyKind, u64, IdempotencyKey)> {
        lock(&self.spend_calls).clone()
    }

    pub fn purchase_calls(&self) -> Vec<(ItemId, PurchaseMethod, IdempotencyKey)> {
        lock(&self.purchase_calls).clone()
    }

    pub fn equip_calls(&self) -> Vec<ItemId> {
        lock(&self.equip_calls).clone()
    }

    pub fn unequip_calls(&self) -> Vec<ItemId> {
        lock(&self.unequip_calls).clone()
    }

    pub fn claim_calls(&self) -> Vec<(String, u32)> {
        lock(&self.claim_calls).clone()
    }

    async fn pause(&self) {
        let latency = *lock(&self.latency);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }

    fn next<T>(script: &Script<T>, method: &str) -> Result<T, GatewayError> {
        lock(script).pop_front().unwrap_or_else(|| {
            Err(GatewayError::Transport(format!("unscripted {method} call")))
        })
    }
}

impl RemoteGateway for FakeGateway {
    async fn spend_currency(
        &self,
        kind: CurrencyKind,
        amount: u64,
        key: &IdempotencyKey,
    ) -> Result<SpendResponse, GatewayError> {
        lock(&self.spend_calls).push((kind, amount, key.clone()));
        self.pause().await;
        Self::next(&self.spend, "spend_currency")
    }

    async fn purchase_item(
        &self,
        item: &ItemId,
        method: PurchaseMethod,
        key: &IdempotencyKey,
    ) -> Result<PurchaseResponse, GatewayError> {
        lock(&self.purchase_calls).push((item.clone(), method, key.clone()));
        self.pause().await;
        Self::next(&self.purchase, "purchase_item")
    }

    async fn equip_item(&self, item: &ItemId) -> Result<EquipResponse, GatewayError> {
        lock(&self.equip_calls).push(item.clone());
        self.pause().await;
        Self::next(&self.equip, "equip_item")
    }

    async fn unequip_item(&self, item: &ItemId) -> Result<EquipResponse, GatewayError> {
        lock(&self.unequip_calls).push(item.clone());
        self.pause().await;
        Self::next(&self.unequip, "unequip_item")
    }

    async fn claim_achievement_reward(
        &self,
        type_id: &str,
        level: u32,
    ) -> Result<ClaimResponse, GatewayError> {
        lock(&self.claim_calls).push((type_id.to_string(), level));
        self.pause().await;
        Self::next(&self.claim, "claim_achievement_reward")
    }
}

pub struct TestContext {
    pub session: EconomySession<FakeGateway, InMemoryMirror>,
    pub gateway: FakeGateway,
    pub mirror: InMemoryMirror,
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_state(EconomyState::default())
    }

    pub fn with_state(state: EconomyState) -> Self {
        Self::with_state_and_config(state, EconomyConfig::default())
    }

    pub fn with_state_and_config(state: EconomyState, config: EconomyConfig) -> Self {
        let gateway = FakeGateway::new();
        let mirror = InMemoryMirror::new_with_state(state);
        let session = EconomySession::bootstrap(gateway.clone(), mirror.clone(), config)
            .expect("in-memory bootstrap cannot fail");
        TestContext {
            session,
            gateway,
            mirror,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.session.subscribe()
    }

    /// Receive the next change event or fail the test after a second.
    pub async fn recv_event(rx: &mut broadcast::Receiver<ChangeEvent>) -> ChangeEvent {
        tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("timed out waiting for change event")
            .expect("event channel closed")
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Seed helper: an otherwise empty state with one currency balance.
pub fn state_with_balance(kind: CurrencyKind, balance: u64) -> EconomyState {
    let mut state = EconomyState::default();
    state.balances.insert(kind, balance);
    state
}
