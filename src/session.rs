use crate::{
    coordinator::OperationCoordinator,
    economy::{AchievementState, CurrencyKind, EconomyCache, EconomyState, ItemId},
    events::{ChangeEvent, ChangeNotifier},
    gateway::RemoteGateway,
    mirror::PersistentMirror,
};
use color_eyre::eyre::Result;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;
use tracing::debug;

#[derive(Clone, Debug)]
pub struct EconomyConfig {
    /// How many items may be equipped at once.
    pub equip_slots: usize,
    /// Buffer size of the change-event broadcast channel.
    pub event_channel_capacity: usize,
}

impl Default for EconomyConfig {
    fn default() -> Self {
        EconomyConfig {
            equip_slots: 4,
            event_channel_capacity: 64,
        }
    }
}

/// One logged-in session's view of the economy. Owns the cache and the
/// coordinator; dropping the session is logout. There are no ambient
/// singletons — anything that needs economy access gets a reference to this.
pub struct EconomySession<G, M> {
    cache: Arc<Mutex<EconomyCache>>,
    coordinator: OperationCoordinator<G, M>,
}

impl<G: RemoteGateway, M: PersistentMirror> EconomySession<G, M> {
    /// Seed the cache from the persistent mirror (empty state on first run)
    /// and wire up the coordinator. A later `seed_from_server` replaces the
    /// mirror-seeded state once the full sync arrives.
    pub fn bootstrap(gateway: G, mirror: M, config: EconomyConfig) -> Result<Self> {
        let state = mirror.load_snapshot()?.unwrap_or_default();
        debug!(
            balances = state.balances.len(),
            items = state.items.len(),
            achievements = state.achievements.len(),
            "economy session seeded from mirror"
        );
        let cache = Arc::new(Mutex::new(EconomyCache::from_state(
            state,
            config.equip_slots,
        )));
        let notifier = ChangeNotifier::new(config.event_channel_capacity);
        let coordinator =
            OperationCoordinator::new(Arc::clone(&cache), notifier, gateway, mirror);
        Ok(EconomySession { cache, coordinator })
    }

    pub fn coordinator(&self) -> &OperationCoordinator<G, M> {
        &self.coordinator
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.coordinator.notifier().subscribe()
    }

    /// Full server sync: the cached state is replaced wholesale.
    pub fn seed_from_server(&self, state: EconomyState) {
        self.coordinator.seed(state);
    }

    fn cache(&self) -> MutexGuard<'_, EconomyCache> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // Read access is unrestricted; mid-flight readers may observe a
    // provisional value.

    pub fn balance(&self, kind: CurrencyKind) -> u64 {
        self.cache().balance(kind)
    }

    pub fn owns(&self, item: &ItemId) -> bool {
        self.cache().owns(item)
    }

    pub fn is_equipped(&self, item: &ItemId) -> bool {
        self.cache().is_equipped(item)
    }

    pub fn equipped_count(&self) -> usize {
        self.cache().equipped_count()
    }

    pub fn achievement(&self, type_id: &str) -> Option<AchievementState> {
        self.cache().achievement(type_id).cloned()
    }

    pub fn state(&self) -> EconomyState {
        self.cache().state().clone()
    }
}
