use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeSet, HashMap},
    error::Error,
    fmt,
};

/// Currency families tracked by the client. `Event` is the rotating
/// seasonal currency and resets server-side between events.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum CurrencyKind {
    Soft,
    Hard,
    Event,
}

impl fmt::Display for CurrencyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CurrencyKind::Soft => "soft",
            CurrencyKind::Hard => "hard",
            CurrencyKind::Event => "event",
        };
        write!(f, "{name}")
    }
}

/// Item identifier, normalized to lowercase on construction so lookups are
/// case-insensitive everywhere.
#[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    pub fn new(raw: impl Into<String>) -> Self {
        ItemId(raw.into().trim().to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct InventoryEntry {
    pub owned: bool,
    pub equipped: bool,
    pub quantity: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AchievementState {
    pub progress: f64,
    pub level: u32,
    /// Monotonic: levels are only ever added, never removed.
    pub claimed_levels: BTreeSet<u32>,
    pub next_threshold: Option<f64>,
}

/// The full server-mirrored economy state. Also the payload of the
/// persistent mirror, hence the serde derives.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EconomyState {
    pub balances: HashMap<CurrencyKind, u64>,
    pub items: HashMap<ItemId, InventoryEntry>,
    pub achievements: HashMap<String, AchievementState>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ValidationError {
    InsufficientBalance {
        kind: CurrencyKind,
        balance: u64,
        requested: u64,
    },
    AlreadyOwned(ItemId),
    NotOwned(ItemId),
    NotEquipped(ItemId),
    EquipCapacityExceeded {
        capacity: usize,
    },
    LevelNotReached {
        type_id: String,
        level: u32,
        reached: u32,
    },
    AlreadyClaimed {
        type_id: String,
        level: u32,
    },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::InsufficientBalance {
                kind,
                balance,
                requested,
            } => {
                write!(
                    f,
                    "insufficient {kind} balance: have {balance}, need {requested}"
                )
            }
            ValidationError::AlreadyOwned(item) => write!(f, "{item} is already owned"),
            ValidationError::NotOwned(item) => write!(f, "{item} is not owned"),
            ValidationError::NotEquipped(item) => write!(f, "{item} is not equipped"),
            ValidationError::EquipCapacityExceeded { capacity } => {
                write!(f, "all {capacity} equip slots are in use")
            }
            ValidationError::LevelNotReached {
                type_id,
                level,
                reached,
            } => {
                write!(
                    f,
                    "{type_id} level {level} not reached (currently {reached})"
                )
            }
            ValidationError::AlreadyClaimed { type_id, level } => {
                write!(f, "{type_id} level {level} already claimed")
            }
        }
    }
}

impl Error for ValidationError {}

/// A synchronous, locally-validated mutation of the economy state. The
/// coordinator applies one of these before the matching remote call goes out.
#[derive(Clone, Debug, PartialEq)]
pub enum LocalMutation {
    SpendCurrency {
        kind: CurrencyKind,
        amount: u64,
    },
    GrantCurrency {
        kind: CurrencyKind,
        amount: u64,
    },
    PurchaseItem {
        item: ItemId,
        cost: Option<(CurrencyKind, u64)>,
    },
    EquipItem {
        item: ItemId,
    },
    UnequipItem {
        item: ItemId,
    },
    ClaimReward {
        type_id: String,
        level: u32,
        reward: Option<(CurrencyKind, u64)>,
    },
}

/// Captures the prior values of exactly the entries a mutation touched.
/// Restoring a snapshot reverses that mutation and nothing else, so it stays
/// valid even if unrelated entries changed in the meantime.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Snapshot {
    currencies: Vec<(CurrencyKind, u64)>,
    items: Vec<(ItemId, Option<InventoryEntry>)>,
    achievements: Vec<(String, Option<AchievementState>)>,
}

impl Snapshot {
    fn capture_currency(&mut self, state: &EconomyState, kind: CurrencyKind) {
        if !self.currencies.iter().any(|(k, _)| *k == kind) {
            let balance = state.balances.get(&kind).copied().unwrap_or(0);
            self.currencies.push((kind, balance));
        }
    }

    fn capture_item(&mut self, state: &EconomyState, item: &ItemId) {
        if !self.items.iter().any(|(id, _)| id == item) {
            self.items.push((item.clone(), state.items.get(item).cloned()));
        }
    }

    fn capture_achievement(&mut self, state: &EconomyState, type_id: &str) {
        if !self.achievements.iter().any(|(id, _)| id == type_id) {
            self.achievements.push((
                type_id.to_string(),
                state.achievements.get(type_id).cloned(),
            ));
        }
    }
}

/// Server-confirmed values for the entries an operation affected. Commit
/// overwrites local state with these; the server always wins.
#[derive(Clone, Debug, PartialEq)]
pub enum ServerTruth {
    CurrencyBalance {
        kind: CurrencyKind,
        balance: u64,
    },
    Purchase {
        item: ItemId,
        owned: bool,
        currency: Option<(CurrencyKind, u64)>,
    },
    EquippedSet {
        equipped: Vec<ItemId>,
    },
    ClaimGranted {
        type_id: String,
        level: u32,
        currency: Option<(CurrencyKind, u64)>,
    },
    Progress {
        type_id: String,
        progress: f64,
        level: u32,
        next_threshold: Option<f64>,
    },
}

/// In-memory mirror of the server-authoritative economy. Owns no network
/// logic; the coordinator is the only writer.
#[derive(Clone, Debug)]
pub struct EconomyCache {
    state: EconomyState,
    equip_slots: usize,
}

impl EconomyCache {
    pub fn new(equip_slots: usize) -> Self {
        Self::from_state(EconomyState::default(), equip_slots)
    }

    pub fn from_state(state: EconomyState, equip_slots: usize) -> Self {
        EconomyCache { state, equip_slots }
    }

    pub fn state(&self) -> &EconomyState {
        &self.state
    }

    /// Wholesale replacement, used at login and on a full server sync.
    pub fn replace(&mut self, state: EconomyState) {
        self.state = state;
    }

    pub fn equip_slots(&self) -> usize {
        self.equip_slots
    }

    pub fn balance(&self, kind: CurrencyKind) -> u64 {
        self.state.balances.get(&kind).copied().unwrap_or(0)
    }

    pub fn owns(&self, item: &ItemId) -> bool {
        self.state.items.get(item).is_some_and(|e| e.owned)
    }

    pub fn is_equipped(&self, item: &ItemId) -> bool {
        self.state.items.get(item).is_some_and(|e| e.equipped)
    }

    pub fn quantity(&self, item: &ItemId) -> u64 {
        self.state.items.get(item).map(|e| e.quantity).unwrap_or(0)
    }

    pub fn equipped_count(&self) -> usize {
        self.state.items.values().filter(|e| e.equipped).count()
    }

    pub fn equipped_items(&self) -> Vec<ItemId> {
        let mut ids: Vec<ItemId> = self
            .state
            .items
            .iter()
            .filter(|(_, e)| e.equipped)
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    pub fn achievement(&self, type_id: &str) -> Option<&AchievementState> {
        self.state.achievements.get(type_id)
    }

    /// Check a mutation against the hard invariants without applying it.
    pub fn validate(&self, mutation: &LocalMutation) -> Result<(), ValidationError> {
        match mutation {
            LocalMutation::SpendCurrency { kind, amount } => {
                let balance = self.balance(*kind);
                if balance < *amount {
                    return Err(ValidationError::InsufficientBalance {
                        kind: *kind,
                        balance,
                        requested: *amount,
                    });
                }
                Ok(())
            }
            LocalMutation::GrantCurrency { .. } => Ok(()),
            LocalMutation::PurchaseItem { item, cost } => {
                if self.owns(item) {
                    return Err(ValidationError::AlreadyOwned(item.clone()));
                }
                if let Some((kind, amount)) = cost {
                    let balance = self.balance(*kind);
                    if balance < *amount {
                        return Err(ValidationError::InsufficientBalance {
                            kind: *kind,
                            balance,
                            requested: *amount,
                        });
                    }
                }
                Ok(())
            }
            LocalMutation::EquipItem { item } => {
                if !self.owns(item) {
                    return Err(ValidationError::NotOwned(item.clone()));
                }
                if !self.is_equipped(item) && self.equipped_count() >= self.equip_slots {
                    return Err(ValidationError::EquipCapacityExceeded {
                        capacity: self.equip_slots,
                    });
                }
                Ok(())
            }
            LocalMutation::UnequipItem { item } => {
                if !self.is_equipped(item) {
                    return Err(ValidationError::NotEquipped(item.clone()));
                }
                Ok(())
            }
            LocalMutation::ClaimReward { type_id, level, .. } => {
                let reached = self
                    .achievement(type_id)
                    .map(|a| a.level)
                    .unwrap_or(0);
                if *level > reached {
                    return Err(ValidationError::LevelNotReached {
                        type_id: type_id.clone(),
                        level: *level,
                        reached,
                    });
                }
                let already = self
                    .achievement(type_id)
                    .is_some_and(|a| a.claimed_levels.contains(level));
                if already {
                    return Err(ValidationError::AlreadyClaimed {
                        type_id: type_id.clone(),
                        level: *level,
                    });
                }
                Ok(())
            }
        }
    }

    /// Validate and apply a mutation, returning a snapshot of the prior
    /// values of exactly the touched entries. On a validation error the
    /// state is untouched.
    pub fn apply_local(
        &mut self,
        mutation: &LocalMutation,
    ) -> Result<Snapshot, ValidationError> {
        self.validate(mutation)?;
        let mut snapshot = Snapshot::default();
        match mutation {
            LocalMutation::SpendCurrency { kind, amount } => {
                snapshot.capture_currency(&self.state, *kind);
                let balance = self.state.balances.entry(*kind).or_insert(0);
                *balance -= amount;
            }
            LocalMutation::GrantCurrency { kind, amount } => {
                snapshot.capture_currency(&self.state, *kind);
                let balance = self.state.balances.entry(*kind).or_insert(0);
                *balance = balance.saturating_add(*amount);
            }
            LocalMutation::PurchaseItem { item, cost } => {
                snapshot.capture_item(&self.state, item);
                if let Some((kind, amount)) = cost {
                    snapshot.capture_currency(&self.state, *kind);
                    let balance = self.state.balances.entry(*kind).or_insert(0);
                    *balance -= amount;
                }
                let entry = self.state.items.entry(item.clone()).or_default();
                entry.owned = true;
                entry.quantity = entry.quantity.saturating_add(1);
            }
            LocalMutation::EquipItem { item } => {
                snapshot.capture_item(&self.state, item);
                let entry = self.state.items.entry(item.clone()).or_default();
                entry.equipped = true;
            }
            LocalMutation::UnequipItem { item } => {
                snapshot.capture_item(&self.state, item);
                let entry = self.state.items.entry(item.clone()).or_default();
                entry.equipped = false;
            }
            LocalMutation::ClaimReward {
                type_id,
                level,
                reward,
            } => {
                snapshot.capture_achievement(&self.state, type_id);
                if let Some((kind, amount)) = reward {
                    snapshot.capture_currency(&self.state, *kind);
                    let balance = self.state.balances.entry(*kind).or_insert(0);
                    *balance = balance.saturating_add(*amount);
                }
                let entry = self.state.achievements.entry(type_id.clone()).or_default();
                entry.claimed_levels.insert(*level);
            }
        }
        Ok(snapshot)
    }

    /// Reverse a previously returned snapshot, field by field. Entries that
    /// did not exist before the mutation are removed again.
    pub fn restore(&mut self, snapshot: Snapshot) {
        for (kind, balance) in snapshot.currencies {
            self.state.balances.insert(kind, balance);
        }
        for (item, entry) in snapshot.items {
            match entry {
                Some(entry) => {
                    self.state.items.insert(item, entry);
                }
                None => {
                    self.state.items.remove(&item);
                }
            }
        }
        for (type_id, state) in snapshot.achievements {
            match state {
                Some(state) => {
                    self.state.achievements.insert(type_id, state);
                }
                None => {
                    self.state.achievements.remove(&type_id);
                }
            }
        }
    }

    /// Overwrite the affected entries with server-confirmed values. The
    /// server value wins even when it matches what was optimistically shown.
    pub fn commit(&mut self, truth: &ServerTruth) {
        match truth {
            ServerTruth::CurrencyBalance { kind, balance } => {
                self.state.balances.insert(*kind, *balance);
            }
            ServerTruth::Purchase {
                item,
                owned,
                currency,
            } => {
                let entry = self.state.items.entry(item.clone()).or_default();
                entry.owned = *owned;
                if *owned && entry.quantity == 0 {
                    entry.quantity = 1;
                }
                if !*owned {
                    // equipped implies owned
                    entry.equipped = false;
                }
                if let Some((kind, balance)) = currency {
                    self.state.balances.insert(*kind, *balance);
                }
            }
            ServerTruth::EquippedSet { equipped } => {
                for entry in self.state.items.values_mut() {
                    entry.equipped = false;
                }
                for item in equipped {
                    let entry = self.state.items.entry(item.clone()).or_default();
                    entry.owned = true;
                    entry.equipped = true;
                    if entry.quantity == 0 {
                        entry.quantity = 1;
                    }
                }
            }
            ServerTruth::ClaimGranted {
                type_id,
                level,
                currency,
            } => {
                let entry = self.state.achievements.entry(type_id.clone()).or_default();
                entry.level = entry.level.max(*level);
                entry.claimed_levels.insert(*level);
                if let Some((kind, balance)) = currency {
                    self.state.balances.insert(*kind, *balance);
                }
            }
            ServerTruth::Progress {
                type_id,
                progress,
                level,
                next_threshold,
            } => {
                let entry = self.state.achievements.entry(type_id.clone()).or_default();
                entry.progress = *progress;
                // claimed levels never shrink, so the level cannot drop below
                // the highest already-claimed level
                let floor = entry.claimed_levels.iter().next_back().copied().unwrap_or(0);
                entry.level = (*level).max(floor);
                entry.next_threshold = *next_threshold;
            }
        }
    }
}
