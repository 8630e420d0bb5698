use crate::economy::{CurrencyKind, ItemId};
use std::collections::BTreeSet;
use tokio::sync::broadcast;

/// Where a change sits in the optimistic lifecycle. Subscribers must treat
/// `Optimistic` as provisional: a later `Confirmed` or `RolledBack` event
/// for the same logical change settles it.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ChangePhase {
    Optimistic,
    Confirmed,
    RolledBack,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ResourceChange {
    Currency {
        kind: CurrencyKind,
        previous: u64,
        current: u64,
    },
    Inventory {
        item: ItemId,
        owned: bool,
        equipped: bool,
    },
    Achievement {
        type_id: String,
        level: u32,
        claimed_levels: BTreeSet<u32>,
        reward_granted: u64,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub struct ChangeEvent {
    pub phase: ChangePhase,
    pub change: ResourceChange,
}

impl ChangeEvent {
    pub fn is_optimistic(&self) -> bool {
        self.phase == ChangePhase::Optimistic
    }

    pub fn is_rollback(&self) -> bool {
        self.phase == ChangePhase::RolledBack
    }

    /// A confirmed event whose displayed value moved is a correction: the
    /// server disagreed with the optimistic guess. UI renders these silently,
    /// unlike rollbacks.
    pub fn is_correction(&self) -> bool {
        match (&self.phase, &self.change) {
            (
                ChangePhase::Confirmed,
                ResourceChange::Currency {
                    previous, current, ..
                },
            ) => previous != current,
            _ => false,
        }
    }
}

/// Fan-out of change events to UI, analytics and anything else interested.
/// Emission never blocks; slow subscribers lag and drop the oldest events
/// rather than stalling the coordinator.
#[derive(Clone, Debug)]
pub struct ChangeNotifier {
    sender: broadcast::Sender<ChangeEvent>,
}

impl ChangeNotifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        ChangeNotifier { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: ChangeEvent) {
        // a send error only means nobody is listening right now
        let _ = self.sender.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for ChangeNotifier {
    fn default() -> Self {
        Self::new(64)
    }
}
