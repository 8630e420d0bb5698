use proptest::prelude::*;
use satchel::{
    AchievementState,
    CurrencyKind,
    EconomyCache,
    EconomyState,
    InventoryEntry,
    ItemId,
    LocalMutation,
};

fn arb_currency() -> impl Strategy<Value = CurrencyKind> {
    prop_oneof![
        Just(CurrencyKind::Soft),
        Just(CurrencyKind::Hard),
        Just(CurrencyKind::Event),
    ]
}

fn arb_item() -> impl Strategy<Value = ItemId> {
    prop_oneof![
        Just(ItemId::new("hat")),
        Just(ItemId::new("coat")),
        Just(ItemId::new("ring")),
        Just(ItemId::new("scarf")),
    ]
}

fn arb_mutation() -> impl Strategy<Value = LocalMutation> {
    prop_oneof![
        (arb_currency(), 0u64..500).prop_map(|(kind, amount)| {
            LocalMutation::SpendCurrency { kind, amount }
        }),
        (arb_currency(), 0u64..500).prop_map(|(kind, amount)| {
            LocalMutation::GrantCurrency { kind, amount }
        }),
        (arb_item(), proptest::option::of((arb_currency(), 0u64..200))).prop_map(
            |(item, cost)| LocalMutation::PurchaseItem { item, cost }
        ),
        arb_item().prop_map(|item| LocalMutation::EquipItem { item }),
        arb_item().prop_map(|item| LocalMutation::UnequipItem { item }),
        ("[a-c]{1}", 1u32..4, proptest::option::of((arb_currency(), 0u64..100)))
            .prop_map(|(type_id, level, reward)| LocalMutation::ClaimReward {
                type_id,
                level,
                reward,
            }),
    ]
}

fn seeded_cache() -> EconomyCache {
    let mut state = EconomyState::default();
    state.balances.insert(CurrencyKind::Soft, 300);
    state.balances.insert(CurrencyKind::Hard, 50);
    state.items.insert(
        ItemId::new("hat"),
        InventoryEntry {
            owned: true,
            equipped: false,
            quantity: 1,
        },
    );
    state.achievements.insert(
        "a".to_string(),
        AchievementState {
            progress: 30.0,
            level: 3,
            claimed_levels: Default::default(),
            next_threshold: Some(40.0),
        },
    );
    EconomyCache::from_state(state, 2)
}

proptest! {
    /// Restoring the snapshot of any accepted mutation returns the cache to
    /// its exact prior state, field by field.
    #[test]
    fn rollback_symmetry(mutations in proptest::collection::vec(arb_mutation(), 1..20)) {
        let mut cache = seeded_cache();
        for mutation in mutations {
            let before = cache.state().clone();
            if let Ok(snapshot) = cache.apply_local(&mutation) {
                cache.restore(snapshot);
                prop_assert_eq!(cache.state(), &before);
                // re-apply so later mutations run against a drifted state too
                let _ = cache.apply_local(&mutation);
            } else {
                // rejected mutations must not have touched anything
                prop_assert_eq!(cache.state(), &before);
            }
        }
    }

    /// No sequence of spends can drive a balance below zero; overdrafts are
    /// rejected up front.
    #[test]
    fn balances_never_go_negative(
        spends in proptest::collection::vec((arb_currency(), 0u64..400), 1..30)
    ) {
        let mut cache = seeded_cache();
        for (kind, amount) in spends {
            let before = cache.balance(kind);
            match cache.apply_local(&LocalMutation::SpendCurrency { kind, amount }) {
                Ok(_) => prop_assert_eq!(cache.balance(kind), before - amount),
                Err(_) => {
                    prop_assert!(amount > before);
                    prop_assert_eq!(cache.balance(kind), before);
                }
            }
        }
    }

    /// The equipped count never exceeds the slot capacity, whatever the
    /// mutation order.
    #[test]
    fn equip_capacity_is_never_exceeded(
        mutations in proptest::collection::vec(arb_mutation(), 1..40)
    ) {
        let mut cache = seeded_cache();
        for mutation in mutations {
            let _ = cache.apply_local(&mutation);
            prop_assert!(cache.equipped_count() <= cache.equip_slots());
        }
    }

    /// Claimed levels only grow under accepted mutations, and every claimed
    /// level was reached first.
    #[test]
    fn claims_are_monotonic_and_reachable(
        mutations in proptest::collection::vec(arb_mutation(), 1..40)
    ) {
        let mut cache = seeded_cache();
        let mut seen: std::collections::HashMap<String, std::collections::BTreeSet<u32>> =
            std::collections::HashMap::new();
        for mutation in mutations {
            let _ = cache.apply_local(&mutation);
            for (type_id, achievement) in &cache.state().achievements {
                let previous = seen.entry(type_id.clone()).or_default();
                prop_assert!(previous.is_subset(&achievement.claimed_levels));
                for level in &achievement.claimed_levels {
                    prop_assert!(*level <= achievement.level);
                }
                *previous = achievement.claimed_levels.clone();
            }
        }
    }
}
