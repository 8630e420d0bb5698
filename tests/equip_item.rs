use satchel::{
    ChangePhase,
    EconomyConfig,
    EconomyState,
    EquipResponse,
    GatewayError,
    InventoryEntry,
    ItemId,
    OperationError,
    OperationKind,
    OperationRequest,
    ResourceChange,
    ValidationError,
    test_helpers::TestContext,
};
use std::time::Duration;

fn owned_items(names: &[&str]) -> EconomyState {
    let mut state = EconomyState::default();
    for name in names {
        state.items.insert(
            ItemId::new(*name),
            InventoryEntry {
                owned: true,
                equipped: false,
                quantity: 1,
            },
        );
    }
    state
}

fn equip(item: &str) -> OperationKind {
    OperationKind::Equip {
        item: ItemId::new(item),
    }
}

fn unequip(item: &str) -> OperationKind {
    OperationKind::Unequip {
        item: ItemId::new(item),
    }
}

#[tokio::test]
async fn equip__toggles_optimistically_and_confirms_server_set() {
    // given
    let ctx = TestContext::with_state(owned_items(&["hat", "coat"]));
    let mut events = ctx.subscribe();
    ctx.gateway.script_equip(Ok(EquipResponse {
        equipped_item_ids: vec![ItemId::new("hat")],
    }));

    // when
    ctx.session
        .coordinator()
        .execute(OperationRequest::once(equip("hat")))
        .await
        .unwrap();

    // then
    assert!(ctx.session.is_equipped(&ItemId::new("hat")));
    assert_eq!(ctx.session.equipped_count(), 1);

    let optimistic = TestContext::recv_event(&mut events).await;
    assert_eq!(
        optimistic.change,
        ResourceChange::Inventory {
            item: ItemId::new("hat"),
            owned: true,
            equipped: true,
        }
    );
    let confirmed = TestContext::recv_event(&mut events).await;
    assert_eq!(confirmed.phase, ChangePhase::Confirmed);
}

#[tokio::test]
async fn equip__server_equipped_set_is_authoritative() {
    // given: the server moves the slot to a different item entirely
    let ctx = TestContext::with_state(owned_items(&["hat", "coat"]));
    ctx.gateway.script_equip(Ok(EquipResponse {
        equipped_item_ids: vec![ItemId::new("coat")],
    }));

    // when
    ctx.session
        .coordinator()
        .execute(OperationRequest::once(equip("hat")))
        .await
        .unwrap();

    // then: confirmed set wins over the optimistic guess
    assert!(!ctx.session.is_equipped(&ItemId::new("hat")));
    assert!(ctx.session.is_equipped(&ItemId::new("coat")));
}

#[tokio::test]
async fn equip__capacity_is_enforced_locally() {
    // given: one slot, one item already equipped
    let mut state = owned_items(&["hat", "coat"]);
    state.items.get_mut(&ItemId::new("hat")).unwrap().equipped = true;
    let ctx = TestContext::with_state_and_config(
        state,
        EconomyConfig {
            equip_slots: 1,
            ..EconomyConfig::default()
        },
    );

    // when
    let err = ctx
        .session
        .coordinator()
        .execute(OperationRequest::once(equip("coat")))
        .await
        .unwrap_err();

    // then
    assert_eq!(
        err,
        OperationError::Validation(ValidationError::EquipCapacityExceeded {
            capacity: 1
        })
    );
    assert_eq!(ctx.session.equipped_count(), 1);
    assert!(ctx.gateway.equip_calls().is_empty());
}

#[tokio::test]
async fn equip__capacity_holds_during_a_double_equip_race() {
    // given: two slots free but both calls target the same item
    let ctx = TestContext::with_state_and_config(
        owned_items(&["hat"]),
        EconomyConfig {
            equip_slots: 2,
            ..EconomyConfig::default()
        },
    );
    ctx.gateway.set_latency(Duration::from_millis(20));
    ctx.gateway.script_equip(Ok(EquipResponse {
        equipped_item_ids: vec![ItemId::new("hat")],
    }));

    let coordinator = ctx.session.coordinator();
    let first = coordinator.execute(OperationRequest::repeatable(equip("hat")));
    let second = coordinator.execute(OperationRequest::repeatable(equip("hat")));

    // when
    let (first, second) = tokio::join!(first, second);

    // then
    assert!(first.is_ok());
    assert!(matches!(
        second.unwrap_err(),
        OperationError::OperationInProgress { .. }
    ));
    assert_eq!(ctx.gateway.equip_calls().len(), 1);
    assert_eq!(ctx.session.equipped_count(), 1);
}

#[tokio::test]
async fn equip__unowned_item_is_rejected_locally() {
    let ctx = TestContext::new();
    let err = ctx
        .session
        .coordinator()
        .execute(OperationRequest::once(equip("ghost")))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        OperationError::Validation(ValidationError::NotOwned(ItemId::new("ghost")))
    );
}

#[tokio::test]
async fn unequip__rolls_back_on_transport_failure() {
    // given
    let mut state = owned_items(&["hat"]);
    state.items.get_mut(&ItemId::new("hat")).unwrap().equipped = true;
    let ctx = TestContext::with_state(state);
    let mut events = ctx.subscribe();
    ctx.gateway
        .script_unequip(Err(GatewayError::Transport("timeout".into())));

    // when
    let err = ctx
        .session
        .coordinator()
        .execute(OperationRequest::once(unequip("hat")))
        .await
        .unwrap_err();

    // then: still equipped, with an explicit rollback event
    assert_eq!(err, OperationError::Transport("timeout".into()));
    assert!(ctx.session.is_equipped(&ItemId::new("hat")));

    let optimistic = TestContext::recv_event(&mut events).await;
    assert_eq!(
        optimistic.change,
        ResourceChange::Inventory {
            item: ItemId::new("hat"),
            owned: true,
            equipped: false,
        }
    );
    let rolled_back = TestContext::recv_event(&mut events).await;
    assert!(rolled_back.is_rollback());
    assert_eq!(
        rolled_back.change,
        ResourceChange::Inventory {
            item: ItemId::new("hat"),
            owned: true,
            equipped: true,
        }
    );
}

#[tokio::test]
async fn unequip__unequipped_item_is_rejected_locally() {
    let ctx = TestContext::with_state(owned_items(&["hat"]));
    let err = ctx
        .session
        .coordinator()
        .execute(OperationRequest::once(unequip("hat")))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        OperationError::Validation(ValidationError::NotEquipped(ItemId::new("hat")))
    );
    assert!(ctx.gateway.unequip_calls().is_empty());
}
