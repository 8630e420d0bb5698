use satchel::{
    ChangePhase,
    CurrencyKind,
    EconomyConfig,
    EconomySession,
    EconomyState,
    ItemId,
    ResourceChange,
    ServerTruth,
    mirror::InMemoryMirror,
    test_helpers::{FakeGateway, TestContext, state_with_balance},
};

#[tokio::test]
async fn bootstrap__seeds_the_cache_from_the_mirror() {
    // given a snapshot persisted by a previous run
    let mirror =
        InMemoryMirror::new_with_state(state_with_balance(CurrencyKind::Hard, 12));

    // when
    let session = EconomySession::bootstrap(
        FakeGateway::new(),
        mirror,
        EconomyConfig::default(),
    )
    .unwrap();

    // then
    assert_eq!(session.balance(CurrencyKind::Hard), 12);
}

#[tokio::test]
async fn bootstrap__starts_blank_without_a_snapshot() {
    let session = EconomySession::bootstrap(
        FakeGateway::new(),
        InMemoryMirror::new(),
        EconomyConfig::default(),
    )
    .unwrap();

    assert_eq!(session.balance(CurrencyKind::Soft), 0);
    assert!(!session.owns(&ItemId::new("hat")));
}

#[tokio::test]
async fn seed_from_server__replaces_state_wholesale_and_persists() {
    // given a session carrying stale mirror state
    let ctx = TestContext::with_state(state_with_balance(CurrencyKind::Soft, 999));

    // when the full sync lands
    let mut fresh = EconomyState::default();
    fresh.balances.insert(CurrencyKind::Soft, 40);
    ctx.session.seed_from_server(fresh.clone());

    // then
    assert_eq!(ctx.session.balance(CurrencyKind::Soft), 40);
    assert_eq!(ctx.session.state(), fresh);
    assert_eq!(ctx.mirror.saved_state().unwrap(), fresh);
}

#[tokio::test]
async fn apply_confirmed__progress_push_updates_and_notifies() {
    // given
    let ctx = TestContext::new();
    let mut events = ctx.subscribe();

    // when the server pushes an achievement progress tick
    ctx.session.coordinator().apply_confirmed(ServerTruth::Progress {
        type_id: "collector".into(),
        progress: 17.0,
        level: 2,
        next_threshold: Some(25.0),
    });

    // then
    let achievement = ctx.session.achievement("collector").unwrap();
    assert_eq!(achievement.level, 2);
    assert_eq!(achievement.progress, 17.0);
    assert_eq!(achievement.next_threshold, Some(25.0));

    let event = TestContext::recv_event(&mut events).await;
    assert_eq!(event.phase, ChangePhase::Confirmed);
    assert!(matches!(
        event.change,
        ResourceChange::Achievement { level: 2, .. }
    ));
}

#[tokio::test]
async fn apply_confirmed__balance_push_emits_previous_and_current() {
    // given
    let ctx = TestContext::with_state(state_with_balance(CurrencyKind::Soft, 100));
    let mut events = ctx.subscribe();

    // when another device's purchase shows up in a server push
    ctx.session
        .coordinator()
        .apply_confirmed(ServerTruth::CurrencyBalance {
            kind: CurrencyKind::Soft,
            balance: 55,
        });

    // then
    assert_eq!(ctx.session.balance(CurrencyKind::Soft), 55);
    let event = TestContext::recv_event(&mut events).await;
    assert_eq!(
        event.change,
        ResourceChange::Currency {
            kind: CurrencyKind::Soft,
            previous: 100,
            current: 55,
        }
    );
    assert!(event.is_correction());
    assert_eq!(ctx.mirror.saved_state().unwrap().balances[&CurrencyKind::Soft], 55);
}

#[tokio::test]
async fn apply_confirmed__progress_never_drops_below_claimed_levels() {
    // given a claimed level 2
    let ctx = TestContext::new();
    ctx.session.coordinator().apply_confirmed(ServerTruth::ClaimGranted {
        type_id: "collector".into(),
        level: 2,
        currency: None,
    });

    // when a stale progress push reports a lower level
    ctx.session.coordinator().apply_confirmed(ServerTruth::Progress {
        type_id: "collector".into(),
        progress: 5.0,
        level: 1,
        next_threshold: None,
    });

    // then the level floor holds the claimed-levels invariant
    let achievement = ctx.session.achievement("collector").unwrap();
    assert_eq!(achievement.level, 2);
    assert!(achievement.claimed_levels.contains(&2));
}
