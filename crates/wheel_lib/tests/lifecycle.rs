//! End-to-end state-machine runs against an in-memory store: create, join,
//! start, timed draws, payout, abort, and the guard rails between them.

use std::sync::Arc;
use wheel_lib::fanout::EventFanout;
use wheel_lib::service::{EngineConfig, RoundService};
use wheel_lib::storage::{sqlite, Store};
use wheel_lib::types::{
    AbortReason, Account, EventPublisher, Role, RoundEvent, RoundStatus, TxKind,
};
use wheel_lib::ErrorKind;

const INITIAL: i64 = 1000;

fn config() -> EngineConfig {
    EngineConfig {
        initial_balance: INITIAL,
        min_participants: 3,
        auto_start_delay_ms: 60_000,
        elimination_interval_ms: 3_000,
        winner_pct: 70,
        admin_pct: 20,
        app_pct: 10,
    }
}

struct Harness {
    store: Arc<Store>,
    service: Arc<RoundService>,
    fanout: Arc<EventFanout>,
}

fn harness() -> Harness {
    let store = Arc::new(Store::open_in_memory().expect("open store"));
    let fanout = Arc::new(EventFanout::new(64));
    let publisher: Arc<dyn EventPublisher> = fanout.clone();
    let service = Arc::new(RoundService::new(store.clone(), publisher, config()));
    Harness {
        store,
        service,
        fanout,
    }
}

fn register(h: &Harness, name: &str, role: Role) -> Account {
    h.service
        .register_account(name, &format!("{}@example.com", name), "hash", role)
        .expect("register account")
}

fn drain(rx: &mut tokio::sync::broadcast::Receiver<RoundEvent>) -> Vec<RoundEvent> {
    let mut out = Vec::new();
    while let Ok(event) = rx.try_recv() {
        out.push(event);
    }
    out
}

#[test]
fn full_round_pays_out_the_survivor() {
    let h = harness();
    let admin = register(&h, "ada", Role::Admin);
    let users: Vec<Account> = ["u1", "u2", "u3"]
        .iter()
        .map(|n| register(&h, n, Role::User))
        .collect();

    let round = h.service.create_round(&admin.id, 100, 5).unwrap();
    assert_eq!(round.status, RoundStatus::Waiting);

    for user in &users {
        h.service.join(&round.id, &user.id).unwrap();
    }
    for user in &users {
        assert_eq!(h.service.get_balance(&user.id).unwrap(), INITIAL - 100);
    }
    let round = h.service.get_round(&round.id).unwrap();
    assert_eq!(
        (round.winner_pool, round.admin_pool, round.app_pool),
        (210, 60, 30)
    );

    h.service.start(&round.id, Some(&admin.id)).unwrap();
    h.service.eliminate_next(&round.id).unwrap();
    let done = h.service.eliminate_next(&round.id).unwrap();

    // two draws decide a three-player round; the last name is never drawn
    assert_eq!(done.status, RoundStatus::Completed);
    assert_eq!(done.elimination_index, 2);
    let winner_id = done.winner_id.clone().expect("winner recorded");
    assert_eq!(done.elimination_order.last().unwrap(), &winner_id);
    assert_eq!(done.survivor().unwrap().account_id, winner_id);

    assert_eq!(
        h.service.get_balance(&winner_id).unwrap(),
        INITIAL - 100 + 210
    );
    assert_eq!(h.service.get_balance(&admin.id).unwrap(), INITIAL + 60);
    for user in users.iter().filter(|u| u.id != winner_id) {
        assert_eq!(h.service.get_balance(&user.id).unwrap(), INITIAL - 100);
    }

    let records = sqlite::transactions_for_round(&h.store.lock(), &done.id).unwrap();
    let app_fees: Vec<_> = records
        .iter()
        .filter(|r| r.kind == TxKind::AppFee)
        .collect();
    assert_eq!(app_fees.len(), 1);
    assert_eq!(app_fees[0].amount, 30);
    assert_eq!(app_fees[0].account_id, None);

    // summed over accounts, the round nets out to the house take
    let net: i64 = records
        .iter()
        .filter(|r| r.account_id.is_some())
        .map(|r| r.amount)
        .sum();
    assert_eq!(net, -30);
}

#[test]
fn pool_split_stays_integer_exact_for_odd_fees() {
    let h = harness();
    let admin = register(&h, "ada", Role::Admin);
    let users: Vec<Account> = ["u1", "u2", "u3"]
        .iter()
        .map(|n| register(&h, n, Role::User))
        .collect();

    let round = h.service.create_round(&admin.id, 99, 3).unwrap();
    for user in &users {
        h.service.join(&round.id, &user.id).unwrap();
    }
    let round = h.service.get_round(&round.id).unwrap();
    // per join 99 splits 71/19/9 with the remainder folded into the winner pool
    assert_eq!(
        (round.winner_pool, round.admin_pool, round.app_pool),
        (213, 57, 27)
    );
    assert_eq!(
        round.winner_pool + round.admin_pool + round.app_pool,
        99 * round.participants.len() as i64
    );
}

#[test]
fn events_arrive_in_commit_order() {
    let h = harness();
    let mut lobby = h.fanout.subscribe_lobby();
    let admin = register(&h, "ada", Role::Admin);
    let users: Vec<Account> = ["u1", "u2", "u3"]
        .iter()
        .map(|n| register(&h, n, Role::User))
        .collect();

    let round = h.service.create_round(&admin.id, 100, 5).unwrap();
    let mut room = h.fanout.join_room(&round.id);
    let mut private: Vec<_> = users
        .iter()
        .map(|u| h.fanout.subscribe_account(&u.id))
        .collect();

    for user in &users {
        h.service.join(&round.id, &user.id).unwrap();
    }
    h.service.start(&round.id, Some(&admin.id)).unwrap();
    h.service.eliminate_next(&round.id).unwrap();
    h.service.eliminate_next(&round.id).unwrap();

    let lobby_events = drain(&mut lobby);
    assert_eq!(lobby_events.len(), 1);
    assert_eq!(lobby_events[0].name(), "round.created");

    let names: Vec<&str> = drain(&mut room).iter().map(|e| e.name()).collect();
    assert_eq!(
        names,
        vec![
            "round.joined",
            "round.joined",
            "round.joined",
            "round.started",
            "round.elimination",
            "round.elimination",
            "round.completed",
        ]
    );

    // exactly one private winner notice, carrying the prize
    let mut won = Vec::new();
    for rx in private.iter_mut() {
        won.extend(drain(rx));
    }
    assert_eq!(won.len(), 1);
    match &won[0] {
        RoundEvent::UserWon { prize, .. } => assert_eq!(*prize, 210),
        other => panic!("expected user.won, got {}", other.name()),
    }
}

#[test]
fn abort_refunds_and_is_final() {
    let h = harness();
    let admin = register(&h, "ada", Role::Admin);
    let u1 = register(&h, "u1", Role::User);

    let round = h.service.create_round(&admin.id, 50, 3).unwrap();
    h.service.join(&round.id, &u1.id).unwrap();
    assert_eq!(h.service.get_balance(&u1.id).unwrap(), INITIAL - 50);

    let aborted = h
        .service
        .abort(&round.id, AbortReason::InsufficientParticipants, None)
        .unwrap();
    assert_eq!(aborted.status, RoundStatus::Aborted);
    assert_eq!(
        (aborted.winner_pool, aborted.admin_pool, aborted.app_pool),
        (0, 0, 0)
    );
    assert_eq!(h.service.get_balance(&u1.id).unwrap(), INITIAL);

    // refunds cancel fees exactly
    let records = sqlite::transactions_for_round(&h.store.lock(), &round.id).unwrap();
    let sum: i64 = records.iter().map(|r| r.amount).sum();
    assert_eq!(sum, 0);
    assert!(records.iter().any(|r| r.kind == TxKind::Refund));

    // a second abort is not a second refund
    let err = h
        .service
        .abort(&round.id, AbortReason::AdminCancelled, None)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
    assert_eq!(h.service.get_balance(&u1.id).unwrap(), INITIAL);
}

#[test]
fn abort_is_rejected_once_started() {
    let h = harness();
    let admin = register(&h, "ada", Role::Admin);
    let users: Vec<Account> = ["u1", "u2", "u3"]
        .iter()
        .map(|n| register(&h, n, Role::User))
        .collect();
    let round = h.service.create_round(&admin.id, 100, 5).unwrap();
    for user in &users {
        h.service.join(&round.id, &user.id).unwrap();
    }
    h.service.start(&round.id, Some(&admin.id)).unwrap();

    let err = h
        .service
        .abort(&round.id, AbortReason::AdminCancelled, Some(&admin.id))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);

    // eliminations are binding; the round runs to completion
    h.service.eliminate_next(&round.id).unwrap();
    let done = h.service.eliminate_next(&round.id).unwrap();
    assert_eq!(done.status, RoundStatus::Completed);
}

#[test]
fn abort_authorization_is_checked() {
    let h = harness();
    let admin = register(&h, "ada", Role::Admin);
    let u1 = register(&h, "u1", Role::User);
    let round = h.service.create_round(&admin.id, 100, 3).unwrap();

    let err = h
        .service
        .abort(&round.id, AbortReason::AdminCancelled, Some(&u1.id))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);

    h.service
        .abort(&round.id, AbortReason::AdminCancelled, Some(&admin.id))
        .unwrap();
}

#[test]
fn one_active_round_at_a_time() {
    let h = harness();
    let admin = register(&h, "ada", Role::Admin);
    let other_admin = register(&h, "bea", Role::Admin);

    let round = h.service.create_round(&admin.id, 100, 5).unwrap();
    let err = h
        .service
        .create_round(&other_admin.id, 100, 5)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    // a terminal round frees the slot
    h.service
        .abort(&round.id, AbortReason::AdminCancelled, Some(&admin.id))
        .unwrap();
    h.service.create_round(&other_admin.id, 100, 5).unwrap();
}

#[test]
fn join_preconditions_map_to_error_kinds() {
    let h = harness();
    let admin = register(&h, "ada", Role::Admin);
    let users: Vec<Account> = ["u1", "u2", "u3", "u4"]
        .iter()
        .map(|n| register(&h, n, Role::User))
        .collect();

    assert_eq!(
        h.service.join("missing", &users[0].id).unwrap_err().kind(),
        ErrorKind::NotFound
    );

    let round = h.service.create_round(&admin.id, 100, 3).unwrap();

    assert_eq!(
        h.service.join(&round.id, &admin.id).unwrap_err().kind(),
        ErrorKind::Authorization
    );

    h.service.join(&round.id, &users[0].id).unwrap();
    assert_eq!(
        h.service.join(&round.id, &users[0].id).unwrap_err().kind(),
        ErrorKind::Conflict
    );

    h.service.join(&round.id, &users[1].id).unwrap();
    h.service.join(&round.id, &users[2].id).unwrap();
    assert_eq!(
        h.service.join(&round.id, &users[3].id).unwrap_err().kind(),
        ErrorKind::Conflict
    );

    h.service.start(&round.id, Some(&admin.id)).unwrap();
    assert_eq!(
        h.service.join(&round.id, &users[3].id).unwrap_err().kind(),
        ErrorKind::Conflict
    );
}

#[test]
fn join_requires_funds_and_an_active_account() {
    let h = harness();
    let admin = register(&h, "ada", Role::Admin);
    let poor = register(&h, "poor", Role::User);
    let frozen = register(&h, "frozen", Role::User);
    h.service.set_account_active(&frozen.id, false).unwrap();

    let round = h.service.create_round(&admin.id, 2000, 3).unwrap();

    assert_eq!(
        h.service.join(&round.id, &poor.id).unwrap_err().kind(),
        ErrorKind::InsufficientFunds
    );
    assert_eq!(
        h.service.join(&round.id, &frozen.id).unwrap_err().kind(),
        ErrorKind::InvalidState
    );
    // failed joins never charge
    assert_eq!(h.service.get_balance(&poor.id).unwrap(), INITIAL);
    assert_eq!(h.service.get_balance(&frozen.id).unwrap(), INITIAL);
}

#[test]
fn start_preconditions() {
    let h = harness();
    let admin = register(&h, "ada", Role::Admin);
    let u1 = register(&h, "u1", Role::User);
    let u2 = register(&h, "u2", Role::User);
    let u3 = register(&h, "u3", Role::User);
    let round = h.service.create_round(&admin.id, 100, 5).unwrap();

    h.service.join(&round.id, &u1.id).unwrap();
    h.service.join(&round.id, &u2.id).unwrap();
    assert_eq!(
        h.service
            .start(&round.id, Some(&admin.id))
            .unwrap_err()
            .kind(),
        ErrorKind::NotEnoughParticipants
    );

    h.service.join(&round.id, &u3.id).unwrap();
    assert_eq!(
        h.service.start(&round.id, Some(&u1.id)).unwrap_err().kind(),
        ErrorKind::Authorization
    );

    h.service.start(&round.id, Some(&admin.id)).unwrap();
    assert_eq!(
        h.service
            .start(&round.id, Some(&admin.id))
            .unwrap_err()
            .kind(),
        ErrorKind::InvalidState
    );
}

#[test]
fn elimination_order_is_a_permutation_of_participants() {
    let h = harness();
    let admin = register(&h, "ada", Role::Admin);
    let users: Vec<Account> = ["u1", "u2", "u3", "u4", "u5"]
        .iter()
        .map(|n| register(&h, n, Role::User))
        .collect();
    let round = h.service.create_round(&admin.id, 100, 5).unwrap();
    for user in &users {
        h.service.join(&round.id, &user.id).unwrap();
    }
    let started = h.service.start(&round.id, Some(&admin.id)).unwrap();

    let mut order = started.elimination_order.clone();
    let mut ids: Vec<String> = started
        .participants
        .iter()
        .map(|p| p.account_id.clone())
        .collect();
    order.sort();
    ids.sort();
    assert_eq!(order, ids);

    // draws consume the order front to back, positions dense from 1
    let mut last = started;
    for expected in 1..=4u32 {
        last = h.service.eliminate_next(&round.id).unwrap();
        let victim = &last.elimination_order[(expected - 1) as usize];
        assert_eq!(
            last.participant(victim).unwrap().elimination_position,
            Some(expected)
        );
    }
    assert_eq!(last.status, RoundStatus::Completed);
    assert_eq!(last.remaining(), 1);
}

#[test]
fn balances_reconstruct_from_the_ledger() {
    let h = harness();
    let admin = register(&h, "ada", Role::Admin);
    let users: Vec<Account> = ["u1", "u2", "u3"]
        .iter()
        .map(|n| register(&h, n, Role::User))
        .collect();
    let round = h.service.create_round(&admin.id, 100, 5).unwrap();
    for user in &users {
        h.service.join(&round.id, &user.id).unwrap();
    }
    h.service.start(&round.id, Some(&admin.id)).unwrap();
    h.service.eliminate_next(&round.id).unwrap();
    h.service.eliminate_next(&round.id).unwrap();

    for account in users.iter().chain(std::iter::once(&admin)) {
        let records = h
            .service
            .list_transactions(&account.id, None, 1, 100)
            .unwrap();
        let sum: i64 = records.iter().map(|r| r.amount).sum();
        let balance = h.service.get_balance(&account.id).unwrap();
        assert_eq!(INITIAL + sum, balance, "account {}", account.name);
        assert!(balance >= 0);
    }
}

#[test]
fn can_join_reports_the_first_failing_precondition() {
    let h = harness();
    let admin = register(&h, "ada", Role::Admin);
    let u1 = register(&h, "u1", Role::User);
    let u2 = register(&h, "u2", Role::User);
    let round = h.service.create_round(&admin.id, 100, 3).unwrap();

    assert!(h.service.can_join(&round.id, &u1.id).is_ok());
    assert_eq!(
        h.service.can_join(&round.id, &admin.id).unwrap_err().kind(),
        ErrorKind::Authorization
    );

    h.service.join(&round.id, &u1.id).unwrap();
    assert_eq!(
        h.service.can_join(&round.id, &u1.id).unwrap_err().kind(),
        ErrorKind::Conflict
    );
    // a dry-run does not charge
    assert!(h.service.can_join(&round.id, &u2.id).is_ok());
    assert_eq!(h.service.get_balance(&u2.id).unwrap(), INITIAL);
}

#[test]
fn history_and_membership_queries() {
    let h = harness();
    let admin = register(&h, "ada", Role::Admin);
    let u1 = register(&h, "u1", Role::User);

    let first = h.service.create_round(&admin.id, 100, 3).unwrap();
    h.service.join(&first.id, &u1.id).unwrap();
    h.service
        .abort(&first.id, AbortReason::AdminCancelled, Some(&admin.id))
        .unwrap();
    let second = h.service.create_round(&admin.id, 100, 3).unwrap();

    let all = h.service.list_history(None, 1, 10).unwrap();
    assert_eq!(all.len(), 2);
    // newest first
    assert_eq!(all[0].id, second.id);

    let aborted = h
        .service
        .list_history(Some(RoundStatus::Aborted), 1, 10)
        .unwrap();
    assert_eq!(aborted.len(), 1);
    assert_eq!(aborted[0].id, first.id);

    let mine = h.service.list_my_rounds(&u1.id, 1, 10).unwrap();
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].id, first.id);

    assert!(h.service.active_round().unwrap().is_some());
}
