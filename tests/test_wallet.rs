use nivo::clock;
use nivo::db;
use nivo::wallet::limits::{self, DEFAULT_DAILY_LIMIT};
use nivo::wallet::store::{self, WalletStatus, WalletType};
use nivo::wallet::transfer::{self, DepositRequest, TransferRequest};
use nivo::wallet::{SCHEMA, WalletError};

// ── Helpers ─────────────────────────────────────────────────────────

async fn active_wallet(db: &db::Db, user_id: &str) -> String {
    let conn = db.lock().await;
    let wallet = store::create_wallet(&conn, user_id, WalletType::Default, "INR").unwrap();
    store::activate(&conn, &wallet.id, "acct-liab").unwrap();
    wallet.id
}

async fn fund(db: &db::Db, wallet_id: &str, amount: i64) {
    let mut conn = db.lock().await;
    transfer::execute_deposit(
        &mut conn,
        &DepositRequest {
            transaction_id: format!("fund-{wallet_id}-{amount}"),
            wallet_id: wallet_id.to_string(),
            amount,
        },
    )
    .unwrap();
}

fn transfer_req(id: &str, source: &str, destination: &str, amount: i64) -> TransferRequest {
    TransferRequest {
        transaction_id: id.to_string(),
        source_wallet_id: source.to_string(),
        destination_wallet_id: destination.to_string(),
        amount,
    }
}

// ── Lifecycle ───────────────────────────────────────────────────────

#[tokio::test]
async fn lifecycle_transitions_are_enforced() {
    let db = db::open_in_memory(SCHEMA).unwrap();
    let conn = db.lock().await;

    let wallet = store::create_wallet(&conn, "u1", WalletType::Default, "INR").unwrap();
    assert_eq!(wallet.status, WalletStatus::Inactive);
    assert!(wallet.vpa.is_none());

    // Freeze before activation is illegal.
    let err = store::freeze(&conn, &wallet.id, "suspicious activity").unwrap_err();
    assert!(matches!(err, WalletError::InvalidTransition { .. }));

    let active = store::activate(&conn, &wallet.id, "acct-liab").unwrap();
    assert_eq!(active.status, WalletStatus::Active);
    assert!(active.vpa.as_deref().unwrap().ends_with("@nivo"));
    assert_eq!(active.ledger_account_id.as_deref(), Some("acct-liab"));

    // Double activation is illegal.
    let err = store::activate(&conn, &wallet.id, "acct-liab").unwrap_err();
    assert!(matches!(err, WalletError::InvalidTransition { .. }));

    let err = store::freeze(&conn, &wallet.id, "short").unwrap_err();
    assert!(matches!(err, WalletError::ReasonTooShort));

    let frozen = store::freeze(&conn, &wallet.id, "suspicious activity").unwrap();
    assert_eq!(frozen.status, WalletStatus::Frozen);
    let thawed = store::unfreeze(&conn, &wallet.id, "cleared by compliance").unwrap();
    assert_eq!(thawed.status, WalletStatus::Active);

    let closed = store::close(&conn, &wallet.id, "customer request").unwrap();
    assert_eq!(closed.status, WalletStatus::Closed);
    assert!(closed.closed_at.is_some());
}

#[tokio::test]
async fn one_open_wallet_per_user_type_currency() {
    let db = db::open_in_memory(SCHEMA).unwrap();
    let conn = db.lock().await;

    store::create_wallet(&conn, "u1", WalletType::Default, "INR").unwrap();
    let err = store::create_wallet(&conn, "u1", WalletType::Default, "INR").unwrap_err();
    assert!(matches!(err, WalletError::DuplicateWallet));

    // Different type is fine; so is the same type after closing.
    store::create_wallet(&conn, "u1", WalletType::Savings, "INR").unwrap();
}

#[tokio::test]
async fn close_requires_zero_balance() {
    let db = db::open_in_memory(SCHEMA).unwrap();
    let id = active_wallet(&db, "u1").await;
    fund(&db, &id, 1000).await;

    let conn = db.lock().await;
    let err = store::close(&conn, &id, "customer request").unwrap_err();
    assert!(matches!(err, WalletError::NonZeroBalance));
}

// ── Transfers ───────────────────────────────────────────────────────

#[tokio::test]
async fn transfer_conserves_total_and_tracks_spend() {
    let db = db::open_in_memory(SCHEMA).unwrap();
    let source = active_wallet(&db, "u1").await;
    let destination = active_wallet(&db, "u2").await;
    fund(&db, &source, 100_000).await;

    {
        let mut conn = db.lock().await;
        let outcome = transfer::execute_transfer(
            &mut conn,
            &transfer_req("txn-1", &source, &destination, 60_000),
        )
        .unwrap();
        assert!(outcome.applied);
    }

    let conn = db.lock().await;
    let src = store::get_wallet(&conn, &source).unwrap();
    let dst = store::get_wallet(&conn, &destination).unwrap();
    assert_eq!(src.balance, 40_000);
    assert_eq!(src.available_balance, 40_000);
    assert_eq!(dst.balance, 60_000);
    assert_eq!(src.balance + dst.balance, 100_000);

    let window = limits::effective(&conn, &source, clock::unix_now()).unwrap();
    assert_eq!(window.daily_spent, 60_000);
    assert_eq!(window.monthly_spent, 60_000);
}

#[tokio::test]
async fn opposite_transfer_restores_both_balances() {
    let db = db::open_in_memory(SCHEMA).unwrap();
    let source = active_wallet(&db, "u1").await;
    let destination = active_wallet(&db, "u2").await;
    fund(&db, &source, 100_000).await;
    fund(&db, &destination, 20_000).await;

    {
        let mut conn = db.lock().await;
        transfer::execute_transfer(
            &mut conn,
            &transfer_req("txn-fwd", &source, &destination, 45_000),
        )
        .unwrap();
        // The reversal runs the same path with wallets swapped and its
        // own idempotency key.
        transfer::execute_transfer(
            &mut conn,
            &transfer_req("txn-rev", &destination, &source, 45_000),
        )
        .unwrap();
    }

    let conn = db.lock().await;
    assert_eq!(store::get_wallet(&conn, &source).unwrap().balance, 100_000);
    assert_eq!(store::get_wallet(&conn, &destination).unwrap().balance, 20_000);
}

#[tokio::test]
async fn transfer_replay_is_a_no_op() {
    let db = db::open_in_memory(SCHEMA).unwrap();
    let source = active_wallet(&db, "u1").await;
    let destination = active_wallet(&db, "u2").await;
    fund(&db, &source, 100_000).await;

    let req = transfer_req("txn-x", &source, &destination, 30_000);
    for attempt in 0..3 {
        let mut conn = db.lock().await;
        let outcome = transfer::execute_transfer(&mut conn, &req).unwrap();
        assert_eq!(outcome.applied, attempt == 0);
    }

    let conn = db.lock().await;
    assert_eq!(store::get_wallet(&conn, &source).unwrap().balance, 70_000);
    assert_eq!(store::get_wallet(&conn, &destination).unwrap().balance, 30_000);

    let rows: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM processed_transfers WHERE transaction_id = 'txn-x'",
            [],
            |r| r.get(0),
        )
        .unwrap();
    assert_eq!(rows, 1);
}

#[tokio::test]
async fn transfer_preconditions_abort_without_side_effects() {
    let db = db::open_in_memory(SCHEMA).unwrap();
    let source = active_wallet(&db, "u1").await;
    let destination = active_wallet(&db, "u2").await;
    fund(&db, &source, 10_000).await;

    let mut conn = db.lock().await;

    let err = transfer::execute_transfer(
        &mut conn,
        &transfer_req("t1", &source, &destination, 50_000),
    )
    .unwrap_err();
    assert!(matches!(err, WalletError::InsufficientFunds { .. }));

    let err =
        transfer::execute_transfer(&mut conn, &transfer_req("t2", &source, &source, 100))
            .unwrap_err();
    assert!(matches!(err, WalletError::SameWallet));

    let err = transfer::execute_transfer(
        &mut conn,
        &transfer_req("t3", &source, &destination, 0),
    )
    .unwrap_err();
    assert!(matches!(err, WalletError::InvalidAmount));

    // Balances untouched and nothing recorded.
    assert_eq!(store::get_wallet(&conn, &source).unwrap().balance, 10_000);
    let rows: i64 = conn
        .query_row("SELECT COUNT(*) FROM processed_transfers", [], |r| r.get(0))
        .unwrap();
    assert_eq!(rows, 0);
}

#[tokio::test]
async fn frozen_wallets_refuse_transfers() {
    let db = db::open_in_memory(SCHEMA).unwrap();
    let source = active_wallet(&db, "u1").await;
    let destination = active_wallet(&db, "u2").await;
    fund(&db, &source, 10_000).await;

    {
        let conn = db.lock().await;
        store::freeze(&conn, &destination, "chargeback review").unwrap();
    }

    let mut conn = db.lock().await;
    let err = transfer::execute_transfer(
        &mut conn,
        &transfer_req("t1", &source, &destination, 1_000),
    )
    .unwrap_err();
    assert!(matches!(err, WalletError::NotActive(_)));
}

#[tokio::test]
async fn daily_limit_blocks_and_resets_at_boundary() {
    let db = db::open_in_memory(SCHEMA).unwrap();
    let id = active_wallet(&db, "u1").await;

    let conn = db.lock().await;
    let now = clock::unix_now();

    // Spend up to 95% of the daily budget.
    limits::consume(&conn, &id, DEFAULT_DAILY_LIMIT - 500_000, now).unwrap();

    let window = limits::load_for_update(&conn, &id, now).unwrap();
    assert!(limits::verify(&window, 1_000_000).is_err());
    assert!(limits::verify(&window, 400_000).is_ok());

    // Just past midnight the window is fresh, and the reset is visible
    // to the very operation that triggered it.
    let after_reset = window.daily_reset_at + 60;
    let fresh = limits::load_for_update(&conn, &id, after_reset).unwrap();
    assert_eq!(fresh.daily_spent, 0);
    assert!(fresh.daily_reset_at > after_reset);
    assert!(limits::verify(&fresh, 1_000_000).is_ok());

    limits::consume(&conn, &id, 1_000_000, after_reset).unwrap();
    let spent = limits::effective(&conn, &id, after_reset).unwrap();
    assert_eq!(spent.daily_spent, 1_000_000);
}

#[tokio::test]
async fn limit_updates_are_validated() {
    let db = db::open_in_memory(SCHEMA).unwrap();
    let id = active_wallet(&db, "u1").await;
    let conn = db.lock().await;

    let err = limits::update_limits(&conn, &id, 0, 100).unwrap_err();
    assert!(matches!(err, WalletError::InvalidLimits));
    let err = limits::update_limits(&conn, &id, 200, 100).unwrap_err();
    assert!(matches!(err, WalletError::InvalidLimits));

    let updated = limits::update_limits(&conn, &id, 100, 200).unwrap();
    assert_eq!(updated.daily_limit, 100);
    assert_eq!(updated.monthly_limit, 200);
}

// ── Withdrawals ─────────────────────────────────────────────────────

#[tokio::test]
async fn withdrawal_debits_and_is_idempotent() {
    let db = db::open_in_memory(SCHEMA).unwrap();
    let id = active_wallet(&db, "u1").await;
    fund(&db, &id, 50_000).await;

    let req = DepositRequest {
        transaction_id: "wd-1".to_string(),
        wallet_id: id.clone(),
        amount: 20_000,
    };
    {
        let mut conn = db.lock().await;
        assert!(transfer::execute_withdrawal(&mut conn, &req).unwrap().applied);
        assert!(!transfer::execute_withdrawal(&mut conn, &req).unwrap().applied);
    }

    let conn = db.lock().await;
    let wallet = store::get_wallet(&conn, &id).unwrap();
    assert_eq!(wallet.balance, 30_000);
    let window = limits::effective(&conn, &id, clock::unix_now()).unwrap();
    assert_eq!(window.daily_spent, 20_000);
}

// ── Holds ───────────────────────────────────────────────────────────

#[tokio::test]
async fn holds_reserve_available_balance_only() {
    let db = db::open_in_memory(SCHEMA).unwrap();
    let id = active_wallet(&db, "u1").await;
    fund(&db, &id, 100_000).await;

    let conn = db.lock().await;
    let hold = store::place_hold(&conn, &id, 40_000, Some("card authorization")).unwrap();

    let wallet = store::get_wallet(&conn, &id).unwrap();
    assert_eq!(wallet.balance, 100_000);
    assert_eq!(wallet.available_balance, 60_000);

    // Only the remaining headroom can be held.
    let err = store::place_hold(&conn, &id, 70_000, None).unwrap_err();
    assert!(matches!(err, WalletError::InsufficientFunds { .. }));

    store::release_hold(&conn, &id, &hold.id).unwrap();
    let wallet = store::get_wallet(&conn, &id).unwrap();
    assert_eq!(wallet.available_balance, 100_000);

    // Releasing twice fails.
    let err = store::release_hold(&conn, &id, &hold.id).unwrap_err();
    assert!(matches!(err, WalletError::HoldNotFound));
}

#[tokio::test]
async fn held_funds_cannot_be_transferred() {
    let db = db::open_in_memory(SCHEMA).unwrap();
    let source = active_wallet(&db, "u1").await;
    let destination = active_wallet(&db, "u2").await;
    fund(&db, &source, 100_000).await;

    {
        let conn = db.lock().await;
        store::place_hold(&conn, &source, 80_000, None).unwrap();
    }

    let mut conn = db.lock().await;
    let err = transfer::execute_transfer(
        &mut conn,
        &transfer_req("t1", &source, &destination, 50_000),
    )
    .unwrap_err();
    assert!(matches!(err, WalletError::InsufficientFunds { .. }));
}

// ── UPI intents ─────────────────────────────────────────────────────

#[tokio::test]
async fn upi_intent_completion_drives_the_deposit_path() {
    let db = db::open_in_memory(SCHEMA).unwrap();
    let id = active_wallet(&db, "u1").await;

    let intent = {
        let conn = db.lock().await;
        transfer::create_upi_intent(&conn, &id, 25_000).unwrap()
    };
    assert!(intent.vpa.ends_with("@nivo"));
    assert!(intent.expires_at > clock::unix_now());

    let completed = {
        let mut conn = db.lock().await;
        transfer::complete_upi_intent(&mut conn, &intent.id).unwrap()
    };
    assert_eq!(completed.status, transfer::IntentStatus::Completed);

    let conn = db.lock().await;
    assert_eq!(store::get_wallet(&conn, &id).unwrap().balance, 25_000);

    // The callback is not replayable.
    drop(conn);
    let mut conn = db.lock().await;
    let err = transfer::complete_upi_intent(&mut conn, &intent.id).unwrap_err();
    assert!(matches!(err, WalletError::IntentNotPending));
}

#[tokio::test]
async fn expired_upi_intent_is_rejected() {
    let db = db::open_in_memory(SCHEMA).unwrap();
    let id = active_wallet(&db, "u1").await;

    let intent = {
        let conn = db.lock().await;
        transfer::create_upi_intent(&conn, &id, 25_000).unwrap()
    };
    {
        let conn = db.lock().await;
        conn.execute(
            "UPDATE upi_intents SET expires_at = ?1 WHERE id = ?2",
            rusqlite::params![clock::unix_now() - 1, intent.id],
        )
        .unwrap();
    }

    let mut conn = db.lock().await;
    let err = transfer::complete_upi_intent(&mut conn, &intent.id).unwrap_err();
    assert!(matches!(err, WalletError::IntentExpired));

    let refreshed = transfer::get_upi_intent(&conn, &intent.id).unwrap();
    assert_eq!(refreshed.status, transfer::IntentStatus::Expired);
    assert_eq!(store::get_wallet(&conn, &id).unwrap().balance, 0);
}
