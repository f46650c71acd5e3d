use nivo::db;
use nivo::ledger::accounts::{
    self, AccountFilter, AccountStatus, AccountType, CreateAccountRequest, UpdateAccountRequest,
};
use nivo::ledger::entries::{self, CreateEntryRequest, EntryStatus, EntryType, LedgerLine};
use nivo::ledger::{LedgerError, SCHEMA};

// ── Helpers ─────────────────────────────────────────────────────────

fn account_req(code: &str, account_type: AccountType) -> CreateAccountRequest {
    CreateAccountRequest {
        code: code.to_string(),
        name: format!("{code} account"),
        account_type,
        currency: "INR".to_string(),
        parent_account_id: None,
        metadata: None,
    }
}

fn line(account_id: &str, debit: i64, credit: i64) -> LedgerLine {
    LedgerLine {
        account_id: account_id.to_string(),
        debit,
        credit,
        description: None,
    }
}

fn entry_req(lines: Vec<LedgerLine>) -> CreateEntryRequest {
    CreateEntryRequest {
        entry_type: EntryType::Standard,
        description: "test movement".to_string(),
        reference_type: Some("transaction".to_string()),
        reference_id: Some("txn-1".to_string()),
        metadata: None,
        lines,
    }
}

// ── Accounts ────────────────────────────────────────────────────────

#[tokio::test]
async fn duplicate_account_code_is_rejected() {
    let db = db::open_in_memory(SCHEMA).unwrap();
    let conn = db.lock().await;

    accounts::create_account(&conn, &account_req("1001", AccountType::Asset)).unwrap();
    let err = accounts::create_account(&conn, &account_req("1001", AccountType::Liability))
        .unwrap_err();
    assert!(matches!(err, LedgerError::DuplicateCode(_)));
}

#[tokio::test]
async fn update_touches_only_mutable_fields() {
    let db = db::open_in_memory(SCHEMA).unwrap();
    let conn = db.lock().await;

    let account = accounts::create_account(&conn, &account_req("1001", AccountType::Asset)).unwrap();
    let updated = accounts::update_account(
        &conn,
        &account.id,
        &UpdateAccountRequest {
            name: Some("renamed".to_string()),
            status: Some(AccountStatus::Inactive),
            metadata: None,
        },
    )
    .unwrap();

    assert_eq!(updated.name, "renamed");
    assert_eq!(updated.status, AccountStatus::Inactive);
    assert_eq!(updated.code, "1001");
    assert_eq!(updated.balance, 0);
}

#[tokio::test]
async fn list_filters_by_type() {
    let db = db::open_in_memory(SCHEMA).unwrap();
    let conn = db.lock().await;

    accounts::create_account(&conn, &account_req("2001", AccountType::Liability)).unwrap();
    accounts::create_account(&conn, &account_req("2002", AccountType::Liability)).unwrap();

    let filter = AccountFilter {
        account_type: Some(AccountType::Liability),
        ..Default::default()
    };
    let listed = accounts::list_accounts(&conn, &filter).unwrap();
    assert_eq!(listed.len(), 2);
    assert!(listed.iter().all(|a| a.account_type == AccountType::Liability));
}

// ── Journal entries ─────────────────────────────────────────────────

#[tokio::test]
async fn posting_applies_balances_by_normality() {
    let db = db::open_in_memory(SCHEMA).unwrap();
    let mut conn = db.lock().await;

    let cash = accounts::create_account(&conn, &account_req("1001", AccountType::Asset)).unwrap();
    let wallet =
        accounts::create_account(&conn, &account_req("2001", AccountType::Liability)).unwrap();

    // Deposit shape: debit cash, credit the wallet liability.
    let entry = entries::create_entry(
        &mut conn,
        &entry_req(vec![line(&cash.id, 500_000, 0), line(&wallet.id, 0, 500_000)]),
    )
    .unwrap();
    assert_eq!(entry.status, EntryStatus::Draft);

    // Creation alone must not move balances.
    assert_eq!(accounts::get_account(&conn, &cash.id).unwrap().balance, 0);

    let posted = entries::post_entry(&mut conn, &entry.id, "tester").unwrap();
    assert_eq!(posted.status, EntryStatus::Posted);
    assert!(posted.posted_at.is_some());

    let cash = accounts::get_account(&conn, &cash.id).unwrap();
    let wallet = accounts::get_account(&conn, &wallet.id).unwrap();
    assert_eq!(cash.balance, 500_000);
    assert_eq!(cash.total_debits, 500_000);
    assert_eq!(wallet.balance, 500_000);
    assert_eq!(wallet.total_credits, 500_000);
}

#[tokio::test]
async fn entry_numbers_are_year_scoped_and_monotonic() {
    let db = db::open_in_memory(SCHEMA).unwrap();
    let mut conn = db.lock().await;

    let a = accounts::create_account(&conn, &account_req("1001", AccountType::Asset)).unwrap();
    let b = accounts::create_account(&conn, &account_req("2001", AccountType::Liability)).unwrap();

    let year = chrono::Utc::now().format("%Y").to_string();
    let first = entries::create_entry(
        &mut conn,
        &entry_req(vec![line(&a.id, 100, 0), line(&b.id, 0, 100)]),
    )
    .unwrap();
    let second = entries::create_entry(
        &mut conn,
        &entry_req(vec![line(&a.id, 100, 0), line(&b.id, 0, 100)]),
    )
    .unwrap();

    assert_eq!(first.entry_number, format!("JE-{year}-00001"));
    assert_eq!(second.entry_number, format!("JE-{year}-00002"));
}

#[tokio::test]
async fn unbalanced_entries_cannot_post() {
    let db = db::open_in_memory(SCHEMA).unwrap();
    let mut conn = db.lock().await;

    let a = accounts::create_account(&conn, &account_req("1001", AccountType::Asset)).unwrap();
    let b = accounts::create_account(&conn, &account_req("2001", AccountType::Liability)).unwrap();

    let entry = entries::create_entry(
        &mut conn,
        &entry_req(vec![line(&a.id, 300, 0), line(&b.id, 0, 200)]),
    )
    .unwrap();
    let err = entries::post_entry(&mut conn, &entry.id, "tester").unwrap_err();
    assert!(matches!(
        err,
        LedgerError::Unbalanced {
            debits: 300,
            credits: 200
        }
    ));

    // Nothing was applied.
    assert_eq!(accounts::get_account(&conn, &a.id).unwrap().balance, 0);
}

#[tokio::test]
async fn line_shape_is_validated_at_create() {
    let db = db::open_in_memory(SCHEMA).unwrap();
    let mut conn = db.lock().await;

    let a = accounts::create_account(&conn, &account_req("1001", AccountType::Asset)).unwrap();
    let b = accounts::create_account(&conn, &account_req("2001", AccountType::Liability)).unwrap();

    let err = entries::create_entry(&mut conn, &entry_req(vec![line(&a.id, 100, 0)])).unwrap_err();
    assert!(matches!(err, LedgerError::TooFewLines));

    let err = entries::create_entry(
        &mut conn,
        &entry_req(vec![line(&a.id, 100, 100), line(&b.id, 0, 100)]),
    )
    .unwrap_err();
    assert!(matches!(err, LedgerError::OneSidedLine(0)));

    let err = entries::create_entry(
        &mut conn,
        &entry_req(vec![line(&a.id, 0, 0), line(&b.id, 0, 100)]),
    )
    .unwrap_err();
    assert!(matches!(err, LedgerError::OneSidedLine(0)));
}

#[tokio::test]
async fn posting_requires_active_accounts_and_draft_status() {
    let db = db::open_in_memory(SCHEMA).unwrap();
    let mut conn = db.lock().await;

    let a = accounts::create_account(&conn, &account_req("1001", AccountType::Asset)).unwrap();
    let b = accounts::create_account(&conn, &account_req("2001", AccountType::Liability)).unwrap();

    let entry = entries::create_entry(
        &mut conn,
        &entry_req(vec![line(&a.id, 100, 0), line(&b.id, 0, 100)]),
    )
    .unwrap();

    accounts::update_account(
        &conn,
        &b.id,
        &UpdateAccountRequest {
            name: None,
            status: Some(AccountStatus::Inactive),
            metadata: None,
        },
    )
    .unwrap();
    let err = entries::post_entry(&mut conn, &entry.id, "tester").unwrap_err();
    assert!(matches!(err, LedgerError::AccountNotActive(_)));

    accounts::update_account(
        &conn,
        &b.id,
        &UpdateAccountRequest {
            name: None,
            status: Some(AccountStatus::Active),
            metadata: None,
        },
    )
    .unwrap();
    entries::post_entry(&mut conn, &entry.id, "tester").unwrap();

    // A second post attempt is a state-machine violation.
    let err = entries::post_entry(&mut conn, &entry.id, "tester").unwrap_err();
    assert!(matches!(err, LedgerError::WrongStatus { .. }));
}

#[tokio::test]
async fn voiding_undoes_balance_effects() {
    let db = db::open_in_memory(SCHEMA).unwrap();
    let mut conn = db.lock().await;

    let a = accounts::create_account(&conn, &account_req("1001", AccountType::Asset)).unwrap();
    let b = accounts::create_account(&conn, &account_req("2001", AccountType::Liability)).unwrap();

    let entry = entries::create_entry(
        &mut conn,
        &entry_req(vec![line(&a.id, 250_000, 0), line(&b.id, 0, 250_000)]),
    )
    .unwrap();
    entries::post_entry(&mut conn, &entry.id, "tester").unwrap();

    let err = entries::void_entry(&mut conn, &entry.id, "tester", "short").unwrap_err();
    assert!(matches!(err, LedgerError::BadReason));

    let voided =
        entries::void_entry(&mut conn, &entry.id, "tester", "operational correction").unwrap();
    assert_eq!(voided.status, EntryStatus::Voided);
    assert_eq!(voided.void_reason.as_deref(), Some("operational correction"));

    assert_eq!(accounts::get_account(&conn, &a.id).unwrap().balance, 0);
    assert_eq!(accounts::get_account(&conn, &b.id).unwrap().balance, 0);

    // Voided entries cannot be voided again.
    let err =
        entries::void_entry(&mut conn, &entry.id, "tester", "operational correction").unwrap_err();
    assert!(matches!(err, LedgerError::WrongStatus { .. }));
}

#[tokio::test]
async fn reversal_swaps_lines_and_links_entries() {
    let db = db::open_in_memory(SCHEMA).unwrap();
    let mut conn = db.lock().await;

    let a = accounts::create_account(&conn, &account_req("1001", AccountType::Asset)).unwrap();
    let b = accounts::create_account(&conn, &account_req("2001", AccountType::Liability)).unwrap();

    let entry = entries::create_entry(
        &mut conn,
        &entry_req(vec![line(&a.id, 70_000, 0), line(&b.id, 0, 70_000)]),
    )
    .unwrap();
    entries::post_entry(&mut conn, &entry.id, "tester").unwrap();

    let reversal =
        entries::reverse_entry(&mut conn, &entry.id, "tester", Some("customer dispute")).unwrap();
    assert_eq!(reversal.entry_type, EntryType::Reversing);
    assert_eq!(reversal.status, EntryStatus::Posted);
    assert_eq!(reversal.lines[0].account_id, a.id);
    assert_eq!(reversal.lines[0].credit, 70_000);
    assert_eq!(reversal.lines[1].debit, 70_000);

    let original = entries::get_entry(&conn, &entry.id).unwrap();
    assert_eq!(original.status, EntryStatus::Reversed);
    assert_eq!(original.reversal_entry_id.as_deref(), Some(reversal.id.as_str()));

    // Net effect is zero.
    assert_eq!(accounts::get_account(&conn, &a.id).unwrap().balance, 0);
    assert_eq!(accounts::get_account(&conn, &b.id).unwrap().balance, 0);

    // A reversed entry cannot be reversed again.
    let err = entries::reverse_entry(&mut conn, &entry.id, "tester", None).unwrap_err();
    assert!(matches!(err, LedgerError::WrongStatus { .. }));
}

#[tokio::test]
async fn lines_on_one_account_coalesce() {
    let db = db::open_in_memory(SCHEMA).unwrap();
    let mut conn = db.lock().await;

    let a = accounts::create_account(&conn, &account_req("1001", AccountType::Asset)).unwrap();
    let b = accounts::create_account(&conn, &account_req("2001", AccountType::Liability)).unwrap();

    let entry = entries::create_entry(
        &mut conn,
        &entry_req(vec![
            line(&a.id, 100, 0),
            line(&a.id, 200, 0),
            line(&b.id, 0, 300),
        ]),
    )
    .unwrap();
    entries::post_entry(&mut conn, &entry.id, "tester").unwrap();

    let a = accounts::get_account(&conn, &a.id).unwrap();
    assert_eq!(a.balance, 300);
    assert_eq!(a.total_debits, 300);
}
