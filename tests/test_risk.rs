use serde_json::json;

use nivo::db;
use nivo::risk::rules::{
    self, CreateRuleRequest, EvaluateRequest, EventFilter, RiskAction, RuleType,
    UpdateRuleRequest,
};
use nivo::risk::{RiskError, SCHEMA};

// ── Helpers ─────────────────────────────────────────────────────────

fn evaluate_req(transaction_id: &str, user_id: &str, amount: i64) -> EvaluateRequest {
    EvaluateRequest {
        transaction_id: transaction_id.to_string(),
        user_id: user_id.to_string(),
        amount,
        currency: "INR".to_string(),
        transaction_type: Some("transfer".to_string()),
        source_wallet_id: None,
        destination_wallet_id: None,
    }
}

fn threshold_rule(name: &str, max_amount: i64, action: RiskAction) -> CreateRuleRequest {
    CreateRuleRequest {
        rule_type: RuleType::Threshold,
        name: name.to_string(),
        parameters: json!({ "max_amount": max_amount, "currency": "INR" }),
        action,
        enabled: true,
    }
}

// ── Rule store ──────────────────────────────────────────────────────

#[tokio::test]
async fn rule_names_are_unique_and_parameters_validated() {
    let db = db::open_in_memory(SCHEMA).unwrap();
    let conn = db.lock().await;

    rules::create_rule(&conn, &threshold_rule("large-txn", 50_000, RiskAction::Block)).unwrap();
    let err = rules::create_rule(&conn, &threshold_rule("large-txn", 90_000, RiskAction::Flag))
        .unwrap_err();
    assert!(matches!(err, RiskError::DuplicateName(_)));

    let err = rules::create_rule(
        &conn,
        &CreateRuleRequest {
            rule_type: RuleType::Velocity,
            name: "bad-params".to_string(),
            parameters: json!({ "max_amount": 1 }),
            action: RiskAction::Flag,
            enabled: true,
        },
    )
    .unwrap_err();
    assert!(matches!(err, RiskError::BadParameters(_)));
}

#[tokio::test]
async fn disabled_rules_do_not_fire() {
    let db = db::open_in_memory(SCHEMA).unwrap();

    let rule = {
        let conn = db.lock().await;
        rules::create_rule(&conn, &threshold_rule("large-txn", 50_000, RiskAction::Block)).unwrap()
    };
    {
        let conn = db.lock().await;
        rules::update_rule(
            &conn,
            &rule.id,
            &UpdateRuleRequest {
                parameters: None,
                action: None,
                enabled: Some(false),
            },
        )
        .unwrap();
    }

    let mut conn = db.lock().await;
    let verdict = rules::evaluate(&mut conn, &evaluate_req("t1", "u1", 999_999)).unwrap();
    assert_eq!(verdict.action, RiskAction::Allow);
    assert!(verdict.triggered_rules.is_empty());
}

// ── Evaluation ──────────────────────────────────────────────────────

#[tokio::test]
async fn threshold_blocks_and_scores_percent_over() {
    let db = db::open_in_memory(SCHEMA).unwrap();
    {
        let conn = db.lock().await;
        rules::create_rule(&conn, &threshold_rule("large-txn", 50_000, RiskAction::Block))
            .unwrap();
    }

    let mut conn = db.lock().await;
    let verdict = rules::evaluate(&mut conn, &evaluate_req("t1", "u1", 60_000)).unwrap();

    assert_eq!(verdict.action, RiskAction::Block);
    // 20% over threshold: 60 + 20/20 = 61.
    assert_eq!(verdict.score, 61);
    assert!(verdict.reason.as_deref().unwrap().contains("exceeds threshold"));
    assert_eq!(verdict.triggered_rules.len(), 1);

    // Currency-filtered: a USD movement sails past an INR threshold.
    let mut req = evaluate_req("t2", "u1", 60_000);
    req.currency = "USD".to_string();
    let verdict = rules::evaluate(&mut conn, &req).unwrap();
    assert_eq!(verdict.action, RiskAction::Allow);
}

#[tokio::test]
async fn threshold_score_is_capped_at_100() {
    let db = db::open_in_memory(SCHEMA).unwrap();
    {
        let conn = db.lock().await;
        rules::create_rule(&conn, &threshold_rule("large-txn", 1_000, RiskAction::Block)).unwrap();
    }

    let mut conn = db.lock().await;
    let verdict = rules::evaluate(&mut conn, &evaluate_req("t1", "u1", 10_000_000)).unwrap();
    assert_eq!(verdict.score, 100);
}

#[tokio::test]
async fn velocity_counts_recent_events() {
    let db = db::open_in_memory(SCHEMA).unwrap();
    {
        let conn = db.lock().await;
        rules::create_rule(
            &conn,
            &CreateRuleRequest {
                rule_type: RuleType::Velocity,
                name: "burst".to_string(),
                parameters: json!({ "window_minutes": 60, "max_transactions": 3 }),
                action: RiskAction::Flag,
                enabled: true,
            },
        )
        .unwrap();
    }

    let mut conn = db.lock().await;
    for i in 0..3 {
        let verdict =
            rules::evaluate(&mut conn, &evaluate_req(&format!("t{i}"), "u1", 100)).unwrap();
        assert_eq!(verdict.action, RiskAction::Allow);
    }

    // Three prior events in the window: the fourth movement fires.
    let verdict = rules::evaluate(&mut conn, &evaluate_req("t3", "u1", 100)).unwrap();
    assert_eq!(verdict.action, RiskAction::Flag);
    assert_eq!(verdict.score, 70);

    // A different user is unaffected.
    let verdict = rules::evaluate(&mut conn, &evaluate_req("t4", "u2", 100)).unwrap();
    assert_eq!(verdict.action, RiskAction::Allow);
}

#[tokio::test]
async fn daily_limit_sums_allowed_amounts() {
    let db = db::open_in_memory(SCHEMA).unwrap();
    {
        let conn = db.lock().await;
        rules::create_rule(
            &conn,
            &CreateRuleRequest {
                rule_type: RuleType::DailyLimit,
                name: "daily-cap".to_string(),
                parameters: json!({ "max_amount": 100_000, "currency": "INR" }),
                action: RiskAction::Block,
                enabled: true,
            },
        )
        .unwrap();
    }

    let mut conn = db.lock().await;
    let verdict = rules::evaluate(&mut conn, &evaluate_req("t1", "u1", 60_000)).unwrap();
    assert_eq!(verdict.action, RiskAction::Allow);

    // 60k allowed today + 50k now = 110k > 100k: 10% over, 80 + 1.
    let verdict = rules::evaluate(&mut conn, &evaluate_req("t2", "u1", 50_000)).unwrap();
    assert_eq!(verdict.action, RiskAction::Block);
    assert_eq!(verdict.score, 81);
}

#[tokio::test]
async fn block_outranks_flag_and_reason_follows_severity() {
    let db = db::open_in_memory(SCHEMA).unwrap();
    {
        let conn = db.lock().await;
        rules::create_rule(&conn, &threshold_rule("flag-small", 1_000, RiskAction::Flag)).unwrap();
        rules::create_rule(&conn, &threshold_rule("block-large", 50_000, RiskAction::Block))
            .unwrap();
    }

    let mut conn = db.lock().await;
    let verdict = rules::evaluate(&mut conn, &evaluate_req("t1", "u1", 60_000)).unwrap();
    assert_eq!(verdict.action, RiskAction::Block);
    assert_eq!(verdict.triggered_rules.len(), 2);
    assert!(verdict.reason.as_deref().unwrap().contains("50000"));
}

// ── Audit trail ─────────────────────────────────────────────────────

#[tokio::test]
async fn every_evaluation_writes_exactly_one_event() {
    let db = db::open_in_memory(SCHEMA).unwrap();
    let mut conn = db.lock().await;

    // No rules configured at all: still audited.
    let verdict = rules::evaluate(&mut conn, &evaluate_req("t1", "u1", 500)).unwrap();
    assert_eq!(verdict.action, RiskAction::Allow);
    assert_eq!(verdict.score, 0);

    rules::evaluate(&mut conn, &evaluate_req("t2", "u1", 700)).unwrap();

    let events = rules::list_events(
        &conn,
        &EventFilter {
            user_id: Some("u1".to_string()),
            ..Default::default()
        },
    )
    .unwrap();
    assert_eq!(events.len(), 2);
    assert!(events.iter().all(|e| e.action == RiskAction::Allow));

    let for_txn = rules::list_events(
        &conn,
        &EventFilter {
            transaction_id: Some("t1".to_string()),
            ..Default::default()
        },
    )
    .unwrap();
    assert_eq!(for_txn.len(), 1);
    assert_eq!(for_txn[0].amount, 500);
}
