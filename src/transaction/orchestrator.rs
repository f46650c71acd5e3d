use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::db::Db;
use crate::error::ApiError;
use crate::events;
use crate::money::Paise;

use super::store::{self, NewTransaction, Transaction, TransactionStatus, TransactionType};

// ── Collaborator seams ──────────────────────────────────────────────
// The orchestrator talks to risk, wallet, and ledger through these
// traits; HTTP implementations live in `clients`, tests plug in mocks.

#[derive(Debug, Serialize)]
pub struct RiskRequest {
    pub transaction_id: String,
    pub user_id: String,
    pub amount: Paise,
    pub currency: String,
    pub transaction_type: String,
    pub source_wallet_id: Option<String>,
    pub destination_wallet_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RiskDecision {
    pub action: String,
    pub score: i64,
    pub reason: Option<String>,
    pub event_id: String,
    #[serde(default)]
    pub triggered_rules: Vec<String>,
}

#[async_trait]
pub trait RiskGate: Send + Sync {
    async fn evaluate(&self, req: &RiskRequest) -> Result<RiskDecision, ApiError>;
}

#[derive(Debug, Clone, Deserialize)]
pub struct WalletView {
    pub id: String,
    pub user_id: String,
    pub currency: String,
    pub status: String,
    pub ledger_account_id: Option<String>,
    pub balance: Paise,
    pub available_balance: Paise,
}

#[async_trait]
pub trait WalletGate: Send + Sync {
    async fn wallet(&self, id: &str) -> Result<WalletView, ApiError>;
    async fn transfer(
        &self,
        transaction_id: &str,
        source_wallet_id: &str,
        destination_wallet_id: &str,
        amount: Paise,
    ) -> Result<(), ApiError>;
    async fn deposit(&self, transaction_id: &str, wallet_id: &str, amount: Paise)
    -> Result<(), ApiError>;
    async fn withdraw(
        &self,
        transaction_id: &str,
        wallet_id: &str,
        amount: Paise,
    ) -> Result<(), ApiError>;
}

/// One side of a canonical journal entry: the cash/bank asset account or
/// a specific wallet liability account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountSide {
    Cash,
    Wallet(String),
}

#[derive(Debug, Clone)]
pub struct LedgerMovement {
    pub transaction_id: String,
    pub debit: AccountSide,
    pub credit: AccountSide,
    pub amount: Paise,
    pub currency: String,
    pub description: String,
}

#[async_trait]
pub trait LedgerGate: Send + Sync {
    /// Create and post the journal entry for one settled movement,
    /// returning the posted entry's id.
    async fn post_movement(&self, movement: &LedgerMovement) -> Result<String, ApiError>;
}

pub trait EventSink: Send + Sync {
    fn publish(&self, topic: &str, event_type: &str, data: Value);
}

#[derive(Debug, Clone, Serialize)]
pub struct NotifyRequest {
    pub user_id: String,
    pub notification_type: String,
    pub body: String,
    pub correlation_id: String,
}

pub trait NotifySink: Send + Sync {
    fn notify(&self, req: NotifyRequest);
}

// ── Public API request shapes ───────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct TransferApiRequest {
    pub source_wallet_id: String,
    pub destination_wallet_id: String,
    pub amount: Paise,
    pub currency: Option<String>,
    pub description: Option<String>,
    pub external_ref: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DepositApiRequest {
    pub wallet_id: String,
    pub amount: Paise,
    pub currency: Option<String>,
    pub description: Option<String>,
    pub external_ref: Option<String>,
}

// ── Orchestrator ────────────────────────────────────────────────────

pub struct Orchestrator {
    pub db: Db,
    pub risk: Arc<dyn RiskGate>,
    pub wallets: Arc<dyn WalletGate>,
    pub ledger: Arc<dyn LedgerGate>,
    pub events: Arc<dyn EventSink>,
    pub notifier: Arc<dyn NotifySink>,
    /// Fail-open by default: an unreachable risk service lets the
    /// transaction proceed with `risk_action=unavailable` recorded.
    pub risk_fail_closed: bool,
}

impl Orchestrator {
    pub async fn create_transfer(
        &self,
        user_id: &str,
        req: &TransferApiRequest,
    ) -> Result<Transaction, ApiError> {
        if req.source_wallet_id == req.destination_wallet_id {
            return Err(ApiError::validation(
                "source and destination wallets must differ",
            ));
        }

        let source = self.wallets.wallet(&req.source_wallet_id).await?;
        let destination = self.wallets.wallet(&req.destination_wallet_id).await?;
        if source.user_id != user_id {
            return Err(ApiError::not_found("wallet not found"));
        }
        if source.currency != destination.currency {
            return Err(ApiError::validation("wallet currencies do not match"));
        }
        check_currency(req.currency.as_deref(), &source.currency)?;
        let debit_account = wallet_account(&source)?;
        let credit_account = wallet_account(&destination)?;

        let txn = self
            .create_pending(&NewTransaction {
                transaction_type: TransactionType::Transfer,
                user_id,
                source_wallet_id: Some(&req.source_wallet_id),
                destination_wallet_id: Some(&req.destination_wallet_id),
                amount: req.amount,
                currency: &source.currency,
                description: req.description.as_deref(),
                external_ref: req.external_ref.as_deref(),
                parent_transaction_id: None,
            })
            .await?;

        if let Some(blocked) = self.run_risk(&txn).await? {
            return Ok(blocked);
        }

        let movement = LedgerMovement {
            transaction_id: txn.id.clone(),
            debit: debit_account,
            credit: credit_account,
            amount: txn.amount,
            currency: txn.currency.clone(),
            description: format!("Transfer {} -> {}", source.id, destination.id),
        };
        self.settle(&txn, movement, |gate, id, amount| {
            let source = req.source_wallet_id.clone();
            let destination = req.destination_wallet_id.clone();
            async move { gate.transfer(&id, &source, &destination, amount).await }
        })
        .await
    }

    pub async fn create_deposit(
        &self,
        user_id: &str,
        req: &DepositApiRequest,
    ) -> Result<Transaction, ApiError> {
        let wallet = self.wallets.wallet(&req.wallet_id).await?;
        if wallet.user_id != user_id {
            return Err(ApiError::not_found("wallet not found"));
        }
        check_currency(req.currency.as_deref(), &wallet.currency)?;
        let credit_account = wallet_account(&wallet)?;

        let txn = self
            .create_pending(&NewTransaction {
                transaction_type: TransactionType::Deposit,
                user_id,
                source_wallet_id: None,
                destination_wallet_id: Some(&req.wallet_id),
                amount: req.amount,
                currency: &wallet.currency,
                description: req.description.as_deref(),
                external_ref: req.external_ref.as_deref(),
                parent_transaction_id: None,
            })
            .await?;

        if let Some(blocked) = self.run_risk(&txn).await? {
            return Ok(blocked);
        }

        let movement = LedgerMovement {
            transaction_id: txn.id.clone(),
            debit: AccountSide::Cash,
            credit: credit_account,
            amount: txn.amount,
            currency: txn.currency.clone(),
            description: format!("Deposit into {}", wallet.id),
        };
        self.settle(&txn, movement, |gate, id, amount| {
            let wallet_id = req.wallet_id.clone();
            async move { gate.deposit(&id, &wallet_id, amount).await }
        })
        .await
    }

    pub async fn create_withdrawal(
        &self,
        user_id: &str,
        req: &DepositApiRequest,
    ) -> Result<Transaction, ApiError> {
        let wallet = self.wallets.wallet(&req.wallet_id).await?;
        if wallet.user_id != user_id {
            return Err(ApiError::not_found("wallet not found"));
        }
        check_currency(req.currency.as_deref(), &wallet.currency)?;
        let debit_account = wallet_account(&wallet)?;

        let txn = self
            .create_pending(&NewTransaction {
                transaction_type: TransactionType::Withdrawal,
                user_id,
                source_wallet_id: Some(&req.wallet_id),
                destination_wallet_id: None,
                amount: req.amount,
                currency: &wallet.currency,
                description: req.description.as_deref(),
                external_ref: req.external_ref.as_deref(),
                parent_transaction_id: None,
            })
            .await?;

        if let Some(blocked) = self.run_risk(&txn).await? {
            return Ok(blocked);
        }

        let movement = LedgerMovement {
            transaction_id: txn.id.clone(),
            debit: debit_account,
            credit: AccountSide::Cash,
            amount: txn.amount,
            currency: txn.currency.clone(),
            description: format!("Withdrawal from {}", wallet.id),
        };
        self.settle(&txn, movement, |gate, id, amount| {
            let wallet_id = req.wallet_id.clone();
            async move { gate.withdraw(&id, &wallet_id, amount).await }
        })
        .await
    }

    /// Undo a completed transaction: a new `reversal` transaction with
    /// the wallets swapped runs the same wallet + ledger sequence in the
    /// opposite direction, then the parent moves to `reversed`.
    pub async fn reverse(&self, user_id: &str, parent_id: &str) -> Result<Transaction, ApiError> {
        let parent = {
            let conn = self.db.lock().await;
            store::get(&conn, parent_id)?
        };
        if parent.status != TransactionStatus::Completed {
            return Err(ApiError::conflict(format!(
                "only completed transactions can be reversed (status is '{}')",
                parent.status
            )));
        }

        let txn = self
            .create_pending(&NewTransaction {
                transaction_type: TransactionType::Reversal,
                user_id,
                source_wallet_id: parent.destination_wallet_id.as_deref(),
                destination_wallet_id: parent.source_wallet_id.as_deref(),
                amount: parent.amount,
                currency: &parent.currency,
                description: Some(&format!("Reversal of {}", parent.id)),
                external_ref: None,
                parent_transaction_id: Some(&parent.id),
            })
            .await?;

        if let Some(blocked) = self.run_risk(&txn).await? {
            return Ok(blocked);
        }

        let reversal = match parent.transaction_type {
            TransactionType::Deposit => {
                // Money leaves the wallet again: withdrawal-shaped.
                let wallet_id = parent
                    .destination_wallet_id
                    .clone()
                    .ok_or_else(|| ApiError::internal("deposit without destination"))?;
                let wallet = self.wallets.wallet(&wallet_id).await?;
                let movement = LedgerMovement {
                    transaction_id: txn.id.clone(),
                    debit: wallet_account(&wallet)?,
                    credit: AccountSide::Cash,
                    amount: txn.amount,
                    currency: txn.currency.clone(),
                    description: format!("Reversal of deposit {}", parent.id),
                };
                self.settle(&txn, movement, |gate, id, amount| {
                    let wallet_id = wallet_id.clone();
                    async move { gate.withdraw(&id, &wallet_id, amount).await }
                })
                .await?
            }
            TransactionType::Withdrawal => {
                let wallet_id = parent
                    .source_wallet_id
                    .clone()
                    .ok_or_else(|| ApiError::internal("withdrawal without source"))?;
                let wallet = self.wallets.wallet(&wallet_id).await?;
                let movement = LedgerMovement {
                    transaction_id: txn.id.clone(),
                    debit: AccountSide::Cash,
                    credit: wallet_account(&wallet)?,
                    amount: txn.amount,
                    currency: txn.currency.clone(),
                    description: format!("Reversal of withdrawal {}", parent.id),
                };
                self.settle(&txn, movement, |gate, id, amount| {
                    let wallet_id = wallet_id.clone();
                    async move { gate.deposit(&id, &wallet_id, amount).await }
                })
                .await?
            }
            _ => {
                let source_id = parent
                    .destination_wallet_id
                    .clone()
                    .ok_or_else(|| ApiError::conflict("transaction has no wallets to swap"))?;
                let destination_id = parent
                    .source_wallet_id
                    .clone()
                    .ok_or_else(|| ApiError::conflict("transaction has no wallets to swap"))?;
                let source = self.wallets.wallet(&source_id).await?;
                let destination = self.wallets.wallet(&destination_id).await?;
                let movement = LedgerMovement {
                    transaction_id: txn.id.clone(),
                    debit: wallet_account(&source)?,
                    credit: wallet_account(&destination)?,
                    amount: txn.amount,
                    currency: txn.currency.clone(),
                    description: format!("Reversal of transfer {}", parent.id),
                };
                self.settle(&txn, movement, |gate, id, amount| {
                    let source_id = source_id.clone();
                    let destination_id = destination_id.clone();
                    async move { gate.transfer(&id, &source_id, &destination_id, amount).await }
                })
                .await?
            }
        };

        if reversal.status == TransactionStatus::Completed {
            let parent = {
                let conn = self.db.lock().await;
                store::transition(&conn, &parent.id, TransactionStatus::Reversed)?
            };
            self.publish_updated(&parent);
        }

        Ok(reversal)
    }

    pub async fn cancel(&self, user_id: &str, id: &str) -> Result<Transaction, ApiError> {
        let txn = {
            let conn = self.db.lock().await;
            let txn = store::get(&conn, id)?;
            if txn.user_id != user_id {
                return Err(ApiError::not_found("transaction not found"));
            }
            store::transition(&conn, id, TransactionStatus::Cancelled)?
        };
        self.publish_updated(&txn);
        Ok(txn)
    }

    // ── Lifecycle steps ─────────────────────────────────────────────

    async fn create_pending(&self, new: &NewTransaction<'_>) -> Result<Transaction, ApiError> {
        let txn = {
            let conn = self.db.lock().await;
            store::create(&conn, new)?
        };

        self.events.publish(
            events::topics::TRANSACTIONS,
            events::TRANSACTION_CREATED,
            json!({
                "transaction_id": txn.id,
                "type": txn.transaction_type,
                "status": txn.status,
                "amount": txn.amount,
                "currency": txn.currency,
            }),
        );
        Ok(txn)
    }

    /// Risk step. Returns `Some(failed_txn)` when the movement was
    /// blocked; the caller hands that transaction back to the API
    /// caller as a success.
    async fn run_risk(&self, txn: &Transaction) -> Result<Option<Transaction>, ApiError> {
        let request = RiskRequest {
            transaction_id: txn.id.clone(),
            user_id: txn.user_id.clone(),
            amount: txn.amount,
            currency: txn.currency.clone(),
            transaction_type: txn.transaction_type.to_string(),
            source_wallet_id: txn.source_wallet_id.clone(),
            destination_wallet_id: txn.destination_wallet_id.clone(),
        };

        let decision = match self.risk.evaluate(&request).await {
            Ok(decision) => decision,
            Err(err) if !self.risk_fail_closed => {
                tracing::warn!(
                    transaction = %txn.id,
                    "risk service unavailable, proceeding fail-open: {}",
                    err.message
                );
                let conn = self.db.lock().await;
                store::merge_metadata(&conn, &txn.id, &json!({ "risk_action": "unavailable" }))?;
                return Ok(None);
            }
            Err(_) => {
                let failed = {
                    let conn = self.db.lock().await;
                    store::merge_metadata(
                        &conn,
                        &txn.id,
                        &json!({ "risk_action": "unavailable" }),
                    )?;
                    store::set_failure(&conn, &txn.id, "risk evaluation unavailable")?
                };
                self.publish_updated(&failed);
                return Ok(Some(failed));
            }
        };

        {
            let conn = self.db.lock().await;
            store::merge_metadata(
                &conn,
                &txn.id,
                &json!({
                    "risk_action": decision.action,
                    "risk_score": decision.score,
                    "risk_event_id": decision.event_id,
                    "risk_triggered_rules": decision.triggered_rules,
                }),
            )?;
        }

        if decision.action == "block" {
            let reason = decision
                .reason
                .unwrap_or_else(|| "blocked by risk policy".to_string());
            let failed = {
                let conn = self.db.lock().await;
                store::set_failure(&conn, &txn.id, &reason)?
            };
            self.publish_updated(&failed);
            return Ok(Some(failed));
        }

        Ok(None)
    }

    /// Steps 4-6: wallet settlement, ledger posting, completion. Wallet
    /// and ledger failures are never swallowed: the transaction moves to
    /// `failed` with an explicit reason and an update event fires.
    async fn settle<F, Fut>(
        &self,
        txn: &Transaction,
        movement: LedgerMovement,
        wallet_call: F,
    ) -> Result<Transaction, ApiError>
    where
        F: FnOnce(Arc<dyn WalletGate>, String, Paise) -> Fut,
        Fut: Future<Output = Result<(), ApiError>>,
    {
        {
            let conn = self.db.lock().await;
            store::transition(&conn, &txn.id, TransactionStatus::Processing)?;
        }

        if let Err(err) = wallet_call(self.wallets.clone(), txn.id.clone(), txn.amount).await {
            return self
                .fail(txn, &format!("wallet settlement failed: {}", err.message))
                .await;
        }

        let entry_id = match self.ledger.post_movement(&movement).await {
            Ok(entry_id) => entry_id,
            Err(err) => {
                tracing::error!(
                    transaction = %txn.id,
                    "ledger posting failed after wallet settlement: {}",
                    err.message
                );
                return self
                    .fail(txn, &format!("ledger posting failed: {}", err.message))
                    .await;
            }
        };

        let completed = {
            let conn = self.db.lock().await;
            store::set_ledger_entry(&conn, &txn.id, &entry_id)?;
            store::transition(&conn, &txn.id, TransactionStatus::Completed)?
        };
        self.publish_updated(&completed);

        self.notifier.notify(NotifyRequest {
            user_id: completed.user_id.clone(),
            notification_type: format!("transaction.{}", completed.transaction_type),
            body: format!(
                "Your {} of {} is complete",
                completed.transaction_type,
                crate::money::format_amount(completed.amount, &completed.currency)
            ),
            correlation_id: format!("txn-{}-completed", completed.id),
        });

        Ok(completed)
    }

    async fn fail(&self, txn: &Transaction, reason: &str) -> Result<Transaction, ApiError> {
        let failed = {
            let conn = self.db.lock().await;
            store::set_failure(&conn, &txn.id, reason)?
        };
        self.publish_updated(&failed);
        Ok(failed)
    }

    fn publish_updated(&self, txn: &Transaction) {
        self.events.publish(
            events::topics::TRANSACTIONS,
            events::TRANSACTION_UPDATED,
            json!({
                "transaction_id": txn.id,
                "status": txn.status,
                "failure_reason": txn.failure_reason,
                "ledger_entry_id": txn.ledger_entry_id,
            }),
        );
    }
}

fn wallet_account(wallet: &WalletView) -> Result<AccountSide, ApiError> {
    wallet
        .ledger_account_id
        .clone()
        .map(AccountSide::Wallet)
        .ok_or_else(|| ApiError::conflict(format!("wallet {} has no ledger account", wallet.id)))
}

fn check_currency(requested: Option<&str>, actual: &str) -> Result<(), ApiError> {
    match requested {
        Some(c) if c != actual => Err(ApiError::validation(format!(
            "currency '{c}' does not match wallet currency '{actual}'"
        ))),
        _ => Ok(()),
    }
}
