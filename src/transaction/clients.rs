use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::client::ServiceClient;
use crate::error::ApiError;
use crate::events::EventPublisher;
use crate::money::Paise;

use super::orchestrator::{
    AccountSide, EventSink, LedgerGate, LedgerMovement, NotifyRequest, NotifySink, RiskDecision,
    RiskGate, RiskRequest, WalletGate, WalletView,
};

pub struct HttpRiskGate {
    client: ServiceClient,
}

impl HttpRiskGate {
    pub fn new(client: ServiceClient) -> Self {
        HttpRiskGate { client }
    }
}

#[async_trait]
impl RiskGate for HttpRiskGate {
    async fn evaluate(&self, req: &RiskRequest) -> Result<RiskDecision, ApiError> {
        self.client.post_json("/api/v1/risk/evaluate", req).await
    }
}

#[derive(Deserialize)]
struct SettlementAck {
    #[allow(dead_code)]
    applied: bool,
}

pub struct HttpWalletGate {
    client: ServiceClient,
}

impl HttpWalletGate {
    pub fn new(client: ServiceClient) -> Self {
        HttpWalletGate { client }
    }
}

#[async_trait]
impl WalletGate for HttpWalletGate {
    async fn wallet(&self, id: &str) -> Result<WalletView, ApiError> {
        self.client
            .get_json(&format!("/internal/v1/wallets/{id}"))
            .await
    }

    async fn transfer(
        &self,
        transaction_id: &str,
        source_wallet_id: &str,
        destination_wallet_id: &str,
        amount: Paise,
    ) -> Result<(), ApiError> {
        let _: SettlementAck = self
            .client
            .post_json(
                "/internal/v1/wallets/transfer",
                &json!({
                    "transaction_id": transaction_id,
                    "source_wallet_id": source_wallet_id,
                    "destination_wallet_id": destination_wallet_id,
                    "amount": amount,
                }),
            )
            .await?;
        Ok(())
    }

    async fn deposit(
        &self,
        transaction_id: &str,
        wallet_id: &str,
        amount: Paise,
    ) -> Result<(), ApiError> {
        let _: SettlementAck = self
            .client
            .post_json(
                "/internal/v1/wallets/deposit",
                &json!({
                    "transaction_id": transaction_id,
                    "wallet_id": wallet_id,
                    "amount": amount,
                }),
            )
            .await?;
        Ok(())
    }

    async fn withdraw(
        &self,
        transaction_id: &str,
        wallet_id: &str,
        amount: Paise,
    ) -> Result<(), ApiError> {
        let _: SettlementAck = self
            .client
            .post_json(
                "/internal/v1/wallets/withdraw",
                &json!({
                    "transaction_id": transaction_id,
                    "wallet_id": wallet_id,
                    "amount": amount,
                }),
            )
            .await?;
        Ok(())
    }
}

#[derive(Deserialize)]
struct AccountRef {
    id: String,
}

#[derive(Deserialize)]
struct EntryRef {
    id: String,
}

pub struct HttpLedgerGate {
    client: ServiceClient,
}

impl HttpLedgerGate {
    pub fn new(client: ServiceClient) -> Self {
        HttpLedgerGate { client }
    }

    async fn resolve(&self, side: &AccountSide) -> Result<String, ApiError> {
        match side {
            AccountSide::Wallet(account_id) => Ok(account_id.clone()),
            AccountSide::Cash => {
                let account: AccountRef = self
                    .client
                    .get_json(&format!(
                        "/internal/v1/ledger/accounts/by-code/{}",
                        crate::ledger::CASH_ACCOUNT_CODE
                    ))
                    .await?;
                Ok(account.id)
            }
        }
    }
}

#[async_trait]
impl LedgerGate for HttpLedgerGate {
    async fn post_movement(&self, movement: &LedgerMovement) -> Result<String, ApiError> {
        let debit_account = self.resolve(&movement.debit).await?;
        let credit_account = self.resolve(&movement.credit).await?;

        let entry: EntryRef = self
            .client
            .post_json(
                "/internal/v1/ledger/entries",
                &json!({
                    "description": movement.description,
                    "reference_type": "transaction",
                    "reference_id": movement.transaction_id,
                    "lines": [
                        { "account_id": debit_account, "debit": movement.amount },
                        { "account_id": credit_account, "credit": movement.amount },
                    ],
                }),
            )
            .await?;

        let posted: EntryRef = self
            .client
            .post_json(
                &format!("/internal/v1/ledger/entries/{}/post", entry.id),
                &json!({ "posted_by": "transaction-service" }),
            )
            .await?;

        Ok(posted.id)
    }
}

pub struct HttpEventSink {
    publisher: EventPublisher,
}

impl HttpEventSink {
    pub fn new(publisher: EventPublisher) -> Self {
        HttpEventSink { publisher }
    }
}

impl EventSink for HttpEventSink {
    fn publish(&self, topic: &str, event_type: &str, data: Value) {
        self.publisher.publish(topic, event_type, data);
    }
}

/// Best-effort lifecycle notifications; failures are logged only.
pub struct HttpNotifySink {
    client: ServiceClient,
}

impl HttpNotifySink {
    pub fn new(client: ServiceClient) -> Self {
        HttpNotifySink { client }
    }
}

impl NotifySink for HttpNotifySink {
    fn notify(&self, req: NotifyRequest) {
        let client = self.client.clone();
        tokio::spawn(async move {
            let body = json!({
                "user_id": req.user_id,
                "channel": "in-app",
                "type": req.notification_type,
                "priority": "normal",
                "recipient": req.user_id,
                "body": req.body,
                "correlation_id": req.correlation_id,
                "source_service": "transactions",
            });
            let result: Result<Value, ApiError> =
                client.post_json("/api/v1/notifications", &body).await;
            if let Err(err) = result {
                tracing::warn!("notification dispatch failed: {}", err.message);
            }
        });
    }
}
