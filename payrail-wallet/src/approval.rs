//! The transaction approval state machine.
//!
//! Drives a custodial transaction from creation to a terminal state:
//!
//! ```text
//! Created -> PendingApproval -> Signed -> Submitted -> { Success | Failed }
//! ```
//!
//! with a bounded polling loop between `Submitted` and the terminal states.
//! Polling uses a fixed interval and a hard attempt ceiling, no backoff;
//! exhausting the ceiling is not an error - the last observed record is
//! returned and the caller decides whether that is acceptable.
//!
//! ## Failure semantics
//!
//! - A transaction awaiting approval with no pending approval entry is a
//!   fatal [`ApprovalError::NoApprovalFound`]; it is never retried.
//! - Backend HTTP errors pass through unmodified as
//!   [`crate::client::WalletApiError`].
//! - I/O errors during polling abort the whole operation rather than being
//!   retried, so partial transaction state is never silently masked.

use serde_json::Value;
use std::time::Duration;

use payrail_keys::{KeyMaterial, signer};

use crate::client::{WalletApiError, WalletClient};
use crate::extract;
use crate::types::{PendingApproval, TransactionRecord};

/// Default pause between status polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Default polling attempt ceiling.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 20;

/// Errors from the approval flow.
#[derive(Debug, thiserror::Error)]
pub enum ApprovalError {
    /// The backend expects an approval but reported no pending entry.
    #[error("no pending approval found for transaction {transaction_id}")]
    NoApprovalFound {
        /// The transaction missing its approval.
        transaction_id: String,
    },
    /// The backend reported more than one pending approval.
    #[error("expected one pending approval for transaction {transaction_id}, got {count}")]
    AmbiguousApprovals {
        /// The transaction in question.
        transaction_id: String,
        /// How many approvals were pending.
        count: usize,
    },
    /// The pending approval names no signer address or locator.
    #[error("pending approval for transaction {transaction_id} names no signer")]
    MissingSigner {
        /// The transaction in question.
        transaction_id: String,
    },
    /// A backend request failed; the original status and body are inside.
    #[error(transparent)]
    Api(#[from] WalletApiError),
    /// Signing the approval message failed.
    #[error(transparent)]
    Sign(#[from] payrail_keys::SignError),
}

/// The result of driving a transaction through the approval flow.
#[derive(Debug, Clone)]
pub struct ApprovalOutcome {
    /// The last observed transaction record. Terminal when polling found a
    /// terminal status within the attempt ceiling.
    pub record: TransactionRecord,
    /// The on-chain transaction id, when any extraction source produced one.
    pub on_chain_tx_id: Option<String>,
}

/// Drives custodial transactions through creation, external signing, and
/// confirmation.
#[derive(Debug, Clone)]
pub struct ApprovalFlow<'a> {
    client: &'a WalletClient,
    poll_interval: Duration,
    max_attempts: u32,
}

impl<'a> ApprovalFlow<'a> {
    /// Creates a flow over a wallet client with default polling settings.
    #[must_use]
    pub const fn new(client: &'a WalletClient) -> Self {
        Self {
            client,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Overrides the pause between status polls.
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Overrides the polling attempt ceiling.
    #[must_use]
    pub const fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Creates a transaction, collects the external signature when one is
    /// required, and polls to a terminal state.
    ///
    /// # Errors
    ///
    /// Returns [`ApprovalError`] per the failure semantics in the module
    /// docs. Reaching the polling ceiling is not an error.
    pub async fn execute(
        &self,
        wallet: &str,
        params: &Value,
        key: &KeyMaterial,
    ) -> Result<ApprovalOutcome, ApprovalError> {
        let created = self.client.create_transaction(wallet, params).await?;
        let transaction_id = created.id.clone();
        tracing::info!(
            transaction_id,
            status = ?created.status,
            "created wallet transaction"
        );

        let pending = created
            .approvals
            .as_ref()
            .map(|approvals| approvals.pending.as_slice())
            .unwrap_or_default();

        let mut extracted = None;
        match pending {
            [] if created.status == crate::types::TransactionStatus::AwaitingApproval => {
                return Err(ApprovalError::NoApprovalFound { transaction_id });
            }
            [] => {
                // Nothing to sign; the backend executes on its own.
            }
            [approval] => {
                let response = self
                    .sign_and_submit(wallet, &transaction_id, approval, key)
                    .await?;
                extracted = extract::extract_tx_id(&response);
            }
            many => {
                return Err(ApprovalError::AmbiguousApprovals {
                    transaction_id,
                    count: many.len(),
                });
            }
        }

        let record = if created.status.is_terminal() {
            created
        } else {
            self.poll_to_terminal(wallet, created).await?
        };

        let on_chain_tx_id = extracted.or_else(|| record.on_chain_tx_id());
        Ok(ApprovalOutcome {
            record,
            on_chain_tx_id,
        })
    }

    /// Signs one pending approval and posts it back.
    async fn sign_and_submit(
        &self,
        wallet: &str,
        transaction_id: &str,
        approval: &PendingApproval,
        key: &KeyMaterial,
    ) -> Result<Value, ApprovalError> {
        let signer_address = approval.signer.resolved_address().ok_or_else(|| {
            ApprovalError::MissingSigner {
                transaction_id: transaction_id.to_owned(),
            }
        })?;
        tracing::debug!(transaction_id, signer_address, "signing pending approval");

        let signature = signer::sign_message(&approval.message, key)?;
        let submission_id = approval
            .signer
            .submission_id()
            .map_or_else(|| signer_address.to_owned(), ToOwned::to_owned);
        let response = self
            .client
            .submit_approval(wallet, transaction_id, &submission_id, &signature)
            .await?;
        Ok(response)
    }

    /// Polls the status endpoint until a terminal status or the attempt
    /// ceiling; the ceiling returns the last known record, not an error.
    async fn poll_to_terminal(
        &self,
        wallet: &str,
        mut last: TransactionRecord,
    ) -> Result<TransactionRecord, ApprovalError> {
        let transaction_id = last.id.clone();
        for attempt in 1..=self.max_attempts {
            let record = self.client.get_transaction(wallet, &transaction_id).await?;
            if record.status.is_terminal() {
                tracing::info!(
                    transaction_id,
                    status = ?record.status,
                    attempt,
                    "transaction reached terminal status"
                );
                return Ok(record);
            }
            tracing::debug!(
                transaction_id,
                status = ?record.status,
                attempt,
                max_attempts = self.max_attempts,
                "transaction still pending"
            );
            last = record;
            if attempt < self.max_attempts {
                tokio::time::sleep(self.poll_interval).await;
            }
        }
        tracing::warn!(
            transaction_id,
            status = ?last.status,
            "polling ceiling reached, returning last known status"
        );
        Ok(last)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TransactionStatus;
    use payrail::encoding::base58;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn solana_key() -> KeyMaterial {
        KeyMaterial::from_solana_key(&base58::encode(&[11u8; 32])).unwrap()
    }

    fn flow_settings(client: &WalletClient) -> ApprovalFlow<'_> {
        ApprovalFlow::new(client)
            .with_poll_interval(Duration::from_millis(5))
            .with_max_attempts(3)
    }

    async fn mount_create(server: &MockServer, body: serde_json::Value) {
        Mock::given(method("POST"))
            .and(path("/wallets/w1/transactions"))
            .respond_with(ResponseTemplate::new(201).set_body_json(body))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn signs_approval_and_polls_to_success() {
        let server = MockServer::start().await;
        let key = solana_key();
        let address = key.address.clone().unwrap();

        mount_create(
            &server,
            json!({
                "id": "tx_1",
                "status": "awaiting-approval",
                "approvals": { "pending": [{
                    "signer": { "locator": format!("external-wallet:{address}") },
                    "message": base58::encode(b"approve-me"),
                }]}
            }),
        )
        .await;

        Mock::given(method("POST"))
            .and(path("/wallets/w1/transactions/tx_1/approvals"))
            .and(body_partial_json(json!({
                "approvals": [{ "signer": format!("external-wallet:{address}") }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "tx_1" })))
            .expect(1)
            .mount(&server)
            .await;

        // Two pending polls, then success: terminates at the third attempt.
        Mock::given(method("GET"))
            .and(path("/wallets/w1/transactions/tx_1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "tx_1", "status": "pending"
            })))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/wallets/w1/transactions/tx_1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "tx_1", "status": "success", "onChain": { "txId": "5sig" }
            })))
            .mount(&server)
            .await;

        let client = WalletClient::try_from(server.uri().as_str()).unwrap();
        let outcome = flow_settings(&client)
            .execute("w1", &json!({}), &key)
            .await
            .unwrap();
        assert_eq!(outcome.record.status, TransactionStatus::Success);
        assert_eq!(outcome.on_chain_tx_id.as_deref(), Some("5sig"));
    }

    #[tokio::test]
    async fn polling_ceiling_returns_last_status_without_error() {
        let server = MockServer::start().await;
        mount_create(&server, json!({ "id": "tx_2", "status": "pending" })).await;
        Mock::given(method("GET"))
            .and(path("/wallets/w1/transactions/tx_2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "tx_2", "status": "pending"
            })))
            .expect(3)
            .mount(&server)
            .await;

        let client = WalletClient::try_from(server.uri().as_str()).unwrap();
        let outcome = flow_settings(&client)
            .execute("w1", &json!({}), &solana_key())
            .await
            .unwrap();
        assert_eq!(outcome.record.status, TransactionStatus::Pending);
        assert!(outcome.on_chain_tx_id.is_none());
    }

    #[tokio::test]
    async fn missing_expected_approval_is_fatal() {
        let server = MockServer::start().await;
        mount_create(
            &server,
            json!({
                "id": "tx_3",
                "status": "awaiting-approval",
                "approvals": { "pending": [] }
            }),
        )
        .await;

        let client = WalletClient::try_from(server.uri().as_str()).unwrap();
        let err = flow_settings(&client)
            .execute("w1", &json!({}), &solana_key())
            .await
            .unwrap_err();
        assert!(matches!(err, ApprovalError::NoApprovalFound { .. }));
    }

    #[tokio::test]
    async fn backend_errors_pass_through_during_polling() {
        let server = MockServer::start().await;
        mount_create(&server, json!({ "id": "tx_4", "status": "pending" })).await;
        Mock::given(method("GET"))
            .and(path("/wallets/w1/transactions/tx_4"))
            .respond_with(ResponseTemplate::new(500).set_body_string("backend exploded"))
            .mount(&server)
            .await;

        let client = WalletClient::try_from(server.uri().as_str()).unwrap();
        let err = flow_settings(&client)
            .execute("w1", &json!({}), &solana_key())
            .await
            .unwrap_err();
        match err {
            ApprovalError::Api(WalletApiError::Status { status, body, .. }) => {
                assert_eq!(status.as_u16(), 500);
                assert_eq!(body, "backend exploded");
            }
            other => panic!("expected pass-through Status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn extracts_tx_id_from_approval_response_blob() {
        let server = MockServer::start().await;
        let key = solana_key();
        let address = key.address.clone().unwrap();

        mount_create(
            &server,
            json!({
                "id": "tx_5",
                "status": "awaiting-approval",
                "approvals": { "pending": [{
                    "signer": { "address": address },
                    "message": base58::encode(b"sign-this"),
                }]}
            }),
        )
        .await;

        let signature_bytes = [0x42u8; 64];
        let mut blob = vec![1u8];
        blob.extend_from_slice(&signature_bytes);
        blob.extend_from_slice(b"tail");
        let blob_b58 = base58::encode(&blob);
        Mock::given(method("POST"))
            .and(path("/wallets/w1/transactions/tx_5/approvals"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "onChain": { "transaction": blob_b58 }
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/wallets/w1/transactions/tx_5"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "tx_5", "status": "success"
            })))
            .mount(&server)
            .await;

        let client = WalletClient::try_from(server.uri().as_str()).unwrap();
        let outcome = flow_settings(&client)
            .execute("w1", &json!({}), &key)
            .await
            .unwrap();
        assert_eq!(
            outcome.on_chain_tx_id.as_deref(),
            Some(base58::encode(&signature_bytes).as_str())
        );
    }
}
