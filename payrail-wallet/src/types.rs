//! Wire types for the custodial wallet backend.
//!
//! The backend's responses vary by chain and endpoint version, so the typed
//! fields here cover only what the approval flow relies on; everything else
//! is retained in `extra` for the [`crate::extract`] probes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Lifecycle status of a custodial wallet transaction.
///
/// `Success` and `Failed` are terminal; every other value, including
/// statuses this enum does not know about, is treated as non-terminal and
/// polled again.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransactionStatus {
    /// Accepted by the backend, not yet processed.
    #[default]
    Pending,
    /// The backend is waiting for an external signature.
    AwaitingApproval,
    /// Being processed or submitted on-chain.
    Processing,
    /// Confirmed on-chain.
    Success,
    /// Terminally failed.
    Failed,
    /// A status this client does not recognize; non-terminal.
    #[serde(other)]
    Other,
}

impl TransactionStatus {
    /// Returns `true` for terminal statuses, after which the record is
    /// immutable.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }
}

/// Reference to the signer a pending approval expects.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SignerRef {
    /// The signer's address, when the backend provides it directly.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    /// The signer locator, e.g. `external-wallet:<address>`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locator: Option<String>,
}

impl SignerRef {
    /// Returns the signer address: the `address` field when present,
    /// otherwise the last colon-separated segment of the locator.
    #[must_use]
    pub fn resolved_address(&self) -> Option<&str> {
        if let Some(address) = self.address.as_deref() {
            return Some(address);
        }
        self.locator.as_deref()?.rsplit(':').next()
    }

    /// Returns the identifier to submit an approval under: the locator when
    /// present, otherwise the bare address.
    #[must_use]
    pub fn submission_id(&self) -> Option<&str> {
        self.locator.as_deref().or(self.address.as_deref())
    }
}

/// A signature the backend is waiting for.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PendingApproval {
    /// The signer expected to produce the signature.
    #[serde(default)]
    pub signer: SignerRef,
    /// The message to sign, Base58 for Solana-family chains.
    pub message: String,
}

/// Collected approvals on a transaction.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Approvals {
    /// Approvals still waiting for a signature.
    #[serde(default)]
    pub pending: Vec<PendingApproval>,
    /// Approvals already submitted.
    #[serde(default)]
    pub submitted: Vec<serde_json::Value>,
}

/// A custodial wallet transaction as reported by the backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    /// Backend-assigned transaction id.
    #[serde(default)]
    pub id: String,
    /// Current lifecycle status.
    #[serde(default)]
    pub status: TransactionStatus,
    /// Approval state, when the backend reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approvals: Option<Approvals>,
    /// Everything else the backend returned, kept for id extraction.
    #[serde(flatten)]
    pub extra: serde_json::Value,
}

impl TransactionRecord {
    /// Returns the on-chain transaction id, probing the backend's known
    /// response shapes in order.
    #[must_use]
    pub fn on_chain_tx_id(&self) -> Option<String> {
        crate::extract::extract_tx_id(&self.extra)
    }
}

/// A wallet's balance in one token across the requested networks.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenBalance {
    /// Lower-case token symbol.
    pub token: String,
    /// Token decimals.
    #[serde(default)]
    pub decimals: u8,
    /// Atomic-unit balances keyed by network name, plus a "total" entry.
    #[serde(default)]
    pub balances: BTreeMap<String, String>,
}

impl TokenBalance {
    /// Returns the atomic-unit balance on one network, zero when absent or
    /// unparseable.
    #[must_use]
    pub fn on_network(&self, network: &str) -> u128 {
        self.balances
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(network))
            .and_then(|(_, value)| value.parse::<u128>().ok())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unknown_statuses_deserialize_as_other() {
        let status: TransactionStatus = serde_json::from_value(json!("exotic-state")).unwrap();
        assert_eq!(status, TransactionStatus::Other);
        assert!(!status.is_terminal());
        let success: TransactionStatus = serde_json::from_value(json!("success")).unwrap();
        assert!(success.is_terminal());
        let awaiting: TransactionStatus =
            serde_json::from_value(json!("awaiting-approval")).unwrap();
        assert_eq!(awaiting, TransactionStatus::AwaitingApproval);
    }

    #[test]
    fn signer_address_falls_back_to_locator_segment() {
        let explicit = SignerRef {
            address: Some("addr1".to_owned()),
            locator: Some("external-wallet:addr2".to_owned()),
        };
        assert_eq!(explicit.resolved_address(), Some("addr1"));

        let located = SignerRef {
            address: None,
            locator: Some("external-wallet:evm:0xabc".to_owned()),
        };
        assert_eq!(located.resolved_address(), Some("0xabc"));

        let empty = SignerRef::default();
        assert_eq!(empty.resolved_address(), None);
    }

    #[test]
    fn record_keeps_unknown_fields_for_extraction() {
        let record: TransactionRecord = serde_json::from_value(json!({
            "id": "tx_1",
            "status": "success",
            "onChain": { "txId": "5abc" }
        }))
        .unwrap();
        assert_eq!(record.on_chain_tx_id().as_deref(), Some("5abc"));
    }

    #[test]
    fn balance_lookup_is_case_insensitive_and_fail_safe() {
        let balance: TokenBalance = serde_json::from_value(json!({
            "token": "usdc",
            "decimals": 6,
            "balances": { "base-sepolia": "1500000", "total": "1500000" }
        }))
        .unwrap();
        assert_eq!(balance.on_network("Base-Sepolia"), 1_500_000);
        assert_eq!(balance.on_network("solana"), 0);
    }
}
