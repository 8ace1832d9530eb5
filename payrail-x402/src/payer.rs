//! Payer rule selection: which wallet and key fund a payment.
//!
//! A payer configures an ordered list of [`PayerRule`]s. For each rule, in
//! declaration order, the selector resolves the rule's token against the
//! environment's catalog (folding generic network aliases to concrete
//! network ids), finds the matching outstanding requirement, and checks the
//! payer wallet's live balance. The first rule whose available balance
//! covers the required amount wins; later rules are never signed or
//! settled. A rule that fails to match or afford is skipped, not fatal -
//! only exhausting every rule is an error.
//!
//! The selected rule then drives the payment end to end: EVM rules sign an
//! ERC-3009 authorization locally; Solana rules run a transfer through the
//! custodial wallet approval flow and settle the resulting signed
//! transaction.

use std::fmt;

use serde_json::Value;

use payrail::envelope::PaymentEnvelope;
use payrail::networks::{self, Environment, NetworkFamily, TokenDeployment};
use payrail::requirement::{PaymentRequirement, RequirementSet};
use payrail_keys::signer::{self, AuthorizationParams};
use payrail_keys::{KeyError, KeyMaterial, SignError};
use payrail_wallet::approval::{ApprovalError, ApprovalFlow};
use payrail_wallet::client::{WalletApiError, WalletClient};

use crate::settle::{SettleClientError, SettlementClient, SettlementOutcome};

/// One payer rule: fund payments in `token` on `network` from `from_wallet`,
/// signing with `private_key`.
///
/// The private key is an opaque secret string resolved per payment by
/// [`KeyMaterial::resolve`]; it is redacted from `Debug` output.
#[derive(Clone)]
pub struct PayerRule {
    /// Lower-case token symbol ("usdc").
    pub token: String,
    /// Network name; generic aliases fold per environment.
    pub network: String,
    /// The custodial wallet locator holding the funds.
    pub from_wallet: String,
    /// The signing key for this wallet, as an opaque secret string.
    pub private_key: String,
}

impl fmt::Debug for PayerRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PayerRule")
            .field("token", &self.token)
            .field("network", &self.network)
            .field("from_wallet", &self.from_wallet)
            .finish_non_exhaustive()
    }
}

/// Errors from payer selection and payment execution.
#[derive(Debug, thiserror::Error)]
pub enum PayerError {
    /// Every rule was evaluated and none could fund a requirement.
    #[error("no payer rule can afford any outstanding payment requirement")]
    NoAffordableRule,
    /// The selected rule's key failed to resolve.
    #[error(transparent)]
    Key(#[from] KeyError),
    /// Signing failed for the selected rule.
    #[error(transparent)]
    Sign(#[from] SignError),
    /// A wallet backend request failed outside of rule evaluation.
    #[error(transparent)]
    Wallet(#[from] WalletApiError),
    /// The Solana transfer approval flow failed.
    #[error(transparent)]
    Approval(#[from] ApprovalError),
    /// Settlement failed.
    #[error(transparent)]
    Settle(#[from] SettleClientError),
    /// The approval flow finished without a signed transaction to settle.
    #[error("approval flow produced no signed transaction for settlement")]
    MissingSignedTransaction,
    /// A payment payload failed to serialize.
    #[error("failed to serialize payment payload: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// The rule chosen to fund a payment, with its resolution context.
#[derive(Debug, Clone, Copy)]
pub struct SelectedRule<'r> {
    /// The winning rule.
    pub rule: &'r PayerRule,
    /// The requirement it funds.
    pub requirement: &'r PaymentRequirement,
    /// The token deployment the rule resolved to.
    pub deployment: &'static TokenDeployment,
    /// The payer wallet's available balance in atomic units.
    pub available: u128,
}

/// Evaluates payer rules and executes the selected payment.
#[derive(Debug, Clone)]
pub struct PayerSelector<'a> {
    env: Environment,
    wallet: &'a WalletClient,
    settlement: &'a SettlementClient,
}

impl<'a> PayerSelector<'a> {
    /// Creates a selector over a wallet client and settlement client.
    #[must_use]
    pub const fn new(
        env: Environment,
        wallet: &'a WalletClient,
        settlement: &'a SettlementClient,
    ) -> Self {
        Self {
            env,
            wallet,
            settlement,
        }
    }

    /// Picks the first rule, in declaration order, whose resolved token
    /// matches an outstanding requirement and whose live balance covers the
    /// required amount.
    ///
    /// Rules that fail to resolve, match, or afford are skipped with a log
    /// line; balance lookups that error are treated the same way.
    ///
    /// # Errors
    ///
    /// Returns [`PayerError::NoAffordableRule`] when every rule is
    /// exhausted.
    pub async fn select<'r>(
        &self,
        rules: &'r [PayerRule],
        requirements: &'r RequirementSet,
    ) -> Result<SelectedRule<'r>, PayerError> {
        for rule in rules {
            let network = networks::canonical_network(self.env, &rule.network);
            let Some(deployment) = networks::find_token(self.env, &network, &rule.token) else {
                tracing::debug!(token = rule.token, network, "rule token not in catalog");
                continue;
            };
            let Some(requirement) = requirements.find_network(&network) else {
                tracing::debug!(network, "no outstanding requirement on rule network");
                continue;
            };
            let required = requirement.max_amount_required.inner();
            if required == 0 || !requirement.asset.eq_ignore_ascii_case(deployment.asset) {
                tracing::debug!(network, "requirement asset or amount does not match rule");
                continue;
            }

            let balances = match self
                .wallet
                .get_balances(&rule.from_wallet, &[&rule.token], &[&network])
                .await
            {
                Ok(balances) => balances,
                Err(error) => {
                    tracing::warn!(
                        wallet = rule.from_wallet,
                        network,
                        %error,
                        "balance lookup failed, skipping rule"
                    );
                    continue;
                }
            };
            let available = balances
                .iter()
                .find(|balance| balance.token.eq_ignore_ascii_case(&rule.token))
                .map_or(0, |balance| balance.on_network(&network));

            if available >= required {
                tracing::info!(
                    wallet = rule.from_wallet,
                    network,
                    available,
                    required,
                    "selected payer rule"
                );
                return Ok(SelectedRule {
                    rule,
                    requirement,
                    deployment,
                    available,
                });
            }
            tracing::info!(
                wallet = rule.from_wallet,
                network,
                available,
                required,
                "insufficient balance, trying next rule"
            );
        }
        Err(PayerError::NoAffordableRule)
    }

    /// Selects a rule and executes the payment end to end, returning the
    /// settlement outcome.
    ///
    /// # Errors
    ///
    /// Returns [`PayerError`] when no rule is affordable or when signing,
    /// the approval flow, or settlement fails.
    pub async fn pay(
        &self,
        rules: &[PayerRule],
        requirements: &RequirementSet,
    ) -> Result<SettlementOutcome, PayerError> {
        let selected = self.select(rules, requirements).await?;
        let key = KeyMaterial::resolve(&selected.rule.private_key)?;
        match NetworkFamily::of(&selected.requirement.network) {
            NetworkFamily::Evm => self.pay_evm(&selected, &key).await,
            NetworkFamily::Solana => self.pay_solana(&selected, &key).await,
        }
    }

    /// EVM path: sign an ERC-3009 authorization locally and settle it.
    async fn pay_evm(
        &self,
        selected: &SelectedRule<'_>,
        key: &KeyMaterial,
    ) -> Result<SettlementOutcome, PayerError> {
        let requirement = selected.requirement;
        let (token_name, token_version) = eip712_domain_fields(requirement, selected.deployment);
        let params = AuthorizationParams {
            network: requirement.network.clone(),
            asset: requirement.asset.clone(),
            pay_to: requirement.pay_to.clone(),
            value: requirement.max_amount_required.inner(),
            max_timeout_seconds: requirement.max_timeout_seconds,
            token_name,
            token_version,
        };
        let payload = signer::sign_transfer_authorization(key, &params)?;
        let envelope = PaymentEnvelope {
            x402_version: 1,
            scheme: requirement.scheme.clone(),
            network: requirement.network.clone(),
            payload: serde_json::to_value(&payload)?,
        };
        Ok(self.settlement.settle(&envelope, requirement, None).await?)
    }

    /// Solana path: run a transfer through the custodial approval flow and
    /// settle the signed transaction it produces.
    async fn pay_solana(
        &self,
        selected: &SelectedRule<'_>,
        key: &KeyMaterial,
    ) -> Result<SettlementOutcome, PayerError> {
        let requirement = selected.requirement;
        let params = transfer_params(selected.deployment, requirement);
        let flow = ApprovalFlow::new(self.wallet);
        let outcome = flow
            .execute(&selected.rule.from_wallet, &params, key)
            .await?;

        let transaction = signed_transaction_blob(&outcome.record.extra)
            .ok_or(PayerError::MissingSignedTransaction)?;
        let envelope = PaymentEnvelope {
            x402_version: 1,
            scheme: requirement.scheme.clone(),
            network: requirement.network.clone(),
            payload: serde_json::json!({ "transaction": transaction }),
        };
        Ok(self.settlement.settle(&envelope, requirement, None).await?)
    }
}

/// Transfer parameters the custodial backend turns into an on-chain token
/// transfer transaction.
fn transfer_params(deployment: &TokenDeployment, requirement: &PaymentRequirement) -> Value {
    serde_json::json!({
        "transfer": {
            "token": deployment.asset,
            "recipient": requirement.pay_to,
            "amount": requirement.max_amount_required,
        }
    })
}

/// Pulls the serialized signed transaction out of a transaction record.
fn signed_transaction_blob(extra: &Value) -> Option<String> {
    extra
        .pointer("/onChain/transaction")
        .or_else(|| extra.get("transaction"))
        .and_then(Value::as_str)
        .map(ToOwned::to_owned)
}

/// EIP-712 domain name and version: the requirement's `extra` when present,
/// the catalog deployment otherwise.
fn eip712_domain_fields(
    requirement: &PaymentRequirement,
    deployment: &TokenDeployment,
) -> (String, String) {
    let from_extra = |key: &str| {
        requirement
            .extra
            .as_ref()
            .and_then(|extra| extra.get(key))
            .and_then(Value::as_str)
            .map(ToOwned::to_owned)
    };
    let name = from_extra("name")
        .or_else(|| deployment.eip712_name.map(ToOwned::to_owned))
        .unwrap_or_default();
    let version = from_extra("version")
        .or_else(|| deployment.eip712_version.map(ToOwned::to_owned))
        .unwrap_or_default();
    (name, version)
}

#[cfg(test)]
mod tests {
    use super::*;
    use payrail::encoding::base58;
    use payrail::requirement::{PriceRule, build_requirements};
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const HARDHAT_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const PAY_TO_EVM: &str = "0x2222222222222222222222222222222222222222";

    fn evm_requirements() -> RequirementSet {
        build_requirements(
            Environment::Test,
            &[PriceRule {
                token: "usdc".to_owned(),
                network: "base".to_owned(),
                pay_to: PAY_TO_EVM.to_owned(),
                amount: "1".to_owned(),
                max_timeout_seconds: 600,
            }],
        )
        .unwrap()
    }

    fn solana_requirements() -> RequirementSet {
        build_requirements(
            Environment::Test,
            &[PriceRule {
                token: "usdc".to_owned(),
                network: "solana".to_owned(),
                pay_to: "9xQeWvG816bUx9EPjHmaT23yvVM2ZWbrrpZb9PusVFin".to_owned(),
                amount: "1".to_owned(),
                max_timeout_seconds: 600,
            }],
        )
        .unwrap()
    }

    fn evm_rule(wallet: &str) -> PayerRule {
        PayerRule {
            token: "usdc".to_owned(),
            network: "base".to_owned(),
            from_wallet: wallet.to_owned(),
            private_key: HARDHAT_KEY.to_owned(),
        }
    }

    async fn mount_balance(server: &MockServer, wallet: &str, network: &str, amount: u128) {
        Mock::given(method("GET"))
            .and(path(format!("/wallets/{wallet}/balances")))
            .and(query_param("tokens", "usdc"))
            .and(query_param("chains", network))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
                "token": "usdc",
                "decimals": 6,
                "balances": { network: amount.to_string(), "total": amount.to_string() }
            }])))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn selects_the_first_affordable_rule_in_order() {
        let server = MockServer::start().await;
        mount_balance(&server, "poor", "base-sepolia", 100).await;
        mount_balance(&server, "rich", "base-sepolia", 5_000_000).await;

        let wallet = WalletClient::try_from(server.uri().as_str()).unwrap();
        let settlement = SettlementClient::try_from(server.uri().as_str()).unwrap();
        let selector = PayerSelector::new(Environment::Test, &wallet, &settlement);

        let rules = vec![evm_rule("poor"), evm_rule("rich")];
        let requirements = evm_requirements();
        let selected = selector.select(&rules, &requirements).await.unwrap();
        assert_eq!(selected.rule.from_wallet, "rich");
        assert_eq!(selected.available, 5_000_000);
        assert_eq!(selected.requirement.network, "base-sepolia");
    }

    #[tokio::test]
    async fn exhausting_all_rules_is_the_only_fatal_selection_error() {
        let server = MockServer::start().await;
        mount_balance(&server, "poor", "base-sepolia", 100).await;

        let wallet = WalletClient::try_from(server.uri().as_str()).unwrap();
        let settlement = SettlementClient::try_from(server.uri().as_str()).unwrap();
        let selector = PayerSelector::new(Environment::Test, &wallet, &settlement);

        // One rule with an unknown token, one that cannot afford: neither is
        // fatal on its own, together they exhaust the list.
        let rules = vec![
            PayerRule {
                token: "doge".to_owned(),
                ..evm_rule("poor")
            },
            evm_rule("poor"),
        ];
        let err = selector
            .select(&rules, &evm_requirements())
            .await
            .unwrap_err();
        assert!(matches!(err, PayerError::NoAffordableRule));
    }

    #[tokio::test]
    async fn pays_evm_requirement_without_touching_losing_rules() {
        let server = MockServer::start().await;
        mount_balance(&server, "poor", "base-sepolia", 100).await;
        mount_balance(&server, "rich", "base-sepolia", 5_000_000).await;
        Mock::given(method("POST"))
            .and(path("/settle"))
            .and(body_partial_json(json!({
                "x402Version": 1,
                "paymentRequirements": { "network": "base-sepolia" }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true })))
            .expect(1)
            .mount(&server)
            .await;

        let wallet = WalletClient::try_from(server.uri().as_str()).unwrap();
        let settlement = SettlementClient::try_from(server.uri().as_str()).unwrap();
        let selector = PayerSelector::new(Environment::Test, &wallet, &settlement);

        let rules = vec![evm_rule("poor"), evm_rule("rich")];
        let outcome = selector.pay(&rules, &evm_requirements()).await.unwrap();
        assert!(outcome.success);
        // No wallet transaction endpoints were hit: the EVM path signs
        // locally, and the losing rule was never signed or settled.
    }

    #[tokio::test]
    async fn pays_solana_requirement_through_the_approval_flow() {
        let server = MockServer::start().await;
        mount_balance(&server, "sol-wallet", "solana-devnet", 5_000_000).await;

        let mut blob_bytes = vec![1u8];
        blob_bytes.extend_from_slice(&[0x77u8; 64]);
        blob_bytes.extend_from_slice(b"message-bytes");
        let blob = base58::encode(&blob_bytes);

        Mock::given(method("POST"))
            .and(path("/wallets/sol-wallet/transactions"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "id": "tx_sol",
                "status": "success",
                "onChain": { "transaction": blob, "txId": "sig1" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/settle"))
            .and(body_partial_json(json!({ "transaction": blob })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true })))
            .expect(1)
            .mount(&server)
            .await;

        let wallet = WalletClient::try_from(server.uri().as_str()).unwrap();
        let settlement = SettlementClient::try_from(server.uri().as_str()).unwrap();
        let selector = PayerSelector::new(Environment::Test, &wallet, &settlement);

        let rules = vec![PayerRule {
            token: "usdc".to_owned(),
            network: "solana".to_owned(),
            from_wallet: "sol-wallet".to_owned(),
            private_key: base58::encode(&[13u8; 32]),
        }];
        let outcome = selector.pay(&rules, &solana_requirements()).await.unwrap();
        assert!(outcome.success);
    }

    #[test]
    fn payer_rule_debug_redacts_the_key() {
        let rule = evm_rule("w");
        let debug = format!("{rule:?}");
        assert!(!debug.contains(HARDHAT_KEY));
    }
}
