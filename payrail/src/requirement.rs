//! Payment requirements: the price to access a resource.
//!
//! A [`PaymentRequirement`] is the canonical, chain-family-aware statement of
//! "pay this much of this asset on this network to this address". A resource
//! offers a [`RequirementSet`] in its HTTP 402 response; a payment envelope
//! is verified against that set.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::networks::{self, Environment, TokenDeployment};

/// An amount in atomic token units (10^-decimals), serialized as a decimal
/// string to survive JSON parsers without 128-bit integers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct AtomicAmount(u128);

impl AtomicAmount {
    /// Returns the inner atomic unit count.
    #[must_use]
    pub const fn inner(&self) -> u128 {
        self.0
    }
}

impl From<u128> for AtomicAmount {
    fn from(value: u128) -> Self {
        Self(value)
    }
}

impl FromStr for AtomicAmount {
    type Err = <u128 as FromStr>::Err;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u128>().map(Self)
    }
}

impl Display for AtomicAmount {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for AtomicAmount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for AtomicAmount {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse::<u128>()
            .map(Self)
            .map_err(|_| serde::de::Error::custom("amount must be a non-negative integer string"))
    }
}

/// Errors from requirement construction.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequirementError {
    /// Two requirements were declared for the same network.
    #[error("duplicate payment requirement for network '{network}'")]
    DuplicateNetwork {
        /// The network declared twice.
        network: String,
    },
    /// A price rule referenced a token the catalog does not list.
    #[error("no known deployment of token '{token}' on network '{network}'")]
    UnknownToken {
        /// The requested token symbol.
        token: String,
        /// The requested network.
        network: String,
    },
    /// A payment amount could not be parsed or converted to atomic units.
    #[error("invalid payment amount '{amount}': {reason}")]
    InvalidAmount {
        /// The offending amount string.
        amount: String,
        /// Why it was rejected.
        reason: String,
    },
}

/// Payment terms for one network: scheme, asset, recipient, and amount.
///
/// Wire form matches the x402 V1 `paymentRequirements` object (camelCase,
/// string-encoded amounts).
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequirement {
    /// The payment scheme (e.g., "exact").
    pub scheme: String,
    /// The V1 network name (e.g., "base-sepolia").
    pub network: String,
    /// The maximum amount required, in atomic units.
    pub max_amount_required: AtomicAmount,
    /// The recipient address for payment.
    pub pay_to: String,
    /// The token contract or mint address.
    pub asset: String,
    /// Maximum validity window for a payment authorization, in seconds.
    pub max_timeout_seconds: u64,
    /// The resource URL being paid for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
    /// Human-readable description of the resource.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// MIME type of the resource.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// Scheme-specific extra data (EIP-712 domain name/version on EVM).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<serde_json::Value>,
}

/// The set of payment requirements offered for a single resource.
///
/// Holds at most one requirement per network; the constructor rejects
/// duplicates rather than silently overwriting.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RequirementSet {
    requirements: Vec<PaymentRequirement>,
}

impl RequirementSet {
    /// Builds a set from a list of requirements.
    ///
    /// # Errors
    ///
    /// Returns [`RequirementError::DuplicateNetwork`] if two requirements
    /// name the same network (case-insensitively).
    pub fn new(requirements: Vec<PaymentRequirement>) -> Result<Self, RequirementError> {
        for (i, requirement) in requirements.iter().enumerate() {
            let duplicate = requirements[..i]
                .iter()
                .any(|other| other.network.eq_ignore_ascii_case(&requirement.network));
            if duplicate {
                return Err(RequirementError::DuplicateNetwork {
                    network: requirement.network.clone(),
                });
            }
        }
        Ok(Self { requirements })
    }

    /// Finds the requirement for a network, case-insensitively.
    #[must_use]
    pub fn find_network(&self, network: &str) -> Option<&PaymentRequirement> {
        self.requirements
            .iter()
            .find(|requirement| requirement.network.eq_ignore_ascii_case(network))
    }

    /// Returns the requirements as a slice, in declaration order.
    #[must_use]
    pub fn as_slice(&self) -> &[PaymentRequirement] {
        &self.requirements
    }

    /// Returns `true` if the set holds no requirements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }

    /// Returns the number of requirements in the set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.requirements.len()
    }
}

/// A user-configured pricing rule: accept `amount` of `token` on `network`,
/// paid to `pay_to`.
///
/// Rules are resolved against the environment's token catalog and expanded
/// into concrete [`PaymentRequirement`]s by [`build_requirements`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PriceRule {
    /// Lower-case token symbol ("usdc").
    pub token: String,
    /// Network name, possibly a generic alias folded per environment.
    pub network: String,
    /// Recipient address on that network.
    pub pay_to: String,
    /// Human or atomic amount; see [`to_atomic_units`].
    pub amount: String,
    /// Maximum validity window in seconds for payment authorizations.
    pub max_timeout_seconds: u64,
}

/// Expands price rules into a [`RequirementSet`] using the environment's
/// token catalog.
///
/// # Errors
///
/// Returns [`RequirementError`] on unknown tokens, unparseable amounts, or
/// two rules resolving to the same network.
pub fn build_requirements(
    env: Environment,
    rules: &[PriceRule],
) -> Result<RequirementSet, RequirementError> {
    let mut requirements = Vec::with_capacity(rules.len());
    for rule in rules {
        let network = networks::canonical_network(env, &rule.network);
        let deployment = networks::find_token(env, &network, &rule.token).ok_or_else(|| {
            RequirementError::UnknownToken {
                token: rule.token.clone(),
                network: network.clone(),
            }
        })?;
        let atomic = to_atomic_units(&rule.amount, deployment.decimals)?;
        requirements.push(PaymentRequirement {
            scheme: "exact".to_owned(),
            network,
            max_amount_required: atomic.into(),
            pay_to: rule.pay_to.clone(),
            asset: deployment.asset.to_owned(),
            max_timeout_seconds: rule.max_timeout_seconds,
            resource: None,
            description: None,
            mime_type: None,
            extra: eip712_extra(deployment),
        });
    }
    RequirementSet::new(requirements)
}

fn eip712_extra(deployment: &TokenDeployment) -> Option<serde_json::Value> {
    match (deployment.eip712_name, deployment.eip712_version) {
        (Some(name), Some(version)) => Some(serde_json::json!({
            "name": name,
            "version": version,
        })),
        _ => None,
    }
}

/// Converts a payment amount to atomic units.
///
/// Inputs at or above 10^6 are taken to already be atomic and are floored;
/// smaller inputs are treated as human units, multiplied by 10^`decimals`
/// and rounded.
///
/// # Errors
///
/// Returns [`RequirementError::InvalidAmount`] on unparseable or negative
/// input, or when the result overflows.
pub fn to_atomic_units(amount: &str, decimals: u8) -> Result<u128, RequirementError> {
    let invalid = |reason: &str| RequirementError::InvalidAmount {
        amount: amount.to_owned(),
        reason: reason.to_owned(),
    };

    let parsed = Decimal::from_str(amount.trim()).map_err(|_| invalid("not a decimal number"))?;
    if parsed.is_sign_negative() {
        return Err(invalid("amount is negative"));
    }

    const ATOMIC_THRESHOLD: u64 = 1_000_000;
    if parsed >= Decimal::from(ATOMIC_THRESHOLD) {
        return parsed
            .floor()
            .to_u128()
            .ok_or_else(|| invalid("amount out of range"));
    }

    let scale = Decimal::from(10u64.pow(u32::from(decimals)));
    parsed
        .checked_mul(scale)
        .and_then(|scaled| scaled.round().to_u128())
        .ok_or_else(|| invalid("amount out of range"))
}
