//! The x402 payment envelope: codec, shape validator, and semantic verifier.
//!
//! An envelope arrives as `base64(JSON(...))` in the `X-PAYMENT` header.
//! Decoding is strictly layered:
//!
//! 1. [`PaymentEnvelope::from_header`] - Base64 → UTF-8 → JSON, no semantic
//!    checks; the payload stays raw JSON so malformed payments can be
//!    reported field-by-field.
//! 2. [`PaymentEnvelope::validate_shape`] - required fields per chain family,
//!    reporting every missing or mistyped path by its exact dotted name.
//! 3. [`PaymentEnvelope::verify`] - amount, destination, and validity-window
//!    checks against a [`RequirementSet`]; errors accumulate instead of
//!    short-circuiting.

use alloy_primitives::U256;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as b64;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use crate::networks::NetworkFamily;
use crate::requirement::{PaymentRequirement, RequirementSet};
use crate::timestamp::UnixTimestamp;

/// Errors from envelope decoding.
#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    /// The header value is not valid Base64.
    #[error("payment header is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    /// The decoded header is not valid UTF-8.
    #[error("payment header does not decode to UTF-8 text")]
    Utf8,
    /// The decoded header is not valid JSON.
    #[error("payment header does not decode to JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// The payload does not hold the typed shape requested.
    #[error("payment payload is not a valid {expected} payload")]
    WrongPayloadShape {
        /// The payload family that was requested.
        expected: &'static str,
    },
}

/// A decoded x402 payment envelope.
///
/// The `payload` is kept as raw JSON; its expected shape depends on the
/// network family and is checked by [`Self::validate_shape`], after which
/// [`Self::solana_payload`] / [`Self::evm_payload`] give typed views.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentEnvelope {
    /// Protocol version carried by the payer (1 for this wire format).
    #[serde(default)]
    pub x402_version: u8,
    /// The payment scheme (e.g., "exact").
    #[serde(default)]
    pub scheme: String,
    /// The V1 network name the payment targets.
    #[serde(default)]
    pub network: String,
    /// Scheme- and family-specific payload, unvalidated at parse time.
    #[serde(default)]
    pub payload: Value,
}

/// A Solana payment payload: an opaque signed transaction.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolanaPayload {
    /// The serialized, signed transaction, encoded as a string.
    pub transaction: String,
}

/// An ERC-3009 `transferWithAuthorization` message, all fields as strings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvmAuthorization {
    /// The payer address.
    pub from: String,
    /// The recipient address.
    pub to: String,
    /// Transfer amount in atomic units, decimal-encoded.
    pub value: String,
    /// Earliest Unix time the authorization is valid.
    pub valid_after: String,
    /// Latest Unix time the authorization is valid.
    pub valid_before: String,
    /// Random 32-byte nonce, hex-encoded.
    pub nonce: String,
}

/// An EVM payment payload: a signature over an [`EvmAuthorization`].
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvmPayload {
    /// The EIP-712 signature, hex-encoded.
    pub signature: String,
    /// The signed authorization message.
    pub authorization: EvmAuthorization,
}

/// One structural problem found by [`PaymentEnvelope::validate_shape`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapeProblem {
    /// Dotted path of the offending field (e.g. `payload.authorization.nonce`).
    pub path: String,
}

impl Display for ShapeProblem {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}: missing or not a string", self.path)
    }
}

/// The full list of structural problems in an envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapeError {
    /// Every missing or mistyped field, in declaration order.
    pub problems: Vec<ShapeProblem>,
}

impl Display for ShapeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let joined = self
            .problems
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        write!(f, "invalid payment payload: {joined}")
    }
}

impl std::error::Error for ShapeError {}

/// The outcome of semantic verification against a requirement set.
#[derive(Debug, Clone)]
pub struct Verification<'a> {
    /// `true` when every check passed.
    pub valid: bool,
    /// Every failed check, in evaluation order.
    pub errors: Vec<String>,
    /// The requirement the envelope was matched against, when one exists.
    pub matched: Option<&'a PaymentRequirement>,
}

impl Verification<'_> {
    /// Joins all verification errors into a single message.
    #[must_use]
    pub fn error_message(&self) -> String {
        self.errors.join("; ")
    }
}

/// Required string fields of an EVM payload.
const EVM_REQUIRED_PATHS: &[&str] = &[
    "payload.signature",
    "payload.authorization.from",
    "payload.authorization.to",
    "payload.authorization.value",
    "payload.authorization.validAfter",
    "payload.authorization.validBefore",
    "payload.authorization.nonce",
];

/// Required string fields of a Solana payload.
const SOLANA_REQUIRED_PATHS: &[&str] = &["payload.transaction"];

impl PaymentEnvelope {
    /// Decodes an `X-PAYMENT` header value.
    ///
    /// Performs Base64, UTF-8, and JSON decoding only; shape and semantics
    /// are checked separately so every problem can be reported precisely.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError`] when any decoding layer fails.
    pub fn from_header(header: &str) -> Result<Self, EnvelopeError> {
        let bytes = b64.decode(header.trim())?;
        let text = String::from_utf8(bytes).map_err(|_| EnvelopeError::Utf8)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Encodes the envelope for an `X-PAYMENT` header.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::Json`] if serialization fails.
    pub fn to_header(&self) -> Result<String, EnvelopeError> {
        let json = serde_json::to_vec(self)?;
        Ok(b64.encode(&json))
    }

    /// Returns the chain family the envelope's network belongs to.
    #[must_use]
    pub fn family(&self) -> NetworkFamily {
        NetworkFamily::of(&self.network)
    }

    /// Checks that the payload carries every field its chain family
    /// requires.
    ///
    /// # Errors
    ///
    /// Returns a [`ShapeError`] listing each missing or mistyped field by
    /// its exact dotted path.
    pub fn validate_shape(&self) -> Result<(), ShapeError> {
        let required = match self.family() {
            NetworkFamily::Solana => SOLANA_REQUIRED_PATHS,
            NetworkFamily::Evm => EVM_REQUIRED_PATHS,
        };
        let problems: Vec<ShapeProblem> = required
            .iter()
            .filter(|path| self.string_at(path).is_none())
            .map(|path| ShapeProblem {
                path: (*path).to_owned(),
            })
            .collect();
        if problems.is_empty() {
            Ok(())
        } else {
            Err(ShapeError { problems })
        }
    }

    /// Verifies the envelope against the offered requirements.
    ///
    /// Looks up the requirement by case-insensitive network match, then
    /// checks amount, destination, and validity window for EVM payments.
    /// Solana payments only need a transaction present; their introspection
    /// is deferred to the settlement facilitator. All failed checks are
    /// accumulated rather than short-circuiting.
    #[must_use]
    pub fn verify<'a>(
        &self,
        requirements: &'a RequirementSet,
        now: UnixTimestamp,
    ) -> Verification<'a> {
        let mut errors = Vec::new();

        let Some(matched) = requirements.find_network(&self.network) else {
            errors.push(format!(
                "no payment requirement accepts network '{}'",
                self.network
            ));
            return Verification {
                valid: false,
                errors,
                matched: None,
            };
        };

        match self.family() {
            NetworkFamily::Solana => self.verify_solana(&mut errors),
            NetworkFamily::Evm => self.verify_evm(matched, now, &mut errors),
        }

        Verification {
            valid: errors.is_empty(),
            errors,
            matched: Some(matched),
        }
    }

    fn verify_solana(&self, errors: &mut Vec<String>) {
        // Amount and destination live inside an opaque transaction blob;
        // the facilitator re-checks both at settlement.
        match self.string_at("payload.transaction") {
            Some(transaction) if !transaction.is_empty() => {}
            _ => errors.push("payload.transaction: missing or not a string".to_owned()),
        }
    }

    fn verify_evm(
        &self,
        matched: &PaymentRequirement,
        now: UnixTimestamp,
        errors: &mut Vec<String>,
    ) {
        let payload = match self.evm_payload() {
            Ok(payload) => payload,
            Err(_) => {
                errors.push("payload is not a valid EVM authorization payload".to_owned());
                return;
            }
        };
        let authorization = &payload.authorization;

        let required = U256::from(matched.max_amount_required.inner());
        match U256::from_str(&authorization.value) {
            Ok(value) if value >= required => {}
            Ok(value) => errors.push(format!(
                "payment amount {value} is below the required {required}"
            )),
            Err(_) => errors.push(format!(
                "payload.authorization.value '{}' is not an integer",
                authorization.value
            )),
        }

        if !authorization.to.eq_ignore_ascii_case(&matched.pay_to) {
            errors.push(format!(
                "payment destination {} does not match required recipient {}",
                authorization.to, matched.pay_to
            ));
        }

        let valid_after = authorization.valid_after.parse::<u64>();
        let valid_before = authorization.valid_before.parse::<u64>();
        match (valid_after, valid_before) {
            (Ok(after), Ok(before)) => {
                let now = now.as_secs();
                if now < after {
                    errors.push(format!(
                        "authorization is not valid until {after} (now {now})"
                    ));
                }
                if now > before {
                    errors.push(format!("authorization expired at {before} (now {now})"));
                }
            }
            _ => errors.push(
                "payload.authorization.validAfter/validBefore are not integer timestamps"
                    .to_owned(),
            ),
        }
    }

    /// Returns the typed Solana payload view.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::WrongPayloadShape`] when the payload does
    /// not carry a transaction string.
    pub fn solana_payload(&self) -> Result<SolanaPayload, EnvelopeError> {
        serde_json::from_value(self.payload.clone())
            .map_err(|_| EnvelopeError::WrongPayloadShape { expected: "Solana" })
    }

    /// Returns the typed EVM payload view.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::WrongPayloadShape`] when the payload does
    /// not carry a signature and full authorization.
    pub fn evm_payload(&self) -> Result<EvmPayload, EnvelopeError> {
        serde_json::from_value(self.payload.clone())
            .map_err(|_| EnvelopeError::WrongPayloadShape { expected: "EVM" })
    }

    /// Looks up a dotted path under the envelope root and returns the string
    /// value there, if any.
    fn string_at(&self, path: &str) -> Option<&str> {
        let mut segments = path.split('.');
        if segments.next() != Some("payload") {
            return None;
        }
        let mut current = &self.payload;
        for segment in segments {
            current = current.get(segment)?;
        }
        current.as_str()
    }
}
