//! HTTP header encoding and decoding for the x402 payment protocol.
//!
//! The payment proof travels in `X-PAYMENT` as Base64-encoded JSON; a
//! successful settlement is echoed back in `X-PAYMENT-RESPONSE` the same
//! way; an unpaid request is answered with HTTP 402 and a JSON
//! [`PaymentRequired`] body.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as b64;
use serde::{Deserialize, Serialize};

use crate::envelope::{EnvelopeError, PaymentEnvelope};
use crate::requirement::{PaymentRequirement, RequirementSet};

/// Request header carrying the payment envelope.
pub const X_PAYMENT: &str = "X-PAYMENT";

/// Response header echoing the settlement result.
pub const X_PAYMENT_RESPONSE: &str = "X-PAYMENT-RESPONSE";

/// HTTP 402 response body listing acceptable payments.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequired {
    /// Protocol version (always 1 for this wire format).
    pub x402_version: u8,
    /// Payment requirements the resource accepts.
    #[serde(default)]
    pub accepts: Vec<PaymentRequirement>,
    /// Optional error message when a presented payment was rejected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Settlement result carried in the `X-PAYMENT-RESPONSE` header.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentResponseHeader {
    /// Whether settlement succeeded.
    pub success: bool,
    /// The network the payment settled on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_id: Option<String>,
}

impl PaymentRequired {
    /// Builds a 402 body from a requirement set, with no error message.
    #[must_use]
    pub fn new(accepts: &RequirementSet) -> Self {
        Self {
            x402_version: 1,
            accepts: accepts.as_slice().to_vec(),
            error: None,
        }
    }

    /// Attaches an error message explaining why a payment was rejected.
    #[must_use]
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Decodes an `X-PAYMENT` header value into an envelope.
///
/// # Errors
///
/// Returns [`EnvelopeError`] on Base64, UTF-8, or JSON decode failure.
pub fn decode_payment_header(header_value: &str) -> Result<PaymentEnvelope, EnvelopeError> {
    PaymentEnvelope::from_header(header_value)
}

/// Encodes a settlement result for the `X-PAYMENT-RESPONSE` header.
///
/// # Errors
///
/// Returns [`EnvelopeError::Json`] if serialization fails.
pub fn encode_payment_response(response: &PaymentResponseHeader) -> Result<String, EnvelopeError> {
    let json = serde_json::to_vec(response)?;
    Ok(b64.encode(&json))
}

/// Decodes an `X-PAYMENT-RESPONSE` header value.
///
/// # Errors
///
/// Returns [`EnvelopeError`] on Base64 or JSON decode failure.
pub fn decode_payment_response(
    header_value: &str,
) -> Result<PaymentResponseHeader, EnvelopeError> {
    let bytes = b64.decode(header_value.trim())?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payment_response_round_trip() {
        let response = PaymentResponseHeader {
            success: true,
            network_id: Some("base-sepolia".to_owned()),
        };
        let header = encode_payment_response(&response).unwrap();
        let decoded = decode_payment_response(&header).unwrap();
        assert!(decoded.success);
        assert_eq!(decoded.network_id.as_deref(), Some("base-sepolia"));
    }

    #[test]
    fn payment_required_serializes_camel_case() {
        let body = PaymentRequired::new(&RequirementSet::default()).with_error("no payment");
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["x402Version"], 1);
        assert_eq!(json["error"], "no payment");
        assert!(json["accepts"].as_array().unwrap().is_empty());
    }
}
