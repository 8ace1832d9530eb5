//! Client for the settlement facilitator's `/settle` endpoint.
//!
//! Facilitators differ in how they signal success, so the response is
//! interpreted defensively against three known shapes, in priority order:
//!
//! 1. a top-level `success` boolean
//! 2. a top-level `paymentValid` boolean
//! 3. a nested `paymentResponse.status` equal to 200
//!
//! When none of them is present the settlement is recorded as **not**
//! successful. An HTTP-level failure raises with the facilitator's status
//! and body attached; a 2xx response that fails to parse as JSON also
//! raises, because a malformed success response must never be treated as
//! success.

use http::{HeaderMap, StatusCode};
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use url::Url;

use payrail::envelope::PaymentEnvelope;
use payrail::networks::NetworkFamily;
use payrail::requirement::PaymentRequirement;

/// Errors from settlement requests.
#[derive(Debug, thiserror::Error)]
pub enum SettleClientError {
    /// URL construction failed.
    #[error("URL parse error: {context}: {source}")]
    UrlParse {
        /// Human-readable context.
        context: &'static str,
        /// The underlying parse error.
        #[source]
        source: url::ParseError,
    },
    /// The HTTP request could not be sent or completed.
    #[error("HTTP error: {context}: {source}")]
    Http {
        /// Human-readable context.
        context: &'static str,
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },
    /// The facilitator answered with a non-2xx status.
    #[error("facilitator returned {status}: {body}")]
    Status {
        /// The HTTP status code.
        status: StatusCode,
        /// The response body.
        body: String,
    },
    /// A 2xx response did not parse as JSON.
    #[error("facilitator returned malformed JSON: {source}")]
    MalformedResponse {
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },
    /// The response body could not be read.
    #[error("failed to read facilitator response body: {source}")]
    Body {
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },
}

/// The normalized result of a settlement attempt.
#[derive(Debug, Clone)]
pub struct SettlementOutcome {
    /// Whether the facilitator positively signaled success.
    pub success: bool,
    /// The on-chain transaction hash, when reported.
    pub tx_hash: Option<String>,
    /// The facilitator's error text, when reported.
    pub error: Option<String>,
    /// The full facilitator response for callers that need more.
    pub raw: Value,
}

impl SettlementOutcome {
    /// Interprets a facilitator response body.
    ///
    /// Pure and fail-closed: ambiguity yields `success == false`.
    #[must_use]
    pub fn interpret(raw: Value) -> Self {
        let success = if let Some(flag) = raw.get("success").and_then(Value::as_bool) {
            flag
        } else if let Some(flag) = raw.get("paymentValid").and_then(Value::as_bool) {
            flag
        } else if let Some(status) = raw.pointer("/paymentResponse/status").and_then(Value::as_u64)
        {
            status == 200
        } else {
            false
        };

        let tx_hash = ["transaction", "txHash", "transactionHash"]
            .iter()
            .find_map(|key| raw.get(key).and_then(Value::as_str))
            .map(ToOwned::to_owned);

        let error = ["error", "errorReason"]
            .iter()
            .find_map(|key| raw.get(key).and_then(Value::as_str))
            .map(ToOwned::to_owned);

        Self {
            success,
            tx_hash,
            error,
            raw,
        }
    }
}

/// A client for a remote settlement facilitator.
#[derive(Clone, Debug)]
pub struct SettlementClient {
    base_url: Url,
    settle_url: Url,
    client: Client,
    headers: HeaderMap,
    timeout: Option<Duration>,
}

impl SettlementClient {
    /// Constructs a client from the facilitator's base URL, resolving the
    /// `./settle` endpoint relative to it.
    ///
    /// # Errors
    ///
    /// Returns [`SettleClientError::UrlParse`] when endpoint construction
    /// fails.
    pub fn try_new(base_url: Url) -> Result<Self, SettleClientError> {
        let settle_url = base_url
            .join("./settle")
            .map_err(|e| SettleClientError::UrlParse {
                context: "failed to construct ./settle URL",
                source: e,
            })?;
        Ok(Self {
            base_url,
            settle_url,
            client: Client::new(),
            headers: HeaderMap::new(),
            timeout: None,
        })
    }

    /// Attaches custom headers to all future requests.
    #[must_use]
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Sets a timeout for all future requests.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Returns the facilitator base URL.
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Returns the computed `./settle` URL.
    pub const fn settle_url(&self) -> &Url {
        &self.settle_url
    }

    /// Submits a payment envelope for settlement.
    ///
    /// The body carries the envelope, the matched requirement, the original
    /// payment header when available, and - for Solana payments - the
    /// extracted transaction blob, since the facilitator settles the
    /// transaction itself.
    ///
    /// # Errors
    ///
    /// Returns [`SettleClientError`] on transport failure, a non-2xx
    /// facilitator response, or a malformed 2xx body.
    pub async fn settle(
        &self,
        envelope: &PaymentEnvelope,
        requirement: &PaymentRequirement,
        payment_header: Option<&str>,
    ) -> Result<SettlementOutcome, SettleClientError> {
        let mut body = serde_json::json!({
            "x402Version": envelope.x402_version,
            "paymentPayload": envelope,
            "paymentRequirements": requirement,
        });
        if let Some(header) = payment_header {
            body["paymentHeader"] = Value::String(header.to_owned());
        }
        if envelope.family() == NetworkFamily::Solana {
            if let Ok(payload) = envelope.solana_payload() {
                body["transaction"] = Value::String(payload.transaction);
            }
        }

        let mut request = self.client.post(self.settle_url.clone()).json(&body);
        for (key, value) in &self.headers {
            request = request.header(key, value);
        }
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }
        let response = request
            .send()
            .await
            .map_err(|e| SettleClientError::Http {
                context: "POST /settle",
                source: e,
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .map_err(|e| SettleClientError::Body { source: e })?;
            tracing::warn!(%status, network = envelope.network, "settlement rejected by facilitator");
            return Err(SettleClientError::Status { status, body });
        }

        let raw: Value = response
            .json()
            .await
            .map_err(|e| SettleClientError::MalformedResponse { source: e })?;
        let outcome = SettlementOutcome::interpret(raw);
        tracing::info!(
            success = outcome.success,
            tx_hash = outcome.tx_hash.as_deref(),
            network = envelope.network,
            "settlement completed"
        );
        Ok(outcome)
    }
}

/// Parses a string URL into a `SettlementClient`, normalizing the trailing
/// slash.
impl TryFrom<&str> for SettlementClient {
    type Error = SettleClientError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let mut normalized = value.trim_end_matches('/').to_string();
        normalized.push('/');
        let url = Url::parse(&normalized).map_err(|e| SettleClientError::UrlParse {
            context: "failed to parse base url",
            source: e,
        })?;
        Self::try_new(url)
    }
}
