//! REST client for the custodial wallet backend.
//!
//! Four endpoints cover everything the approval flow and payer selection
//! need: create a transaction, submit an approval signature, read a
//! transaction's status, and read a wallet's token balances.
//!
//! ## Error handling
//!
//! Backend failures are passed through unmodified: a non-2xx response
//! surfaces as [`WalletApiError::Status`] with the original status code and
//! body, so callers always see the service's own error text. Authentication
//! is opaque to this client; the caller supplies whatever headers the
//! backend expects.

use http::{HeaderMap, StatusCode};
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use url::Url;

use crate::types::{TokenBalance, TransactionRecord};

/// Errors from wallet backend requests.
#[derive(Debug, thiserror::Error)]
pub enum WalletApiError {
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
    /// The backend answered with a non-2xx status; status and body are the
    /// backend's own, unmodified.
    #[error("wallet API returned {status}: {context}: {body}")]
    Status {
        /// Human-readable context.
        context: &'static str,
        /// The HTTP status code.
        status: StatusCode,
        /// The response body.
        body: String,
    },
    /// A 2xx response failed to deserialize.
    #[error("failed to deserialize JSON: {context}: {source}")]
    Json {
        /// Human-readable context.
        context: &'static str,
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },
    /// The response body could not be read.
    #[error("failed to read response body: {context}: {source}")]
    Body {
        /// Human-readable context.
        context: &'static str,
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },
}

/// A client for the custodial wallet backend.
#[derive(Clone, Debug)]
pub struct WalletClient {
    base_url: Url,
    client: Client,
    headers: HeaderMap,
    timeout: Option<Duration>,
}

impl WalletClient {
    /// Constructs a client from the backend's base URL.
    ///
    /// # Errors
    ///
    /// Returns [`WalletApiError::UrlParse`] when the URL cannot serve as a
    /// base.
    pub fn try_new(base_url: Url) -> Result<Self, WalletApiError> {
        if base_url.cannot_be_a_base() {
            return Err(WalletApiError::UrlParse {
                context: "base URL cannot be a base",
                source: url::ParseError::RelativeUrlWithoutBase,
            });
        }
        Ok(Self {
            base_url,
            client: Client::new(),
            headers: HeaderMap::new(),
            timeout: None,
        })
    }

    /// Attaches headers (typically authentication) to all future requests.
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

    /// Returns the backend base URL.
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Creates a transaction on a wallet.
    ///
    /// The response either carries zero pending approvals (the backend
    /// could execute directly) or names the message an external signer must
    /// sign.
    ///
    /// # Errors
    ///
    /// Returns [`WalletApiError`] on transport failure or a backend error
    /// response.
    pub async fn create_transaction(
        &self,
        wallet: &str,
        params: &Value,
    ) -> Result<TransactionRecord, WalletApiError> {
        let url = self.join(&format!("wallets/{wallet}/transactions"), "create transaction")?;
        let body = serde_json::json!({ "params": params });
        self.post_json(&url, "POST create-transaction", &body).await
    }

    /// Submits an approval signature for a pending transaction.
    ///
    /// Returns the raw response; its shape varies, so the caller probes it
    /// with [`crate::extract`].
    ///
    /// # Errors
    ///
    /// Returns [`WalletApiError`] on transport failure or a backend error
    /// response.
    pub async fn submit_approval(
        &self,
        wallet: &str,
        transaction_id: &str,
        signer: &str,
        signature: &str,
    ) -> Result<Value, WalletApiError> {
        let url = self.join(
            &format!("wallets/{wallet}/transactions/{transaction_id}/approvals"),
            "submit approval",
        )?;
        let body = serde_json::json!({
            "approvals": [{ "signer": signer, "signature": signature }]
        });
        self.post_json(&url, "POST submit-approval", &body).await
    }

    /// Reads a transaction's current state.
    ///
    /// # Errors
    ///
    /// Returns [`WalletApiError`] on transport failure or a backend error
    /// response.
    pub async fn get_transaction(
        &self,
        wallet: &str,
        transaction_id: &str,
    ) -> Result<TransactionRecord, WalletApiError> {
        let url = self.join(
            &format!("wallets/{wallet}/transactions/{transaction_id}"),
            "transaction status",
        )?;
        self.get_json(&url, "GET transaction-status").await
    }

    /// Reads a wallet's balances for the given tokens on the given networks.
    ///
    /// # Errors
    ///
    /// Returns [`WalletApiError`] on transport failure or a backend error
    /// response.
    pub async fn get_balances(
        &self,
        wallet: &str,
        tokens: &[&str],
        networks: &[&str],
    ) -> Result<Vec<TokenBalance>, WalletApiError> {
        let mut url = self.join(&format!("wallets/{wallet}/balances"), "wallet balance")?;
        url.query_pairs_mut()
            .append_pair("tokens", &tokens.join(","))
            .append_pair("chains", &networks.join(","));
        self.get_json(&url, "GET wallet-balance").await
    }

    fn join(&self, path: &str, context: &'static str) -> Result<Url, WalletApiError> {
        self.base_url
            .join(path)
            .map_err(|e| WalletApiError::UrlParse { context, source: e })
    }

    async fn post_json<T, R>(
        &self,
        url: &Url,
        context: &'static str,
        payload: &T,
    ) -> Result<R, WalletApiError>
    where
        T: serde::Serialize + Sync + ?Sized,
        R: serde::de::DeserializeOwned,
    {
        let mut request = self.client.post(url.clone()).json(payload);
        for (key, value) in &self.headers {
            request = request.header(key, value);
        }
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }
        let response = request
            .send()
            .await
            .map_err(|e| WalletApiError::Http { context, source: e })?;
        Self::read_json(response, context).await
    }

    async fn get_json<R>(&self, url: &Url, context: &'static str) -> Result<R, WalletApiError>
    where
        R: serde::de::DeserializeOwned,
    {
        let mut request = self.client.get(url.clone());
        for (key, value) in &self.headers {
            request = request.header(key, value);
        }
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }
        let response = request
            .send()
            .await
            .map_err(|e| WalletApiError::Http { context, source: e })?;
        Self::read_json(response, context).await
    }

    async fn read_json<R>(
        response: reqwest::Response,
        context: &'static str,
    ) -> Result<R, WalletApiError>
    where
        R: serde::de::DeserializeOwned,
    {
        let status = response.status();
        if status.is_success() {
            response
                .json::<R>()
                .await
                .map_err(|e| WalletApiError::Json { context, source: e })
        } else {
            let body = response
                .text()
                .await
                .map_err(|e| WalletApiError::Body { context, source: e })?;
            Err(WalletApiError::Status {
                context,
                status,
                body,
            })
        }
    }
}

/// Parses a string URL into a `WalletClient`, normalizing the trailing
/// slash so endpoint joins behave.
impl TryFrom<&str> for WalletClient {
    type Error = WalletApiError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let mut normalized = value.trim_end_matches('/').to_string();
        normalized.push('/');
        let url = Url::parse(&normalized).map_err(|e| WalletApiError::UrlParse {
            context: "failed to parse base url",
            source: e,
        })?;
        Self::try_new(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client(server: &MockServer) -> WalletClient {
        WalletClient::try_from(server.uri().as_str()).unwrap()
    }

    #[tokio::test]
    async fn creates_transactions() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/wallets/w1/transactions"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "id": "tx_1",
                "status": "awaiting-approval",
                "approvals": { "pending": [{ "signer": { "locator": "external-wallet:abc" }, "message": "m1" }] }
            })))
            .mount(&server)
            .await;

        let record = client(&server)
            .await
            .create_transaction("w1", &json!({ "calls": [] }))
            .await
            .unwrap();
        assert_eq!(record.id, "tx_1");
        assert_eq!(record.status, crate::types::TransactionStatus::AwaitingApproval);
        assert_eq!(record.approvals.unwrap().pending.len(), 1);
    }

    #[tokio::test]
    async fn passes_backend_errors_through() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/wallets/w1/transactions/tx_9"))
            .respond_with(ResponseTemplate::new(403).set_body_string("{\"error\":\"forbidden\"}"))
            .mount(&server)
            .await;

        let err = client(&server)
            .await
            .get_transaction("w1", "tx_9")
            .await
            .unwrap_err();
        match err {
            WalletApiError::Status { status, body, .. } => {
                assert_eq!(status, StatusCode::FORBIDDEN);
                assert_eq!(body, "{\"error\":\"forbidden\"}");
            }
            other => panic!("expected Status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn queries_balances_with_tokens_and_chains() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/wallets/w1/balances"))
            .and(query_param("tokens", "usdc"))
            .and(query_param("chains", "base-sepolia"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
                "token": "usdc",
                "decimals": 6,
                "balances": { "base-sepolia": "42", "total": "42" }
            }])))
            .mount(&server)
            .await;

        let balances = client(&server)
            .await
            .get_balances("w1", &["usdc"], &["base-sepolia"])
            .await
            .unwrap();
        assert_eq!(balances.len(), 1);
        assert_eq!(balances[0].on_network("base-sepolia"), 42);
    }
}
