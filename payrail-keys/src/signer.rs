//! Message signing and ERC-3009 authorization signing.
//!
//! Two signing surfaces cover the two payment paths:
//!
//! - [`sign_message`] - a raw message, signed per the key family. The
//!   custodial wallet approval flow hands the payer a message to sign; for
//!   Solana keys the message is Base58 when decodable, raw UTF-8 otherwise.
//! - [`sign_transfer_authorization`] - an EIP-712 `TransferWithAuthorization`
//!   for EVM payments, producing the payload carried in an x402 envelope.

use alloy_primitives::{Address, FixedBytes, U256, hex};
use alloy_signer::SignerSync;
use alloy_sol_types::{SolStruct, eip712_domain, sol};
use p256::ecdsa::signature::Signer as _;
use rand::RngExt;
use rand::rng;
use std::str::FromStr;

use payrail::encoding::base58;
use payrail::envelope::{EvmAuthorization, EvmPayload};
use payrail::networks::{self, BASE_SEPOLIA};
use payrail::timestamp::UnixTimestamp;

use crate::ed25519;
use crate::resolver::{KeyFamily, KeyMaterial, KeySecret};

sol! {
    struct TransferWithAuthorization {
        address from;
        address to;
        uint256 value;
        uint256 validAfter;
        uint256 validBefore;
        bytes32 nonce;
    }
}

/// Errors from signing operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SignError {
    /// The key family cannot perform the requested operation.
    #[error("{operation} is not supported for {family:?} keys")]
    UnsupportedAlgorithm {
        /// The family of the provided key.
        family: KeyFamily,
        /// The operation that was attempted.
        operation: &'static str,
    },
    /// An address or parameter failed to parse.
    #[error("invalid signing input: {0}")]
    InvalidInput(String),
    /// The underlying signer failed.
    #[error("signing failed: {0}")]
    Signing(String),
}

/// Signs a message with the appropriate scheme for the key family.
///
/// Solana keys sign the Base58-decoded message when it decodes, the raw
/// UTF-8 bytes otherwise, and return a Base58 signature. EVM legacy keys
/// sign per EIP-191 and return a hex signature; P-256 keys return a hex
/// ECDSA signature over SHA-256.
///
/// # Errors
///
/// Returns [`SignError::Signing`] when the underlying signer fails.
pub fn sign_message(message: &str, key: &KeyMaterial) -> Result<String, SignError> {
    match &key.secret {
        KeySecret::Ed25519(pair) => {
            let bytes = base58::decode(message)
                .unwrap_or_else(|_| message.as_bytes().to_vec());
            let signature = ed25519::sign(&bytes, &pair.secret);
            Ok(base58::encode(&signature))
        }
        KeySecret::Secp256k1(signer) => {
            let signature = signer
                .sign_message_sync(message.as_bytes())
                .map_err(|e| SignError::Signing(e.to_string()))?;
            Ok(format!("0x{}", hex::encode(signature.as_bytes())))
        }
        KeySecret::P256(signing_key) => {
            let signature: p256::ecdsa::Signature = signing_key.sign(message.as_bytes());
            Ok(format!("0x{}", hex::encode(signature.to_bytes())))
        }
    }
}

/// Parameters of an ERC-3009 authorization to sign.
#[derive(Debug, Clone)]
pub struct AuthorizationParams {
    /// The V1 network name, used to resolve the EIP-155 chain ID.
    pub network: String,
    /// The token contract address (EIP-712 verifying contract).
    pub asset: String,
    /// The recipient address.
    pub pay_to: String,
    /// Transfer amount in atomic units.
    pub value: u128,
    /// Validity window length in seconds.
    pub max_timeout_seconds: u64,
    /// EIP-712 domain name of the token.
    pub token_name: String,
    /// EIP-712 domain version of the token.
    pub token_version: String,
}

/// Resolves the EIP-155 chain ID for a network name.
///
/// Unknown names fall back to Base Sepolia so a misconfiguration lands on a
/// test network rather than signing for an unintended mainnet.
#[must_use]
pub fn chain_id_for(network: &str) -> u64 {
    networks::evm_chain_id(network).unwrap_or_else(|| {
        tracing::warn!(
            network,
            fallback = BASE_SEPOLIA,
            "unknown EVM network name, falling back to base-sepolia chain id"
        );
        BASE_SEPOLIA
    })
}

/// Signs an EIP-712 `TransferWithAuthorization` and returns the x402 EVM
/// payment payload.
///
/// The validity window opens ten minutes in the past so the authorization is
/// immediately usable despite clock skew, and closes `max_timeout_seconds`
/// from now. The nonce is 32 random bytes.
///
/// # Errors
///
/// Returns [`SignError::UnsupportedAlgorithm`] for non-secp256k1 keys,
/// [`SignError::InvalidInput`] on unparseable addresses, and
/// [`SignError::Signing`] when the signer fails.
pub fn sign_transfer_authorization(
    key: &KeyMaterial,
    params: &AuthorizationParams,
) -> Result<EvmPayload, SignError> {
    let now = UnixTimestamp::now();
    let valid_after = now.minus(10 * 60);
    let valid_before = now.plus(params.max_timeout_seconds);
    let nonce: [u8; 32] = rng().random();
    sign_authorization_at(key, params, valid_after, valid_before, nonce)
}

/// Deterministic core of [`sign_transfer_authorization`].
fn sign_authorization_at(
    key: &KeyMaterial,
    params: &AuthorizationParams,
    valid_after: UnixTimestamp,
    valid_before: UnixTimestamp,
    nonce: [u8; 32],
) -> Result<EvmPayload, SignError> {
    let KeySecret::Secp256k1(signer) = &key.secret else {
        return Err(SignError::UnsupportedAlgorithm {
            family: key.family,
            operation: "EIP-712 transfer authorization",
        });
    };

    let asset = Address::from_str(&params.asset)
        .map_err(|_| SignError::InvalidInput(format!("invalid asset address '{}'", params.asset)))?;
    let pay_to = Address::from_str(&params.pay_to)
        .map_err(|_| SignError::InvalidInput(format!("invalid recipient '{}'", params.pay_to)))?;
    let from = signer.address();
    let chain_id = chain_id_for(&params.network);

    let domain = eip712_domain! {
        name: params.token_name.clone(),
        version: params.token_version.clone(),
        chain_id: chain_id,
        verifying_contract: asset,
    };

    let message = TransferWithAuthorization {
        from,
        to: pay_to,
        value: U256::from(params.value),
        validAfter: U256::from(valid_after.as_secs()),
        validBefore: U256::from(valid_before.as_secs()),
        nonce: FixedBytes(nonce),
    };

    let digest = message.eip712_signing_hash(&domain);
    let signature = signer
        .sign_hash_sync(&digest)
        .map_err(|e| SignError::Signing(e.to_string()))?;

    Ok(EvmPayload {
        signature: format!("0x{}", hex::encode(signature.as_bytes())),
        authorization: EvmAuthorization {
            from: from.to_string(),
            to: pay_to.to_string(),
            value: params.value.to_string(),
            valid_after: valid_after.as_secs().to_string(),
            valid_before: valid_before.as_secs().to_string(),
            nonce: format!("0x{}", hex::encode(nonce)),
        },
    })
}
