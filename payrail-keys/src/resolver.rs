//! Key-family classification and public key derivation.
//!
//! User-supplied secrets arrive as one opaque string. [`KeyMaterial::resolve`]
//! is the single boundary that sniffs the string shape; callers that already
//! know the family should use the explicit constructors instead and skip the
//! heuristics entirely.
//!
//! Detection order for the heuristic boundary:
//!
//! 1. JSON object → P-256 JWK import
//! 2. long non-hex string → Base64 PKCS#8 (or PEM) P-256 private key
//! 3. 64 hex characters (optional `0x`) → legacy secp256k1 private key
//! 4. Base58 decoding to 32 or 64 bytes → Solana Ed25519 seed / secret key
//!
//! Anything else is [`KeyError::InvalidKeyFormat`]; a family is never
//! returned unless its public key and address were fully derived.

use std::fmt;
use std::str::FromStr;

use alloy_signer_local::PrivateKeySigner;
use base64::Engine;
use base64::engine::general_purpose::{STANDARD as b64, URL_SAFE_NO_PAD as b64url};
use p256::ecdsa::SigningKey as P256SigningKey;
use p256::pkcs8::DecodePrivateKey;
use serde::Deserialize;

use payrail::encoding::base58;

use crate::ed25519::Keypair;

/// The cryptographic family of a resolved key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyFamily {
    /// Solana-style Ed25519 keys.
    SolanaEd25519,
    /// Legacy EVM account keys on secp256k1.
    EvmSecp256k1Legacy,
    /// EVM admin-signer keys on NIST P-256.
    EvmP256,
}

/// Errors from key resolution.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyError {
    /// The secret matched no supported key format.
    #[error("invalid key format: {0}")]
    InvalidKeyFormat(String),
}

/// Secret halves of resolved key material. Never serialized, never printed.
pub(crate) enum KeySecret {
    Ed25519(Box<Keypair>),
    Secp256k1(Box<PrivateKeySigner>),
    P256(Box<P256SigningKey>),
}

/// Resolved key material: family, public key, address, and the secret needed
/// to sign.
///
/// Constructed per operation from a caller-supplied secret and dropped after
/// signing. The secret is omitted from `Debug` output and has no `Serialize`
/// implementation.
pub struct KeyMaterial {
    /// The key family the secret resolved to.
    pub family: KeyFamily,
    /// The public key: 32 bytes (Ed25519) or an uncompressed SEC1 point.
    pub public_key: Vec<u8>,
    /// The derived address, when the family has one (Base58 for Solana,
    /// EIP-55 hex for EVM accounts).
    pub address: Option<String>,
    pub(crate) secret: KeySecret,
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("family", &self.family)
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

/// Minimal JWK shape for an EC private key.
#[derive(Deserialize)]
struct EcJwk {
    kty: String,
    crv: String,
    d: String,
}

impl KeyMaterial {
    /// Classifies an opaque secret string and derives its public key and
    /// address.
    ///
    /// This is the heuristic boundary; prefer the explicit `from_*`
    /// constructors when the caller knows the family.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::InvalidKeyFormat`] when no format matches or the
    /// decoded material has the wrong length.
    pub fn resolve(secret: &str) -> Result<Self, KeyError> {
        let trimmed = secret.trim();
        if trimmed.is_empty() {
            return Err(KeyError::InvalidKeyFormat("empty secret".to_owned()));
        }
        if trimmed.starts_with('{') {
            return Self::from_p256_jwk(trimmed);
        }
        if is_hex_key(trimmed) {
            return Self::from_evm_private_key(trimmed);
        }
        // A Base58 Solana secret key tops out near 90 characters; Base64
        // PKCS#8 EC keys run well past that.
        if trimmed.len() > 100 || trimmed.starts_with("-----BEGIN") {
            return Self::from_p256_pkcs8(trimmed);
        }
        Self::from_solana_key(trimmed)
    }

    /// Imports a Solana Ed25519 key from a Base58 string.
    ///
    /// Accepts a 32-byte seed or a 64-byte secret key.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::InvalidKeyFormat`] on Base58 errors or any other
    /// decoded length.
    pub fn from_solana_key(secret: &str) -> Result<Self, KeyError> {
        let bytes = base58::decode(secret)
            .map_err(|_| KeyError::InvalidKeyFormat("not base58, hex, JWK, or PKCS#8".to_owned()))?;
        let pair = match bytes.len() {
            32 => Keypair::from_seed(&bytes),
            64 => Keypair::from_secret_key(&bytes),
            other => {
                return Err(KeyError::InvalidKeyFormat(format!(
                    "base58 key decodes to {other} bytes, expected 32 or 64"
                )));
            }
        }
        .map_err(|e| KeyError::InvalidKeyFormat(e.to_string()))?;
        Ok(Self {
            family: KeyFamily::SolanaEd25519,
            public_key: pair.public.to_vec(),
            address: Some(base58::encode(&pair.public)),
            secret: KeySecret::Ed25519(Box::new(pair)),
        })
    }

    /// Imports a legacy EVM secp256k1 private key from 64 hex characters
    /// (optional `0x` prefix).
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::InvalidKeyFormat`] on malformed hex or an invalid
    /// scalar.
    pub fn from_evm_private_key(secret: &str) -> Result<Self, KeyError> {
        let hex_part = secret.strip_prefix("0x").unwrap_or(secret);
        if !is_hex_key(secret) {
            return Err(KeyError::InvalidKeyFormat(
                "EVM private key must be 64 hex characters".to_owned(),
            ));
        }
        let signer = PrivateKeySigner::from_str(hex_part)
            .map_err(|_| KeyError::InvalidKeyFormat("not a valid secp256k1 scalar".to_owned()))?;
        let public_key = signer
            .credential()
            .verifying_key()
            .to_encoded_point(false)
            .as_bytes()
            .to_vec();
        let address = signer.address().to_string();
        Ok(Self {
            family: KeyFamily::EvmSecp256k1Legacy,
            public_key,
            address: Some(address),
            secret: KeySecret::Secp256k1(Box::new(signer)),
        })
    }

    /// Imports a P-256 admin-signer key from a JWK JSON object.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::InvalidKeyFormat`] unless the JWK is an EC key on
    /// P-256 with a valid `d` parameter.
    pub fn from_p256_jwk(jwk: &str) -> Result<Self, KeyError> {
        let parsed: EcJwk = serde_json::from_str(jwk)
            .map_err(|_| KeyError::InvalidKeyFormat("not a parseable JWK object".to_owned()))?;
        if parsed.kty != "EC" || parsed.crv != "P-256" {
            return Err(KeyError::InvalidKeyFormat(format!(
                "unsupported JWK kty/crv: {}/{}",
                parsed.kty, parsed.crv
            )));
        }
        let d = b64url
            .decode(parsed.d.as_bytes())
            .map_err(|_| KeyError::InvalidKeyFormat("JWK 'd' is not base64url".to_owned()))?;
        let key = P256SigningKey::from_slice(&d)
            .map_err(|_| KeyError::InvalidKeyFormat("JWK 'd' is not a valid P-256 scalar".to_owned()))?;
        Ok(Self::from_p256(key))
    }

    /// Imports a P-256 admin-signer key from PKCS#8: Base64 DER, or PEM when
    /// the string carries a `-----BEGIN` header.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::InvalidKeyFormat`] on decode failures.
    pub fn from_p256_pkcs8(secret: &str) -> Result<Self, KeyError> {
        let key = if secret.starts_with("-----BEGIN") {
            P256SigningKey::from_pkcs8_pem(secret)
                .map_err(|_| KeyError::InvalidKeyFormat("not a PKCS#8 PEM P-256 key".to_owned()))?
        } else {
            let der = b64
                .decode(secret.as_bytes())
                .map_err(|_| KeyError::InvalidKeyFormat("not base64-encoded PKCS#8".to_owned()))?;
            P256SigningKey::from_pkcs8_der(&der)
                .map_err(|_| KeyError::InvalidKeyFormat("not a PKCS#8 DER P-256 key".to_owned()))?
        };
        Ok(Self::from_p256(key))
    }

    fn from_p256(key: P256SigningKey) -> Self {
        let public_key = key
            .verifying_key()
            .to_encoded_point(false)
            .as_bytes()
            .to_vec();
        Self {
            family: KeyFamily::EvmP256,
            public_key,
            address: None,
            secret: KeySecret::P256(Box::new(key)),
        }
    }
}

/// Returns `true` for a 64-hex-character private key, with or without a
/// `0x` prefix.
fn is_hex_key(s: &str) -> bool {
    let hex_part = s.strip_prefix("0x").unwrap_or(s);
    hex_part.len() == 64 && hex_part.bytes().all(|b| b.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;

    // The well-known first Hardhat development account.
    const HARDHAT_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const HARDHAT_ADDRESS: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";

    #[test]
    fn resolves_hex_as_legacy_evm() {
        let key = KeyMaterial::resolve(HARDHAT_KEY).unwrap();
        assert_eq!(key.family, KeyFamily::EvmSecp256k1Legacy);
        assert_eq!(key.address.as_deref(), Some(HARDHAT_ADDRESS));
        assert_eq!(key.public_key.len(), 65);
        assert_eq!(key.public_key[0], 0x04);

        let prefixed = KeyMaterial::resolve(&format!("0x{HARDHAT_KEY}")).unwrap();
        assert_eq!(prefixed.address.as_deref(), Some(HARDHAT_ADDRESS));
    }

    #[test]
    fn resolves_base58_seed_as_solana() {
        let seed = [7u8; 32];
        let encoded = base58::encode(&seed);
        let key = KeyMaterial::resolve(&encoded).unwrap();
        assert_eq!(key.family, KeyFamily::SolanaEd25519);
        let expected = Keypair::from_seed(&seed).unwrap();
        assert_eq!(key.public_key, expected.public.to_vec());
        assert_eq!(key.address.as_deref(), Some(base58::encode(&expected.public).as_str()));
    }

    #[test]
    fn resolves_base58_secret_key_as_solana() {
        let pair = Keypair::from_seed(&[3u8; 32]).unwrap();
        let encoded = base58::encode(&pair.secret);
        let key = KeyMaterial::resolve(&encoded).unwrap();
        assert_eq!(key.family, KeyFamily::SolanaEd25519);
        assert_eq!(key.public_key, pair.public.to_vec());
    }

    #[test]
    fn resolves_jwk_as_p256() {
        let d = b64url.encode([1u8; 32]);
        let jwk = format!("{{\"kty\":\"EC\",\"crv\":\"P-256\",\"d\":\"{d}\"}}");
        let key = KeyMaterial::resolve(&jwk).unwrap();
        assert_eq!(key.family, KeyFamily::EvmP256);
        assert!(key.address.is_none());
        assert_eq!(key.public_key.len(), 65);
    }

    #[test]
    fn rejects_wrong_curve_jwk() {
        let jwk = "{\"kty\":\"EC\",\"crv\":\"secp256k1\",\"d\":\"AQ\"}";
        assert!(matches!(
            KeyMaterial::resolve(jwk),
            Err(KeyError::InvalidKeyFormat(_))
        ));
    }

    #[test]
    fn rejects_malformed_input() {
        for bad in [
            "",
            "not a key at all!!",
            "zzzz0",
            "deadbeef", // hex but too short
        ] {
            assert!(
                matches!(KeyMaterial::resolve(bad), Err(KeyError::InvalidKeyFormat(_))),
                "expected InvalidKeyFormat for {bad:?}"
            );
        }
    }

    #[test]
    fn rejects_base58_of_wrong_length() {
        let encoded = base58::encode(&[1u8; 33]);
        assert!(matches!(
            KeyMaterial::resolve(&encoded),
            Err(KeyError::InvalidKeyFormat(_))
        ));
    }

    #[test]
    fn debug_output_is_redacted() {
        let key = KeyMaterial::resolve(HARDHAT_KEY).unwrap();
        let debug = format!("{key:?}");
        assert!(!debug.to_ascii_lowercase().contains(&HARDHAT_KEY[..16]));
        assert!(debug.contains("EvmSecp256k1Legacy"));
    }
}
