#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Key material resolution and signing for payrail.
//!
//! A custodial wallet workflow receives key material as an opaque secret
//! string configured by the user. This crate classifies that string into one
//! of three key families, derives the corresponding public key and address,
//! and signs messages or EIP-712 typed data with it:
//!
//! - **Solana Ed25519** - Base58 seed or full secret key; derivation and
//!   signing run on the self-contained [`ed25519`] engine.
//! - **Legacy EVM secp256k1** - 64-hex-character private key; address and
//!   signatures via the alloy signer stack.
//! - **EVM P-256 admin signer** - JWK or PKCS#8 import of a NIST P-256 key.
//!
//! Secret material lives only inside [`resolver::KeyMaterial`], is never
//! serialized, and is redacted from `Debug` output.
//!
//! # Modules
//!
//! - [`ed25519`] - self-contained Ed25519 keypair derivation and signing
//! - [`resolver`] - key-family classification and public key derivation
//! - [`signer`] - message signing and ERC-3009 authorization signing

pub mod ed25519;
pub mod resolver;
pub mod signer;

pub use resolver::{KeyError, KeyFamily, KeyMaterial};
pub use signer::{SignError, sign_message};
