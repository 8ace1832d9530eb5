#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Core types for custodial wallet transactions and x402 payments.
//!
//! This crate provides the foundational, I/O-free building blocks used by the
//! rest of the payrail workspace: wire encodings, the network and token
//! catalog, payment requirements, and the x402 payment envelope with its
//! structural and semantic validators.
//!
//! # Overview
//!
//! An automation workflow that accepts or makes pay-per-request payments
//! speaks HTTP 402: a resource server answers unpaid requests with a list of
//! [`requirement::PaymentRequirement`]s, and a payer presents a Base64-JSON
//! [`envelope::PaymentEnvelope`] in the `X-PAYMENT` header proving that a
//! payment was authorized or submitted. Everything stateful (wallet backends,
//! settlement facilitators, payer selection) lives in the sibling crates and
//! is built on top of the value types defined here.
//!
//! # Modules
//!
//! - [`encoding`] - Base58 and Base64 wire encodings
//! - [`envelope`] - x402 payment envelope codec and validators
//! - [`headers`] - x402 HTTP header encoding/decoding helpers
//! - [`networks`] - Network families, chain IDs, and the token catalog
//! - [`requirement`] - Payment requirements and atomic amount handling
//! - [`timestamp`] - Unix timestamps for authorization validity windows

pub mod encoding;
pub mod envelope;
pub mod headers;
pub mod networks;
pub mod requirement;
pub mod timestamp;

pub use envelope::PaymentEnvelope;
pub use networks::{Environment, NetworkFamily};
pub use requirement::{PaymentRequirement, RequirementSet};
pub use timestamp::UnixTimestamp;
