#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Custodial wallet backend client and transaction approval flow.
//!
//! A custodial wallet backend creates, signs, and submits on-chain
//! transactions on behalf of a user. The key step it cannot do alone is
//! producing the external signature: a created transaction may come back
//! with a pending approval naming a message and a signer, and the caller
//! must sign that message locally and post the signature back.
//!
//! This crate provides:
//!
//! - [`client::WalletClient`] - the REST client for the four backend
//!   endpoints (create transaction, submit approval, transaction status,
//!   wallet balance), with upstream errors passed through unmodified.
//! - [`approval::ApprovalFlow`] - the state machine driving a transaction
//!   from creation through signature collection to on-chain confirmation,
//!   with bounded polling.
//! - [`extract`] - ordered, individually testable extractors that pull an
//!   on-chain transaction id out of the backend's ambiguous response shapes.

pub mod approval;
pub mod client;
pub mod extract;
pub mod types;

pub use approval::{ApprovalError, ApprovalFlow};
pub use client::{WalletApiError, WalletClient};
pub use types::{TransactionRecord, TransactionStatus};
