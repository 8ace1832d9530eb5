#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! x402 settlement and payer-side rule selection.
//!
//! The payment side of payrail: a validated [`payrail::PaymentEnvelope`] is
//! submitted to an external settlement facilitator, and a configured list of
//! payer rules decides which wallet and key actually fund an outstanding
//! payment requirement.
//!
//! # Modules
//!
//! - [`settle`] - the facilitator `/settle` client with fail-closed response
//!   interpretation
//! - [`payer`] - ordered payer-rule evaluation with live balance checks
//!
//! # Trust boundary
//!
//! Settlement responses are facilitator-specific and defensively parsed:
//! unless a response positively signals success, the outcome is recorded as
//! a failure. A malformed success response is an error, never a success.

pub mod payer;
pub mod settle;

pub use payer::{PayerError, PayerRule, PayerSelector};
pub use settle::{SettleClientError, SettlementClient, SettlementOutcome};
