//! On-chain transaction id extraction from ambiguous backend responses.
//!
//! After an approval is submitted, the backend may report the resulting
//! on-chain id in several places: `onChain.txId`, a top-level `signature`, a
//! top-level `txId`, or only implicitly inside a returned signed-transaction
//! blob. Each shape gets its own pure extractor; [`extract_tx_id`] tries
//! them in a fixed order and returns the first match. The order is
//! significant: direct fields are authoritative, blob decoding is a
//! fallback, and callers poll the status endpoint when all of them miss.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as b64;
use serde_json::Value;

use payrail::encoding::base58;

/// A pure probe for one known response shape.
pub type Extractor = fn(&Value) -> Option<String>;

/// Extraction attempts, in priority order.
pub const TX_ID_EXTRACTORS: &[Extractor] = &[
    on_chain_tx_id,
    top_level_signature,
    top_level_tx_id,
    signed_transaction_blob,
];

/// Returns the first on-chain transaction id any extractor finds.
#[must_use]
pub fn extract_tx_id(response: &Value) -> Option<String> {
    TX_ID_EXTRACTORS
        .iter()
        .find_map(|extractor| extractor(response))
}

/// Probes `onChain.txId`.
#[must_use]
pub fn on_chain_tx_id(response: &Value) -> Option<String> {
    response
        .pointer("/onChain/txId")
        .and_then(Value::as_str)
        .map(ToOwned::to_owned)
}

/// Probes a top-level `signature` string.
#[must_use]
pub fn top_level_signature(response: &Value) -> Option<String> {
    response
        .get("signature")
        .and_then(Value::as_str)
        .map(ToOwned::to_owned)
}

/// Probes a top-level `txId` string.
#[must_use]
pub fn top_level_tx_id(response: &Value) -> Option<String> {
    response
        .get("txId")
        .and_then(Value::as_str)
        .map(ToOwned::to_owned)
}

/// Probes a signed-transaction blob (`onChain.transaction` or a top-level
/// `transaction`) and reads its first signature.
///
/// On Solana-family chains the first signature of a serialized transaction
/// is the transaction id.
#[must_use]
pub fn signed_transaction_blob(response: &Value) -> Option<String> {
    let blob = response
        .pointer("/onChain/transaction")
        .or_else(|| response.get("transaction"))
        .and_then(Value::as_str)?;
    first_signature(blob)
}

/// Decodes a serialized Solana transaction (Base64 or Base58) and returns
/// its first signature, Base58-encoded.
#[must_use]
pub fn first_signature(blob: &str) -> Option<String> {
    let bytes = b64
        .decode(blob.trim())
        .ok()
        .or_else(|| base58::decode(blob.trim()).ok())?;
    let (count, offset) = read_compact_u16(&bytes)?;
    if count == 0 || bytes.len() < offset + 64 {
        return None;
    }
    Some(base58::encode(&bytes[offset..offset + 64]))
}

/// Reads a Solana compact-u16 length prefix. Returns the value and the
/// number of bytes consumed.
fn read_compact_u16(data: &[u8]) -> Option<(usize, usize)> {
    let mut value: usize = 0;
    for (i, &byte) in data.iter().take(3).enumerate() {
        value |= usize::from(byte & 0x7f) << (7 * i);
        if byte & 0x80 == 0 {
            return Some((value, i + 1));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn transaction_blob(signature: &[u8; 64]) -> String {
        let mut bytes = vec![1u8];
        bytes.extend_from_slice(signature);
        bytes.extend_from_slice(b"rest-of-transaction");
        b64.encode(&bytes)
    }

    #[test]
    fn reads_on_chain_tx_id() {
        let response = json!({ "onChain": { "txId": "abc123" } });
        assert_eq!(on_chain_tx_id(&response).as_deref(), Some("abc123"));
        assert_eq!(extract_tx_id(&response).as_deref(), Some("abc123"));
    }

    #[test]
    fn reads_top_level_fields() {
        assert_eq!(
            top_level_signature(&json!({ "signature": "sig1" })).as_deref(),
            Some("sig1")
        );
        assert_eq!(
            top_level_tx_id(&json!({ "txId": "tx1" })).as_deref(),
            Some("tx1")
        );
    }

    #[test]
    fn decodes_first_signature_from_blob() {
        let signature = [0xabu8; 64];
        let response = json!({ "onChain": { "transaction": transaction_blob(&signature) } });
        let extracted = signed_transaction_blob(&response).unwrap();
        assert_eq!(base58::decode(&extracted).unwrap(), signature.to_vec());
    }

    #[test]
    fn blob_with_zero_signatures_yields_nothing() {
        let blob = b64.encode([0u8, 1, 2, 3]);
        assert_eq!(first_signature(&blob), None);
    }

    #[test]
    fn truncated_blob_yields_nothing() {
        let blob = b64.encode([1u8, 0xaa, 0xbb]);
        assert_eq!(first_signature(&blob), None);
    }

    #[test]
    fn extraction_order_prefers_direct_fields() {
        let signature = [0x11u8; 64];
        let response = json!({
            "onChain": { "txId": "direct", "transaction": transaction_blob(&signature) },
            "signature": "sig-field",
            "txId": "tx-field",
        });
        assert_eq!(extract_tx_id(&response).as_deref(), Some("direct"));

        let without_on_chain = json!({
            "signature": "sig-field",
            "txId": "tx-field",
        });
        assert_eq!(extract_tx_id(&without_on_chain).as_deref(), Some("sig-field"));
    }

    #[test]
    fn compact_u16_multi_byte_lengths() {
        assert_eq!(read_compact_u16(&[0x05]), Some((5, 1)));
        assert_eq!(read_compact_u16(&[0x80, 0x01]), Some((128, 2)));
        assert_eq!(read_compact_u16(&[]), None);
    }
}
