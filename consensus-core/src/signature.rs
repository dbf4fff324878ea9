//! Keyed-hash signature stub. This models authentication for
//! the Byzantine-tolerant 3PC variant without pulling in a real asymmetric
//! scheme: a "signature" is a SHA-256 digest of the canonical message
//! string concatenated with the signer's private key, truncated to its
//! first 16 hex characters. It is forgeable by anyone who knows the key,
//! which is the point — the protocol's safety comes from quorum counting,
//! not from the strength of this primitive.

use sha2::{Digest, Sha256};

use crate::NodeId;

/// Deterministic, per-node "private key" derived from its id. Good enough
/// to make signatures unforgeable to nodes that don't know the signer's
/// id, while keeping the whole scheme key-management-free.
pub fn private_key_for(node_id: NodeId) -> String {
    format!("key_{node_id}")
}

/// Signs `canonical_data` with `private_key`, returning the first 16 hex
/// characters of SHA-256(data ":" private_key). Callers are responsible for
/// producing a canonical string (e.g. `"prepare:{id}"`) so that signing and
/// verifying hash the same bytes.
pub fn sign(canonical_data: &str, private_key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical_data.as_bytes());
    hasher.update(b":");
    hasher.update(private_key.as_bytes());
    let digest = hasher.finalize();
    hex::encode(digest)[..16].to_string()
}

/// Recomputes the expected signature for `canonical_data` as if signed by
/// `signer_id` (using that node's `"key_" + id` private key), and compares
/// it to `signature`.
pub fn verify(canonical_data: &str, signature: &str, signer_id: NodeId) -> bool {
    sign(canonical_data, &private_key_for(signer_id)) == signature
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_then_verify_round_trips() {
        let key = private_key_for(7);
        let sig = sign("prepare:7", &key);
        assert!(verify("prepare:7", &sig, 7));
    }

    #[test]
    fn verify_rejects_wrong_signer() {
        let key = private_key_for(7);
        let sig = sign("prepare:7", &key);
        assert!(!verify("prepare:7", &sig, 8));
    }

    #[test]
    fn verify_rejects_tampered_data() {
        let key = private_key_for(7);
        let sig = sign("prepare:7", &key);
        assert!(!verify("prepare:8", &sig, 7));
    }
}
