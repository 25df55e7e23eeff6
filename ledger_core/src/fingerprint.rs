//! Deterministic request fingerprinting for idempotency (§4.9, §9 "Metadata
//! polymorphism"). Keys are sorted before serialisation so two logically
//! equal requests that differ only in field order still hash identically.

use sha2::{Digest, Sha256};

/// Recursively sorts object keys, then serialises to JSON, then hashes.
pub fn fingerprint(value: &serde_json::Value) -> String {
    let canonical = canonicalize(value);
    let bytes = serde_json::to_vec(&canonical).expect("canonical json never fails to serialize");
    let digest = Sha256::digest(&bytes);
    hex::encode(digest)
}

fn canonicalize(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let mut sorted = serde_json::Map::new();
            for (k, v) in entries {
                sorted.insert(k.clone(), canonicalize(v));
            }
            serde_json::Value::Object(sorted)
        }
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.iter().map(canonicalize).collect())
        }
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn key_order_does_not_affect_fingerprint() {
        let a = json!({"from": "x", "to": "y", "amount": "10.00"});
        let b = json!({"amount": "10.00", "to": "y", "from": "x"});
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn different_bodies_fingerprint_differently() {
        let a = json!({"amount": "10.00"});
        let b = json!({"amount": "10.01"});
        assert_ne!(fingerprint(&a), fingerprint(&b));
    }
}
