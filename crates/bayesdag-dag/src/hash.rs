use bayesdag_core::Value;
use sha2::{Digest, Sha256};

use crate::model::Model;

/// Computes a canonical hash of the free state of a model.
///
/// Only names, kinds and the values of constant and stochastic nodes enter
/// the digest; deterministic values are functions of those and may be stale
/// while touched.
pub fn state_hash(model: &Model) -> String {
    let mut hasher = Sha256::new();
    hasher.update((model.len() as u64).to_le_bytes());
    for node in &model.nodes {
        update_bytes(node.name.as_bytes(), &mut hasher);
        hasher.update(node.kind.label().as_bytes());
        if node.is_deterministic() {
            continue;
        }
        encode_value(&node.value, &mut hasher);
    }
    format!("{:x}", hasher.finalize())
}

fn encode_value(value: &Value, hasher: &mut Sha256) {
    match value {
        Value::Real(x) => {
            hasher.update(b"real");
            hasher.update(x.to_bits().to_le_bytes());
        }
        Value::Integer(x) => {
            hasher.update(b"integer");
            hasher.update(x.to_le_bytes());
        }
        Value::RealVector(values) => {
            hasher.update(b"real-vector");
            hasher.update((values.len() as u64).to_le_bytes());
            for x in values {
                hasher.update(x.to_bits().to_le_bytes());
            }
        }
    }
}

fn update_bytes(bytes: &[u8], hasher: &mut Sha256) {
    hasher.update((bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}
