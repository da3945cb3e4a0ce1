//! `zk.verify(ctx, circuit, proof, public_input) -> {ok, units, reason?, digest}`.
//!
//! No challenge-comparison acceptance path ships without a real adapter: a
//! missing [`ZkAdapter`] always yields `ok=false, reason="no_adapter"` with a
//! deterministic unit estimate, per the resolved Open Question that this
//! crate never simulates proof verification.

use crate::registry::Provider;
use async_trait::async_trait;
use cap_adapters::{SyscallContext, ZkAdapter};
use cap_config::SecurityLimits;
use cap_enc::{sha3_256, Value};
use cap_errors::CapError;
use cap_metrics::CapMetrics;
use std::sync::Arc;

pub struct ZkVerifyProvider {
    adapter: Option<Arc<dyn ZkAdapter>>,
    limits: Arc<SecurityLimits>,
    metrics: Arc<CapMetrics>,
}

impl ZkVerifyProvider {
    pub fn new(adapter: Option<Arc<dyn ZkAdapter>>, limits: Arc<SecurityLimits>, metrics: Arc<CapMetrics>) -> Self {
        Self {
            adapter,
            limits,
            metrics,
        }
    }
}

/// `SHA3-256(circuit_bytes || proof_bytes || public_input_bytes)`, stable
/// across whichever adapter backend is plugged in.
fn proof_digest(circuit: &[u8], proof: &[u8], public_input: &[u8]) -> [u8; 32] {
    let mut buf = Vec::with_capacity(circuit.len() + proof.len() + public_input.len());
    buf.extend_from_slice(circuit);
    buf.extend_from_slice(proof);
    buf.extend_from_slice(public_input);
    sha3_256(&buf)
}

/// A rough, deterministic "compute units" estimate used when no adapter is
/// present to report real prover/verifier cost. Grows with circuit size so
/// gas accounting stays monotonic in proof complexity even without a real
/// verifier.
fn estimated_units(circuit: &[u8], proof: &[u8]) -> u64 {
    (circuit.len() as u64 / 64).max(1) + (proof.len() as u64 / 128).max(1)
}

#[async_trait]
impl Provider for ZkVerifyProvider {
    async fn call(&self, ctx: &SyscallContext, kwargs: &Value) -> Result<Value, CapError> {
        let _ = ctx;
        let circuit = kwargs
            .get("circuit")
            .and_then(Value::as_bytes)
            .ok_or_else(|| CapError::invalid_input("zk.verify: missing circuit"))?;
        let proof = kwargs
            .get("proof")
            .and_then(Value::as_bytes)
            .ok_or_else(|| CapError::invalid_input("zk.verify: missing proof"))?;
        let public_input = kwargs
            .get("public_input")
            .and_then(Value::as_bytes)
            .unwrap_or(&[]);

        for (label, field) in [("circuit", circuit), ("proof", proof), ("public_input", public_input)] {
            if field.len() as u64 > self.limits.max_zk_field_bytes {
                return Err(CapError::limit_exceeded(format!(
                    "zk.verify: {label} exceeds max_zk_field_bytes"
                )));
            }
        }
        let total = circuit.len() + proof.len() + public_input.len();
        if total as u64 > self.limits.max_zk_total_bytes {
            return Err(CapError::limit_exceeded("zk.verify: total payload exceeds max_zk_total_bytes"));
        }

        let digest = proof_digest(circuit, proof, public_input);

        let (ok, units, reason) = if let Some(adapter) = &self.adapter {
            let outcome = adapter.verify(circuit, proof, public_input).await?;
            let units = outcome.units.unwrap_or_else(|| estimated_units(circuit, proof));
            (outcome.ok, units, None)
        } else {
            (false, estimated_units(circuit, proof), Some("no_adapter"))
        };

        self.metrics.record_zk_verify(if ok { "ok" } else { "rejected" }, 0.0);

        let mut fields = vec![
            (Value::text("ok"), Value::Bool(ok)),
            (Value::text("units"), Value::int(units)),
            (Value::text("digest"), Value::bytes(digest.to_vec())),
        ];
        if let Some(reason) = reason {
            fields.push((Value::text("reason"), Value::text(reason)));
        }
        Ok(Value::map(fields))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> SyscallContext {
        SyscallContext::new(1, 10, b"tx".to_vec(), b"caller".to_vec())
    }

    fn metrics() -> Arc<CapMetrics> {
        Arc::new(CapMetrics::new(&prometheus::Registry::new()).unwrap())
    }

    fn kwargs(circuit: &[u8], proof: &[u8]) -> Value {
        Value::map(vec![
            (Value::text("circuit"), Value::bytes(circuit.to_vec())),
            (Value::text("proof"), Value::bytes(proof.to_vec())),
            (Value::text("public_input"), Value::bytes(b"pub".to_vec())),
        ])
    }

    #[tokio::test]
    async fn no_adapter_always_rejects_with_reason() {
        let provider = ZkVerifyProvider::new(None, Arc::new(SecurityLimits::default()), metrics());
        let result = provider.call(&ctx(), &kwargs(b"circuit", b"proof")).await.unwrap();
        assert_eq!(result.get("ok").unwrap(), &Value::Bool(false));
        assert_eq!(result.get("reason").unwrap().as_text(), Some("no_adapter"));
        assert!(result.get("units").unwrap().as_int().unwrap() > 0);
    }

    #[tokio::test]
    async fn digest_is_deterministic_and_input_sensitive() {
        let provider = ZkVerifyProvider::new(None, Arc::new(SecurityLimits::default()), metrics());
        let a = provider.call(&ctx(), &kwargs(b"circuit", b"proof")).await.unwrap();
        let b = provider.call(&ctx(), &kwargs(b"circuit", b"proof")).await.unwrap();
        assert_eq!(a.get("digest"), b.get("digest"));
        let c = provider.call(&ctx(), &kwargs(b"circuit", b"proof2")).await.unwrap();
        assert_ne!(a.get("digest"), c.get("digest"));
    }

    #[tokio::test]
    async fn rejects_oversized_field() {
        let mut limits = SecurityLimits::default();
        limits.max_zk_field_bytes = 4;
        let provider = ZkVerifyProvider::new(None, Arc::new(limits), metrics());
        assert!(provider.call(&ctx(), &kwargs(b"circuit", b"proof")).await.is_err());
    }
}
