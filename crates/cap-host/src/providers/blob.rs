//! `blob.pin(ctx, namespace: uint32, data: bytes) -> {namespace, size,
//! commitment, persistence}`, grounded on `bpi-pinner::ContentPinner`'s
//! pin-record/commitment shape.

use crate::registry::Provider;
use async_trait::async_trait;
use cap_adapters::{DaAdapter, SyscallContext};
use cap_config::SecurityLimits;
use cap_enc::{domains, sha3_256, Value};
use cap_errors::CapError;
use cap_metrics::CapMetrics;
use std::sync::Arc;

pub struct BlobPinProvider {
    adapter: Option<Arc<dyn DaAdapter>>,
    limits: Arc<SecurityLimits>,
    metrics: Arc<CapMetrics>,
}

impl BlobPinProvider {
    pub fn new(
        adapter: Option<Arc<dyn DaAdapter>>,
        limits: Arc<SecurityLimits>,
        metrics: Arc<CapMetrics>,
    ) -> Self {
        Self {
            adapter,
            limits,
            metrics,
        }
    }

    fn local_commitment(namespace: u32, data: &[u8]) -> [u8; 32] {
        let mut buf = Vec::with_capacity(domains::BLOB.len() + 4 + data.len());
        buf.extend_from_slice(domains::BLOB);
        buf.extend_from_slice(&namespace.to_be_bytes());
        buf.extend_from_slice(data);
        sha3_256(&buf)
    }
}

#[async_trait]
impl Provider for BlobPinProvider {
    async fn call(&self, ctx: &SyscallContext, kwargs: &Value) -> Result<Value, CapError> {
        let namespace = kwargs
            .get("namespace")
            .and_then(Value::as_int)
            .ok_or_else(|| CapError::invalid_input("blob.pin: missing namespace"))?;
        if !(0..=u32::MAX as i128).contains(&namespace) {
            return Err(CapError::invalid_input("blob.pin: namespace out of range")
                .with_detail("namespace", namespace.to_string()));
        }
        let namespace = namespace as u32;

        let data = kwargs
            .get("data")
            .and_then(Value::as_bytes)
            .ok_or_else(|| CapError::invalid_input("blob.pin: missing data"))?;
        if data.is_empty() {
            return Err(CapError::invalid_input("blob.pin: data must not be empty"));
        }
        if data.len() as u64 > self.limits.max_blob_bytes {
            return Err(CapError::limit_exceeded("blob.pin: data exceeds max_blob_bytes")
                .with_detail("max", self.limits.max_blob_bytes)
                .with_detail("actual", data.len() as u64));
        }

        let (commitment, persistence) = if let Some(adapter) = &self.adapter {
            let result = adapter
                .pin_blob(ctx, &namespace.to_string(), data)
                .await?;
            (result.commitment, "adapter".to_string())
        } else {
            (Self::local_commitment(namespace, data).to_vec(), "none".to_string())
        };

        self.metrics
            .record_blob_in(&String::from_utf8_lossy(&ctx.caller), data.len() as u64);

        Ok(Value::map(vec![
            (Value::text("namespace"), Value::int(namespace)),
            (Value::text("size"), Value::int(data.len() as u64)),
            (Value::text("commitment"), Value::bytes(commitment)),
            (Value::text("persistence"), Value::text(persistence)),
        ]))
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

    #[tokio::test]
    async fn pins_locally_without_an_adapter() {
        let provider = BlobPinProvider::new(None, Arc::new(SecurityLimits::default()), metrics());
        let kwargs = Value::map(vec![
            (Value::text("namespace"), Value::int(7)),
            (Value::text("data"), Value::bytes(b"hello".to_vec())),
        ]);
        let result = provider.call(&ctx(), &kwargs).await.unwrap();
        assert_eq!(result.get("persistence").unwrap().as_text(), Some("none"));
        assert_eq!(result.get("size").unwrap().as_int(), Some(5));
    }

    #[tokio::test]
    async fn rejects_empty_data() {
        let provider = BlobPinProvider::new(None, Arc::new(SecurityLimits::default()), metrics());
        let kwargs = Value::map(vec![
            (Value::text("namespace"), Value::int(1)),
            (Value::text("data"), Value::bytes(Vec::new())),
        ]);
        assert!(provider.call(&ctx(), &kwargs).await.is_err());
    }

    #[tokio::test]
    async fn rejects_oversized_data() {
        let limits = SecurityLimits {
            max_blob_bytes: 4,
            ..SecurityLimits::default()
        };
        let provider = BlobPinProvider::new(None, Arc::new(limits), metrics());
        let kwargs = Value::map(vec![
            (Value::text("namespace"), Value::int(1)),
            (Value::text("data"), Value::bytes(b"toolong".to_vec())),
        ]);
        let err = provider.call(&ctx(), &kwargs).await.unwrap_err();
        assert_eq!(err.kind.code(), "LIMIT_EXCEEDED");
    }

    #[tokio::test]
    async fn commitment_is_deterministic_for_identical_inputs() {
        let provider = BlobPinProvider::new(None, Arc::new(SecurityLimits::default()), metrics());
        let kwargs = Value::map(vec![
            (Value::text("namespace"), Value::int(3)),
            (Value::text("data"), Value::bytes(b"same".to_vec())),
        ]);
        let a = provider.call(&ctx(), &kwargs).await.unwrap();
        let b = provider.call(&ctx(), &kwargs).await.unwrap();
        assert_eq!(a.get("commitment"), b.get("commitment"));
    }
}
