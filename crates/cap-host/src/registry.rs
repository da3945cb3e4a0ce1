//! Process-wide syscall dispatch table, grounded on `bpi-oracle-node`'s
//! `DashMap`-based registries: a sharded concurrent map from a canonical
//! operation key to a handler, with no single global lock on the happy
//! path.

use async_trait::async_trait;
use cap_adapters::SyscallContext;
use cap_enc::Value;
use cap_errors::CapError;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::warn;

/// A single syscall handler. Every provider in `providers/` implements
/// this; `kwargs`/return value are untyped canonical [`Value`]s so the
/// registry itself never needs to know a provider's specific shape.
#[async_trait]
pub trait Provider: Send + Sync {
    async fn call(&self, ctx: &SyscallContext, kwargs: &Value) -> Result<Value, CapError>;

    /// Providers whose output depends on anything beyond `ctx`/`kwargs`
    /// (wall clock, local RNG, adapter state) should override this to log
    /// at registration time, per spec.md §4.5.
    fn is_deterministic(&self) -> bool {
        true
    }
}

/// The canonical operation keys spec.md §4.5 names.
pub const OP_BLOB_PIN: &str = "blob.pin";
pub const OP_COMPUTE_AI_ENQUEUE: &str = "compute.ai.enqueue";
pub const OP_COMPUTE_QUANTUM_ENQUEUE: &str = "compute.quantum.enqueue";
pub const OP_RESULT_READ: &str = "result.read";
pub const OP_ZK_VERIFY: &str = "zk.verify";
pub const OP_RANDOM_BYTES: &str = "random.bytes";
pub const OP_TREASURY_DEBIT: &str = "treasury.debit";
pub const OP_TREASURY_CREDIT: &str = "treasury.credit";

/// Process-wide operation-key to handler dispatch table.
pub struct ProviderRegistry {
    handlers: DashMap<&'static str, Arc<dyn Provider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self {
            handlers: DashMap::new(),
        }
    }

    /// Replaces any prior handler registered under `key`.
    pub fn register(&self, key: &'static str, handler: Arc<dyn Provider>) {
        if !handler.is_deterministic() {
            warn!(key, "registering a non-deterministic provider");
        }
        self.handlers.insert(key, handler);
    }

    /// Looks up and invokes the handler for `key`. Known [`CapError`]
    /// variants propagate unchanged; anything else (there is nothing else,
    /// since every provider already returns `Result<_, CapError>`, but a
    /// future panic-catching boundary would wrap here) is folded into
    /// `CAP_ERROR("unexpected")` via [`CapError::unexpected`]. Per-operation
    /// metrics (enqueue counts, zk verdicts, etc.) are the responsibility
    /// of each provider, which holds its own `Arc<CapMetrics>` handle; this
    /// dispatch layer only owns lookup and the no-provider failure mode.
    pub async fn call(&self, key: &str, ctx: &SyscallContext, kwargs: &Value) -> Result<Value, CapError> {
        let Some(handler) = self.handlers.get(key).map(|entry| entry.value().clone()) else {
            return Err(CapError::no_provider(key));
        };
        handler.call(ctx, kwargs).await
    }

    /// `zk.verify` must return a bool-carrying map; validated here so a
    /// misbehaving provider cannot silently corrupt the typed wrapper's
    /// caller.
    pub async fn zk_verify_bool(
        &self,
        ctx: &SyscallContext,
        kwargs: &Value,
    ) -> Result<bool, CapError> {
        let result = self.call(OP_ZK_VERIFY, ctx, kwargs).await?;
        result
            .get("ok")
            .and_then(|v| match v {
                Value::Bool(b) => Some(*b),
                _ => None,
            })
            .ok_or_else(|| {
                CapError::unexpected(OP_ZK_VERIFY, "provider did not return a boolean `ok` field")
            })
    }

    /// `random.bytes` must return bytes; validated here for the same
    /// reason as [`Self::zk_verify_bool`].
    pub async fn random_bytes_typed(
        &self,
        ctx: &SyscallContext,
        kwargs: &Value,
    ) -> Result<Vec<u8>, CapError> {
        let result = self.call(OP_RANDOM_BYTES, ctx, kwargs).await?;
        result
            .as_bytes()
            .map(|b| b.to_vec())
            .ok_or_else(|| CapError::unexpected(OP_RANDOM_BYTES, "provider did not return bytes"))
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl Provider for Echo {
        async fn call(&self, _ctx: &SyscallContext, kwargs: &Value) -> Result<Value, CapError> {
            Ok(kwargs.clone())
        }
    }

    fn ctx() -> SyscallContext {
        SyscallContext::new(1, 10, b"tx".to_vec(), b"caller".to_vec())
    }

    #[tokio::test]
    async fn call_dispatches_to_registered_handler() {
        let registry = ProviderRegistry::new();
        registry.register(OP_BLOB_PIN, Arc::new(Echo));
        let result = registry
            .call(OP_BLOB_PIN, &ctx(), &Value::int(42))
            .await
            .unwrap();
        assert_eq!(result, Value::int(42));
    }

    #[tokio::test]
    async fn call_fails_with_no_provider_for_unregistered_key() {
        let registry = ProviderRegistry::new();
        let err = registry.call(OP_ZK_VERIFY, &ctx(), &Value::Null).await.unwrap_err();
        assert_eq!(err.kind.code(), "CAP_ERROR");
        assert!(!err.retryable);
    }

    #[tokio::test]
    async fn register_replaces_prior_handler() {
        struct AlwaysNull;
        #[async_trait]
        impl Provider for AlwaysNull {
            async fn call(&self, _ctx: &SyscallContext, _kwargs: &Value) -> Result<Value, CapError> {
                Ok(Value::Null)
            }
        }
        let registry = ProviderRegistry::new();
        registry.register(OP_BLOB_PIN, Arc::new(Echo));
        registry.register(OP_BLOB_PIN, Arc::new(AlwaysNull));
        let result = registry.call(OP_BLOB_PIN, &ctx(), &Value::int(1)).await.unwrap();
        assert_eq!(result, Value::Null);
    }
}
