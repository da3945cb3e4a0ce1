//! Optional adapter interfaces consumed by the capabilities core, grounded
//! on the teacher's `async-trait` object pattern (`bpi-oracle-node`'s
//! trait-object adapters). Every adapter is optional: `cap-host` degrades
//! to a deterministic fallback whenever one isn't wired in, per
//! spec.md §6.

use async_trait::async_trait;
use cap_errors::CapError;

/// Everything a provider or adapter is allowed to derive identifiers and
/// digests from. Adapters must not read wall clocks, process IDs, or OS
/// randomness beyond what is passed here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyscallContext {
    pub chain_id: u64,
    pub height: u64,
    pub tx_hash: Vec<u8>,
    pub caller: Vec<u8>,
    pub gas_left: Option<u64>,
}

impl SyscallContext {
    pub fn new(chain_id: u64, height: u64, tx_hash: Vec<u8>, caller: Vec<u8>) -> Self {
        Self {
            chain_id,
            height,
            tx_hash,
            caller,
            gas_left: None,
        }
    }

    pub fn with_gas_left(mut self, gas_left: u64) -> Self {
        self.gas_left = Some(gas_left);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinResult {
    pub commitment: Vec<u8>,
    pub namespace: String,
    pub size: u64,
    pub receipt: Option<Vec<u8>>,
}

/// Data-availability adapter: blob pinning and retrieval.
#[async_trait]
pub trait DaAdapter: Send + Sync {
    async fn pin_blob(
        &self,
        ctx: &SyscallContext,
        namespace: &str,
        data: &[u8],
    ) -> Result<PinResult, CapError>;

    async fn get_blob(&self, commitment: &[u8]) -> Result<Vec<u8>, CapError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AicfJobStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AicfJobInfo {
    pub status: AicfJobStatus,
    pub result_digest: Option<Vec<u8>>,
    pub provider_id: Option<String>,
    pub traps_ratio: Option<f64>,
    pub qos: Option<f64>,
    pub latency_ms: Option<u64>,
}

/// AI/Compute fabric queue adapter: off-chain job submission and polling.
#[async_trait]
pub trait AicfAdapter: Send + Sync {
    async fn enqueue_ai(
        &self,
        ctx: &SyscallContext,
        task_id: &[u8],
        model: &str,
        prompt: &[u8],
    ) -> Result<(), CapError>;

    async fn enqueue_quantum(
        &self,
        ctx: &SyscallContext,
        task_id: &[u8],
        circuit: &[u8],
        shots: u64,
        extras: &cap_enc::Value,
    ) -> Result<(), CapError>;

    async fn get_job(&self, job_id: &[u8]) -> Result<AicfJobInfo, CapError>;
}

/// Randomness beacon adapter. `get_beacon_bytes` is the canonical entry
/// point; `get_beacon`/`get_round`/`get_history` exist for tooling and
/// inspection, matching spec.md §6's literal method list.
#[async_trait]
pub trait BeaconAdapter: Send + Sync {
    async fn get_beacon_bytes(&self, height: u64) -> Result<Vec<u8>, CapError>;

    async fn get_beacon(&self, height: u64) -> Result<cap_enc::Value, CapError> {
        let bytes = self.get_beacon_bytes(height).await?;
        Ok(cap_enc::Value::bytes(bytes))
    }

    async fn get_round(&self, height: u64) -> Result<u64, CapError> {
        Ok(height)
    }

    async fn get_history(&self, from_height: u64, count: u64) -> Result<Vec<Vec<u8>>, CapError> {
        let mut out = Vec::new();
        for h in from_height..from_height.saturating_add(count) {
            out.push(self.get_beacon_bytes(h).await?);
        }
        Ok(out)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZkVerifyOutcome {
    pub ok: bool,
    pub units: Option<u64>,
}

/// Zero-knowledge proof verifier adapter.
#[async_trait]
pub trait ZkAdapter: Send + Sync {
    async fn verify(
        &self,
        circuit: &[u8],
        proof: &[u8],
        public_input: &[u8],
    ) -> Result<ZkVerifyOutcome, CapError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProofEnvelope {
    pub type_id: u32,
    pub body: Vec<u8>,
    pub nullifier: Option<Vec<u8>>,
}

/// Decodes opaque attestation/proof bytes into a typed envelope for the
/// resolver. `name_for_type_id` is advisory (logging/metrics labels only).
pub trait ProofDecoder: Send + Sync {
    fn decode_envelope(&self, bytes: &[u8]) -> Result<ProofEnvelope, CapError>;

    fn name_for_type_id(&self, type_id: u32) -> Option<String> {
        let _ = type_id;
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedBeacon(Vec<u8>);

    #[async_trait]
    impl BeaconAdapter for FixedBeacon {
        async fn get_beacon_bytes(&self, _height: u64) -> Result<Vec<u8>, CapError> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn default_history_method_calls_bytes_per_height() {
        let beacon = FixedBeacon(vec![1, 2, 3]);
        let history = beacon.get_history(10, 3).await.unwrap();
        assert_eq!(history, vec![vec![1, 2, 3]; 3]);
    }

    #[tokio::test]
    async fn default_round_method_echoes_height() {
        let beacon = FixedBeacon(vec![9]);
        assert_eq!(beacon.get_round(42).await.unwrap(), 42);
    }
}
