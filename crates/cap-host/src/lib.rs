//! Provider registry and the concrete syscall providers it dispatches to:
//! `blob.pin`, `compute.{ai,quantum}.enqueue`, `result.read`, `zk.verify`,
//! `random.bytes`, and `treasury.{debit,credit}`.

pub mod providers;
pub mod registry;
pub mod treasury;

pub use registry::{Provider, ProviderRegistry};
pub use treasury::{TreasuryLedger, TreasuryNote, TreasuryOp};

use cap_adapters::{AicfAdapter, BeaconAdapter, DaAdapter, ZkAdapter};
use cap_config::SecurityLimits;
use cap_jobs::{JobQueue, ResultCache, ResultStore};
use cap_metrics::CapMetrics;
use std::sync::Arc;

/// Optional real-adapter wiring. Any field left `None` degrades that
/// provider to its local-queue or deterministic-stub fallback rather than
/// failing registration.
#[derive(Default, Clone)]
pub struct AdapterBundle {
    pub da: Option<Arc<dyn DaAdapter>>,
    pub aicf: Option<Arc<dyn AicfAdapter>>,
    pub zk: Option<Arc<dyn ZkAdapter>>,
    pub beacon: Option<Arc<dyn BeaconAdapter>>,
}

/// Builds a [`ProviderRegistry`] with all eight canonical operations
/// registered, wiring in whichever adapters `adapters` supplies and
/// falling back to `queue`/deterministic stubs for the rest.
pub fn build_default_registry(
    adapters: AdapterBundle,
    queue: Arc<JobQueue>,
    result_cache: Arc<ResultCache>,
    result_store: Arc<dyn ResultStore>,
    limits: Arc<SecurityLimits>,
    metrics: Arc<CapMetrics>,
) -> ProviderRegistry {
    let registry = ProviderRegistry::new();
    let ledger = Arc::new(TreasuryLedger::new());

    registry.register(
        registry::OP_BLOB_PIN,
        Arc::new(providers::blob::BlobPinProvider::new(
            adapters.da.clone(),
            limits.clone(),
            metrics.clone(),
        )),
    );
    registry.register(
        registry::OP_COMPUTE_AI_ENQUEUE,
        Arc::new(providers::compute::AiEnqueueProvider::new(
            adapters.aicf.clone(),
            Some(queue.clone()),
            limits.clone(),
            metrics.clone(),
        )),
    );
    registry.register(
        registry::OP_COMPUTE_QUANTUM_ENQUEUE,
        Arc::new(providers::compute::QuantumEnqueueProvider::new(
            adapters.aicf.clone(),
            Some(queue.clone()),
            limits.clone(),
            metrics.clone(),
        )),
    );
    registry.register(
        registry::OP_RESULT_READ,
        Arc::new(providers::result_read::ResultReadProvider::new(
            result_cache,
            result_store,
            metrics.clone(),
        )),
    );
    registry.register(
        registry::OP_ZK_VERIFY,
        Arc::new(providers::zk::ZkVerifyProvider::new(
            adapters.zk.clone(),
            limits.clone(),
            metrics.clone(),
        )),
    );
    registry.register(
        registry::OP_RANDOM_BYTES,
        Arc::new(providers::random::RandomBytesProvider::new(
            adapters.beacon.clone(),
            limits.clone(),
        )),
    );
    registry.register(
        registry::OP_TREASURY_DEBIT,
        Arc::new(providers::treasury::TreasuryNoteProvider::debit(
            ledger.clone(),
            limits.clone(),
            metrics.clone(),
        )),
    );
    registry.register(
        registry::OP_TREASURY_CREDIT,
        Arc::new(providers::treasury::TreasuryNoteProvider::credit(
            ledger,
            limits,
            metrics,
        )),
    );

    registry
}
