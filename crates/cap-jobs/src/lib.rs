//! Job lifecycle store: task-id derivation, the persistent job queue, the
//! result store and its in-process cache, the proof resolver, and receipt
//! construction/validation.

pub mod cache;
pub mod ids;
pub mod queue;
pub mod receipts;
pub mod resolver;
pub mod result_store;
pub mod types;

pub use cache::{CacheStats, ResultCache};
pub use ids::{derive_task_id, derive_task_id_from_digest};
pub use queue::{JobQueue, QueueFilter, QueueStats};
pub use receipts::{build_receipt, validate_receipt, ExpectedReceipt};
pub use resolver::{resolve_block, ResolveOutcome, SealedProof};
pub use result_store::{MemoryResultStore, ResultStore, SqliteResultStore};
pub use types::{
    JobKind, JobPayload, JobReceipt, JobReceiptV1, JobRequest, QueueItem, QueueStatus,
    ResultRecord, TreasuryNote, TreasuryOp,
};
