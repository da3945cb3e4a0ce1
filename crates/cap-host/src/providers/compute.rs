//! `compute.ai.enqueue`/`compute.quantum.enqueue`, grounded on the same
//! "prefer adapter, else local queue, else deterministic receipt without
//! persistence" degrade-gracefully idiom as `blob.pin`.

use crate::registry::Provider;
use async_trait::async_trait;
use cap_adapters::{AicfAdapter, SyscallContext};
use cap_config::SecurityLimits;
use cap_enc::{domains, encode, sha3_256, u16be, u32be, Value};
use cap_errors::CapError;
use cap_jobs::ids::derive_task_id_from_digest;
use cap_jobs::{JobKind, JobPayload, JobQueue, JobRequest};
use cap_metrics::CapMetrics;
use std::sync::Arc;

pub struct AiEnqueueProvider {
    adapter: Option<Arc<dyn AicfAdapter>>,
    queue: Option<Arc<JobQueue>>,
    limits: Arc<SecurityLimits>,
    metrics: Arc<CapMetrics>,
}

impl AiEnqueueProvider {
    pub fn new(
        adapter: Option<Arc<dyn AicfAdapter>>,
        queue: Option<Arc<JobQueue>>,
        limits: Arc<SecurityLimits>,
        metrics: Arc<CapMetrics>,
    ) -> Self {
        Self {
            adapter,
            queue,
            limits,
            metrics,
        }
    }
}

fn ai_payload_digest(model: &str, prompt: &[u8]) -> [u8; 32] {
    let mut buf = Vec::with_capacity(domains::AI.len() + 2 + model.len() + 4 + prompt.len());
    buf.extend_from_slice(domains::AI);
    buf.extend_from_slice(&u16be(model.len() as u16));
    buf.extend_from_slice(model.as_bytes());
    buf.extend_from_slice(&u32be(prompt.len() as u32));
    buf.extend_from_slice(prompt);
    sha3_256(&buf)
}

#[async_trait]
impl Provider for AiEnqueueProvider {
    async fn call(&self, ctx: &SyscallContext, kwargs: &Value) -> Result<Value, CapError> {
        let model = kwargs
            .get("model")
            .and_then(Value::as_text)
            .ok_or_else(|| CapError::invalid_input("compute.ai.enqueue: missing model"))?;
        let prompt = kwargs
            .get("prompt")
            .and_then(Value::as_bytes)
            .ok_or_else(|| CapError::invalid_input("compute.ai.enqueue: missing prompt"))?;

        if model.len() as u64 > self.limits.max_model_len {
            return Err(CapError::limit_exceeded("compute.ai.enqueue: model exceeds max_model_len"));
        }
        if prompt.is_empty() {
            return Err(CapError::invalid_input("compute.ai.enqueue: prompt must not be empty"));
        }
        if prompt.len() as u64 > self.limits.max_prompt_bytes {
            return Err(CapError::limit_exceeded("compute.ai.enqueue: prompt exceeds max_prompt_bytes"));
        }

        let payload_digest = ai_payload_digest(model, prompt);
        let task_id = derive_task_id_from_digest(
            ctx.chain_id as i64,
            ctx.height as i64,
            &ctx.tx_hash,
            &ctx.caller,
            &payload_digest,
        )?;

        let provider_label = if let Some(adapter) = &self.adapter {
            adapter.enqueue_ai(ctx, &task_id, model, prompt).await?;
            "aicf"
        } else if let Some(queue) = &self.queue {
            let request = JobRequest {
                kind: JobKind::Ai,
                caller: ctx.caller.clone(),
                chain_id: ctx.chain_id as i64,
                payload: JobPayload::Ai {
                    model: model.to_string(),
                    prompt: prompt.to_vec(),
                    params: None,
                },
                height_hint: Some(ctx.height as i64),
                created_at: ctx.height as i64,
            };
            queue
                .enqueue(
                    &request,
                    ctx.chain_id as i64,
                    ctx.height as i64,
                    &ctx.tx_hash,
                    &ctx.caller,
                    0.0,
                )
                .await?;
            "local_queue"
        } else {
            "none"
        };

        self.metrics.record_enqueue("ai");

        Ok(Value::map(vec![
            (Value::text("task_id"), Value::bytes(task_id.to_vec())),
            (Value::text("kind"), Value::text("AI")),
            (Value::text("height"), Value::int(ctx.height)),
            (Value::text("provider"), Value::text(provider_label)),
        ]))
    }
}

pub struct QuantumEnqueueProvider {
    adapter: Option<Arc<dyn AicfAdapter>>,
    queue: Option<Arc<JobQueue>>,
    limits: Arc<SecurityLimits>,
    metrics: Arc<CapMetrics>,
}

impl QuantumEnqueueProvider {
    pub fn new(
        adapter: Option<Arc<dyn AicfAdapter>>,
        queue: Option<Arc<JobQueue>>,
        limits: Arc<SecurityLimits>,
        metrics: Arc<CapMetrics>,
    ) -> Self {
        Self {
            adapter,
            queue,
            limits,
            metrics,
        }
    }
}

fn quantum_payload_digest(circuit: &[u8], shots: u32, extras: &Value) -> Result<[u8; 32], CapError> {
    let extras_canonical = encode(extras)?;
    let mut buf = Vec::with_capacity(
        domains::QUANTUM.len() + 4 + circuit.len() + 4 + 4 + extras_canonical.len(),
    );
    buf.extend_from_slice(domains::QUANTUM);
    buf.extend_from_slice(&u32be(circuit.len() as u32));
    buf.extend_from_slice(circuit);
    buf.extend_from_slice(&u32be(shots));
    buf.extend_from_slice(&u32be(extras_canonical.len() as u32));
    buf.extend_from_slice(&extras_canonical);
    Ok(sha3_256(&buf))
}

#[async_trait]
impl Provider for QuantumEnqueueProvider {
    async fn call(&self, ctx: &SyscallContext, kwargs: &Value) -> Result<Value, CapError> {
        let circuit_value = kwargs
            .get("circuit")
            .ok_or_else(|| CapError::invalid_input("compute.quantum.enqueue: missing circuit"))?;
        let circuit: Vec<u8> = match circuit_value {
            Value::Bytes(bytes) => bytes.clone(),
            Value::Map(_) | Value::Array(_) => encode(circuit_value)?,
            _ => {
                return Err(CapError::invalid_input(
                    "compute.quantum.enqueue: circuit must be bytes or a mapping",
                ))
            }
        };
        let circuit = circuit.as_slice();
        let shots = kwargs
            .get("shots")
            .and_then(Value::as_int)
            .ok_or_else(|| CapError::invalid_input("compute.quantum.enqueue: missing shots"))?;
        let extras = kwargs.get("extras").cloned().unwrap_or(Value::Null);

        if shots <= 0 {
            return Err(CapError::invalid_input("compute.quantum.enqueue: shots must be positive"));
        }
        if shots as u64 > self.limits.max_shots {
            return Err(CapError::limit_exceeded("compute.quantum.enqueue: shots exceeds max_shots"));
        }
        if circuit.len() as u64 > self.limits.max_circuit_bytes {
            return Err(CapError::limit_exceeded(
                "compute.quantum.enqueue: circuit exceeds max_circuit_bytes",
            ));
        }
        let shots = shots as u32;

        let payload_digest = quantum_payload_digest(circuit, shots, &extras)?;
        let task_id = derive_task_id_from_digest(
            ctx.chain_id as i64,
            ctx.height as i64,
            &ctx.tx_hash,
            &ctx.caller,
            &payload_digest,
        )?;

        let provider_label = if let Some(adapter) = &self.adapter {
            adapter
                .enqueue_quantum(ctx, &task_id, circuit, shots as u64, &extras)
                .await?;
            "aicf"
        } else if let Some(queue) = &self.queue {
            let request = JobRequest {
                kind: JobKind::Quantum,
                caller: ctx.caller.clone(),
                chain_id: ctx.chain_id as i64,
                payload: JobPayload::Quantum {
                    circuit: circuit.to_vec(),
                    shots,
                    extras: Some(extras.clone()),
                },
                height_hint: Some(ctx.height as i64),
                created_at: ctx.height as i64,
            };
            queue
                .enqueue(
                    &request,
                    ctx.chain_id as i64,
                    ctx.height as i64,
                    &ctx.tx_hash,
                    &ctx.caller,
                    0.0,
                )
                .await?;
            "local_queue"
        } else {
            "none"
        };

        self.metrics.record_enqueue("quantum");

        Ok(Value::map(vec![
            (Value::text("task_id"), Value::bytes(task_id.to_vec())),
            (Value::text("kind"), Value::text("QUANTUM")),
            (Value::text("height"), Value::int(ctx.height)),
            (Value::text("provider"), Value::text(provider_label)),
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
    async fn ai_enqueue_without_adapter_or_queue_returns_deterministic_receipt() {
        let provider = AiEnqueueProvider::new(None, None, Arc::new(SecurityLimits::default()), metrics());
        let kwargs = Value::map(vec![
            (Value::text("model"), Value::text("tiny")),
            (Value::text("prompt"), Value::bytes(b"hi".to_vec())),
        ]);
        let result = provider.call(&ctx(), &kwargs).await.unwrap();
        assert_eq!(result.get("provider").unwrap().as_text(), Some("none"));
        assert_eq!(result.get("kind").unwrap().as_text(), Some("AI"));
    }

    #[tokio::test]
    async fn ai_enqueue_rejects_empty_prompt() {
        let provider = AiEnqueueProvider::new(None, None, Arc::new(SecurityLimits::default()), metrics());
        let kwargs = Value::map(vec![
            (Value::text("model"), Value::text("tiny")),
            (Value::text("prompt"), Value::bytes(Vec::new())),
        ]);
        assert!(provider.call(&ctx(), &kwargs).await.is_err());
    }

    #[tokio::test]
    async fn quantum_enqueue_via_local_queue_lands_in_queue() {
        let queue = Arc::new(JobQueue::connect("sqlite::memory:").await.unwrap());
        let provider = QuantumEnqueueProvider::new(
            None,
            Some(queue.clone()),
            Arc::new(SecurityLimits::default()),
            metrics(),
        );
        let kwargs = Value::map(vec![
            (Value::text("circuit"), Value::bytes(b"H 0; CX 0 1".to_vec())),
            (Value::text("shots"), Value::int(100)),
        ]);
        let result = provider.call(&ctx(), &kwargs).await.unwrap();
        assert_eq!(result.get("provider").unwrap().as_text(), Some("local_queue"));
        let stats = queue.stats().await.unwrap();
        assert_eq!(stats.queued, 1);
    }

    #[tokio::test]
    async fn quantum_enqueue_rejects_non_positive_shots() {
        let provider =
            QuantumEnqueueProvider::new(None, None, Arc::new(SecurityLimits::default()), metrics());
        let kwargs = Value::map(vec![
            (Value::text("circuit"), Value::bytes(b"H 0".to_vec())),
            (Value::text("shots"), Value::int(0)),
        ]);
        assert!(provider.call(&ctx(), &kwargs).await.is_err());
    }

    #[tokio::test]
    async fn quantum_enqueue_accepts_a_mapping_circuit() {
        let provider =
            QuantumEnqueueProvider::new(None, None, Arc::new(SecurityLimits::default()), metrics());
        let circuit = Value::map(vec![
            (Value::text("gates"), Value::Array(vec![Value::text("H"), Value::text("CX")])),
            (Value::text("qubits"), Value::int(2)),
        ]);
        let kwargs = Value::map(vec![
            (Value::text("circuit"), circuit),
            (Value::text("shots"), Value::int(10)),
        ]);
        let result = provider.call(&ctx(), &kwargs).await.unwrap();
        assert_eq!(result.get("kind").unwrap().as_text(), Some("QUANTUM"));
    }

    #[tokio::test]
    async fn quantum_enqueue_rejects_non_bytes_non_mapping_circuit() {
        let provider =
            QuantumEnqueueProvider::new(None, None, Arc::new(SecurityLimits::default()), metrics());
        let kwargs = Value::map(vec![
            (Value::text("circuit"), Value::int(5)),
            (Value::text("shots"), Value::int(10)),
        ]);
        assert!(provider.call(&ctx(), &kwargs).await.is_err());
    }
}
