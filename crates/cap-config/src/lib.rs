//! Immutable configuration for the capabilities core, grounded on
//! `metanode-config::MetanodeConfig`'s nested-struct shape. Unlike the
//! teacher (which loads CUE files), this crate resolves from an explicit
//! dotted-key config map plus `ANIMICA_CAP_`-prefixed environment
//! overrides, per spec.md §4.4 / §6, clamping every range to a safe value
//! after load.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const ENV_PREFIX: &str = "ANIMICA_CAP_";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureFlags {
    pub blob: bool,
    pub ai: bool,
    pub quantum: bool,
    pub zk: bool,
    pub random: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            blob: true,
            ai: true,
            quantum: true,
            zk: true,
            random: true,
        }
    }
}

/// Per-kind VM metering constants. `base` is charged once per call,
/// `unit` is charged per byte of the dominant input (prompt, circuit,
/// blob data, proof bytes).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GasCosts {
    pub ai_base: u64,
    pub ai_unit: u64,
    pub quantum_base: u64,
    pub quantum_unit: u64,
    pub blob_base: u64,
    pub blob_unit: u64,
    pub zk_base: u64,
    pub zk_unit: u64,
}

impl Default for GasCosts {
    fn default() -> Self {
        Self {
            ai_base: 50_000,
            ai_unit: 4,
            quantum_base: 80_000,
            quantum_unit: 8,
            blob_base: 10_000,
            blob_unit: 1,
            zk_base: 120_000,
            zk_unit: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueLimits {
    pub max_inflight: u64,
    pub max_per_caller: u64,
    pub enqueue_timeout_secs: u64,
    pub result_read_timeout_secs: u64,
    /// Fraction of `max_inflight` at which enqueue begins shedding load.
    pub backpressure_target: f64,
}

impl Default for QueueLimits {
    fn default() -> Self {
        Self {
            max_inflight: 10_000,
            max_per_caller: 64,
            enqueue_timeout_secs: 30,
            result_read_timeout_secs: 30,
            backpressure_target: 0.85,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultPolicy {
    pub ttl_blocks: u64,
    pub max_result_bytes: u64,
}

impl Default for ResultPolicy {
    fn default() -> Self {
        Self {
            ttl_blocks: 100_800, // ~ 90 days at 12.5 min/block spaced blocks; caller-tunable
            max_result_bytes: 1 << 20,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityLimits {
    pub max_payload_bytes: u64,
    pub max_blob_bytes: u64,
    pub max_model_len: u64,
    pub max_prompt_bytes: u64,
    pub max_circuit_bytes: u64,
    pub max_shots: u64,
    pub max_zk_field_bytes: u64,
    pub max_zk_total_bytes: u64,
    pub max_random_bytes: u64,
    pub max_treasury_reason_len: u64,
    pub max_debit_per_tx: u64,
    pub max_credit_per_tx: u64,
}

impl Default for SecurityLimits {
    fn default() -> Self {
        Self {
            max_payload_bytes: 1 << 20,
            max_blob_bytes: 8 << 20,
            max_model_len: 256,
            max_prompt_bytes: 64 << 10,
            max_circuit_bytes: 1 << 20,
            max_shots: 1_000_000,
            max_zk_field_bytes: 1 << 20,
            max_zk_total_bytes: 4 << 20,
            max_random_bytes: 4096,
            max_treasury_reason_len: 128,
            max_debit_per_tx: 1_000_000_000,
            max_credit_per_tx: 1_000_000_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CapConfig {
    pub features: FeatureFlags,
    pub gas: GasCosts,
    pub queue: QueueLimits,
    pub results: ResultPolicy,
    pub limits: SecurityLimits,
}

impl CapConfig {
    /// Resolve a config from an explicit dotted-key map (e.g.
    /// `"queue.max_inflight" -> 5000`), then apply `ANIMICA_CAP_`-prefixed
    /// environment overrides, then clamp every range to a safe value.
    pub fn resolve(raw: &BTreeMap<String, serde_json::Value>) -> Self {
        let mut cfg = Self::default();
        cfg.apply_map(raw);
        cfg.apply_env();
        cfg.clamp();
        cfg
    }

    fn apply_map(&mut self, raw: &BTreeMap<String, serde_json::Value>) {
        for (key, value) in raw {
            self.apply_one(key, value);
        }
    }

    fn apply_env(&mut self) {
        for (key, value) in std::env::vars() {
            if let Some(suffix) = key.strip_prefix(ENV_PREFIX) {
                let dotted = suffix.to_ascii_lowercase().replace('_', ".");
                if let Ok(parsed) = serde_json::from_str::<serde_json::Value>(&value) {
                    self.apply_one(&dotted, &parsed);
                } else {
                    self.apply_one(&dotted, &serde_json::Value::String(value));
                }
            }
        }
    }

    fn apply_one(&mut self, key: &str, value: &serde_json::Value) {
        macro_rules! set_bool {
            ($field:expr) => {
                if let Some(b) = value.as_bool() {
                    $field = b;
                }
            };
        }
        macro_rules! set_u64 {
            ($field:expr) => {
                if let Some(n) = value.as_u64() {
                    $field = n;
                }
            };
        }
        macro_rules! set_f64 {
            ($field:expr) => {
                if let Some(n) = value.as_f64() {
                    $field = n;
                }
            };
        }
        match key {
            "features.blob" => set_bool!(self.features.blob),
            "features.ai" => set_bool!(self.features.ai),
            "features.quantum" => set_bool!(self.features.quantum),
            "features.zk" => set_bool!(self.features.zk),
            "features.random" => set_bool!(self.features.random),
            "gas.ai.base" => set_u64!(self.gas.ai_base),
            "gas.ai.unit" => set_u64!(self.gas.ai_unit),
            "gas.quantum.base" => set_u64!(self.gas.quantum_base),
            "gas.quantum.unit" => set_u64!(self.gas.quantum_unit),
            "gas.blob.base" => set_u64!(self.gas.blob_base),
            "gas.blob.unit" => set_u64!(self.gas.blob_unit),
            "gas.zk.base" => set_u64!(self.gas.zk_base),
            "gas.zk.unit" => set_u64!(self.gas.zk_unit),
            "queue.max_inflight" => set_u64!(self.queue.max_inflight),
            "queue.max_per_caller" => set_u64!(self.queue.max_per_caller),
            "queue.enqueue_timeout" => set_u64!(self.queue.enqueue_timeout_secs),
            "queue.result_read_timeout" => set_u64!(self.queue.result_read_timeout_secs),
            "queue.backpressure_target" => set_f64!(self.queue.backpressure_target),
            "results.ttl_blocks" => set_u64!(self.results.ttl_blocks),
            "results.max_result_bytes" => set_u64!(self.results.max_result_bytes),
            "limits.max_payload_bytes" => set_u64!(self.limits.max_payload_bytes),
            "limits.max_blob_bytes" => set_u64!(self.limits.max_blob_bytes),
            "limits.max_model_len" => set_u64!(self.limits.max_model_len),
            "limits.max_prompt_bytes" => set_u64!(self.limits.max_prompt_bytes),
            "limits.max_circuit_bytes" => set_u64!(self.limits.max_circuit_bytes),
            "limits.max_shots" => set_u64!(self.limits.max_shots),
            "limits.max_zk_field_bytes" => set_u64!(self.limits.max_zk_field_bytes),
            "limits.max_zk_total_bytes" => set_u64!(self.limits.max_zk_total_bytes),
            "limits.max_random_bytes" => set_u64!(self.limits.max_random_bytes),
            "limits.max_treasury_reason_len" => set_u64!(self.limits.max_treasury_reason_len),
            "limits.max_debit_per_tx" => set_u64!(self.limits.max_debit_per_tx),
            "limits.max_credit_per_tx" => set_u64!(self.limits.max_credit_per_tx),
            _ => tracing::debug!(key, "ignoring unrecognized configuration key"),
        }
    }

    /// Clamp every range-bound value to a safe value, per spec.md §4.4 /
    /// §6 ("All ranges are clamped to safe values after load").
    fn clamp(&mut self) {
        self.queue.backpressure_target = self.queue.backpressure_target.clamp(0.1, 0.99);
        self.queue.max_inflight = self.queue.max_inflight.max(1);
        self.queue.max_per_caller = self.queue.max_per_caller.max(1).min(self.queue.max_inflight);
        self.queue.enqueue_timeout_secs = self.queue.enqueue_timeout_secs.clamp(1, 600);
        self.queue.result_read_timeout_secs = self.queue.result_read_timeout_secs.clamp(1, 600);
        self.results.ttl_blocks = self.results.ttl_blocks.max(1);
        self.results.max_result_bytes = self.results.max_result_bytes.clamp(1, 64 << 20);
        self.limits.max_payload_bytes = self.limits.max_payload_bytes.clamp(1, 64 << 20);
        self.limits.max_blob_bytes = self.limits.max_blob_bytes.clamp(1, 256 << 20);
        self.limits.max_model_len = self.limits.max_model_len.clamp(1, 4096);
        self.limits.max_prompt_bytes = self.limits.max_prompt_bytes.clamp(1, 16 << 20);
        self.limits.max_circuit_bytes = self.limits.max_circuit_bytes.clamp(1, 16 << 20);
        self.limits.max_shots = self.limits.max_shots.clamp(1, 10_000_000);
        self.limits.max_zk_field_bytes = self.limits.max_zk_field_bytes.clamp(1, 16 << 20);
        self.limits.max_zk_total_bytes = self
            .limits
            .max_zk_total_bytes
            .clamp(self.limits.max_zk_field_bytes, 64 << 20);
        self.limits.max_random_bytes = self.limits.max_random_bytes.clamp(1, 1 << 20);
        self.limits.max_treasury_reason_len = self.limits.max_treasury_reason_len.clamp(1, 1024);
    }
}

/// Initializes a `tracing_subscriber` the way every teacher binary does in
/// `main`, exposed here so an embedding node binary (out of scope for this
/// crate graph) can bootstrap logging without redeclaring the same
/// boilerplate.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_already_within_clamp_ranges() {
        let mut cfg = CapConfig::default();
        let before = cfg.clone();
        cfg.clamp();
        assert_eq!(before, cfg);
    }

    #[test]
    fn map_override_applies_and_clamps() {
        let mut raw = BTreeMap::new();
        raw.insert(
            "queue.backpressure_target".to_string(),
            serde_json::json!(5.0),
        );
        raw.insert("queue.max_inflight".to_string(), serde_json::json!(500));
        let cfg = CapConfig::resolve(&raw);
        assert_eq!(cfg.queue.backpressure_target, 0.99);
        assert_eq!(cfg.queue.max_inflight, 500);
    }

    #[test]
    fn unknown_keys_are_ignored_not_fatal() {
        let mut raw = BTreeMap::new();
        raw.insert("does.not.exist".to_string(), serde_json::json!(true));
        let cfg = CapConfig::resolve(&raw);
        assert_eq!(cfg, CapConfig::default());
    }
}
