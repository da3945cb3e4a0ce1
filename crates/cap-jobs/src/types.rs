//! Core data model: `JobKind`, `JobPayload`, `JobRequest`, `JobReceipt`,
//! `ResultRecord`, `QueueItem`, `JobReceiptV1`, `TreasuryNote`. Every type
//! that crosses the canonical codec boundary implements `ToValue`/
//! `FromValue` by hand, mirroring `cap_enc::Value`'s own impls rather than
//! deriving through `serde_json`.

use cap_enc::{CodecError, FromValue, ToValue, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    Ai,
    Quantum,
}

impl JobKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            JobKind::Ai => "AI",
            JobKind::Quantum => "QUANTUM",
        }
    }
}

impl ToValue for JobKind {
    fn to_value(&self) -> Value {
        Value::text(self.as_str())
    }
}

impl FromValue for JobKind {
    fn from_value(value: &Value) -> Result<Self, CodecError> {
        match value.as_text() {
            Some("AI") => Ok(JobKind::Ai),
            Some("QUANTUM") => Ok(JobKind::Quantum),
            _ => Err(CodecError::MissingOrWrongType("JobKind")),
        }
    }
}

/// Typed alternative to the distilled spec's untyped `payload: map<string,
/// any>`, encoded as a canonical map tagged by `"kind"` so the wire shape
/// stays `map<string, any>`-compatible.
#[derive(Debug, Clone, PartialEq)]
pub enum JobPayload {
    Ai {
        model: String,
        prompt: Vec<u8>,
        params: Option<Value>,
    },
    Quantum {
        circuit: Vec<u8>,
        shots: u32,
        extras: Option<Value>,
    },
}

impl JobPayload {
    pub fn kind(&self) -> JobKind {
        match self {
            JobPayload::Ai { .. } => JobKind::Ai,
            JobPayload::Quantum { .. } => JobKind::Quantum,
        }
    }
}

impl ToValue for JobPayload {
    fn to_value(&self) -> Value {
        match self {
            JobPayload::Ai {
                model,
                prompt,
                params,
            } => Value::map(vec![
                (Value::text("kind"), Value::text("AI")),
                (Value::text("model"), Value::text(model.clone())),
                (Value::text("prompt"), Value::bytes(prompt.clone())),
                (Value::text("params"), params.to_value()),
            ]),
            JobPayload::Quantum {
                circuit,
                shots,
                extras,
            } => Value::map(vec![
                (Value::text("kind"), Value::text("QUANTUM")),
                (Value::text("circuit"), Value::bytes(circuit.clone())),
                (Value::text("shots"), Value::int(*shots)),
                (Value::text("extras"), extras.to_value()),
            ]),
        }
    }
}

impl FromValue for JobPayload {
    fn from_value(value: &Value) -> Result<Self, CodecError> {
        match value.get("kind").and_then(Value::as_text) {
            Some("AI") => {
                let model = value
                    .get("model")
                    .ok_or(CodecError::MissingOrWrongType("model"))
                    .and_then(String::from_value)?;
                let prompt = value
                    .get("prompt")
                    .ok_or(CodecError::MissingOrWrongType("prompt"))
                    .and_then(Vec::<u8>::from_value)?;
                let params = match value.get("params") {
                    Some(Value::Null) | None => None,
                    Some(v) => Some(v.clone()),
                };
                Ok(JobPayload::Ai {
                    model,
                    prompt,
                    params,
                })
            }
            Some("QUANTUM") => {
                let circuit = value
                    .get("circuit")
                    .ok_or(CodecError::MissingOrWrongType("circuit"))
                    .and_then(Vec::<u8>::from_value)?;
                let shots = value
                    .get("shots")
                    .ok_or(CodecError::MissingOrWrongType("shots"))
                    .and_then(u32::from_value)?;
                let extras = match value.get("extras") {
                    Some(Value::Null) | None => None,
                    Some(v) => Some(v.clone()),
                };
                Ok(JobPayload::Quantum {
                    circuit,
                    shots,
                    extras,
                })
            }
            _ => Err(CodecError::MissingOrWrongType("JobPayload.kind")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct JobRequest {
    pub kind: JobKind,
    pub caller: Vec<u8>,
    pub chain_id: i64,
    pub payload: JobPayload,
    pub height_hint: Option<i64>,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JobReceipt {
    pub task_id: [u8; 32],
    pub kind: JobKind,
    pub caller: Vec<u8>,
    pub chain_id: i64,
    pub height_hint: Option<i64>,
    pub created_at: i64,
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResultRecord {
    pub task_id: [u8; 32],
    pub kind: JobKind,
    pub success: bool,
    pub height_available: i64,
    pub output_digest: Vec<u8>,
    pub output_pointer: Option<String>,
    pub metrics: Value,
    pub error: Option<String>,
    pub completed_at: i64,
}

impl ToValue for ResultRecord {
    fn to_value(&self) -> Value {
        Value::map(vec![
            (Value::text("task_id"), Value::bytes(self.task_id.to_vec())),
            (Value::text("kind"), self.kind.to_value()),
            (Value::text("success"), Value::Bool(self.success)),
            (
                Value::text("height_available"),
                Value::int(self.height_available),
            ),
            (
                Value::text("output_digest"),
                Value::bytes(self.output_digest.clone()),
            ),
            (
                Value::text("output_pointer"),
                self.output_pointer.to_value(),
            ),
            (Value::text("metrics"), self.metrics.clone()),
            (Value::text("error"), self.error.to_value()),
            (Value::text("completed_at"), Value::int(self.completed_at)),
        ])
    }
}

impl FromValue for ResultRecord {
    fn from_value(value: &Value) -> Result<Self, CodecError> {
        let task_id_bytes = value
            .get("task_id")
            .ok_or(CodecError::MissingOrWrongType("task_id"))
            .and_then(Vec::<u8>::from_value)?;
        let mut task_id = [0u8; 32];
        if task_id_bytes.len() != 32 {
            return Err(CodecError::MissingOrWrongType("task_id"));
        }
        task_id.copy_from_slice(&task_id_bytes);

        Ok(ResultRecord {
            task_id,
            kind: value
                .get("kind")
                .ok_or(CodecError::MissingOrWrongType("kind"))
                .and_then(JobKind::from_value)?,
            success: value
                .get("success")
                .ok_or(CodecError::MissingOrWrongType("success"))
                .and_then(bool::from_value)?,
            height_available: value
                .get("height_available")
                .ok_or(CodecError::MissingOrWrongType("height_available"))
                .and_then(i64::from_value)?,
            output_digest: value
                .get("output_digest")
                .ok_or(CodecError::MissingOrWrongType("output_digest"))
                .and_then(Vec::<u8>::from_value)?,
            output_pointer: match value.get("output_pointer") {
                Some(Value::Null) | None => None,
                Some(v) => Some(String::from_value(v)?),
            },
            metrics: value.get("metrics").cloned().unwrap_or(Value::Null),
            error: match value.get("error") {
                Some(Value::Null) | None => None,
                Some(v) => Some(String::from_value(v)?),
            },
            completed_at: value
                .get("completed_at")
                .ok_or(CodecError::MissingOrWrongType("completed_at"))
                .and_then(i64::from_value)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueStatus {
    Queued,
    InProgress,
    Completed,
    Failed,
    Expired,
}

impl QueueStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            QueueStatus::Queued => "QUEUED",
            QueueStatus::InProgress => "IN_PROGRESS",
            QueueStatus::Completed => "COMPLETED",
            QueueStatus::Failed => "FAILED",
            QueueStatus::Expired => "EXPIRED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "QUEUED" => Some(QueueStatus::Queued),
            "IN_PROGRESS" => Some(QueueStatus::InProgress),
            "COMPLETED" => Some(QueueStatus::Completed),
            "FAILED" => Some(QueueStatus::Failed),
            "EXPIRED" => Some(QueueStatus::Expired),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueueItem {
    pub task_id: [u8; 32],
    pub kind: JobKind,
    pub chain_id: i64,
    pub height: i64,
    pub tx_hash: Vec<u8>,
    pub caller: Vec<u8>,
    pub payload_bytes: Vec<u8>,
    pub priority: f64,
    pub status: QueueStatus,
    pub attempts: i64,
    pub error: Option<String>,
    pub result_bytes: Option<Vec<u8>>,
    pub enqueued_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JobReceiptV1 {
    pub version: u32,
    pub task_id: [u8; 32],
    pub kind: JobKind,
    pub chain_id: i64,
    pub height: i64,
    pub tx_hash: Vec<u8>,
    pub caller: Vec<u8>,
    pub payload_hash: [u8; 32],
    pub created_at: i64,
    pub digest: [u8; 64],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreasuryOp {
    Debit,
    Credit,
}

impl TreasuryOp {
    pub const fn as_str(self) -> &'static str {
        match self {
            TreasuryOp::Debit => "debit",
            TreasuryOp::Credit => "credit",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TreasuryNote {
    pub op: TreasuryOp,
    pub amount: u64,
    pub reason: String,
    pub index: u32,
}
