//! Per-transaction treasury note ledger, grounded on `bpi-oracle-node`'s
//! `parking_lot::Mutex`-guarded bucket-keyed accounting pattern.

use cap_config::SecurityLimits;
use cap_errors::CapError;
use parking_lot::Mutex;
use std::collections::HashMap;

/// Bucket key: one ledger per `(chain_id, height, tx_hash)`, matching
/// spec.md §4.6's "per-tx bucket" rule exactly.
type TxKey = (u64, u64, Vec<u8>);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreasuryOp {
    Debit,
    Credit,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TreasuryNote {
    pub op: TreasuryOp,
    pub amount: u64,
    pub reason: String,
    pub index: u32,
}

#[derive(Default)]
struct Bucket {
    notes: Vec<TreasuryNote>,
    debit_sum: u64,
    credit_sum: u64,
}

/// Tracks debit/credit notes within the current transaction's bucket,
/// enforcing per-tx running-sum caps from [`SecurityLimits`].
pub struct TreasuryLedger {
    buckets: Mutex<HashMap<TxKey, Bucket>>,
}

impl TreasuryLedger {
    pub fn new() -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
        }
    }

    fn key(chain_id: u64, height: u64, tx_hash: &[u8]) -> TxKey {
        (chain_id, height, tx_hash.to_vec())
    }

    /// Normalizes `reason`: ASCII only, spaces to underscores, truncated to
    /// `limits.max_treasury_reason_len`. Non-ASCII bytes are dropped rather
    /// than rejected, matching the teacher's permissive sanitize-don't-fail
    /// idiom for human-supplied free text.
    pub fn normalize_reason(reason: &str, limits: &SecurityLimits) -> String {
        let cleaned: String = reason
            .chars()
            .filter(|c| c.is_ascii())
            .map(|c| if c == ' ' { '_' } else { c })
            .collect();
        let cap = limits.max_treasury_reason_len as usize;
        if cleaned.len() > cap {
            cleaned.chars().take(cap).collect()
        } else {
            cleaned
        }
    }

    pub fn record(
        &self,
        chain_id: u64,
        height: u64,
        tx_hash: &[u8],
        op: TreasuryOp,
        amount: u64,
        reason: &str,
        limits: &SecurityLimits,
    ) -> Result<TreasuryNote, CapError> {
        let cap = match op {
            TreasuryOp::Debit => limits.max_debit_per_tx,
            TreasuryOp::Credit => limits.max_credit_per_tx,
        };
        let normalized_reason = Self::normalize_reason(reason, limits);

        let mut buckets = self.buckets.lock();
        let bucket = buckets.entry(Self::key(chain_id, height, tx_hash)).or_default();

        let running_sum = match op {
            TreasuryOp::Debit => bucket.debit_sum,
            TreasuryOp::Credit => bucket.credit_sum,
        };
        let new_sum = running_sum.checked_add(amount).ok_or_else(|| {
            CapError::limit_exceeded("treasury running sum overflow").with_retryable(false)
        })?;
        if new_sum > cap {
            return Err(CapError::limit_exceeded("per-tx treasury cap exceeded")
                .with_detail("cap", cap)
                .with_detail("attempted", new_sum)
                .with_retryable(false));
        }

        let index = bucket.notes.len() as u32;
        let note = TreasuryNote {
            op,
            amount,
            reason: normalized_reason,
            index,
        };
        bucket.notes.push(note.clone());
        match op {
            TreasuryOp::Debit => bucket.debit_sum = new_sum,
            TreasuryOp::Credit => bucket.credit_sum = new_sum,
        }
        Ok(note)
    }

    pub fn peek_tx_ledger(&self, chain_id: u64, height: u64, tx_hash: &[u8]) -> Vec<TreasuryNote> {
        self.buckets
            .lock()
            .get(&Self::key(chain_id, height, tx_hash))
            .map(|bucket| bucket.notes.clone())
            .unwrap_or_default()
    }

    /// Clears the bucket for `(chain_id, height, tx_hash)`, used after
    /// settlement per spec.md §4.6.
    pub fn reset_tx_ledger(&self, chain_id: u64, height: u64, tx_hash: &[u8]) {
        self.buckets.lock().remove(&Self::key(chain_id, height, tx_hash));
    }
}

impl Default for TreasuryLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> SecurityLimits {
        SecurityLimits {
            max_debit_per_tx: 1000,
            max_credit_per_tx: 1000,
            max_treasury_reason_len: 16,
            ..cap_config::SecurityLimits::default()
        }
    }

    #[test]
    fn records_and_peeks_notes_in_order() {
        let ledger = TreasuryLedger::new();
        let l = limits();
        ledger
            .record(1, 10, b"tx", TreasuryOp::Debit, 100, "fee payment", &l)
            .unwrap();
        ledger
            .record(1, 10, b"tx", TreasuryOp::Credit, 50, "refund", &l)
            .unwrap();
        let notes = ledger.peek_tx_ledger(1, 10, b"tx");
        assert_eq!(notes.len(), 2);
        assert_eq!(notes[0].index, 0);
        assert_eq!(notes[1].index, 1);
        assert_eq!(notes[0].reason, "fee_payment"); // truncated to 16 + space->underscore
    }

    #[test]
    fn rejects_amount_exceeding_per_tx_cap() {
        let ledger = TreasuryLedger::new();
        let l = limits();
        ledger.record(1, 10, b"tx", TreasuryOp::Debit, 900, "a", &l).unwrap();
        let err = ledger
            .record(1, 10, b"tx", TreasuryOp::Debit, 200, "b", &l)
            .unwrap_err();
        assert_eq!(err.kind.code(), "LIMIT_EXCEEDED");
    }

    #[test]
    fn reset_clears_the_bucket() {
        let ledger = TreasuryLedger::new();
        let l = limits();
        ledger.record(1, 10, b"tx", TreasuryOp::Debit, 10, "a", &l).unwrap();
        ledger.reset_tx_ledger(1, 10, b"tx");
        assert!(ledger.peek_tx_ledger(1, 10, b"tx").is_empty());
    }

    #[test]
    fn debit_and_credit_sums_tracked_independently() {
        let ledger = TreasuryLedger::new();
        let l = limits();
        ledger.record(1, 10, b"tx", TreasuryOp::Debit, 1000, "a", &l).unwrap();
        ledger.record(1, 10, b"tx", TreasuryOp::Credit, 1000, "b", &l).unwrap();
    }
}
