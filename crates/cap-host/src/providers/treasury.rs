//! `treasury.debit`/`treasury.credit(ctx, amount, reason) -> note`: thin
//! syscall-facing wrappers around [`crate::treasury::TreasuryLedger`].

use crate::registry::Provider;
use crate::treasury::{TreasuryLedger, TreasuryOp};
use async_trait::async_trait;
use cap_adapters::SyscallContext;
use cap_config::SecurityLimits;
use cap_enc::Value;
use cap_errors::CapError;
use cap_metrics::CapMetrics;
use std::sync::Arc;

pub struct TreasuryNoteProvider {
    op: TreasuryOp,
    ledger: Arc<TreasuryLedger>,
    limits: Arc<SecurityLimits>,
    metrics: Arc<CapMetrics>,
}

impl TreasuryNoteProvider {
    pub fn debit(ledger: Arc<TreasuryLedger>, limits: Arc<SecurityLimits>, metrics: Arc<CapMetrics>) -> Self {
        Self {
            op: TreasuryOp::Debit,
            ledger,
            limits,
            metrics,
        }
    }

    pub fn credit(ledger: Arc<TreasuryLedger>, limits: Arc<SecurityLimits>, metrics: Arc<CapMetrics>) -> Self {
        Self {
            op: TreasuryOp::Credit,
            ledger,
            limits,
            metrics,
        }
    }
}

#[async_trait]
impl Provider for TreasuryNoteProvider {
    async fn call(&self, ctx: &SyscallContext, kwargs: &Value) -> Result<Value, CapError> {
        let op_name = match self.op {
            TreasuryOp::Debit => "treasury.debit",
            TreasuryOp::Credit => "treasury.credit",
        };
        let amount = kwargs
            .get("amount")
            .and_then(Value::as_int)
            .ok_or_else(|| CapError::invalid_input(format!("{op_name}: missing amount")))?;
        if amount <= 0 {
            return Err(CapError::invalid_input(format!("{op_name}: amount must be positive")));
        }
        let reason = kwargs
            .get("reason")
            .and_then(Value::as_text)
            .ok_or_else(|| CapError::invalid_input(format!("{op_name}: missing reason")))?;

        let note = self.ledger.record(
            ctx.chain_id,
            ctx.height,
            &ctx.tx_hash,
            self.op,
            amount as u64,
            reason,
            &self.limits,
        )?;

        self.metrics.record_treasury_note(match self.op {
            TreasuryOp::Debit => "debit",
            TreasuryOp::Credit => "credit",
        });

        Ok(Value::map(vec![
            (Value::text("op"), Value::text(op_name)),
            (Value::text("amount"), Value::int(note.amount)),
            (Value::text("reason"), Value::text(note.reason)),
            (Value::text("index"), Value::int(note.index)),
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

    fn kwargs(amount: i64, reason: &str) -> Value {
        Value::map(vec![
            (Value::text("amount"), Value::int(amount)),
            (Value::text("reason"), Value::text(reason)),
        ])
    }

    #[tokio::test]
    async fn debit_and_credit_record_independent_notes() {
        let ledger = Arc::new(TreasuryLedger::new());
        let limits = Arc::new(SecurityLimits::default());
        let debit = TreasuryNoteProvider::debit(ledger.clone(), limits.clone(), metrics());
        let credit = TreasuryNoteProvider::credit(ledger.clone(), limits, metrics());

        let debit_result = debit.call(&ctx(), &kwargs(100, "fee payment")).await.unwrap();
        let credit_result = credit.call(&ctx(), &kwargs(50, "refund")).await.unwrap();

        assert_eq!(debit_result.get("index").unwrap().as_int(), Some(0));
        assert_eq!(credit_result.get("index").unwrap().as_int(), Some(1));
        assert_eq!(debit_result.get("reason").unwrap().as_text(), Some("fee_payment"));
    }

    #[tokio::test]
    async fn rejects_non_positive_amount() {
        let ledger = Arc::new(TreasuryLedger::new());
        let debit = TreasuryNoteProvider::debit(ledger, Arc::new(SecurityLimits::default()), metrics());
        assert!(debit.call(&ctx(), &kwargs(0, "x")).await.is_err());
    }

    #[tokio::test]
    async fn enforces_per_tx_cap() {
        let ledger = Arc::new(TreasuryLedger::new());
        let limits = Arc::new(SecurityLimits {
            max_debit_per_tx: 100,
            ..SecurityLimits::default()
        });
        let debit = TreasuryNoteProvider::debit(ledger, limits, metrics());
        assert!(debit.call(&ctx(), &kwargs(200, "too_much")).await.is_err());
    }
}
