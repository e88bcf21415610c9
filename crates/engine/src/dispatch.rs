//! Pushing confirmed bills into the external ledger.
//!
//! One record at a time, optimistically marked before the external call so
//! a crash mid-dispatch cannot silently lose a record. A single record's
//! failure never aborts the batch; transient unreachability rolls the
//! record back and the next batch retries.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use tracing::{debug, error, info};

use crate::{
    Engine, ResultEngine,
    bills::{BillKind, BillRecord, BillState, FailInfo},
    fingerprint::{batch_fingerprint, record_fingerprint},
    ledger::{DebtSubmission, LedgerClient, LedgerError, ReimbursementSubmission},
    settings::{SyncFeatures, keys},
    wire::WireBill,
};

/// Why a dispatch attempt came back `Failed`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FailReason {
    /// The named asset account does not exist in the ledger; the user must
    /// create it before retrying.
    MissingAccount(String),
    Timeout,
    Rejected(String),
    Unknown(String),
}

impl FailReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingAccount(_) => "missing_account",
            Self::Timeout => "timeout",
            Self::Rejected(_) => "rejected",
            Self::Unknown(_) => "unknown",
        }
    }

    /// User-facing message; for missing accounts it names the account.
    pub fn message(&self) -> String {
        match self {
            Self::MissingAccount(name) => {
                format!("asset account \"{name}\" not found in the ledger")
            }
            Self::Timeout => "ledger timed out".to_string(),
            Self::Rejected(msg) => format!("rejected: {msg}"),
            Self::Unknown(msg) => msg.clone(),
        }
    }

    pub fn info(&self) -> FailInfo {
        FailInfo {
            reason: self.as_str().to_string(),
            message: self.message(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// The record's kind is gated off by a feature toggle; left `Edited`.
    FeatureDisabled,
    /// Already confirmed with an unchanged fingerprint; dispatching twice
    /// never produces two external entries.
    AlreadySynced,
    /// Ledger app not running; rolled back to `Edited`, next batch retries.
    LedgerUnreachable,
    /// Reimbursement sub-batch hash unchanged since the last push.
    UnchangedBatch,
    /// Member row or a state outside `Edited`/provisional `Synced`.
    NotEligible,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
    Synced,
    Failed(FailReason),
    Skipped(SkipReason),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub synced: usize,
    pub failed: usize,
    pub skipped: usize,
    pub cancelled: bool,
}

/// Result of asking for a batch run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SyncRun {
    Completed(SyncReport),
    /// Another batch holds the guard; nothing was pushed.
    AlreadyRunning,
}

enum SubmitError {
    Ledger(LedgerError),
    MissingAccount(String),
}

impl From<LedgerError> for SubmitError {
    fn from(err: LedgerError) -> Self {
        Self::Ledger(err)
    }
}

pub struct Dispatcher {
    ledger: Arc<dyn LedgerClient>,
    batch_guard: tokio::sync::Mutex<()>,
    /// Fixed pause between records of a batch.
    sync_delay: Duration,
}

impl Dispatcher {
    pub fn new(ledger: Arc<dyn LedgerClient>) -> Self {
        Self {
            ledger,
            batch_guard: tokio::sync::Mutex::new(()),
            sync_delay: Duration::from_millis(100),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.sync_delay = delay;
        self
    }

    /// Dispatches one record.
    ///
    /// Store errors propagate; every ledger-side failure is folded into
    /// the returned outcome and the record's durable state.
    pub async fn dispatch(
        &self,
        engine: &Engine,
        bill: &BillRecord,
        features: &SyncFeatures,
    ) -> ResultEngine<DispatchOutcome> {
        if !bill.is_head() {
            return Ok(DispatchOutcome::Skipped(SkipReason::NotEligible));
        }

        let print = record_fingerprint(bill, engine.config().bucket_secs());
        match bill.state {
            BillState::Edited => {}
            BillState::Synced => {
                let confirmed_unchanged = bill
                    .extend()
                    .dispatch
                    .is_some_and(|mark| mark.confirmed && mark.fingerprint == print);
                if confirmed_unchanged {
                    return Ok(DispatchOutcome::Skipped(SkipReason::AlreadySynced));
                }
                // Unconfirmed marker: a crash interrupted the last attempt,
                // push again.
            }
            BillState::Wait2Edit | BillState::Failed => {
                return Ok(DispatchOutcome::Skipped(SkipReason::NotEligible));
            }
        }

        if !features.allows(bill.kind) {
            debug!(id = bill.id, kind = bill.kind.as_str(), "kind gated off, skipping");
            return Ok(DispatchOutcome::Skipped(SkipReason::FeatureDisabled));
        }

        engine.mark_dispatch(bill.id, &print).await?;

        match self.submit(bill, features).await {
            Ok(()) => {
                engine.confirm_dispatch(bill.id).await?;
                info!(id = bill.id, kind = bill.kind.as_str(), "bill synced");
                Ok(DispatchOutcome::Synced)
            }
            Err(SubmitError::Ledger(LedgerError::Unreachable)) => {
                engine.rollback_dispatch(bill.id).await?;
                debug!(id = bill.id, "ledger unreachable, will retry next batch");
                Ok(DispatchOutcome::Skipped(SkipReason::LedgerUnreachable))
            }
            Err(SubmitError::MissingAccount(name)) => {
                let reason = FailReason::MissingAccount(name);
                engine.fail_dispatch(bill.id, &reason).await?;
                Ok(DispatchOutcome::Failed(reason))
            }
            Err(SubmitError::Ledger(LedgerError::Timeout)) => {
                let reason = FailReason::Timeout;
                engine.fail_dispatch(bill.id, &reason).await?;
                Ok(DispatchOutcome::Failed(reason))
            }
            Err(SubmitError::Ledger(LedgerError::Rejected(msg))) => {
                let reason = FailReason::Rejected(msg);
                engine.fail_dispatch(bill.id, &reason).await?;
                Ok(DispatchOutcome::Failed(reason))
            }
            Err(SubmitError::Ledger(LedgerError::Protocol(msg))) => {
                let reason = FailReason::Unknown(msg);
                engine.fail_dispatch(bill.id, &reason).await?;
                Ok(DispatchOutcome::Failed(reason))
            }
        }
    }

    /// The external call(s) for one record, kind-dependent.
    async fn submit(&self, bill: &BillRecord, features: &SyncFeatures) -> Result<(), SubmitError> {
        if bill.kind.is_debt() {
            let account = self.resolve(debt_account_name(bill)).await?;
            let submission = DebtSubmission {
                kind: bill.kind,
                account,
                money: bill.money,
                occurred_at: bill.occurred_at,
                currency: currency_meta(bill, features),
                tag: bill.tag.clone(),
                remark: bill.remark.clone(),
            };
            self.ledger.submit_debt(&submission).await?;
            return Ok(());
        }

        if bill.kind == BillKind::IncomeReimbursement {
            let account = self.resolve(income_account_name(bill)).await?;
            let submission = ReimbursementSubmission {
                account,
                money: bill.money,
                occurred_at: bill.occurred_at,
                currency: currency_meta(bill, features),
                tag: bill.tag.clone(),
                member_ids: bill.extend().group,
            };
            self.ledger.submit_reimbursement(&submission).await?;
            return Ok(());
        }

        self.ledger.submit(&WireBill::from_record(bill)).await?;
        Ok(())
    }

    async fn resolve(&self, name: &str) -> Result<crate::ledger::LedgerAccount, SubmitError> {
        match self.ledger.resolve_account(name).await? {
            Some(account) => Ok(account),
            None => Err(SubmitError::MissingAccount(name.to_string())),
        }
    }

    /// Runs one sync batch: eligible records in FIFO order, one at a time,
    /// with the configured inter-record delay.
    ///
    /// Only one batch runs at a time; a concurrent caller observes
    /// [`SyncRun::AlreadyRunning`]. Cancellation is honored at record
    /// boundaries.
    pub async fn sync_batch(
        &self,
        engine: &Engine,
        force: bool,
        cancel: &AtomicBool,
    ) -> ResultEngine<SyncRun> {
        let Ok(_guard) = self.batch_guard.try_lock() else {
            return Ok(SyncRun::AlreadyRunning);
        };

        let features = engine.sync_features().await?;
        let bills = engine.pending_sync().await?;
        let bucket = engine.config().bucket_secs();

        let reimb_prints: Vec<String> = bills
            .iter()
            .filter(|bill| bill.kind.is_reimbursement())
            .map(|bill| record_fingerprint(bill, bucket))
            .collect();
        let reimb_hash = if reimb_prints.is_empty() {
            None
        } else {
            Some(batch_fingerprint(reimb_prints))
        };
        let stored_hash = engine.setting(keys::HASH_REIMBURSEMENT).await?;
        let skip_reimb = !force && reimb_hash.is_some() && reimb_hash == stored_hash;

        let mut report = SyncReport::default();
        let mut reimb_clean = reimb_hash.is_some();
        let mut first = true;

        for bill in &bills {
            if cancel.load(Ordering::Relaxed) {
                report.cancelled = true;
                break;
            }
            if skip_reimb && bill.kind.is_reimbursement() {
                report.skipped += 1;
                continue;
            }
            if !first {
                tokio::time::sleep(self.sync_delay).await;
            }
            first = false;

            match self.dispatch(engine, bill, &features).await {
                Ok(DispatchOutcome::Synced) => report.synced += 1,
                Ok(DispatchOutcome::Failed(_)) => {
                    report.failed += 1;
                    if bill.kind.is_reimbursement() {
                        reimb_clean = false;
                    }
                }
                Ok(DispatchOutcome::Skipped(_)) => {
                    report.skipped += 1;
                    if bill.kind.is_reimbursement() {
                        reimb_clean = false;
                    }
                }
                Err(err) => {
                    error!(id = bill.id, "dispatch failed: {err}");
                    report.failed += 1;
                    if bill.kind.is_reimbursement() {
                        reimb_clean = false;
                    }
                }
            }
        }

        if !report.cancelled
            && !skip_reimb
            && reimb_clean
            && let Some(hash) = reimb_hash
        {
            engine.set_setting(keys::HASH_REIMBURSEMENT, &hash).await?;
        }

        info!(
            synced = report.synced,
            failed = report.failed,
            skipped = report.skipped,
            cancelled = report.cancelled,
            "sync batch finished"
        );
        Ok(SyncRun::Completed(report))
    }
}

/// Which account name a debt submission resolves: the asset side of the
/// movement, falling back to the other side when it is blank.
fn debt_account_name(bill: &BillRecord) -> &str {
    let primary = match bill.kind {
        BillKind::ExpendLending | BillKind::ExpendRepayment => &bill.account_from,
        _ => &bill.account_to,
    };
    if primary.is_empty() {
        match bill.kind {
            BillKind::ExpendLending | BillKind::ExpendRepayment => &bill.account_to,
            _ => &bill.account_from,
        }
    } else {
        primary
    }
}

fn income_account_name(bill: &BillRecord) -> &str {
    if bill.account_to.is_empty() {
        &bill.account_from
    } else {
        &bill.account_to
    }
}

fn currency_meta(bill: &BillRecord, features: &SyncFeatures) -> Option<String> {
    if features.multi_currency && !bill.currency.is_empty() {
        Some(bill.currency.clone())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_account_message_names_the_account() {
        let reason = FailReason::MissingAccount("招商银行".to_string());
        assert!(reason.message().contains("招商银行"));
        assert_eq!(reason.as_str(), "missing_account");
    }
}
