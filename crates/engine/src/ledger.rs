//! Port to the external ledger app.
//!
//! The engine never talks to the ledger directly; it goes through this
//! trait. The reqwest-backed implementation lives in the `ledger_client`
//! crate, tests use in-memory fakes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{MoneyCents, bills::BillKind, wire::WireBill};

#[derive(Debug, Error)]
pub enum LedgerError {
    /// The ledger app is not running; transient, retried on the next batch.
    #[error("ledger unreachable")]
    Unreachable,
    #[error("ledger timed out")]
    Timeout,
    /// The ledger looked at the bill and said no.
    #[error("ledger rejected the bill: {0}")]
    Rejected(String),
    #[error("ledger protocol error: {0}")]
    Protocol(String),
}

/// An asset account as the ledger knows it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LedgerAccount {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub currency: String,
}

/// Lending/repayment submission: needs the resolved account, not just its
/// name.
#[derive(Clone, Debug, PartialEq)]
pub struct DebtSubmission {
    pub kind: BillKind,
    pub account: LedgerAccount,
    pub money: MoneyCents,
    pub occurred_at: DateTime<Utc>,
    /// Only set when the multi-currency feature is on.
    pub currency: Option<String>,
    pub tag: String,
    pub remark: String,
}

/// Income-reimbursement submission: money coming back against earlier
/// reimbursable bills.
#[derive(Clone, Debug, PartialEq)]
pub struct ReimbursementSubmission {
    pub account: LedgerAccount,
    pub money: MoneyCents,
    pub occurred_at: DateTime<Utc>,
    pub currency: Option<String>,
    pub tag: String,
    /// Ids of the group members this reimbursement settles.
    pub member_ids: Vec<i64>,
}

#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Submit a plain bill through the addbill wire format.
    async fn submit(&self, bill: &WireBill) -> Result<(), LedgerError>;

    /// Look up an asset account by display name; `Ok(None)` means the
    /// ledger has no such account.
    async fn resolve_account(&self, name: &str) -> Result<Option<LedgerAccount>, LedgerError>;

    async fn submit_debt(&self, submission: &DebtSubmission) -> Result<(), LedgerError>;

    async fn submit_reimbursement(
        &self,
        submission: &ReimbursementSubmission,
    ) -> Result<(), LedgerError>;
}
