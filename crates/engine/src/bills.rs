//! Bill primitives.
//!
//! A `BillRecord` is one classified financial event moving through the
//! pipeline: created at ingestion, confirmed by a human or auto-recorded,
//! then pushed into the external ledger by the dispatcher.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};

use crate::{
    EngineError, MoneyCents,
    events::{EventKind, RawEvent},
};

/// `group_id` value marking a standalone or group-head record.
///
/// Any other value is the id of the head this record was merged into;
/// such member rows are never dispatched on their own.
pub const GROUP_NONE: i64 = -1;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BillKind {
    Expend,
    Income,
    Transfer,
    ExpendLending,
    ExpendRepayment,
    IncomeLending,
    IncomeRepayment,
    ExpendReimbursement,
    IncomeReimbursement,
}

impl BillKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Expend => "Expend",
            Self::Income => "Income",
            Self::Transfer => "Transfer",
            Self::ExpendLending => "ExpendLending",
            Self::ExpendRepayment => "ExpendRepayment",
            Self::IncomeLending => "IncomeLending",
            Self::IncomeRepayment => "IncomeRepayment",
            Self::ExpendReimbursement => "ExpendReimbursement",
            Self::IncomeReimbursement => "IncomeReimbursement",
        }
    }

    /// Lending and repayment kinds, which go through the asset-account
    /// submission path.
    pub fn is_debt(self) -> bool {
        matches!(
            self,
            Self::ExpendLending | Self::ExpendRepayment | Self::IncomeLending | Self::IncomeRepayment
        )
    }

    pub fn is_reimbursement(self) -> bool {
        matches!(self, Self::ExpendReimbursement | Self::IncomeReimbursement)
    }
}

impl TryFrom<&str> for BillKind {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "Expend" => Ok(Self::Expend),
            "Income" => Ok(Self::Income),
            "Transfer" => Ok(Self::Transfer),
            "ExpendLending" => Ok(Self::ExpendLending),
            "ExpendRepayment" => Ok(Self::ExpendRepayment),
            "IncomeLending" => Ok(Self::IncomeLending),
            "IncomeRepayment" => Ok(Self::IncomeRepayment),
            "ExpendReimbursement" => Ok(Self::ExpendReimbursement),
            "IncomeReimbursement" => Ok(Self::IncomeReimbursement),
            other => Err(EngineError::Parse(format!("invalid bill kind: {other}"))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BillState {
    /// Persisted, awaiting human confirmation or auto-record.
    Wait2Edit,
    /// Confirmed, eligible for dispatch.
    Edited,
    /// Accepted by the external ledger (or provisionally in flight, see the
    /// dispatch marker in extend data).
    Synced,
    /// Dispatch failed with a durable reason; waits for explicit retry.
    Failed,
}

impl BillState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Wait2Edit => "Wait2Edit",
            Self::Edited => "Edited",
            Self::Synced => "Synced",
            Self::Failed => "Failed",
        }
    }

    /// Externally drivable lifecycle edges.
    ///
    /// Forward only (`Wait2Edit -> Edited -> Synced`), plus the explicit
    /// retry re-entries out of `Failed`. The dispatcher's provisional
    /// mark/rollback moves are internal and do not go through here.
    pub fn can_transition(self, to: BillState) -> bool {
        matches!(
            (self, to),
            (Self::Wait2Edit, Self::Edited)
                | (Self::Edited, Self::Synced)
                | (Self::Failed, Self::Wait2Edit)
                | (Self::Failed, Self::Edited)
        )
    }
}

impl TryFrom<&str> for BillState {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "Wait2Edit" => Ok(Self::Wait2Edit),
            "Edited" => Ok(Self::Edited),
            "Synced" => Ok(Self::Synced),
            "Failed" => Ok(Self::Failed),
            other => Err(EngineError::Parse(format!("invalid bill state: {other}"))),
        }
    }
}

/// Classified but not yet persisted bill, produced by the classifier and
/// handed to the group merger.
#[derive(Clone, Debug, PartialEq)]
pub struct BillDraft {
    pub kind: BillKind,
    pub money: MoneyCents,
    pub currency: String,
    pub occurred_at: DateTime<Utc>,
    pub account_from: String,
    pub account_to: String,
    pub category: String,
    pub remark: String,
    pub tag: String,
    pub source_app: String,
    pub rule_name: String,
    /// Rule flag: skip the manual confirmation step.
    pub auto_record: bool,
}

impl BillDraft {
    /// Initial state for a fresh record from this draft.
    pub fn initial_state(&self) -> BillState {
        if self.auto_record {
            BillState::Edited
        } else {
            BillState::Wait2Edit
        }
    }

    pub fn into_record(self, rule_version: i64, created_at: DateTime<Utc>) -> BillRecord {
        let state = self.initial_state();
        BillRecord {
            id: 0,
            group_id: GROUP_NONE,
            kind: self.kind,
            money: self.money,
            currency: self.currency,
            occurred_at: self.occurred_at,
            account_from: self.account_from,
            account_to: self.account_to,
            category: self.category,
            remark: self.remark,
            tag: self.tag,
            source_app: self.source_app,
            rule_name: self.rule_name,
            matched: true,
            rule_version,
            state,
            extend_data: ExtendData::default().to_json(),
            created_at,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BillRecord {
    /// 0 until persisted.
    pub id: i64,
    pub group_id: i64,
    pub kind: BillKind,
    pub money: MoneyCents,
    pub currency: String,
    pub occurred_at: DateTime<Utc>,
    pub account_from: String,
    pub account_to: String,
    pub category: String,
    pub remark: String,
    pub tag: String,
    pub source_app: String,
    pub rule_name: String,
    pub matched: bool,
    pub rule_version: i64,
    pub state: BillState,
    /// Free-form JSON sidecar, see [`ExtendData`].
    pub extend_data: String,
    pub created_at: DateTime<Utc>,
}

impl BillRecord {
    pub fn is_head(&self) -> bool {
        self.group_id == GROUP_NONE
    }

    /// Record for an event no rule (and no classifier) could read.
    ///
    /// Kept visible in the pending-edit list with the raw payload folded
    /// into extend data so it can be re-tested once rules change.
    pub fn unmatched(event: &RawEvent, occurred_at: DateTime<Utc>, rule_version: i64) -> Self {
        let extend = ExtendData {
            raw: Some(RawSnapshot::from(event)),
            ..ExtendData::default()
        };
        Self {
            id: 0,
            group_id: GROUP_NONE,
            kind: BillKind::Expend,
            money: MoneyCents::ZERO,
            currency: String::new(),
            occurred_at,
            account_from: String::new(),
            account_to: String::new(),
            category: String::new(),
            remark: String::new(),
            tag: String::new(),
            source_app: event.source_app.clone(),
            rule_name: String::new(),
            matched: false,
            rule_version,
            state: BillState::Wait2Edit,
            extend_data: ExtendData::default().to_json(),
            created_at: occurred_at,
        }
        .with_extend(&extend)
    }

    pub fn extend(&self) -> ExtendData {
        ExtendData::parse(&self.extend_data)
    }

    pub fn with_extend(mut self, extend: &ExtendData) -> Self {
        self.extend_data = extend.to_json();
        self
    }
}

/// JSON sidecar carried in `BillRecord::extend_data`.
///
/// Anything the fixed columns do not cover lands here: group member ids on
/// a head, the raw-event snapshot of an unmatched record, and the
/// dispatcher's provisional marker / failure context.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtendData {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub group: Vec<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<RawSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dispatch: Option<DispatchMark>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fail: Option<FailInfo>,
}

impl ExtendData {
    /// Lenient parse: malformed sidecars read as empty rather than failing
    /// the record.
    pub fn parse(raw: &str) -> Self {
        serde_json::from_str(raw).unwrap_or_default()
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Verbatim copy of an unmatched raw event, enough to re-run
/// classification later.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawSnapshot {
    pub kind: EventKind,
    pub source_app: String,
    pub payload: String,
    pub captured_at: DateTime<Utc>,
}

impl From<&RawEvent> for RawSnapshot {
    fn from(event: &RawEvent) -> Self {
        Self {
            kind: event.kind,
            source_app: event.source_app.clone(),
            payload: event.payload.clone(),
            captured_at: event.captured_at,
        }
    }
}

impl From<&RawSnapshot> for RawEvent {
    fn from(snapshot: &RawSnapshot) -> Self {
        RawEvent::new(
            snapshot.kind,
            snapshot.source_app.clone(),
            snapshot.payload.clone(),
            snapshot.captured_at,
        )
    }
}

/// Provisional dispatch marker written before the external call.
///
/// `confirmed = false` means the record may or may not have reached the
/// ledger (crash mid-dispatch); `confirmed = true` with a matching
/// fingerprint makes a later dispatch a no-op.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DispatchMark {
    pub fingerprint: String,
    pub confirmed: bool,
    pub at: DateTime<Utc>,
}

/// Durable failure context for a `Failed` record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FailInfo {
    pub reason: String,
    pub message: String,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "bills")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub group_id: i64,
    pub kind: String,
    pub money_cents: i64,
    pub currency: String,
    pub occurred_at: DateTimeUtc,
    pub account_from: String,
    pub account_to: String,
    pub category: String,
    pub remark: String,
    pub tag: String,
    pub source_app: String,
    pub rule_name: String,
    pub matched: bool,
    pub rule_version: i64,
    pub state: String,
    pub extend_data: String,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<&BillRecord> for ActiveModel {
    fn from(bill: &BillRecord) -> Self {
        let id = if bill.id == 0 {
            ActiveValue::NotSet
        } else {
            ActiveValue::Set(bill.id)
        };
        Self {
            id,
            group_id: ActiveValue::Set(bill.group_id),
            kind: ActiveValue::Set(bill.kind.as_str().to_string()),
            money_cents: ActiveValue::Set(bill.money.cents()),
            currency: ActiveValue::Set(bill.currency.clone()),
            occurred_at: ActiveValue::Set(bill.occurred_at),
            account_from: ActiveValue::Set(bill.account_from.clone()),
            account_to: ActiveValue::Set(bill.account_to.clone()),
            category: ActiveValue::Set(bill.category.clone()),
            remark: ActiveValue::Set(bill.remark.clone()),
            tag: ActiveValue::Set(bill.tag.clone()),
            source_app: ActiveValue::Set(bill.source_app.clone()),
            rule_name: ActiveValue::Set(bill.rule_name.clone()),
            matched: ActiveValue::Set(bill.matched),
            rule_version: ActiveValue::Set(bill.rule_version),
            state: ActiveValue::Set(bill.state.as_str().to_string()),
            extend_data: ActiveValue::Set(bill.extend_data.clone()),
            created_at: ActiveValue::Set(bill.created_at),
        }
    }
}

impl TryFrom<Model> for BillRecord {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: model.id,
            group_id: model.group_id,
            kind: BillKind::try_from(model.kind.as_str())?,
            money: MoneyCents::new(model.money_cents),
            currency: model.currency,
            occurred_at: model.occurred_at,
            account_from: model.account_from,
            account_to: model.account_to,
            category: model.category,
            remark: model.remark,
            tag: model.tag,
            source_app: model.source_app,
            rule_name: model.rule_name,
            matched: model.matched,
            rule_version: model.rule_version,
            state: BillState::try_from(model.state.as_str())?,
            extend_data: model.extend_data,
            created_at: model.created_at,
        })
    }
}
