//! Durable key/value settings.
//!
//! Small facts that must survive restarts but do not deserve a table of
//! their own: the ruleset version counter, the last reimbursement batch
//! hash, and the feature toggles mirrored from the companion app.

use sea_orm::entity::prelude::*;

use crate::bills::BillKind;

pub mod keys {
    pub const RULE_VERSION: &str = "rule_version";
    pub const HASH_REIMBURSEMENT: &str = "hash_reimbursement";
    pub const FEATURE_ASSET_MANAGEMENT: &str = "feature.asset_management";
    pub const FEATURE_MULTI_CURRENCY: &str = "feature.multi_currency";
    pub const FEATURE_REIMBURSEMENT: &str = "feature.reimbursement";
    pub const FEATURE_LENDING: &str = "feature.lending";
    pub const FEATURE_MULTI_BOOKS: &str = "feature.multi_books";
    pub const FEATURE_FEE: &str = "feature.fee";
}

/// Feature toggles applied at dispatch time.
///
/// All default off; the companion app flips them through `PUT /settings`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SyncFeatures {
    pub asset_management: bool,
    pub multi_currency: bool,
    pub reimbursement: bool,
    pub lending: bool,
    pub multi_books: bool,
    pub fee: bool,
}

impl SyncFeatures {
    /// Whether records of this kind may be dispatched at all.
    pub fn allows(&self, kind: BillKind) -> bool {
        match kind {
            BillKind::Expend | BillKind::Income => true,
            BillKind::Transfer => self.asset_management,
            kind if kind.is_debt() => self.lending,
            kind if kind.is_reimbursement() => self.reimbursement,
            _ => true,
        }
    }
}

/// Settings values are stored as text; booleans accept `true`/`1`.
pub fn parse_bool(value: Option<&str>) -> bool {
    matches!(value, Some("true") | Some("1"))
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "settings")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub key: String,
    pub value: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
