//! Outgoing wire format for the external ledger.
//!
//! The ledger accepts bills through a URI with a fixed query shape:
//! exactly nine parameters, in a fixed order, percent-encoded UTF-8.
//! Byte-exactness matters here; the encoding is pinned by tests.

use url::form_urlencoded;

use crate::bills::{BillKind, BillRecord};

/// Default submission endpoint of the ledger app.
pub const DEFAULT_BASE: &str = "qianji://publicapi/addbill";

/// Numeric type codes of the ledger's public API.
pub fn type_code(kind: BillKind) -> u8 {
    match kind {
        BillKind::Expend => 0,
        BillKind::Income => 1,
        BillKind::Transfer => 2,
        BillKind::ExpendReimbursement => 5,
        BillKind::ExpendLending => 15,
        BillKind::ExpendRepayment => 16,
        BillKind::IncomeLending => 17,
        BillKind::IncomeRepayment => 18,
        BillKind::IncomeReimbursement => 19,
    }
}

/// One bill flattened into the ledger's parameter set.
#[derive(Clone, Debug, PartialEq)]
pub struct WireBill {
    pub type_code: u8,
    /// Two-decimal string, e.g. `100.00`.
    pub money: String,
    /// Unix seconds.
    pub occurred_at: i64,
    pub account_from: String,
    pub account_to: String,
    pub category: String,
    pub remark: String,
    pub tag: String,
    pub group_id: i64,
}

impl WireBill {
    pub fn from_record(bill: &BillRecord) -> Self {
        Self {
            type_code: type_code(bill.kind),
            money: bill.money.to_string(),
            occurred_at: bill.occurred_at.timestamp(),
            account_from: bill.account_from.clone(),
            account_to: bill.account_to.clone(),
            category: bill.category.clone(),
            remark: bill.remark.clone(),
            tag: bill.tag.clone(),
            group_id: bill.group_id,
        }
    }

    /// The nine query parameters, in wire order.
    pub fn query(&self) -> String {
        form_urlencoded::Serializer::new(String::new())
            .append_pair("type", &self.type_code.to_string())
            .append_pair("money", &self.money)
            .append_pair("occurredAt", &self.occurred_at.to_string())
            .append_pair("accountFrom", &self.account_from)
            .append_pair("accountTo", &self.account_to)
            .append_pair("category", &self.category)
            .append_pair("remark", &self.remark)
            .append_pair("tag", &self.tag)
            .append_pair("groupId", &self.group_id.to_string())
            .finish()
    }

    pub fn encode(&self, base: &str) -> String {
        format!("{base}?{}", self.query())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};

    use super::*;
    use crate::{
        MoneyCents,
        bills::{BillDraft, BillState},
    };

    fn record() -> BillRecord {
        let draft = BillDraft {
            kind: BillKind::Expend,
            money: MoneyCents::new(10000),
            currency: "CNY".to_string(),
            occurred_at: DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap(),
            account_from: "card".to_string(),
            account_to: String::new(),
            category: "daily".to_string(),
            remark: "lunch".to_string(),
            tag: String::new(),
            source_app: "com.android.mms".to_string(),
            rule_name: "BankSMS".to_string(),
            auto_record: false,
        };
        draft.into_record(1, Utc::now())
    }

    #[test]
    fn encodes_the_nine_parameters_in_order() {
        let wire = WireBill::from_record(&record());
        assert_eq!(
            wire.encode(DEFAULT_BASE),
            "qianji://publicapi/addbill?type=0&money=100.00&occurredAt=1700000000\
             &accountFrom=card&accountTo=&category=daily&remark=lunch&tag=&groupId=-1"
        );
    }

    #[test]
    fn percent_encodes_utf8() {
        let mut bill = record();
        bill.category = "日常".to_string();
        let query = WireBill::from_record(&bill).query();
        assert!(query.contains("category=%E6%97%A5%E5%B8%B8"));
    }

    #[test]
    fn type_codes_match_the_public_api() {
        assert_eq!(type_code(BillKind::Expend), 0);
        assert_eq!(type_code(BillKind::Income), 1);
        assert_eq!(type_code(BillKind::Transfer), 2);
        assert_eq!(type_code(BillKind::ExpendReimbursement), 5);
        assert_eq!(type_code(BillKind::ExpendLending), 15);
        assert_eq!(type_code(BillKind::ExpendRepayment), 16);
        assert_eq!(type_code(BillKind::IncomeLending), 17);
        assert_eq!(type_code(BillKind::IncomeRepayment), 18);
        assert_eq!(type_code(BillKind::IncomeReimbursement), 19);
    }

    #[test]
    fn synced_state_does_not_leak_into_the_wire() {
        let mut bill = record();
        bill.state = BillState::Edited;
        let a = WireBill::from_record(&bill);
        bill.state = BillState::Synced;
        let b = WireBill::from_record(&bill);
        assert_eq!(a, b);
    }
}
