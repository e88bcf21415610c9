//! Serde types shared by the local API server and its clients.
//!
//! Every response travels in the [`ApiResponse`] envelope: `code` mirrors
//! the HTTP status (`200` is success), `msg` is human-readable, `data`
//! carries the payload or is absent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub code: u16,
    pub msg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            code: 200,
            msg: "ok".to_string(),
            data: Some(data),
        }
    }

    pub fn accepted(msg: impl Into<String>) -> Self {
        Self {
            code: 202,
            msg: msg.into(),
            data: None,
        }
    }

    pub fn error(code: u16, msg: impl Into<String>) -> Self {
        Self {
            code,
            msg: msg.into(),
            data: None,
        }
    }
}

pub mod analysis {
    use super::*;

    /// Query half of `POST /analysis` and `POST /events`; the raw payload
    /// rides in the request body.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct AnalysisQuery {
        /// Event kind: `sms`, `notice` or `app_data`.
        #[serde(rename = "type")]
        pub event_type: String,
        /// Package or sender identifier of the producing app.
        #[serde(default)]
        pub app: String,
        /// Consult the external classifier even when disabled in config.
        #[serde(default)]
        pub ai: bool,
    }
}

pub mod bill {
    use super::*;

    /// One bill record as the API presents it. Group member ids and the
    /// failure context are lifted out of the record's extend data.
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct BillView {
        pub id: i64,
        pub group_id: i64,
        pub kind: String,
        pub money_cents: i64,
        /// Two-decimal display string, e.g. `100.00`.
        pub money: String,
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
        pub state: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        pub members: Vec<i64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub fail: Option<FailView>,
        pub created_at: DateTime<Utc>,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct FailView {
        pub reason: String,
        pub message: String,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct BillListQuery {
        #[serde(default)]
        pub limit: Option<u64>,
        #[serde(default)]
        pub offset: Option<u64>,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct BillStateChange {
        pub state: String,
    }

    /// Human edit; absent fields are left untouched.
    #[derive(Debug, Clone, Default, Serialize, Deserialize)]
    pub struct BillUpdate {
        #[serde(default)]
        pub kind: Option<String>,
        #[serde(default)]
        pub money_cents: Option<i64>,
        #[serde(default)]
        pub currency: Option<String>,
        #[serde(default)]
        pub occurred_at: Option<DateTime<Utc>>,
        #[serde(default)]
        pub account_from: Option<String>,
        #[serde(default)]
        pub account_to: Option<String>,
        #[serde(default)]
        pub category: Option<String>,
        #[serde(default)]
        pub remark: Option<String>,
        #[serde(default)]
        pub tag: Option<String>,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Deleted {
        pub deleted: u64,
    }
}

pub mod rules {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct RulesReplaced {
        pub version: i64,
        pub rules: usize,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct RetestResult {
        pub retested: usize,
        pub matched: usize,
    }
}

pub mod sync {
    use super::*;

    #[derive(Debug, Clone, Default, Serialize, Deserialize)]
    pub struct SyncRequest {
        /// Push reimbursement batches even when their hash is unchanged.
        #[serde(default)]
        pub force: bool,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct SyncQueued {
        /// False when a run is already queued or in progress.
        pub queued: bool,
    }
}

pub mod settings {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct SettingView {
        pub key: String,
        pub value: Option<String>,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct SettingPut {
        pub key: String,
        pub value: String,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_serializes_code_msg_data() {
        let ok = ApiResponse::ok(7);
        let json = serde_json::to_string(&ok).unwrap();
        assert_eq!(json, r#"{"code":200,"msg":"ok","data":7}"#);

        let err: ApiResponse<i32> = ApiResponse::error(404, "no bill");
        let json = serde_json::to_string(&err).unwrap();
        assert_eq!(json, r#"{"code":404,"msg":"no bill"}"#);
    }

    #[test]
    fn analysis_query_reads_type_and_defaults() {
        let query: analysis::AnalysisQuery =
            serde_json::from_str(r#"{"type":"sms"}"#).unwrap();
        assert_eq!(query.event_type, "sms");
        assert_eq!(query.app, "");
        assert!(!query.ai);
    }
}
