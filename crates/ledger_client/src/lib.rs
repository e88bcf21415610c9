//! HTTP implementation of the engine's `LedgerClient` port.
//!
//! The external ledger app runs on the same machine and exposes its
//! public API over a local HTTP bridge; bills travel as the same
//! URI-encoded parameter sets the app accepts directly. The app offers no
//! idempotency of its own, so every call here is made exactly once per
//! dispatch attempt and error classification matters: connection refused
//! means "app not running" (transient), anything the app answers with a
//! non-200 envelope is a rejection.

use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;
use url::form_urlencoded;

use engine::{
    DebtSubmission, LedgerAccount, LedgerClient, LedgerError, ReimbursementSubmission, WireBill,
    type_code,
};

/// Response envelope of the ledger bridge, mirroring `{code, msg, data}`.
#[derive(Debug, Deserialize)]
struct LedgerReply<T> {
    code: u16,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    data: Option<T>,
}

#[derive(Debug, Clone)]
pub struct HttpLedgerClient {
    base_url: Url,
    http: reqwest::Client,
}

impl HttpLedgerClient {
    /// `base_url` is the bridge root, e.g. `http://127.0.0.1:52046/publicapi/`.
    pub fn new(base_url: &str, timeout: std::time::Duration) -> Result<Self, LedgerError> {
        let base_url = Url::parse(base_url)
            .map_err(|err| LedgerError::Protocol(format!("invalid base_url: {err}")))?;
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| LedgerError::Protocol(format!("client build failed: {err}")))?;
        Ok(Self { base_url, http })
    }

    fn endpoint(&self, path: &str, query: &str) -> Result<Url, LedgerError> {
        let mut url = self
            .base_url
            .join(path)
            .map_err(|err| LedgerError::Protocol(format!("invalid endpoint {path}: {err}")))?;
        url.set_query(Some(query));
        Ok(url)
    }

    /// One GET, decoded into the bridge envelope; only `code = 200` counts
    /// as accepted.
    async fn call(&self, url: Url) -> Result<(), LedgerError> {
        let response = self.http.get(url).send().await.map_err(map_transport)?;
        let reply: LedgerReply<serde_json::Value> =
            response.json().await.map_err(map_transport)?;
        if reply.code == 200 {
            Ok(())
        } else {
            Err(LedgerError::Rejected(reply.msg))
        }
    }
}

/// Transport errors: connection refused means the ledger app is simply not
/// running right now.
fn map_transport(err: reqwest::Error) -> LedgerError {
    if err.is_connect() {
        tracing::debug!("ledger app unreachable: {err}");
        return LedgerError::Unreachable;
    }
    if err.is_timeout() {
        return LedgerError::Timeout;
    }
    LedgerError::Protocol(err.to_string())
}

fn debt_query(submission: &DebtSubmission) -> String {
    let mut query = form_urlencoded::Serializer::new(String::new());
    query
        .append_pair("type", &type_code(submission.kind).to_string())
        .append_pair("money", &submission.money.to_string())
        .append_pair("occurredAt", &submission.occurred_at.timestamp().to_string())
        .append_pair("accountId", &submission.account.id)
        .append_pair("accountName", &submission.account.name);
    if let Some(currency) = &submission.currency {
        query.append_pair("currency", currency);
    }
    query
        .append_pair("tag", &submission.tag)
        .append_pair("remark", &submission.remark)
        .finish()
}

fn reimbursement_query(submission: &ReimbursementSubmission) -> String {
    let members = submission
        .member_ids
        .iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(",");

    let mut query = form_urlencoded::Serializer::new(String::new());
    query
        .append_pair("money", &submission.money.to_string())
        .append_pair("occurredAt", &submission.occurred_at.timestamp().to_string())
        .append_pair("accountId", &submission.account.id)
        .append_pair("accountName", &submission.account.name);
    if let Some(currency) = &submission.currency {
        query.append_pair("currency", currency);
    }
    query
        .append_pair("tag", &submission.tag)
        .append_pair("members", &members)
        .finish()
}

#[async_trait]
impl LedgerClient for HttpLedgerClient {
    async fn submit(&self, bill: &WireBill) -> Result<(), LedgerError> {
        let url = self.endpoint("addbill", &bill.query())?;
        self.call(url).await
    }

    async fn resolve_account(&self, name: &str) -> Result<Option<LedgerAccount>, LedgerError> {
        let query = form_urlencoded::Serializer::new(String::new())
            .append_pair("name", name)
            .finish();
        let url = self.endpoint("assets", &query)?;

        let response = self.http.get(url).send().await.map_err(map_transport)?;
        let reply: LedgerReply<Vec<LedgerAccount>> =
            response.json().await.map_err(map_transport)?;
        if reply.code != 200 {
            return Err(LedgerError::Rejected(reply.msg));
        }

        let account = reply
            .data
            .unwrap_or_default()
            .into_iter()
            .find(|account| account.name == name);
        Ok(account)
    }

    async fn submit_debt(&self, submission: &DebtSubmission) -> Result<(), LedgerError> {
        let url = self.endpoint("debt", &debt_query(submission))?;
        self.call(url).await
    }

    async fn submit_reimbursement(
        &self,
        submission: &ReimbursementSubmission,
    ) -> Result<(), LedgerError> {
        let url = self.endpoint("reimbursement", &reimbursement_query(submission))?;
        self.call(url).await
    }
}
