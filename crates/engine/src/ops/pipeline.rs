use sea_orm::ActiveModelTrait;
use tracing::debug;

use crate::{
    ResultEngine,
    bills::{self, BillRecord},
    classify::{self, ClassifyOptions, Outcome},
    events::RawEvent,
};

use super::{Engine, MergeOutcome};

/// Result of running one event through classify + merge.
#[derive(Clone, Debug, PartialEq)]
pub struct Ingested {
    /// The synchronizable record: freshly inserted, or the group head the
    /// event merged into.
    pub record: BillRecord,
    pub matched: bool,
    /// True when the event was folded into an existing group.
    pub merged: bool,
    /// Why classification missed, when it did.
    pub reason: Option<String>,
}

impl Engine {
    /// Worker entry point: classify with defaults and persist.
    pub async fn ingest(&self, event: RawEvent) -> ResultEngine<Ingested> {
        self.classify_event(&event, ClassifyOptions::default()).await
    }

    /// Classifies one event and persists the result.
    ///
    /// A payload that cannot be parsed is an error (the event is dropped
    /// by the caller); a classification miss is not: the record is stored
    /// unmatched with a snapshot for later retest.
    pub async fn classify_event(
        &self,
        event: &RawEvent,
        options: ClassifyOptions,
    ) -> ResultEngine<Ingested> {
        let payload = event.parse_payload()?;
        let rules = self.ruleset().await;
        let ai = self.classifier.as_deref();

        match classify::classify(event, &payload, &rules, ai, &self.config, options).await {
            Outcome::Matched(mut draft) => {
                if draft.currency.is_empty() {
                    draft.currency = self.config.default_currency.clone();
                }
                match self.merge_draft(draft).await? {
                    MergeOutcome::Inserted(record) => Ok(Ingested {
                        record,
                        matched: true,
                        merged: false,
                        reason: None,
                    }),
                    MergeOutcome::Merged { head, member_id } => {
                        debug!(head = head.id, member = member_id, "event merged as duplicate");
                        Ok(Ingested {
                            record: head,
                            matched: true,
                            merged: true,
                            reason: None,
                        })
                    }
                }
            }
            Outcome::Unmatched { reason } => {
                debug!(source_app = %event.source_app, "unmatched event: {reason}");
                let occurred_at = event.occurred_at(&payload);
                let record = BillRecord::unmatched(event, occurred_at, rules.version());
                let _write = self.write_lock.lock().await;
                let model = bills::ActiveModel::from(&record)
                    .insert(&self.database)
                    .await?;
                Ok(Ingested {
                    record: BillRecord::try_from(model)?,
                    matched: false,
                    merged: false,
                    reason: Some(reason),
                })
            }
        }
    }
}
