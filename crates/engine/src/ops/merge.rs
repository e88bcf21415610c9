use chrono::{Duration, Utc};
use sea_orm::{ActiveValue, QueryFilter, QueryOrder, TransactionTrait, prelude::*};
use tracing::debug;

use crate::{
    ResultEngine,
    bills::{self, BillDraft, BillRecord, BillState, GROUP_NONE},
};

use super::{Engine, with_tx};

/// How a draft landed in the store.
#[derive(Clone, Debug, PartialEq)]
pub enum MergeOutcome {
    Inserted(BillRecord),
    /// Folded into an existing group; `head` is the synchronizable record.
    Merged { head: BillRecord, member_id: i64 },
}

impl Engine {
    /// Inserts a draft, folding near-simultaneous duplicates into a group.
    ///
    /// Candidates are ungrouped records with the same amount whose
    /// `occurred_at` lies within the window, bounds inclusive on both
    /// ends. The earliest-created candidate (lowest id on a tie) wins as
    /// head; the new observation becomes a member row and empty head
    /// fields are back-filled from the draft. The head's state is never
    /// touched here.
    pub async fn merge_draft(&self, draft: BillDraft) -> ResultEngine<MergeOutcome> {
        let _write = self.write_lock.lock().await;

        let window = Duration::seconds(self.config.group_window_secs);
        let candidates = bills::Entity::find()
            .filter(bills::Column::GroupId.eq(GROUP_NONE))
            .filter(bills::Column::MoneyCents.eq(draft.money.cents()))
            .filter(
                bills::Column::OccurredAt
                    .between(draft.occurred_at - window, draft.occurred_at + window),
            )
            .order_by_asc(bills::Column::CreatedAt)
            .order_by_asc(bills::Column::Id)
            .all(&self.database)
            .await?;

        let version = self.ruleset().await.version();
        let now = Utc::now();

        let Some(head_model) = candidates.into_iter().next() else {
            let record = draft.into_record(version, now);
            let model = bills::ActiveModel::from(&record).insert(&self.database).await?;
            return Ok(MergeOutcome::Inserted(BillRecord::try_from(model)?));
        };
        let head = BillRecord::try_from(head_model)?;

        with_tx!(self, |tx| {
            let mut member = draft.clone().into_record(version, now);
            member.group_id = head.id;
            member.state = BillState::Wait2Edit;
            let member_model = bills::ActiveModel::from(&member).insert(&tx).await?;

            let mut extend = head.extend();
            extend.group.push(member_model.id);

            let mut active = bills::ActiveModel {
                id: ActiveValue::Set(head.id),
                extend_data: ActiveValue::Set(extend.to_json()),
                ..Default::default()
            };
            if head.account_from.is_empty() && !draft.account_from.is_empty() {
                active.account_from = ActiveValue::Set(draft.account_from.clone());
            }
            if head.account_to.is_empty() && !draft.account_to.is_empty() {
                active.account_to = ActiveValue::Set(draft.account_to.clone());
            }
            if head.category.is_empty() && !draft.category.is_empty() {
                active.category = ActiveValue::Set(draft.category.clone());
            }
            if head.remark.is_empty() && !draft.remark.is_empty() {
                active.remark = ActiveValue::Set(draft.remark.clone());
            }
            let head_model = active.update(&tx).await?;

            debug!(head = head.id, member = member_model.id, "duplicate folded into group");
            Ok(MergeOutcome::Merged {
                head: BillRecord::try_from(head_model)?,
                member_id: member_model.id,
            })
        })
    }
}
