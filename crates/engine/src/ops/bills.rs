use chrono::{DateTime, Duration, Utc};
use sea_orm::{ActiveValue, QueryFilter, QueryOrder, QuerySelect, TransactionTrait, prelude::*};
use tracing::{debug, info};

use crate::{
    EngineError, MoneyCents, ResultEngine,
    bills::{self, BillKind, BillRecord, BillState, DispatchMark, GROUP_NONE},
    dispatch::FailReason,
};

use super::{Engine, with_tx};

/// Records older than this are swept regardless of state.
const RETENTION_DAYS: i64 = 365;

/// Human edit of record fields; `None` leaves a field untouched.
#[derive(Clone, Debug, Default)]
pub struct BillPatch {
    pub kind: Option<BillKind>,
    pub money: Option<MoneyCents>,
    pub currency: Option<String>,
    pub occurred_at: Option<DateTime<Utc>>,
    pub account_from: Option<String>,
    pub account_to: Option<String>,
    pub category: Option<String>,
    pub remark: Option<String>,
    pub tag: Option<String>,
}

impl Engine {
    pub async fn bill(&self, id: i64) -> ResultEngine<BillRecord> {
        let model = bills::Entity::find_by_id(id)
            .one(&self.database)
            .await?
            .ok_or_else(|| EngineError::KeyNotFound(format!("bill {id}")))?;
        BillRecord::try_from(model)
    }

    /// Paged listing of heads, newest first.
    pub async fn bills_page(&self, limit: u64, offset: u64) -> ResultEngine<Vec<BillRecord>> {
        let models = bills::Entity::find()
            .filter(bills::Column::GroupId.eq(GROUP_NONE))
            .order_by_desc(bills::Column::OccurredAt)
            .order_by_desc(bills::Column::Id)
            .limit(limit)
            .offset(offset)
            .all(&self.database)
            .await?;
        models.into_iter().map(BillRecord::try_from).collect()
    }

    /// Heads awaiting human confirmation, newest first.
    pub async fn pending_edit(&self) -> ResultEngine<Vec<BillRecord>> {
        let models = bills::Entity::find()
            .filter(bills::Column::State.eq(BillState::Wait2Edit.as_str()))
            .filter(bills::Column::GroupId.eq(GROUP_NONE))
            .order_by_desc(bills::Column::OccurredAt)
            .order_by_desc(bills::Column::Id)
            .all(&self.database)
            .await?;
        models.into_iter().map(BillRecord::try_from).collect()
    }

    /// Heads eligible for dispatch, FIFO by occurrence.
    pub async fn pending_sync(&self) -> ResultEngine<Vec<BillRecord>> {
        let models = bills::Entity::find()
            .filter(bills::Column::State.eq(BillState::Edited.as_str()))
            .filter(bills::Column::GroupId.eq(GROUP_NONE))
            .order_by_asc(bills::Column::OccurredAt)
            .order_by_asc(bills::Column::Id)
            .all(&self.database)
            .await?;
        models.into_iter().map(BillRecord::try_from).collect()
    }

    /// Member rows of a group head. Errors when the head does not exist.
    pub async fn group_members(&self, head_id: i64) -> ResultEngine<Vec<BillRecord>> {
        self.bill(head_id).await?;
        let models = bills::Entity::find()
            .filter(bills::Column::GroupId.eq(head_id))
            .order_by_asc(bills::Column::Id)
            .all(&self.database)
            .await?;
        models.into_iter().map(BillRecord::try_from).collect()
    }

    pub async fn update_bill(&self, id: i64, patch: BillPatch) -> ResultEngine<BillRecord> {
        let _write = self.write_lock.lock().await;
        self.bill(id).await?;

        let mut active = bills::ActiveModel {
            id: ActiveValue::Set(id),
            ..Default::default()
        };
        if let Some(kind) = patch.kind {
            active.kind = ActiveValue::Set(kind.as_str().to_string());
        }
        if let Some(money) = patch.money {
            active.money_cents = ActiveValue::Set(money.cents());
        }
        if let Some(currency) = patch.currency {
            active.currency = ActiveValue::Set(currency);
        }
        if let Some(occurred_at) = patch.occurred_at {
            active.occurred_at = ActiveValue::Set(occurred_at);
        }
        if let Some(account_from) = patch.account_from {
            active.account_from = ActiveValue::Set(account_from);
        }
        if let Some(account_to) = patch.account_to {
            active.account_to = ActiveValue::Set(account_to);
        }
        if let Some(category) = patch.category {
            active.category = ActiveValue::Set(category);
        }
        if let Some(remark) = patch.remark {
            active.remark = ActiveValue::Set(remark);
        }
        if let Some(tag) = patch.tag {
            active.tag = ActiveValue::Set(tag);
        }

        let model = active.update(&self.database).await?;
        BillRecord::try_from(model)
    }

    /// Validated lifecycle transition.
    ///
    /// Manually marking a record `Synced` writes a confirmed dispatch
    /// marker so later batches do not push it; leaving `Failed` clears the
    /// stored failure context.
    pub async fn update_state(&self, id: i64, to: BillState) -> ResultEngine<BillRecord> {
        let _write = self.write_lock.lock().await;
        let record = self.bill(id).await?;
        if !record.state.can_transition(to) {
            return Err(EngineError::InvalidState(format!(
                "bill {id}: {} -> {}",
                record.state.as_str(),
                to.as_str()
            )));
        }

        let mut extend = record.extend();
        extend.fail = None;
        if to == BillState::Synced {
            extend.dispatch = Some(DispatchMark {
                fingerprint: crate::fingerprint::record_fingerprint(
                    &record,
                    self.config.bucket_secs(),
                ),
                confirmed: true,
                at: Utc::now(),
            });
        }

        let model = bills::ActiveModel {
            id: ActiveValue::Set(id),
            state: ActiveValue::Set(to.as_str().to_string()),
            extend_data: ActiveValue::Set(extend.to_json()),
            ..Default::default()
        }
        .update(&self.database)
        .await?;
        BillRecord::try_from(model)
    }

    /// Deletes a record; deleting a head cascades to its members.
    pub async fn delete_bill(&self, id: i64) -> ResultEngine<u64> {
        let _write = self.write_lock.lock().await;
        let record = self.bill(id).await?;
        with_tx!(self, |tx| {
            let members = bills::Entity::delete_many()
                .filter(bills::Column::GroupId.eq(record.id))
                .exec(&tx)
                .await?;
            let head = bills::Entity::delete_by_id(record.id).exec(&tx).await?;
            Ok(members.rows_affected + head.rows_affected)
        })
    }

    /// Deletes everything older than the retention horizon.
    pub async fn sweep_retention(&self) -> ResultEngine<u64> {
        let _write = self.write_lock.lock().await;
        let cutoff = Utc::now() - Duration::days(RETENTION_DAYS);
        let result = bills::Entity::delete_many()
            .filter(bills::Column::OccurredAt.lt(cutoff))
            .exec(&self.database)
            .await?;
        if result.rows_affected > 0 {
            debug!(deleted = result.rows_affected, "retention sweep removed expired bills");
        }
        Ok(result.rows_affected)
    }

    /// Rolls provisionally-marked records back to `Edited`.
    ///
    /// A crash between the provisional mark and its confirmation leaves a
    /// `Synced` head carrying an unconfirmed marker, invisible to the
    /// batch feed. Run at startup so the next batch re-pushes such
    /// records instead of losing them.
    pub(crate) async fn recover_inflight(&self) -> ResultEngine<u64> {
        let _write = self.write_lock.lock().await;
        let models = bills::Entity::find()
            .filter(bills::Column::State.eq(BillState::Synced.as_str()))
            .filter(bills::Column::GroupId.eq(GROUP_NONE))
            .all(&self.database)
            .await?;

        let mut recovered = 0;
        for model in models {
            let record = BillRecord::try_from(model)?;
            let mut extend = record.extend();
            if !extend.dispatch.as_ref().is_some_and(|mark| !mark.confirmed) {
                continue;
            }
            extend.dispatch = None;
            self.write_dispatch_state(record.id, BillState::Edited, extend.to_json())
                .await?;
            recovered += 1;
        }
        if recovered > 0 {
            info!(recovered, "rolled back interrupted dispatches");
        }
        Ok(recovered)
    }

    /// Provisional dispatch mark: `Synced` + unconfirmed marker, written
    /// before the external call.
    pub(crate) async fn mark_dispatch(&self, id: i64, fingerprint: &str) -> ResultEngine<()> {
        let _write = self.write_lock.lock().await;
        let record = self.bill(id).await?;
        let mut extend = record.extend();
        extend.dispatch = Some(DispatchMark {
            fingerprint: fingerprint.to_string(),
            confirmed: false,
            at: Utc::now(),
        });
        extend.fail = None;
        self.write_dispatch_state(id, BillState::Synced, extend.to_json())
            .await
    }

    pub(crate) async fn confirm_dispatch(&self, id: i64) -> ResultEngine<()> {
        let _write = self.write_lock.lock().await;
        let record = self.bill(id).await?;
        let mut extend = record.extend();
        if let Some(mark) = extend.dispatch.as_mut() {
            mark.confirmed = true;
        }
        self.write_dispatch_state(id, BillState::Synced, extend.to_json())
            .await
    }

    /// Transient failure: drop the marker, back to `Edited` for the next
    /// batch.
    pub(crate) async fn rollback_dispatch(&self, id: i64) -> ResultEngine<()> {
        let _write = self.write_lock.lock().await;
        let record = self.bill(id).await?;
        let mut extend = record.extend();
        extend.dispatch = None;
        self.write_dispatch_state(id, BillState::Edited, extend.to_json())
            .await
    }

    /// Definitive failure: drop the marker, record the structured reason.
    pub(crate) async fn fail_dispatch(&self, id: i64, reason: &FailReason) -> ResultEngine<()> {
        let _write = self.write_lock.lock().await;
        let record = self.bill(id).await?;
        let mut extend = record.extend();
        extend.dispatch = None;
        extend.fail = Some(reason.info());
        self.write_dispatch_state(id, BillState::Failed, extend.to_json())
            .await
    }

    async fn write_dispatch_state(
        &self,
        id: i64,
        state: BillState,
        extend_data: String,
    ) -> ResultEngine<()> {
        bills::ActiveModel {
            id: ActiveValue::Set(id),
            state: ActiveValue::Set(state.as_str().to_string()),
            extend_data: ActiveValue::Set(extend_data),
            ..Default::default()
        }
        .update(&self.database)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use migration::{Migrator, MigratorTrait};

    use super::*;
    use crate::{MergeOutcome, bills::BillDraft};

    async fn database() -> sea_orm::DatabaseConnection {
        let db = sea_orm::Database::connect("sqlite::memory:").await.unwrap();
        Migrator::up(&db, None).await.unwrap();
        db
    }

    async fn engine_on(db: sea_orm::DatabaseConnection) -> Engine {
        Engine::builder().database(db).build().await.unwrap()
    }

    fn edited_draft(cents: i64) -> BillDraft {
        BillDraft {
            kind: BillKind::Expend,
            money: MoneyCents::new(cents),
            currency: "CNY".to_string(),
            occurred_at: Utc::now(),
            account_from: String::new(),
            account_to: String::new(),
            category: String::new(),
            remark: String::new(),
            tag: String::new(),
            source_app: "test".to_string(),
            rule_name: "manual".to_string(),
            auto_record: true,
        }
    }

    async fn insert(engine: &Engine, cents: i64) -> BillRecord {
        match engine.merge_draft(edited_draft(cents)).await.unwrap() {
            MergeOutcome::Inserted(record) => record,
            other => panic!("expected insert, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn interrupted_dispatch_is_recovered_on_startup() {
        let db = database().await;
        let engine = engine_on(db.clone()).await;

        let record = insert(&engine, 4200).await;
        engine.mark_dispatch(record.id, "print").await.unwrap();
        // Crash window: provisionally Synced, invisible to the batch feed.
        assert!(engine.pending_sync().await.unwrap().is_empty());
        drop(engine);

        // Restart over the same store rolls the record back.
        let engine = engine_on(db).await;
        let rolled = engine.bill(record.id).await.unwrap();
        assert_eq!(rolled.state, BillState::Edited);
        assert!(rolled.extend().dispatch.is_none());
        assert_eq!(engine.pending_sync().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn confirmed_dispatches_stay_synced() {
        let engine = engine_on(database().await).await;

        let record = insert(&engine, 900).await;
        engine.mark_dispatch(record.id, "print").await.unwrap();
        engine.confirm_dispatch(record.id).await.unwrap();

        assert_eq!(engine.recover_inflight().await.unwrap(), 0);
        let bill = engine.bill(record.id).await.unwrap();
        assert_eq!(bill.state, BillState::Synced);
        assert!(bill.extend().dispatch.unwrap().confirmed);
    }
}
