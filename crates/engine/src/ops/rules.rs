use std::sync::Arc;

use chrono::Utc;
use sea_orm::{ActiveValue, QueryFilter, QueryOrder, TransactionTrait, prelude::*};
use tracing::{info, warn};

use crate::{
    EngineError, ResultEngine,
    bills::{self, BillRecord, BillState, GROUP_NONE},
    events::RawEvent,
    rules::{self, RuleSet, RuleSpec},
    settings::{self, keys},
};

use super::{Engine, settings::put_setting, with_tx};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RetestReport {
    pub retested: usize,
    pub matched: usize,
}

impl Engine {
    /// Stored rule specs in insertion order. Rows that no longer parse are
    /// skipped, not fatal.
    pub async fn rules_list(&self) -> ResultEngine<Vec<RuleSpec>> {
        let models = rules::Entity::find()
            .order_by_asc(rules::Column::Id)
            .all(&self.database)
            .await?;
        let mut specs = Vec::with_capacity(models.len());
        for model in models {
            match RuleSpec::try_from(model) {
                Ok(spec) => specs.push(spec),
                Err(err) => warn!("skipping stored rule: {err}"),
            }
        }
        Ok(specs)
    }

    /// Replaces the rule set atomically and bumps the version counter.
    ///
    /// Returns the new version. The compiled cache is swapped before
    /// returning, so the next event classifies against the new set.
    pub async fn replace_rules(&self, specs: Vec<RuleSpec>) -> ResultEngine<i64> {
        let _write = self.write_lock.lock().await;
        let now = Utc::now();
        let version = with_tx!(self, |tx| {
            rules::Entity::delete_many().exec(&tx).await?;
            for spec in &specs {
                spec.to_active(now)?.insert(&tx).await?;
            }
            let version = match settings::Entity::find_by_id(keys::RULE_VERSION).one(&tx).await? {
                Some(model) => model.value.parse::<i64>().unwrap_or(0) + 1,
                None => 1,
            };
            put_setting(&tx, keys::RULE_VERSION, &version.to_string()).await?;
            Ok::<_, EngineError>(version)
        })?;

        let compiled = RuleSet::compile(version, specs);
        info!(version, rules = compiled.len(), "ruleset replaced");
        *self.ruleset.write().await = Arc::new(compiled);
        Ok(version)
    }

    /// Loads and compiles the stored ruleset into the cache.
    pub(crate) async fn reload_rules(&self) -> ResultEngine<()> {
        let version = match settings::Entity::find_by_id(keys::RULE_VERSION)
            .one(&self.database)
            .await?
        {
            Some(model) => model.value.parse::<i64>().unwrap_or(0),
            None => 0,
        };
        let models = rules::Entity::find()
            .order_by_asc(rules::Column::Id)
            .all(&self.database)
            .await?;
        let mut specs = Vec::with_capacity(models.len());
        for model in models {
            match RuleSpec::try_from(model) {
                Ok(spec) => specs.push(spec),
                Err(err) => warn!("skipping stored rule: {err}"),
            }
        }
        *self.ruleset.write().await = Arc::new(RuleSet::compile(version, specs));
        Ok(())
    }

    /// Re-classifies unmatched records left behind by an older ruleset.
    ///
    /// Each candidate is stamped with the current version whether or not
    /// it matches, so the next retest skips it; a match fills the record
    /// in place and promotes its state per the rule's auto-record flag.
    pub async fn retest_unmatched(&self) -> ResultEngine<RetestReport> {
        let current = self.ruleset().await;
        let version = current.version();
        let models = bills::Entity::find()
            .filter(bills::Column::Matched.eq(false))
            .filter(bills::Column::State.eq(BillState::Wait2Edit.as_str()))
            .filter(bills::Column::GroupId.eq(GROUP_NONE))
            .filter(bills::Column::RuleVersion.ne(version))
            .order_by_asc(bills::Column::Id)
            .all(&self.database)
            .await?;

        let mut report = RetestReport::default();
        let _write = self.write_lock.lock().await;
        for model in models {
            let record = BillRecord::try_from(model)?;
            report.retested += 1;

            let refill = record.extend().raw.as_ref().and_then(|snapshot| {
                let event = RawEvent::from(snapshot);
                let payload = event.parse_payload().ok()?;
                let rule = current.match_rule(&event, &payload)?;
                rule.extract(&event, &payload)
            });

            match refill {
                Some(mut draft) => {
                    if draft.currency.is_empty() {
                        draft.currency = self.config.default_currency.clone();
                    }
                    bills::ActiveModel {
                        id: ActiveValue::Set(record.id),
                        kind: ActiveValue::Set(draft.kind.as_str().to_string()),
                        money_cents: ActiveValue::Set(draft.money.cents()),
                        currency: ActiveValue::Set(draft.currency.clone()),
                        occurred_at: ActiveValue::Set(draft.occurred_at),
                        account_from: ActiveValue::Set(draft.account_from.clone()),
                        account_to: ActiveValue::Set(draft.account_to.clone()),
                        category: ActiveValue::Set(draft.category.clone()),
                        remark: ActiveValue::Set(draft.remark.clone()),
                        tag: ActiveValue::Set(draft.tag.clone()),
                        rule_name: ActiveValue::Set(draft.rule_name.clone()),
                        matched: ActiveValue::Set(true),
                        rule_version: ActiveValue::Set(version),
                        state: ActiveValue::Set(draft.initial_state().as_str().to_string()),
                        ..Default::default()
                    }
                    .update(&self.database)
                    .await?;
                    report.matched += 1;
                }
                None => {
                    bills::ActiveModel {
                        id: ActiveValue::Set(record.id),
                        rule_version: ActiveValue::Set(version),
                        ..Default::default()
                    }
                    .update(&self.database)
                    .await?;
                }
            }
        }

        info!(
            retested = report.retested,
            matched = report.matched,
            "unmatched records retested"
        );
        Ok(report)
    }
}
