//! End-to-end ingestion: classify, persist, group, retest, sweep.

mod common;

use chrono::{Duration, Utc};
use engine::{
    BillKind, BillState, EngineError, EventKind, GROUP_NONE, MergeOutcome, RawEvent,
};

use common::{at, bank_sms_rule, draft, engine};

fn sms_event(body: &str) -> RawEvent {
    let payload = serde_json::json!({ "sender": "95588", "body": body }).to_string();
    RawEvent::new(EventKind::Sms, "com.android.mms", payload, Utc::now())
}

#[tokio::test]
async fn bank_sms_event_lands_as_wait2edit() {
    let engine = engine().await;
    let version = engine.replace_rules(vec![bank_sms_rule()]).await.unwrap();

    let ingested = engine
        .ingest(sms_event("您尾号1234消费100.00元"))
        .await
        .unwrap();
    assert!(ingested.matched);
    assert!(!ingested.merged);
    assert_eq!(ingested.reason, None);

    let bill = engine.bill(ingested.record.id).await.unwrap();
    assert_eq!(bill.kind, BillKind::Expend);
    assert_eq!(bill.money.cents(), 10000);
    assert_eq!(bill.state, BillState::Wait2Edit);
    assert_eq!(bill.rule_name, "BankSMS");
    assert_eq!(bill.rule_version, version);
    // No currency binding on the rule, so the configured default applies.
    assert_eq!(bill.currency, "CNY");

    let pending = engine.pending_edit().await.unwrap();
    assert!(pending.iter().any(|b| b.id == bill.id));
}

#[tokio::test]
async fn duplicates_seconds_apart_fold_into_one_group() {
    let engine = engine().await;
    let base = 1_700_000_000;

    let head = match engine
        .merge_draft(draft(BillKind::Expend, 2500, at(base)))
        .await
        .unwrap()
    {
        MergeOutcome::Inserted(record) => record,
        other => panic!("expected insert, got {other:?}"),
    };

    // Same amount three seconds later: the SMS and the push notification
    // for one purchase.
    let (merged_head, member_id) = match engine
        .merge_draft(draft(BillKind::Expend, 2500, at(base + 3)))
        .await
        .unwrap()
    {
        MergeOutcome::Merged { head, member_id } => (head, member_id),
        other => panic!("expected merge, got {other:?}"),
    };
    assert_eq!(merged_head.id, head.id);
    assert_eq!(merged_head.extend().group, vec![member_id]);

    let members = engine.group_members(head.id).await.unwrap();
    assert_eq!(members.len(), 1);
    assert_eq!(members[0].id, member_id);
    assert_eq!(members[0].group_id, head.id);

    // Only the head is synchronizable or listed.
    let page = engine.bills_page(10, 0).await.unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].id, head.id);
    assert_eq!(page[0].group_id, GROUP_NONE);
}

#[tokio::test]
async fn merge_window_bounds_are_inclusive() {
    let engine = engine().await;
    let base = 1_700_000_000;
    let window = engine.config().group_window_secs;

    engine
        .merge_draft(draft(BillKind::Expend, 990, at(base)))
        .await
        .unwrap();

    // Exactly at the edge still merges.
    let on_edge = engine
        .merge_draft(draft(BillKind::Expend, 990, at(base + window)))
        .await
        .unwrap();
    assert!(matches!(on_edge, MergeOutcome::Merged { .. }));

    // One second past the edge does not.
    let past_edge = engine
        .merge_draft(draft(BillKind::Expend, 990, at(base + window + 1)))
        .await
        .unwrap();
    assert!(matches!(past_edge, MergeOutcome::Inserted(_)));
}

#[tokio::test]
async fn different_amounts_never_merge() {
    let engine = engine().await;
    let base = 1_700_000_000;

    engine
        .merge_draft(draft(BillKind::Expend, 2500, at(base)))
        .await
        .unwrap();
    let outcome = engine
        .merge_draft(draft(BillKind::Expend, 2501, at(base + 1)))
        .await
        .unwrap();
    assert!(matches!(outcome, MergeOutcome::Inserted(_)));
}

#[tokio::test]
async fn unmatched_event_is_stored_then_retested() {
    let engine = engine().await;

    let ingested = engine
        .ingest(sms_event("您尾号1234消费100.00元"))
        .await
        .unwrap();
    assert!(!ingested.matched);
    assert_eq!(ingested.reason.as_deref(), Some("no matching rule"));

    let stored = engine.bill(ingested.record.id).await.unwrap();
    assert!(!stored.matched);
    assert_eq!(stored.state, BillState::Wait2Edit);
    assert!(stored.extend().raw.is_some());

    // A rule arrives later that reads this message.
    let version = engine.replace_rules(vec![bank_sms_rule()]).await.unwrap();
    let report = engine.retest_unmatched().await.unwrap();
    assert_eq!(report.retested, 1);
    assert_eq!(report.matched, 1);

    let refilled = engine.bill(stored.id).await.unwrap();
    assert!(refilled.matched);
    assert_eq!(refilled.money.cents(), 10000);
    assert_eq!(refilled.rule_name, "BankSMS");
    assert_eq!(refilled.rule_version, version);
}

#[tokio::test]
async fn retest_stamps_records_that_still_miss() {
    let engine = engine().await;

    let ingested = engine.ingest(sms_event("账户余额不足")).await.unwrap();
    assert!(!ingested.matched);

    engine.replace_rules(vec![bank_sms_rule()]).await.unwrap();
    let first = engine.retest_unmatched().await.unwrap();
    assert_eq!(first.retested, 1);
    assert_eq!(first.matched, 0);

    // Version stamped on the miss: the same ruleset does not re-run it.
    let second = engine.retest_unmatched().await.unwrap();
    assert_eq!(second.retested, 0);
}

#[tokio::test]
async fn deleting_a_group_head_removes_members() {
    let engine = engine().await;
    let base = 1_700_000_000;

    let head = match engine
        .merge_draft(draft(BillKind::Expend, 2500, at(base)))
        .await
        .unwrap()
    {
        MergeOutcome::Inserted(record) => record,
        other => panic!("expected insert, got {other:?}"),
    };
    let member_id = match engine
        .merge_draft(draft(BillKind::Expend, 2500, at(base + 3)))
        .await
        .unwrap()
    {
        MergeOutcome::Merged { member_id, .. } => member_id,
        other => panic!("expected merge, got {other:?}"),
    };

    let deleted = engine.delete_bill(head.id).await.unwrap();
    assert_eq!(deleted, 2);
    assert!(matches!(
        engine.bill(head.id).await,
        Err(EngineError::KeyNotFound(_))
    ));
    assert!(matches!(
        engine.bill(member_id).await,
        Err(EngineError::KeyNotFound(_))
    ));
}

#[tokio::test]
async fn lifecycle_transitions_are_validated() {
    let engine = engine().await;
    let record = match engine
        .merge_draft(draft(BillKind::Expend, 1200, at(1_700_000_000)))
        .await
        .unwrap()
    {
        MergeOutcome::Inserted(record) => record,
        other => panic!("expected insert, got {other:?}"),
    };

    // Skipping the confirmation step is forbidden.
    assert!(matches!(
        engine.update_state(record.id, BillState::Synced).await,
        Err(EngineError::InvalidState(_))
    ));

    let edited = engine
        .update_state(record.id, BillState::Edited)
        .await
        .unwrap();
    assert_eq!(edited.state, BillState::Edited);
    assert!(engine
        .pending_sync()
        .await
        .unwrap()
        .iter()
        .any(|b| b.id == record.id));

    // Manual sync marks the record confirmed so no batch re-pushes it.
    let synced = engine
        .update_state(record.id, BillState::Synced)
        .await
        .unwrap();
    assert_eq!(synced.state, BillState::Synced);
    let mark = synced.extend().dispatch.unwrap();
    assert!(mark.confirmed);
}

#[tokio::test]
async fn retention_sweep_removes_expired_records() {
    let engine = engine().await;
    let old = Utc::now() - Duration::days(400);

    let expired = match engine
        .merge_draft(draft(BillKind::Expend, 700, old))
        .await
        .unwrap()
    {
        MergeOutcome::Inserted(record) => record,
        other => panic!("expected insert, got {other:?}"),
    };
    let fresh = match engine
        .merge_draft(draft(BillKind::Expend, 800, Utc::now()))
        .await
        .unwrap()
    {
        MergeOutcome::Inserted(record) => record,
        other => panic!("expected insert, got {other:?}"),
    };

    let swept = engine.sweep_retention().await.unwrap();
    assert_eq!(swept, 1);
    assert!(engine.bill(expired.id).await.is_err());
    assert!(engine.bill(fresh.id).await.is_ok());
}
