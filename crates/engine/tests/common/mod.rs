// Shared fixtures; each test binary uses its own subset.
#![allow(dead_code)]

use chrono::{DateTime, Utc};
use migration::{Migrator, MigratorTrait};

use engine::{
    BillDraft, BillKind, Capture, Engine, EngineConfig, EventKind, ExtractorSpec, FieldMatch,
    MatchOp, MoneyCents, RuleSpec,
};

pub async fn engine() -> Engine {
    engine_with(EngineConfig::default()).await
}

pub async fn engine_with(config: EngineConfig) -> Engine {
    let db = sea_orm::Database::connect("sqlite::memory:")
        .await
        .expect("connect in-memory sqlite");
    Migrator::up(&db, None).await.expect("run migrations");
    Engine::builder()
        .database(db)
        .config(config)
        .build()
        .await
        .expect("build engine")
}

pub fn at(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).expect("valid timestamp")
}

pub fn bank_sms_rule() -> RuleSpec {
    RuleSpec {
        name: "BankSMS".to_string(),
        priority: 10,
        app_scope: String::new(),
        event_scope: EventKind::Sms,
        enabled: true,
        auto_record: false,
        matcher: vec![
            FieldMatch {
                field: "sender".to_string(),
                op: MatchOp::Equals,
                value: "95588".to_string(),
            },
            FieldMatch {
                field: "body".to_string(),
                op: MatchOp::Contains,
                value: "消费".to_string(),
            },
        ],
        extractor: ExtractorSpec {
            kind: BillKind::Expend,
            money: Capture {
                field: "body".to_string(),
                pattern: r"消费([0-9,]+\.?[0-9]*)元".to_string(),
            },
            account_from: None,
            account_to: None,
            category: None,
            remark: None,
            tag: None,
            currency: None,
        },
    }
}

pub fn draft(kind: BillKind, cents: i64, occurred_at: DateTime<Utc>) -> BillDraft {
    BillDraft {
        kind,
        money: MoneyCents::new(cents),
        currency: "CNY".to_string(),
        occurred_at,
        account_from: String::new(),
        account_to: String::new(),
        category: String::new(),
        remark: String::new(),
        tag: String::new(),
        source_app: "test".to_string(),
        rule_name: "manual".to_string(),
        auto_record: false,
    }
}
