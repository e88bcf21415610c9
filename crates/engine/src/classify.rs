//! Event classification.
//!
//! Local rules run first; on a miss the optional external classifier is
//! consulted under a wall-clock timeout. Nothing in here touches the
//! database, and nothing in here raises for a mere miss: every failure
//! mode downgrades to [`Outcome::Unmatched`].

use async_trait::async_trait;
use tracing::debug;

use crate::{
    EngineConfig, ResultEngine,
    bills::BillDraft,
    events::{Payload, RawEvent},
    rules::RuleSet,
};

/// External model-backed classifier, consulted on local rule misses.
///
/// `Ok(None)` means "looked, found no bill". Implementations live outside
/// the engine; tests stub this.
#[async_trait]
pub trait AiClassifier: Send + Sync {
    async fn classify(&self, event: &RawEvent) -> ResultEngine<Option<BillDraft>>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ClassifyOptions {
    /// Consult the external classifier even when not enabled in config.
    pub force_ai: bool,
}

#[derive(Debug, PartialEq)]
pub enum Outcome {
    Matched(BillDraft),
    Unmatched { reason: String },
}

fn unmatched(reason: impl Into<String>) -> Outcome {
    Outcome::Unmatched {
        reason: reason.into(),
    }
}

pub async fn classify(
    event: &RawEvent,
    payload: &Payload,
    rules: &RuleSet,
    ai: Option<&dyn AiClassifier>,
    config: &EngineConfig,
    options: ClassifyOptions,
) -> Outcome {
    if let Some(rule) = rules.match_rule(event, payload) {
        return match rule.extract(event, payload) {
            Some(draft) => Outcome::Matched(draft),
            None => unmatched(format!("rule {}: money extraction failed", rule.name())),
        };
    }

    if !(config.ai_enabled || options.force_ai) {
        return unmatched("no matching rule");
    }
    let Some(ai) = ai else {
        return unmatched("no matching rule, classifier not configured");
    };

    match tokio::time::timeout(config.ai_timeout, ai.classify(event)).await {
        Err(_) => {
            debug!(source_app = %event.source_app, "classifier timed out");
            unmatched("classifier timed out")
        }
        Ok(Err(err)) => {
            debug!(source_app = %event.source_app, "classifier failed: {err}");
            unmatched(format!("classifier failed: {err}"))
        }
        Ok(Ok(None)) => unmatched("classifier found no bill"),
        Ok(Ok(Some(draft))) => {
            if draft.money.is_positive() {
                Outcome::Matched(draft)
            } else {
                debug!(source_app = %event.source_app, "classifier draft has non-positive money");
                unmatched("classifier returned an invalid draft")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::Utc;

    use super::*;
    use crate::{MoneyCents, bills::BillKind, events::EventKind};

    struct FixedClassifier {
        draft: Option<BillDraft>,
        delay: Duration,
    }

    #[async_trait]
    impl AiClassifier for FixedClassifier {
        async fn classify(&self, event: &RawEvent) -> ResultEngine<Option<BillDraft>> {
            tokio::time::sleep(self.delay).await;
            let _ = event;
            Ok(self.draft.clone())
        }
    }

    fn draft(cents: i64) -> BillDraft {
        BillDraft {
            kind: BillKind::Expend,
            money: MoneyCents::new(cents),
            currency: String::new(),
            occurred_at: Utc::now(),
            account_from: String::new(),
            account_to: String::new(),
            category: String::new(),
            remark: String::new(),
            tag: String::new(),
            source_app: "app".to_string(),
            rule_name: "AI".to_string(),
            auto_record: false,
        }
    }

    fn event() -> (RawEvent, Payload) {
        let event = RawEvent::new(
            EventKind::Sms,
            "com.android.mms",
            r#"{"sender":"10086","body":"nothing billable"}"#,
            Utc::now(),
        );
        let payload = event.parse_payload().unwrap();
        (event, payload)
    }

    fn ai_config() -> EngineConfig {
        EngineConfig {
            ai_enabled: true,
            ai_timeout: Duration::from_millis(50),
            ..EngineConfig::default()
        }
    }

    #[tokio::test]
    async fn miss_without_ai_is_unmatched() {
        let (event, payload) = event();
        let outcome = classify(
            &event,
            &payload,
            &RuleSet::empty(),
            None,
            &EngineConfig::default(),
            ClassifyOptions::default(),
        )
        .await;
        assert_eq!(
            outcome,
            Outcome::Unmatched {
                reason: "no matching rule".to_string()
            }
        );
    }

    #[tokio::test]
    async fn ai_escalation_can_match() {
        let ai = FixedClassifier {
            draft: Some(draft(1234)),
            delay: Duration::ZERO,
        };
        let (event, payload) = event();
        let outcome = classify(
            &event,
            &payload,
            &RuleSet::empty(),
            Some(&ai),
            &ai_config(),
            ClassifyOptions::default(),
        )
        .await;
        assert!(matches!(outcome, Outcome::Matched(d) if d.money.cents() == 1234));
    }

    #[tokio::test]
    async fn ai_timeout_downgrades_to_unmatched() {
        let ai = FixedClassifier {
            draft: Some(draft(1234)),
            delay: Duration::from_secs(5),
        };
        let (event, payload) = event();
        let outcome = classify(
            &event,
            &payload,
            &RuleSet::empty(),
            Some(&ai),
            &ai_config(),
            ClassifyOptions::default(),
        )
        .await;
        assert_eq!(
            outcome,
            Outcome::Unmatched {
                reason: "classifier timed out".to_string()
            }
        );
    }

    #[tokio::test]
    async fn invalid_ai_draft_downgrades() {
        let ai = FixedClassifier {
            draft: Some(draft(0)),
            delay: Duration::ZERO,
        };
        let (event, payload) = event();
        let outcome = classify(
            &event,
            &payload,
            &RuleSet::empty(),
            Some(&ai),
            &ai_config(),
            ClassifyOptions::default(),
        )
        .await;
        assert_eq!(
            outcome,
            Outcome::Unmatched {
                reason: "classifier returned an invalid draft".to_string()
            }
        );
    }

    #[tokio::test]
    async fn force_ai_overrides_disabled_config() {
        let ai = FixedClassifier {
            draft: Some(draft(500)),
            delay: Duration::ZERO,
        };
        let config = EngineConfig {
            ai_enabled: false,
            ..ai_config()
        };
        let (event, payload) = event();
        let outcome = classify(
            &event,
            &payload,
            &RuleSet::empty(),
            Some(&ai),
            &config,
            ClassifyOptions { force_ai: true },
        )
        .await;
        assert!(matches!(outcome, Outcome::Matched(_)));
    }
}
