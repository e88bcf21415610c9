//! Classification rules.
//!
//! A rule pairs a matcher (field conditions on the parsed payload) with an
//! extractor (how to read money and bill fields out of the payload). Rules
//! are stored as JSON columns and compiled into regex form once per
//! ruleset load; the compiled set is immutable and shared.

use chrono::{DateTime, Utc};
use regex::Regex;
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{
    EngineError, MoneyCents, ResultEngine,
    bills::{BillDraft, BillKind},
    events::{EventKind, Payload, RawEvent},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchOp {
    Equals,
    Contains,
    Prefix,
    Regex,
}

/// One field condition; all conditions of a matcher must hold.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldMatch {
    pub field: String,
    pub op: MatchOp,
    pub value: String,
}

/// Regex capture: the pattern's first capture group read from a payload
/// field.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Capture {
    pub field: String,
    pub pattern: String,
}

/// How an extractor fills one bill field: captured from the payload or a
/// constant.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Binding {
    Capture(Capture),
    Value(String),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExtractorSpec {
    pub kind: BillKind,
    pub money: Capture,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_from: Option<Binding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_to: Option<Binding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<Binding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remark: Option<Binding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<Binding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<Binding>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RuleSpec {
    pub name: String,
    #[serde(default)]
    pub priority: i32,
    /// Exact source-app match; empty accepts any app.
    #[serde(default)]
    pub app_scope: String,
    pub event_scope: EventKind,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub auto_record: bool,
    pub matcher: Vec<FieldMatch>,
    pub extractor: ExtractorSpec,
}

fn default_enabled() -> bool {
    true
}

impl RuleSpec {
    pub fn to_active(&self, created_at: DateTime<Utc>) -> ResultEngine<ActiveModel> {
        let matcher = serde_json::to_string(&self.matcher)
            .map_err(|err| EngineError::InvalidRule(format!("{}: {err}", self.name)))?;
        let extractor = serde_json::to_string(&self.extractor)
            .map_err(|err| EngineError::InvalidRule(format!("{}: {err}", self.name)))?;
        Ok(ActiveModel {
            id: ActiveValue::NotSet,
            name: ActiveValue::Set(self.name.clone()),
            priority: ActiveValue::Set(self.priority),
            app_scope: ActiveValue::Set(self.app_scope.clone()),
            event_scope: ActiveValue::Set(self.event_scope.as_str().to_string()),
            enabled: ActiveValue::Set(self.enabled),
            auto_record: ActiveValue::Set(self.auto_record),
            matcher: ActiveValue::Set(matcher),
            extractor: ActiveValue::Set(extractor),
            created_at: ActiveValue::Set(created_at),
        })
    }
}

enum MatchTest {
    Equals(String),
    Contains(String),
    Prefix(String),
    Pattern(Regex),
}

struct CompiledMatch {
    field: String,
    test: MatchTest,
}

impl CompiledMatch {
    fn holds(&self, payload: &Payload) -> bool {
        let Some(text) = payload.field(&self.field) else {
            return false;
        };
        match &self.test {
            MatchTest::Equals(value) => text == value,
            MatchTest::Contains(value) => text.contains(value.as_str()),
            MatchTest::Prefix(value) => text.starts_with(value.as_str()),
            MatchTest::Pattern(regex) => regex.is_match(text),
        }
    }
}

enum CompiledBinding {
    Capture { field: String, regex: Regex },
    Value(String),
}

impl CompiledBinding {
    fn read(&self, payload: &Payload) -> String {
        match self {
            Self::Value(value) => value.clone(),
            Self::Capture { field, regex } => payload
                .field(field)
                .and_then(|text| regex.captures(text))
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str().to_string())
                .unwrap_or_default(),
        }
    }
}

/// A rule with its regexes compiled, ready for matching.
pub struct CompiledRule {
    spec: RuleSpec,
    matchers: Vec<CompiledMatch>,
    money_field: String,
    money_regex: Regex,
    account_from: Option<CompiledBinding>,
    account_to: Option<CompiledBinding>,
    category: Option<CompiledBinding>,
    remark: Option<CompiledBinding>,
    tag: Option<CompiledBinding>,
    currency: Option<CompiledBinding>,
}

impl CompiledRule {
    fn compile(spec: RuleSpec) -> ResultEngine<Self> {
        let bad = |what: &str, err: regex::Error| {
            EngineError::InvalidRule(format!("{}: {what}: {err}", spec.name))
        };

        let mut matchers = Vec::with_capacity(spec.matcher.len());
        for cond in &spec.matcher {
            let test = match cond.op {
                MatchOp::Equals => MatchTest::Equals(cond.value.clone()),
                MatchOp::Contains => MatchTest::Contains(cond.value.clone()),
                MatchOp::Prefix => MatchTest::Prefix(cond.value.clone()),
                MatchOp::Regex => MatchTest::Pattern(
                    Regex::new(&cond.value).map_err(|err| bad("matcher regex", err))?,
                ),
            };
            matchers.push(CompiledMatch {
                field: cond.field.clone(),
                test,
            });
        }

        let money_regex = Regex::new(&spec.extractor.money.pattern)
            .map_err(|err| bad("money pattern", err))?;

        let compile_binding = |binding: &Option<Binding>| -> ResultEngine<Option<CompiledBinding>> {
            match binding {
                None => Ok(None),
                Some(Binding::Value(value)) => Ok(Some(CompiledBinding::Value(value.clone()))),
                Some(Binding::Capture(capture)) => Ok(Some(CompiledBinding::Capture {
                    field: capture.field.clone(),
                    regex: Regex::new(&capture.pattern)
                        .map_err(|err| bad("binding pattern", err))?,
                })),
            }
        };

        Ok(Self {
            matchers,
            money_field: spec.extractor.money.field.clone(),
            money_regex,
            account_from: compile_binding(&spec.extractor.account_from)?,
            account_to: compile_binding(&spec.extractor.account_to)?,
            category: compile_binding(&spec.extractor.category)?,
            remark: compile_binding(&spec.extractor.remark)?,
            tag: compile_binding(&spec.extractor.tag)?,
            currency: compile_binding(&spec.extractor.currency)?,
            spec,
        })
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn spec(&self) -> &RuleSpec {
        &self.spec
    }

    /// Scope check: does this rule apply to the event at all?
    fn accepts(&self, event: &RawEvent) -> bool {
        if self.spec.event_scope != event.kind {
            return false;
        }
        self.spec.app_scope.is_empty() || self.spec.app_scope == event.source_app
    }

    pub fn matches(&self, event: &RawEvent, payload: &Payload) -> bool {
        self.accepts(event) && self.matchers.iter().all(|m| m.holds(payload))
    }

    /// Builds a draft from a matched payload.
    ///
    /// Returns `None` when the money capture is missing, unparseable, or
    /// not positive; the caller reports the miss, it is not an error.
    pub fn extract(&self, event: &RawEvent, payload: &Payload) -> Option<BillDraft> {
        let text = payload.field(&self.money_field)?;
        let captured = self
            .money_regex
            .captures(text)
            .and_then(|caps| caps.get(1))?;
        let money: MoneyCents = captured.as_str().parse().ok()?;
        if !money.is_positive() {
            return None;
        }

        let read = |binding: &Option<CompiledBinding>| {
            binding
                .as_ref()
                .map(|b| b.read(payload))
                .unwrap_or_default()
        };

        Some(BillDraft {
            kind: self.spec.extractor.kind,
            money,
            currency: read(&self.currency),
            occurred_at: event.occurred_at(payload),
            account_from: read(&self.account_from),
            account_to: read(&self.account_to),
            category: read(&self.category),
            remark: read(&self.remark),
            tag: read(&self.tag),
            source_app: event.source_app.clone(),
            rule_name: self.spec.name.clone(),
            auto_record: self.spec.auto_record,
        })
    }
}

/// Immutable compiled ruleset, ordered for deterministic matching.
pub struct RuleSet {
    version: i64,
    rules: Vec<CompiledRule>,
}

impl RuleSet {
    pub fn empty() -> Self {
        Self {
            version: 0,
            rules: Vec::new(),
        }
    }

    /// Compiles enabled specs, ordered `(priority desc, insertion asc)`.
    ///
    /// A spec whose regex fails to compile is skipped with a warning and
    /// does not poison the rest of the set.
    pub fn compile(version: i64, specs: Vec<RuleSpec>) -> Self {
        let mut rules = Vec::with_capacity(specs.len());
        for spec in specs {
            if !spec.enabled {
                continue;
            }
            match CompiledRule::compile(spec) {
                Ok(rule) => rules.push(rule),
                Err(err) => warn!("skipping rule: {err}"),
            }
        }
        // Stable sort: equal priorities keep insertion order.
        rules.sort_by(|a, b| b.spec.priority.cmp(&a.spec.priority));
        Self { version, rules }
    }

    pub fn version(&self) -> i64 {
        self.version
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// First rule whose scope and matcher fully accept the event.
    pub fn match_rule(&self, event: &RawEvent, payload: &Payload) -> Option<&CompiledRule> {
        self.rules.iter().find(|rule| rule.matches(event, payload))
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "rules")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub name: String,
    pub priority: i32,
    pub app_scope: String,
    pub event_scope: String,
    pub enabled: bool,
    pub auto_record: bool,
    pub matcher: String,
    pub extractor: String,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl TryFrom<Model> for RuleSpec {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        let matcher: Vec<FieldMatch> = serde_json::from_str(&model.matcher)
            .map_err(|err| EngineError::InvalidRule(format!("{}: matcher: {err}", model.name)))?;
        let extractor: ExtractorSpec = serde_json::from_str(&model.extractor)
            .map_err(|err| EngineError::InvalidRule(format!("{}: extractor: {err}", model.name)))?;
        Ok(Self {
            name: model.name,
            priority: model.priority,
            app_scope: model.app_scope,
            event_scope: EventKind::try_from(model.event_scope.as_str())?,
            enabled: model.enabled,
            auto_record: model.auto_record,
            matcher,
            extractor,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn bank_sms_rule() -> RuleSpec {
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
                account_from: Some(Binding::Capture(Capture {
                    field: "body".to_string(),
                    pattern: r"尾号([0-9]+)".to_string(),
                })),
                account_to: None,
                category: Some(Binding::Value("日常".to_string())),
                remark: None,
                tag: None,
                currency: None,
            },
        }
    }

    fn sms(body: &str) -> (RawEvent, Payload) {
        let payload = serde_json::json!({ "sender": "95588", "body": body }).to_string();
        let event = RawEvent::new(EventKind::Sms, "com.android.mms", payload, Utc::now());
        let parsed = event.parse_payload().unwrap();
        (event, parsed)
    }

    #[test]
    fn first_full_match_wins_by_priority_then_insertion() {
        let mut low = bank_sms_rule();
        low.name = "low".to_string();
        low.priority = 1;
        let mut first = bank_sms_rule();
        first.name = "first".to_string();
        let mut second = bank_sms_rule();
        second.name = "second".to_string();

        let set = RuleSet::compile(1, vec![low, first, second]);
        let (event, payload) = sms("您尾号1234消费100.00元");
        assert_eq!(set.match_rule(&event, &payload).unwrap().name(), "first");
    }

    #[test]
    fn extracts_money_and_bindings() {
        let set = RuleSet::compile(1, vec![bank_sms_rule()]);
        let (event, payload) = sms("您尾号1234消费100.00元");

        let rule = set.match_rule(&event, &payload).unwrap();
        let draft = rule.extract(&event, &payload).unwrap();
        assert_eq!(draft.money.cents(), 10000);
        assert_eq!(draft.kind, BillKind::Expend);
        assert_eq!(draft.account_from, "1234");
        assert_eq!(draft.category, "日常");
        assert_eq!(draft.rule_name, "BankSMS");
    }

    #[test]
    fn money_extraction_failure_is_a_miss_not_an_error() {
        let set = RuleSet::compile(1, vec![bank_sms_rule()]);
        let (event, payload) = sms("您尾号1234消费了一笔元");
        // Matcher holds ("消费" present) but the money capture comes up empty.
        let rule = set.match_rule(&event, &payload).unwrap();
        assert!(rule.extract(&event, &payload).is_none());
    }

    #[test]
    fn scope_gates_app_and_event_kind() {
        let mut scoped = bank_sms_rule();
        scoped.app_scope = "com.other.app".to_string();
        let set = RuleSet::compile(1, vec![scoped]);
        let (event, payload) = sms("您尾号1234消费100.00元");
        assert!(set.match_rule(&event, &payload).is_none());
    }

    #[test]
    fn broken_regex_is_skipped_not_fatal() {
        let mut broken = bank_sms_rule();
        broken.name = "broken".to_string();
        broken.extractor.money.pattern = "([".to_string();
        let ok = bank_sms_rule();

        let set = RuleSet::compile(1, vec![broken, ok]);
        assert_eq!(set.len(), 1);
        let (event, payload) = sms("您尾号1234消费100.00元");
        assert_eq!(set.match_rule(&event, &payload).unwrap().name(), "BankSMS");
    }

    #[test]
    fn disabled_rules_never_match() {
        let mut disabled = bank_sms_rule();
        disabled.enabled = false;
        let set = RuleSet::compile(1, vec![disabled]);
        assert!(set.is_empty());
    }

    #[test]
    fn rule_spec_round_trips_through_the_model() {
        let spec = bank_sms_rule();
        let active = spec.to_active(Utc::now()).unwrap();
        let model = Model {
            id: 1,
            name: spec.name.clone(),
            priority: spec.priority,
            app_scope: spec.app_scope.clone(),
            event_scope: spec.event_scope.as_str().to_string(),
            enabled: spec.enabled,
            auto_record: spec.auto_record,
            matcher: match active.matcher {
                ActiveValue::Set(ref v) => v.clone(),
                _ => unreachable!(),
            },
            extractor: match active.extractor {
                ActiveValue::Set(ref v) => v.clone(),
                _ => unreachable!(),
            },
            created_at: Utc::now(),
        };
        assert_eq!(RuleSpec::try_from(model).unwrap(), spec);
    }
}
