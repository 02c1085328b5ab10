//! Rule Matcher
//!
//! 有効なルールをイベントに対して評価します。同一アクターの
//! 時間窓内イベント数（現在のイベントを含む）がしきい値に達し、
//! パターン条件があればそれも満たしたときに発火します。
//! マッチした全ルールが互いに独立して発火します
//! （先勝ちの短絡はありません）。

use super::{Rule, RuleSet};
use crate::event::store::EventStore;
use crate::event::types::Event;
use chrono::{DateTime, Duration, Utc};
use tracing::debug;

/// 1ルール分の評価結果
#[derive(Debug, Clone)]
pub struct RuleMatch {
    /// 評価対象ルール
    pub rule: Rule,
    /// 発火したかどうか
    pub triggered: bool,
}

/// ルールマッチャー
pub struct Matcher;

impl Matcher {
    /// イベントを全ルールに対して評価
    ///
    /// 無効なルールは完全にスキップされ、イベント種別が一致しない
    /// ルールは集合の所属チェック以上のコストを払いません。
    /// 評価はルールセットの設定順で行われます。
    pub fn evaluate(
        rules: &RuleSet,
        store: &EventStore,
        event: &Event,
        now: DateTime<Utc>,
    ) -> Vec<RuleMatch> {
        let mut matches = Vec::new();

        for rule in rules.list() {
            if !rule.enabled {
                continue;
            }
            if !rule.event_types.contains(&event.event_type) {
                continue;
            }

            let count = store.window_count(
                &event.actor.network_hash,
                &rule.event_types,
                Duration::seconds(rule.conditions.time_window_secs),
                now,
            );

            let mut triggered = count >= rule.conditions.threshold;

            // しきい値を満たした場合のみパターンを検査する
            if triggered {
                if let Some(regex) = rules.pattern_for(rule.id) {
                    triggered = regex.is_match(&pattern_haystack(event));
                }
            }

            debug!(
                rule = %rule.name,
                count,
                threshold = rule.conditions.threshold,
                triggered,
                "Rule evaluated"
            );

            matches.push(RuleMatch {
                rule: rule.clone(),
                triggered,
            });
        }

        matches
    }
}

/// パターン照合の対象文字列（対象パス＋シリアライズ済みメタデータ）
fn pattern_haystack(event: &Event) -> String {
    let metadata = serde_json::to_string(&event.target.metadata).unwrap_or_default();
    format!("{} {}", event.target.path, metadata)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::types::{
        ActorIdentity, DetectionInfo, EventContext, EventTarget, EventType, Severity,
    };
    use crate::rules::ActionKind;
    use std::collections::{BTreeSet, HashMap};
    use uuid::Uuid;

    fn make_event(actor: &str, event_type: EventType, timestamp: DateTime<Utc>) -> Event {
        Event {
            id: Uuid::new_v4(),
            event_type,
            severity: Severity::Medium,
            timestamp,
            actor: ActorIdentity {
                network_hash: actor.to_string(),
                account_hash: None,
                role: None,
            },
            target: EventTarget {
                method: "POST".to_string(),
                path: "/api/login".to_string(),
                metadata: HashMap::new(),
            },
            detection: DetectionInfo {
                rule_hint: "manual".to_string(),
                confidence: 0.5,
                risk_score: 30,
                indicators: BTreeSet::new(),
            },
            context: EventContext::default(),
        }
    }

    fn setup(threshold: u32) -> (RuleSet, EventStore) {
        let mut rules = RuleSet::new();
        rules
            .upsert(Rule::new(
                "brute force",
                [EventType::LoginFailure],
                300,
                threshold,
                Severity::High,
                vec![ActionKind::Alert],
            ))
            .unwrap();
        (rules, EventStore::new(1000))
    }

    #[test]
    fn test_triggers_on_nth_event_not_before() {
        let (rules, mut store) = setup(3);
        let now = Utc::now();

        for i in 0..3 {
            let event = make_event("actor-a", EventType::LoginFailure, now);
            store.append(event.clone());
            let matches = Matcher::evaluate(&rules, &store, &event, now);
            assert_eq!(matches.len(), 1);
            let expected = i == 2;
            assert_eq!(
                matches[0].triggered, expected,
                "event {} should{} trigger",
                i + 1,
                if expected { "" } else { " not" }
            );
        }
    }

    #[test]
    fn test_events_outside_window_not_counted() {
        let (rules, mut store) = setup(3);
        let now = Utc::now();

        // 2件は窓内、1件は窓外（6分前）
        store.append(make_event("actor-a", EventType::LoginFailure, now - Duration::minutes(6)));
        store.append(make_event("actor-a", EventType::LoginFailure, now - Duration::minutes(2)));
        let event = make_event("actor-a", EventType::LoginFailure, now);
        store.append(event.clone());

        let matches = Matcher::evaluate(&rules, &store, &event, now);
        assert!(!matches[0].triggered);
    }

    #[test]
    fn test_disabled_rule_skipped() {
        let (mut rules, mut store) = setup(1);
        let id = rules.list()[0].id;
        rules.set_enabled(id, false).unwrap();

        let now = Utc::now();
        let event = make_event("actor-a", EventType::LoginFailure, now);
        store.append(event.clone());

        let matches = Matcher::evaluate(&rules, &store, &event, now);
        assert!(matches.is_empty());
    }

    #[test]
    fn test_non_matching_type_skipped() {
        let (rules, mut store) = setup(1);
        let now = Utc::now();
        let event = make_event("actor-a", EventType::DataExport, now);
        store.append(event.clone());

        let matches = Matcher::evaluate(&rules, &store, &event, now);
        assert!(matches.is_empty());
    }

    #[test]
    fn test_pattern_gates_trigger() {
        let mut rules = RuleSet::new();
        rules
            .upsert(
                Rule::new(
                    "admin path probe",
                    [EventType::AccessDenied],
                    300,
                    1,
                    Severity::Medium,
                    vec![ActionKind::Log],
                )
                .with_pattern(r"/admin"),
            )
            .unwrap();
        let mut store = EventStore::new(1000);
        let now = Utc::now();

        // しきい値は満たすがパターン不一致 → 発火しない
        let mut event = make_event("actor-a", EventType::AccessDenied, now);
        event.target.path = "/api/login".to_string();
        store.append(event.clone());
        let matches = Matcher::evaluate(&rules, &store, &event, now);
        assert!(!matches[0].triggered);

        // パターン一致 → 発火
        let mut event = make_event("actor-a", EventType::AccessDenied, now);
        event.target.path = "/admin/settings".to_string();
        store.append(event.clone());
        let matches = Matcher::evaluate(&rules, &store, &event, now);
        assert!(matches[0].triggered);
    }

    #[test]
    fn test_multiple_rules_fire_independently() {
        let mut rules = RuleSet::new();
        rules
            .upsert(Rule::new(
                "single failure",
                [EventType::LoginFailure],
                300,
                1,
                Severity::Low,
                vec![ActionKind::Log],
            ))
            .unwrap();
        rules
            .upsert(Rule::new(
                "repeated failure",
                [EventType::LoginFailure],
                300,
                2,
                Severity::High,
                vec![ActionKind::Alert],
            ))
            .unwrap();
        let mut store = EventStore::new(1000);
        let now = Utc::now();

        let first = make_event("actor-a", EventType::LoginFailure, now);
        store.append(first.clone());
        let matches = Matcher::evaluate(&rules, &store, &first, now);
        assert!(matches[0].triggered);
        assert!(!matches[1].triggered);

        let second = make_event("actor-a", EventType::LoginFailure, now);
        store.append(second.clone());
        let matches = Matcher::evaluate(&rules, &store, &second, now);
        assert!(matches[0].triggered);
        assert!(matches[1].triggered);
    }
}
