//! Event Store
//!
//! メモリ上のイベントログ。時系列の本体ログに加えて、ルール評価の
//! 時間窓カウントを全ログ走査なしで行うためのアクター別インデックス
//! を保持します。保持期限スイープとサイズ上限で刈り込まれます。

use super::types::{Event, EventType, Severity};
use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeSet, HashMap, VecDeque};
use tracing::debug;
use uuid::Uuid;

/// アクター別インデックスのエントリ
#[derive(Debug, Clone)]
struct IndexEntry {
    timestamp: DateTime<Utc>,
    event_type: EventType,
}

/// インメモリのイベントログ
#[derive(Debug)]
pub struct EventStore {
    /// 時系列イベント（古い順）
    events: VecDeque<Event>,
    /// アクター別の軽量インデックス（時間窓カウント用）
    actor_index: HashMap<String, VecDeque<IndexEntry>>,
    /// 最大保持件数
    max_events: usize,
}

impl EventStore {
    /// 新しいイベントストアを作成
    pub fn new(max_events: usize) -> Self {
        Self {
            events: VecDeque::new(),
            actor_index: HashMap::new(),
            max_events,
        }
    }

    /// イベントを追加
    pub fn append(&mut self, event: Event) {
        self.actor_index
            .entry(event.actor.network_hash.clone())
            .or_default()
            .push_back(IndexEntry {
                timestamp: event.timestamp,
                event_type: event.event_type,
            });

        self.events.push_back(event);

        // サイズ上限超過分を先頭（最古）から落とす
        while self.events.len() > self.max_events {
            if let Some(oldest) = self.events.pop_front() {
                self.drop_index_front(&oldest.actor.network_hash);
            }
        }
    }

    /// 指定アクターの時間窓内・種別一致イベント数を数える
    ///
    /// インデックスを末尾（最新）から遡り、窓の外に出た時点で打ち切ります。
    pub fn window_count(
        &self,
        actor_hash: &str,
        event_types: &BTreeSet<EventType>,
        window: Duration,
        now: DateTime<Utc>,
    ) -> u32 {
        let Some(entries) = self.actor_index.get(actor_hash) else {
            return 0;
        };
        let cutoff = now - window;

        let mut count = 0;
        for entry in entries.iter().rev() {
            if entry.timestamp < cutoff {
                break;
            }
            if event_types.contains(&entry.event_type) {
                count += 1;
            }
        }
        count
    }

    /// IDでイベントを取得
    pub fn get(&self, id: Uuid) -> Option<&Event> {
        self.events.iter().rev().find(|e| e.id == id)
    }

    /// 直近のイベントを新しい順で取得
    pub fn recent(&self, limit: usize) -> Vec<Event> {
        self.events.iter().rev().take(limit).cloned().collect()
    }

    /// 指定時刻より後のイベントの種別・深刻度別カウントを集計
    ///
    /// 区間は半開 (cutoff, now] で、境界ちょうどのイベントは前の
    /// 区間に属します。連続するレポートで二重計上されません。
    pub fn counts_since(
        &self,
        cutoff: DateTime<Utc>,
    ) -> (HashMap<EventType, u64>, HashMap<Severity, u64>) {
        let mut by_type: HashMap<EventType, u64> = HashMap::new();
        let mut by_severity: HashMap<Severity, u64> = HashMap::new();

        for event in self.events.iter().rev() {
            if event.timestamp <= cutoff {
                break;
            }
            *by_type.entry(event.event_type).or_insert(0) += 1;
            *by_severity.entry(event.severity).or_insert(0) += 1;
        }

        (by_type, by_severity)
    }

    /// 保持期限より古いイベントを削除し、削除件数を返す
    pub fn prune_older_than(&mut self, horizon: DateTime<Utc>) -> usize {
        let mut removed = 0;

        while let Some(front) = self.events.front() {
            if front.timestamp >= horizon {
                break;
            }
            let actor_hash = front.actor.network_hash.clone();
            self.events.pop_front();
            self.drop_index_front(&actor_hash);
            removed += 1;
        }

        if removed > 0 {
            debug!("Retention sweep removed {} events", removed);
        }
        removed
    }

    /// 保持中のイベント数
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// ストアが空かどうか
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// アクター別インデックスの先頭エントリを落とす
    fn drop_index_front(&mut self, actor_hash: &str) {
        if let Some(entries) = self.actor_index.get_mut(actor_hash) {
            entries.pop_front();
            if entries.is_empty() {
                self.actor_index.remove(actor_hash);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::types::{ActorIdentity, DetectionInfo, EventContext, EventTarget};

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
                method: "GET".to_string(),
                path: "/api/test".to_string(),
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

    #[test]
    fn test_window_count_respects_actor_type_and_window() {
        let mut store = EventStore::new(1000);
        let now = Utc::now();
        let types: BTreeSet<EventType> = [EventType::LoginFailure].into_iter().collect();

        store.append(make_event("a", EventType::LoginFailure, now - Duration::minutes(10)));
        store.append(make_event("a", EventType::LoginFailure, now - Duration::minutes(3)));
        store.append(make_event("a", EventType::LoginSuccess, now - Duration::minutes(2)));
        store.append(make_event("b", EventType::LoginFailure, now - Duration::minutes(1)));
        store.append(make_event("a", EventType::LoginFailure, now));

        // 5分窓: アクターaのLoginFailureは2件（10分前のものは窓外、bは別アクター）
        assert_eq!(store.window_count("a", &types, Duration::minutes(5), now), 2);
        assert_eq!(store.window_count("b", &types, Duration::minutes(5), now), 1);
        assert_eq!(store.window_count("c", &types, Duration::minutes(5), now), 0);
    }

    #[test]
    fn test_prune_removes_only_old_events() {
        let mut store = EventStore::new(1000);
        let now = Utc::now();

        store.append(make_event("a", EventType::AccessDenied, now - Duration::hours(48)));
        store.append(make_event("a", EventType::AccessDenied, now - Duration::hours(1)));

        let removed = store.prune_older_than(now - Duration::hours(24));
        assert_eq!(removed, 1);
        assert_eq!(store.len(), 1);

        // インデックスも同期して刈り込まれる
        let types: BTreeSet<EventType> = [EventType::AccessDenied].into_iter().collect();
        assert_eq!(store.window_count("a", &types, Duration::hours(72), now), 1);
    }

    #[test]
    fn test_max_events_bound() {
        let mut store = EventStore::new(3);
        let now = Utc::now();

        for i in 0..5 {
            store.append(make_event("a", EventType::Other, now + Duration::seconds(i)));
        }
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_counts_since_excludes_boundary_timestamp() {
        let mut store = EventStore::new(100);
        let now = Utc::now();
        let boundary = now - Duration::minutes(5);

        store.append(make_event("a", EventType::LoginFailure, boundary));
        store.append(make_event("a", EventType::LoginFailure, now));

        // 境界ちょうどのイベントは前の区間に属し、数えられない
        let (by_type, by_severity) = store.counts_since(boundary);
        assert_eq!(by_type.get(&EventType::LoginFailure), Some(&1));
        assert_eq!(by_severity.get(&Severity::Medium), Some(&1));
    }

    #[test]
    fn test_recent_returns_newest_first() {
        let mut store = EventStore::new(100);
        let now = Utc::now();

        let old = make_event("a", EventType::Other, now - Duration::minutes(2));
        let new = make_event("a", EventType::Other, now);
        let old_id = old.id;
        let new_id = new.id;
        store.append(old);
        store.append(new);

        let recent = store.recent(10);
        assert_eq!(recent[0].id, new_id);
        assert_eq!(recent[1].id, old_id);
        assert!(store.get(old_id).is_some());
    }
}
