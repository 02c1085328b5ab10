//! Incident Correlator
//!
//! 発火したルールとアクターの組 (rule_id, actor_hash) ごとに
//! アクティブなインシデントを1件に保ちます。既存のアクティブな
//! インシデントがあればイベントを追記し、なければ新規作成します。
//! 終了遷移で相関キーが解放され、以降の発火は新しいインシデント
//! を作成します。

use super::{Incident, IncidentStatus, Resolution, TimelineEntry};
use crate::error::{Error, Result};
use crate::event::types::Event;
use crate::rules::Rule;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tracing::{info, warn};
use uuid::Uuid;

/// 相関結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorrelationOutcome {
    /// 新規インシデントを作成
    Created(Uuid),
    /// 既存のアクティブなインシデントへ追記
    Merged(Uuid),
}

impl CorrelationOutcome {
    /// 対象インシデントのID
    pub fn incident_id(&self) -> Uuid {
        match self {
            CorrelationOutcome::Created(id) | CorrelationOutcome::Merged(id) => *id,
        }
    }
}

/// インシデント相関器
#[derive(Debug, Default)]
pub struct IncidentCorrelator {
    incidents: HashMap<Uuid, Incident>,
    /// (rule_id, actor_hash) → アクティブなインシデントID
    active: HashMap<(Uuid, String), Uuid>,
}

impl IncidentCorrelator {
    /// 空の相関器を作成
    pub fn new() -> Self {
        Self::default()
    }

    /// 発火したルールとイベントを既存インシデントへ統合、
    /// または新規インシデントを作成
    pub fn correlate(&mut self, rule: &Rule, event: &Event, now: DateTime<Utc>) -> CorrelationOutcome {
        let key = (rule.id, event.actor.network_hash.clone());

        if let Some(&incident_id) = self.active.get(&key) {
            if let Some(incident) = self.incidents.get_mut(&incident_id) {
                incident.events.push(event.id);
                incident.timeline.push(TimelineEntry {
                    timestamp: now,
                    action: "event_added".to_string(),
                    actor: "system".to_string(),
                    note: Some(format!("event {}", event.id)),
                });
                // 深刻度は関連イベントの最大値へ引き上げのみ
                if event.severity > incident.severity {
                    incident.severity = event.severity;
                }
                incident.updated = now;
                info!(
                    incident_id = %incident_id,
                    rule = %rule.name,
                    events = incident.events.len(),
                    "Event merged into active incident"
                );
                return CorrelationOutcome::Merged(incident_id);
            }
            // アクティブ索引が孤立している場合は作り直す
            warn!(incident_id = %incident_id, "Active index referenced missing incident");
            self.active.remove(&key);
        }

        let incident = Incident {
            id: Uuid::new_v4(),
            rule_id: rule.id,
            rule_name: rule.name.clone(),
            actor_hash: event.actor.network_hash.clone(),
            severity: rule.severity.max(event.severity),
            status: IncidentStatus::Open,
            events: vec![event.id],
            timeline: vec![TimelineEntry {
                timestamp: now,
                action: "incident_created".to_string(),
                actor: "system".to_string(),
                note: Some(format!("rule '{}' triggered", rule.name)),
            }],
            resolution: None,
            created: now,
            updated: now,
        };
        let incident_id = incident.id;
        info!(
            incident_id = %incident_id,
            rule = %rule.name,
            severity = incident.severity.as_str(),
            "Incident created"
        );
        self.incidents.insert(incident_id, incident);
        self.active.insert(key, incident_id);
        CorrelationOutcome::Created(incident_id)
    }

    /// 状態遷移を実行
    ///
    /// 終了遷移には解決サマリーが必須です。終了したインシデントは
    /// 相関キーを解放し、以降の同一キーの発火は新規インシデントに
    /// なります。
    pub fn set_status(
        &mut self,
        incident_id: Uuid,
        next: IncidentStatus,
        resolution: Option<Resolution>,
        operator: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let incident = self
            .incidents
            .get_mut(&incident_id)
            .ok_or_else(|| Error::NotFound(format!("incident {}", incident_id)))?;

        if !incident.status.can_transition_to(next) {
            return Err(Error::Transition(format!(
                "incident {}: {} -> {} is not allowed",
                incident_id,
                incident.status.as_str(),
                next.as_str()
            )));
        }
        if next.is_terminal() && resolution.is_none() {
            return Err(Error::Validation(format!(
                "incident {}: terminal transition to {} requires a resolution",
                incident_id,
                next.as_str()
            )));
        }

        let previous = incident.status;
        incident.status = next;
        incident.timeline.push(TimelineEntry {
            timestamp: now,
            action: "status_changed".to_string(),
            actor: operator.to_string(),
            note: Some(format!("{} -> {}", previous.as_str(), next.as_str())),
        });
        if next.is_terminal() {
            incident.resolution = resolution;
            self.active
                .remove(&(incident.rule_id, incident.actor_hash.clone()));
        }
        incident.updated = now;
        info!(
            incident_id = %incident_id,
            from = previous.as_str(),
            to = next.as_str(),
            operator,
            "Incident status changed"
        );
        Ok(())
    }

    /// open → investigating への省略形
    pub fn acknowledge(&mut self, incident_id: Uuid, operator: &str, now: DateTime<Utc>) -> Result<()> {
        self.set_status(incident_id, IncidentStatus::Investigating, None, operator, now)
    }

    /// IDでインシデントを取得
    pub fn get(&self, incident_id: Uuid) -> Option<&Incident> {
        self.incidents.get(&incident_id)
    }

    /// 保持している全インシデント（順不同）
    pub fn list(&self) -> impl Iterator<Item = &Incident> {
        self.incidents.values()
    }

    /// 保持期間を過ぎた終了済みインシデントを削除
    ///
    /// アクティブなインシデントは保持期間に関わらず削除しません。
    pub fn prune_terminal_older_than(&mut self, retention: Duration, now: DateTime<Utc>) -> usize {
        let horizon = now - retention;
        let before = self.incidents.len();
        self.incidents
            .retain(|_, incident| !(incident.status.is_terminal() && incident.updated < horizon));
        before - self.incidents.len()
    }

    /// 状態別のインシデント数
    pub fn status_counts(&self) -> HashMap<IncidentStatus, u64> {
        let mut counts = HashMap::new();
        for incident in self.incidents.values() {
            *counts.entry(incident.status).or_insert(0) += 1;
        }
        counts
    }

    /// 保持しているインシデント数
    pub fn len(&self) -> usize {
        self.incidents.len()
    }

    /// インシデントを保持していないかどうか
    pub fn is_empty(&self) -> bool {
        self.incidents.is_empty()
    }
}
