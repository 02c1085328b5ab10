//! Incident Model
//!
//! ルール発火から生成されるインシデントとそのライフサイクル。
//! 状態遷移は open → investigating → resolved / false_positive
//! （investigating は省略可能）のみで、終了状態からの遷移は
//! ありません。

pub mod correlator;

pub use correlator::IncidentCorrelator;

use crate::event::types::Severity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// インシデント状態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentStatus {
    /// 新規
    Open,
    /// 調査中
    Investigating,
    /// 解決済み（終了状態）
    Resolved,
    /// 誤検知（終了状態）
    FalsePositive,
}

impl IncidentStatus {
    /// 終了状態かどうか
    pub fn is_terminal(&self) -> bool {
        matches!(self, IncidentStatus::Resolved | IncidentStatus::FalsePositive)
    }

    /// 指定状態への遷移が許可されているかどうか
    pub fn can_transition_to(&self, next: IncidentStatus) -> bool {
        match (self, next) {
            (IncidentStatus::Open, IncidentStatus::Investigating)
            | (IncidentStatus::Open, IncidentStatus::Resolved)
            | (IncidentStatus::Open, IncidentStatus::FalsePositive)
            | (IncidentStatus::Investigating, IncidentStatus::Resolved)
            | (IncidentStatus::Investigating, IncidentStatus::FalsePositive) => true,
            _ => false,
        }
    }

    /// 状態名を取得
    pub fn as_str(&self) -> &'static str {
        match self {
            IncidentStatus::Open => "open",
            IncidentStatus::Investigating => "investigating",
            IncidentStatus::Resolved => "resolved",
            IncidentStatus::FalsePositive => "false_positive",
        }
    }
}

/// タイムラインエントリ（追記のみ）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineEntry {
    /// 記録時刻
    pub timestamp: DateTime<Utc>,
    /// 何が起きたか（incident_created, event_added, status_changed 等）
    pub action: String,
    /// 操作者（システムの場合は "system"）
    pub actor: String,
    /// 補足メモ
    pub note: Option<String>,
}

/// 解決サマリー（終了遷移時に必須）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resolution {
    /// 解決時刻
    pub timestamp: DateTime<Utc>,
    /// 概要
    pub summary: String,
    /// 実施した対応
    pub actions_taken: Vec<String>,
    /// 得られた教訓
    pub lessons_learned: Option<String>,
}

/// インシデント
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Incident {
    /// インシデントID
    pub id: Uuid,
    /// 発火元ルールID（相関キーの一部）
    pub rule_id: Uuid,
    /// 発火元ルール名
    pub rule_name: String,
    /// アクターのネットワークハッシュ（相関キーの一部）
    pub actor_hash: String,
    /// 深刻度（発火元ルールから継承）
    pub severity: Severity,
    /// 現在の状態
    pub status: IncidentStatus,
    /// 関連イベントID（古い順）
    pub events: Vec<Uuid>,
    /// タイムライン（追記のみ）
    pub timeline: Vec<TimelineEntry>,
    /// 解決サマリー（終了遷移時のみ設定）
    pub resolution: Option<Resolution>,
    /// 作成時刻
    pub created: DateTime<Utc>,
    /// 最終更新時刻
    pub updated: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_transitions() {
        assert!(IncidentStatus::Open.can_transition_to(IncidentStatus::Investigating));
        assert!(IncidentStatus::Open.can_transition_to(IncidentStatus::Resolved));
        assert!(IncidentStatus::Open.can_transition_to(IncidentStatus::FalsePositive));
        assert!(IncidentStatus::Investigating.can_transition_to(IncidentStatus::Resolved));
        assert!(IncidentStatus::Investigating.can_transition_to(IncidentStatus::FalsePositive));
    }

    #[test]
    fn test_terminal_states_are_sealed() {
        for terminal in [IncidentStatus::Resolved, IncidentStatus::FalsePositive] {
            assert!(terminal.is_terminal());
            for next in [
                IncidentStatus::Open,
                IncidentStatus::Investigating,
                IncidentStatus::Resolved,
                IncidentStatus::FalsePositive,
            ] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn test_no_backwards_transition() {
        assert!(!IncidentStatus::Investigating.can_transition_to(IncidentStatus::Open));
        assert!(!IncidentStatus::Open.can_transition_to(IncidentStatus::Open));
    }
}
