//! Action Dispatch
//!
//! 発火したルールのアクション列を宣言順に実行します。各アクション
//! は個別に障害分離され、1つの失敗は失敗した結果として記録される
//! だけで、残りのアクションの実行を妨げません。

use crate::boundary::{
    ChannelKind, EscalationBoundary, NotificationBoundary, QuarantineBoundary,
};
use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::event::types::Event;
use crate::rules::{ActionKind, Rule};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};
use uuid::Uuid;

/// ブロックリスト
///
/// ネットワーク識別子とアカウント識別子（どちらも塩付きハッシュ）
/// を別々に保持します。ブロックは冪等です。
#[derive(Debug, Default)]
pub struct BlockList {
    actors: HashSet<String>,
    accounts: HashSet<String>,
}

impl BlockList {
    /// 空のブロックリストを作成
    pub fn new() -> Self {
        Self::default()
    }

    /// ネットワーク識別子をブロック（新規追加なら true）
    pub fn block_actor(&mut self, network_hash: &str) -> bool {
        self.actors.insert(network_hash.to_string())
    }

    /// アカウント識別子をブロック（新規追加なら true）
    pub fn block_account(&mut self, account_hash: &str) -> bool {
        self.accounts.insert(account_hash.to_string())
    }

    /// ネットワーク識別子のブロックを解除
    pub fn unblock_actor(&mut self, network_hash: &str) -> bool {
        self.actors.remove(network_hash)
    }

    /// アカウント識別子のブロックを解除
    pub fn unblock_account(&mut self, account_hash: &str) -> bool {
        self.accounts.remove(account_hash)
    }

    /// ネットワーク識別子がブロック中かどうか
    pub fn is_actor_blocked(&self, network_hash: &str) -> bool {
        self.actors.contains(network_hash)
    }

    /// アカウント識別子がブロック中かどうか
    pub fn is_account_blocked(&self, account_hash: &str) -> bool {
        self.accounts.contains(account_hash)
    }

    /// ブロック中のネットワーク識別子数
    pub fn actor_count(&self) -> usize {
        self.actors.len()
    }

    /// ブロック中のアカウント識別子数
    pub fn account_count(&self) -> usize {
        self.accounts.len()
    }
}

/// 1アクション分の実行結果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionOutcome {
    /// 実行したアクション
    pub action: ActionKind,
    /// 発火元ルールID
    pub rule_id: Uuid,
    /// 発火元イベントID
    pub event_id: Uuid,
    /// 実行時刻
    pub executed_at: DateTime<Utc>,
    /// 成功したかどうか
    pub success: bool,
    /// 詳細（失敗時は理由）
    pub detail: String,
}

/// アクションディスパッチャー
pub struct ActionDispatcher {
    notification: Arc<dyn NotificationBoundary>,
    escalation: Arc<dyn EscalationBoundary>,
    quarantine: Arc<dyn QuarantineBoundary>,
    block_list: Arc<RwLock<BlockList>>,
    history: Arc<RwLock<VecDeque<ActionOutcome>>>,
    max_history: usize,
    recipients: Vec<String>,
    clock: Arc<dyn Clock>,
}

impl ActionDispatcher {
    /// 新しいディスパッチャーを作成
    pub fn new(
        notification: Arc<dyn NotificationBoundary>,
        escalation: Arc<dyn EscalationBoundary>,
        quarantine: Arc<dyn QuarantineBoundary>,
        block_list: Arc<RwLock<BlockList>>,
        recipients: Vec<String>,
        max_history: usize,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            notification,
            escalation,
            quarantine,
            block_list,
            history: Arc::new(RwLock::new(VecDeque::new())),
            max_history,
            recipients,
            clock,
        }
    }

    /// ルールのアクション列を宣言順に実行
    ///
    /// 個々のアクションの失敗は結果に記録され、残りのアクションは
    /// そのまま実行されます。
    pub async fn dispatch(&self, rule: &Rule, event: &Event) -> Vec<ActionOutcome> {
        let mut outcomes = Vec::with_capacity(rule.actions.len());

        for &action in &rule.actions {
            let result = self.execute(action, rule, event).await;
            let executed_at = self.clock.now();
            let outcome = match result {
                Ok(detail) => {
                    info!(
                        action = action.as_str(),
                        rule = %rule.name,
                        event_id = %event.id,
                        "Action executed"
                    );
                    ActionOutcome {
                        action,
                        rule_id: rule.id,
                        event_id: event.id,
                        executed_at,
                        success: true,
                        detail,
                    }
                }
                Err(e) => {
                    error!(
                        action = action.as_str(),
                        rule = %rule.name,
                        event_id = %event.id,
                        error = %e,
                        "Action failed"
                    );
                    ActionOutcome {
                        action,
                        rule_id: rule.id,
                        event_id: event.id,
                        executed_at,
                        success: false,
                        detail: e.to_string(),
                    }
                }
            };
            outcomes.push(outcome);
        }

        let mut history = self.history.write().await;
        for outcome in &outcomes {
            history.push_back(outcome.clone());
            while history.len() > self.max_history {
                history.pop_front();
            }
        }

        outcomes
    }

    async fn execute(&self, action: ActionKind, rule: &Rule, event: &Event) -> Result<String> {
        match action {
            ActionKind::Log => {
                info!(
                    rule = %rule.name,
                    event_id = %event.id,
                    actor = %event.actor.network_hash,
                    severity = rule.severity.as_str(),
                    "Rule triggered"
                );
                Ok("logged".to_string())
            }
            ActionKind::Alert => {
                let message = format!(
                    "rule '{}' triggered by actor {} (event {})",
                    rule.name, event.actor.network_hash, event.id
                );
                self.notification
                    .send(ChannelKind::Chat, &self.recipients, &message, rule.severity)
                    .await
                    .map_err(|e| Error::Dispatch {
                        action: action.as_str().to_string(),
                        reason: e.to_string(),
                    })?;
                Ok(format!("alert sent to {} recipients", self.recipients.len()))
            }
            ActionKind::BlockActor => {
                let newly = self
                    .block_list
                    .write()
                    .await
                    .block_actor(&event.actor.network_hash);
                Ok(if newly {
                    format!("actor {} blocked", event.actor.network_hash)
                } else {
                    format!("actor {} already blocked", event.actor.network_hash)
                })
            }
            ActionKind::BlockAccount => {
                let account_hash =
                    event
                        .actor
                        .account_hash
                        .as_deref()
                        .ok_or_else(|| Error::Dispatch {
                            action: action.as_str().to_string(),
                            reason: "event carries no account identity".to_string(),
                        })?;
                let newly = self.block_list.write().await.block_account(account_hash);
                Ok(if newly {
                    format!("account {} blocked", account_hash)
                } else {
                    format!("account {} already blocked", account_hash)
                })
            }
            ActionKind::RequireSecondFactor => {
                // 実際のチャレンジは認証層の責務。ここでは構造化
                // ログとしてチャレンジ要求を記録する。
                warn!(
                    actor = %event.actor.network_hash,
                    account = event.actor.account_hash.as_deref().unwrap_or("-"),
                    rule = %rule.name,
                    "Second factor challenge requested"
                );
                Ok("second factor challenge recorded".to_string())
            }
            ActionKind::Escalate => {
                self.escalation
                    .escalate(rule, event)
                    .await
                    .map_err(|e| Error::Dispatch {
                        action: action.as_str().to_string(),
                        reason: e.to_string(),
                    })?;
                Ok("escalated".to_string())
            }
            ActionKind::Quarantine => {
                self.quarantine
                    .quarantine(&event.target.path)
                    .await
                    .map_err(|e| Error::Dispatch {
                        action: action.as_str().to_string(),
                        reason: e.to_string(),
                    })?;
                Ok(format!("quarantined {}", event.target.path))
            }
        }
    }

    /// 直近のアクション実行履歴（新しい順）
    pub async fn recent_outcomes(&self, limit: usize) -> Vec<ActionOutcome> {
        let history = self.history.read().await;
        history.iter().rev().take(limit).cloned().collect()
    }
}
