//! Rule Model
//!
//! 外部から供給される相関ルールの定義と、検証付きのルールセット
//! 管理。エンジン自身がルールを書き換えることはありません。
//! 不正なルール（しきい値 < 1、非正の時間窓、コンパイル不能な
//! パターン）は登録時に拒否され、マッチャーへは到達しません。

pub mod matcher;

pub use matcher::{Matcher, RuleMatch};

use crate::error::{Error, Result};
use crate::event::types::{EventType, Severity};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use tracing::info;
use uuid::Uuid;

/// 応答アクションの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionKind {
    /// 構造化ログへの記録のみ
    Log,
    /// 通知境界へのアラート送出
    Alert,
    /// ネットワーク識別子のブロック
    BlockActor,
    /// アカウント識別子のブロック
    BlockAccount,
    /// 二要素認証の要求
    RequireSecondFactor,
    /// エスカレーション境界への引き渡し
    Escalate,
    /// 対象リソースの隔離
    Quarantine,
}

impl ActionKind {
    /// アクション名を取得
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Log => "log",
            ActionKind::Alert => "alert",
            ActionKind::BlockActor => "block-actor",
            ActionKind::BlockAccount => "block-account",
            ActionKind::RequireSecondFactor => "require-second-factor",
            ActionKind::Escalate => "escalate",
            ActionKind::Quarantine => "quarantine",
        }
    }
}

/// ルールの発火条件
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleConditions {
    /// 時間窓（秒、正の値）
    pub time_window_secs: i64,
    /// 窓内の最小イベント数（1以上）
    pub threshold: u32,
    /// 対象パス＋メタデータへの追加パターン（正規表現）
    pub pattern: Option<String>,
}

/// 相関ルール（設定エンティティ）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    /// ルールID
    pub id: Uuid,
    /// ルール名
    pub name: String,
    /// 対象イベント種別
    pub event_types: BTreeSet<EventType>,
    /// 発火条件
    pub conditions: RuleConditions,
    /// 発火時のインシデント深刻度
    pub severity: Severity,
    /// 有効フラグ
    pub enabled: bool,
    /// 発火時に実行するアクション（宣言順に実行）
    pub actions: Vec<ActionKind>,
}

impl Rule {
    /// 新しいルールを作成
    pub fn new(
        name: impl Into<String>,
        event_types: impl IntoIterator<Item = EventType>,
        time_window_secs: i64,
        threshold: u32,
        severity: Severity,
        actions: Vec<ActionKind>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            event_types: event_types.into_iter().collect(),
            conditions: RuleConditions {
                time_window_secs,
                threshold,
                pattern: None,
            },
            severity,
            enabled: true,
            actions,
        }
    }

    /// パターン条件を設定
    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.conditions.pattern = Some(pattern.into());
        self
    }
}

/// 検証付きルールセット
///
/// ルールは設定されたリスト順を保ち、マッチャーはこの順で評価します。
#[derive(Debug, Default)]
pub struct RuleSet {
    rules: Vec<Rule>,
    /// 登録時にコンパイル済みのパターン（評価時にエラーは起きない）
    compiled: HashMap<Uuid, Regex>,
}

impl RuleSet {
    /// 空のルールセットを作成
    pub fn new() -> Self {
        Self::default()
    }

    /// ルールを追加または更新
    pub fn upsert(&mut self, rule: Rule) -> Result<()> {
        if rule.conditions.threshold < 1 {
            return Err(Error::Configuration(format!(
                "rule '{}': threshold must be at least 1",
                rule.name
            )));
        }
        if rule.conditions.time_window_secs <= 0 {
            return Err(Error::Configuration(format!(
                "rule '{}': time window must be positive",
                rule.name
            )));
        }
        if rule.event_types.is_empty() {
            return Err(Error::Configuration(format!(
                "rule '{}': at least one event type is required",
                rule.name
            )));
        }

        match &rule.conditions.pattern {
            Some(pattern) => {
                let regex = Regex::new(pattern).map_err(|e| {
                    Error::Configuration(format!("rule '{}': invalid pattern: {}", rule.name, e))
                })?;
                self.compiled.insert(rule.id, regex);
            }
            None => {
                self.compiled.remove(&rule.id);
            }
        }

        if let Some(existing) = self.rules.iter_mut().find(|r| r.id == rule.id) {
            info!(rule = %rule.name, "Rule updated");
            *existing = rule;
        } else {
            info!(rule = %rule.name, "Rule added");
            self.rules.push(rule);
        }
        Ok(())
    }

    /// ルールを削除
    pub fn remove(&mut self, id: Uuid) -> Result<()> {
        let before = self.rules.len();
        self.rules.retain(|r| r.id != id);
        if self.rules.len() == before {
            return Err(Error::NotFound(format!("rule {}", id)));
        }
        self.compiled.remove(&id);
        Ok(())
    }

    /// ルールの有効/無効を切り替え
    pub fn set_enabled(&mut self, id: Uuid, enabled: bool) -> Result<()> {
        let rule = self
            .rules
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| Error::NotFound(format!("rule {}", id)))?;
        rule.enabled = enabled;
        info!(rule = %rule.name, enabled, "Rule toggled");
        Ok(())
    }

    /// IDでルールを取得
    pub fn get(&self, id: Uuid) -> Option<&Rule> {
        self.rules.iter().find(|r| r.id == id)
    }

    /// 設定順のルール一覧
    pub fn list(&self) -> &[Rule] {
        &self.rules
    }

    /// コンパイル済みパターンを取得
    pub(crate) fn pattern_for(&self, id: Uuid) -> Option<&Regex> {
        self.compiled.get(&id)
    }

    /// ルール数
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// ルールセットが空かどうか
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn login_rule(threshold: u32, window_secs: i64) -> Rule {
        Rule::new(
            "brute force",
            [EventType::LoginFailure],
            window_secs,
            threshold,
            Severity::High,
            vec![ActionKind::Alert, ActionKind::BlockActor],
        )
    }

    #[test]
    fn test_invalid_threshold_rejected() {
        let mut rules = RuleSet::new();
        let result = rules.upsert(login_rule(0, 300));
        assert!(matches!(result, Err(Error::Configuration(_))));
        assert!(rules.is_empty());
    }

    #[test]
    fn test_non_positive_window_rejected() {
        let mut rules = RuleSet::new();
        assert!(rules.upsert(login_rule(5, 0)).is_err());
        assert!(rules.upsert(login_rule(5, -60)).is_err());
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let mut rules = RuleSet::new();
        let rule = login_rule(5, 300).with_pattern("([unclosed");
        assert!(matches!(rules.upsert(rule), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_upsert_replaces_in_place() {
        let mut rules = RuleSet::new();
        let rule = login_rule(5, 300);
        let id = rule.id;
        rules.upsert(rule.clone()).unwrap();

        let mut updated = rule;
        updated.conditions.threshold = 10;
        rules.upsert(updated).unwrap();

        assert_eq!(rules.len(), 1);
        assert_eq!(rules.get(id).unwrap().conditions.threshold, 10);
    }

    #[test]
    fn test_remove_and_toggle() {
        let mut rules = RuleSet::new();
        let rule = login_rule(5, 300);
        let id = rule.id;
        rules.upsert(rule).unwrap();

        rules.set_enabled(id, false).unwrap();
        assert!(!rules.get(id).unwrap().enabled);

        rules.remove(id).unwrap();
        assert!(matches!(rules.remove(id), Err(Error::NotFound(_))));
    }
}
