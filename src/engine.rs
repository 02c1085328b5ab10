//! Correlation Engine
//!
//! 取り込み・リスク記帳・ルール評価・インシデント相関・アクション
//! 実行を1イベントずつ完結させる論理単一の評価器。`record_event`
//! は1イベント分の処理を最後まで実行してから戻ります。

use crate::boundary::{
    EscalationBoundary, LogEscalation, LogNotification, LogObservability, LogQuarantine,
    NotificationBoundary, ObservabilityBoundary, QuarantineBoundary, ReportSummary,
};
use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::dispatch::{ActionDispatcher, ActionOutcome, BlockList};
use crate::error::Result;
use crate::event::enrichment::Enricher;
use crate::event::store::EventStore;
use crate::event::types::{Event, RawOccurrence};
use crate::housekeeping::Housekeeping;
use crate::incident::correlator::CorrelationOutcome;
use crate::incident::{Incident, IncidentCorrelator, IncidentStatus, Resolution};
use crate::risk::RiskLedger;
use crate::rules::{Matcher, Rule, RuleSet};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

/// エンジンの累積統計
#[derive(Debug, Clone, Default, Serialize)]
pub struct EngineStats {
    /// 取り込んだイベント数
    pub events_ingested: u64,
    /// 検証で拒否したオカレンス数
    pub events_rejected: u64,
    /// 評価したルール数（イベント×ルール）
    pub rules_evaluated: u64,
    /// 発火したルール数
    pub rules_triggered: u64,
    /// 新規作成したインシデント数
    pub incidents_opened: u64,
    /// 既存インシデントへの統合数
    pub incidents_merged: u64,
    /// 実行したアクション数
    pub actions_dispatched: u64,
    /// 失敗したアクション数
    pub actions_failed: u64,
}

/// 発火した1ルール分の処理結果
#[derive(Debug, Clone)]
pub struct TriggeredRule {
    /// 発火したルールID
    pub rule_id: Uuid,
    /// 発火したルール名
    pub rule_name: String,
    /// 対象インシデントID
    pub incident_id: Uuid,
    /// 新規作成なら true、既存への統合なら false
    pub incident_created: bool,
    /// アクション実行結果（宣言順）
    pub actions: Vec<ActionOutcome>,
}

/// 1イベント分の取り込み結果
#[derive(Debug, Clone)]
pub struct RecordOutcome {
    /// 正規化済みイベント
    pub event: Event,
    /// 発火したルールとその処理結果
    pub triggered: Vec<TriggeredRule>,
}

/// セキュリティ相関エンジン
pub struct SecurityEngine {
    enricher: Enricher,
    store: Arc<RwLock<EventStore>>,
    ledger: Arc<RwLock<RiskLedger>>,
    rules: Arc<RwLock<RuleSet>>,
    correlator: Arc<RwLock<IncidentCorrelator>>,
    block_list: Arc<RwLock<BlockList>>,
    dispatcher: ActionDispatcher,
    housekeeping: Housekeeping,
    stats: Arc<RwLock<EngineStats>>,
    clock: Arc<dyn Clock>,
}

impl SecurityEngine {
    /// システムクロックとログ記録のみの境界で作成
    pub fn new(config: EngineConfig) -> Result<Self> {
        Self::with_parts(
            config,
            Arc::new(SystemClock),
            Arc::new(LogNotification),
            Arc::new(LogEscalation),
            Arc::new(LogQuarantine),
            Arc::new(LogObservability),
        )
    }

    /// クロックと境界実装を指定して作成
    pub fn with_parts(
        config: EngineConfig,
        clock: Arc<dyn Clock>,
        notification: Arc<dyn NotificationBoundary>,
        escalation: Arc<dyn EscalationBoundary>,
        quarantine: Arc<dyn QuarantineBoundary>,
        observability: Arc<dyn ObservabilityBoundary>,
    ) -> Result<Self> {
        config.validate()?;

        let ledger = Arc::new(RwLock::new(RiskLedger::new(
            config.decay_factor,
            config.risk_eviction_epsilon,
        )));
        let store = Arc::new(RwLock::new(EventStore::new(config.max_events)));
        let correlator = Arc::new(RwLock::new(IncidentCorrelator::new()));
        let block_list = Arc::new(RwLock::new(BlockList::new()));

        let enricher = Enricher::new(&config, Arc::clone(&ledger), Arc::clone(&clock))?;
        let dispatcher = ActionDispatcher::new(
            notification,
            escalation,
            quarantine,
            Arc::clone(&block_list),
            config.alert_recipients.clone(),
            config.max_action_history,
            Arc::clone(&clock),
        );
        let housekeeping = Housekeeping::new(
            &config,
            Arc::clone(&ledger),
            Arc::clone(&store),
            Arc::clone(&correlator),
            Arc::clone(&block_list),
            observability,
            Arc::clone(&clock),
        );

        Ok(Self {
            enricher,
            store,
            ledger,
            rules: Arc::new(RwLock::new(RuleSet::new())),
            correlator,
            block_list,
            dispatcher,
            housekeeping,
            stats: Arc::new(RwLock::new(EngineStats::default())),
            clock,
        })
    }

    /// 生オカレンスを1件処理
    ///
    /// 正規化・記帳・ルール評価・相関・アクション実行を、このイベント
    /// について完結させてから戻ります。検証エラーのオカレンスは拒否
    /// として計上され、ログにも状態にも残りません。
    pub async fn record_event(&self, raw: &RawOccurrence) -> Result<RecordOutcome> {
        let event = match self.enricher.ingest(raw).await {
            Ok(event) => event,
            Err(e) => {
                self.stats.write().await.events_rejected += 1;
                warn!(error = %e, "Occurrence rejected");
                return Err(e);
            }
        };

        let now = self.clock.now();
        self.store.write().await.append(event.clone());
        self.ledger.write().await.bump(
            &event.actor.network_hash,
            f64::from(event.detection.risk_score),
            now,
        );

        let matches = {
            let rules = self.rules.read().await;
            let store = self.store.read().await;
            Matcher::evaluate(&rules, &store, &event, now)
        };

        {
            let mut stats = self.stats.write().await;
            stats.events_ingested += 1;
            stats.rules_evaluated += matches.len() as u64;
        }

        let mut triggered = Vec::new();
        for rule_match in matches.into_iter().filter(|m| m.triggered) {
            let rule = rule_match.rule;
            // 相関キーの確認と作成/統合は1つの書き込みロック内で行う
            let outcome = self.correlator.write().await.correlate(&rule, &event, now);
            let incident_created = matches!(outcome, CorrelationOutcome::Created(_));

            let actions = self.dispatcher.dispatch(&rule, &event).await;

            {
                let mut stats = self.stats.write().await;
                stats.rules_triggered += 1;
                if incident_created {
                    stats.incidents_opened += 1;
                } else {
                    stats.incidents_merged += 1;
                }
                stats.actions_dispatched += actions.len() as u64;
                stats.actions_failed += actions.iter().filter(|a| !a.success).count() as u64;
            }

            triggered.push(TriggeredRule {
                rule_id: rule.id,
                rule_name: rule.name,
                incident_id: outcome.incident_id(),
                incident_created,
                actions,
            });
        }

        Ok(RecordOutcome { event, triggered })
    }

    /// ルールを追加または更新
    pub async fn upsert_rule(&self, rule: Rule) -> Result<()> {
        self.rules.write().await.upsert(rule)
    }

    /// ルールを削除
    pub async fn remove_rule(&self, id: Uuid) -> Result<()> {
        self.rules.write().await.remove(id)
    }

    /// ルールの有効/無効を切り替え
    pub async fn set_rule_enabled(&self, id: Uuid, enabled: bool) -> Result<()> {
        self.rules.write().await.set_enabled(id, enabled)
    }

    /// 設定順のルール一覧
    pub async fn list_rules(&self) -> Vec<Rule> {
        self.rules.read().await.list().to_vec()
    }

    /// IDでインシデントを取得
    pub async fn get_incident(&self, id: Uuid) -> Option<Incident> {
        self.correlator.read().await.get(id).cloned()
    }

    /// 全インシデント（順不同）
    pub async fn list_incidents(&self) -> Vec<Incident> {
        self.correlator.read().await.list().cloned().collect()
    }

    /// インシデントの状態遷移を実行
    pub async fn set_incident_status(
        &self,
        id: Uuid,
        next: IncidentStatus,
        resolution: Option<Resolution>,
        operator: &str,
    ) -> Result<()> {
        let now = self.clock.now();
        self.correlator
            .write()
            .await
            .set_status(id, next, resolution, operator, now)
    }

    /// インシデントを調査中へ遷移
    pub async fn acknowledge_incident(&self, id: Uuid, operator: &str) -> Result<()> {
        let now = self.clock.now();
        self.correlator.write().await.acknowledge(id, operator, now)
    }

    /// IDでイベントを取得
    pub async fn get_event(&self, id: Uuid) -> Option<Event> {
        self.store.read().await.get(id).cloned()
    }

    /// 直近のイベント（新しい順）
    pub async fn recent_events(&self, limit: usize) -> Vec<Event> {
        self.store.read().await.recent(limit)
    }

    /// 直近のアクション実行履歴（新しい順）
    pub async fn recent_actions(&self, limit: usize) -> Vec<ActionOutcome> {
        self.dispatcher.recent_outcomes(limit).await
    }

    /// アクターの現在のリスクスコア
    pub async fn actor_risk(&self, network_hash: &str) -> f64 {
        self.ledger.read().await.get(network_hash)
    }

    /// ネットワーク識別子がブロック中かどうか
    pub async fn is_actor_blocked(&self, network_hash: &str) -> bool {
        self.block_list.read().await.is_actor_blocked(network_hash)
    }

    /// アカウント識別子がブロック中かどうか
    pub async fn is_account_blocked(&self, account_hash: &str) -> bool {
        self.block_list.read().await.is_account_blocked(account_hash)
    }

    /// ネットワーク識別子のブロックを解除（解除できたら true）
    pub async fn unblock_actor(&self, network_hash: &str) -> bool {
        let removed = self.block_list.write().await.unblock_actor(network_hash);
        if removed {
            info!(actor = network_hash, "Actor unblocked");
        }
        removed
    }

    /// アカウント識別子のブロックを解除（解除できたら true）
    pub async fn unblock_account(&self, account_hash: &str) -> bool {
        let removed = self.block_list.write().await.unblock_account(account_hash);
        if removed {
            info!(account = account_hash, "Account unblocked");
        }
        removed
    }

    /// 識別子を塩付きハッシュへ変換（照会用）
    pub fn hash_identity(&self, value: &str) -> String {
        self.enricher.hash_identity(value)
    }

    /// 累積統計のスナップショット
    pub async fn stats(&self) -> EngineStats {
        self.stats.read().await.clone()
    }

    /// リスク減衰を1ティック実行
    pub async fn run_decay_tick(&self) -> usize {
        self.housekeeping.run_decay_tick().await
    }

    /// 保持期間スイープを1回実行
    pub async fn run_retention_sweep(&self) -> (usize, usize) {
        self.housekeeping.run_retention_sweep().await
    }

    /// サマリーレポートを1回生成して送出
    pub async fn run_summary_report(&self) -> Result<ReportSummary> {
        self.housekeeping.run_summary_report().await
    }

    /// ハウスキーピングのバックグラウンドタスクを開始
    pub async fn start_housekeeping(&self) {
        self.housekeeping.start().await;
    }

    /// ハウスキーピングのバックグラウンドタスクを停止
    pub async fn stop_housekeeping(&self) {
        self.housekeeping.stop().await;
    }
}
