//! Housekeeping Jobs
//!
//! リスク減衰ティック・保持期間スイープ・定期サマリーレポートの
//! 3つの定期処理を提供します。それぞれは単発実行用のメソッドと
//! して公開され、`start()` は1つのバックグラウンドタスク内で
//! 3本のインターバルを多重化して回します。

use crate::boundary::{ObservabilityBoundary, ReportSummary};
use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::dispatch::BlockList;
use crate::error::Result;
use crate::event::store::EventStore;
use crate::incident::IncidentCorrelator;
use crate::risk::RiskLedger;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// ハウスキーピング実行部
pub struct Housekeeping {
    ledger: Arc<RwLock<RiskLedger>>,
    store: Arc<RwLock<EventStore>>,
    correlator: Arc<RwLock<IncidentCorrelator>>,
    block_list: Arc<RwLock<BlockList>>,
    observability: Arc<dyn ObservabilityBoundary>,
    clock: Arc<dyn Clock>,
    event_retention: Duration,
    incident_retention: Duration,
    decay_interval: StdDuration,
    retention_interval: StdDuration,
    report_interval: StdDuration,
    last_report: Arc<RwLock<DateTime<Utc>>>,
    task: Arc<RwLock<Option<JoinHandle<()>>>>,
}

impl Housekeeping {
    /// 新しいハウスキーピング実行部を作成
    pub fn new(
        config: &EngineConfig,
        ledger: Arc<RwLock<RiskLedger>>,
        store: Arc<RwLock<EventStore>>,
        correlator: Arc<RwLock<IncidentCorrelator>>,
        block_list: Arc<RwLock<BlockList>>,
        observability: Arc<dyn ObservabilityBoundary>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let now = clock.now();
        Self {
            ledger,
            store,
            correlator,
            block_list,
            observability,
            clock,
            event_retention: Duration::seconds(config.event_retention_secs),
            incident_retention: Duration::seconds(config.incident_retention_secs),
            decay_interval: StdDuration::from_secs(config.decay_interval_secs),
            retention_interval: StdDuration::from_secs(config.retention_interval_secs),
            report_interval: StdDuration::from_secs(config.report_interval_secs),
            last_report: Arc::new(RwLock::new(now)),
            task: Arc::new(RwLock::new(None)),
        }
    }

    /// リスク減衰を1ティック実行（消滅したエントリ数を返す）
    pub async fn run_decay_tick(&self) -> usize {
        let now = self.clock.now();
        let evicted = self.ledger.write().await.decay_tick(now);
        if evicted > 0 {
            debug!(evicted, "Risk ledger decay tick evicted actors");
        }
        self.emit_metric("risk.evicted_actors", evicted as f64).await;
        evicted
    }

    /// 保持期間スイープを1回実行（削除したイベント数・インシデント数を返す）
    ///
    /// アクティブなインシデントは保持期間に関わらず残ります。
    pub async fn run_retention_sweep(&self) -> (usize, usize) {
        let now = self.clock.now();
        let events_removed = self
            .store
            .write()
            .await
            .prune_older_than(now - self.event_retention);
        let incidents_removed = self
            .correlator
            .write()
            .await
            .prune_terminal_older_than(self.incident_retention, now);
        if events_removed > 0 || incidents_removed > 0 {
            info!(events_removed, incidents_removed, "Retention sweep completed");
        }
        self.emit_metric("retention.events_removed", events_removed as f64)
            .await;
        self.emit_metric("retention.incidents_removed", incidents_removed as f64)
            .await;
        (events_removed, incidents_removed)
    }

    /// メトリクスを送出（失敗はログのみで処理を止めない）
    async fn emit_metric(&self, name: &str, value: f64) {
        let tags = HashMap::new();
        if let Err(e) = self.observability.emit_metric(name, value, &tags).await {
            error!(metric = name, error = %e, "Metric emission failed");
        }
    }

    /// サマリーレポートを1回生成して送出
    pub async fn run_summary_report(&self) -> Result<ReportSummary> {
        let now = self.clock.now();
        let period_start = {
            let mut last = self.last_report.write().await;
            let start = *last;
            *last = now;
            start
        };

        let (events_by_type, events_by_severity) =
            self.store.read().await.counts_since(period_start);
        let incidents_by_status = self.correlator.read().await.status_counts();
        let tracked_actors = self.ledger.read().await.tracked_count();
        let (blocked_actors, blocked_accounts) = {
            let block_list = self.block_list.read().await;
            (block_list.actor_count(), block_list.account_count())
        };

        let report = ReportSummary {
            period_start,
            period_end: now,
            events_by_type,
            events_by_severity,
            incidents_by_status,
            tracked_actors,
            blocked_actors,
            blocked_accounts,
        };
        self.observability.emit_report(&report).await?;
        Ok(report)
    }

    /// バックグラウンドタスクを開始（既に動作中なら何もしない）
    pub async fn start(&self) {
        let mut task = self.task.write().await;
        if task.is_some() {
            debug!("Housekeeping task already running");
            return;
        }

        let worker = self.clone_shallow();
        let handle = tokio::spawn(async move {
            let mut decay_ticker = tokio::time::interval(worker.decay_interval);
            let mut retention_ticker = tokio::time::interval(worker.retention_interval);
            let mut report_ticker = tokio::time::interval(worker.report_interval);
            // 起動直後の即時発火を捨てる
            decay_ticker.tick().await;
            retention_ticker.tick().await;
            report_ticker.tick().await;

            loop {
                tokio::select! {
                    _ = decay_ticker.tick() => {
                        worker.run_decay_tick().await;
                    }
                    _ = retention_ticker.tick() => {
                        worker.run_retention_sweep().await;
                    }
                    _ = report_ticker.tick() => {
                        if let Err(e) = worker.run_summary_report().await {
                            error!(error = %e, "Summary report failed");
                        }
                    }
                }
            }
        });
        *task = Some(handle);
        info!("Housekeeping task started");
    }

    /// バックグラウンドタスクを停止
    pub async fn stop(&self) {
        let mut task = self.task.write().await;
        if let Some(handle) = task.take() {
            handle.abort();
            info!("Housekeeping task stopped");
        }
    }

    fn clone_shallow(&self) -> Self {
        Self {
            ledger: Arc::clone(&self.ledger),
            store: Arc::clone(&self.store),
            correlator: Arc::clone(&self.correlator),
            block_list: Arc::clone(&self.block_list),
            observability: Arc::clone(&self.observability),
            clock: Arc::clone(&self.clock),
            event_retention: self.event_retention,
            incident_retention: self.incident_retention,
            decay_interval: self.decay_interval,
            retention_interval: self.retention_interval,
            report_interval: self.report_interval,
            last_report: Arc::clone(&self.last_report),
            task: Arc::clone(&self.task),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boundary::LogObservability;
    use crate::clock::ManualClock;
    use crate::event::types::{
        ActorIdentity, DetectionInfo, Event, EventContext, EventTarget, EventType, Severity,
    };
    use std::collections::{BTreeSet, HashMap};
    use uuid::Uuid;

    fn make_event(timestamp: DateTime<Utc>) -> Event {
        Event {
            id: Uuid::new_v4(),
            event_type: EventType::LoginFailure,
            severity: Severity::Medium,
            timestamp,
            actor: ActorIdentity {
                network_hash: "actor-a".to_string(),
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

    fn setup(clock: Arc<ManualClock>) -> Housekeeping {
        let config = EngineConfig::new("test-salt")
            .with_event_retention_secs(3600)
            .with_decay_factor(0.5);
        Housekeeping::new(
            &config,
            Arc::new(RwLock::new(RiskLedger::new(0.5, 0.01))),
            Arc::new(RwLock::new(EventStore::new(1000))),
            Arc::new(RwLock::new(IncidentCorrelator::new())),
            Arc::new(RwLock::new(BlockList::new())),
            Arc::new(LogObservability),
            clock,
        )
    }

    #[tokio::test]
    async fn test_retention_sweep_removes_old_events() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let housekeeping = setup(Arc::clone(&clock));
        let now = clock.now();

        housekeeping
            .store
            .write()
            .await
            .append(make_event(now - Duration::hours(2)));
        housekeeping.store.write().await.append(make_event(now));

        let (events_removed, _) = housekeeping.run_retention_sweep().await;
        assert_eq!(events_removed, 1);
        assert_eq!(housekeeping.store.read().await.len(), 1);
    }

    #[tokio::test]
    async fn test_decay_tick_reduces_scores() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let housekeeping = setup(Arc::clone(&clock));
        let now = clock.now();

        housekeeping.ledger.write().await.bump("actor-a", 40.0, now);
        housekeeping.run_decay_tick().await;
        let score = housekeeping.ledger.read().await.get("actor-a");
        assert!(score < 40.0 && score > 0.0);
    }

    #[tokio::test]
    async fn test_summary_report_counts_period_events() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let housekeeping = setup(Arc::clone(&clock));

        clock.advance(Duration::minutes(5));
        let now = clock.now();
        housekeeping.store.write().await.append(make_event(now));
        housekeeping.store.write().await.append(make_event(now));
        housekeeping.block_list.write().await.block_actor("actor-a");

        let report = housekeeping.run_summary_report().await.unwrap();
        assert_eq!(report.events_by_type.get(&EventType::LoginFailure), Some(&2));
        assert_eq!(report.blocked_actors, 1);

        // 次のレポートは前回以降のみを集計する
        clock.advance(Duration::minutes(5));
        let report = housekeeping.run_summary_report().await.unwrap();
        assert!(report.events_by_type.is_empty());
    }
}
