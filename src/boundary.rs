//! Outbound Boundaries
//!
//! 通知・エスカレーション・隔離・可観測性の各出口を trait として
//! 切り出します。本体はこれらの trait のみに依存し、既定実装は
//! すべて構造化ログに記録するだけのスタブです。実運用では呼び出し
//! 側が実装を差し替えます。

use crate::error::Result;
use crate::event::types::{Event, EventType, Severity};
use crate::incident::IncidentStatus;
use crate::rules::Rule;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// 通知チャネルの種類
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    /// チャットツール
    Chat,
    /// メール
    Email,
    /// Webhook
    Webhook,
    /// ページング（オンコール呼び出し）
    Paging,
    /// SMS
    Sms,
    /// その他
    Other(String),
}

impl ChannelKind {
    /// チャネル名を取得
    pub fn as_str(&self) -> &str {
        match self {
            ChannelKind::Chat => "chat",
            ChannelKind::Email => "email",
            ChannelKind::Webhook => "webhook",
            ChannelKind::Paging => "paging",
            ChannelKind::Sms => "sms",
            ChannelKind::Other(name) => name,
        }
    }
}

/// 定期サマリーレポート
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportSummary {
    /// 集計期間の開始
    pub period_start: chrono::DateTime<chrono::Utc>,
    /// 集計期間の終了
    pub period_end: chrono::DateTime<chrono::Utc>,
    /// 種別ごとのイベント数
    pub events_by_type: HashMap<EventType, u64>,
    /// 深刻度ごとのイベント数
    pub events_by_severity: HashMap<Severity, u64>,
    /// 状態ごとのインシデント数
    pub incidents_by_status: HashMap<IncidentStatus, u64>,
    /// 追跡中アクター数
    pub tracked_actors: usize,
    /// ブロック中のネットワーク識別子数
    pub blocked_actors: usize,
    /// ブロック中のアカウント識別子数
    pub blocked_accounts: usize,
}

/// アラート通知の出口
#[async_trait]
pub trait NotificationBoundary: Send + Sync {
    /// アラートメッセージを送信
    async fn send(
        &self,
        channel: ChannelKind,
        recipients: &[String],
        message: &str,
        severity: Severity,
    ) -> Result<()>;
}

/// 人手対応へのエスカレーション出口
#[async_trait]
pub trait EscalationBoundary: Send + Sync {
    /// 発火したルールとイベントを上位対応へ引き渡す
    async fn escalate(&self, rule: &Rule, event: &Event) -> Result<()>;
}

/// リソース隔離の出口
#[async_trait]
pub trait QuarantineBoundary: Send + Sync {
    /// 対象リソースを隔離
    async fn quarantine(&self, resource_ref: &str) -> Result<()>;
}

/// 可観測性（メトリクス・レポート）の出口
#[async_trait]
pub trait ObservabilityBoundary: Send + Sync {
    /// メトリクス値を送出
    async fn emit_metric(
        &self,
        name: &str,
        value: f64,
        tags: &HashMap<String, String>,
    ) -> Result<()>;

    /// 定期サマリーレポートを送出
    async fn emit_report(&self, report: &ReportSummary) -> Result<()>;
}

/// ログ記録のみの通知実装
#[derive(Debug, Default)]
pub struct LogNotification;

#[async_trait]
impl NotificationBoundary for LogNotification {
    async fn send(
        &self,
        channel: ChannelKind,
        recipients: &[String],
        message: &str,
        severity: Severity,
    ) -> Result<()> {
        warn!(
            channel = channel.as_str(),
            recipients = recipients.len(),
            severity = severity.as_str(),
            message,
            "Security alert"
        );
        Ok(())
    }
}

/// ログ記録のみのエスカレーション実装
#[derive(Debug, Default)]
pub struct LogEscalation;

#[async_trait]
impl EscalationBoundary for LogEscalation {
    async fn escalate(&self, rule: &Rule, event: &Event) -> Result<()> {
        warn!(
            rule = %rule.name,
            severity = rule.severity.as_str(),
            event_id = %event.id,
            actor = %event.actor.network_hash,
            "Escalation requested"
        );
        Ok(())
    }
}

/// ログ記録のみの隔離実装
#[derive(Debug, Default)]
pub struct LogQuarantine;

#[async_trait]
impl QuarantineBoundary for LogQuarantine {
    async fn quarantine(&self, resource_ref: &str) -> Result<()> {
        warn!(resource = resource_ref, "Quarantine requested");
        Ok(())
    }
}

/// ログ記録のみの可観測性実装
#[derive(Debug, Default)]
pub struct LogObservability;

#[async_trait]
impl ObservabilityBoundary for LogObservability {
    async fn emit_metric(
        &self,
        name: &str,
        value: f64,
        tags: &HashMap<String, String>,
    ) -> Result<()> {
        debug!(metric = name, value, ?tags, "Metric");
        Ok(())
    }

    async fn emit_report(&self, report: &ReportSummary) -> Result<()> {
        info!(
            period_start = %report.period_start,
            period_end = %report.period_end,
            tracked_actors = report.tracked_actors,
            blocked_actors = report.blocked_actors,
            blocked_accounts = report.blocked_accounts,
            "Summary report"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_kind_names() {
        assert_eq!(ChannelKind::Chat.as_str(), "chat");
        assert_eq!(ChannelKind::Paging.as_str(), "paging");
        assert_eq!(ChannelKind::Other("syslog".to_string()).as_str(), "syslog");
    }

    #[test]
    fn test_log_boundaries_succeed() {
        let notification = LogNotification;
        let result = tokio_test::block_on(notification.send(
            ChannelKind::Chat,
            &["ops".to_string()],
            "test alert",
            Severity::High,
        ));
        assert!(result.is_ok());

        let quarantine = LogQuarantine;
        assert!(tokio_test::block_on(quarantine.quarantine("host-42")).is_ok());
    }
}
