//! Event Enrichment
//!
//! 生のオカレンスを型付きイベントへ正規化します。深刻度と初期
//! リスクスコアの算出、疑わしさを示すインジケーターの付与、
//! 識別子のソルト付きハッシュ化をこの段階で行います。
//! この呼び出しを過ぎた後に生のPIIが残ることはありません。

use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::event::types::{
    ActorIdentity, DetectionInfo, Event, EventContext, EventTarget, EventType, RawOccurrence,
    Severity,
};
use crate::risk::RiskLedger;
use regex::Regex;
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashSet};
use std::net::IpAddr;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

/// 既知脅威アクターのレピュテーションボーナス
const REPUTATION_BONUS: f64 = 30.0;
/// 管理者ロールのボーナス
const ADMIN_ROLE_BONUS: f64 = 15.0;
/// 未定義種別の基礎スコア
const DEFAULT_BASE_RISK: f64 = 30.0;

/// イベント正規化・エンリッチャー
pub struct Enricher {
    /// ハッシュソルト（外部注入の秘密情報）
    salt: SecretString,
    /// 既知の脅威アクターアドレス
    known_threat_networks: HashSet<String>,
    /// SQLインジェクション風トークン列
    sql_pattern: Regex,
    /// スクリプトインジェクション風トークン列
    script_pattern: Regex,
    /// 自動化ツールのエージェントシグネチャ
    agent_pattern: Regex,
    /// リスク台帳（リードスルー参照）
    ledger: Arc<RwLock<RiskLedger>>,
    /// 時刻ソース
    clock: Arc<dyn Clock>,
}

impl Enricher {
    /// 新しいエンリッチャーを作成
    pub fn new(
        config: &EngineConfig,
        ledger: Arc<RwLock<RiskLedger>>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let sql_pattern = Regex::new(
            r"(?i)(union\s+(all\s+)?select|or\s+1\s*=\s*1|information_schema|;\s*(drop|delete|insert|update)\s|sleep\s*\(|benchmark\s*\()",
        )
        .map_err(|e| Error::Configuration(format!("Invalid SQL token pattern: {}", e)))?;

        let script_pattern = Regex::new(
            r"(?i)(<script\b|javascript:|onerror\s*=|onload\s*=|document\.cookie|eval\s*\()",
        )
        .map_err(|e| Error::Configuration(format!("Invalid script token pattern: {}", e)))?;

        let agent_pattern = Regex::new(
            r"(?i)(sqlmap|nikto|nmap|masscan|hydra|gobuster|wfuzz|dirbuster|python-requests|go-http-client|curl/|wget/)",
        )
        .map_err(|e| Error::Configuration(format!("Invalid agent pattern: {}", e)))?;

        Ok(Self {
            salt: config.hash_salt.clone(),
            known_threat_networks: config.known_threat_networks.clone(),
            sql_pattern,
            script_pattern,
            agent_pattern,
            ledger,
            clock,
        })
    }

    /// 生のオカレンスをイベントへ正規化
    ///
    /// 入力不正は `Error::Validation` で拒否され、状態は一切
    /// 変更されません。
    pub async fn ingest(&self, raw: &RawOccurrence) -> Result<Event> {
        if raw.event_type.trim().is_empty() {
            return Err(Error::Validation("event type is required".to_string()));
        }
        if raw.network_address.trim().is_empty() {
            return Err(Error::Validation(
                "source network address is required".to_string(),
            ));
        }

        let event_type = EventType::from_name(&raw.event_type);
        let severity = type_severity(event_type);
        let indicators = self.collect_indicators(raw);

        // 識別子はここでハッシュ化され、生の値はイベントに載らない
        let network_hash = self.hash_identity(raw.network_address.trim());
        let account_hash = raw
            .account_email
            .as_deref()
            .map(|email| self.hash_identity(&email.trim().to_ascii_lowercase()));

        let risk_score = self
            .compute_risk_score(event_type, raw, &network_hash, &indicators)
            .await;

        let confidence = confidence_for(&indicators);

        let mut target_metadata = raw.request.query.clone();
        target_metadata.insert("response_status".to_string(), raw.response.status.to_string());
        target_metadata.insert("response_size".to_string(), raw.response.size.to_string());
        // ボディはルールのパターン照合対象なのでイベントに載せる
        if let Some(body) = &raw.request.body {
            target_metadata.insert("request_body".to_string(), body.clone());
        }

        let event = Event {
            id: Uuid::new_v4(),
            event_type,
            severity,
            timestamp: self.clock.now(),
            actor: ActorIdentity {
                network_hash,
                account_hash,
                role: raw.role.clone(),
            },
            target: EventTarget {
                method: raw.request.method.clone(),
                path: raw.request.path.clone(),
                metadata: target_metadata,
            },
            detection: DetectionInfo {
                rule_hint: "manual".to_string(),
                confidence,
                risk_score,
                indicators,
            },
            context: EventContext {
                session_id: raw.session_id.clone(),
                request_id: raw.request_id.clone(),
                metadata: raw.metadata.clone(),
            },
        };

        debug!(
            event_id = %event.id,
            event_type = ?event.event_type,
            risk_score = event.detection.risk_score,
            "Event enriched"
        );

        Ok(event)
    }

    /// ソルト付きSHA-256ハッシュを算出
    pub fn hash_identity(&self, value: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.salt.expose_secret().as_bytes());
        hasher.update(b":");
        hasher.update(value.as_bytes());
        let digest = hasher.finalize();
        digest.iter().map(|b| format!("{:02x}", b)).collect()
    }

    /// リスクスコアを算出（基礎 + レピュテーション + ロール + 台帳値）
    async fn compute_risk_score(
        &self,
        event_type: EventType,
        raw: &RawOccurrence,
        network_hash: &str,
        indicators: &BTreeSet<String>,
    ) -> u8 {
        let mut score = base_risk(event_type);

        if indicators.contains("known-threat-actor") {
            score += REPUTATION_BONUS;
        }
        if is_admin_role(raw.role.as_deref()) {
            score += ADMIN_ROLE_BONUS;
        }

        // リスク台帳のリードスルー
        score += self.ledger.read().await.get(network_hash);

        score.clamp(0.0, 100.0).round() as u8
    }

    /// パターン照合でインジケーターを収集
    fn collect_indicators(&self, raw: &RawOccurrence) -> BTreeSet<String> {
        let mut indicators = BTreeSet::new();

        let address = raw.network_address.trim();
        if self.known_threat_networks.contains(address) {
            indicators.insert("known-threat-actor".to_string());
        }
        if is_private_address(address) {
            indicators.insert("private-network".to_string());
        }

        let mut haystack = String::new();
        haystack.push_str(&raw.request.path);
        for (key, value) in &raw.request.query {
            haystack.push(' ');
            haystack.push_str(key);
            haystack.push('=');
            haystack.push_str(value);
        }
        if let Some(body) = &raw.request.body {
            haystack.push(' ');
            haystack.push_str(body);
        }

        if self.sql_pattern.is_match(&haystack) {
            indicators.insert("sql-injection-pattern".to_string());
        }
        if self.script_pattern.is_match(&haystack) {
            indicators.insert("script-injection-pattern".to_string());
        }

        if let Some(agent) = header_value(&raw.request.headers, "user-agent") {
            if self.agent_pattern.is_match(agent) {
                indicators.insert("suspicious-agent".to_string());
            }
        }

        indicators
    }
}

/// 種別→深刻度の固定テーブル（未定義はMedium）
fn type_severity(event_type: EventType) -> Severity {
    match event_type {
        EventType::LoginFailure => Severity::Low,
        EventType::LoginSuccess => Severity::Info,
        EventType::AccessDenied => Severity::Medium,
        EventType::RateLimitExceeded => Severity::Medium,
        EventType::SqlInjectionAttempt => Severity::Critical,
        EventType::XssAttempt => Severity::High,
        EventType::PrivilegeEscalation => Severity::Critical,
        EventType::DataExport => Severity::High,
        EventType::ConfigChange => Severity::Medium,
        EventType::AnomalousRequest => Severity::Medium,
        EventType::Other => Severity::Medium,
    }
}

/// 種別→基礎リスクの固定テーブル（未定義は30）
fn base_risk(event_type: EventType) -> f64 {
    match event_type {
        EventType::LoginFailure => 20.0,
        EventType::LoginSuccess => 5.0,
        EventType::AccessDenied => 25.0,
        EventType::RateLimitExceeded => 25.0,
        EventType::SqlInjectionAttempt => 60.0,
        EventType::XssAttempt => 50.0,
        EventType::PrivilegeEscalation => 70.0,
        EventType::DataExport => 55.0,
        EventType::ConfigChange => 30.0,
        EventType::AnomalousRequest => 35.0,
        EventType::Other => DEFAULT_BASE_RISK,
    }
}

/// インジケーター数から信頼度を導出
fn confidence_for(indicators: &BTreeSet<String>) -> f64 {
    (0.3 + indicators.len() as f64 * 0.15).min(0.95)
}

/// 管理者ロールかどうか
fn is_admin_role(role: Option<&str>) -> bool {
    matches!(
        role.map(|r| r.to_ascii_lowercase()).as_deref(),
        Some("admin") | Some("administrator") | Some("root") | Some("superuser")
    )
}

/// プライベート／ループバックアドレスかどうか
fn is_private_address(address: &str) -> bool {
    match address.parse::<IpAddr>() {
        Ok(IpAddr::V4(v4)) => v4.is_private() || v4.is_loopback() || v4.is_link_local(),
        Ok(IpAddr::V6(v6)) => v6.is_loopback(),
        Err(_) => false,
    }
}

/// ヘッダーを大文字小文字を無視して検索
fn header_value<'a>(
    headers: &'a std::collections::HashMap<String, String>,
    name: &str,
) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}
