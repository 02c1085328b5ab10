//! Event Types
//!
//! 相関エンジンが扱うイベントの型定義。イベントは取り込み時に
//! 一度だけ生成され、以降は不変です。生の識別子（IPアドレス、
//! メールアドレス）はソルト付きハッシュに変換された後にのみ
//! イベントへ載り、生のPIIは保持されません。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use uuid::Uuid;

/// イベント種別（閉じた集合）
///
/// 未知の種別名は `Other` にフォールバックし、デフォルトの
/// 深刻度・基礎スコアで処理されます。
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// ログイン失敗
    LoginFailure,
    /// ログイン成功
    LoginSuccess,
    /// アクセス拒否
    AccessDenied,
    /// レート制限超過
    RateLimitExceeded,
    /// SQLインジェクション試行
    SqlInjectionAttempt,
    /// スクリプトインジェクション試行
    XssAttempt,
    /// 権限昇格
    PrivilegeEscalation,
    /// データエクスポート
    DataExport,
    /// 設定変更
    ConfigChange,
    /// 異常なリクエスト
    AnomalousRequest,
    /// その他
    Other,
}

impl EventType {
    /// 種別名から解決（未知の名前は `Other` にフォールバック）
    pub fn from_name(name: &str) -> EventType {
        match name.trim().to_ascii_lowercase().as_str() {
            "login_failure" => EventType::LoginFailure,
            "login_success" => EventType::LoginSuccess,
            "access_denied" => EventType::AccessDenied,
            "rate_limit_exceeded" => EventType::RateLimitExceeded,
            "sql_injection_attempt" => EventType::SqlInjectionAttempt,
            "xss_attempt" => EventType::XssAttempt,
            "privilege_escalation" => EventType::PrivilegeEscalation,
            "data_export" => EventType::DataExport,
            "config_change" => EventType::ConfigChange,
            "anomalous_request" => EventType::AnomalousRequest,
            _ => EventType::Other,
        }
    }
}

/// 深刻度（順序付き）
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// 情報
    Info,
    /// 低
    Low,
    /// 中
    #[default]
    Medium,
    /// 高
    High,
    /// 緊急
    Critical,
}

impl Severity {
    /// レベル名を取得
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

/// アクター識別情報（ハッシュ化済み）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActorIdentity {
    /// ネットワーク識別子のソルト付きハッシュ
    pub network_hash: String,
    /// アカウント識別子のソルト付きハッシュ
    pub account_hash: Option<String>,
    /// ロール
    pub role: Option<String>,
}

/// イベント対象
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventTarget {
    /// HTTPメソッド等の操作種別
    pub method: String,
    /// パスまたはリソース識別子
    pub path: String,
    /// リクエストメタデータ
    pub metadata: HashMap<String, String>,
}

/// 検知情報
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionInfo {
    /// 検知元ルールのヒント（デフォルト "manual"）
    pub rule_hint: String,
    /// 信頼度（0.0-1.0）
    pub confidence: f64,
    /// 取り込み時に算出されたリスクスコア（0-100）
    pub risk_score: u8,
    /// 疑わしさを示すタグ
    pub indicators: BTreeSet<String>,
}

/// イベントコンテキスト
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventContext {
    /// セッションID
    pub session_id: Option<String>,
    /// リクエストID
    pub request_id: Option<String>,
    /// 自由形式のメタデータ
    pub metadata: HashMap<String, String>,
}

/// セキュリティイベント（生成後は不変）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// イベントID
    pub id: Uuid,
    /// イベント種別
    pub event_type: EventType,
    /// 深刻度
    pub severity: Severity,
    /// 発生時刻
    pub timestamp: DateTime<Utc>,
    /// アクター
    pub actor: ActorIdentity,
    /// 対象
    pub target: EventTarget,
    /// 検知情報
    pub detection: DetectionInfo,
    /// コンテキスト
    pub context: EventContext,
}

/// 生のリクエスト記述子（取り込み入力）
#[derive(Debug, Clone, Default)]
pub struct RawRequest {
    /// HTTPメソッド
    pub method: String,
    /// パス
    pub path: String,
    /// ヘッダー
    pub headers: HashMap<String, String>,
    /// クエリパラメータ
    pub query: HashMap<String, String>,
    /// ボディ
    pub body: Option<String>,
}

/// 生のレスポンス記述子（取り込み入力）
#[derive(Debug, Clone, Default)]
pub struct RawResponse {
    /// ステータスコード
    pub status: u16,
    /// レスポンスサイズ（バイト）
    pub size: u64,
}

/// 取り込み境界に渡される生のオカレンス
///
/// 生の識別子はこの構造体より先に保持されることはありません。
#[derive(Debug, Clone, Default)]
pub struct RawOccurrence {
    /// イベント種別名（必須）
    pub event_type: String,
    /// 送信元ネットワークアドレス
    pub network_address: String,
    /// アカウントのメールアドレス
    pub account_email: Option<String>,
    /// ロール
    pub role: Option<String>,
    /// リクエスト記述子
    pub request: RawRequest,
    /// レスポンス記述子
    pub response: RawResponse,
    /// セッションID
    pub session_id: Option<String>,
    /// リクエストID
    pub request_id: Option<String>,
    /// 追加メタデータ
    pub metadata: HashMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
        assert!(Severity::Low > Severity::Info);
    }

    #[test]
    fn test_event_type_from_name() {
        assert_eq!(EventType::from_name("login_failure"), EventType::LoginFailure);
        assert_eq!(EventType::from_name("LOGIN_FAILURE"), EventType::LoginFailure);
        assert_eq!(EventType::from_name(" data_export "), EventType::DataExport);
        // 未知の種別はOtherにフォールバック
        assert_eq!(EventType::from_name("coffee_break"), EventType::Other);
    }
}
