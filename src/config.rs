//! Engine Configuration
//!
//! 相関エンジンの設定。ハッシュソルトはホスト環境から注入される
//! 秘密情報であり、設定値としてハードコードしてはいけません。

use crate::error::{Error, Result};
use secrecy::SecretString;
use std::collections::HashSet;

/// エンジン設定
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// アクター識別子のハッシュ化に使うソルト（外部注入の秘密情報）
    pub hash_salt: SecretString,
    /// リスクスコアの減衰係数（0 < factor < 1、スイープ毎に乗算）
    pub decay_factor: f64,
    /// この値未満のリスクエントリは減衰スイープで破棄される
    pub risk_eviction_epsilon: f64,
    /// イベント保持期間（秒）
    pub event_retention_secs: i64,
    /// 終了済みインシデントの保持期間（秒）
    pub incident_retention_secs: i64,
    /// イベントログの最大保持件数
    pub max_events: usize,
    /// アクション実行履歴の最大保持件数
    pub max_action_history: usize,
    /// 減衰スイープの間隔（秒）
    pub decay_interval_secs: u64,
    /// 保持期限スイープの間隔（秒）
    pub retention_interval_secs: u64,
    /// サマリーレポートの間隔（秒）
    pub report_interval_secs: u64,
    /// アラート通知の宛先
    pub alert_recipients: Vec<String>,
    /// 既知の脅威アクターのネットワークアドレス（レピュテーション照合用）
    pub known_threat_networks: HashSet<String>,
}

impl EngineConfig {
    /// ソルトを指定して設定を作成（その他はデフォルト値）
    pub fn new(hash_salt: impl Into<String>) -> Self {
        Self {
            hash_salt: SecretString::from(hash_salt.into()),
            decay_factor: 0.999,
            risk_eviction_epsilon: 0.01,
            event_retention_secs: 24 * 60 * 60,
            incident_retention_secs: 30 * 24 * 60 * 60,
            max_events: 100_000,
            max_action_history: 10_000,
            decay_interval_secs: 60,
            retention_interval_secs: 600,
            report_interval_secs: 3600,
            alert_recipients: Vec::new(),
            known_threat_networks: HashSet::new(),
        }
    }

    /// 減衰係数を設定
    pub fn with_decay_factor(mut self, factor: f64) -> Self {
        self.decay_factor = factor;
        self
    }

    /// イベント保持期間を設定
    pub fn with_event_retention_secs(mut self, secs: i64) -> Self {
        self.event_retention_secs = secs;
        self
    }

    /// インシデント保持期間を設定
    pub fn with_incident_retention_secs(mut self, secs: i64) -> Self {
        self.incident_retention_secs = secs;
        self
    }

    /// アラート宛先を設定
    pub fn with_alert_recipients(mut self, recipients: Vec<String>) -> Self {
        self.alert_recipients = recipients;
        self
    }

    /// 既知の脅威アクターを追加
    pub fn with_known_threat_network(mut self, address: impl Into<String>) -> Self {
        self.known_threat_networks.insert(address.into());
        self
    }

    /// 設定値を検証
    pub fn validate(&self) -> Result<()> {
        if !(self.decay_factor > 0.0 && self.decay_factor < 1.0) {
            return Err(Error::Configuration(format!(
                "decay_factor must be in (0, 1), got {}",
                self.decay_factor
            )));
        }
        if self.event_retention_secs <= 0 {
            return Err(Error::Configuration(
                "event_retention_secs must be positive".to_string(),
            ));
        }
        if self.incident_retention_secs <= 0 {
            return Err(Error::Configuration(
                "incident_retention_secs must be positive".to_string(),
            ));
        }
        if self.max_events == 0 {
            return Err(Error::Configuration(
                "max_events must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
