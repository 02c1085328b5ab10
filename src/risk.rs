//! Risk Ledger
//!
//! アクター単位の累積リスクスコア。イベント発生時に加算され、
//! ハウスキーピングの減衰スイープで乗算的にゼロへ漸近します。
//! スコアを増やせる操作は `bump` のみです。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// イベント1件あたりの加算係数（単一イベントでの飽和を防ぐ）
const BUMP_FRACTION: f64 = 0.1;

/// アクター単位のリスク記録
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskRecord {
    /// 現在のスコア（0-100にクランプ）
    pub score: f64,
    /// 最終更新時刻
    pub last_updated: DateTime<Utc>,
}

/// リスク台帳
#[derive(Debug)]
pub struct RiskLedger {
    records: HashMap<String, RiskRecord>,
    decay_factor: f64,
    eviction_epsilon: f64,
}

impl RiskLedger {
    /// 新しいリスク台帳を作成
    ///
    /// `decay_factor` は (0, 1) であることを呼び出し側
    /// （`EngineConfig::validate`）が保証します。
    pub fn new(decay_factor: f64, eviction_epsilon: f64) -> Self {
        Self {
            records: HashMap::new(),
            decay_factor,
            eviction_epsilon,
        }
    }

    /// スコアを加算して新しい値を返す
    pub fn bump(&mut self, actor_hash: &str, delta: f64, now: DateTime<Utc>) -> f64 {
        let record = self.records.entry(actor_hash.to_string()).or_insert(RiskRecord {
            score: 0.0,
            last_updated: now,
        });
        record.score = (record.score + delta * BUMP_FRACTION).clamp(0.0, 100.0);
        record.last_updated = now;
        record.score
    }

    /// 現在のスコアを取得（未登録のアクターは0）
    pub fn get(&self, actor_hash: &str) -> f64 {
        self.records.get(actor_hash).map(|r| r.score).unwrap_or(0.0)
    }

    /// 全アクターに減衰を適用し、無視できるスコアのエントリを破棄
    ///
    /// 破棄したエントリ数を返します。
    pub fn decay_tick(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.records.len();

        for record in self.records.values_mut() {
            record.score *= self.decay_factor;
            record.last_updated = now;
        }

        let epsilon = self.eviction_epsilon;
        self.records.retain(|_, record| record.score >= epsilon);

        let evicted = before - self.records.len();
        if evicted > 0 {
            debug!("Risk decay evicted {} negligible entries", evicted);
        }
        evicted
    }

    /// 追跡中のアクター数
    pub fn tracked_count(&self) -> usize {
        self.records.len()
    }
}
