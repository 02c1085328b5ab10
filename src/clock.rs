//! Clock Abstraction
//!
//! エンジン全体で使用する時刻取得の抽象化。
//! テストでは仮想時刻を進めることで、スリープなしで
//! 時間窓・減衰・保持期限の動作を検証できます。

use chrono::{DateTime, Duration, Utc};
use std::sync::Mutex;

/// 時刻ソース
pub trait Clock: Send + Sync {
    /// 現在時刻を取得
    fn now(&self) -> DateTime<Utc>;
}

/// システム時刻
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// 手動で進める仮想時刻（テスト用）
#[derive(Debug)]
pub struct ManualClock {
    current: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// 指定時刻から開始する仮想時計を作成
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            current: Mutex::new(start),
        }
    }

    /// 時刻を指定量だけ進める
    pub fn advance(&self, duration: Duration) {
        let mut current = self.current.lock().expect("clock lock poisoned");
        *current += duration;
    }

    /// 時刻を直接設定
    pub fn set(&self, time: DateTime<Utc>) {
        let mut current = self.current.lock().expect("clock lock poisoned");
        *current = time;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.current.lock().expect("clock lock poisoned")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advance() {
        let start = Utc::now();
        let clock = ManualClock::new(start);
        assert_eq!(clock.now(), start);

        clock.advance(Duration::minutes(5));
        assert_eq!(clock.now(), start + Duration::minutes(5));
    }

    #[test]
    fn test_manual_clock_set() {
        let start = Utc::now();
        let clock = ManualClock::new(start);

        let later = start + Duration::hours(2);
        clock.set(later);
        assert_eq!(clock.now(), later);
    }
}
