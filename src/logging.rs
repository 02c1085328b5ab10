//! Logging Setup
//!
//! tracing ベースのログシステム初期化。コンソール出力と
//! 日次ローテーションのファイル出力に対応します。

use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

/// ログ設定
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// ログレベル (trace, debug, info, warn, error)
    pub level: String,
    /// ログディレクトリ
    pub log_dir: PathBuf,
    /// コンソール出力有効
    pub console_enabled: bool,
    /// ファイル出力有効
    pub file_enabled: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_dir: PathBuf::from("logs"),
            console_enabled: true,
            file_enabled: false,
        }
    }
}

impl LogConfig {
    /// ログレベルを設定
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    /// カスタムログディレクトリを設定
    pub fn with_log_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.log_dir = dir.into();
        self
    }

    /// ファイル出力制御
    pub fn with_file(mut self, enabled: bool) -> Self {
        self.file_enabled = enabled;
        self
    }

    /// コンソール出力制御
    pub fn with_console(mut self, enabled: bool) -> Self {
        self.console_enabled = enabled;
        self
    }
}

/// ログディレクトリを確保
fn ensure_log_dir(dir: &Path) -> Result<()> {
    if !dir.exists() {
        fs::create_dir_all(dir)?;
    }
    Ok(())
}

/// ログシステムを初期化
///
/// 返却されるガードはファイル出力のフラッシュに必要なため、
/// プロセス終了まで保持してください。
pub fn init_logging(config: &LogConfig) -> Result<Option<non_blocking::WorkerGuard>> {
    let env_filter = EnvFilter::try_new(&config.level).unwrap_or_else(|_| EnvFilter::new("info"));

    match (config.console_enabled, config.file_enabled) {
        (true, true) => {
            ensure_log_dir(&config.log_dir)?;
            let file_appender = rolling::daily(&config.log_dir, "secwatch.log");
            let (file_writer, guard) = non_blocking(file_appender);

            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr.and(file_writer))
                .with_target(true)
                .init();

            tracing::info!("Logging initialized: console + file ({})", config.log_dir.display());
            Ok(Some(guard))
        }
        (false, true) => {
            ensure_log_dir(&config.log_dir)?;
            let file_appender = rolling::daily(&config.log_dir, "secwatch.log");
            let (file_writer, guard) = non_blocking(file_appender);

            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_writer(file_writer)
                .with_ansi(false)
                .with_target(true)
                .init();

            Ok(Some(guard))
        }
        (true, false) => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(true)
                .init();

            tracing::info!("Logging initialized: console only");
            Ok(None)
        }
        (false, false) => {
            // 最低限の警告出力のみ
            tracing_subscriber::fmt()
                .with_max_level(tracing::Level::WARN)
                .init();
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_log_config_default() {
        let config = LogConfig::default();
        assert_eq!(config.level, "info");
        assert!(config.console_enabled);
        assert!(!config.file_enabled);
    }

    #[test]
    fn test_log_config_builders() {
        let config = LogConfig::default()
            .with_level("debug")
            .with_file(true)
            .with_console(false);
        assert_eq!(config.level, "debug");
        assert!(config.file_enabled);
        assert!(!config.console_enabled);
    }

    #[test]
    fn test_ensure_log_dir() {
        let temp_dir = tempdir().unwrap();
        let log_dir = temp_dir.path().join("test_logs");

        assert!(ensure_log_dir(&log_dir).is_ok());
        assert!(log_dir.exists());
    }
}
