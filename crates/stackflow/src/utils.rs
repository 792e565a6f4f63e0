use colored::Colorize;
use serde::Serialize;
use stackflow_container::{ComposeCli, DeploymentOrchestrator};
use stackflow_core::ValidationReport;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// 出力形式
pub struct Output {
    pub json: bool,
}

impl Output {
    /// JSONとして標準出力に書き出す
    pub fn print_json<T: Serialize>(&self, value: &T) -> anyhow::Result<()> {
        println!("{}", serde_json::to_string_pretty(value)?);
        Ok(())
    }
}

/// ログフィルタを組み立てる
///
/// `RUST_LOG` が設定されていればそれを優先し、未設定の場合のみ
/// `--verbose` に応じて debug / info を使う。
pub fn log_filter(verbose: bool) -> EnvFilter {
    let default = if verbose { "debug" } else { "info" };
    std::env::var(EnvFilter::DEFAULT_ENV)
        .ok()
        .filter(|directives| !directives.trim().is_empty())
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(default))
}

/// `KEY=VALUE` 形式の引数を分解する
pub fn parse_key_value(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("KEY=VALUE 形式で指定してください: {}", s))?;
    if key.is_empty() {
        return Err(format!("変数名が空です: {}", s));
    }
    Ok((key.to_string(), value.to_string()))
}

/// 使用するcomposeファイルを決定する
pub fn resolve_compose_path(file: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    match file {
        Some(path) => Ok(path),
        None => Ok(stackflow_config::find_compose_file()?),
    }
}

/// 作業ディレクトリの状態を復元したオーケストレーターを作る
pub async fn open_orchestrator(work_dir: &Path) -> DeploymentOrchestrator<ComposeCli> {
    let mut orchestrator = DeploymentOrchestrator::new(ComposeCli::new(), work_dir);
    let report = orchestrator.reconcile().await;
    tracing::debug!(
        restored = report.restored.len(),
        dropped = report.dropped.len(),
        "Registry reconciled"
    );
    orchestrator
}

/// 検証結果のエラーと警告を表示
pub fn print_validation_report(report: &ValidationReport) {
    for error in &report.errors {
        println!("  {} {}", "✗".red(), error);
    }
    for warning in &report.warnings {
        println!("  {} {}", "⚠".yellow(), warning);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_parse_key_value() {
        assert_eq!(
            parse_key_value("DB_HOST=db").unwrap(),
            ("DB_HOST".to_string(), "db".to_string())
        );
        // 値に = を含められる
        assert_eq!(
            parse_key_value("URL=postgres://u:p@db/app?ssl=true").unwrap().1,
            "postgres://u:p@db/app?ssl=true"
        );
        assert_eq!(parse_key_value("EMPTY=").unwrap().1, "");
        assert!(parse_key_value("NOVALUE").is_err());
        assert!(parse_key_value("=value").is_err());
    }

    #[test]
    #[serial]
    fn test_log_filter_prefers_rust_log() {
        temp_env::with_vars(vec![("RUST_LOG", Some("stackflow_core=trace"))], || {
            assert_eq!(log_filter(false).to_string(), "stackflow_core=trace");
            assert_eq!(log_filter(true).to_string(), "stackflow_core=trace");
        });
    }

    #[test]
    #[serial]
    fn test_log_filter_falls_back_to_verbose_flag() {
        temp_env::with_vars(vec![("RUST_LOG", None::<&str>)], || {
            assert_eq!(log_filter(false).to_string(), "info");
            assert_eq!(log_filter(true).to_string(), "debug");
        });
        temp_env::with_vars(vec![("RUST_LOG", Some(""))], || {
            assert_eq!(log_filter(false).to_string(), "info");
        });
    }
}
