//! composeコマンドの呼び出し
//!
//! `docker compose`（プラグイン形式）と `docker-compose`（単体コマンド）の
//! どちらかを使います。どちらが使えるかはインスタンスごとに一度だけ調べます。

use crate::error::{ContainerError, Result};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

/// composeコマンド1回あたりのタイムアウト
pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// コマンドの存在確認のタイムアウト
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// コマンドの実行結果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// 終了コード0の出力
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// 失敗した出力
    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }
}

/// composeランタイムのトレイト
///
/// `dir` はcomposeファイルと .env を置いたスタックのディレクトリ。
/// 0以外の終了コードはエラーではなく `CommandOutput::success == false` で返す。
#[allow(async_fn_in_trait)]
pub trait ComposeRuntime {
    async fn run(&self, dir: &Path, args: &[&str]) -> Result<CommandOutput>;
}

/// composeコマンドの呼び出し形式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComposeCommand {
    /// `docker compose ...`
    Plugin,
    /// `docker-compose ...`
    Standalone,
}

impl ComposeCommand {
    pub fn program(&self) -> &'static str {
        match self {
            Self::Plugin => "docker",
            Self::Standalone => "docker-compose",
        }
    }

    pub fn base_args(&self) -> &'static [&'static str] {
        match self {
            Self::Plugin => &["compose"],
            Self::Standalone => &[],
        }
    }
}

impl std::fmt::Display for ComposeCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Plugin => f.write_str("docker compose"),
            Self::Standalone => f.write_str("docker-compose"),
        }
    }
}

/// composeコマンドラインツールを使うランタイム
#[derive(Debug)]
pub struct ComposeCli {
    command: OnceCell<ComposeCommand>,
    timeout: Duration,
}

impl Default for ComposeCli {
    fn default() -> Self {
        Self::new()
    }
}

impl ComposeCli {
    /// 初回の呼び出し時にコマンドを自動検出する
    pub fn new() -> Self {
        Self {
            command: OnceCell::new(),
            timeout: COMMAND_TIMEOUT,
        }
    }

    /// 呼び出し形式を固定する
    pub fn with_command(command: ComposeCommand) -> Self {
        Self {
            command: OnceCell::new_with(Some(command)),
            timeout: COMMAND_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// 使用するコマンド（初回のみ検出）
    pub async fn command(&self) -> ComposeCommand {
        *self.command.get_or_init(detect_compose_command).await
    }
}

impl ComposeRuntime for ComposeCli {
    async fn run(&self, dir: &Path, args: &[&str]) -> Result<CommandOutput> {
        let command = self.command().await;
        let mut full_args: Vec<&str> = command.base_args().to_vec();
        full_args.extend_from_slice(args);
        run_with_timeout(command.program(), &full_args, dir, self.timeout).await
    }
}

/// 利用可能なcomposeコマンドを検出
///
/// プラグイン形式を優先し、どちらも見つからなければプラグイン形式を仮定する。
async fn detect_compose_command() -> ComposeCommand {
    let cwd = std::env::temp_dir();
    for (command, args) in [
        (ComposeCommand::Plugin, &["compose", "version"][..]),
        (ComposeCommand::Standalone, &["--version"][..]),
    ] {
        match run_with_timeout(command.program(), args, &cwd, PROBE_TIMEOUT).await {
            Ok(output) if output.success => {
                info!(command = %command, "Detected compose command");
                return command;
            }
            Ok(output) => debug!(command = %command, code = ?output.code, "Compose command detection failed"),
            Err(e) => debug!(command = %command, error = %e, "Compose command not available"),
        }
    }

    warn!("No compose command detected, falling back to docker compose");
    ComposeCommand::Plugin
}

/// コマンドをタイムアウト付きで実行し、stdout/stderr を取得する
///
/// タイムアウトした場合、子プロセスは終了させる。
pub async fn run_with_timeout(
    program: &str,
    args: &[&str],
    dir: &Path,
    timeout: Duration,
) -> Result<CommandOutput> {
    let command_line = format!("{} {}", program, args.join(" "));
    debug!(command = %command_line, dir = %dir.display(), "Running command");

    let mut cmd = Command::new(program);
    cmd.args(args)
        .current_dir(dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let output = match tokio::time::timeout(timeout, cmd.output()).await {
        Err(_) => {
            warn!(command = %command_line, timeout_secs = timeout.as_secs(), "Command timed out");
            return Err(ContainerError::CommandTimeout {
                command: command_line,
                timeout_secs: timeout.as_secs(),
            });
        }
        Ok(Err(source)) => {
            return Err(ContainerError::CommandSpawn {
                command: command_line,
                source,
            });
        }
        Ok(Ok(output)) => output,
    };

    Ok(CommandOutput {
        success: output.status.success(),
        code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compose_command_forms() {
        assert_eq!(ComposeCommand::Plugin.program(), "docker");
        assert_eq!(ComposeCommand::Plugin.base_args(), &["compose"]);
        assert_eq!(ComposeCommand::Standalone.program(), "docker-compose");
        assert!(ComposeCommand::Standalone.base_args().is_empty());
        assert_eq!(ComposeCommand::Plugin.to_string(), "docker compose");
    }

    #[tokio::test]
    async fn test_fixed_command_skips_detection() {
        let cli = ComposeCli::with_command(ComposeCommand::Standalone);
        assert_eq!(cli.command().await, ComposeCommand::Standalone);
    }

    #[tokio::test]
    async fn test_spawn_failure() {
        let dir = std::env::temp_dir();
        let result = run_with_timeout(
            "stackflow-definitely-missing-binary",
            &[],
            &dir,
            Duration::from_secs(5),
        )
        .await;
        assert!(matches!(result, Err(ContainerError::CommandSpawn { .. })));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_captures_output_and_exit_code() {
        let dir = std::env::temp_dir();

        let output = run_with_timeout("sh", &["-c", "echo hello"], &dir, Duration::from_secs(5))
            .await
            .unwrap();
        assert!(output.success);
        assert_eq!(output.stdout.trim(), "hello");

        let output = run_with_timeout(
            "sh",
            &["-c", "echo broken >&2; exit 3"],
            &dir,
            Duration::from_secs(5),
        )
        .await
        .unwrap();
        assert!(!output.success);
        assert_eq!(output.code, Some(3));
        assert_eq!(output.stderr.trim(), "broken");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout() {
        let dir = std::env::temp_dir();
        let result = run_with_timeout("sleep", &["5"], &dir, Duration::from_millis(100)).await;
        assert!(matches!(result, Err(ContainerError::CommandTimeout { .. })));
    }
}
