//! スタックのデプロイ・停止・削除・状態取得
//!
//! 1つのスタックは作業ディレクトリ配下の `<スタック名>/` に
//! 正規化済みの `docker-compose.yml` と `.env` を置いて管理します。
//!
//! 状態遷移:
//!
//! ```text
//! PENDING ──► DEPLOYING ──► RUNNING ──► STOPPED
//!                  │
//!                  └──────► FAILED
//! ```

use crate::registry::{StackRecord, StackRegistry, StackStatus};
use crate::runtime::ComposeRuntime;
use serde::{Deserialize, Serialize, Serializer};
use stackflow_core::{
    ComposeDocument, DependencyManager, EnvManager, declared_service_names, parse_compose_file,
    parse_compose_str, validate_document,
};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{error, info, instrument, warn};

/// スタックディレクトリに置くcomposeファイル名
pub const COMPOSE_FILE_NAME: &str = "docker-compose.yml";

/// スタックディレクトリに置く環境変数ファイル名
pub const ENV_FILE_NAME: &str = ".env";

/// デプロイ要求
#[derive(Debug, Clone, Default)]
pub struct DeployRequest {
    pub name: String,
    /// composeドキュメントの生のテキスト
    pub compose: String,
    pub env_vars: BTreeMap<String, String>,
    /// .env の内容（指定された場合は env_vars より優先）
    pub env_file_content: Option<String>,
    pub validate_only: bool,
}

impl DeployRequest {
    pub fn new(name: impl Into<String>, compose: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            compose: compose.into(),
            ..Default::default()
        }
    }

    pub fn with_env_vars(mut self, env_vars: BTreeMap<String, String>) -> Self {
        self.env_vars = env_vars;
        self
    }

    pub fn with_env_file_content(mut self, content: impl Into<String>) -> Self {
        self.env_file_content = Some(content.into());
        self
    }

    pub fn validate_only(mut self, validate_only: bool) -> Self {
        self.validate_only = validate_only;
        self
    }
}

/// デプロイ・停止の結果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeploymentResult {
    pub success: bool,
    pub status: StackStatus,
    pub message: String,
    pub deployed_services: Vec<String>,
    pub failed_services: Vec<String>,
    #[serde(rename = "elapsed_secs", serialize_with = "serialize_secs")]
    pub elapsed: Duration,
    pub logs: Vec<String>,
}

impl DeploymentResult {
    fn failed(
        message: impl Into<String>,
        failed_services: Vec<String>,
        logs: Vec<String>,
        started: Instant,
    ) -> Self {
        Self {
            success: false,
            status: StackStatus::Failed,
            message: message.into(),
            deployed_services: Vec::new(),
            failed_services,
            elapsed: started.elapsed(),
            logs,
        }
    }
}

fn serialize_secs<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_secs_f64())
}

/// 観測したスタックの状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObservedState {
    /// レジストリで追跡している状態
    Tracked(StackStatus),
    /// ディレクトリはあるがレジストリに記録がない
    Unknown,
    /// 作業ディレクトリが存在しない
    NotFound,
    /// ランタイムへの問い合わせに失敗した
    Error,
}

impl ObservedState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tracked(status) => status.as_str(),
            Self::Unknown => "unknown",
            Self::NotFound => "not_found",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for ObservedState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ObservedState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// `ps --format json` が返すサービスごとの状態
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceState {
    #[serde(default, alias = "Name")]
    pub name: String,
    #[serde(default, alias = "Service")]
    pub service: String,
    #[serde(default, alias = "State")]
    pub state: String,
    #[serde(default, alias = "Status")]
    pub status: String,
    #[serde(default, alias = "Image")]
    pub image: String,
    #[serde(default, alias = "Health")]
    pub health: String,
    #[serde(default, alias = "ExitCode")]
    pub exit_code: Option<i32>,
}

impl ServiceState {
    pub fn is_running(&self) -> bool {
        self.state.eq_ignore_ascii_case("running")
    }
}

/// スタックの状態レポート
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StackStatusReport {
    pub name: String,
    pub status: ObservedState,
    pub services: Vec<ServiceState>,
    /// 構造化出力を解釈できなかった場合の生の出力
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StackStatusReport {
    fn new(name: &str, status: ObservedState) -> Self {
        Self {
            name: name.to_string(),
            status,
            services: Vec::new(),
            raw_output: None,
            error: None,
        }
    }
}

/// 作業ディレクトリとレジストリの突き合わせ結果
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// ディレクトリから記録を復元したスタック
    pub restored: Vec<String>,
    /// ディレクトリがなく記録を削除したスタック
    pub dropped: Vec<String>,
}

/// デプロイオーケストレーター
///
/// 同じスタックに対する操作の直列化は呼び出し側の責任。
pub struct DeploymentOrchestrator<R: ComposeRuntime> {
    runtime: R,
    work_dir: PathBuf,
    registry: StackRegistry,
}

impl<R: ComposeRuntime> DeploymentOrchestrator<R> {
    pub fn new(runtime: R, work_dir: impl Into<PathBuf>) -> Self {
        Self::with_registry(runtime, work_dir, StackRegistry::new())
    }

    pub fn with_registry(runtime: R, work_dir: impl Into<PathBuf>, registry: StackRegistry) -> Self {
        Self {
            runtime,
            work_dir: work_dir.into(),
            registry,
        }
    }

    pub fn registry(&self) -> &StackRegistry {
        &self.registry
    }

    pub fn runtime(&self) -> &R {
        &self.runtime
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// スタックの作業ディレクトリ
    pub fn stack_dir(&self, name: &str) -> PathBuf {
        self.work_dir.join(name)
    }

    /// 既存のスタックディレクトリ（不正な名前やディレクトリがない場合は None）
    fn existing_stack_dir(&self, name: &str) -> Option<PathBuf> {
        if !is_valid_stack_name(name) {
            return None;
        }
        let dir = self.stack_dir(name);
        dir.is_dir().then_some(dir)
    }

    /// スタックをデプロイする
    ///
    /// 失敗はすべて `DeploymentResult` に記録して返す。
    #[instrument(skip_all, fields(stack = %request.name, validate_only = request.validate_only))]
    pub async fn deploy(&mut self, request: DeployRequest) -> DeploymentResult {
        let started = Instant::now();
        let mut logs = Vec::new();
        let name = request.name.as_str();

        let doc = match parse_compose_str(&request.compose) {
            Ok(doc) => doc,
            Err(e) => {
                warn!(error = %e, "Compose document rejected");
                logs.push(e.to_string());
                return DeploymentResult::failed(
                    e.to_string(),
                    declared_service_names(&request.compose),
                    logs,
                    started,
                );
            }
        };
        let services = doc.service_names();

        if !is_valid_stack_name(name) {
            return DeploymentResult::failed(
                format!("スタック名が不正です: {}", name),
                services,
                logs,
                started,
            );
        }

        let report = validate_document(&doc);
        for warning in &report.warnings {
            warn!(warning = %warning, "Validation warning");
            logs.push(format!("警告: {}", warning));
        }
        if !report.is_valid() {
            logs.extend(report.errors.iter().map(|e| format!("エラー: {}", e)));
            return DeploymentResult::failed(
                format!("検証エラーが {} 件あります", report.errors.len()),
                services,
                logs,
                started,
            );
        }

        let manager = DependencyManager::analyze(&doc);
        let graph_errors = manager.structural_errors();
        if !graph_errors.is_empty() {
            let message = graph_errors.join("\n");
            logs.extend(graph_errors);
            return DeploymentResult::failed(message, services, logs, started);
        }

        if request.validate_only {
            info!(services = services.len(), "Validation passed");
            return DeploymentResult {
                success: true,
                status: StackStatus::Pending,
                message: "検証に成功しました".to_string(),
                deployed_services: Vec::new(),
                failed_services: Vec::new(),
                elapsed: started.elapsed(),
                logs,
            };
        }

        self.registry.begin_deploy(name, services.clone());

        let dir = self.stack_dir(name);
        if let Err(e) = materialize(&dir, name, &doc, &request) {
            error!(error = %e, "Failed to prepare stack directory");
            self.registry.set_status(name, StackStatus::Failed);
            logs.push(e.to_string());
            return DeploymentResult::failed(
                format!("スタックディレクトリの準備に失敗しました: {}", e),
                services,
                logs,
                started,
            );
        }

        let groups = manager.optimize_startup_order();
        let mut deployed = Vec::new();
        let mut failed = Vec::new();

        for (index, group) in groups.iter().enumerate() {
            info!(group = index + 1, services = ?group, "Starting service group");

            let mut args = vec!["up", "-d", "--no-build"];
            args.extend(group.iter().map(String::as_str));

            match self.runtime.run(&dir, &args).await {
                Ok(output) => {
                    push_output(&mut logs, &output.stdout);
                    push_output(&mut logs, &output.stderr);
                    if output.success {
                        deployed.extend(group.iter().cloned());
                    } else {
                        warn!(group = index + 1, code = ?output.code, "Service group failed");
                        failed.extend(group.iter().cloned());
                        break;
                    }
                }
                Err(e) => {
                    warn!(group = index + 1, error = %e, "Service group failed");
                    logs.push(e.to_string());
                    failed.extend(group.iter().cloned());
                    break;
                }
            }
        }

        let success = failed.is_empty();
        let status = if success {
            StackStatus::Running
        } else {
            StackStatus::Failed
        };
        self.registry.set_status(name, status);

        let message = if success {
            format!("{} 個のサービスをデプロイしました", deployed.len())
        } else {
            format!(
                "デプロイに失敗しました（成功: {}, 失敗: {}）",
                deployed.len(),
                failed.len()
            )
        };

        info!(
            deployed = deployed.len(),
            failed = failed.len(),
            status = %status,
            "Deployment finished"
        );

        DeploymentResult {
            success,
            status,
            message,
            deployed_services: deployed,
            failed_services: failed,
            elapsed: started.elapsed(),
            logs,
        }
    }

    /// スタックを停止する
    ///
    /// 失敗した場合、レジストリの状態は変更しない。
    #[instrument(skip(self))]
    pub async fn stop(&mut self, name: &str) -> DeploymentResult {
        let started = Instant::now();

        let Some(dir) = self.existing_stack_dir(name) else {
            let message = crate::ContainerError::StackNotFound(name.to_string()).to_string();
            return DeploymentResult::failed(message, Vec::new(), Vec::new(), started);
        };

        let mut logs = Vec::new();
        match self.runtime.run(&dir, &["down", "--remove-orphans"]).await {
            Ok(output) if output.success => {
                push_output(&mut logs, &output.stdout);
                push_output(&mut logs, &output.stderr);
                self.registry.set_status(name, StackStatus::Stopped);
                info!("Stack stopped");
                DeploymentResult {
                    success: true,
                    status: StackStatus::Stopped,
                    message: format!("スタック {} を停止しました", name),
                    deployed_services: Vec::new(),
                    failed_services: Vec::new(),
                    elapsed: started.elapsed(),
                    logs,
                }
            }
            Ok(output) => {
                warn!(code = ?output.code, "Failed to stop stack");
                push_output(&mut logs, &output.stderr);
                DeploymentResult::failed(
                    format!("スタック {} の停止に失敗しました", name),
                    Vec::new(),
                    logs,
                    started,
                )
            }
            Err(e) => {
                warn!(error = %e, "Failed to stop stack");
                logs.push(e.to_string());
                DeploymentResult::failed(
                    format!("スタック {} の停止に失敗しました", name),
                    Vec::new(),
                    logs,
                    started,
                )
            }
        }
    }

    /// スタックを削除する
    ///
    /// 既に存在しない場合も true を返す。
    #[instrument(skip(self))]
    pub async fn remove(&mut self, name: &str, remove_volumes: bool) -> bool {
        let Some(dir) = self.existing_stack_dir(name) else {
            self.registry.remove(name);
            return true;
        };

        let stopped = self.stop(name).await;
        if !stopped.success {
            warn!(message = %stopped.message, "Continuing removal after failed stop");
        }

        if remove_volumes {
            match self.runtime.run(&dir, &["down", "-v"]).await {
                Ok(output) if output.success => {}
                Ok(output) => warn!(stderr = %output.stderr.trim(), "Failed to remove volumes"),
                Err(e) => warn!(error = %e, "Failed to remove volumes"),
            }
        }

        if let Err(e) = fs::remove_dir_all(&dir) {
            error!(error = %e, dir = %dir.display(), "Failed to remove stack directory");
            return false;
        }

        self.registry.remove(name);
        info!("Stack removed");
        true
    }

    /// スタックの状態を取得する
    #[instrument(skip(self))]
    pub async fn status(&self, name: &str) -> StackStatusReport {
        let Some(dir) = self.existing_stack_dir(name) else {
            return StackStatusReport::new(name, ObservedState::NotFound);
        };

        let tracked = self
            .registry
            .get(name)
            .map(|r| ObservedState::Tracked(r.status))
            .unwrap_or(ObservedState::Unknown);

        match self.runtime.run(&dir, &["ps", "--format", "json"]).await {
            Ok(output) if output.success => {
                let mut report = StackStatusReport::new(name, tracked);
                match parse_ps_output(&output.stdout) {
                    Some(services) => report.services = services,
                    None => report.raw_output = Some(output.stdout),
                }
                report
            }
            Ok(output) => {
                let mut report = StackStatusReport::new(name, ObservedState::Error);
                report.error = Some(output.stderr.trim().to_string());
                report
            }
            Err(e) => {
                let mut report = StackStatusReport::new(name, ObservedState::Error);
                report.error = Some(e.to_string());
                report
            }
        }
    }

    /// 作業ディレクトリ内のすべてのスタックの状態（名前順）
    pub async fn list(&self) -> Vec<StackStatusReport> {
        let mut reports = Vec::new();
        for name in self.stack_names() {
            reports.push(self.status(&name).await);
        }
        reports
    }

    /// レジストリを作業ディレクトリとランタイムの状態に合わせる
    ///
    /// ディレクトリがない記録は削除し、記録のないディレクトリは
    /// `ps` の結果から RUNNING / STOPPED として復元する。
    #[instrument(skip(self))]
    pub async fn reconcile(&mut self) -> ReconcileReport {
        let dropped = self.registry.reconcile_with_disk(&self.work_dir);
        let mut restored = Vec::new();

        for name in self.stack_names() {
            if self.registry.contains(&name) {
                continue;
            }

            let dir = self.stack_dir(&name);
            let services = parse_compose_file(dir.join(COMPOSE_FILE_NAME))
                .map(|doc| doc.service_names())
                .unwrap_or_default();

            let running = match self.runtime.run(&dir, &["ps", "--format", "json"]).await {
                Ok(output) if output.success => parse_ps_output(&output.stdout)
                    .map(|states| states.iter().any(ServiceState::is_running))
                    .unwrap_or(false),
                _ => false,
            };
            let status = if running {
                StackStatus::Running
            } else {
                StackStatus::Stopped
            };

            info!(stack = %name, status = %status, "Restored stack record");
            self.registry.insert(StackRecord::new(&name, status, services));
            restored.push(name);
        }

        ReconcileReport { restored, dropped }
    }

    /// 作業ディレクトリ内のスタック名（名前順）
    fn stack_names(&self) -> Vec<String> {
        let entries = match fs::read_dir(&self.work_dir) {
            Ok(entries) => entries,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(error = %e, dir = %self.work_dir.display(), "Failed to read work directory");
                }
                return Vec::new();
            }
        };

        let mut names: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_dir())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| is_valid_stack_name(name))
            .collect();
        names.sort();
        names
    }
}

/// スタック名として使えるか（ディレクトリ名・composeプロジェクト名になる）
pub fn is_valid_stack_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphanumeric() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// スタックディレクトリにcomposeファイルと .env を書き出す
///
/// .env の優先順位: 明示的な内容 > 変数のマップ > プロジェクト名のみの最小構成
fn materialize(
    dir: &Path,
    name: &str,
    doc: &ComposeDocument,
    request: &DeployRequest,
) -> crate::Result<()> {
    fs::create_dir_all(dir)?;
    fs::write(dir.join(COMPOSE_FILE_NAME), doc.to_yaml()?)?;

    let env_path = dir.join(ENV_FILE_NAME);
    if let Some(content) = &request.env_file_content {
        fs::write(&env_path, content)?;
    } else if !request.env_vars.is_empty() {
        EnvManager::create(&env_path, &request.env_vars)?;
    } else {
        fs::write(
            &env_path,
            format!(
                "# StackFlow により生成された環境変数ファイル\nCOMPOSE_PROJECT_NAME={}\n",
                name
            ),
        )?;
    }

    info!(dir = %dir.display(), "Stack directory prepared");
    Ok(())
}

/// `ps --format json` の出力を解釈する
///
/// JSON配列と1行1オブジェクトの両方に対応する。解釈できなければ `None`。
pub fn parse_ps_output(output: &str) -> Option<Vec<ServiceState>> {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        return Some(Vec::new());
    }
    if trimmed.starts_with('[') {
        return serde_json::from_str(trimmed).ok();
    }
    trimmed
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| serde_json::from_str(line).ok())
        .collect()
}

fn push_output(logs: &mut Vec<String>, output: &str) {
    let output = output.trim();
    if !output.is_empty() {
        logs.push(output.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ps_output_json_lines() {
        let output = r#"{"Name":"app-web-1","Service":"web","State":"running","Status":"Up 2 minutes","Image":"nginx:1.25"}
{"Name":"app-db-1","Service":"db","State":"exited","Status":"Exited (0)","ExitCode":0}
"#;
        let services = parse_ps_output(output).unwrap();
        assert_eq!(services.len(), 2);
        assert_eq!(services[0].service, "web");
        assert!(services[0].is_running());
        assert_eq!(services[1].exit_code, Some(0));
        assert!(!services[1].is_running());
    }

    #[test]
    fn test_parse_ps_output_array_and_garbage() {
        let output = r#"[{"Name":"app-web-1","Service":"web","State":"running"}]"#;
        assert_eq!(parse_ps_output(output).unwrap().len(), 1);

        assert_eq!(parse_ps_output("  \n").unwrap().len(), 0);
        assert!(parse_ps_output("NAME   IMAGE   STATUS").is_none());
    }

    #[test]
    fn test_stack_name_rules() {
        assert!(is_valid_stack_name("app"));
        assert!(is_valid_stack_name("my-app_2"));
        assert!(!is_valid_stack_name(""));
        assert!(!is_valid_stack_name("../etc"));
        assert!(!is_valid_stack_name("-app"));
        assert!(!is_valid_stack_name("a/b"));
    }

    #[test]
    fn test_observed_state_serialization() {
        let mut report = StackStatusReport::new("app", ObservedState::NotFound);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "not_found");
        assert!(json.get("raw_output").is_none());

        report.status = ObservedState::Tracked(StackStatus::Running);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "running");
    }

    #[test]
    fn test_deployment_result_serialization() {
        let result = DeploymentResult {
            success: true,
            status: StackStatus::Running,
            message: String::new(),
            deployed_services: vec!["web".to_string()],
            failed_services: Vec::new(),
            elapsed: Duration::from_millis(1500),
            logs: Vec::new(),
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "running");
        assert_eq!(json["elapsed_secs"], 1.5);
    }
}
