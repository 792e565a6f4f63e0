//! composeドキュメントの検証
//!
//! 構文的には正しいドキュメントに対して、意味的・セキュリティ的なルールを適用します。
//! 違反は1件ずつ例外にせず、すべてを `ValidationReport` に蓄積して返します。

use crate::model::{ComposeDocument, DEFAULT_NETWORK, ServiceDefinition};
use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::debug;

/// サポートするcomposeファイルのバージョン
const SUPPORTED_VERSIONS: &[&str] = &[
    "3", "3.0", "3.1", "3.2", "3.3", "3.4", "3.5", "3.6", "3.7", "3.8", "3.9",
];

/// サポート対象だが古いバージョン
const OLD_VERSIONS: &[&str] = &["3.0", "3.1", "3.2"];

/// 非推奨だが受け付けるバージョン
const DEPRECATED_VERSIONS: &[&str] = &["2", "2.0", "2.1", "2.2", "2.3", "2.4"];

/// Dockerデーモンやオーバーレイネットワークが使うポート
const DOCKER_RESERVED_PORTS: &[u16] = &[2375, 2376, 2377, 4789, 7946];

/// 値を平文で書くべきでない環境変数名のパターン
const SENSITIVE_ENV_PATTERNS: &[&str] = &[
    "PASSWORD",
    "SECRET",
    "KEY",
    "TOKEN",
    "API_KEY",
    "PRIVATE_KEY",
    "DATABASE_URL",
    "DB_PASSWORD",
    "REDIS_PASSWORD",
    "JWT_SECRET",
];

/// 汎用ベースイメージ
const GENERIC_BASE_IMAGES: &[&str] = &[
    "alpine:latest",
    "ubuntu:latest",
    "centos:latest",
    "debian:latest",
];

/// マウント元として注意が必要なホストパス
const SENSITIVE_HOST_PATHS: &[&str] = &["/etc", "/var/run", "/sys", "/proc", "/dev"];

const DOCKER_SOCKET: &str = "/var/run/docker.sock";

const VALID_MOUNT_OPTIONS: &[&str] = &[
    "ro",
    "rw",
    "z",
    "Z",
    "consistent",
    "cached",
    "delegated",
    "nocopy",
];

const SYSTEM_ENV_VARS: &[&str] = &["PATH", "HOME", "USER"];

const MAX_IMAGE_LENGTH: usize = 255;

static SERVICE_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_-]{0,62}$").unwrap());

static IMAGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:[a-zA-Z0-9.-]+(?::[0-9]+)?/)?[a-zA-Z0-9._/-]+(?::[a-zA-Z0-9._-]+)?(?:@sha256:[a-fA-F0-9]{64})?$",
    )
    .unwrap()
});

static ENV_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());

/// 検証結果
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn error(&mut self, message: String) {
        self.errors.push(message);
    }

    fn warn(&mut self, message: String) {
        self.warnings.push(message);
    }
}

/// composeドキュメントのバリデーター
#[derive(Debug, Clone, Default)]
pub struct DocumentValidator {
    /// ビルドコンテキストを解決する基準ディレクトリ（未指定ならチェックしない）
    base_dir: Option<PathBuf>,
}

impl DocumentValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// ビルドコンテキストの存在チェックを有効にする
    pub fn with_base_dir(mut self, base_dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(base_dir.into());
        self
    }

    /// ドキュメント全体を検証
    pub fn validate(&self, doc: &ComposeDocument) -> ValidationReport {
        let mut report = ValidationReport::default();

        validate_version(&doc.version, &mut report);
        for (name, service) in &doc.services {
            self.validate_service(name, service, &mut report);
        }
        validate_dependencies(doc, &mut report);
        validate_ports(doc, &mut report);
        for (name, service) in &doc.services {
            for mount in &service.volumes {
                validate_volume_mount(name, mount, &mut report);
            }
        }
        validate_networks(doc, &mut report);
        for (name, service) in &doc.services {
            validate_security(name, service, &mut report);
        }

        debug!(
            errors = report.errors.len(),
            warnings = report.warnings.len(),
            "Document validation finished"
        );
        report
    }

    fn validate_service(&self, name: &str, service: &ServiceDefinition, report: &mut ValidationReport) {
        if !SERVICE_NAME_RE.is_match(name) {
            report.error(format!("サービス名が不正です: {}", name));
        }

        match (&service.image, &service.build) {
            (None, None) => report.error(format!("サービス {}: image または build が必要です", name)),
            (Some(_), Some(_)) => report.warn(format!(
                "サービス {}: image と build が両方指定されています（build が優先されます）",
                name
            )),
            _ => {}
        }

        if let Some(image) = &service.image {
            validate_image(name, image, report);
        }

        if let (Some(build), Some(base_dir)) = (&service.build, &self.base_dir) {
            validate_build(name, build, base_dir, report);
        }

        for env_name in service.environment.keys() {
            if !ENV_NAME_RE.is_match(env_name) {
                report.error(format!("サービス {}: 環境変数名が不正です {}", name, env_name));
            }
            if SYSTEM_ENV_VARS.contains(&env_name.as_str()) {
                report.warn(format!(
                    "サービス {}: システム変数 {} を上書きしています",
                    name, env_name
                ));
            }
        }

        if service.restart_policy().is_none() {
            report.error(format!(
                "サービス {}: 再起動ポリシーが不正です {}",
                name,
                service.restart.as_deref().unwrap_or_default()
            ));
        }
    }
}

/// デフォルト設定でドキュメントを検証
pub fn validate_document(doc: &ComposeDocument) -> ValidationReport {
    DocumentValidator::default().validate(doc)
}

fn validate_version(version: &str, report: &mut ValidationReport) {
    if DEPRECATED_VERSIONS.contains(&version) {
        report.warn(format!("非推奨のcomposeバージョンです: {}", version));
        return;
    }
    if !SUPPORTED_VERSIONS.contains(&version) {
        report.error(format!("サポートされていないcomposeバージョンです: {}", version));
        return;
    }
    if OLD_VERSIONS.contains(&version) {
        report.warn(format!(
            "composeバージョン {} は古いため、更新を検討してください",
            version
        ));
    }
}

fn validate_image(service_name: &str, image: &str, report: &mut ValidationReport) {
    if !IMAGE_RE.is_match(image) {
        report.error(format!(
            "サービス {}: イメージ指定の形式が不正です {}",
            service_name, image
        ));
    }
    if image.len() > MAX_IMAGE_LENGTH {
        report.error(format!("サービス {}: イメージ名が長すぎます", service_name));
    }
}

fn validate_build(
    service_name: &str,
    build: &serde_yaml::Value,
    base_dir: &Path,
    report: &mut ValidationReport,
) {
    let (context, dockerfile) = match build {
        serde_yaml::Value::String(context) => (context.as_str(), None),
        serde_yaml::Value::Mapping(map) => (
            map.get("context").and_then(|c| c.as_str()).unwrap_or("."),
            map.get("dockerfile").and_then(|d| d.as_str()),
        ),
        _ => return,
    };

    let context_path = base_dir.join(context);
    if !context_path.exists() {
        report.warn(format!(
            "サービス {}: ビルドコンテキスト {} が見つかりません",
            service_name, context
        ));
        return;
    }
    if let Some(dockerfile) = dockerfile {
        if !context_path.join(dockerfile).exists() {
            report.warn(format!(
                "サービス {}: Dockerfile {} が見つかりません",
                service_name, dockerfile
            ));
        }
    }
}

/// depends_on の参照先が存在するか
///
/// 循環の有無は依存グラフ側で報告するため、ここでは扱わない。
fn validate_dependencies(doc: &ComposeDocument, report: &mut ValidationReport) {
    for (name, service) in &doc.services {
        for dependency in &service.depends_on {
            if !doc.services.contains_key(dependency) {
                report.error(format!(
                    "サービス {}: 存在しないサービス {} に依存しています",
                    name, dependency
                ));
            }
        }
    }
}

fn validate_ports(doc: &ComposeDocument, report: &mut ValidationReport) {
    let mut used: HashSet<u16> = HashSet::new();
    for (name, service) in &doc.services {
        for mapping in &service.ports {
            let Some(host_port) = extract_host_port(mapping) else {
                continue;
            };
            if (1..=1023).contains(&host_port) {
                report.warn(format!(
                    "サービス {}: システム予約ポート {} を使用しています",
                    name, host_port
                ));
            }
            if DOCKER_RESERVED_PORTS.contains(&host_port) {
                report.error(format!(
                    "サービス {}: Docker予約ポート {} は使用できません",
                    name, host_port
                ));
            }
            if !used.insert(host_port) {
                report.error(format!(
                    "サービス {}: ポート {} は既に使用されています",
                    name, host_port
                ));
            }
        }
    }
}

/// ポートマッピングからホスト側のポートを取り出す
///
/// `"8080"`, `"8080:80"`, `"127.0.0.1:8080:80"` の形式に対応する。
/// 範囲指定など数値として読めない場合は `None`。
pub fn extract_host_port(mapping: &str) -> Option<u16> {
    let mapping = mapping.split('/').next().unwrap_or(mapping);
    let parts: Vec<&str> = mapping.split(':').collect();
    let host = match parts.as_slice() {
        [single] => *single,
        [host, _] => *host,
        [_, host, _] => *host,
        _ => return None,
    };
    host.parse().ok()
}

fn validate_volume_mount(service_name: &str, mount: &str, report: &mut ValidationReport) {
    let parts: Vec<&str> = mount.split(':').collect();
    if parts.len() < 2 {
        // 匿名ボリューム
        return;
    }

    let source = parts[0];
    let target = parts[1];

    if !target.starts_with('/') {
        report.error(format!(
            "サービス {}: マウント先のパスが不正です {}",
            service_name, target
        ));
    }

    if source.starts_with('/') && SENSITIVE_HOST_PATHS.iter().any(|p| source.starts_with(p)) {
        report.warn(format!(
            "サービス {}: センシティブなホストパスをマウントしています {}",
            service_name, source
        ));
    }

    if source == DOCKER_SOCKET {
        report.warn(format!(
            "サービス {}: Dockerソケットをマウントしています（特権アクセス）",
            service_name
        ));
    }

    if let Some(options) = parts.get(2) {
        for option in options.split(',') {
            if !VALID_MOUNT_OPTIONS.contains(&option) {
                report.warn(format!(
                    "サービス {}: 不明なボリュームオプションです {}",
                    service_name, option
                ));
            }
        }
    }
}

fn validate_networks(doc: &ComposeDocument, report: &mut ValidationReport) {
    let used: BTreeSet<&str> = doc
        .services
        .values()
        .flat_map(|s| s.networks.iter().map(String::as_str))
        .collect();

    for network in used {
        if network != DEFAULT_NETWORK && !doc.networks.contains_key(network) {
            report.error(format!("ネットワーク {} が使用されていますが定義されていません", network));
        }
    }
}

fn validate_security(name: &str, service: &ServiceDefinition, report: &mut ValidationReport) {
    if let Some(image) = &service.image {
        if image.ends_with(":latest") {
            report.warn(format!(
                "サービス {}: 本番環境では 'latest' タグを避けてください",
                name
            ));
        }
        if GENERIC_BASE_IMAGES.contains(&image.as_str()) {
            report.warn(format!("サービス {}: 汎用ベースイメージ {} を使用しています", name, image));
        }
    }

    for (env_name, value) in &service.environment {
        let upper = env_name.to_uppercase();
        let sensitive = SENSITIVE_ENV_PATTERNS.iter().any(|p| upper.contains(p));
        if sensitive && !value.is_empty() && !value.starts_with('$') {
            report.warn(format!(
                "サービス {}: センシティブな変数 {} が平文で指定されています",
                name, env_name
            ));
        }
    }

    if matches!(service.user.as_deref(), Some("root") | Some("0")) {
        report.warn(format!("サービス {}: root ユーザーで実行されます", name));
    }
}
