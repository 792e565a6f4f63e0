//! 環境変数ファイルの管理

use super::{EnvFile, EnvVariable, parse_env_str};
use crate::error::{Result, StackError};
use crate::validator::ValidationReport;
use regex::{Captures, Regex};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, info, instrument};

/// 名前に含まれると機密情報とみなすパターン
const SENSITIVE_PATTERNS: &[&str] = &[
    "PASSWORD",
    "SECRET",
    "KEY",
    "TOKEN",
    "API_KEY",
    "PRIVATE_KEY",
    "CREDENTIAL",
];

/// 上書きすべきでないシステム変数
const SYSTEM_VARIABLES: &[&str] = &["PATH", "HOME", "USER", "SHELL", "TERM"];

static VALID_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z][A-Z0-9_]*$").unwrap());

static WEAK_VALUE_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)^(password|secret|key|token)$",
        r"(?i)^(admin|test|demo|example)$",
        r"(?i)^(123456|password123|admin123)$",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

static BRACED_REF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").unwrap());

static BARE_REF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$([A-Z_][A-Z0-9_]*)").unwrap());

/// 値が変更された変数
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModifiedVariable {
    pub name: String,
    pub old_value: String,
    pub new_value: String,
}

/// 2つの環境変数ファイルの差分
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EnvDiff {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub modified: Vec<ModifiedVariable>,
}

impl EnvDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty()
    }
}

/// 環境変数ファイルの読み書き・検証・置換を行う
pub struct EnvManager;

impl EnvManager {
    /// ファイルを読み込む
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn load(path: impl AsRef<Path>) -> Result<EnvFile> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => StackError::EnvFileNotFound {
                path: path.to_path_buf(),
            },
            _ => StackError::IoError {
                path: path.to_path_buf(),
                message: e.to_string(),
            },
        })?;

        let env_file = parse_env_str(&content, path);
        info!(
            env_file = %path.display(),
            variable_count = env_file.len(),
            "Loaded variables from .env file"
        );
        Ok(env_file)
    }

    /// ファイルに保存する
    ///
    /// `backup` が true で保存先が既に存在する場合、`<ファイル名>.backup` に
    /// 退避してから上書きする。
    #[instrument(skip_all, fields(path = %env_file.path.display(), backup))]
    pub fn save(env_file: &EnvFile, backup: bool) -> Result<()> {
        let path = &env_file.path;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        if backup && path.exists() {
            let backup_path = backup_path(path);
            fs::copy(path, &backup_path)?;
            debug!(backup = %backup_path.display(), "Backed up existing env file");
        }

        fs::write(path, env_file.render()).map_err(|e| StackError::IoError {
            path: path.clone(),
            message: e.to_string(),
        })?;

        info!(variable_count = env_file.len(), "Saved env file");
        Ok(())
    }

    /// 変数のマップから新しいファイルを作成して保存する
    ///
    /// 名前から機密情報かどうかを自動で判定する。
    pub fn create(path: impl Into<PathBuf>, variables: &BTreeMap<String, String>) -> Result<EnvFile> {
        let mut env_file = EnvFile::new(path);
        env_file
            .comments
            .push("StackFlow により生成された環境変数ファイル".to_string());

        for (name, value) in variables {
            env_file.set(EnvVariable::new(name, value).secret(is_sensitive_name(name)));
        }

        Self::save(&env_file, false)?;
        Ok(env_file)
    }

    /// 複数のファイルをマージする（後のファイルが優先）
    pub fn merge(files: &[EnvFile]) -> EnvFile {
        let mut merged = EnvFile::new("merged.env");
        for file in files {
            for comment in &file.comments {
                if !merged.comments.contains(comment) {
                    merged.comments.push(comment.clone());
                }
            }
            for variable in file.variables() {
                merged.set(variable.clone());
            }
        }
        merged
    }

    /// ファイルの内容を検証する
    pub fn validate(env_file: &EnvFile) -> ValidationReport {
        let mut report = ValidationReport::default();

        for variable in env_file.variables() {
            let name = &variable.name;

            if !VALID_NAME_RE.is_match(name) {
                report.errors.push(format!("変数名が不正です: {}", name));
            }

            if variable.is_required && variable.value.is_empty() {
                report.errors.push(format!("必須の変数 {} が空です", name));
            }

            if SYSTEM_VARIABLES.contains(&name.as_str()) {
                report
                    .warnings
                    .push(format!("システム変数 {} を上書きしています", name));
            }

            if is_sensitive_name(name) && !variable.is_secret {
                report.warnings.push(format!(
                    "変数 {} は機密情報の可能性がありますが、secret として扱われていません",
                    name
                ));
            }

            if WEAK_VALUE_RES.iter().any(|re| re.is_match(&variable.value)) {
                report
                    .warnings
                    .push(format!("変数 {} の値が推測されやすい値です", name));
            }
        }

        report
    }

    /// テキスト中の `${NAME}` と `$NAME` を置換する
    ///
    /// ファイルの変数をプロセスの環境変数より優先する。
    /// 解決できない参照はそのまま残す。
    pub fn substitute(text: &str, env_file: &EnvFile) -> String {
        let resolve = |caps: &Captures| -> String {
            let name = &caps[1];
            env_file
                .value(name)
                .map(str::to_string)
                .or_else(|| std::env::var(name).ok())
                .unwrap_or_else(|| caps[0].to_string())
        };

        let braced = BRACED_REF_RE.replace_all(text, &resolve);
        BARE_REF_RE.replace_all(&braced, &resolve).into_owned()
    }

    /// 2つのファイルの差分を取る（機密情報の値は伏せる）
    pub fn diff(old: &EnvFile, new: &EnvFile) -> EnvDiff {
        let old_names: BTreeSet<&str> = old.variables().iter().map(|v| v.name.as_str()).collect();
        let new_names: BTreeSet<&str> = new.variables().iter().map(|v| v.name.as_str()).collect();

        let added = new_names.difference(&old_names).map(|s| s.to_string()).collect();
        let removed = old_names.difference(&new_names).map(|s| s.to_string()).collect();

        let modified = old_names
            .intersection(&new_names)
            .filter_map(|name| {
                let before = old.get(name)?;
                let after = new.get(name)?;
                (before.value != after.value).then(|| ModifiedVariable {
                    name: name.to_string(),
                    old_value: before.display_value().to_string(),
                    new_value: after.display_value().to_string(),
                })
            })
            .collect();

        EnvDiff {
            added,
            removed,
            modified,
        }
    }

    /// サービス構成に合わせたテンプレートを生成する
    pub fn generate_template<S: AsRef<str>>(service_names: &[S]) -> EnvFile {
        let mut env_file = EnvFile::new(".env");
        env_file
            .comments
            .push("StackFlow 環境変数テンプレート".to_string());

        let defaults = [
            ("COMPOSE_PROJECT_NAME", "stackflow", "composeプロジェクト名"),
            ("COMPOSE_FILE", "docker-compose.yml", "使用するcomposeファイル"),
            ("STACKFLOW_ENV", "development", "実行環境"),
            ("STACKFLOW_DEBUG", "false", "デバッグモード"),
            ("STACKFLOW_LOG_LEVEL", "info", "ログレベル"),
        ];
        for (name, value, description) in defaults {
            env_file.set(template_variable(name, value, description));
        }

        for service in service_names {
            let service = service.as_ref().to_lowercase();
            for (keywords, variables) in SERVICE_CATALOG {
                if keywords.iter().any(|k| service.contains(k)) {
                    for (name, value, description) in *variables {
                        env_file.set(template_variable(name, value, description));
                    }
                }
            }
        }

        env_file
    }
}

type CatalogEntry = (&'static [&'static str], &'static [(&'static str, &'static str, &'static str)]);

/// サービスの種類ごとに追加する変数
const SERVICE_CATALOG: &[CatalogEntry] = &[
    (
        &["postgres", "postgresql", "db"],
        &[
            ("POSTGRES_DB", "app", "データベース名"),
            ("POSTGRES_USER", "app", "データベースユーザー"),
            ("POSTGRES_PASSWORD", "change_me", "データベースパスワード"),
            ("POSTGRES_HOST", "postgres", "データベースホスト"),
            ("POSTGRES_PORT", "5432", "データベースポート"),
        ],
    ),
    (
        &["redis", "cache"],
        &[
            ("REDIS_URL", "redis://redis:6379/0", "Redis接続URL"),
            ("REDIS_PASSWORD", "", "Redisパスワード"),
        ],
    ),
    (
        &["nginx", "proxy"],
        &[
            ("NGINX_HOST", "localhost", "公開ホスト名"),
            ("NGINX_PORT", "80", "公開ポート"),
        ],
    ),
];

fn template_variable(name: &str, value: &str, description: &str) -> EnvVariable {
    EnvVariable::new(name, value)
        .with_description(description)
        .secret(is_sensitive_name(name))
}

/// 名前から機密情報かどうかを判定（大文字小文字は区別しない）
pub fn is_sensitive_name(name: &str) -> bool {
    let upper = name.to_uppercase();
    SENSITIVE_PATTERNS.iter().any(|p| upper.contains(p))
}

/// バックアップファイルのパス（`.env` なら `.env.backup`）
pub fn backup_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".backup");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    fn env_of(pairs: &[(&str, &str)]) -> EnvFile {
        let mut env = EnvFile::new(".env");
        for (name, value) in pairs {
            env.set(EnvVariable::new(*name, *value));
        }
        env
    }

    #[test]
    fn test_load_missing_file() {
        let dir = TempDir::new().unwrap();
        let result = EnvManager::load(dir.path().join(".env"));
        assert!(matches!(result, Err(StackError::EnvFileNotFound { .. })));
    }

    #[test]
    fn test_save_and_load_with_backup() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".env");
        fs::write(&path, "OLD=1\n").unwrap();

        let mut env = EnvFile::new(&path);
        env.set(EnvVariable::new("NEW", "2"));
        EnvManager::save(&env, true).unwrap();

        let backup = dir.path().join(".env.backup");
        assert_eq!(fs::read_to_string(&backup).unwrap(), "OLD=1\n");

        let loaded = EnvManager::load(&path).unwrap();
        assert_eq!(loaded.value("NEW"), Some("2"));
        assert!(loaded.get("OLD").is_none());

        // 2回目のバックアップは上書きされる
        EnvManager::save(&loaded, true).unwrap();
        let backup_text = fs::read_to_string(&backup).unwrap();
        assert!(backup_text.contains("NEW=2"));
    }

    #[test]
    fn test_save_without_backup() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join(".env");
        let mut env = env_of(&[("A", "1")]);
        env.path = path.clone();

        EnvManager::save(&env, false).unwrap();
        EnvManager::save(&env, false).unwrap();
        assert!(path.exists());
        assert!(!dir.path().join("nested").join(".env.backup").exists());
    }

    #[test]
    fn test_create_classifies_secrets() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".env");
        let vars = BTreeMap::from([
            ("APP_NAME".to_string(), "demo".to_string()),
            ("db_password".to_string(), "s3cret".to_string()),
            ("AWS_CREDENTIALS".to_string(), "x".to_string()),
        ]);

        let env = EnvManager::create(&path, &vars).unwrap();
        assert!(!env.get("APP_NAME").unwrap().is_secret);
        assert!(env.get("db_password").unwrap().is_secret);
        assert!(env.get("AWS_CREDENTIALS").unwrap().is_secret);

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("APP_NAME=demo"));
        assert!(text.contains(super::super::SECRET_MARKER));
    }

    #[test]
    fn test_merge_later_wins() {
        let mut base = env_of(&[("A", "1"), ("B", "2")]);
        base.comments = vec!["共通".to_string(), "base".to_string()];
        let mut overlay = env_of(&[("B", "20"), ("C", "30")]);
        overlay.comments = vec!["共通".to_string(), "overlay".to_string()];

        let merged = EnvManager::merge(&[base, overlay]);
        assert_eq!(merged.path, PathBuf::from("merged.env"));
        assert_eq!(merged.value("A"), Some("1"));
        assert_eq!(merged.value("B"), Some("20"));
        assert_eq!(merged.value("C"), Some("30"));
        assert_eq!(merged.comments, vec!["共通", "base", "overlay"]);
    }

    #[test]
    fn test_validate_weak_unflagged_password() {
        let env = parse_env_str("DB_PASSWORD=admin123\n", ".env");
        let report = EnvManager::validate(&env);

        assert!(report.is_valid());
        assert_eq!(report.warnings.len(), 2, "warnings: {:?}", report.warnings);
        assert!(report.warnings.iter().any(|w| w.contains("secret")));
        assert!(report.warnings.iter().any(|w| w.contains("推測されやすい")));
    }

    #[test]
    fn test_validate_errors_and_system_vars() {
        let mut env = env_of(&[("lower_case", "x"), ("PATH", "/bin"), ("GREETING", "Hello")]);
        env.set(EnvVariable::new("REQUIRED_URL", "").required(true));

        let report = EnvManager::validate(&env);
        assert_eq!(report.errors.len(), 2, "errors: {:?}", report.errors);
        assert!(report.errors.iter().any(|e| e.contains("lower_case")));
        assert!(report.errors.iter().any(|e| e.contains("REQUIRED_URL")));
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].contains("PATH"));
    }

    #[test]
    fn test_validate_secret_flag_silences_warning() {
        let env = {
            let mut env = EnvFile::new(".env");
            env.set(EnvVariable::new("API_TOKEN", "f00dcafe").secret(true));
            env
        };
        let report = EnvManager::validate(&env);
        assert!(report.warnings.is_empty());
    }

    #[test]
    #[serial]
    fn test_substitute() {
        let env = env_of(&[("HOST", "db.internal"), ("PORT", "5432")]);
        temp_env::with_vars(
            vec![
                ("HOST", Some("ambient-host")),
                ("STACKFLOW_TEST_USER", Some("alice")),
                ("STACKFLOW_TEST_MISSING", None),
            ],
            || {
                let text = "postgres://${STACKFLOW_TEST_USER}@${HOST}:$PORT/${STACKFLOW_TEST_MISSING} $STACKFLOW_TEST_MISSING";
                assert_eq!(
                    EnvManager::substitute(text, &env),
                    "postgres://alice@db.internal:5432/${STACKFLOW_TEST_MISSING} $STACKFLOW_TEST_MISSING"
                );
            },
        );
    }

    #[test]
    fn test_diff_redacts_secrets() {
        let mut old = env_of(&[("A", "1"), ("B", "2"), ("GONE", "x")]);
        old.set(EnvVariable::new("TOKEN", "old-token").secret(true));
        let mut new = env_of(&[("A", "1"), ("B", "3"), ("FRESH", "y")]);
        new.set(EnvVariable::new("TOKEN", "new-token").secret(true));

        let diff = EnvManager::diff(&old, &new);
        assert_eq!(diff.added, vec!["FRESH"]);
        assert_eq!(diff.removed, vec!["GONE"]);
        assert_eq!(diff.modified.len(), 2);

        let b = diff.modified.iter().find(|m| m.name == "B").unwrap();
        assert_eq!((b.old_value.as_str(), b.new_value.as_str()), ("2", "3"));

        let token = diff.modified.iter().find(|m| m.name == "TOKEN").unwrap();
        assert_eq!(token.old_value, "***");
        assert_eq!(token.new_value, "***");

        assert!(EnvManager::diff(&old, &old).is_empty());
    }

    #[test]
    fn test_generate_template() {
        let env = EnvManager::generate_template(&["web", "postgres", "redis-cache", "nginx"]);

        assert_eq!(env.value("COMPOSE_PROJECT_NAME"), Some("stackflow"));
        assert_eq!(env.value("STACKFLOW_LOG_LEVEL"), Some("info"));
        assert_eq!(env.value("POSTGRES_PORT"), Some("5432"));
        assert!(env.get("POSTGRES_PASSWORD").unwrap().is_secret);
        assert!(env.get("REDIS_PASSWORD").unwrap().is_secret);
        assert_eq!(env.value("NGINX_PORT"), Some("80"));

        let minimal = EnvManager::generate_template::<&str>(&[]);
        assert_eq!(minimal.len(), 5);
    }

    #[test]
    fn test_backup_path() {
        assert_eq!(
            backup_path(Path::new("/tmp/stack/.env")),
            PathBuf::from("/tmp/stack/.env.backup")
        );
        assert_eq!(backup_path(Path::new("prod.env")), PathBuf::from("prod.env.backup"));
    }
}
