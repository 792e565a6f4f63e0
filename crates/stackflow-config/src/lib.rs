//! StackFlow の設定解決
//!
//! 作業ディレクトリや compose ファイルの場所を、引数・環境変数・既定値の順で決定します。

pub mod error;

pub use error::{ConfigError, Result};

use std::path::{Path, PathBuf};
use tracing::debug;

/// 作業ディレクトリを指定する環境変数
pub const WORK_DIR_ENV: &str = "STACKFLOW_WORK_DIR";

/// compose ファイルを直接指定する環境変数
pub const COMPOSE_FILE_ENV: &str = "STACKFLOW_COMPOSE_FILE";

/// 作業ディレクトリの既定名（一時ディレクトリ直下）
pub const DEFAULT_WORK_DIR_NAME: &str = "stackflow_deployments";

/// カレントディレクトリで探すファイル名（優先順）
const COMPOSE_FILE_CANDIDATES: &[&str] = &[
    "compose.local.yml",
    "compose.yml",
    "compose.yaml",
    "docker-compose.yml",
    "docker-compose.yaml",
];

/// プロジェクト内の設定ディレクトリ名
const PROJECT_DIR_NAME: &str = ".stackflow";

/// 設定ディレクトリのパスを取得（なければ作成）
pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or(ConfigError::ConfigDirNotFound)?
        .join("stackflow");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
    }

    Ok(config_dir)
}

/// スタックを展開する作業ディレクトリを決定
///
/// 優先順位:
/// 1. 引数で明示されたパス
/// 2. 環境変数 STACKFLOW_WORK_DIR
/// 3. `<一時ディレクトリ>/stackflow_deployments`
pub fn resolve_work_dir(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        debug!(path = %path.display(), "Using explicit work dir");
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(WORK_DIR_ENV) {
        if !path.is_empty() {
            debug!(path = %path, "Using work dir from environment");
            return PathBuf::from(path);
        }
    }

    std::env::temp_dir().join(DEFAULT_WORK_DIR_NAME)
}

/// compose ファイルを検索
///
/// 優先順位:
/// 1. 環境変数 STACKFLOW_COMPOSE_FILE
/// 2. カレントディレクトリの compose.local.yml, compose.yml, compose.yaml,
///    docker-compose.yml, docker-compose.yaml
/// 3. ./.stackflow/ 内の同名ファイル
pub fn find_compose_file() -> Result<PathBuf> {
    if let Ok(path) = std::env::var(COMPOSE_FILE_ENV) {
        let path = PathBuf::from(path);
        if path.exists() {
            debug!(path = %path.display(), "Using compose file from environment");
            return Ok(path);
        }
    }

    let cwd = std::env::current_dir()?;
    for dir in [cwd.clone(), cwd.join(PROJECT_DIR_NAME)] {
        if let Some(path) = find_in_dir(&dir) {
            debug!(path = %path.display(), "Found compose file");
            return Ok(path);
        }
    }

    Err(ConfigError::ComposeFileNotFound)
}

fn find_in_dir(dir: &Path) -> Option<PathBuf> {
    COMPOSE_FILE_CANDIDATES
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    #[serial]
    fn test_find_compose_file_in_current_dir() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("docker-compose.yml"), "services: {}").unwrap();

        temp_env::with_vars(vec![(COMPOSE_FILE_ENV, None::<&str>)], || {
            let original_dir = std::env::current_dir().unwrap();
            std::env::set_current_dir(&temp_dir).unwrap();

            let result = find_compose_file();

            std::env::set_current_dir(original_dir).unwrap();

            let path = result.unwrap();
            assert_eq!(path.file_name().unwrap(), "docker-compose.yml");
        });
    }

    #[test]
    #[serial]
    fn test_find_compose_file_priority() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("docker-compose.yml"), "services: {}").unwrap();
        fs::write(temp_dir.path().join("compose.yml"), "services: {}").unwrap();
        fs::write(temp_dir.path().join("compose.local.yml"), "services: {}").unwrap();

        temp_env::with_vars(vec![(COMPOSE_FILE_ENV, None::<&str>)], || {
            let original_dir = std::env::current_dir().unwrap();
            std::env::set_current_dir(&temp_dir).unwrap();

            let result = find_compose_file();

            std::env::set_current_dir(original_dir).unwrap();

            // compose.local.yml が最優先
            assert_eq!(result.unwrap().file_name().unwrap(), "compose.local.yml");
        });
    }

    #[test]
    #[serial]
    fn test_find_compose_file_in_project_dir() {
        let temp_dir = TempDir::new().unwrap();
        let project_dir = temp_dir.path().join(".stackflow");
        fs::create_dir(&project_dir).unwrap();
        fs::write(project_dir.join("compose.yaml"), "services: {}").unwrap();

        temp_env::with_vars(vec![(COMPOSE_FILE_ENV, None::<&str>)], || {
            let original_dir = std::env::current_dir().unwrap();
            std::env::set_current_dir(&temp_dir).unwrap();

            let result = find_compose_file();

            std::env::set_current_dir(original_dir).unwrap();

            let path = result.unwrap();
            assert!(path.ends_with(".stackflow/compose.yaml"));
        });
    }

    #[test]
    #[serial]
    fn test_find_compose_file_from_env() {
        let temp_dir = TempDir::new().unwrap();
        let custom = temp_dir.path().join("custom.yml");
        fs::write(&custom, "services: {}").unwrap();

        temp_env::with_vars(vec![(COMPOSE_FILE_ENV, Some(custom.to_str().unwrap()))], || {
            let result = find_compose_file().unwrap();
            assert_eq!(result, custom);
        });
    }

    #[test]
    #[serial]
    fn test_find_compose_file_not_found() {
        let temp_dir = TempDir::new().unwrap();

        temp_env::with_vars(vec![(COMPOSE_FILE_ENV, None::<&str>)], || {
            let original_dir = std::env::current_dir().unwrap();
            std::env::set_current_dir(&temp_dir).unwrap();

            let result = find_compose_file();

            std::env::set_current_dir(original_dir).unwrap();

            assert!(matches!(result, Err(ConfigError::ComposeFileNotFound)));
        });
    }

    #[test]
    #[serial]
    fn test_resolve_work_dir_priority() {
        let explicit = PathBuf::from("/srv/stacks");

        temp_env::with_vars(vec![(WORK_DIR_ENV, Some("/var/lib/stackflow"))], || {
            assert_eq!(resolve_work_dir(Some(&explicit)), explicit);
            assert_eq!(resolve_work_dir(None), PathBuf::from("/var/lib/stackflow"));
        });

        temp_env::with_vars(vec![(WORK_DIR_ENV, None::<&str>)], || {
            assert_eq!(
                resolve_work_dir(None),
                std::env::temp_dir().join(DEFAULT_WORK_DIR_NAME)
            );
        });
    }

    #[test]
    #[serial]
    fn test_get_config_dir() {
        let temp_dir = TempDir::new().unwrap();

        // dirs::config_dir() は Linux では XDG_CONFIG_HOME を参照する
        #[cfg(target_os = "linux")]
        temp_env::with_vars(
            vec![("XDG_CONFIG_HOME", Some(temp_dir.path().to_str().unwrap()))],
            || {
                let dir = get_config_dir().unwrap();
                assert_eq!(dir, temp_dir.path().join("stackflow"));
                assert!(dir.is_dir());
            },
        );

        #[cfg(not(target_os = "linux"))]
        let _ = temp_dir;
    }
}
