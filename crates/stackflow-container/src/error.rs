use thiserror::Error;

#[derive(Error, Debug)]
pub enum ContainerError {
    #[error(
        "composeコマンドが見つかりません\n\nヒント:\n  • Dockerがインストールされているか確認してください\n  • docker compose または docker-compose が実行できるか確認してください"
    )]
    RuntimeNotFound,

    #[error("コマンドがタイムアウトしました（{timeout_secs}秒）: {command}")]
    CommandTimeout { command: String, timeout_secs: u64 },

    #[error("コマンドを起動できません: {command}\n理由: {source}")]
    CommandSpawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("コマンドが失敗しました（終了コード: {code:?}）: {command}\n{stderr}")]
    CommandFailed {
        command: String,
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },

    #[error("スタック '{0}' が見つかりません")]
    StackNotFound(String),

    #[error(transparent)]
    Core(#[from] stackflow_core::StackError),

    #[error("ファイル操作エラー: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML変換エラー: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON変換エラー: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ContainerError>;
