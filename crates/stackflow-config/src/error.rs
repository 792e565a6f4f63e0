use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("設定ディレクトリが見つかりません")]
    ConfigDirNotFound,

    #[error(
        "composeファイルが見つかりません。以下の場所を確認してください:\n\
        - カレントディレクトリ: compose.local.yml, compose.yml, compose.yaml, docker-compose.yml, docker-compose.yaml\n\
        - ./.stackflow/ ディレクトリ\n\
        または STACKFLOW_COMPOSE_FILE 環境変数で直接指定できます"
    )]
    ComposeFileNotFound,

    #[error("IO エラー: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
