use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StackError {
    #[error("YAMLパースエラー: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("ファイル読み込みエラー: {0}")]
    Io(#[from] std::io::Error),

    #[error("IO エラー: {path}\n理由: {message}")]
    IoError { path: PathBuf, message: String },

    #[error("composeファイルの解析に失敗しました: {0}")]
    Parse(String),

    #[error("循環依存が検出されました: {}", path.join(" -> "))]
    CircularDependency { path: Vec<String> },

    #[error("サービス '{service}' が存在しないサービス '{dependency}' に依存しています")]
    MissingDependency { service: String, dependency: String },

    #[error(".env ファイルが見つかりません: {path}")]
    EnvFileNotFound { path: PathBuf },

    #[error("環境変数の定義が不正です: {0}")]
    InvalidEnv(String),
}

pub type Result<T> = std::result::Result<T, StackError>;
