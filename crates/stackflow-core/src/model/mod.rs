//! モデル定義
//!
//! StackFlowで使用されるデータモデルを定義します。
//! 各モデルは機能ごとにモジュールに分離されています。

mod document;
mod network;
mod service;
mod volume;

// Re-exports
pub use document::*;
pub use network::*;
pub use service::*;
pub use volume::*;

/// サービスがネットワークを指定しない場合に参加する暗黙のネットワーク
pub const DEFAULT_NETWORK: &str = "default";
