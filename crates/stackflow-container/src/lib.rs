//! StackFlow Container
//!
//! composeコマンドを介してスタックをデプロイ・停止・削除します。
//!
//! - `runtime`: composeコマンドの呼び出し（`docker compose` / `docker-compose`）
//! - `registry`: スタックの状態を保持するメモリ上のレジストリ
//! - `orchestrator`: 依存関係に従ったグループ単位のデプロイ

pub mod error;
pub mod orchestrator;
pub mod registry;
pub mod runtime;

pub use error::*;
pub use orchestrator::*;
pub use registry::*;
pub use runtime::*;
