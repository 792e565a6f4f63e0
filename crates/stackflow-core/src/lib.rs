//! StackFlow Core
//!
//! compose形式のスタック定義を扱うためのコア機能を提供します。
//!
//! ```text
//! YAML ──► parser ──► ComposeDocument ──► validator ──► ValidationReport
//!                           │
//!                           └──► graph ──► 起動順序 / 並列グループ / レポート
//!
//! .env ──► env ──► EnvFile（検証・マージ・差分・置換）
//! ```

pub mod env;
pub mod error;
pub mod graph;
pub mod model;
pub mod parser;
pub mod validator;

// Re-exports
pub use env::{
    EnvDiff, EnvFile, EnvManager, EnvVariable, ModifiedVariable, is_sensitive_name, parse_env_str,
};
pub use error::{Result, StackError};
pub use graph::{
    DependencyGraph, DependencyKind, DependencyManager, DependencyReport, ServiceDependency,
    ServiceDependencySummary,
};
pub use model::*;
pub use parser::{declared_service_names, parse_compose_file, parse_compose_str};
pub use validator::{DocumentValidator, ValidationReport, validate_document};
