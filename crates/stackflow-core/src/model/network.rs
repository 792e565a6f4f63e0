//! ネットワーク定義

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// ドライバー未指定のネットワークが使うドライバー
pub const DEFAULT_NETWORK_DRIVER: &str = "bridge";

/// ネットワーク定義
///
/// 出力時は指定されたキーのみを書き出す。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkDefinition {
    #[serde(skip)]
    pub name: String,
    /// 実際のネットワーク名（トップレベルの `name:`）
    #[serde(rename = "name", default, skip_serializing_if = "Option::is_none")]
    pub resource_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external: Option<ExternalRef>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub attachable: bool,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

impl NetworkDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// 使用するドライバー（未指定なら bridge）
    pub fn effective_driver(&self) -> &str {
        self.driver.as_deref().unwrap_or(DEFAULT_NETWORK_DRIVER)
    }

    pub fn is_external(&self) -> bool {
        self.external.as_ref().is_some_and(ExternalRef::is_enabled)
    }
}

/// `external` の指定
///
/// `external: true` と、旧形式の `external: {name: ...}` の両方を読んだ形のまま保持する。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExternalRef {
    Flag(bool),
    Named { name: String },
}

impl ExternalRef {
    pub fn is_enabled(&self) -> bool {
        !matches!(self, Self::Flag(false))
    }

    /// 外部リソースの実際の名前（旧形式で指定された場合のみ）
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Flag(_) => None,
            Self::Named { name } => Some(name),
        }
    }
}

pub(crate) fn is_false(value: &bool) -> bool {
    !*value
}
