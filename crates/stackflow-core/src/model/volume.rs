//! ボリューム定義

use super::network::ExternalRef;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// ドライバー未指定のボリュームが使うドライバー
pub const DEFAULT_VOLUME_DRIVER: &str = "local";

/// トップレベルの名前付きボリューム定義
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VolumeDefinition {
    #[serde(skip)]
    pub name: String,
    /// 実際のボリューム名（トップレベルの `name:`）
    #[serde(rename = "name", default, skip_serializing_if = "Option::is_none")]
    pub resource_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external: Option<ExternalRef>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

impl VolumeDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// 使用するドライバー（未指定なら local）
    pub fn effective_driver(&self) -> &str {
        self.driver.as_deref().unwrap_or(DEFAULT_VOLUME_DRIVER)
    }

    pub fn is_external(&self) -> bool {
        self.external.as_ref().is_some_and(ExternalRef::is_enabled)
    }
}
