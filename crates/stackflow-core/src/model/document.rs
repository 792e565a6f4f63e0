//! composeドキュメント全体

use super::{NetworkDefinition, ServiceDefinition, VolumeDefinition};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;

/// 正規化済みのcomposeドキュメント
///
/// パース毎に生成され、永続的なIDは持たない。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComposeDocument {
    pub version: String,
    pub services: BTreeMap<String, ServiceDefinition>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub networks: BTreeMap<String, NetworkDefinition>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub volumes: BTreeMap<String, VolumeDefinition>,
}

impl ComposeDocument {
    /// サービス名の一覧（名前順）
    pub fn service_names(&self) -> Vec<String> {
        self.services.keys().cloned().collect()
    }

    pub fn service(&self, name: &str) -> Option<&ServiceDefinition> {
        self.services.get(name)
    }

    /// 正規化済みのcompose YAMLとして出力
    ///
    /// depends_on に待機条件がある場合は長い形式で出力する。
    pub fn to_yaml(&self) -> Result<String> {
        let mut value = serde_yaml::to_value(self)?;
        for (name, service) in &self.services {
            if service.depends_on_conditions.is_empty() {
                continue;
            }
            if let Some(slot) = value
                .get_mut("services")
                .and_then(|s| s.get_mut(name.as_str()))
                .and_then(|s| s.get_mut("depends_on"))
            {
                *slot = depends_on_long_form(service);
            }
        }
        Ok(serde_yaml::to_string(&value)?)
    }
}

fn depends_on_long_form(service: &ServiceDefinition) -> Value {
    let mut deps = Mapping::new();
    for dependency in &service.depends_on {
        let condition = service
            .depends_on_conditions
            .get(dependency)
            .map(String::as_str)
            .unwrap_or("service_started");
        let mut body = Mapping::new();
        body.insert(Value::from("condition"), Value::from(condition));
        deps.insert(Value::from(dependency.as_str()), Value::Mapping(body));
    }
    Value::Mapping(deps)
}
