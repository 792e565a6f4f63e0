//! ネットワーク定義のパース

use super::{bool_field, external_field, scalar_to_string, string_map};
use crate::error::{Result, StackError};
use crate::model::NetworkDefinition;
use serde_yaml::Value;

/// トップレベルの networks セクションの1エントリをパース
pub fn parse_network_definition(name: &str, body: &Value) -> Result<NetworkDefinition> {
    let mut network = NetworkDefinition::new(name);
    match body {
        Value::Null => {}
        Value::Mapping(map) => {
            network.resource_name = map.get("name").and_then(scalar_to_string);
            network.driver = map.get("driver").and_then(scalar_to_string);
            network.external = external_field(name, map)?;
            network.attachable = bool_field(map, "attachable");
            if let Some(labels) = map.get("labels") {
                network.labels = string_map(name, labels)?;
            }
        }
        _ => {
            return Err(StackError::Parse(format!(
                "ネットワーク '{}' の定義はマッピングである必要があります",
                name
            )));
        }
    }
    Ok(network)
}
