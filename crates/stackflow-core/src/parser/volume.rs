//! ボリューム定義のパース

use super::{external_field, scalar_to_string, string_map};
use crate::error::{Result, StackError};
use crate::model::VolumeDefinition;
use serde_yaml::Value;

/// サービスのボリュームマウントを正規形 `source:target[:options]` に変換
pub fn normalize_volume_mount(service_name: &str, value: &Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.trim().to_string()),
        Value::Mapping(map) => {
            let target = map
                .get("target")
                .and_then(scalar_to_string)
                .filter(|t| !t.is_empty())
                .ok_or_else(|| {
                    StackError::Parse(format!(
                        "サービス '{}' のボリューム定義に target がありません",
                        service_name
                    ))
                })?;
            let source = map
                .get("source")
                .and_then(scalar_to_string)
                .filter(|s| !s.is_empty());
            let read_only = map
                .get("read_only")
                .and_then(Value::as_bool)
                .unwrap_or(false);

            let mut mount = match source {
                Some(source) => format!("{}:{}", source, target),
                None => target,
            };
            if read_only {
                mount.push_str(":ro");
            }
            Ok(mount)
        }
        other => Err(StackError::Parse(format!(
            "サービス '{}' のボリューム定義が不正です: {:?}",
            service_name, other
        ))),
    }
}

/// トップレベルの volumes セクションの1エントリをパース
pub fn parse_volume_definition(name: &str, body: &Value) -> Result<VolumeDefinition> {
    let mut volume = VolumeDefinition::new(name);
    match body {
        Value::Null => {}
        Value::Mapping(map) => {
            volume.resource_name = map.get("name").and_then(scalar_to_string);
            volume.driver = map.get("driver").and_then(scalar_to_string);
            volume.external = external_field(name, map)?;
            if let Some(labels) = map.get("labels") {
                volume.labels = string_map(name, labels)?;
            }
        }
        _ => {
            return Err(StackError::Parse(format!(
                "ボリューム '{}' の定義はマッピングである必要があります",
                name
            )));
        }
    }
    Ok(volume)
}
