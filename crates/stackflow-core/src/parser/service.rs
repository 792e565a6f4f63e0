//! サービス定義のパース

use super::port::normalize_port;
use super::volume::normalize_volume_mount;
use super::{key_to_string, name_list, scalar_to_string, string_map};
use crate::error::{Result, StackError};
use crate::model::{CommandLine, ServiceDefinition};
use serde_yaml::Value;
use std::collections::BTreeMap;

/// services セクションの1エントリをパース
///
/// フィールドごとに異なる入力形式をここで1つの正規形に揃える。
/// 後段のバリデーターや依存グラフは入力形式を意識しない。
pub fn parse_service(name: &str, body: &Value) -> Result<ServiceDefinition> {
    let map = body.as_mapping().ok_or_else(|| {
        StackError::Parse(format!("サービス '{}' の設定が不正です", name))
    })?;

    let mut service = ServiceDefinition::new(name);

    service.image = map.get("image").and_then(scalar_to_string);
    service.build = map.get("build").filter(|b| !b.is_null()).cloned();
    if let Some(command) = map.get("command") {
        service.command = command_line(name, "command", command)?;
    }
    if let Some(entrypoint) = map.get("entrypoint") {
        service.entrypoint = command_line(name, "entrypoint", entrypoint)?;
    }
    service.working_dir = map.get("working_dir").and_then(scalar_to_string);
    service.user = map.get("user").and_then(scalar_to_string);
    service.restart = map.get("restart").and_then(scalar_to_string);

    if let Some(ports) = map.get("ports") {
        service.ports = sequence(name, "ports", ports)?
            .iter()
            .map(|p| normalize_port(name, p))
            .collect::<Result<_>>()?;
    }

    if let Some(volumes) = map.get("volumes") {
        service.volumes = sequence(name, "volumes", volumes)?
            .iter()
            .map(|v| normalize_volume_mount(name, v))
            .collect::<Result<_>>()?;
    }

    if let Some(environment) = map.get("environment") {
        service.environment = string_map(name, environment)?;
    }

    if let Some(labels) = map.get("labels") {
        service.labels = string_map(name, labels)?;
    }

    if let Some(networks) = map.get("networks") {
        service.networks = name_list(name, "networks", networks)?;
    }

    if let Some(depends_on) = map.get("depends_on") {
        service.depends_on = name_list(name, "depends_on", depends_on)?;
        service.depends_on_conditions = depends_on_conditions(depends_on)?;
    }

    Ok(service)
}

/// command / entrypoint は文字列またはリスト
fn command_line(service_name: &str, field: &str, value: &Value) -> Result<Option<CommandLine>> {
    let invalid = || {
        StackError::Parse(format!(
            "サービス '{}' の {} は文字列またはリストである必要があります",
            service_name, field
        ))
    };

    match value {
        Value::Sequence(items) => {
            let args = items
                .iter()
                .map(|item| match item {
                    Value::Null => None,
                    other => scalar_to_string(other),
                })
                .collect::<Option<Vec<String>>>()
                .ok_or_else(invalid)?;
            Ok((!args.is_empty()).then_some(CommandLine::Exec(args)))
        }
        Value::Mapping(_) | Value::Tagged(_) => Err(invalid()),
        other => Ok(scalar_to_string(other)
            .filter(|s| !s.is_empty())
            .map(CommandLine::Shell)),
    }
}

fn sequence<'a>(service_name: &str, field: &str, value: &'a Value) -> Result<&'a [Value]> {
    match value {
        Value::Sequence(items) => Ok(items.as_slice()),
        Value::Null => Ok(&[]),
        _ => Err(StackError::Parse(format!(
            "サービス '{}' の {} はリストである必要があります",
            service_name, field
        ))),
    }
}

/// depends_on の長い形式から condition を抽出
///
/// ```yaml
/// depends_on:
///   db:
///     condition: service_healthy
/// ```
fn depends_on_conditions(value: &Value) -> Result<BTreeMap<String, String>> {
    let mut conditions = BTreeMap::new();
    if let Value::Mapping(map) = value {
        for (key, body) in map {
            let Some(condition) = body
                .as_mapping()
                .and_then(|b| b.get("condition"))
                .and_then(scalar_to_string)
            else {
                continue;
            };
            conditions.insert(key_to_string(key)?, condition);
        }
    }
    Ok(conditions)
}
