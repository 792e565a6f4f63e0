//! composeパーサー
//!
//! compose形式のYAMLをパースし、正規化済みの `ComposeDocument` を生成します。
//! 各セクションのパース処理はモジュールに分離されています。

mod network;
mod port;
mod service;
mod volume;

pub use port::normalize_port;
pub use volume::normalize_volume_mount;

use network::parse_network_definition;
use service::parse_service;
use volume::parse_volume_definition;

use crate::error::{Result, StackError};
use crate::model::{ComposeDocument, ExternalRef};
use serde_yaml::{Mapping, Value};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fs;
use std::path::Path;
use tracing::{debug, info, instrument};

/// composeファイルをパース
#[instrument(skip_all, fields(path = %path.as_ref().display()))]
pub fn parse_compose_file<P: AsRef<Path>>(path: P) -> Result<ComposeDocument> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|e| StackError::IoError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    parse_compose_str(&content)
}

/// compose形式のYAML文字列をパース
///
/// 以下の場合は `StackError::Parse` を返す:
/// - YAMLとして不正
/// - ルートがマッピングでない
/// - version がない
/// - サービスが1つも定義されていない
#[instrument(skip_all, fields(bytes = content.len()))]
pub fn parse_compose_str(content: &str) -> Result<ComposeDocument> {
    let root: Value = serde_yaml::from_str(content)
        .map_err(|e| StackError::Parse(format!("YAML構文エラー: {}", e)))?;

    let root = root.as_mapping().ok_or_else(|| {
        StackError::Parse("ドキュメントはYAMLのマッピングである必要があります".to_string())
    })?;

    let version = root
        .get("version")
        .and_then(scalar_to_string)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| StackError::Parse("version は必須です".to_string()))?;

    let services_node = match root.get("services") {
        Some(Value::Mapping(services)) if !services.is_empty() => services,
        _ => {
            return Err(StackError::Parse(
                "少なくとも1つのサービスを定義してください".to_string(),
            ));
        }
    };

    let mut doc = ComposeDocument {
        version,
        ..Default::default()
    };

    for (key, body) in services_node {
        let name = key_to_string(key)?;
        debug!(service = %name, "Parsing service");
        let service = parse_service(&name, body)?;
        doc.services.insert(name, service);
    }

    for (key, body) in section(root, "networks")? {
        let name = key_to_string(key)?;
        doc.networks
            .insert(name.clone(), parse_network_definition(&name, body)?);
    }

    for (key, body) in section(root, "volumes")? {
        let name = key_to_string(key)?;
        doc.volumes
            .insert(name.clone(), parse_volume_definition(&name, body)?);
    }

    info!(
        services = doc.services.len(),
        networks = doc.networks.len(),
        volumes = doc.volumes.len(),
        "Compose document parsed"
    );

    Ok(doc)
}

/// パースに失敗したドキュメントからもサービス名をできる限り抽出する
///
/// デプロイ失敗時に「どのサービスが失敗扱いになったか」を報告するために使う。
/// YAMLとして読めない場合は空のリストを返す。
pub fn declared_service_names(content: &str) -> Vec<String> {
    let Ok(root) = serde_yaml::from_str::<Value>(content) else {
        return Vec::new();
    };
    root.get("services")
        .and_then(Value::as_mapping)
        .map(|services| {
            services
                .keys()
                .filter_map(|k| key_to_string(k).ok())
                .collect()
        })
        .unwrap_or_default()
}

/// 使用されているイメージの一覧（重複除去・名前順）
pub fn extract_images(doc: &ComposeDocument) -> Vec<String> {
    doc.services
        .values()
        .filter_map(|s| s.image.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// サービスごとの公開ポート（ポートを持つサービスのみ）
pub fn extract_ports(doc: &ComposeDocument) -> BTreeMap<String, Vec<String>> {
    doc.services
        .iter()
        .filter(|(_, s)| !s.ports.is_empty())
        .map(|(name, s)| (name.clone(), s.ports.clone()))
        .collect()
}

/// サービスごとのボリュームマウント（マウントを持つサービスのみ）
pub fn extract_volumes(doc: &ComposeDocument) -> BTreeMap<String, Vec<String>> {
    doc.services
        .iter()
        .filter(|(_, s)| !s.volumes.is_empty())
        .map(|(name, s)| (name.clone(), s.volumes.clone()))
        .collect()
}

/// depends_on のみを対象にした簡易的な循環チェック
///
/// ネットワーク・ボリューム由来の暗黙の依存は考慮しない。
/// 正式な判定は `DependencyManager` 側で行う。
pub fn has_circular_depends_on(doc: &ComposeDocument) -> bool {
    fn visit<'a>(
        name: &'a str,
        doc: &'a ComposeDocument,
        visited: &mut HashSet<&'a str>,
        stack: &mut HashSet<&'a str>,
    ) -> bool {
        if stack.contains(name) {
            return true;
        }
        if !visited.insert(name) {
            return false;
        }
        stack.insert(name);
        if let Some(service) = doc.services.get(name) {
            for dependency in &service.depends_on {
                if visit(dependency, doc, visited, stack) {
                    return true;
                }
            }
        }
        stack.remove(name);
        false
    }

    let mut visited = HashSet::new();
    let mut stack = HashSet::new();
    doc.services
        .keys()
        .any(|name| visit(name, doc, &mut visited, &mut stack))
}

/// サービス間の依存関係をチェック
///
/// 存在しないサービスへの依存と、depends_on 上の循環を報告する。
pub fn validate_service_dependencies(doc: &ComposeDocument) -> Vec<String> {
    let mut errors = Vec::new();
    for (name, service) in &doc.services {
        for dependency in &service.depends_on {
            if !doc.services.contains_key(dependency) {
                errors.push(
                    StackError::MissingDependency {
                        service: name.clone(),
                        dependency: dependency.clone(),
                    }
                    .to_string(),
                );
            }
        }
    }
    if has_circular_depends_on(doc) {
        errors.push("depends_on に循環依存があります".to_string());
    }
    errors
}

/// スカラー値を文字列に変換（null は空文字列）
pub(crate) fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null => Some(String::new()),
        _ => None,
    }
}

pub(crate) fn key_to_string(key: &Value) -> Result<String> {
    scalar_to_string(key)
        .filter(|k| !k.is_empty())
        .ok_or_else(|| StackError::Parse(format!("不正なキーです: {:?}", key)))
}

/// `attachable: true` などの真偽値フィールド（文字列の "true" も受け付ける）
pub(crate) fn bool_field(map: &Mapping, key: &str) -> bool {
    match map.get(key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
        _ => false,
    }
}

/// `external: true` / `external: {name: ...}` を読む（false・未指定は `None`）
pub(crate) fn external_field(owner: &str, map: &Mapping) -> Result<Option<ExternalRef>> {
    let external = match map.get("external") {
        None | Some(Value::Null) => None,
        Some(Value::Bool(true)) => Some(ExternalRef::Flag(true)),
        Some(Value::Bool(false)) => None,
        Some(Value::String(s)) if s.eq_ignore_ascii_case("true") => Some(ExternalRef::Flag(true)),
        Some(Value::String(s)) if s.eq_ignore_ascii_case("false") => None,
        Some(Value::Mapping(body)) => Some(
            match body
                .get("name")
                .and_then(scalar_to_string)
                .filter(|n| !n.is_empty())
            {
                Some(name) => ExternalRef::Named { name },
                None => ExternalRef::Flag(true),
            },
        ),
        Some(other) => {
            return Err(StackError::Parse(format!(
                "'{}' の external が不正です: {:?}",
                owner, other
            )));
        }
    };
    Ok(external)
}

/// マッピング、または `KEY=VALUE` / `KEY` のリストを名前→値のマップに変換
///
/// `KEY` のみの場合は空文字列を値とする。リストの要素が数値や真偽値の場合は
/// マッピング形式と同じく文字列に変換し、マッピングやリストはエラーにする。
pub(crate) fn string_map(owner: &str, value: &Value) -> Result<BTreeMap<String, String>> {
    let mut result = BTreeMap::new();
    match value {
        Value::Null => {}
        Value::Mapping(map) => {
            for (key, v) in map {
                let value = scalar_to_string(v).ok_or_else(|| {
                    StackError::Parse(format!("'{}' の値がスカラーではありません: {:?}", owner, v))
                })?;
                result.insert(key_to_string(key)?, value);
            }
        }
        Value::Sequence(items) => {
            for item in items {
                let entry = scalar_to_string(item)
                    .filter(|e| !e.is_empty())
                    .ok_or_else(|| {
                        StackError::Parse(format!(
                            "'{}' のリストに不正な要素があります: {:?}",
                            owner, item
                        ))
                    })?;
                match entry.split_once('=') {
                    Some((key, value)) => result.insert(key.to_string(), value.to_string()),
                    None => result.insert(entry.to_string(), String::new()),
                };
            }
        }
        _ => {
            return Err(StackError::Parse(format!(
                "'{}' の定義はマッピングまたはリストである必要があります",
                owner
            )));
        }
    }
    Ok(result)
}

/// リスト、またはマッピングのキーを名前のリストに変換
pub(crate) fn name_list(owner: &str, field: &str, value: &Value) -> Result<Vec<String>> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Sequence(items) => items
            .iter()
            .map(|item| {
                scalar_to_string(item)
                    .filter(|s| !s.is_empty())
                    .ok_or_else(|| {
                        StackError::Parse(format!(
                            "サービス '{}' の {} に不正な要素があります",
                            owner, field
                        ))
                    })
            })
            .collect(),
        Value::Mapping(map) => map.keys().map(key_to_string).collect(),
        _ => Err(StackError::Parse(format!(
            "サービス '{}' の {} はリストまたはマッピングである必要があります",
            owner, field
        ))),
    }
}

fn section<'a>(root: &'a Mapping, key: &str) -> Result<Vec<(&'a Value, &'a Value)>> {
    match root.get(key) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Mapping(map)) => Ok(map.iter().collect()),
        Some(_) => Err(StackError::Parse(format!(
            "{} セクションはマッピングである必要があります",
            key
        ))),
    }
}
