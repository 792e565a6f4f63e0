//! ポート定義のパース

use super::scalar_to_string;
use crate::error::{Result, StackError};
use serde_yaml::Value;

/// ポート指定を正規形の文字列に変換
///
/// 受け付ける形:
/// - 整数: `80` → `"80"`
/// - 文字列: `"8080:80"`, `"127.0.0.1:8080:80"` はそのまま
/// - 長い形式: `{target: 80, published: 8080, host_ip: 127.0.0.1, protocol: udp}`
///   → `"127.0.0.1:8080:80/udp"`
pub fn normalize_port(service_name: &str, value: &Value) -> Result<String> {
    match value {
        Value::Number(n) => Ok(n.to_string()),
        Value::String(s) => Ok(s.trim().to_string()),
        Value::Mapping(map) => {
            let target = map
                .get("target")
                .and_then(scalar_to_string)
                .filter(|t| !t.is_empty())
                .ok_or_else(|| {
                    StackError::Parse(format!(
                        "サービス '{}' のポート定義に target がありません",
                        service_name
                    ))
                })?;
            let published = map
                .get("published")
                .and_then(scalar_to_string)
                .filter(|p| !p.is_empty());
            let host_ip = map
                .get("host_ip")
                .and_then(scalar_to_string)
                .filter(|h| !h.is_empty());
            let protocol = map
                .get("protocol")
                .and_then(scalar_to_string)
                .map(|p| p.to_lowercase())
                .filter(|p| p != "tcp" && !p.is_empty());

            let mut port = match (host_ip, published) {
                (Some(ip), Some(published)) => format!("{}:{}:{}", ip, published, target),
                (Some(ip), None) => format!("{}::{}", ip, target),
                (None, Some(published)) => format!("{}:{}", published, target),
                (None, None) => target,
            };
            if let Some(protocol) = protocol {
                port.push('/');
                port.push_str(&protocol);
            }
            Ok(port)
        }
        other => Err(StackError::Parse(format!(
            "サービス '{}' のポート定義が不正です: {:?}",
            service_name, other
        ))),
    }
}
