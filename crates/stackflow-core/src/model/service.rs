//! サービス定義

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// サービス定義
///
/// パーサーで正規化済みの形を保持する。
/// - ports: `[host_ip:]published:target[/protocol]` 形式の文字列
/// - volumes: `source:target[:options]` 形式の文字列
/// - environment / labels: 名前→値のマップ
/// - depends_on / networks: 名前のリスト
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceDefinition {
    /// サービス名（ドキュメント内で一意）
    #[serde(skip)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// ビルド設定（文字列のコンテキスト、またはマップをそのまま保持）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build: Option<serde_yaml::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<CommandLine>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entrypoint: Option<CommandLine>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub environment: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub networks: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    /// depends_on の長い形式で指定された待機条件（service_healthy など）
    #[serde(skip)]
    pub depends_on_conditions: BTreeMap<String, String>,
    /// 再起動ポリシー（検証前の生の値）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restart: Option<String>,
}

impl ServiceDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// 再起動ポリシーを解釈する
    ///
    /// 未指定の場合は `Some(RestartPolicy::No)`、解釈できない値の場合は `None`。
    pub fn restart_policy(&self) -> Option<RestartPolicy> {
        match &self.restart {
            None => Some(RestartPolicy::No),
            Some(raw) => RestartPolicy::parse(raw),
        }
    }

    /// 実際に参照するネットワーク（未指定なら暗黙の default）
    pub fn effective_networks(&self) -> Vec<&str> {
        if self.networks.is_empty() {
            vec![super::DEFAULT_NETWORK]
        } else {
            self.networks.iter().map(String::as_str).collect()
        }
    }

    /// 名前付きボリューム（絶対パス・相対パスではないソース）の一覧
    pub fn named_volumes(&self) -> Vec<&str> {
        self.volumes
            .iter()
            .filter_map(|v| v.split_once(':').map(|(source, _)| source))
            .filter(|source| is_named_volume(source))
            .collect()
    }
}

/// command / entrypoint
///
/// 読み込んだ形（文字列かリストか）のまま出力する。
/// リストを文字列に結合すると compose 側で再分割され、引数の区切りが変わってしまう。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CommandLine {
    /// `npm run start`
    Shell(String),
    /// `["sh", "-c", "echo hello world"]`
    Exec(Vec<String>),
}

impl CommandLine {
    /// 表示用にスペース区切りで結合した文字列
    pub fn display_string(&self) -> String {
        match self {
            Self::Shell(line) => line.clone(),
            Self::Exec(args) => args.join(" "),
        }
    }
}

impl std::fmt::Display for CommandLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.display_string())
    }
}

/// ボリュームのソースが名前付きボリュームかどうか
pub fn is_named_volume(source: &str) -> bool {
    !source.is_empty()
        && !source.starts_with('/')
        && !source.starts_with('.')
        && !source.starts_with('~')
}

/// 再起動ポリシー
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RestartPolicy {
    /// 再起動しない（デフォルト）
    #[default]
    No,
    /// 常に再起動
    Always,
    /// 異常終了時のみ再起動（最大リトライ回数つき）
    OnFailure { max_retries: Option<u32> },
    /// 明示的に停止しない限り再起動
    UnlessStopped,
}

impl RestartPolicy {
    /// 文字列からパース
    ///
    /// `no`, `always`, `on-failure`, `on-failure:N`, `unless-stopped` のみ受け付ける。
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "no" => Some(Self::No),
            "always" => Some(Self::Always),
            "on-failure" => Some(Self::OnFailure { max_retries: None }),
            "unless-stopped" => Some(Self::UnlessStopped),
            _ => {
                let retries = s.strip_prefix("on-failure:")?;
                if retries.is_empty() || !retries.chars().all(|c| c.is_ascii_digit()) {
                    return None;
                }
                retries.parse().ok().map(|n| Self::OnFailure {
                    max_retries: Some(n),
                })
            }
        }
    }

    /// composeファイルで使用する文字列に変換
    pub fn as_compose_str(&self) -> String {
        match self {
            Self::No => "no".to_string(),
            Self::Always => "always".to_string(),
            Self::OnFailure { max_retries: None } => "on-failure".to_string(),
            Self::OnFailure {
                max_retries: Some(n),
            } => format!("on-failure:{}", n),
            Self::UnlessStopped => "unless-stopped".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_restart_policy_parse() {
        assert_eq!(RestartPolicy::parse("no"), Some(RestartPolicy::No));
        assert_eq!(RestartPolicy::parse("always"), Some(RestartPolicy::Always));
        assert_eq!(
            RestartPolicy::parse("on-failure"),
            Some(RestartPolicy::OnFailure { max_retries: None })
        );
        assert_eq!(
            RestartPolicy::parse("on-failure:5"),
            Some(RestartPolicy::OnFailure {
                max_retries: Some(5)
            })
        );
        assert_eq!(
            RestartPolicy::parse("unless-stopped"),
            Some(RestartPolicy::UnlessStopped)
        );
        assert_eq!(RestartPolicy::parse("sometimes"), None);
        assert_eq!(RestartPolicy::parse("on-failure:"), None);
        assert_eq!(RestartPolicy::parse("on-failure:-1"), None);
    }

    #[test]
    fn test_restart_policy_roundtrip_string() {
        for raw in ["no", "always", "on-failure", "on-failure:3", "unless-stopped"] {
            let policy = RestartPolicy::parse(raw).unwrap();
            assert_eq!(policy.as_compose_str(), raw);
        }
    }

    #[test]
    fn test_restart_policy_default_when_unset() {
        let service = ServiceDefinition::new("web");
        assert_eq!(service.restart_policy(), Some(RestartPolicy::No));
    }

    #[test]
    fn test_effective_networks_default() {
        let mut service = ServiceDefinition::new("web");
        assert_eq!(service.effective_networks(), vec!["default"]);

        service.networks = vec!["frontend".to_string()];
        assert_eq!(service.effective_networks(), vec!["frontend"]);
    }

    #[test]
    fn test_named_volumes() {
        let mut service = ServiceDefinition::new("db");
        service.volumes = vec![
            "pgdata:/var/lib/postgresql/data".to_string(),
            "/etc/localtime:/etc/localtime:ro".to_string(),
            "./init:/docker-entrypoint-initdb.d".to_string(),
            "/tmp/anonymous".to_string(),
        ];
        assert_eq!(service.named_volumes(), vec!["pgdata"]);
    }
}
