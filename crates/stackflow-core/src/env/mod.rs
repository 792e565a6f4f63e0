//! 環境変数ファイル（.env）
//!
//! `KEY=value` 形式のファイルを読み書きします。
//! 変数の直前に空行を挟まずに書かれたコメントは、その変数の説明として扱います。
//! それ以外のコメントはファイル全体のコメントになります。

mod manager;

pub use manager::*;

use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, warn};

/// 機密情報であることを示すコメント
pub const SECRET_MARKER: &str = "機密情報 (secret)";

static ENV_LINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*)\s*=\s*(.*)$").unwrap());

/// 環境変数
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EnvVariable {
    pub name: String,
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub is_secret: bool,
    pub is_required: bool,
}

impl EnvVariable {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            ..Default::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn secret(mut self, is_secret: bool) -> Self {
        self.is_secret = is_secret;
        self
    }

    pub fn required(mut self, is_required: bool) -> Self {
        self.is_required = is_required;
        self
    }

    /// 表示用の値（機密情報は伏せる）
    pub fn display_value(&self) -> &str {
        if self.is_secret { "***" } else { &self.value }
    }
}

/// 環境変数ファイル
///
/// 変数は追加順を保持し、名前は一意。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EnvFile {
    pub path: PathBuf,
    variables: Vec<EnvVariable>,
    pub comments: Vec<String>,
}

impl EnvFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn get(&self, name: &str) -> Option<&EnvVariable> {
        self.variables.iter().find(|v| v.name == name)
    }

    pub fn value(&self, name: &str) -> Option<&str> {
        self.get(name).map(|v| v.value.as_str())
    }

    /// 変数を追加（同名の変数があれば位置を保ったまま置き換える）
    pub fn set(&mut self, variable: EnvVariable) {
        match self.variables.iter_mut().find(|v| v.name == variable.name) {
            Some(existing) => *existing = variable,
            None => self.variables.push(variable),
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<EnvVariable> {
        let index = self.variables.iter().position(|v| v.name == name)?;
        Some(self.variables.remove(index))
    }

    pub fn variables(&self) -> &[EnvVariable] {
        &self.variables
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    pub fn to_map(&self) -> BTreeMap<String, String> {
        self.variables
            .iter()
            .map(|v| (v.name.clone(), v.value.clone()))
            .collect()
    }

    /// 保存用のテキストを生成
    pub fn render(&self) -> String {
        let mut out = String::new();

        for comment in &self.comments {
            out.push_str(&format!("# {}\n", comment));
        }
        // 先頭のコメントはファイルのコメントとして読まれるため、
        // 最初の変数に説明がある場合は空行で区切る
        let first_has_comment = self
            .variables
            .first()
            .is_some_and(|v| v.description.is_some() || v.is_secret);
        if !self.comments.is_empty() || first_has_comment {
            out.push('\n');
        }

        for variable in &self.variables {
            if let Some(description) = &variable.description {
                out.push_str(&format!("# {}\n", description));
            }
            if variable.is_secret {
                out.push_str(&format!("# {}\n", SECRET_MARKER));
            }
            out.push_str(&format!("{}={}\n\n", variable.name, quote_value(&variable.value)));
        }

        out
    }
}

/// .env 形式のテキストをパース
///
/// ファイル先頭から続くコメント行はファイル全体のコメントとし、
/// それ以降で変数の直前にあるコメントはその変数の説明とする。
/// 解釈できない行は警告を出して読み飛ばす。
pub fn parse_env_str(content: &str, path: impl AsRef<Path>) -> EnvFile {
    let mut env_file = EnvFile::new(path.as_ref());
    let mut pending: Vec<String> = Vec::new();
    let mut in_header = true;

    for (index, raw) in content.lines().enumerate() {
        let line = raw.trim();

        if line.is_empty() {
            env_file.comments.append(&mut pending);
            in_header = false;
            continue;
        }

        if let Some(comment) = line.strip_prefix('#') {
            pending.push(comment.trim().to_string());
            continue;
        }

        let Some(caps) = ENV_LINE_RE.captures(line) else {
            warn!(line = index + 1, path = %env_file.path.display(), "Skipping unparsable env line");
            continue;
        };

        if in_header {
            env_file.comments.append(&mut pending);
            in_header = false;
        }

        let mut variable = EnvVariable::new(&caps[1], strip_quotes(caps[2].trim()));
        for comment in pending.drain(..) {
            if comment == SECRET_MARKER {
                variable.is_secret = true;
            } else {
                variable.description = Some(match variable.description.take() {
                    Some(existing) => format!("{} {}", existing, comment),
                    None => comment,
                });
            }
        }
        env_file.set(variable);
    }
    env_file.comments.append(&mut pending);

    debug!(
        variables = env_file.len(),
        comments = env_file.comments.len(),
        "Parsed env content"
    );
    env_file
}

/// クォートを除去（"value" や 'value' の場合）
fn strip_quotes(s: &str) -> &str {
    let quoted = s.len() >= 2
        && ((s.starts_with('"') && s.ends_with('"')) || (s.starts_with('\'') && s.ends_with('\'')));
    if quoted { &s[1..s.len() - 1] } else { s }
}

/// 空白・`#`・クォート文字を含む値はダブルクォートで囲む
///
/// 読み込み時に外側のクォートを1組だけ外すので、クォートで始まる値もそのまま戻る。
fn quote_value(value: &str) -> String {
    if value
        .chars()
        .any(|c| c.is_whitespace() || matches!(c, '#' | '"' | '\''))
    {
        format!("\"{}\"", value)
    } else {
        value.to_string()
    }
}
