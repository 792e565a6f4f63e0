use stackflow_container::{CommandOutput, ComposeRuntime, ContainerError, Result};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// 呼び出しを記録し、あらかじめ用意した応答を順番に返すランタイム
///
/// 応答が尽きた後は成功（空の出力）を返す。
#[derive(Default)]
pub struct FakeRuntime {
    calls: Mutex<Vec<(PathBuf, Vec<String>)>>,
    responses: Mutex<VecDeque<Result<CommandOutput>>>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond_ok(self, stdout: &str) -> Self {
        self.push(Ok(CommandOutput::ok(stdout)))
    }

    pub fn respond_failure(self, code: i32, stderr: &str) -> Self {
        self.push(Ok(CommandOutput::failed(code, stderr)))
    }

    #[allow(dead_code)]
    pub fn respond_timeout(self) -> Self {
        self.push(Err(ContainerError::CommandTimeout {
            command: "docker compose up".to_string(),
            timeout_secs: 300,
        }))
    }

    fn push(self, response: Result<CommandOutput>) -> Self {
        self.responses.lock().unwrap().push_back(response);
        self
    }

    /// 記録した呼び出しの引数
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(_, args)| args.clone())
            .collect()
    }

    #[allow(dead_code)]
    pub fn call_dirs(&self) -> Vec<PathBuf> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(dir, _)| dir.clone())
            .collect()
    }
}

impl ComposeRuntime for FakeRuntime {
    async fn run(&self, dir: &Path, args: &[&str]) -> Result<CommandOutput> {
        self.calls.lock().unwrap().push((
            dir.to_path_buf(),
            args.iter().map(|a| a.to_string()).collect(),
        ));
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(CommandOutput::ok("")))
    }
}

pub const TWO_SERVICES: &str = r#"
version: "3.8"
services:
  db:
    image: postgres:16
  web:
    image: nginx:1.25
    ports: ["8080:80"]
    depends_on: [db]
"#;

pub const THREE_TIERS: &str = r#"
version: "3.8"
services:
  db:
    image: postgres:16
  api:
    image: myapi:1.0
    depends_on: [db]
  web:
    image: nginx:1.25
    depends_on: [api]
"#;
