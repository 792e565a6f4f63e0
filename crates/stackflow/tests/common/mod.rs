use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

pub const TWO_SERVICES: &str = r#"
version: "3.8"
services:
  db:
    image: postgres:16
  web:
    image: nginx:1.25
    ports:
      - "8080:80"
    depends_on:
      - db
"#;

pub struct TestProject {
    pub root: TempDir,
}

impl TestProject {
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        Self { root }
    }

    pub fn write_file(&self, name: &str, content: &str) -> PathBuf {
        let path = self.root.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    pub fn write_compose(&self, content: &str) -> PathBuf {
        self.write_file("docker-compose.yml", content)
    }

    pub fn path(&self) -> PathBuf {
        self.root.path().to_path_buf()
    }

    /// スタックを展開する作業ディレクトリ
    pub fn work_dir(&self) -> PathBuf {
        self.root.path().join("deployments")
    }
}
