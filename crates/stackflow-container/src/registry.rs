//! スタックのレジストリ
//!
//! デプロイしたスタックの状態をメモリ上で管理します。
//! 永続化はせず、作業ディレクトリやランタイムの状態と突き合わせて復元できる
//! キャッシュとして扱います。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

/// スタックの状態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StackStatus {
    Pending,
    Deploying,
    Running,
    Failed,
    Stopped,
}

impl StackStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Deploying => "deploying",
            Self::Running => "running",
            Self::Failed => "failed",
            Self::Stopped => "stopped",
        }
    }
}

impl std::fmt::Display for StackStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// スタックの記録
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackRecord {
    pub name: String,
    pub status: StackStatus,
    pub services: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StackRecord {
    pub fn new(name: impl Into<String>, status: StackStatus, services: Vec<String>) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            status,
            services,
            created_at: now,
            updated_at: now,
        }
    }
}

/// スタック名→記録のレジストリ
#[derive(Debug, Clone, Default)]
pub struct StackRegistry {
    stacks: HashMap<String, StackRecord>,
}

impl StackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, record: StackRecord) -> Option<StackRecord> {
        self.stacks.insert(record.name.clone(), record)
    }

    pub fn get(&self, name: &str) -> Option<&StackRecord> {
        self.stacks.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.stacks.contains_key(name)
    }

    /// デプロイ開始を記録（既存の記録は作成日時を保ったまま更新）
    pub fn begin_deploy(&mut self, name: &str, services: Vec<String>) {
        match self.stacks.get_mut(name) {
            Some(record) => {
                record.status = StackStatus::Deploying;
                record.services = services;
                record.updated_at = Utc::now();
            }
            None => {
                self.insert(StackRecord::new(name, StackStatus::Deploying, services));
            }
        }
    }

    /// 状態を更新（記録がなければ false）
    pub fn set_status(&mut self, name: &str, status: StackStatus) -> bool {
        match self.stacks.get_mut(name) {
            Some(record) => {
                record.status = status;
                record.updated_at = Utc::now();
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<StackRecord> {
        self.stacks.remove(name)
    }

    /// すべての記録（名前順）
    pub fn list(&self) -> Vec<&StackRecord> {
        let mut records: Vec<&StackRecord> = self.stacks.values().collect();
        records.sort_by(|a, b| a.name.cmp(&b.name));
        records
    }

    pub fn len(&self) -> usize {
        self.stacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stacks.is_empty()
    }

    /// 作業ディレクトリが消えたスタックの記録を削除し、削除した名前を返す
    pub fn reconcile_with_disk(&mut self, work_dir: &Path) -> Vec<String> {
        let mut dropped: Vec<String> = self
            .stacks
            .keys()
            .filter(|name| !work_dir.join(name.as_str()).is_dir())
            .cloned()
            .collect();
        dropped.sort();

        for name in &dropped {
            debug!(stack = %name, "Dropping record without working directory");
            self.stacks.remove(name);
        }
        dropped
    }
}
