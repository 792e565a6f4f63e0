//! 依存グラフの検証・レポート・最適化提案

use super::{DependencyGraph, DependencyKind};
use crate::error::StackError;
use crate::model::ComposeDocument;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// 最大グループの割合がこれを下回ると並列度が低いとみなす
const LOW_PARALLELISM_RATIO: f64 = 0.3;

/// 依存グラフを扱うマネージャー
#[derive(Debug, Clone)]
pub struct DependencyManager {
    graph: DependencyGraph,
}

/// 依存グラフの集計レポート
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DependencyReport {
    pub total_services: usize,
    pub total_dependencies: usize,
    pub dependencies_by_kind: BTreeMap<DependencyKind, usize>,
    pub circular_dependencies: Vec<Vec<String>>,
    pub isolated_services: Vec<String>,
    pub critical_services: Vec<String>,
    /// 循環がある場合は `None`
    pub startup_order: Option<Vec<String>>,
    pub shutdown_order: Option<Vec<String>>,
    pub parallel_groups: Vec<Vec<String>>,
    pub services: BTreeMap<String, ServiceDependencySummary>,
}

/// サービスごとの依存数
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceDependencySummary {
    pub dependencies: usize,
    pub dependents: usize,
    pub depends_on: Vec<String>,
    pub required_by: Vec<String>,
}

impl DependencyManager {
    pub fn new(graph: DependencyGraph) -> Self {
        Self { graph }
    }

    /// ドキュメントを解析してマネージャーを作成
    pub fn analyze(doc: &ComposeDocument) -> Self {
        Self::new(DependencyGraph::from_document(doc))
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// 並列起動グループを計算
    ///
    /// 循環がある場合は1グループ1サービス（名前順）に退化させる。
    pub fn optimize_startup_order(&self) -> Vec<Vec<String>> {
        match self.graph.parallel_groups() {
            Ok(groups) => groups,
            Err(e) => {
                warn!(error = %e, "Falling back to sequential startup");
                self.graph.services().map(|s| vec![s.to_string()]).collect()
            }
        }
    }

    /// グラフの整合性を検証
    ///
    /// 戻り値は `(有効かどうか, エラー一覧)`。
    pub fn validate(&self) -> (bool, Vec<String>) {
        let mut errors = self.structural_errors();

        let total = self.graph.len();
        let isolated = self.graph.isolated_services().len();
        if total > 1 && isolated * 2 > total {
            errors.push(format!(
                "サービスの半数以上が孤立しています ({}/{})",
                isolated, total
            ));
        }

        debug!(errors = errors.len(), "Dependency graph validated");
        (errors.is_empty(), errors)
    }

    /// デプロイを止めるべき不整合（循環と存在しない依存先）
    pub fn structural_errors(&self) -> Vec<String> {
        let mut errors = Vec::new();

        for cycle in self.graph.find_circular_dependencies() {
            errors.push(StackError::CircularDependency { path: cycle }.to_string());
        }

        for edge in self.graph.dangling_dependencies() {
            errors.push(
                StackError::MissingDependency {
                    service: edge.source.clone(),
                    dependency: edge.target.clone(),
                }
                .to_string(),
            );
        }

        errors
    }

    /// 診断用のレポートを生成
    pub fn dependency_report(&self) -> DependencyReport {
        let graph = &self.graph;

        let mut dependencies_by_kind = BTreeMap::new();
        for edge in graph.edges() {
            *dependencies_by_kind.entry(edge.kind).or_insert(0) += 1;
        }

        let services = graph
            .services()
            .map(|name| {
                let depends_on: Vec<String> = graph
                    .dependencies_of(name)
                    .iter()
                    .map(|e| e.target.clone())
                    .collect::<std::collections::BTreeSet<_>>()
                    .into_iter()
                    .collect();
                let required_by: Vec<String> =
                    graph.dependents_of(name).into_iter().map(str::to_string).collect();
                let summary = ServiceDependencySummary {
                    dependencies: depends_on.len(),
                    dependents: required_by.len(),
                    depends_on,
                    required_by,
                };
                (name.to_string(), summary)
            })
            .collect();

        DependencyReport {
            total_services: graph.len(),
            total_dependencies: graph.edges().len(),
            dependencies_by_kind,
            circular_dependencies: graph.find_circular_dependencies(),
            isolated_services: graph.isolated_services(),
            critical_services: graph.critical_services(),
            startup_order: graph.startup_order().ok(),
            shutdown_order: graph.shutdown_order().ok(),
            parallel_groups: self.optimize_startup_order(),
            services,
        }
    }

    /// 構成改善のヒントを生成
    pub fn suggest_optimizations(&self) -> Vec<String> {
        let graph = &self.graph;
        let mut suggestions = Vec::new();

        for name in graph.critical_services() {
            suggestions.push(format!(
                "サービス {} は {} 個のサービスから依存されています。冗長化を検討してください",
                name,
                graph.dependents_of(&name).len()
            ));
        }

        if graph.len() > 1 {
            for name in graph.isolated_services() {
                suggestions.push(format!(
                    "サービス {} は他のサービスと関係がありません。depends_on の指定漏れがないか確認してください",
                    name
                ));
            }
        }

        for cycle in graph.find_circular_dependencies() {
            suggestions.push(format!(
                "循環依存 {} を解消してください。共通の処理を別サービスに切り出すか、依存の向きを見直してください",
                cycle.join(" -> ")
            ));
        }

        let groups = self.optimize_startup_order();
        let total = graph.len();
        let largest = groups.iter().map(Vec::len).max().unwrap_or(0);
        if total > 0 && (largest as f64) < (total as f64) * LOW_PARALLELISM_RATIO {
            suggestions.push(format!(
                "並列に起動できるサービスが少なくなっています（最大 {}/{}）。依存関係を減らせないか検討してください",
                largest, total
            ));
        }

        suggestions
    }
}
