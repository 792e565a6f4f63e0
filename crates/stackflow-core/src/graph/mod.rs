//! サービス間の依存グラフ
//!
//! `depends_on` による明示的な依存に加えて、ネットワークや名前付きボリュームを
//! 共有するサービス間の暗黙の依存（ソフトエッジ）を扱います。
//!
//! エッジ `source -> target` は「source が target に依存する」ことを表し、
//! 起動時は target が先に起動されます。

mod manager;

pub use manager::*;

use crate::error::{Result, StackError};
use crate::model::ComposeDocument;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tracing::debug;

/// 依存先として数えたときに「重要」とみなす被依存数
pub const CRITICAL_DEPENDENTS_THRESHOLD: usize = 3;

/// 依存の種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyKind {
    /// depends_on で宣言された依存
    Explicit,
    /// 同じネットワークに参加している
    Network,
    /// 同じ名前付きボリュームを参照している
    Volume,
}

impl DependencyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Explicit => "explicit",
            Self::Network => "network",
            Self::Volume => "volume",
        }
    }
}

impl std::fmt::Display for DependencyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// サービス間の依存（エッジ）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDependency {
    /// 依存する側
    pub source: String,
    /// 依存される側（先に起動する）
    pub target: String,
    pub kind: DependencyKind,
    /// 起動順序の決定に使う依存かどうか（明示的な依存のみ true）
    pub required: bool,
    /// depends_on の長い形式で指定された待機条件
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

impl ServiceDependency {
    pub fn explicit(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            kind: DependencyKind::Explicit,
            required: true,
            condition: None,
        }
    }

    pub fn soft(source: impl Into<String>, target: impl Into<String>, kind: DependencyKind) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            kind,
            required: false,
            condition: None,
        }
    }
}

/// 依存グラフ
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DependencyGraph {
    nodes: BTreeSet<String>,
    edges: Vec<ServiceDependency>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// ドキュメントから依存グラフを構築
    ///
    /// ソフトエッジはサービスの組ごとに種類ごと1本だけ追加し、明示的な依存の
    /// トポロジカル順（同順位は名前順、循環している場合は単純な名前順）で
    /// 後ろのサービスから前のサービスへ向ける。これによりソフトエッジ単独で
    /// 循環が生じることはない。
    pub fn from_document(doc: &ComposeDocument) -> Self {
        let mut graph = Self::new();

        for (name, service) in &doc.services {
            graph.add_service(name.clone());
            for dependency in &service.depends_on {
                let mut edge = ServiceDependency::explicit(name.clone(), dependency.clone());
                edge.condition = service.depends_on_conditions.get(dependency).cloned();
                graph.add_dependency(edge);
            }
        }

        let canonical = graph
            .startup_order()
            .unwrap_or_else(|_| graph.nodes.iter().cloned().collect());
        let rank: HashMap<&str, usize> = canonical
            .iter()
            .enumerate()
            .map(|(i, name)| (name.as_str(), i))
            .collect();

        let mut by_network: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        let mut by_volume: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for (name, service) in &doc.services {
            for network in service.effective_networks() {
                by_network.entry(network).or_default().push(name);
            }
            for volume in service.named_volumes() {
                let members = by_volume.entry(volume).or_default();
                if !members.contains(&name.as_str()) {
                    members.push(name);
                }
            }
        }

        let mut soft_edges = Vec::new();
        let mut seen: HashSet<(DependencyKind, &str, &str)> = HashSet::new();
        for (kind, groups) in [
            (DependencyKind::Network, &by_network),
            (DependencyKind::Volume, &by_volume),
        ] {
            for members in groups.values() {
                let mut members = members.clone();
                members.sort_by_key(|name| rank.get(name).copied().unwrap_or(usize::MAX));
                for (i, earlier) in members.iter().enumerate() {
                    for later in &members[i + 1..] {
                        if seen.insert((kind, *later, *earlier)) {
                            soft_edges.push(ServiceDependency::soft(*later, *earlier, kind));
                        }
                    }
                }
            }
        }
        graph.edges.extend(soft_edges);

        debug!(
            services = graph.nodes.len(),
            edges = graph.edges.len(),
            "Dependency graph built"
        );
        graph
    }

    pub fn add_service(&mut self, name: impl Into<String>) {
        self.nodes.insert(name.into());
    }

    /// エッジを追加（依存先がノードに存在しなくても保持する）
    pub fn add_dependency(&mut self, dependency: ServiceDependency) {
        self.edges.push(dependency);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains(name)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// サービス名（名前順）
    pub fn services(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(String::as_str)
    }

    pub fn edges(&self) -> &[ServiceDependency] {
        &self.edges
    }

    /// 指定サービスが依存しているエッジ
    pub fn dependencies_of(&self, name: &str) -> Vec<&ServiceDependency> {
        self.edges.iter().filter(|e| e.source == name).collect()
    }

    /// 指定サービスに依存しているサービス（重複除去・名前順）
    pub fn dependents_of(&self, name: &str) -> Vec<&str> {
        self.edges
            .iter()
            .filter(|e| e.target == name)
            .map(|e| e.source.as_str())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// 起動順序（Kahnのアルゴリズム、同順位は名前順）
    ///
    /// 必須の依存のみを考慮する。循環がある場合は `StackError::CircularDependency`。
    pub fn startup_order(&self) -> Result<Vec<String>> {
        let dependencies = self.required_dependencies();
        let mut remaining: HashMap<&str, usize> = dependencies
            .iter()
            .map(|(name, deps)| (*name, deps.len()))
            .collect();

        let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
        for (name, deps) in &dependencies {
            for dep in deps {
                dependents.entry(*dep).or_default().push(*name);
            }
        }

        let mut ready: BTreeSet<&str> = remaining
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(name, _)| *name)
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());

        while let Some(name) = ready.pop_first() {
            order.push(name.to_string());
            for dependent in dependents.get(name).into_iter().flatten() {
                if let Some(count) = remaining.get_mut(dependent) {
                    *count -= 1;
                    if *count == 0 {
                        ready.insert(*dependent);
                    }
                }
            }
        }

        if order.len() < self.nodes.len() {
            return Err(self.cycle_error(&order));
        }
        Ok(order)
    }

    /// 停止順序（起動順序の逆）
    pub fn shutdown_order(&self) -> Result<Vec<String>> {
        let mut order = self.startup_order()?;
        order.reverse();
        Ok(order)
    }

    /// 並列に起動できるグループ（レベル）に分割
    ///
    /// レベル k のサービスは、レベル k 以降のサービスに依存しない。
    /// 各レベル内は名前順。
    pub fn parallel_groups(&self) -> Result<Vec<Vec<String>>> {
        let dependencies = self.required_dependencies();
        let mut done: HashSet<&str> = HashSet::new();
        let mut groups = Vec::new();

        while done.len() < dependencies.len() {
            let level: Vec<&str> = dependencies
                .iter()
                .filter(|(name, deps)| !done.contains(*name) && deps.iter().all(|d| done.contains(d)))
                .map(|(name, _)| *name)
                .collect();

            if level.is_empty() {
                let order: Vec<String> = done.iter().map(|s| s.to_string()).collect();
                return Err(self.cycle_error(&order));
            }

            done.extend(level.iter().copied());
            groups.push(level.into_iter().map(str::to_string).collect());
        }

        Ok(groups)
    }

    /// 循環している経路をすべて列挙する（診断用）
    ///
    /// 各経路は `[a, b, a]` のように始点で閉じた形で返す。
    /// 同じ循環を別の始点から辿ったものは1つにまとめる。
    pub fn find_circular_dependencies(&self) -> Vec<Vec<String>> {
        let adjacency = self.adjacency();
        let mut visited: HashSet<&str> = HashSet::new();
        let mut stack: Vec<&str> = Vec::new();
        let mut cycles: Vec<Vec<String>> = Vec::new();
        let mut seen: HashSet<Vec<String>> = HashSet::new();

        fn visit<'a>(
            name: &'a str,
            adjacency: &BTreeMap<&'a str, BTreeSet<&'a str>>,
            visited: &mut HashSet<&'a str>,
            stack: &mut Vec<&'a str>,
            cycles: &mut Vec<Vec<String>>,
            seen: &mut HashSet<Vec<String>>,
        ) {
            if let Some(pos) = stack.iter().position(|n| *n == name) {
                let cycle: Vec<String> = stack[pos..].iter().map(|s| s.to_string()).collect();
                if seen.insert(canonical_rotation(&cycle)) {
                    let mut closed = cycle;
                    closed.push(name.to_string());
                    cycles.push(closed);
                }
                return;
            }
            if !visited.insert(name) {
                return;
            }
            stack.push(name);
            if let Some(neighbors) = adjacency.get(name) {
                for next in neighbors {
                    visit(*next, adjacency, visited, stack, cycles, seen);
                }
            }
            stack.pop();
        }

        for name in adjacency.keys() {
            visit(*name, &adjacency, &mut visited, &mut stack, &mut cycles, &mut seen);
        }
        cycles
    }

    /// どのエッジにも現れないサービス
    pub fn isolated_services(&self) -> Vec<String> {
        let connected: HashSet<&str> = self
            .edges
            .iter()
            .flat_map(|e| [e.source.as_str(), e.target.as_str()])
            .collect();
        self.nodes
            .iter()
            .filter(|name| !connected.contains(name.as_str()))
            .cloned()
            .collect()
    }

    /// 多くのサービスから依存されているサービス
    pub fn critical_services(&self) -> Vec<String> {
        self.nodes
            .iter()
            .filter(|name| self.dependents_of(name).len() >= CRITICAL_DEPENDENTS_THRESHOLD)
            .cloned()
            .collect()
    }

    /// ノードに存在しない依存先を持つエッジ
    pub fn dangling_dependencies(&self) -> Vec<&ServiceDependency> {
        self.edges.iter().filter(|e| !self.contains(&e.target)).collect()
    }

    /// ノードごとの必須依存先（存在しないノードへの依存は除く）
    fn required_dependencies(&self) -> BTreeMap<&str, BTreeSet<&str>> {
        let mut dependencies: BTreeMap<&str, BTreeSet<&str>> =
            self.nodes.iter().map(|n| (n.as_str(), BTreeSet::new())).collect();
        for edge in self.edges.iter().filter(|e| e.required) {
            if !self.contains(&edge.target) {
                continue;
            }
            if let Some(deps) = dependencies.get_mut(edge.source.as_str()) {
                deps.insert(edge.target.as_str());
            }
        }
        dependencies
    }

    /// すべての種類のエッジによる隣接リスト
    fn adjacency(&self) -> BTreeMap<&str, BTreeSet<&str>> {
        let mut adjacency: BTreeMap<&str, BTreeSet<&str>> =
            self.nodes.iter().map(|n| (n.as_str(), BTreeSet::new())).collect();
        for edge in &self.edges {
            if !self.contains(&edge.target) {
                continue;
            }
            if let Some(neighbors) = adjacency.get_mut(edge.source.as_str()) {
                neighbors.insert(edge.target.as_str());
            }
        }
        adjacency
    }

    /// 循環エラーを生成（経路が見つからない場合は未処理のノードを並べる）
    fn cycle_error(&self, processed: &[String]) -> StackError {
        let path = self
            .find_circular_dependencies()
            .into_iter()
            .next()
            .unwrap_or_else(|| {
                self.nodes
                    .iter()
                    .filter(|n| !processed.contains(*n))
                    .cloned()
                    .collect()
            });
        StackError::CircularDependency { path }
    }
}

/// 最小の要素が先頭になるよう循環を回転させる
fn canonical_rotation(cycle: &[String]) -> Vec<String> {
    let start = cycle
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.cmp(b.1))
        .map(|(i, _)| i)
        .unwrap_or(0);
    cycle[start..].iter().chain(&cycle[..start]).cloned().collect()
}

/// ドキュメントから依存グラフを構築
pub fn analyze(doc: &ComposeDocument) -> DependencyGraph {
    DependencyGraph::from_document(doc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_compose_str;

    fn graph_of(yaml: &str) -> DependencyGraph {
        analyze(&parse_compose_str(yaml).unwrap())
    }

    fn explicit_edges(graph: &DependencyGraph) -> Vec<(&str, &str)> {
        graph
            .edges()
            .iter()
            .filter(|e| e.kind == DependencyKind::Explicit)
            .map(|e| (e.source.as_str(), e.target.as_str()))
            .collect()
    }

    #[test]
    fn test_web_after_db() {
        let graph = graph_of(
            r#"
version: "3.8"
services:
  db:
    image: postgres:16
  web:
    image: nginx:1.25
    depends_on: [db]
"#,
        );

        assert_eq!(explicit_edges(&graph), vec![("web", "db")]);
        assert_eq!(graph.startup_order().unwrap(), vec!["db", "web"]);
        assert_eq!(graph.shutdown_order().unwrap(), vec!["web", "db"]);
        assert_eq!(
            graph.parallel_groups().unwrap(),
            vec![vec!["db".to_string()], vec!["web".to_string()]]
        );
        assert!(graph.find_circular_dependencies().is_empty());
    }

    #[test]
    fn test_soft_edges_follow_explicit_order() {
        let graph = graph_of(
            r#"
version: "3.8"
services:
  app:
    image: myapp:1.0
    depends_on: [store]
    volumes: ["shared:/data"]
  store:
    image: minio/minio:latest
    volumes: ["shared:/data", "/srv:/srv"]
"#,
        );

        let soft: Vec<_> = graph.edges().iter().filter(|e| !e.required).collect();
        // default ネットワークと shared ボリュームで1本ずつ
        assert_eq!(soft.len(), 2);
        for edge in soft {
            assert_eq!(edge.source, "app");
            assert_eq!(edge.target, "store");
        }
        assert!(graph.find_circular_dependencies().is_empty());
    }

    #[test]
    fn test_soft_edges_do_not_delay_startup() {
        let graph = graph_of(
            r#"
version: "3.8"
services:
  a:
    image: busybox:1.36
  b:
    image: busybox:1.36
  c:
    image: busybox:1.36
"#,
        );

        // default ネットワークを共有するので3本のソフトエッジ
        assert_eq!(graph.edges().len(), 3);
        assert!(graph.edges().iter().all(|e| e.kind == DependencyKind::Network));
        assert_eq!(graph.parallel_groups().unwrap().len(), 1);
        assert!(graph.isolated_services().is_empty());
    }

    #[test]
    fn test_cycle_detected() {
        let graph = graph_of(
            r#"
version: "3.8"
services:
  a:
    image: busybox:1.36
    depends_on: [b]
  b:
    image: busybox:1.36
    depends_on: [a]
"#,
        );

        let err = graph.startup_order().unwrap_err();
        match err {
            StackError::CircularDependency { path } => {
                assert_eq!(path.first(), path.last());
                assert!(path.len() >= 3);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(graph.parallel_groups().is_err());
        assert!(graph.shutdown_order().is_err());

        let cycles = graph.find_circular_dependencies();
        assert_eq!(cycles, vec![vec!["a", "b", "a"]]);
    }

    #[test]
    fn test_found_cycles_are_real() {
        let graph = graph_of(
            r#"
version: "3.8"
services:
  a:
    image: busybox:1.36
    depends_on: [b]
  b:
    image: busybox:1.36
    depends_on: [c]
  c:
    image: busybox:1.36
    depends_on: [a]
  d:
    image: busybox:1.36
    depends_on: [d]
"#,
        );

        let cycles = graph.find_circular_dependencies();
        assert!(cycles.iter().any(|c| c == &["a", "b", "c", "a"]));
        assert!(cycles.iter().any(|c| c == &["d", "d"]));
        for cycle in &cycles {
            assert_eq!(cycle.first(), cycle.last());
            for pair in cycle.windows(2) {
                assert!(
                    graph
                        .edges()
                        .iter()
                        .any(|e| e.source == pair[0] && e.target == pair[1]),
                    "edge {} -> {} missing",
                    pair[0],
                    pair[1]
                );
            }
        }
    }

    #[test]
    fn test_levels_respect_dependencies() {
        let graph = graph_of(
            r#"
version: "3.8"
services:
  db:
    image: postgres:16
  cache:
    image: redis:7
  api:
    image: myapi:1.0
    depends_on: [db, cache]
  worker:
    image: myworker:1.0
    depends_on: [db]
  web:
    image: nginx:1.25
    depends_on: [api]
"#,
        );

        let groups = graph.parallel_groups().unwrap();
        assert_eq!(groups[0], vec!["cache", "db"]);
        assert_eq!(groups[1], vec!["api", "worker"]);
        assert_eq!(groups[2], vec!["web"]);

        let level_of = |name: &str| groups.iter().position(|g| g.iter().any(|s| s == name)).unwrap();
        for edge in graph.edges().iter().filter(|e| e.required) {
            assert!(level_of(&edge.target) < level_of(&edge.source));
        }

        let startup = graph.startup_order().unwrap();
        let mut shutdown = graph.shutdown_order().unwrap();
        shutdown.reverse();
        assert_eq!(startup, shutdown);
    }

    #[test]
    fn test_isolated_and_critical_services() {
        let graph = graph_of(
            r#"
version: "3.8"
services:
  db:
    image: postgres:16
    networks: [backend]
  api:
    image: myapi:1.0
    depends_on: [db]
    networks: [backend]
  worker:
    image: myworker:1.0
    depends_on: [db]
    networks: [backend]
  report:
    image: myreport:1.0
    depends_on:
      db:
        condition: service_healthy
    networks: [backend]
  lonely:
    image: busybox:1.36
    networks: [island]
networks:
  backend:
  island:
"#,
        );

        assert_eq!(graph.isolated_services(), vec!["lonely"]);
        assert_eq!(graph.critical_services(), vec!["db"]);
        assert_eq!(graph.dependents_of("db"), vec!["api", "report", "worker"]);

        let report_deps = graph.dependencies_of("report");
        let explicit = report_deps
            .iter()
            .find(|e| e.kind == DependencyKind::Explicit)
            .unwrap();
        assert_eq!(explicit.condition.as_deref(), Some("service_healthy"));
    }

    #[test]
    fn test_dangling_dependency_kept_but_not_scheduled() {
        let graph = graph_of(
            r#"
version: "3.8"
services:
  web:
    image: nginx:1.25
    depends_on: [ghost]
"#,
        );

        assert_eq!(graph.dangling_dependencies().len(), 1);
        assert_eq!(graph.startup_order().unwrap(), vec!["web"]);
    }
}
