// Query execution engine

use std::collections::{HashMap, HashSet, VecDeque};

use anyhow::{Context, Result};

use crate::graph::cycles::{detect_cycles, CircularChain};
use crate::store::db::{IndexStore, SearchHit};
use crate::store::{DependencyType, EdgeRecord};

/// Traversal direction for dependency queries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Dependencies,
    Dependents,
    Both,
}

impl Direction {
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "dependencies" => Ok(Direction::Dependencies),
            "dependents" => Ok(Direction::Dependents),
            "both" => Ok(Direction::Both),
            _ => anyhow::bail!("Unknown direction: {} (use dependencies|dependents|both)", s),
        }
    }
}

/// Dependency query result for one file
#[derive(Debug, Clone, serde::Serialize)]
pub struct DependencyReport {
    pub direct: Vec<String>,
    pub indirect: Vec<String>,
    pub cycles: Vec<CircularChain>,
    pub count: usize,
}

/// Read-side query surface over the index store
pub struct QueryEngine {
    store: IndexStore,
    max_limit: usize,
}

impl QueryEngine {
    pub fn new(store: IndexStore, max_limit: usize) -> Self {
        Self { store, max_limit }
    }

    /// Full-text search over file content. The limit is clamped to the
    /// configured maximum.
    pub fn search(
        &self,
        term: &str,
        repository_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<SearchHit>> {
        let limit = limit.clamp(1, self.max_limit);
        self.store.search(term, repository_id, limit)
    }

    /// Direct and transitive file dependencies in either (or both)
    /// directions, with the cycles the file participates in.
    pub fn file_dependencies(
        &self,
        repository_id: &str,
        path: &str,
        direction: Direction,
        depth: usize,
        include_cycles: bool,
    ) -> Result<DependencyReport> {
        let file_id = self
            .store
            .file_id(repository_id, path)?
            .with_context(|| format!("File not indexed: {}", path))?;

        let edges = self.store.edges_for_repository(repository_id)?;
        let paths = self.store.file_paths_by_id(repository_id)?;

        let forward = file_adjacency(&edges, false);
        let reverse = file_adjacency(&edges, true);

        let (mut direct_ids, mut indirect_ids) = (HashSet::new(), HashSet::new());
        if matches!(direction, Direction::Dependencies | Direction::Both) {
            bfs(&forward, file_id, depth, &mut direct_ids, &mut indirect_ids);
        }
        if matches!(direction, Direction::Dependents | Direction::Both) {
            bfs(&reverse, file_id, depth, &mut direct_ids, &mut indirect_ids);
        }
        indirect_ids.retain(|id| !direct_ids.contains(id));

        let to_paths = |ids: &HashSet<i64>| -> Vec<String> {
            let mut out: Vec<String> = ids
                .iter()
                .filter_map(|id| paths.get(id).cloned())
                .collect();
            out.sort();
            out
        };

        let direct = to_paths(&direct_ids);
        let indirect = to_paths(&indirect_ids);

        let cycles = if include_cycles {
            let names = self.store.symbol_names_by_id(repository_id)?;
            detect_cycles(&edges, &paths, &names)
                .into_iter()
                .filter(|c| {
                    c.dependency_type == DependencyType::FileImport && c.chain.contains(&file_id)
                })
                .collect()
        } else {
            Vec::new()
        };

        let count = direct.len() + indirect.len();
        Ok(DependencyReport {
            direct,
            indirect,
            cycles,
            count,
        })
    }

    /// All cycles in a repository's dependency graph, both granularities.
    pub fn repository_cycles(&self, repository_id: &str) -> Result<Vec<CircularChain>> {
        let edges = self.store.edges_for_repository(repository_id)?;
        let paths = self.store.file_paths_by_id(repository_id)?;
        let names = self.store.symbol_names_by_id(repository_id)?;
        Ok(detect_cycles(&edges, &paths, &names))
    }
}

fn file_adjacency(edges: &[EdgeRecord], reversed: bool) -> HashMap<i64, Vec<i64>> {
    let mut adjacency: HashMap<i64, Vec<i64>> = HashMap::new();
    for edge in edges {
        if edge.dependency_type != DependencyType::FileImport {
            continue;
        }
        if let (Some(from), Some(to)) = (edge.from_file_id, edge.to_file_id) {
            let (from, to) = if reversed { (to, from) } else { (from, to) };
            adjacency.entry(from).or_default().push(to);
        }
    }
    adjacency
}

/// Breadth-first traversal from `start`, splitting reachable nodes into the
/// depth-1 frontier and everything deeper, up to `depth` levels.
fn bfs(
    adjacency: &HashMap<i64, Vec<i64>>,
    start: i64,
    depth: usize,
    direct: &mut HashSet<i64>,
    indirect: &mut HashSet<i64>,
) {
    let mut queue: VecDeque<(i64, usize)> = VecDeque::new();
    let mut visited: HashSet<i64> = HashSet::new();
    queue.push_back((start, 0));
    visited.insert(start);

    while let Some((node, level)) = queue.pop_front() {
        if level >= depth {
            continue;
        }
        if let Some(neighbors) = adjacency.get(&node) {
            for &next in neighbors {
                if visited.insert(next) {
                    if level == 0 {
                        direct.insert(next);
                    } else {
                        indirect.insert(next);
                    }
                    queue.push_back((next, level + 1));
                }
            }
        }
    }
}
