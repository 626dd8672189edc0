// Cycle detection over the dependency graph

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::store::{DependencyType, EdgeRecord};

/// A closed loop in the dependency graph. `chain` repeats the entry node as
/// its last element; computed on demand, never persisted.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CircularChain {
    pub dependency_type: DependencyType,
    pub chain: Vec<i64>,
    pub description: String,
}

/// Detect every cycle, per dependency type.
///
/// File-import edges and symbol-usage edges form separate graphs; a cycle is
/// never reported across types. Each graph is explored with depth-first
/// search tracking the recursion stack: revisiting an on-stack node emits
/// the stack slice from that node plus the repeated node. Fully explored
/// nodes are not re-expanded. A self-loop is a valid two-element chain.
pub fn detect_cycles(
    edges: &[EdgeRecord],
    file_paths: &HashMap<i64, String>,
    symbol_names: &HashMap<i64, String>,
) -> Vec<CircularChain> {
    let mut chains = Vec::new();

    for (dependency_type, labels) in [
        (DependencyType::FileImport, file_paths),
        (DependencyType::SymbolUsage, symbol_names),
    ] {
        let adjacency = build_adjacency(edges, dependency_type);
        let mut state = DfsState::default();

        // BTreeMap keys give a deterministic exploration order
        let nodes: Vec<i64> = adjacency.keys().copied().collect();
        for node in nodes {
            if !state.visited.contains(&node) {
                visit(node, &adjacency, &mut state, dependency_type, labels, &mut chains);
            }
        }
    }

    chains
}

fn build_adjacency(edges: &[EdgeRecord], dependency_type: DependencyType) -> BTreeMap<i64, Vec<i64>> {
    let mut adjacency: BTreeMap<i64, Vec<i64>> = BTreeMap::new();
    let mut seen: HashSet<(i64, i64)> = HashSet::new();

    for edge in edges {
        if edge.dependency_type != dependency_type {
            continue;
        }
        let pair = match dependency_type {
            DependencyType::FileImport => edge.from_file_id.zip(edge.to_file_id),
            DependencyType::SymbolUsage => edge.from_symbol_id.zip(edge.to_symbol_id),
        };
        let Some((from, to)) = pair else { continue };
        if seen.insert((from, to)) {
            adjacency.entry(from).or_default().push(to);
            adjacency.entry(to).or_default();
        }
    }

    adjacency
}

#[derive(Default)]
struct DfsState {
    visited: HashSet<i64>,
    on_stack: HashSet<i64>,
    stack: Vec<i64>,
}

fn visit(
    node: i64,
    adjacency: &BTreeMap<i64, Vec<i64>>,
    state: &mut DfsState,
    dependency_type: DependencyType,
    labels: &HashMap<i64, String>,
    chains: &mut Vec<CircularChain>,
) {
    state.visited.insert(node);
    state.on_stack.insert(node);
    state.stack.push(node);

    if let Some(neighbors) = adjacency.get(&node) {
        for &next in neighbors {
            if state.on_stack.contains(&next) {
                let start = state
                    .stack
                    .iter()
                    .position(|&n| n == next)
                    .unwrap_or(state.stack.len() - 1);
                let mut chain: Vec<i64> = state.stack[start..].to_vec();
                chain.push(next);
                let description = describe(&chain, labels);
                chains.push(CircularChain {
                    dependency_type,
                    chain,
                    description,
                });
            } else if !state.visited.contains(&next) {
                visit(next, adjacency, state, dependency_type, labels, chains);
            }
        }
    }

    state.stack.pop();
    state.on_stack.remove(&node);
}

fn describe(chain: &[i64], labels: &HashMap<i64, String>) -> String {
    chain
        .iter()
        .map(|id| labels.get(id).cloned().unwrap_or_else(|| id.to_string()))
        .collect::<Vec<_>>()
        .join(" -> ")
}
