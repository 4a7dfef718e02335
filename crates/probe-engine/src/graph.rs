//! Scenario dependency ordering, via `petgraph`.
//!
//! `depends_on` edges are resolved against the scenario set present in the
//! same task; a dependency id that names no scenario in the task is simply
//! never added as an edge (mirrors the original job runner, which looked up
//! prior results by id and treated a miss as "no constraint").

use std::collections::HashMap;

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use probe_shared::Scenario;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("scenario dependency graph contains a cycle")]
    Cycle,
}

/// Returns the task's scenarios in an order that respects `depends_on`.
pub fn order(scenarios: Vec<Scenario>) -> Result<Vec<Scenario>, GraphError> {
    let mut graph = DiGraph::<Uuid, ()>::with_capacity(scenarios.len(), scenarios.len());
    let mut indices: HashMap<Uuid, NodeIndex> = HashMap::with_capacity(scenarios.len());

    for scenario in &scenarios {
        let index = graph.add_node(scenario.id);
        indices.insert(scenario.id, index);
    }

    for scenario in &scenarios {
        let dependent = indices[&scenario.id];
        for dependency in &scenario.depends_on {
            if let Some(&prerequisite) = indices.get(dependency) {
                graph.add_edge(prerequisite, dependent, ());
            }
        }
    }

    let sorted_indices = toposort(&graph, None).map_err(|_| GraphError::Cycle)?;

    let mut by_id: HashMap<Uuid, Scenario> =
        scenarios.into_iter().map(|s| (s.id, s)).collect();
    let ordered = sorted_indices
        .into_iter()
        .filter_map(|index| by_id.remove(&graph[index]))
        .collect();
    Ok(ordered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap as StdHashMap, HashSet};

    fn scenario(id: Uuid, depends_on: HashSet<Uuid>) -> Scenario {
        Scenario {
            id,
            url: "/x".to_string(),
            method: "GET".to_string(),
            body: None,
            status_code: 200,
            response: serde_json::Value::Null,
            ignored_properties: HashSet::new(),
            depends_on,
            additional_data: StdHashMap::new(),
        }
    }

    #[test]
    fn orders_dependents_after_their_prerequisites() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();

        let scenarios = vec![
            scenario(c, HashSet::from([b])),
            scenario(a, HashSet::new()),
            scenario(b, HashSet::from([a])),
        ];

        let ordered = order(scenarios).expect("acyclic graph orders fine");
        let positions: StdHashMap<Uuid, usize> = ordered
            .iter()
            .enumerate()
            .map(|(i, s)| (s.id, i))
            .collect();

        assert!(positions[&a] < positions[&b]);
        assert!(positions[&b] < positions[&c]);
    }

    #[test]
    fn rejects_a_cyclic_dependency_set() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        let scenarios = vec![
            scenario(a, HashSet::from([b])),
            scenario(b, HashSet::from([a])),
        ];

        let err = order(scenarios).unwrap_err();
        assert!(matches!(err, GraphError::Cycle));
    }

    #[test]
    fn ignores_a_dependency_id_absent_from_the_task() {
        let a = Uuid::new_v4();
        let dangling = Uuid::new_v4();

        let scenarios = vec![scenario(a, HashSet::from([dangling]))];
        let ordered = order(scenarios).expect("dangling dependency id is not an error");
        assert_eq!(ordered.len(), 1);
    }
}
