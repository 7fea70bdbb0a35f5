//! Fragment dependency DAG (spec §4.4): fragments sharing an `event_id`
//! are grouped, `dependency_hints` form edges, and the processor computes
//! a topological order so independent layers can run concurrently.
//!
//! Grounded on the source repo's optional `petgraph-compat` shim
//! (`src/graphs/petgraph_compat.rs`): this subsystem promotes `petgraph`
//! from an optional compatibility feature to a required dependency
//! because toposort + cycle detection here is load-bearing, not optional
//! (spec §4.4, invariant 4).

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use rustc_hash::FxHashMap;

use crate::model::ChangeFragment;

use super::error::BatchError;

/// One concurrency layer: fragments with no remaining unresolved
/// dependency on a fragment in an earlier layer.
pub type Layer = Vec<ChangeFragment>;

/// Topologically order `fragments` (all sharing one `event_id`) into
/// layers that can each run with `max_concurrent_writes` parallelism.
/// Fails the whole event with [`BatchError::DependencyCycle`] if
/// `dependency_hints` describe a cycle — per spec, no writes happen in
/// that case.
pub fn layer_fragments(event_id: &str, fragments: Vec<ChangeFragment>) -> Result<Vec<Layer>, BatchError> {
    let mut graph = DiGraph::<(), ()>::new();
    let mut index_of: FxHashMap<String, NodeIndex> = FxHashMap::default();
    let mut fragment_of: FxHashMap<NodeIndex, ChangeFragment> = FxHashMap::default();

    for fragment in &fragments {
        let idx = graph.add_node(());
        index_of.insert(fragment.id.clone(), idx);
    }
    for fragment in fragments {
        let idx = index_of[&fragment.id];
        for dep in &fragment.dependency_hints {
            if let Some(&dep_idx) = index_of.get(dep) {
                // edge dep -> fragment: dep must be written first.
                graph.add_edge(dep_idx, idx, ());
            }
        }
        fragment_of.insert(idx, fragment);
    }

    let order = toposort(&graph, None).map_err(|_| BatchError::DependencyCycle {
        event_id: event_id.to_string(),
    })?;

    // Group into layers: a node's layer is 1 + max(layer of its
    // predecessors), so independent subtrees land in the same layer and
    // can run concurrently.
    let mut layer_of: FxHashMap<NodeIndex, usize> = FxHashMap::default();
    for &node in &order {
        let layer = graph
            .neighbors_directed(node, petgraph::Direction::Incoming)
            .map(|pred| layer_of.get(&pred).copied().unwrap_or(0) + 1)
            .max()
            .unwrap_or(0);
        layer_of.insert(node, layer);
    }

    let max_layer = layer_of.values().copied().max().unwrap_or(0);
    let mut layers: Vec<Layer> = vec![Vec::new(); max_layer + 1];
    for node in order {
        let layer_idx = layer_of[&node];
        if let Some(fragment) = fragment_of.remove(&node) {
            layers[layer_idx].push(fragment);
        }
    }
    Ok(layers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FragmentChangeType, FragmentOperation};
    use serde_json::json;

    fn fragment(id: &str, change_type: FragmentChangeType, deps: &[&str]) -> ChangeFragment {
        let mut f = ChangeFragment::new(id, "evt1", change_type, FragmentOperation::Add, json!({}));
        for dep in deps {
            f = f.depends_on(*dep);
        }
        f
    }

    #[test]
    fn entities_precede_dependent_relationship() {
        let fragments = vec![
            fragment("A", FragmentChangeType::Entity, &[]),
            fragment("B", FragmentChangeType::Entity, &[]),
            fragment("R", FragmentChangeType::Relationship, &["A", "B"]),
        ];
        let layers = layer_fragments("evt1", fragments).unwrap();
        assert_eq!(layers.len(), 2);
        let layer0_ids: Vec<_> = layers[0].iter().map(|f| f.id.clone()).collect();
        assert!(layer0_ids.contains(&"A".to_string()));
        assert!(layer0_ids.contains(&"B".to_string()));
        assert_eq!(layers[1][0].id, "R");
    }

    #[test]
    fn cycle_is_rejected() {
        let fragments = vec![fragment("A", FragmentChangeType::Entity, &["B"]), fragment("B", FragmentChangeType::Entity, &["A"])];
        let err = layer_fragments("evt1", fragments).unwrap_err();
        assert!(matches!(err, BatchError::DependencyCycle { .. }));
    }

    #[test]
    fn independent_fragments_share_a_layer() {
        let fragments = vec![
            fragment("A", FragmentChangeType::Entity, &[]),
            fragment("B", FragmentChangeType::Entity, &[]),
        ];
        let layers = layer_fragments("evt1", fragments).unwrap();
        assert_eq!(layers.len(), 1);
        assert_eq!(layers[0].len(), 2);
    }
}
