use petgraph::algo::{connected_components, is_cyclic_undirected};
use petgraph::graph::UnGraph;

use crate::error::{DopfError, DopfResult};
use crate::network::NetworkModel;
use crate::{BusId, LineId};

/// Summary of the feeder graph reported by `dopf pf`.
#[derive(Debug, Clone, PartialEq)]
pub struct FeederStats {
    pub bus_count: usize,
    pub line_count: usize,
    pub connected_components: usize,
    /// Largest number of lines between the substation and any bus.
    pub depth: usize,
    pub leaf_count: usize,
}

/// Undirected graph with one node per bus and one edge per line, in arena order.
pub fn feeder_graph(model: &NetworkModel) -> UnGraph<BusId, LineId> {
    let mut graph = UnGraph::with_capacity(model.num_buses(), model.num_lines());
    let nodes: Vec<_> = (0..model.num_buses())
        .map(|index| graph.add_node(BusId::new(index)))
        .collect();
    for (index, line) in model.lines().iter().enumerate() {
        graph.add_edge(
            nodes[line.from.value()],
            nodes[line.to.value()],
            LineId::new(index),
        );
    }
    graph
}

/// Rejects line sets that close a loop (parallel lines and self-loops included).
pub fn ensure_radial(model: &NetworkModel) -> DopfResult<()> {
    let graph = feeder_graph(model);
    if is_cyclic_undirected(&graph) {
        return Err(DopfError::NotRadial(format!(
            "{} lines over {} buses contain a cycle",
            model.num_lines(),
            model.num_buses()
        )));
    }
    Ok(())
}

/// Depth and leaf statistics of a sorted feeder.
pub fn feeder_stats(model: &NetworkModel) -> FeederStats {
    let graph = feeder_graph(model);
    let mut depth = vec![0usize; model.num_buses()];
    for line in model.lines() {
        // sorted arenas list parents before children
        depth[line.to.value()] = depth[line.from.value()] + 1;
    }
    let leaf_count = model
        .buses()
        .iter()
        .filter(|bus| bus.from_line().is_some() && bus.to_lines().is_empty())
        .count();
    FeederStats {
        bus_count: model.num_buses(),
        line_count: model.num_lines(),
        connected_components: connected_components(&graph),
        depth: depth.into_iter().max().unwrap_or(0),
        leaf_count,
    }
}
