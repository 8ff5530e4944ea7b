//! Region graph over the time function.
//!
//! Nodes are regions of the sketch: *interfaces* sit on critical isolines where
//! courses split or merge, *simple* regions span a time interval between one
//! input and one output isoline. Edges are the isoline boundaries between an
//! interface and a simple region, each carrying its time and course path.

use std::collections::{HashMap, VecDeque};
use std::fmt;

use super::course::CoursePath;

/// Region identifier (index into the node table).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct RegionId(pub usize);

/// Boundary identifier (index into the edge table).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct EdgeId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegionKind {
    Interface,
    Simple,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegionNode {
    pub id: RegionId,
    pub kind: RegionKind,
    pub inputs: Vec<EdgeId>,
    pub outputs: Vec<EdgeId>,
    pub t_min: f64,
    pub t_max: f64,
    /// User-provided split times.
    pub split_hints: Vec<f64>,
    pub sample_count: usize,
}

impl RegionNode {
    #[must_use]
    pub fn is_interface(&self) -> bool {
        self.kind == RegionKind::Interface
    }

    #[must_use]
    pub fn is_simple(&self) -> bool {
        self.kind == RegionKind::Simple
    }

    #[must_use]
    pub fn time_range(&self) -> f64 {
        self.t_max - self.t_min
    }

    /// Interface with a single input and a single output.
    #[must_use]
    pub fn is_trivial_interface(&self) -> bool {
        self.is_interface() && self.inputs.len() == 1 && self.outputs.len() == 1
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegionEdge {
    pub id: EdgeId,
    pub source: RegionId,
    pub target: RegionId,
    pub time: f64,
    pub course: CoursePath,
}

/// Errors raised while building the region graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    UnknownRegion(RegionId),
    /// Edges must join an interface and a simple region.
    InvalidEndpoints { source: RegionId, target: RegionId },
    /// A simple region needs exactly one input and one output.
    NotSimple { region: RegionId, inputs: usize, outputs: usize },
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownRegion(RegionId(id)) => write!(f, "unknown region {id}"),
            Self::InvalidEndpoints { source, target } => write!(
                f,
                "edge {} -> {} must join an interface and a simple region",
                source.0, target.0
            ),
            Self::NotSimple {
                region,
                inputs,
                outputs,
            } => write!(
                f,
                "simple region {} has {inputs} inputs and {outputs} outputs",
                region.0
            ),
        }
    }
}

impl std::error::Error for GraphError {}

/// Error returned by [`RegionGraph::topological_order`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopologyError {
    /// The graph contains a cycle, given as a path that closes on itself.
    Cycle { cycle: Vec<RegionId> },
}

impl fmt::Display for TopologyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cycle { cycle } => {
                if cycle.is_empty() {
                    f.write_str("region graph contains a cycle")
                } else {
                    let chain = cycle
                        .iter()
                        .map(|RegionId(id)| id.to_string())
                        .collect::<Vec<_>>()
                        .join(" -> ");
                    write!(f, "region graph contains a cycle: {chain}")
                }
            }
        }
    }
}

impl std::error::Error for TopologyError {}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegionGraph {
    nodes: Vec<RegionNode>,
    edges: Vec<RegionEdge>,
}

impl RegionGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an interface node at a single time.
    pub fn add_interface(&mut self, time: f64) -> RegionId {
        self.push_node(RegionKind::Interface, time, time)
    }

    pub fn add_simple(&mut self, t_min: f64, t_max: f64) -> RegionId {
        self.push_node(RegionKind::Simple, t_min, t_max)
    }

    fn push_node(&mut self, kind: RegionKind, t_min: f64, t_max: f64) -> RegionId {
        let id = RegionId(self.nodes.len());
        self.nodes.push(RegionNode {
            id,
            kind,
            inputs: Vec::new(),
            outputs: Vec::new(),
            t_min,
            t_max,
            split_hints: Vec::new(),
            sample_count: 0,
        });
        id
    }

    /// Connects an interface and a simple region along an isoline.
    ///
    /// The edge time is the time of the interface endpoint.
    pub fn connect(
        &mut self,
        source: RegionId,
        target: RegionId,
        course: CoursePath,
    ) -> Result<EdgeId, GraphError> {
        let src = self.node(source).ok_or(GraphError::UnknownRegion(source))?;
        let trg = self.node(target).ok_or(GraphError::UnknownRegion(target))?;
        let time = match (src.kind, trg.kind) {
            (RegionKind::Interface, RegionKind::Simple) => src.t_min,
            (RegionKind::Simple, RegionKind::Interface) => trg.t_min,
            _ => return Err(GraphError::InvalidEndpoints { source, target }),
        };
        let id = EdgeId(self.edges.len());
        self.edges.push(RegionEdge {
            id,
            source,
            target,
            time,
            course,
        });
        self.nodes[source.0].outputs.push(id);
        self.nodes[target.0].inputs.push(id);
        Ok(id)
    }

    pub fn add_split_hint(&mut self, region: RegionId, time: f64) -> Result<(), GraphError> {
        let node = self
            .nodes
            .get_mut(region.0)
            .ok_or(GraphError::UnknownRegion(region))?;
        node.split_hints.push(time);
        Ok(())
    }

    #[must_use]
    pub fn node(&self, id: RegionId) -> Option<&RegionNode> {
        self.nodes.get(id.0)
    }

    #[must_use]
    pub fn edge(&self, id: EdgeId) -> Option<&RegionEdge> {
        self.edges.get(id.0)
    }

    #[must_use]
    pub fn nodes(&self) -> &[RegionNode] {
        &self.nodes
    }

    #[must_use]
    pub fn edges(&self) -> &[RegionEdge] {
        &self.edges
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn simple_regions(&self) -> impl Iterator<Item = &RegionNode> {
        self.nodes.iter().filter(|n| n.is_simple())
    }

    pub fn interfaces(&self) -> impl Iterator<Item = &RegionNode> {
        self.nodes.iter().filter(|n| n.is_interface())
    }

    /// Interface endpoint of an edge.
    #[must_use]
    pub fn edge_interface(&self, id: EdgeId) -> Option<RegionId> {
        let edge = self.edge(id)?;
        if self.node(edge.source)?.is_interface() {
            Some(edge.source)
        } else {
            Some(edge.target)
        }
    }

    /// Simple-region endpoint of an edge.
    #[must_use]
    pub fn edge_region(&self, id: EdgeId) -> Option<RegionId> {
        let edge = self.edge(id)?;
        if self.node(edge.source)?.is_simple() {
            Some(edge.source)
        } else {
            Some(edge.target)
        }
    }

    /// Checks that every simple region has exactly one input and one output.
    pub fn validate(&self) -> Result<(), GraphError> {
        for node in self.simple_regions() {
            if node.inputs.len() != 1 || node.outputs.len() != 1 {
                return Err(GraphError::NotSimple {
                    region: node.id,
                    inputs: node.inputs.len(),
                    outputs: node.outputs.len(),
                });
            }
        }
        Ok(())
    }

    pub(crate) fn set_sample_count(&mut self, id: RegionId, count: usize) {
        if let Some(node) = self.nodes.get_mut(id.0) {
            node.sample_count = count;
        }
    }

    /// Moves the source of an edge to another node.
    pub(crate) fn retarget_source(&mut self, edge: EdgeId, source: RegionId) {
        let old = self.edges[edge.0].source;
        self.nodes[old.0].outputs.retain(|&e| e != edge);
        self.nodes[source.0].outputs.push(edge);
        self.edges[edge.0].source = source;
    }

    pub(crate) fn set_time_range(&mut self, id: RegionId, t_min: f64, t_max: f64) {
        if let Some(node) = self.nodes.get_mut(id.0) {
            node.t_min = t_min;
            node.t_max = t_max;
        }
    }

    /// Kahn topological sort; ties are broken by region id.
    pub fn topological_order(&self) -> Result<Vec<RegionId>, TopologyError> {
        if self.nodes.is_empty() {
            return Ok(Vec::new());
        }

        let mut indegree = vec![0usize; self.nodes.len()];
        let mut adjacency: Vec<Vec<RegionId>> = vec![Vec::new(); self.nodes.len()];
        for edge in &self.edges {
            adjacency[edge.source.0].push(edge.target);
            indegree[edge.target.0] += 1;
        }
        for neighbours in &mut adjacency {
            neighbours.sort();
        }

        let mut queue: VecDeque<RegionId> = indegree
            .iter()
            .enumerate()
            .filter_map(|(id, &count)| (count == 0).then_some(RegionId(id)))
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());

        while let Some(node) = queue.pop_front() {
            order.push(node);
            for neighbour in &adjacency[node.0] {
                indegree[neighbour.0] -= 1;
                if indegree[neighbour.0] == 0 {
                    queue.push_back(*neighbour);
                }
            }
        }

        if order.len() == self.nodes.len() {
            return Ok(order);
        }
        let cycle = find_cycle(&adjacency).unwrap_or_default();
        Err(TopologyError::Cycle { cycle })
    }
}

fn find_cycle(adjacency: &[Vec<RegionId>]) -> Option<Vec<RegionId>> {
    #[derive(Clone, Copy, PartialEq, Eq)]
    enum VisitState {
        Unvisited,
        Visiting,
        Visited,
    }

    fn dfs(
        node: RegionId,
        adjacency: &[Vec<RegionId>],
        state: &mut HashMap<RegionId, VisitState>,
        stack: &mut Vec<RegionId>,
    ) -> Option<Vec<RegionId>> {
        state.insert(node, VisitState::Visiting);
        stack.push(node);

        for neighbour in &adjacency[node.0] {
            match state
                .get(neighbour)
                .copied()
                .unwrap_or(VisitState::Unvisited)
            {
                VisitState::Unvisited => {
                    if let Some(cycle) = dfs(*neighbour, adjacency, state, stack) {
                        return Some(cycle);
                    }
                }
                VisitState::Visiting => {
                    if let Some(position) = stack.iter().position(|n| n == neighbour) {
                        let mut cycle = stack[position..].to_vec();
                        cycle.push(*neighbour);
                        return Some(cycle);
                    }
                }
                VisitState::Visited => {}
            }
        }

        stack.pop();
        state.insert(node, VisitState::Visited);
        None
    }

    let mut state = HashMap::new();
    for node in (0..adjacency.len()).map(RegionId) {
        if state.get(&node).copied().unwrap_or(VisitState::Unvisited) == VisitState::Unvisited {
            let mut stack = Vec::new();
            if let Some(cycle) = dfs(node, adjacency, &mut state, &mut stack) {
                return Some(cycle);
            }
        }
    }
    None
}
