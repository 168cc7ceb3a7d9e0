//! Dependence graphs over memory accesses.
//!
//! The raw graph is produced by an external builder: nodes are memory
//! accesses of the enclosing function, edges carry the dependence kind and
//! the loop levels involved. Levels are relative to the loop the graph was
//! built for:
//! - `common_level`: number of loops enclosing both endpoints (0: none)
//! - `carry_level`: loop level carrying the dependence (0: the analyzed loop)

use crate::ir::{ExprId, Program};
use crate::utils::errors::{DependenceError, DependenceErrorKind};
use bitflags::bitflags;
use serde::{Serialize, Deserialize};
use std::fmt;

bitflags! {
    /// Kind of a dependence. Builders may combine several kinds on one edge.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct DependenceKind: u8 {
        /// Read after write
        const TRUE = 0b0000_0001;
        /// Write after read
        const ANTI = 0b0000_0010;
        /// Write after write
        const OUTPUT = 0b0000_0100;
        /// Between two references to the same scalar
        const SCALAR = 0b0000_1000;
        /// Scalar dependence against the loop direction
        const SCALAR_BACK = 0b0001_0000;
    }
}

impl DependenceKind {
    /// Has SCALAR or SCALAR_BACK.
    pub fn is_scalar_kind(&self) -> bool {
        self.intersects(DependenceKind::SCALAR | DependenceKind::SCALAR_BACK)
    }

    /// Has TRUE, ANTI or OUTPUT.
    pub fn is_data_kind(&self) -> bool {
        self.intersects(DependenceKind::TRUE | DependenceKind::ANTI | DependenceKind::OUTPUT)
    }
}

impl fmt::Display for DependenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "NONE");
        }
        let names: Vec<&str> = self.iter_names().map(|(name, _)| name).collect();
        write!(f, "{}", names.join("|"))
    }
}

/// Index of a node in a [`DependenceGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// A dependence between two memory accesses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependenceEdge {
    /// Source node
    pub source: NodeId,
    /// Sink node
    pub sink: NodeId,
    /// Kind of dependence
    pub kind: DependenceKind,
    /// Loop levels enclosing both endpoints
    pub common_level: usize,
    /// Level carrying the dependence, 0 for the analyzed loop
    pub carry_level: usize,
    /// Distance vector (if uniform), outermost level first
    #[serde(default)]
    pub distance: Option<Vec<i64>>,
}

impl DependenceEdge {
    pub fn new(source: NodeId, sink: NodeId, kind: DependenceKind) -> Self {
        Self {
            source,
            sink,
            kind,
            common_level: 1,
            carry_level: 0,
            distance: None,
        }
    }

    /// Set common and carry levels.
    pub fn levels(mut self, common_level: usize, carry_level: usize) -> Self {
        self.common_level = common_level;
        self.carry_level = carry_level;
        self
    }

    pub fn with_distance(mut self, distance: Vec<i64>) -> Self {
        self.distance = Some(distance);
        self
    }

    /// Distance at a loop level, if known.
    pub fn distance_at(&self, level: usize) -> Option<i64> {
        self.distance.as_ref().and_then(|d| d.get(level).copied())
    }
}

impl fmt::Display for DependenceEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {} [{}] common={} carry={}",
            self.source, self.sink, self.kind, self.common_level, self.carry_level
        )?;
        if let Some(ref d) = self.distance {
            let d: Vec<String> = d.iter().map(|x| x.to_string()).collect();
            write!(f, " dist=({})", d.join(", "))?;
        }
        Ok(())
    }
}

/// A node: one memory access and its outgoing edges.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DepNode {
    /// The access; `None` is an empty reference
    pub access: Option<ExprId>,
    /// Outgoing edges in builder order
    #[serde(default)]
    pub edges: Vec<DependenceEdge>,
}

/// A dependence graph for one analyzed loop.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DependenceGraph {
    pub nodes: Vec<DepNode>,
}

impl DependenceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node for an access (or an empty reference).
    pub fn add_node(&mut self, access: Option<ExprId>) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(DepNode { access, edges: Vec::new() });
        id
    }

    /// Node of an access, adding one if the access has none yet.
    pub fn node_for(&mut self, access: ExprId) -> NodeId {
        match self.find_node(access) {
            Some(id) => id,
            None => self.add_node(Some(access)),
        }
    }

    pub fn find_node(&self, access: ExprId) -> Option<NodeId> {
        self.nodes
            .iter()
            .position(|n| n.access == Some(access))
            .map(|i| NodeId(i as u32))
    }

    /// Add an edge to its source node.
    pub fn add_edge(&mut self, edge: DependenceEdge) -> Result<(), DependenceError> {
        self.check_node(edge.sink)?;
        self.check_node(edge.source)?;
        self.nodes[edge.source.index()].edges.push(edge);
        Ok(())
    }

    fn check_node(&self, node: NodeId) -> Result<(), DependenceError> {
        if node.index() < self.nodes.len() {
            Ok(())
        } else {
            Err(DependenceError::new(
                DependenceErrorKind::DanglingEndpoint,
                format!("edge endpoint {} is not a node of the graph", node),
            ))
        }
    }

    /// Access of a node.
    pub fn access(&self, node: NodeId) -> Result<Option<ExprId>, DependenceError> {
        self.check_node(node)?;
        Ok(self.nodes[node.index()].access)
    }

    pub fn edge_count(&self) -> usize {
        self.nodes.iter().map(|n| n.edges.len()).sum()
    }

    /// All edges, node by node.
    pub fn edges(&self) -> impl Iterator<Item = &DependenceEdge> {
        self.nodes.iter().flat_map(|n| n.edges.iter())
    }

    /// Check endpoints and accesses against the program the graph was
    /// built for.
    pub fn validate(&self, program: &Program) -> Result<(), DependenceError> {
        for (i, node) in self.nodes.iter().enumerate() {
            if let Some(access) = node.access {
                if access.index() >= program.exprs.len() {
                    return Err(DependenceError::new(
                        DependenceErrorKind::UnknownAccess,
                        format!("node n{} refers to missing access {}", i, access),
                    ));
                }
            }
            for edge in &node.edges {
                self.check_node(edge.source)?;
                self.check_node(edge.sink)?;
            }
        }
        Ok(())
    }
}

/// Minimum absolute distance at a level across edges with a known
/// distance vector.
pub fn min_abs_distance<'a>(edges: impl IntoIterator<Item = &'a DependenceEdge>, level: usize) -> Option<i64> {
    edges
        .into_iter()
        .filter_map(|e| e.distance_at(level))
        .map(|d| d.abs())
        .min()
}
