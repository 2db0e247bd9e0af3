//! Dependency Graph
//!
//! Node types and the validated, immutable graph structure shared by every
//! snapshot.
//!
//! # Overview
//!
//! The graph is a directed acyclic graph where:
//!
//! - Nodes are primitive values set from outside, or computable values
//!   derived from their parents
//! - Edges run from a parent to each node that reads it
//!
//! Setting a primitive traverses child edges to find every node whose cached
//! value is now stale. Evaluating a node traverses parent edges to gather its
//! inputs.
//!
//! # Design Decisions
//!
//! 1. Nodes are addressed by a dense slot index assigned in declaration
//!    order. The structure maps keys to slots once, so snapshots can store
//!    their nodes in a plain slice.
//!
//! 2. Topological order, adjacency in both directions and induced tags are
//!    computed once at build time and never change.

mod node;
mod structure;

pub use node::{
    node_function, CacheNode, ComputableCacheNode, ComputableNodeFunction, NodeFunction,
    NodeStatus, ParentValues, PrimitiveCacheNode,
};
pub use structure::ComputableGraphStructure;
