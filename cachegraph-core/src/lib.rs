//! Cachegraph Core
//!
//! An immutable, dependency-aware computation cache. Values live in a
//! directed acyclic graph of named nodes:
//!
//! - Primitive nodes hold values set from outside
//! - Computable nodes derive their value from their parents, either through
//!   a function or by being set externally
//!
//! Every change produces a new snapshot. Snapshots share unchanged nodes, so
//! keeping old ones around is cheap, and they can be read from many threads
//! at once.
//!
//! # Architecture
//!
//! - `value`: the [`Duplicable`] contract and stock value types
//! - `graph`: node types and the validated graph structure
//! - `cache`: the builder, snapshots and the evaluation engine
//! - `config`: snapshot settings
//! - `error`: the crate error type
//!
//! # Example
//!
//! ```rust
//! use cachegraph_core::{node_function, DuplicableNumber, ImmutableComputableGraph};
//!
//! let graph = ImmutableComputableGraph::builder()
//!     .primitive_node("x", &[], None)
//!     .computable_node(
//!         "doubled",
//!         &["report"],
//!         &["x"],
//!         Some(node_function(|parents| {
//!             Ok(DuplicableNumber::shared(parents.fetch::<f64>("x")? * 2.0))
//!         })),
//!         true,
//!     )
//!     .build()?;
//!
//! let graph = graph
//!     .set_value("x", DuplicableNumber::shared(4.0))?
//!     .update_caches_for_tag("report")?;
//!
//! let doubled = graph.fetch_directly("doubled")?;
//! assert_eq!(doubled.value_as::<f64>(), Some(&8.0));
//! # Ok::<(), cachegraph_core::CacheError>(())
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod graph;
pub mod value;

pub use cache::{ImmutableComputableGraph, ImmutableComputableGraphBuilder};
pub use config::{CacheConfig, UpdatePolicy};
pub use error::{CacheError, Result};
pub use graph::{
    node_function, CacheNode, ComputableCacheNode, ComputableGraphStructure,
    ComputableNodeFunction, NodeFunction, NodeStatus, ParentValues, PrimitiveCacheNode,
};
pub use value::{Duplicable, DuplicableArray, DuplicableNumber, DuplicableValue};
