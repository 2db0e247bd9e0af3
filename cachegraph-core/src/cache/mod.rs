//! Immutable Cache
//!
//! The user-facing side of the crate: the builder, the immutable snapshot
//! type and the evaluation engine both of them share.
//!
//! # Overview
//!
//! A graph is declared once through [`ImmutableComputableGraphBuilder`]. The
//! resulting [`ImmutableComputableGraph`] is a snapshot: setting a value or
//! refreshing caches returns a new snapshot and leaves the old one intact.
//!
//! Evaluation walks parents depth first and evaluates every node at most once
//! per operation. Caching nodes keep what they computed in the returned
//! snapshot; non-caching nodes are recomputed whenever they are needed.

mod builder;
mod evaluation;
mod snapshot;

pub use builder::ImmutableComputableGraphBuilder;
pub use snapshot::ImmutableComputableGraph;
