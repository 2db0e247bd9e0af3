//! Immutable Computable Graph
//!
//! A snapshot pairs the shared [`ComputableGraphStructure`] with one node per
//! slot. Every operation that changes a value returns a new snapshot; the
//! receiver is never modified, so older snapshots stay valid and can be read
//! from any thread without coordination.
//!
//! # Sharing
//!
//! A new snapshot holds the same `Arc<CacheNode>` as its predecessor for every
//! node the operation did not touch. Only nodes on the invalidation or
//! recomputation path are replaced. `get_cache_node` exposes the `Arc` so
//! callers can check identity with `Arc::ptr_eq`.
//!
//! # Strict and best-effort updates
//!
//! `update_*` operations fail on the first node whose inputs are missing and
//! return no snapshot at all. The `*_if_possible` variants skip such nodes and
//! leave them un-updated. Neither variant suppresses any other error.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, trace};

use super::builder::ImmutableComputableGraphBuilder;
use super::evaluation::{Evaluation, Evaluator};
use crate::config::{CacheConfig, UpdatePolicy};
use crate::error::{CacheError, Result};
use crate::graph::{CacheNode, ComputableGraphStructure, NodeStatus};
use crate::value::DuplicableValue;

/// One immutable state of a computable graph.
#[derive(Clone)]
pub struct ImmutableComputableGraph {
    structure: Arc<ComputableGraphStructure>,
    nodes: Arc<[Arc<CacheNode>]>,
    config: CacheConfig,
}

impl ImmutableComputableGraph {
    pub fn builder() -> ImmutableComputableGraphBuilder {
        ImmutableComputableGraphBuilder::new()
    }

    pub(crate) fn new(
        structure: Arc<ComputableGraphStructure>,
        nodes: Vec<CacheNode>,
        config: CacheConfig,
    ) -> Self {
        Self {
            structure,
            nodes: nodes.into_iter().map(Arc::new).collect(),
            config,
        }
    }

    fn with_nodes(&self, nodes: Vec<Arc<CacheNode>>) -> Self {
        Self {
            structure: Arc::clone(&self.structure),
            nodes: nodes.into(),
            config: self.config,
        }
    }

    pub fn computable_graph_structure(&self) -> &Arc<ComputableGraphStructure> {
        &self.structure
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The node currently stored under `key`.
    pub fn get_cache_node(&self, key: &str) -> Result<&Arc<CacheNode>> {
        Ok(&self.nodes[self.structure.index_of(key)?])
    }

    pub fn node_status(&self, key: &str) -> Result<NodeStatus> {
        Ok(self.get_cache_node(key)?.status())
    }

    /// Set the value of a primitive or externally computed node.
    ///
    /// Every computable descendant is replaced by a node without a cached
    /// value, including descendants reached only through non-caching nodes.
    /// With auto-update enabled, the configured refresh runs afterwards.
    pub fn set_value(&self, key: &str, value: DuplicableValue) -> Result<Self> {
        let index = self.structure.index_of(key)?;
        let updated = self.nodes[index].set(value)?;

        let mut nodes = self.nodes.to_vec();
        nodes[index] = Arc::new(updated);

        let descendants = self.structure.descendant_indices(index);
        for &descendant in &descendants {
            let outdated = match nodes[descendant].as_ref() {
                CacheNode::Computable(node) => node.duplicate_with_outdated_cache_status(),
                CacheNode::Primitive(_) => continue,
            };
            trace!(node = self.structure.key_of(descendant), "invalidated node");
            nodes[descendant] = Arc::new(outdated.into());
        }
        debug!(node = key, invalidated = descendants.len(), "set node value");

        let graph = self.with_nodes(nodes);
        if self.config.auto_update {
            graph.refresh(self.config.update_policy)
        } else {
            Ok(graph)
        }
    }

    /// True if the node holds a value that can be read without evaluating
    /// anything.
    pub fn is_value_directly_available(&self, key: &str) -> Result<bool> {
        Ok(self.get_cache_node(key)?.has_value())
    }

    /// The stored value of a node. Never evaluates anything.
    pub fn fetch_directly(&self, key: &str) -> Result<DuplicableValue> {
        self.get_cache_node(key)?
            .value()
            .cloned()
            .ok_or_else(|| CacheError::ValueNotDirectlyAvailable {
                key: key.to_string(),
            })
    }

    /// The value of a node, evaluating whatever uncached ancestors it needs.
    /// Nothing is stored; see [`fetch_and_update`](Self::fetch_and_update).
    pub fn fetch_with_required_evaluations(&self, key: &str) -> Result<DuplicableValue> {
        Ok(self.fetch_and_update(key)?.0)
    }

    /// Like [`fetch_with_required_evaluations`](Self::fetch_with_required_evaluations),
    /// and also returns the snapshot in which every caching node evaluated on
    /// the way keeps its value.
    pub fn fetch_and_update(&self, key: &str) -> Result<(DuplicableValue, Self)> {
        let index = self.structure.index_of(key)?;
        let mut evaluator = Evaluator::new(&self.structure, &self.nodes);
        match evaluator.evaluate(index)? {
            Evaluation::Ready(value) => {
                debug!(node = key, evaluations = evaluator.evaluations(), "fetched node");
                Ok((value, self.with_nodes(evaluator.into_nodes())))
            }
            Evaluation::NotReady(reason) => Err(reason),
        }
    }

    /// Compute and cache every caching node that is not already cached.
    pub fn update_all_caches(&self) -> Result<Self> {
        self.update(self.caching_targets(), UpdatePolicy::Strict, "all")
    }

    pub fn update_all_caches_if_possible(&self) -> Result<Self> {
        self.update(self.caching_targets(), UpdatePolicy::BestEffort, "all")
    }

    /// Update the nodes whose induced tags contain `tag`, together with the
    /// ancestors they need.
    ///
    /// Non-caching nodes carrying the tag are evaluated too, so that their
    /// caching ancestors get installed, but their own values are dropped.
    pub fn update_caches_for_tag(&self, tag: &str) -> Result<Self> {
        self.update(self.tag_targets(tag), UpdatePolicy::Strict, tag)
    }

    pub fn update_caches_for_tag_if_possible(&self, tag: &str) -> Result<Self> {
        self.update(self.tag_targets(tag), UpdatePolicy::BestEffort, tag)
    }

    /// Update a single node and the ancestors it needs. A no-op for
    /// primitive nodes.
    pub fn update_caches_for_node(&self, key: &str) -> Result<Self> {
        self.update(self.node_targets(key)?, UpdatePolicy::Strict, key)
    }

    pub fn update_caches_for_node_if_possible(&self, key: &str) -> Result<Self> {
        self.update(self.node_targets(key)?, UpdatePolicy::BestEffort, key)
    }

    fn refresh(&self, policy: UpdatePolicy) -> Result<Self> {
        self.update(self.caching_targets(), policy, "all")
    }

    fn caching_targets(&self) -> Vec<usize> {
        self.structure
            .topological_indices()
            .iter()
            .copied()
            .filter(|&index| self.nodes[index].is_caching())
            .collect()
    }

    fn tag_targets(&self, tag: &str) -> Vec<usize> {
        self.structure
            .tag_indices(tag)
            .iter()
            .copied()
            .filter(|&index| !self.nodes[index].is_primitive())
            .collect()
    }

    fn node_targets(&self, key: &str) -> Result<Vec<usize>> {
        let index = self.structure.index_of(key)?;
        if self.nodes[index].is_primitive() {
            Ok(Vec::new())
        } else {
            Ok(vec![index])
        }
    }

    fn update(&self, targets: Vec<usize>, policy: UpdatePolicy, selector: &str) -> Result<Self> {
        let mut evaluator = Evaluator::new(&self.structure, &self.nodes);
        let mut skipped = 0;

        for &index in &targets {
            if let Evaluation::NotReady(reason) = evaluator.evaluate(index)? {
                match policy {
                    UpdatePolicy::Strict => return Err(reason),
                    UpdatePolicy::BestEffort => {
                        debug!(node = self.structure.key_of(index), %reason, "skipped node");
                        skipped += 1;
                    }
                }
            }
        }

        debug!(
            selector,
            targets = targets.len(),
            evaluations = evaluator.evaluations(),
            skipped,
            "updated caches"
        );
        Ok(self.with_nodes(evaluator.into_nodes()))
    }
}

impl fmt::Display for ImmutableComputableGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &index in self.structure.topological_indices() {
            let node = &self.nodes[index];
            writeln!(f, "{}: {:?}", node, node.status())?;
        }
        Ok(())
    }
}

impl fmt::Debug for ImmutableComputableGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImmutableComputableGraph")
            .field("nodes", &self.nodes)
            .field("config", &self.config)
            .finish()
    }
}
