//! Graph builder.

use std::sync::Arc;

use tracing::debug;

use super::snapshot::ImmutableComputableGraph;
use crate::config::CacheConfig;
use crate::error::Result;
use crate::graph::{
    CacheNode, ComputableCacheNode, ComputableGraphStructure, NodeFunction, PrimitiveCacheNode,
};
use crate::value::DuplicableValue;

/// Collects node declarations and validates them into the first snapshot.
///
/// Declarations may appear in any order; parents are resolved by key when
/// [`build`](Self::build) runs. Building never evaluates a node function.
#[derive(Default)]
pub struct ImmutableComputableGraphBuilder {
    nodes: Vec<CacheNode>,
    config: CacheConfig,
}

impl ImmutableComputableGraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a primitive node, optionally with an initial value.
    pub fn primitive_node(
        mut self,
        key: &str,
        tags: &[&str],
        value: Option<DuplicableValue>,
    ) -> Self {
        self.nodes
            .push(PrimitiveCacheNode::new(key, tags.iter().copied(), value).into());
        self
    }

    /// Declare a computable node.
    ///
    /// A node without a function is externally computed and always caching,
    /// whatever `caching` says.
    pub fn computable_node(
        mut self,
        key: &str,
        tags: &[&str],
        parents: &[&str],
        function: Option<NodeFunction>,
        caching: bool,
    ) -> Self {
        self.nodes.push(
            ComputableCacheNode::new(
                key,
                tags.iter().copied(),
                parents.iter().copied(),
                function,
                caching,
            )
            .into(),
        );
        self
    }

    /// Declare an already constructed node.
    pub fn node(mut self, node: impl Into<CacheNode>) -> Self {
        self.nodes.push(node.into());
        self
    }

    /// Refresh caches automatically after every `set_value`.
    pub fn with_cache_auto_update(mut self) -> Self {
        self.config.auto_update = true;
        self
    }

    pub fn with_config(mut self, config: CacheConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<ImmutableComputableGraph> {
        let structure = ComputableGraphStructure::new(&self.nodes)?;
        debug!(
            nodes = structure.len(),
            auto_update = self.config.auto_update,
            "built computable graph"
        );
        Ok(ImmutableComputableGraph::new(
            Arc::new(structure),
            self.nodes,
            self.config,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UpdatePolicy;
    use crate::error::CacheError;
    use crate::graph::{node_function, NodeStatus};
    use crate::value::DuplicableNumber;

    #[test]
    fn declaration_order_is_free() {
        let graph = ImmutableComputableGraphBuilder::new()
            .computable_node(
                "twice",
                &[],
                &["x"],
                Some(node_function(|p| {
                    Ok(DuplicableNumber::shared(p.fetch::<i64>("x")? * 2))
                })),
                true,
            )
            .primitive_node("x", &[], Some(DuplicableNumber::shared(21i64)))
            .build()
            .unwrap();

        assert_eq!(graph.node_status("twice").unwrap(), NodeStatus::Uncached);
        let value = graph.fetch_with_required_evaluations("twice").unwrap();
        assert_eq!(value.value_as::<i64>(), Some(&42));
    }

    #[test]
    fn prebuilt_nodes_can_be_declared() {
        let graph = ImmutableComputableGraphBuilder::new()
            .node(PrimitiveCacheNode::new(
                "x",
                ["inputs"],
                Some(DuplicableNumber::shared(1.5f64)),
            ))
            .build()
            .unwrap();

        assert_eq!(graph.node_status("x").unwrap(), NodeStatus::Set);
        assert_eq!(graph.get_cache_node("x").unwrap().tags(), ["inputs".to_string()]);
    }

    #[test]
    fn external_nodes_are_forced_to_cache() {
        let graph = ImmutableComputableGraphBuilder::new()
            .computable_node("e", &[], &[], None, false)
            .build()
            .unwrap();
        let node = graph.get_cache_node("e").unwrap();

        assert!(node.is_caching());
        assert_eq!(node.status(), NodeStatus::AwaitingExternalValue);
    }

    #[test]
    fn validation_errors_surface_from_build() {
        let err = ImmutableComputableGraphBuilder::new()
            .primitive_node("x", &[], None)
            .primitive_node("x", &[], None)
            .build()
            .unwrap_err();
        assert_eq!(err, CacheError::DuplicateKey { key: "x".into() });
    }

    #[test]
    fn config_is_carried_into_snapshots() {
        let config = CacheConfig {
            auto_update: true,
            update_policy: UpdatePolicy::Strict,
        };
        let graph = ImmutableComputableGraphBuilder::new()
            .primitive_node("x", &[], None)
            .with_config(config)
            .build()
            .unwrap();

        assert_eq!(graph.config(), &config);
        let graph = graph.set_value("x", DuplicableNumber::shared(1u8)).unwrap();
        assert_eq!(graph.config(), &config);
    }
}
