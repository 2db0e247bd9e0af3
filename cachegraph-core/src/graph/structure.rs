//! Graph Structure
//!
//! The static topology of a computable graph: which node depends on which,
//! the order in which nodes can be evaluated, and which tags each node
//! carries once tags have been propagated.
//!
//! The structure is computed once, when the graph is built, and is shared by
//! reference by every snapshot derived from it.
//!
//! # Algorithm
//!
//! 1. Resolve every declared parent key to a slot index, rejecting duplicate
//!    keys and undeclared parents.
//! 2. Sort topologically with Kahn's algorithm so parents come before
//!    children. Nodes left unsorted sit on a cycle.
//! 3. Walk the topological order backwards, so every child is finished before
//!    its parents, and induce tags:
//!    `induced(n) = declared(n) ∪ induced(c)` for every child `c` of `n`.
//!    A tag placed on a node therefore selects everything that node needs.

use std::collections::{BTreeSet, HashSet, VecDeque};

use indexmap::{IndexMap, IndexSet};
use smallvec::SmallVec;
use tracing::debug;

use super::node::CacheNode;
use crate::error::{CacheError, Result};

type Edges = SmallVec<[usize; 4]>;

/// Static topology shared by all snapshots of one graph.
#[derive(Debug)]
pub struct ComputableGraphStructure {
    /// Node keys; a key's position is its slot index.
    keys: IndexSet<String>,

    /// Direct parents of each slot, in declaration order.
    parents: Vec<Edges>,

    /// Direct children of each slot.
    children: Vec<Edges>,

    /// Slot indices, parents before children.
    topological_order: Vec<usize>,

    /// Position of each slot within `topological_order`.
    topological_position: Vec<usize>,

    declared_tags: Vec<BTreeSet<String>>,
    induced_tags: Vec<BTreeSet<String>>,

    /// Tag to the slots whose induced tags contain it, in topological order.
    tag_index: IndexMap<String, Vec<usize>>,
}

impl ComputableGraphStructure {
    /// Derive the structure from node declarations.
    pub(crate) fn new(nodes: &[CacheNode]) -> Result<Self> {
        let mut keys = IndexSet::with_capacity(nodes.len());
        for node in nodes {
            if !keys.insert(node.key().to_string()) {
                return Err(CacheError::DuplicateKey {
                    key: node.key().to_string(),
                });
            }
        }

        let mut parents: Vec<Edges> = Vec::with_capacity(nodes.len());
        let mut children: Vec<Edges> = vec![Edges::new(); nodes.len()];
        for (index, node) in nodes.iter().enumerate() {
            let mut node_parents = Edges::new();
            for parent_key in node.parents() {
                let parent = keys.get_index_of(parent_key.as_str()).ok_or_else(|| {
                    CacheError::UndeclaredParent {
                        node: node.key().to_string(),
                        parent: parent_key.clone(),
                    }
                })?;
                node_parents.push(parent);
                children[parent].push(index);
            }
            parents.push(node_parents);
        }

        let topological_order = Self::topological_sort(&keys, &parents, &children)?;
        let mut topological_position = vec![0; nodes.len()];
        for (position, &index) in topological_order.iter().enumerate() {
            topological_position[index] = position;
        }

        let declared_tags: Vec<BTreeSet<String>> = nodes
            .iter()
            .map(|node| node.tags().iter().cloned().collect())
            .collect();

        let mut induced_tags = declared_tags.clone();
        for &index in topological_order.iter().rev() {
            let mut tags = std::mem::take(&mut induced_tags[index]);
            for &child in &children[index] {
                tags.extend(induced_tags[child].iter().cloned());
            }
            induced_tags[index] = tags;
        }

        let mut tag_index: IndexMap<String, Vec<usize>> = IndexMap::new();
        for &index in &topological_order {
            for tag in &induced_tags[index] {
                tag_index.entry(tag.clone()).or_default().push(index);
            }
        }

        debug!(
            nodes = keys.len(),
            tags = tag_index.len(),
            "built computable graph structure"
        );

        Ok(Self {
            keys,
            parents,
            children,
            topological_order,
            topological_position,
            declared_tags,
            induced_tags,
            tag_index,
        })
    }

    /// Kahn's algorithm over the whole graph.
    fn topological_sort(
        keys: &IndexSet<String>,
        parents: &[Edges],
        children: &[Edges],
    ) -> Result<Vec<usize>> {
        let mut in_degree: Vec<usize> = parents.iter().map(|p| p.len()).collect();
        let mut queue: VecDeque<usize> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, &degree)| degree == 0)
            .map(|(index, _)| index)
            .collect();
        let mut order = Vec::with_capacity(parents.len());

        while let Some(index) = queue.pop_front() {
            order.push(index);
            for &child in &children[index] {
                in_degree[child] -= 1;
                if in_degree[child] == 0 {
                    queue.push_back(child);
                }
            }
        }

        if order.len() != parents.len() {
            let keys = in_degree
                .iter()
                .enumerate()
                .filter(|(_, &degree)| degree > 0)
                .filter_map(|(index, _)| keys.get_index(index).cloned())
                .collect();
            return Err(CacheError::CyclicDependency { keys });
        }

        Ok(order)
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    /// Node keys in declaration order.
    pub fn node_keys(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(String::as_str)
    }

    /// Node keys with every parent before its children.
    pub fn topological_order(&self) -> impl Iterator<Item = &str> {
        self.topological_order.iter().map(|&index| self.key_of(index))
    }

    pub fn parents_of(&self, key: &str) -> Result<Vec<&str>> {
        let index = self.index_of(key)?;
        Ok(self.keys_of(&self.parents[index]))
    }

    pub fn children_of(&self, key: &str) -> Result<Vec<&str>> {
        let index = self.index_of(key)?;
        Ok(self.keys_of(&self.children[index]))
    }

    /// Every node reachable through child edges, excluding `key` itself, in
    /// topological order.
    pub fn descendants_of(&self, key: &str) -> Result<Vec<&str>> {
        let index = self.index_of(key)?;
        Ok(self.keys_of(&self.descendant_indices(index)))
    }

    /// Every node reachable through parent edges, excluding `key` itself, in
    /// topological order.
    pub fn ancestors_of(&self, key: &str) -> Result<Vec<&str>> {
        let index = self.index_of(key)?;
        Ok(self.keys_of(&self.ancestor_indices(index)))
    }

    pub fn declared_tags_for_node(&self, key: &str) -> Result<&BTreeSet<String>> {
        Ok(&self.declared_tags[self.index_of(key)?])
    }

    /// The node's own tags together with the induced tags of all its children.
    pub fn induced_tags_for_node(&self, key: &str) -> Result<&BTreeSet<String>> {
        Ok(&self.induced_tags[self.index_of(key)?])
    }

    /// Nodes whose induced tags contain `tag`, in topological order.
    pub fn nodes_for_tag(&self, tag: &str) -> Vec<&str> {
        self.keys_of(self.tag_indices(tag))
    }

    /// Every tag carried by at least one node.
    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.tag_index.keys().map(String::as_str)
    }

    // --- Slot-level access for the evaluation engine ---

    pub(crate) fn index_of(&self, key: &str) -> Result<usize> {
        self.keys
            .get_index_of(key)
            .ok_or_else(|| CacheError::UnknownNode {
                key: key.to_string(),
            })
    }

    pub(crate) fn key_of(&self, index: usize) -> &str {
        &self.keys[index]
    }

    pub(crate) fn parent_indices(&self, index: usize) -> &[usize] {
        &self.parents[index]
    }

    pub(crate) fn topological_indices(&self) -> &[usize] {
        &self.topological_order
    }

    pub(crate) fn tag_indices(&self, tag: &str) -> &[usize] {
        self.tag_index.get(tag).map(Vec::as_slice).unwrap_or(&[])
    }

    /// BFS along child edges from `start`, excluding `start`.
    pub(crate) fn descendant_indices(&self, start: usize) -> Vec<usize> {
        self.reachable(start, &self.children)
    }

    /// BFS along parent edges from `start`, excluding `start`.
    pub(crate) fn ancestor_indices(&self, start: usize) -> Vec<usize> {
        self.reachable(start, &self.parents)
    }

    fn reachable(&self, start: usize, edges: &[Edges]) -> Vec<usize> {
        let mut visited = HashSet::new();
        let mut queue: VecDeque<usize> = edges[start].iter().copied().collect();

        while let Some(index) = queue.pop_front() {
            if visited.insert(index) {
                queue.extend(edges[index].iter().copied());
            }
        }

        let mut found: Vec<usize> = visited.into_iter().collect();
        found.sort_by_key(|&index| self.topological_position[index]);
        found
    }

    fn keys_of(&self, indices: &[usize]) -> Vec<&str> {
        indices.iter().map(|&index| self.key_of(index)).collect()
    }
}
