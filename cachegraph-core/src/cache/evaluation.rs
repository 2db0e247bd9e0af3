//! Evaluation Engine
//!
//! Evaluates nodes of one snapshot on demand. An [`Evaluator`] works on a
//! private copy of the snapshot's node slots: every caching node it computes
//! is installed into its slot as a new node, and every other slot keeps
//! pointing at the node it started with.
//!
//! # Missing inputs are not errors here
//!
//! A node whose evaluation needs an unset primitive or an externally computed
//! node with no value does not fail; it evaluates to
//! [`Evaluation::NotReady`] carrying the reason. Strict callers turn that into
//! an error, best-effort callers skip the node. Genuine failures (a node
//! function returning some other error) are returned as `Err` and always
//! propagate.
//!
//! Each node is evaluated at most once per evaluator, whether it caches or
//! not, so a fan-in never recomputes a shared ancestor. Parents are visited
//! depth first on a heap-allocated frame stack, never by recursion.

use std::sync::Arc;

use tracing::trace;

use crate::error::{CacheError, Result};
use crate::graph::{CacheNode, ComputableGraphStructure, ParentValues};
use crate::value::DuplicableValue;

/// Outcome of evaluating one node.
#[derive(Debug, Clone)]
pub(crate) enum Evaluation {
    Ready(DuplicableValue),
    NotReady(CacheError),
}

/// Single-use evaluator over a snapshot's node slots.
pub(crate) struct Evaluator<'a> {
    structure: &'a ComputableGraphStructure,
    nodes: Vec<Arc<CacheNode>>,
    /// Outcomes already known during this pass.
    outcomes: Vec<Option<Evaluation>>,
    evaluations: usize,
}

impl<'a> Evaluator<'a> {
    pub(crate) fn new(structure: &'a ComputableGraphStructure, nodes: &[Arc<CacheNode>]) -> Self {
        Self {
            structure,
            nodes: nodes.to_vec(),
            outcomes: vec![None; nodes.len()],
            evaluations: 0,
        }
    }

    /// Number of node functions invoked so far.
    pub(crate) fn evaluations(&self) -> usize {
        self.evaluations
    }

    /// The node slots, with every caching node computed so far installed.
    pub(crate) fn into_nodes(self) -> Vec<Arc<CacheNode>> {
        self.nodes
    }

    /// Evaluate the node in slot `target`, evaluating uncached ancestors first.
    ///
    /// Ancestors are visited depth first on an explicit stack of frames, so
    /// chain length is bounded by memory rather than by the thread's stack.
    pub(crate) fn evaluate(&mut self, target: usize) -> Result<Evaluation> {
        if let Some(outcome) = self.settle(target) {
            return Ok(outcome);
        }

        let structure = self.structure;
        let mut stack = vec![Frame::new(target)];
        loop {
            let depth = stack.len() - 1;
            let frame = &mut stack[depth];
            let index = frame.index;

            let outcome = match structure.parent_indices(index).get(frame.next).copied() {
                Some(parent) => match self.settle(parent) {
                    Some(Evaluation::Ready(value)) => {
                        frame.parents.insert(structure.key_of(parent), value);
                        frame.next += 1;
                        continue;
                    }
                    // First missing parent decides.
                    Some(not_ready) => not_ready,
                    None => {
                        stack.push(Frame::new(parent));
                        continue;
                    }
                },
                None => self.apply(index, &frame.parents)?,
            };

            self.outcomes[index] = Some(outcome.clone());
            stack.pop();
            if stack.is_empty() {
                return Ok(outcome);
            }
        }
    }

    /// The outcome of `index` if it is known without running its function:
    /// already evaluated this pass, holding a value, or missing an input that
    /// nothing can compute. `None` means the parents must be evaluated.
    fn settle(&mut self, index: usize) -> Option<Evaluation> {
        if let Some(outcome) = &self.outcomes[index] {
            return Some(outcome.clone());
        }

        let outcome = match self.nodes[index].as_ref() {
            node if node.has_value() => Evaluation::Ready(Arc::clone(node.value()?)),
            CacheNode::Primitive(primitive) => {
                Evaluation::NotReady(CacheError::PrimitiveValueNotInitialized {
                    key: primitive.key().to_string(),
                })
            }
            CacheNode::Computable(computable) if computable.is_externally_computed() => {
                Evaluation::NotReady(CacheError::ExternallyComputableValueUnavailable {
                    key: computable.key().to_string(),
                })
            }
            CacheNode::Computable(_) => return None,
        };
        self.outcomes[index] = Some(outcome.clone());
        Some(outcome)
    }

    /// Run the function of the computable node in slot `index`.
    fn apply(&mut self, index: usize, parents: &ParentValues) -> Result<Evaluation> {
        let node = Arc::clone(&self.nodes[index]);
        let value = match node.get(parents) {
            Ok(value) => value,
            Err(reason) if reason.is_value_unavailable() => {
                return Ok(Evaluation::NotReady(reason));
            }
            Err(err) => return Err(err),
        };
        self.evaluations += 1;
        trace!(node = node.key(), caching = node.is_caching(), "evaluated node");

        if let CacheNode::Computable(computable) = node.as_ref() {
            if computable.is_caching() {
                let cached = computable.duplicate_with_updated_value(Arc::clone(&value));
                self.nodes[index] = Arc::new(cached.into());
            }
        }
        Ok(Evaluation::Ready(value))
    }
}

/// A node waiting for its parents.
struct Frame {
    index: usize,
    /// Position of the next parent to evaluate.
    next: usize,
    parents: ParentValues,
}

impl Frame {
    fn new(index: usize) -> Self {
        Self {
            index,
            next: 0,
            parents: ParentValues::new(),
        }
    }
}
