//! Cache Nodes
//!
//! A cache node is one named value in the graph. There are exactly two kinds:
//!
//! - [`PrimitiveCacheNode`]: a leaf whose value is supplied from outside.
//! - [`ComputableCacheNode`]: a value derived from its parents by a pure
//!   function, optionally memoized, or supplied from outside when the node is
//!   externally computed.
//!
//! Nodes are immutable. Every "mutation" returns a new node and leaves the
//! receiver untouched, which is what lets snapshots share nodes by reference.
//!
//! Equality and hashing look only at the key and the kind of node.

use std::any::{type_name, Any};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use indexmap::IndexMap;

use crate::error::{CacheError, Result};
use crate::value::DuplicableValue;

/// A pure function computing a node's value from its parents' values.
///
/// The function receives exactly the node's declared parents. It must not
/// depend on anything else, and the cache may call it at any time.
pub trait ComputableNodeFunction: Send + Sync {
    fn apply(&self, parents: &ParentValues) -> Result<DuplicableValue>;
}

impl<F> ComputableNodeFunction for F
where
    F: Fn(&ParentValues) -> Result<DuplicableValue> + Send + Sync,
{
    fn apply(&self, parents: &ParentValues) -> Result<DuplicableValue> {
        self(parents)
    }
}

/// Shared handle to a node function.
pub type NodeFunction = Arc<dyn ComputableNodeFunction>;

/// Wrap a closure as a [`NodeFunction`].
pub fn node_function<F>(function: F) -> NodeFunction
where
    F: Fn(&ParentValues) -> Result<DuplicableValue> + Send + Sync + 'static,
{
    Arc::new(function)
}

/// The parent values handed to a [`ComputableNodeFunction`], keyed by parent key
/// in declaration order.
#[derive(Debug, Clone, Default)]
pub struct ParentValues {
    values: IndexMap<String, DuplicableValue>,
}

impl ParentValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: DuplicableValue) {
        self.values.insert(key.into(), value);
    }

    /// Get the raw value of a parent.
    pub fn get(&self, key: &str) -> Result<&DuplicableValue> {
        self.values
            .get(key)
            .ok_or_else(|| CacheError::ParentValueNotFound {
                parent: key.to_string(),
            })
    }

    /// Get the content of a parent, downcast to `T`.
    pub fn fetch<T: Any>(&self, key: &str) -> Result<&T> {
        self.get(key)?
            .value_as::<T>()
            .ok_or_else(|| CacheError::ValueTypeMismatch {
                key: key.to_string(),
                expected: type_name::<T>(),
            })
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &DuplicableValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl<K: Into<String>> FromIterator<(K, DuplicableValue)> for ParentValues {
    fn from_iter<I: IntoIterator<Item = (K, DuplicableValue)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

/// Where a node stands with respect to its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeStatus {
    /// Primitive node that has never been set.
    Unset,
    /// Primitive node holding a value.
    Set,
    /// Computable node without a stored value; the engine can compute it.
    Uncached,
    /// Computable node holding a ready value.
    Cached,
    /// Externally computed node waiting for the caller to supply a value.
    AwaitingExternalValue,
}

/// A leaf node whose value is set from outside.
#[derive(Clone)]
pub struct PrimitiveCacheNode {
    key: Arc<str>,
    tags: Arc<[String]>,
    value: Option<DuplicableValue>,
}

impl PrimitiveCacheNode {
    pub fn new<T, S>(key: &str, tags: T, value: Option<DuplicableValue>) -> Self
    where
        T: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            key: Arc::from(key),
            tags: tags.into_iter().map(Into::into).collect(),
            value,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn has_value(&self) -> bool {
        self.value.is_some()
    }

    /// The stored value, if any.
    pub fn value(&self) -> Option<&DuplicableValue> {
        self.value.as_ref()
    }

    /// The stored value.
    pub fn get(&self) -> Result<DuplicableValue> {
        self.value
            .clone()
            .ok_or_else(|| CacheError::PrimitiveValueNotInitialized {
                key: self.key.to_string(),
            })
    }

    /// A new node holding `value`.
    pub fn set(&self, value: DuplicableValue) -> Self {
        Self {
            key: Arc::clone(&self.key),
            tags: Arc::clone(&self.tags),
            value: Some(value),
        }
    }

    /// A new node with a deep copy of the stored value.
    pub fn duplicate(&self) -> Self {
        Self {
            key: Arc::clone(&self.key),
            tags: Arc::clone(&self.tags),
            value: self.value.as_ref().map(|v| v.duplicate()),
        }
    }
}

/// A node whose value derives from its parents.
///
/// A node without a function is externally computed: the engine never
/// evaluates it and its value must be supplied with [`set`](Self::set).
/// Externally computed nodes always keep the supplied value, so they are
/// caching whatever flag they were declared with.
#[derive(Clone)]
pub struct ComputableCacheNode {
    key: Arc<str>,
    tags: Arc<[String]>,
    parents: Arc<[String]>,
    function: Option<NodeFunction>,
    caching: bool,
    value: Option<DuplicableValue>,
}

impl ComputableCacheNode {
    pub fn new<T, S, P, Q>(
        key: &str,
        tags: T,
        parents: P,
        function: Option<NodeFunction>,
        caching: bool,
    ) -> Self
    where
        T: IntoIterator<Item = S>,
        S: Into<String>,
        P: IntoIterator<Item = Q>,
        Q: Into<String>,
    {
        let caching = caching || function.is_none();
        Self {
            key: Arc::from(key),
            tags: tags.into_iter().map(Into::into).collect(),
            parents: parents.into_iter().map(Into::into).collect(),
            function,
            caching,
            value: None,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn parents(&self) -> &[String] {
        &self.parents
    }

    pub fn has_value(&self) -> bool {
        self.value.is_some()
    }

    /// The cached value, if any.
    pub fn value(&self) -> Option<&DuplicableValue> {
        self.value.as_ref()
    }

    pub fn is_caching(&self) -> bool {
        self.caching
    }

    pub fn is_externally_computed(&self) -> bool {
        self.function.is_none()
    }

    /// The cached value if present, otherwise the function applied to
    /// `parents`. Nothing is stored.
    pub fn get(&self, parents: &ParentValues) -> Result<DuplicableValue> {
        if let Some(value) = &self.value {
            return Ok(Arc::clone(value));
        }
        match &self.function {
            Some(function) => function.apply(parents),
            None => Err(CacheError::ExternallyComputableValueUnavailable {
                key: self.key.to_string(),
            }),
        }
    }

    /// A new node holding `value`. Only externally computed nodes accept
    /// values from outside.
    pub fn set(&self, value: DuplicableValue) -> Result<Self> {
        if !self.is_externally_computed() {
            return Err(CacheError::UnsupportedOperation {
                key: self.key.to_string(),
                reason: "only externally computed nodes can be set directly".to_string(),
            });
        }
        Ok(self.duplicate_with_updated_value(value))
    }

    /// A new node with a deep copy of any stored value.
    pub fn duplicate(&self) -> Self {
        Self {
            value: self.value.as_ref().map(|v| v.duplicate()),
            ..self.clone()
        }
    }

    /// A new node caching `value`, regardless of how the node is computed.
    pub(crate) fn duplicate_with_updated_value(&self, value: DuplicableValue) -> Self {
        Self {
            value: Some(value),
            ..self.clone()
        }
    }

    /// A new node with the stored value dropped.
    pub fn duplicate_with_outdated_cache_status(&self) -> Self {
        Self {
            value: None,
            ..self.clone()
        }
    }
}

/// A node of the computable graph.
#[derive(Clone)]
pub enum CacheNode {
    Primitive(PrimitiveCacheNode),
    Computable(ComputableCacheNode),
}

impl CacheNode {
    pub fn key(&self) -> &str {
        match self {
            CacheNode::Primitive(node) => node.key(),
            CacheNode::Computable(node) => node.key(),
        }
    }

    pub fn tags(&self) -> &[String] {
        match self {
            CacheNode::Primitive(node) => node.tags(),
            CacheNode::Computable(node) => node.tags(),
        }
    }

    /// Declared parent keys. Always empty for primitive nodes.
    pub fn parents(&self) -> &[String] {
        match self {
            CacheNode::Primitive(_) => &[],
            CacheNode::Computable(node) => node.parents(),
        }
    }

    pub fn is_primitive(&self) -> bool {
        matches!(self, CacheNode::Primitive(_))
    }

    pub fn has_value(&self) -> bool {
        match self {
            CacheNode::Primitive(node) => node.has_value(),
            CacheNode::Computable(node) => node.has_value(),
        }
    }

    /// The value held by the node, without evaluating anything.
    pub fn value(&self) -> Option<&DuplicableValue> {
        match self {
            CacheNode::Primitive(node) => node.value(),
            CacheNode::Computable(node) => node.value(),
        }
    }

    /// Primitive nodes are never caching.
    pub fn is_caching(&self) -> bool {
        match self {
            CacheNode::Primitive(_) => false,
            CacheNode::Computable(node) => node.is_caching(),
        }
    }

    pub fn is_externally_computed(&self) -> bool {
        match self {
            CacheNode::Primitive(_) => false,
            CacheNode::Computable(node) => node.is_externally_computed(),
        }
    }

    pub fn status(&self) -> NodeStatus {
        match self {
            CacheNode::Primitive(node) if node.has_value() => NodeStatus::Set,
            CacheNode::Primitive(_) => NodeStatus::Unset,
            CacheNode::Computable(node) if node.has_value() => NodeStatus::Cached,
            CacheNode::Computable(node) if node.is_externally_computed() => {
                NodeStatus::AwaitingExternalValue
            }
            CacheNode::Computable(_) => NodeStatus::Uncached,
        }
    }

    /// The node's value. `parents` is ignored by primitive nodes.
    pub fn get(&self, parents: &ParentValues) -> Result<DuplicableValue> {
        match self {
            CacheNode::Primitive(node) => node.get(),
            CacheNode::Computable(node) => node.get(parents),
        }
    }

    pub fn set(&self, value: DuplicableValue) -> Result<CacheNode> {
        match self {
            CacheNode::Primitive(node) => Ok(node.set(value).into()),
            CacheNode::Computable(node) => Ok(node.set(value)?.into()),
        }
    }

    pub fn duplicate(&self) -> CacheNode {
        match self {
            CacheNode::Primitive(node) => node.duplicate().into(),
            CacheNode::Computable(node) => node.duplicate().into(),
        }
    }

    pub fn as_primitive(&self) -> Option<&PrimitiveCacheNode> {
        match self {
            CacheNode::Primitive(node) => Some(node),
            CacheNode::Computable(_) => None,
        }
    }

    pub fn as_computable(&self) -> Option<&ComputableCacheNode> {
        match self {
            CacheNode::Primitive(_) => None,
            CacheNode::Computable(node) => Some(node),
        }
    }
}

impl From<PrimitiveCacheNode> for CacheNode {
    fn from(node: PrimitiveCacheNode) -> Self {
        CacheNode::Primitive(node)
    }
}

impl From<ComputableCacheNode> for CacheNode {
    fn from(node: ComputableCacheNode) -> Self {
        CacheNode::Computable(node)
    }
}

// Identity is the key within a kind of node.

impl PartialEq for PrimitiveCacheNode {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for PrimitiveCacheNode {}

impl Hash for PrimitiveCacheNode {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl PartialEq for ComputableCacheNode {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for ComputableCacheNode {}

impl Hash for ComputableCacheNode {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl PartialEq for CacheNode {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (CacheNode::Primitive(a), CacheNode::Primitive(b)) => a == b,
            (CacheNode::Computable(a), CacheNode::Computable(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for CacheNode {}

impl Hash for CacheNode {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        self.key().hash(state);
    }
}

impl fmt::Display for PrimitiveCacheNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

impl fmt::Display for ComputableCacheNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

impl fmt::Display for CacheNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl fmt::Debug for PrimitiveCacheNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrimitiveCacheNode")
            .field("key", &self.key)
            .field("tags", &self.tags)
            .field("has_value", &self.has_value())
            .finish()
    }
}

impl fmt::Debug for ComputableCacheNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComputableCacheNode")
            .field("key", &self.key)
            .field("tags", &self.tags)
            .field("parents", &self.parents)
            .field("caching", &self.caching)
            .field("externally_computed", &self.is_externally_computed())
            .field("has_value", &self.has_value())
            .finish()
    }
}

impl fmt::Debug for CacheNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheNode::Primitive(node) => fmt::Debug::fmt(node, f),
            CacheNode::Computable(node) => fmt::Debug::fmt(node, f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{DuplicableArray, DuplicableNumber};

    const NO_TAGS: [&str; 0] = [];

    fn constant(value: f64) -> NodeFunction {
        node_function(move |_| Ok(DuplicableNumber::shared(value)))
    }

    fn same_key_nodes(key: &str) -> Vec<CacheNode> {
        vec![
            PrimitiveCacheNode::new(key, NO_TAGS, None).into(),
            PrimitiveCacheNode::new(key, ["a", "b", "c"], Some(DuplicableNumber::shared(1.0)))
                .into(),
            ComputableCacheNode::new(key, NO_TAGS, ["d", "e"], Some(constant(0.0)), false).into(),
            ComputableCacheNode::new(key, NO_TAGS, NO_TAGS, Some(constant(0.0)), false).into(),
            ComputableCacheNode::new(key, ["f"], ["g"], None, true).into(),
        ]
    }

    #[test]
    fn equality_depends_on_key_and_kind() {
        let one = same_key_nodes("ONE_KEY");
        let another = same_key_nodes("ANOTHER_KEY");

        for a in &one {
            for b in &one {
                assert!(a == b || a.is_primitive() != b.is_primitive());
            }
        }
        for a in &one {
            for b in &another {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn display_is_the_key() {
        for node in same_key_nodes("ONE_KEY") {
            assert_eq!(node.to_string(), "ONE_KEY");
        }
    }

    #[test]
    fn unset_primitive_fails_to_read() {
        let node = PrimitiveCacheNode::new("x", NO_TAGS, None);
        assert_eq!(
            node.get().unwrap_err(),
            CacheError::PrimitiveValueNotInitialized { key: "x".into() }
        );
    }

    #[test]
    fn set_primitive_returns_new_node() {
        let node = PrimitiveCacheNode::new("x", NO_TAGS, None);
        let updated = node.set(DuplicableNumber::shared(3.0));

        assert!(!node.has_value());
        assert!(updated.has_value());
        assert_eq!(updated.get().unwrap().value_as::<f64>(), Some(&3.0));
    }

    #[test]
    fn set_rejected_on_automatic_node() {
        let node = ComputableCacheNode::new("h", NO_TAGS, NO_TAGS, Some(constant(1.0)), false);
        let err = node.set(DuplicableNumber::shared(2.0)).unwrap_err();
        assert!(matches!(err, CacheError::UnsupportedOperation { .. }));
    }

    #[test]
    fn set_accepted_on_external_node() {
        let node = ComputableCacheNode::new("g", NO_TAGS, NO_TAGS, None, true);
        assert_eq!(
            node.get(&ParentValues::new()).unwrap_err(),
            CacheError::ExternallyComputableValueUnavailable { key: "g".into() }
        );

        let updated = node.set(DuplicableNumber::shared(2.0)).unwrap();
        assert_eq!(
            updated.get(&ParentValues::new()).unwrap().value_as::<f64>(),
            Some(&2.0)
        );
    }

    #[test]
    fn external_node_is_always_caching() {
        let node = ComputableCacheNode::new("g", NO_TAGS, NO_TAGS, None, false);
        assert!(node.is_caching());
        assert!(node.is_externally_computed());
    }

    #[test]
    fn uncached_get_applies_function() {
        let sum = node_function(|parents| {
            let a = parents.fetch::<f64>("a")?;
            let b = parents.fetch::<f64>("b")?;
            Ok(DuplicableNumber::shared(a + b))
        });
        let node = ComputableCacheNode::new("s", NO_TAGS, ["a", "b"], Some(sum), true);
        let parents: ParentValues = [
            ("a", DuplicableNumber::shared(1.0)),
            ("b", DuplicableNumber::shared(2.0)),
        ]
        .into_iter()
        .collect();

        assert_eq!(node.get(&parents).unwrap().value_as::<f64>(), Some(&3.0));
        assert!(!node.has_value());
    }

    #[test]
    fn caching_node_duplication() {
        let array = DuplicableArray::from_vec(vec![0.5, 1.5]).into_shared();
        let uncached = ComputableCacheNode::new("TEST", NO_TAGS, NO_TAGS, Some(constant(0.0)), true);
        let uncached_dup = uncached.duplicate();
        let cached = uncached.duplicate_with_updated_value(array.clone());
        let cached_dup = cached.duplicate();
        let outdated = cached.duplicate_with_outdated_cache_status();
        let outdated_dup = outdated.duplicate();

        for node in [&uncached, &uncached_dup, &cached, &cached_dup, &outdated, &outdated_dup] {
            assert!(node.is_caching());
            assert!(!node.is_externally_computed());
        }
        assert!(!uncached.has_value());
        assert!(!uncached_dup.has_value());
        assert!(cached.has_value());
        assert!(cached_dup.has_value());
        assert!(!outdated.has_value());
        assert!(!outdated_dup.has_value());

        let empty = ParentValues::new();
        assert_eq!(
            cached.get(&empty).unwrap().value_as::<DuplicableArray>(),
            cached_dup.get(&empty).unwrap().value_as::<DuplicableArray>()
        );
        assert!(!Arc::ptr_eq(cached.value().unwrap(), cached_dup.value().unwrap()));
        assert!(Arc::ptr_eq(cached.value().unwrap(), &array));
    }

    #[test]
    fn primitive_node_duplication() {
        let array = DuplicableArray::from_vec(vec![2.0, 4.0]).into_shared();
        let unset = PrimitiveCacheNode::new("x", ["a"], None);
        let unset_dup = unset.duplicate();
        assert!(!unset_dup.has_value());
        assert_eq!(unset_dup.key(), "x");
        assert_eq!(unset_dup.tags(), ["a".to_string()]);

        let set = unset.set(array.clone());
        let set_dup = set.duplicate();
        assert!(set_dup.has_value());
        assert!(!Arc::ptr_eq(set.value().unwrap(), set_dup.value().unwrap()));
        assert_eq!(
            set.get().unwrap().value_as::<DuplicableArray>(),
            set_dup.get().unwrap().value_as::<DuplicableArray>()
        );
        assert_eq!(set, set_dup);
    }

    #[test]
    fn status_follows_value() {
        let primitive: CacheNode = PrimitiveCacheNode::new("x", NO_TAGS, None).into();
        assert_eq!(primitive.status(), NodeStatus::Unset);
        let primitive = primitive.set(DuplicableNumber::shared(1.0)).unwrap();
        assert_eq!(primitive.status(), NodeStatus::Set);

        let external: CacheNode = ComputableCacheNode::new("g", NO_TAGS, ["x"], None, true).into();
        assert_eq!(external.status(), NodeStatus::AwaitingExternalValue);
        let external = external.set(DuplicableNumber::shared(1.0)).unwrap();
        assert_eq!(external.status(), NodeStatus::Cached);

        let automatic: CacheNode =
            ComputableCacheNode::new("f", NO_TAGS, ["x"], Some(constant(1.0)), true).into();
        assert_eq!(automatic.status(), NodeStatus::Uncached);
    }

    #[test]
    fn parent_values_report_missing_and_mistyped() {
        let parents: ParentValues = [("x", DuplicableNumber::shared(1.0f64))].into_iter().collect();

        assert_eq!(
            parents.fetch::<f64>("y").unwrap_err(),
            CacheError::ParentValueNotFound { parent: "y".into() }
        );
        assert!(matches!(
            parents.fetch::<DuplicableArray>("x").unwrap_err(),
            CacheError::ValueTypeMismatch { .. }
        ));
    }
}
