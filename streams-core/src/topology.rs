//! The topology is the tree of named nodes a stream builds while operators get attached. It is
//! used to name stages in logs and metrics, and can be walked to render the shape of the
//! pipeline.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

/// A named point in the pipeline. Cloning a node clones the handle, not the subtree.
#[derive(Clone)]
pub struct Node {
    inner: Arc<NodeInner>,
}

struct NodeInner {
    name: String,
    children: RwLock<Vec<Node>>,
}

impl Node {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(NodeInner {
                name: name.into(),
                children: RwLock::new(Vec::new()),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Appends a child. Children are never de-duplicated and cycles are not detected.
    pub fn add_child(&self, child: Node) {
        self.inner.children.write().push(child);
    }

    /// Snapshot of the children in insertion order.
    pub fn children(&self) -> Vec<Node> {
        self.inner.children.read().clone()
    }

    /// Whether both handles point to the same node.
    pub fn same(&self, other: &Node) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("name", &self.inner.name)
            .field("children", &self.inner.children.read().len())
            .finish()
    }
}

/// Read-only view of the tree built by a stream.
#[derive(Debug, Clone)]
pub struct Topology {
    root: Node,
}

impl Topology {
    pub(crate) fn new(root: Node) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Node {
        &self.root
    }

    /// Node names in depth-first pre-order. A node reachable through several parents (merge)
    /// shows up once per parent.
    pub fn names(&self) -> Vec<String> {
        let mut names = Vec::new();
        let mut stack = vec![self.root.clone()];
        while let Some(node) = stack.pop() {
            names.push(node.name().to_string());
            stack.extend(node.children().into_iter().rev());
        }
        names
    }
}
