//! Behavior tree combinators.
//!
//! | Node type            | Result                                               |
//! |----------------------|------------------------------------------------------|
//! | [`Node::Sequence`]   | first child result that is not `Success`, else `Success` |
//! | [`Node::Selector`]   | first child result that is not `Failure`, else `Failure` |
//! | [`Node::Leaf`]       | whatever the leaf's [`Behavior::tick`] returns       |
//!
//! The tree holds no state of its own. Everything a leaf needs to remember
//! between ticks lives in the context it is ticked with.

/// Result of ticking a node once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Success,
    Failure,
    /// Still working, tick again later.
    Running,
}

/// A leaf that can be ticked against a context of type `C`.
pub trait Behavior<C> {
    fn tick(&self, context: &mut C) -> Status;

    /// Name used in logs.
    fn name(&self) -> &'static str;
}

/// A behavior tree over leaves of type `L`.
#[derive(Debug, Clone, PartialEq)]
pub enum Node<L> {
    Sequence(Vec<Node<L>>),
    Selector(Vec<Node<L>>),
    Leaf(L),
}

impl<L> Node<L> {
    pub fn sequence(children: impl IntoIterator<Item = Node<L>>) -> Self {
        Node::Sequence(children.into_iter().collect())
    }

    pub fn selector(children: impl IntoIterator<Item = Node<L>>) -> Self {
        Node::Selector(children.into_iter().collect())
    }

    pub fn leaf(leaf: L) -> Self {
        Node::Leaf(leaf)
    }

    /// Ticks the node, short-circuiting composites as soon as their result is known.
    ///
    /// # Arguments
    ///
    /// * `context` - Mutable state shared by every leaf of the tree.
    ///
    /// # Returns
    ///
    /// The status of this node for the current tick.
    pub fn tick<C>(&self, context: &mut C) -> Status
    where
        L: Behavior<C>,
    {
        match self {
            Node::Sequence(children) => children
                .iter()
                .map(|child| child.tick(context))
                .find(|status| *status != Status::Success)
                .unwrap_or(Status::Success),
            Node::Selector(children) => children
                .iter()
                .map(|child| child.tick(context))
                .find(|status| *status != Status::Failure)
                .unwrap_or(Status::Failure),
            Node::Leaf(leaf) => leaf.tick(context),
        }
    }

    /// Number of leaves in the tree.
    pub fn leaf_count(&self) -> usize {
        match self {
            Node::Sequence(children) | Node::Selector(children) => {
                children.iter().map(Node::leaf_count).sum()
            }
            Node::Leaf(_) => 1,
        }
    }
}
