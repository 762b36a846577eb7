use std::collections::HashMap;

use linear_map::LinearMap;

use crate::address_space::{AddressSpace, Frame};
use crate::tagger::{tag_stack, StackTag};

/// Tick counts per tag.
pub type TagCounts = LinearMap<StackTag, u64>;

/// The name of the frame at the root of every call tree.
pub const ROOT_NAME: &str = "<root>";

fn add_ticks(counts: &mut TagCounts, tag: StackTag, count: u64) {
    match counts.get_mut(&tag) {
        Some(total) => *total = total.saturating_add(count),
        None => {
            counts.insert(tag, count);
        }
    }
}

fn merge_ticks(into: &mut TagCounts, from: &TagCounts) {
    for (&tag, &count) in from.iter() {
        add_ticks(into, tag, count);
    }
}

fn total(counts: &TagCounts) -> u64 {
    counts.values().fold(0u64, |acc, &count| acc.saturating_add(count))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

#[derive(Debug, Clone)]
struct Node {
    frame: Frame,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    child_index: HashMap<Frame, NodeId>,
    self_ticks: TagCounts,
    cumulative_ticks: TagCounts,
    virtual_ticks: TagCounts,
}

impl Node {
    fn new(frame: Frame, parent: Option<NodeId>) -> Self {
        Self {
            frame,
            parent,
            children: Vec::new(),
            child_index: HashMap::new(),
            self_ticks: TagCounts::new(),
            cumulative_ticks: TagCounts::new(),
            virtual_ticks: TagCounts::new(),
        }
    }
}

/// Sampled stacks folded into a tree, with tick counts per tag.
///
/// Every stack adds its count to all nodes on its path under the stack's
/// topmost tag, i.e. the tag of its innermost frame. The innermost node also
/// gets the count as self ticks, and the innermost virtual frame on the path
/// gets it as virtual ticks.
#[derive(Debug, Clone)]
pub struct CallTree {
    nodes: Vec<Node>,
}

impl Default for CallTree {
    fn default() -> Self {
        Self::new()
    }
}

impl CallTree {
    const ROOT: NodeId = NodeId(0);

    pub fn new() -> Self {
        Self {
            nodes: vec![Node::new(Frame::named(ROOT_NAME, false), None)],
        }
    }

    pub fn root(&self) -> NodeRef<'_> {
        self.node(Self::ROOT)
    }

    pub fn node(&self, id: NodeId) -> NodeRef<'_> {
        NodeRef { tree: self, id }
    }

    /// The number of nodes, including the root.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1
    }

    fn child_for(&mut self, parent: NodeId, frame: &Frame) -> NodeId {
        if let Some(&id) = self.nodes[parent.0].child_index.get(frame) {
            return id;
        }
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node::new(frame.clone(), Some(parent)));
        let parent = &mut self.nodes[parent.0];
        parent.children.push(id);
        parent.child_index.insert(frame.clone(), id);
        id
    }

    /// Add a stack, root first, which was sampled `count` times.
    pub fn add_stacktrace(&mut self, space: &AddressSpace, frames: &[Frame], count: u64) {
        let tags = tag_stack(space, frames);
        self.add_tagged(frames, &tags, count);
    }

    /// Add a stack whose frames were already tagged by [`tag_stack`].
    pub fn add_tagged(&mut self, frames: &[Frame], tags: &[StackTag], count: u64) {
        let Some(&top) = tags.last() else {
            return;
        };
        let deepest_virtual = frames.iter().rposition(|frame| frame.is_virtual);

        add_ticks(&mut self.nodes[Self::ROOT.0].cumulative_ticks, top, count);
        let mut current = Self::ROOT;
        for (depth, frame) in frames.iter().enumerate() {
            current = self.child_for(current, frame);
            let node = &mut self.nodes[current.0];
            add_ticks(&mut node.cumulative_ticks, top, count);
            if depth + 1 == frames.len() {
                add_ticks(&mut node.self_ticks, top, count);
            }
            if deepest_virtual == Some(depth) {
                add_ticks(&mut node.virtual_ticks, top, count);
            }
        }
    }

    /// A copy of this tree with only the virtual frames.
    ///
    /// Virtual nodes below non-virtual nodes are moved up to the nearest
    /// virtual ancestor, merging with nodes of the same frame. The self ticks
    /// of a virtual node are the ticks for which it was the innermost virtual
    /// frame.
    pub fn virtual_root(&self) -> CallTree {
        let mut pruned = CallTree::new();
        pruned.nodes[0].cumulative_ticks = self.nodes[0].cumulative_ticks.clone();

        let mut pending = vec![(Self::ROOT, Self::ROOT)];
        while let Some((source, target)) = pending.pop() {
            for &child in self.nodes[source.0].children.iter().rev() {
                let node = &self.nodes[child.0];
                if !node.frame.is_virtual {
                    pending.push((child, target));
                    continue;
                }
                let copy = pruned.child_for(target, &node.frame);
                let copy_node = &mut pruned.nodes[copy.0];
                merge_ticks(&mut copy_node.cumulative_ticks, &node.cumulative_ticks);
                merge_ticks(&mut copy_node.self_ticks, &node.virtual_ticks);
                pending.push((child, copy));
            }
        }
        pruned
    }

    /// Visit all nodes depth first, with their depth below the root.
    pub fn walk(&self, mut visit: impl FnMut(NodeRef<'_>, usize)) {
        let mut pending = vec![(Self::ROOT, 0)];
        while let Some((id, depth)) = pending.pop() {
            visit(self.node(id), depth);
            for &child in self.nodes[id.0].children.iter().rev() {
                pending.push((child, depth + 1));
            }
        }
    }
}

/// A node of a [`CallTree`].
#[derive(Debug, Clone, Copy)]
pub struct NodeRef<'a> {
    tree: &'a CallTree,
    id: NodeId,
}

impl<'a> NodeRef<'a> {
    fn data(&self) -> &'a Node {
        &self.tree.nodes[self.id.0]
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn frame(&self) -> &'a Frame {
        &self.data().frame
    }

    pub fn name(&self) -> &'a str {
        &self.data().frame.name
    }

    pub fn parent(&self) -> Option<NodeRef<'a>> {
        Some(self.tree.node(self.data().parent?))
    }

    pub fn children(&self) -> impl Iterator<Item = NodeRef<'a>> + 'a {
        let tree = self.tree;
        self.data().children.iter().map(move |&id| tree.node(id))
    }

    /// The child with the given name, preferring a non-virtual frame.
    pub fn child(&self, name: &str) -> Option<NodeRef<'a>> {
        let data = self.data();
        [false, true].into_iter().find_map(|is_virtual| {
            let id = *data.child_index.get(&Frame::named(name, is_virtual))?;
            Some(self.tree.node(id))
        })
    }

    pub fn self_ticks(&self) -> &'a TagCounts {
        &self.data().self_ticks
    }

    pub fn cumulative_ticks(&self) -> &'a TagCounts {
        &self.data().cumulative_ticks
    }

    pub fn virtual_ticks(&self) -> &'a TagCounts {
        &self.data().virtual_ticks
    }

    pub fn total_self(&self) -> u64 {
        total(self.self_ticks())
    }

    pub fn total_cumulative(&self) -> u64 {
        total(self.cumulative_ticks())
    }

    pub fn total_virtual(&self) -> u64 {
        total(self.virtual_ticks())
    }
}
