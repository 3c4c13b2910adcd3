//! The document tree.
//!
//! Nodes live in an arena owned by the tree; parent links are handles, not
//! owning pointers, so there are no reference cycles to collect. External
//! callers hold [`NodeRef`] weak handles that are re-validated on every
//! access: destroying a subtree or resetting the tree makes the handles go
//! stale, and stale access returns `None` instead of reaching freed state.

use crate::tag::TagId;
use crate::token::AttributeList;

/// Weak, copyable handle to a tree node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeRef {
    index: u32,
    generation: u32,
}

/// One run of text inside a TextRun node. Word and whitespace runs are kept
/// apart so the inline engine can make break decisions without re-scanning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextFragment {
    Word(Vec<u8>),
    Whitespace(Vec<u8>),
}

#[derive(Debug)]
pub enum NodeData {
    Element {
        tag: TagId,
        attributes: AttributeList,
        children: Vec<NodeRef>,
    },
    TextRun {
        fragments: Vec<TextFragment>,
    },
}

struct Slot {
    generation: u32,
    parent: Option<NodeRef>,
    data: Option<NodeData>,
}

#[derive(Default)]
pub struct Tree {
    slots: Vec<Slot>,
    free: Vec<u32>,
    next_generation: u32,
    root: Option<NodeRef>,
}

impl Tree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops every node. Generations advance monotonically, so handles from
    /// before the reset can never alias nodes created after it.
    pub fn reset(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.root = None;
    }

    pub fn root(&self) -> Option<NodeRef> {
        self.root
    }

    pub fn set_root(&mut self, node: NodeRef) {
        self.root = Some(node);
    }

    fn allocate(&mut self, data: NodeData) -> NodeRef {
        self.next_generation += 1;
        let generation = self.next_generation;
        let slot = Slot {
            generation,
            parent: None,
            data: Some(data),
        };
        let index = match self.free.pop() {
            Some(index) => {
                self.slots[index as usize] = slot;
                index
            }
            None => {
                self.slots.push(slot);
                (self.slots.len() - 1) as u32
            }
        };
        NodeRef { index, generation }
    }

    fn slot(&self, node: NodeRef) -> Option<&Slot> {
        self.slots
            .get(node.index as usize)
            .filter(|slot| slot.generation == node.generation && slot.data.is_some())
    }

    fn slot_mut(&mut self, node: NodeRef) -> Option<&mut Slot> {
        self.slots
            .get_mut(node.index as usize)
            .filter(|slot| slot.generation == node.generation && slot.data.is_some())
    }

    pub fn create_element(&mut self, tag: TagId, attributes: AttributeList) -> NodeRef {
        self.allocate(NodeData::Element {
            tag,
            attributes,
            children: Vec::new(),
        })
    }

    pub fn create_text_run(&mut self) -> NodeRef {
        self.allocate(NodeData::TextRun {
            fragments: Vec::new(),
        })
    }

    /// Appends `child` as the last child of `parent`. Fails on stale
    /// handles and on TextRun parents, which can never have children.
    pub fn append_child(&mut self, parent: NodeRef, child: NodeRef) -> bool {
        if self.slot(child).is_none() {
            return false;
        }
        match self.slot_mut(parent).map(|slot| slot.data.as_mut()) {
            Some(Some(NodeData::Element { children, .. })) => {
                children.push(child);
            }
            _ => return false,
        }
        if let Some(slot) = self.slot_mut(child) {
            slot.parent = Some(parent);
        }
        true
    }

    /// Detaches `node` from its parent and frees it with all descendants.
    pub fn remove_subtree(&mut self, node: NodeRef) {
        let parent = self.parent(node);
        if let Some(parent) = parent {
            if let Some(Some(NodeData::Element { children, .. })) =
                self.slot_mut(parent).map(|slot| slot.data.as_mut())
            {
                children.retain(|c| *c != node);
            }
        }
        if self.root == Some(node) {
            self.root = None;
        }
        self.free_recursive(node);
    }

    fn free_recursive(&mut self, node: NodeRef) {
        let children = self.children(node);
        for child in children {
            self.free_recursive(child);
        }
        let vacated = self
            .slot_mut(node)
            .map(|slot| {
                slot.data = None;
                slot.parent = None;
            })
            .is_some();
        if vacated {
            self.free.push(node.index);
        }
    }

    pub fn is_alive(&self, node: NodeRef) -> bool {
        self.slot(node).is_some()
    }

    pub fn tag(&self, node: NodeRef) -> Option<TagId> {
        match self.slot(node)?.data.as_ref()? {
            NodeData::Element { tag, .. } => Some(*tag),
            NodeData::TextRun { .. } => Some(TagId::TEXT),
        }
    }

    pub fn is_text(&self, node: NodeRef) -> bool {
        matches!(
            self.slot(node).and_then(|slot| slot.data.as_ref()),
            Some(NodeData::TextRun { .. })
        )
    }

    pub fn attributes(&self, node: NodeRef) -> Option<&AttributeList> {
        match self.slot(node)?.data.as_ref()? {
            NodeData::Element { attributes, .. } => Some(attributes),
            NodeData::TextRun { .. } => None,
        }
    }

    /// Attribute value lookup, first match wins.
    pub fn attribute(&self, node: NodeRef, name: &[u8]) -> Option<&[u8]> {
        self.attributes(node)?.get(name)
    }

    pub fn parent(&self, node: NodeRef) -> Option<NodeRef> {
        self.slot(node)?.parent
    }

    pub fn child_count(&self, node: NodeRef) -> usize {
        match self.slot(node).and_then(|slot| slot.data.as_ref()) {
            Some(NodeData::Element { children, .. }) => children.len(),
            _ => 0,
        }
    }

    pub fn child(&self, node: NodeRef, index: usize) -> Option<NodeRef> {
        match self.slot(node)?.data.as_ref()? {
            NodeData::Element { children, .. } => children.get(index).copied(),
            NodeData::TextRun { .. } => None,
        }
    }

    /// A snapshot of the child list; safe to hold across mutations.
    pub fn children(&self, node: NodeRef) -> Vec<NodeRef> {
        match self.slot(node).and_then(|slot| slot.data.as_ref()) {
            Some(NodeData::Element { children, .. }) => children.clone(),
            _ => Vec::new(),
        }
    }

    pub fn last_child(&self, node: NodeRef) -> Option<NodeRef> {
        match self.slot(node)?.data.as_ref()? {
            NodeData::Element { children, .. } => children.last().copied(),
            NodeData::TextRun { .. } => None,
        }
    }

    pub fn fragments(&self, node: NodeRef) -> Option<&[TextFragment]> {
        match self.slot(node)?.data.as_ref()? {
            NodeData::TextRun { fragments } => Some(fragments),
            NodeData::Element { .. } => None,
        }
    }

    /// Appends decoded text bytes to a TextRun, splitting into word and
    /// whitespace runs and merging with the trailing fragment when both are
    /// of the same kind, so coalesced source tokens read back as one run.
    pub fn append_text(&mut self, node: NodeRef, bytes: &[u8]) -> bool {
        let fragments = match self.slot_mut(node).and_then(|slot| slot.data.as_mut()) {
            Some(NodeData::TextRun { fragments }) => fragments,
            _ => return false,
        };

        let mut at = 0;
        while at < bytes.len() {
            let is_space = bytes[at].is_ascii_whitespace();
            let mut end = at + 1;
            while end < bytes.len() && bytes[end].is_ascii_whitespace() == is_space {
                end += 1;
            }
            let run = &bytes[at..end];
            match (fragments.last_mut(), is_space) {
                (Some(TextFragment::Word(tail)), false) => tail.extend_from_slice(run),
                (Some(TextFragment::Whitespace(tail)), true) => tail.extend_from_slice(run),
                (_, false) => fragments.push(TextFragment::Word(run.to_vec())),
                (_, true) => fragments.push(TextFragment::Whitespace(run.to_vec())),
            }
            at = end;
        }
        true
    }

    /// The concatenated bytes of a TextRun.
    pub fn text_bytes(&self, node: NodeRef) -> Option<Vec<u8>> {
        let fragments = self.fragments(node)?;
        let mut out = Vec::new();
        for fragment in fragments {
            match fragment {
                TextFragment::Word(bytes) | TextFragment::Whitespace(bytes) => {
                    out.extend_from_slice(bytes)
                }
            }
        }
        Some(out)
    }

    /// Collapsed text for the node-command surface: the text of this node
    /// (or all TextRun descendants of an element), whitespace runs reduced
    /// to single spaces.
    pub fn text(&self, node: NodeRef) -> Option<Vec<u8>> {
        let mut out = Vec::new();
        self.collect_text(node, &mut out)?;
        Some(out)
    }

    fn collect_text(&self, node: NodeRef, out: &mut Vec<u8>) -> Option<()> {
        match self.slot(node)?.data.as_ref()? {
            NodeData::TextRun { fragments } => {
                for fragment in fragments {
                    match fragment {
                        TextFragment::Word(bytes) => out.extend_from_slice(bytes),
                        TextFragment::Whitespace(_) => out.push(b' '),
                    }
                }
            }
            NodeData::Element { children, .. } => {
                for child in children.clone() {
                    self.collect_text(child, out)?;
                }
            }
        }
        Some(())
    }

    /// Deepest node that is an inclusive ancestor of both arguments.
    pub fn common_ancestor(&self, a: NodeRef, b: NodeRef) -> Option<NodeRef> {
        let mut a_chain = Vec::new();
        let mut walk = Some(a);
        while let Some(node) = walk {
            a_chain.push(node);
            walk = self.parent(node);
        }
        let mut walk = Some(b);
        while let Some(node) = walk {
            if a_chain.contains(&node) {
                return Some(node);
            }
            walk = self.parent(node);
        }
        None
    }
}
