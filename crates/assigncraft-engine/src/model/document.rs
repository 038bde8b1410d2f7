use std::cmp::Ordering;
use std::collections::HashMap;

use crate::error::ModelError;
use crate::model::{
    Alignment, Block, BlockKind, Fragment, FragmentNode, InlineAttr, InlineRun, Node, NodeId,
    RunFormat,
};

/// A position inside the content tree.
///
/// The meaning of `offset` depends on the node it references:
/// - run: character offset into the run's text
/// - block: child index (the boundary before that child)
/// - embed: 0 before the image, 1 after it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Anchor {
    pub node: NodeId,
    pub offset: usize,
}

impl Anchor {
    pub fn new(node: NodeId, offset: usize) -> Self {
        Self { node, offset }
    }
}

/// Position expressed against the document-order leaf list
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct LeafPos {
    pub index: usize,
    pub offset: usize,
}

#[derive(Debug, Clone)]
struct Slot {
    parent: Option<NodeId>,
    node: Node,
}

/// Where a removed node used to live
#[derive(Debug, Clone, Copy)]
struct Tombstone {
    parent: NodeId,
    index: usize,
}

/// Outcome of cutting a text block at a position
enum Cut {
    Before,
    After,
    Split,
}

/// The editable content tree.
///
/// The document owns every node through an id-keyed arena. Exactly one
/// `Body` block is the root; every other node has exactly one parent. Nodes
/// are only created and destroyed through the mutation methods below, each of
/// which bumps [`Document::version`].
#[derive(Debug, Clone)]
pub struct Document {
    slots: HashMap<NodeId, Slot>,
    tombstones: HashMap<NodeId, Tombstone>,
    root: NodeId,
    next_id: u64,
    version: u64,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Create an empty document: a body holding one empty paragraph
    pub fn new() -> Self {
        let mut doc = Self::with_first_id(0);
        doc.ensure_body_not_empty();
        doc.version = 0;
        doc
    }

    /// Bare body with id allocation starting at `first_id`
    pub(crate) fn with_first_id(first_id: u64) -> Self {
        let root = NodeId(first_id);
        let mut slots = HashMap::new();
        slots.insert(
            root,
            Slot {
                parent: None,
                node: Node::Block(Block::new(BlockKind::Body)),
            },
        );
        Self {
            slots,
            tombstones: HashMap::new(),
            root,
            next_id: first_id + 1,
            version: 0,
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Incremented on every mutation
    pub fn version(&self) -> u64 {
        self.version
    }

    pub(crate) fn set_version(&mut self, version: u64) {
        self.version = version;
    }

    pub(crate) fn next_id(&self) -> u64 {
        self.next_id
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.slots.get(&id).map(|slot| &slot.node)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.slots.get(&id).and_then(|slot| slot.parent)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        match self.get(id) {
            Some(Node::Block(block)) => &block.children,
            _ => &[],
        }
    }

    pub fn block(&self, id: NodeId) -> Option<&Block> {
        self.get(id).and_then(Node::as_block)
    }

    pub fn run(&self, id: NodeId) -> Option<&InlineRun> {
        self.get(id).and_then(Node::as_run)
    }

    /// Whether the node is currently attached to this document
    pub fn contains(&self, id: NodeId) -> bool {
        self.slots.contains_key(&id)
    }

    fn touch(&mut self) {
        self.version += 1;
    }

    fn block_mut(&mut self, id: NodeId) -> Option<&mut Block> {
        match self.slots.get_mut(&id).map(|slot| &mut slot.node) {
            Some(Node::Block(block)) => Some(block),
            _ => None,
        }
    }

    fn run_mut(&mut self, id: NodeId) -> Option<&mut InlineRun> {
        match self.slots.get_mut(&id).map(|slot| &mut slot.node) {
            Some(Node::Run(run)) => Some(run),
            _ => None,
        }
    }

    fn index_in_parent(&self, id: NodeId) -> Result<(NodeId, usize), ModelError> {
        let parent = self.parent(id).ok_or(ModelError::NotAttached(id))?;
        let index = self
            .children(parent)
            .iter()
            .position(|child| *child == id)
            .ok_or(ModelError::NotAttached(id))?;
        Ok((parent, index))
    }

    /// Attach `node` as a child of `parent` at `index` (clamped)
    pub(crate) fn insert_child(&mut self, parent: NodeId, index: usize, node: Node) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        self.slots.insert(
            id,
            Slot {
                parent: Some(parent),
                node,
            },
        );
        if let Some(block) = self.block_mut(parent) {
            let index = index.min(block.children.len());
            block.children.insert(index, id);
        }
        id
    }

    fn insert_after(&mut self, sibling: NodeId, node: Node) -> Result<NodeId, ModelError> {
        let (parent, index) = self.index_in_parent(sibling)?;
        Ok(self.insert_child(parent, index + 1, node))
    }

    /// Detach a subtree, leaving tombstones so stale anchors can be remapped
    fn remove(&mut self, id: NodeId) -> Result<(), ModelError> {
        let (parent, index) = self.index_in_parent(id)?;
        if let Some(block) = self.block_mut(parent) {
            block.children.remove(index);
        }
        self.tombstones.insert(id, Tombstone { parent, index });
        self.drop_subtree(id);
        Ok(())
    }

    fn drop_subtree(&mut self, id: NodeId) {
        if let Some(slot) = self.slots.remove(&id)
            && let Node::Block(block) = slot.node
        {
            for (index, child) in block.children.into_iter().enumerate() {
                self.tombstones.insert(child, Tombstone { parent: id, index });
                self.drop_subtree(child);
            }
        }
    }

    /// The body always holds at least one paragraph with one run
    pub(crate) fn ensure_body_not_empty(&mut self) {
        if self.children(self.root).is_empty() {
            let root = self.root;
            let paragraph =
                self.insert_child(root, 0, Node::Block(Block::new(BlockKind::Paragraph)));
            self.insert_child(paragraph, 0, Node::Run(InlineRun::default()));
        }
    }

    // ============ Traversal ============

    /// Leaves (runs and embeds) in reading order
    pub fn leaves(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.collect_leaves(self.root, &mut out);
        out
    }

    fn collect_leaves(&self, id: NodeId, out: &mut Vec<NodeId>) {
        match self.get(id) {
            Some(Node::Block(block)) => {
                for child in &block.children {
                    self.collect_leaves(*child, out);
                }
            }
            Some(_) => out.push(id),
            None => {}
        }
    }

    /// Runs in reading order
    pub fn runs(&self) -> Vec<&InlineRun> {
        self.leaves()
            .into_iter()
            .filter_map(|id| self.run(id))
            .collect()
    }

    /// Blocks in reading order, root excluded
    pub fn blocks(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.collect_blocks(self.root, &mut out);
        out
    }

    fn collect_blocks(&self, id: NodeId, out: &mut Vec<NodeId>) {
        for child in self.children(id) {
            if self.block(*child).is_some() {
                out.push(*child);
                self.collect_blocks(*child, out);
            }
        }
    }

    /// Run text in reading order, with a newline between successive blocks
    pub fn plain_text(&self) -> String {
        let mut lines = Vec::new();
        for id in self.blocks() {
            let Some(block) = self.block(id) else {
                continue;
            };
            if block.kind.holds_inline() || block.kind == BlockKind::PageBreak {
                let line: String = block
                    .children
                    .iter()
                    .filter_map(|child| self.run(*child))
                    .map(|run| run.text.as_str())
                    .collect();
                lines.push(line);
            }
        }
        lines.join("\n")
    }

    /// Child-index path from the root down to `id`
    fn path(&self, id: NodeId) -> Result<Vec<usize>, ModelError> {
        if !self.contains(id) {
            return Err(ModelError::DanglingAnchor(id));
        }
        let mut path = Vec::new();
        let mut current = id;
        while current != self.root {
            let (parent, index) = self.index_in_parent(current)?;
            path.push(index);
            current = parent;
        }
        path.reverse();
        Ok(path)
    }

    fn anchor_path(&self, anchor: &Anchor) -> Result<Vec<usize>, ModelError> {
        let mut path = self.path(anchor.node)?;
        path.push(anchor.offset);
        Ok(path)
    }

    /// Document-order comparison of two anchors
    pub fn compare(&self, a: &Anchor, b: &Anchor) -> Result<Ordering, ModelError> {
        Ok(self.anchor_path(a)?.cmp(&self.anchor_path(b)?))
    }

    /// Map an anchor onto the leaf list. `None` when the document has no leaves.
    pub(crate) fn locate(
        &self,
        leaves: &[NodeId],
        anchor: &Anchor,
    ) -> Result<Option<LeafPos>, ModelError> {
        let node = self
            .get(anchor.node)
            .ok_or(ModelError::DanglingAnchor(anchor.node))?;
        if node.is_leaf() {
            let index = leaves
                .iter()
                .position(|leaf| *leaf == anchor.node)
                .ok_or(ModelError::NotAttached(anchor.node))?;
            return Ok(Some(LeafPos {
                index,
                offset: anchor.offset.min(node.leaf_len()),
            }));
        }

        // A block boundary resolves to the first leaf after it, or the end of the last leaf
        let target = self.anchor_path(anchor)?;
        for (index, leaf) in leaves.iter().enumerate() {
            if self.path(*leaf)? >= target {
                return Ok(Some(LeafPos { index, offset: 0 }));
            }
        }
        Ok(leaves.last().and_then(|last| {
            self.get(*last).map(|node| LeafPos {
                index: leaves.len() - 1,
                offset: node.leaf_len(),
            })
        }))
    }

    /// Anchor at the given character index of the concatenated run text
    pub fn anchor_at_char(&self, index: usize) -> Option<Anchor> {
        let mut seen = 0;
        let mut last = None;
        for leaf in self.leaves() {
            let Some(run) = self.run(leaf) else {
                continue;
            };
            let len = run.len();
            if index <= seen + len {
                return Some(Anchor::new(leaf, index - seen));
            }
            seen += len;
            last = Some(Anchor::new(leaf, len));
        }
        last
    }

    /// Re-derive a usable anchor. Anchors on removed nodes move to the
    /// nearest surviving ancestor position; offsets are clamped.
    pub fn remap(&self, anchor: &Anchor) -> Anchor {
        if let Some(node) = self.get(anchor.node) {
            return Anchor::new(anchor.node, anchor.offset.min(node.leaf_len()));
        }
        let mut current = anchor.node;
        while let Some(stone) = self.tombstones.get(&current) {
            if let Some(parent) = self.get(stone.parent) {
                return Anchor::new(stone.parent, stone.index.min(parent.leaf_len()));
            }
            current = stone.parent;
        }
        Anchor::new(self.root, 0)
    }

    // ============ Inline formatting ============

    /// Format of the text a caret at `anchor` would type into
    pub fn format_at(&self, anchor: &Anchor) -> Result<RunFormat, ModelError> {
        let leaves = self.leaves();
        let Some(pos) = self.locate(&leaves, anchor)? else {
            return Ok(RunFormat::default());
        };
        Ok(self
            .run(leaves[pos.index])
            .map(|run| run.format.clone())
            .unwrap_or_default())
    }

    /// Format of the first character covered by the range; caret format when collapsed
    pub fn format_at_range_start(
        &self,
        start: &Anchor,
        end: &Anchor,
    ) -> Result<RunFormat, ModelError> {
        let leaves = self.leaves();
        let (Some(s), Some(e)) = (self.locate(&leaves, start)?, self.locate(&leaves, end)?) else {
            return Ok(RunFormat::default());
        };
        if s >= e {
            return self.format_at(start);
        }
        for index in s.index..=e.index {
            let Some(run) = self.run(leaves[index]) else {
                continue;
            };
            let lo = if index == s.index { s.offset } else { 0 };
            let hi = if index == e.index { e.offset } else { run.len() };
            if lo < hi {
                return Ok(run.format.clone());
            }
        }
        self.format_at(start)
    }

    /// Set an inline attribute on exactly the text between `start` and `end`.
    ///
    /// Runs partially covered are split into up to three runs. A collapsed
    /// range leaves an empty marker run carrying the new format at the caret,
    /// so text typed next inherits it. Returns anchors spanning the formatted
    /// runs.
    pub fn apply_formatting(
        &mut self,
        start: &Anchor,
        end: &Anchor,
        attr: &InlineAttr,
    ) -> Result<(Anchor, Anchor), ModelError> {
        let leaves = self.leaves();
        let (Some(mut s), Some(mut e)) =
            (self.locate(&leaves, start)?, self.locate(&leaves, end)?)
        else {
            return Ok((*start, *end));
        };
        if e < s {
            std::mem::swap(&mut s, &mut e);
        }

        if s == e {
            let leaf = leaves[s.index];
            if self.run(leaf).is_none() {
                return Ok((*start, *end));
            }
            let marker = self.format_slice(leaf, s.offset, s.offset, attr)?;
            self.touch();
            let caret = Anchor::new(marker, 0);
            return Ok((caret, caret));
        }

        let mut first = None;
        let mut last = None;
        for index in s.index..=e.index {
            let leaf = leaves[index];
            let Some(run) = self.run(leaf) else {
                continue;
            };
            let lo = if index == s.index { s.offset } else { 0 };
            let hi = if index == e.index { e.offset } else { run.len() };
            if lo >= hi {
                continue;
            }
            let covered = self.format_slice(leaf, lo, hi, attr)?;
            first.get_or_insert(covered);
            last = Some(covered);
        }
        self.touch();

        match (first, last) {
            (Some(first), Some(last)) => {
                let len = self.run(last).map(InlineRun::len).unwrap_or(0);
                Ok((Anchor::new(first, 0), Anchor::new(last, len)))
            }
            _ => Ok((*start, *end)),
        }
    }

    /// Apply `attr` to characters `lo..hi` of a run, returning the covered run
    fn format_slice(
        &mut self,
        id: NodeId,
        lo: usize,
        hi: usize,
        attr: &InlineAttr,
    ) -> Result<NodeId, ModelError> {
        let run = self.run(id).ok_or(ModelError::NotAttached(id))?;
        if run.is_empty() || (lo == 0 && hi >= run.len()) {
            if let Some(run) = self.run_mut(id) {
                attr.apply(&mut run.format);
            }
            return Ok(id);
        }

        let original = run.format.clone();
        let (before, covered, after) = split_chars(&run.text, lo, hi);
        let mut format = original.clone();
        attr.apply(&mut format);

        let covered_id = if before.is_empty() {
            if let Some(run) = self.run_mut(id) {
                run.text = covered;
                run.format = format;
            }
            id
        } else {
            if let Some(run) = self.run_mut(id) {
                run.text = before;
            }
            self.insert_after(id, Node::Run(InlineRun::with_format(covered, format)))?
        };
        if !after.is_empty() {
            self.insert_after(covered_id, Node::Run(InlineRun::with_format(after, original)))?;
        }
        Ok(covered_id)
    }

    /// Strip inline styling (links survive) and reset block alignment and indent
    pub fn clear_formatting(&mut self) {
        for slot in self.slots.values_mut() {
            match &mut slot.node {
                Node::Run(run) => {
                    run.format = RunFormat {
                        link: run.format.link.take(),
                        ..RunFormat::default()
                    };
                }
                Node::Block(block) => {
                    block.align = Alignment::Left;
                    block.indent = 0;
                }
                Node::Embed(_) => {}
            }
        }
        self.touch();
    }

    // ============ Block formatting ============

    /// Nearest ancestors matching `pred` for every leaf the range touches
    pub fn blocks_in_range(
        &self,
        start: &Anchor,
        end: &Anchor,
        pred: impl Fn(&BlockKind) -> bool,
    ) -> Result<Vec<NodeId>, ModelError> {
        let leaves = self.leaves();
        let (Some(mut s), Some(mut e)) =
            (self.locate(&leaves, start)?, self.locate(&leaves, end)?)
        else {
            return Ok(Vec::new());
        };
        if e < s {
            std::mem::swap(&mut s, &mut e);
        }

        let mut found: Vec<NodeId> = Vec::new();
        for leaf in &leaves[s.index..=e.index] {
            let mut current = self.parent(*leaf);
            while let Some(id) = current {
                match self.block(id) {
                    Some(block) if pred(&block.kind) => {
                        if !found.contains(&id) {
                            found.push(id);
                        }
                        break;
                    }
                    _ => current = self.parent(id),
                }
            }
        }
        Ok(found)
    }

    /// Change the kind of every text block the range touches
    pub fn set_block_type(
        &mut self,
        start: &Anchor,
        end: &Anchor,
        kind: BlockKind,
    ) -> Result<usize, ModelError> {
        if !kind.is_text_block() {
            return Err(ModelError::InvalidPosition(format!(
                "{kind:?} is not a text block kind"
            )));
        }
        let kind = match kind {
            BlockKind::Heading { level } => BlockKind::Heading {
                level: level.clamp(1, 3),
            },
            other => other,
        };
        let targets = self.blocks_in_range(start, end, BlockKind::is_text_block)?;
        for id in &targets {
            if let Some(block) = self.block_mut(*id) {
                block.kind = kind;
            }
        }
        self.touch();
        Ok(targets.len())
    }

    pub fn set_alignment(
        &mut self,
        start: &Anchor,
        end: &Anchor,
        align: Alignment,
    ) -> Result<usize, ModelError> {
        let targets = self.blocks_in_range(start, end, BlockKind::holds_inline)?;
        for id in &targets {
            if let Some(block) = self.block_mut(*id) {
                block.align = align;
            }
        }
        self.touch();
        Ok(targets.len())
    }

    /// Shift the nesting level of touched text blocks; never below zero
    pub fn adjust_indent(
        &mut self,
        start: &Anchor,
        end: &Anchor,
        delta: i8,
    ) -> Result<usize, ModelError> {
        let targets = self.blocks_in_range(start, end, BlockKind::is_text_block)?;
        for id in &targets {
            if let Some(block) = self.block_mut(*id) {
                block.indent = block.indent.saturating_add_signed(delta);
            }
        }
        self.touch();
        Ok(targets.len())
    }

    /// Turn touched text blocks into list items, or back into paragraphs when
    /// they already all are items of this list kind. Returns whether the list
    /// is on afterwards.
    pub fn toggle_list(
        &mut self,
        start: &Anchor,
        end: &Anchor,
        ordered: bool,
    ) -> Result<bool, ModelError> {
        let targets = self.blocks_in_range(start, end, BlockKind::is_text_block)?;
        let already = !targets.is_empty()
            && targets.iter().all(|id| {
                self.block(*id)
                    .is_some_and(|block| block.kind == BlockKind::ListItem { ordered })
            });
        let kind = if already {
            BlockKind::Paragraph
        } else {
            BlockKind::ListItem { ordered }
        };
        for id in &targets {
            if let Some(block) = self.block_mut(*id) {
                block.kind = kind;
            }
        }
        self.touch();
        Ok(!already)
    }

    // ============ Text and fragment insertion ============

    /// Insert typed text at `at`, returning the caret after it
    pub fn insert_text(&mut self, at: &Anchor, text: &str) -> Result<Anchor, ModelError> {
        if text.is_empty() {
            return Ok(*at);
        }
        let typed = text.chars().count();
        let node = self.get(at.node).ok_or(ModelError::DanglingAnchor(at.node))?;
        match node {
            Node::Run(run) => {
                let offset = at.offset.min(run.len());
                let byte = byte_offset(&run.text, offset);
                if let Some(run) = self.run_mut(at.node) {
                    run.text.insert_str(byte, text);
                }
                self.touch();
                Ok(Anchor::new(at.node, offset + typed))
            }
            Node::Embed(_) => {
                let (parent, index) = self.index_in_parent(at.node)?;
                let target = if at.offset == 0 { index } else { index + 1 };
                self.insert_text(&Anchor::new(parent, target), text)
            }
            Node::Block(block) if block.kind.holds_inline() => {
                let index = at.offset.min(block.children.len());
                // Typed text continues the format of the preceding run
                let format = index
                    .checked_sub(1)
                    .and_then(|prev| block.children.get(prev))
                    .and_then(|prev| self.run(*prev))
                    .map(|run| run.format.clone())
                    .unwrap_or_default();
                let id = self.insert_child(
                    at.node,
                    index,
                    Node::Run(InlineRun::with_format(text, format)),
                );
                self.touch();
                Ok(Anchor::new(id, typed))
            }
            Node::Block(block) if block.kind == BlockKind::Body => {
                let index = at.offset.min(block.children.len());
                let paragraph = self.insert_child(
                    at.node,
                    index,
                    Node::Block(Block::new(BlockKind::Paragraph)),
                );
                let id = self.insert_child(paragraph, 0, Node::Run(InlineRun::new(text)));
                self.touch();
                Ok(Anchor::new(id, typed))
            }
            Node::Block(_) => {
                let (parent, index) = self.index_in_parent(at.node)?;
                self.insert_text(&Anchor::new(parent, index + 1), text)
            }
        }
    }

    /// Remove the text and images between two anchors. Blocks are kept; an
    /// inline block never loses its last child.
    pub fn delete_range(&mut self, start: &Anchor, end: &Anchor) -> Result<Anchor, ModelError> {
        let leaves = self.leaves();
        let (Some(mut s), Some(mut e)) =
            (self.locate(&leaves, start)?, self.locate(&leaves, end)?)
        else {
            return Ok(*start);
        };
        if e < s {
            std::mem::swap(&mut s, &mut e);
        }
        if s == e {
            return Ok(Anchor::new(leaves[s.index], s.offset));
        }

        let caret_leaf = leaves[s.index];
        for index in s.index..=e.index {
            let leaf = leaves[index];
            let len = self.get(leaf).map(Node::leaf_len).unwrap_or(0);
            let lo = if index == s.index { s.offset } else { 0 };
            let hi = if index == e.index { e.offset } else { len };
            if lo >= hi {
                continue;
            }
            if let Some(run) = self.run_mut(leaf) {
                let (before, _, after) = split_chars(&run.text, lo, hi);
                run.text = before + &after;
            }
            let emptied =
                self.run(leaf).is_some_and(InlineRun::is_empty) || (lo == 0 && hi >= len);
            let siblings = self
                .parent(leaf)
                .map(|parent| self.children(parent).len())
                .unwrap_or(0);
            if emptied && leaf != caret_leaf && siblings > 1 {
                self.remove(leaf)?;
            }
        }
        self.touch();

        let caret = if self.contains(caret_leaf) {
            Anchor::new(caret_leaf, s.offset)
        } else {
            self.remap(&Anchor::new(caret_leaf, s.offset))
        };
        Ok(caret)
    }

    /// Splice `fragment` in at `position`.
    ///
    /// Inline fragments go into the surrounding block, splitting a run when
    /// the position falls inside one. Block fragments go next to the
    /// top-level block containing the position; a text block is split in two
    /// when the position is mid-content. Tables, figures and page breaks are
    /// never split. Returns the last inserted top-level node.
    pub fn insert_fragment(
        &mut self,
        position: &Anchor,
        fragment: Fragment,
    ) -> Result<Option<NodeId>, ModelError> {
        if !self.contains(position.node) {
            return Err(ModelError::DanglingAnchor(position.node));
        }
        if fragment.is_empty() {
            return Ok(None);
        }
        let last = if fragment.is_inline() {
            self.insert_inline(position, fragment.nodes)?
        } else {
            self.insert_blocks(position, wrap_loose_inline(fragment.nodes))?
        };
        self.touch();
        Ok(last)
    }

    fn insert_inline(
        &mut self,
        position: &Anchor,
        nodes: Vec<FragmentNode>,
    ) -> Result<Option<NodeId>, ModelError> {
        let (parent, mut index) = match self.get(position.node) {
            Some(Node::Run(run)) => {
                let len = run.len();
                let (parent, index) = self.index_in_parent(position.node)?;
                if position.offset == 0 {
                    (parent, index)
                } else if position.offset >= len {
                    (parent, index + 1)
                } else {
                    self.split_run(position.node, position.offset)?;
                    (parent, index + 1)
                }
            }
            Some(Node::Embed(_)) => {
                let (parent, index) = self.index_in_parent(position.node)?;
                (parent, if position.offset == 0 { index } else { index + 1 })
            }
            Some(Node::Block(block)) if block.kind.holds_inline() => {
                (position.node, position.offset.min(block.children.len()))
            }
            Some(Node::Block(_)) => {
                let paragraph = FragmentNode::block(BlockKind::Paragraph, nodes);
                return self.insert_blocks(position, vec![paragraph]);
            }
            None => return Err(ModelError::DanglingAnchor(position.node)),
        };

        let mut last = None;
        for node in nodes {
            let id = self.materialize(parent, index, node);
            index += 1;
            last = Some(id);
        }
        Ok(last)
    }

    fn insert_blocks(
        &mut self,
        position: &Anchor,
        nodes: Vec<FragmentNode>,
    ) -> Result<Option<NodeId>, ModelError> {
        let root = self.root;
        let mut index = self.block_insertion_index(position)?;
        let mut last = None;
        for node in nodes {
            let id = self.materialize(root, index, node);
            index += 1;
            last = Some(id);
        }
        Ok(last)
    }

    /// Child index of the body at which block fragments are inserted
    fn block_insertion_index(&mut self, position: &Anchor) -> Result<usize, ModelError> {
        if position.node == self.root {
            return Ok(position.offset.min(self.children(self.root).len()));
        }

        let mut top = position.node;
        while let Some(parent) = self.parent(top) {
            if parent == self.root {
                break;
            }
            top = parent;
        }
        let (_, top_index) = self.index_in_parent(top)?;

        let splittable = self
            .block(top)
            .is_some_and(|block| block.kind.is_text_block());
        if !splittable {
            return Ok(top_index + 1);
        }
        Ok(match self.cut_text_block(top, position)? {
            Cut::Before => top_index,
            Cut::After | Cut::Split => top_index + 1,
        })
    }

    /// Split a text block at `position` if it falls between content
    fn cut_text_block(&mut self, block_id: NodeId, position: &Anchor) -> Result<Cut, ModelError> {
        let cut = if position.node == block_id {
            position.offset.min(self.children(block_id).len())
        } else {
            let (parent, index) = self.index_in_parent(position.node)?;
            if parent != block_id {
                return Ok(Cut::After);
            }
            let len = self.get(position.node).map(Node::leaf_len).unwrap_or(0);
            if position.offset == 0 {
                index
            } else if position.offset >= len {
                index + 1
            } else {
                self.split_run(position.node, position.offset)?;
                index + 1
            }
        };

        let children = self.children(block_id).to_vec();
        let has_content = |ids: &[NodeId]| {
            ids.iter().any(|id| match self.get(*id) {
                Some(Node::Run(run)) => !run.is_empty(),
                Some(_) => true,
                None => false,
            })
        };
        if !has_content(&children[..cut]) {
            return Ok(Cut::Before);
        }
        if !has_content(&children[cut..]) {
            return Ok(Cut::After);
        }

        let (kind, align, indent) = match self.block(block_id) {
            Some(block) => (block.kind, block.align, block.indent),
            None => return Err(ModelError::NotAttached(block_id)),
        };
        let mut right = Block::new(kind);
        right.align = align;
        right.indent = indent;
        let right_id = self.insert_after(block_id, Node::Block(right))?;

        let moved = children[cut..].to_vec();
        if let Some(block) = self.block_mut(block_id) {
            block.children.truncate(cut);
        }
        for id in &moved {
            if let Some(slot) = self.slots.get_mut(id) {
                slot.parent = Some(right_id);
            }
        }
        if let Some(block) = self.block_mut(right_id) {
            block.children = moved;
        }
        Ok(Cut::Split)
    }

    /// Split a run at a character offset; the right piece keeps the format
    fn split_run(&mut self, id: NodeId, offset: usize) -> Result<NodeId, ModelError> {
        let run = self.run(id).ok_or(ModelError::NotAttached(id))?;
        let (before, _, after) = split_chars(&run.text, offset, offset);
        let format = run.format.clone();
        if let Some(run) = self.run_mut(id) {
            run.text = before;
        }
        self.insert_after(id, Node::Run(InlineRun::with_format(after, format)))
    }

    /// Attach a fragment subtree, returning the id of its root
    fn materialize(&mut self, parent: NodeId, index: usize, node: FragmentNode) -> NodeId {
        match node {
            FragmentNode::Run(run) => self.insert_child(parent, index, Node::Run(run)),
            FragmentNode::Embed(embed) => self.insert_child(parent, index, Node::Embed(embed)),
            FragmentNode::Block {
                kind,
                align,
                indent,
                children,
            } => {
                let mut block = Block::new(kind);
                block.align = align;
                block.indent = indent;
                let id = self.insert_child(parent, index, Node::Block(block));
                let empty = children.is_empty();
                for (position, child) in children.into_iter().enumerate() {
                    self.materialize(id, position, child);
                }
                if empty && kind.holds_inline() && !matches!(kind, BlockKind::Figure { .. }) {
                    self.insert_child(id, 0, Node::Run(InlineRun::default()));
                }
                id
            }
        }
    }
}

/// Group runs and embeds that sit between blocks into paragraphs
fn wrap_loose_inline(nodes: Vec<FragmentNode>) -> Vec<FragmentNode> {
    let mut out = Vec::new();
    let mut pending = Vec::new();
    for node in nodes {
        if node.is_block() {
            if !pending.is_empty() {
                out.push(FragmentNode::block(
                    BlockKind::Paragraph,
                    std::mem::take(&mut pending),
                ));
            }
            out.push(node);
        } else {
            pending.push(node);
        }
    }
    if !pending.is_empty() {
        out.push(FragmentNode::block(BlockKind::Paragraph, pending));
    }
    out
}

/// Byte index of the `chars`-th character
fn byte_offset(text: &str, chars: usize) -> usize {
    text.char_indices()
        .nth(chars)
        .map(|(byte, _)| byte)
        .unwrap_or(text.len())
}

/// Split into (before `lo`, `lo..hi`, after `hi`), character-indexed
fn split_chars(text: &str, lo: usize, hi: usize) -> (String, String, String) {
    let lo_byte = byte_offset(text, lo);
    let hi_byte = byte_offset(text, hi.max(lo));
    (
        text[..lo_byte].to_string(),
        text[lo_byte..hi_byte].to_string(),
        text[hi_byte..].to_string(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn doc_with_text(text: &str) -> (Document, NodeId) {
        let mut doc = Document::new();
        let run = doc.leaves()[0];
        doc.insert_text(&Anchor::new(run, 0), text).unwrap();
        (doc, run)
    }

    fn run_texts(doc: &Document) -> Vec<(String, bool)> {
        doc.runs()
            .into_iter()
            .map(|run| (run.text.clone(), run.format.bold))
            .collect()
    }

    #[test]
    fn test_new_document_has_one_empty_paragraph() {
        let doc = Document::new();
        let blocks = doc.blocks();
        assert_eq!(blocks.len(), 1);
        assert_eq!(doc.block(blocks[0]).unwrap().kind, BlockKind::Paragraph);
        assert_eq!(doc.runs().len(), 1);
        assert_eq!(doc.plain_text(), "");
        assert_eq!(doc.version(), 0);
    }

    #[test]
    fn test_formatting_splits_run_into_three() {
        let (mut doc, run) = doc_with_text("hello world");
        let (start, end) = doc
            .apply_formatting(
                &Anchor::new(run, 2),
                &Anchor::new(run, 7),
                &InlineAttr::Bold(true),
            )
            .unwrap();

        assert_eq!(
            run_texts(&doc),
            vec![
                ("he".to_string(), false),
                ("llo w".to_string(), true),
                ("orld".to_string(), false),
            ]
        );
        assert_eq!(start.offset, 0);
        assert_eq!(doc.run(start.node).unwrap().text, "llo w");
        assert_eq!(end, Anchor::new(start.node, 5));
    }

    #[test]
    fn test_formatting_whole_run_keeps_node() {
        let (mut doc, run) = doc_with_text("abc");
        doc.apply_formatting(
            &Anchor::new(run, 0),
            &Anchor::new(run, 3),
            &InlineAttr::Italic(true),
        )
        .unwrap();
        assert_eq!(doc.runs().len(), 1);
        assert!(doc.run(run).unwrap().format.italic);
    }

    #[test]
    fn test_formatting_across_blocks() {
        let (mut doc, first) = doc_with_text("one");
        let end = doc.insert_fragment(
            &Anchor::new(doc.root(), 1),
            Fragment::new(vec![FragmentNode::block(
                BlockKind::Paragraph,
                vec![FragmentNode::Run(InlineRun::new("two"))],
            )]),
        );
        let second_block = end.unwrap().unwrap();
        let second = doc.children(second_block)[0];

        doc.apply_formatting(
            &Anchor::new(first, 1),
            &Anchor::new(second, 2),
            &InlineAttr::Underline(true),
        )
        .unwrap();

        let underlined: Vec<String> = doc
            .runs()
            .into_iter()
            .filter(|run| run.format.underline)
            .map(|run| run.text.clone())
            .collect();
        assert_eq!(underlined, vec!["ne".to_string(), "tw".to_string()]);
        assert_eq!(doc.plain_text(), "one\ntwo");
    }

    #[test]
    fn test_collapsed_formatting_creates_marker() {
        let (mut doc, run) = doc_with_text("ab");
        let (caret, _) = doc
            .apply_formatting(
                &Anchor::new(run, 1),
                &Anchor::new(run, 1),
                &InlineAttr::Bold(true),
            )
            .unwrap();
        let caret = doc.insert_text(&caret, "X").unwrap();

        assert_eq!(
            run_texts(&doc),
            vec![
                ("a".to_string(), false),
                ("X".to_string(), true),
                ("b".to_string(), false),
            ]
        );
        assert_eq!(caret.offset, 1);
    }

    #[test]
    fn test_block_type_is_idempotent() {
        let (mut doc, run) = doc_with_text("title");
        let at = Anchor::new(run, 0);
        doc.set_block_type(&at, &at, BlockKind::Heading { level: 2 })
            .unwrap();
        let once = doc.block(doc.blocks()[0]).unwrap().clone();
        doc.set_block_type(&at, &at, BlockKind::Heading { level: 2 })
            .unwrap();
        assert_eq!(doc.block(doc.blocks()[0]).unwrap(), &once);
        assert_eq!(once.kind, BlockKind::Heading { level: 2 });
    }

    #[test]
    fn test_heading_level_is_clamped() {
        let (mut doc, run) = doc_with_text("x");
        let at = Anchor::new(run, 0);
        doc.set_block_type(&at, &at, BlockKind::Heading { level: 9 })
            .unwrap();
        assert_eq!(
            doc.block(doc.blocks()[0]).unwrap().kind,
            BlockKind::Heading { level: 3 }
        );
    }

    #[test]
    fn test_indent_never_goes_below_zero() {
        let (mut doc, run) = doc_with_text("x");
        let at = Anchor::new(run, 0);
        doc.adjust_indent(&at, &at, -1).unwrap();
        assert_eq!(doc.block(doc.blocks()[0]).unwrap().indent, 0);
        doc.adjust_indent(&at, &at, 1).unwrap();
        doc.adjust_indent(&at, &at, 1).unwrap();
        doc.adjust_indent(&at, &at, -1).unwrap();
        assert_eq!(doc.block(doc.blocks()[0]).unwrap().indent, 1);
    }

    #[test]
    fn test_toggle_list_unwraps_to_paragraph() {
        let (mut doc, run) = doc_with_text("item");
        let at = Anchor::new(run, 0);
        assert!(doc.toggle_list(&at, &at, true).unwrap());
        assert_eq!(
            doc.block(doc.blocks()[0]).unwrap().kind,
            BlockKind::ListItem { ordered: true }
        );
        assert!(!doc.toggle_list(&at, &at, true).unwrap());
        assert_eq!(doc.block(doc.blocks()[0]).unwrap().kind, BlockKind::Paragraph);
    }

    #[test]
    fn test_toggle_list_switches_kind() {
        let (mut doc, run) = doc_with_text("item");
        let at = Anchor::new(run, 0);
        doc.toggle_list(&at, &at, true).unwrap();
        assert!(doc.toggle_list(&at, &at, false).unwrap());
        assert_eq!(
            doc.block(doc.blocks()[0]).unwrap().kind,
            BlockKind::ListItem { ordered: false }
        );
    }

    #[test]
    fn test_block_fragment_splits_paragraph_mid_content() {
        let (mut doc, run) = doc_with_text("beforeafter");
        let last = doc
            .insert_fragment(&Anchor::new(run, 6), Fragment::page_break())
            .unwrap()
            .unwrap();

        let kinds: Vec<BlockKind> = doc
            .blocks()
            .into_iter()
            .map(|id| doc.block(id).unwrap().kind)
            .collect();
        assert_eq!(
            kinds,
            vec![
                BlockKind::Paragraph,
                BlockKind::PageBreak,
                BlockKind::Paragraph
            ]
        );
        assert_eq!(doc.block(last).unwrap().kind, BlockKind::PageBreak);
        assert_eq!(doc.plain_text(), "before\n\nafter");
    }

    #[test]
    fn test_block_fragment_at_paragraph_start_goes_before() {
        let (mut doc, run) = doc_with_text("text");
        doc.insert_fragment(&Anchor::new(run, 0), Fragment::page_break())
            .unwrap();
        let kinds: Vec<BlockKind> = doc
            .blocks()
            .into_iter()
            .map(|id| doc.block(id).unwrap().kind)
            .collect();
        assert_eq!(kinds, vec![BlockKind::PageBreak, BlockKind::Paragraph]);
    }

    #[test]
    fn test_block_fragment_inside_table_goes_after_table() {
        let (mut doc, run) = doc_with_text("x");
        let table = doc
            .insert_fragment(&Anchor::new(run, 1), Fragment::table(1, 1))
            .unwrap()
            .unwrap();
        let cell_run = doc.leaves()[1];
        assert_eq!(doc.parent(doc.parent(doc.parent(cell_run).unwrap()).unwrap()), Some(table));

        let pb = doc
            .insert_fragment(&Anchor::new(cell_run, 0), Fragment::page_break())
            .unwrap()
            .unwrap();
        let top: Vec<NodeId> = doc.children(doc.root()).to_vec();
        assert_eq!(top.iter().position(|id| *id == pb), Some(2));
    }

    #[test]
    fn test_inline_fragment_splits_run() {
        let (mut doc, run) = doc_with_text("ab");
        let mut link = InlineRun::new("L");
        link.format.link = Some("https://example.com".to_string());
        doc.insert_fragment(&Anchor::new(run, 1), Fragment::text(link))
            .unwrap();
        assert_eq!(doc.plain_text(), "aLb");
        assert_eq!(doc.runs().len(), 3);
        assert_eq!(
            doc.runs()[1].format.link.as_deref(),
            Some("https://example.com")
        );
    }

    #[test]
    fn test_typing_at_body_boundary_creates_paragraph() {
        let (mut doc, run) = doc_with_text("x");
        doc.insert_fragment(&Anchor::new(run, 1), Fragment::page_break())
            .unwrap();
        let caret = doc.insert_text(&Anchor::new(doc.root(), 2), "next").unwrap();
        assert_eq!(doc.run(caret.node).unwrap().text, "next");
        assert_eq!(doc.plain_text(), "x\n\nnext");
    }

    #[test]
    fn test_compare_orders_anchors() {
        let (doc, run) = doc_with_text("abc");
        let a = Anchor::new(run, 1);
        let b = Anchor::new(run, 2);
        assert_eq!(doc.compare(&a, &b).unwrap(), Ordering::Less);
        assert_eq!(doc.compare(&b, &a).unwrap(), Ordering::Greater);
        let block = doc.parent(run).unwrap();
        assert_eq!(
            doc.compare(&Anchor::new(block, 1), &b).unwrap(),
            Ordering::Greater
        );
    }

    #[test]
    fn test_remap_moves_to_surviving_ancestor() {
        let (mut doc, run) = doc_with_text("abc");
        let (_, end) = doc
            .apply_formatting(
                &Anchor::new(run, 1),
                &Anchor::new(run, 3),
                &InlineAttr::Bold(true),
            )
            .unwrap();
        let doomed = end.node;
        let block = doc.parent(doomed).unwrap();
        doc.delete_range(&Anchor::new(run, 1), &Anchor::new(doomed, 2))
            .unwrap();

        assert!(!doc.contains(doomed));
        let remapped = doc.remap(&Anchor::new(doomed, 2));
        assert_eq!(remapped.node, block);
        assert!(remapped.offset <= doc.children(block).len());
    }

    #[test]
    fn test_remap_of_unknown_node_falls_back_to_root() {
        let doc = Document::new();
        assert_eq!(
            doc.remap(&Anchor::new(NodeId(999), 4)),
            Anchor::new(doc.root(), 0)
        );
    }

    #[test]
    fn test_dangling_anchor_is_an_error() {
        let mut doc = Document::new();
        let result = doc.insert_text(&Anchor::new(NodeId(999), 0), "x");
        assert!(matches!(result, Err(ModelError::DanglingAnchor(_))));
    }

    #[test]
    fn test_clear_formatting_keeps_links() {
        let (mut doc, run) = doc_with_text("abc");
        let all = (Anchor::new(run, 0), Anchor::new(run, 3));
        doc.apply_formatting(&all.0, &all.1, &InlineAttr::Bold(true))
            .unwrap();
        doc.apply_formatting(&all.0, &all.1, &InlineAttr::Link(Some("https://a.b".into())))
            .unwrap();
        doc.set_alignment(&all.0, &all.1, Alignment::Center).unwrap();

        doc.clear_formatting();

        let format = &doc.runs()[0].format;
        assert!(!format.bold);
        assert_eq!(format.link.as_deref(), Some("https://a.b"));
        assert_eq!(doc.block(doc.blocks()[0]).unwrap().align, Alignment::Left);
    }

    #[test]
    fn test_anchor_at_char() {
        let (doc, run) = doc_with_text("hello");
        assert_eq!(doc.anchor_at_char(3), Some(Anchor::new(run, 3)));
        assert_eq!(doc.anchor_at_char(50), Some(Anchor::new(run, 5)));
    }

    #[test]
    fn test_split_chars_handles_multibyte() {
        assert_eq!(
            split_chars("aé🦀b", 1, 3),
            ("a".to_string(), "é🦀".to_string(), "b".to_string())
        );
    }
}
