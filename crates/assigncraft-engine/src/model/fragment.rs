use crate::model::{
    Alignment, BlockKind, DEFAULT_FIGURE_HEIGHT, DEFAULT_FIGURE_WIDTH, Document, Embed, InlineRun,
    Node, NodeId,
};

/// A detached subtree waiting to be spliced into a document
#[derive(Debug, Clone, PartialEq)]
pub enum FragmentNode {
    Block {
        kind: BlockKind,
        align: Alignment,
        indent: u8,
        children: Vec<FragmentNode>,
    },
    Run(InlineRun),
    Embed(Embed),
}

impl FragmentNode {
    pub fn block(kind: BlockKind, children: Vec<FragmentNode>) -> Self {
        FragmentNode::Block {
            kind,
            align: Alignment::Left,
            indent: 0,
            children,
        }
    }

    pub fn is_block(&self) -> bool {
        matches!(self, FragmentNode::Block { .. })
    }
}

/// Ordered sequence of sibling nodes to insert at one position
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fragment {
    pub nodes: Vec<FragmentNode>,
}

impl Fragment {
    pub fn new(nodes: Vec<FragmentNode>) -> Self {
        Self { nodes }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// True when the fragment only contains runs and embeds
    pub fn is_inline(&self) -> bool {
        self.nodes.iter().all(|node| !node.is_block())
    }

    pub fn page_break() -> Self {
        Self::new(vec![FragmentNode::block(BlockKind::PageBreak, Vec::new())])
    }

    /// Table of `rows` x `cols` cells, each holding one empty run. A table
    /// always has at least one row and one column.
    pub fn table(rows: usize, cols: usize) -> Self {
        let cols = cols.max(1);
        let rows = (0..rows.max(1))
            .map(|_| {
                let cells = (0..cols)
                    .map(|_| {
                        FragmentNode::block(
                            BlockKind::TableCell,
                            vec![FragmentNode::Run(InlineRun::default())],
                        )
                    })
                    .collect();
                FragmentNode::block(BlockKind::TableRow, cells)
            })
            .collect();
        Self::new(vec![FragmentNode::block(BlockKind::Table, rows)])
    }

    /// Image wrapped in a resizable container of the given footprint
    pub fn image(source: impl Into<String>, bounds: Option<(u32, u32)>) -> Self {
        let (width, height) = bounds.unwrap_or((DEFAULT_FIGURE_WIDTH, DEFAULT_FIGURE_HEIGHT));
        let embed = Embed {
            source: source.into(),
            width,
            height,
        };
        Self::new(vec![FragmentNode::block(
            BlockKind::Figure { width, height },
            vec![FragmentNode::Embed(embed)],
        )])
    }

    /// A single run of text
    pub fn text(run: InlineRun) -> Self {
        Self::new(vec![FragmentNode::Run(run)])
    }
}

impl Document {
    /// Detached copy of the body's content, in reading order
    pub fn to_fragment(&self) -> Fragment {
        Fragment::new(
            self.children(self.root())
                .iter()
                .filter_map(|id| self.detach_copy(*id))
                .collect(),
        )
    }

    fn detach_copy(&self, id: NodeId) -> Option<FragmentNode> {
        Some(match self.get(id)? {
            Node::Block(block) => FragmentNode::Block {
                kind: block.kind,
                align: block.align,
                indent: block.indent,
                children: block
                    .children()
                    .iter()
                    .filter_map(|child| self.detach_copy(*child))
                    .collect(),
            },
            Node::Run(run) => FragmentNode::Run(run.clone()),
            Node::Embed(embed) => FragmentNode::Embed(embed.clone()),
        })
    }
}
