use serde::{Deserialize, Serialize};

/// Identifier of a node inside one [`Document`](crate::model::Document).
///
/// Ids are never reused within a document, so an id that no longer resolves
/// always means the node was removed.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u64);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Default footprint of an image container, in logical pixels
pub const DEFAULT_FIGURE_WIDTH: u32 = 300;
pub const DEFAULT_FIGURE_HEIGHT: u32 = 200;

/// Block classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BlockKind {
    /// The single root container
    Body,
    Paragraph,
    /// Heading, level 1 to 3
    Heading { level: u8 },
    /// List item; consecutive items of the same kind form one list
    ListItem { ordered: bool },
    Table,
    TableRow,
    TableCell,
    PageBreak,
    /// Fixed-size resizable container around an image
    Figure { width: u32, height: u32 },
}

impl BlockKind {
    /// Blocks whose children are inline runs and embeds
    pub fn holds_inline(&self) -> bool {
        matches!(
            self,
            BlockKind::Paragraph
                | BlockKind::Heading { .. }
                | BlockKind::ListItem { .. }
                | BlockKind::TableCell
                | BlockKind::Figure { .. }
        )
    }

    /// Blocks that block-type, list and indent commands act on
    pub fn is_text_block(&self) -> bool {
        matches!(
            self,
            BlockKind::Paragraph | BlockKind::Heading { .. } | BlockKind::ListItem { .. }
        )
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Alignment {
    #[default]
    Left,
    Center,
    Right,
    Justify,
}

impl Alignment {
    pub fn css(&self) -> &'static str {
        match self {
            Alignment::Left => "left",
            Alignment::Center => "center",
            Alignment::Right => "right",
            Alignment::Justify => "justify",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub kind: BlockKind,
    pub align: Alignment,
    /// Nesting level, never negative
    pub indent: u8,
    pub(crate) children: Vec<NodeId>,
}

impl Block {
    pub(crate) fn new(kind: BlockKind) -> Self {
        Self {
            kind,
            align: Alignment::Left,
            indent: 0,
            children: Vec::new(),
        }
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }
}

/// Inline formatting attributes carried by a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunFormat {
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub bold: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub italic: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub underline: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_family: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_size_px: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub highlight: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

impl RunFormat {
    pub fn is_plain(&self) -> bool {
        *self == RunFormat::default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineRun {
    pub text: String,
    #[serde(default, skip_serializing_if = "RunFormat::is_plain")]
    pub format: RunFormat,
}

impl InlineRun {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            format: RunFormat::default(),
        }
    }

    pub fn with_format(text: impl Into<String>, format: RunFormat) -> Self {
        Self {
            text: text.into(),
            format,
        }
    }

    /// Length in characters, the unit of run offsets
    pub fn len(&self) -> usize {
        self.text.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Embedded image. `source` is a data URI or an external URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Embed {
    pub source: String,
    pub width: u32,
    pub height: u32,
}

/// One node of the content tree. Runs and embeds are always leaves.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Block(Block),
    Run(InlineRun),
    Embed(Embed),
}

impl Node {
    pub fn as_block(&self) -> Option<&Block> {
        match self {
            Node::Block(block) => Some(block),
            _ => None,
        }
    }

    pub fn as_run(&self) -> Option<&InlineRun> {
        match self {
            Node::Run(run) => Some(run),
            _ => None,
        }
    }

    pub fn is_leaf(&self) -> bool {
        !matches!(self, Node::Block(_))
    }

    /// Offset extent of a leaf: characters for runs, one slot for an embed
    pub(crate) fn leaf_len(&self) -> usize {
        match self {
            Node::Run(run) => run.len(),
            Node::Embed(_) => 1,
            Node::Block(block) => block.children.len(),
        }
    }
}

/// A single inline attribute assignment, as produced by formatting commands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InlineAttr {
    Bold(bool),
    Italic(bool),
    Underline(bool),
    FontFamily(Option<String>),
    FontSize(Option<u16>),
    Color(Option<String>),
    Highlight(Option<String>),
    Link(Option<String>),
}

impl InlineAttr {
    pub fn apply(&self, format: &mut RunFormat) {
        match self {
            InlineAttr::Bold(on) => format.bold = *on,
            InlineAttr::Italic(on) => format.italic = *on,
            InlineAttr::Underline(on) => format.underline = *on,
            InlineAttr::FontFamily(family) => format.font_family = family.clone(),
            InlineAttr::FontSize(size) => format.font_size_px = *size,
            InlineAttr::Color(color) => format.color = color.clone(),
            InlineAttr::Highlight(color) => format.highlight = color.clone(),
            InlineAttr::Link(target) => format.link = target.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inline_attr_apply() {
        let mut format = RunFormat::default();
        InlineAttr::Bold(true).apply(&mut format);
        InlineAttr::Color(Some("#336699".to_string())).apply(&mut format);
        assert!(format.bold);
        assert_eq!(format.color.as_deref(), Some("#336699"));

        InlineAttr::Color(None).apply(&mut format);
        assert_eq!(format.color, None);
        assert!(format.bold);
    }

    #[test]
    fn test_text_blocks_hold_inline() {
        assert!(BlockKind::Paragraph.is_text_block());
        assert!(BlockKind::Paragraph.holds_inline());
        assert!(BlockKind::TableCell.holds_inline());
        assert!(!BlockKind::TableCell.is_text_block());
        assert!(!BlockKind::Table.holds_inline());
        assert!(!BlockKind::PageBreak.holds_inline());
    }

    #[test]
    fn test_run_len_counts_chars() {
        let run = InlineRun::new("héllo 🦀");
        assert_eq!(run.len(), 7);
    }
}
