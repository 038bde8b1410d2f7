//! Off-screen render surfaces for the paginated pipeline.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use crate::export::wrapper::{ExportDescriptor, render_wrapper};
use crate::model::{BlockKind, Document, FragmentNode};

pub const BODY_SIZE_PT: u16 = 11;
pub const TITLE_SIZE_PT: u16 = 22;

/// Measured content of a surface, in reading order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayoutItem {
    Text {
        text: String,
        size_pt: u16,
        bold: bool,
        indent: u8,
    },
    TableRow {
        cells: Vec<String>,
    },
    /// Placeholder for `images[index]`
    Image {
        index: usize,
        width: u32,
        height: u32,
    },
    Rule,
    PageBreak,
}

/// An image the surface waits on before it can be measured
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRequest {
    pub source: String,
    pub width: u32,
    pub height: u32,
}

/// The wrapped document rendered away from the editing view
#[derive(Debug, Clone)]
pub struct RenderSurface {
    pub markup: String,
    pub layout: Vec<LayoutItem>,
    pub images: Vec<ImageRequest>,
}

impl RenderSurface {
    pub fn build(doc: &Document, descriptor: &ExportDescriptor) -> Self {
        let mut surface = Self {
            markup: render_wrapper(doc, descriptor),
            layout: vec![
                LayoutItem::Text {
                    text: descriptor.display_title().to_string(),
                    size_pt: TITLE_SIZE_PT,
                    bold: true,
                    indent: 0,
                },
                LayoutItem::Text {
                    text: format!("Author: {}", descriptor.display_author()),
                    size_pt: BODY_SIZE_PT,
                    bold: false,
                    indent: 0,
                },
                LayoutItem::Rule,
            ],
            images: Vec::new(),
        };
        let mut ordinal = 0;
        for node in doc.to_fragment().nodes {
            surface.lay_out(&node, &mut ordinal);
        }
        surface
    }

    fn lay_out(&mut self, node: &FragmentNode, ordinal: &mut usize) {
        let FragmentNode::Block {
            kind,
            indent,
            children,
            ..
        } = node
        else {
            return;
        };
        if !matches!(kind, BlockKind::ListItem { ordered: true }) {
            *ordinal = 0;
        }
        match kind {
            BlockKind::PageBreak => self.layout.push(LayoutItem::PageBreak),
            BlockKind::Table => {
                for row in children {
                    let FragmentNode::Block { children: cells, .. } = row else {
                        continue;
                    };
                    let cells = cells.iter().map(inline_text).collect();
                    self.layout.push(LayoutItem::TableRow { cells });
                    for cell in row_cells(row) {
                        self.push_images(cell);
                    }
                }
            }
            BlockKind::Figure { .. } => self.push_images(children),
            _ => {
                let (size_pt, bold) = match kind {
                    BlockKind::Heading { level: 1 } => (20, true),
                    BlockKind::Heading { level: 2 } => (16, true),
                    BlockKind::Heading { .. } => (13, true),
                    _ => (BODY_SIZE_PT, false),
                };
                let prefix = match kind {
                    BlockKind::ListItem { ordered: true } => {
                        *ordinal += 1;
                        format!("{ordinal}. ")
                    }
                    BlockKind::ListItem { ordered: false } => "\u{2022} ".to_string(),
                    _ => String::new(),
                };
                self.layout.push(LayoutItem::Text {
                    text: prefix + &inline_text(node),
                    size_pt,
                    bold,
                    indent: *indent,
                });
                self.push_images(children);
            }
        }
    }

    fn push_images(&mut self, children: &[FragmentNode]) {
        for child in children {
            if let FragmentNode::Embed(embed) = child {
                self.layout.push(LayoutItem::Image {
                    index: self.images.len(),
                    width: embed.width,
                    height: embed.height,
                });
                self.images.push(ImageRequest {
                    source: embed.source.clone(),
                    width: embed.width,
                    height: embed.height,
                });
            }
        }
    }
}

fn row_cells(row: &FragmentNode) -> impl Iterator<Item = &[FragmentNode]> {
    let cells = match row {
        FragmentNode::Block { children, .. } => children.as_slice(),
        _ => &[],
    };
    cells.iter().filter_map(|cell| match cell {
        FragmentNode::Block { children, .. } => Some(children.as_slice()),
        _ => None,
    })
}

fn inline_text(node: &FragmentNode) -> String {
    match node {
        FragmentNode::Block { children, .. } => children
            .iter()
            .filter_map(|child| match child {
                FragmentNode::Run(run) => Some(run.text.as_str()),
                _ => None,
            })
            .collect(),
        FragmentNode::Run(run) => run.text.clone(),
        FragmentNode::Embed(_) => String::new(),
    }
}

/// Identity of an attached surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceId(u64);

#[derive(Debug, Default)]
struct RegistryState {
    next_id: u64,
    attached: HashSet<SurfaceId>,
}

/// Tracks surfaces attached off-screen. Concurrent exports each attach
/// their own surface.
#[derive(Debug, Clone, Default)]
pub struct SurfaceRegistry {
    state: Arc<Mutex<RegistryState>>,
}

impl SurfaceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a surface; it stays attached until the guard is dropped
    pub fn attach(&self) -> SurfaceGuard {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let id = SurfaceId(state.next_id);
        state.next_id += 1;
        state.attached.insert(id);
        SurfaceGuard {
            id,
            registry: self.clone(),
        }
    }

    /// Number of surfaces currently attached
    pub fn active(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .attached
            .len()
    }

    fn detach(&self, id: SurfaceId) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .attached
            .remove(&id);
    }
}

/// Removes its surface from the registry when dropped
#[derive(Debug)]
pub struct SurfaceGuard {
    id: SurfaceId,
    registry: SurfaceRegistry,
}

impl SurfaceGuard {
    pub fn id(&self) -> SurfaceId {
        self.id
    }
}

impl Drop for SurfaceGuard {
    fn drop(&mut self) {
        self.registry.detach(self.id);
    }
}
