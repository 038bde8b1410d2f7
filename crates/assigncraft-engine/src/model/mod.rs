//! # Content Model
//!
//! The editable document as an ownership-clear tree, independent of any
//! rendering surface:
//!
//! - **`node`**: node variants (`Block`, `InlineRun`, `Embed`) and formatting attributes
//! - **`document`**: the `Document` arena with formatting, block and insertion operations
//! - **`fragment`**: detached subtrees (tables, images, page breaks, parsed markup)
//! - **`serialize`**: snapshot encoding used by the snapshot store
//!
//! ```rust
//! use assigncraft_engine::model::{Anchor, Document, InlineAttr};
//!
//! let mut doc = Document::new();
//! let run = doc.leaves()[0];
//! doc.insert_text(&Anchor::new(run, 0), "hello world").unwrap();
//! doc.apply_formatting(&Anchor::new(run, 0), &Anchor::new(run, 5), &InlineAttr::Bold(true))
//!     .unwrap();
//!
//! let restored = Document::from_snapshot(&doc.serialize()).unwrap();
//! assert_eq!(restored.plain_text(), "hello world");
//! assert!(restored.runs()[0].format.bold);
//! ```

pub mod document;
pub mod fragment;
pub mod node;
pub mod serialize;

pub use document::{Anchor, Document};
pub use fragment::{Fragment, FragmentNode};
pub use node::{
    Alignment, Block, BlockKind, DEFAULT_FIGURE_HEIGHT, DEFAULT_FIGURE_WIDTH, Embed, InlineAttr,
    InlineRun, Node, NodeId, RunFormat,
};
