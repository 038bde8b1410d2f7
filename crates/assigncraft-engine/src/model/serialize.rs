//! Snapshot encoding of a [`Document`].
//!
//! The blob is JSON holding a format version and the nested node tree.
//! Node ids are not persisted; a restored tree gets fresh ids, so anchors
//! taken before a restore are always detected as dangling.

use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::model::{
    Alignment, Block, BlockKind, Document, Embed, InlineRun, Node, NodeId,
};

const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotDto {
    format: u32,
    body: Vec<NodeDto>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum NodeDto {
    Block {
        kind: BlockKind,
        #[serde(default)]
        align: Alignment,
        #[serde(default)]
        indent: u8,
        #[serde(default)]
        children: Vec<NodeDto>,
    },
    Run(InlineRun),
    Embed(Embed),
}

impl Document {
    /// Encode the full tree as an opaque string
    pub fn serialize(&self) -> String {
        let dto = SnapshotDto {
            format: FORMAT_VERSION,
            body: self
                .children(self.root())
                .iter()
                .filter_map(|id| self.to_dto(*id))
                .collect(),
        };
        // A tree of plain strings and integers always encodes
        serde_json::to_string(&dto).unwrap_or_default()
    }

    fn to_dto(&self, id: NodeId) -> Option<NodeDto> {
        Some(match self.get(id)? {
            Node::Block(block) => NodeDto::Block {
                kind: block.kind,
                align: block.align,
                indent: block.indent,
                children: block
                    .children
                    .iter()
                    .filter_map(|child| self.to_dto(*child))
                    .collect(),
            },
            Node::Run(run) => NodeDto::Run(run.clone()),
            Node::Embed(embed) => NodeDto::Embed(embed.clone()),
        })
    }

    /// Replace the whole tree with the one encoded in `blob`.
    ///
    /// Either the blob loads completely or the document is left untouched.
    pub fn restore(&mut self, blob: &str) -> Result<(), ModelError> {
        let restored = Self::decode(blob, self.next_id())?;
        let version = self.version() + 1;
        *self = restored;
        self.set_version(version);
        Ok(())
    }

    /// Build a fresh document from a snapshot blob
    pub fn from_snapshot(blob: &str) -> Result<Self, ModelError> {
        Self::decode(blob, 0)
    }

    fn decode(blob: &str, first_id: u64) -> Result<Self, ModelError> {
        let dto: SnapshotDto = serde_json::from_str(blob)
            .map_err(|e| ModelError::MalformedDocument(e.to_string()))?;
        if dto.format != FORMAT_VERSION {
            return Err(ModelError::MalformedDocument(format!(
                "unsupported snapshot format {}",
                dto.format
            )));
        }

        let mut doc = Document::with_first_id(first_id);
        let root = doc.root();
        for (index, node) in dto.body.into_iter().enumerate() {
            doc.attach(root, index, node, BlockKind::Body)?;
        }
        doc.ensure_body_not_empty();
        Ok(doc)
    }

    fn attach(
        &mut self,
        parent: NodeId,
        index: usize,
        dto: NodeDto,
        parent_kind: BlockKind,
    ) -> Result<(), ModelError> {
        match dto {
            NodeDto::Block {
                kind,
                align,
                indent,
                children,
            } => {
                check_nesting(parent_kind, kind)?;
                let mut block = Block::new(kind);
                block.align = align;
                block.indent = indent;
                let id = self.insert_child(parent, index, Node::Block(block));
                for (position, child) in children.into_iter().enumerate() {
                    self.attach(id, position, child, kind)?;
                }
            }
            NodeDto::Run(run) => {
                check_inline_parent(parent_kind)?;
                self.insert_child(parent, index, Node::Run(run));
            }
            NodeDto::Embed(embed) => {
                check_inline_parent(parent_kind)?;
                self.insert_child(parent, index, Node::Embed(embed));
            }
        }
        Ok(())
    }
}

fn check_nesting(parent: BlockKind, child: BlockKind) -> Result<(), ModelError> {
    let allowed = match child {
        BlockKind::Body => false,
        BlockKind::Heading { level } if !(1..=3).contains(&level) => false,
        BlockKind::TableRow => parent == BlockKind::Table,
        BlockKind::TableCell => parent == BlockKind::TableRow,
        _ => parent == BlockKind::Body,
    };
    if allowed {
        Ok(())
    } else {
        Err(ModelError::MalformedDocument(format!(
            "{child:?} cannot be placed inside {parent:?}"
        )))
    }
}

fn check_inline_parent(parent: BlockKind) -> Result<(), ModelError> {
    if parent.holds_inline() {
        Ok(())
    } else {
        Err(ModelError::MalformedDocument(format!(
            "inline content cannot be placed inside {parent:?}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Anchor, Fragment, InlineAttr, RunFormat};
    use pretty_assertions::assert_eq;

    fn sample() -> Document {
        let mut doc = Document::new();
        let run = doc.leaves()[0];
        let caret = doc.insert_text(&Anchor::new(run, 0), "Hello world").unwrap();
        doc.apply_formatting(
            &Anchor::new(run, 0),
            &Anchor::new(run, 5),
            &InlineAttr::Bold(true),
        )
        .unwrap();
        let caret = doc.remap(&caret);
        doc.insert_fragment(&caret, Fragment::table(2, 2)).unwrap();
        doc.insert_fragment(
            &Anchor::new(doc.root(), 2),
            Fragment::image("data:image/png;base64,AAAA", None),
        )
        .unwrap();
        doc
    }

    fn formats(doc: &Document) -> Vec<(String, RunFormat)> {
        doc.runs()
            .into_iter()
            .map(|run| (run.text.clone(), run.format.clone()))
            .collect()
    }

    #[test]
    fn test_round_trip_preserves_text_and_formats() {
        let doc = sample();
        let restored = Document::from_snapshot(&doc.serialize()).unwrap();

        assert_eq!(restored.plain_text(), doc.plain_text());
        assert_eq!(formats(&restored), formats(&doc));
        assert_eq!(restored.blocks().len(), doc.blocks().len());
    }

    #[test]
    fn test_restore_replaces_tree_and_invalidates_old_ids() {
        let source = sample();
        let mut doc = Document::new();
        let old_run = doc.leaves()[0];
        let version = doc.version();

        doc.restore(&source.serialize()).unwrap();

        assert!(!doc.contains(old_run));
        assert_eq!(doc.plain_text(), source.plain_text());
        assert!(doc.version() > version);
    }

    #[test]
    fn test_malformed_blob_leaves_document_intact() {
        let mut doc = sample();
        let before = doc.serialize();

        let result = doc.restore("{not json");
        assert!(matches!(result, Err(ModelError::MalformedDocument(_))));
        assert_eq!(doc.serialize(), before);
    }

    #[test]
    fn test_structurally_invalid_blob_is_rejected() {
        let mut doc = Document::new();
        let blob = r#"{"format":1,"body":[{"run":{"text":"loose"}}]}"#;
        assert!(matches!(
            doc.restore(blob),
            Err(ModelError::MalformedDocument(_))
        ));

        let blob = r#"{"format":1,"body":[{"block":{"kind":{"type":"heading","level":7}}}]}"#;
        assert!(matches!(
            doc.restore(blob),
            Err(ModelError::MalformedDocument(_))
        ));

        let blob = r#"{"format":1,"body":[{"block":{"kind":{"type":"table_cell"}}}]}"#;
        assert!(matches!(
            doc.restore(blob),
            Err(ModelError::MalformedDocument(_))
        ));
    }

    #[test]
    fn test_unknown_format_version_is_rejected() {
        let result = Document::from_snapshot(r#"{"format":99,"body":[]}"#);
        assert!(matches!(result, Err(ModelError::MalformedDocument(_))));
    }

    #[test]
    fn test_empty_body_restores_to_empty_paragraph() {
        let doc = Document::from_snapshot(r#"{"format":1,"body":[]}"#).unwrap();
        assert_eq!(doc.blocks().len(), 1);
        assert_eq!(doc.plain_text(), "");
    }
}
