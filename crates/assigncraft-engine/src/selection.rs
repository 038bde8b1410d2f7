//! Tracks the current selection against the content model.
//!
//! The tracker never hands out an anchor that references a detached node:
//! every update goes through [`Document::remap`], which moves stale anchors
//! to the nearest surviving ancestor position.

use std::cmp::Ordering;

use crate::error::ModelError;
use crate::model::{Anchor, Document, Node, NodeId};

/// Ordered pair of anchors; `start` never follows `end` in document order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub start: Anchor,
    pub end: Anchor,
}

impl Selection {
    pub fn new(start: Anchor, end: Anchor) -> Self {
        Self { start, end }
    }

    pub fn caret(at: Anchor) -> Self {
        Self { start: at, end: at }
    }

    pub fn is_collapsed(&self) -> bool {
        self.start == self.end
    }
}

/// Anchors as reported by the host surface. They may be stale or reversed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostAnchors {
    pub anchor: Anchor,
    pub focus: Anchor,
}

#[derive(Debug, Default, Clone)]
pub struct SelectionTracker {
    current: Option<Selection>,
}

impl SelectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// The current selection, or `None` when nothing is focused
    pub fn current(&self) -> Option<Selection> {
        self.current
    }

    pub fn clear(&mut self) {
        self.current = None;
    }

    pub fn set(&mut self, doc: &Document, selection: Selection) {
        self.current = Some(normalize(doc, selection));
    }

    pub fn collapse_to(&mut self, doc: &Document, at: Anchor) {
        self.set(doc, Selection::caret(at));
    }

    /// Place a caret just after `node`, so typing continues after it
    pub fn collapse_after(&mut self, doc: &Document, node: NodeId) -> Result<(), ModelError> {
        let at = match doc.get(node) {
            None => return Err(ModelError::NotAttached(node)),
            Some(Node::Run(run)) => Anchor::new(node, run.len()),
            Some(_) if node == doc.root() => Anchor::new(node, doc.children(node).len()),
            Some(_) => {
                let parent = doc.parent(node).ok_or(ModelError::NotAttached(node))?;
                let index = doc
                    .children(parent)
                    .iter()
                    .position(|child| *child == node)
                    .ok_or(ModelError::NotAttached(node))?;
                Anchor::new(parent, index + 1)
            }
        };
        self.collapse_to(doc, at);
        Ok(())
    }

    /// Re-derive the selection from host-reported anchors. Stale anchors are
    /// the normal case after a mutation and are remapped, never rejected.
    pub fn on_host_selection_changed(&mut self, doc: &Document, host: Option<HostAnchors>) {
        self.current = host.map(|host| {
            if !doc.contains(host.anchor.node) || !doc.contains(host.focus.node) {
                log::debug!("Remapping stale host selection {host:?}");
            }
            normalize(doc, Selection::new(host.anchor, host.focus))
        });
    }

    /// Make the stored selection valid against the current tree
    pub fn revalidate(&mut self, doc: &Document) {
        if let Some(selection) = self.current {
            self.current = Some(normalize(doc, selection));
        }
    }
}

fn normalize(doc: &Document, selection: Selection) -> Selection {
    let start = doc.remap(&selection.start);
    let end = doc.remap(&selection.end);
    match doc.compare(&start, &end) {
        Ok(Ordering::Greater) => Selection::new(end, start),
        _ => Selection::new(start, end),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Fragment, InlineAttr};

    fn doc_with_text(text: &str) -> (Document, NodeId) {
        let mut doc = Document::new();
        let run = doc.leaves()[0];
        doc.insert_text(&Anchor::new(run, 0), text).unwrap();
        (doc, run)
    }

    #[test]
    fn test_starts_without_selection() {
        assert_eq!(SelectionTracker::new().current(), None);
    }

    #[test]
    fn test_reversed_host_anchors_are_ordered() {
        let (doc, run) = doc_with_text("abcdef");
        let mut tracker = SelectionTracker::new();
        tracker.on_host_selection_changed(
            &doc,
            Some(HostAnchors {
                anchor: Anchor::new(run, 4),
                focus: Anchor::new(run, 1),
            }),
        );
        let selection = tracker.current().unwrap();
        assert_eq!(selection.start, Anchor::new(run, 1));
        assert_eq!(selection.end, Anchor::new(run, 4));
    }

    #[test]
    fn test_host_blur_clears_selection() {
        let (doc, run) = doc_with_text("abc");
        let mut tracker = SelectionTracker::new();
        tracker.collapse_to(&doc, Anchor::new(run, 1));
        tracker.on_host_selection_changed(&doc, None);
        assert_eq!(tracker.current(), None);
    }

    #[test]
    fn test_stale_anchor_is_remapped_not_rejected() {
        let (mut doc, run) = doc_with_text("abc");
        let (_, end) = doc
            .apply_formatting(
                &Anchor::new(run, 1),
                &Anchor::new(run, 3),
                &InlineAttr::Bold(true),
            )
            .unwrap();
        let removed = end.node;
        doc.delete_range(&Anchor::new(run, 1), &end).unwrap();
        assert!(!doc.contains(removed));

        let mut tracker = SelectionTracker::new();
        tracker.on_host_selection_changed(
            &doc,
            Some(HostAnchors {
                anchor: Anchor::new(removed, 1),
                focus: Anchor::new(removed, 2),
            }),
        );
        let selection = tracker.current().unwrap();
        assert!(doc.contains(selection.start.node));
        assert!(doc.contains(selection.end.node));
    }

    #[test]
    fn test_revalidate_after_restore() {
        let (mut doc, run) = doc_with_text("abc");
        let mut tracker = SelectionTracker::new();
        tracker.collapse_to(&doc, Anchor::new(run, 2));

        let blob = doc.serialize();
        doc.restore(&blob).unwrap();
        tracker.revalidate(&doc);

        let selection = tracker.current().unwrap();
        assert!(doc.contains(selection.start.node));
    }

    #[test]
    fn test_collapse_after_block_and_run() {
        let (mut doc, run) = doc_with_text("abc");
        let table = doc
            .insert_fragment(&Anchor::new(run, 3), Fragment::table(1, 1))
            .unwrap()
            .unwrap();

        let mut tracker = SelectionTracker::new();
        tracker.collapse_after(&doc, table).unwrap();
        assert_eq!(
            tracker.current(),
            Some(Selection::caret(Anchor::new(doc.root(), 2)))
        );

        tracker.collapse_after(&doc, run).unwrap();
        assert_eq!(
            tracker.current(),
            Some(Selection::caret(Anchor::new(run, 3)))
        );
        assert!(tracker.collapse_after(&doc, NodeId(9999)).is_err());
    }
}
