//! The host editing surface the executor and inserter talk to.
//!
//! A host renders the document and offers primitive formatting operations
//! keyed by name. It is never the source of truth: every command mutates the
//! [`Document`] too, and a host lacking a primitive is resynced by
//! re-rendering the model.

use std::collections::HashSet;

use crate::error::HostError;
use crate::model::Document;
use crate::selection::Selection;

pub trait EditingHost {
    /// Run a named primitive (`bold`, `foreColor`, `insertHTML`, ...) on the
    /// host's current selection
    fn apply_primitive(&mut self, name: &str, value: Option<&str>) -> Result<(), HostError>;

    /// Replace the rendered view with the model's content
    fn render(&mut self, doc: &Document);

    /// Move the host's visible selection
    fn set_selection(&mut self, selection: Option<&Selection>);
}

/// A primitive call the host accepted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedPrimitive {
    pub name: String,
    pub value: Option<String>,
}

/// Host without a visible surface. It accepts a configurable set of
/// primitives and records what it was asked to do.
#[derive(Debug, Clone, Default)]
pub struct HeadlessHost {
    supported: Option<HashSet<String>>,
    pub applied: Vec<AppliedPrimitive>,
    pub renders: usize,
    pub rendered_text: String,
    pub selection: Option<Selection>,
}

impl HeadlessHost {
    /// A host that supports every primitive
    pub fn new() -> Self {
        Self::default()
    }

    /// A host that only supports the named primitives
    pub fn supporting<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            supported: Some(names.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    /// A host that supports no primitive at all
    pub fn bare() -> Self {
        Self::supporting(Vec::<String>::new())
    }

    pub fn supports(&self, name: &str) -> bool {
        self.supported
            .as_ref()
            .is_none_or(|names| names.contains(name))
    }
}

impl EditingHost for HeadlessHost {
    fn apply_primitive(&mut self, name: &str, value: Option<&str>) -> Result<(), HostError> {
        if !self.supports(name) {
            return Err(HostError::UnsupportedPrimitive(name.to_string()));
        }
        self.applied.push(AppliedPrimitive {
            name: name.to_string(),
            value: value.map(str::to_string),
        });
        Ok(())
    }

    fn render(&mut self, doc: &Document) {
        self.renders += 1;
        self.rendered_text = doc.plain_text();
    }

    fn set_selection(&mut self, selection: Option<&Selection>) {
        self.selection = selection.copied();
    }
}
