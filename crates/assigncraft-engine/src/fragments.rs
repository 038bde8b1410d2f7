//! Fragment insertion at the tracked selection.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

use crate::commands::{Outcome, SkipReason};
use crate::error::ModelError;
use crate::export::wrapper::fragment_html;
use crate::host::EditingHost;
use crate::markup::parse_markup;
use crate::model::{Document, Fragment};
use crate::selection::SelectionTracker;

/// Table dimension used when the caller's answer is missing or unusable
pub const DEFAULT_TABLE_DIMENSION: usize = 2;

/// Table dimensions, always at least one row and one column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableSpec {
    rows: usize,
    cols: usize,
}

impl TableSpec {
    /// Non-positive dimensions fall back to the default
    pub fn new(rows: i64, cols: i64) -> Self {
        Self {
            rows: coerce_dimension(Some(rows)),
            cols: coerce_dimension(Some(cols)),
        }
    }

    /// Build from free-text prompt answers. Cancelled, blank or non-numeric
    /// answers fall back to the default.
    pub fn from_prompt(rows: Option<&str>, cols: Option<&str>) -> Self {
        Self {
            rows: coerce_dimension(rows.and_then(parse_leading_int)),
            cols: coerce_dimension(cols.and_then(parse_leading_int)),
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }
}

fn coerce_dimension(value: Option<i64>) -> usize {
    match value {
        Some(n) if n >= 1 => usize::try_from(n).unwrap_or(DEFAULT_TABLE_DIMENSION),
        _ => DEFAULT_TABLE_DIMENSION,
    }
}

/// Leading integer of a prompt answer, so `"3 rows"` reads as 3
fn parse_leading_int(answer: &str) -> Option<i64> {
    let answer = answer.trim();
    let end = answer
        .char_indices()
        .find(|(i, c)| !(c.is_ascii_digit() || (*i == 0 && (*c == '-' || *c == '+'))))
        .map(|(i, _)| i)
        .unwrap_or(answer.len());
    answer[..end].parse().ok()
}

/// Fragments the inserter accepts
#[derive(Debug, Clone, PartialEq)]
pub enum InsertRequest {
    PageBreak,
    Table(TableSpec),
    Image {
        source: String,
        bounds: Option<(u32, u32)>,
    },
    /// CommonMark with tables
    Markup(String),
}

impl InsertRequest {
    /// Image request for picked file bytes. An empty pick is no image.
    pub fn image_from_bytes(mime: &str, bytes: &[u8]) -> Option<Self> {
        if bytes.is_empty() {
            return None;
        }
        Some(InsertRequest::Image {
            source: image_data_uri(mime, bytes),
            bounds: None,
        })
    }

    fn into_fragment(self) -> Fragment {
        match self {
            InsertRequest::PageBreak => Fragment::page_break(),
            InsertRequest::Table(spec) => Fragment::table(spec.rows(), spec.cols()),
            InsertRequest::Image { source, bounds } => Fragment::image(source, bounds),
            InsertRequest::Markup(markup) => parse_markup(&markup),
        }
    }
}

/// Encode raw image bytes as a `data:` URI
pub fn image_data_uri(mime: &str, bytes: &[u8]) -> String {
    format!("data:{mime};base64,{}", STANDARD.encode(bytes))
}

/// Insert `request` at the end of the tracked selection and place the caret
/// after the inserted content.
///
/// The host is offered the fragment as markup through `insertHTML`; when it
/// cannot take it, its view is rebuilt from the model.
pub fn insert(
    doc: &mut Document,
    tracker: &mut SelectionTracker,
    host: &mut dyn EditingHost,
    request: InsertRequest,
) -> Result<Outcome, ModelError> {
    tracker.revalidate(doc);
    let Some(selection) = tracker.current() else {
        log::debug!("Skipping insertion: nothing is selected");
        return Ok(Outcome::Skipped(SkipReason::NoSelection));
    };
    let fragment = request.into_fragment();
    if fragment.is_empty() {
        return Ok(Outcome::Skipped(SkipReason::InvalidInput(
            "nothing to insert".to_string(),
        )));
    }

    let html = fragment_html(&fragment);
    let host_applied = match host.apply_primitive("insertHTML", Some(&html)) {
        Ok(()) => true,
        Err(e) => {
            log::debug!("{e}; inserting through the content model");
            false
        }
    };

    let last = doc.insert_fragment(&selection.end, fragment)?;
    match last {
        Some(node) => tracker.collapse_after(doc, node)?,
        None => tracker.revalidate(doc),
    }

    if !host_applied {
        host.render(doc);
    }
    host.set_selection(tracker.current().as_ref());

    Ok(if host_applied {
        Outcome::Applied
    } else {
        Outcome::AppliedWithFallback
    })
}
