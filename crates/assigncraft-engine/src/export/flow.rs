use std::sync::OnceLock;

use regex::Regex;

use crate::error::ExportError;
use crate::export::wrapper::{ExportDescriptor, render_wrapper};
use crate::export::{ExportBlob, checked_filename};
use crate::model::Document;

/// Legacy word-processor type; such readers open the wrapped HTML directly
pub const FLOW_MIME: &str = "application/msword";

const FALLBACK_FLOW_FILENAME: &str = "document.doc";

/// `<title>.doc` with whitespace runs turned into underscores, or
/// `document.doc` for a blank title. Path separators never survive.
pub fn default_flow_filename(descriptor: &ExportDescriptor) -> String {
    static WHITESPACE: OnceLock<Regex> = OnceLock::new();
    let whitespace = WHITESPACE.get_or_init(|| Regex::new(r"\s+").expect("Invalid whitespace regex"));

    let title = descriptor.title.trim();
    if title.is_empty() {
        return FALLBACK_FLOW_FILENAME.to_string();
    }
    let stem = whitespace
        .replace_all(title, "_")
        .replace(['/', '\\'], "_");
    if stem.chars().all(|c| c == '.') {
        return FALLBACK_FLOW_FILENAME.to_string();
    }
    format!("{stem}.doc")
}

/// Serialize the wrapped document into a flow-document blob. Needs no
/// rendering, so it completes synchronously.
pub fn to_flow_document(
    doc: &Document,
    descriptor: &ExportDescriptor,
    filename: Option<&str>,
) -> Result<ExportBlob, ExportError> {
    let filename = match filename {
        Some(name) => checked_filename(name)?,
        None => checked_filename(&default_flow_filename(descriptor))?,
    };
    Ok(ExportBlob {
        filename,
        mime: FLOW_MIME,
        bytes: render_wrapper(doc, descriptor).into_bytes(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use insta::assert_yaml_snapshot;
    use rstest::rstest;
    use serde::Serialize;

    #[derive(Serialize)]
    struct BlobSummary {
        filename: String,
        mime: &'static str,
    }

    #[rstest]
    #[case("My  first essay", "My_first_essay.doc")]
    #[case("   ", "document.doc")]
    #[case("a/b", "a_b.doc")]
    #[case("..", "document.doc")]
    fn test_default_flow_filename(#[case] title: &str, #[case] expected: &str) {
        let descriptor = ExportDescriptor::new(title, "");
        assert_eq!(default_flow_filename(&descriptor), expected);
    }

    #[test]
    fn test_flow_blob_carries_wrapper() {
        let descriptor = ExportDescriptor::new("Essay Draft", "Ada");
        let blob = to_flow_document(&Document::new(), &descriptor, None).unwrap();

        assert_yaml_snapshot!(BlobSummary {
            filename: blob.filename.to_string(),
            mime: blob.mime,
        }, @r"
        filename: Essay_Draft.doc
        mime: application/msword
        ");
        let html = String::from_utf8(blob.bytes).unwrap();
        assert!(html.starts_with("<!doctype html>"));
        assert!(html.contains("<h1>Essay Draft</h1>"));
    }

    #[test]
    fn test_explicit_filename_is_validated() {
        let descriptor = ExportDescriptor::default();
        let result = to_flow_document(&Document::new(), &descriptor, Some("../x.doc"));
        assert!(matches!(result, Err(ExportError::InvalidFilename(_))));
    }
}
