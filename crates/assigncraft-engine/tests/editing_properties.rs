use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use assigncraft_engine::export::{
    ImageLoader, ImageOutcome, MemorySink, PaginationOptions, Rasterizer, RenderSurface,
    SettlementHandle, render_wrapper,
};
use assigncraft_engine::model::{Anchor, Document, InlineAttr, RunFormat};
use assigncraft_engine::{
    Editor, EditorSettings, ExportDescriptor, ExportError, HeadlessHost, InsertRequest,
    MemoryStore, Outcome, PaginatedExporter, TableSpec,
};
use image::DynamicImage;
use pretty_assertions::assert_eq;
use rstest::rstest;

type TestEditor = Editor<HeadlessHost, MemoryStore>;

fn editor() -> TestEditor {
    Editor::open(
        HeadlessHost::new(),
        MemoryStore::new(),
        EditorSettings::default(),
    )
}

/// Every character of the document with the format it is rendered with
fn formatted_chars(doc: &Document) -> Vec<(char, RunFormat)> {
    doc.runs()
        .into_iter()
        .flat_map(|run| run.text.chars().map(|c| (c, run.format.clone())))
        .collect()
}

fn typed(text: &str) -> Document {
    let mut doc = Document::new();
    let run = doc.leaves()[0];
    doc.insert_text(&Anchor::new(run, 0), text).unwrap();
    doc
}

fn assert_selection_attached(editor: &TestEditor) {
    if let Some(selection) = editor.selection() {
        assert!(editor.document().contains(selection.start.node));
        assert!(editor.document().contains(selection.end.node));
    }
}

#[test]
fn bold_then_type_produces_bold_run() {
    let mut editor = editor();
    editor.select_chars(0, 0);

    editor.execute("bold", None).unwrap();
    editor.type_text("hi").unwrap();

    let restored = Document::from_snapshot(&editor.document().serialize()).unwrap();
    let runs = restored.runs();
    let hi = runs.iter().find(|run| run.text == "hi").unwrap();
    assert!(hi.format.bold);
}

#[rstest]
#[case(0, 10)]
#[case(0, 1)]
#[case(3, 7)]
#[case(4, 6)]
#[case(9, 10)]
fn formatting_covers_exactly_the_range(#[case] start: usize, #[case] end: usize) {
    let mut doc = typed("abcdefghij");
    let (a, b) = (doc.anchor_at_char(2).unwrap(), doc.anchor_at_char(5).unwrap());
    doc.apply_formatting(&a, &b, &InlineAttr::Italic(true))
        .unwrap();
    let before = formatted_chars(&doc);

    let (a, b) = (
        doc.anchor_at_char(start).unwrap(),
        doc.anchor_at_char(end).unwrap(),
    );
    doc.apply_formatting(&a, &b, &InlineAttr::Color(Some("#336699".to_string())))
        .unwrap();

    let after = formatted_chars(&doc);
    assert_eq!(after.len(), before.len());
    for (index, ((c, format), (old_c, old_format))) in after.iter().zip(&before).enumerate() {
        assert_eq!(c, old_c);
        if (start..end).contains(&index) {
            assert_eq!(format.color.as_deref(), Some("#336699"), "char {index}");
            assert_eq!(format.italic, old_format.italic, "char {index}");
        } else {
            assert_eq!(format, old_format, "char {index}");
        }
    }
}

#[test]
fn snapshot_round_trip_keeps_text_and_formats() {
    let mut editor = editor();
    editor.select_chars(0, 0);
    editor.type_text("Title line").unwrap();
    editor.select_chars(0, 5);
    editor.execute("formatBlock", Some("h2")).unwrap();
    editor.execute("underline", None).unwrap();
    editor.execute("fontSize", Some("18px")).unwrap();
    editor.select_chars(10, 10);
    editor
        .insert(InsertRequest::Markup(
            "Some *italic* and [a link](https://example.com).\n\n1. first\n2. second".to_string(),
        ))
        .unwrap();
    editor
        .insert(InsertRequest::Table(TableSpec::new(2, 2)))
        .unwrap();
    editor
        .insert(InsertRequest::Image {
            source: "data:image/png;base64,AAAA".to_string(),
            bounds: Some((120, 80)),
        })
        .unwrap();
    editor.insert(InsertRequest::PageBreak).unwrap();
    editor.type_text("after the break").unwrap();

    let doc = editor.document();
    let restored = Document::from_snapshot(&doc.serialize()).unwrap();

    assert_eq!(restored.plain_text(), doc.plain_text());
    assert_eq!(formatted_chars(&restored), formatted_chars(doc));
    assert_eq!(restored.serialize(), doc.serialize());
}

#[rstest]
#[case("h1")]
#[case("h3")]
#[case("p")]
fn block_type_is_idempotent(#[case] tag: &str) {
    let mut editor = editor();
    editor.select_chars(0, 0);
    editor.type_text("heading text").unwrap();
    editor.select_chars(2, 4);

    editor.execute("formatBlock", Some(tag)).unwrap();
    let once = editor.document().serialize();
    editor.execute("formatBlock", Some(tag)).unwrap();

    assert_eq!(editor.document().serialize(), once);
}

#[test]
fn selection_stays_attached_through_edits() {
    let mut editor = editor();
    editor.select_chars(0, 0);
    editor.type_text("one two three").unwrap();

    let steps: &[fn(&mut TestEditor)] = &[
        |e: &mut TestEditor| e.select_chars(4, 7),
        |e: &mut TestEditor| {
            e.execute("bold", None).unwrap();
        },
        |e: &mut TestEditor| {
            e.insert(InsertRequest::Table(TableSpec::from_prompt(Some("0"), Some("3"))))
                .unwrap();
        },
        |e: &mut TestEditor| {
            e.execute("insertUnorderedList", None).unwrap();
        },
        |e: &mut TestEditor| {
            e.execute("createLink", Some("example.com")).unwrap();
        },
        |e: &mut TestEditor| e.select_chars(0, 100),
        |e: &mut TestEditor| {
            e.execute("insertOrderedList", None).unwrap();
        },
        |e: &mut TestEditor| {
            e.execute("outdent", None).unwrap();
        },
        |e: &mut TestEditor| {
            e.insert(InsertRequest::PageBreak).unwrap();
        },
        |e: &mut TestEditor| e.reset().unwrap(),
        |e: &mut TestEditor| {
            e.execute("italic", None).unwrap();
        },
    ];

    for step in steps {
        step(&mut editor);
        assert_selection_attached(&editor);
    }
}

#[test]
fn zero_row_table_gets_default_rows() {
    let mut editor = editor();
    editor.select_chars(0, 0);

    let outcome = editor
        .insert(InsertRequest::Table(TableSpec::new(0, 3)))
        .unwrap();

    assert_eq!(outcome, Outcome::Applied);
    let html = editor.content_html();
    assert_eq!(html.matches("<tr>").count(), 2);
    assert_eq!(html.matches("<td>").count(), 6);
}

#[test]
fn wrapper_escapes_script_title() {
    let html = render_wrapper(
        &Document::new(),
        &ExportDescriptor::new("<script>", "Mallory"),
    );
    assert!(html.contains("&lt;script&gt;"));
    assert!(!html.contains("<script>"));
}

/// Settles each image from a spawned task after a short delay. Sources
/// starting with `broken` settle as errors.
#[derive(Default)]
struct DelayedLoader {
    settled: Arc<AtomicUsize>,
}

impl ImageLoader for DelayedLoader {
    fn begin(&self, source: &str, handle: SettlementHandle) {
        let settled = Arc::clone(&self.settled);
        let outcome = if source.starts_with("broken") {
            ImageOutcome::Failed("404".to_string())
        } else {
            ImageOutcome::Loaded(DynamicImage::new_rgb8(2, 2))
        };
        let delay = Duration::from_millis(5 * (handle.index() as u64 + 1));
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            settled.fetch_add(1, Ordering::SeqCst);
            handle.settle(outcome.clone());
            // A repeated signal must not count twice
            handle.settle(outcome);
        });
    }
}

/// Records how many images had settled each time it ran
struct ObservingRasterizer {
    settled: Arc<AtomicUsize>,
    calls: Mutex<Vec<(usize, Vec<bool>)>>,
}

impl Rasterizer for ObservingRasterizer {
    fn rasterize(
        &self,
        _surface: &RenderSurface,
        images: &[ImageOutcome],
        _options: &PaginationOptions,
    ) -> Result<Vec<u8>, ExportError> {
        let loaded = images.iter().map(|outcome| outcome.image().is_some()).collect();
        self.calls
            .lock()
            .unwrap()
            .push((self.settled.load(Ordering::SeqCst), loaded));
        Ok(b"%PDF-stub".to_vec())
    }
}

#[tokio::test]
async fn paginated_export_waits_for_every_image() {
    let loader = DelayedLoader::default();
    let rasterizer = Arc::new(ObservingRasterizer {
        settled: Arc::clone(&loader.settled),
        calls: Mutex::new(Vec::new()),
    });
    let exporter = PaginatedExporter::new(Arc::new(loader), rasterizer.clone());
    let mut editor = editor().with_exporter(exporter);
    editor.select_chars(0, 0);
    editor
        .insert(InsertRequest::Image {
            source: "broken.png".to_string(),
            bounds: None,
        })
        .unwrap();
    editor
        .insert(InsertRequest::Image {
            source: "data:image/png;base64,AAAA".to_string(),
            bounds: None,
        })
        .unwrap();

    let mut sink = MemorySink::default();
    let descriptor = editor.descriptor("Report", "Ada");
    editor
        .export_paginated(&descriptor, Some("report.pdf"), &mut sink)
        .await
        .unwrap();

    let calls = rasterizer.calls.lock().unwrap();
    assert_eq!(calls.as_slice(), &[(2, vec![false, true])]);
    assert_eq!(sink.delivered[0].filename.as_str(), "report.pdf");
    assert_eq!(editor.exporter().registry().active(), 0);
}
