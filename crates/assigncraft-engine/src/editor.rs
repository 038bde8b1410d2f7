//! One editing session: the document, its selection, the host view, the
//! snapshot store and the export pipelines, owned together.
//!
//! Every intent goes through [`Editor`] so the model is mutated in one place,
//! the selection is revalidated after each change and autosave sees every
//! mutation. Recoverable problems end up in [`Editor::status`] rather than
//! as errors.

use std::fmt;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};

use crate::commands::{self, Cmd, Outcome, SkipReason};
use crate::error::{ExportError, ModelError, StoreError};
use crate::export::wrapper::{DEFAULT_AUTHOR, DEFAULT_TITLE};
use crate::export::{
    DownloadSink, ExportBlob, ExportDescriptor, PaginatedExporter, content_html, render_preview,
    to_flow_document,
};
use crate::fragments::{self, InsertRequest};
use crate::host::EditingHost;
use crate::model::Document;
use crate::selection::{HostAnchors, Selection, SelectionTracker};
use crate::store::{DEFAULT_AUTOSAVE_INTERVAL, KeyValueStore, SnapshotStore};

/// Session settings, usually filled from the configuration file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditorSettings {
    pub autosave_interval: Duration,
    pub default_title: String,
    pub default_author: String,
}

impl Default for EditorSettings {
    fn default() -> Self {
        Self {
            autosave_interval: DEFAULT_AUTOSAVE_INTERVAL,
            default_title: DEFAULT_TITLE.to_string(),
            default_author: DEFAULT_AUTHOR.to_string(),
        }
    }
}

/// Caller-visible status line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    Ready,
    Autosaved(DateTime<Local>),
    Skipped(String),
    /// Something failed but the editor carried on
    Notice(String),
    Done(String),
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Ready => write!(f, "Ready"),
            Status::Autosaved(at) => write!(f, "Autosaved {}", at.format("%H:%M:%S")),
            Status::Skipped(reason) => write!(f, "Skipped: {reason}"),
            Status::Notice(message) | Status::Done(message) => write!(f, "{message}"),
        }
    }
}

pub struct Editor<H, S> {
    doc: Document,
    /// Snapshot of the document as the session started, for `reset`
    initial: String,
    tracker: SelectionTracker,
    host: H,
    snapshots: SnapshotStore<S>,
    exporter: PaginatedExporter,
    settings: EditorSettings,
    status: Status,
}

impl<H: EditingHost, S: KeyValueStore> Editor<H, S> {
    /// Start a session from the stored snapshot, or from an empty document
    /// when there is none. A snapshot that cannot be read is discarded.
    pub fn open(host: H, store: S, settings: EditorSettings) -> Self {
        let mut snapshots = SnapshotStore::with_interval(store, settings.autosave_interval);
        let mut status = Status::Ready;

        let doc = match snapshots.load() {
            Ok(Some(blob)) => Document::from_snapshot(&blob).unwrap_or_else(|e| {
                log::warn!("Discarding stored snapshot: {e}");
                status = Status::Notice("Saved draft could not be restored".to_string());
                Document::new()
            }),
            Ok(None) => Document::new(),
            Err(e) => {
                log::warn!("Failed to read stored snapshot: {e}");
                status = Status::Notice(format!("Saved draft could not be read: {e}"));
                Document::new()
            }
        };
        snapshots.mark_clean(&doc);

        let mut editor = Self {
            initial: doc.serialize(),
            doc,
            tracker: SelectionTracker::new(),
            host,
            snapshots,
            exporter: PaginatedExporter::default(),
            settings,
            status,
        };
        editor.host.render(&editor.doc);
        editor
    }

    /// Use a different paginated export pipeline
    pub fn with_exporter(mut self, exporter: PaginatedExporter) -> Self {
        self.exporter = exporter;
        self
    }

    pub fn document(&self) -> &Document {
        &self.doc
    }

    pub fn selection(&self) -> Option<Selection> {
        self.tracker.current()
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn snapshots(&self) -> &SnapshotStore<S> {
        &self.snapshots
    }

    pub fn exporter(&self) -> &PaginatedExporter {
        &self.exporter
    }

    pub fn status(&self) -> &Status {
        &self.status
    }

    // ============ Selection ============

    pub fn host_selection_changed(&mut self, anchors: Option<HostAnchors>) {
        self.tracker.on_host_selection_changed(&self.doc, anchors);
    }

    /// Select by character index into the document text. Out of range
    /// indexes clamp to the end.
    pub fn select_chars(&mut self, start: usize, end: usize) {
        match (self.doc.anchor_at_char(start), self.doc.anchor_at_char(end)) {
            (Some(start), Some(end)) => self.tracker.set(&self.doc, Selection::new(start, end)),
            _ => self.tracker.clear(),
        }
        self.host.set_selection(self.tracker.current().as_ref());
    }

    pub fn blur(&mut self) {
        self.tracker.clear();
        self.host.set_selection(None);
    }

    // ============ Intents ============

    /// Run a command by host name. Unknown commands and unusable arguments
    /// are reported as skipped.
    pub fn execute(&mut self, name: &str, argument: Option<&str>) -> Result<Outcome, ModelError> {
        match Cmd::parse(name, argument) {
            Ok(cmd) => self.run(&cmd),
            Err(e) => {
                log::debug!("Skipping {name}: {e}");
                let reason = SkipReason::InvalidInput(e.to_string());
                self.status = Status::Skipped(reason.to_string());
                Ok(Outcome::Skipped(reason))
            }
        }
    }

    pub fn run(&mut self, cmd: &Cmd) -> Result<Outcome, ModelError> {
        let outcome = commands::execute(&mut self.doc, &mut self.tracker, &mut self.host, cmd)?;
        self.record(&outcome);
        Ok(outcome)
    }

    pub fn insert(&mut self, request: InsertRequest) -> Result<Outcome, ModelError> {
        let outcome =
            fragments::insert(&mut self.doc, &mut self.tracker, &mut self.host, request)?;
        self.record(&outcome);
        Ok(outcome)
    }

    /// Type at the caret. A range selection collapses to its end first.
    pub fn type_text(&mut self, text: &str) -> Result<Outcome, ModelError> {
        self.tracker.revalidate(&self.doc);
        let Some(selection) = self.tracker.current() else {
            let outcome = Outcome::Skipped(SkipReason::NoSelection);
            self.record(&outcome);
            return Ok(outcome);
        };

        let at = if selection.is_collapsed() {
            selection.end
        } else {
            self.doc.delete_range(&selection.start, &selection.end)?
        };
        let caret = self.doc.insert_text(&at, text)?;
        self.tracker.collapse_to(&self.doc, caret);
        self.host.render(&self.doc);
        self.host.set_selection(self.tracker.current().as_ref());

        let outcome = Outcome::Applied;
        self.record(&outcome);
        Ok(outcome)
    }

    /// Strip inline styles and block alignment/indent across the document
    pub fn clear_formatting(&mut self) {
        self.doc.clear_formatting();
        self.resync();
        self.autosave();
    }

    /// Return to the document the session started with
    pub fn reset(&mut self) -> Result<(), ModelError> {
        self.doc.restore(&self.initial)?;
        self.resync();
        self.autosave();
        self.status = Status::Done("Document reset".to_string());
        Ok(())
    }

    fn resync(&mut self) {
        self.tracker.revalidate(&self.doc);
        self.host.render(&self.doc);
        self.host.set_selection(self.tracker.current().as_ref());
    }

    fn record(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::Skipped(reason) => self.status = Status::Skipped(reason.to_string()),
            Outcome::Applied | Outcome::AppliedWithFallback => self.autosave(),
        }
    }

    // ============ Autosave ============

    fn autosave(&mut self) {
        let saved = self.snapshots.on_mutation(&self.doc);
        self.record_save(saved);
    }

    /// Drive the interval autosave
    pub fn tick(&mut self, now: Instant) {
        let saved = self.snapshots.tick(&self.doc, now);
        self.record_save(saved);
    }

    fn record_save(&mut self, saved: Result<Option<DateTime<Local>>, StoreError>) {
        match saved {
            Ok(Some(at)) => self.status = Status::Autosaved(at),
            Ok(None) => {}
            Err(e) => {
                log::warn!("Autosave failed: {e}");
                self.status = Status::Notice(format!("Autosave failed: {e}"));
            }
        }
    }

    // ============ Copy and preview ============

    /// Payload for a plain-text clipboard write
    pub fn plain_text(&self) -> String {
        self.doc.plain_text()
    }

    /// Payload for a rich clipboard write
    pub fn content_html(&self) -> String {
        content_html(&self.doc)
    }

    pub fn preview_html(&self) -> String {
        render_preview(&self.doc)
    }

    // ============ Export ============

    /// Fill blank descriptor fields from the session defaults
    pub fn descriptor(&self, title: &str, author: &str) -> ExportDescriptor {
        ExportDescriptor::new(title, author)
            .or_defaults(&self.settings.default_title, &self.settings.default_author)
    }

    pub fn export_flow(
        &mut self,
        descriptor: &ExportDescriptor,
        filename: Option<&str>,
        sink: &mut dyn DownloadSink,
    ) -> Result<PathBuf, ExportError> {
        let delivered = to_flow_document(&self.doc, descriptor, filename)
            .and_then(|blob| sink.deliver(blob));
        self.record_export(delivered)
    }

    /// Paginated export of the document as it is now. The job does not
    /// borrow the session, so several can be in flight at once.
    pub fn paginated_job(
        &self,
        descriptor: &ExportDescriptor,
        filename: Option<&str>,
    ) -> impl Future<Output = Result<ExportBlob, ExportError>> + use<H, S> {
        let exporter = self.exporter.clone();
        let doc = self.doc.clone();
        let descriptor = descriptor.clone();
        let filename = filename.map(str::to_string);
        async move { exporter.export(&doc, &descriptor, filename.as_deref()).await }
    }

    /// Paginated export. The returned future completes once every image has
    /// settled and the rasterizer has run.
    pub async fn export_paginated(
        &mut self,
        descriptor: &ExportDescriptor,
        filename: Option<&str>,
        sink: &mut dyn DownloadSink,
    ) -> Result<PathBuf, ExportError> {
        let delivered = self
            .paginated_job(descriptor, filename)
            .await
            .and_then(|blob| sink.deliver(blob));
        self.record_export(delivered)
    }

    fn record_export(
        &mut self,
        delivered: Result<PathBuf, ExportError>,
    ) -> Result<PathBuf, ExportError> {
        match &delivered {
            Ok(path) => self.status = Status::Done(format!("Exported {}", path.display())),
            Err(e) => {
                log::warn!("Export failed: {e}");
                self.status = Status::Notice(format!("Export failed: {e}"));
            }
        }
        delivered
    }
}
