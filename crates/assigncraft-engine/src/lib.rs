pub mod commands;
pub mod editor;
pub mod error;
pub mod export;
pub mod fragments;
pub mod host;
pub mod markup;
pub mod model;
pub mod selection;
pub mod store;

// Re-export key types for easier usage
pub use commands::{Cmd, Outcome, SkipReason, execute};
pub use editor::{Editor, EditorSettings, Status};
pub use error::*;
pub use export::{ExportBlob, ExportDescriptor, PaginatedExporter};
pub use fragments::{InsertRequest, TableSpec};
pub use host::{EditingHost, HeadlessHost};
pub use model::{Anchor, Document, Fragment};
pub use selection::{HostAnchors, Selection, SelectionTracker};
pub use store::{FileStore, KeyValueStore, MemoryStore, SNAPSHOT_KEY, SnapshotStore};
