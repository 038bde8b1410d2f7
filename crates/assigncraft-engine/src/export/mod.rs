//! # Export Pipeline
//!
//! Read-only consumers of the content model producing downloadable
//! artifacts:
//!
//! - **`wrapper`**: standalone HTML with title/author header, plus preview
//! - **`flow`**: synchronous flow document (`application/msword`)
//! - **`paginated`**: asynchronous paginated document (`application/pdf`),
//!   gated on image settlement
//! - **`settlement`**: counted barrier over per-image load events
//! - **`surface`**: off-screen render surfaces and their registry
//! - **`pdf`**: the built-in rasterizer writing PDF with lopdf
//! - **`sink`**: download sinks receiving finished artifacts

use relative_path::{Component, RelativePath, RelativePathBuf};

use crate::error::ExportError;

pub mod flow;
pub mod paginated;
pub mod pdf;
pub mod settlement;
pub mod sink;
pub mod surface;
pub mod wrapper;

pub use flow::{FLOW_MIME, default_flow_filename, to_flow_document};
pub use paginated::{
    DataUriLoader, ImageLoader, PDF_MIME, PaginatedExporter, PaginationOptions, Rasterizer,
};
pub use pdf::PdfRasterizer;
pub use settlement::{ImageOutcome, Settlement, SettlementHandle};
pub use sink::{DirectorySink, DownloadSink, MemorySink};
pub use surface::{LayoutItem, RenderSurface, SurfaceRegistry};
pub use wrapper::{ExportDescriptor, content_html, render_preview, render_wrapper};

/// A finished artifact ready for a download sink
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportBlob {
    pub filename: RelativePathBuf,
    pub mime: &'static str,
    pub bytes: Vec<u8>,
}

/// Validate a caller-supplied filename: one plain path component
pub(crate) fn checked_filename(name: &str) -> Result<RelativePathBuf, ExportError> {
    let path = RelativePath::new(name.trim());
    let mut components = path.components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(part)), None) if !part.contains('\\') => {
            Ok(RelativePathBuf::from(part))
        }
        _ => Err(ExportError::InvalidFilename(name.to_string())),
    }
}
