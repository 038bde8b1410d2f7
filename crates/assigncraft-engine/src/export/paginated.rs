//! Paginated export.
//!
//! The wrapped document is laid out on an off-screen surface, every image on
//! it is loaded, and only once all of them have settled does the rasterizer
//! run. The surface is detached on every path out of [`PaginatedExporter::export`].

use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

use crate::error::ExportError;
use crate::export::pdf::PdfRasterizer;
use crate::export::settlement::{ImageOutcome, Settlement, SettlementHandle};
use crate::export::surface::{RenderSurface, SurfaceRegistry};
use crate::export::wrapper::ExportDescriptor;
use crate::export::{ExportBlob, checked_filename};
use crate::model::Document;

pub const PDF_MIME: &str = "application/pdf";
pub const DEFAULT_PDF_FILENAME: &str = "document.pdf";

const POINTS_PER_INCH: f32 = 72.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaperSize {
    A4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Portrait,
}

/// Fixed page geometry and image encoding of the paginated output
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PaginationOptions {
    pub margin_in: f32,
    pub paper: PaperSize,
    pub orientation: Orientation,
    /// JPEG quality in 0..=1
    pub jpeg_quality: f32,
    /// Device pixels per layout pixel when sampling images
    pub scale: u32,
}

impl Default for PaginationOptions {
    fn default() -> Self {
        Self {
            margin_in: 0.5,
            paper: PaperSize::A4,
            orientation: Orientation::Portrait,
            jpeg_quality: 0.98,
            scale: 2,
        }
    }
}

impl PaginationOptions {
    /// Page width and height in points
    pub fn page_size_pt(&self) -> (f32, f32) {
        let (width, height) = match self.paper {
            PaperSize::A4 => (595.0, 842.0),
        };
        match self.orientation {
            Orientation::Portrait => (width, height),
        }
    }

    pub fn margin_pt(&self) -> f32 {
        self.margin_in * POINTS_PER_INCH
    }

    /// Quality as the 1-100 value JPEG encoders take
    pub fn jpeg_quality_percent(&self) -> u8 {
        (self.jpeg_quality * 100.0).round().clamp(1.0, 100.0) as u8
    }
}

/// Starts loading an image and settles its handle exactly once
pub trait ImageLoader: Send + Sync {
    fn begin(&self, source: &str, handle: SettlementHandle);
}

/// Decodes `data:` URIs off the async executor. External URLs are not
/// fetched and settle as errors.
#[derive(Debug, Clone, Copy, Default)]
pub struct DataUriLoader;

impl ImageLoader for DataUriLoader {
    fn begin(&self, source: &str, handle: SettlementHandle) {
        let source = source.to_string();
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn_blocking(move || {
                    handle.settle(decode_data_uri(&source));
                });
            }
            Err(_) => {
                handle.settle(decode_data_uri(&source));
            }
        }
    }
}

/// Decode a base64 `data:` URI into an image
pub fn decode_data_uri(source: &str) -> ImageOutcome {
    let Some(rest) = source.strip_prefix("data:") else {
        return ImageOutcome::Failed(format!("external image not loaded: {source}"));
    };
    let Some((meta, payload)) = rest.split_once(',') else {
        return ImageOutcome::Failed("data URI without payload".to_string());
    };
    if !meta.ends_with(";base64") {
        return ImageOutcome::Failed("data URI is not base64 encoded".to_string());
    }
    let bytes = match STANDARD.decode(payload.trim()) {
        Ok(bytes) => bytes,
        Err(e) => return ImageOutcome::Failed(format!("invalid base64 payload: {e}")),
    };
    match image::load_from_memory(&bytes) {
        Ok(image) => ImageOutcome::Loaded(image),
        Err(e) => ImageOutcome::Failed(format!("undecodable image: {e}")),
    }
}

/// Paginates a settled surface into the output document
pub trait Rasterizer: Send + Sync {
    fn rasterize(
        &self,
        surface: &RenderSurface,
        images: &[ImageOutcome],
        options: &PaginationOptions,
    ) -> Result<Vec<u8>, ExportError>;
}

/// Drives one paginated export per call. Calls may overlap; each attaches
/// its own surface.
#[derive(Clone)]
pub struct PaginatedExporter {
    loader: Arc<dyn ImageLoader>,
    rasterizer: Arc<dyn Rasterizer>,
    registry: SurfaceRegistry,
    options: PaginationOptions,
}

impl Default for PaginatedExporter {
    fn default() -> Self {
        Self::new(Arc::new(DataUriLoader), Arc::new(PdfRasterizer))
    }
}

impl PaginatedExporter {
    pub fn new(loader: Arc<dyn ImageLoader>, rasterizer: Arc<dyn Rasterizer>) -> Self {
        Self {
            loader,
            rasterizer,
            registry: SurfaceRegistry::new(),
            options: PaginationOptions::default(),
        }
    }

    pub fn registry(&self) -> &SurfaceRegistry {
        &self.registry
    }

    pub fn options(&self) -> &PaginationOptions {
        &self.options
    }

    pub async fn export(
        &self,
        doc: &Document,
        descriptor: &ExportDescriptor,
        filename: Option<&str>,
    ) -> Result<ExportBlob, ExportError> {
        let filename = checked_filename(filename.unwrap_or(DEFAULT_PDF_FILENAME))?;
        let surface = RenderSurface::build(doc, descriptor);
        let _attached = self.registry.attach();

        let (settlement, handles) = Settlement::new(surface.images.len());
        for (request, handle) in surface.images.iter().zip(handles) {
            self.loader.begin(&request.source, handle);
        }
        let images = settlement.wait().await;
        log::debug!("{} image(s) settled, paginating", images.len());

        let bytes = self
            .rasterizer
            .rasterize(&surface, &images, &self.options)
            .map_err(|e| {
                log::warn!("Paginated export failed: {e}");
                match e {
                    ExportError::AsyncExportFailure(_) => e,
                    other => ExportError::AsyncExportFailure(other.to_string()),
                }
            })?;

        Ok(ExportBlob {
            filename,
            mime: PDF_MIME,
            bytes,
        })
    }
}
