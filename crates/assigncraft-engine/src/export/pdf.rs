//! Built-in rasterizer: lays the surface out on fixed-size pages and writes
//! a PDF with lopdf.
//!
//! Text uses the standard Helvetica faces with an average glyph width, so
//! line breaks approximate the on-screen layout rather than match it.

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Object, ObjectId, Stream, dictionary};

use crate::error::ExportError;
use crate::export::paginated::{PaginationOptions, Rasterizer};
use crate::export::settlement::ImageOutcome;
use crate::export::surface::{ImageRequest, LayoutItem, RenderSurface};

/// Average Helvetica advance as a fraction of the font size
const AVERAGE_GLYPH_WIDTH: f32 = 0.5;
const LINE_HEIGHT: f32 = 1.4;
const INDENT_STEP_PT: f32 = 30.0;
/// Layout pixels are CSS pixels at 96 per inch
const POINTS_PER_PIXEL: f32 = 0.75;
const BLOCK_GAP_PT: f32 = 6.0;

#[derive(Debug, Clone, Copy, Default)]
pub struct PdfRasterizer;

impl Rasterizer for PdfRasterizer {
    fn rasterize(
        &self,
        surface: &RenderSurface,
        images: &[ImageOutcome],
        options: &PaginationOptions,
    ) -> Result<Vec<u8>, ExportError> {
        let mut pdf = lopdf::Document::with_version("1.5");
        let pages_id = pdf.new_object_id();
        let regular = pdf.add_object(font("Helvetica"));
        let bold = pdf.add_object(font("Helvetica-Bold"));

        let mut xobjects = Dictionary::new();
        let mut names = Vec::with_capacity(images.len());
        for (index, outcome) in images.iter().enumerate() {
            let name = match (outcome, surface.images.get(index)) {
                (ImageOutcome::Loaded(image), Some(request)) => {
                    let stream = jpeg_xobject(image, request, options)?;
                    let id = pdf.add_object(stream);
                    let name = format!("Im{index}");
                    xobjects.set(name.clone(), id);
                    Some(name)
                }
                _ => None,
            };
            names.push(name);
        }

        let resources_id = pdf.add_object(dictionary! {
            "Font" => dictionary! {
                "F1" => regular,
                "F2" => bold,
            },
            "XObject" => xobjects,
        });

        let mut pager = Pager::new(options);
        for item in &surface.layout {
            pager.place(item, &names);
        }

        let (width, height) = options.page_size_pt();
        let mut kids = Vec::new();
        for operations in pager.finish() {
            let content = Content { operations }
                .encode()
                .map_err(|e| ExportError::AsyncExportFailure(e.to_string()))?;
            let content_id = pdf.add_object(Stream::new(dictionary! {}, content));
            let page_id: ObjectId = pdf.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(Object::Reference(page_id));
        }

        let count = kids.len() as i64;
        pdf.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
                "Resources" => resources_id,
                "MediaBox" => vec![
                    Object::Integer(0),
                    Object::Integer(0),
                    number(width),
                    number(height),
                ],
            }),
        );
        let catalog_id = pdf.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        pdf.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        pdf.save_to(&mut bytes)
            .map_err(|e| ExportError::AsyncExportFailure(e.to_string()))?;
        Ok(bytes)
    }
}

fn font(base: &str) -> Dictionary {
    dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => base,
        "Encoding" => "WinAnsiEncoding",
    }
}

fn number(value: f32) -> Object {
    Object::Integer(value.round() as i64)
}

/// Re-encode an image as a JPEG XObject, downsampled to the footprint at
/// the render scale
fn jpeg_xobject(
    image: &image::DynamicImage,
    request: &ImageRequest,
    options: &PaginationOptions,
) -> Result<Stream, ExportError> {
    let max_width = request.width.saturating_mul(options.scale).max(1);
    let max_height = request.height.saturating_mul(options.scale).max(1);
    let rgb = if image.width() > max_width || image.height() > max_height {
        image
            .resize(max_width, max_height, FilterType::Triangle)
            .to_rgb8()
    } else {
        image.to_rgb8()
    };

    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, options.jpeg_quality_percent())
        .encode_image(&rgb)
        .map_err(|e| ExportError::Image(e.to_string()))?;

    Ok(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => i64::from(rgb.width()),
            "Height" => i64::from(rgb.height()),
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
            "Filter" => "DCTDecode",
        },
        jpeg,
    ))
}

/// Map text onto WinAnsi bytes; unmappable characters become `?`
fn win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c {
            '\u{2022}' => 0x95,
            '\u{2013}' => 0x96,
            '\u{2014}' => 0x97,
            ' '..='~' => c as u8,
            '\u{a0}'..='\u{ff}' => c as u8,
            _ => b'?',
        })
        .collect()
}

/// Break `text` into lines of at most `max_chars` characters at spaces
fn wrap(text: &str, max_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut line = String::new();
    for word in text.split(' ') {
        let needed = line.chars().count() + usize::from(!line.is_empty()) + word.chars().count();
        if !line.is_empty() && needed > max_chars {
            lines.push(std::mem::take(&mut line));
        }
        if !line.is_empty() {
            line.push(' ');
        }
        line.push_str(word);
        while line.chars().count() > max_chars {
            let head: String = line.chars().take(max_chars).collect();
            line = line.chars().skip(max_chars).collect();
            lines.push(head);
        }
    }
    lines.push(line);
    lines
}

/// Places layout items top-down, opening a new page when one is full
struct Pager {
    width: f32,
    height: f32,
    margin: f32,
    y: f32,
    pages: Vec<Vec<Operation>>,
}

impl Pager {
    fn new(options: &PaginationOptions) -> Self {
        let (width, height) = options.page_size_pt();
        let margin = options.margin_pt();
        Self {
            width,
            height,
            margin,
            y: height - margin,
            pages: vec![Vec::new()],
        }
    }

    fn content_width(&self) -> f32 {
        self.width - 2.0 * self.margin
    }

    fn page_is_empty(&self) -> bool {
        self.pages.last().is_none_or(Vec::is_empty)
    }

    fn new_page(&mut self) {
        self.pages.push(Vec::new());
        self.y = self.height - self.margin;
    }

    /// Make room for `needed` points, breaking the page if that helps
    fn reserve(&mut self, needed: f32) {
        if self.y - needed < self.margin && !self.page_is_empty() {
            self.new_page();
        }
    }

    fn emit(&mut self, operations: impl IntoIterator<Item = Operation>) {
        if let Some(page) = self.pages.last_mut() {
            page.extend(operations);
        }
    }

    fn place(&mut self, item: &LayoutItem, names: &[Option<String>]) {
        match item {
            LayoutItem::Text {
                text,
                size_pt,
                bold,
                indent,
            } => {
                let x = self.margin + f32::from(*indent) * INDENT_STEP_PT;
                self.text(text, f32::from(*size_pt), *bold, x);
            }
            LayoutItem::TableRow { cells } => {
                let size = f32::from(crate::export::surface::BODY_SIZE_PT);
                self.text(&cells.join("  |  "), size, false, self.margin);
            }
            LayoutItem::Image {
                index,
                width,
                height,
            } => self.image(names.get(*index).and_then(Option::as_deref), *width, *height),
            LayoutItem::Rule => {
                self.reserve(BLOCK_GAP_PT);
                let y = self.y - BLOCK_GAP_PT / 2.0;
                let (left, right) = (self.margin, self.width - self.margin);
                self.emit([
                    Operation::new("m", vec![number(left), number(y)]),
                    Operation::new("l", vec![number(right), number(y)]),
                    Operation::new("S", vec![]),
                ]);
                self.y -= BLOCK_GAP_PT;
            }
            LayoutItem::PageBreak => {
                if !self.page_is_empty() {
                    self.new_page();
                }
            }
        }
    }

    fn text(&mut self, text: &str, size: f32, bold: bool, x: f32) {
        let line_height = size * LINE_HEIGHT;
        let available = (self.width - self.margin - x).max(size);
        let max_chars = ((available / (size * AVERAGE_GLYPH_WIDTH)) as usize).max(1);
        let face = if bold { "F2" } else { "F1" };

        for line in wrap(text, max_chars) {
            self.reserve(line_height);
            self.y -= line_height;
            if line.is_empty() {
                continue;
            }
            let baseline = self.y + (line_height - size) / 2.0;
            self.emit([
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec![face.into(), number(size)]),
                Operation::new("Td", vec![number(x), number(baseline)]),
                Operation::new("Tj", vec![Object::string_literal(win_ansi(&line))]),
                Operation::new("ET", vec![]),
            ]);
        }
        self.y -= BLOCK_GAP_PT;
    }

    fn image(&mut self, name: Option<&str>, width_px: u32, height_px: u32) {
        let mut width = width_px as f32 * POINTS_PER_PIXEL;
        let mut height = height_px as f32 * POINTS_PER_PIXEL;
        let max_width = self.content_width();
        let max_height = self.height - 2.0 * self.margin;
        let shrink = (max_width / width).min(max_height / height).min(1.0);
        if shrink.is_finite() && shrink > 0.0 {
            width *= shrink;
            height *= shrink;
        }

        self.reserve(height);
        self.y -= height;
        let (x, y) = (self.margin, self.y);
        match name {
            Some(name) => self.emit([
                Operation::new("q", vec![]),
                Operation::new(
                    "cm",
                    vec![
                        number(width),
                        Object::Integer(0),
                        Object::Integer(0),
                        number(height),
                        number(x),
                        number(y),
                    ],
                ),
                Operation::new("Do", vec![Object::Name(name.as_bytes().to_vec())]),
                Operation::new("Q", vec![]),
            ]),
            // Broken images keep their footprint as an outline
            None => self.emit([
                Operation::new(
                    "re",
                    vec![number(x), number(y), number(width), number(height)],
                ),
                Operation::new("S", vec![]),
            ]),
        }
        self.y -= BLOCK_GAP_PT;
    }

    fn finish(self) -> Vec<Vec<Operation>> {
        self.pages
    }
}
