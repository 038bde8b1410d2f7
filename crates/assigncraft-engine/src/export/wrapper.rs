//! Self-contained HTML rendering of the content model.

use std::fmt::Write as _;

use html_escape::{encode_double_quoted_attribute, encode_text};

use crate::model::{Alignment, BlockKind, Document, Embed, Fragment, FragmentNode, InlineRun};

pub const DEFAULT_TITLE: &str = "Untitled";
pub const DEFAULT_AUTHOR: &str = "Anonymous";

const EXPORT_STYLE: &str = "body{font-family: Arial, Helvetica, sans-serif; padding:20px} \
table{border-collapse:collapse} td,th{border:1px solid #333;padding:6px} \
.page-break{page-break-after:always}";

const PREVIEW_STYLE: &str = "body{font-family:Arial;padding:20px;color:#111} \
table{border-collapse:collapse} td,th{border:1px solid #333;padding:8px}";

/// Pixels of left margin per indent level
const INDENT_STEP_PX: u32 = 40;

/// Title and author shown in an export. Not part of the document.
///
/// The fields hold what the user typed. Blank fields are shown as the
/// session fallbacks, or the built-in defaults when none were given.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportDescriptor {
    pub title: String,
    pub author: String,
    fallback_title: Option<String>,
    fallback_author: Option<String>,
}

impl ExportDescriptor {
    pub fn new(title: impl Into<String>, author: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            author: author.into(),
            ..Self::default()
        }
    }

    /// Title as shown, falling back when blank
    pub fn display_title(&self) -> &str {
        non_blank(&self.title)
            .or_else(|| self.fallback_title.as_deref().and_then(non_blank))
            .unwrap_or(DEFAULT_TITLE)
    }

    /// Author as shown, falling back when blank
    pub fn display_author(&self) -> &str {
        non_blank(&self.author)
            .or_else(|| self.fallback_author.as_deref().and_then(non_blank))
            .unwrap_or(DEFAULT_AUTHOR)
    }

    /// Show blank fields as the given defaults. The typed fields are kept,
    /// so filenames still derive from what the user entered.
    pub fn or_defaults(self, title: &str, author: &str) -> Self {
        Self {
            fallback_title: Some(title.to_string()),
            fallback_author: Some(author.to_string()),
            ..self
        }
    }
}

fn non_blank(value: &str) -> Option<&str> {
    (!value.trim().is_empty()).then_some(value)
}

/// Wrap the document in a standalone page with metadata and a visible
/// title/author header. Both fields are escaped.
pub fn render_wrapper(doc: &Document, descriptor: &ExportDescriptor) -> String {
    let title = encode_text(descriptor.display_title());
    let author_text = encode_text(descriptor.display_author());
    let author_attr = encode_double_quoted_attribute(descriptor.display_author());
    format!(
        "<!doctype html><html><head><meta charset=\"utf-8\">\n\
         <meta name=\"Author\" content=\"{author_attr}\">\n\
         <title>{title}</title>\n\
         <style>{EXPORT_STYLE}</style>\n\
         </head><body><header><h1>{title}</h1><p><em>Author: {author_text}</em></p><hr/></header>\n\
         {content}\n\
         </body></html>\n",
        content = content_html(doc),
    )
}

/// Minimal page showing only the content
pub fn render_preview(doc: &Document) -> String {
    format!(
        "<html><head><style>{PREVIEW_STYLE}</style><title>Preview</title></head><body>\n{}\n</body></html>\n",
        content_html(doc)
    )
}

/// The body content as HTML, one top-level block per line
pub fn content_html(doc: &Document) -> String {
    fragment_html(&doc.to_fragment())
}

pub fn fragment_html(fragment: &Fragment) -> String {
    let mut out = String::new();
    write_nodes(&mut out, &fragment.nodes, "\n");
    out
}

fn list_kind(node: &FragmentNode) -> Option<bool> {
    match node {
        FragmentNode::Block {
            kind: BlockKind::ListItem { ordered },
            ..
        } => Some(*ordered),
        _ => None,
    }
}

/// Consecutive list items of one kind are grouped into a single list
fn write_nodes(out: &mut String, nodes: &[FragmentNode], separator: &str) {
    let groups = nodes.chunk_by(|a, b| list_kind(a).is_some() && list_kind(a) == list_kind(b));
    for (index, group) in groups.enumerate() {
        if index > 0 {
            out.push_str(separator);
        }
        match group.first().and_then(list_kind) {
            Some(ordered) => {
                let tag = if ordered { "ol" } else { "ul" };
                let _ = write!(out, "<{tag}>{separator}");
                for item in group {
                    write_node(out, item);
                    out.push_str(separator);
                }
                let _ = write!(out, "</{tag}>");
            }
            None => {
                for (position, node) in group.iter().enumerate() {
                    if position > 0 {
                        out.push_str(separator);
                    }
                    write_node(out, node);
                }
            }
        }
    }
}

fn write_node(out: &mut String, node: &FragmentNode) {
    match node {
        FragmentNode::Run(run) => write_run(out, run),
        FragmentNode::Embed(embed) => write_embed(out, embed),
        FragmentNode::Block {
            kind,
            align,
            indent,
            children,
        } => {
            let style = block_style(*align, *indent);
            match kind {
                BlockKind::PageBreak => out.push_str("<div class=\"page-break\"></div>"),
                BlockKind::Figure { width, height } => {
                    let _ = write!(
                        out,
                        "<div class=\"figure\" contenteditable=\"false\" \
                         style=\"resize:both;overflow:hidden;width:{width}px;height:{height}px\">"
                    );
                    write_inline(out, children);
                    out.push_str("</div>");
                }
                BlockKind::Table | BlockKind::TableRow | BlockKind::Body => {
                    let tag = match kind {
                        BlockKind::Table => "table",
                        BlockKind::TableRow => "tr",
                        _ => "div",
                    };
                    let _ = write!(out, "<{tag}>");
                    write_nodes(out, children, "");
                    let _ = write!(out, "</{tag}>");
                }
                _ => {
                    let tag = match kind {
                        BlockKind::Heading { level } => match level {
                            1 => "h1",
                            2 => "h2",
                            _ => "h3",
                        },
                        BlockKind::ListItem { .. } => "li",
                        BlockKind::TableCell => "td",
                        _ => "p",
                    };
                    let _ = write!(out, "<{tag}{style}>");
                    write_inline(out, children);
                    let _ = write!(out, "</{tag}>");
                }
            }
        }
    }
}

fn block_style(align: Alignment, indent: u8) -> String {
    let mut rules = Vec::new();
    if align != Alignment::Left {
        rules.push(format!("text-align:{}", align.css()));
    }
    if indent > 0 {
        rules.push(format!("margin-left:{}px", u32::from(indent) * INDENT_STEP_PX));
    }
    if rules.is_empty() {
        String::new()
    } else {
        format!(" style=\"{}\"", rules.join(";"))
    }
}

fn write_inline(out: &mut String, children: &[FragmentNode]) {
    for child in children {
        write_node(out, child);
    }
}

fn write_run(out: &mut String, run: &InlineRun) {
    if run.is_empty() {
        return;
    }
    let format = &run.format;
    let mut closers: Vec<&str> = Vec::new();

    if let Some(link) = &format.link {
        let _ = write!(out, "<a href=\"{}\">", encode_double_quoted_attribute(link));
        closers.push("</a>");
    }
    if format.bold {
        out.push_str("<strong>");
        closers.push("</strong>");
    }
    if format.italic {
        out.push_str("<em>");
        closers.push("</em>");
    }
    if format.underline {
        out.push_str("<u>");
        closers.push("</u>");
    }

    let mut style = Vec::new();
    if let Some(family) = &format.font_family {
        style.push(format!("font-family:{family}"));
    }
    if let Some(px) = format.font_size_px {
        style.push(format!("font-size:{px}px"));
    }
    if let Some(color) = &format.color {
        style.push(format!("color:{color}"));
    }
    if let Some(color) = &format.highlight {
        style.push(format!("background-color:{color}"));
    }
    if !style.is_empty() {
        let _ = write!(
            out,
            "<span style=\"{}\">",
            encode_double_quoted_attribute(&style.join(";"))
        );
        closers.push("</span>");
    }

    out.push_str(&encode_text(&run.text));
    for closer in closers.iter().rev() {
        out.push_str(closer);
    }
}

fn write_embed(out: &mut String, embed: &Embed) {
    let _ = write!(
        out,
        "<img src=\"{}\" alt=\"\" style=\"width:100%;height:100%;object-fit:cover\">",
        encode_double_quoted_attribute(&embed.source)
    );
}
