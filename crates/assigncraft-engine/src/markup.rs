//! Raw markup fragments.
//!
//! Markup is CommonMark with the tables extension. It is parsed with
//! pulldown-cmark into a detached [`Fragment`] that the inserter splices in
//! like any structured fragment.

use pulldown_cmark::{Event, Options, Parser, Tag, TagEnd};

use crate::model::{
    Alignment, BlockKind, DEFAULT_FIGURE_HEIGHT, DEFAULT_FIGURE_WIDTH, Embed, Fragment,
    FragmentNode, InlineRun, RunFormat,
};

const CODE_FONT: &str = "Courier New";

/// Parse markup into a fragment. Blank markup yields an empty fragment.
pub fn parse_markup(markup: &str) -> Fragment {
    let parser = Parser::new_ext(markup, Options::ENABLE_TABLES);
    let mut processor = MarkupProcessor::default();
    for event in parser {
        processor.process_event(event);
    }
    Fragment::new(processor.finalize())
}

/// Block under construction and the inline nodes collected for it
struct OpenBlock {
    kind: BlockKind,
    indent: u8,
    children: Vec<FragmentNode>,
}

/// Event-driven builder. pulldown-cmark reports paragraphs inside list items
/// and table cells as nested events, so inline content always goes into the
/// innermost open text block.
#[derive(Default)]
struct MarkupProcessor {
    nodes: Vec<FragmentNode>,
    current: Option<OpenBlock>,
    /// Ordered flag of each enclosing list, innermost last
    lists: Vec<bool>,
    quote_depth: u8,
    bold: usize,
    italic: usize,
    in_code_block: bool,
    links: Vec<String>,
    /// Alt text of an image is swallowed until the image closes
    image: Option<String>,
    table: Option<Vec<Vec<FragmentNode>>>,
}

impl MarkupProcessor {
    fn process_event(&mut self, event: Event) {
        if let Some(source) = &self.image {
            if let Event::End(TagEnd::Image) = event {
                let source = source.clone();
                self.image = None;
                self.push_image(source);
            }
            return;
        }

        match event {
            Event::Start(Tag::Paragraph) => {
                if self.current.is_none() {
                    self.open(BlockKind::Paragraph);
                }
            }
            Event::End(TagEnd::Paragraph) => {
                if !self.in_item() {
                    self.close();
                }
            }
            Event::Start(Tag::Heading { level, .. }) => {
                self.close();
                self.open(BlockKind::Heading {
                    level: (level as u8).clamp(1, 3),
                });
            }
            Event::End(TagEnd::Heading(_)) => self.close(),
            Event::Start(Tag::BlockQuote(_)) => {
                self.close();
                self.quote_depth += 1;
            }
            Event::End(TagEnd::BlockQuote(_)) => {
                self.close();
                self.quote_depth = self.quote_depth.saturating_sub(1);
            }
            Event::Start(Tag::CodeBlock(_)) => {
                self.close();
                self.in_code_block = true;
                self.open(BlockKind::Paragraph);
            }
            Event::End(TagEnd::CodeBlock) => {
                self.in_code_block = false;
                // The closing newline is not part of the content
                if let Some(OpenBlock { children, .. }) = &mut self.current
                    && let Some(FragmentNode::Run(last)) = children.last_mut()
                {
                    let trimmed = last.text.trim_end_matches('\n').len();
                    last.text.truncate(trimmed);
                }
                self.close();
            }
            Event::Start(Tag::List(first_number)) => {
                self.close();
                self.lists.push(first_number.is_some());
            }
            Event::End(TagEnd::List(_)) => {
                self.close();
                self.lists.pop();
            }
            Event::Start(Tag::Item) => {
                self.close();
                let ordered = self.lists.last().copied().unwrap_or(false);
                self.open(BlockKind::ListItem { ordered });
            }
            Event::End(TagEnd::Item) => self.close(),
            Event::Start(Tag::Table(_)) => {
                self.close();
                self.table = Some(Vec::new());
            }
            Event::End(TagEnd::Table) => {
                if let Some(rows) = self.table.take() {
                    let rows = rows
                        .into_iter()
                        .filter(|cells| !cells.is_empty())
                        .map(|cells| FragmentNode::block(BlockKind::TableRow, cells))
                        .collect();
                    self.nodes
                        .push(FragmentNode::block(BlockKind::Table, rows));
                }
            }
            Event::Start(Tag::TableHead) | Event::Start(Tag::TableRow) => {
                if let Some(rows) = &mut self.table {
                    rows.push(Vec::new());
                }
            }
            Event::Start(Tag::TableCell) => self.open(BlockKind::TableCell),
            Event::End(TagEnd::TableCell) => self.close(),
            Event::Start(Tag::Emphasis) => self.italic += 1,
            Event::End(TagEnd::Emphasis) => self.italic = self.italic.saturating_sub(1),
            Event::Start(Tag::Strong) => self.bold += 1,
            Event::End(TagEnd::Strong) => self.bold = self.bold.saturating_sub(1),
            Event::Start(Tag::Link { dest_url, .. }) => self.links.push(dest_url.to_string()),
            Event::End(TagEnd::Link) => {
                self.links.pop();
            }
            Event::Start(Tag::Image { dest_url, .. }) => self.image = Some(dest_url.to_string()),
            Event::Text(text) | Event::Html(text) | Event::InlineHtml(text) => {
                self.push_text(&text, self.in_code_block)
            }
            Event::Code(text) => self.push_text(&text, true),
            Event::SoftBreak | Event::HardBreak => self.push_text(" ", false),
            Event::Rule => {
                self.close();
                self.nodes
                    .push(FragmentNode::block(BlockKind::PageBreak, Vec::new()));
            }
            _ => {}
        }
    }

    fn in_item(&self) -> bool {
        matches!(
            self.current,
            Some(OpenBlock {
                kind: BlockKind::ListItem { .. } | BlockKind::TableCell,
                ..
            })
        )
    }

    fn open(&mut self, kind: BlockKind) {
        let depth = u8::try_from(self.lists.len().saturating_sub(1)).unwrap_or(u8::MAX);
        let nesting = depth.saturating_add(self.quote_depth);
        self.current = Some(OpenBlock {
            kind,
            indent: if kind.is_text_block() { nesting } else { 0 },
            children: Vec::new(),
        });
    }

    fn close(&mut self) {
        let Some(block) = self.current.take() else {
            return;
        };
        if block.kind == BlockKind::TableCell {
            let mut children = block.children;
            if children.is_empty() {
                children.push(FragmentNode::Run(InlineRun::default()));
            }
            if let Some(row) = self.table.as_mut().and_then(|rows| rows.last_mut()) {
                row.push(FragmentNode::block(BlockKind::TableCell, children));
            }
            return;
        }
        // Items keep their place even when empty; other empty blocks vanish
        if block.children.is_empty() && !matches!(block.kind, BlockKind::ListItem { .. }) {
            return;
        }
        self.nodes.push(FragmentNode::Block {
            kind: block.kind,
            align: Alignment::Left,
            indent: block.indent,
            children: block.children,
        });
    }

    fn format(&self, code: bool) -> RunFormat {
        RunFormat {
            bold: self.bold > 0,
            italic: self.italic > 0,
            font_family: code.then(|| CODE_FONT.to_string()),
            link: self.links.last().cloned(),
            ..RunFormat::default()
        }
    }

    fn push_text(&mut self, text: &str, code: bool) {
        if text.is_empty() {
            return;
        }
        let format = self.format(code);
        let block = self.current.get_or_insert_with(|| OpenBlock {
            kind: BlockKind::Paragraph,
            indent: 0,
            children: Vec::new(),
        });
        if let Some(FragmentNode::Run(last)) = block.children.last_mut()
            && last.format == format
        {
            last.text.push_str(text);
            return;
        }
        block
            .children
            .push(FragmentNode::Run(InlineRun::with_format(text, format)));
    }

    fn push_image(&mut self, source: String) {
        let embed = Embed {
            source,
            width: DEFAULT_FIGURE_WIDTH,
            height: DEFAULT_FIGURE_HEIGHT,
        };
        if let Some(block) = &mut self.current
            && block.kind == BlockKind::TableCell
        {
            block.children.push(FragmentNode::Embed(embed));
            return;
        }
        // Figures live at the top level, so the surrounding block is cut
        let resume = self.current.as_ref().map(|block| block.kind);
        self.close();
        self.nodes.push(FragmentNode::block(
            BlockKind::Figure {
                width: embed.width,
                height: embed.height,
            },
            vec![FragmentNode::Embed(embed)],
        ));
        if let Some(kind) = resume {
            self.open(kind);
        }
    }

    fn finalize(mut self) -> Vec<FragmentNode> {
        self.close();
        self.nodes
    }
}
