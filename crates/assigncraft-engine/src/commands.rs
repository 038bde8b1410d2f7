use std::sync::OnceLock;

use regex::Regex;

use crate::error::{CommandError, ModelError};
use crate::host::EditingHost;
use crate::model::{
    Alignment, BlockKind, Document, Fragment, InlineAttr, InlineRun, RunFormat,
};
use crate::selection::{Selection, SelectionTracker};

/// URL schemes accepted by link creation
const LINK_SCHEMES: [&str; 4] = ["http", "https", "mailto", "ftp"];

/// Legacy size keyword sent to hosts whose size primitive only knows 1-7
const LEGACY_FONT_SIZE: &str = "7";

/// Formatting commands the executor understands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cmd {
    Bold,
    Italic,
    Underline,
    ForeColor(String),
    HighlightColor(String),
    FontName(String),
    /// Font size in pixels
    FontSize(u16),
    FormatBlock(BlockKind),
    List { ordered: bool },
    Justify(Alignment),
    Indent,
    Outdent,
    CreateLink(String),
}

impl Cmd {
    /// Build a command from its host name and optional argument.
    ///
    /// Empty or unusable arguments are reported as `InvalidUserInput`, which
    /// callers treat as a skipped command rather than a failure.
    pub fn parse(name: &str, argument: Option<&str>) -> Result<Cmd, CommandError> {
        let argument = argument.map(str::trim).filter(|arg| !arg.is_empty());
        let required = |command: &'static str| {
            argument.ok_or_else(|| CommandError::InvalidUserInput {
                command,
                reason: "no value supplied".to_string(),
            })
        };

        let cmd = match name {
            "bold" => Cmd::Bold,
            "italic" => Cmd::Italic,
            "underline" => Cmd::Underline,
            "foreColor" => Cmd::ForeColor(parse_color("foreColor", required("foreColor")?)?),
            "hiliteColor" | "highlightColor" | "backColor" => Cmd::HighlightColor(parse_color(
                "hiliteColor",
                required("hiliteColor")?,
            )?),
            "fontName" => Cmd::FontName(required("fontName")?.to_string()),
            "fontSize" => Cmd::FontSize(parse_font_size(required("fontSize")?)?),
            "formatBlock" => Cmd::FormatBlock(parse_block_kind(required("formatBlock")?)?),
            "insertOrderedList" => Cmd::List { ordered: true },
            "insertUnorderedList" => Cmd::List { ordered: false },
            "justifyLeft" => Cmd::Justify(Alignment::Left),
            "justifyCenter" => Cmd::Justify(Alignment::Center),
            "justifyRight" => Cmd::Justify(Alignment::Right),
            "justifyFull" => Cmd::Justify(Alignment::Justify),
            "indent" => Cmd::Indent,
            "outdent" => Cmd::Outdent,
            "createLink" => Cmd::CreateLink(normalize_url(required("createLink")?)?),
            other => return Err(CommandError::UnknownCommand(other.to_string())),
        };
        Ok(cmd)
    }

    /// Name of the host primitive implementing this command, with its value
    pub fn primitive(&self) -> (&'static str, Option<String>) {
        match self {
            Cmd::Bold => ("bold", None),
            Cmd::Italic => ("italic", None),
            Cmd::Underline => ("underline", None),
            Cmd::ForeColor(color) => ("foreColor", Some(color.clone())),
            Cmd::HighlightColor(color) => ("hiliteColor", Some(color.clone())),
            Cmd::FontName(family) => ("fontName", Some(family.clone())),
            Cmd::FontSize(_) => ("fontSize", Some(LEGACY_FONT_SIZE.to_string())),
            Cmd::FormatBlock(kind) => ("formatBlock", Some(block_tag(*kind).to_string())),
            Cmd::List { ordered: true } => ("insertOrderedList", None),
            Cmd::List { ordered: false } => ("insertUnorderedList", None),
            Cmd::Justify(Alignment::Left) => ("justifyLeft", None),
            Cmd::Justify(Alignment::Center) => ("justifyCenter", None),
            Cmd::Justify(Alignment::Right) => ("justifyRight", None),
            Cmd::Justify(Alignment::Justify) => ("justifyFull", None),
            Cmd::Indent => ("indent", None),
            Cmd::Outdent => ("outdent", None),
            Cmd::CreateLink(url) => ("createLink", Some(url.clone())),
        }
    }
}

/// Why a command left the document untouched
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    NoSelection,
    InvalidInput(String),
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::NoSelection => write!(f, "no selection"),
            SkipReason::InvalidInput(reason) => write!(f, "{reason}"),
        }
    }
}

/// Result of a command or insertion
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The host primitive and the model agree
    Applied,
    /// The host lacked a primitive; its view was re-rendered from the model
    AppliedWithFallback,
    Skipped(SkipReason),
}

/// Run `cmd` against the tracked selection.
///
/// The host primitive is tried first, then the model is mutated to the same
/// end state. When the host could not apply the primitive its view is
/// rebuilt from the model. Only model-level failures are returned as errors.
pub fn execute(
    doc: &mut Document,
    tracker: &mut SelectionTracker,
    host: &mut dyn EditingHost,
    cmd: &Cmd,
) -> Result<Outcome, ModelError> {
    tracker.revalidate(doc);
    let Some(selection) = tracker.current() else {
        log::debug!("Skipping {cmd:?}: nothing is selected");
        return Ok(Outcome::Skipped(SkipReason::NoSelection));
    };

    let host_applied = apply_on_host(host, cmd);
    let selection = apply_on_model(doc, tracker, selection, cmd)?;
    tracker.set(doc, selection);

    // Size primitives only know keywords, so the pixel value always comes
    // from the model
    let resync = !host_applied || matches!(cmd, Cmd::FontSize(_));
    if resync {
        host.render(doc);
        host.set_selection(tracker.current().as_ref());
    }

    Ok(if host_applied {
        Outcome::Applied
    } else {
        Outcome::AppliedWithFallback
    })
}

fn apply_on_host(host: &mut dyn EditingHost, cmd: &Cmd) -> bool {
    let (name, value) = cmd.primitive();
    match host.apply_primitive(name, value.as_deref()) {
        Ok(()) => true,
        Err(e) => {
            log::debug!("{e}; falling back to the content model");
            // Some hosts only know the older highlight primitive
            matches!(cmd, Cmd::HighlightColor(_))
                && host.apply_primitive("backColor", value.as_deref()).is_ok()
        }
    }
}

fn apply_on_model(
    doc: &mut Document,
    tracker: &mut SelectionTracker,
    selection: Selection,
    cmd: &Cmd,
) -> Result<Selection, ModelError> {
    let Selection { start, end } = selection;
    let attr = match cmd {
        Cmd::Bold => {
            let format = doc.format_at_range_start(&start, &end)?;
            InlineAttr::Bold(!format.bold)
        }
        Cmd::Italic => {
            let format = doc.format_at_range_start(&start, &end)?;
            InlineAttr::Italic(!format.italic)
        }
        Cmd::Underline => {
            let format = doc.format_at_range_start(&start, &end)?;
            InlineAttr::Underline(!format.underline)
        }
        Cmd::ForeColor(color) => InlineAttr::Color(Some(color.clone())),
        Cmd::HighlightColor(color) => InlineAttr::Highlight(Some(color.clone())),
        Cmd::FontName(family) => InlineAttr::FontFamily(Some(family.clone())),
        Cmd::FontSize(px) => InlineAttr::FontSize(Some(*px)),
        Cmd::CreateLink(url) if selection.is_collapsed() => {
            let run = InlineRun::with_format(
                url.clone(),
                RunFormat {
                    link: Some(url.clone()),
                    ..doc.format_at(&start)?
                },
            );
            if let Some(last) = doc.insert_fragment(&end, Fragment::text(run))? {
                tracker.collapse_after(doc, last)?;
            }
            return Ok(tracker.current().unwrap_or(selection));
        }
        Cmd::CreateLink(url) => InlineAttr::Link(Some(url.clone())),
        Cmd::FormatBlock(kind) => {
            doc.set_block_type(&start, &end, *kind)?;
            return Ok(selection);
        }
        Cmd::List { ordered } => {
            doc.toggle_list(&start, &end, *ordered)?;
            return Ok(selection);
        }
        Cmd::Justify(align) => {
            doc.set_alignment(&start, &end, *align)?;
            return Ok(selection);
        }
        Cmd::Indent => {
            doc.adjust_indent(&start, &end, 1)?;
            return Ok(selection);
        }
        Cmd::Outdent => {
            doc.adjust_indent(&start, &end, -1)?;
            return Ok(selection);
        }
    };

    let (start, end) = doc.apply_formatting(&start, &end, &attr)?;
    Ok(Selection::new(start, end))
}

fn parse_color(command: &'static str, value: &str) -> Result<String, CommandError> {
    static COLOR_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = COLOR_REGEX.get_or_init(|| {
        Regex::new(r"^#(?:[0-9a-fA-F]{3}|[0-9a-fA-F]{6})$").expect("Invalid color regex")
    });
    if regex.is_match(value) {
        Ok(value.to_ascii_lowercase())
    } else {
        Err(CommandError::InvalidUserInput {
            command,
            reason: format!("'{value}' is not a #rgb or #rrggbb color"),
        })
    }
}

fn parse_font_size(value: &str) -> Result<u16, CommandError> {
    let digits = value.strip_suffix("px").unwrap_or(value).trim();
    match digits.parse::<u16>() {
        Ok(px) if px > 0 => Ok(px),
        _ => Err(CommandError::InvalidUserInput {
            command: "fontSize",
            reason: format!("'{value}' is not a pixel size"),
        }),
    }
}

fn parse_block_kind(value: &str) -> Result<BlockKind, CommandError> {
    let tag = value
        .trim_start_matches('<')
        .trim_end_matches('>')
        .to_ascii_lowercase();
    match tag.as_str() {
        "p" => Ok(BlockKind::Paragraph),
        "h1" => Ok(BlockKind::Heading { level: 1 }),
        "h2" => Ok(BlockKind::Heading { level: 2 }),
        "h3" => Ok(BlockKind::Heading { level: 3 }),
        _ => Err(CommandError::InvalidUserInput {
            command: "formatBlock",
            reason: format!("unsupported block type '{value}'"),
        }),
    }
}

fn block_tag(kind: BlockKind) -> &'static str {
    match kind {
        BlockKind::Heading { level: 1 } => "h1",
        BlockKind::Heading { level: 2 } => "h2",
        BlockKind::Heading { .. } => "h3",
        _ => "p",
    }
}

/// Validate a link target, assuming https for bare hosts like `example.com`
pub fn normalize_url(value: &str) -> Result<String, CommandError> {
    let invalid = |reason: String| CommandError::InvalidUserInput {
        command: "createLink",
        reason,
    };
    let value = value.trim();
    if value.is_empty() || value.chars().any(char::is_whitespace) {
        return Err(invalid(format!("'{value}' is not a URL")));
    }
    let parsed = match url::Url::parse(value) {
        Ok(url) => url,
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            url::Url::parse(&format!("https://{value}"))
                .map_err(|e| invalid(format!("'{value}': {e}")))?
        }
        Err(e) => return Err(invalid(format!("'{value}': {e}"))),
    };
    if !LINK_SCHEMES.contains(&parsed.scheme()) {
        return Err(invalid(format!(
            "scheme '{}' is not allowed in links",
            parsed.scheme()
        )));
    }
    Ok(parsed.to_string())
}
