//! Editor intents replayed from a script file, one per line.
//!
//! ```text
//! # comment
//! select 0 5
//! exec bold
//! exec foreColor #cc0000
//! type Hello world
//! insert table 3 2
//! insert page-break
//! insert image figure.png
//! insert markup ## Notes\n\n- one\n- two
//! clear-formatting
//! reset
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use assigncraft_engine::{EditingHost, Editor, InsertRequest, KeyValueStore, TableSpec};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    Select { start: usize, end: usize },
    Blur,
    Exec { name: String, argument: Option<String> },
    Type(String),
    PageBreak,
    Table { rows: String, cols: String },
    Image(PathBuf),
    Markup(String),
    ClearFormatting,
    Reset,
}

pub fn parse(script: &str) -> Result<Vec<Intent>> {
    script
        .lines()
        .enumerate()
        .filter(|(_, line)| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with('#')
        })
        .map(|(index, line)| {
            parse_line(line.trim()).with_context(|| format!("line {}: '{}'", index + 1, line.trim()))
        })
        .collect()
}

fn parse_line(line: &str) -> Result<Intent> {
    let (verb, rest) = line.split_once(' ').unwrap_or((line, ""));
    let rest = rest.trim();
    let intent = match verb {
        "select" => {
            let mut parts = rest.split_whitespace();
            let (Some(start), Some(end), None) = (parts.next(), parts.next(), parts.next()) else {
                bail!("select needs a start and an end");
            };
            Intent::Select {
                start: start.parse().context("invalid start")?,
                end: end.parse().context("invalid end")?,
            }
        }
        "blur" => Intent::Blur,
        "exec" => {
            let (name, argument) = rest.split_once(' ').unwrap_or((rest, ""));
            if name.is_empty() {
                bail!("exec needs a command name");
            }
            let argument = argument.trim();
            Intent::Exec {
                name: name.to_string(),
                argument: (!argument.is_empty()).then(|| argument.to_string()),
            }
        }
        "type" => Intent::Type(unescape(rest)),
        "insert" => {
            let (kind, rest) = rest.split_once(' ').unwrap_or((rest, ""));
            let rest = rest.trim();
            match kind {
                "page-break" => Intent::PageBreak,
                "table" => {
                    // Answers are kept raw; unusable ones fall back to the default size
                    let (rows, cols) = rest.split_once(' ').unwrap_or((rest, ""));
                    Intent::Table {
                        rows: rows.to_string(),
                        cols: cols.trim().to_string(),
                    }
                }
                "image" if !rest.is_empty() => Intent::Image(PathBuf::from(rest)),
                "markup" => Intent::Markup(unescape(rest)),
                _ => bail!("unknown insertion '{kind}'"),
            }
        }
        "clear-formatting" => Intent::ClearFormatting,
        "reset" => Intent::Reset,
        _ => bail!("unknown intent '{verb}'"),
    };
    Ok(intent)
}

/// `\n` and `\t` escapes, so multi-line text fits on one script line
fn unescape(text: &str) -> String {
    text.replace("\\n", "\n").replace("\\t", "\t")
}

fn image_mime(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        _ => "application/octet-stream",
    }
}

impl Intent {
    pub fn apply<H: EditingHost, S: KeyValueStore>(&self, editor: &mut Editor<H, S>) -> Result<()> {
        match self {
            Intent::Select { start, end } => editor.select_chars(*start, *end),
            Intent::Blur => editor.blur(),
            Intent::Exec { name, argument } => {
                editor.execute(name, argument.as_deref())?;
            }
            Intent::Type(text) => {
                editor.type_text(text)?;
            }
            Intent::PageBreak => {
                editor.insert(InsertRequest::PageBreak)?;
            }
            Intent::Table { rows, cols } => {
                let spec = TableSpec::from_prompt(Some(rows), Some(cols));
                editor.insert(InsertRequest::Table(spec))?;
            }
            Intent::Image(path) => {
                let bytes = fs::read(path)
                    .with_context(|| format!("reading image {}", path.display()))?;
                match InsertRequest::image_from_bytes(image_mime(path), &bytes) {
                    Some(request) => {
                        editor.insert(request)?;
                    }
                    None => log::info!("{} is empty, nothing inserted", path.display()),
                }
            }
            Intent::Markup(markup) => {
                editor.insert(InsertRequest::Markup(markup.clone()))?;
            }
            Intent::ClearFormatting => editor.clear_formatting(),
            Intent::Reset => editor.reset()?,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assigncraft_engine::{EditorSettings, HeadlessHost, MemoryStore};
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[test]
    fn test_parse_script() {
        let script = "# heading\n\nselect 0 0\nexec formatBlock h2\ntype Notes\\nmore\ninsert table 3 x\n";

        let intents = parse(script).unwrap();

        assert_eq!(
            intents,
            vec![
                Intent::Select { start: 0, end: 0 },
                Intent::Exec {
                    name: "formatBlock".to_string(),
                    argument: Some("h2".to_string()),
                },
                Intent::Type("Notes\nmore".to_string()),
                Intent::Table {
                    rows: "3".to_string(),
                    cols: "x".to_string(),
                },
            ]
        );
    }

    #[rstest]
    #[case("select 1")]
    #[case("select a b")]
    #[case("exec")]
    #[case("insert chart")]
    #[case("insert image")]
    #[case("dance")]
    fn test_rejects_bad_lines(#[case] line: &str) {
        assert!(parse(line).is_err());
    }

    #[rstest]
    #[case("a.PNG", "image/png")]
    #[case("b.jpeg", "image/jpeg")]
    #[case("c", "application/octet-stream")]
    fn test_image_mime(#[case] path: &str, #[case] mime: &str) {
        assert_eq!(image_mime(Path::new(path)), mime);
    }

    #[test]
    fn test_apply_script_to_editor() {
        let mut editor = Editor::open(
            HeadlessHost::new(),
            MemoryStore::new(),
            EditorSettings::default(),
        );
        let script = "select 0 0\ntype hello\nselect 0 5\nexec bold\ninsert table 0 3\n";

        for intent in parse(script).unwrap() {
            intent.apply(&mut editor).unwrap();
        }

        assert!(editor.document().runs()[0].format.bold);
        assert_eq!(editor.content_html().matches("<td>").count(), 6);
    }
}
