// Benchmark helper functions - Rust's dead code analysis doesn't understand
// that these are used by benchmark files in the same directory
// See: https://users.rust-lang.org/t/cargo-rustc-benches-awarnings/110111/2
use assigncraft_engine::model::{Anchor, Document};

#[allow(dead_code)]
pub fn generate_markup(sections: usize) -> String {
    let base = "## Section\n\nParagraph with **some** content and a [link](https://example.com).\n\n- Bullet point\n- Another item\n\n| a | b |\n|---|---|\n| 1 | 2 |\n\n";
    base.repeat(sections)
}

#[allow(dead_code)]
pub fn generate_document(paragraphs: usize) -> Document {
    let mut doc = Document::new();
    let run = doc.leaves()[0];
    let text = "Lorem ipsum dolor sit amet, consectetur adipiscing elit. ".repeat(paragraphs);
    doc.insert_text(&Anchor::new(run, 0), &text).unwrap();
    doc
}
