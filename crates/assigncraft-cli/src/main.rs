use anyhow::{Context, Result};
use assigncraft_config::Config;
use assigncraft_engine::export::DirectorySink;
use assigncraft_engine::{Editor, EditorSettings, FileStore, HeadlessHost};
use std::{env, fs, process, time::Instant};

mod script;

fn usage(program: &str) {
    eprintln!("Usage: {program} <command>");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  show                          Print the saved draft as plain text");
    eprintln!("  html                          Print the saved draft as HTML");
    eprintln!("  preview                       Print the preview page");
    eprintln!("  run <script>                  Replay editor intents from a script file");
    eprintln!("  export-doc [title] [author]   Export a flow document (.doc)");
    eprintln!("  export-pdf [title] [author]   Export a paginated document (.pdf)");
    eprintln!();
    eprintln!("Settings are read from {}", Config::config_path().display());
}

fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let args: Vec<String> = env::args().collect();
    let program = args.first().map(String::as_str).unwrap_or("assigncraft-cli");

    let config = match Config::load() {
        Ok(Some(config)) => config,
        Ok(None) => Config::default(),
        Err(e) => {
            eprintln!("Error: Failed to load config file: {e}");
            process::exit(1);
        }
    };

    let settings = EditorSettings {
        autosave_interval: config.autosave_interval(),
        default_title: config.default_title.clone(),
        default_author: config.default_author.clone(),
    };
    let mut editor = Editor::open(
        HeadlessHost::new(),
        FileStore::new(&config.store_path),
        settings,
    );
    println!("{}", editor.status());

    let command = args.get(1).map(String::as_str);
    let rest = args.get(2..).unwrap_or_default();
    match (command, rest) {
        (Some("show"), []) => println!("{}", editor.plain_text()),
        (Some("html"), []) => println!("{}", editor.content_html()),
        (Some("preview"), []) => println!("{}", editor.preview_html()),
        (Some("run"), [path]) => {
            let text =
                fs::read_to_string(path).with_context(|| format!("reading script {path}"))?;
            for intent in script::parse(&text)? {
                intent.apply(&mut editor)?;
                println!("{}", editor.status());
            }
            editor.tick(Instant::now());
        }
        (Some("export-doc"), [..]) if rest.len() <= 2 => {
            let descriptor = descriptor(&editor, rest);
            let mut sink = DirectorySink::new(&config.export_dir);
            let exported = editor.export_flow(&descriptor, None, &mut sink);
            report_export(&editor, exported.is_ok());
        }
        (Some("export-pdf"), [..]) if rest.len() <= 2 => {
            let descriptor = descriptor(&editor, rest);
            let mut sink = DirectorySink::new(&config.export_dir);
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?;
            let exported = runtime.block_on(editor.export_paginated(&descriptor, None, &mut sink));
            report_export(&editor, exported.is_ok());
        }
        _ => {
            usage(program);
            process::exit(1);
        }
    }

    Ok(())
}

/// Print the export status. A failed export exits non-zero.
fn report_export(editor: &Editor<HeadlessHost, FileStore>, exported: bool) {
    if !exported {
        eprintln!("{}", editor.status());
        process::exit(1);
    }
    println!("{}", editor.status());
}

fn descriptor(
    editor: &Editor<HeadlessHost, FileStore>,
    rest: &[String],
) -> assigncraft_engine::ExportDescriptor {
    let title = rest.first().map(String::as_str).unwrap_or_default();
    let author = rest.get(1).map(String::as_str).unwrap_or_default();
    editor.descriptor(title, author)
}
