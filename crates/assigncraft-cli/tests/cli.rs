use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use tempfile::TempDir;

/// Run the binary with `home` as its home directory, so the config is read
/// from `home/.config/assigncraft/config.toml`
fn run_cli(home: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_assigncraft-cli"))
        .args(args)
        .env("HOME", home)
        .output()
        .unwrap()
}

fn write_config(home: &Path, export_dir: &Path) {
    let dir = home.join(".config/assigncraft");
    fs::create_dir_all(&dir).unwrap();
    fs::write(
        dir.join("config.toml"),
        format!(
            "store_path = {:?}\nexport_dir = {:?}\n",
            home.join("store").to_string_lossy(),
            export_dir.to_string_lossy()
        ),
    )
    .unwrap();
}

#[test]
fn export_doc_without_title_writes_document_doc() {
    let home = TempDir::new().unwrap();
    let exports = home.path().join("exports");
    write_config(home.path(), &exports);

    let output = run_cli(home.path(), &["export-doc"]);

    assert!(output.status.success());
    assert!(exports.join("document.doc").exists());
}

#[test]
fn failed_export_exits_non_zero() {
    let home = TempDir::new().unwrap();
    // A plain file where the export directory should be
    let blocked = home.path().join("not-a-dir");
    fs::write(&blocked, "x").unwrap();
    write_config(home.path(), &blocked);

    let output = run_cli(home.path(), &["export-doc", "Essay"]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Export failed"), "stderr: {stderr}");
}
