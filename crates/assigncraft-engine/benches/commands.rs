use assigncraft_engine::commands::{Cmd, execute};
use assigncraft_engine::fragments::{InsertRequest, insert};
use assigncraft_engine::host::HeadlessHost;
use assigncraft_engine::markup::parse_markup;
use assigncraft_engine::selection::{Selection, SelectionTracker};
use criterion::{Criterion, criterion_group, criterion_main};
mod common;

fn bench_command_operations(c: &mut Criterion) {
    let mut group = c.benchmark_group("commands");
    group.sample_size(10);

    let doc = common::generate_document(200);

    group.bench_function("toggle_bold", |b| {
        let mut d = doc.clone();
        let mut host = HeadlessHost::new();
        let mut tracker = SelectionTracker::new();
        b.iter(|| {
            let (Some(start), Some(end)) = (d.anchor_at_char(100), d.anchor_at_char(5000)) else {
                return;
            };
            tracker.set(&d, Selection::new(start, end));
            let outcome = execute(&mut d, &mut tracker, &mut host, std::hint::black_box(&Cmd::Bold));
            std::hint::black_box(outcome).unwrap();
        });
    });

    group.bench_function("insert_table", |b| {
        let mut d = doc.clone();
        let mut host = HeadlessHost::bare();
        let mut tracker = SelectionTracker::new();
        b.iter(|| {
            if let Some(caret) = d.anchor_at_char(std::hint::black_box(50)) {
                tracker.collapse_to(&d, caret);
            }
            let request = InsertRequest::Table(assigncraft_engine::TableSpec::new(3, 3));
            std::hint::black_box(insert(&mut d, &mut tracker, &mut host, request)).unwrap();
        });
    });

    group.finish();
}

fn bench_markup_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("markup");
    group.sample_size(20);

    let markup = common::generate_markup(100);
    group.bench_function("parse_markup", |b| {
        b.iter(|| {
            let fragment = parse_markup(std::hint::black_box(&markup));
            std::hint::black_box(fragment);
        });
    });

    group.finish();
}

criterion_group!(benches, bench_command_operations, bench_markup_parsing);
criterion_main!(benches);
