mod common;

use std::path::Path;
use std::sync::mpsc::{channel, Sender};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use lopdf::Document;
use pretty_assertions::assert_eq;
use tempfile::TempDir;

use cardpress::batch::{BatchRunner, Packager, ZipPackager, PROGRESS_FAILED};
use cardpress::{
    run_batch, BatchOptions, CardType, DirAssetStore, Error, InMemoryProgressStore,
    OverlayEngine, ProgressStore, Worksheet,
};

use common::{build_marker_template, count_ops, page_operations, positioned_texts};

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn sheet(headers: &[&str], rows: &[&[&str]]) -> Worksheet {
    Worksheet {
        headers: strings(headers),
        rows: rows.iter().map(|row| strings(row)).collect(),
    }
}

fn engine_for(dir: &TempDir) -> OverlayEngine {
    OverlayEngine::new(Arc::new(DirAssetStore::new(
        dir.path().join("templates"),
        dir.path().join("fonts"),
    )))
}

fn options(dir: &TempDir, session: &str, card_type: CardType) -> BatchOptions {
    BatchOptions {
        session_id: session.to_string(),
        card_type,
        template: None,
        output_dir: dir.path().join("out"),
        archive_name: None,
    }
}

/// Progress store that remembers every published value, in order.
#[derive(Default)]
struct RecordingStore {
    values: Mutex<Vec<i32>>,
}

impl ProgressStore for RecordingStore {
    fn set(&self, _session_id: &str, value: i32) {
        self.values.lock().unwrap().push(value);
    }

    fn get(&self, _session_id: &str) -> Option<i32> {
        self.values.lock().unwrap().last().copied()
    }

    fn remove(&self, _session_id: &str) {}
}

#[test]
fn fallback_batch_renders_and_names_documents() {
    let dir = TempDir::new().unwrap();
    let engine = engine_for(&dir);
    let progress = InMemoryProgressStore::new();
    let worksheet = sheet(
        &["Cardholder Name", "Card Last Digits", "Phone Number"],
        &[&["Jane Doe", "1234", "555-0100"]],
    );

    let report = run_batch(
        &worksheet,
        &options(&dir, "s-fallback", CardType::Platinum),
        &engine,
        &progress,
        &ZipPackager,
    )
    .unwrap();

    assert_eq!(report.produced, vec!["Jane Doe , 1234.pdf".to_string()]);
    assert_eq!(report.skipped, 0);
    assert_eq!(progress.get("s-fallback"), Some(100));

    let document = dir
        .path()
        .join("out")
        .join("s-fallback")
        .join("Jane Doe , 1234.pdf");
    let doc = Document::load(&document).unwrap();
    assert_eq!(doc.get_pages().len(), 1);

    let ops = page_operations(&doc, 1);
    let texts = positioned_texts(&ops);
    // Three supplied fields drawn, nothing else.
    assert_eq!(texts.len(), 3);

    // "name" lands at platinum's name coordinate (top-origin 183,435
    // becomes a baseline 14pt below in page space).
    let (x, y, _) = texts
        .iter()
        .find(|(_, _, text)| text == "Jane Doe")
        .cloned()
        .expect("name not drawn");
    assert!((x - 183.0).abs() < 0.01);
    assert!((y - (common::PAGE_HEIGHT - 435.0 - 14.0)).abs() < 0.01);
}

#[test]
fn progress_is_monotone_and_reaches_100_only_at_the_end() {
    let dir = TempDir::new().unwrap();
    let engine = engine_for(&dir);
    let progress = RecordingStore::default();

    let rows: Vec<Vec<String>> = (0..20)
        .map(|i| strings(&[&format!("Holder {i}"), &format!("{i:04}")]))
        .collect();
    let worksheet = Worksheet {
        headers: strings(&["Name", "Last Four Digits"]),
        rows,
    };

    let report = run_batch(
        &worksheet,
        &options(&dir, "s-progress", CardType::Iytc),
        &engine,
        &progress,
        &ZipPackager,
    )
    .unwrap();
    assert_eq!(report.produced.len(), 20);

    let values = progress.values.lock().unwrap().clone();
    assert_eq!(values.first(), Some(&0));
    assert_eq!(values.last(), Some(&100));
    for pair in values.windows(2) {
        assert!(pair[0] <= pair[1], "progress went backwards: {values:?}");
    }
    // 100 is terminal and unique.
    assert_eq!(values.iter().filter(|v| **v == 100).count(), 1);
    assert!(values[..values.len() - 1].iter().all(|v| *v <= 99));
}

#[test]
fn archive_contains_every_produced_document() {
    let dir = TempDir::new().unwrap();
    let engine = engine_for(&dir);
    let progress = InMemoryProgressStore::new();
    let worksheet = sheet(
        &["Name", "Last Four Digits"],
        &[&["Jane Doe", "1234"], &["John Roe", "9876"]],
    );

    let report = run_batch(
        &worksheet,
        &options(&dir, "s-archive", CardType::Corporate),
        &engine,
        &progress,
        &ZipPackager,
    )
    .unwrap();

    assert_eq!(report.archive, dir.path().join("out").join("s-archive_corporate.zip"));
    let file = std::fs::File::open(&report.archive).unwrap();
    let mut archive = zip::ZipArchive::new(file).unwrap();
    assert_eq!(archive.len(), 2);
    let mut names: Vec<String> = (0..archive.len())
        .map(|i| archive.by_index(i).unwrap().name().to_string())
        .collect();
    names.sort();
    let mut produced = report.produced.clone();
    produced.sort();
    assert_eq!(names, produced);
}

#[test]
fn empty_rows_are_skipped_without_failing_the_batch() {
    let dir = TempDir::new().unwrap();
    let engine = engine_for(&dir);
    let progress = InMemoryProgressStore::new();
    let worksheet = sheet(
        &["Name", "Last Four Digits"],
        &[&["Jane Doe", "1234"], &["", ""], &["John Roe", "9876"]],
    );

    let report = run_batch(
        &worksheet,
        &options(&dir, "s-empty", CardType::Platinum),
        &engine,
        &progress,
        &ZipPackager,
    )
    .unwrap();
    assert_eq!(report.total_rows, 3);
    assert_eq!(report.produced.len(), 2);
    assert_eq!(report.skipped, 0);
    assert_eq!(progress.get("s-empty"), Some(100));
}

#[test]
fn rows_without_identity_still_render_with_degraded_names() {
    let dir = TempDir::new().unwrap();
    let engine = engine_for(&dir);
    let progress = InMemoryProgressStore::new();
    let worksheet = sheet(&["Phone Number"], &[&["555-0100"]]);

    let report = run_batch(
        &worksheet,
        &options(&dir, "s-degraded", CardType::Iytc),
        &engine,
        &progress,
        &ZipPackager,
    )
    .unwrap();
    assert_eq!(report.produced, vec![" , .pdf".to_string()]);
    assert!(dir.path().join("out").join("s-degraded").join(" , .pdf").is_file());
}

#[test]
fn unwritable_output_directory_fails_the_batch_with_sentinel() {
    let dir = TempDir::new().unwrap();
    // A file where the output directory should be.
    let blocked = dir.path().join("out");
    std::fs::write(&blocked, b"not a directory").unwrap();

    let engine = engine_for(&dir);
    let progress = InMemoryProgressStore::new();
    let worksheet = sheet(&["Name"], &[&["Jane"]]);
    let opts = BatchOptions {
        session_id: "s-fatal".to_string(),
        card_type: CardType::Platinum,
        template: None,
        output_dir: blocked,
        archive_name: None,
    };

    let result = run_batch(&worksheet, &opts, &engine, &progress, &ZipPackager);
    assert!(result.is_err());
    assert_eq!(progress.get("s-fatal"), Some(PROGRESS_FAILED));
}

#[test]
fn default_template_is_resolved_from_the_asset_store() {
    let dir = TempDir::new().unwrap();
    let templates_dir = dir.path().join("templates");
    std::fs::create_dir_all(&templates_dir).unwrap();
    build_marker_template(
        &templates_dir.join("platinum.pdf"),
        &[vec![(100.0, 600.0), (100.0, 500.0)]],
    );

    let engine = engine_for(&dir);
    let progress = InMemoryProgressStore::new();
    let worksheet = sheet(
        &["Activation Code", "Card Last Digits", "Cardholder Name"],
        &[&["A1B2", "1234", "Jane Doe"]],
    );

    let report = run_batch(
        &worksheet,
        &options(&dir, "s-template", CardType::Platinum),
        &engine,
        &progress,
        &ZipPackager,
    )
    .unwrap();
    assert_eq!(report.produced.len(), 1);

    let document = dir
        .path()
        .join("out")
        .join("s-template")
        .join(&report.produced[0]);
    let ops = page_operations(&Document::load(&document).unwrap(), 1);
    // Two markers masked: activation code and last four digits.
    assert_eq!(count_ops(&ops, "re"), 2);
}

#[test]
fn unreadable_template_is_an_input_error_before_any_row_runs() {
    let dir = TempDir::new().unwrap();
    let templates_dir = dir.path().join("templates");
    std::fs::create_dir_all(&templates_dir).unwrap();
    std::fs::write(templates_dir.join("platinum.pdf"), b"not a pdf").unwrap();

    let engine = engine_for(&dir);
    let progress = InMemoryProgressStore::new();
    let worksheet = sheet(&["Name"], &[&["Jane"]]);

    let result = run_batch(
        &worksheet,
        &options(&dir, "s-badtpl", CardType::Platinum),
        &engine,
        &progress,
        &ZipPackager,
    );
    assert!(matches!(result, Err(Error::Template { .. })));
    assert_eq!(progress.get("s-badtpl"), Some(PROGRESS_FAILED));
    // The per-row phase never started, so no documents exist.
    assert!(!dir.path().join("out").join("s-badtpl").join("Jane , .pdf").exists());
}

/// Packager that blocks until released, to hold a batch in flight.
struct GatedPackager {
    gate: Mutex<std::sync::mpsc::Receiver<()>>,
    inner: ZipPackager,
}

impl GatedPackager {
    fn new() -> (Self, Sender<()>) {
        let (tx, rx) = channel();
        (
            GatedPackager {
                gate: Mutex::new(rx),
                inner: ZipPackager,
            },
            tx,
        )
    }
}

impl Packager for GatedPackager {
    fn package(&self, dir: &Path, filenames: &[String], archive: &Path) -> Result<(), Error> {
        self.gate.lock().unwrap().recv().ok();
        self.inner.package(dir, filenames, archive)
    }
}

#[test]
fn runner_allows_one_batch_per_session_and_runs_to_completion() {
    let dir = TempDir::new().unwrap();
    let engine = Arc::new(engine_for(&dir));
    let progress: Arc<dyn ProgressStore> = Arc::new(InMemoryProgressStore::new());
    let (packager, release) = GatedPackager::new();
    let packager: Arc<dyn Packager> = Arc::new(packager);

    let runner = BatchRunner::new(2).unwrap();
    let worksheet = sheet(&["Name", "Last Four Digits"], &[&["Jane Doe", "1234"]]);

    runner
        .submit(
            worksheet.clone(),
            options(&dir, "s-runner", CardType::Platinum),
            Arc::clone(&engine),
            Arc::clone(&progress),
            Arc::clone(&packager),
        )
        .unwrap();

    // The first batch is gated inside packaging, so a second submit
    // for the same session must be rejected.
    let duplicate = runner.submit(
        worksheet,
        options(&dir, "s-runner", CardType::Platinum),
        Arc::clone(&engine),
        Arc::clone(&progress),
        Arc::clone(&packager),
    );
    assert!(matches!(duplicate, Err(Error::BatchActive(_))));

    release.send(()).unwrap();

    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        if progress.get("s-runner") == Some(100) {
            break;
        }
        assert!(Instant::now() < deadline, "batch never completed");
        std::thread::sleep(Duration::from_millis(10));
    }
    assert!(dir
        .path()
        .join("out")
        .join("s-runner_platinum.zip")
        .is_file());

    let deadline = Instant::now() + Duration::from_secs(10);
    while runner.is_active("s-runner") {
        assert!(Instant::now() < deadline, "session never released");
        std::thread::sleep(Duration::from_millis(10));
    }
}

#[test]
fn unknown_card_type_never_starts_a_batch() {
    let parsed = "gold".parse::<CardType>();
    assert!(matches!(parsed, Err(Error::UnsupportedCardType(_))));
}
