//! Batch orchestration.
//!
//! A batch walks every row of one worksheet, renders one document per
//! row through the overlay engine and leaves a packaged archive behind.
//! Progress is published through an injected store so a polling caller
//! can watch the run without sharing any other state with it:
//! 0 on start, 5 once the per-row phase begins, `5 + floor(row/total *
//! 85)` capped at 99 while rows complete, exactly 100 only after the
//! archive is written, and -1 on unrecoverable failure. Row-level
//! failures are logged and skipped; partial success is success.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::{error, info, warn};
use zip::write::SimpleFileOptions;

use crate::error::Error;
use crate::extract::{extract_row, ordered_values, RowRecord, Worksheet};
use crate::logging::BATCH;
use crate::overlay::{OverlayEngine, RenderRequest};
use crate::schema::{CardType, Field};

/// Sentinel progress value for a failed batch.
pub const PROGRESS_FAILED: i32 = -1;
const PROGRESS_BASE: i32 = 5;
const PROGRESS_SPAN: f32 = 85.0;
const PROGRESS_ROW_CAP: i32 = 99;

/// Progress collaborator: per-session completion values in
/// `[0, 100]` or [`PROGRESS_FAILED`].
pub trait ProgressStore: Send + Sync {
    fn set(&self, session_id: &str, value: i32);
    fn get(&self, session_id: &str) -> Option<i32>;
    fn remove(&self, session_id: &str);
}

/// Concurrent in-memory progress table.
#[derive(Default)]
pub struct InMemoryProgressStore {
    entries: DashMap<String, i32>,
}

impl InMemoryProgressStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProgressStore for InMemoryProgressStore {
    fn set(&self, session_id: &str, value: i32) {
        self.entries.insert(session_id.to_string(), value);
    }

    fn get(&self, session_id: &str) -> Option<i32> {
        self.entries.get(session_id).map(|value| *value)
    }

    fn remove(&self, session_id: &str) {
        self.entries.remove(session_id);
    }
}

/// Packaging collaborator: turns the produced document set into one
/// archive file.
pub trait Packager: Send + Sync {
    fn package(&self, dir: &Path, filenames: &[String], archive: &Path) -> Result<(), Error>;
}

/// Default packager writing a deflated zip archive.
pub struct ZipPackager;

impl Packager for ZipPackager {
    fn package(&self, dir: &Path, filenames: &[String], archive: &Path) -> Result<(), Error> {
        let file = File::create(archive)?;
        let mut writer = zip::ZipWriter::new(file);
        let options =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
        for name in filenames {
            let full = dir.join(name);
            if !full.is_file() {
                warn!(target: BATCH, file = %full.display(), "document missing, left out of archive");
                continue;
            }
            writer
                .start_file(name.clone(), options)
                .map_err(|source| Error::Archive {
                    path: archive.to_path_buf(),
                    source,
                })?;
            writer.write_all(&fs::read(&full)?)?;
        }
        writer.finish().map_err(|source| Error::Archive {
            path: archive.to_path_buf(),
            source,
        })?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub session_id: String,
    pub card_type: CardType,
    /// Explicit template override; otherwise the card type's default
    /// template is resolved through the asset store.
    pub template: Option<PathBuf>,
    /// Documents land in `output_dir/<session_id>/`, the archive next
    /// to that directory.
    pub output_dir: PathBuf,
    pub archive_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BatchReport {
    pub session_id: String,
    pub card_type: String,
    pub total_rows: usize,
    pub produced: Vec<String>,
    pub skipped: usize,
    pub archive: PathBuf,
}

/// Run one batch to a terminal state, synchronously.
pub fn run_batch(
    sheet: &Worksheet,
    opts: &BatchOptions,
    engine: &OverlayEngine,
    progress: &dyn ProgressStore,
    packager: &dyn Packager,
) -> Result<BatchReport, Error> {
    progress.set(&opts.session_id, 0);
    match run_rows(sheet, opts, engine, progress, packager) {
        Ok(report) => {
            progress.set(&opts.session_id, 100);
            info!(
                target: BATCH,
                session = %opts.session_id,
                produced = report.produced.len(),
                skipped = report.skipped,
                archive = %report.archive.display(),
                "batch completed"
            );
            Ok(report)
        }
        Err(error) => {
            error!(target: BATCH, session = %opts.session_id, %error, "batch failed");
            progress.set(&opts.session_id, PROGRESS_FAILED);
            Err(error)
        }
    }
}

fn run_rows(
    sheet: &Worksheet,
    opts: &BatchOptions,
    engine: &OverlayEngine,
    progress: &dyn ProgressStore,
    packager: &dyn Packager,
) -> Result<BatchReport, Error> {
    let session_dir = opts.output_dir.join(&opts.session_id);
    fs::create_dir_all(&session_dir).map_err(|source| Error::OutputDir {
        path: session_dir.clone(),
        source,
    })?;

    let template = engine.resolve_template(opts.card_type, opts.template.as_deref());
    // An unreadable template is an input error, caught before any row
    // runs; a template that is simply absent falls back per row.
    if let Some(path) = template.as_deref().filter(|p| p.is_file()) {
        lopdf::Document::load(path).map_err(|source| Error::Template {
            path: path.to_path_buf(),
            source,
        })?;
    }
    let total_rows = sheet.rows.len().max(1);
    progress.set(&opts.session_id, PROGRESS_BASE);

    let mut produced = Vec::new();
    let mut skipped = 0usize;
    for (i, cells) in sheet.rows.iter().enumerate() {
        let row_index = i + 1;
        if cells.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }
        let record = extract_row(&sheet.headers, cells);
        if record.is_empty() {
            continue;
        }
        let values = ordered_values(&record, opts.card_type);
        // Rows missing both name and digits still render; they just
        // get a degraded filename.
        let filename = document_filename(&record);
        let output = session_dir.join(&filename);
        let request = RenderRequest {
            card_type: opts.card_type,
            values: &values,
            template: template.as_deref(),
            output: &output,
        };
        match engine.render(&request) {
            Ok(()) => produced.push(filename),
            Err(error) => {
                warn!(
                    target: BATCH,
                    session = %opts.session_id,
                    row = row_index,
                    card_type = %opts.card_type,
                    output = %output.display(),
                    %error,
                    "row failed, skipping"
                );
                skipped += 1;
            }
        }
        progress.set(&opts.session_id, row_progress(row_index, total_rows));
    }

    let archive_name = opts
        .archive_name
        .clone()
        .unwrap_or_else(|| format!("{}_{}.zip", opts.session_id, opts.card_type));
    let archive = opts.output_dir.join(archive_name);
    packager.package(&session_dir, &produced, &archive)?;

    Ok(BatchReport {
        session_id: opts.session_id.clone(),
        card_type: opts.card_type.to_string(),
        total_rows: sheet.rows.len(),
        produced,
        skipped,
        archive,
    })
}

fn row_progress(row_index: usize, total_rows: usize) -> i32 {
    let ratio = row_index as f32 / total_rows as f32;
    (PROGRESS_BASE + (ratio * PROGRESS_SPAN) as i32).clamp(0, PROGRESS_ROW_CAP)
}

static UNSAFE_FILENAME_CHARS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[^A-Za-z0-9_.-]").unwrap()
});

/// Output filename for one row: sanitized name and the last-four
/// digits, joined by the fixed `" , "` separator.
pub fn document_filename(record: &RowRecord) -> String {
    let name = record.get(Field::Name);
    let last_digits = record.get(Field::LastFourDigits);
    let underscored = name.replace(' ', "_");
    let cleaned = UNSAFE_FILENAME_CHARS.replace_all(&underscored, "");
    format!("{} , {}.pdf", cleaned.replace('_', " "), last_digits)
}

/// Background batch execution on a bounded worker pool, with at most
/// one in-flight batch per session key. Callers poll the progress
/// store; there is no cancellation, a batch runs to a terminal state.
pub struct BatchRunner {
    pool: rayon::ThreadPool,
    active: Arc<DashMap<String, ()>>,
}

impl BatchRunner {
    pub fn new(workers: usize) -> Result<Self, Error> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .build()
            .map_err(|e| Error::Pool(e.to_string()))?;
        Ok(BatchRunner {
            pool,
            active: Arc::new(DashMap::new()),
        })
    }

    pub fn submit(
        &self,
        sheet: Worksheet,
        opts: BatchOptions,
        engine: Arc<OverlayEngine>,
        progress: Arc<dyn ProgressStore>,
        packager: Arc<dyn Packager>,
    ) -> Result<(), Error> {
        use dashmap::mapref::entry::Entry;
        match self.active.entry(opts.session_id.clone()) {
            Entry::Occupied(_) => return Err(Error::BatchActive(opts.session_id.clone())),
            Entry::Vacant(vacant) => {
                vacant.insert(());
            }
        }
        let active = Arc::clone(&self.active);
        self.pool.spawn(move || {
            let session_id = opts.session_id.clone();
            // run_batch publishes the terminal state itself.
            let _ = run_batch(&sheet, &opts, &engine, progress.as_ref(), packager.as_ref());
            active.remove(&session_id);
        });
        Ok(())
    }

    pub fn is_active(&self, session_id: &str) -> bool {
        self.active.contains_key(session_id)
    }
}
