//! Batch generation of personalized card and statement
//! PDFs from spreadsheet rows.
//!
//! Rows flow through header normalization and field extraction into
//! the overlay engine, which either writes values over dash markers
//! located on a template PDF or lays a blank B5 page out from the card
//! type's fallback coordinates. The batch orchestrator drives one
//! worksheet end to end, publishing progress for a polling caller and
//! leaving a packaged archive behind.

pub mod batch;
pub mod error;
pub mod extract;
pub mod fonts;
pub mod headers;
pub mod layout;
pub mod logging;
pub mod overlay;
pub mod parse;
pub mod schema;
pub mod shaping;

use std::path::Path;
use std::sync::Arc;

pub use crate::batch::{
    run_batch, BatchOptions, BatchReport, BatchRunner, InMemoryProgressStore, Packager,
    ProgressStore, ZipPackager, PROGRESS_FAILED,
};
pub use crate::error::Error;
pub use crate::extract::{load_worksheet, RowRecord, Worksheet};
pub use crate::fonts::{AssetStore, DirAssetStore};
pub use crate::overlay::{OverlayEngine, RenderRequest};
pub use crate::schema::{schema_for, CardType, Field};

/// Process a workbook end to end: load the first sheet, render one
/// document per row and package the result set.
///
/// # Arguments
/// * `workbook` - Path to the .xlsx/.xls file to process
/// * `card_type` - Validated card type selecting schema and template
/// * `template` - Optional template override
/// * `output_dir` - Directory the session output and archive land in
/// * `assets` - Storage collaborator for templates and fonts
/// * `session_id` - Key the batch publishes progress under
/// * `progress` - Progress collaborator polled by the caller
pub fn generate_cards(
    workbook: &Path,
    card_type: CardType,
    template: Option<&Path>,
    output_dir: &Path,
    assets: Arc<dyn AssetStore>,
    session_id: &str,
    progress: &dyn ProgressStore,
) -> Result<BatchReport, Error> {
    let sheet = extract::load_worksheet(workbook)?;
    let engine = OverlayEngine::new(assets);
    let stem = workbook
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "statements".to_string());
    let opts = BatchOptions {
        session_id: session_id.to_string(),
        card_type,
        template: template.map(Path::to_path_buf),
        output_dir: output_dir.to_path_buf(),
        archive_name: Some(format!("{stem}_{card_type}.zip")),
    };
    batch::run_batch(&sheet, &opts, &engine, progress, &ZipPackager)
}
