use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;

use cardpress::logging::{init_logging, init_logging_with_dir};
use cardpress::{generate_cards, CardType, DirAssetStore, InMemoryProgressStore};

#[derive(Parser, Debug)]
#[clap(
    author,
    version,
    about,
    long_about = "Generate personalized card PDFs from a spreadsheet and package them into an archive.",
    arg_required_else_help = true
)]
pub struct Args {
    /// Path to the workbook (.xlsx/.xls) to process
    pub workbook: PathBuf,

    /// Card type selecting the field schema and default template
    #[clap(short, long, default_value = "platinum")]
    pub card_type: String,

    /// Template PDF overriding the card type's default
    #[clap(short, long)]
    pub template: Option<PathBuf>,

    /// Directory the per-session documents and archive are written to
    #[clap(short, long, default_value = "out")]
    pub output: PathBuf,

    /// Directory holding the default template PDFs
    #[clap(long, default_value = "assets/card_templates")]
    pub templates_dir: PathBuf,

    /// Directory holding the font assets
    #[clap(long, default_value = "assets/fonts")]
    pub fonts_dir: PathBuf,

    /// Session identifier; generated when omitted
    #[clap(long)]
    pub session: Option<String>,

    /// Pretty-print the batch report
    #[clap(short, long)]
    pub pretty: bool,

    /// Enable verbose logging
    #[clap(long)]
    pub verbose: bool,

    /// Directory for log files
    #[clap(long)]
    pub log_dir: Option<PathBuf>,
}

impl Args {
    pub fn parse_args() -> Self {
        Args::parse()
    }
}

fn main() -> Result<()> {
    let args = Args::parse_args();

    // Keep the guard alive so file logging flushes on exit.
    let _guard = if let Some(log_dir) = args.log_dir.clone() {
        init_logging_with_dir(args.verbose, log_dir)
    } else {
        init_logging(args.verbose)
    };

    let card_type: CardType = args.card_type.parse()?;
    let session_id = args
        .session
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let assets = Arc::new(DirAssetStore::new(
        args.templates_dir.clone(),
        args.fonts_dir.clone(),
    ));
    let progress = InMemoryProgressStore::new();

    let report = generate_cards(
        &args.workbook,
        card_type,
        args.template.as_deref(),
        &args.output,
        assets,
        &session_id,
        &progress,
    )?;

    let json = if args.pretty {
        serde_json::to_string_pretty(&report)?
    } else {
        serde_json::to_string(&report)?
    };
    println!("{json}");
    Ok(())
}
