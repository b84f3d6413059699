//! LabelForge CLI - Bridge interface for the label server
//!
//! Commands: derive, validate, render, print
//! Outputs JSON to stdout, logs to stderr
//! Returns 2 when anything was rejected

use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use labelforge_core::{
    dispatch_accepted, EngineConfig, LabelOutcome, ProductRecord, RenderPipeline,
    SpoolDirectoryAdapter, TemplateDocument,
};

#[derive(Parser)]
#[command(name = "labelforge-cli")]
#[command(about = "LabelForge CLI - RFID Label Compiler")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Engine configuration (JSON). Defaults apply when omitted.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Derive barcode root and PO digits for one record
    Derive {
        /// JSON payload (ProductRecord)
        #[arg(short, long)]
        payload: String,
    },

    /// Classify a rendered label document
    Validate {
        /// Path to the document
        #[arg(short, long)]
        document: PathBuf,
    },

    /// Render labels for a set of records without printing
    Render {
        /// Path to the label template
        #[arg(short, long)]
        template: PathBuf,

        /// Path to a JSON record or array of records
        #[arg(short, long)]
        records: PathBuf,
    },

    /// Render and spool accepted labels
    Print {
        #[arg(short, long)]
        template: PathBuf,

        #[arg(short, long)]
        records: PathBuf,

        /// Spool directory watched by the printer bridge
        #[arg(short, long)]
        spool_dir: PathBuf,

        /// Target device id
        #[arg(short = 'D', long, default_value = "zebra")]
        device: String,
    },
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();
}

fn fail(message: impl std::fmt::Display) -> ExitCode {
    let output = serde_json::json!({ "success": false, "error": message.to_string() });
    println!("{}", output);
    ExitCode::FAILURE
}

fn print_json(value: &impl serde::Serialize) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn load_template(path: &Path) -> Result<TemplateDocument, String> {
    let source = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read template {}: {}", path.display(), e))?;
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "template".to_string());
    Ok(TemplateDocument::new(name, source))
}

fn load_records(path: &Path) -> Result<Vec<ProductRecord>, String> {
    let content = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read records {}: {}", path.display(), e))?;
    if let Ok(records) = serde_json::from_str::<Vec<ProductRecord>>(&content) {
        return Ok(records);
    }
    serde_json::from_str::<ProductRecord>(&content)
        .map(|record| vec![record])
        .map_err(|e| format!("Invalid records payload: {}", e))
}

fn main() -> ExitCode {
    init_tracing();
    // Usage errors exit 1; 2 is reserved for rejected labels.
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.exit_code() == 0 { ExitCode::SUCCESS } else { ExitCode::FAILURE };
        }
    };

    let config = match &cli.config {
        Some(path) => match EngineConfig::load_from_file(path) {
            Ok(c) => c,
            Err(e) => return fail(e),
        },
        None => EngineConfig::default(),
    };

    let settle = Duration::from_millis(config.dispatch.settle_delay_ms);
    let pipeline = match RenderPipeline::new(config) {
        Ok(p) => p,
        Err(e) => return fail(e),
    };

    match cli.command {
        Commands::Derive { payload } => {
            let record: ProductRecord = match serde_json::from_str(&payload) {
                Ok(r) => r,
                Err(e) => return fail(format!("Invalid payload: {}", e)),
            };
            match pipeline.derive(&record) {
                Ok(ids) => match print_json(&ids) {
                    Ok(()) => ExitCode::SUCCESS,
                    Err(e) => fail(e),
                },
                Err(e) => fail(e),
            }
        }

        Commands::Validate { document } => {
            let text = match fs::read_to_string(&document) {
                Ok(t) => t,
                Err(e) => return fail(format!("Failed to read {}: {}", document.display(), e)),
            };
            let result = pipeline.validate_document(&text);
            if let Err(e) = print_json(&result) {
                return fail(e);
            }
            if result.is_dispatchable(pipeline.config().dispatch.accept_risky) {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(2) // Rejected by validator
            }
        }

        Commands::Render { template, records } => {
            let (template, records) = match (load_template(&template), load_records(&records)) {
                (Ok(t), Ok(r)) => (t, r),
                (Err(e), _) | (_, Err(e)) => return fail(e),
            };
            let runs = pipeline.process_batch(&records, &template);
            match pipeline.batch_report(&template, &runs) {
                Ok(report) => {
                    if let Err(e) = print_json(&report) {
                        return fail(e);
                    }
                    if report.all_accepted() {
                        ExitCode::SUCCESS
                    } else {
                        ExitCode::from(2)
                    }
                }
                Err(e) => fail(e),
            }
        }

        Commands::Print { template, records, spool_dir, device } => {
            let (template, records) = match (load_template(&template), load_records(&records)) {
                (Ok(t), Ok(r)) => (t, r),
                (Err(e), _) | (_, Err(e)) => return fail(e),
            };
            let adapter = match SpoolDirectoryAdapter::new(spool_dir) {
                Ok(a) => a,
                Err(e) => return fail(e),
            };

            let runs = pipeline.process_batch(&records, &template);
            let report = match pipeline.batch_report(&template, &runs) {
                Ok(r) => r,
                Err(e) => return fail(e),
            };

            let outcomes: Vec<LabelOutcome> = runs
                .into_iter()
                .filter_map(|run| run.result.ok())
                .flat_map(|output| output.outcomes)
                .collect();
            let receipts = dispatch_accepted(outcomes, &adapter, &device, settle);

            let output = serde_json::json!({
                "success": report.all_accepted(),
                "report": report,
                "dispatch": receipts,
            });
            if let Err(e) = print_json(&output) {
                return fail(e);
            }
            if report.all_accepted() {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(2)
            }
        }
    }
}
