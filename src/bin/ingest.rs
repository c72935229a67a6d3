//! CLI binary for evidence-ingest.
//!
//! A thin shim over the library crate: maps flags to `IngestConfig`, uploads
//! files into a local object store, runs the batch and prints what was
//! stored.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use evidence_ingest::upload::{storage_path_for, LocalObjectStorage, ObjectStorage};
use evidence_ingest::{
    process_batch, BatchItem, DocumentRecord, DocumentStore, DocumentType, IngestConfig,
    IngestionOrchestrator, IngestionProgressCallback, JsonDirStore, ModelRegistry, OpenRouterClient,
    ProgressCallback, RawDocument, Stage,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: [&str; 11] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Renders a live bar plus one log line per document. Documents finish out
/// of order when concurrency > 1.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
    degraded: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} documents  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&TICKS);
        bar.set_style(style);
        bar.set_prefix("Ingesting");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            degraded: AtomicUsize::new(0),
        })
    }

    fn elapsed_secs(&self, index: usize) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut m| m.remove(&index))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl IngestionProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total: usize) {
        self.bar.set_length(total as u64);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Ingesting {total} documents…"))
        ));
    }

    fn on_document_start(&self, index: usize, _total: usize, filename: &str) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(index, Instant::now());
        }
        self.bar.set_message(filename.to_string());
    }

    fn on_document_complete(
        &self,
        index: usize,
        total: usize,
        filename: &str,
        fully_analysed: bool,
    ) {
        let secs = self.elapsed_secs(index);
        let mark = if fully_analysed {
            green("✓")
        } else {
            self.degraded.fetch_add(1, Ordering::SeqCst);
            yellow("◐")
        };
        self.bar.println(format!(
            "  {mark} {:>3}/{:<3}  {:<40}  {}",
            index + 1,
            total,
            filename,
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_document_error(&self, index: usize, total: usize, filename: &str, error: &str) {
        let secs = self.elapsed_secs(index);
        let msg: String = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {:<40}  {}  {}",
            red("✗"),
            index + 1,
            total,
            filename,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total: usize, stored: usize) {
        self.bar.finish_and_clear();
        let failed = total.saturating_sub(stored);
        let degraded = self.degraded.load(Ordering::SeqCst);
        if failed == 0 && degraded == 0 {
            eprintln!("{} {} documents fully analysed", green("✔"), bold(&stored.to_string()));
        } else {
            eprintln!(
                "{} {}/{} stored  ({} with reduced metadata, {} failed)",
                if stored == 0 { red("✘") } else { cyan("⚠") },
                bold(&stored.to_string()),
                total,
                yellow(&degraded.to_string()),
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Ingest a letter and two screenshots into case 42
  ingest ingest --case case-42 --type hmrc_letter letter.pdf
  ingest ingest --case case-42 --type evidence shot1.png shot2.jpg

  # Extraction and field parsing only, no model calls after OCR
  ingest ingest --case case-42 --no-analysis --no-embeddings export.csv

  # List what a case holds
  ingest list case-42

  # Show the model tiers and which one each stage resolves to
  ingest models

DOCUMENT TYPES:
  hmrc_letter, complaint_draft, response, evidence, final_outcome

ENVIRONMENT VARIABLES:
  OPENROUTER_API_KEY        API key for the inference gateway
  OPENROUTER_BASE_URL       Override the gateway URL (OpenAI-compatible)
  MODEL_<STAGE>             Pick a tier per stage, e.g. MODEL_EMBEDDINGS=costEfficient
  INGEST_STORE              Record store directory (default: ./store)
  RUST_LOG                  Tracing filter, overrides --verbose/--quiet
"#;

/// Ingest case-evidence documents into structured, searchable records.
#[derive(Parser, Debug)]
#[command(
    name = "ingest",
    version,
    about = "Ingest case-evidence documents into structured, searchable records",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Record store directory (one JSON file per document).
    #[arg(long, global = true, env = "INGEST_STORE", default_value = "store")]
    store: PathBuf,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "INGEST_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "INGEST_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract, anonymise, analyse and store one or more files.
    Ingest(IngestArgs),

    /// List the records stored for a case, newest first.
    List {
        /// Case identifier.
        case: String,

        /// Print records as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show model tiers per stage and their pricing.
    Models,
}

#[derive(clap::Args, Debug)]
struct IngestArgs {
    /// Files to ingest.
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Case the documents belong to.
    #[arg(long, env = "INGEST_CASE")]
    case: String,

    /// Document type for every file in this run.
    #[arg(long = "type", env = "INGEST_DOCUMENT_TYPE", default_value = "evidence")]
    document_type: DocumentType,

    /// Directory for uploaded originals (default: <store>/objects).
    #[arg(long, env = "INGEST_OBJECTS")]
    objects: Option<PathBuf>,

    /// Documents processed at once.
    #[arg(short, long, env = "INGEST_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Skip the deep-analysis stage.
    #[arg(long, env = "INGEST_NO_ANALYSIS")]
    no_analysis: bool,

    /// Skip the embedding stage.
    #[arg(long, env = "INGEST_NO_EMBEDDINGS")]
    no_embeddings: bool,

    /// Vision model used to read images.
    #[arg(long, env = "INGEST_OCR_MODEL", default_value = "openai/gpt-4o")]
    ocr_model: String,

    /// OCR call timeout in seconds.
    #[arg(long, env = "INGEST_OCR_TIMEOUT", default_value_t = 60)]
    ocr_timeout: u64,

    /// Analysis and embedding call timeout in seconds.
    #[arg(long, env = "INGEST_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// Disable progress bar.
    #[arg(long, env = "INGEST_NO_PROGRESS")]
    no_progress: bool,

    /// Print stored records as JSON.
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar is the user feedback during ingestion; library INFO
    // logs would interleave with it.
    let show_progress = match &cli.command {
        Command::Ingest(args) => !cli.quiet && !args.no_progress && !args.json,
        _ => false,
    };
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Command::Ingest(ref args) => run_ingest(&cli, args, show_progress).await,
        Command::List { ref case, json } => run_list(&cli, case, json).await,
        Command::Models => {
            print_models(&ModelRegistry::from_env());
            Ok(())
        }
    }
}

async fn run_ingest(cli: &Cli, args: &IngestArgs, show_progress: bool) -> Result<()> {
    let config = build_config(args)?;
    let store = Arc::new(JsonDirStore::new(&cli.store));
    let objects = LocalObjectStorage::new(
        args.objects
            .clone()
            .unwrap_or_else(|| cli.store.join("objects")),
    );
    let orchestrator = IngestionOrchestrator::builder()
        .config(config)
        .model_client(Arc::new(OpenRouterClient::from_env().with_app(
            "https://github.com/evidence-ingest",
            "evidence-ingest",
        )))
        .store(store)
        .build()
        .context("Invalid configuration")?;

    // ── Upload originals ─────────────────────────────────────────────────
    let mut items = Vec::with_capacity(args.files.len());
    for path in &args.files {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let storage_path = storage_path_for(
            &args.case,
            args.document_type,
            &filename,
            chrono::Utc::now().timestamp_millis(),
        );
        let content_type =
            evidence_ingest::DocumentFormat::from_filename(&filename).content_type(&filename);
        let stored = objects
            .upload(&storage_path, &bytes, content_type)
            .await
            .with_context(|| format!("Failed to store {}", path.display()))?;
        items.push(BatchItem::new(
            RawDocument::new(bytes, filename, args.case.clone(), args.document_type),
            stored,
        ));
    }

    // ── Run batch ────────────────────────────────────────────────────────
    let progress: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn IngestionProgressCallback>)
    } else {
        None
    };
    let report = process_batch(&orchestrator, items, progress).await;

    if args.json {
        let records: Vec<&DocumentRecord> = report.records().collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&records).context("Failed to serialise records")?
        );
    } else if !cli.quiet {
        for record in report.records() {
            print_record(record);
        }
        if !show_progress {
            eprintln!(
                "Stored {}/{} documents in {}ms",
                report.stored(),
                report.results.len(),
                report.duration_ms
            );
        }
    }
    for err in report.results.iter().filter_map(|r| r.as_ref().err()) {
        eprintln!("{} {err}", red("error:"));
    }

    if report.stored() == 0 && !report.results.is_empty() {
        anyhow::bail!("No documents were stored");
    }
    Ok(())
}

async fn run_list(cli: &Cli, case: &str, json: bool) -> Result<()> {
    let store = JsonDirStore::new(&cli.store);
    let records = store
        .list_for_case(case)
        .await
        .with_context(|| format!("Failed to read records for case '{case}'"))?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&records).context("Failed to serialise records")?
        );
        return Ok(());
    }
    if records.is_empty() {
        eprintln!("No documents stored for case '{case}'");
    }
    for record in &records {
        print_record(record);
    }
    Ok(())
}

/// Map CLI args to `IngestConfig`.
fn build_config(args: &IngestArgs) -> Result<IngestConfig> {
    IngestConfig::builder()
        .ocr_model(args.ocr_model.clone())
        .ocr_timeout_secs(args.ocr_timeout)
        .api_timeout_secs(args.api_timeout)
        .concurrency(args.concurrency)
        .deep_analysis(!args.no_analysis)
        .embeddings(!args.no_embeddings)
        .build()
        .context("Invalid configuration")
}

fn print_record(record: &DocumentRecord) {
    let meta = record.metadata();
    let fields = record.fields();
    println!(
        "{}  {}  {}",
        bold(&record.filename),
        dim(record.document_type.as_str()),
        dim(&record.id.to_string())
    );
    println!(
        "   extraction {:<12} {} chars{}",
        meta.extraction_method.as_str(),
        meta.raw_text_length,
        if meta.extraction_succeeded {
            String::new()
        } else {
            format!("  {}", yellow("(placeholder)"))
        }
    );
    println!("   analysis   {}", meta.analysis);
    println!("   embedding  {}", meta.embedding);
    println!(
        "   fields     {} dates, {} amounts, {} references, {} events",
        fields.dates.len(),
        fields.amounts.len(),
        fields.references.len(),
        fields.events.len()
    );
    if let Some(summary) = record.deep_analysis.as_ref().and_then(|a| a.summary.as_deref()) {
        println!("   summary    {}", dim(summary));
    }
}

fn print_models(registry: &ModelRegistry) {
    for stage in Stage::ALL {
        let resolved = registry.resolve(stage);
        println!("{}  {}", bold(stage.key()), dim(&format!("({})", stage.env_var())));
        for tier in registry.tiers(stage) {
            let marker = if tier.key == resolved.key { green("▶") } else { " ".to_string() };
            println!(
                "  {marker} {:<20} {:<36} {:<10} {}",
                tier.key,
                tier.model,
                tier.provider.to_string(),
                dim(&tier.pricing.to_string()),
            );
        }
    }
}
