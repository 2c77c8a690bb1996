//! CLI binary for tamper-scan.
//!
//! A thin shim over the library crate: maps flags to `AnalysisConfig`, wires
//! a filesystem store, the pdfium rasteriser and the LLM client into a
//! `Pipeline`, and prints reports.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tamper_scan::{
    check_status, upload, AnalysisConfig, FsStore, LlmVisionModel, ObjectStore, OverlayFormat,
    PdfiumRasterizer, Pipeline, Report,
};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

const AFTER_HELP: &str = r#"EXAMPLES:
  # Store a document, then analyse it
  tamper-scan upload statement.pdf
  tamper-scan process statement.pdf

  # Upload and analyse in one go, printing the report
  tamper-scan analyze https://example.org/files/payslip.png

  # Analyse several stored documents, 4 at a time
  tamper-scan process a.pdf b.png c.jpg --concurrency 4

  # Poll for a report
  tamper-scan status statement.pdf

  # Finer strips, specific model
  tamper-scan analyze form.pdf --strip-height 100 --provider openai --model gpt-4o

STORE LAYOUT:
  <store>/documents/<name>                uploaded documents
  <store>/metadata/<stem>_metadata.json   document metadata
  <store>/overlay-images/<stem>_overlay.png
  <store>/reports/<stem>_report.json      success or error report

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  AZURE_OPENAI_API_KEY    Azure OpenAI API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, azure, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  TAMPER_SCAN_STORE       Store root directory
  PDFIUM_LIB_PATH         Path to an existing libpdfium; skips auto-download
"#;

/// Detect tampering in scanned documents using Vision LLMs.
#[derive(Parser, Debug)]
#[command(
    name = "tamper-scan",
    version,
    about = "Detect tampering in scanned documents using Vision LLMs",
    long_about = "Rasterise the first page of a PDF, PNG or JPEG, cut it into horizontal strips, \
ask a Vision Language Model which strips look doctored, and persist a JSON report plus an \
overlay image with the flagged strips tinted red.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Store root directory.
    #[arg(long, env = "TAMPER_SCAN_STORE", default_value = "./store", global = true)]
    store: PathBuf,

    /// Base URL under which the store is published; used for overlay links.
    #[arg(long, env = "TAMPER_SCAN_PUBLIC_URL", global = true)]
    public_url: Option<String>,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "TAMPER_SCAN_VERBOSE", global = true)]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "TAMPER_SCAN_QUIET", global = true)]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Store local files or URLs in the documents container.
    Upload {
        /// Local file paths or HTTP/HTTPS URLs.
        #[arg(required = true)]
        sources: Vec<String>,

        /// HTTP download timeout in seconds.
        #[arg(long, env = "TAMPER_SCAN_DOWNLOAD_TIMEOUT", default_value_t = 120)]
        download_timeout: u64,
    },

    /// Analyse documents already in the store.
    Process {
        /// Document names inside the documents container.
        #[arg(required = true)]
        names: Vec<String>,

        /// Documents analysed at the same time.
        #[arg(short, long, env = "TAMPER_SCAN_CONCURRENCY", default_value_t = 1)]
        concurrency: usize,

        /// Print each report as JSON on stdout.
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        analysis: AnalysisArgs,
    },

    /// Upload a document, analyse it and print its report.
    Analyze {
        /// Local file path or HTTP/HTTPS URL.
        source: String,

        /// HTTP download timeout in seconds.
        #[arg(long, env = "TAMPER_SCAN_DOWNLOAD_TIMEOUT", default_value_t = 120)]
        download_timeout: u64,

        #[command(flatten)]
        analysis: AnalysisArgs,
    },

    /// Print the status of a document's report.
    Status {
        /// Document name as uploaded.
        name: String,
    },
}

#[derive(Args, Debug)]
struct AnalysisArgs {
    /// Strip height in pixels.
    #[arg(long, env = "TAMPER_SCAN_STRIP_HEIGHT", default_value_t = 150,
          value_parser = clap::value_parser!(u32).range(1..))]
    strip_height: u32,

    /// Rendering DPI for PDF input (72–600).
    #[arg(long, env = "TAMPER_SCAN_DPI", default_value_t = 300,
          value_parser = clap::value_parser!(u32).range(72..=600))]
    dpi: u32,

    /// LLM model ID (e.g. gpt-4o).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, azure, anthropic, gemini, ollama.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "TAMPER_SCAN_TEMPERATURE", default_value_t = 0.7)]
    temperature: f32,

    /// Max LLM output tokens.
    #[arg(long, env = "TAMPER_SCAN_MAX_TOKENS", default_value_t = 800)]
    max_tokens: usize,

    /// Retries on LLM failure.
    #[arg(long, env = "TAMPER_SCAN_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    /// LLM call timeout in seconds.
    #[arg(long, env = "TAMPER_SCAN_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "TAMPER_SCAN_PASSWORD")]
    password: Option<String>,

    /// Path to a text file containing a custom instruction prompt.
    #[arg(long, env = "TAMPER_SCAN_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Overlay image encoding.
    #[arg(long, env = "TAMPER_SCAN_OVERLAY_FORMAT", value_enum, default_value = "png")]
    overlay_format: OverlayArg,

    /// Disable progress bar.
    #[arg(long, env = "TAMPER_SCAN_NO_PROGRESS")]
    no_progress: bool,
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum OverlayArg {
    Png,
    Jpeg,
}

impl From<OverlayArg> for OverlayFormat {
    fn from(v: OverlayArg) -> Self {
        match v {
            OverlayArg::Png => OverlayFormat::Png,
            OverlayArg::Jpeg => OverlayFormat::Jpeg,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
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

    let mut store = FsStore::new(&cli.store);
    if let Some(ref base) = cli.public_url {
        store = store.with_public_base_url(base.clone());
    }
    let store: Arc<dyn ObjectStore> = Arc::new(store);

    match cli.command {
        Command::Upload {
            ref sources,
            download_timeout,
        } => {
            for source in sources {
                let name = upload(store.as_ref(), source, download_timeout)
                    .await
                    .with_context(|| format!("Failed to upload '{source}'"))?;
                if !cli.quiet {
                    eprintln!("{} {}  →  documents/{}", green("✔"), source, bold(&name));
                }
            }
        }

        Command::Process {
            ref names,
            concurrency,
            json,
            ref analysis,
        } => {
            let pipeline = build_pipeline(&cli, analysis, Arc::clone(&store)).await?;
            let bar = progress_bar(!cli.quiet && !analysis.no_progress && !json, names.len());

            let mut failed = 0usize;
            let mut results = std::pin::pin!(pipeline.process_stream(names.clone(), concurrency));
            while let Some((name, result)) = results.next().await {
                bar.inc(1);
                match result {
                    Ok(report) => {
                        if json {
                            println!("{}", report.to_json()?);
                        } else if !cli.quiet {
                            say(&bar, summary_line(&name, &report));
                        }
                    }
                    Err(e) => {
                        failed += 1;
                        say(&bar, format!("{} {}  {}", red("✘"), bold(&name), e));
                    }
                }
            }
            bar.finish_and_clear();

            if failed > 0 {
                anyhow::bail!("{failed}/{} documents failed", names.len());
            }
        }

        Command::Analyze {
            ref source,
            download_timeout,
            ref analysis,
        } => {
            let name = upload(store.as_ref(), source, download_timeout)
                .await
                .with_context(|| format!("Failed to upload '{source}'"))?;
            let pipeline = build_pipeline(&cli, analysis, Arc::clone(&store)).await?;

            let bar = progress_bar(!cli.quiet && !analysis.no_progress, 1);
            bar.set_message(name.clone());
            let result = pipeline.process_stored(&name).await;
            bar.finish_and_clear();

            let report = result.with_context(|| format!("Analysis of '{name}' failed"))?;
            println!("{}", report.to_json()?);
            if !cli.quiet {
                eprintln!("{}", summary_line(&name, &report));
            }
        }

        Command::Status { ref name } => {
            let status = check_status(store.as_ref(), name).await;
            println!(
                "{}",
                serde_json::to_string_pretty(&status).context("Failed to serialise status")?
            );
        }
    }

    Ok(())
}

/// Make sure pdfium is present, then wire the pipeline.
async fn build_pipeline(
    cli: &Cli,
    args: &AnalysisArgs,
    store: Arc<dyn ObjectStore>,
) -> Result<Pipeline> {
    ensure_pdfium(cli.quiet)?;

    let config = build_config(args).await?;
    let model = LlmVisionModel::from_config(&config).context("Failed to configure LLM provider")?;
    let rasterizer = PdfiumRasterizer::from_config(&config);

    Ok(Pipeline::new(
        store,
        Arc::new(rasterizer),
        Arc::new(model),
        config,
    ))
}

/// Map CLI args to `AnalysisConfig`.
async fn build_config(args: &AnalysisArgs) -> Result<AnalysisConfig> {
    let mut builder = AnalysisConfig::builder()
        .strip_height(args.strip_height)
        .dpi(args.dpi)
        .temperature(args.temperature)
        .max_tokens(args.max_tokens)
        .max_retries(args.max_retries)
        .api_timeout_secs(args.api_timeout)
        .overlay_format(args.overlay_format.clone().into());

    if let Some(ref path) = args.system_prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read system prompt from {:?}", path))?;
        builder = builder.system_prompt(prompt);
    }
    if let Some(ref model) = args.model {
        builder = builder.model(model.clone());
    }
    if let Some(ref provider) = args.provider {
        builder = builder.provider_name(provider.clone());
    }
    if let Some(ref password) = args.password {
        builder = builder.password(password.clone());
    }

    builder.build().context("Invalid configuration")
}

/// On the very first run pdfium (~30 MB) is downloaded and cached; later
/// runs only check the cached path.
fn ensure_pdfium(quiet: bool) -> Result<()> {
    if pdfium_auto::is_pdfium_cached() {
        return Ok(());
    }

    if quiet {
        tokio::task::block_in_place(|| pdfium_auto::ensure_pdfium_library(None))
            .context("Failed to download PDFium engine")?;
        return Ok(());
    }

    let dl_bar = ProgressBar::new(0);
    dl_bar.set_style(
        ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {bytes}/{total_bytes}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS),
    );
    dl_bar.set_prefix("PDF engine");
    dl_bar.set_message("Connecting…");
    dl_bar.enable_steady_tick(Duration::from_millis(80));

    let bar = dl_bar.clone();
    tokio::task::block_in_place(|| {
        pdfium_auto::ensure_pdfium_library(Some(&|downloaded, total| {
            if let Some(t) = total {
                if bar.length().unwrap_or(0) != t {
                    bar.set_length(t);
                }
            }
            bar.set_position(downloaded);
        }))
    })
    .context("Failed to download PDFium engine")?;

    dl_bar.finish_with_message("ready ✓");
    Ok(())
}

fn progress_bar(visible: bool, total: usize) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(total as u64);
    bar.set_style(
        ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {pos:>3}/{len} documents  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS),
    );
    bar.set_prefix("Analysing");
    bar.enable_steady_tick(Duration::from_millis(80));
    bar
}

/// Print above the bar, or straight to stderr when the bar is hidden.
fn say(bar: &ProgressBar, line: String) {
    if bar.is_hidden() {
        eprintln!("{line}");
    } else {
        bar.println(line);
    }
}

fn summary_line(name: &str, report: &Report) -> String {
    let flagged = report.tampered_chunks.clone().unwrap_or_default();
    let risk = report
        .response
        .as_ref()
        .map(|r| r.overall_risk.to_string())
        .unwrap_or_else(|| "low".to_string());
    let mark = if flagged.is_empty() { green("✔") } else { red("⚑") };
    format!(
        "{} {}  risk {}  flagged {:?}  {}",
        mark,
        bold(name),
        bold(&risk),
        flagged,
        dim(report.overlay_image_url.as_deref().unwrap_or("")),
    )
}
