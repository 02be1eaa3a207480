//! CLI binary for pdftoc.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ExtractionConfig`, renders progress, and drives the
//! extract → summarise → write flow.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use pdftoc::{
    existing_outline, extract_toc, import_toc_from_text_file, validate_merged,
    write_outline_safely, ExtractionConfig, ExtractionProgressCallback, MergedToc, PageRange,
    ProgressCallback,
};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
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
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a live bar plus one log line per settled
/// page. Works correctly when pages settle out of order (concurrent mode).
struct CliProgress {
    bar: ProgressBar,
    errors: AtomicUsize,
}

impl CliProgress {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
        );
        bar.set_prefix("Preparing");
        bar.set_message("Opening PDF…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self {
            bar,
            errors: AtomicUsize::new(0),
        })
    }
}

impl ExtractionProgressCallback for CliProgress {
    fn on_extraction_start(&self, total_pages: usize) {
        self.bar.set_length(total_pages as u64);
        self.bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} {prefix:.bold}  \
                 [{bar:42.green/238}] {pos:>2}/{len} pages  ⏱ {elapsed_precise}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  ")
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
        );
        self.bar.set_prefix("Recognising");
    }

    fn on_page_start(&self, page_num: usize, _total: usize) {
        self.bar.set_message(format!("page {page_num}"));
    }

    fn on_page_complete(&self, page_num: usize, _total: usize, entries: usize) {
        self.bar.println(format!(
            "  {} Page {:>3}  {}",
            green("✓"),
            page_num,
            dim(&format!("{entries} entries"))
        ));
        self.bar.inc(1);
    }

    fn on_page_error(&self, page_num: usize, _total: usize, error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);
        let msg: String = if error.len() > 80 {
            format!("{}…", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar
            .println(format!("  {} Page {:>3}  {}", red("✗"), page_num, red(&msg)));
        self.bar.inc(1);
    }

    fn on_extraction_complete(&self, total_pages: usize, success_count: usize) {
        self.bar.finish_and_clear();
        let failed = total_pages.saturating_sub(success_count);
        if failed == 0 {
            eprintln!(
                "{} {} pages recognised cleanly",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} pages clean  ({} with errors, partial entries kept)",
                cyan("⚠"),
                bold(&success_count.to_string()),
                total_pages,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Recognise the TOC printed on pages 7-10; book page 1 is PDF page 15
  pdftoc book.pdf --range 7-10 --offset 15 -o book_with_toc.pdf

  # Overwrite in place (a .pdf.bak backup is created first)
  pdftoc book.pdf --range 7-10 --offset 15 --in-place --force

  # Proofread before writing: export only, edit, then import
  pdftoc book.pdf --range 7-10 --offset 15 --export-txt toc.txt --no-write
  pdftoc book.pdf --from-txt toc.txt -o book_with_toc.pdf

  # Show the outline a PDF already has
  pdftoc book.pdf --inspect-only

  # Use a specific provider/model
  pdftoc book.pdf --range 5-8 --offset 11 --provider openai --model gpt-4.1 -o out.pdf

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY        OpenAI API key
  ANTHROPIC_API_KEY     Anthropic API key
  GEMINI_API_KEY        Google Gemini API key
  PDFTOC_PROVIDER       Override provider (openai, anthropic, gemini, ollama)
  PDFTOC_MODEL          Override model ID
  PDFIUM_LIB_PATH       Path to an existing libpdfium

SETUP:
  1. Set an API key:   export OPENAI_API_KEY=sk-...
  2. Find the TOC pages and the offset in any PDF viewer.
  3. Run:              pdftoc book.pdf --range 7-10 --offset 15 -o out.pdf
"#;

/// Add a table of contents to scanned PDFs using Vision LLMs.
#[derive(Parser, Debug)]
#[command(
    name = "pdftoc",
    version,
    about = "Add a table of contents to scanned PDFs using Vision LLMs",
    long_about = "Recognise the printed table of contents of a scanned PDF with a Vision \
Language Model and write it back as the PDF outline. Supports OpenAI, Anthropic, Google \
Gemini, and any OpenAI-compatible endpoint (Ollama, vLLM, LiteLLM, etc.).",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file path or HTTP/HTTPS URL.
    input: String,

    /// TOC page range in the PDF, e.g. 7-10.
    #[arg(long, required_unless_present_any = ["from_txt", "inspect_only"])]
    range: Option<String>,

    /// PDF page on which the book's printed page 1 appears.
    #[arg(long, required_unless_present_any = ["from_txt", "inspect_only"])]
    offset: Option<i64>,

    /// Write the outlined PDF to this path instead of in place.
    #[arg(short, long, env = "PDFTOC_OUTPUT")]
    output: Option<PathBuf>,

    /// Overwrite the input PDF (a .pdf.bak backup is created first).
    #[arg(long, conflicts_with = "output")]
    in_place: bool,

    /// Skip writing the outline (artifacts/export only).
    #[arg(long)]
    no_write: bool,

    /// Proceed despite pre-write warnings (errors still block).
    #[arg(long)]
    force: bool,

    /// Import the TOC from a text export instead of running recognition.
    #[arg(long, value_name = "TXT_FILE")]
    from_txt: Option<PathBuf>,

    /// Also write the editable text export to this path.
    #[arg(long, value_name = "TXT_FILE")]
    export_txt: Option<PathBuf>,

    /// Keep intermediate artifacts in this directory.
    #[arg(long, env = "PDFTOC_WORK_DIR")]
    work_dir: Option<PathBuf>,

    /// LLM model ID (e.g. gpt-4.1-mini, claude-sonnet-4-20250514).
    #[arg(long, env = "PDFTOC_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama.
    #[arg(long, env = "PDFTOC_PROVIDER")]
    provider: Option<String>,

    /// Rendering DPI (72-400).
    #[arg(long, env = "PDFTOC_DPI", default_value_t = 150,
          value_parser = clap::value_parser!(u32).range(72..=400))]
    dpi: u32,

    /// Number of concurrent page pipelines.
    #[arg(short, long, env = "PDFTOC_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Process pages strictly in order.
    #[arg(long)]
    sequential: bool,

    /// Pipeline attempts per page before accepting a bad result.
    #[arg(long, env = "PDFTOC_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    /// Max LLM output tokens per call.
    #[arg(long, env = "PDFTOC_MAX_TOKENS", default_value_t = 8192)]
    max_tokens: usize,

    /// Print the PDF's existing outline and exit.
    #[arg(long)]
    inspect_only: bool,

    /// Output the merged TOC as JSON on stdout.
    #[arg(long)]
    json: bool,

    /// Disable the progress bar.
    #[arg(long, env = "PDFTOC_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDFTOC_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDFTOC_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar is the user-facing feedback; library INFO logs would
    // tear it, so they are filtered out unless --verbose.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(io::stderr)
        .init();

    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        return inspect(&cli);
    }

    // ── Text-import mode ─────────────────────────────────────────────────
    if let Some(ref txt) = cli.from_txt {
        let merged = import_toc_from_text_file(txt, Some(cli.input.as_str()), cli.offset)
            .context("Failed to import TOC from text file")?;
        if !cli.quiet {
            print_summary(&merged);
        }
        return finish(&cli, &merged);
    }

    // ── Extraction mode ──────────────────────────────────────────────────
    let range_str = cli.range.as_deref().context("--range is required")?;
    let range = PageRange::parse(range_str).context("Invalid --range")?;
    let offset = cli.offset.context("--offset is required")?;

    let progress: Option<ProgressCallback> = if show_progress {
        Some(CliProgress::new() as Arc<dyn ExtractionProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress)?;

    let output = extract_toc(&cli.input, range, offset, &config)
        .await
        .context("TOC extraction failed")?;

    if !cli.quiet {
        for (page, errors) in &output.page_errors {
            for e in errors {
                eprintln!("  {} page {page}: {e}", dim("·"));
            }
        }
        print_summary(&output.merged);
        eprintln!(
            "   artifacts in {}  {}",
            bold(&output.artifacts.work_dir.display().to_string()),
            dim(&format!(
                "(render {}ms, recognition {}ms)",
                output.stats.render_duration_ms, output.stats.recognition_duration_ms
            )),
        );
    }

    if let Some(ref txt) = cli.export_txt {
        std::fs::write(txt, pdftoc::export_toc_to_text(&output.merged))
            .with_context(|| format!("Failed to write {}", txt.display()))?;
        if !cli.quiet {
            eprintln!("{} text export written to {}", green("✔"), txt.display());
        }
    }

    finish(&cli, &output.merged)
}

/// Shared tail: report, optionally write the outline.
fn finish(cli: &Cli, merged: &MergedToc) -> Result<()> {
    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(merged).context("Failed to serialise merged TOC")?
        );
    }

    let report = validate_merged(merged);
    if !cli.quiet && !report.warnings.is_empty() {
        eprintln!("{} {} warning(s):", cyan("⚠"), report.warnings.len());
        for w in report.warnings.iter().take(5) {
            eprintln!("  - {w}");
        }
        if report.warnings.len() > 5 {
            eprintln!("  … and {} more", report.warnings.len() - 5);
        }
    }

    if cli.no_write {
        return Ok(());
    }

    let pdf_path = Path::new(&cli.input);
    let output_path = if cli.in_place {
        None
    } else {
        match cli.output {
            Some(ref p) => Some(p.as_path()),
            None => {
                anyhow::bail!(
                    "no destination: pass -o <FILE>, --in-place, or --no-write"
                );
            }
        }
    };

    let written = write_outline_safely(pdf_path, merged, output_path, cli.force)
        .context("Failed to write the outline")?;

    if !cli.quiet {
        eprintln!(
            "{} outline with {} entries written to {}",
            green("✔"),
            bold(&merged.toc.len().to_string()),
            bold(&written.display().to_string()),
        );
        if cli.in_place {
            eprintln!("   original backed up next to it as .pdf.bak");
        }
    }
    Ok(())
}

/// `--inspect-only`: print whatever outline the PDF already has.
fn inspect(cli: &Cli) -> Result<()> {
    let path = Path::new(&cli.input);
    let rows = existing_outline(path).context("Failed to read the PDF outline")?;

    if cli.json {
        let json: Vec<_> = rows
            .iter()
            .map(|r| serde_json::json!({"level": r.level, "title": r.title, "page": r.page}))
            .collect();
        println!("{}", serde_json::to_string_pretty(&json)?);
        return Ok(());
    }

    if rows.is_empty() {
        println!("No outline present.");
        return Ok(());
    }

    println!("{} outline entries:", rows.len());
    for row in rows {
        let indent = "  ".repeat((row.level.saturating_sub(1)) as usize);
        println!("{indent}{} {}", row.title, dim(&format!("(p. {})", row.page)));
    }
    Ok(())
}

/// Print the level distribution and leading entries of a merged TOC.
fn print_summary(merged: &MergedToc) {
    let report = validate_merged(merged);

    eprintln!();
    eprintln!("{}", bold(&format!("TOC: {} entries", merged.toc.len())));
    let dist: Vec<String> = report
        .level_counts
        .iter()
        .enumerate()
        .filter(|(_, &c)| c > 0)
        .map(|(i, c)| format!("L{}: {c}", i + 1))
        .collect();
    eprintln!("   levels  {}", dim(&dist.join("  ")));

    for entry in merged.toc.iter().take(5) {
        let indent = "  ".repeat((entry.level.saturating_sub(1)) as usize);
        eprintln!(
            "   {indent}{} {}",
            entry.title,
            dim(&format!("… {}", entry.page))
        );
    }
    if merged.toc.len() > 5 {
        eprintln!("   {}", dim(&format!("… {} more", merged.toc.len() - 5)));
    }
    eprintln!();
}

/// Map CLI args to `ExtractionConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ExtractionConfig> {
    let mut builder = ExtractionConfig::builder()
        .dpi(cli.dpi)
        .concurrency(cli.concurrency)
        .sequential(cli.sequential)
        .max_retries(cli.max_retries)
        .max_tokens(cli.max_tokens);

    if let Some(ref dir) = cli.work_dir {
        builder = builder.work_dir(dir);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    let mut config = builder.build().context("Invalid configuration")?;
    config.model = cli.model.clone();
    config.provider_name = cli.provider.clone();
    Ok(config)
}
