//! CLI binary for ocr-polish.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `RefineConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use ocr_polish::{
    normalize, refine, refine_to_file, CostGatePolicy, NormalizeOptions, ParagraphSplitStage,
    ProgressCallback, ProgressSnapshot, RefineConfig, RefineProgressCallback,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
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

/// Terminal progress callback: renders a live progress bar and per-chunk log
/// lines using [indicatif]. Works correctly when chunks within a batch
/// complete out-of-order.
struct CliProgressCallback {
    /// The single progress bar anchored at the bottom of the terminal.
    bar: ProgressBar,
    /// Per-chunk wall-clock start times for elapsed reporting.
    start_times: Mutex<HashMap<usize, Instant>>,
    /// Count of chunks that fell back to their original text.
    fallbacks: AtomicUsize,
}

impl CliProgressCallback {
    /// Create a callback whose progress-bar length is set dynamically
    /// by `on_run_start` (called before any chunks are dispatched).
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0); // length set in on_run_start

        // Initial style: spinner only (no counter until we know the total).
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Reading input…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            fallbacks: AtomicUsize::new(0),
        })
    }

    /// Switch to the full progress-bar style once we know `total`.
    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} chunks  \
             ⏱ {elapsed_precise}  ETA {eta_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Refining");
        self.bar.reset_eta();
    }
}

impl RefineProgressCallback for CliProgressCallback {
    fn on_run_start(&self, total_chunks: usize, projected_cost: f64) {
        self.activate_bar(total_chunks);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!(
                "Refining {total_chunks} chunks (projected ~${projected_cost:.4})…"
            ))
        ));
    }

    fn on_chunk_start(&self, chunk_index: usize, _total: usize) {
        self.start_times
            .lock()
            .unwrap()
            .insert(chunk_index, Instant::now());
    }

    fn on_chunk_complete(&self, chunk_index: usize, total: usize, refined_len: usize) {
        let elapsed_ms = self
            .start_times
            .lock()
            .unwrap()
            .remove(&chunk_index)
            .map(|t| t.elapsed().as_millis())
            .unwrap_or(0);

        self.bar.println(format!(
            "  {} Chunk {:>3}/{:<3}  {:<8}  {}",
            green("✓"),
            chunk_index + 1,
            total,
            dim(&format!("{refined_len:>5} chars")),
            dim(&format!("{:.1}s", elapsed_ms as f64 / 1000.0)),
        ));
        self.bar.inc(1);
    }

    fn on_chunk_fallback(&self, chunk_index: usize, total: usize, error: &str) {
        let elapsed_ms = self
            .start_times
            .lock()
            .unwrap()
            .remove(&chunk_index)
            .map(|t| t.elapsed().as_millis())
            .unwrap_or(0);

        self.fallbacks.fetch_add(1, Ordering::SeqCst);

        // Truncate very long error messages to keep output tidy.
        let msg = if error.chars().count() > 80 {
            let head: String = error.chars().take(79).collect();
            format!("{head}\u{2026}")
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} Chunk {:>3}/{:<3}  {}  {}",
            red("✗"),
            chunk_index + 1,
            total,
            red(&msg),
            dim(&format!("{:.1}s", elapsed_ms as f64 / 1000.0)),
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, snapshot: &ProgressSnapshot) {
        self.bar.set_message(format!(
            "${:.4} (→ ~${:.4})",
            snapshot.cost_so_far, snapshot.projected_total_cost
        ));
    }

    fn on_run_complete(&self, total_chunks: usize, refined_count: usize) {
        let fallback = total_chunks.saturating_sub(refined_count);
        self.bar.finish_and_clear();

        if fallback == 0 {
            eprintln!(
                "{} {} chunks refined successfully",
                green("✔"),
                bold(&refined_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} chunks refined  ({} kept original text)",
                if refined_count == 0 { red("✘") } else { cyan("⚠") },
                bold(&refined_count.to_string()),
                total_chunks,
                red(&fallback.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Basic refinement (stdout)
  ocrpolish scan.txt

  # Refine to file
  ocrpolish scan.txt -o clean.txt

  # Deterministic cleanup only, no API key needed
  ocrpolish --normalize-only scan.txt

  # Use a specific model
  ocrpolish --model claude-3-5-haiku-20241022 --provider anthropic scan.txt

  # Refine from URL
  ocrpolish https://example.org/ocr-dump.txt -o clean.txt

  # Larger chunks, more parallelism
  ocrpolish --chunk-tokens 3000 -c 10 book.txt -o book-clean.txt

  # Proceed past the cost ceiling without aborting
  ocrpolish --cost-ceiling 25.0 --yes book.txt -o book-clean.txt

  # JSON output with per-chunk outcomes and stats
  ocrpolish --json scan.txt > run.json

SUPPORTED PROVIDERS & MODELS:
  Provider     Model                      Input $/1K  Output $/1K
  ─────────    ─────────────────────────  ──────────  ───────────
  openai       gpt-4.1 (default)          $0.002      $0.008
  openai       gpt-4o                     $0.005      $0.015
  anthropic    claude-sonnet-4-20250514   $0.003      $0.015
  anthropic    claude-3-5-haiku-20241022  $0.0008     $0.004
  ollama       llama3.2, mistral          free        free

COST ESTIMATE (100-page scanned book, ~150K input tokens):
  gpt-4.1:                   ~$0.90 total
  claude-3-5-haiku-20241022: ~$0.42 total
  claude-sonnet-4-20250514:  ~$1.58 total

  The projection is printed before any call is made; runs over the
  --cost-ceiling abort unless --yes is given.

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, ollama)
  EDGEQUAKE_MODEL         Override model ID

SETUP:
  1. Set API key:     export OPENAI_API_KEY=sk-...
  2. Refine:          ocrpolish scan.txt -o clean.txt
"#;

/// Refine noisy OCR text files using LLM proof-reading.
#[derive(Parser, Debug)]
#[command(
    name = "ocrpolish",
    version,
    about = "Refine noisy OCR text into clean prose using LLM proof-reading",
    long_about = "Clean up OCR text dumps (local files or URLs): deterministic repair of line \
breaks, page artifacts, and character confusions, followed by chunked LLM proof-reading with \
cost control. Supports OpenAI, Anthropic, and any OpenAI-compatible endpoint (Ollama, vLLM, \
LiteLLM, etc.).",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local text file path or HTTP/HTTPS URL.
    input: String,

    /// Write refined text to this file instead of stdout.
    #[arg(short, long, env = "OCRPOLISH_OUTPUT")]
    output: Option<PathBuf>,

    /// Also write the normalized (pre-correction) text to this file.
    #[arg(long, env = "OCRPOLISH_NORMALIZED_OUT")]
    normalized_out: Option<PathBuf>,

    /// LLM model ID (e.g. gpt-4.1, claude-3-5-haiku-20241022).
    #[arg(
        long,
        env = "EDGEQUAKE_MODEL",
        long_help = "Correction model to use. Default: gpt-4.1 ($0.002/$0.008 per 1K tokens).\n\
          Cheaper: claude-3-5-haiku-20241022 ($0.0008/$0.004). \
          Heavier scans: claude-sonnet-4-20250514 ($0.003/$0.015)."
    )]
    model: Option<String>,

    /// LLM provider: openai, anthropic, ollama, azure.
    #[arg(
        long,
        env = "EDGEQUAKE_PROVIDER",
        long_help = "LLM provider. Auto-detected from API key env vars if not set.\n\
          Supported: openai, anthropic, azure, ollama, or any OpenAI-compatible URL."
    )]
    provider: Option<String>,

    /// Token budget per chunk.
    #[arg(long, env = "OCRPOLISH_CHUNK_TOKENS", default_value_t = 2500)]
    chunk_tokens: usize,

    /// Number of concurrent correction calls per batch.
    #[arg(short, long, env = "OCRPOLISH_CONCURRENCY", default_value_t = 5)]
    concurrency: usize,

    /// Max LLM output tokens per chunk.
    #[arg(long, env = "OCRPOLISH_MAX_OUTPUT_TOKENS", default_value_t = 4000)]
    max_output_tokens: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "OCRPOLISH_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Total correction attempts per chunk.
    #[arg(long, env = "OCRPOLISH_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    /// Per-chunk correction timeout in seconds (covers retries).
    #[arg(long, env = "OCRPOLISH_TIMEOUT", default_value_t = 180)]
    timeout: u64,

    /// Pre-flight cost ceiling in dollars.
    #[arg(long, env = "OCRPOLISH_COST_CEILING", default_value_t = 10.0)]
    cost_ceiling: f64,

    /// Proceed even when the projected cost exceeds the ceiling.
    #[arg(short = 'y', long, env = "OCRPOLISH_YES")]
    yes: bool,

    /// Disable the character-confusion fixes (l/1, o/0) during cleanup.
    #[arg(long, env = "OCRPOLISH_NO_CONFUSABLES")]
    no_confusables: bool,

    /// When to split oversized paragraphs: normalize, assembly, off.
    #[arg(long, env = "OCRPOLISH_PARAGRAPH_SPLIT", value_enum, default_value = "normalize")]
    paragraph_split: ParagraphSplitArg,

    /// Sentence ceiling for the paragraph split.
    #[arg(long, env = "OCRPOLISH_MAX_SENTENCES", default_value_t = 8)]
    max_sentences: usize,

    /// Path to a text file containing a custom system prompt.
    #[arg(long, env = "OCRPOLISH_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Run the deterministic cleanup only; no LLM, no API key needed.
    #[arg(long)]
    normalize_only: bool,

    /// Output structured JSON (RefineOutput) instead of plain text.
    #[arg(long, env = "OCRPOLISH_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "OCRPOLISH_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "OCRPOLISH_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "OCRPOLISH_QUIET")]
    quiet: bool,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "OCRPOLISH_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum ParagraphSplitArg {
    Normalize,
    Assembly,
    Off,
}

impl From<ParagraphSplitArg> for ParagraphSplitStage {
    fn from(v: ParagraphSplitArg) -> Self {
        match v {
            ParagraphSplitArg::Normalize => ParagraphSplitStage::Normalize,
            ParagraphSplitArg::Assembly => ParagraphSplitStage::Assembly,
            ParagraphSplitArg::Off => ParagraphSplitStage::Off,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active;
    // the bar provides all the feedback that matters to the user.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.normalize_only;
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

    // ── Normalize-only mode ──────────────────────────────────────────────
    if cli.normalize_only {
        let raw = ocr_polish::pipeline::input::resolve_input(&cli.input, cli.download_timeout)
            .await
            .context("Failed to read input")?;
        let cleaned = normalize(&raw, &normalize_options(&cli));

        if let Some(ref output_path) = cli.output {
            tokio::fs::write(output_path, &cleaned)
                .await
                .with_context(|| format!("Failed to write {}", output_path.display()))?;
            if !cli.quiet {
                eprintln!("{} normalized → {}", green("✔"), bold(&output_path.display().to_string()));
            }
        } else {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            handle
                .write_all(cleaned.as_bytes())
                .context("Failed to write to stdout")?;
        }
        return Ok(());
    }

    // ── Build config ─────────────────────────────────────────────────────
    // The progress bar is initialised with a spinner (no chunk count yet);
    // `on_run_start` resizes it to the correct total once segmentation has
    // run. `show_progress` was already computed above.

    let progress_cb: Option<ProgressCallback> = if show_progress {
        let cb = CliProgressCallback::new_dynamic();
        Some(cb as Arc<dyn RefineProgressCallback>)
    } else {
        None
    };

    let config = build_config(&cli, progress_cb).await?;

    // ── Run refinement ───────────────────────────────────────────────────
    if let Some(ref output_path) = cli.output {
        let stats = refine_to_file(&cli.input, output_path, &config)
            .await
            .context("Refinement failed")?;

        // Summary line (callback already printed the per-chunk log).
        if !cli.quiet {
            eprintln!(
                "{}  {}/{} chunks  ${:.4}  {}ms  →  {}",
                if stats.fallback_chunks == 0 { green("✔") } else { cyan("⚠") },
                stats.refined_chunks,
                stats.total_chunks,
                stats.total_cost,
                stats.total_duration_ms,
                bold(&output_path.display().to_string()),
            );
            eprintln!(
                "   {} tokens in  /  {} tokens out",
                dim(&stats.total_input_tokens.to_string()),
                dim(&stats.total_output_tokens.to_string()),
            );
        }
    } else {
        let output = refine(&cli.input, &config)
            .await
            .context("Refinement failed")?;

        if let Some(ref normalized_path) = cli.normalized_out {
            tokio::fs::write(normalized_path, &output.normalized)
                .await
                .with_context(|| format!("Failed to write {}", normalized_path.display()))?;
        }

        if cli.json {
            let json =
                serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
            println!("{json}");
        } else {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            handle
                .write_all(output.text.as_bytes())
                .context("Failed to write to stdout")?;
            // Ensure a trailing newline on stdout.
            if !output.text.ends_with('\n') {
                handle.write_all(b"\n").ok();
            }
        }

        // Summary (the callback already printed the final green/red tick).
        if !cli.quiet && !show_progress {
            // Only print inline stats when the progress callback is disabled.
            eprintln!(
                "Refined {}/{} chunks in {}ms (${:.4})",
                output.stats.refined_chunks,
                output.stats.total_chunks,
                output.stats.total_duration_ms,
                output.stats.total_cost,
            );
            if output.stats.fallback_chunks > 0 {
                eprintln!("  {} chunks kept their original text", output.stats.fallback_chunks);
            }
        } else if !cli.quiet && !cli.json {
            eprintln!(
                "   {} tokens in  /  {} tokens out  —  ${:.4}, {}ms total",
                dim(&output.stats.total_input_tokens.to_string()),
                dim(&output.stats.total_output_tokens.to_string()),
                output.stats.total_cost,
                output.stats.total_duration_ms,
            );
        }
    }

    Ok(())
}

/// Map CLI args to `RefineConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<RefineConfig> {
    let system_prompt = if let Some(ref path) = cli.system_prompt {
        Some(
            tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read system prompt from {:?}", path))?,
        )
    } else {
        None
    };

    let cost_gate = if cli.yes {
        CostGatePolicy::Proceed
    } else {
        CostGatePolicy::RequireExplicitProceed
    };

    let mut builder = RefineConfig::builder()
        .max_tokens_per_chunk(cli.chunk_tokens)
        .concurrency(cli.concurrency)
        .max_output_tokens(cli.max_output_tokens)
        .temperature(cli.temperature)
        .max_retries(cli.max_retries)
        .chunk_timeout_secs(cli.timeout)
        .cost_ceiling(cli.cost_ceiling)
        .cost_gate(cost_gate)
        .normalize(normalize_options(cli))
        .paragraph_split(cli.paragraph_split.clone().into())
        .download_timeout_secs(cli.download_timeout);

    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(prompt) = system_prompt {
        builder = builder.system_prompt(prompt);
    }

    builder.build().context("Invalid configuration")
}

/// Map CLI flags to `NormalizeOptions`.
fn normalize_options(cli: &Cli) -> NormalizeOptions {
    NormalizeOptions {
        ocr_confusables: !cli.no_confusables,
        max_sentences_per_paragraph: cli.max_sentences,
        ..NormalizeOptions::default()
    }
}
