//! CLI binary for edgequake-ingest.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `IngestConfig` and prints the resulting tree.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_ingest::{
    DocumentTree, ExportFormat, IngestConfig, IngestError, IngestProgressCallback, Ingestor,
    NodeId, NodeStatus, ProgressCallback, RenderBackendKind,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashSet;
use std::io::{self, Write};
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

/// Terminal progress: a spinner naming the node being fetched, plus one log
/// line per parsed or failed node.
struct CliProgressCallback {
    bar: ProgressBar,
    parsed: AtomicUsize,
    failed: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Fetching");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            parsed: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
        })
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
        let parsed = self.parsed.load(Ordering::SeqCst);
        let failed = self.failed.load(Ordering::SeqCst);
        if failed == 0 {
            eprintln!("{} {} documents ingested", green("✔"), bold(&parsed.to_string()));
        } else {
            eprintln!(
                "{} {} documents ingested  ({} failed)",
                if parsed == 0 { red("✘") } else { cyan("⚠") },
                bold(&parsed.to_string()),
                red(&failed.to_string()),
            );
        }
    }
}

impl IngestProgressCallback for CliProgressCallback {
    fn on_fetch_start(&self, _node: NodeId, locator: &str) {
        self.bar.set_prefix("Fetching");
        self.bar.set_message(locator.to_string());
    }

    fn on_fetch_progress(&self, _node: NodeId, locator: &str, percent: f64) {
        self.bar.set_message(format!("{locator}  {percent:.0}%"));
    }

    fn on_node_downloaded(&self, _node: NodeId, locator: &str, children: usize) {
        if children > 0 {
            self.bar.println(format!(
                "  {} {}  {}",
                cyan("▸"),
                locator,
                dim(&format!("{children} entries"))
            ));
        }
    }

    fn on_node_parsed(&self, _node: NodeId, locator: &str, sections: usize) {
        self.bar.set_prefix("Parsing");
        if sections == 0 {
            return;
        }
        self.parsed.fetch_add(1, Ordering::SeqCst);
        self.bar.println(format!(
            "  {} {}  {}",
            green("✓"),
            locator,
            dim(&format!("{sections} sections"))
        ));
    }

    fn on_node_failed(&self, _node: NodeId, locator: &str, error: &IngestError) {
        self.failed.fetch_add(1, Ordering::SeqCst);
        let msg = error.to_string();
        let msg = msg.lines().next().unwrap_or_default();
        self.bar
            .println(format!("  {} {}  {}", red("✗"), locator, red(msg)));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # A single document to stdout (Markdown where the extractor supports it)
  docingest report.docx

  # A whole folder, one output file per document
  docingest ./library -o ./out --format markdown

  # Only the folder listing, no recursion
  docingest ./library --no-recursive --json

  # A web page, article text only
  docingest https://example.com/post --format plaintext

  # No Chrome available: parse pages without running scripts
  docingest https://example.com/post --render-backend static

  # Full node tree as JSON
  docingest ./library --json > tree.json

SUPPORTED TYPES:
  Spreadsheet  xlsx xlsm xlsb xls ods csv     markdown html xml csv plaintext
  Rich text    rtf rtfd doc docx webarchive   markdown html plaintext
  PDF          pdf                            markdown html plaintext
  EPUB         epub                           markdown html plaintext
  Plain text   txt md json xml eml url code   passthrough
  HTML         html htm, remote pages         html markdown plaintext

ENVIRONMENT VARIABLES:
  DOCINGEST_FORMAT          Default export format
  DOCINGEST_RENDER_BACKEND  auto, chrome or static
  DOCINGEST_CHROME          Path to a Chrome/Chromium executable
  PDFIUM_LIB_PATH           Path to libpdfium (file or directory)
  RUST_LOG                  Override the log filter
"#;

/// Recursively ingest files, folders and web pages as clean text.
#[derive(Parser, Debug)]
#[command(
    name = "docingest",
    version,
    about = "Recursively ingest files, folders and web pages as clean text",
    long_about = "Fetch a local file, a folder tree or a URL and extract each document's text \
as Markdown, HTML, XML, CSV or plain text. Web pages go through a Readability engine \
(headless Chrome, or a static HTML scorer as fallback).",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local path, file:// URL or HTTP/HTTPS URL.
    input: String,

    /// Export format; each extractor has its own default when omitted.
    #[arg(short, long, env = "DOCINGEST_FORMAT", value_enum)]
    format: Option<FormatArg>,

    /// Do not descend into folder children.
    #[arg(long, env = "DOCINGEST_NO_RECURSIVE")]
    no_recursive: bool,

    /// Print the node tree as JSON instead of the exported content.
    #[arg(long, env = "DOCINGEST_JSON")]
    json: bool,

    /// Write one file per parsed document into this directory.
    #[arg(short, long, env = "DOCINGEST_OUTPUT")]
    output: Option<PathBuf>,

    /// HTTP fetch timeout in seconds.
    #[arg(long, env = "DOCINGEST_FETCH_TIMEOUT", default_value_t = 30)]
    fetch_timeout: u64,

    /// Page render timeout in seconds.
    #[arg(long, env = "DOCINGEST_RENDER_TIMEOUT", default_value_t = 30)]
    render_timeout: u64,

    /// Render backend for web pages: auto, chrome, static.
    #[arg(long, env = "DOCINGEST_RENDER_BACKEND", value_enum, default_value = "auto")]
    render_backend: BackendArg,

    /// Chrome/Chromium executable for the chrome backend.
    #[arg(long, env = "DOCINGEST_CHROME")]
    chrome: Option<PathBuf>,

    /// pdfium shared library (file or directory).
    #[arg(long, env = "DOCINGEST_PDFIUM_LIB")]
    pdfium_lib: Option<PathBuf>,

    /// Include dot-files when listing folders.
    #[arg(long, env = "DOCINGEST_INCLUDE_HIDDEN")]
    include_hidden: bool,

    /// Disable progress display.
    #[arg(long, env = "DOCINGEST_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "DOCINGEST_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "DOCINGEST_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum FormatArg {
    #[value(alias = "text", alias = "txt")]
    Plaintext,
    Html,
    Xml,
    #[value(alias = "md")]
    Markdown,
    Csv,
}

impl From<FormatArg> for ExportFormat {
    fn from(v: FormatArg) -> Self {
        match v {
            FormatArg::Plaintext => ExportFormat::PlainText,
            FormatArg::Html => ExportFormat::Html,
            FormatArg::Xml => ExportFormat::Xml,
            FormatArg::Markdown => ExportFormat::Markdown,
            FormatArg::Csv => ExportFormat::Csv,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum BackendArg {
    Auto,
    Chrome,
    Static,
}

impl From<BackendArg> for RenderBackendKind {
    fn from(v: BackendArg) -> Self {
        match v {
            BackendArg::Auto => RenderBackendKind::Auto,
            BackendArg::Chrome => RenderBackendKind::Chrome,
            BackendArg::Static => RenderBackendKind::Static,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress display replaces INFO-level library logs.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
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

    // ── Build config ─────────────────────────────────────────────────────
    let progress = show_progress.then(CliProgressCallback::new);
    let config = build_config(
        &cli,
        progress
            .clone()
            .map(|cb| cb as Arc<dyn IngestProgressCallback>),
    )?;

    // ── Run ingestion ────────────────────────────────────────────────────
    let ingestor = Ingestor::new(config).context("Failed to start ingestion")?;
    let tree = ingestor
        .ingest(&cli.input, cli.format.map(Into::into))
        .await
        .context("Ingestion failed")?;

    if let Some(cb) = &progress {
        cb.finish();
    }

    let Some(&root) = tree.roots().first() else {
        anyhow::bail!("Ingestion produced no root node");
    };

    if cli.json {
        let json = serde_json::to_string_pretty(&tree.report(root))
            .context("Failed to serialise node tree")?;
        println!("{json}");
    } else if let Some(ref dir) = cli.output {
        let format = cli.format.map(ExportFormat::from);
        let written = write_outputs(&tree, root, dir, format)?;
        if !cli.quiet {
            eprintln!(
                "{}  {} files  →  {}",
                green("✔"),
                written,
                bold(&dir.display().to_string())
            );
        }
    } else {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        for id in tree.walk(root) {
            let node = tree.node(id);
            if node.status() != &NodeStatus::Parsed || node.exported_content().is_empty() {
                continue;
            }
            let text = node.exported_content().join("\n\n");
            handle
                .write_all(text.as_bytes())
                .context("Failed to write to stdout")?;
            if !text.ends_with('\n') {
                handle.write_all(b"\n").ok();
            }
        }
    }

    let failures = tree
        .walk(root)
        .into_iter()
        .filter(|id| matches!(tree.node(*id).status(), NodeStatus::Failed(_)))
        .count();
    if !cli.quiet && !show_progress && failures > 0 {
        eprintln!("  {} documents failed", failures);
    }

    Ok(())
}

/// Map CLI args to `IngestConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<IngestConfig> {
    let mut builder = IngestConfig::builder()
        .fetch_timeout_secs(cli.fetch_timeout)
        .render_timeout_secs(cli.render_timeout)
        .recursive(!cli.no_recursive)
        .include_hidden(cli.include_hidden)
        .render_backend(cli.render_backend.into());

    if let Some(format) = cli.format {
        builder = builder.default_format(format.into());
    }
    if let Some(ref chrome) = cli.chrome {
        builder = builder.chrome_path(chrome);
    }
    if let Some(ref lib) = cli.pdfium_lib {
        builder = builder.pdfium_lib_path(lib);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Write every parsed document under `dir`; returns the number of files.
fn write_outputs(
    tree: &DocumentTree,
    root: NodeId,
    dir: &Path,
    format: Option<ExportFormat>,
) -> Result<usize> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory {}", dir.display()))?;

    let mut used = HashSet::new();
    let mut written = 0;
    for id in tree.walk(root) {
        let node = tree.node(id);
        if node.status() != &NodeStatus::Parsed || node.exported_content().is_empty() {
            continue;
        }
        let ext = format.map(ExportFormat::extension).unwrap_or("txt");
        let name = output_name(node.filename(), ext, &mut used);
        let path = dir.join(name);
        std::fs::write(&path, node.exported_content().join("\n\n"))
            .with_context(|| format!("Failed to write {}", path.display()))?;
        written += 1;
    }
    Ok(written)
}

/// `report.docx` → `report.md`, suffixed `-2`, `-3`… on collisions.
fn output_name(filename: &str, ext: &str, used: &mut HashSet<String>) -> String {
    let stem = Path::new(filename)
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("document");
    let stem: String = stem
        .chars()
        .map(|c| if c == '/' || c == '\\' || c == ':' { '_' } else { c })
        .collect();

    let mut candidate = format!("{stem}.{ext}");
    let mut n = 2;
    while !used.insert(candidate.clone()) {
        candidate = format!("{stem}-{n}.{ext}");
        n += 1;
    }
    candidate
}
