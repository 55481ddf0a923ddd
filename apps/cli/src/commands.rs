//! CLI command definitions, routing, and tracing setup.

use std::io::{Read, Write};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use blockctx_core::assembler::{self, load_dictionary};
use blockctx_core::pipeline::{self, CompileResult, OutputConfig, ProgressReporter};
use blockctx_core::prompt::{PromptTemplate, wrap_generated_xml};
use blockctx_core::tabular;
use blockctx_core::training::{TrainingBuilder, write_jsonl};
use blockctx_retrieval::ContextRetriever;
use blockctx_shared::{
    AppConfig, CatalogConfig, init_config, load_config, load_config_from, to_json_indented,
};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// blockctx: library block dictionaries and context selection.
#[derive(Parser)]
#[command(
    name = "blockctx",
    version,
    about = "Compile block catalogs into a dictionary and select context for test steps.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file (defaults to ~/.blockctx/blockctx.toml).
    #[arg(long, global = true, env = "BLOCKCTX_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Flatten a catalog into reference records (CSV, or JSON for a .json output).
    Extract {
        /// Catalog XML file.
        catalog: PathBuf,

        /// Output file; CSV on stdout when omitted.
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Keep only references whose folder path contains this text.
        #[arg(long)]
        folder: Option<String>,
    },

    /// Compile dictionary-input CSV into a dictionary.
    Compile {
        /// CSV with library_name, ref_type, ref_name, ref_id, data-objects.
        input: PathBuf,

        /// Dictionary JSON to write.
        #[arg(short, long, default_value = "dictionary.json")]
        out: PathBuf,
    },

    /// Extract a catalog and compile it straight into a dictionary.
    Build {
        /// Catalog XML file.
        catalog: PathBuf,

        /// Dictionary JSON to write.
        #[arg(short, long, default_value = "dictionary.json")]
        out: PathBuf,

        /// Also write the extracted references to this CSV.
        #[arg(long)]
        references: Option<PathBuf>,

        /// Keep only references whose folder path contains this text.
        #[arg(long)]
        folder: Option<String>,
    },

    /// Print the dictionary snippets selected for a request, as JSON.
    Select {
        /// Dictionary JSON file.
        #[arg(short, long)]
        dictionary: PathBuf,

        #[command(flatten)]
        request: RequestArgs,

        /// Maximum number of snippets (defaults to retrieval.budget).
        #[arg(short, long)]
        budget: Option<NonZeroUsize>,
    },

    /// Print the full generator prompt for a request.
    Prompt {
        /// Dictionary JSON file.
        #[arg(short, long)]
        dictionary: PathBuf,

        #[command(flatten)]
        request: RequestArgs,

        /// Maximum number of snippets (defaults to retrieval.budget).
        #[arg(short, long)]
        budget: Option<NonZeroUsize>,
    },

    /// Wrap generated operation blocks into a complete sequence document.
    Wrap {
        /// Generated XML; stdin when omitted.
        input: Option<PathBuf>,

        /// Output file; stdout when omitted.
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Build fine-tuning JSONL from test cases and their target files.
    Training {
        /// Test-case CSV.
        #[arg(long)]
        cases: PathBuf,

        /// Folder holding target files named after test case titles.
        #[arg(long)]
        targets: PathBuf,

        /// Dictionary JSON file.
        #[arg(short, long)]
        dictionary: PathBuf,

        /// JSONL file to write.
        #[arg(short, long, default_value = "training.jsonl")]
        out: PathBuf,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Where the natural-language request comes from.
#[derive(clap::Args)]
pub(crate) struct RequestArgs {
    /// Request text; read from --file or stdin when omitted.
    pub text: Option<String>,

    /// Read the request from a file.
    #[arg(short, long, conflicts_with = "text")]
    pub file: Option<PathBuf>,
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags. Logs go to stderr; stdout carries output.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "blockctx=info",
        1 => "blockctx=debug",
        _ => "blockctx=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();
    let config = || resolve_config(config_path);

    match cli.command {
        Command::Extract {
            catalog,
            out,
            folder,
        } => cmd_extract(&config()?, &catalog, out.as_deref(), folder),
        Command::Compile { input, out } => cmd_compile(&config()?, &input, out),
        Command::Build {
            catalog,
            out,
            references,
            folder,
        } => cmd_build(&config()?, &catalog, out, references.as_deref(), folder),
        Command::Select {
            dictionary,
            request,
            budget,
        } => cmd_select(&config()?, &dictionary, &request, budget),
        Command::Prompt {
            dictionary,
            request,
            budget,
        } => cmd_prompt(&config()?, &dictionary, &request, budget),
        Command::Wrap { input, out } => cmd_wrap(input.as_deref(), out.as_deref()),
        Command::Training {
            cases,
            targets,
            dictionary,
            out,
        } => cmd_training(&config()?, &cases, &targets, &dictionary, &out),
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(&config()?),
        },
    }
}

fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    Ok(config)
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }

    fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn reference_read(&self, name: &str, current: usize) {
        self.spinner
            .set_message(format!("Reading catalog [{current}] {name}"));
    }

    fn done(&self, _summary: &str) {
        self.spinner.finish_and_clear();
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

fn with_folder(config: &AppConfig, folder: Option<String>) -> CatalogConfig {
    let mut catalog = config.catalog.clone();
    if folder.is_some() {
        catalog.folder_filter = folder;
    }
    catalog
}

fn output_config(path: PathBuf) -> OutputConfig {
    OutputConfig {
        path,
        tool_version: env!("CARGO_PKG_VERSION").to_string(),
    }
}

fn cmd_extract(
    config: &AppConfig,
    catalog: &Path,
    out: Option<&Path>,
    folder: Option<String>,
) -> Result<()> {
    let catalog_config = with_folder(config, folder);
    let reporter = CliProgress::new();
    let result = pipeline::extract_catalog(catalog, &catalog_config, &reporter);
    reporter.finish();
    let result = result?;

    match out {
        Some(path) => {
            pipeline::write_references(path, &result.entries)?;
            println!();
            println!("  References extracted!");
            println!("  Library: {}", result.summary.library_name);
            println!("  Total:   {}", result.summary.total);
            println!("  Folders: {}", result.summary.unique_folders);
            println!("  Path:    {}", path.display());
            println!("  Time:    {:.2}s", result.elapsed.as_secs_f64());
            println!();
        }
        None => {
            tabular::write_references_csv(std::io::stdout().lock(), &result.entries)?;
        }
    }
    Ok(())
}

fn cmd_compile(config: &AppConfig, input: &Path, out: PathBuf) -> Result<()> {
    let reporter = CliProgress::new();
    let result = pipeline::compile_dictionary(
        input,
        &config.compile,
        &output_config(out),
        &reporter,
    );
    reporter.finish();
    print_compile_result(&result?);
    Ok(())
}

fn cmd_build(
    config: &AppConfig,
    catalog: &Path,
    out: PathBuf,
    references: Option<&Path>,
    folder: Option<String>,
) -> Result<()> {
    let catalog_config = with_folder(config, folder);
    let reporter = CliProgress::new();
    let result = pipeline::build_dictionary(
        catalog,
        &catalog_config,
        &config.compile,
        &output_config(out),
        references,
        &reporter,
    );
    reporter.finish();
    print_compile_result(&result?);
    Ok(())
}

fn print_compile_result(result: &CompileResult) {
    for failure in &result.failures {
        warn!(%failure, "record skipped");
    }
    println!();
    println!("  Dictionary compiled!");
    println!("  Entries:  {}", result.compiled);
    println!("  Skipped:  {} blank, {} failed", result.skipped_blank, result.failures.len());
    println!("  SHA-256:  {}", result.written.manifest.sha256);
    println!("  Path:     {}", result.written.path.display());
    println!("  Manifest: {}", result.written.manifest_path.display());
    println!("  Time:     {:.2}s", result.elapsed.as_secs_f64());
    println!();
}

fn read_request(request: &RequestArgs) -> Result<String> {
    if let Some(text) = &request.text {
        return Ok(text.clone());
    }
    if let Some(path) = &request.file {
        return std::fs::read_to_string(path)
            .wrap_err_with(|| format!("failed to read request from {}", path.display()));
    }
    let mut text = String::new();
    std::io::stdin()
        .read_to_string(&mut text)
        .wrap_err("failed to read request from stdin")?;
    if text.trim().is_empty() {
        return Err(eyre!("no request given: pass text, --file, or pipe it on stdin"));
    }
    Ok(text)
}

fn cmd_select(
    config: &AppConfig,
    dictionary: &Path,
    request: &RequestArgs,
    budget: Option<NonZeroUsize>,
) -> Result<()> {
    let retriever = ContextRetriever::new(&config.retrieval)?;
    let dictionary = load_dictionary(dictionary)?;
    let text = read_request(request)?;

    let selection = retriever.select(&dictionary, &text, budget);
    info!(
        selected = selection.len(),
        fallback = selection.is_fallback(),
        "context selected"
    );
    println!("{}", to_json_indented(&selection.snippets)?);
    Ok(())
}

fn cmd_prompt(
    config: &AppConfig,
    dictionary: &Path,
    request: &RequestArgs,
    budget: Option<NonZeroUsize>,
) -> Result<()> {
    let retriever = ContextRetriever::new(&config.retrieval)?;
    let dictionary = load_dictionary(dictionary)?;
    let text = read_request(request)?;

    let context = retriever.select_context(&dictionary, &text, budget);
    let prompt = PromptTemplate::new(&config.prompt).render(&context, &text)?;
    print!("{prompt}");
    Ok(())
}

fn cmd_wrap(input: Option<&Path>, out: Option<&Path>) -> Result<()> {
    let generated = match input {
        Some(path) => std::fs::read_to_string(path)
            .wrap_err_with(|| format!("failed to read {}", path.display()))?,
        None => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .wrap_err("failed to read generated XML from stdin")?;
            text
        }
    };

    let document = wrap_generated_xml(&generated);
    match out {
        Some(path) => {
            assembler::write_atomic(path, document.as_bytes())?;
            info!(path = %path.display(), "wrote sequence document");
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            writeln!(stdout, "{document}")?;
        }
    }
    Ok(())
}

fn cmd_training(
    config: &AppConfig,
    cases: &Path,
    targets: &Path,
    dictionary: &Path,
    out: &Path,
) -> Result<()> {
    let retriever = ContextRetriever::new(&config.retrieval)?;
    let template = PromptTemplate::new(&config.prompt);
    let dictionary = load_dictionary(dictionary)?;
    let rows = tabular::read_test_cases_path(cases)?;

    let builder = TrainingBuilder {
        dictionary: &dictionary,
        retriever: &retriever,
        template: &template,
        targets_dir: targets,
    };
    let report = builder.build(&rows)?;

    let mut buf = Vec::new();
    write_jsonl(&mut buf, &report.examples)?;
    assembler::write_atomic(out, &buf)?;

    println!();
    println!("  Training data written!");
    println!("  Examples: {}", report.examples.len());
    println!("  Untitled: {}", report.untitled);
    println!("  Missing:  {}", report.missing_targets.len());
    println!("  Path:     {}", out.display());
    println!();
    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(config: &AppConfig) -> Result<()> {
    let toml_str = toml::to_string_pretty(config)?;
    println!("{toml_str}");
    Ok(())
}
