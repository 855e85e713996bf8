//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::Result;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use wisdom_client::{ApiClient, UserCredentials, authenticate};
use wisdom_core::{ExportResult, ProgressReporter, run_export};
use wisdom_shared::{
    AppConfig, ExportConfig, client_credentials, init_config, load_config, load_config_from,
};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Wisdom: export knowledge articles to CSV.
#[derive(Parser)]
#[command(
    name = "wisdom",
    version,
    about = "Export knowledge articles, their rich text and data categories to import-ready CSV.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file to use instead of ~/.wisdom/wisdom.toml.
    #[arg(long, global = true)]
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
    /// Export every article to the output directory.
    Export(ExportArgs),

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Flags of `wisdom export`.
#[derive(clap::Args)]
pub(crate) struct ExportArgs {
    /// Account username.
    #[arg(long, env = "WISDOM_USERNAME")]
    pub username: String,

    /// Account password (with security token appended, if required).
    #[arg(long, env = "WISDOM_PASSWORD", hide_env_values = true)]
    pub password: String,

    /// Maximum number of listing pages to fetch (inclusive).
    #[arg(long = "pagelimit", value_parser = clap::value_parser!(u32).range(1..))]
    pub page_limit: Option<u32>,

    /// Output directory (overrides config and DIR_ARTICLEDATA).
    #[arg(short, long)]
    pub out: Option<PathBuf>,

    /// Skip downloading images referenced from rich text.
    #[arg(long)]
    pub no_images: bool,

    /// Do not look up each article's master version record.
    #[arg(long)]
    pub no_master_record: bool,
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

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "wisdom=info",
        1 => "wisdom=debug",
        _ => "wisdom=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
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
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Command::Export(args) => cmd_export(config_path, args).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(config_path).await,
        },
    }
}

/// Load the config file and apply environment overrides.
fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    let mut config = match path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    config.apply_env_overrides();
    Ok(config)
}

/// Runtime export settings: config and environment, then flags.
fn export_config(config: &AppConfig, args: &ExportArgs) -> ExportConfig {
    let mut export = ExportConfig::from(config);
    if let Some(limit) = args.page_limit {
        export.page_limit = limit;
    }
    if let Some(out) = &args.out {
        export.output_root = out.clone();
    }
    if args.no_images {
        export.fetch_images = false;
    }
    if args.no_master_record {
        export.fetch_master_record = false;
    }
    export.tool_version = env!("CARGO_PKG_VERSION").to_string();
    export
}

async fn cmd_export(config_path: Option<&Path>, args: ExportArgs) -> Result<()> {
    let config = resolve_config(config_path)?;
    let credentials = client_credentials(&config.oauth)?;
    let export = export_config(&config, &args);

    info!(
        output = %export.output_root.display(),
        page_limit = export.page_limit,
        concurrency = export.concurrency,
        "starting export"
    );

    let reporter = Arc::new(CliProgress::new());
    reporter.phase("Authenticating");

    let user = UserCredentials {
        username: args.username,
        password: args.password,
    };
    let outcome = async {
        let token = authenticate(&config.oauth, &credentials, &user).await?;
        let client = ApiClient::from_token(&config.api, &token)?;
        run_export(&export, client, reporter.clone()).await
    }
    .await;

    let result = match outcome {
        Ok(result) => result,
        Err(e) => {
            reporter.abandon();
            return Err(e.into());
        }
    };

    let manifest = &result.manifest;
    println!();
    println!("  Export complete!");
    println!("  Types:     {}", manifest.article_types.len());
    println!("  Articles:  {} exported, {} failed", manifest.articles_exported, manifest.articles_failed);
    println!("  Groups:    {}", manifest.category_groups.len());
    println!("  Images:    {} saved, {} failed", manifest.images_saved, manifest.images_failed);
    println!("  Path:      {}", result.output_root.display());
    println!("  Time:      {:.1}s", result.elapsed.as_secs_f64());
    println!();

    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
            spinner.set_style(
                style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
            );
        }
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }

    fn abandon(&self) {
        self.spinner.abandon();
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn article_processed(&self, article_id: &str, current: usize, total: usize) {
        let percent = current * 100 / total.max(1);
        self.spinner.set_message(format!(
            "Exporting [{current}/{total}] {percent}% {article_id}"
        ));
    }

    fn done(&self, _result: &ExportResult) {
        self.spinner.finish_and_clear();
    }
}

// ---------------------------------------------------------------------------
// Config commands
// ---------------------------------------------------------------------------

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(config_path: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}
