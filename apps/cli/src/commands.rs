//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::Result;
use dailypapers_arxiv::{ArxivClient, ArxivOptions};
use dailypapers_core::MetadataReporter;
use dailypapers_core::digest::plan_records;
use dailypapers_core::pipeline::{
    DailyOutcome, DailyStatus, PlanOutcome, ProgressReporter, build_plan, collect_options,
    resolve_target_date, run_daily,
};
use dailypapers_shared::{
    AppConfig, DigestError, RunConfig, init_config, load_config, load_config_from, render_token,
};
use dailypapers_source::{HeadlessTransport, RankedSource, StaticTransport};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use crate::transport::ListingTransport;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// dailypapers: ranked daily papers, filtered by what you care about.
#[derive(Parser)]
#[command(
    name = "dailypapers",
    version,
    about = "Collect a day's ranked paper listing, match it against your interests, and write a digest.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file (defaults to ~/.dailypapers/dailypapers.toml).
    #[arg(long, global = true, env = "DAILYPAPERS_CONFIG")]
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
    /// Run the full daily job and write the digest.
    Run(RunArgs),

    /// Collect and print the ranked listing.
    Collect {
        #[command(flatten)]
        args: RunArgs,

        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Collect, hydrate, score and print the processing plan.
    Plan {
        #[command(flatten)]
        args: RunArgs,

        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Flags shared by the collection commands. Each overrides the config file.
#[derive(Args, Clone, Debug, Default)]
pub(crate) struct RunArgs {
    /// Target date (YYYY-MM-DD). Defaults to yesterday at the configured UTC offset.
    #[arg(short, long)]
    pub date: Option<String>,

    /// Category to collect (e.g. cs.CL).
    #[arg(short, long)]
    pub category: Option<String>,

    /// Comma-separated interest phrases.
    #[arg(short, long)]
    pub interests: Option<String>,

    /// Number of top-ranked papers that get a detailed report.
    #[arg(long)]
    pub top_n: Option<usize>,

    /// Browserless-compatible render endpoint.
    #[arg(long, env = "DAILYPAPERS_RENDER_ENDPOINT")]
    pub render_endpoint: Option<String>,

    /// Digest output root.
    #[arg(short, long)]
    pub out: Option<PathBuf>,
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
        0 => "dailypapers=info",
        1 => "dailypapers=debug",
        _ => "dailypapers=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    // stdout carries command output (tables, JSON)
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
    let config_path = cli.config;
    match cli.command {
        Command::Run(args) => cmd_run(config_path, &args).await,
        Command::Collect { args, json } => cmd_collect(config_path, &args, json).await,
        Command::Plan { args, json } => cmd_plan(config_path, &args, json).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(config_path).await,
        },
    }
}

// ---------------------------------------------------------------------------
// Settings resolution
// ---------------------------------------------------------------------------

/// Everything a collection command needs, resolved from file + flags.
struct Settings {
    app: AppConfig,
    run: RunConfig,
    date: NaiveDate,
}

fn load_app_config(path: Option<PathBuf>) -> Result<AppConfig> {
    let config = match path {
        Some(path) => load_config_from(&path)?,
        None => load_config()?,
    };
    Ok(config)
}

fn apply_overrides(app: &mut AppConfig, args: &RunArgs) {
    if let Some(category) = &args.category {
        app.source.category = category.clone();
    }
    if let Some(interests) = &args.interests {
        app.interests.topics = interests.clone();
    }
    if let Some(top_n) = args.top_n {
        app.plan.top_n = top_n;
    }
    if let Some(endpoint) = &args.render_endpoint {
        app.source.render_endpoint = Some(endpoint.clone());
    }
    if let Some(out) = &args.out {
        app.report.output_dir = out.to_string_lossy().into_owned();
    }
}

fn resolve_settings(path: Option<PathBuf>, args: &RunArgs) -> Result<Settings> {
    let mut app = load_app_config(path)?;
    apply_overrides(&mut app, args);

    let run = RunConfig::from(&app);
    run.validate()?;

    let date = resolve_target_date(args.date.as_deref(), app.schedule.utc_offset_hours)?;

    Ok(Settings { app, run, date })
}

fn listing_source(settings: &Settings) -> Result<RankedSource<ListingTransport>> {
    let transport = match &settings.app.source.render_endpoint {
        Some(endpoint) => ListingTransport::Headless(
            HeadlessTransport::new(endpoint, render_token(&settings.app))?
                .with_settle(settings.run.settle_delay)
                .with_ready_wait(settings.run.render_timeout),
        ),
        None => ListingTransport::Static(StaticTransport::new()?),
    };

    info!(
        transport = transport.describe(),
        base_url = %settings.run.base_url,
        "listing transport ready"
    );

    Ok(RankedSource::new(
        transport,
        &settings.run.base_url,
        collect_options(&settings.run),
    )?)
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_run(config_path: Option<PathBuf>, args: &RunArgs) -> Result<()> {
    let settings = resolve_settings(config_path, args)?;
    let mut source = listing_source(&settings)?;
    let hydrator = ArxivClient::new(ArxivOptions::default())?;

    info!(
        date = %settings.date,
        category = %settings.run.category,
        interests = ?settings.run.interests,
        top_n = settings.run.top_n,
        "running daily digest"
    );

    let progress = CliProgress::new();
    let outcome = run_daily(
        &settings.run,
        &mut source,
        &hydrator,
        Arc::new(MetadataReporter),
        settings.date,
        &progress,
    )
    .await;
    progress.finish();

    print_outcome(&outcome?);
    Ok(())
}

async fn cmd_collect(config_path: Option<PathBuf>, args: &RunArgs, json: bool) -> Result<()> {
    let settings = resolve_settings(config_path, args)?;
    let mut source = listing_source(&settings)?;

    let progress = CliProgress::new();
    progress.phase("Collecting ranked listing");
    let collection = source
        .collect_run(&settings.run.category, settings.date)
        .await;
    progress.finish();

    let collection = match collection {
        Ok(collection) => collection,
        Err(DigestError::SourceUnavailable(reason)) => {
            println!("No papers available for {}: {reason}", settings.date);
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&collection.entries)?);
        return Ok(());
    }

    println!();
    for entry in &collection.entries {
        println!("  #{:<4} {:<12} {}", entry.rank, entry.id, entry.title);
    }
    println!();
    println!(
        "  {} entries in {} passes ({:?})",
        collection.entries.len(),
        collection.passes,
        collection.outcome
    );
    println!();

    Ok(())
}

async fn cmd_plan(config_path: Option<PathBuf>, args: &RunArgs, json: bool) -> Result<()> {
    let settings = resolve_settings(config_path, args)?;
    let mut source = listing_source(&settings)?;
    let hydrator = ArxivClient::new(ArxivOptions::default())?;

    let progress = CliProgress::new();
    let outcome = build_plan(
        &settings.run,
        &mut source,
        &hydrator,
        settings.date,
        &progress,
    )
    .await;
    progress.finish();

    let daily = match outcome? {
        PlanOutcome::Ready(daily) => daily,
        PlanOutcome::NothingAvailable { reason, collected } => {
            println!(
                "No papers available for {} ({collected} collected): {reason}",
                settings.date
            );
            return Ok(());
        }
    };

    let records = plan_records(&daily.plan, &daily.documents, &daily.scores, &daily.phrases);

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    println!();
    for record in &records {
        let score = record
            .score
            .map(|s| format!("{s:.1}"))
            .unwrap_or_else(|| "-".into());
        let detail = if record.needs_detail { "detail" } else { "basic" };
        println!(
            "  {:>3}. {:<15} {:<6} {:>5}  {:<12} {}",
            record.sequence_rank,
            record.reason.as_str(),
            detail,
            score,
            record.id,
            record.title
        );
    }
    println!();
    println!(
        "  {} planned from {} ranked, {} hydrated, {} matched",
        records.len(),
        daily.ranked.len(),
        daily.documents.len(),
        daily.scores.len()
    );
    println!();

    Ok(())
}

fn print_outcome(outcome: &DailyOutcome) {
    println!();
    match &outcome.status {
        DailyStatus::NothingAvailable(reason) => {
            println!("  Nothing to process for {}: {reason}", outcome.date);
            println!("  Collected: {}", outcome.collected);
        }
        DailyStatus::Completed => {
            println!("  Digest written!");
            println!("  Run:       {}", outcome.run_id);
            println!("  Date:      {}", outcome.date);
            println!("  Collected: {}", outcome.collected);
            println!("  Hydrated:  {}", outcome.hydrated);
            println!("  Matched:   {}", outcome.matched);
            println!("  Reports:   {}/{}", outcome.processed, outcome.planned);
            if let Some(digest) = &outcome.digest {
                println!("  Digest:    {}", digest.markdown.display());
                println!("  Plan:      {}", digest.plan.display());
            }
        }
    }
    println!("  Time:      {:.1}s", outcome.elapsed.as_secs_f64());
    println!();
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(config_path: Option<PathBuf>) -> Result<()> {
    let config = load_app_config(config_path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
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
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .map(|s| s.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]))
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
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

    fn item_done(&self, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Generating reports [{current}/{total}]"));
    }

    fn done(&self, _outcome: &DailyOutcome) {
        self.finish();
    }
}
