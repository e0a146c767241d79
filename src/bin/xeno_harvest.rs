use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use xeno_harvest::config::{API_KEY_ENV, ConfigLoader, ConfigOverrides};
use xeno_harvest::error::HarvestError;
use xeno_harvest::output::{HumanOutput, JsonOutput, LogProgress, OutputMode};
use xeno_harvest::pipeline::{HarvestSummary, Harvester, ProgressSink};

#[derive(Parser)]
#[command(name = "xeno-harvest")]
#[command(about = "Collect location-specific bird audio from Xeno-canto and organize it by species")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    non_interactive: bool,

    #[arg(long, global = true)]
    config: Option<String>,

    #[command(flatten)]
    overrides: OverrideArgs,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    #[command(about = "Query the catalog, download recordings and organize them (default)")]
    Run,
    #[command(about = "Download and organize from the saved metadata.json without querying")]
    Resume,
    #[command(about = "Organize already-downloaded files from the saved metadata.json")]
    Organize,
}

#[derive(Args)]
struct OverrideArgs {
    #[arg(long, global = true)]
    country: Option<String>,

    #[arg(long = "box", global = true, value_name = "LAT_MIN,LAT_MAX,LON_MIN,LON_MAX")]
    bbox: Option<String>,

    #[arg(long, global = true)]
    raw_dir: Option<Utf8PathBuf>,

    #[arg(long, global = true)]
    organized_dir: Option<Utf8PathBuf>,

    #[arg(long, global = true)]
    workers: Option<usize>,

    #[arg(long, global = true)]
    max_recordings: Option<usize>,

    #[arg(long, global = true, conflicts_with = "max_recordings")]
    no_limit: bool,
}

impl From<OverrideArgs> for ConfigOverrides {
    fn from(args: OverrideArgs) -> Self {
        Self {
            country: args.country,
            bbox: args.bbox,
            raw_dir: args.raw_dir,
            organized_dir: args.organized_dir,
            max_workers: args.workers,
            max_recordings: args.max_recordings,
            no_limit: args.no_limit,
        }
    }
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<HarvestError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &HarvestError) -> u8 {
    match error {
        HarvestError::MissingCredential
        | HarvestError::MetadataNotFound(_)
        | HarvestError::InvalidBoundingBox(_)
        | HarvestError::InvalidConfig(_)
        | HarvestError::ConfigRead(_)
        | HarvestError::ConfigParse(_) => 2,
        HarvestError::Http(_)
        | HarvestError::Transport { .. }
        | HarvestError::HttpStatus { .. }
        | HarvestError::Catalog(_) => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };

    let config = ConfigLoader::resolve(
        cli.config.as_deref(),
        cli.overrides.into(),
        std::env::var(API_KEY_ENV).ok(),
    )?;
    let harvester = Harvester::from_config(config)?;

    let sink: &dyn ProgressSink = match output_mode {
        OutputMode::NonInteractive => &JsonOutput,
        OutputMode::Interactive => &LogProgress,
    };
    let summary = match cli.command.unwrap_or(Command::Run) {
        Command::Run => harvester.run(sink)?,
        Command::Resume => harvester.resume(sink)?,
        Command::Organize => harvester.organize_only(sink)?,
    };

    print_summary(&summary, output_mode)
}

fn print_summary(summary: &HarvestSummary, output_mode: OutputMode) -> miette::Result<()> {
    match output_mode {
        OutputMode::NonInteractive => JsonOutput::print_summary(summary).into_diagnostic(),
        OutputMode::Interactive => HumanOutput::print_summary(summary).into_diagnostic(),
    }
}
