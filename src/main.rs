mod classify;
mod config;
mod dump;
mod pipeline;
mod report;
mod source;
mod tally;
mod turn;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use config::Config;
use pipeline::{ClassifiedTranscript, RunSettings};
use report::ReportModel;
use source::HttpSource;
use std::path::{Path, PathBuf};
use std::process;
use std::time::Duration;
use tally::CategoryTally;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Export chatbot transcripts for a date range and report category counts.
#[derive(Parser)]
#[command(name = "convotally", version)]
struct Cli {
    /// Config file
    #[arg(long, short, global = true, default_value = config::FILENAME)]
    config: PathBuf,

    /// Enable debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a starter config file
    Init,
    /// Fetch transcripts, write per-transcript dumps, a CSV, and the report
    Export(DateArgs),
    /// Rebuild the report from a previously exported directory
    Report {
        /// Directory holding `transcript_<id>.txt` files (defaults to the
        /// configured output directory)
        dir: Option<PathBuf>,

        #[command(flatten)]
        dates: DateArgs,
    },
}

#[derive(clap::Args)]
struct DateArgs {
    /// Override `start_date` (YYYY-MM-DD)
    #[arg(long)]
    start: Option<String>,

    /// Override `end_date` (YYYY-MM-DD)
    #[arg(long)]
    end: Option<String>,
}

impl DateArgs {
    /// Apply the overrides, then validate the merged config.
    fn apply(&self, config: &mut Config) -> Result<()> {
        if let Some(start) = &self.start {
            config.start_date = start.clone();
        }
        if let Some(end) = &self.end {
            config.end_date = end.clone();
        }
        config.validate()
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Aggregate and write the report files into `dir`.
fn finish_report(
    config: &Config,
    dir: &Path,
    transcripts: &[ClassifiedTranscript],
    human_count: u64,
    tally: &CategoryTally,
) -> Result<ReportModel> {
    let range = config.date_range()?;
    let template = config.load_report_template()?;
    let report = ReportModel::aggregate(config.report_title(&range), range, human_count, tally);
    dump::write_report(dir, &report, &template)?;
    info!(
        transcripts = transcripts.len(),
        human_count,
        total_categorizations = report.total_categorizations,
        dir = %dir.display(),
        "report written"
    );
    Ok(report)
}

fn export(config: &Config) -> Result<ReportModel> {
    let range = config.date_range()?;
    let source = HttpSource::new(
        &config.base_url,
        &config.auth_token,
        Duration::from_secs(config.timeout_secs),
    );
    let settings = RunSettings {
        project_id: &config.project_id,
        range,
        categories: &config.categories,
        filter: &config.classifier,
        workers: config.workers,
    };
    let harvest = pipeline::harvest(&source, &settings).context("fetching transcripts")?;

    let dir = config.output_dir();
    dump::ensure_dir(&dir)?;
    for transcript in &harvest.transcripts {
        let path = dump::write_transcript(&dir, transcript)?;
        info!(path = %path.display(), "saved transcript");
    }
    let csv = dump::export_csv(&dir, &range, &harvest.transcripts)?;
    info!(path = %csv.display(), "exported messages");

    finish_report(
        config,
        &dir,
        &harvest.transcripts,
        harvest.human_count,
        &harvest.tally,
    )
}

fn report_from_dir(config: &Config, dir: Option<&Path>) -> Result<ReportModel> {
    let dir = dir.map(Path::to_path_buf).unwrap_or_else(|| config.output_dir());
    let transcripts = dump::read_transcripts(&dir)?;
    let mut tally = CategoryTally::new(config.categories.iter().cloned());
    let mut human_count = 0;
    for t in &transcripts {
        human_count += classify::human_count(&t.messages);
        tally.scan_messages(&t.messages);
    }
    finish_report(config, &dir, &transcripts, human_count, &tally)
}

fn run(cli: &Cli) -> Result<Option<ReportModel>> {
    match &cli.command {
        Command::Init => {
            Config::write_default(&cli.config)?;
            println!("wrote {}", cli.config.display());
            Ok(None)
        }
        Command::Export(dates) => {
            let mut config = Config::read(&cli.config)?;
            dates.apply(&mut config)?;
            export(&config).map(Some)
        }
        Command::Report { dir, dates } => {
            let mut config = Config::read(&cli.config)?;
            dates.apply(&mut config)?;
            report_from_dir(&config, dir.as_deref()).map(Some)
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(&cli) {
        Ok(Some(report)) => {
            println!("{}", report.title);
            println!("human messages: {}", report.human_count);
            for row in &report.rows {
                println!(
                    "{}\t{}\t{:.1}%",
                    row.name,
                    row.count,
                    row.percentage * 100.0
                );
            }
            println!("total categorizations: {}", report.total_categorizations);
        }
        Ok(None) => {}
        Err(err) => {
            eprintln!("convotally: {err:#}");
            process::exit(2);
        }
    }
}
