use std::error::Error;
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use brc_pipeline::config::DEFAULT_CHUNK_SIZE;
use brc_pipeline::{Pipeline, PipelineConfig};
use clap::Parser;
use similar::{ChangeTag, TextDiff};
use tracing::info;

#[derive(Debug, Parser)]
#[command(
    name = "brc-pipeline",
    about = "Per-key min/max/mean over a large key;value file",
    after_help = "Logging goes to stderr and is controlled by RUST_LOG (default: warn)."
)]
struct Cli {
    #[arg(default_value = "measurements.txt", help = "Input file, one key;value record per line")]
    path: PathBuf,
    #[arg(
        long = "chunk-size",
        default_value_t = DEFAULT_CHUNK_SIZE,
        value_parser = parse_positive_usize,
        help = "Bytes read per chunk"
    )]
    chunk_size: usize,
    #[arg(long, value_parser = parse_positive_usize, help = "Ingestion worker threads [default: available parallelism]")]
    workers: Option<usize>,
    #[arg(long = "queue-depth", value_parser = parse_positive_usize, help = "Chunks buffered between reader and workers [default: 2 x workers]")]
    queue_depth: Option<usize>,
    #[arg(long = "sort-workers", value_parser = parse_positive_usize, help = "Parallel sort slices [default: workers]")]
    sort_workers: Option<usize>,
    #[arg(long = "no-preaggregate", help = "Apply every record directly to the shared store")]
    no_preaggregate: bool,
    #[arg(long, value_name = "FILE", help = "Compare the report with a reference file and print a diff")]
    expect: Option<PathBuf>,
}

fn parse_positive_usize(raw: &str) -> Result<usize, String> {
    let parsed = raw
        .parse::<usize>()
        .map_err(|_| format!("'{raw}' is not a positive integer"))?;
    if parsed == 0 {
        return Err("value must be greater than zero".to_string());
    }
    Ok(parsed)
}

impl Cli {
    fn config(&self) -> PipelineConfig {
        let mut config = PipelineConfig::default().chunk_size(self.chunk_size);
        if let Some(workers) = self.workers {
            config = config.workers(workers);
        }
        if let Some(depth) = self.queue_depth {
            config = config.queue_depth(depth);
        }
        if let Some(sort_workers) = self.sort_workers {
            config = config.sort_workers(sort_workers);
        }
        config.preaggregate(!self.no_preaggregate)
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(&cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::from(2)
        }
    }
}

/// Returns `false` when `--expect` was given and the report differs.
fn run(cli: &Cli) -> Result<bool, Box<dyn Error>> {
    let now = Instant::now();
    let pipeline = Pipeline::new(cli.config())?;
    let outcome = pipeline.run_file(&cli.path)?;
    let report = outcome.report()?;
    info!(elapsed = ?now.elapsed(), keys = outcome.keys().len(), "run complete");

    println!("{report}");

    let stats = outcome.stats();
    if stats.malformed > 0 {
        eprintln!("skipped {} malformed of {} lines", stats.malformed, stats.records + stats.malformed);
    }

    match &cli.expect {
        Some(expected) => {
            let expected = fs::read_to_string(expected)?;
            Ok(print_diff(expected.trim_end(), &report))
        }
        None => Ok(true),
    }
}

/// Prints a line diff of the report against the reference, one entry per line.
fn print_diff(expected: &str, actual: &str) -> bool {
    if expected == actual {
        eprintln!("report matches reference");
        return true;
    }
    let expected = expected.replace(", ", "\n");
    let actual = actual.replace(", ", "\n");
    let diff = TextDiff::from_lines(&expected, &actual);
    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            ChangeTag::Delete => "-",
            ChangeTag::Insert => "+",
            ChangeTag::Equal => continue,
        };
        eprint!("{sign}{change}");
        if change.missing_newline() {
            eprintln!();
        }
    }
    false
}
