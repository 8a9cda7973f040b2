use crate::progress::ProgressReader;
use crate::splitter::{Compression, DumpSplitter, DumpTarget, Stats};
use anyhow::Context;
use indicatif::{ProgressBar, ProgressStyle};
use regex::Regex;
use serde::Serialize;
use std::io::Read;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// JSON output for a split run
#[derive(Serialize)]
struct SplitJsonOutput {
    input: String,
    output_dir: String,
    target: String,
    filter_command: String,
    statistics: SplitStatistics,
}

#[derive(Serialize)]
struct SplitStatistics {
    databases: usize,
    tables: usize,
    views: usize,
    sections: u64,
    elapsed_secs: f64,
}

#[allow(clippy::too_many_arguments)]
pub fn run(
    file: Option<PathBuf>,
    directory: PathBuf,
    target: String,
    filter_command: String,
    regex: String,
    progress: bool,
    verbose: bool,
    json: bool,
) -> anyhow::Result<()> {
    init_logging(verbose);

    let resolved_target = DumpTarget::parse(&target);
    if resolved_target == DumpTarget::Unknown {
        warn!("unknown target version {target:?}");
        warn!("indexes will not be deferred");
    }

    let include = Regex::new(&regex).with_context(|| format!("invalid include pattern {regex:?}"))?;

    if !directory.exists() {
        std::fs::create_dir_all(&directory)
            .with_context(|| format!("cannot create output directory {}", directory.display()))?;
        info!("created output directory {}", directory.display());
    }

    let splitter = DumpSplitter::new(directory.clone())
        .with_target(resolved_target)
        .with_filter_command(filter_command.clone())
        .with_include(include);

    let start_time = Instant::now();

    let stats = match &file {
        Some(path) => split_file(&splitter, path, progress && !json)?,
        None => {
            let stdin = std::io::stdin();
            splitter.split(stdin.lock())?
        }
    };

    let elapsed = start_time.elapsed();

    if json {
        let output = SplitJsonOutput {
            input: file
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "-".to_string()),
            output_dir: directory.display().to_string(),
            target,
            filter_command,
            statistics: SplitStatistics {
                databases: stats.databases,
                tables: stats.tables,
                views: stats.views,
                sections: stats.sections,
                elapsed_secs: elapsed.as_secs_f64(),
            },
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!(
            "Split input into {} database(s), {} table(s) and {} view(s)",
            stats.databases, stats.tables, stats.views
        );
        println!("Elapsed time: {:.3?}", elapsed);
    }

    Ok(())
}

fn split_file(splitter: &DumpSplitter, path: &PathBuf, progress: bool) -> anyhow::Result<Stats> {
    if !path.exists() {
        anyhow::bail!("input file does not exist: {}", path.display());
    }
    let file = std::fs::File::open(path)
        .with_context(|| format!("cannot open input file {}", path.display()))?;
    let file_size = file.metadata()?.len();
    let compression = Compression::from_path(path);

    if progress {
        let pb = ProgressBar::new(file_size);
        pb.set_style(
            ProgressStyle::with_template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({percent}%) {msg}",
            )
            .unwrap()
            .progress_chars("█▓▒░  ")
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
        );
        pb.enable_steady_tick(std::time::Duration::from_millis(100));

        let pb_clone = pb.clone();
        let reader = ProgressReader::new(file, move |bytes| pb_clone.set_position(bytes));
        let reader: Box<dyn Read> = compression.wrap_reader(Box::new(reader))?;

        let stats = splitter.split(reader)?;
        pb.finish_with_message("done");
        Ok(stats)
    } else {
        let reader: Box<dyn Read> = compression.wrap_reader(Box::new(file))?;
        splitter.split(reader)
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
