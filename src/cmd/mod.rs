mod split;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use std::io;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "dumpsplit")]
#[command(version)]
#[command(about = "Split mysqldump output into per-database and per-table files", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Split a mysqldump stream into one file per object
    Split {
        /// Input dump file (default: stdin)
        /// Supports .gz, .bz2, .xz, .zst compression
        file: Option<PathBuf>,

        /// Directory to output to
        #[arg(short = 'C', long, default_value = ".")]
        directory: PathBuf,

        /// MySQL version target; 5.5 defers secondary indexes for InnoDB
        /// tables, 5.6/5.7 also defer foreign key constraints
        #[arg(short, long, default_value = "5.5")]
        target: String,

        /// Command to filter output through
        #[arg(short, long, default_value = "gzip -1")]
        filter_command: String,

        /// Only write output paths matching this regex
        #[arg(short, long, default_value = ".*")]
        regex: String,

        /// Show progress while reading a file input
        #[arg(short, long)]
        progress: bool,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,

        /// Output the run summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

pub fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Split {
            file,
            directory,
            target,
            filter_command,
            regex,
            progress,
            verbose,
            json,
        } => split::run(
            file,
            directory,
            target,
            filter_command,
            regex,
            progress,
            verbose,
            json,
        ),
        Commands::Completions { shell } => {
            generate(shell, &mut Cli::command(), "dumpsplit", &mut io::stdout());
            Ok(())
        }
    }
}
