use std::path::PathBuf;
use thiserror::Error;

/// Failures that abort a split run.
///
/// None of these are recovered locally; they propagate to the command layer
/// and terminate the process with a non-zero exit status.
#[derive(Debug, Error)]
pub enum SplitError {
    /// A marker comment did not contain a complete backtick-quoted name.
    #[error("malformed identifier in marker line {line:?}")]
    MalformedIdentifier { line: String },

    /// A CREATE TABLE statement could not be divided into top-level clauses.
    #[error("unparsable table definition: {reason}")]
    UnparsableDdl { reason: &'static str },

    /// Creating a directory or writing an output file failed.
    #[error("output failure at {}: {source}", path.display())]
    OutputIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The filter child process could not be spawned or exited non-zero.
    #[error("filter command {command:?} failed: {reason}")]
    FilterProcess { command: String, reason: String },
}
