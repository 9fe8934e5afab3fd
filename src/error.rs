//! Driver errors. Analysis and lowering cannot fail; reading the input and
//! writing the output can.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed compilation unit: {0}")]
    Unit(#[from] serde_json::Error),

    #[error("invalid command line: {0}")]
    Arguments(#[from] pico_args::Error),

    #[error("invalid value `{value}` for {flag}")]
    InvalidOption { flag: &'static str, value: String },

    #[error("unexpected arguments: {}", .0.join(" "))]
    UnexpectedArguments(Vec<String>),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
