use std::{io, path::PathBuf};

use thiserror::Error;

use crate::store::DatabaseError;

/// Terminal failures of a single import run.
///
/// Row-level validation failures never show up here: a rejected row is
/// silently skipped by [`crate::rows::accept_and_coerce`].
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Could not find the CSV file to import. ({})", .0.display())]
    MissingFile(PathBuf),
    #[error("The table specified as the import destination does not exist. ({0})")]
    UnknownTable(String),
    #[error("Oops, this CSV does not contain any valid data to import.")]
    EmptyResultSet,
    #[error("Failed to write the normalized working copy {}", .path.display())]
    EncodingWriteFailure {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to read {}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Malformed CSV in {} near line {line}", .path.display())]
    Csv {
        path: PathBuf,
        line: u64,
        #[source]
        source: csv::Error,
    },
    #[error(transparent)]
    Database(#[from] DatabaseError),
}
