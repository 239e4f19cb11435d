//! Destination-side collaborators of the loader.
//!
//! The loader only talks to the database through the four narrow traits in
//! this module, so tests can substitute in-memory fakes. [`DirectoryStore`]
//! is the implementation the binary uses: a directory holding one JSON Lines
//! file per table.

use std::{
    fs::{self, File},
    io::{self, BufRead, BufReader, Write},
    path::{Path, PathBuf},
};

use log::debug;
use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::data::TypedRow;

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("{0}")]
    Query(String),
    #[error("Invalid table name '{0}'")]
    InvalidTableName(String),
    #[error("There is no active transaction")]
    NoActiveTransaction,
    #[error("There is already an active transaction")]
    TransactionActive,
    #[error("I/O failure on {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to encode a row for table '{table}'")]
    Encode {
        table: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Corrupt row at line {line} of {}", .path.display())]
    Decode {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

impl DatabaseError {
    pub fn query(message: impl Into<String>) -> Self {
        DatabaseError::Query(message.into())
    }

    fn io(path: &Path, source: io::Error) -> Self {
        DatabaseError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

pub trait TableRegistry {
    fn table_exists(&self, table: &str) -> Result<bool, DatabaseError>;
}

pub trait TableTruncator {
    fn truncate(&mut self, table: &str) -> Result<(), DatabaseError>;
}

pub trait RowInserter {
    /// Returns `Ok(false)` when the row was not stored but the failure is not
    /// a database error.
    fn insert_row(&mut self, table: &str, row: &TypedRow) -> Result<bool, DatabaseError>;
}

pub trait TransactionManager {
    fn begin(&mut self) -> Result<(), DatabaseError>;
    fn commit(&mut self) -> Result<(), DatabaseError>;
    fn rollback(&mut self) -> Result<(), DatabaseError>;
}

#[derive(Debug)]
struct StagedRow {
    table: String,
    line: String,
}

/// Tables stored as `<root>/<table>.jsonl`, one JSON object per row.
///
/// A table exists when its file exists. Inserted rows are staged in memory
/// until [`TransactionManager::commit`], which rewrites each touched table
/// through a temporary file persisted over the original.
#[derive(Debug)]
pub struct DirectoryStore {
    root: PathBuf,
    staged: Option<Vec<StagedRow>>,
}

impl DirectoryStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, DatabaseError> {
        let root = root.into();
        if !root.is_dir() {
            return Err(DatabaseError::io(
                &root,
                io::Error::new(io::ErrorKind::NotFound, "store directory does not exist"),
            ));
        }
        Ok(Self { root, staged: None })
    }

    pub fn table_path(&self, table: &str) -> Result<PathBuf, DatabaseError> {
        if !is_valid_table_name(table) {
            return Err(DatabaseError::InvalidTableName(table.to_string()));
        }
        Ok(self.root.join(format!("{table}.jsonl")))
    }

    /// Creates an empty table unless it already exists.
    pub fn create_table(&self, table: &str) -> Result<(), DatabaseError> {
        let path = self.table_path(table)?;
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map(|_| ())
            .map_err(|source| DatabaseError::io(&path, source))
    }

    pub fn read_rows(&self, table: &str) -> Result<Vec<JsonValue>, DatabaseError> {
        let path = self.table_path(table)?;
        let file = File::open(&path).map_err(|source| DatabaseError::io(&path, source))?;
        let mut rows = Vec::new();
        for (idx, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|source| DatabaseError::io(&path, source))?;
            if line.trim().is_empty() {
                continue;
            }
            let row = serde_json::from_str(&line).map_err(|source| DatabaseError::Decode {
                path: path.clone(),
                line: idx + 1,
                source,
            })?;
            rows.push(row);
        }
        Ok(rows)
    }

    fn append_committed(&self, table: &str, lines: &[&str]) -> Result<(), DatabaseError> {
        let path = self.table_path(table)?;
        let existing = fs::read_to_string(&path).map_err(|source| DatabaseError::io(&path, source))?;

        let mut temp = tempfile::Builder::new()
            .prefix(".commit-")
            .tempfile_in(&self.root)
            .map_err(|source| DatabaseError::io(&self.root, source))?;
        let mut write = || -> io::Result<()> {
            temp.write_all(existing.as_bytes())?;
            if !existing.is_empty() && !existing.ends_with('\n') {
                temp.write_all(b"\n")?;
            }
            for line in lines {
                temp.write_all(line.as_bytes())?;
                temp.write_all(b"\n")?;
            }
            temp.flush()
        };
        write().map_err(|source| DatabaseError::io(&path, source))?;
        temp.persist(&path)
            .map_err(|err| DatabaseError::io(&path, err.error))?;
        debug!("Committed {} row(s) to {:?}", lines.len(), path);
        Ok(())
    }
}

fn is_valid_table_name(table: &str) -> bool {
    !table.is_empty()
        && table
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl TableRegistry for DirectoryStore {
    fn table_exists(&self, table: &str) -> Result<bool, DatabaseError> {
        if !is_valid_table_name(table) {
            return Ok(false);
        }
        Ok(self.table_path(table)?.is_file())
    }
}

impl TableTruncator for DirectoryStore {
    fn truncate(&mut self, table: &str) -> Result<(), DatabaseError> {
        let path = self.table_path(table)?;
        File::create(&path).map_err(|source| DatabaseError::io(&path, source))?;
        Ok(())
    }
}

impl RowInserter for DirectoryStore {
    fn insert_row(&mut self, table: &str, row: &TypedRow) -> Result<bool, DatabaseError> {
        let staged = self
            .staged
            .as_mut()
            .ok_or(DatabaseError::NoActiveTransaction)?;
        if row.is_empty() {
            return Ok(false);
        }
        let line = serde_json::to_string(row).map_err(|source| DatabaseError::Encode {
            table: table.to_string(),
            source,
        })?;
        staged.push(StagedRow {
            table: table.to_string(),
            line,
        });
        Ok(true)
    }
}

impl TransactionManager for DirectoryStore {
    fn begin(&mut self) -> Result<(), DatabaseError> {
        if self.staged.is_some() {
            return Err(DatabaseError::TransactionActive);
        }
        self.staged = Some(Vec::new());
        Ok(())
    }

    fn commit(&mut self) -> Result<(), DatabaseError> {
        let staged = self.staged.take().ok_or(DatabaseError::NoActiveTransaction)?;
        let mut tables: Vec<&str> = Vec::new();
        for row in &staged {
            if !tables.contains(&row.table.as_str()) {
                tables.push(&row.table);
            }
        }
        for table in tables {
            let lines = staged
                .iter()
                .filter(|row| row.table == table)
                .map(|row| row.line.as_str())
                .collect::<Vec<_>>();
            self.append_committed(table, &lines)?;
        }
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), DatabaseError> {
        let staged = self.staged.take().ok_or(DatabaseError::NoActiveTransaction)?;
        debug!("Rolled back {} staged row(s)", staged.len());
        Ok(())
    }
}
