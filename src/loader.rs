//! Truncate-and-load orchestration for a single CSV file.
//!
//! [`BulkLoader::import_csv`] runs the whole pipeline: existence checks,
//! encoding normalization, row validation against the table schema, working
//! copy cleanup, truncation, and the transactional insert. Every failure is
//! returned as a [`LoadError`]; only the binary's entry point decides to
//! terminate the process.

use std::{
    env, fmt,
    path::{Path, PathBuf},
};

use log::{debug, info, warn};

use crate::{
    data::TypedRow,
    error::LoadError,
    io_utils::{self, NormalizedFile},
    rows::accept_and_coerce,
    schema::{SchemaRegistry, TableSchema},
    store::{DatabaseError, RowInserter, TableRegistry, TableTruncator, TransactionManager},
};

/// Outcome of one completed import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadResult {
    pub total_parsed: usize,
    pub total_inserted: usize,
    pub table_name: String,
}

impl LoadResult {
    pub fn summary(&self) -> String {
        if self.total_inserted > 0 {
            format!(
                "{}/{} data has been completed insertion into the \"{}\" table.",
                self.total_inserted, self.total_parsed, self.table_name
            )
        } else {
            "Failed to insert data.".to_string()
        }
    }
}

impl fmt::Display for LoadResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary())
    }
}

#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Directory receiving transcoded working copies.
    pub work_dir: PathBuf,
    pub delimiter: u8,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            work_dir: env::temp_dir(),
            delimiter: io_utils::DEFAULT_CSV_DELIMITER,
        }
    }
}

/// Rows accepted from one CSV file plus the number of records skipped.
#[derive(Debug, Default)]
pub struct ParsedBatch {
    pub rows: Vec<TypedRow>,
    pub discarded: usize,
}

/// Loads CSV files into tables reached through `database`.
///
/// `database` is a single connection implementing all four collaborator
/// traits: the truncation, the inserts and the transaction that brackets
/// them must run on the same connection.
pub struct BulkLoader<'a, D> {
    schemas: &'a SchemaRegistry,
    database: &'a mut D,
    options: LoadOptions,
}

impl<'a, D> BulkLoader<'a, D>
where
    D: TableRegistry + TableTruncator + RowInserter + TransactionManager,
{
    pub fn new(schemas: &'a SchemaRegistry, database: &'a mut D) -> Self {
        Self {
            schemas,
            database,
            options: LoadOptions::default(),
        }
    }

    pub fn with_options(mut self, options: LoadOptions) -> Self {
        self.options = options;
        self
    }

    /// Replaces the contents of `table` with the valid rows of `file`.
    ///
    /// The table is truncated before the insert transaction opens, so a
    /// failed transaction leaves it empty.
    pub fn import_csv(&mut self, table: &str, file: &Path) -> Result<LoadResult, LoadError> {
        if !file.exists() {
            return Err(LoadError::MissingFile(file.to_path_buf()));
        }
        if !self.database.table_exists(table)? {
            return Err(LoadError::UnknownTable(table.to_string()));
        }

        let schemas = self.schemas;
        let schema = schemas.schema_for(table);
        if schema.is_empty() {
            warn!("No column schema is registered for table '{table}'; every row will be skipped");
        }

        let working = io_utils::normalize_encoding(file, &self.options.work_dir)?;
        let batch = parse_file(working.path(), schema, self.options.delimiter)?;
        info!(
            "Accepted {} row(s) from {:?} ({} skipped)",
            batch.rows.len(),
            file,
            batch.discarded
        );
        if batch.rows.is_empty() {
            return Err(LoadError::EmptyResultSet);
        }
        discard_working_copy(working);

        self.database.truncate(table)?;
        info!("Truncated table '{table}'");

        let inserted = self.insert_batch(table, schema, &batch.rows)?;
        Ok(LoadResult {
            total_parsed: batch.rows.len(),
            total_inserted: inserted,
            table_name: table.to_string(),
        })
    }

    fn insert_batch(
        &mut self,
        table: &str,
        schema: &TableSchema,
        rows: &[TypedRow],
    ) -> Result<usize, LoadError> {
        self.database.begin()?;
        let outcome = self
            .insert_rows(table, schema, rows)
            .and_then(|inserted| self.database.commit().map(|()| inserted));
        match outcome {
            Ok(inserted) => {
                info!("Committed {inserted} of {} row(s) into '{table}'", rows.len());
                Ok(inserted)
            }
            Err(err) => {
                warn!("Rolling back the insert into '{table}': {err}");
                if let Err(rollback_err) = self.database.rollback() {
                    warn!("Rollback failed: {rollback_err}");
                }
                Err(err.into())
            }
        }
    }

    fn insert_rows(
        &mut self,
        table: &str,
        schema: &TableSchema,
        rows: &[TypedRow],
    ) -> Result<usize, DatabaseError> {
        let mut inserted = 0usize;
        for (idx, row) in rows.iter().enumerate() {
            let restricted = row.restricted_to(schema.column_names());
            if self.database.insert_row(table, &restricted)? {
                inserted += 1;
            } else {
                debug!("Row {} was not inserted into '{table}'", idx + 1);
            }
        }
        Ok(inserted)
    }
}

/// Parses every record of `path` and keeps the rows the schema accepts.
pub fn parse_file(
    path: &Path,
    schema: &TableSchema,
    delimiter: u8,
) -> Result<ParsedBatch, LoadError> {
    let mut reader = io_utils::open_csv_reader_from_path(path, delimiter)?;
    let mut batch = ParsedBatch::default();
    for record in reader.records() {
        let record = record.map_err(|source| LoadError::Csv {
            path: path.to_path_buf(),
            line: source.position().map_or(0, |pos| pos.line()),
            source,
        })?;
        match accept_and_coerce(record.iter(), schema) {
            Some(row) => batch.rows.push(row),
            None => {
                debug!(
                    "Skipping record at line {}",
                    record.position().map_or(0, |pos| pos.line())
                );
                batch.discarded += 1;
            }
        }
    }
    Ok(batch)
}

fn discard_working_copy(working: NormalizedFile) {
    if !working.is_temporary() {
        return;
    }
    let path = working.path().to_path_buf();
    match working.discard() {
        Ok(()) => debug!("Removed working copy {:?}", path),
        Err(err) => warn!("Could not remove working copy {:?}: {err}", path),
    }
}
