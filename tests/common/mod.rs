#![allow(dead_code)]

use std::collections::HashSet;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use csv_bulkload::data::TypedRow;
use csv_bulkload::store::{
    DatabaseError, RowInserter, TableRegistry, TableTruncator, TransactionManager,
};
use tempfile::{TempDir, tempdir};

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    /// Creates a fresh scratch directory for the current test case.
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    /// Returns the root path for all files owned by this workspace.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        self.write_bytes(name, contents.as_bytes())
    }

    pub fn write_bytes(&self, name: &str, contents: &[u8]) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents).expect("write temp file contents");
        path
    }

    /// Number of entries currently in the workspace directory.
    pub fn entry_count(&self) -> usize {
        std::fs::read_dir(self.path()).expect("read dir").count()
    }
}

/// How the fake inserter answers the n-th (1-based) insert call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertBehavior {
    Accept,
    Decline,
    Fail,
}

/// In-memory collaborator that records every call the loader makes.
#[derive(Debug, Default)]
pub struct RecordingStore {
    pub tables: HashSet<String>,
    pub truncates: Vec<String>,
    pub begins: usize,
    pub commits: usize,
    pub rollbacks: usize,
    pub insert_calls: usize,
    pub staged: Vec<(String, TypedRow)>,
    pub committed: Vec<(String, TypedRow)>,
    pub behaviors: Vec<(usize, InsertBehavior)>,
    pub fail_commit: bool,
}

impl RecordingStore {
    pub fn with_tables(tables: &[&str]) -> Self {
        Self {
            tables: tables.iter().map(|t| t.to_string()).collect(),
            ..Self::default()
        }
    }

    /// Overrides the answer for the given 1-based insert call.
    pub fn on_insert(mut self, call: usize, behavior: InsertBehavior) -> Self {
        self.behaviors.push((call, behavior));
        self
    }

    pub fn committed_rows(&self, table: &str) -> Vec<&TypedRow> {
        self.committed
            .iter()
            .filter(|(name, _)| name == table)
            .map(|(_, row)| row)
            .collect()
    }

    fn behavior_for(&self, call: usize) -> InsertBehavior {
        self.behaviors
            .iter()
            .find(|(n, _)| *n == call)
            .map(|(_, behavior)| *behavior)
            .unwrap_or(InsertBehavior::Accept)
    }
}

impl TableRegistry for RecordingStore {
    fn table_exists(&self, table: &str) -> Result<bool, DatabaseError> {
        Ok(self.tables.contains(table))
    }
}

impl TableTruncator for RecordingStore {
    fn truncate(&mut self, table: &str) -> Result<(), DatabaseError> {
        self.truncates.push(table.to_string());
        self.committed.retain(|(name, _)| name != table);
        Ok(())
    }
}

impl RowInserter for RecordingStore {
    fn insert_row(&mut self, table: &str, row: &TypedRow) -> Result<bool, DatabaseError> {
        self.insert_calls += 1;
        match self.behavior_for(self.insert_calls) {
            InsertBehavior::Accept => {
                self.staged.push((table.to_string(), row.clone()));
                Ok(true)
            }
            InsertBehavior::Decline => Ok(false),
            InsertBehavior::Fail => Err(DatabaseError::query(format!(
                "Duplicate entry for key 'PRIMARY' on insert #{}",
                self.insert_calls
            ))),
        }
    }
}

impl TransactionManager for RecordingStore {
    fn begin(&mut self) -> Result<(), DatabaseError> {
        self.begins += 1;
        Ok(())
    }

    fn commit(&mut self) -> Result<(), DatabaseError> {
        if self.fail_commit {
            return Err(DatabaseError::query("Deadlock found when trying to commit"));
        }
        self.commits += 1;
        self.committed.append(&mut self.staged);
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), DatabaseError> {
        self.rollbacks += 1;
        self.staged.clear();
        Ok(())
    }
}

pub const CHARACTERS_HEADER: &str = "キャラクターID,キャラクター名,二つ名,勝負服名,レア度,芝適性,ダート適性,短距離適性,マイル適性,中距離適性,長距離適性,逃げ適性,先行適性,差し適性,追込適性,初期スピード,初期スタミナ,初期パワー,初期根性,初期賢さ,スピード成長率,スタミナ成長率,パワー成長率,根性成長率,賢さ成長率,固有スキル,スキル,目標レース,メタデータ,拡張データ";

pub fn character_row(id: u32, name: &str) -> String {
    format!(
        "{id},{name},[日本一のウマ娘],スペシャルドリーマー,3,A,G,F,C,A,A,G,A,A,C,83,88,98,87,94,0,20,0,0,10,\"{{'id': 100101}}\",\"[{{'id': 200012}}]\",\"[]\",,"
    )
}
