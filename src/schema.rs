//! Column schemas for every table the loader knows how to fill.
//!
//! This module owns the [`TableSchema`] struct (ordered column specs for one
//! destination table), the [`ColumnType`] enum derived from the SQL column
//! declaration, and the [`SchemaRegistry`] that maps table names to schemas.
//!
//! ## Responsibilities
//!
//! - The built-in column tables for `races`, `courses`, `skills` and
//!   `characters`, declared once as constant data
//! - Mapping SQL declarations such as `tinyint(4) unsigned` onto coercion types
//! - Full-match validation patterns and header-label rejection per column
//!
//! Column order is significant: the n-th CSV cell is validated against the
//! n-th column spec.

use std::{
    collections::{HashMap, HashSet},
    fmt,
};

use anyhow::{Context, Result, ensure};
use regex::Regex;

/// Coercion target derived from a column's SQL declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnType {
    Int,
    TinyInt,
    SmallInt,
    MediumInt,
    BigInt,
    Float,
    Double,
    Bit1,
    Json,
    Text,
    Varchar(u32),
    Other(String),
}

impl ColumnType {
    /// Classifies a declaration such as `int(11) unsigned`, `float(5,3)` or
    /// `varchar(255)`. Declarations that are not numeric, `bit(1)` or `json`
    /// are kept as strings, so this never fails.
    pub fn from_declaration(declaration: &str) -> Self {
        let normalized = declaration.trim().to_ascii_lowercase();
        let base = normalized
            .split(|c: char| c == '(' || c.is_whitespace())
            .next()
            .unwrap_or_default();

        match base {
            "tinyint" => return ColumnType::TinyInt,
            "smallint" => return ColumnType::SmallInt,
            "mediumint" => return ColumnType::MediumInt,
            "bigint" => return ColumnType::BigInt,
            _ if base.starts_with("int") => return ColumnType::Int,
            _ => {}
        }
        if normalized == "json" {
            return ColumnType::Json;
        }
        if normalized == "bit(1)" {
            return ColumnType::Bit1;
        }
        if base.starts_with("float") {
            return ColumnType::Float;
        }
        if base.starts_with("double") {
            return ColumnType::Double;
        }
        if base == "varchar" {
            if let Some(length) = parenthesized_length(&normalized) {
                return ColumnType::Varchar(length);
            }
        }
        if base.starts_with("text") {
            return ColumnType::Text;
        }
        ColumnType::Other(normalized)
    }

    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            ColumnType::Int
                | ColumnType::TinyInt
                | ColumnType::SmallInt
                | ColumnType::MediumInt
                | ColumnType::BigInt
        )
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::Int => f.write_str("int"),
            ColumnType::TinyInt => f.write_str("tinyint"),
            ColumnType::SmallInt => f.write_str("smallint"),
            ColumnType::MediumInt => f.write_str("mediumint"),
            ColumnType::BigInt => f.write_str("bigint"),
            ColumnType::Float => f.write_str("float"),
            ColumnType::Double => f.write_str("double"),
            ColumnType::Bit1 => f.write_str("bit(1)"),
            ColumnType::Json => f.write_str("json"),
            ColumnType::Text => f.write_str("text"),
            ColumnType::Varchar(length) => write!(f, "varchar({length})"),
            ColumnType::Other(raw) => f.write_str(raw),
        }
    }
}

fn parenthesized_length(declaration: &str) -> Option<u32> {
    let (_, rest) = declaration.split_once('(')?;
    let (inner, _) = rest.split_once(')')?;
    inner.trim().parse().ok()
}

#[derive(Debug, Clone)]
pub struct ColumnSpec {
    pub name: String,
    pub declaration: String,
    pub column_type: ColumnType,
    pub pattern: String,
    pub label: String,
    matcher: Regex,
}

impl ColumnSpec {
    pub fn new(name: &str, declaration: &str, pattern: &str, label: &str) -> Result<Self> {
        ensure!(!name.trim().is_empty(), "Column name cannot be empty");
        let matcher = Regex::new(&format!("^(?:{pattern})$"))
            .with_context(|| format!("Compiling pattern for column '{name}'"))?;
        Ok(Self {
            name: name.to_string(),
            declaration: declaration.to_string(),
            column_type: ColumnType::from_declaration(declaration),
            pattern: pattern.to_string(),
            label: label.to_string(),
            matcher,
        })
    }

    /// A cell equal to the header label is rejected even when it would
    /// otherwise satisfy the pattern.
    pub fn is_header_label(&self, cell: &str) -> bool {
        self.label == cell
    }

    pub fn matches(&self, cell: &str) -> bool {
        self.matcher.is_match(cell)
    }

    pub fn accepts(&self, cell: &str) -> bool {
        !self.is_header_label(cell) && self.matches(cell)
    }
}

#[derive(Debug, Clone, Default)]
pub struct TableSchema {
    pub table: String,
    pub columns: Vec<ColumnSpec>,
}

impl TableSchema {
    pub fn new(table: &str, columns: Vec<ColumnSpec>) -> Result<Self> {
        let mut seen = HashSet::new();
        for column in &columns {
            ensure!(
                seen.insert(column.name.as_str()),
                "Duplicate column '{}' in schema for table '{table}'",
                column.name
            );
        }
        Ok(Self {
            table: table.to_string(),
            columns,
        })
    }

    fn from_definitions(table: &str, definitions: &[ColumnDef]) -> Result<Self> {
        let columns = definitions
            .iter()
            .map(|def| ColumnSpec::new(def.name, def.declaration, def.pattern, def.label))
            .collect::<Result<Vec<_>>>()
            .with_context(|| format!("Building schema for table '{table}'"))?;
        Self::new(table, columns)
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|column| column.name.as_str())
    }
}

/// Immutable table-name to schema lookup, built once per invocation.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    tables: HashMap<String, TableSchema>,
    empty: TableSchema,
}

impl SchemaRegistry {
    pub fn builtin() -> Result<Self> {
        let tables = BUILTIN_TABLES
            .iter()
            .map(|(name, definitions)| TableSchema::from_definitions(name, definitions))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::from_tables(tables))
    }

    pub fn from_tables<I>(tables: I) -> Self
    where
        I: IntoIterator<Item = TableSchema>,
    {
        Self {
            tables: tables
                .into_iter()
                .map(|schema| (schema.table.clone(), schema))
                .collect(),
            empty: TableSchema::default(),
        }
    }

    /// Unknown tables resolve to an empty schema, which accepts no cells.
    pub fn schema_for(&self, table: &str) -> &TableSchema {
        self.tables.get(table).unwrap_or(&self.empty)
    }

    pub fn contains(&self, table: &str) -> bool {
        self.tables.contains_key(table)
    }

    pub fn table_names(&self) -> Vec<&str> {
        let mut names = self.tables.keys().map(String::as_str).collect::<Vec<_>>();
        names.sort_unstable();
        names
    }
}

struct ColumnDef {
    name: &'static str,
    declaration: &'static str,
    pattern: &'static str,
    label: &'static str,
}

const fn col(
    name: &'static str,
    declaration: &'static str,
    pattern: &'static str,
    label: &'static str,
) -> ColumnDef {
    ColumnDef {
        name,
        declaration,
        pattern,
        label,
    }
}

const ID: &str = "[0-9]+";
const SIGNED: &str = "-?[0-9]+";
const SMALL: &str = "[0-9]{1,4}";
const ANY: &str = ".*";
const FLAG: &str = "(TRUE|true|True|FALSE|false|False|0|1)?";
const RANK: &str = "[A-G]";
const RATE: &str = r"-?[0-9]{1,2}\.?[0-9]{0,3}";

const RACES: &[ColumnDef] = &[
    col("id", "int(11) unsigned", ID, "レースID"),
    col("grade", "varchar(6)", ANY, "グレード"),
    col("name", "varchar(255)", ANY, "レース名"),
    col("junior", "bit(1)", FLAG, "ジュニア"),
    col("classic", "bit(1)", FLAG, "クラシック"),
    col("senior", "bit(1)", FLAG, "シニア"),
    col("month", "tinyint(4) unsigned", SMALL, "開催月"),
    col("half_period", "varchar(1)", ANY, "前半・後半"),
    col("period_name", "varchar(255)", ANY, "時期名称"),
    col("place", "varchar(255)", ANY, "場所"),
    col("ground", "varchar(255)", ANY, "馬場"),
    col("distance", "int(11) unsigned", ID, "距離"),
    col("suitable_distance", "varchar(255)", ANY, "適性距離"),
    col("direction", "varchar(1)", ANY, "回り方向"),
    col("lane", "varchar(1)", ANY, "内外回り"),
    col("tight", "bit(1)", FLAG, "小回り"),
    col("full_gate", "tinyint(2) unsigned", SMALL, "フルゲート"),
    col("night_race", "bit(1)", FLAG, "ナイター"),
    col("season", "varchar(255)", ANY, "季節"),
    col("meta", "json", ANY, "メタデータ"),
    col("extend", "text", ANY, "拡張データ"),
];

const COURSES: &[ColumnDef] = &[
    col("id", "int(11) unsigned", ID, "コースID"),
    col("place", "varchar(255)", ANY, "場所"),
    col("ground", "varchar(255)", ANY, "馬場"),
    col("distance", "int(11) unsigned", ID, "距離"),
    col("lane", "varchar(1)", ANY, "内外回り"),
    col("category", "varchar(255)", ANY, "距離区分"),
    col("ref_status", "json", ANY, "参照ステータス"),
    col("slope", "json", ANY, "勾配データ"),
    col("meta", "json", ANY, "メタデータ"),
    col("extend", "text", ANY, "拡張データ"),
];

const SKILLS: &[ColumnDef] = &[
    col("id", "int(11) unsigned", ID, "スキルID"),
    col("name", "varchar(255)", ANY, "スキル名"),
    col("passive", "bit(1)", FLAG, "パッシブスキル"),
    col("rare", "bit(1)", FLAG, "レアスキル"),
    col("bad", "bit(1)", FLAG, "バッドスキル"),
    col("point", "int(11) unsigned", ID, "必要ポイント"),
    col("speed", "int(11)", SIGNED, "スピード補正"),
    col("stamina", "int(11)", SIGNED, "スタミナ補正"),
    col("power", "int(11)", SIGNED, "パワー補正"),
    col("guts", "int(11)", SIGNED, "根性補正"),
    col("wisdom", "int(11)", SIGNED, "賢さ補正"),
    col("vision", "int(11)", SIGNED, "視野補正"),
    col("fasten", "float(5,3)", RATE, "加速度"),
    col("conditions", "json", ANY, "発動条件"),
    col("icon", "varchar(255)", ANY, "アイコン"),
    col("meta", "json", ANY, "メタデータ"),
    col("extend", "text", ANY, "拡張データ"),
];

const CHARACTERS: &[ColumnDef] = &[
    col("id", "int(11) unsigned", ID, "キャラクターID"),
    col("name", "varchar(255)", ANY, "キャラクター名"),
    col("prefix", "varchar(255)", ANY, "二つ名"),
    col("honorary_name", "varchar(255)", ANY, "勝負服名"),
    col("rare", "tinyint(1) unsigned", SMALL, "レア度"),
    col("turf", "varchar(1)", RANK, "芝適性"),
    col("dirt", "varchar(1)", RANK, "ダート適性"),
    col("short", "varchar(1)", RANK, "短距離適性"),
    col("mile", "varchar(1)", RANK, "マイル適性"),
    col("middle", "varchar(1)", RANK, "中距離適性"),
    col("long", "varchar(1)", RANK, "長距離適性"),
    col("frontrunner", "varchar(1)", RANK, "逃げ適性"),
    col("stalker", "varchar(1)", RANK, "先行適性"),
    col("looker", "varchar(1)", RANK, "差し適性"),
    col("saverunner", "varchar(1)", RANK, "追込適性"),
    col("speed", "tinyint(4) unsigned", SMALL, "初期スピード"),
    col("stamina", "tinyint(4) unsigned", SMALL, "初期スタミナ"),
    col("power", "tinyint(4) unsigned", SMALL, "初期パワー"),
    col("guts", "tinyint(4) unsigned", SMALL, "初期根性"),
    col("wisdom", "tinyint(4) unsigned", SMALL, "初期賢さ"),
    col("gr_spd", "tinyint(4) unsigned", SMALL, "スピード成長率"),
    col("gr_stm", "tinyint(4) unsigned", SMALL, "スタミナ成長率"),
    col("gr_pow", "tinyint(4) unsigned", SMALL, "パワー成長率"),
    col("gr_gut", "tinyint(4) unsigned", SMALL, "根性成長率"),
    col("gr_wis", "tinyint(4) unsigned", SMALL, "賢さ成長率"),
    col("native_skill", "json", ANY, "固有スキル"),
    col("skills", "json", ANY, "スキル"),
    col("target_races", "json", ANY, "目標レース"),
    col("meta", "json", ANY, "メタデータ"),
    col("extend", "text", ANY, "拡張データ"),
];

const BUILTIN_TABLES: &[(&str, &[ColumnDef])] = &[
    ("races", RACES),
    ("courses", COURSES),
    ("skills", SKILLS),
    ("characters", CHARACTERS),
];
