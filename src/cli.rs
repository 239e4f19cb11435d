use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Replace the contents of a table with the valid rows of a CSV file",
    long_about = None
)]
pub struct Cli {
    /// Destination table (races, courses, skills or characters)
    pub table: String,
    /// CSV file to import
    #[arg(required_unless_present = "describe")]
    pub file: Option<PathBuf>,
    /// Directory holding the table files (<table>.jsonl)
    #[arg(long, env = "CSV_BULKLOAD_STORE", default_value = "data")]
    pub store: PathBuf,
    /// Directory for transcoded working copies (defaults to the system temp dir)
    #[arg(long = "work-dir", env = "CSV_BULKLOAD_WORK_DIR")]
    pub work_dir: Option<PathBuf>,
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Print the column schema of the table instead of importing
    #[arg(long)]
    pub describe: bool,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}
