pub mod cli;
pub mod data;
pub mod error;
pub mod io_utils;
pub mod loader;
pub mod rows;
pub mod schema;
pub mod store;
pub mod table;

use std::{env, sync::OnceLock};

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use log::{LevelFilter, debug, info};

use crate::{
    cli::Cli,
    error::LoadError,
    loader::{BulkLoader, LoadOptions},
    schema::SchemaRegistry,
    store::DirectoryStore,
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("csv_bulkload", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    let schemas = SchemaRegistry::builtin().context("Building the built-in table schemas")?;

    if cli.describe {
        return handle_describe(&schemas, &cli.table);
    }

    let file = cli
        .file
        .as_deref()
        .ok_or_else(|| anyhow!("Parameters are missing: a CSV file is required"))?;
    if !file.exists() {
        return Err(LoadError::MissingFile(file.to_path_buf()).into());
    }
    let mut store = DirectoryStore::open(&cli.store)
        .with_context(|| format!("Opening table store {:?}", cli.store))?;
    let mut options = LoadOptions::default();
    if let Some(work_dir) = &cli.work_dir {
        options.work_dir = work_dir.clone();
    }
    if let Some(delimiter) = cli.delimiter {
        options.delimiter = delimiter;
    }
    debug!(
        "Importing {:?} into '{}' (store {:?}, work dir {:?})",
        file, cli.table, cli.store, options.work_dir
    );

    let result = BulkLoader::new(&schemas, &mut store)
        .with_options(options)
        .import_csv(&cli.table, file)?;
    info!(
        "Imported {} of {} row(s) into '{}'",
        result.total_inserted, result.total_parsed, result.table_name
    );
    println!("{}", result.summary());
    Ok(())
}

fn handle_describe(schemas: &SchemaRegistry, name: &str) -> Result<()> {
    if !schemas.contains(name) {
        return Err(anyhow!(
            "No schema is registered for table '{name}' (known tables: {})",
            schemas.table_names().join(", ")
        ));
    }
    print!("{}", table::describe_schema(schemas.schema_for(name)));
    Ok(())
}
