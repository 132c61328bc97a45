use std::fs;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use serde::{Deserialize, Serialize};
use serde_json::Map;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use statetable_kernel::catalog::{ColumnDef, ColumnType, TableDef};
use statetable_kernel::{
    install, Association, Config, Database, InstallOptions, Row, TableRef, Transaction, Value,
};

/// Statetable CLI
#[derive(Parser, Debug)]
#[command(name = "statetable")]
#[command(about = "Attach append-only state logs to tables and replay writes against them")]
#[command(long_about = None)]
struct Cli {
    /// Path to config JSON
    #[arg(long)]
    config: Option<String>,

    /// Path to script JSON (tables, installs, writes)
    #[arg(long)]
    script: String,

    /// Only print the generated DDL; nothing is kept
    #[arg(long)]
    dry_run: bool,
}

type JsonMap = Map<String, serde_json::Value>;

#[derive(Debug, Deserialize)]
struct Script {
    #[serde(default)]
    tables: Vec<TableSpec>,
    #[serde(default)]
    install: Vec<InstallSpec>,
    #[serde(default)]
    writes: Vec<WriteSpec>,
}

#[derive(Debug, Deserialize)]
struct TableSpec {
    schema: String,
    name: String,
    columns: Vec<ColumnSpec>,
}

#[derive(Debug, Deserialize)]
struct ColumnSpec {
    name: String,
    #[serde(rename = "type")]
    ty: ColumnType,
    #[serde(default)]
    not_null: bool,
}

#[derive(Debug, Deserialize)]
struct InstallSpec {
    table: TableRef,
    #[serde(flatten)]
    options: InstallOptions,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
enum WriteSpec {
    Insert {
        table: TableRef,
        row: JsonMap,
    },
    Update {
        table: TableRef,
        #[serde(rename = "where")]
        filter: JsonMap,
        set: JsonMap,
    },
    Delete {
        table: TableRef,
        #[serde(rename = "where")]
        filter: JsonMap,
    },
}

#[derive(Debug, Serialize)]
struct InstallReport {
    base: TableRef,
    state: TableRef,
    ddl: String,
}

#[derive(Debug, Serialize)]
struct LogReport {
    table: TableRef,
    rows: Vec<serde_json::Value>,
}

/// Wrapper for JSON output
#[derive(Debug, Serialize)]
struct CliOutput {
    installs: Vec<InstallReport>,
    associations: Vec<Association>,
    logs: Vec<LogReport>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // ----------------------------
    // Load config
    // ----------------------------
    let config = if let Some(path) = &cli.config {
        let data = fs::read_to_string(path).with_context(|| format!("reading {path}"))?;
        Config::from_json(&data)?
    } else {
        Config::default_config()
    };

    // ----------------------------
    // Load script
    // ----------------------------
    let script_data =
        fs::read_to_string(&cli.script).with_context(|| format!("reading {}", cli.script))?;
    let script: Script = serde_json::from_str(&script_data)?;

    let mut db = Database::new(config)?;

    // ----------------------------
    // Create base tables and install logs
    // ----------------------------
    let mut tx = db.begin();
    for spec in &script.tables {
        create_table(&mut tx, spec)?;
    }

    let mut installs = Vec::new();
    for spec in &script.install {
        let (state, batch) = install(&mut tx, &spec.table, &spec.options)?;
        debug!(base = %spec.table, statements = batch.len(), "generated install batch");
        installs.push(InstallReport {
            base: spec.table.clone(),
            state,
            ddl: batch.to_string(),
        });
    }

    if cli.dry_run {
        tx.rollback();
        let output = CliOutput {
            installs,
            associations: Vec::new(),
            logs: Vec::new(),
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }
    tx.commit();

    // ----------------------------
    // Replay writes, one transaction each
    // ----------------------------
    for write in &script.writes {
        let mut tx = db.begin();
        debug!(txid = tx.id(), ?write, "replaying write");
        apply_write(&mut tx, write)?;
        tx.commit();
    }

    // ----------------------------
    // Output
    // ----------------------------
    let registry = db.registry();
    let mut logs = Vec::new();
    for log in registry.log_tables() {
        let rows = db
            .scan(&log.table)?
            .into_iter()
            .map(|(_, row)| row.to_document())
            .collect();
        logs.push(LogReport {
            table: log.table.clone(),
            rows,
        });
    }

    let output = CliOutput {
        installs,
        associations: registry.associations(),
        logs,
    };

    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(())
}

fn create_table(tx: &mut Transaction<'_>, spec: &TableSpec) -> Result<()> {
    tx.create_schema(&spec.schema, true)?;

    let columns = spec
        .columns
        .iter()
        .map(|c| {
            let column = ColumnDef::new(c.name.clone(), c.ty);
            if c.not_null {
                column.not_null()
            } else {
                column
            }
        })
        .collect();

    tx.create_table(TableDef::new(
        TableRef::new(&spec.schema, &spec.name),
        columns,
    ))?;
    Ok(())
}

fn apply_write(tx: &mut Transaction<'_>, write: &WriteSpec) -> Result<()> {
    match write {
        WriteSpec::Insert { table, row } => {
            let row = to_row(tx, table, row)?;
            tx.insert(table, row)?;
        }
        WriteSpec::Update { table, filter, set } => {
            let filter = to_row(tx, table, filter)?;
            let changes = to_row(tx, table, set)?;
            tx.update_where(table, |row| matches_filter(row, &filter), &changes)?;
        }
        WriteSpec::Delete { table, filter } => {
            let filter = to_row(tx, table, filter)?;
            tx.delete_where(table, |row| matches_filter(row, &filter))?;
        }
    }
    Ok(())
}

/// Read a JSON object as a row of `table`, typing each value by its column.
fn to_row(tx: &Transaction<'_>, table: &TableRef, fields: &JsonMap) -> Result<Row> {
    let def = tx.catalog().require_table(table)?;

    let mut row = Row::new();
    for (name, json) in fields {
        let column = def
            .column(name)
            .ok_or_else(|| anyhow!("column {name} of relation {table} does not exist"))?;
        row.set(name.clone(), Value::from_json(column.ty, json)?);
    }
    Ok(row)
}

fn matches_filter(row: &Row, filter: &Row) -> bool {
    filter
        .iter()
        .all(|(column, value)| row.get(column).unwrap_or(&Value::Null) == value)
}
