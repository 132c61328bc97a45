// Artifact Generation
//
// Builds the ordered DDL batch that instruments one base table:
// namespace, state table, recorder overload and hook binding.
// Generation is pure; executing the batch is the caller's business.

use std::fmt;

use crate::catalog::{
    Catalog, CatalogError, ColumnDef, ColumnType, DefaultExpr, HookEvent, Statement, TableDef,
    TableRef,
};
use crate::config::Config;
use crate::naming::ResolvedLog;
use crate::recorder::RecorderBody;

/// Abstract parent shared by every state table: a transaction id and a
/// timestamp, both defaulted at insertion and indexed.
pub fn log_parent(config: &Config) -> TableDef {
    TableDef::new(
        config.log_parent_ref(),
        vec![
            ColumnDef::new("txid", ColumnType::Int)
                .not_null()
                .with_default(DefaultExpr::CurrentTxId),
            ColumnDef::new("at", ColumnType::Timestamp)
                .not_null()
                .with_default(DefaultExpr::CurrentTimestamp),
        ],
    )
    .with_index("txid")
    .with_index("at")
    .abstract_table()
}

/// Ordered DDL statements. Renders as newline-separated text.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    statements: Vec<Statement>,
}

impl Batch {
    pub fn statements(&self) -> &[Statement] {
        &self.statements
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }
}

impl fmt::Display for Batch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, statement) in self.statements.iter().enumerate() {
            if i > 0 {
                f.write_str("\n\n")?;
            }
            write!(f, "{statement}")?;
        }
        Ok(())
    }
}

/// Generate the instrumentation batch for `base`.
///
/// The base table must exist. Collisions with existing objects are not
/// checked here; they surface when the batch executes.
pub fn generate(
    catalog: &Catalog,
    config: &Config,
    base: &TableRef,
    resolved: &ResolvedLog,
) -> Result<Batch, CatalogError> {
    catalog.require_table(base)?;

    let parent = config.log_parent_ref();
    let body = RecorderBody::for_mode(resolved.table.clone(), resolved.mode);
    let payload = body
        .payload
        .iter()
        .map(|b| ColumnDef::new(b.column.clone(), ColumnType::Json))
        .collect();

    let statements = vec![
        Statement::CreateSchema {
            schema: resolved.table.schema.clone(),
            if_not_exists: true,
        },
        Statement::CreateTable {
            table: resolved.table.clone(),
            like: Some(parent.clone()),
            inherits: Some(parent),
            columns: payload,
        },
        Statement::CreateRecorder {
            name: config.recorder_name(),
            new_param: base.clone(),
            old_param: base.clone(),
            returns: resolved.table.clone(),
            body,
        },
        Statement::CreateHook {
            name: config.capture.clone(),
            table: base.clone(),
            events: vec![HookEvent::Insert, HookEvent::Update, HookEvent::Delete],
            function: config.capture_name(),
        },
    ];

    Ok(Batch { statements })
}
