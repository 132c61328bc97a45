// Storage Engine
//
// A small in-memory relational engine: it executes typed DDL, stores rows,
// fires row-level AFTER hooks and gives transactional all-or-nothing
// semantics through an undo log.
//
// Transactions are RAII handles. Dropping one without `commit()` rolls
// back every schema and row change it made.

pub mod table;
pub mod value;

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tracing::{debug, info, trace, warn};

pub use table::RowId;
pub use value::{ConversionError, Row, Value};

use table::TableData;

use crate::catalog::{
    Catalog, CatalogError, ColumnDef, ColumnType, DefaultExpr, HookDef, IndexDef,
    QualifiedName, ReturnType, RoutineBody, RoutineDef, RowTypeId, Statement, TableDef, TableRef,
};
use crate::config::Config;
use crate::hook::{self, ChangeEvent};
use crate::registry::Registry;

/// Monotonic transaction identifier.
pub type TxId = u64;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("column {column} of relation {table} does not exist")]
    UnknownColumn { table: TableRef, column: String },

    #[error("column {column} of relation {table} is of type {expected:?}")]
    TypeMismatch {
        table: TableRef,
        column: String,
        expected: ColumnType,
    },

    #[error("null value in column {column} of relation {table} violates not-null constraint")]
    NotNull { table: TableRef, column: String },

    #[error("column {column} of relation {table} does not accept NaN or infinite values")]
    NonFinite { table: TableRef, column: String },

    #[error("row {id} of relation {table} does not exist")]
    RowNotFound { table: TableRef, id: RowId },

    #[error("cannot insert into abstract table {0}")]
    AbstractTable(TableRef),

    #[error("rows of log table {0} cannot be updated or deleted")]
    AppendOnly(TableRef),

    #[error("no recorder {name} accepts rows of {table}")]
    RecorderMissing { name: QualifiedName, table: TableRef },

    #[error("function {0} is not a recorder")]
    NotARecorder(QualifiedName),

    #[error("function {0} cannot be invoked as a hook")]
    NotAHook(QualifiedName),
}

/// Inverse of one applied change.
#[derive(Debug)]
enum Undo {
    CreateSchema(String),
    CreateTable(TableRef),
    DropTable {
        def: TableDef,
        hooks: Vec<HookDef>,
        data: TableData,
    },
    CreateRoutine {
        name: QualifiedName,
        params: Vec<RowTypeId>,
    },
    DropRoutine(RoutineDef),
    CreateHook {
        table: TableRef,
        name: String,
    },
    Insert {
        table: TableRef,
        id: RowId,
    },
    Restore {
        table: TableRef,
        id: RowId,
        row: Row,
    },
}

#[derive(Debug)]
pub struct Database {
    config: Config,
    catalog: Catalog,
    data: BTreeMap<TableRef, TableData>,
    last_txid: TxId,
}

impl Database {
    /// Open an empty database and install the shared log infrastructure:
    /// the log namespace, the abstract log parent and the change-capture
    /// routine.
    pub fn new(config: Config) -> Result<Self, StorageError> {
        let mut db = Self {
            config,
            catalog: Catalog::new(),
            data: BTreeMap::new(),
            last_txid: 0,
        };

        let parent = crate::generate::log_parent(&db.config);
        let capture = hook::capture_routine(&db.config);
        let schema = db.config.log_schema.clone();

        let mut tx = db.begin();
        tx.create_schema(&schema, true)?;
        tx.create_table(parent)?;
        tx.create_routine(capture)?;
        tx.commit();

        Ok(db)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn registry(&self) -> Registry<'_> {
        Registry::new(&self.catalog, &self.config)
    }

    /// Start a transaction. Only one can be open at a time.
    pub fn begin(&mut self) -> Transaction<'_> {
        self.last_txid += 1;
        let id = self.last_txid;
        trace!(txid = id, "transaction started");

        Transaction {
            db: self,
            id,
            started_at: Utc::now(),
            undo: Vec::new(),
            finished: false,
        }
    }

    /// Committed rows of a table, in row id order.
    pub fn scan(&self, table: &TableRef) -> Result<Vec<(RowId, Row)>, StorageError> {
        Ok(self
            .table_data(table)?
            .iter()
            .map(|(id, row)| (id, row.clone()))
            .collect())
    }

    fn table_data(&self, table: &TableRef) -> Result<&TableData, StorageError> {
        self.data
            .get(table)
            .ok_or_else(|| CatalogError::TableNotFound(table.clone()).into())
    }

    fn table_data_mut(&mut self, table: &TableRef) -> Result<&mut TableData, StorageError> {
        self.data
            .get_mut(table)
            .ok_or_else(|| CatalogError::TableNotFound(table.clone()).into())
    }

    fn apply_undo(&mut self, entry: Undo) {
        match entry {
            Undo::CreateSchema(schema) => self.catalog.remove_schema(&schema),
            Undo::CreateTable(table) => {
                if let Err(e) = self.catalog.remove_table(&table) {
                    warn!(%table, error = %e, "undo of table creation failed");
                }
                self.data.remove(&table);
            }
            Undo::DropTable { def, hooks, data } => {
                self.data.insert(def.table.clone(), data);
                self.catalog.restore_table(def, hooks);
            }
            Undo::CreateRoutine { name, params } => {
                self.catalog.remove_routine(&name, &params);
            }
            Undo::DropRoutine(def) => self.catalog.restore_routine(def),
            Undo::CreateHook { table, name } => self.catalog.remove_hook(&table, &name),
            Undo::Insert { table, id } => {
                if let Some(data) = self.data.get_mut(&table) {
                    data.remove(id);
                }
            }
            Undo::Restore { table, id, row } => {
                if let Some(data) = self.data.get_mut(&table) {
                    data.put(id, row);
                }
            }
        }
    }
}

pub struct Transaction<'db> {
    db: &'db mut Database,
    id: TxId,
    started_at: DateTime<Utc>,
    undo: Vec<Undo>,
    finished: bool,
}

impl<'db> Transaction<'db> {
    pub fn id(&self) -> TxId {
        self.id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn catalog(&self) -> &Catalog {
        &self.db.catalog
    }

    pub fn config(&self) -> &Config {
        &self.db.config
    }

    /// Association view over this transaction's catalog, including
    /// uncommitted definitions.
    pub fn registry(&self) -> Registry<'_> {
        Registry::new(&self.db.catalog, &self.db.config)
    }

    pub fn commit(mut self) {
        self.finished = true;
        info!(txid = self.id, changes = self.undo.len(), "transaction committed");
        self.undo.clear();
    }

    pub fn rollback(mut self) {
        self.finished = true;
        info!(txid = self.id, changes = self.undo.len(), "transaction rolled back");
        self.rollback_to(0);
    }

    fn rollback_to(&mut self, mark: usize) {
        while self.undo.len() > mark {
            if let Some(entry) = self.undo.pop() {
                self.db.apply_undo(entry);
            }
        }
    }

    /// Run `f` as one statement: on error, everything it did is undone
    /// before the error is returned.
    pub(crate) fn statement<T, E>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, E>,
    ) -> Result<T, E> {
        let mark = self.undo.len();
        let result = f(self);
        if result.is_err() {
            self.rollback_to(mark);
        }
        result
    }

    // ------------------------------------------------------------------
    // DDL
    // ------------------------------------------------------------------

    pub fn execute(&mut self, statement: &Statement) -> Result<(), StorageError> {
        debug!(txid = self.id, %statement, "executing statement");

        match statement {
            Statement::CreateSchema {
                schema,
                if_not_exists,
            } => self.create_schema(schema, *if_not_exists),

            Statement::CreateTable {
                table,
                like,
                inherits,
                columns,
            } => {
                let def =
                    self.table_from_statement(table, like.as_ref(), inherits.as_ref(), columns)?;
                self.create_table(def)
            }

            Statement::CreateRecorder {
                name,
                new_param,
                old_param,
                returns,
                body,
            } => {
                let catalog = &self.db.catalog;
                let def = RoutineDef {
                    name: name.clone(),
                    params: vec![
                        catalog.require_table(new_param)?.row_type,
                        catalog.require_table(old_param)?.row_type,
                    ],
                    returns: ReturnType::Row(catalog.require_table(returns)?.row_type),
                    body: RoutineBody::Recorder(body.clone()),
                };
                self.create_routine(def)
            }

            Statement::CreateHook {
                name,
                table,
                events,
                function,
            } => {
                self.db.catalog.create_hook(HookDef {
                    name: name.clone(),
                    table: table.clone(),
                    events: events.clone(),
                    function: function.clone(),
                })?;
                self.undo.push(Undo::CreateHook {
                    table: table.clone(),
                    name: name.clone(),
                });
                Ok(())
            }
        }
    }

    /// Execute statements in order. Either all take effect or none do.
    pub fn execute_batch(&mut self, statements: &[Statement]) -> Result<(), StorageError> {
        self.statement(|tx| statements.iter().try_for_each(|s| tx.execute(s)))
    }

    pub fn create_schema(
        &mut self,
        schema: &str,
        if_not_exists: bool,
    ) -> Result<(), StorageError> {
        if if_not_exists && self.db.catalog.has_schema(schema) {
            debug!(schema, "schema exists, skipping");
            return Ok(());
        }
        self.db.catalog.create_schema(schema)?;
        self.undo.push(Undo::CreateSchema(schema.to_string()));
        Ok(())
    }

    pub fn create_table(&mut self, def: TableDef) -> Result<(), StorageError> {
        let table = def.table.clone();
        let data = TableData::new(&def);
        self.db.catalog.create_table(def)?;
        self.db.data.insert(table.clone(), data);
        self.undo.push(Undo::CreateTable(table));
        Ok(())
    }

    pub fn create_routine(&mut self, def: RoutineDef) -> Result<(), StorageError> {
        let (name, params) = (def.name.clone(), def.params.clone());
        self.db.catalog.create_routine(def)?;
        self.undo.push(Undo::CreateRoutine { name, params });
        Ok(())
    }

    /// Drop a table with its rows and hook bindings. Routines typed on
    /// the table are left in place.
    pub fn drop_table(&mut self, table: &TableRef) -> Result<(), StorageError> {
        let (def, hooks) = self.db.catalog.remove_table(table)?;
        let data = match self.db.data.remove(table) {
            Some(data) => data,
            None => TableData::new(&def),
        };
        debug!(txid = self.id, %table, "table dropped");
        self.undo.push(Undo::DropTable { def, hooks, data });
        Ok(())
    }

    pub fn drop_routine(
        &mut self,
        name: &QualifiedName,
        params: &[RowTypeId],
    ) -> Result<(), StorageError> {
        let def = self
            .db
            .catalog
            .remove_routine(name, params)
            .ok_or_else(|| CatalogError::RoutineNotFound(name.clone()))?;
        debug!(txid = self.id, routine = %name, "routine dropped");
        self.undo.push(Undo::DropRoutine(def));
        Ok(())
    }

    fn table_from_statement(
        &self,
        table: &TableRef,
        like: Option<&TableRef>,
        inherits: Option<&TableRef>,
        columns: &[ColumnDef],
    ) -> Result<TableDef, StorageError> {
        let catalog = &self.db.catalog;
        let mut all_columns: Vec<ColumnDef> = Vec::new();
        let mut indexes = Vec::new();

        if let Some(source) = like {
            let source = catalog.require_table(source)?;
            all_columns.extend(source.columns.iter().cloned());
            indexes.extend(source.indexes.iter().map(|idx| IndexDef {
                name: format!("{}_{}_idx", table.name, idx.column),
                column: idx.column.clone(),
            }));
        }

        if let Some(parent) = inherits {
            // Inherited columns come first; defaults travel with them.
            let parent = catalog.require_table(parent)?;
            let missing: Vec<_> = parent
                .columns
                .iter()
                .filter(|c| !all_columns.iter().any(|own| own.name == c.name))
                .cloned()
                .collect();
            all_columns.splice(0..0, missing);
        }

        all_columns.extend(columns.iter().cloned());

        Ok(TableDef {
            table: table.clone(),
            row_type: RowTypeId::generate(),
            columns: all_columns,
            indexes,
            parent: inherits.cloned(),
            is_abstract: false,
        })
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    pub fn insert(&mut self, table: &TableRef, row: Row) -> Result<RowId, StorageError> {
        self.statement(|tx| tx.insert_row(table, row).map(|(id, _)| id))
    }

    /// Apply `changes` on top of the row stored under `id`.
    pub fn update(
        &mut self,
        table: &TableRef,
        id: RowId,
        changes: &Row,
    ) -> Result<(), StorageError> {
        self.statement(|tx| tx.update_row(table, id, changes))
    }

    /// Update every row matching `predicate`. Returns the number of rows.
    pub fn update_where(
        &mut self,
        table: &TableRef,
        predicate: impl Fn(&Row) -> bool,
        changes: &Row,
    ) -> Result<usize, StorageError> {
        self.statement(|tx| {
            let ids = tx.matching(table, &predicate)?;
            for id in &ids {
                tx.update_row(table, *id, changes)?;
            }
            Ok(ids.len())
        })
    }

    pub fn delete(&mut self, table: &TableRef, id: RowId) -> Result<(), StorageError> {
        self.statement(|tx| tx.delete_row(table, id))
    }

    /// Delete every row matching `predicate`. Returns the number of rows.
    pub fn delete_where(
        &mut self,
        table: &TableRef,
        predicate: impl Fn(&Row) -> bool,
    ) -> Result<usize, StorageError> {
        self.statement(|tx| {
            let ids = tx.matching(table, &predicate)?;
            for id in &ids {
                tx.delete_row(table, *id)?;
            }
            Ok(ids.len())
        })
    }

    /// Store a row and fire hooks. Returns the stored image, defaults
    /// included. Not atomic on its own; callers wrap it in a statement.
    pub(crate) fn insert_row(
        &mut self,
        table: &TableRef,
        row: Row,
    ) -> Result<(RowId, Row), StorageError> {
        let def = self.db.catalog.require_table(table)?.clone();
        if def.is_abstract {
            return Err(StorageError::AbstractTable(table.clone()));
        }

        let full = self.complete_row(&def, &row)?;
        let data = self.db.table_data_mut(table)?;
        let id = data.allocate();
        data.put(id, full.clone());
        self.undo.push(Undo::Insert {
            table: table.clone(),
            id,
        });
        trace!(txid = self.id, %table, %id, "row inserted");

        self.fire_hooks(table, ChangeEvent::Insert { new: full.clone() })?;
        Ok((id, full))
    }

    fn update_row(
        &mut self,
        table: &TableRef,
        id: RowId,
        changes: &Row,
    ) -> Result<(), StorageError> {
        self.check_mutable(table)?;
        let def = self.db.catalog.require_table(table)?.clone();
        let old = self.stored(table, id)?;

        let new = old.merged(changes);
        for column in changes.columns() {
            if def.column(column).is_none() {
                return Err(StorageError::UnknownColumn {
                    table: table.clone(),
                    column: column.to_string(),
                });
            }
        }
        for column in &def.columns {
            self.check_value(&def, column, new.get(&column.name).unwrap_or(&Value::Null))?;
        }

        self.db.table_data_mut(table)?.put(id, new.clone());
        self.undo.push(Undo::Restore {
            table: table.clone(),
            id,
            row: old.clone(),
        });
        trace!(txid = self.id, %table, %id, "row updated");

        self.fire_hooks(table, ChangeEvent::Update { new, old })
    }

    fn delete_row(&mut self, table: &TableRef, id: RowId) -> Result<(), StorageError> {
        self.check_mutable(table)?;
        let old = self.stored(table, id)?;

        self.db.table_data_mut(table)?.remove(id);
        self.undo.push(Undo::Restore {
            table: table.clone(),
            id,
            row: old.clone(),
        });
        trace!(txid = self.id, %table, %id, "row deleted");

        self.fire_hooks(table, ChangeEvent::Delete { old })
    }

    /// Log tables only ever grow.
    fn check_mutable(&self, table: &TableRef) -> Result<(), StorageError> {
        let parent = self.db.config.log_parent_ref();
        if self.db.catalog.is_descendant(table, &parent) {
            return Err(StorageError::AppendOnly(table.clone()));
        }
        Ok(())
    }

    fn stored(&self, table: &TableRef, id: RowId) -> Result<Row, StorageError> {
        self.db
            .table_data(table)?
            .get(id)
            .cloned()
            .ok_or_else(|| StorageError::RowNotFound {
                table: table.clone(),
                id,
            })
    }

    fn matching(
        &self,
        table: &TableRef,
        predicate: &impl Fn(&Row) -> bool,
    ) -> Result<Vec<RowId>, StorageError> {
        Ok(self
            .db
            .table_data(table)?
            .iter()
            .filter(|entry| predicate(entry.1))
            .map(|(id, _)| id)
            .collect())
    }

    /// Validate a row against its table and fill in defaults.
    fn complete_row(&self, def: &TableDef, row: &Row) -> Result<Row, StorageError> {
        if let Some(unknown) = row.columns().find(|c| def.column(c).is_none()) {
            return Err(StorageError::UnknownColumn {
                table: def.table.clone(),
                column: unknown.to_string(),
            });
        }

        let mut full = Row::new();
        for column in &def.columns {
            let value = match (row.get(&column.name), &column.default) {
                (Some(value), _) => value.clone(),
                (None, Some(default)) => self.evaluate(default),
                (None, None) => Value::Null,
            };
            self.check_value(def, column, &value)?;
            full.set(column.name.clone(), value);
        }
        Ok(full)
    }

    fn check_value(
        &self,
        def: &TableDef,
        column: &ColumnDef,
        value: &Value,
    ) -> Result<(), StorageError> {
        if value.is_null() && !column.nullable {
            return Err(StorageError::NotNull {
                table: def.table.clone(),
                column: column.name.clone(),
            });
        }
        if !value.fits(column.ty) {
            return Err(StorageError::TypeMismatch {
                table: def.table.clone(),
                column: column.name.clone(),
                expected: column.ty,
            });
        }
        // Row images are logged as JSON, which has no NaN or infinity.
        if matches!(value, Value::Float(f) if !f.is_finite()) {
            return Err(StorageError::NonFinite {
                table: def.table.clone(),
                column: column.name.clone(),
            });
        }
        Ok(())
    }

    fn evaluate(&self, default: &DefaultExpr) -> Value {
        match default {
            DefaultExpr::CurrentTxId => Value::Int(i64::try_from(self.id).unwrap_or(i64::MAX)),
            DefaultExpr::CurrentTimestamp => Value::Timestamp(self.started_at),
            DefaultExpr::Literal(value) => value.clone(),
        }
    }

    fn fire_hooks(&mut self, table: &TableRef, event: ChangeEvent) -> Result<(), StorageError> {
        let kind = event.kind();
        let hooks: Vec<HookDef> = self
            .db
            .catalog
            .hooks_on(table)
            .iter()
            .filter(|h| h.events.contains(&kind))
            .cloned()
            .collect();

        for bound in hooks {
            let body = self
                .db
                .catalog
                .routine(&bound.function, &[])
                .filter(|r| r.returns == ReturnType::Hook)
                .map(|r| r.body.clone())
                .ok_or_else(|| StorageError::NotAHook(bound.function.clone()))?;

            trace!(txid = self.id, %table, hook = %bound.name, event = ?kind, "firing hook");
            match body {
                RoutineBody::ChangeCapture => hook::capture(self, table, &event)?,
                RoutineBody::Recorder(_) => return Err(StorageError::NotAHook(bound.function)),
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    pub fn get(&self, table: &TableRef, id: RowId) -> Result<Option<Row>, StorageError> {
        Ok(self.db.table_data(table)?.get(id).cloned())
    }

    /// Rows of a table as seen by this transaction, in row id order.
    pub fn scan(&self, table: &TableRef) -> Result<Vec<(RowId, Row)>, StorageError> {
        self.db.scan(table)
    }

    /// Rows whose `column` equals `value`, using an index when available.
    pub fn lookup(
        &self,
        table: &TableRef,
        column: &str,
        value: &Value,
    ) -> Result<Vec<Row>, StorageError> {
        let def = self.db.catalog.require_table(table)?;
        if def.column(column).is_none() {
            return Err(StorageError::UnknownColumn {
                table: table.clone(),
                column: column.to_string(),
            });
        }

        let data = self.db.table_data(table)?;
        Ok(data
            .lookup(column, value)
            .into_iter()
            .filter_map(|id| data.get(id).cloned())
            .collect())
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if !self.finished {
            warn!(txid = self.id, "transaction dropped without commit, rolling back");
            self.rollback_to(0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db_with_users() -> (Database, TableRef) {
        let mut db = Database::new(Config::default_config()).unwrap();
        let users = TableRef::new("public", "users");

        let mut tx = db.begin();
        tx.create_schema("public", true).unwrap();
        tx.create_table(TableDef::new(
            users.clone(),
            vec![
                ColumnDef::new("id", ColumnType::Int).not_null(),
                ColumnDef::new("name", ColumnType::Text),
                ColumnDef::new("active", ColumnType::Bool)
                    .with_default(DefaultExpr::Literal(Value::Bool(true))),
            ],
        ))
        .unwrap();
        tx.commit();

        (db, users)
    }

    #[test]
    fn bootstrap_installs_abstract_parent() {
        let db = Database::new(Config::default_config()).unwrap();
        let parent = db.config().log_parent_ref();
        let def = db.catalog().table(&parent).unwrap();

        assert!(def.is_abstract);
        assert!(def.column("txid").is_some());
        assert!(def.column("at").is_some());
        assert_eq!(def.indexes.len(), 2);
    }

    #[test]
    fn abstract_parent_rejects_rows() {
        let mut db = Database::new(Config::default_config()).unwrap();
        let parent = db.config().log_parent_ref();

        let mut tx = db.begin();
        let err = tx.insert(&parent, Row::new()).unwrap_err();
        assert!(matches!(err, StorageError::AbstractTable(_)));
    }

    #[test]
    fn insert_applies_defaults_and_validates() {
        let (mut db, users) = db_with_users();
        let mut tx = db.begin();

        let id = tx.insert(&users, Row::new().with("id", 1)).unwrap();
        let row = tx.get(&users, id).unwrap().unwrap();
        assert_eq!(row.get("active"), Some(&Value::Bool(true)));
        assert_eq!(row.get("name"), Some(&Value::Null));

        let err = tx.insert(&users, Row::new().with("name", "x")).unwrap_err();
        assert!(matches!(err, StorageError::NotNull { .. }));

        let err = tx.insert(&users, Row::new().with("id", "one")).unwrap_err();
        assert!(matches!(err, StorageError::TypeMismatch { .. }));

        let err = tx
            .insert(&users, Row::new().with("id", 2).with("email", "a@b"))
            .unwrap_err();
        assert!(matches!(err, StorageError::UnknownColumn { .. }));
    }

    #[test]
    fn non_finite_floats_are_rejected() {
        let mut db = Database::new(Config::default_config()).unwrap();
        let readings = TableRef::new("public", "readings");

        let mut tx = db.begin();
        tx.create_schema("public", true).unwrap();
        tx.create_table(TableDef::new(
            readings.clone(),
            vec![ColumnDef::new("value", ColumnType::Float)],
        ))
        .unwrap();

        for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let err = tx.insert(&readings, Row::new().with("value", bad)).unwrap_err();
            assert!(matches!(err, StorageError::NonFinite { .. }));
        }

        let id = tx.insert(&readings, Row::new().with("value", 1.5)).unwrap();
        let err = tx
            .update(&readings, id, &Row::new().with("value", f64::NAN))
            .unwrap_err();
        assert!(matches!(err, StorageError::NonFinite { .. }));
        assert_eq!(
            tx.get(&readings, id).unwrap().unwrap().get("value"),
            Some(&Value::Float(1.5))
        );
    }

    #[test]
    fn dropped_transaction_rolls_back() {
        let (mut db, users) = db_with_users();

        {
            let mut tx = db.begin();
            tx.insert(&users, Row::new().with("id", 1)).unwrap();
            tx.create_schema("scratch", false).unwrap();
        }

        assert!(db.scan(&users).unwrap().is_empty());
        assert!(!db.catalog().has_schema("scratch"));
    }

    #[test]
    fn update_and_delete_round_trip_through_rollback() {
        let (mut db, users) = db_with_users();

        let mut tx = db.begin();
        let id = tx.insert(&users, Row::new().with("id", 1).with("name", "a")).unwrap();
        tx.commit();

        let mut tx = db.begin();
        tx.update(&users, id, &Row::new().with("name", "b")).unwrap();
        assert_eq!(tx.delete_where(&users, |_| true).unwrap(), 1);
        assert!(tx.get(&users, id).unwrap().is_none());
        tx.rollback();

        let rows = db.scan(&users).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].1.get("name"), Some(&Value::Text("a".into())));
    }

    #[test]
    fn failed_batch_leaves_nothing_behind() {
        let (mut db, users) = db_with_users();

        let mut tx = db.begin();
        let err = tx
            .execute_batch(&[
                Statement::CreateSchema {
                    schema: "audit".into(),
                    if_not_exists: true,
                },
                Statement::CreateTable {
                    table: TableRef::new("audit", "users"),
                    like: None,
                    inherits: None,
                    columns: vec![ColumnDef::new("doc", ColumnType::Json)],
                },
                Statement::CreateTable {
                    table: users.clone(),
                    like: None,
                    inherits: None,
                    columns: vec![],
                },
            ])
            .unwrap_err();
        assert!(matches!(
            err,
            StorageError::Catalog(CatalogError::TableExists(_))
        ));

        assert!(!tx.catalog().has_schema("audit"));
        assert!(tx.catalog().table(&TableRef::new("audit", "users")).is_none());
        tx.commit();
    }

    #[test]
    fn create_table_like_copies_layout_and_indexes() {
        let mut db = Database::new(Config::default_config()).unwrap();
        let parent = db.config().log_parent_ref();
        let child = TableRef::new("statelog", "child");

        let mut tx = db.begin();
        tx.execute(&Statement::CreateTable {
            table: child.clone(),
            like: Some(parent.clone()),
            inherits: Some(parent.clone()),
            columns: vec![ColumnDef::new("new", ColumnType::Json)],
        })
        .unwrap();

        let def = tx.catalog().table(&child).unwrap();
        let names: Vec<_> = def.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["txid", "at", "new"]);
        assert_eq!(def.indexes[0].name, "child_txid_idx");
        assert!(tx.catalog().is_descendant(&child, &parent));

        let id = tx.insert(&child, Row::new()).unwrap();
        let row = tx.get(&child, id).unwrap().unwrap();
        assert_eq!(row.get("txid"), Some(&Value::Int(tx.id() as i64)));
        assert_eq!(row.get("at"), Some(&Value::Timestamp(tx.started_at())));

        let by_txid = tx.lookup(&child, "txid", &Value::Int(tx.id() as i64)).unwrap();
        assert_eq!(by_txid.len(), 1);
        tx.commit();
    }
}
