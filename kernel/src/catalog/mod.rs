// Catalog
//
// Metadata for schemas, tables, routines and hook bindings.
// The catalog only stores definitions; row data lives in `storage`.
// Nothing here knows about version logs: the log tables, recorders and
// hook bindings are ordinary catalog entries created from DDL.

pub mod ddl;
pub mod ident;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use uuid::Uuid;

pub use ddl::Statement;
pub use ident::{quote_ident, QualifiedName, TableRef};

use crate::recorder::RecorderBody;
use crate::storage::Value;

/// Identity of a table's row type. Survives nothing but the table itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RowTypeId(pub Uuid);

impl RowTypeId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Bool,
    Int,
    Float,
    Text,
    Timestamp,
    Json,
}

impl ColumnType {
    pub fn sql_name(&self) -> &'static str {
        match self {
            ColumnType::Bool => "boolean",
            ColumnType::Int => "bigint",
            ColumnType::Float => "double precision",
            ColumnType::Text => "text",
            ColumnType::Timestamp => "timestamptz",
            ColumnType::Json => "jsonb",
        }
    }
}

/// Column default, evaluated at insertion time.
#[derive(Debug, Clone, PartialEq)]
pub enum DefaultExpr {
    /// Id of the inserting transaction.
    CurrentTxId,
    /// Start time of the inserting transaction.
    CurrentTimestamp,
    Literal(Value),
}

impl fmt::Display for DefaultExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefaultExpr::CurrentTxId => f.write_str("txid_current()"),
            DefaultExpr::CurrentTimestamp => f.write_str("now()"),
            DefaultExpr::Literal(value) => match value {
                Value::Null => f.write_str("NULL"),
                Value::Bool(b) => write!(f, "{b}"),
                Value::Int(i) => write!(f, "{i}"),
                Value::Float(x) => write!(f, "{x}"),
                Value::Text(s) => write!(f, "'{}'", s.replace('\'', "''")),
                Value::Timestamp(_) | Value::Json(_) => {
                    let cast = if matches!(value, Value::Json(_)) {
                        "jsonb"
                    } else {
                        "timestamptz"
                    };
                    let text = match value.to_json() {
                        serde_json::Value::String(s) => s,
                        other => other.to_string(),
                    };
                    write!(f, "'{}'::{cast}", text.replace('\'', "''"))
                }
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    pub name: String,
    pub ty: ColumnType,
    pub nullable: bool,
    pub default: Option<DefaultExpr>,
}

impl ColumnDef {
    /// A nullable column without default.
    pub fn new(name: impl Into<String>, ty: ColumnType) -> Self {
        Self {
            name: name.into(),
            ty,
            nullable: true,
            default: None,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn with_default(mut self, default: DefaultExpr) -> Self {
        self.default = Some(default);
        self
    }
}

impl fmt::Display for ColumnDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", quote_ident(&self.name), self.ty.sql_name())?;
        if !self.nullable {
            f.write_str(" NOT NULL")?;
        }
        if let Some(default) = &self.default {
            write!(f, " DEFAULT {default}")?;
        }
        Ok(())
    }
}

/// Single-column B-tree index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDef {
    pub name: String,
    pub column: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableDef {
    pub table: TableRef,
    pub row_type: RowTypeId,
    pub columns: Vec<ColumnDef>,
    pub indexes: Vec<IndexDef>,
    /// Inheritance parent, if any.
    pub parent: Option<TableRef>,
    /// Abstract tables only carry a layout; they never hold rows.
    pub is_abstract: bool,
}

impl TableDef {
    pub fn new(table: TableRef, columns: Vec<ColumnDef>) -> Self {
        Self {
            table,
            row_type: RowTypeId::generate(),
            columns,
            indexes: Vec::new(),
            parent: None,
            is_abstract: false,
        }
    }

    pub fn with_index(mut self, column: impl Into<String>) -> Self {
        let column = column.into();
        self.indexes.push(IndexDef {
            name: format!("{}_{}_idx", self.table.name, column),
            column,
        });
        self
    }

    pub fn abstract_table(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HookEvent {
    Insert,
    Update,
    Delete,
}

impl HookEvent {
    pub fn sql_name(&self) -> &'static str {
        match self {
            HookEvent::Insert => "INSERT",
            HookEvent::Update => "UPDATE",
            HookEvent::Delete => "DELETE",
        }
    }
}

/// Row-level AFTER hook bound to one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookDef {
    pub name: String,
    pub table: TableRef,
    pub events: Vec<HookEvent>,
    pub function: QualifiedName,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReturnType {
    /// Returns a row of the table owning this row type.
    Row(RowTypeId),
    /// Usable only as a hook function.
    Hook,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RoutineBody {
    /// The generic change-capture handler.
    ChangeCapture,
    Recorder(RecorderBody),
}

/// A routine overload. `(name, params)` is unique.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutineDef {
    pub name: QualifiedName,
    pub params: Vec<RowTypeId>,
    pub returns: ReturnType,
    pub body: RoutineBody,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("schema {0} already exists")]
    SchemaExists(String),

    #[error("schema {0} does not exist")]
    SchemaNotFound(String),

    #[error("relation {0} already exists")]
    TableExists(TableRef),

    #[error("relation {0} does not exist")]
    TableNotFound(TableRef),

    #[error("cannot drop {0}: other tables inherit from it")]
    HasDescendants(TableRef),

    #[error("column {column} specified more than once in {table}")]
    DuplicateColumn { table: TableRef, column: String },

    #[error("function {name}({signature}) already exists")]
    RoutineExists {
        name: QualifiedName,
        signature: String,
    },

    #[error("function {0} does not exist")]
    RoutineNotFound(QualifiedName),

    #[error("type {0:?} does not exist")]
    TypeNotFound(RowTypeId),

    #[error("hook {name} on {table} already exists")]
    HookExists { table: TableRef, name: String },

    #[error("function {0} cannot be bound as a hook")]
    NotAHookFunction(QualifiedName),
}

#[derive(Debug, Default, Clone)]
pub struct Catalog {
    schemas: BTreeSet<String>,
    tables: BTreeMap<TableRef, TableDef>,
    routines: BTreeMap<QualifiedName, Vec<RoutineDef>>,
    hooks: BTreeMap<TableRef, Vec<HookDef>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------
    // Schemas
    // ------------------------------------------------------------------

    pub fn create_schema(&mut self, schema: &str) -> Result<(), CatalogError> {
        if !self.schemas.insert(schema.to_string()) {
            return Err(CatalogError::SchemaExists(schema.to_string()));
        }
        Ok(())
    }

    pub fn has_schema(&self, schema: &str) -> bool {
        self.schemas.contains(schema)
    }

    pub(crate) fn remove_schema(&mut self, schema: &str) {
        self.schemas.remove(schema);
    }

    // ------------------------------------------------------------------
    // Tables
    // ------------------------------------------------------------------

    pub fn create_table(&mut self, def: TableDef) -> Result<(), CatalogError> {
        if !self.has_schema(&def.table.schema) {
            return Err(CatalogError::SchemaNotFound(def.table.schema.clone()));
        }
        if self.tables.contains_key(&def.table) {
            return Err(CatalogError::TableExists(def.table.clone()));
        }
        if let Some(parent) = &def.parent {
            if !self.tables.contains_key(parent) {
                return Err(CatalogError::TableNotFound(parent.clone()));
            }
        }

        let mut seen = BTreeSet::new();
        for column in &def.columns {
            if !seen.insert(column.name.as_str()) {
                return Err(CatalogError::DuplicateColumn {
                    table: def.table.clone(),
                    column: column.name.clone(),
                });
            }
        }

        self.tables.insert(def.table.clone(), def);
        Ok(())
    }

    pub fn table(&self, table: &TableRef) -> Option<&TableDef> {
        self.tables.get(table)
    }

    pub fn require_table(&self, table: &TableRef) -> Result<&TableDef, CatalogError> {
        self.table(table)
            .ok_or_else(|| CatalogError::TableNotFound(table.clone()))
    }

    pub fn tables(&self) -> impl Iterator<Item = &TableDef> {
        self.tables.values()
    }

    /// Resolve a row type back to the table that owns it.
    pub fn table_by_row_type(&self, row_type: RowTypeId) -> Option<&TableDef> {
        self.tables.values().find(|t| t.row_type == row_type)
    }

    /// Remove a table together with its hook bindings.
    pub(crate) fn remove_table(
        &mut self,
        table: &TableRef,
    ) -> Result<(TableDef, Vec<HookDef>), CatalogError> {
        if self.children(table).next().is_some() {
            return Err(CatalogError::HasDescendants(table.clone()));
        }
        let def = self
            .tables
            .remove(table)
            .ok_or_else(|| CatalogError::TableNotFound(table.clone()))?;
        let hooks = self.hooks.remove(table).unwrap_or_default();
        Ok((def, hooks))
    }

    pub(crate) fn restore_table(&mut self, def: TableDef, hooks: Vec<HookDef>) {
        if !hooks.is_empty() {
            self.hooks.insert(def.table.clone(), hooks);
        }
        self.tables.insert(def.table.clone(), def);
    }

    // ------------------------------------------------------------------
    // Inheritance
    // ------------------------------------------------------------------

    pub fn parent_of(&self, table: &TableRef) -> Option<&TableRef> {
        self.tables.get(table).and_then(|t| t.parent.as_ref())
    }

    fn children<'a>(&'a self, table: &'a TableRef) -> impl Iterator<Item = &'a TableDef> {
        self.tables
            .values()
            .filter(move |t| t.parent.as_ref() == Some(table))
    }

    /// Strict descendant check: a table is not its own descendant.
    pub fn is_descendant(&self, table: &TableRef, ancestor: &TableRef) -> bool {
        let mut current = self.parent_of(table);
        while let Some(parent) = current {
            if parent == ancestor {
                return true;
            }
            current = self.parent_of(parent);
        }
        false
    }

    /// Every table inheriting, directly or not, from `ancestor`.
    pub fn descendants(&self, ancestor: &TableRef) -> Vec<&TableDef> {
        self.tables
            .values()
            .filter(|t| self.is_descendant(&t.table, ancestor))
            .collect()
    }

    // ------------------------------------------------------------------
    // Routines
    // ------------------------------------------------------------------

    pub fn create_routine(&mut self, def: RoutineDef) -> Result<(), CatalogError> {
        for param in &def.params {
            if self.table_by_row_type(*param).is_none() {
                return Err(CatalogError::TypeNotFound(*param));
            }
        }
        if let ReturnType::Row(ret) = def.returns {
            if self.table_by_row_type(ret).is_none() {
                return Err(CatalogError::TypeNotFound(ret));
            }
        }
        if self.routine(&def.name, &def.params).is_some() {
            return Err(CatalogError::RoutineExists {
                signature: self.render_signature(&def.params),
                name: def.name,
            });
        }

        self.routines.entry(def.name.clone()).or_default().push(def);
        Ok(())
    }

    /// Exact overload lookup by parameter types.
    pub fn routine(&self, name: &QualifiedName, params: &[RowTypeId]) -> Option<&RoutineDef> {
        self.routines
            .get(name)
            .and_then(|overloads| overloads.iter().find(|r| r.params == params))
    }

    pub fn overloads(&self, name: &QualifiedName) -> &[RoutineDef] {
        self.routines.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub(crate) fn remove_routine(
        &mut self,
        name: &QualifiedName,
        params: &[RowTypeId],
    ) -> Option<RoutineDef> {
        let overloads = self.routines.get_mut(name)?;
        let pos = overloads.iter().position(|r| r.params == params)?;
        let removed = overloads.remove(pos);
        if overloads.is_empty() {
            self.routines.remove(name);
        }
        Some(removed)
    }

    pub(crate) fn restore_routine(&mut self, def: RoutineDef) {
        self.routines.entry(def.name.clone()).or_default().push(def);
    }

    fn render_signature(&self, params: &[RowTypeId]) -> String {
        params
            .iter()
            .map(|p| match self.table_by_row_type(*p) {
                Some(def) => def.table.to_string(),
                None => format!("{p:?}"),
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    // ------------------------------------------------------------------
    // Hooks
    // ------------------------------------------------------------------

    pub fn create_hook(&mut self, def: HookDef) -> Result<(), CatalogError> {
        self.require_table(&def.table)?;

        let is_hook_function = self
            .overloads(&def.function)
            .iter()
            .any(|r| r.params.is_empty() && r.returns == ReturnType::Hook);
        if !is_hook_function {
            if self.overloads(&def.function).is_empty() {
                return Err(CatalogError::RoutineNotFound(def.function.clone()));
            }
            return Err(CatalogError::NotAHookFunction(def.function.clone()));
        }

        let bound = self.hooks.entry(def.table.clone()).or_default();
        if bound.iter().any(|h| h.name == def.name) {
            return Err(CatalogError::HookExists {
                table: def.table.clone(),
                name: def.name.clone(),
            });
        }
        bound.push(def);
        Ok(())
    }

    pub fn hooks_on(&self, table: &TableRef) -> &[HookDef] {
        self.hooks.get(table).map(Vec::as_slice).unwrap_or(&[])
    }

    pub(crate) fn remove_hook(&mut self, table: &TableRef, name: &str) {
        if let Some(bound) = self.hooks.get_mut(table) {
            bound.retain(|h| h.name != name);
            if bound.is_empty() {
                self.hooks.remove(table);
            }
        }
    }
}
