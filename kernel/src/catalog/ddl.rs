// DDL Statements
//
// Typed schema-definition statements consumed by the storage engine.
// Each statement also renders as PostgreSQL-flavoured text; the text is
// for humans and carries no meaning of its own.

use std::fmt;

use super::ident::{quote_ident, QualifiedName, TableRef};
use super::{ColumnDef, HookEvent};
use crate::recorder::{ImageSource, RecorderBody};

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    CreateSchema {
        schema: String,
        if_not_exists: bool,
    },

    /// `like` copies the columns, defaults and indexes of another table;
    /// `inherits` records the inheritance link.
    CreateTable {
        table: TableRef,
        like: Option<TableRef>,
        inherits: Option<TableRef>,
        columns: Vec<ColumnDef>,
    },

    /// A two-argument recorder overload `(new, old)` returning a log row.
    CreateRecorder {
        name: QualifiedName,
        new_param: TableRef,
        old_param: TableRef,
        returns: TableRef,
        body: RecorderBody,
    },

    /// Row-level AFTER hook.
    CreateHook {
        name: String,
        table: TableRef,
        events: Vec<HookEvent>,
        function: QualifiedName,
    },
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Statement::CreateSchema {
                schema,
                if_not_exists,
            } => {
                let guard = if *if_not_exists { " IF NOT EXISTS" } else { "" };
                write!(f, "CREATE SCHEMA{guard} {};", quote_ident(schema))
            }

            Statement::CreateTable {
                table,
                like,
                inherits,
                columns,
            } => {
                let mut items = Vec::new();
                if let Some(like) = like {
                    items.push(format!("LIKE {like} INCLUDING ALL"));
                }
                items.extend(columns.iter().map(ToString::to_string));

                write!(f, "CREATE TABLE {table} (")?;
                for (i, item) in items.iter().enumerate() {
                    let sep = if i + 1 < items.len() { "," } else { "" };
                    write!(f, "\n    {item}{sep}")?;
                }
                f.write_str("\n)")?;
                if let Some(parent) = inherits {
                    write!(f, " INHERITS ({parent})")?;
                }
                f.write_str(";")
            }

            Statement::CreateRecorder {
                name,
                new_param,
                old_param,
                returns,
                body,
            } => {
                let columns: Vec<_> = body
                    .payload
                    .iter()
                    .map(|b| quote_ident(&b.column))
                    .collect();
                let values: Vec<_> = body
                    .payload
                    .iter()
                    .map(|b| match b.source {
                        ImageSource::New => "to_jsonb($1)",
                        ImageSource::Old => "to_jsonb($2)",
                    })
                    .collect();

                writeln!(
                    f,
                    "CREATE FUNCTION {name}(new {new_param}, old {old_param}) RETURNS {returns} AS $$"
                )?;
                writeln!(
                    f,
                    "    INSERT INTO {} ({}) VALUES ({}) RETURNING *",
                    body.target,
                    columns.join(", "),
                    values.join(", ")
                )?;
                f.write_str("$$ LANGUAGE sql;")
            }

            Statement::CreateHook {
                name,
                table,
                events,
                function,
            } => {
                let events: Vec<_> = events.iter().map(HookEvent::sql_name).collect();
                write!(
                    f,
                    "CREATE TRIGGER {} AFTER {} ON {table} FOR EACH ROW EXECUTE FUNCTION {function}();",
                    quote_ident(name),
                    events.join(" OR ")
                )
            }
        }
    }
}
