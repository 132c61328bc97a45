// Identifiers
//
// Schema-qualified references to tables and routines, and the
// quoting rules used when they are rendered into DDL text.

use serde::{Deserialize, Serialize};
use std::fmt;

const RESERVED: &[&str] = &[
    "all", "and", "as", "check", "column", "create", "default", "delete", "desc", "distinct",
    "do", "else", "end", "false", "for", "from", "grant", "group", "having", "in", "insert",
    "into", "is", "join", "limit", "not", "null", "offset", "on", "or", "order", "select",
    "table", "then", "to", "true", "union", "unique", "update", "user", "using", "when",
    "where", "with",
];

/// Quote an identifier unless it is a plain lower-case word.
pub fn quote_ident(ident: &str) -> String {
    let mut chars = ident.chars();
    let simple = match chars.next() {
        Some(first) => {
            (first.is_ascii_lowercase() || first == '_')
                && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        }
        None => false,
    };

    if simple && !RESERVED.contains(&ident) {
        ident.to_string()
    } else {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }
}

/// Stable reference to a table: namespace plus name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TableRef {
    pub schema: String,
    pub name: String,
}

impl TableRef {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", quote_ident(&self.schema), quote_ident(&self.name))
    }
}

/// Schema-qualified routine name. Overloads share one name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QualifiedName {
    pub schema: String,
    pub name: String,
}

impl QualifiedName {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", quote_ident(&self.schema), quote_ident(&self.name))
    }
}
