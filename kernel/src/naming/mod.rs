// Log Naming
//
// Decides where a base table's state log lives. With no overrides the
// log sits next to the base table under "<name>/state"; moved into
// another schema it keeps the base table's own name.

use crate::catalog::TableRef;
use crate::config::Config;
use crate::recorder::LogMode;

/// Resolved log location, consumed by the generator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLog {
    pub table: TableRef,
    pub mode: LogMode,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum NamingError {
    #[error("state table for {0} would shadow the base table itself")]
    ShadowsBaseTable(TableRef),
}

/// Resolve the log location for `base`.
///
/// Fails when the result would be the base table's own location,
/// whatever the mode.
pub fn resolve(
    config: &Config,
    base: &TableRef,
    log_schema: Option<&str>,
    log_name: Option<&str>,
    mode: LogMode,
) -> Result<ResolvedLog, NamingError> {
    let schema = log_schema.unwrap_or(base.schema.as_str());

    let name = match log_name {
        Some(name) => name.to_string(),
        None if schema == base.schema => format!("{}{}", base.name, config.state_suffix),
        None => base.name.clone(),
    };

    let table = TableRef::new(schema, name);
    if &table == base {
        return Err(NamingError::ShadowsBaseTable(base.clone()));
    }

    Ok(ResolvedLog { table, mode })
}
