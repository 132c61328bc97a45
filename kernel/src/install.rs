// Install
//
// The public entry point: resolve the log location, generate the batch,
// execute it, then report the new state table as seen by the registry.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::catalog::{CatalogError, TableRef};
use crate::generate::{self, Batch};
use crate::naming::{self, NamingError};
use crate::recorder::LogMode;
use crate::storage::{Database, StorageError, Transaction};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstallOptions {
    pub log_schema: Option<String>,
    pub log_name: Option<String>,
    pub with_old_image: bool,
}

impl InstallOptions {
    pub fn mode(&self) -> LogMode {
        LogMode::with_old_image(self.with_old_image)
    }
}

/// Errors that can occur while instrumenting a table.
#[derive(Debug, thiserror::Error)]
pub enum InstallError {
    #[error("configuration error: {0}")]
    Naming(#[from] NamingError),

    #[error("generation failed: {0}")]
    Storage(#[from] StorageError),

    #[error("installed log for {0} is not discoverable")]
    NotDiscovered(TableRef),
}

impl From<CatalogError> for InstallError {
    fn from(e: CatalogError) -> Self {
        InstallError::Storage(e.into())
    }
}

/// Generate the instrumentation batch for `base` without executing it.
pub fn plan(
    tx: &Transaction<'_>,
    base: &TableRef,
    options: &InstallOptions,
) -> Result<Batch, InstallError> {
    let resolved = naming::resolve(
        tx.config(),
        base,
        options.log_schema.as_deref(),
        options.log_name.as_deref(),
        options.mode(),
    )?;
    Ok(generate::generate(tx.catalog(), tx.config(), base, &resolved)?)
}

/// Instrument `base` inside `tx` and return its state table.
///
/// On failure nothing from this call remains in `tx`. A second install on
/// the same base table fails: the recorder overload already exists.
pub fn install(
    tx: &mut Transaction<'_>,
    base: &TableRef,
    options: &InstallOptions,
) -> Result<(TableRef, Batch), InstallError> {
    let batch = plan(tx, base, options)?;
    let state = execute_and_discover(tx, &batch, base)?;

    info!(txid = tx.id(), %base, %state, mode = ?options.mode(), "state log installed");
    Ok((state, batch))
}

/// Execute `batch` and find the state table it created for `base`. The
/// batch is undone if the table cannot be found.
fn execute_and_discover(
    tx: &mut Transaction<'_>,
    batch: &Batch,
    base: &TableRef,
) -> Result<TableRef, InstallError> {
    tx.statement(|tx| {
        tx.execute_batch(batch.statements())?;
        tx.registry()
            .lookup(base)
            .ok_or_else(|| InstallError::NotDiscovered(base.clone()))
    })
}

impl Database {
    /// Instrument `base` in a transaction of its own, committed on success.
    pub fn install(
        &mut self,
        base: &TableRef,
        options: &InstallOptions,
    ) -> Result<TableRef, InstallError> {
        let mut tx = self.begin();
        let (state, _) = install(&mut tx, base, options)?;
        tx.commit();
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ColumnDef, ColumnType, TableDef};
    use crate::config::Config;

    fn db() -> (Database, TableRef) {
        let mut db = Database::new(Config::default_config()).unwrap();
        let base = TableRef::new("public", "users");

        let mut tx = db.begin();
        tx.create_schema("public", false).unwrap();
        tx.create_table(TableDef::new(
            base.clone(),
            vec![ColumnDef::new("id", ColumnType::Int)],
        ))
        .unwrap();
        tx.commit();

        (db, base)
    }

    #[test]
    fn install_returns_state_table() {
        let (mut db, base) = db();
        let state = db.install(&base, &InstallOptions::default()).unwrap();
        assert_eq!(state, TableRef::new("public", "users/state"));
    }

    #[test]
    fn shadowing_location_is_a_configuration_error() {
        let (mut db, base) = db();
        let options = InstallOptions {
            log_schema: Some("public".into()),
            log_name: Some("users".into()),
            with_old_image: true,
        };

        let err = db.install(&base, &options).unwrap_err();
        assert!(matches!(err, InstallError::Naming(_)));
        assert!(db.registry().associations().is_empty());
    }

    #[test]
    fn failed_install_leaves_transaction_clean() {
        let (mut db, base) = db();
        db.install(&base, &InstallOptions::default()).unwrap();

        let mut tx = db.begin();
        let options = InstallOptions {
            log_schema: Some("elsewhere".into()),
            ..InstallOptions::default()
        };
        let err = install(&mut tx, &base, &options).unwrap_err();
        assert!(matches!(
            err,
            InstallError::Storage(StorageError::Catalog(CatalogError::RoutineExists { .. }))
        ));

        assert!(!tx.catalog().has_schema("elsewhere"));
        assert_eq!(tx.registry().log_tables().len(), 1);
        tx.commit();
    }

    #[test]
    fn undiscoverable_batch_is_undone() {
        let (mut db, base) = db();
        let mut tx = db.begin();
        tx.create_table(TableDef::new(
            TableRef::new("public", "orders"),
            vec![ColumnDef::new("id", ColumnType::Int)],
        ))
        .unwrap();

        // The batch instruments users, so orders is never discovered.
        let batch = plan(&tx, &base, &InstallOptions::default()).unwrap();
        let orders = TableRef::new("public", "orders");
        let err = execute_and_discover(&mut tx, &batch, &orders).unwrap_err();
        assert!(matches!(err, InstallError::NotDiscovered(t) if t == orders));

        assert!(tx.registry().lookup(&base).is_none());
        assert!(tx.catalog().table(&TableRef::new("public", "users/state")).is_none());
        assert!(tx.catalog().hooks_on(&base).is_empty());
        assert!(tx.catalog().table(&orders).is_some());
        tx.commit();
    }

    #[test]
    fn plan_does_not_touch_the_catalog() {
        let (mut db, base) = db();
        let tx = db.begin();

        let batch = plan(&tx, &base, &InstallOptions::default()).unwrap();
        assert_eq!(batch.len(), 4);
        assert!(tx.registry().lookup(&base).is_none());
    }
}
