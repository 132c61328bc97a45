// Change Capture
//
// The one generic hook bound to every instrumented base table. It knows
// nothing about any particular table: it classifies the change and hands
// the row images to whichever recorder overload accepts the firing
// table's row type.

use tracing::trace;

use crate::catalog::{HookEvent, ReturnType, RoutineBody, RoutineDef, TableRef};
use crate::config::Config;
use crate::recorder;
use crate::storage::{Row, StorageError, Transaction};

/// One affected row. Never stored.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent {
    Insert { new: Row },
    Update { new: Row, old: Row },
    Delete { old: Row },
}

impl ChangeEvent {
    pub fn kind(&self) -> HookEvent {
        match self {
            ChangeEvent::Insert { .. } => HookEvent::Insert,
            ChangeEvent::Update { .. } => HookEvent::Update,
            ChangeEvent::Delete { .. } => HookEvent::Delete,
        }
    }

    /// After-image; absent for deletions.
    pub fn new_image(&self) -> Option<&Row> {
        match self {
            ChangeEvent::Insert { new } | ChangeEvent::Update { new, .. } => Some(new),
            ChangeEvent::Delete { .. } => None,
        }
    }

    /// Before-image; absent for insertions.
    pub fn old_image(&self) -> Option<&Row> {
        match self {
            ChangeEvent::Update { old, .. } | ChangeEvent::Delete { old } => Some(old),
            ChangeEvent::Insert { .. } => None,
        }
    }
}

/// Definition of the change-capture routine installed at bootstrap.
pub fn capture_routine(config: &Config) -> RoutineDef {
    RoutineDef {
        name: config.capture_name(),
        params: Vec::new(),
        returns: ReturnType::Hook,
        body: RoutineBody::ChangeCapture,
    }
}

/// Handle one affected row of `table`: dispatch to the recorder overload
/// typed on `table`'s row type. A missing overload fails the write.
pub fn capture(
    tx: &mut Transaction<'_>,
    table: &TableRef,
    event: &ChangeEvent,
) -> Result<(), StorageError> {
    let row_type = tx.catalog().require_table(table)?.row_type;
    let name = tx.config().recorder_name();

    let routine = tx
        .catalog()
        .routine(&name, &[row_type, row_type])
        .cloned()
        .ok_or_else(|| StorageError::RecorderMissing {
            name: name.clone(),
            table: table.clone(),
        })?;

    trace!(txid = tx.id(), %table, event = ?event.kind(), recorder = %name, "dispatching change");
    recorder::invoke(tx, &routine, event.new_image(), event.old_image())?;
    Ok(())
}
