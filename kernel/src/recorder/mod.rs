// Recorder
//
// A recorder turns one (new, old) pair of row images into one row of a
// state table. Each instrumented base table gets its own overload of the
// reserved recorder name, typed on the base table's row type.

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::catalog::{RoutineBody, RoutineDef, TableRef};
use crate::storage::{Row, StorageError, Transaction, Value};

/// Log granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogMode {
    /// Only the after-image is kept. Deletions are logged with a null
    /// payload.
    NewOnly,
    /// After-image and before-image.
    NewAndOld,
}

impl LogMode {
    pub fn with_old_image(with_old_image: bool) -> Self {
        if with_old_image {
            LogMode::NewAndOld
        } else {
            LogMode::NewOnly
        }
    }
}

/// Which argument a payload column is filled from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSource {
    New,
    Old,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadBinding {
    pub column: String,
    pub source: ImageSource,
}

impl PayloadBinding {
    pub fn new(column: impl Into<String>, source: ImageSource) -> Self {
        Self {
            column: column.into(),
            source,
        }
    }
}

/// What a recorder does when invoked: insert one row into `target`,
/// each payload column holding the document form of one argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecorderBody {
    pub target: TableRef,
    pub payload: Vec<PayloadBinding>,
}

impl RecorderBody {
    pub fn for_mode(target: TableRef, mode: LogMode) -> Self {
        let mut payload = vec![PayloadBinding::new("new", ImageSource::New)];
        if mode == LogMode::NewAndOld {
            payload.push(PayloadBinding::new("old", ImageSource::Old));
        }
        Self { target, payload }
    }
}

/// Invoke a recorder overload. Returns the inserted log row, generated
/// columns included.
pub fn invoke(
    tx: &mut Transaction<'_>,
    routine: &RoutineDef,
    new: Option<&Row>,
    old: Option<&Row>,
) -> Result<Row, StorageError> {
    let RoutineBody::Recorder(body) = &routine.body else {
        return Err(StorageError::NotARecorder(routine.name.clone()));
    };

    let mut entry = Row::new();
    for binding in &body.payload {
        let image = match binding.source {
            ImageSource::New => new,
            ImageSource::Old => old,
        };
        let value = image
            .map(|row| Value::Json(row.to_document()))
            .unwrap_or(Value::Null);
        entry.set(binding.column.clone(), value);
    }

    let (id, stored) = tx.insert_row(&body.target, entry)?;
    trace!(txid = tx.id(), target = %body.target, %id, "state recorded");
    Ok(stored)
}
