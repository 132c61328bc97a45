// Statetable Kernel
//
// Equips a base table with an append-only state log, a recorder and a
// change-capture hook, and rediscovers the pairing from the catalog.

pub mod catalog;
pub mod config;
pub mod generate;
pub mod hook;
pub mod install;
pub mod naming;
pub mod recorder;
pub mod registry;
pub mod storage;

pub use catalog::TableRef;
pub use config::Config;
pub use install::{install, InstallError, InstallOptions};
pub use recorder::LogMode;
pub use registry::{Association, Registry};
pub use storage::{Database, Row, RowId, StorageError, Transaction, Value};
