// Association Registry
//
// Read-only view recovering which state table belongs to which base
// table. Nothing is stored: every call walks the routine catalog for
// recorder overloads whose return type descends from the log parent,
// then maps the second parameter type back to its table.
//
// A recorder that no longer fits that shape (dropped, its base table
// gone, its state table detached) silently drops out of the view.

use serde::Serialize;

use crate::catalog::{Catalog, ReturnType, TableDef, TableRef};
use crate::config::Config;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Association {
    pub base: TableRef,
    pub state: TableRef,
}

#[derive(Debug, Clone, Copy)]
pub struct Registry<'a> {
    catalog: &'a Catalog,
    config: &'a Config,
}

impl<'a> Registry<'a> {
    pub fn new(catalog: &'a Catalog, config: &'a Config) -> Self {
        Self { catalog, config }
    }

    /// Every resolvable (base table, state table) pair.
    pub fn associations(&self) -> Vec<Association> {
        let parent = self.config.log_parent_ref();

        self.catalog
            .overloads(&self.config.recorder_name())
            .iter()
            .filter_map(|routine| {
                let ReturnType::Row(returns) = routine.returns else {
                    return None;
                };
                let state = self.catalog.table_by_row_type(returns)?;
                if !self.catalog.is_descendant(&state.table, &parent) {
                    return None;
                }

                let base_type = *routine.params.get(1)?;
                let base = self.catalog.table_by_row_type(base_type)?;

                Some(Association {
                    base: base.table.clone(),
                    state: state.table.clone(),
                })
            })
            .collect()
    }

    /// State table of `base`, if it is instrumented.
    pub fn lookup(&self, base: &TableRef) -> Option<TableRef> {
        self.associations()
            .into_iter()
            .find(|a| &a.base == base)
            .map(|a| a.state)
    }

    /// Every table descending from the log parent.
    pub fn log_tables(&self) -> Vec<&'a TableDef> {
        self.catalog.descendants(&self.config.log_parent_ref())
    }
}
