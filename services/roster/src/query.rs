use schema::RecordFilter;
use store::{KeyedRecordStore, query_pages};
use tracing::{debug, error};

use crate::{RosterError, StateGuard};

pub const MISSING_KEYS_MESSAGE: &str = "first and/or last name must be provided";

/// Exact-match lookups by partition and/or row key.
pub struct QueryEngine<'a> {
    table: &'a dyn KeyedRecordStore,
}

impl<'a> QueryEngine<'a> {
    pub fn new(table: &'a dyn KeyedRecordStore) -> Self {
        Self { table }
    }

    /// Display lines of every matching record, across all pages.
    ///
    /// Empty fragments are treated as absent; both absent is rejected before
    /// the guard or the table is touched.
    pub fn query(
        &self,
        guard: &StateGuard,
        partition_key: &str,
        row_key: &str,
    ) -> Result<Vec<String>, RosterError> {
        let filter = RecordFilter::from_fragments(partition_key, row_key)
            .ok_or_else(|| RosterError::invalid_input(MISSING_KEYS_MESSAGE))?;

        let _access = guard.shared();
        let mut matches = Vec::new();
        for page in query_pages(self.table, &filter) {
            let page = page.map_err(|err| {
                error!(%filter, error = %err, "query paging failed");
                RosterError::backend("error while querying table", err)
            })?;
            for record in page {
                debug!(pk = %record.partition_key, rk = %record.row_key, "query match");
                matches.push(record.display_line());
            }
        }
        debug!(%filter, matches = matches.len(), "query finished");
        Ok(matches)
    }
}
