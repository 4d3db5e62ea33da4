pub mod api;
pub mod config;
mod error;
pub mod guard;
pub mod ingest;
pub mod parser;
pub mod query;
pub mod source;
pub mod transport;
#[cfg(feature = "async-transport")]
pub mod transport_axum;

use std::sync::Arc;

use store::{KeyedRecordStore, ObjectStore};

pub use api::OperationResult;
pub use error::RosterError;
pub use guard::{ClearOutcome, StateGuard, StorePhase};
pub use ingest::{DEFAULT_SIZE_LIMIT_BYTES, IngestionEngine, LoadReport};
pub use query::QueryEngine;
pub use source::{FetchedSource, HttpSourceFetcher, SourceFetcher};

/// Load, query and clear over one table and one archival object, coordinated
/// by a single [`StateGuard`].
pub struct RosterService {
    guard: StateGuard,
    table: Arc<dyn KeyedRecordStore>,
    objects: Arc<dyn ObjectStore>,
    fetcher: Arc<dyn SourceFetcher>,
    size_limit: usize,
}

impl RosterService {
    pub fn new(
        table: Arc<dyn KeyedRecordStore>,
        objects: Arc<dyn ObjectStore>,
        fetcher: Arc<dyn SourceFetcher>,
    ) -> Self {
        Self {
            guard: StateGuard::new(),
            table,
            objects,
            fetcher,
            size_limit: DEFAULT_SIZE_LIMIT_BYTES,
        }
    }

    pub fn with_size_limit(mut self, size_limit: usize) -> Self {
        self.size_limit = size_limit;
        self
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn SourceFetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    pub fn with_guard(mut self, guard: StateGuard) -> Self {
        self.guard = guard;
        self
    }

    pub fn phase(&self) -> StorePhase {
        self.guard.phase()
    }

    pub fn table_name(&self) -> Option<String> {
        self.table.table_name()
    }

    pub fn archive_location(&self) -> String {
        self.objects.location()
    }

    pub fn try_load(&self, source_url: &str) -> Result<LoadReport, RosterError> {
        IngestionEngine::new(
            self.table.as_ref(),
            self.objects.as_ref(),
            self.fetcher.as_ref(),
            self.size_limit,
        )
        .load(&self.guard, source_url)
    }

    pub fn try_query(&self, partition_key: &str, row_key: &str) -> Result<Vec<String>, RosterError> {
        QueryEngine::new(self.table.as_ref()).query(&self.guard, partition_key, row_key)
    }

    pub fn try_clear(&self) -> Result<ClearOutcome, RosterError> {
        self.guard.clear(self.table.as_ref(), self.objects.as_ref())
    }

    pub fn load(&self, source_url: &str) -> OperationResult {
        OperationResult::from_load(self.try_load(source_url))
    }

    pub fn query(&self, partition_key: &str, row_key: &str) -> OperationResult {
        OperationResult::from_query(self.try_query(partition_key, row_key))
    }

    pub fn clear(&self) -> OperationResult {
        OperationResult::from_clear(self.try_clear())
    }
}
