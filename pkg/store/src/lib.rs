mod object;
mod table;

use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::{SystemTime, UNIX_EPOCH},
};

use schema::{Record, RecordFilter, RecordKey, ValidationError};
use thiserror::Error;

pub use object::{FileObjectStore, InMemoryObjectStore, StoredObject};
pub use table::{FileTableStore, InMemoryTableStore};

pub const DEFAULT_TABLE_PREFIX: &str = "prog4";
pub const DEFAULT_PAGE_SIZE: usize = 1000;
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),
    #[error("table generation is missing: {0}")]
    MissingTable(String),
    #[error("state conflict: {0}")]
    Conflict(String),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("io error: {0}")]
    Io(String),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

impl From<std::io::Error> for StoreError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value.to_string())
    }
}

/// Opaque resume point handed back with a page when more matches remain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContinuationToken {
    next: RecordKey,
}

impl ContinuationToken {
    pub fn new(next: RecordKey) -> Self {
        Self { next }
    }

    pub fn next_key(&self) -> &RecordKey {
        &self.next
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RecordPage {
    pub records: Vec<Record>,
    pub continuation: Option<ContinuationToken>,
}

/// Keyed table holding the current generation of records.
///
/// Implementations use interior synchronization: every method takes `&self`
/// the way a remote table client would. Callers coordinate generation swaps
/// against reads and writes themselves.
pub trait KeyedRecordStore: Send + Sync {
    /// Name of the current generation, `None` between a delete and a create.
    fn table_name(&self) -> Option<String>;

    /// Insert the record, or merge its attributes into the existing one.
    fn merge_upsert(&self, record: &Record) -> Result<(), StoreError>;

    fn get(&self, key: &RecordKey) -> Result<Option<Record>, StoreError>;

    /// One page of records matching `filter`, in key order, resuming after
    /// `continuation` when given.
    fn query_page(
        &self,
        filter: &RecordFilter,
        continuation: Option<&ContinuationToken>,
    ) -> Result<RecordPage, StoreError>;

    /// Destroy the current generation.
    fn delete_table(&self) -> Result<(), StoreError>;

    /// Start a fresh, empty generation and return its name.
    fn create_table(&self) -> Result<String, StoreError>;
}

/// Single archival object slot.
pub trait ObjectStore: Send + Sync {
    /// URL the object is (or would be) reachable at.
    fn location(&self) -> String;

    /// Overwrite the object, returning its location.
    fn put(&self, bytes: &[u8], content_type: &str) -> Result<String, StoreError>;

    /// Remove the object. Removing an absent object succeeds.
    fn delete(&self) -> Result<(), StoreError>;

    fn get(&self) -> Result<Option<StoredObject>, StoreError>;
}

/// Lazy cursor over the pages of one query. Each call to [`query_pages`]
/// starts from the first page; the cursor stops after the last page or the
/// first error.
pub struct PageCursor<'a> {
    store: &'a dyn KeyedRecordStore,
    filter: &'a RecordFilter,
    continuation: Option<ContinuationToken>,
    finished: bool,
}

pub fn query_pages<'a>(store: &'a dyn KeyedRecordStore, filter: &'a RecordFilter) -> PageCursor<'a> {
    PageCursor {
        store,
        filter,
        continuation: None,
        finished: false,
    }
}

impl Iterator for PageCursor<'_> {
    type Item = Result<Vec<Record>, StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self
            .store
            .query_page(self.filter, self.continuation.as_ref())
        {
            Ok(page) => {
                self.finished = page.continuation.is_none();
                self.continuation = page.continuation;
                Some(Ok(page.records))
            }
            Err(err) => {
                self.finished = true;
                Some(Err(err))
            }
        }
    }
}

static LAST_GENERATION_NANOS: AtomicU64 = AtomicU64::new(0);

/// `<prefix><unix-nanos>`, strictly increasing within the process.
pub fn next_generation_name(prefix: &str) -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|value| value.as_nanos() as u64)
        .unwrap_or(0);
    let mut last = LAST_GENERATION_NANOS.load(Ordering::Relaxed);
    let issued = loop {
        let candidate = now.max(last + 1);
        match LAST_GENERATION_NANOS.compare_exchange_weak(
            last,
            candidate,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break candidate,
            Err(observed) => last = observed,
        }
    };
    format!("{prefix}{issued}")
}

pub(crate) fn lock_poisoned(what: &str) -> StoreError {
    StoreError::Unavailable(format!("{what} lock poisoned"))
}
