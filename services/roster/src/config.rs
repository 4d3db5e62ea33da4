use std::{path::PathBuf, sync::Arc, time::Duration};

use store::{
    DEFAULT_PAGE_SIZE, DEFAULT_TABLE_PREFIX, FileObjectStore, FileTableStore,
    InMemoryObjectStore, InMemoryTableStore, KeyedRecordStore, ObjectStore,
};
use tracing::info;

use crate::{
    RosterError, RosterService,
    ingest::{DEFAULT_SIZE_LIMIT_BYTES, MAX_SIZE_LIMIT_BYTES}, source::HttpSourceFetcher,
};

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8000";
pub const DEFAULT_OBJECT_NAME: &str = "input.txt";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportRuntime {
    Std,
    Axum,
}

impl TransportRuntime {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Std => "std",
            Self::Axum => "axum",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterConfig {
    pub bind_addr: String,
    pub http_workers: usize,
    pub transport_runtime: TransportRuntime,
    /// Backends live in memory when unset.
    pub data_dir: Option<PathBuf>,
    pub table_prefix: String,
    pub object_name: String,
    pub size_limit_bytes: usize,
    pub page_size: usize,
    pub fetch_timeout: Option<Duration>,
}

impl Default for RosterConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            http_workers: default_http_workers(),
            transport_runtime: TransportRuntime::Std,
            data_dir: None,
            table_prefix: DEFAULT_TABLE_PREFIX.to_string(),
            object_name: DEFAULT_OBJECT_NAME.to_string(),
            size_limit_bytes: DEFAULT_SIZE_LIMIT_BYTES,
            page_size: DEFAULT_PAGE_SIZE,
            fetch_timeout: None,
        }
    }
}

impl RosterConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bind_addr: env_with_fallback("ROSTER_BIND", "PROG_4_BIND")
                .unwrap_or(defaults.bind_addr),
            http_workers: parse_env::<usize>("ROSTER_HTTP_WORKERS")
                .filter(|workers| *workers > 0)
                .unwrap_or(defaults.http_workers),
            transport_runtime: match std::env::var("ROSTER_TRANSPORT_RUNTIME").as_deref() {
                Ok("axum") => TransportRuntime::Axum,
                _ => TransportRuntime::Std,
            },
            data_dir: env_with_fallback("ROSTER_DATA_DIR", "PROG_4_DATA_DIR")
                .filter(|value| !value.trim().is_empty())
                .map(PathBuf::from),
            table_prefix: std::env::var("ROSTER_TABLE_PREFIX")
                .ok()
                .filter(|value| !value.is_empty())
                .unwrap_or(defaults.table_prefix),
            object_name: std::env::var("ROSTER_OBJECT_NAME")
                .ok()
                .filter(|value| !value.is_empty())
                .unwrap_or(defaults.object_name),
            size_limit_bytes: parse_env::<usize>("ROSTER_SIZE_LIMIT_BYTES")
                .filter(|value| (1..=MAX_SIZE_LIMIT_BYTES).contains(value))
                .unwrap_or(defaults.size_limit_bytes),
            page_size: parse_env::<usize>("ROSTER_PAGE_SIZE")
                .filter(|value| *value > 0)
                .unwrap_or(defaults.page_size),
            fetch_timeout: parse_env::<u64>("ROSTER_FETCH_TIMEOUT_SECS")
                .filter(|value| *value > 0)
                .map(Duration::from_secs),
        }
    }

    /// Open the backends and wire up the service. A data directory holding
    /// more than one table generation with the configured prefix fails here.
    pub fn open_service(&self) -> Result<RosterService, RosterError> {
        let (table, objects): (Arc<dyn KeyedRecordStore>, Arc<dyn ObjectStore>) =
            match self.data_dir.as_deref() {
                Some(dir) => {
                    let table = FileTableStore::open_with_page_size(
                        dir,
                        &self.table_prefix,
                        self.page_size,
                    )?;
                    let objects = FileObjectStore::open(dir.join("objects"), &self.object_name)?;
                    info!(dir = %dir.display(), "using file-backed table and object store");
                    (Arc::new(table), Arc::new(objects))
                }
                None => {
                    info!("using in-memory table and object store");
                    (
                        Arc::new(InMemoryTableStore::with_page_size(
                            &self.table_prefix,
                            self.page_size,
                        )),
                        Arc::new(InMemoryObjectStore::new(&self.object_name)),
                    )
                }
            };
        Ok(RosterService::new(
            table,
            objects,
            Arc::new(HttpSourceFetcher::new(self.fetch_timeout)),
        )
        .with_size_limit(self.size_limit_bytes))
    }
}

pub(crate) fn env_with_fallback(primary: &str, fallback: &str) -> Option<String> {
    std::env::var(primary)
        .ok()
        .or_else(|| std::env::var(fallback).ok())
}

fn parse_env<T>(key: &str) -> Option<T>
where
    T: std::str::FromStr,
{
    std::env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<T>().ok())
}

fn default_http_workers() -> usize {
    std::thread::available_parallelism()
        .map(|parallelism| parallelism.get().clamp(1, 32))
        .unwrap_or(4)
}
