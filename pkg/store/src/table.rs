use std::{
    collections::BTreeMap,
    fs::{File, OpenOptions, create_dir_all, read_dir, remove_file},
    io::{BufRead, BufReader, ErrorKind, Write},
    ops::Bound,
    path::{Path, PathBuf},
    sync::{Mutex, RwLock},
};

use schema::{Attributes, Record, RecordFilter, RecordKey, validate_record};
use tracing::{debug, info};

use crate::{
    ContinuationToken, DEFAULT_PAGE_SIZE, KeyedRecordStore, RecordPage, StoreError,
    lock_poisoned, next_generation_name,
};

const JOURNAL_EXTENSION: &str = "jsonl";

/// Records of one table generation, ordered by key.
#[derive(Debug, Default)]
struct TableGeneration {
    name: String,
    records: BTreeMap<RecordKey, Attributes>,
}

impl TableGeneration {
    fn new(name: String) -> Self {
        Self {
            name,
            records: BTreeMap::new(),
        }
    }

    fn merge(&mut self, record: &Record) {
        let attributes = self.records.entry(record.key()).or_default();
        for (key, value) in &record.attributes {
            attributes.insert(key.clone(), value.clone());
        }
    }

    fn get(&self, key: &RecordKey) -> Option<Record> {
        self.records.get(key).map(|attributes| Record {
            partition_key: key.partition_key.clone(),
            row_key: key.row_key.clone(),
            attributes: attributes.clone(),
        })
    }

    fn page(
        &self,
        filter: &RecordFilter,
        continuation: Option<&ContinuationToken>,
        page_size: usize,
    ) -> RecordPage {
        let lower = match continuation {
            Some(token) => Bound::Included(token.next_key().clone()),
            None => match filter.partition_key() {
                Some(pk) => Bound::Included(RecordKey::new(pk, "")),
                None => Bound::Unbounded,
            },
        };
        let mut matches = self
            .records
            .range((lower, Bound::Unbounded))
            .take_while(|(key, _)| {
                filter
                    .partition_key()
                    .is_none_or(|pk| key.partition_key.as_str() <= pk)
            })
            .filter(|(key, _)| filter.matches_key(key));

        let records: Vec<Record> = matches
            .by_ref()
            .take(page_size)
            .map(|(key, attributes)| Record {
                partition_key: key.partition_key.clone(),
                row_key: key.row_key.clone(),
                attributes: attributes.clone(),
            })
            .collect();
        let continuation = matches
            .next()
            .map(|(key, _)| ContinuationToken::new(key.clone()));
        RecordPage {
            records,
            continuation,
        }
    }
}

fn missing_table() -> StoreError {
    StoreError::MissingTable("no current table generation".to_string())
}

/// In-process table. Starts with one empty generation.
pub struct InMemoryTableStore {
    prefix: String,
    page_size: usize,
    current: RwLock<Option<TableGeneration>>,
}

impl InMemoryTableStore {
    pub fn new(prefix: &str) -> Self {
        Self::with_page_size(prefix, DEFAULT_PAGE_SIZE)
    }

    pub fn with_page_size(prefix: &str, page_size: usize) -> Self {
        Self {
            prefix: prefix.to_string(),
            page_size: page_size.max(1),
            current: RwLock::new(Some(TableGeneration::new(next_generation_name(prefix)))),
        }
    }

    pub fn records_len(&self) -> usize {
        self.current
            .read()
            .ok()
            .and_then(|guard| guard.as_ref().map(|generation| generation.records.len()))
            .unwrap_or(0)
    }
}

impl KeyedRecordStore for InMemoryTableStore {
    fn table_name(&self) -> Option<String> {
        let guard = self.current.read().ok()?;
        guard.as_ref().map(|generation| generation.name.clone())
    }

    fn merge_upsert(&self, record: &Record) -> Result<(), StoreError> {
        validate_record(record)?;
        let mut guard = self.current.write().map_err(|_| lock_poisoned("table"))?;
        let generation = guard.as_mut().ok_or_else(missing_table)?;
        generation.merge(record);
        Ok(())
    }

    fn get(&self, key: &RecordKey) -> Result<Option<Record>, StoreError> {
        let guard = self.current.read().map_err(|_| lock_poisoned("table"))?;
        let generation = guard.as_ref().ok_or_else(missing_table)?;
        Ok(generation.get(key))
    }

    fn query_page(
        &self,
        filter: &RecordFilter,
        continuation: Option<&ContinuationToken>,
    ) -> Result<RecordPage, StoreError> {
        let guard = self.current.read().map_err(|_| lock_poisoned("table"))?;
        let generation = guard.as_ref().ok_or_else(missing_table)?;
        Ok(generation.page(filter, continuation, self.page_size))
    }

    fn delete_table(&self) -> Result<(), StoreError> {
        let mut guard = self.current.write().map_err(|_| lock_poisoned("table"))?;
        match guard.take() {
            Some(generation) => {
                debug!(table = %generation.name, "deleted in-memory table generation")
            }
            None => debug!("no in-memory table generation to delete"),
        }
        Ok(())
    }

    fn create_table(&self) -> Result<String, StoreError> {
        let mut guard = self.current.write().map_err(|_| lock_poisoned("table"))?;
        if let Some(previous) = guard.as_ref() {
            return Err(StoreError::Conflict(format!(
                "table '{}' still exists",
                previous.name
            )));
        }
        let name = next_generation_name(&self.prefix);
        *guard = Some(TableGeneration::new(name.clone()));
        debug!(table = %name, "created in-memory table generation");
        Ok(name)
    }
}

struct JournaledGeneration {
    table: TableGeneration,
    path: PathBuf,
    journal: File,
}

/// Table persisted as one append-only JSON-lines journal per generation,
/// named `<prefix><nanos>.jsonl` inside the data directory. Opening replays
/// the journal with merge semantics.
pub struct FileTableStore {
    dir: PathBuf,
    prefix: String,
    page_size: usize,
    current: Mutex<Option<JournaledGeneration>>,
}

impl FileTableStore {
    /// Open the single generation in `dir` whose name starts with `prefix`,
    /// creating one when none exists. More than one matching generation is a
    /// configuration error.
    pub fn open(dir: impl AsRef<Path>, prefix: &str) -> Result<Self, StoreError> {
        Self::open_with_page_size(dir, prefix, DEFAULT_PAGE_SIZE)
    }

    pub fn open_with_page_size(
        dir: impl AsRef<Path>,
        prefix: &str,
        page_size: usize,
    ) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        create_dir_all(&dir)?;
        let mut existing = list_generations(&dir, prefix)?;
        let generation = match existing.len() {
            0 => {
                debug!(dir = %dir.display(), prefix, "no table found, creating new table");
                create_generation(&dir, prefix)?
            }
            1 => {
                let name = existing.remove(0);
                open_generation(&dir, name)?
            }
            count => {
                return Err(StoreError::Configuration(format!(
                    "found {count} tables starting with '{prefix}' in {}",
                    dir.display()
                )));
            }
        };
        info!(
            table = %generation.table.name,
            records = generation.table.records.len(),
            "opened table generation"
        );
        Ok(Self {
            dir,
            prefix: prefix.to_string(),
            page_size: page_size.max(1),
            current: Mutex::new(Some(generation)),
        })
    }

    pub fn journal_path(&self) -> Option<PathBuf> {
        let guard = self.current.lock().ok()?;
        guard.as_ref().map(|generation| generation.path.clone())
    }
}

impl KeyedRecordStore for FileTableStore {
    fn table_name(&self) -> Option<String> {
        let guard = self.current.lock().ok()?;
        guard.as_ref().map(|generation| generation.table.name.clone())
    }

    fn merge_upsert(&self, record: &Record) -> Result<(), StoreError> {
        validate_record(record)?;
        let line =
            serde_json::to_string(record).map_err(|err| StoreError::Parse(err.to_string()))?;
        let mut guard = self.current.lock().map_err(|_| lock_poisoned("table"))?;
        let generation = guard.as_mut().ok_or_else(missing_table)?;
        writeln!(generation.journal, "{line}")?;
        generation.journal.flush()?;
        generation.table.merge(record);
        Ok(())
    }

    fn get(&self, key: &RecordKey) -> Result<Option<Record>, StoreError> {
        let guard = self.current.lock().map_err(|_| lock_poisoned("table"))?;
        let generation = guard.as_ref().ok_or_else(missing_table)?;
        Ok(generation.table.get(key))
    }

    fn query_page(
        &self,
        filter: &RecordFilter,
        continuation: Option<&ContinuationToken>,
    ) -> Result<RecordPage, StoreError> {
        let guard = self.current.lock().map_err(|_| lock_poisoned("table"))?;
        let generation = guard.as_ref().ok_or_else(missing_table)?;
        Ok(generation
            .table
            .page(filter, continuation, self.page_size))
    }

    fn delete_table(&self) -> Result<(), StoreError> {
        let mut guard = self.current.lock().map_err(|_| lock_poisoned("table"))?;
        let Some(path) = guard.as_ref().map(|generation| generation.path.clone()) else {
            debug!(dir = %self.dir.display(), "no table generation to delete");
            return Ok(());
        };
        match remove_file(&path) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }
        if let Some(generation) = guard.take() {
            debug!(table = %generation.table.name, "deleted table generation");
        }
        Ok(())
    }

    fn create_table(&self) -> Result<String, StoreError> {
        let mut guard = self.current.lock().map_err(|_| lock_poisoned("table"))?;
        if let Some(previous) = guard.as_ref() {
            return Err(StoreError::Conflict(format!(
                "table '{}' still exists",
                previous.table.name
            )));
        }
        let generation = create_generation(&self.dir, &self.prefix)?;
        let name = generation.table.name.clone();
        *guard = Some(generation);
        debug!(table = %name, "created table generation");
        Ok(name)
    }
}

fn list_generations(dir: &Path, prefix: &str) -> Result<Vec<String>, StoreError> {
    let mut names = Vec::new();
    for entry in read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some(JOURNAL_EXTENSION) {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
            continue;
        };
        if stem.starts_with(prefix) {
            names.push(stem.to_string());
        }
    }
    names.sort();
    Ok(names)
}

fn journal_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}.{JOURNAL_EXTENSION}"))
}

fn create_generation(dir: &Path, prefix: &str) -> Result<JournaledGeneration, StoreError> {
    let name = next_generation_name(prefix);
    let path = journal_path(dir, &name);
    let journal = OpenOptions::new()
        .create_new(true)
        .append(true)
        .open(&path)?;
    Ok(JournaledGeneration {
        table: TableGeneration::new(name),
        path,
        journal,
    })
}

fn open_generation(dir: &Path, name: String) -> Result<JournaledGeneration, StoreError> {
    let path = journal_path(dir, &name);
    let mut table = TableGeneration::new(name);
    let reader = BufReader::new(File::open(&path)?);
    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record: Record = serde_json::from_str(&line).map_err(|err| {
            StoreError::Parse(format!(
                "{}:{}: {err}",
                path.display(),
                line_no + 1
            ))
        })?;
        table.merge(&record);
    }
    let journal = OpenOptions::new().append(true).open(&path)?;
    Ok(JournaledGeneration {
        table,
        path,
        journal,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        fs::remove_dir_all,
        sync::atomic::{AtomicU64, Ordering},
        time::{SystemTime, UNIX_EPOCH},
    };

    fn temp_dir() -> PathBuf {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock should be valid")
            .as_nanos();
        let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
        let mut path = std::env::temp_dir();
        path.push(format!("roster-table-{}-{nanos}-{seq}", std::process::id()));
        path
    }

    fn filter(pk: &str, rk: &str) -> RecordFilter {
        RecordFilter::from_fragments(pk, rk).unwrap()
    }

    fn all(store: &dyn KeyedRecordStore, filter: &RecordFilter) -> Vec<Record> {
        crate::query_pages(store, filter)
            .collect::<Result<Vec<_>, _>>()
            .unwrap()
            .into_iter()
            .flatten()
            .collect()
    }

    #[test]
    fn merge_upsert_adds_overwrites_and_preserves_attributes() {
        let store = InMemoryTableStore::new("prog4");
        store
            .merge_upsert(
                &Record::new("Doe", "John")
                    .with_attribute("age", "30")
                    .with_attribute("city", "Austin"),
            )
            .unwrap();
        store
            .merge_upsert(
                &Record::new("Doe", "John")
                    .with_attribute("age", "31")
                    .with_attribute("job", "pilot"),
            )
            .unwrap();

        let record = store.get(&RecordKey::new("Doe", "John")).unwrap().unwrap();
        assert_eq!(record.display_line(), "Doe John age=31 city=Austin job=pilot");
        assert_eq!(store.records_len(), 1);
    }

    #[test]
    fn merge_upsert_rejects_invalid_record() {
        let store = InMemoryTableStore::new("prog4");
        let err = store.merge_upsert(&Record::new("", "John")).unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
        assert_eq!(store.records_len(), 0);
    }

    #[test]
    fn query_page_matches_each_key_column_exactly() {
        let store = InMemoryTableStore::new("prog4");
        for (pk, rk) in [("Doe", "John"), ("Doe", "Jane"), ("Doerr", "John"), ("Smith", "Jane")] {
            store.merge_upsert(&Record::new(pk, rk)).unwrap();
        }

        let by_pk: Vec<String> = all(&store, &filter("Doe", ""))
            .iter()
            .map(Record::display_line)
            .collect();
        assert_eq!(by_pk, vec!["Doe Jane", "Doe John"]);

        let by_rk: Vec<String> = all(&store, &filter("", "Jane"))
            .iter()
            .map(Record::display_line)
            .collect();
        assert_eq!(by_rk, vec!["Doe Jane", "Smith Jane"]);

        assert_eq!(all(&store, &filter("Doe", "John")).len(), 1);
        assert!(all(&store, &filter("Doe", "Jim")).is_empty());
    }

    #[test]
    fn delete_then_create_starts_an_empty_generation() {
        let store = InMemoryTableStore::new("prog4");
        store.merge_upsert(&Record::new("Doe", "John")).unwrap();
        let before = store.table_name().unwrap();

        store.delete_table().unwrap();
        assert!(store.table_name().is_none());
        assert!(matches!(
            store.merge_upsert(&Record::new("Doe", "John")),
            Err(StoreError::MissingTable(_))
        ));

        let after = store.create_table().unwrap();
        assert_ne!(before, after);
        assert!(after.starts_with("prog4"));
        assert_eq!(store.records_len(), 0);
    }

    #[test]
    fn deleting_an_absent_generation_succeeds() {
        let store = InMemoryTableStore::new("prog4");
        store.delete_table().unwrap();
        store.delete_table().unwrap();
        assert!(store.table_name().is_none());
        assert!(store.create_table().is_ok());
    }

    #[test]
    fn create_table_refuses_to_replace_live_generation() {
        let store = InMemoryTableStore::new("prog4");
        let name = store.table_name().unwrap();
        assert!(matches!(store.create_table(), Err(StoreError::Conflict(_))));
        assert_eq!(store.table_name(), Some(name));
    }

    #[test]
    fn file_store_replays_journal_with_merge_semantics() {
        let dir = temp_dir();
        {
            let store = FileTableStore::open(&dir, "prog4").unwrap();
            store
                .merge_upsert(&Record::new("Doe", "John").with_attribute("age", "30"))
                .unwrap();
            store
                .merge_upsert(&Record::new("Doe", "John").with_attribute("city", "Austin"))
                .unwrap();
            store.merge_upsert(&Record::new("Smith", "Jane")).unwrap();
        }

        let reopened = FileTableStore::open(&dir, "prog4").unwrap();
        let record = reopened
            .get(&RecordKey::new("Doe", "John"))
            .unwrap()
            .unwrap();
        assert_eq!(record.display_line(), "Doe John age=30 city=Austin");
        assert_eq!(all(&reopened, &filter("", "Jane")).len(), 1);
        let _ = remove_dir_all(&dir);
    }

    #[test]
    fn file_store_rejects_more_than_one_generation() {
        let dir = temp_dir();
        create_dir_all(&dir).unwrap();
        File::create(dir.join("prog4100.jsonl")).unwrap();
        File::create(dir.join("prog4200.jsonl")).unwrap();

        let err = FileTableStore::open(&dir, "prog4").err().unwrap();
        assert!(matches!(err, StoreError::Configuration(_)));
        let _ = remove_dir_all(&dir);
    }

    #[test]
    fn file_store_ignores_generations_with_other_prefixes() {
        let dir = temp_dir();
        create_dir_all(&dir).unwrap();
        File::create(dir.join("other100.jsonl")).unwrap();
        File::create(dir.join("prog4-notes.txt")).unwrap();

        let store = FileTableStore::open(&dir, "prog4").unwrap();
        assert!(store.table_name().unwrap().starts_with("prog4"));
        assert_eq!(list_generations(&dir, "prog4").unwrap().len(), 1);
        let _ = remove_dir_all(&dir);
    }

    #[test]
    fn file_store_generation_swap_replaces_journal() {
        let dir = temp_dir();
        let store = FileTableStore::open(&dir, "prog4").unwrap();
        store.merge_upsert(&Record::new("Doe", "John")).unwrap();
        let old_path = store.journal_path().unwrap();

        store.delete_table().unwrap();
        assert!(!old_path.exists());
        assert!(matches!(
            store.create_table(),
            Ok(name) if name.starts_with("prog4")
        ));
        assert!(store.journal_path().unwrap().exists());
        assert!(all(&store, &filter("Doe", "")).is_empty());
        assert_eq!(list_generations(&dir, "prog4").unwrap().len(), 1);
        let _ = remove_dir_all(&dir);
    }

    #[test]
    fn file_store_delete_is_idempotent_when_journal_is_gone() {
        let dir = temp_dir();
        let store = FileTableStore::open(&dir, "prog4").unwrap();
        std::fs::remove_file(store.journal_path().unwrap()).unwrap();

        store.delete_table().unwrap();
        store.delete_table().unwrap();
        assert!(store.table_name().is_none());
        store.create_table().unwrap();
        assert_eq!(list_generations(&dir, "prog4").unwrap().len(), 1);
        let _ = remove_dir_all(&dir);
    }

    #[test]
    fn file_store_reports_corrupt_journal_line() {
        let dir = temp_dir();
        create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("prog4100.jsonl"), "not json\n").unwrap();

        let err = FileTableStore::open(&dir, "prog4").err().unwrap();
        assert!(matches!(err, StoreError::Parse(message) if message.contains(":1:")));
        let _ = remove_dir_all(&dir);
    }
}
