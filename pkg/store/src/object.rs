use std::{
    fs::{create_dir_all, read, read_to_string, remove_file, rename, write},
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Mutex,
};

use tracing::debug;
use url::Url;

use crate::{DEFAULT_CONTENT_TYPE, ObjectStore, StoreError, lock_poisoned};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

pub struct InMemoryObjectStore {
    location: String,
    slot: Mutex<Option<StoredObject>>,
}

impl InMemoryObjectStore {
    pub fn new(name: &str) -> Self {
        Self {
            location: format!("memory://roster/{name}"),
            slot: Mutex::new(None),
        }
    }
}

impl ObjectStore for InMemoryObjectStore {
    fn location(&self) -> String {
        self.location.clone()
    }

    fn put(&self, bytes: &[u8], content_type: &str) -> Result<String, StoreError> {
        let mut slot = self.slot.lock().map_err(|_| lock_poisoned("object"))?;
        *slot = Some(StoredObject {
            bytes: bytes.to_vec(),
            content_type: content_type.to_string(),
        });
        Ok(self.location.clone())
    }

    fn delete(&self) -> Result<(), StoreError> {
        let mut slot = self.slot.lock().map_err(|_| lock_poisoned("object"))?;
        if slot.take().is_none() {
            debug!(location = %self.location, "archival object already absent");
        }
        Ok(())
    }

    fn get(&self) -> Result<Option<StoredObject>, StoreError> {
        let slot = self.slot.lock().map_err(|_| lock_poisoned("object"))?;
        Ok(slot.clone())
    }
}

/// Archival object kept as a file, with its content type in a
/// `<name>.content-type` sidecar.
pub struct FileObjectStore {
    path: PathBuf,
    content_type_path: PathBuf,
    location: String,
}

impl FileObjectStore {
    pub fn open(dir: impl AsRef<Path>, name: &str) -> Result<Self, StoreError> {
        let dir = dir.as_ref();
        create_dir_all(dir)?;
        let dir = dir.canonicalize()?;
        let path = dir.join(name);
        let content_type_path = dir.join(format!("{name}.content-type"));
        let location = Url::from_file_path(&path)
            .map(|url| url.to_string())
            .map_err(|_| {
                StoreError::Configuration(format!(
                    "object path {} cannot be expressed as a URL",
                    path.display()
                ))
            })?;
        Ok(Self {
            path,
            content_type_path,
            location,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ObjectStore for FileObjectStore {
    fn location(&self) -> String {
        self.location.clone()
    }

    fn put(&self, bytes: &[u8], content_type: &str) -> Result<String, StoreError> {
        let mut staging = self.path.clone().into_os_string();
        staging.push(".part");
        let staging = PathBuf::from(staging);
        write(&staging, bytes)?;
        rename(&staging, &self.path)?;
        write(&self.content_type_path, content_type)?;
        debug!(path = %self.path.display(), bytes = bytes.len(), "wrote archival object");
        Ok(self.location.clone())
    }

    fn delete(&self) -> Result<(), StoreError> {
        remove_if_exists(&self.path)?;
        remove_if_exists(&self.content_type_path)?;
        Ok(())
    }

    fn get(&self) -> Result<Option<StoredObject>, StoreError> {
        let bytes = match read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let content_type = match read_to_string(&self.content_type_path) {
            Ok(value) => value,
            Err(err) if err.kind() == ErrorKind::NotFound => DEFAULT_CONTENT_TYPE.to_string(),
            Err(err) => return Err(err.into()),
        };
        Ok(Some(StoredObject {
            bytes,
            content_type,
        }))
    }
}

fn remove_if_exists(path: &Path) -> Result<(), StoreError> {
    match remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "archival file already absent");
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}
