use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::persistence::domain::persistence_service::{
    Collection, DirectoryData, PersistenceError, PersistenceService,
};
use crate::shared::constants::APP_DIR_NAME;

/// Stores each collection as a pretty-printed JSON file in one directory.
///
/// Saves stage every changed collection in a temporary file next to its
/// target and only rename them into place once all of them were written.
/// If a rename fails, the files already renamed get their previous
/// contents back, so a failed save leaves the directory as it was.
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Platform data location: `<data_dir>/FaceAttendance/`.
    pub fn default_dir() -> Result<PathBuf, PersistenceError> {
        dirs::data_dir()
            .map(|d| d.join(APP_DIR_NAME))
            .ok_or(PersistenceError::NoDataDir)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, collection: Collection) -> PathBuf {
        self.dir.join(collection.file_name())
    }

    /// Best effort: a file that cannot be restored is logged and skipped.
    fn roll_back(&self, renamed: Vec<(PathBuf, Option<Vec<u8>>)>) {
        for (target, before) in renamed.into_iter().rev() {
            let restored = match before {
                Some(bytes) => NamedTempFile::new_in(&self.dir).and_then(|mut tmp| {
                    tmp.write_all(&bytes)?;
                    tmp.persist(&target).map(|_| ()).map_err(|e| e.error)
                }),
                None => fs::remove_file(&target),
            };
            match restored {
                Ok(()) => log::debug!("Rolled back {}", target.display()),
                Err(e) => log::error!("Could not roll back {}: {e}", target.display()),
            }
        }
    }

    fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> PersistenceError + '_ {
        move |source| PersistenceError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

impl PersistenceService for JsonFileStore {
    fn load(&self) -> Result<DirectoryData, PersistenceError> {
        let mut data = DirectoryData::default();
        for &collection in Collection::ALL {
            let path = self.path_for(collection);
            if !path.exists() {
                continue;
            }
            let bytes = fs::read(&path).map_err(Self::io_err(&path))?;
            decode_into(&mut data, collection, &bytes)
                .map_err(|source| PersistenceError::Serde { collection, source })?;
        }
        Ok(data)
    }

    fn save(
        &mut self,
        data: &DirectoryData,
        changed: &[Collection],
    ) -> Result<(), PersistenceError> {
        if changed.is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.dir).map_err(Self::io_err(&self.dir))?;

        let mut staged = Vec::with_capacity(changed.len());
        for &collection in changed {
            let bytes = encode(data, collection)
                .map_err(|source| PersistenceError::Serde { collection, source })?;
            let mut tmp = NamedTempFile::new_in(&self.dir).map_err(Self::io_err(&self.dir))?;
            tmp.write_all(&bytes)
                .and_then(|_| tmp.flush())
                .map_err(Self::io_err(tmp.path()))?;
            staged.push((tmp, self.path_for(collection)));
        }

        let mut previous = Vec::with_capacity(staged.len());
        for (_, target) in &staged {
            let bytes = if target.is_file() {
                Some(fs::read(target).map_err(Self::io_err(target))?)
            } else {
                None
            };
            previous.push(bytes);
        }

        let mut renamed: Vec<(PathBuf, Option<Vec<u8>>)> = Vec::with_capacity(staged.len());
        for ((tmp, target), before) in staged.into_iter().zip(previous) {
            if let Err(e) = tmp.persist(&target) {
                self.roll_back(renamed);
                return Err(PersistenceError::Io {
                    path: target,
                    source: e.error,
                });
            }
            renamed.push((target, before));
        }
        log::debug!("Saved {:?} to {}", changed, self.dir.display());
        Ok(())
    }
}

fn encode(data: &DirectoryData, collection: Collection) -> Result<Vec<u8>, serde_json::Error> {
    match collection {
        Collection::Students => serde_json::to_vec_pretty(&data.students),
        Collection::Admins => serde_json::to_vec_pretty(&data.admins),
        Collection::FaceLinks => serde_json::to_vec_pretty(&data.face_links),
        Collection::Attendance => serde_json::to_vec_pretty(&data.attendance),
        Collection::Departments => serde_json::to_vec_pretty(&data.departments),
        Collection::AuditLog => serde_json::to_vec_pretty(&data.audit_log),
    }
}

fn decode_into(
    data: &mut DirectoryData,
    collection: Collection,
    bytes: &[u8],
) -> Result<(), serde_json::Error> {
    match collection {
        Collection::Students => data.students = serde_json::from_slice(bytes)?,
        Collection::Admins => data.admins = serde_json::from_slice(bytes)?,
        Collection::FaceLinks => data.face_links = serde_json::from_slice(bytes)?,
        Collection::Attendance => data.attendance = serde_json::from_slice(bytes)?,
        Collection::Departments => data.departments = serde_json::from_slice(bytes)?,
        Collection::AuditLog => data.audit_log = serde_json::from_slice(bytes)?,
    }
    Ok(())
}
