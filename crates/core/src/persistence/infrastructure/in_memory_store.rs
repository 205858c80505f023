use std::sync::{Arc, Mutex};

use crate::persistence::domain::persistence_service::{
    Collection, DirectoryData, PersistenceError, PersistenceService,
};

/// Process-local store. Clones share the same data, so a test can keep a
/// handle after moving the store into a service.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    data: Arc<Mutex<DirectoryData>>,
    fail_saves: Arc<Mutex<bool>>,
    save_count: Arc<Mutex<usize>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_data(data: DirectoryData) -> Self {
        Self {
            data: Arc::new(Mutex::new(data)),
            ..Self::default()
        }
    }

    /// Makes every subsequent `save` fail without touching the data.
    pub fn set_fail_saves(&self, fail: bool) {
        *lock(&self.fail_saves) = fail;
    }

    pub fn snapshot(&self) -> DirectoryData {
        lock(&self.data).clone()
    }

    pub fn save_count(&self) -> usize {
        *lock(&self.save_count)
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl PersistenceService for InMemoryStore {
    fn load(&self) -> Result<DirectoryData, PersistenceError> {
        Ok(self.snapshot())
    }

    fn save(
        &mut self,
        data: &DirectoryData,
        changed: &[Collection],
    ) -> Result<(), PersistenceError> {
        if *lock(&self.fail_saves) {
            return Err(PersistenceError::Unavailable("save rejected".into()));
        }
        let mut stored = lock(&self.data);
        for collection in changed {
            match collection {
                Collection::Students => stored.students = data.students.clone(),
                Collection::Admins => stored.admins = data.admins.clone(),
                Collection::FaceLinks => stored.face_links = data.face_links.clone(),
                Collection::Attendance => stored.attendance = data.attendance.clone(),
                Collection::Departments => stored.departments = data.departments.clone(),
                Collection::AuditLog => stored.audit_log = data.audit_log.clone(),
            }
        }
        *lock(&self.save_count) += 1;
        Ok(())
    }
}
