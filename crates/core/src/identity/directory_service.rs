use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::attendance::domain::attendance_log::AttendanceLog;
use crate::attendance::domain::attendance_record::{AttendanceRecord, AuditLogRecord};
use crate::detection::domain::detection::Emotion;
use crate::detection::domain::recognition_service::ReferencePhoto;
use crate::identity::domain::identity_linker::IdentityDirectory;
use crate::identity::domain::person::{AccountKind, AdminInfo, Designation, Person, StudentInfo};
use crate::persistence::domain::persistence_service::{
    Collection, DirectoryData, PersistenceError, PersistenceService,
};

const SYSTEM_ACTOR: &str = "System";

#[derive(Error, Debug)]
pub enum DirectoryError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("cannot modify a Principal account ({0})")]
    ImmutableAccount(String),
    #[error("the face of {0} is already linked")]
    LinkAlreadyExists(String),
    #[error("{0} already exists")]
    AlreadyExists(String),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

/// The person directories, face links and logs, backed by a persistence
/// service.
///
/// Every mutation is applied to a copy of the loaded data, saved, and only
/// then swapped in. A failed save leaves the service exactly as it was.
pub struct DirectoryService {
    store: Box<dyn PersistenceService>,
    data: DirectoryData,
    actor: Option<String>,
}

impl DirectoryService {
    pub fn load(store: Box<dyn PersistenceService>) -> Result<Self, DirectoryError> {
        let data = store.load()?;
        log::debug!(
            "Loaded directory: {} students, {} admins, {} face links, {} attendance records",
            data.students.len(),
            data.admins.len(),
            data.face_links.len(),
            data.attendance.len()
        );
        Ok(Self {
            store,
            data,
            actor: None,
        })
    }

    /// Attributes subsequent audit entries to the admin `id_number`, or to
    /// the system when `None`.
    pub fn set_actor(&mut self, id_number: Option<&str>) -> Result<(), DirectoryError> {
        self.actor = match id_number {
            None => None,
            Some(id) => {
                let admin = self
                    .data
                    .admins
                    .get(id)
                    .ok_or_else(|| DirectoryError::NotFound(format!("admin {id}")))?;
                Some(admin.display_label())
            }
        };
        Ok(())
    }

    fn actor_label(&self) -> String {
        self.actor.clone().unwrap_or_else(|| SYSTEM_ACTOR.to_string())
    }

    fn commit<T>(
        &mut self,
        changed: &[Collection],
        mutate: impl FnOnce(&mut DirectoryData) -> Result<T, DirectoryError>,
    ) -> Result<T, DirectoryError> {
        let mut next = self.data.clone();
        let out = mutate(&mut next)?;
        self.store.save(&next, changed)?;
        self.data = next;
        Ok(out)
    }

    fn audit(&self, action: &str, details: String) -> AuditLogRecord {
        AuditLogRecord {
            timestamp: Utc::now(),
            user: self.actor_label(),
            action: action.to_string(),
            details,
        }
    }

    // --- Queries ---

    pub fn students(&self) -> &BTreeMap<String, StudentInfo> {
        &self.data.students
    }

    pub fn admins(&self) -> &BTreeMap<String, AdminInfo> {
        &self.data.admins
    }

    pub fn face_links(&self) -> &BTreeMap<u32, String> {
        &self.data.face_links
    }

    pub fn attendance(&self) -> &[AttendanceRecord] {
        &self.data.attendance
    }

    pub fn departments(&self) -> &[String] {
        &self.data.departments
    }

    /// Newest first.
    pub fn audit_log(&self) -> &[AuditLogRecord] {
        &self.data.audit_log
    }

    pub fn persistent_id_for(&self, roll_number: &str) -> Option<u32> {
        self.data
            .face_links
            .iter()
            .find(|(_, roll)| roll.as_str() == roll_number)
            .map(|(pid, _)| *pid)
    }

    /// Attendance of one student, newest first. Empty when unlinked.
    pub fn student_attendance(&self, roll_number: &str) -> Vec<AttendanceRecord> {
        let Some(pid) = self.persistent_id_for(roll_number) else {
            return Vec::new();
        };
        let mut records: Vec<_> = self
            .data
            .attendance
            .iter()
            .filter(|r| r.persistent_id == pid)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        records
    }

    /// Admins shadow students sharing the same id.
    pub fn user_by_id(&self, id: &str) -> Option<Person> {
        if let Some(admin) = self.data.admins.get(id) {
            return Some(Person::Admin(admin.clone()));
        }
        self.data.students.get(id).cloned().map(Person::Student)
    }

    pub fn users_with_photos(&self, kind: AccountKind) -> Vec<ReferencePhoto> {
        let photo = |id: &String, photo: &Option<String>| {
            photo.as_ref().map(|p| ReferencePhoto {
                person_id: id.clone(),
                photo_base64: p.clone(),
            })
        };
        match kind {
            AccountKind::Student => self
                .data
                .students
                .iter()
                .filter_map(|(id, s)| photo(id, &s.photo_base64))
                .collect(),
            AccountKind::Admin => self
                .data
                .admins
                .iter()
                .filter_map(|(id, a)| photo(id, &a.photo_base64))
                .collect(),
        }
    }

    // --- Registration ---

    /// Seeds a default Principal when no admin exists. Returns whether one
    /// was created.
    pub fn ensure_default_principal(&mut self) -> Result<bool, DirectoryError> {
        if !self.data.admins.is_empty() {
            return Ok(false);
        }
        self.commit(&[Collection::Admins], |data| {
            let principal = AdminInfo {
                name: "Default Principal".into(),
                id_number: "principal".into(),
                phone_number: "1234567890".into(),
                department: "Administration".into(),
                designation: Designation::Principal,
                is_blocked: false,
                photo_base64: None,
            };
            data.admins.insert(principal.id_number.clone(), principal);
            Ok(())
        })?;
        log::info!("Seeded default principal account");
        Ok(true)
    }

    pub fn register_student(&mut self, student: StudentInfo) -> Result<(), DirectoryError> {
        if self.data.students.contains_key(&student.roll_number) {
            return Err(DirectoryError::AlreadyExists(format!(
                "student {}",
                student.roll_number
            )));
        }
        self.commit(&[Collection::Students], |data| {
            data.students.insert(student.roll_number.clone(), student);
            Ok(())
        })
    }

    /// Registers an unblocked admin, adding their department if unknown.
    pub fn register_admin(&mut self, admin: AdminInfo) -> Result<(), DirectoryError> {
        if self.data.admins.contains_key(&admin.id_number) {
            return Err(DirectoryError::AlreadyExists(format!(
                "admin {}",
                admin.id_number
            )));
        }
        self.commit(&[Collection::Admins, Collection::Departments], |data| {
            if !admin.department.is_empty() && !data.departments.contains(&admin.department) {
                data.departments.push(admin.department.clone());
            }
            let admin = AdminInfo {
                is_blocked: false,
                ..admin
            };
            data.admins.insert(admin.id_number.clone(), admin);
            Ok(())
        })
    }

    pub fn add_department(&mut self, name: &str) -> Result<&[String], DirectoryError> {
        if !self.data.departments.iter().any(|d| d == name) {
            self.commit(&[Collection::Departments], |data| {
                data.departments.push(name.to_string());
                Ok(())
            })?;
        }
        Ok(&self.data.departments)
    }

    // --- Face links ---

    /// Links a tracked face to a student, replacing any previous link for
    /// that persistent id.
    pub fn link_face(
        &mut self,
        persistent_id: u32,
        roll_number: &str,
    ) -> Result<(), DirectoryError> {
        if !self.data.students.contains_key(roll_number) {
            return Err(DirectoryError::NotFound(format!("student {roll_number}")));
        }
        self.commit(&[Collection::FaceLinks], |data| {
            data.face_links.insert(persistent_id, roll_number.to_string());
            Ok(())
        })?;
        log::info!("Linked face {persistent_id} to {roll_number}");
        Ok(())
    }

    /// Self-service link: gives the student a fresh persistent id one above
    /// the highest linked id.
    pub fn link_new_face_for_student(&mut self, roll_number: &str) -> Result<u32, DirectoryError> {
        if self.persistent_id_for(roll_number).is_some() {
            return Err(DirectoryError::LinkAlreadyExists(roll_number.to_string()));
        }
        let new_id = self
            .data
            .face_links
            .keys()
            .max()
            .map_or(1, |max| max + 1);
        self.commit(&[Collection::FaceLinks], |data| {
            data.face_links.insert(new_id, roll_number.to_string());
            Ok(())
        })?;
        Ok(new_id)
    }

    // --- Destructive actions ---

    /// Removes the student with their face link and that face's attendance.
    pub fn delete_student(&mut self, roll_number: &str) -> Result<(), DirectoryError> {
        let student = self
            .data
            .students
            .get(roll_number)
            .ok_or_else(|| DirectoryError::NotFound(format!("student {roll_number}")))?;
        let entry = self.audit(
            "DELETE_STUDENT",
            format!("Deleted student: {} ({roll_number})", student.name),
        );
        let linked = self.persistent_id_for(roll_number);
        self.commit(
            &[
                Collection::Students,
                Collection::FaceLinks,
                Collection::Attendance,
                Collection::AuditLog,
            ],
            |data| {
                if let Some(pid) = linked {
                    data.face_links.remove(&pid);
                    data.attendance.retain(|r| r.persistent_id != pid);
                }
                data.students.remove(roll_number);
                data.audit_log.insert(0, entry);
                Ok(())
            },
        )
    }

    /// Returns the new blocked state.
    pub fn toggle_student_block(&mut self, roll_number: &str) -> Result<bool, DirectoryError> {
        let student = self
            .data
            .students
            .get(roll_number)
            .ok_or_else(|| DirectoryError::NotFound(format!("student {roll_number}")))?;
        let blocked = !student.is_blocked;
        let action = if blocked { "BLOCK_STUDENT" } else { "UNBLOCK_STUDENT" };
        let entry = self.audit(
            action,
            format!(
                "Toggled block status for student: {} ({roll_number})",
                student.name
            ),
        );
        self.commit(&[Collection::Students, Collection::AuditLog], |data| {
            if let Some(s) = data.students.get_mut(roll_number) {
                s.is_blocked = blocked;
            }
            data.audit_log.insert(0, entry);
            Ok(blocked)
        })
    }

    fn mutable_admin(&self, id_number: &str) -> Result<&AdminInfo, DirectoryError> {
        let admin = self
            .data
            .admins
            .get(id_number)
            .ok_or_else(|| DirectoryError::NotFound(format!("admin {id_number}")))?;
        if admin.designation.is_immutable() {
            return Err(DirectoryError::ImmutableAccount(id_number.to_string()));
        }
        Ok(admin)
    }

    /// Returns the new blocked state.
    pub fn toggle_admin_block(&mut self, id_number: &str) -> Result<bool, DirectoryError> {
        let admin = self.mutable_admin(id_number)?;
        let blocked = !admin.is_blocked;
        let action = if blocked { "BLOCK_ADMIN" } else { "UNBLOCK_ADMIN" };
        let entry = self.audit(
            action,
            format!("Toggled block status for admin: {} ({id_number})", admin.name),
        );
        self.commit(&[Collection::Admins, Collection::AuditLog], |data| {
            if let Some(a) = data.admins.get_mut(id_number) {
                a.is_blocked = blocked;
            }
            data.audit_log.insert(0, entry);
            Ok(blocked)
        })
    }

    pub fn delete_admin(&mut self, id_number: &str) -> Result<(), DirectoryError> {
        let admin = self.mutable_admin(id_number)?;
        let entry = self.audit(
            "DELETE_ADMIN",
            format!("Deleted admin: {} ({id_number})", admin.name),
        );
        self.commit(&[Collection::Admins, Collection::AuditLog], |data| {
            data.admins.remove(id_number);
            data.audit_log.insert(0, entry);
            Ok(())
        })
    }
}

impl IdentityDirectory for DirectoryService {
    fn linked_roll_number(&self, persistent_id: u32) -> Option<&str> {
        self.data.face_links.get(&persistent_id).map(String::as_str)
    }

    fn student(&self, roll_number: &str) -> Option<&StudentInfo> {
        self.data.students.get(roll_number)
    }
}

impl AttendanceLog for DirectoryService {
    fn log_attendance(
        &mut self,
        persistent_id: u32,
        emotion: Emotion,
        at: DateTime<Utc>,
    ) -> Result<Vec<AttendanceRecord>, DirectoryError> {
        self.commit(&[Collection::Attendance], |data| {
            data.attendance.push(AttendanceRecord {
                persistent_id,
                timestamp: at,
                emotion,
            });
            Ok(data.attendance.clone())
        })
    }
}
