use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::attendance::domain::attendance_record::{AttendanceRecord, AuditLogRecord};
use crate::identity::domain::person::{AdminInfo, StudentInfo};

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("could not determine data directory")]
    NoDataDir,
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to (de)serialize {collection}: {source}")]
    Serde {
        collection: Collection,
        #[source]
        source: serde_json::Error,
    },
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// The independently persisted collections.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Collection {
    Students,
    Admins,
    FaceLinks,
    Attendance,
    Departments,
    AuditLog,
}

impl Collection {
    pub const ALL: &'static [Collection] = &[
        Collection::Students,
        Collection::Admins,
        Collection::FaceLinks,
        Collection::Attendance,
        Collection::Departments,
        Collection::AuditLog,
    ];

    pub fn file_name(&self) -> &'static str {
        match self {
            Collection::Students => "students.json",
            Collection::Admins => "admins.json",
            Collection::FaceLinks => "face_links.json",
            Collection::Attendance => "attendance.json",
            Collection::Departments => "departments.json",
            Collection::AuditLog => "audit_log.json",
        }
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Collection::Students => "students",
            Collection::Admins => "admins",
            Collection::FaceLinks => "face links",
            Collection::Attendance => "attendance",
            Collection::Departments => "departments",
            Collection::AuditLog => "audit log",
        };
        f.write_str(name)
    }
}

/// Everything the directory persists, loaded and saved whole.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DirectoryData {
    pub students: BTreeMap<String, StudentInfo>,
    pub admins: BTreeMap<String, AdminInfo>,
    /// persistent id → roll number.
    pub face_links: BTreeMap<u32, String>,
    pub attendance: Vec<AttendanceRecord>,
    pub departments: Vec<String>,
    /// Newest first.
    pub audit_log: Vec<AuditLogRecord>,
}

/// Domain interface for the key-value persistence service.
///
/// `save` replaces every listed collection with its value in `data`, or
/// leaves all of them untouched on error.
pub trait PersistenceService: Send {
    fn load(&self) -> Result<DirectoryData, PersistenceError>;

    fn save(
        &mut self,
        data: &DirectoryData,
        changed: &[Collection],
    ) -> Result<(), PersistenceError>;
}
